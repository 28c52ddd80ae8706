//! In-memory parse path for small inputs.
//!
//! Opens the whole archive with the `zip` crate, reads the worksheet into a
//! sparse row map with quick-xml, then copies the kept columns out of the
//! used range.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Cursor, Read};

use log::{debug, info, warn};
use quick_xml::events::Event;
use quick_xml::Reader;
use zip::result::ZipError;
use zip::ZipArchive;

use super::workbook::{resolve_workbook, WORKBOOK_PATH, WORKBOOK_RELS_PATH};
use super::{now_ms, ParseOutput, ParseStats, ParserKind, SheetParser};
use crate::cell_ref::{column_index, next_row_number, parse_cell_range, CellRange};
use crate::columns::clean_header;
use crate::error::{ImportError, Result};
use crate::schedule::{ImportContext, Scheduler};
use crate::source::ByteSource;
use crate::types::{resolve_cell_value, CellValue, ParseProgress, TableBuilder};
use crate::xml_helpers::{attr_string, attr_u32, text_string};

/// One `<c>` element as stored in the sheet model.
#[derive(Debug, Default)]
struct ModelCell {
    col: u32,
    cell_type: Option<String>,
    value: Option<String>,
    inline: Option<String>,
}

/// Sparse worksheet: row number -> cells, plus the declared `<dimension>`.
#[derive(Debug, Default)]
struct SheetModel {
    dimension: Option<String>,
    rows: BTreeMap<u32, Vec<ModelCell>>,
}

fn read_entry<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|e| ImportError::Decompression(format!("{name}: {e}")))?;
    Ok(Some(data))
}

/// Shared strings via quick-xml. Same output as the streaming tokenizer.
fn parse_shared_strings_xml<R: BufRead>(reader: R) -> Vec<String> {
    let mut xml = Reader::from_reader(reader);
    xml.trim_text(false);

    let mut strings = Vec::new();
    let mut buf = Vec::new();
    let mut current = String::new();
    let mut in_si = false;
    let mut in_t = false;
    let mut in_rph = false;

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"rPh" => in_rph = true,
                b"t" if in_si && !in_rph => in_t = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"si" {
                    strings.push(String::new());
                }
            }
            Ok(Event::Text(ref e)) if in_t => current.push_str(&text_string(e)),
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" if in_si => {
                    strings.push(std::mem::take(&mut current));
                    in_si = false;
                }
                b"rPh" => in_rph = false,
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    strings
}

/// Read the worksheet into a [`SheetModel`].
///
/// Rows are numbered like the streaming path does it, see
/// [`next_row_number`]. Rows without cells and rows past the sheet limit are
/// left out.
fn parse_sheet_model<R: BufRead>(reader: R) -> Result<SheetModel> {
    let mut xml = Reader::from_reader(reader);
    xml.trim_text(false);

    let mut model = SheetModel::default();
    let mut buf = Vec::new();
    let mut last_row = 0u32;
    let mut row_number: Option<u32> = None;
    let mut row_cells: Vec<ModelCell> = Vec::new();
    let mut next_col = 0u32;
    let mut cell: Option<ModelCell> = None;
    let mut in_v = false;
    let mut in_is = false;
    let mut in_t = false;
    let mut in_rph = false;

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(ref event @ (Event::Start(_) | Event::Empty(_))) => {
                let (Event::Start(ref e) | Event::Empty(ref e)) = event else {
                    continue;
                };
                let is_start = matches!(event, Event::Start(_));
                match e.local_name().as_ref() {
                    b"dimension" => model.dimension = attr_string(e, b"ref"),
                    b"row" if is_start => {
                        row_number = next_row_number(attr_u32(e, b"r"), last_row);
                        row_cells.clear();
                        next_col = 0;
                    }
                    b"c" => {
                        let col = attr_string(e, b"r")
                            .and_then(|r| column_index(&r))
                            .unwrap_or(next_col);
                        next_col = col.saturating_add(1);
                        let new_cell = ModelCell {
                            col,
                            cell_type: attr_string(e, b"t"),
                            ..ModelCell::default()
                        };
                        if is_start {
                            cell = Some(new_cell);
                        } else {
                            row_cells.push(new_cell);
                        }
                    }
                    b"v" if is_start => {
                        if let Some(c) = cell.as_mut() {
                            c.value.get_or_insert_with(String::new);
                            in_v = true;
                        }
                    }
                    b"is" if is_start => {
                        if let Some(c) = cell.as_mut() {
                            c.inline.get_or_insert_with(String::new);
                            in_is = true;
                        }
                    }
                    b"is" => {
                        if let Some(c) = cell.as_mut() {
                            c.inline.get_or_insert_with(String::new);
                        }
                    }
                    b"rPh" if is_start => in_rph = true,
                    b"t" if is_start && in_is && !in_rph => in_t = true,
                    _ => {}
                }
            }
            Ok(Event::Text(ref e)) if in_v || in_t => {
                let text = text_string(e);
                if let Some(c) = cell.as_mut() {
                    let target = if in_v { &mut c.value } else { &mut c.inline };
                    target.get_or_insert_with(String::new).push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"t" => in_t = false,
                b"rPh" => in_rph = false,
                b"is" => in_is = false,
                b"c" => {
                    if let Some(c) = cell.take() {
                        row_cells.push(c);
                    }
                }
                b"row" => match row_number.take() {
                    Some(number) if !row_cells.is_empty() => {
                        model.rows.insert(number, std::mem::take(&mut row_cells));
                        last_row = number;
                    }
                    None if !row_cells.is_empty() => debug!("row past the sheet limit skipped"),
                    _ => {}
                },
                b"sheetData" => break,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }

    Ok(model)
}

/// Row span of the worksheet as the in-memory pass walks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct UsedRows {
    /// First row (1-based) holding a cell; the header.
    first: u32,
    /// Last row (1-based) holding a cell.
    last: u32,
    /// Data rows announced for progress reporting.
    expected: usize,
}

/// Used range of the sheet model.
///
/// The declared `<dimension>` sets the expected row count when it covers every
/// cell; a missing, malformed or too small one is repaired from the cell
/// addresses. The walk itself always starts at the first row holding a cell.
fn used_rows(model: &SheetModel) -> Option<UsedRows> {
    let first = *model.rows.keys().next()?;
    let last = *model.rows.keys().next_back()?;
    let declared: Option<CellRange> = model.dimension.as_deref().and_then(parse_cell_range);
    let span = match declared {
        Some(range) if range.start_row < first && range.end_row >= last - 1 => range.row_span(),
        Some(range) => {
            warn!(
                "declared dimension rows {}..{} do not cover cells in rows {first}..{last}, recomputed",
                range.start_row + 1,
                range.end_row + 1
            );
            last - first + 1
        }
        None => {
            warn!(
                "dimension {:?} missing or malformed, recomputed from cells",
                model.dimension
            );
            last - first + 1
        }
    };
    Some(UsedRows {
        first,
        last,
        expected: usize::try_from(span.saturating_sub(1)).unwrap_or(0),
    })
}

fn resolve(cell: &mut ModelCell, shared_strings: &[String], date_column: bool) -> CellValue {
    resolve_cell_value(
        cell.cell_type.as_deref(),
        cell.value.as_deref(),
        cell.inline.take(),
        shared_strings,
        date_column,
    )
}

/// Copy the kept columns of the used range into a columnar table.
///
/// The first row holding a cell is the header; skipped row numbers become empty rows.
async fn extract_table<Y: Scheduler>(
    model: SheetModel,
    shared_strings: &[String],
    sheet_name: &str,
    ctx: &mut ImportContext<'_, Y>,
) -> Result<crate::types::ColumnarTable> {
    let mut builder = TableBuilder::new(sheet_name);
    let Some(used) = used_rows(&model) else {
        debug!("worksheet has no cells");
        return Ok(builder.finish());
    };
    debug!(
        "used rows {}..{}, ~{} data rows",
        used.first, used.last, used.expected
    );
    let total = used.expected;

    let mut rows = model.rows.into_iter();
    if let Some((_, mut header_cells)) = rows.next() {
        let headers = header_cells
            .iter_mut()
            .map(|cell| {
                let name = resolve(cell, shared_strings, false).to_display_string();
                (cell.col, clean_header(&name))
            })
            .collect();
        builder.set_headers(headers);
    }

    let mut scratch: Vec<Option<CellValue>> = vec![None; builder.slot_count()];
    let interval = ctx.config.progress_interval_rows;
    let mut next_report = interval;
    let mut last_row = used.first;
    for (row_number, mut cells) in rows {
        let gap = row_number.saturating_sub(last_row).saturating_sub(1);
        if gap > 0 {
            builder.push_empty_rows(usize::try_from(gap).unwrap_or(0));
        }
        last_row = row_number;
        for cell in &mut cells {
            let Some((slot, date_column)) = builder.slot_for(cell.col) else {
                continue;
            };
            if let Some(target) = scratch.get_mut(slot) {
                *target = Some(resolve(cell, shared_strings, date_column));
            }
        }
        builder.push_row(&mut scratch);

        let done = builder.row_count();
        if done >= next_report {
            ctx.report(ParseProgress::fraction(
                format!("Extracting rows: {done} of {total}"),
                done,
                total,
            ));
            ctx.checkpoint().await?;
            next_report = done + interval;
        }
    }
    Ok(builder.finish())
}

/// Parser that loads the whole archive before reading the worksheet.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryParser;

impl SheetParser for InMemoryParser {
    fn kind(&self) -> ParserKind {
        ParserKind::InMemory
    }

    async fn parse<S: ByteSource + ?Sized, Y: Scheduler>(
        &self,
        source: &S,
        ctx: &mut ImportContext<'_, Y>,
    ) -> Result<ParseOutput> {
        let total_start = now_ms();
        let mut stats = ParseStats::new(ParserKind::InMemory);

        ctx.report(ParseProgress::new("Reading file...", Some(0)));
        let zip_start = now_ms();
        let data: Cow<'_, [u8]> = match source.as_bytes() {
            Some(bytes) => Cow::Borrowed(bytes),
            None => Cow::Owned(source.read_all().await?),
        };
        let mut archive = ZipArchive::new(Cursor::new(&*data))
            .map_err(|e| ImportError::format(format!("not a ZIP archive: {e}")))?;
        stats.zip_entries = archive.len();

        let workbook_xml = read_entry(&mut archive, WORKBOOK_PATH)?;
        let rels_xml = read_entry(&mut archive, WORKBOOK_RELS_PATH)?;
        let entry_names: Vec<String> = archive.file_names().map(ToString::to_string).collect();
        let parts = resolve_workbook(
            workbook_xml.as_deref(),
            rels_xml.as_deref(),
            entry_names.iter().map(String::as_str),
            &ctx.config.preferred_sheet,
        )?;
        stats.zip_ms = now_ms() - zip_start;
        ctx.checkpoint().await?;

        ctx.report(ParseProgress::new("Loading shared strings...", Some(5)));
        let sst_start = now_ms();
        let shared_strings = match read_entry(&mut archive, &parts.shared_strings_path)? {
            Some(xml) => parse_shared_strings_xml(xml.as_slice()),
            None => Vec::new(),
        };
        stats.shared_strings = shared_strings.len();
        stats.shared_strings_ms = now_ms() - sst_start;
        debug!("shared strings: {} entries", shared_strings.len());

        ctx.report(ParseProgress::new("Parsing worksheet...", Some(10)));
        let parse_start = now_ms();
        let model = {
            let file = archive.by_name(&parts.sheet.path)?;
            // inflate failures surface from the zip reader as XML I/O errors
            parse_sheet_model(BufReader::new(file)).map_err(|e| match e {
                ImportError::Xml(quick_xml::Error::Io(io)) => {
                    ImportError::Decompression(format!("{}: {io}", parts.sheet.path))
                }
                other => other,
            })?
        };
        ctx.checkpoint().await?;

        let table = extract_table(model, &shared_strings, &parts.sheet.name, ctx).await?;

        stats.parse_ms = now_ms() - parse_start;
        stats.total_ms = now_ms() - total_start;
        ctx.report(ParseProgress::new("Finalizing...", Some(100)));
        info!(
            "in-memory parse: {} rows, {} kept columns from \"{}\" in {:.0} ms",
            table.row_count,
            table.columns.len(),
            table.sheet_name,
            stats.total_ms
        );
        Ok(ParseOutput { table, stats })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::shared_strings::parse_shared_strings;

    #[test]
    fn test_shared_strings_match_streaming_tokenizer() {
        let xml = r#"<sst><si><t>Ops</t></si><si/><si><t></t></si><si><r><t>Rich</t></r><r><t xml:space="preserve"> run </t></r></si><si><t>R&amp;D</t><rPh sb="0" eb="1"><t>x</t></rPh></si><si><t>AT&T</t></si></sst>"#;
        let quick = parse_shared_strings_xml(xml.as_bytes());
        assert_eq!(quick, parse_shared_strings(xml));
        assert_eq!(quick, vec!["Ops", "", "", "Rich run ", "R&D", "AT&T"]);
    }

    #[test]
    fn test_sheet_model_rows_and_cells() {
        let xml = r#"<worksheet><dimension ref="A1:C4"/><sheetData>
<row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="inlineStr"><is><t>Job</t><rPh><t>j</t></rPh></is></c></row>
<row r="2"/>
<row r="3"><c r="B3"/><c><v>7</v></c></row>
<row><c r="A4"><v></v></c></row>
</sheetData></worksheet>"#;
        let model = parse_sheet_model(xml.as_bytes()).unwrap();
        assert_eq!(model.dimension.as_deref(), Some("A1:C4"));
        assert_eq!(model.rows.keys().copied().collect::<Vec<_>>(), vec![1, 3, 4]);

        let header = &model.rows[&1];
        assert_eq!(header[1].col, 2);
        assert_eq!(header[1].inline.as_deref(), Some("Job"));

        let row3 = &model.rows[&3];
        assert_eq!(row3[0].col, 1);
        assert_eq!(row3[0].value, None);
        assert_eq!(row3[1].col, 2);
        assert_eq!(row3[1].value.as_deref(), Some("7"));

        assert_eq!(model.rows[&4][0].value.as_deref(), Some(""));
        let used = used_rows(&model).unwrap();
        assert_eq!((used.first, used.last, used.expected), (1, 4, 3));
    }

    #[test]
    fn test_used_rows_repairs_bad_dimension() {
        let mut model = SheetModel {
            dimension: Some("A1:B2".into()),
            ..SheetModel::default()
        };
        model.rows.insert(1, vec![ModelCell::default()]);
        model.rows.insert(9, vec![ModelCell::default()]);
        let repaired = UsedRows {
            first: 1,
            last: 9,
            expected: 8,
        };
        assert_eq!(used_rows(&model), Some(repaired));

        model.dimension = Some("garbage".into());
        assert_eq!(used_rows(&model), Some(repaired));

        model.dimension = None;
        assert_eq!(used_rows(&model), Some(repaired));

        assert_eq!(used_rows(&SheetModel::default()), None);
    }

    #[test]
    fn test_used_rows_keeps_covering_dimension() {
        let mut model = SheetModel {
            dimension: Some("A1:G500".into()),
            ..SheetModel::default()
        };
        model.rows.insert(1, vec![ModelCell::default()]);
        model.rows.insert(9, vec![ModelCell::default()]);
        assert_eq!(
            used_rows(&model),
            Some(UsedRows {
                first: 1,
                last: 9,
                expected: 499,
            })
        );

        // header below the declared start is not covered
        model.dimension = Some("A2:G500".into());
        assert_eq!(used_rows(&model).map(|u| u.expected), Some(8));
    }

    #[test]
    fn test_row_numbers_past_sheet_limit() {
        let xml = r#"<worksheet><sheetData>
<row r="1"><c r="A1"><v>1</v></c></row>
<row r="4294967295"><c><v>2</v></c><c r="XFD4294967295"><v>3</v></c><c><v>4</v></c></row>
<row><c r="A3"><v>5</v></c></row>
<row r="1048576"><c r="A1048576"><v>6</v></c></row>
<row><c r="A1"><v>7</v></c></row>
</sheetData></worksheet>"#;
        let model = parse_sheet_model(xml.as_bytes()).unwrap();
        assert_eq!(
            model.rows.keys().copied().collect::<Vec<_>>(),
            vec![1, 2, 3, 1_048_576]
        );
        let cols: Vec<u32> = model.rows[&2].iter().map(|c| c.col).collect();
        assert_eq!(cols, vec![0, 16_383, 16_384]);
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        let err = parse_sheet_model(&b"<worksheet><sheetData><row></sheetData>"[..]).unwrap_err();
        assert!(matches!(err, ImportError::Xml(_)), "{err}");
    }
}
