//! Streaming worksheet parser.
//!
//! The worksheet entry is inflated chunk by chunk; [`StreamingRowParser`]
//! keeps a rolling text buffer holding at most the rows not yet complete, so
//! memory stays bounded by the output columns, never by the XML.

use log::{debug, info, warn};

use super::workbook::{resolve_workbook, WORKBOOK_PATH, WORKBOOK_RELS_PATH};
use super::{now_ms, ParseOutput, ParseStats, ParserKind, SheetParser};
use crate::cell_ref::{column_index, next_row_number, parse_cell_range};
use crate::columns::clean_header;
use crate::config::ImportConfig;
use crate::decompress::{decompress_to_string, StreamOptions, TextStream};
use crate::error::{ImportError, Result};
use crate::scan::{self, RawCell};
use crate::schedule::{ImportContext, Scheduler};
use crate::shared_strings::load_shared_strings;
use crate::source::ByteSource;
use crate::types::{resolve_cell_value, CellValue, ColumnarTable, ParseProgress, TableBuilder};
use crate::zip_directory::{read_entries, ZipDirectory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    SeekingSheetData,
    ParsingHeader,
    ParsingRows,
    Done,
}

/// Incremental row parser over worksheet XML text.
///
/// Feed it decoded text with [`push_chunk`](Self::push_chunk) in any split;
/// the output is the same for every chunking of the same document.
pub struct StreamingRowParser<'s> {
    state: ParseState,
    buffer: String,
    shared_strings: &'s [String],
    builder: TableBuilder,
    /// Data rows expected, from `<dimension>`.
    estimated_rows: Option<usize>,
    /// Worksheet row number of the last row materialized (header included).
    last_row: u32,
    scratch: Vec<Option<CellValue>>,
    seek_buffer_limit: usize,
    seek_tail_retain: usize,
    truncated_seek: bool,
}

impl<'s> StreamingRowParser<'s> {
    pub fn new(shared_strings: &'s [String], sheet_name: &str, config: &ImportConfig) -> Self {
        Self {
            state: ParseState::SeekingSheetData,
            buffer: String::new(),
            shared_strings,
            builder: TableBuilder::new(sheet_name),
            estimated_rows: None,
            last_row: 0,
            scratch: Vec::new(),
            seek_buffer_limit: config.seek_buffer_limit,
            seek_tail_retain: config.seek_tail_retain,
            truncated_seek: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> ParseState {
        self.state
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == ParseState::Done
    }

    /// Data rows emitted so far (gap rows included).
    #[must_use]
    pub fn rows_parsed(&self) -> usize {
        self.builder.row_count()
    }

    /// Data rows the `<dimension>` tag announces, if one was seen.
    #[must_use]
    pub fn estimated_rows(&self) -> Option<usize> {
        self.estimated_rows
    }

    /// Bytes currently held in the rolling buffer.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Consume the next piece of worksheet text.
    pub fn push_chunk(&mut self, chunk: &str) {
        if self.state == ParseState::Done {
            return;
        }
        self.buffer.push_str(chunk);
        if self.state == ParseState::SeekingSheetData {
            self.seek_sheet_data();
        }
        if matches!(
            self.state,
            ParseState::ParsingHeader | ParseState::ParsingRows
        ) {
            self.drain_rows();
        }
    }

    /// Finish the parse and hand over the table.
    pub fn finish(mut self) -> ColumnarTable {
        match self.state {
            ParseState::SeekingSheetData => warn!("worksheet ended before <sheetData>"),
            ParseState::ParsingHeader => debug!("worksheet has no header row"),
            ParseState::ParsingRows => debug!("worksheet ended without </sheetData>"),
            ParseState::Done => {}
        }
        self.state = ParseState::Done;
        self.buffer = String::new();
        self.builder.finish()
    }

    fn seek_sheet_data(&mut self) {
        if self.estimated_rows.is_none() {
            if let Some(dimension) = scan::next_element(&self.buffer, 0, "dimension") {
                self.estimated_rows = scan::attr(dimension.tag, "ref")
                    .and_then(parse_cell_range)
                    .map(|range| usize::try_from(range.row_span().saturating_sub(1)).unwrap_or(0));
                debug!("dimension: ~{:?} data rows", self.estimated_rows);
            }
        }

        let Some(open) = scan::find_open_tag(&self.buffer, 0, "sheetData") else {
            self.truncate_seek_buffer();
            return;
        };
        let Some(gt) = self.buffer.get(open..).and_then(|rest| rest.find('>')) else {
            return;
        };
        let tag_end = open + gt + 1;
        let self_closing = self
            .buffer
            .get(open..tag_end)
            .is_some_and(|tag| tag.ends_with("/>"));
        if self_closing {
            debug!("empty <sheetData/>");
            self.buffer.clear();
            self.state = ParseState::Done;
        } else {
            self.buffer.drain(..tag_end);
            self.state = ParseState::ParsingHeader;
        }
    }

    /// Keep only the tail of a buffer that has not reached `<sheetData>` yet.
    ///
    /// The tail is never shorter than a split `<sheetData` marker or a
    /// `<dimension ref=".."/>` tag, and the marker search runs after every
    /// append, so a marker can only be split across the retained tail.
    fn truncate_seek_buffer(&mut self) {
        if self.buffer.len() <= self.seek_buffer_limit {
            return;
        }
        let mut cut = self.buffer.len().saturating_sub(self.seek_tail_retain);
        while !self.buffer.is_char_boundary(cut) {
            cut += 1;
        }
        if !self.truncated_seek {
            warn!(
                "no <sheetData> in the first {} bytes, truncating look-ahead buffer",
                self.buffer.len()
            );
            self.truncated_seek = true;
        }
        self.buffer.drain(..cut);
    }

    fn drain_rows(&mut self) {
        let buffer = std::mem::take(&mut self.buffer);
        let mut consumed = 0usize;
        while let Some((start, end)) = buffer.get(consumed..).and_then(scan::next_row_fragment) {
            if let Some(fragment) = buffer.get(consumed + start..consumed + end) {
                self.handle_row(fragment);
            }
            consumed += end;
        }
        let rest = buffer.get(consumed..).unwrap_or("");
        if scan::find_close_tag(rest, 0, "sheetData").is_some() {
            self.state = ParseState::Done;
            self.buffer = String::new();
        } else {
            self.buffer = buffer;
            self.buffer.drain(..consumed);
        }
    }

    fn handle_row(&mut self, fragment: &str) {
        let mut cells = scan::cells(fragment).peekable();
        if cells.peek().is_none() {
            // no cells: only matters as a gap before a later row
            return;
        }
        let Some(row_number) = next_row_number(scan::row_number(fragment), self.last_row) else {
            debug!("row past the sheet limit skipped");
            return;
        };

        if self.state == ParseState::ParsingHeader {
            let headers = self.read_header(cells);
            self.builder.set_headers(headers);
            self.scratch = vec![None; self.builder.slot_count()];
            self.last_row = row_number;
            self.state = ParseState::ParsingRows;
            debug!("header row {row_number}, {} kept columns", self.builder.slot_count());
            return;
        }

        let gap = row_number.saturating_sub(self.last_row).saturating_sub(1);
        if gap > 0 {
            self.builder
                .push_empty_rows(usize::try_from(gap).unwrap_or(0));
        }
        self.last_row = row_number;

        let mut next_col = 0u32;
        for cell in cells {
            let col = cell.reference.and_then(column_index).unwrap_or(next_col);
            next_col = col.saturating_add(1);
            let Some((slot, date_column)) = self.builder.slot_for(col) else {
                continue;
            };
            let value = self.resolve(&cell, date_column);
            if let Some(target) = self.scratch.get_mut(slot) {
                *target = Some(value);
            }
        }
        self.builder.push_row(&mut self.scratch);
    }

    fn read_header<'f>(&self, cells: impl Iterator<Item = RawCell<'f>>) -> Vec<(u32, String)> {
        let mut headers = Vec::new();
        let mut next_col = 0u32;
        for cell in cells {
            let col = cell.reference.and_then(column_index).unwrap_or(next_col);
            next_col = col.saturating_add(1);
            let name = clean_header(&self.resolve(&cell, false).to_display_string());
            headers.push((col, name));
        }
        headers
    }

    fn resolve(&self, cell: &RawCell<'_>, date_column: bool) -> CellValue {
        let value = cell.value.map(scan::decode_entities);
        let inline = cell.inline.map(|body| {
            let mut text = String::new();
            scan::push_text_runs(body, &mut text);
            text
        });
        resolve_cell_value(
            cell.cell_type,
            value.as_deref(),
            inline,
            self.shared_strings,
            date_column,
        )
    }
}

/// Parser that reads the archive through range requests and inflates the worksheet incrementally.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamingParser;

async fn read_small_entry<S: ByteSource + ?Sized>(
    source: &S,
    directory: &ZipDirectory,
    name: &str,
    options: StreamOptions,
) -> Result<Option<String>> {
    match directory.find(name) {
        Some(entry) => decompress_to_string(source, entry, options).await.map(Some),
        None => Ok(None),
    }
}

impl SheetParser for StreamingParser {
    fn kind(&self) -> ParserKind {
        ParserKind::Streaming
    }

    async fn parse<S: ByteSource + ?Sized, Y: Scheduler>(
        &self,
        source: &S,
        ctx: &mut ImportContext<'_, Y>,
    ) -> Result<ParseOutput> {
        let total_start = now_ms();
        let mut stats = ParseStats::new(ParserKind::Streaming);
        let options = StreamOptions {
            read_chunk: ctx.config.read_chunk_bytes,
            inflate_chunk: ctx.config.inflate_chunk_bytes,
        };

        ctx.report(ParseProgress::new("Reading ZIP structure...", Some(0)));
        let zip_start = now_ms();
        let directory = read_entries(source).await?;
        let workbook_xml = read_small_entry(source, &directory, WORKBOOK_PATH, options).await?;
        let rels_xml = read_small_entry(source, &directory, WORKBOOK_RELS_PATH, options).await?;
        let parts = resolve_workbook(
            workbook_xml.as_deref().map(str::as_bytes),
            rels_xml.as_deref().map(str::as_bytes),
            directory.names(),
            &ctx.config.preferred_sheet,
        )?;
        stats.zip_entries = directory.len();
        stats.zip_ms = now_ms() - zip_start;
        ctx.checkpoint().await?;

        ctx.report(ParseProgress::new("Loading shared strings...", Some(5)));
        let sst_start = now_ms();
        let shared_strings =
            load_shared_strings(source, &directory, &parts.shared_strings_path, options).await?;
        stats.shared_strings = shared_strings.len();
        stats.shared_strings_ms = now_ms() - sst_start;
        ctx.checkpoint().await?;

        let entry = directory.find(&parts.sheet.path).ok_or_else(|| {
            ImportError::format(format!("worksheet {} not found", parts.sheet.path))
        })?;
        let parse_start = now_ms();
        let mut stream = TextStream::open(source, entry, options)?;
        let mut parser = StreamingRowParser::new(&shared_strings, &parts.sheet.name, &ctx.config);
        let interval = ctx.config.progress_interval_rows;
        let mut next_report = interval;

        ctx.report(ParseProgress::new("Parsing rows...", Some(10)));
        while let Some(text) = stream.next_text().await? {
            parser.push_chunk(&text);
            let rows = parser.rows_parsed();
            if rows >= next_report {
                let progress = match parser.estimated_rows() {
                    Some(total) => ParseProgress::fraction(
                        format!("Parsing rows: {rows} of ~{total}"),
                        rows,
                        total,
                    ),
                    None => ParseProgress::fraction(
                        format!("Parsing rows: {rows}"),
                        usize::try_from(stream.compressed_read()).unwrap_or(0),
                        usize::try_from(stream.compressed_total()).unwrap_or(0),
                    ),
                };
                ctx.report(progress);
                ctx.checkpoint().await?;
                next_report = rows + interval;
            }
            if parser.is_done() {
                break;
            }
        }
        let table = parser.finish();
        stats.parse_ms = now_ms() - parse_start;
        stats.total_ms = now_ms() - total_start;

        ctx.report(ParseProgress::new("Finalizing...", Some(100)));
        info!(
            "streaming parse: {} rows, {} kept columns from \"{}\" in {:.0} ms",
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
    use chrono::NaiveDate;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:D4"/><sheetViews><sheetView workbookViewId="0"/></sheetViews><cols><col min="1" max="4" width="12"/></cols><sheetData><row r="1" spans="1:4"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="inlineStr"><is><t>Actual
   Amount</t></is></c><c r="D1" t="s"><v>2</v></c></row><row r="2"><c r="A2"><v>45306</v></c><c r="B2"><v>110520</v></c><c r="C2"><v>1000.5</v></c><c r="D2" t="s"><v>3</v></c></row><row r="3"><c r="A3"><v>45307</v></c><c r="C3"><v>-200</v></c></row><row r="4"><c r="A4" t="inlineStr"><is><t>Grand Total</t></is></c><c r="B4" t="s"><v>4</v></c><c r="C4"><v>800.5</v></c><c r="D4"/></row></sheetData><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#;

    fn shared() -> Vec<String> {
        ["G/L Date", "Job", "Batch", "R&D", ""]
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn parse_in_chunks(xml: &str, chunk: usize, shared: &[String]) -> ColumnarTable {
        let config = ImportConfig::default().sanitized();
        let mut parser = StreamingRowParser::new(shared, "Sheet1", &config);
        let mut rest = xml;
        while !rest.is_empty() {
            let mut cut = chunk.min(rest.len());
            while !rest.is_char_boundary(cut) {
                cut += 1;
            }
            let (head, tail) = rest.split_at(cut);
            parser.push_chunk(head);
            rest = tail;
        }
        parser.finish()
    }

    #[test]
    fn test_whole_document() {
        let shared = shared();
        let table = parse_in_chunks(SHEET, usize::MAX, &shared);
        assert_eq!(table.row_count, 3);
        assert!(table.is_aligned());
        assert_eq!(
            table.all_columns,
            vec!["G/L Date", "Job", "Actual Amount", "Batch"]
        );
        assert!(!table.has_column("Batch"));
        assert_eq!(
            table.value("G/L Date", 0),
            &CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );
        assert_eq!(table.value("Job", 0), &CellValue::Number(110_520.0));
        // sparse row: Job absent in row 3
        assert_eq!(table.value("Job", 1), &CellValue::Empty);
        assert_eq!(table.value("Actual Amount", 1), &CellValue::Number(-200.0));
        assert_eq!(
            table.value("G/L Date", 2),
            &CellValue::Text("Grand Total".into())
        );
        assert_eq!(table.value("Job", 2), &CellValue::Empty);
    }

    #[test]
    fn test_every_chunk_size_gives_identical_output() {
        let shared = shared();
        let expected = parse_in_chunks(SHEET, usize::MAX, &shared);
        for chunk in 1..=64 {
            assert_eq!(parse_in_chunks(SHEET, chunk, &shared), expected, "chunk {chunk}");
        }
    }

    #[test]
    fn test_every_two_way_split_gives_identical_output() {
        let shared = shared();
        let expected = parse_in_chunks(SHEET, usize::MAX, &shared);
        let config = ImportConfig::default().sanitized();
        for split in 0..=SHEET.len() {
            let mut parser = StreamingRowParser::new(&shared, "Sheet1", &config);
            parser.push_chunk(&SHEET[..split]);
            parser.push_chunk(&SHEET[split..]);
            assert_eq!(parser.finish(), expected, "split at {split}");
        }
    }

    #[test]
    fn test_dimension_estimate_and_done_state() {
        let shared = shared();
        let config = ImportConfig::default().sanitized();
        let mut parser = StreamingRowParser::new(&shared, "Sheet1", &config);
        parser.push_chunk(SHEET);
        assert_eq!(parser.estimated_rows(), Some(3));
        assert!(parser.is_done());
        assert_eq!(parser.buffered_len(), 0);
    }

    #[test]
    fn test_empty_sheet_data() {
        let table = parse_in_chunks(
            r#"<worksheet><dimension ref="A1"/><sheetData/></worksheet>"#,
            7,
            &[],
        );
        assert_eq!(table.row_count, 0);
        assert!(table.all_columns.is_empty());
    }

    #[test]
    fn test_header_only() {
        let table = parse_in_chunks(
            r#"<worksheet><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>Job</t></is></c></row></sheetData></worksheet>"#,
            5,
            &[],
        );
        assert_eq!(table.row_count, 0);
        assert_eq!(table.column("Job"), Some(&[][..]));
    }

    #[test]
    fn test_row_gaps_are_filled() {
        let xml = r#"<worksheet><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>Job</t></is></c></row><row r="2"><c r="A2"><v>1</v></c></row><row r="3"/><row r="5"><c r="A5"><v>5</v></c></row></sheetData></worksheet>"#;
        let table = parse_in_chunks(xml, 9, &[]);
        assert_eq!(table.row_count, 4);
        let job = table.column("Job").unwrap();
        assert_eq!(job[0], CellValue::Number(1.0));
        assert_eq!(job[1], CellValue::Empty);
        assert_eq!(job[2], CellValue::Empty);
        assert_eq!(job[3], CellValue::Number(5.0));
    }

    #[test]
    fn test_cells_without_references_are_sequential() {
        let xml = r#"<worksheet><sheetData><row><c t="inlineStr"><is><t>Job</t></is></c><c t="inlineStr"><is><t>Job Type</t></is></c></row><row><c><v>7</v></c><c t="inlineStr"><is><t>GA</t></is></c></row></sheetData></worksheet>"#;
        let table = parse_in_chunks(xml, 13, &[]);
        assert_eq!(table.row_count, 1);
        assert_eq!(table.value("Job", 0), &CellValue::Number(7.0));
        assert_eq!(table.value("Job Type", 0), &CellValue::Text("GA".into()));
    }

    #[test]
    fn test_long_prefix_before_sheet_data_is_truncated_safely() {
        let config = ImportConfig {
            seek_buffer_limit: 2048,
            seek_tail_retain: 256,
            ..ImportConfig::default()
        }
        .sanitized();
        let cols: String = (1..=400)
            .map(|i| format!(r#"<col min="{i}" max="{i}" width="9.5" customWidth="1"/>"#))
            .collect();
        let xml = format!(
            r#"<worksheet><dimension ref="A1:A3"/><cols>{cols}</cols><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>Job</t></is></c></row><row r="2"><c r="A2"><v>1</v></c></row><row r="3"><c r="A3"><v>2</v></c></row></sheetData></worksheet>"#
        );
        for chunk in [1usize, 17, 255, 256, 1000] {
            let mut parser = StreamingRowParser::new(&[], "Sheet1", &config);
            for piece in xml.as_bytes().chunks(chunk) {
                parser.push_chunk(std::str::from_utf8(piece).unwrap());
                assert!(parser.buffered_len() <= config.seek_buffer_limit + chunk);
            }
            assert_eq!(parser.estimated_rows(), Some(2));
            let table = parser.finish();
            assert_eq!(table.row_count, 2, "chunk {chunk}");
        }
    }

    #[test]
    fn test_missing_sheet_data_yields_empty_table() {
        let table = parse_in_chunks("<worksheet></worksheet>", 4, &[]);
        assert_eq!(table.row_count, 0);
    }

    #[test]
    fn test_namespace_prefixed_worksheet() {
        let xml = r#"<x:worksheet xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><x:dimension ref="A1:B3"/><x:sheetData><x:row r="1"><x:c r="A1" t="inlineStr"><x:is><x:t>Job</x:t></x:is></x:c><x:c r="B1" t="inlineStr"><x:is><x:t>Job Type</x:t></x:is></x:c></x:row><x:row r="3"><x:c r="A3"><x:v>110520</x:v></x:c><x:c r="B3" t="inlineStr"><x:is><x:t>GA</x:t></x:is></x:c></x:row></x:sheetData></x:worksheet>"#;
        let expected = parse_in_chunks(xml, usize::MAX, &[]);
        assert_eq!(expected.row_count, 2);
        assert_eq!(expected.value("Job", 1), &CellValue::Number(110_520.0));
        assert_eq!(expected.value("Job Type", 1), &CellValue::Text("GA".into()));
        for chunk in 1..=32 {
            assert_eq!(parse_in_chunks(xml, chunk, &[]), expected, "chunk {chunk}");
        }

        let config = ImportConfig::default().sanitized();
        let mut parser = StreamingRowParser::new(&[], "Sheet1", &config);
        parser.push_chunk(xml);
        assert_eq!(parser.estimated_rows(), Some(2));
        assert!(parser.is_done());
    }

    #[test]
    fn test_row_numbers_past_sheet_limit_do_not_overflow() {
        let xml = r#"<worksheet><sheetData><row r="4294967295"><c t="inlineStr"><is><t>Job</t></is></c></row><row><c><v>1</v></c></row><row r="1000000000"><c r="A1000000000"><v>2</v></c></row><row r="4"><c><v>3</v></c><c r="XFD4"><v>4</v></c><c><v>5</v></c></row></sheetData></worksheet>"#;
        let table = parse_in_chunks(xml, 11, &[]);
        // rows 2, 3 and 4 once the bad numbers are ignored
        assert_eq!(table.row_count, 3);
        let job = table.column("Job").unwrap();
        assert_eq!(job[0], CellValue::Number(1.0));
        assert_eq!(job[1], CellValue::Number(2.0));
        assert_eq!(job[2], CellValue::Number(3.0));
    }
}
