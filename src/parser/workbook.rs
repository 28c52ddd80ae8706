//! Worksheet resolution through `xl/workbook.xml` and its relationships.
//!
//! Shared by both parse paths so they always pick the same sheet.

use std::collections::HashMap;

use log::{debug, warn};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{ImportError, Result};
use crate::shared_strings::SHARED_STRINGS_PATH;
use crate::xml_helpers::{attr_string, attr_string_local};

pub(crate) const WORKBOOK_PATH: &str = "xl/workbook.xml";
pub(crate) const WORKBOOK_RELS_PATH: &str = "xl/_rels/workbook.xml.rels";

/// Name used when the workbook part is missing and the sheet is found by path.
const FALLBACK_SHEET_NAME: &str = "Sheet1";

/// Relationship targets from `xl/_rels/workbook.xml.rels`, resolved to full paths.
#[derive(Default, Debug)]
pub(crate) struct WorkbookRelationships {
    /// rId -> "xl/worksheets/sheet1.xml"
    pub worksheets: HashMap<String, String>,
    pub shared_strings: Option<String>,
}

/// A sheet listed in `xl/workbook.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    pub name: String,
    pub path: String,
}

/// Everything the parsers need to know before touching the worksheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkbookParts {
    pub sheet: SheetInfo,
    pub shared_strings_path: String,
}

fn resolve_target(target: &str) -> String {
    if let Some(stripped) = target.strip_prefix('/') {
        stripped.to_string()
    } else {
        format!("xl/{target}")
    }
}

pub(crate) fn parse_workbook_relationships(xml: &[u8]) -> WorkbookRelationships {
    let mut rels = WorkbookRelationships::default();
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e) | Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let id = attr_string(e, b"Id").unwrap_or_default();
                    let target = attr_string(e, b"Target").unwrap_or_default();
                    let rel_type = attr_string(e, b"Type").unwrap_or_default();
                    if target.is_empty() {
                        buf.clear();
                        continue;
                    }
                    let full_path = resolve_target(&target);
                    if rel_type.ends_with("/worksheet") && !id.is_empty() {
                        rels.worksheets.insert(id, full_path);
                    } else if rel_type.ends_with("/sharedStrings") {
                        rels.shared_strings = Some(full_path);
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    rels
}

/// Sheets in workbook order, with paths from the relationships (or the conventional default).
pub(crate) fn parse_sheet_list(xml: &[u8], rels: &WorkbookRelationships) -> Vec<SheetInfo> {
    let mut sheets = Vec::new();
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e) | Event::Start(ref e)) => {
                if e.local_name().as_ref() == b"sheet" {
                    let name = attr_string(e, b"name").unwrap_or_default();
                    let r_id = attr_string_local(e, b"id").unwrap_or_default();
                    if !name.is_empty() {
                        let path = rels.worksheets.get(&r_id).cloned().unwrap_or_else(|| {
                            format!("xl/worksheets/sheet{}.xml", sheets.len() + 1)
                        });
                        sheets.push(SheetInfo {
                            name: crate::scan::decode_entities(&name).into_owned(),
                            path,
                        });
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    sheets
}

/// Number N of an `xl/worksheets/sheetN.xml` entry name.
fn worksheet_number(name: &str) -> Option<u32> {
    name.strip_prefix("xl/worksheets/sheet")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

/// Pick the worksheet to import.
///
/// `preferred` wins when present; otherwise the first listed sheet. Without a
/// usable workbook part, the lowest-numbered `xl/worksheets/sheetN.xml` is used.
///
/// # Errors
/// `FormatError` if no worksheet can be found, or the chosen one is not in the archive.
pub fn resolve_workbook<'n>(
    workbook_xml: Option<&[u8]>,
    rels_xml: Option<&[u8]>,
    entry_names: impl IntoIterator<Item = &'n str>,
    preferred: &str,
) -> Result<WorkbookParts> {
    let entry_names: Vec<&str> = entry_names.into_iter().collect();
    let rels = rels_xml.map(parse_workbook_relationships).unwrap_or_default();
    let sheets = workbook_xml
        .map(|xml| parse_sheet_list(xml, &rels))
        .unwrap_or_default();

    let shared_strings_path = rels
        .shared_strings
        .clone()
        .unwrap_or_else(|| SHARED_STRINGS_PATH.to_string());

    let sheet = if let Some(found) = sheets.iter().find(|s| s.name == preferred) {
        found.clone()
    } else if let Some(first) = sheets.first() {
        warn!(
            "sheet \"{preferred}\" not found, using first sheet \"{}\"",
            first.name
        );
        first.clone()
    } else {
        let path = entry_names
            .iter()
            .filter_map(|name| worksheet_number(name).map(|n| (n, *name)))
            .min_by_key(|(n, _)| *n)
            .map(|(_, name)| name.to_string())
            .ok_or_else(|| ImportError::format("no worksheet found in workbook"))?;
        warn!("workbook part missing, falling back to {path}");
        SheetInfo {
            name: FALLBACK_SHEET_NAME.to_string(),
            path,
        }
    };

    if !entry_names.contains(&sheet.path.as_str()) {
        return Err(ImportError::format(format!(
            "worksheet {} for sheet \"{}\" is missing from the archive",
            sheet.path, sheet.name
        )));
    }
    debug!("worksheet: \"{}\" at {}", sheet.name, sheet.path);
    Ok(WorkbookParts {
        sheet,
        shared_strings_path,
    })
}
