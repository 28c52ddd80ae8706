//! Test fixtures for generating cost report workbooks in memory.
//!
//! # Example
//!
//! ```rust,ignore
//! use fixtures::{SheetBuilder, XlsxBuilder, REPORT_HEADERS};
//!
//! let xlsx = XlsxBuilder::new()
//!     .sheet(
//!         SheetBuilder::new("Cost Code Detail Report")
//!             .row(REPORT_HEADERS)
//!             .row(vec![45306.into(), "Ops".into(), 110520.into()]),
//!     )
//!     .stored()
//!     .build();
//! ```
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_lossless
)]

use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::ZipWriter;

/// The seven required headers, in report order.
pub const REPORT_HEADERS: [&str; 7] = [
    "G/L Date",
    "Division Name",
    "Job",
    "Job Type",
    "Cost Type",
    "Actual Amount",
    "Document Type",
];

// ============================================================================
// Cell Value
// ============================================================================

/// A cell value as written into the worksheet XML.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Text; shared or inline depending on the builder's string mode.
    Text(String),
    /// A numeric value (`<v>` without a type).
    Number(f64),
    /// Formula string result (`t="str"`).
    FormulaText(String),
    /// Boolean (`t="b"`).
    Boolean(bool),
    /// A self-closing cell with no value.
    Blank,
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

impl From<i32> for Cell {
    fn from(n: i32) -> Self {
        Cell::Number(f64::from(n))
    }
}

impl From<bool> for Cell {
    fn from(b: bool) -> Self {
        Cell::Boolean(b)
    }
}

/// Column letters for a 0-based index.
pub fn column_letters(index: usize) -> String {
    xlingest::cell_ref::column_letters(u32::try_from(index).unwrap())
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ============================================================================
// Sheet Builder
// ============================================================================

#[derive(Debug, Clone)]
struct RowEntry {
    number: u32,
    /// (0-based column, value)
    cells: Vec<(usize, Cell)>,
}

/// Builder for one worksheet.
#[derive(Debug, Clone)]
pub struct SheetBuilder {
    name: String,
    rows: Vec<RowEntry>,
    dimension: Option<Option<String>>,
    omit_cell_refs: bool,
    omit_row_numbers: bool,
    padding_cols: usize,
    /// Namespace prefix on every worksheet element ("x" -> `<x:row>`).
    prefix: Option<String>,
}

impl SheetBuilder {
    /// Create a new sheet builder.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rows: Vec::new(),
            dimension: None,
            omit_cell_refs: false,
            omit_row_numbers: false,
            padding_cols: 0,
            prefix: None,
        }
    }

    fn next_row_number(&self) -> u32 {
        self.rows.last().map_or(1, |r| r.number + 1)
    }

    /// Append a row of consecutive cells starting at column A.
    #[must_use]
    pub fn row<C: Into<Cell>>(mut self, cells: impl IntoIterator<Item = C>) -> Self {
        let number = self.next_row_number();
        let cells = cells.into_iter().map(Into::into).enumerate().collect();
        self.rows.push(RowEntry { number, cells });
        self
    }

    /// Append a row at an explicit row number with cells at explicit columns.
    #[must_use]
    pub fn sparse_row(mut self, number: u32, cells: Vec<(usize, Cell)>) -> Self {
        self.rows.push(RowEntry { number, cells });
        self
    }

    /// Override the `<dimension>` tag; `None` leaves it out.
    #[must_use]
    pub fn dimension(mut self, reference: Option<&str>) -> Self {
        self.dimension = Some(reference.map(ToString::to_string));
        self
    }

    /// Write cells without `r` attributes.
    #[must_use]
    pub fn without_cell_refs(mut self) -> Self {
        self.omit_cell_refs = true;
        self
    }

    /// Write rows without `r` attributes.
    #[must_use]
    pub fn without_row_numbers(mut self) -> Self {
        self.omit_row_numbers = true;
        self
    }

    /// Add `count` `<col>` definitions before `<sheetData>`.
    #[must_use]
    pub fn padding_cols(mut self, count: usize) -> Self {
        self.padding_cols = count;
        self
    }

    /// Write every worksheet element with a namespace prefix, as some SDK writers do.
    #[must_use]
    pub fn namespace_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    fn texts(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .flat_map(|r| r.cells.iter())
            .filter_map(|(_, cell)| match cell {
                Cell::Text(s) => Some(s.as_str()),
                _ => None,
            })
    }

    fn auto_dimension(&self) -> Option<String> {
        let last_row = self.rows.iter().map(|r| r.number).max()?;
        let last_col = self
            .rows
            .iter()
            .flat_map(|r| r.cells.iter().map(|(c, _)| *c))
            .max()?;
        Some(format!("A1:{}{}", column_letters(last_col), last_row))
    }

    fn to_xml(&self, strings: &SharedStrings, mode: StringMode) -> String {
        let p = self.prefix.as_ref().map_or(String::new(), |p| format!("{p}:"));
        let xmlns = match &self.prefix {
            Some(prefix) => format!("xmlns:{prefix}"),
            None => "xmlns".to_string(),
        };
        let mut xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<{p}worksheet {xmlns}="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
        );
        let dimension = self.dimension.clone().unwrap_or_else(|| self.auto_dimension());
        if let Some(reference) = dimension {
            xml.push_str(&format!(r#"<{p}dimension ref="{reference}"/>"#));
        }
        xml.push_str(&format!(
            r#"<{p}sheetViews><{p}sheetView workbookViewId="0"/></{p}sheetViews>"#
        ));
        xml.push_str(&format!(r#"<{p}sheetFormatPr defaultRowHeight="15"/>"#));
        if self.padding_cols > 0 {
            xml.push_str(&format!("<{p}cols>"));
            for i in 1..=self.padding_cols {
                xml.push_str(&format!(
                    r#"<{p}col min="{i}" max="{i}" width="12.7109375" customWidth="1"/>"#
                ));
            }
            xml.push_str(&format!("</{p}cols>"));
        }

        if self.rows.is_empty() {
            xml.push_str(&format!("<{p}sheetData/>"));
        } else {
            xml.push_str(&format!("<{p}sheetData>"));
            for row in &self.rows {
                if self.omit_row_numbers {
                    xml.push_str(&format!("<{p}row>"));
                } else {
                    xml.push_str(&format!(r#"<{p}row r="{}">"#, row.number));
                }
                for (col, cell) in &row.cells {
                    let reference = if self.omit_cell_refs {
                        String::new()
                    } else {
                        format!(r#" r="{}{}""#, column_letters(*col), row.number)
                    };
                    xml.push_str(&cell_xml(&p, &reference, cell, strings, mode));
                }
                xml.push_str(&format!("</{p}row>"));
            }
            xml.push_str(&format!("</{p}sheetData>"));
        }
        xml.push_str(&format!(
            r#"<{p}pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></{p}worksheet>"#,
        ));
        xml
    }
}

fn cell_xml(
    p: &str,
    reference: &str,
    cell: &Cell,
    strings: &SharedStrings,
    mode: StringMode,
) -> String {
    match cell {
        Cell::Text(s) => match mode {
            StringMode::Shared => {
                format!(r#"<{p}c{reference} t="s"><{p}v>{}</{p}v></{p}c>"#, strings.index_of(s))
            }
            StringMode::Inline => format!(
                r#"<{p}c{reference} t="inlineStr"><{p}is><{p}t xml:space="preserve">{}</{p}t></{p}is></{p}c>"#,
                escape(s)
            ),
        },
        Cell::Number(n) => format!("<{p}c{reference}><{p}v>{n}</{p}v></{p}c>"),
        Cell::FormulaText(s) => format!(
            r#"<{p}c{reference} t="str"><{p}f>A1</{p}f><{p}v>{}</{p}v></{p}c>"#,
            escape(s)
        ),
        Cell::Boolean(b) => format!(
            r#"<{p}c{reference} t="b"><{p}v>{}</{p}v></{p}c>"#,
            u8::from(*b)
        ),
        Cell::Blank => format!(r#"<{p}c{reference} s="1"/>"#),
    }
}

// ============================================================================
// Shared Strings
// ============================================================================

#[derive(Debug, Default)]
struct SharedStrings {
    values: Vec<String>,
}

impl SharedStrings {
    fn add(&mut self, s: &str) {
        if !self.values.iter().any(|v| v == s) {
            self.values.push(s.to_string());
        }
    }

    fn index_of(&self, s: &str) -> usize {
        self.values.iter().position(|v| v == s).unwrap()
    }

    fn to_xml(&self) -> String {
        let mut xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">"#,
            self.values.len()
        );
        for value in &self.values {
            if value.is_empty() {
                xml.push_str("<si/>");
            } else {
                xml.push_str(&format!(
                    r#"<si><t xml:space="preserve">{}</t></si>"#,
                    escape(value)
                ));
            }
        }
        xml.push_str("</sst>");
        xml
    }
}

// ============================================================================
// XLSX Builder
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringMode {
    #[default]
    Shared,
    Inline,
}

/// Builder for creating complete XLSX files.
#[derive(Debug, Default)]
pub struct XlsxBuilder {
    sheets: Vec<SheetBuilder>,
    stored: bool,
    strings: StringMode,
    omit_workbook: bool,
}

impl XlsxBuilder {
    /// Create a new XLSX builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sheet(mut self, sheet: SheetBuilder) -> Self {
        self.sheets.push(sheet);
        self
    }

    /// Write entries without compression.
    #[must_use]
    pub fn stored(mut self) -> Self {
        self.stored = true;
        self
    }

    #[must_use]
    pub fn strings(mut self, mode: StringMode) -> Self {
        self.strings = mode;
        self
    }

    /// Leave out `xl/workbook.xml` and its relationships.
    #[must_use]
    pub fn without_workbook(mut self) -> Self {
        self.omit_workbook = true;
        self
    }

    /// Build the XLSX file as bytes.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let method = if self.stored {
            zip::CompressionMethod::Stored
        } else {
            zip::CompressionMethod::Deflated
        };
        let options = FileOptions::default().compression_method(method);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        let mut strings = SharedStrings::default();
        if self.strings == StringMode::Shared {
            for sheet in &self.sheets {
                for text in sheet.texts() {
                    strings.add(text);
                }
            }
        }
        let with_sst = self.strings == StringMode::Shared && !strings.values.is_empty();

        zip.start_file("[Content_Types].xml", options).unwrap();
        zip.write_all(content_types(self.sheets.len()).as_bytes())
            .unwrap();
        zip.start_file("_rels/.rels", options).unwrap();
        zip.write_all(ROOT_RELS.as_bytes()).unwrap();

        if !self.omit_workbook {
            zip.start_file("xl/workbook.xml", options).unwrap();
            zip.write_all(workbook(&self.sheets).as_bytes()).unwrap();
            zip.start_file("xl/_rels/workbook.xml.rels", options)
                .unwrap();
            zip.write_all(workbook_rels(self.sheets.len(), with_sst).as_bytes())
                .unwrap();
        }

        for (i, sheet) in self.sheets.iter().enumerate() {
            zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), options)
                .unwrap();
            zip.write_all(sheet.to_xml(&strings, self.strings).as_bytes())
                .unwrap();
        }

        if with_sst {
            zip.start_file("xl/sharedStrings.xml", options).unwrap();
            zip.write_all(strings.to_xml().as_bytes()).unwrap();
        }

        zip.finish().unwrap().into_inner()
    }
}

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#;

fn content_types(sheet_count: usize) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    for i in 1..=sheet_count {
        xml.push_str(&format!(
            r#"
  <Override PartName="/xl/worksheets/sheet{i}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
        ));
    }
    xml.push_str("\n</Types>");
    xml
}

fn workbook(sheets: &[SheetBuilder]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>"#,
    );
    for (i, sheet) in sheets.iter().enumerate() {
        xml.push_str(&format!(
            r#"
    <sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape(&sheet.name),
            i + 1,
            i + 1
        ));
    }
    xml.push_str("\n  </sheets>\n</workbook>");
    xml
}

fn workbook_rels(sheet_count: usize, with_sst: bool) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for i in 1..=sheet_count {
        xml.push_str(&format!(
            r#"
  <Relationship Id="rId{i}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{i}.xml"/>"#
        ));
    }
    if with_sst {
        xml.push_str(&format!(
            r#"
  <Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#,
            sheet_count + 1
        ));
    }
    xml.push_str("\n</Relationships>");
    xml
}

// ============================================================================
// Cost report helpers
// ============================================================================

/// One data row of a report with the seven required columns.
#[derive(Debug, Clone)]
pub struct ReportRow {
    pub gl_date: Cell,
    pub division: Cell,
    pub job: Cell,
    pub job_type: Cell,
    pub cost_type: Cell,
    pub amount: Cell,
    pub document_type: Cell,
}

impl ReportRow {
    pub fn new(
        gl_date: impl Into<Cell>,
        division: &str,
        job: impl Into<Cell>,
        job_type: &str,
        cost_type: &str,
        amount: impl Into<Cell>,
        document_type: &str,
    ) -> Self {
        Self {
            gl_date: gl_date.into(),
            division: division.into(),
            job: job.into(),
            job_type: job_type.into(),
            cost_type: cost_type.into(),
            amount: amount.into(),
            document_type: document_type.into(),
        }
    }

    fn cells(&self) -> Vec<Cell> {
        vec![
            self.gl_date.clone(),
            self.division.clone(),
            self.job.clone(),
            self.job_type.clone(),
            self.cost_type.clone(),
            self.amount.clone(),
            self.document_type.clone(),
        ]
    }
}

/// A "Cost Code Detail Report" sheet with the required headers and `rows`.
pub fn report_sheet(rows: &[ReportRow]) -> SheetBuilder {
    named_report_sheet("Cost Code Detail Report", rows)
}

/// Same as [`report_sheet`] under another sheet name.
pub fn named_report_sheet(name: &str, rows: &[ReportRow]) -> SheetBuilder {
    rows.iter().fold(
        SheetBuilder::new(name).row(REPORT_HEADERS),
        |sheet, row| sheet.row(row.cells()),
    )
}

/// A generated report of `count` rows with varied but deterministic values.
pub fn generated_rows(count: usize) -> Vec<ReportRow> {
    const COST_TYPES: [&str; 6] = [
        "610 - Labor",
        "620 - Per Diem",
        "640 - Materials",
        "693 - Allocation Credit",
        "710 - Overhead",
        "750 - Other",
    ];
    const DOC_TYPES: [&str; 3] = ["JE", "AP", "T1"];
    (0..count)
        .map(|i| {
            let job_suffix = [520, 760, 110, 999][i % 4];
            ReportRow::new(
                45_292 + (i % 365) as i32,
                ["Ops", "Aviation", "Corporate"][i % 3],
                110_000 + job_suffix,
                if i % 2 == 0 { "GA" } else { "Project" },
                COST_TYPES[i % COST_TYPES.len()],
                (i as f64) * 1.25 - 100.0,
                DOC_TYPES[i % DOC_TYPES.len()],
            )
        })
        .collect()
}
