//! Row enrichment: columnar table in, dashboard row records out.
//!
//! Runs in batches of `enrich_batch_rows`, yielding to the host between
//! batches. Cell strings are moved out of the table, never cloned.

use log::debug;

use crate::categories::{category_for, department_label, is_allocation};
use crate::columns::{self, GRAND_TOTAL};
use crate::dates::{format_iso, parse_date_text};
use crate::error::Result;
use crate::schedule::{ImportContext, Scheduler};
use crate::types::{CellValue, ColumnarTable, ParseProgress, RowRecord};

/// Records produced from one table.
#[derive(Debug, Clone, Default)]
pub struct Enriched {
    pub records: Vec<RowRecord>,
    /// Report footer rows that were left out.
    pub grand_total_rows: usize,
}

/// Parse the longest leading decimal number of `text`, ignoring `$` and `,`.
///
/// `"$1,234.50 USD"` -> 1234.5, `"-200"` -> -200, `"n/a"` -> `None`.
pub fn parse_amount_text(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|c| !matches!(c, '$' | ',')).collect();
    let s = cleaned.trim_start();
    let bytes = s.as_bytes();

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - int_start;
    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }
    // Exponent only counts when it has digits.
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s.get(..end)?.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Amount-like cell as a number; anything unparseable is 0.
pub fn coerce_amount(value: &CellValue) -> f64 {
    match value {
        CellValue::Number(n) => *n,
        CellValue::Text(s) => parse_amount_text(s).unwrap_or(0.0),
        CellValue::Empty | CellValue::Date(_) => 0.0,
    }
}

/// `YYYY-MM-DD` for dates and recognizable date text; other text passes through.
pub fn normalize_date(value: CellValue) -> String {
    match value {
        CellValue::Date(d) => format_iso(d),
        CellValue::Text(s) => parse_date_text(&s).map_or(s, format_iso),
        number @ CellValue::Number(_) => number.to_display_string(),
        CellValue::Empty => String::new(),
    }
}

/// Leading code of a cost type: `"610 - Labor"` -> `"610"`.
pub fn cost_code(cost_type: &str) -> &str {
    match cost_type.find(" - ") {
        Some(end) if end > 0 => cost_type.get(..end).unwrap_or(cost_type).trim(),
        _ => cost_type.trim(),
    }
}

/// Leading integer of `text`, in canonical form (`" 0042x"` -> `"42"`).
fn leading_integer(text: &str) -> Option<String> {
    let s = text.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, s.get(1..)?),
        Some(b'+') => (false, s.get(1..)?),
        _ => (false, s),
    };
    let digit_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digit_len == 0 {
        return None;
    }
    let digits = rest.get(..digit_len)?.trim_start_matches('0');
    Some(match (digits.is_empty(), negative) {
        (true, _) => "0".to_string(),
        (false, true) => format!("-{digits}"),
        (false, false) => digits.to_string(),
    })
}

/// Department code: the last three characters of the job number.
///
/// Numeric jobs are floored; text jobs use their leading integer.
pub fn department_code(job: &CellValue) -> Option<String> {
    let number = match job {
        // `+ 0.0` turns -0 into 0
        CellValue::Number(n) => format!("{:.0}", n.floor() + 0.0),
        CellValue::Text(s) => leading_integer(s)?,
        CellValue::Empty | CellValue::Date(_) => return None,
    };
    let start = number.char_indices().rev().nth(2).map_or(0, |(i, _)| i);
    number.get(start..).map(ToString::to_string)
}

fn into_text(value: CellValue) -> String {
    match value {
        CellValue::Text(s) => s,
        other => other.to_display_string(),
    }
}

/// Drains one column front to back.
struct ColumnCursor(Option<std::vec::IntoIter<CellValue>>);

impl ColumnCursor {
    fn take(table: &mut ColumnarTable, name: &str) -> Self {
        Self(table.columns.remove(name).map(Vec::into_iter))
    }

    fn next_value(&mut self) -> CellValue {
        self.0.as_mut().and_then(Iterator::next).unwrap_or_default()
    }
}

struct RawRow {
    gl_date: CellValue,
    division_name: CellValue,
    job: CellValue,
    job_type: CellValue,
    cost_type: CellValue,
    actual_amount: CellValue,
    actual_units: CellValue,
    document_type: CellValue,
    description: CellValue,
    vendor_name: CellValue,
    employee_name: CellValue,
    reference: CellValue,
    comments: CellValue,
}

struct RowCursors {
    gl_date: ColumnCursor,
    division_name: ColumnCursor,
    job: ColumnCursor,
    job_type: ColumnCursor,
    cost_type: ColumnCursor,
    actual_amount: ColumnCursor,
    actual_units: ColumnCursor,
    document_type: ColumnCursor,
    description: ColumnCursor,
    vendor_name: ColumnCursor,
    employee_name: ColumnCursor,
    reference: ColumnCursor,
    comments: ColumnCursor,
}

impl RowCursors {
    fn new(table: &mut ColumnarTable) -> Self {
        Self {
            gl_date: ColumnCursor::take(table, columns::GL_DATE),
            division_name: ColumnCursor::take(table, columns::DIVISION_NAME),
            job: ColumnCursor::take(table, columns::JOB),
            job_type: ColumnCursor::take(table, columns::JOB_TYPE),
            cost_type: ColumnCursor::take(table, columns::COST_TYPE),
            actual_amount: ColumnCursor::take(table, columns::ACTUAL_AMOUNT),
            actual_units: ColumnCursor::take(table, columns::ACTUAL_UNITS),
            document_type: ColumnCursor::take(table, columns::DOCUMENT_TYPE),
            description: ColumnCursor::take(table, columns::DESCRIPTION),
            vendor_name: ColumnCursor::take(table, columns::VENDOR_NAME),
            employee_name: ColumnCursor::take(table, columns::EMPLOYEE_NAME),
            reference: ColumnCursor::take(table, columns::REFERENCE),
            comments: ColumnCursor::take(table, columns::COMMENTS),
        }
    }

    /// Every cursor advances on every row, kept or not.
    fn next_row(&mut self) -> RawRow {
        RawRow {
            gl_date: self.gl_date.next_value(),
            division_name: self.division_name.next_value(),
            job: self.job.next_value(),
            job_type: self.job_type.next_value(),
            cost_type: self.cost_type.next_value(),
            actual_amount: self.actual_amount.next_value(),
            actual_units: self.actual_units.next_value(),
            document_type: self.document_type.next_value(),
            description: self.description.next_value(),
            vendor_name: self.vendor_name.next_value(),
            employee_name: self.employee_name.next_value(),
            reference: self.reference.next_value(),
            comments: self.comments.next_value(),
        }
    }
}

/// Build the record for one row, or `None` for a Grand Total footer.
fn enrich_row(raw: RawRow) -> Option<RowRecord> {
    if raw.document_type.as_str() == Some(GRAND_TOTAL) {
        return None;
    }

    let cost_type = into_text(raw.cost_type);
    let code = cost_code(&cost_type);
    let category = category_for(code);
    let allocation = is_allocation(code);
    let (department, dept_category) = department_label(department_code(&raw.job).as_deref());

    Some(RowRecord {
        gl_date: normalize_date(raw.gl_date),
        division_name: into_text(raw.division_name),
        actual_amount: coerce_amount(&raw.actual_amount),
        actual_units: coerce_amount(&raw.actual_units),
        job: raw.job,
        job_type: into_text(raw.job_type),
        document_type: into_text(raw.document_type),
        description: into_text(raw.description),
        vendor_name: into_text(raw.vendor_name),
        employee_name: into_text(raw.employee_name),
        reference: into_text(raw.reference),
        comments: into_text(raw.comments),
        category,
        is_allocation: allocation,
        department,
        dept_category,
        cost_type,
    })
}

/// Turn a parsed table into row records, dropping Grand Total rows.
///
/// # Errors
/// `ImportError::Cancelled` if the context is cancelled between batches.
pub async fn enrich_table<Y: Scheduler>(
    mut table: ColumnarTable,
    ctx: &mut ImportContext<'_, Y>,
) -> Result<Enriched> {
    let total = table.row_count;
    let batch = ctx.config.enrich_batch_rows;
    let mut cursors = RowCursors::new(&mut table);
    drop(table);

    let mut out = Enriched {
        records: Vec::with_capacity(total),
        grand_total_rows: 0,
    };
    let mut done = 0;
    while done < total {
        let batch_end = done.saturating_add(batch).min(total);
        for _ in done..batch_end {
            match enrich_row(cursors.next_row()) {
                Some(record) => out.records.push(record),
                None => out.grand_total_rows += 1,
            }
        }
        done = batch_end;

        let progress = ParseProgress::fraction("", done, total);
        let pct = progress.percent.unwrap_or(100);
        ctx.report(ParseProgress::new(format!("Processing rows ({pct}%)..."), Some(pct)));
        if done < total {
            ctx.checkpoint().await?;
        }
    }

    debug!(
        "enriched {} rows ({} grand total rows dropped)",
        out.records.len(),
        out.grand_total_rows
    );
    Ok(out)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp
)]
mod tests {
    use super::*;
    use crate::config::ImportConfig;
    use crate::schedule::NoopScheduler;
    use chrono::NaiveDate;
    use test_case::test_case;

    #[test_case("$1,234.50", Some(1234.5))]
    #[test_case("-200", Some(-200.0))]
    #[test_case("  42 units", Some(42.0))]
    #[test_case(".5", Some(0.5))]
    #[test_case("7.", Some(7.0))]
    #[test_case("1e3x", Some(1000.0))]
    #[test_case("2e", Some(2.0))]
    #[test_case("n/a", None)]
    #[test_case("-", None)]
    #[test_case("", None)]
    fn test_parse_amount_text(input: &str, expected: Option<f64>) {
        assert_eq!(parse_amount_text(input), expected);
    }

    #[test]
    fn test_coerce_amount() {
        assert_eq!(coerce_amount(&CellValue::Number(12.5)), 12.5);
        assert_eq!(coerce_amount(&CellValue::Text("abc".into())), 0.0);
        assert_eq!(coerce_amount(&CellValue::Empty), 0.0);
    }

    #[test]
    fn test_normalize_date() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(normalize_date(CellValue::Date(d)), "2024-01-15");
        assert_eq!(normalize_date(CellValue::Text("01/16/2024".into())), "2024-01-16");
        assert_eq!(normalize_date(CellValue::Text("soon".into())), "soon");
        assert_eq!(normalize_date(CellValue::Empty), "");
    }

    #[test_case("610 - Labor", "610")]
    #[test_case(" 6930 - Alloc - Credit", "6930")]
    #[test_case("710", "710")]
    #[test_case(" - odd", "- odd")]
    fn test_cost_code(input: &str, expected: &str) {
        assert_eq!(cost_code(input), expected);
    }

    #[test]
    fn test_department_code() {
        assert_eq!(department_code(&CellValue::Number(110_520.0)).as_deref(), Some("520"));
        assert_eq!(department_code(&CellValue::Number(110_760.9)).as_deref(), Some("760"));
        assert_eq!(department_code(&CellValue::Text("110520-A".into())).as_deref(), Some("520"));
        assert_eq!(department_code(&CellValue::Text("0042".into())).as_deref(), Some("42"));
        assert_eq!(department_code(&CellValue::Text("-5".into())).as_deref(), Some("-5"));
        assert_eq!(department_code(&CellValue::Text("Overhead".into())), None);
        assert_eq!(department_code(&CellValue::Empty), None);
    }

    fn table(rows: &[(&str, f64, &str, &str)]) -> ColumnarTable {
        let mut t = ColumnarTable::new("Cost Code Detail Report");
        let mut push = |name: &str, values: Vec<CellValue>| {
            t.columns.insert(name.to_string(), values);
            t.all_columns.push(name.to_string());
        };
        push(
            columns::COST_TYPE,
            rows.iter().map(|r| CellValue::text(r.0)).collect(),
        );
        push(
            columns::JOB,
            rows.iter().map(|r| CellValue::Number(r.1)).collect(),
        );
        push(
            columns::ACTUAL_AMOUNT,
            rows.iter().map(|r| CellValue::text(r.2)).collect(),
        );
        push(
            columns::DOCUMENT_TYPE,
            rows.iter().map(|r| CellValue::text(r.3)).collect(),
        );
        t.row_count = rows.len();
        t
    }

    #[tokio::test]
    async fn test_enrich_table_drops_grand_total() {
        let t = table(&[
            ("610 - Labor", 110_520.0, "1,000.50", "JE"),
            ("693 - Alloc", 110_760.0, "-$200", "AP"),
            ("", 0.0, "800.50", GRAND_TOTAL),
        ]);
        let mut ctx = ImportContext::new(ImportConfig::default(), NoopScheduler);
        let out = enrich_table(t, &mut ctx).await.unwrap();

        assert_eq!(out.records.len(), 2);
        assert_eq!(out.grand_total_rows, 1);
        let first = &out.records[0];
        assert_eq!(first.category, "Labor Costs");
        assert_eq!(first.department, "520 - Ops Proj Mgmt");
        assert_eq!(first.actual_amount, 1000.5);
        assert!(!first.is_allocation);
        let second = &out.records[1];
        assert_eq!(second.category, "Allocation Credits");
        assert!(second.is_allocation);
        assert_eq!(second.dept_category, "Tools");
        assert_eq!(second.actual_amount, -200.0);
        // absent optional columns read as empty
        assert_eq!(second.description, "");
        assert_eq!(second.actual_units, 0.0);
    }

    #[tokio::test]
    async fn test_enrich_reports_each_batch() {
        let rows: Vec<_> = (0..5).map(|_| ("610", 1.0, "1", "JE")).collect();
        let config = ImportConfig {
            enrich_batch_rows: 2,
            ..ImportConfig::default()
        };
        let mut seen = Vec::new();
        let mut sink = |p: &ParseProgress| seen.push(p.message.clone());
        let mut ctx = ImportContext::new(config, NoopScheduler).with_progress(&mut sink);
        let out = enrich_table(table(&rows), &mut ctx).await.unwrap();
        drop(ctx);
        assert_eq!(out.records.len(), 5);
        assert_eq!(
            seen,
            vec![
                "Processing rows (40%)...",
                "Processing rows (80%)...",
                "Processing rows (100%)..."
            ]
        );
    }
}
