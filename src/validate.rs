//! Table validation.
//!
//! Required columns and a non-empty sheet are hard requirements. Dates and
//! amounts are only checked on a leading sample and reported as estimated
//! warnings, so validation stays cheap on very large sheets.

use log::warn;

use crate::columns::{self, OPTIONAL_COLUMNS, REQUIRED_COLUMNS};
use crate::config::ImportConfig;
use crate::dates::parse_date_text;
use crate::enrich::parse_amount_text;
use crate::types::{CellValue, ColumnReport, ColumnarTable, ValidationResult};

/// Group digits in thousands: `186000` -> `"186,000"`.
fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn is_invalid_date(value: &CellValue) -> bool {
    match value {
        CellValue::Empty | CellValue::Date(_) => false,
        CellValue::Text(s) => parse_date_text(s).is_none(),
        // Numbers left in a date column were out of the serial range.
        CellValue::Number(_) => true,
    }
}

fn is_invalid_amount(value: &CellValue) -> bool {
    match value {
        CellValue::Empty | CellValue::Number(_) => false,
        CellValue::Text(s) => parse_amount_text(s).is_none(),
        CellValue::Date(_) => true,
    }
}

/// `invalid` of `sample` scaled up to `total` rows, rounded.
fn extrapolate(invalid: usize, sample: usize, total: usize) -> usize {
    if sample == 0 {
        return 0;
    }
    let scaled = invalid.saturating_mul(total);
    (scaled + sample / 2) / sample
}

fn column_report(found: &[String]) -> ColumnReport {
    let mut report = ColumnReport::default();
    for col in REQUIRED_COLUMNS {
        if found.iter().any(|f| f == col) {
            report.required.push(col.to_string());
        } else {
            report.missing.push(col.to_string());
        }
    }
    for col in OPTIONAL_COLUMNS {
        if found.iter().any(|f| f == col) {
            report.optional.push(col.to_string());
        }
    }
    report.unknown = found
        .iter()
        .filter(|name| !columns::is_kept(name))
        .cloned()
        .collect();
    report
}

/// Check a parsed table before it is committed.
pub fn validate(table: &ColumnarTable, config: &ImportConfig) -> ValidationResult {
    let mut result = ValidationResult {
        valid: true,
        row_count: table.row_count,
        sheet_name: table.sheet_name.clone(),
        ..ValidationResult::default()
    };

    if table.row_count == 0 {
        result.valid = false;
        result.errors.push("No data found in the file".to_string());
        return result;
    }

    result.columns = column_report(&table.all_columns);
    for missing in &result.columns.missing {
        result.valid = false;
        result
            .errors
            .push(format!("Missing required column: {missing}"));
    }

    if table.sheet_name != config.preferred_sheet {
        result.warnings.push(format!(
            "Sheet \"{}\" used instead of \"{}\"",
            table.sheet_name, config.preferred_sheet
        ));
    }

    let sample = config.validation_sample_rows.min(table.row_count);
    if let (Some(dates), Some(amounts)) = (
        table.column(columns::GL_DATE),
        table.column(columns::ACTUAL_AMOUNT),
    ) {
        let invalid_dates = dates.iter().take(sample).filter(|v| is_invalid_date(v)).count();
        let invalid_amounts = amounts
            .iter()
            .take(sample)
            .filter(|v| is_invalid_amount(v))
            .count();

        if invalid_dates > 0 {
            let estimated = extrapolate(invalid_dates, sample, table.row_count);
            result.warnings.push(format!(
                "~{} rows may have invalid dates (sampled {sample})",
                group_thousands(estimated)
            ));
        }
        if invalid_amounts > 0 {
            let estimated = extrapolate(invalid_amounts, sample, table.row_count);
            result.warnings.push(format!(
                "~{} rows may have non-numeric amounts (sampled {sample})",
                group_thousands(estimated)
            ));
        }
    }

    if !result.columns.unknown.is_empty() {
        result.warnings.push(format!(
            "{} unrecognized columns will be ignored",
            result.columns.unknown.len()
        ));
    }

    if table.row_count > config.large_dataset_rows {
        result.warnings.push(format!(
            "Large dataset: {} rows may take a while to process",
            group_thousands(table.row_count)
        ));
    }

    for warning in &result.warnings {
        warn!("{warning}");
    }
    result
}
