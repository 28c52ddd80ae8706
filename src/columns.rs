//! Column names recognized by the import pipeline.
//!
//! Header cells are matched exactly after whitespace collapsing. Only kept
//! columns are materialized; everything else is recorded by name and dropped.

/// Sheet looked up first when resolving the worksheet.
pub const PREFERRED_SHEET: &str = "Cost Code Detail Report";

/// Document type value marking report footer rows.
pub const GRAND_TOTAL: &str = "Grand Total";

pub const GL_DATE: &str = "G/L Date";
pub const DIVISION_NAME: &str = "Division Name";
pub const JOB: &str = "Job";
pub const JOB_TYPE: &str = "Job Type";
pub const COST_TYPE: &str = "Cost Type";
pub const ACTUAL_AMOUNT: &str = "Actual Amount";
pub const DOCUMENT_TYPE: &str = "Document Type";

pub const DESCRIPTION: &str = "Description";
pub const VENDOR_NAME: &str = "Vendor Name";
pub const EMPLOYEE_NAME: &str = "Employee Name";
pub const REFERENCE: &str = "Reference";
pub const COMMENTS: &str = "Comments";
pub const ACTUAL_UNITS: &str = "Actual Units";

/// Columns whose absence fails validation.
pub const REQUIRED_COLUMNS: [&str; 7] = [
    GL_DATE,
    DIVISION_NAME,
    JOB,
    JOB_TYPE,
    COST_TYPE,
    ACTUAL_AMOUNT,
    DOCUMENT_TYPE,
];

/// Recognized but optional columns. `Actual Units` carries manhours for T1-T4 documents.
pub const OPTIONAL_COLUMNS: [&str; 6] = [
    DESCRIPTION,
    VENDOR_NAME,
    EMPLOYEE_NAME,
    REFERENCE,
    COMMENTS,
    ACTUAL_UNITS,
];

/// Columns whose numeric cells are Excel date serials.
pub const DATE_COLUMNS: [&str; 1] = [GL_DATE];

pub fn is_required(name: &str) -> bool {
    REQUIRED_COLUMNS.contains(&name)
}

pub fn is_optional(name: &str) -> bool {
    OPTIONAL_COLUMNS.contains(&name)
}

/// Whether a header belongs to the kept set.
pub fn is_kept(name: &str) -> bool {
    is_required(name) || is_optional(name)
}

pub fn is_date_column(name: &str) -> bool {
    DATE_COLUMNS.contains(&name)
}

/// Collapse runs of whitespace (including embedded newlines) and trim.
pub fn clean_header(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_header() {
        assert_eq!(clean_header("  G/L\n  Date "), "G/L Date");
        assert_eq!(clean_header("Actual\tAmount"), "Actual Amount");
        assert_eq!(clean_header("   "), "");
    }

    #[test]
    fn test_kept_set() {
        assert!(is_kept("Job"));
        assert!(is_kept("Actual Units"));
        assert!(!is_kept("Batch Number"));
        assert!(!is_kept("job"));
        assert!(is_date_column("G/L Date"));
        assert!(!is_date_column("Job"));
    }
}
