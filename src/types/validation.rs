use serde::Serialize;

/// How the sheet's headers line up with the recognized column sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnReport {
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub unknown: Vec<String>,
    pub missing: Vec<String>,
}

/// Outcome of validating a parsed table. Errors block the import; warnings don't.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub columns: ColumnReport,
    pub row_count: usize,
    pub sheet_name: String,
}
