use serde::Serialize;

use super::CellValue;

/// One enriched transaction, keyed the way the dashboard reads it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowRecord {
    /// `YYYY-MM-DD`, or the original text when it is not a recognizable date.
    #[serde(rename = "G/L Date")]
    pub gl_date: String,
    #[serde(rename = "Division Name")]
    pub division_name: String,
    /// Kept as read: job numbers stay numeric.
    #[serde(rename = "Job")]
    pub job: CellValue,
    #[serde(rename = "Job Type")]
    pub job_type: String,
    #[serde(rename = "Cost Type")]
    pub cost_type: String,
    #[serde(rename = "Actual Amount")]
    pub actual_amount: f64,
    /// Manhours for T1-T4 documents, 0 elsewhere.
    #[serde(rename = "Actual Units")]
    pub actual_units: f64,
    #[serde(rename = "Document Type")]
    pub document_type: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Vendor Name")]
    pub vendor_name: String,
    #[serde(rename = "Employee Name")]
    pub employee_name: String,
    #[serde(rename = "Reference")]
    pub reference: String,
    #[serde(rename = "Comments")]
    pub comments: String,
    #[serde(rename = "Category")]
    pub category: &'static str,
    #[serde(rename = "Is_Allocation")]
    pub is_allocation: bool,
    #[serde(rename = "Department")]
    pub department: String,
    #[serde(rename = "Dept_Category")]
    pub dept_category: &'static str,
}
