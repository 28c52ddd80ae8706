//! Cost-code categories and the department table.
//!
//! Cost codes are the leading token of `Cost Type` (`"610 - Labor"` -> `610`).
//! Departments are the last three digits of the job number.

/// Cost-code prefix of allocation credit rows.
pub const ALLOCATION_PREFIX: &str = "693";

/// Category used when nothing else matches.
pub const OTHER: &str = "Other";

/// Checked in order, so `693` must come before `69`.
const CATEGORY_PREFIXES: [(&str, &str); 12] = [
    ("61", "Labor Costs"),
    ("62", "Travel & Per Diem"),
    ("64", "Fleet & Materials"),
    ("65", "Facilities & Services"),
    ("67", "Equipment Costs"),
    (ALLOCATION_PREFIX, "Allocation Credits"),
    ("69", "Other Allocations"),
    ("71", "Corporate Overhead"),
    ("72", "Corporate Overhead"),
    ("73", "G&A & Other"),
    ("74", "G&A & Other"),
    ("75", "G&A & Other"),
];

/// A department: three-digit code, short name, reporting category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Department {
    pub code: &'static str,
    pub name: &'static str,
    pub category: &'static str,
}

const fn dept(code: &'static str, name: &'static str, category: &'static str) -> Department {
    Department {
        code,
        name,
        category,
    }
}

pub static DEPARTMENTS: [Department; 30] = [
    dept("110", "Exec", "G&A"),
    dept("130", "Bus Dev", "G&A"),
    dept("140", "Admin", "G&A"),
    dept("150", "Acct", "G&A"),
    dept("165", "Treasury", "G&A"),
    dept("170", "HR Payroll", "G&A"),
    dept("180", "IT", "G&A"),
    dept("190", "Risk Mgmt", "G&A"),
    dept("210", "Intl Ops", "G&A"),
    dept("230", "Safety Mgmt", "G&A"),
    dept("250", "Estimating", "G&A"),
    dept("260", "Proposals", "G&A"),
    dept("520", "Ops Proj Mgmt", "Ops Support"),
    dept("530", "Ops Proj Cont", "Ops Support"),
    dept("540", "Ops Proc Subs", "Ops Support"),
    dept("550", "Ops Eng", "Ops Support"),
    dept("560", "NonBillable", "Ops Support"),
    dept("590", "Field Ops", OTHER),
    dept("710", "Eqp Gen", "Equipment"),
    dept("711", "Fuel", "Equipment"),
    dept("720", "Eqp Mech", "Equipment"),
    dept("730", "Eqp Haul", "Equipment"),
    dept("740", "Aviation Fixed Wing", "Equipment"),
    dept("750", "Aviation Rotary Wing", "Equipment"),
    dept("760", "Small Tools", "Tools"),
    dept("770", "Warehouse", OTHER),
    dept("810", "Safety Gen", "Safety"),
    dept("820", "Safety Train", "Safety"),
    dept("850", "Comm IT Cell", OTHER),
    dept("860", "Facilities", OTHER),
];

/// Cost category for a cost code.
pub fn category_for(code: &str) -> &'static str {
    CATEGORY_PREFIXES
        .iter()
        .find(|(prefix, _)| code.starts_with(prefix))
        .map_or(OTHER, |&(_, category)| category)
}

pub fn is_allocation(code: &str) -> bool {
    code.starts_with(ALLOCATION_PREFIX)
}

pub fn department(code: &str) -> Option<&'static Department> {
    DEPARTMENTS.iter().find(|d| d.code == code)
}

/// Department label and category for an extracted department code.
///
/// `"520 - Ops Proj Mgmt"` for known codes, `"Unknown (999)"` for unknown
/// ones and `"Unknown"` when the job yielded no code at all.
pub fn department_label(code: Option<&str>) -> (String, &'static str) {
    match code {
        None | Some("") => ("Unknown".to_string(), OTHER),
        Some(code) => match department(code) {
            Some(d) => (format!("{} - {}", d.code, d.name), d.category),
            None => (format!("Unknown ({code})"), OTHER),
        },
    }
}
