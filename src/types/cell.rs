use chrono::NaiveDate;
use serde::{Serialize, Serializer};

use crate::dates::{excel_serial_to_date, format_iso};

/// A single imported cell value.
///
/// Absent cells and empty text are the same thing here (`Empty`); both paths
/// normalize to it so that their outputs compare equal.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    /// Calendar date, converted from an Excel serial in a date column.
    Date(NaiveDate),
}

impl CellValue {
    /// Text value, with the empty string collapsed to `Empty`.
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Self::Empty
        } else {
            Self::Text(s)
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric values in date columns become dates; everything else is kept.
    #[must_use]
    pub fn into_date(self) -> Self {
        match self {
            Self::Number(n) => excel_serial_to_date(n).map_or(Self::Number(n), Self::Date),
            other => other,
        }
    }

    /// String form used for pass-through text fields.
    ///
    /// Integral numbers print without a fractional part (`110520`, not `110520.0`).
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(n) => format_number(*n),
            Self::Date(d) => format_iso(*d),
        }
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Empty => serializer.serialize_str(""),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Date(d) => serializer.serialize_str(&format_iso(*d)),
        }
    }
}

/// Parse a numeric payload, falling back to its text.
fn number_or_text(value: &str) -> CellValue {
    match value.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => CellValue::Number(n),
        _ => CellValue::text(value),
    }
}

/// Turn a cell's type tag and payload into a value. Both parse paths go through here.
///
/// - `value`: decoded `<v>` text, if any
/// - `inline_text`: concatenated `<is>` runs, for `inlineStr` cells
/// - `date_column`: numbers become calendar dates via the 1900 serial rules
pub fn resolve_cell_value(
    cell_type: Option<&str>,
    value: Option<&str>,
    inline_text: Option<String>,
    shared_strings: &[String],
    date_column: bool,
) -> CellValue {
    let resolved = match cell_type {
        Some("s") => value.map_or(CellValue::Empty, |v| {
            let idx = v.trim();
            idx.parse::<usize>()
                .ok()
                .and_then(|i| shared_strings.get(i))
                .map_or_else(|| CellValue::text(idx), |s| CellValue::text(s.as_str()))
        }),
        Some("inlineStr") => match inline_text {
            Some(text) => CellValue::text(text),
            None => value.map_or(CellValue::Empty, CellValue::text),
        },
        None | Some("n") => value.map_or(CellValue::Empty, number_or_text),
        Some(_) => value.map_or(CellValue::Empty, CellValue::text),
    };
    if date_column {
        resolved.into_date()
    } else {
        resolved
    }
}
