use std::collections::BTreeMap;

use serde::Serialize;

use super::CellValue;

/// Column-oriented parse output shared by both parser paths.
///
/// Every column in `columns` holds exactly `row_count` values, positionally
/// aligned: index `i` of every column comes from the same worksheet row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnarTable {
    /// Kept columns by header name.
    pub columns: BTreeMap<String, Vec<CellValue>>,
    pub row_count: usize,
    /// Every header encountered, in sheet order, kept or not.
    pub all_columns: Vec<String>,
    /// Name of the worksheet the data came from.
    pub sheet_name: String,
}

impl ColumnarTable {
    #[must_use]
    pub fn new(sheet_name: impl Into<String>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[CellValue]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Value at `row` in `name`; `Empty` when either is out of range.
    #[must_use]
    pub fn value(&self, name: &str, row: usize) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.columns
            .get(name)
            .and_then(|col| col.get(row))
            .unwrap_or(&EMPTY)
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Whether all kept columns are exactly `row_count` long.
    #[must_use]
    pub fn is_aligned(&self) -> bool {
        self.columns.values().all(|col| col.len() == self.row_count)
    }
}

/// Incremental writer that keeps a [`ColumnarTable`] aligned while rows are appended.
///
/// Kept columns are addressed by worksheet column index; a row's missing cells
/// are padded with `Empty` when the row is finished.
#[derive(Debug)]
pub(crate) struct TableBuilder {
    table: ColumnarTable,
    /// (column index, header name, date column) per kept column.
    slots: Vec<(u32, String, bool)>,
}

impl TableBuilder {
    pub(crate) fn new(sheet_name: &str) -> Self {
        Self {
            table: ColumnarTable::new(sheet_name),
            slots: Vec::new(),
        }
    }

    /// Record the header row. `headers` are (column index, cleaned name) in sheet order.
    ///
    /// A kept name that appears more than once is read from its last column.
    pub(crate) fn set_headers(&mut self, headers: Vec<(u32, String)>) {
        for (col, name) in headers {
            if name.is_empty() {
                continue;
            }
            if crate::columns::is_kept(&name) {
                match self.slots.iter_mut().find(|(_, kept, _)| *kept == name) {
                    Some(slot) => slot.0 = col,
                    None => {
                        self.table.columns.insert(name.clone(), Vec::new());
                        self.slots
                            .push((col, name.clone(), crate::columns::is_date_column(&name)));
                    }
                }
            }
            self.table.all_columns.push(name);
        }
    }

    /// Kept column slot for a worksheet column index, with its date flag.
    pub(crate) fn slot_for(&self, col: u32) -> Option<(usize, bool)> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, (c, _, _))| *c == col)
            .map(|(i, (_, _, date))| (i, *date))
    }

    /// Append one row given its kept-slot values (`None` = absent cell).
    pub(crate) fn push_row(&mut self, values: &mut [Option<CellValue>]) {
        for ((_, name, _), value) in self.slots.iter().zip(values.iter_mut()) {
            if let Some(column) = self.table.columns.get_mut(name) {
                column.push(value.take().unwrap_or_default());
            }
        }
        self.table.row_count += 1;
    }

    /// Append `count` rows of `Empty` values.
    pub(crate) fn push_empty_rows(&mut self, count: usize) {
        for column in self.table.columns.values_mut() {
            column.resize(column.len() + count, CellValue::Empty);
        }
        self.table.row_count += count;
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn row_count(&self) -> usize {
        self.table.row_count
    }

    pub(crate) fn finish(self) -> ColumnarTable {
        self.table
    }
}
