//! Utilities for parsing Excel-style cell references and ranges.

/// Parse a cell reference like "A1" into (col, row) where col and row are 0-indexed.
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    parse_cell_ref_bytes(cell_ref.trim().as_bytes())
}

/// Parse a cell reference from raw bytes (ASCII) into (col, row) where col and row are 0-indexed.
///
/// This is the bytes equivalent of [`parse_cell_ref`] for use when working with
/// raw XML attribute values (e.g., `attr.value` from quick-xml).
pub fn parse_cell_ref_bytes(ref_bytes: &[u8]) -> Option<(u32, u32)> {
    let mut col: u32 = 0;
    let mut row: u32 = 0;
    let mut saw_col = false;
    let mut saw_row = false;

    for &b in ref_bytes {
        if b == b'$' {
            continue;
        }
        if b.is_ascii_alphabetic() {
            if saw_row {
                return None;
            }
            let upper = b.to_ascii_uppercase();
            col = col
                .checked_mul(26)?
                .checked_add(u32::from(upper - b'A') + 1)?;
            saw_col = true;
        } else if b.is_ascii_digit() {
            row = row.checked_mul(10)?.checked_add(u32::from(b - b'0'))?;
            saw_row = true;
        } else {
            return None;
        }
    }

    if !saw_col || !saw_row || row == 0 {
        return None;
    }

    Some((col - 1, row - 1))
}

/// Column index (0-based) from the letter prefix of a reference ("AB12" -> 27).
///
/// Only the leading letters are read, so a bare column ("C") works too.
pub fn column_index(cell_ref: &str) -> Option<u32> {
    let mut col: u32 = 0;
    let mut saw_col = false;
    for b in cell_ref.bytes() {
        if b == b'$' && !saw_col {
            continue;
        }
        if !b.is_ascii_alphabetic() {
            break;
        }
        col = col
            .checked_mul(26)?
            .checked_add(u32::from(b.to_ascii_uppercase() - b'A') + 1)?;
        saw_col = true;
    }
    saw_col.then(|| col - 1)
}

/// Convert a 0-based column index to Excel column letters (A, B, ..., Z, AA, AB, ...)
pub fn column_letters(col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col + 1;
    while n > 0 {
        n -= 1;
        // n % 26 < 26, always fits in u8
        letters.push(b'A' + u8::try_from(n % 26).unwrap_or(0));
        n /= 26;
    }
    letters.iter().rev().map(|&b| char::from(b)).collect()
}

/// Last worksheet row (1-based) a workbook can address.
pub const MAX_ROWS: u32 = 1_048_576;

/// Number for the next `<row>`, given its `r` attribute and the previous row's number.
///
/// An `r` that does not move forward or lies past [`MAX_ROWS`] is ignored and
/// the row follows the previous one. Returns `None` once the sheet is full.
#[must_use]
pub fn next_row_number(declared: Option<u32>, last_row: u32) -> Option<u32> {
    declared
        .filter(|&r| r > last_row && r <= MAX_ROWS)
        .or_else(|| last_row.checked_add(1))
        .filter(|&r| r <= MAX_ROWS)
}

/// A rectangular cell range, 0-indexed and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub start_row: u32,
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
}

impl CellRange {
    /// Number of rows covered by the range.
    #[must_use]
    pub fn row_span(&self) -> u32 {
        self.end_row.saturating_sub(self.start_row) + 1
    }
}

/// Parse a cell range like "A1:B10" or "A1".
///
/// Returns `None` when either end is malformed or the range is inverted.
pub fn parse_cell_range(range: &str) -> Option<CellRange> {
    let (start, end) = range.split_once(':').unwrap_or((range, range));
    let (start_col, start_row) = parse_cell_ref(start)?;
    let (end_col, end_row) = parse_cell_ref(end)?;
    if end_row < start_row || end_col < start_col {
        return None;
    }
    Some(CellRange {
        start_row,
        start_col,
        end_row,
        end_col,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell_ref() {
        assert_eq!(parse_cell_ref("A1"), Some((0, 0)));
        assert_eq!(parse_cell_ref("$B$3"), Some((1, 2)));
        assert_eq!(parse_cell_ref("AA10"), Some((26, 9)));
        assert_eq!(parse_cell_ref("10"), None);
        assert_eq!(parse_cell_ref("A"), None);
        assert_eq!(parse_cell_ref("A0"), None);
        assert_eq!(parse_cell_ref("1A"), None);
    }

    #[test]
    fn test_column_index_and_letters() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("Z99"), Some(25));
        assert_eq!(column_index("AB12"), Some(27));
        assert_eq!(column_index("XFD1"), Some(16383));
        assert_eq!(column_index("12"), None);
        for col in [0, 25, 26, 27, 701, 702, 16383] {
            let letters = column_letters(col);
            assert_eq!(column_index(&letters), Some(col), "{letters}");
        }
        assert_eq!(column_letters(27), "AB");
    }

    #[test]
    fn test_parse_cell_range() {
        let range = parse_cell_range("A1:Q600001").unwrap();
        assert_eq!(range.start_row, 0);
        assert_eq!(range.end_row, 600_000);
        assert_eq!(range.end_col, 16);
        assert_eq!(range.row_span(), 600_001);

        let single = parse_cell_range("C3").unwrap();
        assert_eq!(single.row_span(), 1);

        assert!(parse_cell_range("B2:A1").is_none());
        assert!(parse_cell_range("garbage").is_none());
        assert!(parse_cell_range("").is_none());
    }

    #[test]
    fn test_next_row_number() {
        assert_eq!(next_row_number(Some(5), 2), Some(5));
        assert_eq!(next_row_number(None, 2), Some(3));
        // backwards or repeated numbers continue from the previous row
        assert_eq!(next_row_number(Some(2), 2), Some(3));
        assert_eq!(next_row_number(Some(u32::MAX), 7), Some(8));
        assert_eq!(next_row_number(Some(MAX_ROWS + 1), 0), Some(1));
        assert_eq!(next_row_number(Some(MAX_ROWS), 10), Some(MAX_ROWS));
        assert_eq!(next_row_number(None, MAX_ROWS), None);
        assert_eq!(next_row_number(Some(5), u32::MAX), None);
    }
}
