//! Excel date serials and free-text date normalization.
//!
//! Dates are handled as calendar fields only (`NaiveDate`); nothing here
//! touches a timezone, so a date never shifts by a day on its way to the
//! `YYYY-MM-DD` string the dashboard consumes.

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};

/// Largest serial Excel can display (9999-12-31).
const MAX_SERIAL: f64 = 2_958_465.0;

/// Day 0 of the 1900 system once the phantom Feb 29, 1900 is accounted for.
fn epoch_after_leap_bug() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 30)
}

/// Day 0 for serials before the phantom Feb 29, 1900.
fn epoch_before_leap_bug() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1899, 12, 31)
}

/// Convert an Excel (1900 system) serial into a calendar date.
///
/// Excel believes 1900 was a leap year: serials 1-59 are Jan 1 - Feb 28, 1900,
/// serial 60 is the non-existent Feb 29 (mapped to Feb 28 here), and serial 61
/// onward is March 1, 1900 onward. The time-of-day fraction is dropped.
/// Returns `None` for serials outside 1..=2958465.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial >= MAX_SERIAL + 1.0 {
        return None;
    }
    // Range-checked above, so the cast is exact.
    let days = serial.floor() as u64;
    match days {
        1..=59 => epoch_before_leap_bug()?.checked_add_days(Days::new(days)),
        60 => NaiveDate::from_ymd_opt(1900, 2, 28),
        _ => epoch_after_leap_bug()?.checked_add_days(Days::new(days)),
    }
}

/// Inverse of [`excel_serial_to_date`] for dates from 1900-03-01 onward.
pub fn date_to_excel_serial(date: NaiveDate) -> Option<f64> {
    let epoch = epoch_after_leap_bug()?;
    let days = date.signed_duration_since(epoch).num_days();
    if days < 61 {
        return None;
    }
    // Excel serials stay far below 2^53, the conversion is exact.
    #[allow(clippy::cast_precision_loss)]
    Some(days as f64)
}

/// Each `%Y` form precedes its two-digit `%y` twin; see [`four_digit_year`].
const DATE_FORMATS: [&str; 10] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%m-%d-%Y",
    "%m-%d-%y",
    "%d-%b-%Y",
    "%d-%b-%y",
    "%b %d, %Y",
    "%B %d, %Y",
];

const DATETIME_FORMATS: [&str; 4] = [
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
];

/// chrono's `%Y` also takes one to three digits, so `1/5/24` parses as year 1
/// or 24 under a four-digit format. Such a date is dropped and the `%y` form
/// gets its turn.
fn four_digit_year(date: NaiveDate) -> Option<NaiveDate> {
    (date.year() >= 1000).then_some(date)
}

/// Parse a textual date into its calendar fields.
///
/// ISO timestamps (`2024-01-15T18:00:00Z`, `2024-01-15 00:00:00`) keep the
/// date as written; the offset is ignored rather than applied.
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(prefix) = text.get(..10) {
        let rest = text.get(10..).unwrap_or("");
        if rest.starts_with('T') || rest.starts_with(' ') {
            if let Some(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
                .ok()
                .and_then(four_digit_year)
            {
                return Some(date);
            }
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| {
            NaiveDate::parse_from_str(text, fmt)
                .ok()
                .and_then(four_digit_year)
        })
        .or_else(|| {
            DATETIME_FORMATS.iter().find_map(|fmt| {
                NaiveDateTime::parse_from_str(text, fmt)
                    .ok()
                    .and_then(|dt| four_digit_year(dt.date()))
            })
        })
}

/// Canonical `YYYY-MM-DD` rendering.
pub fn format_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test_case(1.0, 1900, 1, 1 ; "first serial")]
    #[test_case(59.0, 1900, 2, 28 ; "last real february day")]
    #[test_case(61.0, 1900, 3, 1 ; "first day after phantom leap day")]
    #[test_case(45306.0, 2024, 1, 15 ; "modern date")]
    #[test_case(45306.75, 2024, 1, 15 ; "time fraction dropped")]
    #[test_case(2_958_465.0, 9999, 12, 31 ; "max serial")]
    fn test_serial_fixed_points(serial: f64, y: i32, m: u32, d: u32) {
        assert_eq!(excel_serial_to_date(serial), Some(ymd(y, m, d)));
    }

    #[test]
    fn test_leap_bug_boundary_is_one_day() {
        let sixty = excel_serial_to_date(60.0).unwrap();
        let sixty_one = excel_serial_to_date(61.0).unwrap();
        assert_eq!(sixty_one.signed_duration_since(sixty).num_days(), 1);
    }

    #[test]
    fn test_out_of_range_serials() {
        assert_eq!(excel_serial_to_date(0.0), None);
        assert_eq!(excel_serial_to_date(-5.0), None);
        assert_eq!(excel_serial_to_date(3_000_000.0), None);
        assert_eq!(excel_serial_to_date(f64::NAN), None);
    }

    #[test]
    fn test_serial_round_trip_formats_iso() {
        let serial = date_to_excel_serial(ymd(2024, 1, 16)).unwrap();
        assert_eq!(serial, 45307.0);
        assert_eq!(format_iso(excel_serial_to_date(serial).unwrap()), "2024-01-16");
    }

    #[test_case("2024-01-15", Some((2024, 1, 15)) ; "iso")]
    #[test_case("2024-01-15T23:30:00-08:00", Some((2024, 1, 15)) ; "iso with offset keeps calendar day")]
    #[test_case("2024-01-15 00:00:00", Some((2024, 1, 15)) ; "iso with time")]
    #[test_case("1/5/2024", Some((2024, 1, 5)) ; "us short")]
    #[test_case("1/5/24", Some((2024, 1, 5)) ; "us two digit year")]
    #[test_case("01-05-24", Some((2024, 1, 5)) ; "us dashes two digit year")]
    #[test_case("2024/1/5", Some((2024, 1, 5)) ; "year first slashes")]
    #[test_case("15-Jan-24", Some((2024, 1, 15)) ; "day month name two digit year")]
    #[test_case("01/05/2024 12:00:00 AM", Some((2024, 1, 5)) ; "us with meridiem")]
    #[test_case("15-Jan-2024", Some((2024, 1, 15)) ; "day month name")]
    #[test_case("Grand Total", None ; "footer text")]
    #[test_case("", None ; "empty")]
    fn test_parse_date_text(text: &str, expected: Option<(i32, u32, u32)>) {
        assert_eq!(
            parse_date_text(text),
            expected.map(|(y, m, d)| ymd(y, m, d))
        );
    }
}
