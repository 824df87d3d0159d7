use chrono::{Datelike, Duration, NaiveDate};

use crate::error::{Error, Result};

/// Storage format for every `report_date` column.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Get the first day of the month containing `d`.
pub fn first_day_of_month(d: NaiveDate) -> NaiveDate {
    d.with_day(1).unwrap_or(d)
}

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    next.map(|d| d - Duration::days(1)).unwrap_or(NaiveDate::MAX)
}

/// Get the quarter (1-4) for a given date.
pub fn quarter_of(d: NaiveDate) -> u8 {
    ((d.month() - 1) / 3 + 1) as u8
}

pub fn date_key(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| Error::RangeParse(format!("invalid date: {s}")))
}

pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2025, 1),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
        );
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        ); // Leap year
        assert_eq!(
            last_day_of_month(2025, 12),
            NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()
        );
    }

    #[test]
    fn test_first_day_of_month() {
        assert_eq!(
            first_day_of_month(NaiveDate::from_ymd_opt(2024, 7, 19).unwrap()),
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
        );
    }

    #[test]
    fn test_quarter_of() {
        assert_eq!(quarter_of(NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()), 1);
        assert_eq!(quarter_of(NaiveDate::from_ymd_opt(2025, 7, 1).unwrap()), 3);
        assert_eq!(
            quarter_of(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()),
            4
        );
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date(" 2024-07-01 ").unwrap(),
            NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()
        );
        assert!(parse_date("2024-13-01").is_err());
        assert!(parse_date("07/01/2024").is_err());
    }

    #[test]
    fn test_date_key() {
        assert_eq!(
            date_key(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap()),
            "2024-07-01"
        );
    }
}
