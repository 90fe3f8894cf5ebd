//! Calendar-date conversions for the SQL boundary. The core only sees [`Ms`].

use chrono::{DateTime, NaiveDate};

use crate::model::Ms;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Midnight UTC of a calendar date, or `None` for an impossible date.
pub fn ymd(year: i32, month: u32, day: u32) -> Option<Ms> {
    NaiveDate::from_ymd_opt(year, month, day).map(midnight_ms)
}

/// Parse `YYYY-MM-DD` into midnight UTC.
pub fn parse_date(s: &str) -> Option<Ms> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok().map(midnight_ms)
}

/// Parse a timestamp given either as unix milliseconds or as `YYYY-MM-DD`.
pub fn parse_timestamp(s: &str) -> Option<Ms> {
    let s = s.trim();
    s.parse::<Ms>().ok().or_else(|| parse_date(s))
}

/// Render an instant as `YYYY-MM-DD` when it falls on midnight, RFC 3339 otherwise.
pub fn format_ms(ms: Ms) -> String {
    match DateTime::from_timestamp_millis(ms) {
        Some(dt) if dt.timestamp_millis() % crate::model::DAY_MS == 0 => {
            dt.date_naive().format(DATE_FORMAT).to_string()
        }
        Some(dt) => dt.to_rfc3339(),
        None => ms.to_string(),
    }
}

/// Midnight UTC of the day containing `ms`.
pub fn start_of_day(ms: Ms) -> Ms {
    ms - ms.rem_euclid(crate::model::DAY_MS)
}

fn midnight_ms(date: NaiveDate) -> Ms {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DAY_MS;

    #[test]
    fn start_of_day_truncates() {
        assert_eq!(start_of_day(0), 0);
        assert_eq!(start_of_day(DAY_MS + 5), DAY_MS);
        assert_eq!(start_of_day(2 * DAY_MS - 1), DAY_MS);
        assert_eq!(start_of_day(-1), -DAY_MS);
    }

    #[test]
    fn ymd_is_midnight_utc() {
        assert_eq!(ymd(1970, 1, 1), Some(0));
        assert_eq!(ymd(1970, 1, 2), Some(DAY_MS));
        assert_eq!(ymd(2025, 2, 30), None);
    }

    #[test]
    fn parse_date_and_timestamp() {
        assert_eq!(parse_date("2025-06-01"), ymd(2025, 6, 1));
        assert_eq!(parse_date("06/01/2025"), None);
        assert_eq!(parse_timestamp("86400000"), Some(DAY_MS));
        assert_eq!(parse_timestamp(" 2025-06-01 "), ymd(2025, 6, 1));
        assert_eq!(parse_timestamp("tomorrow"), None);
    }

    #[test]
    fn format_midnight_as_date() {
        let ms = ymd(2025, 6, 10).unwrap();
        assert_eq!(format_ms(ms), "2025-06-10");
        assert!(format_ms(ms + 3_600_000).starts_with("2025-06-10T01:00:00"));
    }
}
