//! Time arithmetic and formatting. Everything here is pure except [`now`].

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local wall-clock time, truncated to whole seconds so values
/// survive a round trip through the database unchanged.
pub fn now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// `time + minutes`, or `None` if the result would cross midnight.
pub fn add_minutes(time: NaiveTime, minutes: i64) -> Option<NaiveTime> {
    let (result, wrapped_secs) = time.overflowing_add_signed(Duration::minutes(minutes));
    if wrapped_secs == 0 {
        Some(result)
    } else {
        None
    }
}

pub fn minutes_between(start: NaiveTime, end: NaiveTime) -> i64 {
    (end - start).num_minutes()
}

pub fn format_hhmm(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub fn parse_hhmm(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), TIME_FORMAT)
        .map_err(|_| anyhow::anyhow!("invalid time format: {s}"))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| anyhow::anyhow!("invalid date format: {s}"))
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .map_err(|_| anyhow::anyhow!("invalid timestamp: {s}"))
}

/// First and last instant of a calendar day.
pub fn day_bounds(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(NaiveTime::default());
    let end = start + Duration::days(1) - Duration::seconds(1);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        parse_hhmm(s).unwrap()
    }

    #[test]
    fn test_add_minutes() {
        assert_eq!(add_minutes(t("09:30"), 45), Some(t("10:15")));
        assert_eq!(add_minutes(t("23:00"), 59), Some(t("23:59")));
        assert_eq!(add_minutes(t("23:30"), 60), None);
    }

    #[test]
    fn test_format_and_parse() {
        assert_eq!(format_hhmm(t("07:05")), "07:05");
        assert!(parse_hhmm("25:00").is_err());
        assert!(parse_hhmm("9am").is_err());

        let date = parse_date("2025-06-16").unwrap();
        assert_eq!(format_date(date), "2025-06-16");

        let ts = parse_timestamp("2025-06-16 10:00:05").unwrap();
        assert_eq!(format_timestamp(ts), "2025-06-16 10:00:05");
    }

    #[test]
    fn test_minutes_between() {
        assert_eq!(minutes_between(t("08:00"), t("18:00")), 600);
        assert_eq!(minutes_between(t("12:00"), t("11:30")), -30);
    }

    #[test]
    fn test_day_bounds() {
        let date = parse_date("2025-06-16").unwrap();
        let (start, end) = day_bounds(date);
        assert_eq!(format_timestamp(start), "2025-06-16 00:00:00");
        assert_eq!(format_timestamp(end), "2025-06-16 23:59:59");
    }

    #[test]
    fn test_now_has_no_subseconds() {
        assert_eq!(now().nanosecond(), 0);
    }
}
