use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::services::clock;
use crate::services::conflict::TimeRange;

/// Opening hours for one day of the week.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessHours {
    pub weekday: Weekday,
    pub is_open: bool,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
}

impl BusinessHours {
    pub fn open(weekday: Weekday, open_time: NaiveTime, close_time: NaiveTime) -> Self {
        Self {
            weekday,
            is_open: true,
            open_time,
            close_time,
            break_start: None,
            break_end: None,
        }
    }

    pub fn with_break(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.break_start = Some(start);
        self.break_end = Some(end);
        self
    }

    /// The break as a half-open range, if both ends are set and well-formed.
    pub fn break_range(&self) -> Option<TimeRange> {
        match (self.break_start, self.break_end) {
            (Some(start), Some(end)) if start < end => Some(TimeRange::new(start, end)),
            _ => None,
        }
    }

    pub fn to_human_readable(&self) -> String {
        let day = capitalize(&self.weekday.to_string());
        if !self.is_open {
            return format!("{day}: closed");
        }
        let mut out = format!(
            "{day}: {}-{}",
            clock::format_hhmm(self.open_time),
            clock::format_hhmm(self.close_time)
        );
        if let Some(b) = self.break_range() {
            out.push_str(&format!(
                " (break {}-{})",
                clock::format_hhmm(b.start),
                clock::format_hhmm(b.end)
            ));
        }
        out
    }
}

/// A date on which the wash is closed regardless of business hours.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: Option<String>,
}

/// One candidate start time produced by the availability generator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeSlot {
    /// HH:mm
    pub time: String,
    pub available: bool,
    pub capacity: i64,
    pub remaining: i64,
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + &c.as_str().to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        clock::parse_hhmm(s).unwrap()
    }

    #[test]
    fn test_break_range_requires_both_ends() {
        let mut hours = BusinessHours::open(Weekday::Mon, t("08:00"), t("18:00"));
        assert!(hours.break_range().is_none());

        hours.break_start = Some(t("12:00"));
        assert!(hours.break_range().is_none());

        let hours = hours.with_break(t("12:00"), t("13:00"));
        assert_eq!(hours.break_range(), Some(TimeRange::new(t("12:00"), t("13:00"))));
    }

    #[test]
    fn test_inverted_break_is_ignored() {
        let hours =
            BusinessHours::open(Weekday::Mon, t("08:00"), t("18:00")).with_break(t("13:00"), t("12:00"));
        assert!(hours.break_range().is_none());
    }

    #[test]
    fn test_to_human_readable() {
        let hours =
            BusinessHours::open(Weekday::Fri, t("08:00"), t("18:00")).with_break(t("12:00"), t("13:00"));
        assert_eq!(hours.to_human_readable(), "Fri: 08:00-18:00 (break 12:00-13:00)");

        let mut closed = BusinessHours::open(Weekday::Sun, t("08:00"), t("18:00"));
        closed.is_open = false;
        assert_eq!(closed.to_human_readable(), "Sun: closed");
    }
}
