//! The single overlap predicate used by slot generation, booking creation,
//! and bay assignment.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::models::Booking;

/// Half-open `[start, end)` overlap.
pub fn overlaps<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && b_start < a_end
}

/// Half-open time-of-day range `[start, end)` within one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "TimeRange start must be before end");
        Self { start, end }
    }

    pub fn of_booking(booking: &Booking) -> Self {
        Self::new(booking.start_time, booking.end_time)
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Bookings that still hold the calendar and intersect `range`.
pub fn overlapping<'a>(
    bookings: &'a [Booking],
    range: &'a TimeRange,
) -> impl Iterator<Item = &'a Booking> + 'a {
    bookings
        .iter()
        .filter(|b| b.status.occupies_calendar())
        .filter(move |b| TimeRange::of_booking(b).overlaps(range))
}

pub fn count_overlapping(bookings: &[Booking], range: &TimeRange) -> i64 {
    overlapping(bookings, range).count() as i64
}
