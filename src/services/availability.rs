use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::{BookingError, BookingResult};
use crate::models::{Booking, BookingConfiguration, BusinessHours, Service, SlotCapacityPolicy, TimeSlot};
use crate::services::clock;
use crate::services::conflict::{self, TimeRange};

/// Capacity of a start time and the same-day bookings that count against it.
/// Fetched once per call and reused for every candidate.
pub struct SlotLoad {
    pub capacity: i64,
    pub bookings: Vec<Booking>,
}

impl SlotLoad {
    pub fn load(
        conn: &Connection,
        service: &Service,
        date: NaiveDate,
        policy: SlotCapacityPolicy,
    ) -> BookingResult<Self> {
        let (capacity, scope) = match policy {
            SlotCapacityPolicy::BayPool => (queries::count_enabled_bays(conn)?, None),
            SlotCapacityPolicy::ServiceCapacity => (service.capacity, Some(service.id)),
        };
        let bookings = queries::get_occupying_bookings(conn, date, scope)?;
        Ok(Self { capacity, bookings })
    }

    pub fn booked(&self, range: &TimeRange) -> i64 {
        conflict::count_overlapping(&self.bookings, range)
    }

    pub fn remaining(&self, range: &TimeRange) -> i64 {
        (self.capacity - self.booked(range)).max(0)
    }

    pub fn has_room(&self, range: &TimeRange) -> bool {
        self.booked(range) < self.capacity
    }
}

/// Business hours for `date`, or `None` if the wash is closed that day.
pub fn opening_hours(conn: &Connection, date: NaiveDate) -> BookingResult<Option<BusinessHours>> {
    if queries::is_holiday(conn, date)? {
        return Ok(None);
    }
    let hours = queries::get_business_hours(conn, date.weekday())?;
    Ok(hours.filter(|h| h.is_open && h.open_time < h.close_time))
}

fn beyond_advance_window(date: NaiveDate, config: &BookingConfiguration, now: NaiveDateTime) -> bool {
    date > now.date() + Duration::days(config.max_advance_days)
}

/// Bookable start times for one service on one day.
///
/// Walks the opening window in `slot_interval_minutes` steps. A candidate is
/// dropped if it starts before `now + lead_time_hours`, touches the break, or
/// runs past closing; the rest are reported with their remaining capacity.
/// Holidays, closed days and dates past the advance window yield no slots.
pub fn generate_slots(
    conn: &Connection,
    date: NaiveDate,
    service_id: i64,
    config: &BookingConfiguration,
    now: NaiveDateTime,
) -> BookingResult<Vec<TimeSlot>> {
    let service = queries::get_service(conn, service_id)?
        .ok_or_else(|| BookingError::NotFound(format!("service {service_id}")))?;
    if !service.is_active {
        tracing::debug!(service_id, "service inactive, no slots offered");
        return Ok(vec![]);
    }

    if beyond_advance_window(date, config, now) {
        return Ok(vec![]);
    }
    let Some(hours) = opening_hours(conn, date)? else {
        return Ok(vec![]);
    };

    let load = SlotLoad::load(conn, &service, date, config.capacity_policy)?;
    let earliest = now + Duration::hours(config.lead_time_hours);
    let break_range = hours.break_range();

    let mut slots = vec![];
    let mut cursor = hours.open_time;
    loop {
        let Some(end) = clock::add_minutes(cursor, service.duration_minutes) else {
            break;
        };
        if end > hours.close_time {
            break;
        }

        let range = TimeRange::new(cursor, end);
        let too_soon = date.and_time(cursor) < earliest;
        let in_break = break_range.is_some_and(|b| b.overlaps(&range));

        if !too_soon && !in_break {
            slots.push(TimeSlot {
                time: clock::format_hhmm(cursor),
                available: load.has_room(&range),
                capacity: load.capacity,
                remaining: load.remaining(&range),
            });
        }

        match clock::add_minutes(cursor, config.slot_interval_minutes) {
            Some(next) if next > cursor => cursor = next,
            _ => break,
        }
    }

    Ok(slots)
}

/// Creation-time check for a requested start. Returns the booking interval
/// when the start is bookable, `SlotUnavailable` otherwise.
pub fn ensure_bookable(
    conn: &Connection,
    service: &Service,
    date: NaiveDate,
    start: NaiveTime,
    config: &BookingConfiguration,
    now: NaiveDateTime,
) -> BookingResult<TimeRange> {
    let range = booking_range(service, start)?;
    let at = clock::format_hhmm(start);

    if date < now.date() {
        return Err(BookingError::SlotUnavailable(format!("{date} is in the past")));
    }
    if beyond_advance_window(date, config, now) {
        return Err(BookingError::SlotUnavailable(format!(
            "{date} is more than {} days ahead",
            config.max_advance_days
        )));
    }
    if date.and_time(start) < now + Duration::hours(config.lead_time_hours) {
        return Err(BookingError::SlotUnavailable(format!(
            "{date} {at} is less than {}h from now",
            config.lead_time_hours
        )));
    }

    let Some(hours) = opening_hours(conn, date)? else {
        return Err(BookingError::SlotUnavailable(format!("closed on {date}")));
    };
    let window = TimeRange::new(hours.open_time, hours.close_time);
    if !window.contains(&range) {
        return Err(BookingError::SlotUnavailable(format!(
            "{at} is outside business hours ({})",
            hours.to_human_readable()
        )));
    }
    if hours.break_range().is_some_and(|b| b.overlaps(&range)) {
        return Err(BookingError::SlotUnavailable(format!(
            "{at} overlaps the break ({})",
            hours.to_human_readable()
        )));
    }

    ensure_capacity(conn, service, date, &range, config.capacity_policy)?;
    Ok(range)
}

/// Conflict check alone, without the calendar rules.
pub fn ensure_capacity(
    conn: &Connection,
    service: &Service,
    date: NaiveDate,
    range: &TimeRange,
    policy: SlotCapacityPolicy,
) -> BookingResult<()> {
    let load = SlotLoad::load(conn, service, date, policy)?;
    if !load.has_room(range) {
        return Err(BookingError::SlotUnavailable(format!(
            "{date} {} is fully booked",
            clock::format_hhmm(range.start)
        )));
    }
    Ok(())
}

/// `[start, start + duration)` for a service.
pub fn booking_range(service: &Service, start: NaiveTime) -> BookingResult<TimeRange> {
    let end = clock::add_minutes(start, service.duration_minutes).ok_or_else(|| {
        BookingError::SlotUnavailable(format!(
            "{} + {}min runs past midnight",
            clock::format_hhmm(start),
            service.duration_minutes
        ))
    })?;
    Ok(TimeRange::new(start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{BookingStatus, Holiday, PaymentStatus, VehicleSize};
    use chrono::Weekday;

    // 2025-06-16 is a Monday.
    const DAY: &str = "2025-06-16";

    fn t(s: &str) -> NaiveTime {
        clock::parse_hhmm(s).unwrap()
    }

    fn day() -> NaiveDate {
        clock::parse_date(DAY).unwrap()
    }

    fn at(time: &str) -> NaiveDateTime {
        day().and_time(t(time))
    }

    fn setup(break_window: Option<(&str, &str)>) -> (Connection, i64) {
        let conn = db::init_db(":memory:").unwrap();
        let service_id = queries::create_service(&conn, "Full wash", 60, 2500, 1).unwrap();
        queries::create_bay(&conn, 1, Some("Bay 1"), VehicleSize::Small, VehicleSize::Large).unwrap();
        let mut hours = BusinessHours::open(Weekday::Mon, t("08:00"), t("18:00"));
        if let Some((start, end)) = break_window {
            hours = hours.with_break(t(start), t(end));
        }
        queries::upsert_business_hours(&conn, &hours).unwrap();
        (conn, service_id)
    }

    fn insert_booking(conn: &Connection, service_id: i64, start: &str, end: &str, status: BookingStatus) {
        let now = at("06:00");
        let id = format!("{service_id}-{start}-{}", status.as_str());
        queries::insert_booking(
            conn,
            &Booking {
                id: id.clone(),
                service_id,
                date: day(),
                start_time: t(start),
                end_time: t(end),
                status,
                payment_status: PaymentStatus::Pending,
                payment_id: None,
                customer_name: "Bob".to_string(),
                customer_email: "bob@example.com".to_string(),
                customer_phone: "+15552220000".to_string(),
                vehicle_size: VehicleSize::Medium,
                vehicle_plate: None,
                notes: None,
                assigned_bay_id: None,
                bay_assigned_at: None,
                bay_assigned_by: None,
                confirmation_code: id.replace([':', '-'], "").to_uppercase(),
                created_at: now,
                updated_at: now,
                cancelled_at: None,
                completed_at: None,
            },
        )
        .unwrap();
    }

    fn times(slots: &[TimeSlot]) -> Vec<&str> {
        slots.iter().map(|s| s.time.as_str()).collect()
    }

    #[test]
    fn test_lead_time_and_closing_bound() {
        let (conn, service_id) = setup(None);
        let config = BookingConfiguration::default();
        let slots = generate_slots(&conn, day(), service_id, &config, at("07:00")).unwrap();

        assert_eq!(slots.first().unwrap().time, "09:00");
        assert_eq!(slots.last().unwrap().time, "17:00");
        assert!(slots.iter().all(|s| s.available && s.remaining == 1));
    }

    #[test]
    fn test_break_excluded_half_open() {
        let (conn, service_id) = setup(Some(("12:00", "13:00")));
        let config = BookingConfiguration::default();
        let slots = generate_slots(&conn, day(), service_id, &config, at("06:00")).unwrap();
        let offered = times(&slots);

        assert!(offered.contains(&"11:00"));
        assert!(offered.contains(&"13:00"));
        assert!(!offered.contains(&"11:30"));
        assert!(!offered.contains(&"12:00"));
        assert!(!offered.contains(&"12:30"));
    }

    #[test]
    fn test_existing_booking_blocks_overlapping_slots() {
        let (conn, service_id) = setup(None);
        insert_booking(&conn, service_id, "10:00", "11:00", BookingStatus::Confirmed);
        let config = BookingConfiguration::default();
        let slots = generate_slots(&conn, day(), service_id, &config, at("06:00")).unwrap();

        let slot = |time: &str| slots.iter().find(|s| s.time == time).unwrap().clone();
        assert!(!slot("10:00").available);
        assert!(!slot("09:30").available);
        assert!(!slot("10:30").available);
        assert!(slot("09:00").available);
        assert!(slot("11:00").available);
        assert_eq!(slot("10:00").remaining, 0);
    }

    #[test]
    fn test_cancelled_and_no_show_free_the_slot() {
        let (conn, service_id) = setup(None);
        insert_booking(&conn, service_id, "10:00", "11:00", BookingStatus::Cancelled);
        insert_booking(&conn, service_id, "10:00", "11:00", BookingStatus::NoShow);
        let config = BookingConfiguration::default();
        let slots = generate_slots(&conn, day(), service_id, &config, at("06:00")).unwrap();
        assert!(slots.iter().all(|s| s.available));
    }

    #[test]
    fn test_capacity_policies() {
        let (conn, service_id) = setup(None);
        let other = queries::create_service(&conn, "Interior", 60, 1500, 3).unwrap();
        insert_booking(&conn, service_id, "10:00", "11:00", BookingStatus::Pending);

        // One bay: any booking of the day fills it.
        let bay_pool = BookingConfiguration::default();
        let slots = generate_slots(&conn, day(), other, &bay_pool, at("06:00")).unwrap();
        let ten = slots.iter().find(|s| s.time == "10:00").unwrap();
        assert!(!ten.available);
        assert_eq!(ten.capacity, 1);

        // Per-service: only bookings of the same service count.
        let per_service = BookingConfiguration {
            capacity_policy: SlotCapacityPolicy::ServiceCapacity,
            ..Default::default()
        };
        let slots = generate_slots(&conn, day(), other, &per_service, at("06:00")).unwrap();
        let ten = slots.iter().find(|s| s.time == "10:00").unwrap();
        assert!(ten.available);
        assert_eq!((ten.capacity, ten.remaining), (3, 3));
    }

    #[test]
    fn test_holiday_and_closed_day() {
        let (conn, service_id) = setup(None);
        let config = BookingConfiguration::default();

        // Tuesday has no hours row.
        let tuesday = day().succ_opt().unwrap();
        assert!(generate_slots(&conn, tuesday, service_id, &config, at("06:00"))
            .unwrap()
            .is_empty());

        queries::add_holiday(&conn, &Holiday { date: day(), name: None }).unwrap();
        assert!(generate_slots(&conn, day(), service_id, &config, at("06:00"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_long_service_has_no_tail_slots() {
        let (conn, _) = setup(None);
        let long = queries::create_service(&conn, "Detailing", 180, 9000, 1).unwrap();
        let config = BookingConfiguration::default();
        let slots = generate_slots(&conn, day(), long, &config, at("06:00")).unwrap();
        assert_eq!(slots.last().unwrap().time, "15:00");
    }

    #[test]
    fn test_advance_window() {
        let (conn, service_id) = setup(None);
        let config = BookingConfiguration {
            max_advance_days: 7,
            ..Default::default()
        };
        let now = day().and_time(t("06:00")) - Duration::days(14);
        assert!(generate_slots(&conn, day(), service_id, &config, now).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_service() {
        let (conn, _) = setup(None);
        let result = generate_slots(&conn, day(), 999, &BookingConfiguration::default(), at("06:00"));
        assert!(matches!(result, Err(BookingError::NotFound(_))));
    }

    #[test]
    fn test_ensure_bookable() {
        let (conn, service_id) = setup(Some(("12:00", "13:00")));
        let service = queries::get_service(&conn, service_id).unwrap().unwrap();
        let config = BookingConfiguration::default();
        let now = at("06:00");

        let range = ensure_bookable(&conn, &service, day(), t("09:00"), &config, now).unwrap();
        assert_eq!(range, TimeRange::new(t("09:00"), t("10:00")));

        for bad in ["07:00", "07:30", "11:30", "12:00", "17:30"] {
            let result = ensure_bookable(&conn, &service, day(), t(bad), &config, now);
            assert!(matches!(result, Err(BookingError::SlotUnavailable(_))), "{bad}");
        }

        insert_booking(&conn, service_id, "09:00", "10:00", BookingStatus::Confirmed);
        let result = ensure_bookable(&conn, &service, day(), t("09:00"), &config, now);
        assert!(matches!(result, Err(BookingError::SlotUnavailable(_))));
    }

    #[test]
    fn test_booking_range_past_midnight() {
        let service = Service {
            id: 1,
            name: "Night".into(),
            duration_minutes: 120,
            price_cents: 0,
            capacity: 1,
            is_active: true,
        };
        assert!(booking_range(&service, t("23:00")).is_err());
        assert_eq!(
            booking_range(&service, t("08:00")).unwrap(),
            TimeRange::new(t("08:00"), t("10:00"))
        );
    }
}
