use std::collections::HashMap;

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime, Weekday};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::models::{
    Actor, Booking, BookingStatus, BookingStatusHistory, BusinessHours, Holiday, PaymentStatus,
    Service, VehicleSize, WashBay,
};
use crate::services::clock;

// ── Services ──

pub fn create_service(
    conn: &Connection,
    name: &str,
    duration_minutes: i64,
    price_cents: i64,
    capacity: i64,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO services (name, duration_minutes, price_cents, capacity) VALUES (?1, ?2, ?3, ?4)",
        params![name, duration_minutes, price_cents, capacity],
    )
    .context("failed to insert service")?;
    Ok(conn.last_insert_rowid())
}

pub fn get_service(conn: &Connection, id: i64) -> anyhow::Result<Option<Service>> {
    let service = conn
        .query_row(
            "SELECT id, name, duration_minutes, price_cents, capacity, is_active FROM services WHERE id = ?1",
            params![id],
            |row| {
                Ok(Service {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    duration_minutes: row.get(2)?,
                    price_cents: row.get(3)?,
                    capacity: row.get(4)?,
                    is_active: row.get::<_, i32>(5)? != 0,
                })
            },
        )
        .optional()?;
    Ok(service)
}

pub fn update_service(conn: &Connection, service: &Service) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE services SET name = ?1, duration_minutes = ?2, price_cents = ?3, capacity = ?4, is_active = ?5
         WHERE id = ?6",
        params![
            service.name,
            service.duration_minutes,
            service.price_cents,
            service.capacity,
            service.is_active as i32,
            service.id,
        ],
    )?;
    Ok(count > 0)
}

/// Soft delete: services referenced by bookings are never removed.
pub fn set_service_active(conn: &Connection, id: i64, active: bool) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE services SET is_active = ?1 WHERE id = ?2",
        params![active as i32, id],
    )?;
    Ok(count > 0)
}

// ── Wash Bays ──

pub fn create_bay(
    conn: &Connection,
    bay_number: i64,
    name: Option<&str>,
    min_size: VehicleSize,
    max_size: VehicleSize,
) -> anyhow::Result<i64> {
    anyhow::ensure!(min_size <= max_size, "bay min size exceeds max size");
    conn.execute(
        "INSERT INTO wash_bays (bay_number, name, min_size, max_size) VALUES (?1, ?2, ?3, ?4)",
        params![bay_number, name, min_size.as_str(), max_size.as_str()],
    )
    .with_context(|| format!("failed to insert bay {bay_number}"))?;
    Ok(conn.last_insert_rowid())
}

pub fn set_bay_enabled(conn: &Connection, id: i64, enabled: bool) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE wash_bays SET is_enabled = ?1 WHERE id = ?2",
        params![enabled as i32, id],
    )?;
    Ok(count > 0)
}

/// Enabled bays ordered by bay number.
pub fn list_enabled_bays(conn: &Connection) -> anyhow::Result<Vec<WashBay>> {
    let mut stmt = conn.prepare(
        "SELECT id, bay_number, name, is_enabled, min_size, max_size
         FROM wash_bays WHERE is_enabled = 1 ORDER BY bay_number ASC",
    )?;

    let rows = stmt.query_map([], |row| Ok(parse_bay_row(row)))?;

    let mut bays = vec![];
    for row in rows {
        bays.push(row??);
    }
    Ok(bays)
}

pub fn count_enabled_bays(conn: &Connection) -> anyhow::Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM wash_bays WHERE is_enabled = 1",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn parse_bay_row(row: &rusqlite::Row) -> anyhow::Result<WashBay> {
    let min_size: String = row.get(4)?;
    let max_size: String = row.get(5)?;
    Ok(WashBay {
        id: row.get(0)?,
        bay_number: row.get(1)?,
        name: row.get(2)?,
        is_enabled: row.get::<_, i32>(3)? != 0,
        min_size: min_size.parse()?,
        max_size: max_size.parse()?,
    })
}

// ── Business Hours & Holidays ──

pub fn upsert_business_hours(conn: &Connection, hours: &BusinessHours) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO business_hours (weekday, is_open, open_time, close_time, break_start, break_end)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(weekday) DO UPDATE SET
           is_open = excluded.is_open,
           open_time = excluded.open_time,
           close_time = excluded.close_time,
           break_start = excluded.break_start,
           break_end = excluded.break_end",
        params![
            hours.weekday.num_days_from_monday(),
            hours.is_open as i32,
            clock::format_hhmm(hours.open_time),
            clock::format_hhmm(hours.close_time),
            hours.break_start.map(clock::format_hhmm),
            hours.break_end.map(clock::format_hhmm),
        ],
    )?;
    Ok(())
}

pub fn get_business_hours(conn: &Connection, weekday: Weekday) -> anyhow::Result<Option<BusinessHours>> {
    let row = conn
        .query_row(
            "SELECT is_open, open_time, close_time, break_start, break_end
             FROM business_hours WHERE weekday = ?1",
            params![weekday.num_days_from_monday()],
            |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((is_open, open_time, close_time, break_start, break_end)) = row else {
        return Ok(None);
    };

    Ok(Some(BusinessHours {
        weekday,
        is_open: is_open != 0,
        open_time: clock::parse_hhmm(&open_time)?,
        close_time: clock::parse_hhmm(&close_time)?,
        break_start: break_start.as_deref().map(clock::parse_hhmm).transpose()?,
        break_end: break_end.as_deref().map(clock::parse_hhmm).transpose()?,
    }))
}

pub fn add_holiday(conn: &Connection, holiday: &Holiday) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO holidays (date, name) VALUES (?1, ?2)
         ON CONFLICT(date) DO UPDATE SET name = excluded.name",
        params![clock::format_date(holiday.date), holiday.name],
    )?;
    Ok(())
}

pub fn remove_holiday(conn: &Connection, date: NaiveDate) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM holidays WHERE date = ?1",
        params![clock::format_date(date)],
    )?;
    Ok(count > 0)
}

pub fn is_holiday(conn: &Connection, date: NaiveDate) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM holidays WHERE date = ?1",
        params![clock::format_date(date)],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ── Settings ──

pub fn get_settings(conn: &Connection) -> anyhow::Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

    let mut settings = HashMap::new();
    for row in rows {
        let (key, value) = row?;
        settings.insert(key, value);
    }
    Ok(settings)
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
        params![key, value],
    )?;
    Ok(())
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, service_id, date, start_time, end_time, status, payment_status, payment_id, \
     customer_name, customer_email, customer_phone, vehicle_size, vehicle_plate, notes, \
     assigned_bay_id, bay_assigned_at, bay_assigned_by, confirmation_code, \
     created_at, updated_at, cancelled_at, completed_at";

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)"
        ),
        params![
            booking.id,
            booking.service_id,
            clock::format_date(booking.date),
            clock::format_hhmm(booking.start_time),
            clock::format_hhmm(booking.end_time),
            booking.status.as_str(),
            booking.payment_status.as_str(),
            booking.payment_id,
            booking.customer_name,
            booking.customer_email,
            booking.customer_phone,
            booking.vehicle_size.as_str(),
            booking.vehicle_plate,
            booking.notes,
            booking.assigned_bay_id,
            booking.bay_assigned_at.map(clock::format_timestamp),
            booking.bay_assigned_by,
            booking.confirmation_code,
            clock::format_timestamp(booking.created_at),
            clock::format_timestamp(booking.updated_at),
            booking.cancelled_at.map(clock::format_timestamp),
            booking.completed_at.map(clock::format_timestamp),
        ],
    )
    .with_context(|| format!("failed to insert booking {}", booking.id))?;
    Ok(())
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_booking_by_code(conn: &Connection, code: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE confirmation_code = ?1"),
        params![code.trim().to_uppercase()],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn confirmation_code_exists(conn: &Connection, code: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings WHERE confirmation_code = ?1",
        params![code],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Bookings on `date` whose status is in `statuses`, ordered by start time.
pub fn get_bookings_for_date(
    conn: &Connection,
    date: NaiveDate,
    statuses: &[BookingStatus],
) -> anyhow::Result<Vec<Booking>> {
    if statuses.is_empty() {
        return Ok(vec![]);
    }
    let placeholders = (0..statuses.len())
        .map(|i| format!("?{}", i + 2))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE date = ?1 AND status IN ({placeholders})
         ORDER BY start_time ASC"
    );

    let mut values = vec![clock::format_date(date)];
    values.extend(statuses.iter().map(|s| s.as_str().to_string()));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Bookings that hold the calendar on `date`, optionally limited to one service.
pub fn get_occupying_bookings(
    conn: &Connection,
    date: NaiveDate,
    service_id: Option<i64>,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE date = ?1 AND status NOT IN ('cancelled', 'no_show')
           AND (?2 IS NULL OR service_id = ?2)
         ORDER BY start_time ASC"
    ))?;

    let rows = stmt.query_map(params![clock::format_date(date), service_id], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Bookings assigned to `bay_id` on `date` that still hold the calendar.
pub fn get_bay_bookings(conn: &Connection, bay_id: i64, date: NaiveDate) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE assigned_bay_id = ?1 AND date = ?2 AND status NOT IN ('cancelled', 'no_show')
         ORDER BY start_time ASC"
    ))?;

    let rows = stmt.query_map(params![bay_id, clock::format_date(date)], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Bookings in `status` dated on or before `date`, oldest first.
pub fn get_bookings_with_status_until(
    conn: &Connection,
    status: BookingStatus,
    date: NaiveDate,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE status = ?1 AND date <= ?2
         ORDER BY date ASC, start_time ASC"
    ))?;

    let rows = stmt.query_map(params![status.as_str(), clock::format_date(date)], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Persist the status fields the workflow owns.
pub fn update_booking_lifecycle(conn: &Connection, booking: &Booking) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, cancelled_at = ?2, completed_at = ?3, updated_at = ?4
         WHERE id = ?5",
        params![
            booking.status.as_str(),
            booking.cancelled_at.map(clock::format_timestamp),
            booking.completed_at.map(clock::format_timestamp),
            clock::format_timestamp(booking.updated_at),
            booking.id,
        ],
    )?;
    Ok(count > 0)
}

pub fn update_payment(
    conn: &Connection,
    id: &str,
    status: PaymentStatus,
    payment_id: Option<&str>,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET payment_status = ?1, payment_id = COALESCE(?2, payment_id), updated_at = ?3
         WHERE id = ?4",
        params![status.as_str(), payment_id, clock::format_timestamp(now), id],
    )?;
    Ok(count > 0)
}

/// Assign a bay only if none is assigned yet. Returns false if the booking
/// already had one.
pub fn assign_bay(
    conn: &Connection,
    booking_id: &str,
    bay_id: i64,
    assigned_by: &str,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let ts = clock::format_timestamp(now);
    let count = conn.execute(
        "UPDATE bookings SET assigned_bay_id = ?1, bay_assigned_at = ?2, bay_assigned_by = ?3, updated_at = ?2
         WHERE id = ?4 AND assigned_bay_id IS NULL",
        params![bay_id, ts, assigned_by, booking_id],
    )?;
    Ok(count > 0)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let date: String = row.get(2)?;
    let start_time: String = row.get(3)?;
    let end_time: String = row.get(4)?;
    let status: String = row.get(5)?;
    let payment_status: String = row.get(6)?;
    let vehicle_size: String = row.get(11)?;
    let bay_assigned_at: Option<String> = row.get(15)?;
    let created_at: String = row.get(18)?;
    let updated_at: String = row.get(19)?;
    let cancelled_at: Option<String> = row.get(20)?;
    let completed_at: Option<String> = row.get(21)?;

    let opt_ts = |s: Option<String>| s.as_deref().map(clock::parse_timestamp).transpose();

    Ok(Booking {
        id: row.get(0)?,
        service_id: row.get(1)?,
        date: clock::parse_date(&date)?,
        start_time: clock::parse_hhmm(&start_time)?,
        end_time: clock::parse_hhmm(&end_time)?,
        status: status.parse()?,
        payment_status: payment_status.parse()?,
        payment_id: row.get(7)?,
        customer_name: row.get(8)?,
        customer_email: row.get(9)?,
        customer_phone: row.get(10)?,
        vehicle_size: vehicle_size.parse()?,
        vehicle_plate: row.get(12)?,
        notes: row.get(13)?,
        assigned_bay_id: row.get(14)?,
        bay_assigned_at: opt_ts(bay_assigned_at)?,
        bay_assigned_by: row.get(16)?,
        confirmation_code: row.get(17)?,
        created_at: clock::parse_timestamp(&created_at)?,
        updated_at: clock::parse_timestamp(&updated_at)?,
        cancelled_at: opt_ts(cancelled_at)?,
        completed_at: opt_ts(completed_at)?,
    })
}

// ── Status History ──

pub struct NewHistoryEntry<'a> {
    pub booking_id: &'a str,
    pub from_status: Option<BookingStatus>,
    pub to_status: BookingStatus,
    pub actor: &'a Actor,
    pub reason: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub is_compensation: bool,
    pub at: NaiveDateTime,
}

pub fn insert_history(conn: &Connection, entry: &NewHistoryEntry) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO booking_status_history
            (booking_id, from_status, to_status, actor_id, actor_role, reason, notes, is_compensation, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.booking_id,
            entry.from_status.map(|s| s.as_str()),
            entry.to_status.as_str(),
            entry.actor.id,
            entry.actor.role.as_str(),
            entry.reason,
            entry.notes,
            entry.is_compensation as i32,
            clock::format_timestamp(entry.at),
        ],
    )
    .with_context(|| format!("failed to append history for booking {}", entry.booking_id))?;
    Ok(conn.last_insert_rowid())
}

/// Full history for a booking in the order it was written.
pub fn get_history(conn: &Connection, booking_id: &str) -> anyhow::Result<Vec<BookingStatusHistory>> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, from_status, to_status, actor_id, actor_role, reason, notes, is_compensation, created_at
         FROM booking_status_history WHERE booking_id = ?1 ORDER BY id ASC",
    )?;

    let rows = stmt.query_map(params![booking_id], |row| Ok(parse_history_row(row)))?;

    let mut history = vec![];
    for row in rows {
        history.push(row??);
    }
    Ok(history)
}

fn parse_history_row(row: &rusqlite::Row) -> anyhow::Result<BookingStatusHistory> {
    let from_status: Option<String> = row.get(2)?;
    let to_status: String = row.get(3)?;
    let actor_role: String = row.get(5)?;
    let created_at: String = row.get(9)?;

    Ok(BookingStatusHistory {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        from_status: from_status
            .as_deref()
            .map(|s| s.parse::<BookingStatus>())
            .transpose()?,
        to_status: to_status.parse()?,
        actor_id: row.get(4)?,
        actor_role: actor_role.parse()?,
        reason: row.get(6)?,
        notes: row.get(7)?,
        is_compensation: row.get::<_, i32>(8)? != 0,
        created_at: clock::parse_timestamp(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::ActorRole;

    fn setup_db() -> Connection {
        db::init_db(":memory:").unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        clock::parse_date(s).unwrap()
    }

    fn booking(id: &str, service_id: i64, start: &str, end: &str, status: BookingStatus) -> Booking {
        let now = clock::parse_timestamp("2025-06-01 09:00:00").unwrap();
        Booking {
            id: id.to_string(),
            service_id,
            date: d("2025-06-16"),
            start_time: clock::parse_hhmm(start).unwrap(),
            end_time: clock::parse_hhmm(end).unwrap(),
            status,
            payment_status: PaymentStatus::Pending,
            payment_id: None,
            customer_name: "Alice".to_string(),
            customer_email: "alice@example.com".to_string(),
            customer_phone: "+15551110000".to_string(),
            vehicle_size: VehicleSize::Medium,
            vehicle_plate: Some("ABC-123".to_string()),
            notes: None,
            assigned_bay_id: None,
            bay_assigned_at: None,
            bay_assigned_by: None,
            confirmation_code: format!("CODE{:0>4}", id.len()),
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_service_update_and_deactivate() {
        let conn = setup_db();
        let id = create_service(&conn, "Basic", 60, 1500, 1).unwrap();
        let mut service = get_service(&conn, id).unwrap().unwrap();
        assert!(service.is_active);

        service.name = "Basic plus".to_string();
        service.capacity = 3;
        assert!(update_service(&conn, &service).unwrap());
        let stored = get_service(&conn, id).unwrap().unwrap();
        assert_eq!(stored.name, "Basic plus");
        assert_eq!(stored.capacity, 3);

        assert!(set_service_active(&conn, id, false).unwrap());
        assert!(!get_service(&conn, id).unwrap().unwrap().is_active);
        assert!(!set_service_active(&conn, 999, false).unwrap());
    }

    #[test]
    fn test_booking_insert_and_lookup() {
        let conn = setup_db();
        let service_id = create_service(&conn, "Basic", 60, 1500, 1).unwrap();
        let mut b = booking("b1", service_id, "10:00", "11:00", BookingStatus::Pending);
        b.confirmation_code = "AB12CD34".to_string();
        insert_booking(&conn, &b).unwrap();

        assert_eq!(get_booking_by_id(&conn, "b1").unwrap(), Some(b.clone()));
        assert_eq!(get_booking_by_code(&conn, "ab12cd34").unwrap(), Some(b));
        assert!(confirmation_code_exists(&conn, "AB12CD34").unwrap());
        assert!(get_booking_by_id(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_confirmation_code_rejected() {
        let conn = setup_db();
        let service_id = create_service(&conn, "Basic", 60, 1500, 1).unwrap();
        let mut a = booking("a", service_id, "10:00", "11:00", BookingStatus::Pending);
        let mut b = booking("b", service_id, "12:00", "13:00", BookingStatus::Pending);
        a.confirmation_code = "SAMECODE".to_string();
        b.confirmation_code = "SAMECODE".to_string();
        insert_booking(&conn, &a).unwrap();
        assert!(insert_booking(&conn, &b).is_err());
    }

    #[test]
    fn test_occupying_bookings_exclude_cancelled_and_no_show() {
        let conn = setup_db();
        let s1 = create_service(&conn, "Basic", 60, 1500, 1).unwrap();
        let s2 = create_service(&conn, "Deluxe", 60, 2500, 1).unwrap();
        insert_booking(&conn, &booking("a", s1, "10:00", "11:00", BookingStatus::Confirmed)).unwrap();
        insert_booking(&conn, &booking("bb", s1, "11:00", "12:00", BookingStatus::Cancelled)).unwrap();
        insert_booking(&conn, &booking("ccc", s1, "12:00", "13:00", BookingStatus::NoShow)).unwrap();
        insert_booking(&conn, &booking("dddd", s2, "09:00", "10:00", BookingStatus::Pending)).unwrap();

        let all = get_occupying_bookings(&conn, d("2025-06-16"), None).unwrap();
        assert_eq!(all.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(), vec!["dddd", "a"]);

        let s1_only = get_occupying_bookings(&conn, d("2025-06-16"), Some(s1)).unwrap();
        assert_eq!(s1_only.len(), 1);
        assert_eq!(s1_only[0].id, "a");

        let by_status =
            get_bookings_for_date(&conn, d("2025-06-16"), &[BookingStatus::Cancelled, BookingStatus::NoShow])
                .unwrap();
        assert_eq!(by_status.len(), 2);
    }

    #[test]
    fn test_assign_bay_only_once() {
        let conn = setup_db();
        let s = create_service(&conn, "Basic", 60, 1500, 1).unwrap();
        let bay1 = create_bay(&conn, 1, None, VehicleSize::Small, VehicleSize::Large).unwrap();
        let bay2 = create_bay(&conn, 2, None, VehicleSize::Small, VehicleSize::Large).unwrap();
        insert_booking(&conn, &booking("a", s, "10:00", "11:00", BookingStatus::Pending)).unwrap();

        let now = clock::parse_timestamp("2025-06-01 10:00:00").unwrap();
        assert!(assign_bay(&conn, "a", bay1, "system", now).unwrap());
        assert!(!assign_bay(&conn, "a", bay2, "system", now).unwrap());

        let stored = get_booking_by_id(&conn, "a").unwrap().unwrap();
        assert_eq!(stored.assigned_bay_id, Some(bay1));
        assert_eq!(get_bay_bookings(&conn, bay1, d("2025-06-16")).unwrap().len(), 1);
    }

    #[test]
    fn test_business_hours_round_trip() {
        let conn = setup_db();
        let hours = BusinessHours::open(
            Weekday::Mon,
            clock::parse_hhmm("08:00").unwrap(),
            clock::parse_hhmm("18:00").unwrap(),
        )
        .with_break(clock::parse_hhmm("12:00").unwrap(), clock::parse_hhmm("13:00").unwrap());
        upsert_business_hours(&conn, &hours).unwrap();

        assert_eq!(get_business_hours(&conn, Weekday::Mon).unwrap(), Some(hours));
        assert!(get_business_hours(&conn, Weekday::Tue).unwrap().is_none());
    }

    #[test]
    fn test_holidays() {
        let conn = setup_db();
        let date = d("2025-12-25");
        add_holiday(&conn, &Holiday { date, name: Some("Christmas".into()) }).unwrap();
        assert!(is_holiday(&conn, date).unwrap());
        assert!(remove_holiday(&conn, date).unwrap());
        assert!(!is_holiday(&conn, date).unwrap());
    }

    #[test]
    fn test_history_round_trip() {
        let conn = setup_db();
        let s = create_service(&conn, "Basic", 60, 1500, 1).unwrap();
        insert_booking(&conn, &booking("a", s, "10:00", "11:00", BookingStatus::Pending)).unwrap();

        let actor = Actor::new("cust-1", ActorRole::Customer);
        let at = clock::parse_timestamp("2025-06-01 10:00:00").unwrap();
        insert_history(
            &conn,
            &NewHistoryEntry {
                booking_id: "a",
                from_status: None,
                to_status: BookingStatus::Pending,
                actor: &actor,
                reason: None,
                notes: Some("walk-in"),
                is_compensation: false,
                at,
            },
        )
        .unwrap();

        let history = get_history(&conn, "a").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_status, None);
        assert_eq!(history[0].to_status, BookingStatus::Pending);
        assert_eq!(history[0].actor_role, ActorRole::Customer);
        assert_eq!(history[0].notes.as_deref(), Some("walk-in"));
        assert_eq!(history[0].created_at, at);
    }

    #[test]
    fn test_settings() {
        let conn = setup_db();
        assert!(get_settings(&conn).unwrap().is_empty());
        set_setting(&conn, "lead_time_hours", "4").unwrap();
        set_setting(&conn, "lead_time_hours", "3").unwrap();
        assert_eq!(get_settings(&conn).unwrap().get("lead_time_hours").map(String::as_str), Some("3"));
    }
}
