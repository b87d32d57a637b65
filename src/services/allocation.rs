use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::errors::{BookingError, BookingResult};
use crate::models::{Actor, Booking, VehicleSize};
use crate::services::conflict::{self, TimeRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned(i64),
    AlreadyAssigned(i64),
    NoBayAvailable,
}

impl AssignOutcome {
    pub fn is_assigned(&self) -> bool {
        !matches!(self, AssignOutcome::NoBayAvailable)
    }

    pub fn bay_id(&self) -> Option<i64> {
        match self {
            AssignOutcome::Assigned(id) | AssignOutcome::AlreadyAssigned(id) => Some(*id),
            AssignOutcome::NoBayAvailable => None,
        }
    }
}

/// Lowest-numbered enabled bay that takes `size` and has nothing booked
/// over `range` on `date`. `exclude` keeps a booking from conflicting with
/// itself.
pub fn find_bay(
    conn: &Connection,
    date: NaiveDate,
    range: &TimeRange,
    size: VehicleSize,
    exclude: Option<&str>,
) -> BookingResult<Option<i64>> {
    for bay in queries::list_enabled_bays(conn)?
        .into_iter()
        .filter(|bay| bay.accepts(size))
    {
        let mut booked = queries::get_bay_bookings(conn, bay.id, date)?;
        if let Some(id) = exclude {
            booked.retain(|b| b.id != id);
        }
        if conflict::count_overlapping(&booked, range) == 0 {
            return Ok(Some(bay.id));
        }
    }
    Ok(None)
}

/// Give a booking a bay if it has none. Runs in its own transaction so a
/// miss leaves the booking untouched. Returns the outcome and the booking as
/// it stands afterwards.
pub fn auto_assign(
    conn: &mut Connection,
    booking_id: &str,
    actor: &Actor,
    now: NaiveDateTime,
) -> BookingResult<(AssignOutcome, Booking)> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let booking = queries::get_booking_by_id(&tx, booking_id)?
        .ok_or_else(|| BookingError::NotFound(format!("booking {booking_id}")))?;

    if let Some(bay_id) = booking.assigned_bay_id {
        return Ok((AssignOutcome::AlreadyAssigned(bay_id), booking));
    }
    if !booking.status.occupies_calendar() {
        tracing::debug!(booking_id, status = booking.status.as_str(), "not assigning a bay");
        return Ok((AssignOutcome::NoBayAvailable, booking));
    }

    let range = TimeRange::of_booking(&booking);
    let Some(bay_id) = find_bay(&tx, booking.date, &range, booking.vehicle_size, Some(booking_id))? else {
        tracing::info!(booking_id, "no bay available");
        return Ok((AssignOutcome::NoBayAvailable, booking));
    };

    queries::assign_bay(&tx, booking_id, bay_id, &actor.id, now)?;
    let updated = queries::get_booking_by_id(&tx, booking_id)?
        .ok_or_else(|| BookingError::NotFound(format!("booking {booking_id}")))?;
    tx.commit()?;

    tracing::info!(booking_id, bay_id, "bay assigned");
    Ok((AssignOutcome::Assigned(bay_id), updated))
}
