use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::BookingResult;
use crate::models::{Actor, BookingConfiguration, BookingStatus};
use crate::services::booking::publish_transition;
use crate::services::clock;
use crate::services::messaging::{self, NotificationKind};
use crate::services::workflow::{self, Transition, TransitionRequest};
use crate::state::AppState;

const NO_SHOW_REASON: &str = "no check-in within grace period";

#[derive(Debug, Default)]
pub struct SweepOutcome {
    pub transitions: Vec<Transition>,
    pub failed: usize,
}

/// Move CONFIRMED bookings whose start is more than the grace period in the
/// past to NO_SHOW. Each booking gets its own transaction; one failure does
/// not stop the rest.
pub fn sweep_no_shows(
    conn: &mut Connection,
    config: &BookingConfiguration,
    now: NaiveDateTime,
) -> BookingResult<SweepOutcome> {
    let cutoff = now - chrono::Duration::minutes(config.no_show_grace_minutes);
    let stale: Vec<_> = queries::get_bookings_with_status_until(conn, BookingStatus::Confirmed, cutoff.date())?
        .into_iter()
        .filter(|b| b.starts_at() < cutoff)
        .collect();

    let system = Actor::system();
    let mut outcome = SweepOutcome::default();
    for booking in stale {
        let request = TransitionRequest::new(BookingStatus::NoShow, &system).reason(NO_SHOW_REASON);
        match workflow::execute(conn, &booking.id, request, config, now) {
            Ok(transition) => outcome.transitions.push(transition),
            Err(e) => {
                outcome.failed += 1;
                tracing::error!(error = %e, booking_id = %booking.id, "no-show sweep failed for booking");
            }
        }
    }

    Ok(outcome)
}

/// One sweep against the shared state, with events and notifications.
pub fn run_sweep(state: &AppState) -> BookingResult<SweepOutcome> {
    let config = state.booking_config()?;
    let outcome = {
        let mut db = state.conn()?;
        sweep_no_shows(&mut db, &config, clock::now())?
    };

    for transition in &outcome.transitions {
        publish_transition(state, transition, Some(NO_SHOW_REASON));
        messaging::dispatch(state.notifier.clone(), NotificationKind::BookingNoShow, &transition.booking);
    }

    tracing::info!(
        processed = outcome.transitions.len(),
        failed = outcome.failed,
        "no-show sweep finished"
    );
    Ok(outcome)
}

/// Sweep every `period` until the task is dropped.
pub async fn run_sweeper(state: Arc<AppState>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = run_sweep(&state) {
            tracing::error!(error = %e, "no-show sweep aborted");
        }
    }
}
