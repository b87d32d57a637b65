//! Booking status state machine.
//!
//! Every status change goes through [`apply`] (or [`execute`], which wraps it
//! in its own transaction) so the rule table is consulted against the
//! persisted status and exactly one history row is written per change.

use chrono::NaiveDateTime;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::db::queries::{self, NewHistoryEntry};
use crate::errors::{BookingError, BookingResult, TransitionDenial};
use crate::models::{Actor, ActorRole, Booking, BookingConfiguration, BookingStatus};

use ActorRole::{Admin, Customer, Staff, System};
use BookingStatus::{Cancelled, Completed, Confirmed, InProgress, NoShow, Pending};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Appointment is at least `cancellation_deadline_hours` away, unless the
    /// actor is privileged.
    CancellationDeadline,
}

impl Condition {
    pub fn label(&self) -> &'static str {
        match self {
            Condition::CancellationDeadline => "cancellation deadline passed",
        }
    }

    pub fn holds(
        &self,
        booking: &Booking,
        role: ActorRole,
        config: &BookingConfiguration,
        now: NaiveDateTime,
    ) -> bool {
        match self {
            Condition::CancellationDeadline => {
                role.is_privileged()
                    || booking.hours_until_start(now) >= config.cancellation_deadline_hours as f64
            }
        }
    }
}

#[derive(Debug)]
pub struct TransitionRule {
    pub from: Option<BookingStatus>,
    pub to: BookingStatus,
    pub roles: &'static [ActorRole],
    pub requires_reason: bool,
    pub condition: Option<Condition>,
}

const fn rule(
    from: Option<BookingStatus>,
    to: BookingStatus,
    roles: &'static [ActorRole],
    requires_reason: bool,
    condition: Option<Condition>,
) -> TransitionRule {
    TransitionRule {
        from,
        to,
        roles,
        requires_reason,
        condition,
    }
}

pub static RULES: &[TransitionRule] = &[
    rule(None, Pending, &[Customer, Admin, System], false, None),
    rule(Some(Pending), Confirmed, &[Admin, Staff, System], false, None),
    rule(Some(Confirmed), InProgress, &[Staff, Admin, System], false, None),
    rule(Some(InProgress), Completed, &[Staff, Admin, System], false, None),
    rule(Some(Confirmed), Completed, &[Admin, System], false, None),
    rule(Some(Pending), Cancelled, &[Customer, Admin, System], true, None),
    rule(
        Some(Confirmed),
        Cancelled,
        &[Customer, Admin, System],
        true,
        Some(Condition::CancellationDeadline),
    ),
    rule(Some(Confirmed), NoShow, &[Staff, Admin, System], false, None),
    rule(Some(InProgress), NoShow, &[Staff, Admin, System], false, None),
];

pub fn find_rule(from: Option<BookingStatus>, to: BookingStatus) -> Option<&'static TransitionRule> {
    RULES.iter().find(|r| r.from == from && r.to == to)
}

/// Rule lookup plus role and eligibility checks. Reason presence is checked
/// separately by [`apply`].
pub fn is_transition_allowed(
    from: Option<BookingStatus>,
    to: BookingStatus,
    role: ActorRole,
    booking: &Booking,
    config: &BookingConfiguration,
    now: NaiveDateTime,
) -> Result<&'static TransitionRule, TransitionDenial> {
    let rule = find_rule(from, to).ok_or(TransitionDenial::NoRule)?;
    if !rule.roles.contains(&role) {
        return Err(TransitionDenial::RoleNotPermitted(role));
    }
    if let Some(condition) = rule.condition {
        if !condition.holds(booking, role, config, now) {
            return Err(TransitionDenial::ConditionFailed(condition.label()));
        }
    }
    Ok(rule)
}

/// Statuses reachable from `from` under the table, ignoring roles.
pub fn next_statuses(from: BookingStatus) -> Vec<BookingStatus> {
    RULES
        .iter()
        .filter(|r| r.from == Some(from))
        .map(|r| r.to)
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct TransitionRequest<'a> {
    pub to: BookingStatus,
    pub actor: &'a Actor,
    pub reason: Option<&'a str>,
    pub notes: Option<&'a str>,
}

impl<'a> TransitionRequest<'a> {
    pub fn new(to: BookingStatus, actor: &'a Actor) -> Self {
        Self {
            to,
            actor,
            reason: None,
            notes: None,
        }
    }

    pub fn reason(mut self, reason: &'a str) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn notes(mut self, notes: &'a str) -> Self {
        self.notes = Some(notes);
        self
    }
}

/// Result of a committed status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub booking: Booking,
    pub from: BookingStatus,
    pub history_id: i64,
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Write the creation row (`none -> PENDING`) for a freshly inserted booking.
pub fn record_creation(
    conn: &Connection,
    booking: &Booking,
    actor: &Actor,
    notes: Option<&str>,
    config: &BookingConfiguration,
    now: NaiveDateTime,
) -> BookingResult<i64> {
    is_transition_allowed(None, Pending, actor.role, booking, config, now).map_err(|denial| {
        BookingError::InvalidTransition {
            from: None,
            to: Pending,
            denial,
        }
    })?;

    let id = queries::insert_history(
        conn,
        &NewHistoryEntry {
            booking_id: &booking.id,
            from_status: None,
            to_status: Pending,
            actor,
            reason: None,
            notes: non_blank(notes),
            is_compensation: false,
            at: now,
        },
    )?;
    Ok(id)
}

/// Apply a transition inside the caller's transaction.
pub fn apply(
    conn: &Connection,
    booking_id: &str,
    request: TransitionRequest<'_>,
    config: &BookingConfiguration,
    now: NaiveDateTime,
) -> BookingResult<Transition> {
    let mut booking = queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| BookingError::NotFound(format!("booking {booking_id}")))?;
    let from = booking.status;
    let to = request.to;

    let denied = |denial| BookingError::InvalidTransition {
        from: Some(from),
        to,
        denial,
    };

    let rule = is_transition_allowed(Some(from), to, request.actor.role, &booking, config, now)
        .map_err(denied)?;
    let reason = non_blank(request.reason);
    if rule.requires_reason && reason.is_none() {
        return Err(denied(TransitionDenial::ReasonRequired));
    }

    booking.status = to;
    booking.updated_at = now;
    match to {
        Cancelled => {
            booking.cancelled_at.get_or_insert(now);
        }
        Completed => {
            booking.completed_at.get_or_insert(now);
        }
        _ => {}
    }
    queries::update_booking_lifecycle(conn, &booking)?;

    let history_id = queries::insert_history(
        conn,
        &NewHistoryEntry {
            booking_id,
            from_status: Some(from),
            to_status: to,
            actor: request.actor,
            reason,
            notes: non_blank(request.notes),
            is_compensation: false,
            at: now,
        },
    )?;

    tracing::info!(
        booking_id,
        from = from.as_str(),
        to = to.as_str(),
        actor = %request.actor.id,
        role = request.actor.role.as_str(),
        "status transition"
    );

    Ok(Transition {
        booking,
        from,
        history_id,
    })
}

/// Apply a transition in its own write transaction.
pub fn execute(
    conn: &mut Connection,
    booking_id: &str,
    request: TransitionRequest<'_>,
    config: &BookingConfiguration,
    now: NaiveDateTime,
) -> BookingResult<Transition> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let transition = apply(&tx, booking_id, request, config, now)?;
    tx.commit()?;
    Ok(transition)
}

/// Undo a status change as a saga compensation. Bypasses the rule table and
/// marks the history row as a compensation so replay can tell it apart.
pub fn restore_status(
    conn: &mut Connection,
    booking_id: &str,
    to: BookingStatus,
    actor: &Actor,
    reason: &str,
    now: NaiveDateTime,
) -> BookingResult<Transition> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut booking = queries::get_booking_by_id(&tx, booking_id)?
        .ok_or_else(|| BookingError::NotFound(format!("booking {booking_id}")))?;
    let from = booking.status;

    booking.status = to;
    booking.updated_at = now;
    if from == Cancelled {
        booking.cancelled_at = None;
    }
    if from == Completed {
        booking.completed_at = None;
    }
    queries::update_booking_lifecycle(&tx, &booking)?;

    let history_id = queries::insert_history(
        &tx,
        &NewHistoryEntry {
            booking_id,
            from_status: Some(from),
            to_status: to,
            actor,
            reason: Some(reason),
            notes: None,
            is_compensation: true,
            at: now,
        },
    )?;
    tx.commit()?;

    tracing::warn!(
        booking_id,
        from = from.as_str(),
        to = to.as_str(),
        "status restored by compensation"
    );

    Ok(Transition {
        booking,
        from,
        history_id,
    })
}

/// Outcome of replaying a booking's history against the rule table.
/// Errors mean a recorded transition was not legal when it happened;
/// warnings mean bookkeeping is incomplete.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn validate(
    conn: &Connection,
    booking_id: &str,
    config: &BookingConfiguration,
) -> BookingResult<ValidationReport> {
    let booking = queries::get_booking_by_id(conn, booking_id)?
        .ok_or_else(|| BookingError::NotFound(format!("booking {booking_id}")))?;
    let history = queries::get_history(conn, booking_id)?;
    let mut report = ValidationReport::default();

    let Some(first) = history.first() else {
        report.errors.push("no status history recorded".to_string());
        return Ok(report);
    };
    if first.from_status.is_some() || first.to_status != Pending {
        report.errors.push(format!(
            "history #{} does not start with creation as pending",
            first.id
        ));
    }

    let mut current: Option<BookingStatus> = None;
    for row in &history {
        let label = format!(
            "#{} {} -> {}",
            row.id,
            row.from_status.map(|s| s.as_str()).unwrap_or("(none)"),
            row.to_status.as_str()
        );

        if row.from_status != current {
            report.errors.push(format!(
                "{label}: expected from {}",
                current.map(|s| s.as_str()).unwrap_or("(none)")
            ));
        }

        if row.is_compensation {
            report.warnings.push(format!("{label}: compensation by {}", row.actor_id));
            current = Some(row.to_status);
            continue;
        }

        match is_transition_allowed(
            row.from_status,
            row.to_status,
            row.actor_role,
            &booking,
            config,
            row.created_at,
        ) {
            Ok(rule) => {
                if rule.requires_reason && non_blank(row.reason.as_deref()).is_none() {
                    report.warnings.push(format!("{label}: missing reason"));
                }
            }
            Err(denial) => report.errors.push(format!("{label}: {denial} at recorded time")),
        }

        current = Some(row.to_status);
    }

    if current != Some(booking.status) {
        report.warnings.push(format!(
            "current status {} does not match last history entry {}",
            booking.status.as_str(),
            current.map(|s| s.as_str()).unwrap_or("(none)")
        ));
    }

    Ok(report)
}
