use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rand::Rng;
use rusqlite::{Connection, TransactionBehavior};
use serde_json::Value;

use crate::db::queries;
use crate::errors::{BookingError, BookingResult};
use crate::models::{
    Actor, ActorRole, Booking, BookingConfiguration, BookingRequest, BookingStatus,
    BookingStatusHistory, PaymentStatus, SlotCapacityPolicy, TimeSlot,
};
use crate::services::allocation::{self, AssignOutcome};
use crate::services::availability;
use crate::services::clock;
use crate::services::events::LifecycleEvent;
use crate::services::messaging::{self, NotificationKind};
use crate::services::payments::{PaymentData, PaymentReceipt};
use crate::services::saga::{encode, Saga, SagaContext, SagaStep};
use crate::services::workflow::{self, Transition, TransitionRequest, ValidationReport};
use crate::state::AppState;

pub const CODE_LENGTH: usize = 8;
const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_ATTEMPTS: usize = 10;

pub fn random_code(rng: &mut impl Rng) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LENGTH
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// A confirmation code not used by any booking yet. The unique index on
/// `confirmation_code` still backs this up at insert time.
pub fn generate_unique_code(conn: &Connection) -> BookingResult<String> {
    let mut rng = rand::thread_rng();
    for _ in 0..CODE_ATTEMPTS {
        let code = random_code(&mut rng);
        if !queries::confirmation_code_exists(conn, &code)? {
            return Ok(code);
        }
        tracing::warn!(code = %code, "confirmation code collision, retrying");
    }
    Err(BookingError::Internal(anyhow::anyhow!(
        "no unique confirmation code after {CODE_ATTEMPTS} attempts"
    )))
}

#[derive(Debug, Clone)]
pub struct CreateBookingOptions {
    /// Skip calendar and conflict checks (staff walk-ins, imports).
    pub skip_availability_check: bool,
    pub actor: Actor,
    /// Overrides the `slot_capacity_policy` setting for this call.
    pub capacity_policy: Option<SlotCapacityPolicy>,
}

impl Default for CreateBookingOptions {
    fn default() -> Self {
        Self {
            skip_availability_check: false,
            actor: Actor::new("customer", ActorRole::Customer),
            capacity_policy: None,
        }
    }
}

/// Check, insert and record creation in one write transaction. With
/// `auto_confirm` the booking is confirmed by the system in the same
/// transaction.
pub fn insert_new_booking(
    conn: &mut Connection,
    request: &BookingRequest,
    options: &CreateBookingOptions,
    config: &BookingConfiguration,
    now: NaiveDateTime,
) -> BookingResult<Booking> {
    request.validate()?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let service = queries::get_service(&tx, request.service_id)?
        .ok_or_else(|| BookingError::NotFound(format!("service {}", request.service_id)))?;
    if !service.is_active {
        return Err(BookingError::Validation(format!(
            "service '{}' is not available for booking",
            service.name
        )));
    }

    let range = if options.skip_availability_check {
        availability::booking_range(&service, request.start_time)?
    } else {
        availability::ensure_bookable(&tx, &service, request.date, request.start_time, config, now)?
    };

    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        service_id: service.id,
        date: request.date,
        start_time: range.start,
        end_time: range.end,
        status: BookingStatus::Pending,
        payment_status: PaymentStatus::Pending,
        payment_id: None,
        customer_name: request.customer_name.trim().to_string(),
        customer_email: request.customer_email.trim().to_string(),
        customer_phone: request.customer_phone.trim().to_string(),
        vehicle_size: request.vehicle_size,
        vehicle_plate: request.vehicle_plate.clone(),
        notes: request.notes.clone(),
        assigned_bay_id: None,
        bay_assigned_at: None,
        bay_assigned_by: None,
        confirmation_code: generate_unique_code(&tx)?,
        created_at: now,
        updated_at: now,
        cancelled_at: None,
        completed_at: None,
    };
    queries::insert_booking(&tx, &booking)?;
    workflow::record_creation(&tx, &booking, &options.actor, None, config, now)?;

    let booking = if config.auto_confirm {
        let system = Actor::system();
        workflow::apply(
            &tx,
            &booking.id,
            TransitionRequest::new(BookingStatus::Confirmed, &system).notes("auto-confirmed"),
            config,
            now,
        )?
        .booking
    } else {
        booking
    };

    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        code = %booking.confirmation_code,
        date = %booking.date,
        start = %clock::format_hhmm(booking.start_time),
        status = booking.status.as_str(),
        "booking created"
    );
    Ok(booking)
}

/// Create a booking. Without payment data this is one transaction; with it,
/// a saga that charges the customer and cancels the booking again if the
/// charge or confirmation fails. Bay assignment runs afterwards and never
/// fails the booking.
pub async fn create_booking(
    state: &Arc<AppState>,
    request: BookingRequest,
    payment: Option<PaymentData>,
    options: CreateBookingOptions,
) -> BookingResult<Booking> {
    let mut config = state.booking_config()?;
    if let Some(policy) = options.capacity_policy {
        config.capacity_policy = policy;
    }

    let booking = match payment {
        None => {
            let booking = {
                let mut db = state.conn()?;
                insert_new_booking(&mut db, &request, &options, &config, clock::now())?
            };
            publish_created(state, &booking);
            let booking = assign_if_enabled(state, booking, &config);

            let kind = if booking.status == BookingStatus::Confirmed {
                NotificationKind::BookingConfirmed
            } else {
                NotificationKind::BookingCreated
            };
            messaging::dispatch(state.notifier.clone(), kind, &booking);
            booking
        }
        Some(payment) => {
            let booking = create_with_payment(state, request, payment, options, config.clone()).await?;
            assign_if_enabled(state, booking, &config)
        }
    };

    Ok(booking)
}

fn publish_created(state: &AppState, booking: &Booking) {
    if booking.status == BookingStatus::Pending {
        state.events.publish(LifecycleEvent::Created {
            booking: booking.clone(),
        });
        return;
    }
    // Auto-confirmed: report both steps.
    let mut pending = booking.clone();
    pending.status = BookingStatus::Pending;
    state.events.publish(LifecycleEvent::Created { booking: pending });
    state.events.publish(LifecycleEvent::StatusChanged {
        booking: booking.clone(),
        from: BookingStatus::Pending,
        to: booking.status,
        reason: None,
    });
}

fn assign_if_enabled(state: &AppState, booking: Booking, config: &BookingConfiguration) -> Booking {
    if !config.auto_assign_bays {
        return booking;
    }
    match assign_bay(state, &booking.id, &Actor::system()) {
        Ok((_, updated)) => updated,
        Err(e) => {
            tracing::warn!(error = %e, booking_id = %booking.id, "bay assignment failed, booking left unassigned");
            booking
        }
    }
}

async fn create_with_payment(
    state: &Arc<AppState>,
    request: BookingRequest,
    payment: PaymentData,
    options: CreateBookingOptions,
    config: BookingConfiguration,
) -> BookingResult<Booking> {
    let ctx = Saga::new("create_booking")
        .step(CreatePendingBooking {
            state: state.clone(),
            request,
            options,
            // Confirmation waits for the charge.
            config: BookingConfiguration {
                auto_confirm: false,
                ..config.clone()
            },
        })
        .step(ChargePayment {
            state: state.clone(),
            payment,
        })
        .step(FinalizeBooking {
            state: state.clone(),
            config,
        })
        .step(NotifyCustomer {
            state: state.clone(),
            kind: NotificationKind::BookingConfirmed,
        })
        .run()
        .await?;

    ctx.require::<Booking>(FINALIZE)
}

const CREATE: &str = "create_booking";
const CHARGE: &str = "charge_payment";
const FINALIZE: &str = "finalize";

struct CreatePendingBooking {
    state: Arc<AppState>,
    request: BookingRequest,
    options: CreateBookingOptions,
    config: BookingConfiguration,
}

#[async_trait]
impl SagaStep for CreatePendingBooking {
    fn name(&self) -> &'static str {
        CREATE
    }

    async fn execute(&self, _ctx: &SagaContext) -> BookingResult<Value> {
        let booking = {
            let mut db = self.state.conn()?;
            insert_new_booking(&mut db, &self.request, &self.options, &self.config, clock::now())?
        };
        publish_created(&self.state, &booking);
        encode(&booking)
    }

    async fn compensate(&self, _ctx: &SagaContext, result: &Value) -> BookingResult<()> {
        let booking: Booking = serde_json::from_value(result.clone())
            .map_err(|e| BookingError::Internal(e.into()))?;
        let system = Actor::system();
        let transition = {
            let mut db = self.state.conn()?;
            workflow::execute(
                &mut db,
                &booking.id,
                TransitionRequest::new(BookingStatus::Cancelled, &system).reason("payment failed"),
                &self.config,
                clock::now(),
            )?
        };
        publish_transition(&self.state, &transition, Some("payment failed"));
        Ok(())
    }
}

struct ChargePayment {
    state: Arc<AppState>,
    payment: PaymentData,
}

#[async_trait]
impl SagaStep for ChargePayment {
    fn name(&self) -> &'static str {
        CHARGE
    }

    async fn execute(&self, ctx: &SagaContext) -> BookingResult<Value> {
        let booking: Booking = ctx.require(CREATE)?;
        let gateway = self
            .state
            .payments
            .clone()
            .ok_or_else(|| BookingError::Payment("no payment gateway configured".into()))?;

        let receipt = gateway
            .charge(&booking.id, &self.payment)
            .await
            .map_err(|e| BookingError::Payment(e.to_string()))?;

        tracing::info!(
            booking_id = %booking.id,
            payment_id = %receipt.payment_id,
            amount_cents = receipt.amount_cents,
            "payment captured"
        );
        encode(&receipt)
    }

    async fn compensate(&self, _ctx: &SagaContext, result: &Value) -> BookingResult<()> {
        let receipt: PaymentReceipt = serde_json::from_value(result.clone())
            .map_err(|e| BookingError::Internal(e.into()))?;
        let gateway = self
            .state
            .payments
            .clone()
            .ok_or_else(|| BookingError::Payment("no payment gateway configured".into()))?;
        gateway
            .refund(&receipt.payment_id)
            .await
            .map_err(|e| BookingError::Payment(e.to_string()))?;
        tracing::info!(payment_id = %receipt.payment_id, "payment refunded");
        Ok(())
    }
}

struct FinalizeBooking {
    state: Arc<AppState>,
    config: BookingConfiguration,
}

#[async_trait]
impl SagaStep for FinalizeBooking {
    fn name(&self) -> &'static str {
        FINALIZE
    }

    fn max_attempts(&self) -> u32 {
        3
    }

    async fn execute(&self, ctx: &SagaContext) -> BookingResult<Value> {
        let booking: Booking = ctx.require(CREATE)?;
        let receipt: PaymentReceipt = ctx.require(CHARGE)?;
        let system = Actor::system();

        let transition = {
            let mut db = self.state.conn()?;
            let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let now = clock::now();
            queries::update_payment(&tx, &booking.id, PaymentStatus::Paid, Some(&receipt.payment_id), now)?;
            let transition = workflow::apply(
                &tx,
                &booking.id,
                TransitionRequest::new(BookingStatus::Confirmed, &system).notes("payment captured"),
                &self.config,
                now,
            )?;
            tx.commit()?;
            transition
        };

        publish_transition(&self.state, &transition, None);
        encode(&transition.booking)
    }
}

struct NotifyCustomer {
    state: Arc<AppState>,
    kind: NotificationKind,
}

#[async_trait]
impl SagaStep for NotifyCustomer {
    fn name(&self) -> &'static str {
        "notify"
    }

    async fn execute(&self, ctx: &SagaContext) -> BookingResult<Value> {
        let booking: Booking = ctx.require(FINALIZE)?;
        messaging::dispatch(self.state.notifier.clone(), self.kind, &booking);
        Ok(Value::Null)
    }
}

/// Publish the event matching a committed transition.
pub(crate) fn publish_transition(state: &AppState, transition: &Transition, reason: Option<&str>) {
    let booking = transition.booking.clone();
    let reason = reason.map(str::to_string);
    let event = if booking.status == BookingStatus::Cancelled {
        LifecycleEvent::Cancelled {
            from: transition.from,
            booking,
            reason,
        }
    } else {
        LifecycleEvent::StatusChanged {
            from: transition.from,
            to: booking.status,
            booking,
            reason,
        }
    };
    state.events.publish(event);
}

/// Move a booking to `to` through the workflow and notify the customer where
/// it matters to them.
pub fn change_status(
    state: &AppState,
    booking_id: &str,
    request: TransitionRequest<'_>,
) -> BookingResult<Booking> {
    let config = state.booking_config()?;
    let transition = {
        let mut db = state.conn()?;
        workflow::execute(&mut db, booking_id, request, &config, clock::now())?
    };
    publish_transition(state, &transition, request.reason);

    let kind = match transition.booking.status {
        BookingStatus::Confirmed => Some(NotificationKind::BookingConfirmed),
        BookingStatus::Cancelled => Some(NotificationKind::BookingCancelled),
        BookingStatus::NoShow => Some(NotificationKind::BookingNoShow),
        _ => None,
    };
    if let Some(kind) = kind {
        messaging::dispatch(state.notifier.clone(), kind, &transition.booking);
    }

    Ok(transition.booking)
}

/// Assign a bay if the booking has none, publishing `booking.assigned` on a
/// new assignment.
pub fn assign_bay(state: &AppState, booking_id: &str, actor: &Actor) -> BookingResult<(AssignOutcome, Booking)> {
    let (outcome, booking) = {
        let mut db = state.conn()?;
        allocation::auto_assign(&mut db, booking_id, actor, clock::now())?
    };
    if let AssignOutcome::Assigned(bay_id) = outcome {
        state.events.publish(LifecycleEvent::Assigned {
            booking: booking.clone(),
            bay_id,
        });
    }
    Ok((outcome, booking))
}

pub fn available_slots(
    state: &AppState,
    date: NaiveDate,
    service_id: i64,
    policy: Option<SlotCapacityPolicy>,
) -> BookingResult<Vec<TimeSlot>> {
    let mut config = state.booking_config()?;
    if let Some(policy) = policy {
        config.capacity_policy = policy;
    }
    let db = state.conn()?;
    availability::generate_slots(&db, date, service_id, &config, clock::now())
}

pub fn get_booking(state: &AppState, booking_id: &str) -> BookingResult<Booking> {
    let db = state.conn()?;
    queries::get_booking_by_id(&db, booking_id)?
        .ok_or_else(|| BookingError::NotFound(format!("booking {booking_id}")))
}

pub fn find_by_confirmation_code(state: &AppState, code: &str) -> BookingResult<Booking> {
    let db = state.conn()?;
    queries::get_booking_by_code(&db, code)?
        .ok_or_else(|| BookingError::NotFound(format!("confirmation code {code}")))
}

pub fn bookings_on(state: &AppState, date: NaiveDate, statuses: &[BookingStatus]) -> BookingResult<Vec<Booking>> {
    let db = state.conn()?;
    Ok(queries::get_bookings_for_date(&db, date, statuses)?)
}

pub fn booking_history(state: &AppState, booking_id: &str) -> BookingResult<Vec<BookingStatusHistory>> {
    let db = state.conn()?;
    if queries::get_booking_by_id(&db, booking_id)?.is_none() {
        return Err(BookingError::NotFound(format!("booking {booking_id}")));
    }
    Ok(queries::get_history(&db, booking_id)?)
}

pub fn validate_history(state: &AppState, booking_id: &str) -> BookingResult<ValidationReport> {
    let config = state.booking_config()?;
    let db = state.conn()?;
    let report = workflow::validate(&db, booking_id, &config)?;
    for warning in &report.warnings {
        tracing::warn!(booking_id, warning = %warning, "history validation warning");
    }
    for error in &report.errors {
        tracing::error!(booking_id, error = %error, "history validation error");
    }
    Ok(report)
}
