use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::db::queries;
use crate::errors::{BookingError, BookingResult, TransitionDenial};
use crate::models::{Actor, Booking, BookingConfiguration, BookingStatus, PaymentStatus};
use crate::services::booking::publish_transition;
use crate::services::clock;
use crate::services::messaging::{self, NotificationKind};
use crate::services::payments::RefundReceipt;
use crate::services::saga::{encode, Saga, SagaContext, SagaStep};
use crate::services::workflow::{self, Transition, TransitionRequest};
use crate::state::AppState;

const VALIDATE: &str = "validate";
const TRANSITION: &str = "transition";
const REFUND: &str = "refund";

/// Cancel a booking: check eligibility, move it to CANCELLED, refund a
/// captured payment, then notify. A failed refund puts the status back.
pub async fn cancel_booking(
    state: &Arc<AppState>,
    booking_id: &str,
    actor: Actor,
    reason: &str,
) -> BookingResult<Booking> {
    let config = state.booking_config()?;

    let ctx = Saga::new("cancel_booking")
        .step(ValidateCancellation {
            state: state.clone(),
            booking_id: booking_id.to_string(),
            actor: actor.clone(),
            reason: reason.to_string(),
            config: config.clone(),
        })
        .step(CancelStatus {
            state: state.clone(),
            booking_id: booking_id.to_string(),
            actor,
            reason: reason.to_string(),
            config,
        })
        .step(RefundPayment {
            state: state.clone(),
            booking_id: booking_id.to_string(),
        })
        .step(NotifyCancelled {
            state: state.clone(),
        })
        .run()
        .await?;

    let transition: Transition = ctx.require(TRANSITION)?;
    let booking = {
        let db = state.conn()?;
        queries::get_booking_by_id(&db, booking_id)?
            .ok_or_else(|| BookingError::NotFound(format!("booking {booking_id}")))?
    };
    publish_transition(
        state,
        &Transition {
            booking: booking.clone(),
            ..transition
        },
        Some(reason),
    );

    Ok(booking)
}

struct ValidateCancellation {
    state: Arc<AppState>,
    booking_id: String,
    actor: Actor,
    reason: String,
    config: BookingConfiguration,
}

#[async_trait]
impl SagaStep for ValidateCancellation {
    fn name(&self) -> &'static str {
        VALIDATE
    }

    async fn execute(&self, _ctx: &SagaContext) -> BookingResult<Value> {
        let booking = {
            let db = self.state.conn()?;
            queries::get_booking_by_id(&db, &self.booking_id)?
                .ok_or_else(|| BookingError::NotFound(format!("booking {}", self.booking_id)))?
        };

        let denied = |denial| BookingError::InvalidTransition {
            from: Some(booking.status),
            to: BookingStatus::Cancelled,
            denial,
        };
        if booking.status.is_terminal() {
            return Err(denied(TransitionDenial::NoRule));
        }
        workflow::is_transition_allowed(
            Some(booking.status),
            BookingStatus::Cancelled,
            self.actor.role,
            &booking,
            &self.config,
            clock::now(),
        )
        .map_err(denied)?;
        if self.reason.trim().is_empty() {
            return Err(denied(TransitionDenial::ReasonRequired));
        }

        encode(&booking)
    }
}

struct CancelStatus {
    state: Arc<AppState>,
    booking_id: String,
    actor: Actor,
    reason: String,
    config: BookingConfiguration,
}

#[async_trait]
impl SagaStep for CancelStatus {
    fn name(&self) -> &'static str {
        TRANSITION
    }

    async fn execute(&self, _ctx: &SagaContext) -> BookingResult<Value> {
        let transition = {
            let mut db = self.state.conn()?;
            workflow::execute(
                &mut db,
                &self.booking_id,
                TransitionRequest::new(BookingStatus::Cancelled, &self.actor).reason(&self.reason),
                &self.config,
                clock::now(),
            )?
        };
        encode(&transition)
    }

    async fn compensate(&self, _ctx: &SagaContext, result: &Value) -> BookingResult<()> {
        let transition: Transition = serde_json::from_value(result.clone())
            .map_err(|e| BookingError::Internal(e.into()))?;
        let mut db = self.state.conn()?;
        workflow::restore_status(
            &mut db,
            &self.booking_id,
            transition.from,
            &Actor::system(),
            "cancellation rolled back",
            clock::now(),
        )?;
        Ok(())
    }
}

struct RefundPayment {
    state: Arc<AppState>,
    booking_id: String,
}

#[async_trait]
impl SagaStep for RefundPayment {
    fn name(&self) -> &'static str {
        REFUND
    }

    async fn execute(&self, ctx: &SagaContext) -> BookingResult<Value> {
        let before: Booking = ctx.require(VALIDATE)?;
        if before.payment_status != PaymentStatus::Paid {
            return Ok(Value::Null);
        }
        let Some(payment_id) = before.payment_id else {
            tracing::warn!(booking_id = %self.booking_id, "paid booking has no payment id, skipping refund");
            return Ok(Value::Null);
        };
        let gateway = self.state.payments.clone().ok_or_else(|| {
            BookingError::Payment("payment captured but no gateway configured to refund it".into())
        })?;

        let refund = gateway
            .refund(&payment_id)
            .await
            .map_err(|e| BookingError::Payment(e.to_string()))?;
        let recorded = self.state.conn().and_then(|db| {
            queries::update_payment(&db, &self.booking_id, PaymentStatus::Refunded, None, clock::now())
                .map_err(BookingError::from)
        });
        if let Err(e) = recorded {
            // This step failed, so the runner will not compensate it.
            if let Err(reverse_err) = gateway.reverse_refund(&refund).await {
                tracing::error!(
                    booking_id = %self.booking_id,
                    refund_id = %refund.refund_id,
                    error = %reverse_err,
                    critical = true,
                    "refund issued but not recorded and could not be reversed"
                );
            }
            return Err(e);
        }

        tracing::info!(booking_id = %self.booking_id, refund_id = %refund.refund_id, "payment refunded");
        encode(&refund)
    }

    async fn compensate(&self, _ctx: &SagaContext, result: &Value) -> BookingResult<()> {
        if result.is_null() {
            return Ok(());
        }
        let refund: RefundReceipt = serde_json::from_value(result.clone())
            .map_err(|e| BookingError::Internal(e.into()))?;
        let gateway = self
            .state
            .payments
            .clone()
            .ok_or_else(|| BookingError::Payment("no payment gateway configured".into()))?;

        gateway
            .reverse_refund(&refund)
            .await
            .map_err(|e| BookingError::Payment(e.to_string()))?;
        let db = self.state.conn()?;
        queries::update_payment(&db, &self.booking_id, PaymentStatus::Paid, None, clock::now())?;
        Ok(())
    }
}

struct NotifyCancelled {
    state: Arc<AppState>,
}

#[async_trait]
impl SagaStep for NotifyCancelled {
    fn name(&self) -> &'static str {
        "notify"
    }

    async fn execute(&self, ctx: &SagaContext) -> BookingResult<Value> {
        let transition: Transition = ctx.require(TRANSITION)?;
        messaging::dispatch(
            self.state.notifier.clone(),
            NotificationKind::BookingCancelled,
            &transition.booking,
        );
        Ok(Value::Null)
    }
}
