pub mod twilio;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::models::Booking;
use crate::services::clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingCreated,
    BookingConfirmed,
    BookingCancelled,
    BookingNoShow,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BookingCreated => "booking_created",
            NotificationKind::BookingConfirmed => "booking_confirmed",
            NotificationKind::BookingCancelled => "booking_cancelled",
            NotificationKind::BookingNoShow => "booking_no_show",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl Recipient {
    pub fn of_booking(booking: &Booking) -> Self {
        Self {
            name: booking.customer_name.clone(),
            email: booking.customer_email.clone(),
            phone: booking.customer_phone.clone(),
        }
    }
}

/// Outbound customer notification. Transport is up to the implementation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, kind: NotificationKind, recipient: &Recipient, payload: &Value) -> anyhow::Result<()>;
}

/// Writes notifications to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, kind: NotificationKind, recipient: &Recipient, payload: &Value) -> anyhow::Result<()> {
        tracing::info!(
            kind = kind.as_str(),
            to = %recipient.email,
            payload = %payload,
            "notification (not delivered)"
        );
        Ok(())
    }
}

/// Template fields for a booking notification.
pub fn booking_payload(booking: &Booking) -> Value {
    serde_json::json!({
        "booking_id": booking.id,
        "confirmation_code": booking.confirmation_code,
        "customer_name": booking.customer_name,
        "date": clock::format_date(booking.date),
        "start_time": clock::format_hhmm(booking.start_time),
        "end_time": clock::format_hhmm(booking.end_time),
        "status": booking.status.as_str(),
        "bay_id": booking.assigned_bay_id,
    })
}

/// Fire-and-forget delivery. Failures are logged and never reach the caller.
pub fn dispatch(notifier: Arc<dyn Notifier>, kind: NotificationKind, booking: &Booking) {
    let recipient = Recipient::of_booking(booking);
    let payload = booking_payload(booking);
    let booking_id = booking.id.clone();

    tokio::spawn(async move {
        if let Err(e) = notifier.send(kind, &recipient, &payload).await {
            tracing::error!(
                error = %e,
                booking_id = %booking_id,
                kind = kind.as_str(),
                "failed to send notification"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, PaymentStatus, VehicleSize};
    use std::sync::Mutex;

    struct MockNotifier {
        sent: Arc<Mutex<Vec<(NotificationKind, String, Value)>>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, kind: NotificationKind, recipient: &Recipient, payload: &Value) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((kind, recipient.phone.clone(), payload.clone()));
            if self.fail {
                anyhow::bail!("gateway down");
            }
            Ok(())
        }
    }

    fn booking() -> Booking {
        let now = clock::parse_timestamp("2025-06-10 09:00:00").unwrap();
        Booking {
            id: "b1".to_string(),
            service_id: 1,
            date: clock::parse_date("2025-06-16").unwrap(),
            start_time: clock::parse_hhmm("10:00").unwrap(),
            end_time: clock::parse_hhmm("11:00").unwrap(),
            status: BookingStatus::Confirmed,
            payment_status: PaymentStatus::Paid,
            payment_id: Some("pay_1".to_string()),
            customer_name: "Frank".to_string(),
            customer_email: "frank@example.com".to_string(),
            customer_phone: "+15556660000".to_string(),
            vehicle_size: VehicleSize::Large,
            vehicle_plate: None,
            notes: None,
            assigned_bay_id: Some(2),
            bay_assigned_at: Some(now),
            bay_assigned_by: Some("system".to_string()),
            confirmation_code: "FRANK001".to_string(),
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_booking_payload() {
        let payload = booking_payload(&booking());
        assert_eq!(payload["confirmation_code"], "FRANK001");
        assert_eq!(payload["start_time"], "10:00");
        assert_eq!(payload["status"], "confirmed");
        assert_eq!(payload["bay_id"], 2);
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failures() {
        let sent = Arc::new(Mutex::new(vec![]));
        let notifier = Arc::new(MockNotifier {
            sent: sent.clone(),
            fail: true,
        });

        dispatch(notifier, NotificationKind::BookingConfirmed, &booking());

        for _ in 0..50 {
            if !sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, NotificationKind::BookingConfirmed);
        assert_eq!(sent[0].1, "+15556660000");
    }
}
