use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::models::{Booking, BookingStatus};

/// Something that happened to a booking, published after the change commits.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event")]
pub enum LifecycleEvent {
    #[serde(rename = "booking.created")]
    Created { booking: Booking },
    #[serde(rename = "booking.statusChanged")]
    StatusChanged {
        booking: Booking,
        from: BookingStatus,
        to: BookingStatus,
        reason: Option<String>,
    },
    #[serde(rename = "booking.assigned")]
    Assigned { booking: Booking, bay_id: i64 },
    #[serde(rename = "booking.cancelled")]
    Cancelled {
        booking: Booking,
        from: BookingStatus,
        reason: Option<String>,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Created { .. } => "booking.created",
            LifecycleEvent::StatusChanged { .. } => "booking.statusChanged",
            LifecycleEvent::Assigned { .. } => "booking.assigned",
            LifecycleEvent::Cancelled { .. } => "booking.cancelled",
        }
    }

    pub fn booking(&self) -> &Booking {
        match self {
            LifecycleEvent::Created { booking }
            | LifecycleEvent::StatusChanged { booking, .. }
            | LifecycleEvent::Assigned { booking, .. }
            | LifecycleEvent::Cancelled { booking, .. } => booking,
        }
    }
}

/// Fan-out channel for lifecycle events. Publishing never blocks and is a
/// no-op when nobody is listening.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<LifecycleEvent>,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: LifecycleEvent) {
        tracing::debug!(event = event.name(), booking_id = %event.booking().id, "lifecycle event");
        // No receivers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }

    /// Live events as a stream. Events dropped because the subscriber fell
    /// behind are skipped.
    pub fn stream(&self) -> impl Stream<Item = LifecycleEvent> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|result| match result {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "lifecycle subscriber lagged");
                None
            }
        })
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}
