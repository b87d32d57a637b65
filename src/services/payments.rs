use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the customer pays with. Opaque to the core; the gateway interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentData {
    pub amount_cents: i64,
    pub currency: String,
    /// Gateway-specific token (card token, wallet id, ...).
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentReceipt {
    pub payment_id: String,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefundReceipt {
    pub refund_id: String,
    pub payment_id: String,
}

/// Payment capture. Errors are reported as `anyhow` and surface to callers
/// as `BookingError::Payment`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, booking_id: &str, payment: &PaymentData) -> anyhow::Result<PaymentReceipt>;

    async fn refund(&self, payment_id: &str) -> anyhow::Result<RefundReceipt>;

    /// Undo a refund issued in the same saga (re-capture).
    async fn reverse_refund(&self, refund: &RefundReceipt) -> anyhow::Result<()>;
}
