use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::pii::Masked;

/// Payload handed to the notification collaborator after a checkout commits.
/// Dispatch is fire-and-forget; the order is already durable when this is built.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderPlacedEvent {
    pub order_id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub customer_email: Option<Masked<String>>,
    pub total_amount: Decimal,
    pub currency: String,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct RefundIssuedEvent {
    pub order_id: Uuid,
    pub refund_id: Uuid,
    pub amount: Decimal,
    pub issued_at: DateTime<Utc>,
}
