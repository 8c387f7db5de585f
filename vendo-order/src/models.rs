use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vendo_core::payment::CardMetadata;
use vendo_shared::Masked;

/// Order status in the lifecycle. Pending only exists between the
/// transactional write and the post-commit status transition; it should
/// never be observably durable under normal operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Payment status carried on the order, mirrored from gateway results.
/// Moves to Refunded through the refund flow without changing the order's
/// own terminal status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Succeeded,
    Failed,
}

/// The single source of truth for a customer's purchase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Sum of the items' line totals at creation time; never recomputed.
    pub total_amount: Decimal,
    pub currency: String,
    pub session_id: Option<String>,
    pub transaction_id: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        user_id: Uuid,
        items: Vec<OrderItem>,
        transaction_id: String,
        currency: String,
        session_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let total_amount = items.iter().map(OrderItem::line_total).sum();
        Self {
            id: Uuid::new_v4(),
            user_id,
            order_number: generate_order_number(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            total_amount,
            currency,
            session_id,
            transaction_id: Some(transaction_id),
            shipping_address: None,
            items,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An individual product within an order. Name, price and image are
/// snapshots: catalog changes must not retroactively alter historical orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub image_url: Option<String>,
}

impl OrderItem {
    pub fn from_new(order_id: Uuid, item: &NewOrderItem) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            image_url: item.image_url.clone(),
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Requested line item, before an order exists to own it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub image_url: Option<String>,
}

impl NewOrderItem {
    /// Line total, or None when `unit_price * quantity` is not representable.
    pub fn checked_line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}

/// Postal address owned by exactly one order; created or replaced whole.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingAddress {
    pub full_name: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

/// One row per gateway transaction. `order_id` starts empty: a payment can
/// exist before the order it belongs to, and is back-filled after the order
/// commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub transaction_id: String,
    pub order_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: String,
    pub method: String,
    pub status: PaymentStatus,
    pub card: Option<CardMetadata>,
    pub customer_email: Option<Masked<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(
        transaction_id: String,
        amount: Decimal,
        currency: String,
        method: String,
        status: PaymentStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            order_id: None,
            amount,
            currency,
            method,
            status,
            card: None,
            customer_email: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Recorded refund against a payment's gateway transaction. An order may
/// accumulate several; the sum is not checked against the original amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub id: Uuid,
    pub transaction_id: String,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub status: RefundStatus,
    pub created_at: DateTime<Utc>,
}

/// Human-readable order number: `ORD-<date>-<random8>`.
pub fn generate_order_number() -> String {
    let random8: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect::<String>()
        .to_uppercase();
    format!("ORD-{}-{}", Utc::now().format("%Y%m%d"), random8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i32, unit_price: Decimal) -> OrderItem {
        OrderItem {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "Widget".into(),
            quantity,
            unit_price,
            image_url: None,
        }
    }

    #[test]
    fn total_is_sum_of_line_totals() {
        let items = vec![
            item(2, Decimal::new(1000, 2)),
            item(1, Decimal::new(500, 2)),
        ];
        let order = Order::new(
            Uuid::new_v4(),
            items,
            "txn_abc".into(),
            "USD".into(),
            None,
        );
        assert_eq!(order.total_amount, Decimal::new(2500, 2));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
    }

    #[test]
    fn order_number_format() {
        let number = generate_order_number();
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 8);
    }
}
