use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    NewOrderItem, Order, OrderStatus, Payment, PaymentStatus, Refund, ShippingAddress,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Store failure: {0}")]
    Database(String),
}

/// Durable persistence for orders, payments and refunds.
///
/// `create_order` is the one transactional entry point: user check, stock
/// decrements and the order insert either all commit or all roll back.
/// Everything else is a single-row operation.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Transactionally decrement stock for every item and persist the order
    /// (status Pending, payment status Pending). `InsufficientStock` and
    /// `UserNotFound` abort with no side effects.
    async fn create_order(
        &self,
        user_id: Uuid,
        items: &[NewOrderItem],
        transaction_id: &str,
        currency: &str,
        session_id: Option<&str>,
    ) -> Result<Order, StoreError>;

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn list_orders(&self, user_id: Uuid) -> Result<Vec<Order>, StoreError>;

    async fn update_order_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<(), StoreError>;

    async fn update_payment_status(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
    ) -> Result<(), StoreError>;

    /// Create or replace the order's shipping address.
    async fn upsert_shipping_address(
        &self,
        order_id: Uuid,
        address: &ShippingAddress,
    ) -> Result<(), StoreError>;

    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    /// Back-fill `Payment.order_id` once the order exists. Returns false when
    /// no payment row matched the transaction id.
    async fn link_payment_to_order(
        &self,
        transaction_id: &str,
        order_id: Uuid,
    ) -> Result<bool, StoreError>;

    async fn get_payment_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Payment>, StoreError>;

    async fn insert_refund(&self, refund: &Refund) -> Result<(), StoreError>;
}
