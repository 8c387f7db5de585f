use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use vendo_catalog::stock::{StockError, StockLedger};

use crate::models::{
    NewOrderItem, Order, OrderItem, OrderStatus, Payment, PaymentStatus, Refund, ShippingAddress,
};
use crate::store::{OrderStore, StoreError};

#[derive(Default)]
struct Inner {
    users: HashSet<Uuid>,
    ledger: StockLedger,
    orders: HashMap<Uuid, Order>,
    payments: HashMap<String, Payment>,
    refunds: Vec<Refund>,
}

/// In-memory [`OrderStore`] backed by the stock ledger. One mutex serializes
/// every operation, which gives the same all-or-nothing guarantee the
/// Postgres store gets from its transaction. Used by tests and local runs.
pub struct MemoryOrderStore {
    inner: Mutex<Inner>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    pub fn add_user(&self, user_id: Uuid) {
        self.inner.lock().unwrap().users.insert(user_id);
    }

    pub fn add_product(&self, product_id: Uuid, stock_quantity: i32) {
        self.inner.lock().unwrap().ledger.initialize(product_id, stock_quantity);
    }

    pub fn stock_of(&self, product_id: &Uuid) -> Option<i32> {
        self.inner
            .lock()
            .unwrap()
            .ledger
            .get(product_id)
            .map(|r| r.available_quantity)
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.inner.lock().unwrap().payments.values().cloned().collect()
    }

    pub fn refunds(&self) -> Vec<Refund> {
        self.inner.lock().unwrap().refunds.clone()
    }

    pub fn order_count(&self) -> usize {
        self.inner.lock().unwrap().orders.len()
    }
}

impl Default for MemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create_order(
        &self,
        user_id: Uuid,
        items: &[NewOrderItem],
        transaction_id: &str,
        currency: &str,
        session_id: Option<&str>,
    ) -> Result<Order, StoreError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.users.contains(&user_id) {
            return Err(StoreError::UserNotFound(user_id));
        }

        // Decrement stock item by item; on failure undo what was applied so
        // the whole write behaves like one transaction.
        let mut applied: Vec<(Uuid, i32)> = Vec::new();
        for item in items {
            match inner.ledger.adjust(&item.product_id, -item.quantity) {
                Ok(_) => applied.push((item.product_id, item.quantity)),
                Err(err) => {
                    for (product_id, quantity) in applied {
                        // Re-adds a quantity just subtracted from the same
                        // record, which cannot miss the product or go negative
                        let restored = inner.ledger.adjust(&product_id, quantity);
                        debug_assert!(restored.is_ok());
                    }
                    return Err(match err {
                        StockError::InsufficientStock { product_id, requested, available } => {
                            StoreError::InsufficientStock { product_id, requested, available }
                        }
                        StockError::NotFound(product_id) => StoreError::InsufficientStock {
                            product_id,
                            requested: item.quantity,
                            available: 0,
                        },
                    });
                }
            }
        }

        let order_id = Uuid::new_v4();
        let order_items: Vec<OrderItem> =
            items.iter().map(|item| OrderItem::from_new(order_id, item)).collect();
        let mut order = Order::new(
            user_id,
            order_items,
            transaction_id.to_string(),
            currency.to_string(),
            session_id.map(String::from),
        );
        order.id = order_id;

        inner.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.inner.lock().unwrap().orders.get(&order_id).cloned())
    }

    async fn list_orders(&self, user_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_order_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        order.status = status;
        order.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn update_payment_status(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        order.payment_status = status;
        order.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn upsert_shipping_address(
        &self,
        order_id: Uuid,
        address: &ShippingAddress,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        order.shipping_address = Some(address.clone());
        order.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.payments.contains_key(&payment.transaction_id) {
            return Err(StoreError::Database(format!(
                "duplicate payment for transaction {}",
                payment.transaction_id
            )));
        }
        inner.payments.insert(payment.transaction_id.clone(), payment.clone());
        Ok(())
    }

    async fn link_payment_to_order(
        &self,
        transaction_id: &str,
        order_id: Uuid,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.payments.get_mut(transaction_id) {
            Some(payment) => {
                payment.order_id = Some(order_id);
                payment.updated_at = chrono::Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_payment_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        Ok(self.inner.lock().unwrap().payments.get(transaction_id).cloned())
    }

    async fn insert_refund(&self, refund: &Refund) -> Result<(), StoreError> {
        self.inner.lock().unwrap().refunds.push(refund.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn new_item(product_id: Uuid, quantity: i32) -> NewOrderItem {
        NewOrderItem {
            product_id,
            product_name: "Widget".into(),
            quantity,
            unit_price: Decimal::new(1000, 2),
            image_url: None,
        }
    }

    #[tokio::test]
    async fn create_order_decrements_stock() {
        let store = MemoryOrderStore::new();
        let user_id = Uuid::new_v4();
        let product_id = Uuid::new_v4();
        store.add_user(user_id);
        store.add_product(product_id, 5);

        let order = store
            .create_order(user_id, &[new_item(product_id, 2)], "txn_1", "USD", None)
            .await
            .unwrap();

        assert_eq!(order.total_amount, Decimal::new(2000, 2));
        assert_eq!(store.stock_of(&product_id), Some(3));
        assert_eq!(store.order_count(), 1);
    }

    #[tokio::test]
    async fn insufficient_stock_rolls_back_prior_decrements() {
        let store = MemoryOrderStore::new();
        let user_id = Uuid::new_v4();
        let plenty = Uuid::new_v4();
        let scarce = Uuid::new_v4();
        store.add_user(user_id);
        store.add_product(plenty, 10);
        store.add_product(scarce, 1);

        let err = store
            .create_order(
                user_id,
                &[new_item(plenty, 3), new_item(scarce, 2)],
                "txn_2",
                "USD",
                None,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::InsufficientStock { .. }));
        // The first item's decrement must not survive the failed write
        assert_eq!(store.stock_of(&plenty), Some(10));
        assert_eq!(store.stock_of(&scarce), Some(1));
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn unknown_user_aborts_with_no_side_effects() {
        let store = MemoryOrderStore::new();
        let product_id = Uuid::new_v4();
        store.add_product(product_id, 5);

        let err = store
            .create_order(Uuid::new_v4(), &[new_item(product_id, 1)], "txn_3", "USD", None)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::UserNotFound(_)));
        assert_eq!(store.stock_of(&product_id), Some(5));
    }

    #[tokio::test]
    async fn payment_linkage_is_idempotent_per_transaction() {
        let store = MemoryOrderStore::new();
        let payment = Payment::new(
            "txn_link".into(),
            Decimal::new(500, 2),
            "USD".into(),
            "card".into(),
            PaymentStatus::Succeeded,
        );
        store.insert_payment(&payment).await.unwrap();

        let order_id = Uuid::new_v4();
        assert!(store.link_payment_to_order("txn_link", order_id).await.unwrap());
        assert!(!store.link_payment_to_order("txn_missing", order_id).await.unwrap());

        let stored = store
            .get_payment_by_transaction("txn_link")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.order_id, Some(order_id));
    }

    #[tokio::test]
    async fn duplicate_transaction_id_is_rejected() {
        let store = MemoryOrderStore::new();
        let payment = Payment::new(
            "txn_dup".into(),
            Decimal::new(500, 2),
            "USD".into(),
            "card".into(),
            PaymentStatus::Succeeded,
        );
        store.insert_payment(&payment).await.unwrap();
        assert!(store.insert_payment(&payment).await.is_err());
    }
}
