use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use vendo_core::payment::CardMetadata;
use vendo_order::models::{
    NewOrderItem, Order, OrderItem, OrderStatus, Payment, PaymentStatus, Refund, ShippingAddress,
};
use vendo_order::store::{OrderStore, StoreError};
use vendo_shared::Masked;

/// Replays of the whole transaction on connection-level failures. Business
/// failures (insufficient stock, unknown user) are never replayed.
const MAX_TX_RETRIES: u32 = 2;

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Splits business outcomes from driver errors so the retry wrapper can tell
/// them apart.
enum TxError {
    Business(StoreError),
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for TxError {
    fn from(err: sqlx::Error) -> Self {
        TxError::Sqlx(err)
    }
}

fn is_transient(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
}

fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Database(err.to_string())
}

fn order_status_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "PENDING",
        OrderStatus::Succeeded => "SUCCEEDED",
        OrderStatus::Failed => "FAILED",
    }
}

fn parse_order_status(raw: &str) -> Result<OrderStatus, StoreError> {
    match raw {
        "PENDING" => Ok(OrderStatus::Pending),
        "SUCCEEDED" => Ok(OrderStatus::Succeeded),
        "FAILED" => Ok(OrderStatus::Failed),
        other => Err(StoreError::Database(format!("unknown order status: {other}"))),
    }
}

fn payment_status_str(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "PENDING",
        PaymentStatus::Succeeded => "SUCCEEDED",
        PaymentStatus::Failed => "FAILED",
        PaymentStatus::Refunded => "REFUNDED",
    }
}

fn parse_payment_status(raw: &str) -> Result<PaymentStatus, StoreError> {
    match raw {
        "PENDING" => Ok(PaymentStatus::Pending),
        "SUCCEEDED" => Ok(PaymentStatus::Succeeded),
        "FAILED" => Ok(PaymentStatus::Failed),
        "REFUNDED" => Ok(PaymentStatus::Refunded),
        other => Err(StoreError::Database(format!("unknown payment status: {other}"))),
    }
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    Ok(Order {
        id: row.try_get("id").map_err(db_err)?,
        user_id: row.try_get("user_id").map_err(db_err)?,
        order_number: row.try_get("order_number").map_err(db_err)?,
        status: parse_order_status(row.try_get::<&str, _>("status").map_err(db_err)?)?,
        payment_status: parse_payment_status(
            row.try_get::<&str, _>("payment_status").map_err(db_err)?,
        )?,
        total_amount: row.try_get("total_amount").map_err(db_err)?,
        currency: row.try_get("currency").map_err(db_err)?,
        session_id: row.try_get("session_id").map_err(db_err)?,
        transaction_id: row.try_get("transaction_id").map_err(db_err)?,
        shipping_address: None,
        items: Vec::new(),
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

fn item_from_row(row: &PgRow) -> Result<OrderItem, StoreError> {
    Ok(OrderItem {
        id: row.try_get("id").map_err(db_err)?,
        order_id: row.try_get("order_id").map_err(db_err)?,
        product_id: row.try_get("product_id").map_err(db_err)?,
        product_name: row.try_get("product_name").map_err(db_err)?,
        quantity: row.try_get("quantity").map_err(db_err)?,
        unit_price: row.try_get("unit_price").map_err(db_err)?,
        image_url: row.try_get("image_url").map_err(db_err)?,
    })
}

fn address_from_row(row: &PgRow) -> Result<ShippingAddress, StoreError> {
    Ok(ShippingAddress {
        full_name: row.try_get("full_name").map_err(db_err)?,
        address_line1: row.try_get("address_line1").map_err(db_err)?,
        address_line2: row.try_get("address_line2").map_err(db_err)?,
        city: row.try_get("city").map_err(db_err)?,
        state: row.try_get("state").map_err(db_err)?,
        postal_code: row.try_get("postal_code").map_err(db_err)?,
        country: row.try_get("country").map_err(db_err)?,
    })
}

/// Card expiry columns are nullable signed integers; anything absent or
/// out of range reads as 0 rather than wrapping.
fn card_expiry_part(raw: Option<i32>) -> u32 {
    raw.and_then(|v| u32::try_from(v).ok()).unwrap_or(0)
}

fn payment_from_row(row: &PgRow) -> Result<Payment, StoreError> {
    let last4: Option<String> = row.try_get("card_last4").map_err(db_err)?;
    let card = match last4 {
        Some(last4) => Some(CardMetadata {
            last4,
            brand: row
                .try_get::<Option<String>, _>("card_brand")
                .map_err(db_err)?
                .unwrap_or_default(),
            exp_month: card_expiry_part(
                row.try_get::<Option<i32>, _>("card_exp_month").map_err(db_err)?,
            ),
            exp_year: card_expiry_part(
                row.try_get::<Option<i32>, _>("card_exp_year").map_err(db_err)?,
            ),
        }),
        None => None,
    };

    Ok(Payment {
        id: row.try_get("id").map_err(db_err)?,
        transaction_id: row.try_get("transaction_id").map_err(db_err)?,
        order_id: row.try_get("order_id").map_err(db_err)?,
        amount: row.try_get("amount").map_err(db_err)?,
        currency: row.try_get("currency").map_err(db_err)?,
        method: row.try_get("method").map_err(db_err)?,
        status: parse_payment_status(row.try_get::<&str, _>("status").map_err(db_err)?)?,
        card,
        customer_email: row
            .try_get::<Option<String>, _>("customer_email")
            .map_err(db_err)?
            .map(Masked::new),
        created_at: row.try_get("created_at").map_err(db_err)?,
        updated_at: row.try_get("updated_at").map_err(db_err)?,
    })
}

impl PgOrderStore {
    async fn create_order_once(
        &self,
        user_id: Uuid,
        items: &[NewOrderItem],
        transaction_id: &str,
        currency: &str,
        session_id: Option<&str>,
    ) -> Result<Order, TxError> {
        let mut tx = self.pool.begin().await?;

        // 1. The owning user must exist
        let user = sqlx::query("SELECT id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if user.is_none() {
            return Err(TxError::Business(StoreError::UserNotFound(user_id)));
        }

        // 2. Atomic decrement with the floor check in the predicate; a zero-row
        //    update means the product is missing or short on stock. Dropping
        //    the transaction rolls back every prior decrement.
        for item in items {
            let updated = sqlx::query(
                "UPDATE products SET stock_quantity = stock_quantity - $1, updated_at = NOW() \
                 WHERE id = $2 AND stock_quantity >= $1",
            )
            .bind(item.quantity)
            .bind(item.product_id)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                let available: Option<(i32,)> =
                    sqlx::query_as("SELECT stock_quantity FROM products WHERE id = $1")
                        .bind(item.product_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                return Err(TxError::Business(StoreError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available: available.map(|row| row.0).unwrap_or(0),
                }));
            }
        }

        // 3. Persist the order and its items
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

        sqlx::query(
            "INSERT INTO orders (id, user_id, order_number, status, payment_status, \
             total_amount, currency, session_id, transaction_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(&order.order_number)
        .bind(order_status_str(order.status))
        .bind(payment_status_str(order.payment_status))
        .bind(order.total_amount)
        .bind(&order.currency)
        .bind(&order.session_id)
        .bind(&order.transaction_id)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, product_name, quantity, \
                 unit_price, image_url) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(item.id)
            .bind(item.order_id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(&item.image_url)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(order)
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create_order(
        &self,
        user_id: Uuid,
        items: &[NewOrderItem],
        transaction_id: &str,
        currency: &str,
        session_id: Option<&str>,
    ) -> Result<Order, StoreError> {
        let mut attempt = 0;
        loop {
            match self
                .create_order_once(user_id, items, transaction_id, currency, session_id)
                .await
            {
                Ok(order) => return Ok(order),
                Err(TxError::Business(err)) => return Err(err),
                Err(TxError::Sqlx(err)) if is_transient(&err) && attempt < MAX_TX_RETRIES => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        error = %err,
                        "Transient database failure during order write, replaying transaction"
                    );
                }
                Err(TxError::Sqlx(err)) => return Err(db_err(err)),
            }
        }
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, order_number, status, payment_status, total_amount, currency, \
             session_id, transaction_id, created_at, updated_at FROM orders WHERE id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else { return Ok(None) };
        let mut order = order_from_row(&row)?;

        let item_rows = sqlx::query(
            "SELECT id, order_id, product_id, product_name, quantity, unit_price, image_url \
             FROM order_items WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        order.items = item_rows.iter().map(item_from_row).collect::<Result<_, _>>()?;

        let address_row = sqlx::query(
            "SELECT full_name, address_line1, address_line2, city, state, postal_code, country \
             FROM shipping_addresses WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        order.shipping_address = address_row.as_ref().map(address_from_row).transpose()?;

        Ok(Some(order))
    }

    async fn list_orders(&self, user_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query("SELECT id FROM orders WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("id").map_err(db_err)?;
            if let Some(order) = self.get_order(id).await? {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    async fn update_order_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(order_status_str(status))
            .bind(order_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(order_id));
        }
        Ok(())
    }

    async fn update_payment_status(
        &self,
        order_id: Uuid,
        status: PaymentStatus,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE orders SET payment_status = $1, updated_at = NOW() WHERE id = $2")
                .bind(payment_status_str(status))
                .bind(order_id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound(order_id));
        }
        Ok(())
    }

    async fn upsert_shipping_address(
        &self,
        order_id: Uuid,
        address: &ShippingAddress,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO shipping_addresses (order_id, full_name, address_line1, address_line2, \
             city, state, postal_code, country) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (order_id) DO UPDATE SET full_name = EXCLUDED.full_name, \
             address_line1 = EXCLUDED.address_line1, address_line2 = EXCLUDED.address_line2, \
             city = EXCLUDED.city, state = EXCLUDED.state, postal_code = EXCLUDED.postal_code, \
             country = EXCLUDED.country",
        )
        .bind(order_id)
        .bind(&address.full_name)
        .bind(&address.address_line1)
        .bind(&address.address_line2)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.postal_code)
        .bind(&address.country)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO payments (id, transaction_id, order_id, amount, currency, method, \
             status, card_last4, card_brand, card_exp_month, card_exp_year, customer_email, \
             created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(payment.id)
        .bind(&payment.transaction_id)
        .bind(payment.order_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(&payment.method)
        .bind(payment_status_str(payment.status))
        .bind(payment.card.as_ref().map(|c| c.last4.clone()))
        .bind(payment.card.as_ref().map(|c| c.brand.clone()))
        .bind(payment.card.as_ref().map(|c| c.exp_month as i32))
        .bind(payment.card.as_ref().map(|c| c.exp_year as i32))
        .bind(payment.customer_email.as_ref().map(|e| e.expose().clone()))
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn link_payment_to_order(
        &self,
        transaction_id: &str,
        order_id: Uuid,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE payments SET order_id = $1, updated_at = NOW() WHERE transaction_id = $2",
        )
        .bind(order_id)
        .bind(transaction_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_payment_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query(
            "SELECT id, transaction_id, order_id, amount, currency, method, status, card_last4, \
             card_brand, card_exp_month, card_exp_year, customer_email, created_at, updated_at \
             FROM payments WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn insert_refund(&self, refund: &Refund) -> Result<(), StoreError> {
        let status = match refund.status {
            vendo_order::models::RefundStatus::Succeeded => "SUCCEEDED",
            vendo_order::models::RefundStatus::Failed => "FAILED",
        };
        sqlx::query(
            "INSERT INTO refunds (id, transaction_id, amount, reason, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(refund.id)
        .bind(&refund.transaction_id)
        .bind(refund.amount)
        .bind(&refund.reason)
        .bind(status)
        .bind(refund.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_expiry_part_handles_absent_and_signed_values() {
        assert_eq!(card_expiry_part(Some(12)), 12);
        assert_eq!(card_expiry_part(Some(0)), 0);
        assert_eq!(card_expiry_part(Some(-3)), 0);
        assert_eq!(card_expiry_part(None), 0);
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [OrderStatus::Pending, OrderStatus::Succeeded, OrderStatus::Failed] {
            assert_eq!(parse_order_status(order_status_str(status)).unwrap(), status);
        }
        assert!(parse_order_status("UNKNOWN").is_err());
    }
}
