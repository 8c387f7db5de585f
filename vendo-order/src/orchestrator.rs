use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use vendo_core::identity::{CustomerIdentity, IdentityError, IdentityResolver};
use vendo_core::notify::OrderNotifier;
use vendo_core::payment::{CaptureOutcome, CaptureRequest, CardData, GatewayError};
use vendo_core::retry::RetryingGatewayClient;
use vendo_shared::events::OrderPlacedEvent;
use vendo_shared::Masked;

use crate::models::{NewOrderItem, OrderStatus, Payment, PaymentStatus, ShippingAddress};
use crate::store::{OrderStore, StoreError};

/// Checkout input after HTTP validation. The client-supplied total, if any,
/// never reaches this type: the orchestrator computes its own.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub identity: CustomerIdentity,
    pub session_id: Option<String>,
    pub items: Vec<NewOrderItem>,
    pub method: String,
    pub payment_method_id: Option<String>,
    pub card: Option<CardData>,
    pub customer_email: Option<Masked<String>>,
    pub shipping_address: ShippingAddress,
    pub currency: String,
}

/// Terminal checkout outcomes surfaced to the caller. Errors of unknown
/// state (retry exhaustion) travel through [`CheckoutError`] instead.
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    Succeeded {
        order_id: Uuid,
        order_number: String,
        transaction_id: String,
    },
    RequiresAction {
        client_secret: String,
    },
    PaymentFailed {
        code: String,
        message: String,
    },
    InsufficientStock {
        message: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The requested line items multiply or sum past what Decimal can hold.
    #[error("Order total exceeds the representable amount")]
    AmountOverflow,

    /// Retry budget exhausted; the charge may or may not have landed.
    /// Callers must report "unknown, retry later", never a clean decline.
    #[error("Payment state unknown: {0}")]
    PaymentUnknown(GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Sequences a checkout: gateway capture (with retry), transactional order
/// write, payment/order reconciliation, status transition, best-effort
/// notification. Steps up to and including the order write are fail-fast;
/// once the order has committed, every later step only logs its failure.
pub struct OrderOrchestrator {
    gateway: Arc<RetryingGatewayClient>,
    store: Arc<dyn OrderStore>,
    identity: Arc<dyn IdentityResolver>,
    notifier: Arc<dyn OrderNotifier>,
}

impl OrderOrchestrator {
    pub fn new(
        gateway: Arc<RetryingGatewayClient>,
        store: Arc<dyn OrderStore>,
        identity: Arc<dyn IdentityResolver>,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Self {
        Self { gateway, store, identity, notifier }
    }

    pub async fn checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        // 1. Resolve the acting user
        let user_id = self.identity.resolve(&request.identity).await?;

        // 2. Server-side total from the line items, rejected before any
        //    gateway call if it is not representable
        let total = request
            .items
            .iter()
            .try_fold(Decimal::ZERO, |acc, item| {
                item.checked_line_total().and_then(|line| acc.checked_add(line))
            })
            .ok_or(CheckoutError::AmountOverflow)?;

        // 3. Capture through the retrying client
        let capture = CaptureRequest {
            amount: total,
            currency: request.currency.clone(),
            method: request.method.clone(),
            payment_method_id: request.payment_method_id.clone(),
            card: request.card.clone(),
            customer_email: request.customer_email.clone(),
        };
        let outcome = self
            .gateway
            .capture(&capture)
            .await
            .map_err(CheckoutError::PaymentUnknown)?;

        // 4. A payment row is written the instant the gateway answers,
        //    independent of any order.
        let charge = match outcome {
            CaptureOutcome::RequiresAction { transaction_id, client_secret } => {
                self.record_payment(&request, &transaction_id, total, PaymentStatus::Pending)
                    .await;
                return Ok(CheckoutOutcome::RequiresAction { client_secret });
            }
            CaptureOutcome::Declined { transaction_id, code, message } => {
                self.record_payment(&request, &transaction_id, total, PaymentStatus::Failed)
                    .await;
                return Ok(CheckoutOutcome::PaymentFailed { code, message });
            }
            CaptureOutcome::Succeeded(charge) => charge,
        };

        let mut payment = Payment::new(
            charge.transaction_id.clone(),
            charge.amount,
            charge.currency.clone(),
            request.method.clone(),
            PaymentStatus::Succeeded,
        );
        payment.card = charge.card.clone();
        payment.customer_email = request.customer_email.clone();
        self.store.insert_payment(&payment).await?;

        // 5. Transactional order write: stock decrements + order + items
        let order = match self
            .store
            .create_order(
                user_id,
                &request.items,
                &charge.transaction_id,
                &request.currency,
                request.session_id.as_deref(),
            )
            .await
        {
            Ok(order) => order,
            Err(StoreError::InsufficientStock { product_id, requested, available }) => {
                // Funds are already captured with no order to fulfil. No
                // automatic refund on this path; flag it for reconciliation.
                tracing::warn!(
                    transaction_id = %charge.transaction_id,
                    amount = %charge.amount,
                    %product_id,
                    "Captured payment left unfulfilled: insufficient stock"
                );
                return Ok(CheckoutOutcome::InsufficientStock {
                    message: format!(
                        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
                    ),
                });
            }
            Err(err) => return Err(err.into()),
        };

        // 6. Shipping address (best-effort from here on: the order exists and
        //    the customer was charged, so nothing below may fail the call)
        if let Err(err) = self
            .store
            .upsert_shipping_address(order.id, &request.shipping_address)
            .await
        {
            tracing::error!(order_id = %order.id, %err, "Failed to persist shipping address");
        }

        // 7. Back-fill Payment.order_id
        match self
            .store
            .link_payment_to_order(&charge.transaction_id, order.id)
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                transaction_id = %charge.transaction_id,
                order_id = %order.id,
                "Payment back-fill affected zero rows"
            ),
            Err(err) => tracing::error!(order_id = %order.id, %err, "Payment back-fill failed"),
        }

        // 8. Pending → Succeeded
        match order.status.transition_to(OrderStatus::Succeeded) {
            Ok(next) => {
                if let Err(err) = self.store.update_order_status(order.id, next).await {
                    tracing::error!(order_id = %order.id, %err, "Failed to update order status");
                }
                if let Err(err) = self
                    .store
                    .update_payment_status(order.id, PaymentStatus::Succeeded)
                    .await
                {
                    tracing::error!(order_id = %order.id, %err, "Failed to update payment status");
                }
            }
            Err(err) => {
                tracing::error!(order_id = %order.id, %err, "Order status transition rejected")
            }
        }

        // 9. Fire-and-forget notification
        let notifier = Arc::clone(&self.notifier);
        let event = OrderPlacedEvent {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id,
            customer_email: request.customer_email.clone(),
            total_amount: order.total_amount,
            currency: order.currency.clone(),
            placed_at: order.created_at,
        };
        tokio::spawn(async move {
            if let Err(err) = notifier.order_placed(&event).await {
                tracing::warn!(order_id = %event.order_id, %err, "Order notification failed");
            }
        });

        // 10. Done
        Ok(CheckoutOutcome::Succeeded {
            order_id: order.id,
            order_number: order.order_number,
            transaction_id: charge.transaction_id,
        })
    }

    /// Record the payment row for a non-success gateway answer. Bookkeeping
    /// only: a store failure here is logged, not surfaced, so the caller
    /// still sees the gateway's verdict.
    async fn record_payment(
        &self,
        request: &CheckoutRequest,
        transaction_id: &str,
        amount: Decimal,
        status: PaymentStatus,
    ) {
        let mut payment = Payment::new(
            transaction_id.to_string(),
            amount,
            request.currency.clone(),
            request.method.clone(),
            status,
        );
        payment.customer_email = request.customer_email.clone();
        if let Err(err) = self.store.insert_payment(&payment).await {
            tracing::error!(%transaction_id, %err, "Failed to record payment row");
        }
    }
}
