use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use vendo_core::notify::OrderNotifier;
use vendo_core::payment::{GatewayError, RefundOutcome, RefundRequest};
use vendo_core::retry::RetryingGatewayClient;
use vendo_shared::events::RefundIssuedEvent;

use crate::models::{PaymentStatus, Refund, RefundStatus};
use crate::store::{OrderStore, StoreError};

#[derive(Debug, Clone)]
pub struct RefundReceipt {
    pub refund_id: Uuid,
    pub refund_reference: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RefundError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Order {0} has no payment transaction to refund")]
    MissingTransaction(Uuid),

    #[error("Gateway refused the refund ({code}): {message}")]
    Declined { code: String, message: String },

    /// Retry budget exhausted against the gateway's refund endpoint.
    #[error("Refund state unknown: {0}")]
    Unknown(GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Drives a refund: order lookup, gateway refund with retry, refund record,
/// payment status update, fire-and-forget notification. Gateway failures
/// leave local state untouched.
pub struct RefundCoordinator {
    gateway: Arc<RetryingGatewayClient>,
    store: Arc<dyn OrderStore>,
    notifier: Arc<dyn OrderNotifier>,
}

impl RefundCoordinator {
    pub fn new(
        gateway: Arc<RetryingGatewayClient>,
        store: Arc<dyn OrderStore>,
        notifier: Arc<dyn OrderNotifier>,
    ) -> Self {
        Self { gateway, store, notifier }
    }

    pub async fn refund(
        &self,
        order_id: Uuid,
        amount: Decimal,
        reason: Option<String>,
    ) -> Result<RefundReceipt, RefundError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(RefundError::NotFound(order_id))?;

        let transaction_id = order
            .transaction_id
            .ok_or(RefundError::MissingTransaction(order_id))?;

        let request = RefundRequest {
            transaction_id: transaction_id.clone(),
            amount,
            reason: reason.clone(),
        };
        let refund = match self.gateway.refund(&request).await {
            Ok(RefundOutcome::Succeeded(refund)) => refund,
            Ok(RefundOutcome::Declined { code, message }) => {
                return Err(RefundError::Declined { code, message })
            }
            Err(err) => return Err(RefundError::Unknown(err)),
        };

        let record = Refund {
            id: Uuid::new_v4(),
            transaction_id,
            amount,
            reason,
            status: RefundStatus::Succeeded,
            created_at: Utc::now(),
        };
        self.store.insert_refund(&record).await?;
        self.store
            .update_payment_status(order_id, PaymentStatus::Refunded)
            .await?;

        tracing::info!(
            %order_id,
            refund_id = %record.id,
            amount = %amount,
            "Refund recorded"
        );

        let notifier = Arc::clone(&self.notifier);
        let event = RefundIssuedEvent {
            order_id,
            refund_id: record.id,
            amount,
            issued_at: record.created_at,
        };
        tokio::spawn(async move {
            if let Err(err) = notifier.refund_issued(&event).await {
                tracing::warn!(order_id = %event.order_id, %err, "Refund notification failed");
            }
        });

        Ok(RefundReceipt {
            refund_id: record.id,
            refund_reference: refund.refund_reference,
        })
    }
}
