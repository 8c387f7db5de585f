use async_trait::async_trait;
use vendo_shared::events::{OrderPlacedEvent, RefundIssuedEvent};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Narrow contract to the notification collaborator: given a committed order,
/// send a confirmation. Callers dispatch fire-and-forget; a failure here must
/// never block or fail a checkout.
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    async fn order_placed(&self, event: &OrderPlacedEvent) -> Result<(), NotifyError>;

    async fn refund_issued(&self, event: &RefundIssuedEvent) -> Result<(), NotifyError>;
}

/// Default notifier that only records the event in the log stream.
pub struct LoggingNotifier;

#[async_trait]
impl OrderNotifier for LoggingNotifier {
    async fn order_placed(&self, event: &OrderPlacedEvent) -> Result<(), NotifyError> {
        tracing::info!(
            order_id = %event.order_id,
            order_number = %event.order_number,
            total = %event.total_amount,
            "Order confirmation dispatched"
        );
        Ok(())
    }

    async fn refund_issued(&self, event: &RefundIssuedEvent) -> Result<(), NotifyError> {
        tracing::info!(
            order_id = %event.order_id,
            refund_id = %event.refund_id,
            amount = %event.amount,
            "Refund confirmation dispatched"
        );
        Ok(())
    }
}
