use crate::models::OrderStatus;

#[derive(Debug, thiserror::Error)]
#[error("Invalid order status transition from {from:?} to {to:?}")]
pub struct TransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl OrderStatus {
    /// Pending is the only non-terminal state.
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// Validate a transition. Pending may move to Succeeded or Failed;
    /// terminal states never move.
    pub fn transition_to(self, to: OrderStatus) -> Result<OrderStatus, TransitionError> {
        match (self, to) {
            (OrderStatus::Pending, OrderStatus::Succeeded)
            | (OrderStatus::Pending, OrderStatus::Failed) => Ok(to),
            (from, to) => Err(TransitionError { from, to }),
        }
    }
}
