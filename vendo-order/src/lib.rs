pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod refund;
pub mod status;
pub mod store;

pub use memory::MemoryOrderStore;
pub use models::{
    NewOrderItem, Order, OrderItem, OrderStatus, Payment, PaymentStatus, Refund, RefundStatus,
    ShippingAddress,
};
pub use orchestrator::{CheckoutOutcome, CheckoutRequest, OrderOrchestrator};
pub use refund::RefundCoordinator;
pub use store::{OrderStore, StoreError};
