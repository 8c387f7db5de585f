pub mod identity;
pub mod notify;
pub mod payment;
pub mod retry;

pub use payment::{CaptureOutcome, CaptureRequest, GatewayError, PaymentGateway};
pub use retry::RetryingGatewayClient;
