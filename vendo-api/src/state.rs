use std::sync::Arc;

use vendo_core::identity::IdentityResolver;
use vendo_order::{OrderOrchestrator, OrderStore, RefundCoordinator};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<OrderOrchestrator>,
    pub refunds: Arc<RefundCoordinator>,
    pub store: Arc<dyn OrderStore>,
    pub identity: Arc<dyn IdentityResolver>,
    pub auth: AuthConfig,
    /// Currency applied when a checkout request does not name one.
    pub default_currency: String,
}
