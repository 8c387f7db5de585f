use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vendo_api::{app, state::{AppState, AuthConfig}};
use vendo_core::identity::{IdentityResolver, StaticIdentityResolver};
use vendo_core::notify::LoggingNotifier;
use vendo_core::payment::SimulatedGateway;
use vendo_core::retry::RetryingGatewayClient;
use vendo_order::{MemoryOrderStore, OrderOrchestrator, OrderStore, RefundCoordinator};
use vendo_store::{DbClient, PgOrderStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vendo_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = vendo_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Vendo API on port {}", config.server.port);

    let store: Arc<dyn OrderStore> = if config.database.url.is_empty() {
        tracing::warn!("No database URL configured, using the in-memory store");
        Arc::new(MemoryOrderStore::new())
    } else {
        let db = DbClient::new(&config.database.url)
            .await
            .expect("Failed to connect to Postgres");
        db.migrate().await.expect("Failed to run migrations");
        Arc::new(PgOrderStore::new(db.pool.clone()))
    };

    let gateway = Arc::new(
        RetryingGatewayClient::new(Arc::new(SimulatedGateway))
            .with_max_retries(config.checkout.gateway_max_retries),
    );
    let identity: Arc<dyn IdentityResolver> = Arc::new(StaticIdentityResolver::new());

    let orchestrator = Arc::new(OrderOrchestrator::new(
        Arc::clone(&gateway),
        Arc::clone(&store),
        Arc::clone(&identity),
        Arc::new(LoggingNotifier),
    ));
    let refunds = Arc::new(RefundCoordinator::new(
        Arc::clone(&gateway),
        Arc::clone(&store),
        Arc::new(LoggingNotifier),
    ));

    let app_state = AppState {
        orchestrator,
        refunds,
        store,
        identity,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        default_currency: config.checkout.currency.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.expect("Failed to bind");
    axum::serve(listener, app).await.expect("Server error");
}
