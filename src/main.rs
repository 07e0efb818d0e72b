// =============================================================================
// ORDER SERVICE - Main Entry Point
// =============================================================================
// Order lifecycle for the storefront backend.
//
// WHAT THIS SERVICE DOES:
// - Accepts checkouts (COD and PREPAID) and assigns order identifiers
// - Creates Razorpay payment intents and verifies payment callbacks
// - Redeems one-time coupons exactly once per settled order
// - Lets admins move orders through fulfilment statuses
// - Exposes Prometheus metrics and caches order lookups in Redis
// =============================================================================

// -----------------------------------------------------------------------------
// MODULE DECLARATIONS
// -----------------------------------------------------------------------------
mod auth; // Bearer token extractors (auth.rs)
mod cache; // Redis order cache (cache.rs)
mod config; // Configuration loading (config.rs)
mod db; // PostgreSQL persistence (db.rs)
mod error; // Error types (error.rs)
mod handlers; // HTTP request handlers (handlers.rs)
mod metrics; // Prometheus metrics setup (metrics.rs)
mod models; // Data structures (models.rs)
mod orders; // Order lifecycle rules (orders.rs)
mod payment; // Razorpay gateway and signatures (payment.rs)
mod store; // Storage traits (store.rs)

#[cfg(test)]
mod testing;

use std::sync::Arc;

use axum::{
    extract::FromRef,
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::TokenVerifier;
use crate::cache::OrderCache;
use crate::config::Config;
use crate::db::Database;
use crate::metrics::setup_metrics;
use crate::orders::OrderService;
use crate::payment::{CredentialCache, GatewayCredentials, RazorpayGateway};

// -----------------------------------------------------------------------------
// APPLICATION STATE
// -----------------------------------------------------------------------------
// Every field is cheap to clone (pools, managers and Arcs), so the state is
// cloned per request instead of being wrapped in another Arc.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub cache: OrderCache,
    pub orders: OrderService,
    pub tokens: Arc<TokenVerifier>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

impl FromRef<AppState> for Arc<TokenVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

/// Order API routes, mounted under `/api/orders`.
fn order_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(handlers::create_order).get(handlers::list_all_orders),
        )
        .route("/verify-payment", post(handlers::verify_payment))
        .route("/user", get(handlers::list_user_orders))
        .route("/:order_id", get(handlers::get_order))
        .route(
            "/admin/:order_id/status",
            patch(handlers::update_order_status),
        )
}

fn build_router(state: AppState) -> Router {
    Router::new()
        // ----- Health, readiness and metrics -----
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        // ----- Order API -----
        .nest("/api/orders", order_routes())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -------------------------------------------------------------------------
    // STEP 1: Environment and logging
    // -------------------------------------------------------------------------
    dotenvy::dotenv().ok();

    // RUST_LOG controls log levels, e.g. RUST_LOG=info,order_service=debug
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,order_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Order Service...");

    // -------------------------------------------------------------------------
    // STEP 2: Configuration and metrics
    // -------------------------------------------------------------------------
    let config = Config::from_env()?;
    info!(port = config.port, gateway = ?config.gateway, "Configuration loaded");

    let metrics_handle = setup_metrics()?;
    info!("Prometheus metrics initialized");

    // -------------------------------------------------------------------------
    // STEP 3: PostgreSQL
    // -------------------------------------------------------------------------
    let db = Database::connect(&config.database_url).await?;
    info!("Connected to PostgreSQL");

    db.run_migrations().await?;
    info!("Database migrations completed");

    // -------------------------------------------------------------------------
    // STEP 4: Redis
    // -------------------------------------------------------------------------
    let redis_client = redis::Client::open(config.redis_url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    let cache = OrderCache::new(redis_conn, config.order_cache_ttl);
    info!("Connected to Redis");

    // -------------------------------------------------------------------------
    // STEP 5: Payment gateway
    // -------------------------------------------------------------------------
    let credentials = match &config.gateway.static_credentials {
        Some((key_id, key_secret)) => CredentialCache::Static(GatewayCredentials {
            key_id: key_id.clone(),
            key_secret: key_secret.clone(),
        }),
        None => {
            info!("Razorpay keys will be read from confidential_keys");
            CredentialCache::loaded(Arc::new(db.clone()), config.gateway.credentials_ttl)
        }
    };
    let gateway = RazorpayGateway::new(&config.gateway, credentials)?;

    // -------------------------------------------------------------------------
    // STEP 6: Application state and routes
    // -------------------------------------------------------------------------
    let orders = OrderService::new(Arc::new(db.clone()), Arc::new(gateway));

    let state = AppState {
        db,
        cache,
        orders,
        tokens: Arc::new(TokenVerifier::new(&config.jwt_secret)),
        metrics_handle,
    };
    let app = build_router(state);

    // -------------------------------------------------------------------------
    // STEP 7: Serve
    // -------------------------------------------------------------------------
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(address = %addr, "Order Service is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
