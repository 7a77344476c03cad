use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use ng_entitlement_db::DatabaseManager;
use tower::ServiceBuilder;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::debug;

pub mod auth;
pub mod checkout;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ports;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
pub mod test_support;

use service::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // FRONTEND_URL is validated during BillingConfig::from_env(), so this
    // parse cannot fail at runtime.
    let origin = state
        .config
        .frontend_url
        .parse()
        .expect("FRONTEND_URL was validated during config loading");

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(origin))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    let checkout_governor = GovernorConfigBuilder::default()
        .per_second(6)
        .burst_size(10)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("valid governor config");

    let jwt_config = state.jwt_config.clone();

    let checkout_route = Router::new()
        .route("/billing/checkout", post(handlers::create_checkout))
        .layer(GovernorLayer::new(Arc::new(checkout_governor)));

    let authed_routes = Router::new()
        .route("/billing/payment-status", post(handlers::payment_status))
        .route("/billing/entitlement", get(handlers::get_entitlement))
        .route("/billing/consume", post(handlers::consume_credit));

    let webhook_routes = Router::new()
        .route("/billing/webhook/mollie", post(handlers::webhook_mollie))
        .route("/billing/webhook/stripe", post(handlers::webhook_stripe));

    let health_route = Router::new().route("/health", get(handlers::health));

    checkout_route
        .merge(authed_routes)
        .merge(webhook_routes)
        .merge(health_route)
        .layer(Extension(jwt_config))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

pub fn init_billing_service(db: Arc<DatabaseManager>) -> Result<Router> {
    debug!("Initializing billing service");

    let state = Arc::new(AppState::from_env(db).context("Failed to create billing service state")?);

    Ok(create_router(state))
}

pub use config::BillingConfig;
pub use error::BillingError;
pub use types::{
    CheckoutRequest, CheckoutResponse, ConsumeResponse, EntitlementResponse, OfferType,
    PaymentStatusResponse,
};
