//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, admin, credits, health, usage};
use crate::state::AppState;

/// Maximum concurrent requests for the consume/refund hot path.
const METERING_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /v1/credits/costs` - Credit cost per action
///
/// ## User (JWT auth)
/// - `POST /v1/accounts` - Register and receive welcome credits
/// - `GET /v1/credits/balance` - Current balance
/// - `POST /v1/credits/consume` - Deduct the cost of an action
/// - `POST /v1/credits/refund` - Return credits for a failed action
/// - `GET /v1/credits/history` - Ledger history
/// - `GET /v1/credits/history.csv` - Ledger history as CSV
/// - `GET /v1/credits/usage` - Spend per action and per day
///
/// ## Service (API key auth)
/// - `POST /v1/credits/grant` - Add purchased or bonus credits
///
/// ## Admin (admin key auth)
/// - `GET /v1/admin/users/:user_id/audit` - Compare balance and ledger
pub fn create_router(state: AppState) -> Router {
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let metering_routes = Router::new()
        .route("/credits/consume", post(credits::consume_credits))
        .route("/credits/refund", post(credits::refund_credits))
        .layer(ConcurrencyLimitLayer::new(METERING_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Accounts
        .route("/accounts", post(accounts::create_account))
        // Credits
        .route("/credits/balance", get(credits::get_balance))
        .route("/credits/costs", get(credits::list_costs))
        .route("/credits/grant", post(credits::grant_credits))
        // Usage
        .route("/credits/history", get(usage::list_history))
        .route("/credits/history.csv", get(usage::export_history_csv))
        .route("/credits/usage", get(usage::get_usage))
        // Admin
        .route("/admin/users/:user_id/audit", get(admin::audit_user))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        .merge(metering_routes);

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
