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

use crate::handlers::{accounts, admin, contests, credits, health, payments, views, webhooks};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for view counting, the highest-volume path.
const VIEWS_MAX_CONCURRENT_REQUESTS: usize = 200;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for admin endpoints.
const ADMIN_MAX_CONCURRENT_REQUESTS: usize = 10;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /v1/contests/:id` - Contest details
/// - `GET /v1/contests/:id/leaderboard` - Ranked submissions
/// - `GET /v1/content/:id/views` - View count
///
/// ## Users (bearer token auth)
/// - `POST /v1/accounts` - Register account
/// - `GET /v1/accounts/me` - Current user's account
/// - `GET /v1/credits/balance` - Current balance
/// - `GET /v1/credits/ledger` - Ledger history
/// - `POST /v1/credits/purchase` - Start a credit checkout
/// - `POST /v1/payments/verify-session` - Settle a completed checkout
/// - `POST /v1/contests/:id/submissions` - Enter a story
/// - `GET /v1/contests/:id/votes/remaining` - Remaining votes
/// - `POST /v1/contests/:id/votes` - Cast a vote
/// - `POST /v1/contests/:id/votes/purchase` - Buy paid votes with credits
/// - `POST /v1/content/:id/views` - Record a view (token optional)
///
/// ## Admin (`X-Admin-Key`)
/// - `POST /v1/admin/credits` - Grant or correct credits
/// - `POST /v1/admin/contests` - Create a contest
/// - `POST /v1/admin/payments/settle` - Settle a payment session
/// - `GET /v1/admin/accounts/:user_id/audit` - Audit and repair a balance
/// - `POST /v1/admin/views/purge` - Purge old view fingerprints
///
/// ## Webhooks (Signature verification)
/// - `POST /webhooks/stripe` - Stripe webhooks
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let view_routes = Router::new()
        .route(
            "/:content_id/views",
            post(views::record_view).get(views::get_views),
        )
        .layer(ConcurrencyLimitLayer::new(VIEWS_MAX_CONCURRENT_REQUESTS));

    let admin_routes = Router::new()
        .route("/credits", post(admin::adjust_credits))
        .route("/contests", post(admin::create_contest))
        .route("/payments/settle", post(admin::settle_payment))
        .route("/accounts/:user_id/audit", get(admin::audit_account))
        .route("/views/purge", post(admin::purge_views))
        .layer(ConcurrencyLimitLayer::new(ADMIN_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Accounts
        .route("/accounts", post(accounts::create_account))
        .route("/accounts/me", get(accounts::get_account))
        // Credits
        .route("/credits/balance", get(credits::get_balance))
        .route("/credits/ledger", get(credits::list_ledger))
        .route("/credits/purchase", post(credits::purchase_credits))
        // Payments
        .route("/payments/verify-session", post(payments::verify_session))
        // Contests
        .route("/contests/:contest_id", get(contests::get_contest))
        .route(
            "/contests/:contest_id/submissions",
            post(contests::create_submission),
        )
        .route(
            "/contests/:contest_id/leaderboard",
            get(contests::leaderboard),
        )
        .route(
            "/contests/:contest_id/votes/remaining",
            get(contests::votes_remaining),
        )
        .route("/contests/:contest_id/votes", post(contests::cast_vote))
        .route(
            "/contests/:contest_id/votes/purchase",
            post(contests::purchase_votes),
        )
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        // Views and admin carry their own limits
        .nest("/content", view_routes)
        .nest("/admin", admin_routes);

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - controlled by external services)
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        // Global middleware
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
