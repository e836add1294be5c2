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

use crate::handlers::{
    affiliates, checkout, coupons, health, orders, plans, referrals, subscriptions, webhooks,
};
use crate::state::AppState;

/// Maximum concurrent requests for API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /api/plans` - Active plans (falls back to built-in plans)
/// - `POST /api/create-checkout-session` - Checkout for a plan id
/// - `GET /api/referrals?code=` - Validate a referral code
/// - `POST /api/referrals` - Track a referred signup
/// - `GET /api/coupons?code=` - Validate a coupon
/// - `POST /api/coupons` - Redeem a coupon
///
/// ## Signed-in user (Supabase session)
/// - `POST /api/checkout` - Checkout with customer and coupon
/// - `POST /api/customer-portal` - Billing portal session
/// - `GET /api/affiliates` - Affiliate enrollment
/// - `POST /api/affiliates` - Register or update payout settings
/// - `GET /api/subscriptions` - List subscriptions
/// - `POST /api/subscriptions` - Cancel or reactivate
/// - `GET /api/orders` - List orders
///
/// ## Webhooks (Signature verification)
/// - `POST /api/webhooks/stripe` - Stripe webhooks
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let api_routes = Router::new()
        // Catalog and checkout
        .route("/plans", get(plans::list_plans))
        .route(
            "/create-checkout-session",
            post(checkout::create_checkout_session),
        )
        .route("/checkout", post(checkout::create_customer_checkout))
        .route("/customer-portal", post(checkout::customer_portal))
        // Affiliate program
        .route(
            "/affiliates",
            get(affiliates::get_affiliate).post(affiliates::affiliate_action),
        )
        .route(
            "/referrals",
            get(referrals::validate_referral).post(referrals::track_referral),
        )
        .route(
            "/coupons",
            get(coupons::validate_coupon).post(coupons::apply_coupon),
        )
        // Dashboard
        .route(
            "/subscriptions",
            get(subscriptions::list_subscriptions).post(subscriptions::subscription_action),
        )
        .route("/orders", get(orders::list_orders))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // Webhooks (no rate limit - controlled by Stripe)
        .route("/api/webhooks/stripe", post(webhooks::stripe_webhook))
        .nest("/api", api_routes)
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
