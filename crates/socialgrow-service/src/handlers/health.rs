//! Health check handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests.
    pub status: &'static str,
    /// Service name.
    pub service: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Which integrations this instance can use.
    pub integrations: Integrations,
}

/// Integration readiness.
#[derive(Debug, Serialize)]
pub struct Integrations {
    /// A Stripe client was built, so checkout and the portal work.
    pub stripe: bool,
    /// A webhook signing secret is configured.
    pub webhooks: bool,
    /// Bearer sessions can be verified.
    pub auth: bool,
    /// `degraded` while the catalog breaker short-circuits storage.
    pub catalog: &'static str,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let catalog = if state.catalog.breaker().is_open() {
        "degraded"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status: "ok",
        service: "socialgrow-service",
        version: env!("CARGO_PKG_VERSION"),
        integrations: Integrations {
            stripe: state.has_stripe(),
            webhooks: state.config.stripe_webhook_secret.is_some(),
            auth: state.identity.is_some(),
            catalog,
        },
    })
}
