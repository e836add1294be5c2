//! Webhook handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;
use crate::stripe::{verify_signature, WebhookEvent};
use crate::webhook;

/// Acknowledgement sent for every verified event.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Always `true`.
    pub received: bool,
}

/// Handle a Stripe webhook.
///
/// The signature covers the raw body, so the body is taken as a string and
/// only parsed once verified.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::Internal("Stripe webhook secret not configured".into()))?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("No signature".into()))?;

    verify_signature(
        &body,
        signature,
        secret,
        state.config.webhook_tolerance_seconds,
        chrono::Utc::now().timestamp(),
    )
    .map_err(|e| {
        tracing::warn!(error = %e, "Invalid Stripe webhook signature");
        ApiError::BadRequest(format!("Webhook signature verification failed: {e}"))
    })?;

    let event: WebhookEvent = serde_json::from_str(&body).map_err(|e| {
        tracing::warn!(error = %e, "Failed to parse Stripe webhook");
        ApiError::BadRequest(format!("Invalid webhook payload: {e}"))
    })?;

    tracing::info!(event_id = %event.id, event_type = %event.event_type, "Received Stripe webhook");

    let outcome = webhook::handle_event(&state, &event).await;
    tracing::debug!(event_id = %event.id, outcome = ?outcome, "Stripe webhook processed");

    Ok(Json(WebhookResponse { received: true }))
}
