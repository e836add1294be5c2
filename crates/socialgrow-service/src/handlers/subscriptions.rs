//! Subscription dashboard handlers.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use socialgrow_core::{Subscription, SubscriptionId, SubscriptionPatch, SubscriptionStatus};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Subscription list response.
#[derive(Debug, Serialize)]
pub struct SubscriptionsResponse {
    /// The caller's subscriptions, newest first.
    pub subscriptions: Vec<Subscription>,
    /// Number of subscriptions.
    pub count: usize,
}

/// List the caller's subscriptions.
pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<SubscriptionsResponse>, ApiError> {
    let subscriptions = state.store.list_subscriptions_by_user(&auth.user_id).await?;
    Ok(Json(SubscriptionsResponse {
        count: subscriptions.len(),
        subscriptions,
    }))
}

/// What to do with a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionAction {
    /// Stop renewing at the end of the current period.
    Cancel,
    /// End the subscription now.
    CancelImmediately,
    /// Undo a pending cancellation.
    Reactivate,
}

impl FromStr for SubscriptionAction {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cancel" => Ok(Self::Cancel),
            "cancel_immediately" => Ok(Self::CancelImmediately),
            "reactivate" => Ok(Self::Reactivate),
            other => Err(ApiError::BadRequest(format!(
                "Unknown action: {other}. Valid actions: cancel, cancel_immediately, reactivate"
            ))),
        }
    }
}

/// Body of `POST /api/subscriptions`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionActionBody {
    /// `cancel`, `cancel_immediately` or `reactivate`.
    #[serde(default)]
    pub action: String,
    /// Subscription row id.
    #[serde(default)]
    pub subscription_id: Option<String>,
}

/// Response of a subscription action.
#[derive(Debug, Serialize)]
pub struct SubscriptionActionResponse {
    /// Human-readable result.
    pub message: &'static str,
    /// The subscription after the change.
    pub subscription: Subscription,
}

/// Cancel or reactivate one of the caller's subscriptions.
pub async fn subscription_action(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<SubscriptionActionBody>,
) -> Result<Json<SubscriptionActionResponse>, ApiError> {
    let action: SubscriptionAction = body.action.parse()?;
    let subscription_id: SubscriptionId = body
        .subscription_id
        .as_deref()
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| ApiError::BadRequest("Subscription ID is required".into()))?;

    let subscription = state
        .store
        .get_subscription(&subscription_id)
        .await?
        .filter(|s| s.user_id == auth.user_id)
        .ok_or_else(|| ApiError::NotFound("Subscription not found".into()))?;

    let stripe_id = subscription
        .stripe_subscription_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Subscription is not linked to a payment".into()))?;

    let stripe = state.stripe_client()?;
    let (patch, message) = match action {
        SubscriptionAction::Cancel => {
            stripe.set_cancel_at_period_end(stripe_id, true).await?;
            (
                SubscriptionPatch::cancel_at_period_end(true),
                "Subscription will be canceled at the end of the billing period",
            )
        }
        SubscriptionAction::CancelImmediately => {
            stripe.cancel_subscription(stripe_id).await?;
            (
                SubscriptionPatch {
                    status: Some(SubscriptionStatus::Canceled),
                    cancel_at_period_end: Some(false),
                    ..SubscriptionPatch::default()
                },
                "Subscription canceled",
            )
        }
        SubscriptionAction::Reactivate => {
            stripe.set_cancel_at_period_end(stripe_id, false).await?;
            (
                SubscriptionPatch::cancel_at_period_end(false),
                "Subscription reactivated",
            )
        }
    };

    let subscription = state
        .store
        .update_subscription_by_stripe_id(stripe_id, &patch)
        .await?
        .ok_or_else(|| ApiError::NotFound("Subscription not found".into()))?;

    tracing::info!(
        user_id = %auth.user_id,
        subscription_id = %subscription.id,
        action = ?action,
        "Subscription action applied"
    );
    Ok(Json(SubscriptionActionResponse {
        message,
        subscription,
    }))
}
