//! Checkout and billing portal handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use socialgrow_core::{BillingCycle, PlanId, Platform, UserId};

use crate::auth::AuthUser;
use crate::checkout::{
    self, CheckoutRequest, CheckoutSessionResult, CustomerCheckoutRequest, PlanSelector,
    PortalResult,
};
use crate::error::ApiError;
use crate::state::AppState;

/// Body of `POST /api/create-checkout-session`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutSessionBody {
    /// Plan identifier.
    #[serde(default)]
    pub plan_id: Option<String>,
    /// Purchaser.
    #[serde(default)]
    pub user_id: Option<String>,
    /// `monthly` (default) or `yearly`.
    #[serde(default)]
    pub billing_cycle: Option<String>,
    /// Platform (default `instagram`).
    #[serde(default)]
    pub platform: Option<String>,
}

/// Body of `POST /api/checkout`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    /// Plan slug.
    #[serde(default)]
    pub plan_slug: Option<String>,
    /// `monthly` (default) or `yearly`.
    #[serde(default)]
    pub billing_cycle: Option<String>,
    /// Platform (default `instagram`).
    #[serde(default)]
    pub platform: Option<String>,
    /// Coupon code.
    #[serde(default)]
    pub coupon_code: Option<String>,
}

/// Body of `POST /api/customer-portal`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalBody {
    /// Must match the session user when given.
    #[serde(default)]
    pub user_id: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn billing_cycle(value: Option<&str>) -> Result<BillingCycle, ApiError> {
    non_empty(value).map_or(Ok(BillingCycle::default()), |v| {
        v.parse().map_err(|_| ApiError::BadRequest(format!("Invalid billing cycle: {v}")))
    })
}

fn platform(value: Option<&str>) -> Result<Platform, ApiError> {
    non_empty(value).map_or(Ok(Platform::default()), |v| {
        v.parse().map_err(|_| ApiError::BadRequest(format!("Invalid platform: {v}")))
    })
}

/// Open a checkout session for a plan.
pub async fn create_checkout_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateCheckoutSessionBody>,
) -> Result<Json<CheckoutSessionResult>, ApiError> {
    let plan_id: PlanId = non_empty(body.plan_id.as_deref())
        .ok_or_else(|| ApiError::BadRequest("Plan ID is required".into()))?
        .parse()
        .map_err(|_| ApiError::BadRequest("Plan ID is required".into()))?;

    let user_id = non_empty(body.user_id.as_deref())
        .map(str::parse::<UserId>)
        .transpose()
        .map_err(|_| ApiError::BadRequest("Invalid user ID".into()))?;

    let request = CheckoutRequest {
        plan: PlanSelector::Id(plan_id),
        user_id,
        billing_cycle: billing_cycle(body.billing_cycle.as_deref())?,
        platform: platform(body.platform.as_deref())?,
    };

    Ok(Json(checkout::create_checkout(&state, request).await?))
}

/// Open a checkout session for the signed-in user, with customer and coupon.
pub async fn create_customer_checkout(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CheckoutBody>,
) -> Result<Json<CheckoutSessionResult>, ApiError> {
    let plan_slug = non_empty(body.plan_slug.as_deref())
        .ok_or_else(|| ApiError::BadRequest("Plan slug is required".into()))?
        .to_string();

    let request = CustomerCheckoutRequest {
        plan_slug,
        billing_cycle: billing_cycle(body.billing_cycle.as_deref())?,
        platform: platform(body.platform.as_deref())?,
        coupon_code: body.coupon_code,
    };

    Ok(Json(
        checkout::create_customer_checkout(&state, &auth.user_id, request).await?,
    ))
}

/// Open a billing portal session for the signed-in user.
pub async fn customer_portal(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    body: Option<Json<PortalBody>>,
) -> Result<Json<PortalResult>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    if let Some(requested) = non_empty(body.user_id.as_deref()) {
        if requested != auth.user_id.as_str() {
            tracing::warn!(
                user_id = %auth.user_id,
                requested = %requested,
                "Portal requested for another user"
            );
            return Err(ApiError::Forbidden);
        }
    }

    Ok(Json(checkout::create_portal(&state, &auth.user_id).await?))
}
