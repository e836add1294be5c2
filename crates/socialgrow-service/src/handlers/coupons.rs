//! Coupon validation and redemption handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use socialgrow_core::{normalize_code, Coupon, CouponRejection};

use super::Invalid;
use crate::error::ApiError;
use crate::state::AppState;

/// Coupon code carried in the query (`GET`) or body (`POST`).
#[derive(Debug, Deserialize)]
pub struct CouponCode {
    /// The code, any case.
    #[serde(default)]
    pub code: Option<String>,
}

/// Public view of a redeemable coupon.
#[derive(Debug, Serialize)]
pub struct CouponView {
    /// Canonical code.
    pub code: String,
    /// Discount in whole percent.
    pub discount_percentage: i64,
    /// Shown alongside the discount.
    pub description: Option<String>,
    /// Expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Redemptions left; `None` when uncapped.
    pub remaining_uses: Option<i64>,
}

impl From<&Coupon> for CouponView {
    fn from(coupon: &Coupon) -> Self {
        Self {
            code: coupon.code.clone(),
            discount_percentage: coupon.percent_off(),
            description: coupon.description.clone(),
            expires_at: coupon.expires_at,
            remaining_uses: coupon.remaining_uses(),
        }
    }
}

/// A redeemable coupon.
#[derive(Debug, Serialize)]
pub struct ValidCoupon {
    /// Always `true`.
    pub valid: bool,
    /// The coupon.
    pub coupon: CouponView,
}

/// Response of a successful redemption.
#[derive(Debug, Serialize)]
pub struct AppliedCoupon {
    /// Human-readable result.
    pub message: &'static str,
    /// Discount in whole percent.
    pub discount_percentage: i64,
}

/// Look the code up and check it can be redeemed now. The inner `Err` is the
/// rejection to send back as-is.
async fn redeemable(
    state: &AppState,
    code: Option<&str>,
) -> Result<Result<Coupon, Response>, ApiError> {
    let code = code
        .map(normalize_code)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Coupon code is required".into()))?;

    let Some(coupon) = state.store.get_coupon_by_code(&code).await? else {
        return Ok(Err(rejection(CouponRejection::Inactive)));
    };

    Ok(match coupon.check_redeemable(Utc::now()) {
        Ok(()) => Ok(coupon),
        Err(reason) => {
            tracing::debug!(code = %code, reason = %reason, "Coupon rejected");
            Err(rejection(reason))
        }
    })
}

fn rejection(reason: CouponRejection) -> Response {
    let status = match reason {
        CouponRejection::Inactive => StatusCode::NOT_FOUND,
        CouponRejection::Exhausted | CouponRejection::Expired => StatusCode::BAD_REQUEST,
    };
    (status, Json(Invalid::new(reason.to_string()))).into_response()
}

/// Check a coupon code without redeeming it.
pub async fn validate_coupon(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CouponCode>,
) -> Result<Response, ApiError> {
    Ok(match redeemable(&state, query.code.as_deref()).await? {
        Ok(coupon) => Json(ValidCoupon {
            valid: true,
            coupon: CouponView::from(&coupon),
        })
        .into_response(),
        Err(rejected) => rejected,
    })
}

/// Redeem a coupon, counting the use.
pub async fn apply_coupon(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CouponCode>,
) -> Result<Response, ApiError> {
    let coupon = match redeemable(&state, body.code.as_deref()).await? {
        Ok(coupon) => coupon,
        Err(rejected) => return Ok(rejected),
    };

    if !state.store.increment_coupon_uses(&coupon).await? {
        tracing::info!(code = %coupon.code, "Coupon redemption lost a race");
        return Err(ApiError::Conflict(
            "Coupon was redeemed concurrently, please try again".into(),
        ));
    }

    tracing::info!(code = %coupon.code, uses = coupon.current_uses + 1, "Coupon applied");
    Ok(Json(AppliedCoupon {
        message: "Coupon applied successfully",
        discount_percentage: coupon.percent_off(),
    })
    .into_response())
}
