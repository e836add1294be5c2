//! Referral tracking handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use socialgrow_core::{Referral, UserId};

use super::Invalid;
use crate::error::ApiError;
use crate::ledger::{self, ReferralCodeSummary};
use crate::state::AppState;

/// Body of `POST /api/referrals`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackReferralBody {
    /// Code the new user signed up with.
    #[serde(default)]
    pub referral_code: Option<String>,
    /// The new user.
    #[serde(default)]
    pub new_user_id: Option<String>,
}

/// Response of `POST /api/referrals`.
#[derive(Debug, Serialize)]
pub struct TrackReferralResponse {
    /// Human-readable result.
    pub message: &'static str,
    /// The pending referral.
    pub referral: Referral,
}

/// Query of `GET /api/referrals`.
#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    /// Code to check.
    #[serde(default)]
    pub code: Option<String>,
}

/// A code that resolves to an active affiliate.
#[derive(Debug, Serialize)]
pub struct ValidCode {
    /// Always `true`.
    pub valid: bool,
    /// Public affiliate details.
    pub affiliate: ReferralCodeSummary,
}

const MISSING_FIELDS: &str = "Missing required fields: referralCode, newUserId";

/// Attribute a new user to an affiliate.
pub async fn track_referral(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TrackReferralBody>,
) -> Result<Json<TrackReferralResponse>, ApiError> {
    let code = body
        .referral_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest(MISSING_FIELDS.into()))?;
    let new_user: UserId = body
        .new_user_id
        .as_deref()
        .and_then(|u| u.parse().ok())
        .ok_or_else(|| ApiError::BadRequest(MISSING_FIELDS.into()))?;

    let referral = ledger::record_referral(&state, code, &new_user).await?;
    Ok(Json(TrackReferralResponse {
        message: "Referral tracked successfully",
        referral,
    }))
}

/// Check a referral code.
pub async fn validate_referral(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ValidateQuery>,
) -> Result<Response, ApiError> {
    let code = query
        .code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing referral code parameter".into()))?;

    Ok(match ledger::validate_referral_code(&state, code).await? {
        Some(affiliate) => Json(ValidCode {
            valid: true,
            affiliate,
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(Invalid::new("Invalid or inactive referral code")),
        )
            .into_response(),
    })
}
