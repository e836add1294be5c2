//! Affiliate enrollment handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use socialgrow_core::{Affiliate, PaymentMethod};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::ledger::{self, AffiliateOverview};
use crate::state::AppState;

/// Body of `POST /api/affiliates`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateActionBody {
    /// `register` or `update`.
    #[serde(default)]
    pub action: String,
    /// Where payouts go.
    #[serde(default)]
    pub payment_email: Option<String>,
    /// `paypal`, `stripe`, `bank` or `wise`.
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// Response of an affiliate action.
#[derive(Debug, Serialize)]
pub struct AffiliateActionResponse {
    /// Human-readable result.
    pub message: &'static str,
    /// The new enrollment (register only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affiliate: Option<Affiliate>,
}

/// The caller's enrollment and referrals.
pub async fn get_affiliate(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AffiliateOverview>, ApiError> {
    Ok(Json(ledger::affiliate_overview(&state, &auth.user_id).await?))
}

/// Register as an affiliate or update payout settings.
pub async fn affiliate_action(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<AffiliateActionBody>,
) -> Result<Json<AffiliateActionResponse>, ApiError> {
    let payment_method = body
        .payment_method
        .as_deref()
        .filter(|m| !m.trim().is_empty())
        .map(str::parse::<PaymentMethod>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    match body.action.as_str() {
        "register" => {
            let payment_email = body.payment_email.or(auth.email);
            let affiliate =
                ledger::register_affiliate(&state, &auth.user_id, payment_email, payment_method)
                    .await?;
            Ok(Json(AffiliateActionResponse {
                message: "Successfully registered as affiliate",
                affiliate: Some(affiliate),
            }))
        }
        "update" => {
            ledger::update_affiliate(
                &state,
                &auth.user_id,
                body.payment_email.as_deref(),
                payment_method,
            )
            .await?;
            Ok(Json(AffiliateActionResponse {
                message: "Affiliate settings updated successfully",
                affiliate: None,
            }))
        }
        other => Err(ApiError::BadRequest(format!(
            "Unknown action: {other}. Valid actions: register, update"
        ))),
    }
}
