//! Affiliate ledger.
//!
//! Registration, referral tracking and commission crediting. Uniqueness of
//! affiliates, referral codes and referred users comes from storage
//! constraints; the checks made here first only produce friendlier errors.

use serde::Serialize;

use socialgrow_core::{
    generate_referral_code, referral_code_candidate, Affiliate, CommissionTier, PaymentMethod,
    Profile, Referral, SubscriptionId, UserId, REFERRAL_CODE_ATTEMPTS,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Name shown for an affiliate without a profile name.
pub const DEFAULT_AFFILIATE_NAME: &str = "Partner";

const ALREADY_AFFILIATE: &str = "Already registered as an affiliate";
const INVALID_CODE: &str = "Invalid or inactive referral code";
const ALREADY_REFERRED: &str = "User already has a referral record";

/// An affiliate with its referrals.
#[derive(Debug, Clone, Serialize)]
pub struct AffiliateWithReferrals {
    /// The affiliate row.
    #[serde(flatten)]
    pub affiliate: Affiliate,
    /// Referrals under the affiliate, newest first.
    pub referrals: Vec<Referral>,
}

/// Answer to "is this user an affiliate?".
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateOverview {
    /// Whether the user is enrolled.
    pub is_affiliate: bool,
    /// Enrollment details.
    pub affiliate: Option<AffiliateWithReferrals>,
}

/// Public summary of a valid referral code.
#[derive(Debug, Clone, Serialize)]
pub struct ReferralCodeSummary {
    /// The code.
    pub referral_code: String,
    /// Owner's tier.
    pub commission_tier: CommissionTier,
    /// Owner's display name.
    pub affiliate_name: String,
}

/// Commission credited for a converted referral.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    /// Credited affiliate.
    pub affiliate: Affiliate,
    /// Commission added, in cents.
    pub commission: i64,
}

/// Enroll a user in the referral program.
///
/// Payment email defaults to the profile email and payment method to PayPal.
pub async fn register_affiliate(
    state: &AppState,
    user_id: &UserId,
    payment_email: Option<String>,
    payment_method: Option<PaymentMethod>,
) -> Result<Affiliate, ApiError> {
    let profile = state
        .store
        .get_profile(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Profile not found".into()))?;

    if state.store.get_affiliate_by_user(user_id).await?.is_some() {
        return Err(ApiError::BadRequest(ALREADY_AFFILIATE.into()));
    }

    let base = {
        let mut rng = rand::rng();
        generate_referral_code(profile.first_name.as_deref(), &mut rng)
    };
    register_with_code(state, &profile, &base, payment_email, payment_method).await
}

/// Insert the affiliate under `base`, or the next free candidate after it.
async fn register_with_code(
    state: &AppState,
    profile: &Profile,
    base: &str,
    payment_email: Option<String>,
    payment_method: Option<PaymentMethod>,
) -> Result<Affiliate, ApiError> {
    let payment_email = payment_email
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| profile.email.clone());
    let payment_method = payment_method.unwrap_or_default();

    for attempt in 0..REFERRAL_CODE_ATTEMPTS {
        let affiliate = Affiliate::new(
            profile.id.clone(),
            referral_code_candidate(base, attempt),
            Some(payment_email.clone()),
            payment_method,
        );

        match state.store.insert_affiliate(&affiliate).await {
            Ok(()) => {
                tracing::info!(
                    user_id = %profile.id,
                    referral_code = %affiliate.referral_code,
                    "Affiliate registered"
                );
                return Ok(affiliate);
            }
            Err(e) if e.is_conflict_on("referral_code") => {
                tracing::debug!(
                    referral_code = %affiliate.referral_code,
                    "Referral code taken, trying next"
                );
            }
            Err(e) if e.is_conflict_on("user_id") => {
                return Err(ApiError::BadRequest(ALREADY_AFFILIATE.into()));
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApiError::Internal(format!(
        "no free referral code for base {base} after {REFERRAL_CODE_ATTEMPTS} attempts"
    )))
}

/// Change an affiliate's payout settings.
pub async fn update_affiliate(
    state: &AppState,
    user_id: &UserId,
    payment_email: Option<&str>,
    payment_method: Option<PaymentMethod>,
) -> Result<Affiliate, ApiError> {
    let affiliate = state
        .store
        .get_affiliate_by_user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Affiliate not found".into()))?;

    let updated = state
        .store
        .update_affiliate_payment(&affiliate.id, payment_email, payment_method)
        .await?;
    tracing::info!(user_id = %user_id, "Affiliate settings updated");
    Ok(updated)
}

/// The user's affiliate enrollment, if any.
pub async fn affiliate_overview(
    state: &AppState,
    user_id: &UserId,
) -> Result<AffiliateOverview, ApiError> {
    let Some(affiliate) = state.store.get_affiliate_by_user(user_id).await? else {
        return Ok(AffiliateOverview {
            is_affiliate: false,
            affiliate: None,
        });
    };

    let referrals = state.store.list_referrals_by_affiliate(&affiliate.id).await?;
    Ok(AffiliateOverview {
        is_affiliate: true,
        affiliate: Some(AffiliateWithReferrals {
            affiliate,
            referrals,
        }),
    })
}

async fn active_affiliate_by_code(
    state: &AppState,
    code: &str,
) -> Result<Option<Affiliate>, ApiError> {
    Ok(state
        .store
        .get_affiliate_by_code(code.trim())
        .await?
        .filter(Affiliate::is_active))
}

/// Record that `new_user` signed up with `code`.
pub async fn record_referral(
    state: &AppState,
    code: &str,
    new_user: &UserId,
) -> Result<Referral, ApiError> {
    let affiliate = active_affiliate_by_code(state, code)
        .await?
        .ok_or_else(|| ApiError::NotFound(INVALID_CODE.into()))?;

    if &affiliate.user_id == new_user {
        tracing::info!(user_id = %new_user, "Rejected self-referral");
        return Err(ApiError::BadRequest("Cannot refer yourself".into()));
    }

    if state.store.get_referral_for_user(new_user).await?.is_some() {
        return Err(ApiError::BadRequest(ALREADY_REFERRED.into()));
    }

    let referral = Referral::pending(&affiliate, new_user.clone());
    match state.store.insert_referral(&referral).await {
        Ok(()) => {}
        Err(e) if e.is_conflict_on("referred_user_id") => {
            return Err(ApiError::BadRequest(ALREADY_REFERRED.into()));
        }
        Err(e) => return Err(e.into()),
    }

    if let Err(e) = state.store.increment_affiliate_referrals(&affiliate.id).await {
        tracing::warn!(
            affiliate_id = %affiliate.id,
            error = %e,
            "Failed to bump referral counter"
        );
    }

    tracing::info!(
        referral_code = %affiliate.referral_code,
        user_id = %new_user,
        "Referral tracked"
    );
    Ok(referral)
}

/// Look up a referral code for the signup page.
///
/// Returns `None` for unknown or inactive codes.
pub async fn validate_referral_code(
    state: &AppState,
    code: &str,
) -> Result<Option<ReferralCodeSummary>, ApiError> {
    let Some(affiliate) = active_affiliate_by_code(state, code).await? else {
        return Ok(None);
    };

    let affiliate_name = match state.store.get_profile(&affiliate.user_id).await {
        Ok(profile) => profile.and_then(|p| p.display_name()),
        Err(e) => {
            tracing::warn!(
                user_id = %affiliate.user_id,
                error = %e,
                "Affiliate profile lookup failed"
            );
            None
        }
    }
    .unwrap_or_else(|| DEFAULT_AFFILIATE_NAME.to_string());

    Ok(Some(ReferralCodeSummary {
        referral_code: affiliate.referral_code,
        commission_tier: affiliate.commission_tier,
        affiliate_name,
    }))
}

/// Convert the purchaser's pending referral and credit its affiliate.
///
/// The commission is `amount_total` at the affiliate's current tier rate.
/// Only the call that moves the referral out of pending credits anything;
/// redelivered events return `None`.
pub async fn convert_referral(
    state: &AppState,
    user_id: &UserId,
    subscription_id: Option<&SubscriptionId>,
    amount_total: i64,
) -> Result<Option<Conversion>, ApiError> {
    let Some(referral) = state
        .store
        .get_referral_for_user(user_id)
        .await?
        .filter(Referral::is_pending)
    else {
        return Ok(None);
    };

    let Some(affiliate) = state.store.get_affiliate(&referral.affiliate_id).await? else {
        tracing::warn!(
            referral_id = %referral.id,
            affiliate_id = %referral.affiliate_id,
            "Referral points at a missing affiliate"
        );
        return Ok(None);
    };

    let commission = affiliate.commission_tier.commission_on(amount_total);

    if !state
        .store
        .activate_referral(&referral.id, subscription_id, commission)
        .await?
    {
        tracing::debug!(referral_id = %referral.id, "Referral already converted");
        return Ok(None);
    }

    let affiliate = state
        .store
        .credit_affiliate(&affiliate.id, commission, amount_total)
        .await?;

    tracing::info!(
        affiliate_id = %affiliate.id,
        referral_id = %referral.id,
        commission,
        tier = %affiliate.commission_tier,
        "Referral converted"
    );

    Ok(Some(Conversion {
        affiliate,
        commission,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use socialgrow_core::{AffiliateStatus, ReferralStatus};
    use socialgrow_store::{MemoryStore, Store};

    use crate::config::ServiceConfig;

    fn state_over(store: &Arc<MemoryStore>) -> AppState {
        AppState::new(store.clone(), ServiceConfig::default())
    }

    fn uid(s: &str) -> UserId {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn registration_derives_code_from_first_name() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_profile(Profile::new(uid("u1"), "jane@example.com").with_name("Jane", "Doe"))
            .await;
        let state = state_over(&store);

        let affiliate = register_affiliate(&state, &uid("u1"), None, None).await.unwrap();
        assert!(affiliate.referral_code.starts_with("JAN"));
        assert_eq!(affiliate.referral_code.len(), 7);
        assert_eq!(affiliate.commission_tier, CommissionTier::Bronze);
        assert_eq!(affiliate.payment_email.as_deref(), Some("jane@example.com"));
        assert_eq!(affiliate.payment_method, PaymentMethod::Paypal);
        assert!(!affiliate.is_approved);

        let again = register_affiliate(&state, &uid("u1"), None, None).await.unwrap_err();
        assert!(matches!(again, ApiError::BadRequest(msg) if msg == ALREADY_AFFILIATE));
    }

    #[tokio::test]
    async fn registration_without_name_uses_user_prefix() {
        let store = Arc::new(MemoryStore::new());
        store.put_profile(Profile::new(uid("u2"), "x@example.com")).await;
        let state = state_over(&store);

        let affiliate = register_affiliate(
            &state,
            &uid("u2"),
            Some("pay@example.com".into()),
            Some(PaymentMethod::Wise),
        )
        .await
        .unwrap();
        assert!(affiliate.referral_code.starts_with("USER"));
        assert_eq!(affiliate.referral_code.len(), 10);
        assert_eq!(affiliate.payment_email.as_deref(), Some("pay@example.com"));
        assert_eq!(affiliate.payment_method, PaymentMethod::Wise);
    }

    #[tokio::test]
    async fn registration_requires_profile() {
        let store = Arc::new(MemoryStore::new());
        let err = register_affiliate(&state_over(&store), &uid("ghost"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    fn taken(owner: &str, code: &str) -> Affiliate {
        Affiliate::new(uid(owner), code.into(), None, PaymentMethod::Paypal)
    }

    #[tokio::test]
    async fn taken_code_advances_to_next_candidate() {
        let store = Arc::new(MemoryStore::new());
        store.put_affiliate(taken("other", "ABC123")).await;
        let profile = Profile::new(uid("u3"), "u3@example.com");
        let state = state_over(&store);

        let affiliate = register_with_code(&state, &profile, "ABC123", None, None)
            .await
            .unwrap();
        assert_eq!(affiliate.referral_code, "ABC1231");
        let stored = store.get_affiliate_by_code("ABC1231").await.unwrap().unwrap();
        assert_eq!(stored.user_id, uid("u3"));
    }

    #[tokio::test]
    async fn exhausted_candidates_are_an_internal_error() {
        let store = Arc::new(MemoryStore::new());
        for attempt in 0..REFERRAL_CODE_ATTEMPTS {
            let code = referral_code_candidate("ABC123", attempt);
            store.put_affiliate(taken(&format!("other{attempt}"), &code)).await;
        }
        let profile = Profile::new(uid("u4"), "u4@example.com");
        let state = state_over(&store);

        let err = register_with_code(&state, &profile, "ABC123", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
        assert!(store.get_affiliate_by_user(&uid("u4")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_enrollment_is_already_registered() {
        let store = Arc::new(MemoryStore::new());
        store.put_affiliate(taken("u5", "FIRST01")).await;
        let profile = Profile::new(uid("u5"), "u5@example.com");
        let state = state_over(&store);

        let err = register_with_code(&state, &profile, "SECOND1", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg == ALREADY_AFFILIATE));
    }

    #[tokio::test]
    async fn referrals_reject_self_and_duplicates() {
        let store = Arc::new(MemoryStore::new());
        let owner = Affiliate::new(uid("owner"), "OWNCODE".into(), None, PaymentMethod::Paypal);
        store.put_affiliate(owner.clone()).await;
        let state = state_over(&store);

        let err = record_referral(&state, "OWNCODE", &uid("owner")).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg == "Cannot refer yourself"));
        assert!(store.all_referrals().await.is_empty());

        let referral = record_referral(&state, "OWNCODE", &uid("new")).await.unwrap();
        assert_eq!(referral.status, ReferralStatus::Pending);
        assert_eq!(referral.commission_rate, 15);

        let err = record_referral(&state, "OWNCODE", &uid("new")).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg == ALREADY_REFERRED));

        let counted = store.get_affiliate(&owner.id).await.unwrap().unwrap();
        assert_eq!(counted.total_referrals, 1);
    }

    #[tokio::test]
    async fn inactive_codes_are_invalid() {
        let store = Arc::new(MemoryStore::new());
        let mut affiliate =
            Affiliate::new(uid("owner"), "SLEEPY1".into(), None, PaymentMethod::Paypal);
        affiliate.status = AffiliateStatus::Inactive;
        store.put_affiliate(affiliate).await;
        let state = state_over(&store);

        assert!(validate_referral_code(&state, "SLEEPY1").await.unwrap().is_none());
        assert!(validate_referral_code(&state, "MISSING").await.unwrap().is_none());
        let err = record_referral(&state, "SLEEPY1", &uid("new")).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(msg) if msg == INVALID_CODE));
    }

    #[tokio::test]
    async fn code_summary_names_the_owner() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_profile(Profile::new(uid("owner"), "o@example.com").with_name("Ada", ""))
            .await;
        store
            .put_affiliate(Affiliate::new(
                uid("owner"),
                "ADA1234".into(),
                None,
                PaymentMethod::Paypal,
            ))
            .await;
        store
            .put_affiliate(Affiliate::new(
                uid("anon"),
                "USERXYZ123".into(),
                None,
                PaymentMethod::Paypal,
            ))
            .await;
        let state = state_over(&store);

        let named = validate_referral_code(&state, "ADA1234").await.unwrap().unwrap();
        assert_eq!(named.affiliate_name, "Ada");
        let unnamed = validate_referral_code(&state, "USERXYZ123").await.unwrap().unwrap();
        assert_eq!(unnamed.affiliate_name, DEFAULT_AFFILIATE_NAME);
    }

    #[tokio::test]
    async fn conversion_credits_once() {
        let store = Arc::new(MemoryStore::new());
        let mut affiliate =
            Affiliate::new(uid("owner"), "GOLD001".into(), None, PaymentMethod::Paypal);
        affiliate.commission_tier = CommissionTier::Gold;
        store.put_affiliate(affiliate.clone()).await;
        store
            .put_referral(Referral::pending(&affiliate, uid("buyer")))
            .await;
        let state = state_over(&store);

        let conversion = convert_referral(&state, &uid("buyer"), None, 10_000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversion.commission, 2500);
        assert_eq!(conversion.affiliate.total_earnings, 2500);
        assert_eq!(conversion.affiliate.monthly_referred_revenue, 10_000);

        assert!(convert_referral(&state, &uid("buyer"), None, 10_000)
            .await
            .unwrap()
            .is_none());
        let after = store.get_affiliate(&affiliate.id).await.unwrap().unwrap();
        assert_eq!(after.total_earnings, 2500);
    }

    #[tokio::test]
    async fn no_referral_no_conversion() {
        let store = Arc::new(MemoryStore::new());
        let state = state_over(&store);
        assert!(convert_referral(&state, &uid("buyer"), None, 5900)
            .await
            .unwrap()
            .is_none());
    }
}
