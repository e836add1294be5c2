//! Checkout orchestration.
//!
//! Resolves the plan and the purchaser, opens a hosted Stripe Checkout session
//! in subscription mode and records a pending order against it. The order
//! write is bookkeeping: if it fails the session is still returned.

use serde::Serialize;

use socialgrow_core::{
    normalize_code, BillingCycle, Coupon, Order, OrderTotals, Plan, PlanId, Platform, Profile,
    UserId,
};

use crate::error::ApiError;
use crate::state::AppState;
use crate::stripe::{CheckoutSessionParams, LineItemPrice, StripeClient};

/// Email used when the purchaser has no profile.
pub const PLACEHOLDER_EMAIL: &str = "customer@example.com";

/// How the plan is named in a checkout request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanSelector {
    /// By identifier (`pro-plan`).
    Id(PlanId),
    /// By slug (`pro`).
    Slug(String),
}

/// Checkout for a possibly anonymous purchaser.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// Plan to buy.
    pub plan: PlanSelector,
    /// Purchaser, when known.
    pub user_id: Option<UserId>,
    /// Renewal cadence.
    pub billing_cycle: BillingCycle,
    /// Platform being grown.
    pub platform: Platform,
}

/// Checkout for a signed-in purchaser, with a processor customer and an
/// optional coupon.
#[derive(Debug, Clone)]
pub struct CustomerCheckoutRequest {
    /// Plan slug.
    pub plan_slug: String,
    /// Renewal cadence.
    pub billing_cycle: BillingCycle,
    /// Platform being grown.
    pub platform: Platform,
    /// Coupon code to apply.
    pub coupon_code: Option<String>,
}

/// A created checkout session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionResult {
    /// Processor session id.
    pub session_id: String,
    /// Hosted checkout page.
    pub url: Option<String>,
}

/// A created billing portal session.
#[derive(Debug, Clone, Serialize)]
pub struct PortalResult {
    /// Hosted portal page.
    pub url: String,
}

/// Who the session is for on the processor side.
enum Purchaser {
    Customer(String),
    Email(String),
}

async fn resolve_plan(state: &AppState, selector: &PlanSelector) -> Result<Plan, ApiError> {
    let plan = match selector {
        PlanSelector::Id(id) => state.catalog.resolve_plan(id).await,
        PlanSelector::Slug(slug) => state.catalog.resolve_plan_by_slug(slug).await,
    };
    plan.ok_or_else(|| ApiError::NotFound("Plan not found".into()))
}

/// Create a checkout session.
///
/// Profile lookup failures fall back to [`PLACEHOLDER_EMAIL`].
pub async fn create_checkout(
    state: &AppState,
    request: CheckoutRequest,
) -> Result<CheckoutSessionResult, ApiError> {
    let stripe = state.stripe_client()?;
    let plan = resolve_plan(state, &request.plan).await?;

    let mut email = PLACEHOLDER_EMAIL.to_string();
    if let Some(user_id) = &request.user_id {
        match state.store.get_profile(user_id).await {
            Ok(Some(profile)) => email = profile.email,
            Ok(None) => {
                tracing::warn!(
                    user_id = %user_id,
                    "No profile for purchaser, using placeholder email"
                );
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Profile lookup failed, using placeholder email"
                );
            }
        }
    }

    open_session(
        state,
        stripe,
        &plan,
        request.user_id.as_ref(),
        request.billing_cycle,
        request.platform,
        Purchaser::Email(email),
        None,
    )
    .await
}

/// Create a checkout session for a signed-in user.
///
/// The user's Stripe customer is found or created and remembered on the
/// profile. A coupon is validated against storage and mirrored into Stripe;
/// if mirroring fails the session is created without the discount.
pub async fn create_customer_checkout(
    state: &AppState,
    user_id: &UserId,
    request: CustomerCheckoutRequest,
) -> Result<CheckoutSessionResult, ApiError> {
    let stripe = state.stripe_client()?;
    let profile = state
        .store
        .get_profile(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Profile not found".into()))?;

    let plan = resolve_plan(state, &PlanSelector::Slug(request.plan_slug)).await?;
    let customer_id = ensure_customer(state, stripe, &profile).await?;

    let coupon = match request.coupon_code.as_deref().map(normalize_code) {
        Some(code) if !code.is_empty() => {
            let coupon = redeemable_coupon(state, &code).await?;
            sync_coupon(stripe, &coupon).await.then_some(coupon)
        }
        _ => None,
    };

    open_session(
        state,
        stripe,
        &plan,
        Some(user_id),
        request.billing_cycle,
        request.platform,
        Purchaser::Customer(customer_id),
        coupon.as_ref(),
    )
    .await
}

async fn redeemable_coupon(state: &AppState, code: &str) -> Result<Coupon, ApiError> {
    let coupon = state
        .store
        .get_coupon_by_code(code)
        .await?
        .filter(|c| c.is_active)
        .ok_or_else(|| ApiError::BadRequest("Invalid or expired coupon code".into()))?;
    coupon
        .check_redeemable(chrono::Utc::now())
        .map_err(|rejection| ApiError::BadRequest(rejection.to_string()))?;
    Ok(coupon)
}

/// Make sure Stripe knows the coupon. Returns whether it can be attached.
async fn sync_coupon(stripe: &StripeClient, coupon: &Coupon) -> bool {
    match stripe.retrieve_coupon(&coupon.code).await {
        Ok(Some(_)) => return true,
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(
                code = %coupon.code,
                error = %e,
                "Stripe coupon lookup failed, continuing without discount"
            );
            return false;
        }
    }

    match stripe
        .create_coupon(
            &coupon.code,
            coupon.percent_off(),
            coupon.description.as_deref(),
        )
        .await
    {
        Ok(_) => {
            tracing::info!(code = %coupon.code, "Mirrored coupon into Stripe");
            true
        }
        Err(e) => {
            tracing::warn!(
                code = %coupon.code,
                error = %e,
                "Stripe coupon sync failed, continuing without discount"
            );
            false
        }
    }
}

/// Find or create the user's Stripe customer.
async fn ensure_customer(
    state: &AppState,
    stripe: &StripeClient,
    profile: &Profile,
) -> Result<String, ApiError> {
    if let Some(customer_id) = profile.stripe_customer_id.as_deref().filter(|c| !c.is_empty()) {
        return Ok(customer_id.to_string());
    }

    let customer = match stripe.find_customer_by_email(&profile.email).await? {
        Some(customer) => customer,
        None => {
            let name = profile.display_name();
            let customer = stripe
                .create_customer(&profile.email, name.as_deref(), profile.id.as_str())
                .await?;
            tracing::info!(
                user_id = %profile.id,
                customer_id = %customer.id,
                "Created Stripe customer"
            );
            customer
        }
    };

    if let Err(e) = state
        .store
        .set_stripe_customer_id(&profile.id, &customer.id)
        .await
    {
        tracing::warn!(
            user_id = %profile.id,
            customer_id = %customer.id,
            error = %e,
            "Failed to save Stripe customer on profile"
        );
    }

    Ok(customer.id)
}

#[allow(clippy::too_many_arguments)]
async fn open_session(
    state: &AppState,
    stripe: &StripeClient,
    plan: &Plan,
    user_id: Option<&UserId>,
    billing_cycle: BillingCycle,
    platform: Platform,
    purchaser: Purchaser,
    coupon: Option<&Coupon>,
) -> Result<CheckoutSessionResult, ApiError> {
    let charge = plan.charge_for(billing_cycle);
    let price = match plan.price_id_for(billing_cycle) {
        Some(price_id) => LineItemPrice::Price(price_id.to_string()),
        None => LineItemPrice::Inline {
            name: plan.name.clone(),
            description: plan.description.clone(),
            unit_amount: charge,
            cycle: billing_cycle,
        },
    };

    let (customer_id, customer_email) = match purchaser {
        Purchaser::Customer(id) => (Some(id), None),
        Purchaser::Email(email) => (None, Some(email)),
    };

    let params = CheckoutSessionParams {
        price,
        user_id: user_id.map(ToString::to_string),
        plan_id: plan.id.to_string(),
        platform,
        billing_cycle,
        customer_id,
        customer_email,
        coupon_id: coupon.map(|c| c.code.clone()),
        success_url: state.config.checkout_success_url(),
        cancel_url: state.config.checkout_cancel_url(),
    };

    let session = stripe.create_checkout_session(&params).await?;

    if let Some(user_id) = user_id {
        let totals = OrderTotals {
            subtotal: charge,
            tax: 0,
            discount: coupon.map_or(0, |c| c.discount_on(charge)),
        };
        let mut order = Order::pending(user_id.clone(), totals, &session.id);
        order.plan_id = Some(plan.id.clone());
        order.coupon_id = coupon.map(|c| c.id.clone());

        if let Err(e) = state.store.insert_order(&order).await {
            tracing::warn!(
                user_id = %user_id,
                session_id = %session.id,
                error = %e,
                "Pending order insert failed"
            );
        }
    }

    tracing::info!(
        session_id = %session.id,
        plan_id = %plan.id,
        billing_cycle = %billing_cycle,
        "Checkout session created"
    );

    Ok(CheckoutSessionResult {
        session_id: session.id,
        url: session.url,
    })
}

/// Open a billing portal session for the user's active subscription.
pub async fn create_portal(state: &AppState, user_id: &UserId) -> Result<PortalResult, ApiError> {
    let stripe = state.stripe_client()?;

    let customer_id = state
        .store
        .find_active_subscription(user_id)
        .await?
        .and_then(|s| s.stripe_customer_id)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::NotFound("No active subscription found".into()))?;

    let session = stripe
        .create_portal_session(&customer_id, &state.config.portal_return_url())
        .await?;

    tracing::info!(
        user_id = %user_id,
        customer_id = %customer_id,
        "Customer portal session created"
    );

    Ok(PortalResult { url: session.url })
}
