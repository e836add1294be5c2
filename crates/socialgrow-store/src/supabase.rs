//! Supabase storage implementation over the `PostgREST` HTTP interface.
//!
//! Every table is reached at `{project_url}/rest/v1/<table>` with the
//! service-role key, which bypasses row-level security. Filters use
//! `PostgREST` operators (`id=eq.<value>`), writes ask for
//! `Prefer: return=representation` so conditional updates can tell whether
//! they matched a row.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use socialgrow_core::{
    normalize_code, Affiliate, AffiliateId, BillingCycle, Coupon, Order, PaymentMethod, Plan,
    PlanId, Platform, Profile, Referral, ReferralId, Subscription, SubscriptionId,
    SubscriptionPatch, SubscriptionStatus, UserId,
};

use crate::error::{Result, StoreError};
use crate::Store;

/// Attempts made by compare-and-set counter updates before giving up.
const CAS_ATTEMPTS: usize = 5;

/// Postgres `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

type Filters<'a> = [(&'a str, String)];

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

/// `PostgREST` error body.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

/// Subscription columns written by an upsert. Leaves `id` and `created_at`
/// to the existing row (or the column defaults on insert).
#[derive(Serialize)]
struct SubscriptionUpsert<'a> {
    user_id: &'a UserId,
    plan_id: &'a PlanId,
    platform: Platform,
    billing_cycle: BillingCycle,
    stripe_subscription_id: Option<&'a str>,
    stripe_customer_id: Option<&'a str>,
    status: SubscriptionStatus,
    current_period_start: Option<chrono::DateTime<Utc>>,
    current_period_end: Option<chrono::DateTime<Utc>>,
    cancel_at_period_end: bool,
    updated_at: chrono::DateTime<Utc>,
}

impl<'a> From<&'a Subscription> for SubscriptionUpsert<'a> {
    fn from(s: &'a Subscription) -> Self {
        Self {
            user_id: &s.user_id,
            plan_id: &s.plan_id,
            platform: s.platform,
            billing_cycle: s.billing_cycle,
            stripe_subscription_id: s.stripe_subscription_id.as_deref(),
            stripe_customer_id: s.stripe_customer_id.as_deref(),
            status: s.status,
            current_period_start: s.current_period_start,
            current_period_end: s.current_period_end,
            cancel_at_period_end: s.cancel_at_period_end,
            updated_at: Utc::now(),
        }
    }
}

/// Supabase-backed storage.
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    client: Client,
    rest_url: String,
    service_key: String,
}

impl SupabaseStore {
    /// Create a store for a Supabase project.
    ///
    /// # Arguments
    ///
    /// * `project_url` - Project URL (`https://<ref>.supabase.co`)
    /// * `service_key` - Service-role API key
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the HTTP client cannot be built.
    pub fn new(project_url: &str, service_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| StoreError::Database(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", project_url.trim_end_matches('/')),
            service_key: service_key.into(),
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{table}", self.rest_url))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        entity: &'static str,
        filters: &Filters<'_>,
    ) -> Result<Vec<T>> {
        let response = self
            .request(Method::GET, table)
            .query(&[("select", "*")])
            .query(filters)
            .send()
            .await
            .map_err(unavailable)?;
        read_rows(entity, response).await
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        entity: &'static str,
        filters: &Filters<'_>,
    ) -> Result<Option<T>> {
        let mut filters = filters.to_vec();
        filters.push(("limit", "1".to_string()));
        let rows: Vec<T> = self.select(table, entity, &filters).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert<B: Serialize + Sync>(
        &self,
        table: &str,
        entity: &'static str,
        row: &B,
    ) -> Result<()> {
        let response = self
            .request(Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(row)
            .send()
            .await
            .map_err(unavailable)?;
        check_status(entity, response).await.map(|_| ())
    }

    async fn patch<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        table: &str,
        entity: &'static str,
        filters: &Filters<'_>,
        body: &B,
    ) -> Result<Vec<T>> {
        let response = self
            .request(Method::PATCH, table)
            .header("Prefer", "return=representation")
            .query(filters)
            .json(body)
            .send()
            .await
            .map_err(unavailable)?;
        read_rows(entity, response).await
    }

    async fn patch_one<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        table: &str,
        entity: &'static str,
        id: &str,
        body: &B,
    ) -> Result<T> {
        let rows: Vec<T> = self.patch(table, entity, &[("id", eq(id))], body).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found(entity, id))
    }
}

// ============================================================================
// Response handling
// ============================================================================

#[allow(clippy::needless_pass_by_value)]
fn unavailable(err: reqwest::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

async fn read_rows<T: DeserializeOwned>(
    entity: &'static str,
    response: Response,
) -> Result<Vec<T>> {
    let response = check_status(entity, response).await?;
    let body = response.text().await.map_err(unavailable)?;
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&body)?)
}

async fn check_status(entity: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(map_error(entity, status, &body))
}

fn map_error(entity: &'static str, status: StatusCode, body: &str) -> StoreError {
    let parsed: Option<PostgrestError> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|e| e.code.as_deref());

    if code == Some(UNIQUE_VIOLATION) || status == StatusCode::CONFLICT {
        let field = parsed
            .as_ref()
            .and_then(|e| e.details.as_deref())
            .and_then(conflicting_column)
            .unwrap_or("unknown")
            .to_string();
        return StoreError::Conflict { entity, field };
    }

    let message = parsed
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.to_string());

    if status.is_server_error() {
        StoreError::Unavailable(format!("HTTP {status}: {message}"))
    } else {
        StoreError::Database(format!("HTTP {status}: {message}"))
    }
}

/// Extract `col` from a Postgres detail such as `Key (col)=(value) already exists.`
fn conflicting_column(details: &str) -> Option<&str> {
    let start = details.find("Key (")? + "Key (".len();
    let end = details[start..].find(')')? + start;
    Some(&details[start..end])
}

#[async_trait]
impl Store for SupabaseStore {
    // =========================================================================
    // Profile Operations
    // =========================================================================

    async fn get_profile(&self, user_id: &UserId) -> Result<Option<Profile>> {
        self.select_one("profiles", "profile", &[("id", eq(user_id))])
            .await
    }

    async fn set_stripe_customer_id(&self, user_id: &UserId, customer_id: &str) -> Result<()> {
        let _: Profile = self
            .patch_one(
                "profiles",
                "profile",
                user_id.as_str(),
                &json!({ "stripe_customer_id": customer_id, "updated_at": Utc::now() }),
            )
            .await?;
        Ok(())
    }

    // =========================================================================
    // Plan Operations
    // =========================================================================

    async fn list_active_plans(&self) -> Result<Vec<Plan>> {
        self.select(
            "plans",
            "plan",
            &[
                ("is_active", eq(true)),
                ("order", "monthly_price.asc".to_string()),
            ],
        )
        .await
    }

    async fn get_plan(&self, plan_id: &PlanId) -> Result<Option<Plan>> {
        self.select_one("plans", "plan", &[("id", eq(plan_id))]).await
    }

    async fn get_plan_by_slug(&self, slug: &str) -> Result<Option<Plan>> {
        self.select_one(
            "plans",
            "plan",
            &[("slug", eq(slug)), ("is_active", eq(true))],
        )
        .await
    }

    // =========================================================================
    // Order Operations
    // =========================================================================

    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.insert("orders", "order", order).await
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        let _: Order = self
            .patch_one("orders", "order", order.id.as_str(), order)
            .await?;
        Ok(())
    }

    async fn get_order_by_session(&self, session_id: &str) -> Result<Option<Order>> {
        self.select_one(
            "orders",
            "order",
            &[
                ("stripe_session_id", eq(session_id)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn list_orders_by_user(&self, user_id: &UserId) -> Result<Vec<Order>> {
        self.select(
            "orders",
            "order",
            &[
                ("user_id", eq(user_id)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<Subscription> {
        if subscription.stripe_subscription_id.is_none() {
            self.insert("subscriptions", "subscription", subscription)
                .await?;
            return Ok(subscription.clone());
        }

        let response = self
            .request(Method::POST, "subscriptions")
            .query(&[("on_conflict", "stripe_subscription_id")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&SubscriptionUpsert::from(subscription))
            .send()
            .await
            .map_err(unavailable)?;
        let rows: Vec<Subscription> = read_rows("subscription", response).await?;
        rows.into_iter().next().ok_or_else(|| {
            StoreError::Database("upsert returned no subscription row".into())
        })
    }

    async fn update_subscription_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
        patch: &SubscriptionPatch,
    ) -> Result<Option<Subscription>> {
        let mut body = serde_json::to_value(patch)?;
        if let Some(map) = body.as_object_mut() {
            map.insert("updated_at".into(), json!(Utc::now()));
        }
        let rows: Vec<Subscription> = self
            .patch(
                "subscriptions",
                "subscription",
                &[("stripe_subscription_id", eq(stripe_subscription_id))],
                &body,
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn get_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>> {
        self.select_one("subscriptions", "subscription", &[("id", eq(id))])
            .await
    }

    async fn list_subscriptions_by_user(&self, user_id: &UserId) -> Result<Vec<Subscription>> {
        self.select(
            "subscriptions",
            "subscription",
            &[
                ("user_id", eq(user_id)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn find_active_subscription(&self, user_id: &UserId) -> Result<Option<Subscription>> {
        self.select_one(
            "subscriptions",
            "subscription",
            &[
                ("user_id", eq(user_id)),
                ("status", eq(SubscriptionStatus::Active)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    // =========================================================================
    // Affiliate Operations
    // =========================================================================

    async fn get_affiliate(&self, id: &AffiliateId) -> Result<Option<Affiliate>> {
        self.select_one("affiliates", "affiliate", &[("id", eq(id))])
            .await
    }

    async fn get_affiliate_by_user(&self, user_id: &UserId) -> Result<Option<Affiliate>> {
        self.select_one("affiliates", "affiliate", &[("user_id", eq(user_id))])
            .await
    }

    async fn get_affiliate_by_code(&self, code: &str) -> Result<Option<Affiliate>> {
        self.select_one("affiliates", "affiliate", &[("referral_code", eq(code))])
            .await
    }

    async fn insert_affiliate(&self, affiliate: &Affiliate) -> Result<()> {
        self.insert("affiliates", "affiliate", affiliate).await
    }

    async fn update_affiliate_payment(
        &self,
        id: &AffiliateId,
        payment_email: Option<&str>,
        payment_method: Option<PaymentMethod>,
    ) -> Result<Affiliate> {
        let mut body = serde_json::Map::new();
        if let Some(email) = payment_email {
            body.insert("payment_email".into(), json!(email));
        }
        if let Some(method) = payment_method {
            body.insert("payment_method".into(), serde_json::to_value(method)?);
        }
        body.insert("updated_at".into(), json!(Utc::now()));
        self.patch_one("affiliates", "affiliate", id.as_str(), &body)
            .await
    }

    async fn increment_affiliate_referrals(&self, id: &AffiliateId) -> Result<i64> {
        for _ in 0..CAS_ATTEMPTS {
            let current = self
                .get_affiliate(id)
                .await?
                .ok_or_else(|| StoreError::not_found("affiliate", id))?;
            let next = current.total_referrals + 1;
            let rows: Vec<Affiliate> = self
                .patch(
                    "affiliates",
                    "affiliate",
                    &[
                        ("id", eq(id)),
                        ("total_referrals", eq(current.total_referrals)),
                    ],
                    &json!({ "total_referrals": next, "updated_at": Utc::now() }),
                )
                .await?;
            if !rows.is_empty() {
                return Ok(next);
            }
            tracing::debug!(affiliate_id = %id, "Referral counter update raced, retrying");
        }
        Err(StoreError::Conflict {
            entity: "affiliate",
            field: "total_referrals".into(),
        })
    }

    async fn credit_affiliate(
        &self,
        id: &AffiliateId,
        commission: i64,
        referred_revenue: i64,
    ) -> Result<Affiliate> {
        for _ in 0..CAS_ATTEMPTS {
            let current = self
                .get_affiliate(id)
                .await?
                .ok_or_else(|| StoreError::not_found("affiliate", id))?;
            let revenue = current.monthly_referred_revenue + referred_revenue;
            let tier = current.commission_tier.promoted_for(revenue);
            let rows: Vec<Affiliate> = self
                .patch(
                    "affiliates",
                    "affiliate",
                    &[
                        ("id", eq(id)),
                        ("total_earnings", eq(current.total_earnings)),
                        ("monthly_referred_revenue", eq(current.monthly_referred_revenue)),
                    ],
                    &json!({
                        "total_earnings": current.total_earnings + commission,
                        "monthly_referred_revenue": revenue,
                        "commission_tier": tier,
                        "updated_at": Utc::now(),
                    }),
                )
                .await?;
            if let Some(row) = rows.into_iter().next() {
                return Ok(row);
            }
            tracing::debug!(affiliate_id = %id, "Affiliate credit raced, retrying");
        }
        Err(StoreError::Conflict {
            entity: "affiliate",
            field: "total_earnings".into(),
        })
    }

    // =========================================================================
    // Referral Operations
    // =========================================================================

    async fn insert_referral(&self, referral: &Referral) -> Result<()> {
        self.insert("referrals", "referral", referral).await
    }

    async fn get_referral_for_user(&self, user_id: &UserId) -> Result<Option<Referral>> {
        self.select_one(
            "referrals",
            "referral",
            &[("referred_user_id", eq(user_id))],
        )
        .await
    }

    async fn activate_referral(
        &self,
        id: &ReferralId,
        subscription_id: Option<&SubscriptionId>,
        commission_earned: i64,
    ) -> Result<bool> {
        let rows: Vec<Referral> = self
            .patch(
                "referrals",
                "referral",
                &[("id", eq(id)), ("status", eq("pending"))],
                &json!({
                    "status": "active",
                    "subscription_id": subscription_id,
                    "commission_earned": commission_earned,
                    "updated_at": Utc::now(),
                }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn list_referrals_by_affiliate(&self, id: &AffiliateId) -> Result<Vec<Referral>> {
        self.select(
            "referrals",
            "referral",
            &[
                ("affiliate_id", eq(id)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    // =========================================================================
    // Coupon Operations
    // =========================================================================

    async fn get_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        self.select_one("coupons", "coupon", &[("code", eq(normalize_code(code)))])
            .await
    }

    async fn increment_coupon_uses(&self, coupon: &Coupon) -> Result<bool> {
        if coupon.max_uses.is_some_and(|max| coupon.current_uses >= max) {
            return Ok(false);
        }
        let rows: Vec<Coupon> = self
            .patch(
                "coupons",
                "coupon",
                &[
                    ("id", eq(&coupon.id)),
                    ("current_uses", eq(coupon.current_uses)),
                ],
                &json!({ "current_uses": coupon.current_uses + 1 }),
            )
            .await?;
        Ok(!rows.is_empty())
    }
}
