//! In-memory storage implementation.
//!
//! All tables live behind one `tokio` lock, so every operation is atomic with
//! respect to the others. The same uniqueness constraints as the hosted
//! schema are enforced.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use socialgrow_core::{
    normalize_code, Affiliate, AffiliateId, Coupon, CouponId, Order, OrderId, PaymentMethod, Plan,
    PlanId, Profile, Referral, ReferralId, ReferralStatus, Subscription, SubscriptionId,
    SubscriptionPatch, SubscriptionStatus, UserId,
};

use crate::error::{Result, StoreError};
use crate::Store;

#[derive(Default)]
struct Tables {
    profiles: HashMap<UserId, Profile>,
    plans: HashMap<PlanId, Plan>,
    orders: HashMap<OrderId, Order>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    affiliates: HashMap<AffiliateId, Affiliate>,
    referrals: HashMap<ReferralId, Referral>,
    coupons: HashMap<CouponId, Coupon>,
}

/// In-memory storage backend.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose plan table holds `plans`.
    #[must_use]
    pub fn with_plans(plans: impl IntoIterator<Item = Plan>) -> Self {
        let tables = Tables {
            plans: plans.into_iter().map(|p| (p.id.clone(), p)).collect(),
            ..Tables::default()
        };
        Self {
            tables: RwLock::new(tables),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every subsequent operation fail with `StoreError::Unavailable`
    /// (or succeed again with `false`).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }

    /// Hold the table write lock so that other operations block.
    #[cfg(test)]
    pub(crate) async fn hold_tables(&self) -> impl Sized + '_ {
        self.tables.write().await
    }

    // =========================================================================
    // Seeding (bypasses constraints)
    // =========================================================================

    /// Insert or replace a profile.
    pub async fn put_profile(&self, profile: Profile) {
        self.tables.write().await.profiles.insert(profile.id.clone(), profile);
    }

    /// Insert or replace a plan.
    pub async fn put_plan(&self, plan: Plan) {
        self.tables.write().await.plans.insert(plan.id.clone(), plan);
    }

    /// Insert or replace a coupon.
    pub async fn put_coupon(&self, coupon: Coupon) {
        self.tables.write().await.coupons.insert(coupon.id.clone(), coupon);
    }

    /// Insert or replace an affiliate.
    pub async fn put_affiliate(&self, affiliate: Affiliate) {
        self.tables
            .write()
            .await
            .affiliates
            .insert(affiliate.id.clone(), affiliate);
    }

    /// Insert or replace a referral.
    pub async fn put_referral(&self, referral: Referral) {
        self.tables
            .write()
            .await
            .referrals
            .insert(referral.id.clone(), referral);
    }

    /// Snapshot of every order.
    pub async fn all_orders(&self) -> Vec<Order> {
        self.tables.read().await.orders.values().cloned().collect()
    }

    /// Snapshot of every referral.
    pub async fn all_referrals(&self) -> Vec<Referral> {
        self.tables.read().await.referrals.values().cloned().collect()
    }
}

fn newest_first<T>(mut rows: Vec<T>, created: impl Fn(&T) -> chrono::DateTime<Utc>) -> Vec<T> {
    rows.sort_by_key(|row| std::cmp::Reverse(created(row)));
    rows
}

#[async_trait]
impl Store for MemoryStore {
    // =========================================================================
    // Profile Operations
    // =========================================================================

    async fn get_profile(&self, user_id: &UserId) -> Result<Option<Profile>> {
        self.check_available()?;
        Ok(self.tables.read().await.profiles.get(user_id).cloned())
    }

    async fn set_stripe_customer_id(&self, user_id: &UserId, customer_id: &str) -> Result<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let profile = tables
            .profiles
            .get_mut(user_id)
            .ok_or_else(|| StoreError::not_found("profile", user_id))?;
        profile.stripe_customer_id = Some(customer_id.to_string());
        Ok(())
    }

    // =========================================================================
    // Plan Operations
    // =========================================================================

    async fn list_active_plans(&self) -> Result<Vec<Plan>> {
        self.check_available()?;
        let mut plans: Vec<Plan> = self
            .tables
            .read()
            .await
            .plans
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        plans.sort_by_key(|p| p.monthly_price);
        Ok(plans)
    }

    async fn get_plan(&self, plan_id: &PlanId) -> Result<Option<Plan>> {
        self.check_available()?;
        Ok(self.tables.read().await.plans.get(plan_id).cloned())
    }

    async fn get_plan_by_slug(&self, slug: &str) -> Result<Option<Plan>> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .await
            .plans
            .values()
            .find(|p| p.is_active && p.slug == slug)
            .cloned())
    }

    // =========================================================================
    // Order Operations
    // =========================================================================

    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        if tables.orders.contains_key(&order.id) {
            return Err(StoreError::Conflict {
                entity: "order",
                field: "id".into(),
            });
        }
        tables.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn update_order(&self, order: &Order) -> Result<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let row = tables
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| StoreError::not_found("order", &order.id))?;
        *row = order.clone();
        Ok(())
    }

    async fn get_order_by_session(&self, session_id: &str) -> Result<Option<Order>> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.stripe_session_id.as_deref() == Some(session_id))
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn list_orders_by_user(&self, user_id: &UserId) -> Result<Vec<Order>> {
        self.check_available()?;
        let rows = self
            .tables
            .read()
            .await
            .orders
            .values()
            .filter(|o| &o.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |o| o.created_at))
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<Subscription> {
        self.check_available()?;
        let mut tables = self.tables.write().await;

        let existing = subscription.stripe_subscription_id.as_deref().and_then(|sid| {
            tables
                .subscriptions
                .values()
                .find(|s| s.stripe_subscription_id.as_deref() == Some(sid))
                .map(|s| (s.id.clone(), s.created_at))
        });

        let mut row = subscription.clone();
        if let Some((id, created_at)) = existing {
            row.id = id;
            row.created_at = created_at;
            row.updated_at = Utc::now();
        }
        tables.subscriptions.insert(row.id.clone(), row.clone());
        Ok(row)
    }

    async fn update_subscription_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
        patch: &SubscriptionPatch,
    ) -> Result<Option<Subscription>> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let Some(row) = tables
            .subscriptions
            .values_mut()
            .find(|s| s.stripe_subscription_id.as_deref() == Some(stripe_subscription_id))
        else {
            return Ok(None);
        };
        row.apply(patch);
        Ok(Some(row.clone()))
    }

    async fn get_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>> {
        self.check_available()?;
        Ok(self.tables.read().await.subscriptions.get(id).cloned())
    }

    async fn list_subscriptions_by_user(&self, user_id: &UserId) -> Result<Vec<Subscription>> {
        self.check_available()?;
        let rows = self
            .tables
            .read()
            .await
            .subscriptions
            .values()
            .filter(|s| &s.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |s| s.created_at))
    }

    async fn find_active_subscription(&self, user_id: &UserId) -> Result<Option<Subscription>> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .await
            .subscriptions
            .values()
            .filter(|s| &s.user_id == user_id && s.status == SubscriptionStatus::Active)
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    // =========================================================================
    // Affiliate Operations
    // =========================================================================

    async fn get_affiliate(&self, id: &AffiliateId) -> Result<Option<Affiliate>> {
        self.check_available()?;
        Ok(self.tables.read().await.affiliates.get(id).cloned())
    }

    async fn get_affiliate_by_user(&self, user_id: &UserId) -> Result<Option<Affiliate>> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .await
            .affiliates
            .values()
            .find(|a| &a.user_id == user_id)
            .cloned())
    }

    async fn get_affiliate_by_code(&self, code: &str) -> Result<Option<Affiliate>> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .await
            .affiliates
            .values()
            .find(|a| a.referral_code == code)
            .cloned())
    }

    async fn insert_affiliate(&self, affiliate: &Affiliate) -> Result<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        for existing in tables.affiliates.values() {
            let field = if existing.user_id == affiliate.user_id {
                "user_id"
            } else if existing.referral_code == affiliate.referral_code {
                "referral_code"
            } else {
                continue;
            };
            return Err(StoreError::Conflict {
                entity: "affiliate",
                field: field.into(),
            });
        }
        tables
            .affiliates
            .insert(affiliate.id.clone(), affiliate.clone());
        Ok(())
    }

    async fn update_affiliate_payment(
        &self,
        id: &AffiliateId,
        payment_email: Option<&str>,
        payment_method: Option<PaymentMethod>,
    ) -> Result<Affiliate> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let row = tables
            .affiliates
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("affiliate", id))?;
        if let Some(email) = payment_email {
            row.payment_email = Some(email.to_string());
        }
        if let Some(method) = payment_method {
            row.payment_method = method;
        }
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn increment_affiliate_referrals(&self, id: &AffiliateId) -> Result<i64> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let row = tables
            .affiliates
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("affiliate", id))?;
        row.total_referrals += 1;
        row.updated_at = Utc::now();
        Ok(row.total_referrals)
    }

    async fn credit_affiliate(
        &self,
        id: &AffiliateId,
        commission: i64,
        referred_revenue: i64,
    ) -> Result<Affiliate> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let row = tables
            .affiliates
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("affiliate", id))?;
        row.total_earnings += commission;
        row.monthly_referred_revenue += referred_revenue;
        row.commission_tier = row.commission_tier.promoted_for(row.monthly_referred_revenue);
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    // =========================================================================
    // Referral Operations
    // =========================================================================

    async fn insert_referral(&self, referral: &Referral) -> Result<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        if tables
            .referrals
            .values()
            .any(|r| r.referred_user_id == referral.referred_user_id)
        {
            return Err(StoreError::Conflict {
                entity: "referral",
                field: "referred_user_id".into(),
            });
        }
        tables.referrals.insert(referral.id.clone(), referral.clone());
        Ok(())
    }

    async fn get_referral_for_user(&self, user_id: &UserId) -> Result<Option<Referral>> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .await
            .referrals
            .values()
            .find(|r| &r.referred_user_id == user_id)
            .cloned())
    }

    async fn activate_referral(
        &self,
        id: &ReferralId,
        subscription_id: Option<&SubscriptionId>,
        commission_earned: i64,
    ) -> Result<bool> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let Some(row) = tables.referrals.get_mut(id) else {
            return Ok(false);
        };
        if row.status != ReferralStatus::Pending {
            return Ok(false);
        }
        row.status = ReferralStatus::Active;
        row.subscription_id = subscription_id.cloned();
        row.commission_earned = commission_earned;
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn list_referrals_by_affiliate(&self, id: &AffiliateId) -> Result<Vec<Referral>> {
        self.check_available()?;
        let rows = self
            .tables
            .read()
            .await
            .referrals
            .values()
            .filter(|r| &r.affiliate_id == id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |r| r.created_at))
    }

    // =========================================================================
    // Coupon Operations
    // =========================================================================

    async fn get_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        self.check_available()?;
        let code = normalize_code(code);
        Ok(self
            .tables
            .read()
            .await
            .coupons
            .values()
            .find(|c| c.code == code)
            .cloned())
    }

    async fn increment_coupon_uses(&self, coupon: &Coupon) -> Result<bool> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let row = tables
            .coupons
            .get_mut(&coupon.id)
            .ok_or_else(|| StoreError::not_found("coupon", &coupon.id))?;
        if row.current_uses != coupon.current_uses {
            return Ok(false);
        }
        if row.max_uses.is_some_and(|max| row.current_uses >= max) {
            return Ok(false);
        }
        row.current_uses += 1;
        Ok(true)
    }
}
