//! Storage layer for SocialGrow.
//!
//! This crate defines the [`Store`] repository interface over the hosted
//! database tables (`profiles`, `plans`, `orders`, `subscriptions`,
//! `affiliates`, `referrals`, `coupons`) and provides:
//!
//! - [`SupabaseStore`]: the production backend, speaking `PostgREST` over HTTP
//! - [`MemoryStore`]: an in-process backend for local development and tests
//! - [`FallbackCatalog`]: a circuit-breaking decorator that answers plan reads
//!   from the built-in plan table when storage is unhealthy
//!
//! # Constraints
//!
//! Uniqueness (one affiliate per user, unique referral codes, one referral per
//! referred user) is enforced by the backend and reported as
//! [`StoreError::Conflict`]. Counters are updated with conditional writes so
//! that concurrent callers never lose an increment.
//!
//! # Example
//!
//! ```no_run
//! use socialgrow_store::{MemoryStore, Store};
//! use socialgrow_core::{fallback_plans, Profile};
//!
//! # async fn demo() -> socialgrow_store::Result<()> {
//! let store = MemoryStore::with_plans(fallback_plans());
//! store.put_profile(Profile::new("u1".parse().unwrap(), "u1@example.com")).await;
//!
//! let plans = store.list_active_plans().await?;
//! assert_eq!(plans.len(), 3);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod error;
pub mod memory;
pub mod supabase;

pub use catalog::{CatalogListing, CatalogSource, CircuitBreaker, FallbackCatalog};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

use async_trait::async_trait;
use socialgrow_core::{
    Affiliate, AffiliateId, Coupon, Order, PaymentMethod, Plan, PlanId, Profile, Referral,
    ReferralId, Subscription, SubscriptionId, SubscriptionPatch, UserId,
};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., Supabase, in-memory for testing).
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Profile Operations
    // =========================================================================

    /// Get a profile by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_profile(&self, user_id: &UserId) -> Result<Option<Profile>>;

    /// Record the payment processor customer for a user.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the profile doesn't exist.
    async fn set_stripe_customer_id(&self, user_id: &UserId, customer_id: &str) -> Result<()>;

    // =========================================================================
    // Plan Operations
    // =========================================================================

    /// List active plans ordered by ascending monthly price.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_active_plans(&self) -> Result<Vec<Plan>>;

    /// Get a plan by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_plan(&self, plan_id: &PlanId) -> Result<Option<Plan>>;

    /// Get an active plan by slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_plan_by_slug(&self, slug: &str) -> Result<Option<Plan>>;

    // =========================================================================
    // Order Operations
    // =========================================================================

    /// Insert an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// Replace an existing order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the order doesn't exist.
    async fn update_order(&self, order: &Order) -> Result<()>;

    /// Get the most recent order recorded for a checkout session.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_order_by_session(&self, session_id: &str) -> Result<Option<Order>>;

    /// List orders for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_orders_by_user(&self, user_id: &UserId) -> Result<Vec<Order>>;

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Insert a subscription, or update the row with the same processor
    /// subscription id. The existing row keeps its id and creation time.
    ///
    /// Returns the stored row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn upsert_subscription(&self, subscription: &Subscription) -> Result<Subscription>;

    /// Apply a patch to the row with the given processor subscription id.
    ///
    /// Returns `None` when no row matches.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn update_subscription_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
        patch: &SubscriptionPatch,
    ) -> Result<Option<Subscription>>;

    /// Get a subscription by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>>;

    /// List subscriptions for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_subscriptions_by_user(&self, user_id: &UserId) -> Result<Vec<Subscription>>;

    /// Get the user's most recent active subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_active_subscription(&self, user_id: &UserId) -> Result<Option<Subscription>>;

    // =========================================================================
    // Affiliate Operations
    // =========================================================================

    /// Get an affiliate by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_affiliate(&self, id: &AffiliateId) -> Result<Option<Affiliate>>;

    /// Get the affiliate owned by a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_affiliate_by_user(&self, user_id: &UserId) -> Result<Option<Affiliate>>;

    /// Get an affiliate by referral code (exact match).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_affiliate_by_code(&self, code: &str) -> Result<Option<Affiliate>>;

    /// Insert an affiliate.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` with field `user_id` or `referral_code`
    /// when either is already taken.
    async fn insert_affiliate(&self, affiliate: &Affiliate) -> Result<()>;

    /// Change an affiliate's payout settings. `None` leaves a field unchanged.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the affiliate doesn't exist.
    async fn update_affiliate_payment(
        &self,
        id: &AffiliateId,
        payment_email: Option<&str>,
        payment_method: Option<PaymentMethod>,
    ) -> Result<Affiliate>;

    /// Atomically add one to an affiliate's referral counter.
    ///
    /// Returns the new count.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the affiliate doesn't exist.
    async fn increment_affiliate_referrals(&self, id: &AffiliateId) -> Result<i64>;

    /// Atomically add a commission and its referred revenue to an affiliate,
    /// promoting the tier to match the new monthly referred revenue.
    ///
    /// Returns the updated affiliate.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the affiliate doesn't exist.
    async fn credit_affiliate(
        &self,
        id: &AffiliateId,
        commission: i64,
        referred_revenue: i64,
    ) -> Result<Affiliate>;

    // =========================================================================
    // Referral Operations
    // =========================================================================

    /// Insert a referral.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` with field `referred_user_id` when the
    /// user already has a referral.
    async fn insert_referral(&self, referral: &Referral) -> Result<()>;

    /// Get the referral in which a user is the referred party.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_referral_for_user(&self, user_id: &UserId) -> Result<Option<Referral>>;

    /// Move a referral from pending to active, recording the conversion.
    ///
    /// Returns `false` when the referral was no longer pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn activate_referral(
        &self,
        id: &ReferralId,
        subscription_id: Option<&SubscriptionId>,
        commission_earned: i64,
    ) -> Result<bool>;

    /// List referrals under an affiliate, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_referrals_by_affiliate(&self, id: &AffiliateId) -> Result<Vec<Referral>>;

    // =========================================================================
    // Coupon Operations
    // =========================================================================

    /// Get a coupon by its normalized code, active or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>>;

    /// Increment `current_uses` if it still equals the value on `coupon` and
    /// is below the cap.
    ///
    /// Returns `false` when another redemption got there first or the cap
    /// has been reached.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn increment_coupon_uses(&self, coupon: &Coupon) -> Result<bool>;
}
