//! Core types and rules for SocialGrow.
//!
//! This crate provides the domain model shared by the storage layer and the
//! HTTP service:
//!
//! - **Identifiers**: `UserId`, `PlanId`, `SubscriptionId`, `OrderId`, ...
//! - **Catalog**: `Plan` and the built-in fallback plan table
//! - **Subscriptions**: `Subscription`, `Platform`, `BillingCycle`, `SubscriptionStatus`
//! - **Orders**: `Order`, `OrderStatus`, `OrderTotals`
//! - **Affiliates**: `Affiliate`, `CommissionTier`, `Referral`, referral codes
//! - **Coupons**: `Coupon` and its redemption rules
//!
//! # Money
//!
//! All amounts are `i64` minor currency units (US cents). $59.00 is `5900`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod affiliate;
pub mod coupon;
pub mod error;
pub mod ids;
pub mod order;
pub mod plan;
pub mod profile;
pub mod referral;
pub mod subscription;

pub use affiliate::{
    generate_referral_code, referral_code_candidate, Affiliate, AffiliateStatus, CommissionTier,
    PaymentMethod, REFERRAL_CODE_ATTEMPTS,
};
pub use coupon::{normalize_code, Coupon, CouponRejection};
pub use error::{CoreError, Result};
pub use ids::{AffiliateId, CouponId, IdError, OrderId, PlanId, ReferralId, SubscriptionId, UserId};
pub use order::{Order, OrderStatus, OrderTotals};
pub use plan::{fallback_plan, fallback_plan_by_slug, fallback_plans, Plan};
pub use profile::{Profile, ProfileRole};
pub use referral::{Referral, ReferralStatus};
pub use subscription::{BillingCycle, Platform, Subscription, SubscriptionPatch, SubscriptionStatus};
