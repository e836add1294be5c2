//! Percentage-discount coupons and their redemption rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::CouponId;

/// Why a coupon cannot be redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CouponRejection {
    /// Unknown or disabled code.
    #[error("Invalid or expired coupon code")]
    Inactive,
    /// `current_uses` has reached `max_uses`.
    #[error("Coupon has reached maximum uses")]
    Exhausted,
    /// Past `expires_at`.
    #[error("Coupon has expired")]
    Expired,
}

/// A discount code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    /// Row identifier.
    pub id: CouponId,
    /// Code customers type in (stored uppercase).
    pub code: String,
    /// Discount in whole percent.
    pub discount_percentage: i64,
    /// Shown alongside the discount.
    #[serde(default)]
    pub description: Option<String>,
    /// Redemption cap; `None` is unlimited.
    #[serde(default)]
    pub max_uses: Option<i64>,
    /// Redemptions so far.
    #[serde(default)]
    pub current_uses: i64,
    /// Expiry; `None` never expires.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Whether the code is enabled.
    #[serde(default)]
    pub is_active: bool,
    /// When the row was created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// A new active coupon with no cap or expiry.
    #[must_use]
    pub fn new(code: &str, discount_percentage: i64) -> Self {
        Self {
            id: CouponId::generate(),
            code: normalize_code(code),
            discount_percentage,
            description: None,
            max_uses: None,
            current_uses: 0,
            expires_at: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Check whether the coupon can be redeemed at `now`.
    ///
    /// # Errors
    ///
    /// Returns the first rule the coupon violates: inactive, exhausted, expired.
    pub fn check_redeemable(&self, now: DateTime<Utc>) -> Result<(), CouponRejection> {
        if !self.is_active {
            return Err(CouponRejection::Inactive);
        }
        if self.remaining_uses() == Some(0) {
            return Err(CouponRejection::Exhausted);
        }
        if self.expires_at.is_some_and(|at| at < now) {
            return Err(CouponRejection::Expired);
        }
        Ok(())
    }

    /// Redemptions left before the cap; `None` when uncapped.
    #[must_use]
    pub fn remaining_uses(&self) -> Option<i64> {
        self.max_uses.map(|max| (max - self.current_uses).max(0))
    }

    /// Stored percentage limited to 0..=100.
    #[must_use]
    pub fn percent_off(&self) -> i64 {
        self.discount_percentage.clamp(0, 100)
    }

    /// Discount on `amount` cents, rounded half up.
    #[must_use]
    pub fn discount_on(&self, amount: i64) -> i64 {
        (amount * self.percent_off() + 50).div_euclid(100)
    }
}

/// Canonical form of a customer-entered code.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
