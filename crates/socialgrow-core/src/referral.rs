//! Referral records linking a referred user to an affiliate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::affiliate::Affiliate;
use crate::ids::{AffiliateId, ReferralId, SubscriptionId, UserId};

/// Referral lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    /// Signed up, not yet paid.
    Pending,
    /// Converted to a paying subscription.
    Active,
    /// Commission paid out.
    Completed,
    /// Voided.
    Canceled,
}

/// A user referred by an affiliate. At most one per referred user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    /// Row identifier.
    pub id: ReferralId,
    /// Referring affiliate.
    pub affiliate_id: AffiliateId,
    /// Referred user.
    pub referred_user_id: UserId,
    /// Code used at signup.
    #[serde(default)]
    pub referral_code: Option<String>,
    /// Subscription the referral converted into.
    #[serde(default)]
    pub subscription_id: Option<SubscriptionId>,
    /// Status.
    pub status: ReferralStatus,
    /// Commission rate in whole percent, snapshotted at signup.
    pub commission_rate: i64,
    /// Commission credited on conversion, in cents.
    #[serde(default)]
    pub commission_earned: i64,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Referral {
    /// A pending referral under `affiliate` at its current tier's rate.
    #[must_use]
    pub fn pending(affiliate: &Affiliate, referred_user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: ReferralId::generate(),
            affiliate_id: affiliate.id.clone(),
            referred_user_id,
            referral_code: Some(affiliate.referral_code.clone()),
            subscription_id: None,
            status: ReferralStatus::Pending,
            commission_rate: affiliate.commission_tier.rate_percent(),
            commission_earned: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the referral is still waiting for a conversion.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == ReferralStatus::Pending
    }
}
