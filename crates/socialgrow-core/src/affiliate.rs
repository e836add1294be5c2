//! Affiliates, commission tiers, and referral codes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::{AffiliateId, UserId};

/// Maximum number of referral code candidates tried at registration.
pub const REFERRAL_CODE_ATTEMPTS: u32 = 10;

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// ============================================================================
// Commission tiers
// ============================================================================

/// Commission band, determined by an affiliate's monthly referred revenue.
///
/// Ordered from lowest to highest so tiers can be compared.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum CommissionTier {
    /// $0 to $299 referred per month, 15%.
    #[default]
    Bronze,
    /// $300 to $999, 20%.
    Silver,
    /// $1,000 to $4,999, 25%.
    Gold,
    /// $5,000 and up, 30%.
    Platinum,
}

impl CommissionTier {
    /// Commission rate in whole percent.
    #[must_use]
    pub fn rate_percent(self) -> i64 {
        match self {
            Self::Bronze => 15,
            Self::Silver => 20,
            Self::Gold => 25,
            Self::Platinum => 30,
        }
    }

    /// Commission on `amount` cents, rounded half up.
    #[must_use]
    pub fn commission_on(self, amount: i64) -> i64 {
        (amount * self.rate_percent() + 50).div_euclid(100)
    }

    /// Tier whose band contains `monthly_referred_revenue` cents.
    #[must_use]
    pub fn for_revenue(monthly_referred_revenue: i64) -> Self {
        match monthly_referred_revenue {
            r if r < 30_000 => Self::Bronze,
            r if r < 100_000 => Self::Silver,
            r if r < 500_000 => Self::Gold,
            _ => Self::Platinum,
        }
    }

    /// The higher of this tier and the band for `monthly_referred_revenue`.
    #[must_use]
    pub fn promoted_for(self, monthly_referred_revenue: i64) -> Self {
        self.max(Self::for_revenue(monthly_referred_revenue))
    }

    /// Wire name of the tier.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Platinum => "platinum",
        }
    }
}

impl fmt::Display for CommissionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payment method & status
// ============================================================================

/// How an affiliate is paid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// `PayPal`.
    #[default]
    Paypal,
    /// Stripe Connect.
    Stripe,
    /// Bank transfer.
    Bank,
    /// Wise.
    Wise,
}

impl FromStr for PaymentMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paypal" => Ok(Self::Paypal),
            "stripe" => Ok(Self::Stripe),
            "bank" => Ok(Self::Bank),
            "wise" => Ok(Self::Wise),
            other => Err(CoreError::UnknownVariant {
                kind: "payment method",
                value: other.to_string(),
            }),
        }
    }
}

/// Whether an affiliate's code accepts new referrals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AffiliateStatus {
    /// Accepting referrals.
    #[default]
    Active,
    /// Code disabled.
    Inactive,
}

// ============================================================================
// Affiliate
// ============================================================================

/// A user enrolled in the referral program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Affiliate {
    /// Row identifier.
    pub id: AffiliateId,
    /// Owning user.
    pub user_id: UserId,
    /// Unique referral code.
    pub referral_code: String,
    /// Current tier.
    #[serde(default)]
    pub commission_tier: CommissionTier,
    /// Payout method.
    #[serde(default)]
    pub payment_method: PaymentMethod,
    /// Payout details (account handles etc).
    #[serde(default = "empty_object")]
    pub payment_details: serde_json::Value,
    /// Payout email.
    #[serde(default)]
    pub payment_email: Option<String>,
    /// Whether the code accepts referrals.
    #[serde(default)]
    pub status: AffiliateStatus,
    /// Reviewed by an administrator.
    #[serde(default)]
    pub is_approved: bool,
    /// Referrals recorded under this code.
    #[serde(default)]
    pub total_referrals: i64,
    /// Lifetime commission, in cents.
    #[serde(default)]
    pub total_earnings: i64,
    /// Referred revenue counted towards the tier, in cents.
    #[serde(default)]
    pub monthly_referred_revenue: i64,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last modified.
    pub updated_at: DateTime<Utc>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Affiliate {
    /// A freshly registered affiliate at the starting tier.
    #[must_use]
    pub fn new(
        user_id: UserId,
        referral_code: String,
        payment_email: Option<String>,
        payment_method: PaymentMethod,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AffiliateId::generate(),
            user_id,
            referral_code,
            commission_tier: CommissionTier::Bronze,
            payment_method,
            payment_details: empty_object(),
            payment_email,
            status: AffiliateStatus::Active,
            is_approved: false,
            total_referrals: 0,
            total_earnings: 0,
            monthly_referred_revenue: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether new referrals may be recorded under this affiliate.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AffiliateStatus::Active
    }
}

// ============================================================================
// Referral codes
// ============================================================================

/// Generate the base referral code for a user.
///
/// With a first name: its first three letters uppercased plus four random
/// characters (`JOH7K2Q`). Without one: `USER` plus six random characters.
pub fn generate_referral_code<R: Rng>(first_name: Option<&str>, rng: &mut R) -> String {
    let prefix: String = first_name
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphabetic)
        .take(3)
        .collect::<String>()
        .to_ascii_uppercase();

    let (prefix, suffix_len) = if prefix.is_empty() {
        ("USER".to_string(), 6)
    } else {
        (prefix, 4)
    };

    let suffix: String = (0..suffix_len)
        .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
        .collect();
    format!("{prefix}{suffix}")
}

/// Candidate code for a registration attempt: `base`, then `base1`, `base2`, ...
#[must_use]
pub fn referral_code_candidate(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        base.to_string()
    } else {
        format!("{base}{attempt}")
    }
}
