//! Subscription plans and the built-in fallback catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::PlanId;
use crate::subscription::BillingCycle;

/// A purchasable plan.
///
/// `yearly_price` is the discounted per-month rate for yearly billing, so a
/// yearly charge is twelve times that value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier.
    pub id: PlanId,
    /// Display name.
    pub name: String,
    /// URL-safe name (`starter`, `pro`, ...).
    pub slug: String,
    /// Marketing blurb.
    #[serde(default)]
    pub description: Option<String>,
    /// Price per month on monthly billing, in cents.
    pub monthly_price: i64,
    /// Price per month on yearly billing, in cents.
    pub yearly_price: i64,
    /// Followers delivered per month.
    pub followers_per_month: i64,
    /// Extra followers granted on yearly billing.
    #[serde(default)]
    pub yearly_bonus_followers: i64,
    /// Feature bullet points.
    #[serde(default)]
    pub features: Vec<String>,
    /// Highlighted on the pricing page.
    #[serde(default)]
    pub is_popular: bool,
    /// Offered for purchase.
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Payment processor price for monthly billing, if one is configured.
    #[serde(default)]
    pub stripe_monthly_price_id: Option<String>,
    /// Payment processor price for yearly billing, if one is configured.
    #[serde(default)]
    pub stripe_yearly_price_id: Option<String>,
    /// Creation time (absent on fallback plans).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time (absent on fallback plans).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl Plan {
    /// Per-month price for the given cycle.
    #[must_use]
    pub fn monthly_rate(&self, cycle: BillingCycle) -> i64 {
        match cycle {
            BillingCycle::Monthly => self.monthly_price,
            BillingCycle::Yearly => self.yearly_price,
        }
    }

    /// Amount charged per billing interval.
    #[must_use]
    pub fn charge_for(&self, cycle: BillingCycle) -> i64 {
        self.monthly_rate(cycle) * i64::from(cycle.months())
    }

    /// Configured processor price id for the cycle.
    #[must_use]
    pub fn price_id_for(&self, cycle: BillingCycle) -> Option<&str> {
        match cycle {
            BillingCycle::Monthly => self.stripe_monthly_price_id.as_deref(),
            BillingCycle::Yearly => self.stripe_yearly_price_id.as_deref(),
        }
        .filter(|id| !id.is_empty())
    }
}

// ============================================================================
// Fallback catalog
// ============================================================================

struct FallbackRow {
    id: &'static str,
    name: &'static str,
    slug: &'static str,
    description: &'static str,
    monthly_price: i64,
    yearly_price: i64,
    followers_per_month: i64,
    yearly_bonus_followers: i64,
    features: &'static [&'static str],
    is_popular: bool,
}

const FALLBACK_ROWS: [FallbackRow; 3] = [
    FallbackRow {
        id: "starter-plan",
        name: "Starter",
        slug: "starter",
        description: "Perfect for getting started with social media growth",
        monthly_price: 5900,
        yearly_price: 3540,
        followers_per_month: 1000,
        yearly_bonus_followers: 2000,
        features: &[
            "1 social media account",
            "Basic growth analytics",
            "Email support",
            "Monthly growth reports",
        ],
        is_popular: false,
    },
    FallbackRow {
        id: "pro-plan",
        name: "Pro",
        slug: "pro",
        description: "Most popular plan for serious growth",
        monthly_price: 11900,
        yearly_price: 7140,
        followers_per_month: 3000,
        yearly_bonus_followers: 6000,
        features: &[
            "3 social media accounts",
            "Advanced analytics",
            "Priority support",
            "Weekly reports",
            "Custom hashtags",
        ],
        is_popular: true,
    },
    FallbackRow {
        id: "enterprise-plan",
        name: "Enterprise",
        slug: "enterprise",
        description: "For businesses that need maximum growth",
        monthly_price: 29900,
        yearly_price: 17940,
        followers_per_month: 10000,
        yearly_bonus_followers: 20000,
        features: &[
            "Unlimited accounts",
            "Custom analytics",
            "24/7 support",
            "Daily reports",
            "Dedicated manager",
            "Custom strategies",
        ],
        is_popular: false,
    },
];

impl FallbackRow {
    fn to_plan(&self) -> Plan {
        Plan {
            id: PlanId::from_static(self.id),
            name: self.name.to_string(),
            slug: self.slug.to_string(),
            description: Some(self.description.to_string()),
            monthly_price: self.monthly_price,
            yearly_price: self.yearly_price,
            followers_per_month: self.followers_per_month,
            yearly_bonus_followers: self.yearly_bonus_followers,
            features: self.features.iter().map(|f| (*f).to_string()).collect(),
            is_popular: self.is_popular,
            is_active: true,
            stripe_monthly_price_id: None,
            stripe_yearly_price_id: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// The built-in plan table, ordered by ascending monthly price.
#[must_use]
pub fn fallback_plans() -> Vec<Plan> {
    FALLBACK_ROWS.iter().map(FallbackRow::to_plan).collect()
}

/// Look up a built-in plan by id.
#[must_use]
pub fn fallback_plan(id: &PlanId) -> Option<Plan> {
    FALLBACK_ROWS
        .iter()
        .find(|row| row.id == id.as_str())
        .map(FallbackRow::to_plan)
}

/// Look up a built-in plan by slug.
#[must_use]
pub fn fallback_plan_by_slug(slug: &str) -> Option<Plan> {
    FALLBACK_ROWS
        .iter()
        .find(|row| row.slug.eq_ignore_ascii_case(slug.trim()))
        .map(FallbackRow::to_plan)
}
