//! Subscription records and their lifecycle enums.
//!
//! Subscription state is mirrored one-way from the payment processor: the
//! processor's status strings are mapped onto [`SubscriptionStatus`] and
//! written to storage, never the other way round.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::{PlanId, SubscriptionId, UserId};

// ============================================================================
// Enums
// ============================================================================

/// Social platform a subscription grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Instagram.
    #[default]
    Instagram,
    /// `TikTok`.
    Tiktok,
    /// `YouTube`.
    Youtube,
    /// Twitter / X.
    Twitter,
}

impl Platform {
    /// Wire name of the platform.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Instagram => "instagram",
            Self::Tiktok => "tiktok",
            Self::Youtube => "youtube",
            Self::Twitter => "twitter",
        }
    }
}

impl FromStr for Platform {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instagram" => Ok(Self::Instagram),
            "tiktok" => Ok(Self::Tiktok),
            "youtube" => Ok(Self::Youtube),
            "twitter" => Ok(Self::Twitter),
            other => Err(CoreError::UnknownVariant {
                kind: "platform",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How often a subscription renews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    /// Renews every calendar month.
    #[default]
    Monthly,
    /// Renews every twelve calendar months.
    Yearly,
}

impl BillingCycle {
    /// Wire name of the cycle.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// Recurring interval name understood by the payment processor.
    #[must_use]
    pub fn interval(self) -> &'static str {
        match self {
            Self::Monthly => "month",
            Self::Yearly => "year",
        }
    }

    /// Number of calendar months in one period.
    #[must_use]
    pub fn months(self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Yearly => 12,
        }
    }

    /// End of the billing period that starts at `start`.
    ///
    /// Adds calendar months, clamping to the last day of the target month
    /// (Jan 31 + 1 month is Feb 28/29).
    ///
    /// # Errors
    ///
    /// Returns `CoreError::PeriodOutOfRange` if the result is not representable.
    pub fn period_end(self, start: DateTime<Utc>) -> Result<DateTime<Utc>, CoreError> {
        start
            .checked_add_months(Months::new(self.months()))
            .ok_or(CoreError::PeriodOutOfRange)
    }
}

impl FromStr for BillingCycle {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            other => Err(CoreError::UnknownVariant {
                kind: "billing cycle",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription status as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and in good standing.
    Active,
    /// Ended.
    Canceled,
    /// A renewal payment failed.
    PastDue,
    /// In a trial period.
    Trialing,
    /// Collection paused.
    Paused,
}

impl SubscriptionStatus {
    /// Map a payment processor subscription status onto the stored enum.
    ///
    /// Returns `None` for statuses with no counterpart.
    #[must_use]
    pub fn from_processor(status: &str) -> Option<Self> {
        match status {
            "active" => Some(Self::Active),
            "canceled" | "incomplete_expired" => Some(Self::Canceled),
            "past_due" | "unpaid" | "incomplete" => Some(Self::PastDue),
            "trialing" => Some(Self::Trialing),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }

    /// Wire name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::PastDue => "past_due",
            Self::Trialing => "trialing",
            Self::Paused => "paused",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// A customer's subscription to a plan on one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Row identifier.
    pub id: SubscriptionId,
    /// Subscriber.
    pub user_id: UserId,
    /// Subscribed plan.
    pub plan_id: PlanId,
    /// Platform being grown.
    pub platform: Platform,
    /// Renewal cadence.
    pub billing_cycle: BillingCycle,
    /// Payment processor subscription id.
    #[serde(default)]
    pub stripe_subscription_id: Option<String>,
    /// Payment processor customer id.
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    /// Current status.
    pub status: SubscriptionStatus,
    /// Start of the current period.
    #[serde(default)]
    pub current_period_start: Option<DateTime<Utc>>,
    /// End of the current period.
    #[serde(default)]
    pub current_period_end: Option<DateTime<Utc>>,
    /// Whether the subscription ends at the close of the current period.
    #[serde(default)]
    pub cancel_at_period_end: bool,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Create an active subscription starting at `period_start`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::PeriodOutOfRange` if the period end overflows.
    pub fn activate(
        user_id: UserId,
        plan_id: PlanId,
        platform: Platform,
        billing_cycle: BillingCycle,
        period_start: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        let now = Utc::now();
        Ok(Self {
            id: SubscriptionId::generate(),
            user_id,
            plan_id,
            platform,
            billing_cycle,
            stripe_subscription_id: None,
            stripe_customer_id: None,
            status: SubscriptionStatus::Active,
            current_period_start: Some(period_start),
            current_period_end: Some(billing_cycle.period_end(period_start)?),
            cancel_at_period_end: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, patch: &SubscriptionPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(start) = patch.current_period_start {
            self.current_period_start = Some(start);
        }
        if let Some(end) = patch.current_period_end {
            self.current_period_end = Some(end);
        }
        if let Some(flag) = patch.cancel_at_period_end {
            self.cancel_at_period_end = flag;
        }
        self.updated_at = Utc::now();
    }

    /// Whether the subscription currently grants service.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        )
    }
}

/// Partial update to a subscription. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionPatch {
    /// New status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,
    /// New period start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_start: Option<DateTime<Utc>>,
    /// New period end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime<Utc>>,
    /// New cancel-at-period-end flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_at_period_end: Option<bool>,
}

impl SubscriptionPatch {
    /// Patch that only sets the status.
    #[must_use]
    pub fn status(status: SubscriptionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Patch that only sets the cancel-at-period-end flag.
    #[must_use]
    pub fn cancel_at_period_end(flag: bool) -> Self {
        Self {
            cancel_at_period_end: Some(flag),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn yearly_period_is_one_calendar_year() {
        let start = at(2024, 3, 15);
        assert_eq!(BillingCycle::Yearly.period_end(start).unwrap(), at(2025, 3, 15));
    }

    #[test]
    fn monthly_period_clamps_to_month_end() {
        let start = at(2024, 1, 31);
        assert_eq!(BillingCycle::Monthly.period_end(start).unwrap(), at(2024, 2, 29));
    }

    #[test]
    fn processor_statuses_map_onto_five_states() {
        assert_eq!(SubscriptionStatus::from_processor("unpaid"), Some(SubscriptionStatus::PastDue));
        assert_eq!(
            SubscriptionStatus::from_processor("incomplete"),
            Some(SubscriptionStatus::PastDue)
        );
        assert_eq!(
            SubscriptionStatus::from_processor("incomplete_expired"),
            Some(SubscriptionStatus::Canceled)
        );
        assert_eq!(
            SubscriptionStatus::from_processor("trialing"),
            Some(SubscriptionStatus::Trialing)
        );
        assert_eq!(SubscriptionStatus::from_processor("bogus"), None);
    }

    #[test]
    fn enums_parse_case_insensitively() {
        assert_eq!("TikTok".parse::<Platform>().unwrap(), Platform::Tiktok);
        assert_eq!(" yearly ".parse::<BillingCycle>().unwrap(), BillingCycle::Yearly);
        assert!("weekly".parse::<BillingCycle>().is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SubscriptionStatus::PastDue).unwrap(),
            "\"past_due\""
        );
    }

    #[test]
    fn patch_only_touches_set_fields() {
        let mut sub = Subscription::activate(
            "u1".parse().unwrap(),
            "p1".parse().unwrap(),
            Platform::Instagram,
            BillingCycle::Monthly,
            at(2024, 5, 1),
        )
        .unwrap();
        sub.apply(&SubscriptionPatch::cancel_at_period_end(true));
        assert!(sub.cancel_at_period_end);
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.current_period_end, Some(at(2024, 6, 1)));

        let patch = SubscriptionPatch::status(SubscriptionStatus::Canceled);
        let body = serde_json::to_value(patch).unwrap();
        assert_eq!(body, serde_json::json!({"status": "canceled"}));
    }
}
