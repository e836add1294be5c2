//! Orders recorded at checkout and completed by the payment webhook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CouponId, OrderId, PlanId, UserId};

/// Order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Checkout started, payment not yet confirmed.
    Pending,
    /// Payment in flight.
    Processing,
    /// Paid.
    Completed,
    /// Payment failed.
    Failed,
    /// Refunded after completion.
    Refunded,
}

/// Monetary breakdown of an order, in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    /// Amount before discount and tax.
    pub subtotal: i64,
    /// Tax charged.
    pub tax: i64,
    /// Discount applied.
    pub discount: i64,
}

impl OrderTotals {
    /// Totals for an undiscounted, untaxed amount.
    #[must_use]
    pub fn flat(amount: i64) -> Self {
        Self {
            subtotal: amount,
            tax: 0,
            discount: 0,
        }
    }

    /// `subtotal - discount + tax`.
    #[must_use]
    pub fn total(&self) -> i64 {
        self.subtotal - self.discount + self.tax
    }
}

/// A purchase record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Row identifier.
    pub id: OrderId,
    /// Purchaser.
    pub user_id: UserId,
    /// Amount charged.
    pub total_amount: i64,
    /// Amount before discount and tax.
    pub subtotal: i64,
    /// Tax charged.
    #[serde(default)]
    pub tax_amount: i64,
    /// Discount applied.
    #[serde(default)]
    pub discount_amount: i64,
    /// Coupon redeemed, if any.
    #[serde(default)]
    pub coupon_id: Option<CouponId>,
    /// Plan purchased.
    #[serde(default)]
    pub plan_id: Option<PlanId>,
    /// Status.
    pub status: OrderStatus,
    /// Checkout session that produced this order.
    #[serde(default)]
    pub stripe_session_id: Option<String>,
    /// Payment intent behind the charge.
    #[serde(default)]
    pub stripe_payment_intent_id: Option<String>,
    /// Billing snapshot captured at payment.
    #[serde(default)]
    pub billing_details: Option<serde_json::Value>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// A new order with the given status and totals.
    #[must_use]
    pub fn new(user_id: UserId, status: OrderStatus, totals: OrderTotals) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::generate(),
            user_id,
            total_amount: totals.total(),
            subtotal: totals.subtotal,
            tax_amount: totals.tax,
            discount_amount: totals.discount,
            coupon_id: None,
            plan_id: None,
            status,
            stripe_session_id: None,
            stripe_payment_intent_id: None,
            billing_details: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A pending order for a checkout session.
    #[must_use]
    pub fn pending(user_id: UserId, totals: OrderTotals, session_id: impl Into<String>) -> Self {
        let mut order = Self::new(user_id, OrderStatus::Pending, totals);
        order.stripe_session_id = Some(session_id.into());
        order
    }

    /// Mark the order paid, replacing its totals with the charged amounts.
    pub fn complete(
        &mut self,
        totals: OrderTotals,
        payment_intent: Option<String>,
        billing_details: Option<serde_json::Value>,
    ) {
        self.status = OrderStatus::Completed;
        self.total_amount = totals.total();
        self.subtotal = totals.subtotal;
        self.tax_amount = totals.tax;
        self.discount_amount = totals.discount;
        if payment_intent.is_some() {
            self.stripe_payment_intent_id = payment_intent;
        }
        if billing_details.is_some() {
            self.billing_details = billing_details;
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_subtotal_minus_discount_plus_tax() {
        let totals = OrderTotals {
            subtotal: 11900,
            tax: 952,
            discount: 2380,
        };
        assert_eq!(totals.total(), 10472);
        assert_eq!(OrderTotals::flat(5900).total(), 5900);
    }

    #[test]
    fn completing_a_pending_order_keeps_its_identity() {
        let mut order = Order::pending("u1".parse().unwrap(), OrderTotals::flat(5900), "cs_test_1");
        let id = order.id.clone();
        order.complete(
            OrderTotals {
                subtotal: 5900,
                tax: 0,
                discount: 590,
            },
            Some("pi_1".into()),
            None,
        );
        assert_eq!(order.id, id);
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.total_amount, 5310);
        assert_eq!(order.stripe_session_id.as_deref(), Some("cs_test_1"));
        assert_eq!(order.stripe_payment_intent_id.as_deref(), Some("pi_1"));
    }
}
