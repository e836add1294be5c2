//! Stripe API types.

use std::collections::HashMap;

use serde::Deserialize;

use socialgrow_core::{BillingCycle, Platform};

/// Stripe customer object.
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    /// Stripe customer ID.
    pub id: String,
    /// Customer email.
    #[serde(default)]
    pub email: Option<String>,
    /// Customer name.
    #[serde(default)]
    pub name: Option<String>,
    /// Metadata attached to the customer.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Stripe Checkout session object.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    /// Session ID.
    pub id: String,
    /// Checkout URL to redirect the user to.
    #[serde(default)]
    pub url: Option<String>,
    /// Customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Total amount in cents.
    #[serde(default)]
    pub amount_total: Option<i64>,
    /// Client reference ID (our `user_id`).
    #[serde(default)]
    pub client_reference_id: Option<String>,
    /// Session status.
    #[serde(default)]
    pub status: Option<String>,
    /// Metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Stripe billing portal session.
#[derive(Debug, Clone, Deserialize)]
pub struct PortalSession {
    /// Session ID.
    pub id: String,
    /// Portal URL.
    pub url: String,
}

/// Stripe coupon object.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeCoupon {
    /// Coupon ID.
    pub id: String,
    /// Percentage discount.
    #[serde(default)]
    pub percent_off: Option<f64>,
    /// How long the discount applies (`once`, `repeating`, `forever`).
    #[serde(default)]
    pub duration: Option<String>,
    /// Whether the coupon can still be redeemed.
    #[serde(default)]
    pub valid: bool,
}

/// Stripe subscription as returned by the subscriptions API.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    /// Subscription ID.
    pub id: String,
    /// Processor status string.
    pub status: String,
    /// Whether the subscription ends at the close of the current period.
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

/// Stripe list response wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    /// Data items.
    pub data: Vec<T>,
    /// Whether there are more items.
    #[serde(default)]
    pub has_more: bool,
}

/// Stripe error response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// Error details.
    pub error: StripeErrorDetail,
}

/// Stripe error details.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
}

// ============================================================================
// Checkout session parameters
// ============================================================================

/// What the customer is charged for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineItemPrice {
    /// A price configured in the Stripe dashboard.
    Price(String),
    /// Inline recurring price.
    Inline {
        /// Product name.
        name: String,
        /// Product description.
        description: Option<String>,
        /// Amount per interval, in cents.
        unit_amount: i64,
        /// Renewal cadence.
        cycle: BillingCycle,
    },
}

/// Parameters for creating a subscription-mode Checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSessionParams {
    /// Line item price.
    pub price: LineItemPrice,
    /// Purchasing user, if known.
    pub user_id: Option<String>,
    /// Plan being bought.
    pub plan_id: String,
    /// Platform being grown.
    pub platform: Platform,
    /// Renewal cadence.
    pub billing_cycle: BillingCycle,
    /// Existing Stripe customer.
    pub customer_id: Option<String>,
    /// Email to prefill when there is no customer.
    pub customer_email: Option<String>,
    /// Stripe coupon to apply.
    pub coupon_id: Option<String>,
    /// Redirect after payment.
    pub success_url: String,
    /// Redirect after backing out.
    pub cancel_url: String,
}

impl CheckoutSessionParams {
    /// Encode as Stripe form parameters.
    #[must_use]
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = vec![
            ("mode".into(), "subscription".into()),
            ("success_url".into(), self.success_url.clone()),
            ("cancel_url".into(), self.cancel_url.clone()),
            ("line_items[0][quantity]".into(), "1".into()),
        ];

        match &self.price {
            LineItemPrice::Price(price_id) => {
                params.push(("line_items[0][price]".into(), price_id.clone()));
            }
            LineItemPrice::Inline {
                name,
                description,
                unit_amount,
                cycle,
            } => {
                let prefix = "line_items[0][price_data]";
                params.push((format!("{prefix}[currency]"), "usd".into()));
                params.push((format!("{prefix}[product_data][name]"), name.clone()));
                if let Some(description) = description {
                    params.push((
                        format!("{prefix}[product_data][description]"),
                        description.clone(),
                    ));
                }
                params.push((format!("{prefix}[unit_amount]"), unit_amount.to_string()));
                params.push((
                    format!("{prefix}[recurring][interval]"),
                    cycle.interval().into(),
                ));
            }
        }

        let user_id = self.user_id.clone().unwrap_or_default();
        let metadata = [
            ("userId", user_id.clone()),
            ("planId", self.plan_id.clone()),
            ("platform", self.platform.as_str().to_string()),
            ("billingCycle", self.billing_cycle.as_str().to_string()),
        ];
        for (key, value) in &metadata {
            params.push((format!("metadata[{key}]"), value.clone()));
            params.push((format!("subscription_data[metadata][{key}]"), value.clone()));
        }

        if !user_id.is_empty() {
            params.push(("client_reference_id".into(), user_id));
        }

        if let Some(customer) = &self.customer_id {
            params.push(("customer".into(), customer.clone()));
        } else if let Some(email) = &self.customer_email {
            params.push(("customer_email".into(), email.clone()));
        }

        if let Some(coupon) = &self.coupon_id {
            params.push(("discounts[0][coupon]".into(), coupon.clone()));
        } else {
            params.push(("allow_promotion_codes".into(), "true".into()));
        }

        params
    }
}

// ============================================================================
// Webhook payloads
// ============================================================================

/// Stripe webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event ID.
    pub id: String,
    /// Event type (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data.
    pub data: WebhookEventData,
    /// Created timestamp (Unix).
    #[serde(default)]
    pub created: i64,
}

/// Webhook event data container.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    /// The event object.
    pub object: serde_json::Value,
}

/// An id field Stripe may send bare or expanded into an object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Expandable {
    /// Bare id.
    Id(String),
    /// Expanded object.
    Object {
        /// Object id.
        id: String,
    },
}

impl Expandable {
    /// The referenced id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Id(id) | Self::Object { id } => id,
        }
    }
}

/// Tax and discount breakdown of a checkout session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TotalDetails {
    /// Tax charged, in cents.
    #[serde(default)]
    pub amount_tax: Option<i64>,
    /// Discount applied, in cents.
    #[serde(default)]
    pub amount_discount: Option<i64>,
}

/// `checkout.session.completed` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    /// Session ID.
    pub id: String,
    /// Created timestamp (Unix).
    #[serde(default)]
    pub created: Option<i64>,
    /// Customer.
    #[serde(default)]
    pub customer: Option<Expandable>,
    /// Subscription created by the session.
    #[serde(default)]
    pub subscription: Option<Expandable>,
    /// Payment intent behind the first charge.
    #[serde(default)]
    pub payment_intent: Option<Expandable>,
    /// Amount charged, in cents.
    #[serde(default)]
    pub amount_total: Option<i64>,
    /// Amount before tax and discount, in cents.
    #[serde(default)]
    pub amount_subtotal: Option<i64>,
    /// Tax and discount breakdown.
    #[serde(default)]
    pub total_details: Option<TotalDetails>,
    /// Billing snapshot.
    #[serde(default)]
    pub customer_details: Option<serde_json::Value>,
    /// Metadata set at session creation.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSessionObject {
    /// Non-empty metadata value.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// Billing period of a subscription item.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItemObject {
    /// Period start (Unix).
    #[serde(default)]
    pub current_period_start: Option<i64>,
    /// Period end (Unix).
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

/// Subscription items list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    /// Items.
    #[serde(default)]
    pub data: Vec<SubscriptionItemObject>,
}

/// `customer.subscription.*` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    /// Subscription ID.
    pub id: String,
    /// Processor status string.
    pub status: String,
    /// Whether the subscription ends at the close of the current period.
    #[serde(default)]
    pub cancel_at_period_end: bool,
    /// Period start (Unix). Newer API versions only carry it on items.
    #[serde(default)]
    pub current_period_start: Option<i64>,
    /// Period end (Unix). Newer API versions only carry it on items.
    #[serde(default)]
    pub current_period_end: Option<i64>,
    /// Subscription items.
    #[serde(default)]
    pub items: SubscriptionItems,
}

impl SubscriptionObject {
    /// Period bounds, from the subscription or its first item.
    #[must_use]
    pub fn period(&self) -> (Option<i64>, Option<i64>) {
        let item = self.items.data.first();
        (
            self.current_period_start
                .or_else(|| item.and_then(|i| i.current_period_start)),
            self.current_period_end
                .or_else(|| item.and_then(|i| i.current_period_end)),
        )
    }
}

/// Subscription link on an invoice parent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceSubscriptionDetails {
    /// Subscription billed.
    #[serde(default)]
    pub subscription: Option<Expandable>,
}

/// What an invoice was generated for.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceParent {
    /// Set when the invoice bills a subscription.
    #[serde(default)]
    pub subscription_details: Option<InvoiceSubscriptionDetails>,
}

/// `invoice.*` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    /// Invoice ID.
    #[serde(default)]
    pub id: Option<String>,
    /// Subscription billed (older API versions).
    #[serde(default)]
    pub subscription: Option<Expandable>,
    /// Invoice parent (newer API versions).
    #[serde(default)]
    pub parent: Option<InvoiceParent>,
}

impl InvoiceObject {
    /// The subscription this invoice bills, if any.
    #[must_use]
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription
            .as_ref()
            .or_else(|| {
                self.parent
                    .as_ref()
                    .and_then(|p| p.subscription_details.as_ref())
                    .and_then(|d| d.subscription.as_ref())
            })
            .map(Expandable::id)
    }
}

/// A webhook event decoded by type.
#[derive(Debug, Clone)]
pub enum StripeEvent {
    /// `checkout.session.completed`
    CheckoutCompleted(Box<CheckoutSessionObject>),
    /// `customer.subscription.updated`
    SubscriptionUpdated(SubscriptionObject),
    /// `customer.subscription.deleted`
    SubscriptionDeleted(SubscriptionObject),
    /// `invoice.paid`
    InvoicePaid(InvoiceObject),
    /// `invoice.payment_failed`
    InvoicePaymentFailed(InvoiceObject),
    /// Any other event type.
    Other(String),
}

impl StripeEvent {
    /// Decode the event object according to the event type.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't match the shape its type implies.
    pub fn parse(event: &WebhookEvent) -> Result<Self, serde_json::Error> {
        let object = event.data.object.clone();
        Ok(match event.event_type.as_str() {
            "checkout.session.completed" => {
                Self::CheckoutCompleted(Box::new(serde_json::from_value(object)?))
            }
            "customer.subscription.updated" => {
                Self::SubscriptionUpdated(serde_json::from_value(object)?)
            }
            "customer.subscription.deleted" => {
                Self::SubscriptionDeleted(serde_json::from_value(object)?)
            }
            "invoice.paid" => Self::InvoicePaid(serde_json::from_value(object)?),
            "invoice.payment_failed" => {
                Self::InvoicePaymentFailed(serde_json::from_value(object)?)
            }
            other => Self::Other(other.to_string()),
        })
    }
}
