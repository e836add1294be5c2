//! Stripe webhook consumer.
//!
//! Applies verified events to storage. Every step is best-effort: a failed
//! write is logged and the remaining steps still run, and the delivery is
//! acknowledged either way.

use chrono::{DateTime, Utc};

use socialgrow_core::{
    BillingCycle, Order, OrderStatus, OrderTotals, PlanId, Platform, Subscription, SubscriptionId,
    SubscriptionPatch, SubscriptionStatus, UserId,
};

use crate::ledger;
use crate::state::AppState;
use crate::stripe::{CheckoutSessionObject, StripeEvent, SubscriptionObject, WebhookEvent};

/// What processing an event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// State was written.
    Applied,
    /// The event was understood but nothing could be applied.
    Skipped(&'static str),
    /// Event type we don't consume.
    Unhandled,
}

/// Apply a verified event.
pub async fn handle_event(state: &AppState, event: &WebhookEvent) -> EventOutcome {
    let parsed = match StripeEvent::parse(event) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %e,
                "Malformed webhook object"
            );
            return EventOutcome::Skipped("malformed event object");
        }
    };

    match parsed {
        StripeEvent::CheckoutCompleted(session) => {
            checkout_completed(state, &session, event.created).await
        }
        StripeEvent::SubscriptionUpdated(subscription) => {
            let patch = subscription_patch(&subscription);
            mirror(state, &subscription.id, &patch).await
        }
        StripeEvent::SubscriptionDeleted(subscription) => {
            let patch = SubscriptionPatch::status(SubscriptionStatus::Canceled);
            mirror(state, &subscription.id, &patch).await
        }
        StripeEvent::InvoicePaid(invoice) => match invoice.subscription_id() {
            Some(id) => {
                mirror(state, id, &SubscriptionPatch::status(SubscriptionStatus::Active)).await
            }
            None => EventOutcome::Skipped("invoice has no subscription"),
        },
        StripeEvent::InvoicePaymentFailed(invoice) => match invoice.subscription_id() {
            Some(id) => {
                mirror(state, id, &SubscriptionPatch::status(SubscriptionStatus::PastDue)).await
            }
            None => EventOutcome::Skipped("invoice has no subscription"),
        },
        StripeEvent::Other(event_type) => {
            tracing::debug!(event_type = %event_type, "Unhandled Stripe event");
            EventOutcome::Unhandled
        }
    }
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Metadata written at checkout, parsed.
struct CheckoutMetadata {
    user_id: UserId,
    plan_id: PlanId,
    platform: Platform,
    billing_cycle: BillingCycle,
}

fn checkout_metadata(session: &CheckoutSessionObject) -> Option<CheckoutMetadata> {
    Some(CheckoutMetadata {
        user_id: session.metadata_value("userId")?.parse().ok()?,
        plan_id: session.metadata_value("planId")?.parse().ok()?,
        platform: session.metadata_value("platform")?.parse().ok()?,
        billing_cycle: session.metadata_value("billingCycle")?.parse().ok()?,
    })
}

/// Totals of a paid session. A missing subtotal is derived from the total so
/// that `total = subtotal - discount + tax` still holds.
fn session_totals(session: &CheckoutSessionObject) -> OrderTotals {
    let details = session.total_details.clone().unwrap_or_default();
    let tax = details.amount_tax.unwrap_or(0);
    let discount = details.amount_discount.unwrap_or(0);
    let total = session.amount_total.unwrap_or(0);
    OrderTotals {
        subtotal: session.amount_subtotal.unwrap_or(total - tax + discount),
        tax,
        discount,
    }
}

async fn checkout_completed(
    state: &AppState,
    session: &CheckoutSessionObject,
    event_created: i64,
) -> EventOutcome {
    let Some(meta) = checkout_metadata(session) else {
        tracing::warn!(
            session_id = %session.id,
            metadata = ?session.metadata,
            "Checkout session is missing required metadata"
        );
        return EventOutcome::Skipped("missing checkout metadata");
    };

    let Some(period_start) = timestamp(session.created.unwrap_or(event_created)) else {
        return EventOutcome::Skipped("invalid session timestamp");
    };

    let subscription_id = record_subscription(state, session, &meta, period_start).await;
    record_order(state, session, &meta).await;

    let amount_total = session.amount_total.unwrap_or(0);
    if let Err(e) =
        ledger::convert_referral(state, &meta.user_id, subscription_id.as_ref(), amount_total).await
    {
        tracing::error!(
            user_id = %meta.user_id,
            session_id = %session.id,
            error = %e,
            "Referral conversion failed"
        );
    }

    tracing::info!(
        session_id = %session.id,
        user_id = %meta.user_id,
        plan_id = %meta.plan_id,
        billing_cycle = %meta.billing_cycle,
        "Checkout completed"
    );
    EventOutcome::Applied
}

async fn record_subscription(
    state: &AppState,
    session: &CheckoutSessionObject,
    meta: &CheckoutMetadata,
    period_start: DateTime<Utc>,
) -> Option<SubscriptionId> {
    let mut subscription = match Subscription::activate(
        meta.user_id.clone(),
        meta.plan_id.clone(),
        meta.platform,
        meta.billing_cycle,
        period_start,
    ) {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::error!(
                session_id = %session.id,
                error = %e,
                "Cannot compute subscription period"
            );
            return None;
        }
    };
    subscription.stripe_subscription_id = session.subscription.as_ref().map(|s| s.id().to_string());
    subscription.stripe_customer_id = session.customer.as_ref().map(|c| c.id().to_string());

    match state.store.upsert_subscription(&subscription).await {
        Ok(row) => Some(row.id),
        Err(e) => {
            tracing::error!(
                user_id = %meta.user_id,
                session_id = %session.id,
                error = %e,
                "Subscription upsert failed"
            );
            None
        }
    }
}

async fn record_order(state: &AppState, session: &CheckoutSessionObject, meta: &CheckoutMetadata) {
    let totals = session_totals(session);
    let payment_intent = session.payment_intent.as_ref().map(|p| p.id().to_string());

    let result = match state.store.get_order_by_session(&session.id).await {
        Ok(Some(mut order)) => {
            order.complete(totals, payment_intent, session.customer_details.clone());
            state.store.update_order(&order).await
        }
        Ok(None) => {
            let mut order = Order::new(meta.user_id.clone(), OrderStatus::Completed, totals);
            order.plan_id = Some(meta.plan_id.clone());
            order.stripe_session_id = Some(session.id.clone());
            order.stripe_payment_intent_id = payment_intent;
            order.billing_details = session.customer_details.clone();
            state.store.insert_order(&order).await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        tracing::error!(session_id = %session.id, error = %e, "Completed order write failed");
    }
}

fn subscription_patch(subscription: &SubscriptionObject) -> SubscriptionPatch {
    let status = SubscriptionStatus::from_processor(&subscription.status);
    if status.is_none() {
        tracing::warn!(
            stripe_subscription_id = %subscription.id,
            status = %subscription.status,
            "Unmapped subscription status"
        );
    }
    let (start, end) = subscription.period();
    SubscriptionPatch {
        status,
        current_period_start: start.and_then(timestamp),
        current_period_end: end.and_then(timestamp),
        cancel_at_period_end: Some(subscription.cancel_at_period_end),
    }
}

async fn mirror(
    state: &AppState,
    stripe_subscription_id: &str,
    patch: &SubscriptionPatch,
) -> EventOutcome {
    match state
        .store
        .update_subscription_by_stripe_id(stripe_subscription_id, patch)
        .await
    {
        Ok(Some(row)) => {
            tracing::info!(
                subscription_id = %row.id,
                stripe_subscription_id = %stripe_subscription_id,
                status = %row.status,
                "Subscription updated"
            );
            EventOutcome::Applied
        }
        Ok(None) => {
            tracing::info!(
                stripe_subscription_id = %stripe_subscription_id,
                "No subscription matches webhook"
            );
            EventOutcome::Skipped("no matching subscription")
        }
        Err(e) => {
            tracing::error!(
                stripe_subscription_id = %stripe_subscription_id,
                error = %e,
                "Subscription update failed"
            );
            EventOutcome::Skipped("subscription update failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;
    use socialgrow_store::{MemoryStore, Store};

    use crate::config::ServiceConfig;

    fn event(event_type: &str, object: serde_json::Value) -> WebhookEvent {
        serde_json::from_value(json!({
            "id": "evt_test",
            "type": event_type,
            "created": 1_700_000_100,
            "data": {"object": object}
        }))
        .unwrap()
    }

    fn completed_session(cycle: &str) -> serde_json::Value {
        json!({
            "id": "cs_test_1",
            "created": 1_700_000_000,
            "customer": "cus_1",
            "subscription": "sub_1",
            "payment_intent": null,
            "amount_total": 5900,
            "amount_subtotal": 5900,
            "total_details": {"amount_tax": 0, "amount_discount": 0},
            "metadata": {
                "userId": "u1",
                "planId": "starter-plan",
                "platform": "instagram",
                "billingCycle": cycle
            }
        })
    }

    async fn deliver(
        state: &AppState,
        event_type: &str,
        object: serde_json::Value,
    ) -> EventOutcome {
        handle_event(state, &event(event_type, object)).await
    }

    fn setup() -> (Arc<MemoryStore>, AppState) {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), ServiceConfig::default());
        (store, state)
    }

    #[tokio::test]
    async fn checkout_creates_subscription_and_order() {
        let (store, state) = setup();
        let session = completed_session("monthly");
        let outcome = deliver(&state, "checkout.session.completed", session).await;
        assert_eq!(outcome, EventOutcome::Applied);

        let subs = store.list_subscriptions_by_user(&"u1".parse().unwrap()).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].status, SubscriptionStatus::Active);
        assert_eq!(subs[0].stripe_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(
            subs[0].current_period_end,
            DateTime::parse_from_rfc3339("2023-12-14T22:13:20Z")
                .ok()
                .map(|d| d.with_timezone(&Utc))
        );

        let orders = store.all_orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Completed);
        assert_eq!(orders[0].total_amount, 5900);
    }

    #[tokio::test]
    async fn missing_metadata_is_skipped() {
        let (store, state) = setup();
        let mut session = completed_session("monthly");
        session["metadata"] = json!({"userId": "u1"});
        let outcome = deliver(&state, "checkout.session.completed", session).await;
        assert_eq!(outcome, EventOutcome::Skipped("missing checkout metadata"));
        assert!(store.all_orders().await.is_empty());
    }

    #[tokio::test]
    async fn pending_order_is_completed_in_place() {
        let (store, state) = setup();
        let pending = Order::pending("u1".parse().unwrap(), OrderTotals::flat(5900), "cs_test_1");
        store.insert_order(&pending).await.unwrap();

        deliver(&state, "checkout.session.completed", completed_session("monthly")).await;

        let orders = store.all_orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, pending.id);
        assert_eq!(orders[0].status, OrderStatus::Completed);
    }

    #[test]
    fn missing_subtotal_keeps_totals_consistent() {
        let session: CheckoutSessionObject = serde_json::from_value(json!({
            "id": "cs_1",
            "amount_total": 9000,
            "total_details": {"amount_tax": 500, "amount_discount": 1500}
        }))
        .unwrap();
        let totals = session_totals(&session);
        assert_eq!(totals.subtotal, 10_000);
        assert_eq!(totals.total(), 9000);
    }

    #[tokio::test]
    async fn lifecycle_events_mirror_status() {
        let (store, state) = setup();
        deliver(&state, "checkout.session.completed", completed_session("monthly")).await;

        let invoice = json!({"id": "in_1", "subscription": "sub_1"});
        let failed = deliver(&state, "invoice.payment_failed", invoice).await;
        assert_eq!(failed, EventOutcome::Applied);
        let sub = store.find_active_subscription(&"u1".parse().unwrap()).await.unwrap();
        assert!(sub.is_none());

        let invoice = json!({
            "id": "in_2",
            "parent": {"subscription_details": {"subscription": "sub_1"}}
        });
        deliver(&state, "invoice.paid", invoice).await;
        let sub = store
            .find_active_subscription(&"u1".parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Active);

        let updated = json!({
            "id": "sub_1",
            "status": "active",
            "cancel_at_period_end": true,
            "current_period_start": 1_702_592_000,
            "current_period_end": 1_705_270_400
        });
        deliver(&state, "customer.subscription.updated", updated).await;
        let sub = store.get_subscription(&sub.id).await.unwrap().unwrap();
        assert!(sub.cancel_at_period_end);
        assert_eq!(sub.current_period_end.map(|t| t.timestamp()), Some(1_705_270_400));

        let deleted = json!({"id": "sub_1", "status": "canceled"});
        deliver(&state, "customer.subscription.deleted", deleted).await;
        let sub = store.get_subscription(&sub.id).await.unwrap().unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Canceled);
    }

    #[tokio::test]
    async fn unknown_subscription_and_types() {
        let (_store, state) = setup();
        let invoice = json!({"id": "in_1", "subscription": "sub_nope"});
        let outcome = deliver(&state, "invoice.paid", invoice).await;
        assert_eq!(outcome, EventOutcome::Skipped("no matching subscription"));

        let outcome = deliver(&state, "charge.refunded", json!({"id": "ch_1"})).await;
        assert_eq!(outcome, EventOutcome::Unhandled);
    }
}
