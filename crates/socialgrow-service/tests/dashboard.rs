//! Subscription and order dashboard integration tests.

mod common;

use chrono::Utc;
use common::{bearer, TestHarness};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

use socialgrow_core::{
    BillingCycle, Order, OrderTotals, Platform, Subscription, SubscriptionStatus,
};
use socialgrow_store::Store;

async fn seed_subscription(
    harness: &TestHarness,
    user: &str,
    stripe_id: Option<&str>,
) -> Subscription {
    let mut subscription = Subscription::activate(
        user.parse().unwrap(),
        "pro-plan".parse().unwrap(),
        Platform::Youtube,
        BillingCycle::Monthly,
        Utc::now(),
    )
    .unwrap();
    subscription.stripe_subscription_id = stripe_id.map(String::from);
    subscription.stripe_customer_id = Some("cus_dash".into());
    harness.store.upsert_subscription(&subscription).await.unwrap()
}

fn stripe_subscription(cancel_at_period_end: bool, status: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "sub_dash",
        "status": status,
        "cancel_at_period_end": cancel_at_period_end
    }))
}

// ============================================================================
// Listings
// ============================================================================

#[tokio::test]
async fn listings_require_session() {
    let harness = TestHarness::new().await;

    harness.server.get("/api/subscriptions").await.assert_status_unauthorized();
    harness.server.get("/api/orders").await.assert_status_unauthorized();
}

#[tokio::test]
async fn listings_only_show_the_callers_rows() {
    let harness = TestHarness::new().await;
    seed_subscription(&harness, "u1", Some("sub_dash")).await;
    seed_subscription(&harness, "u2", Some("sub_other")).await;
    harness
        .store
        .insert_order(&Order::pending("u1".parse().unwrap(), OrderTotals::flat(11900), "cs_1"))
        .await
        .unwrap();

    let subscriptions: serde_json::Value = harness
        .server
        .get("/api/subscriptions")
        .add_header("authorization", bearer("u1"))
        .await
        .json();
    assert_eq!(subscriptions["count"], 1);
    assert_eq!(subscriptions["subscriptions"][0]["stripe_subscription_id"], "sub_dash");

    let orders: serde_json::Value = harness
        .server
        .get("/api/orders")
        .add_header("authorization", bearer("u1"))
        .await
        .json();
    assert_eq!(orders["count"], 1);
    assert_eq!(orders["orders"][0]["total_amount"], 11900);

    let none: serde_json::Value = harness
        .server
        .get("/api/orders")
        .add_header("authorization", bearer("u2"))
        .await
        .json();
    assert_eq!(none["count"], 0);
}

// ============================================================================
// Actions
// ============================================================================

#[tokio::test]
async fn cancel_then_reactivate() {
    let harness = TestHarness::new().await;
    let subscription = seed_subscription(&harness, "u1", Some("sub_dash")).await;

    Mock::given(method("POST"))
        .and(path("/subscriptions/sub_dash"))
        .and(body_string_contains("cancel_at_period_end=true"))
        .respond_with(stripe_subscription(true, "active"))
        .expect(1)
        .mount(&harness.stripe)
        .await;
    Mock::given(method("POST"))
        .and(path("/subscriptions/sub_dash"))
        .and(body_string_contains("cancel_at_period_end=false"))
        .respond_with(stripe_subscription(false, "active"))
        .expect(1)
        .mount(&harness.stripe)
        .await;

    let response = harness
        .server
        .post("/api/subscriptions")
        .add_header("authorization", bearer("u1"))
        .json(&json!({"action": "cancel", "subscriptionId": subscription.id.to_string()}))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["subscription"]["cancel_at_period_end"], true);

    let response = harness
        .server
        .post("/api/subscriptions")
        .add_header("authorization", bearer("u1"))
        .json(&json!({"action": "reactivate", "subscriptionId": subscription.id.to_string()}))
        .await;
    response.assert_status_ok();

    let stored = harness
        .store
        .get_subscription(&subscription.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.cancel_at_period_end);
    assert_eq!(stored.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn cancel_immediately_ends_the_subscription() {
    let harness = TestHarness::new().await;
    let subscription = seed_subscription(&harness, "u1", Some("sub_dash")).await;

    Mock::given(method("DELETE"))
        .and(path("/subscriptions/sub_dash"))
        .respond_with(stripe_subscription(false, "canceled"))
        .expect(1)
        .mount(&harness.stripe)
        .await;

    harness
        .server
        .post("/api/subscriptions")
        .add_header("authorization", bearer("u1"))
        .json(&json!({
            "action": "cancel_immediately",
            "subscriptionId": subscription.id.to_string()
        }))
        .await
        .assert_status_ok();

    let stored = harness
        .store
        .get_subscription(&subscription.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Canceled);
}

#[tokio::test]
async fn actions_are_checked() {
    let harness = TestHarness::new().await;
    let linked = seed_subscription(&harness, "u1", Some("sub_dash")).await;
    let unlinked = seed_subscription(&harness, "u1", None).await;

    harness
        .server
        .post("/api/subscriptions")
        .add_header("authorization", bearer("u2"))
        .json(&json!({"action": "cancel", "subscriptionId": linked.id.to_string()}))
        .await
        .assert_status_not_found();

    harness
        .server
        .post("/api/subscriptions")
        .add_header("authorization", bearer("u1"))
        .json(&json!({"action": "pause", "subscriptionId": linked.id.to_string()}))
        .await
        .assert_status_bad_request();

    harness
        .server
        .post("/api/subscriptions")
        .add_header("authorization", bearer("u1"))
        .json(&json!({"action": "cancel", "subscriptionId": unlinked.id.to_string()}))
        .await
        .assert_status_bad_request();
}
