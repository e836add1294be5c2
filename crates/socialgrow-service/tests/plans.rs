//! Plan catalog and health integration tests.

mod common;

use common::TestHarness;
use socialgrow_store::MemoryStore;

#[tokio::test]
async fn health_reports_service() {
    let harness = TestHarness::new().await;

    let response = harness.server.get("/health").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "socialgrow-service");
    assert_eq!(body["integrations"]["stripe"], true);
    assert_eq!(body["integrations"]["webhooks"], true);
    assert_eq!(body["integrations"]["auth"], true);
    assert_eq!(body["integrations"]["catalog"], "ok");
}

#[tokio::test]
async fn health_reports_missing_integrations() {
    let harness = TestHarness::with_config(|config| {
        config.stripe_secret_key = None;
        config.stripe_webhook_secret = None;
        config.supabase_jwt_secret = None;
    })
    .await;

    let body: serde_json::Value = harness.server.get("/health").await.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["integrations"]["stripe"], false);
    assert_eq!(body["integrations"]["webhooks"], false);
    assert_eq!(body["integrations"]["auth"], false);
}

#[tokio::test]
async fn health_reports_degraded_catalog() {
    let store = MemoryStore::new();
    store.set_unavailable(true);
    let harness = TestHarness::with_store(store).await;

    for _ in 0..3 {
        harness.server.get("/api/plans").await.assert_status_ok();
    }

    let body: serde_json::Value = harness.server.get("/health").await.json();
    assert_eq!(body["integrations"]["catalog"], "degraded");
}

#[tokio::test]
async fn plans_come_from_storage() {
    let harness = TestHarness::new().await;

    let response = harness.server.get("/api/plans").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["source"], "database");
    assert_eq!(body["count"], 3);
    assert_eq!(body["plans"][0]["slug"], "starter");
    assert!(body.get("note").is_none());
}

#[tokio::test]
async fn plans_fall_back_when_storage_is_down() {
    let store = MemoryStore::new();
    store.set_unavailable(true);
    let harness = TestHarness::with_store(store).await;

    let response = harness.server.get("/api/plans").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["source"], "mock_data");
    assert_eq!(body["count"], 3);
    assert!(body["note"].is_string());

    let prices: Vec<i64> = body["plans"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["monthly_price"].as_i64().unwrap())
        .collect();
    assert_eq!(prices, vec![5900, 11900, 29900]);
}
