//! Affiliate and referral integration tests.

mod common;

use common::{bearer, TestHarness};
use serde_json::json;

use socialgrow_core::{PaymentMethod, ReferralStatus, UserId};
use socialgrow_store::Store;

fn user(id: &str) -> UserId {
    id.parse().unwrap()
}

async fn register(harness: &TestHarness, user_id: &str) -> serde_json::Value {
    let response = harness
        .server
        .post("/api/affiliates")
        .add_header("authorization", bearer(user_id))
        .json(&json!({"action": "register"}))
        .await;
    response.assert_status_ok();
    response.json()
}

// ============================================================================
// Enrollment
// ============================================================================

#[tokio::test]
async fn affiliates_require_session() {
    let harness = TestHarness::new().await;

    harness
        .server
        .get("/api/affiliates")
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn non_affiliate_overview() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .get("/api/affiliates")
        .add_header("authorization", bearer("u1"))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["isAffiliate"], false);
    assert!(body["affiliate"].is_null());
}

#[tokio::test]
async fn register_once_only() {
    let harness = TestHarness::new().await;
    harness.profile("u1", "ana@example.com", "Ana", "Lopez").await;

    let body = register(&harness, "u1").await;
    assert_eq!(body["message"], "Successfully registered as affiliate");
    let code = body["affiliate"]["referral_code"].as_str().unwrap().to_string();
    assert!(code.starts_with("ANA"));
    assert_eq!(code.len(), 7);
    assert_eq!(body["affiliate"]["commission_tier"], "bronze");
    assert_eq!(body["affiliate"]["payment_method"], "paypal");

    let again = harness
        .server
        .post("/api/affiliates")
        .add_header("authorization", bearer("u1"))
        .json(&json!({"action": "register"}))
        .await;
    again.assert_status_bad_request();
    let error: serde_json::Value = again.json();
    assert_eq!(error["error"]["message"], "Already registered as an affiliate");

    let overview: serde_json::Value = harness
        .server
        .get("/api/affiliates")
        .add_header("authorization", bearer("u1"))
        .await
        .json();
    assert_eq!(overview["isAffiliate"], true);
    assert_eq!(overview["affiliate"]["referral_code"], code.as_str());
    assert_eq!(overview["affiliate"]["referrals"], json!([]));
}

#[tokio::test]
async fn register_without_profile_is_not_found() {
    let harness = TestHarness::new().await;

    harness
        .server
        .post("/api/affiliates")
        .add_header("authorization", bearer("nobody"))
        .json(&json!({"action": "register"}))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn update_payout_settings() {
    let harness = TestHarness::new().await;
    harness.profile("u1", "ana@example.com", "Ana", "Lopez").await;

    harness
        .server
        .post("/api/affiliates")
        .add_header("authorization", bearer("u1"))
        .json(&json!({"action": "update", "paymentMethod": "wise"}))
        .await
        .assert_status_not_found();

    register(&harness, "u1").await;
    let response = harness
        .server
        .post("/api/affiliates")
        .add_header("authorization", bearer("u1"))
        .json(&json!({
            "action": "update",
            "paymentEmail": "payouts@example.com",
            "paymentMethod": "wise"
        }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["message"], "Affiliate settings updated successfully");

    let affiliate = harness
        .store
        .get_affiliate_by_user(&user("u1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(affiliate.payment_method, PaymentMethod::Wise);
    assert_eq!(affiliate.payment_email.as_deref(), Some("payouts@example.com"));
}

#[tokio::test]
async fn unknown_action_is_rejected() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/api/affiliates")
        .add_header("authorization", bearer("u1"))
        .json(&json!({"action": "delete"}))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(
        body["error"]["message"],
        "Unknown action: delete. Valid actions: register, update"
    );
}

// ============================================================================
// Referrals
// ============================================================================

#[tokio::test]
async fn validate_referral_codes() {
    let harness = TestHarness::new().await;
    harness.profile("u1", "ana@example.com", "Ana", "Lopez").await;
    let code = register(&harness, "u1").await["affiliate"]["referral_code"]
        .as_str()
        .unwrap()
        .to_string();

    harness
        .server
        .get("/api/referrals")
        .await
        .assert_status_bad_request();

    let unknown = harness
        .server
        .get("/api/referrals")
        .add_query_param("code", "NOPE000")
        .await;
    unknown.assert_status_not_found();
    let body: serde_json::Value = unknown.json();
    assert_eq!(body["valid"], false);
    assert_eq!(body["error"], "Invalid or inactive referral code");

    let valid = harness
        .server
        .get("/api/referrals")
        .add_query_param("code", &code)
        .await;
    valid.assert_status_ok();
    let body: serde_json::Value = valid.json();
    assert_eq!(body["valid"], true);
    assert_eq!(body["affiliate"]["referral_code"], code.as_str());
    assert_eq!(body["affiliate"]["commission_tier"], "bronze");
    assert_eq!(body["affiliate"]["affiliate_name"], "Ana Lopez");
}

#[tokio::test]
async fn track_referrals() {
    let harness = TestHarness::new().await;
    harness.profile("u1", "ana@example.com", "Ana", "Lopez").await;
    let code = register(&harness, "u1").await["affiliate"]["referral_code"]
        .as_str()
        .unwrap()
        .to_string();

    let missing = harness
        .server
        .post("/api/referrals")
        .json(&json!({"referralCode": code}))
        .await;
    missing.assert_status_bad_request();
    let body: serde_json::Value = missing.json();
    assert_eq!(
        body["error"]["message"],
        "Missing required fields: referralCode, newUserId"
    );

    let own = harness
        .server
        .post("/api/referrals")
        .json(&json!({"referralCode": code, "newUserId": "u1"}))
        .await;
    own.assert_status_bad_request();
    let body: serde_json::Value = own.json();
    assert_eq!(body["error"]["message"], "Cannot refer yourself");
    assert!(harness.store.all_referrals().await.is_empty());

    harness
        .server
        .post("/api/referrals")
        .json(&json!({"referralCode": "NOPE000", "newUserId": "u2"}))
        .await
        .assert_status_not_found();

    let tracked = harness
        .server
        .post("/api/referrals")
        .json(&json!({"referralCode": code, "newUserId": "u2"}))
        .await;
    tracked.assert_status_ok();
    let body: serde_json::Value = tracked.json();
    assert_eq!(body["message"], "Referral tracked successfully");
    assert_eq!(body["referral"]["status"], "pending");

    let referral = harness
        .store
        .get_referral_for_user(&user("u2"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(referral.status, ReferralStatus::Pending);
    let affiliate = harness
        .store
        .get_affiliate_by_user(&user("u1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(affiliate.total_referrals, 1);

    let duplicate = harness
        .server
        .post("/api/referrals")
        .json(&json!({"referralCode": code, "newUserId": "u2"}))
        .await;
    duplicate.assert_status_bad_request();
    let body: serde_json::Value = duplicate.json();
    assert_eq!(body["error"]["message"], "User already has a referral record");
    assert_eq!(harness.store.all_referrals().await.len(), 1);
}
