//! Common test utilities for socialgrow integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use wiremock::MockServer;

use socialgrow_core::{fallback_plans, Profile, UserId};
use socialgrow_service::auth::{SessionClaims, SESSION_AUDIENCE};
use socialgrow_service::crypto::hmac_sha256_hex;
use socialgrow_service::{create_router, AppState, ServiceConfig};
use socialgrow_store::MemoryStore;

/// Secret the test sessions are signed with.
pub const JWT_SECRET: &str = "test-jwt-secret";

/// Secret the test webhooks are signed with.
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Backing store, for seeding and inspecting rows.
    pub store: Arc<MemoryStore>,
    /// Stands in for the Stripe API.
    pub stripe: MockServer,
}

impl TestHarness {
    /// Create a harness over a store holding the built-in plans.
    pub async fn new() -> Self {
        Self::with_store(MemoryStore::with_plans(fallback_plans())).await
    }

    /// Create a harness over `store`.
    pub async fn with_store(store: MemoryStore) -> Self {
        let stripe = MockServer::start().await;
        let config = Self::config(&stripe);
        Self::build(store, config, stripe)
    }

    /// Create a harness with a custom configuration.
    pub async fn with_config(edit: impl FnOnce(&mut ServiceConfig)) -> Self {
        let stripe = MockServer::start().await;
        let mut config = Self::config(&stripe);
        edit(&mut config);
        Self::build(MemoryStore::with_plans(fallback_plans()), config, stripe)
    }

    fn config(stripe: &MockServer) -> ServiceConfig {
        ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            stripe_secret_key: Some("sk_test_123".into()),
            stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
            stripe_api_base: stripe.uri(),
            supabase_jwt_secret: Some(JWT_SECRET.into()),
            app_url: "https://socialgrow.test".into(),
            ..ServiceConfig::default()
        }
    }

    fn build(store: MemoryStore, config: ServiceConfig, stripe: MockServer) -> Self {
        let store = Arc::new(store);
        let state = AppState::new(store.clone(), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            stripe,
        }
    }

    /// Seed a profile and return its user id.
    pub async fn profile(&self, id: &str, email: &str, first: &str, last: &str) -> UserId {
        let user_id: UserId = id.parse().expect("valid user id");
        self.store
            .put_profile(Profile::new(user_id.clone(), email).with_name(first, last))
            .await;
        user_id
    }
}

/// Authorization header for a signed-in `user_id`.
pub fn bearer(user_id: &str) -> String {
    let claims = SessionClaims {
        sub: user_id.into(),
        email: Some(format!("{user_id}@example.com")),
        aud: Some(serde_json::Value::String(SESSION_AUDIENCE.into())),
        exp: chrono::Utc::now().timestamp() + 3600,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign test token");
    format!("Bearer {token}")
}

/// `stripe-signature` header for `payload`, signed now.
pub fn sign(payload: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let signature = hmac_sha256_hex(WEBHOOK_SECRET, &format!("{timestamp}.{payload}"))
        .expect("HMAC accepts any key length");
    format!("t={timestamp},v1={signature}")
}
