//! Stripe API client implementation.

use std::time::Duration;

use reqwest::{Client, StatusCode};

use super::types::{
    CheckoutSession, CheckoutSessionParams, Customer, PortalSession, StripeCoupon,
    StripeErrorResponse, StripeList, StripeSubscription,
};

/// Error type for Stripe operations.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe API returned an error.
    #[error("Stripe API error: {error_type} - {message}")]
    Api {
        /// Error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Error code.
        code: Option<String>,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid webhook signature.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Webhook signature timestamp outside the tolerance window.
    #[error("Webhook signature timestamp outside tolerance")]
    SignatureExpired,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Stripe API client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl StripeClient {
    /// Stripe API base URL.
    pub const BASE_URL: &'static str = "https://api.stripe.com/v1";

    /// Create a new Stripe client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Stripe secret API key (`sk_test_...` or `sk_live_...`)
    ///
    /// # Errors
    ///
    /// Returns `StripeError::Configuration` if the key is empty, or
    /// `StripeError::Http` if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self, StripeError> {
        Self::with_base_url(api_key, Self::BASE_URL)
    }

    /// Create a client against a different API host (tests, proxies).
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, StripeError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(StripeError::Configuration("Stripe API key is empty".into()));
        }

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Create a new Stripe customer.
    ///
    /// # Arguments
    ///
    /// * `email` - Customer email
    /// * `name` - Optional display name
    /// * `user_id` - Our internal user ID (stored as metadata)
    pub async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        user_id: &str,
    ) -> Result<Customer, StripeError> {
        let mut params = vec![
            ("email", email.to_string()),
            ("metadata[userId]", user_id.to_string()),
        ];
        if let Some(name) = name {
            params.push(("name", name.to_string()));
        }

        let response = self
            .client
            .post(self.url("customers"))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Find the first customer registered under an email.
    pub async fn find_customer_by_email(
        &self,
        email: &str,
    ) -> Result<Option<Customer>, StripeError> {
        let response = self
            .client
            .get(self.url("customers"))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .query(&[("email", email), ("limit", "1")])
            .send()
            .await?;

        let list: StripeList<Customer> = self.handle_response(response).await?;
        Ok(list.data.into_iter().next())
    }

    /// Create a subscription-mode Checkout session.
    pub async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams,
    ) -> Result<CheckoutSession, StripeError> {
        tracing::debug!(
            plan_id = %params.plan_id,
            billing_cycle = %params.billing_cycle,
            user_id = params.user_id.as_deref().unwrap_or("anonymous"),
            "Creating Stripe checkout session"
        );

        let response = self
            .client
            .post(self.url("checkout/sessions"))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params.to_form())
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Create a billing portal session for a customer.
    pub async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, StripeError> {
        let response = self
            .client
            .post(self.url("billing_portal/sessions"))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&[("customer", customer_id), ("return_url", return_url)])
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a coupon by ID.
    pub async fn retrieve_coupon(
        &self,
        coupon_id: &str,
    ) -> Result<Option<StripeCoupon>, StripeError> {
        let response = self
            .client
            .get(self.url(&format!("coupons/{coupon_id}")))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        self.handle_response(response).await.map(Some)
    }

    /// Create a one-off percentage coupon with a fixed ID.
    pub async fn create_coupon(
        &self,
        coupon_id: &str,
        percent_off: i64,
        name: Option<&str>,
    ) -> Result<StripeCoupon, StripeError> {
        let mut params = vec![
            ("id", coupon_id.to_string()),
            ("percent_off", percent_off.to_string()),
            ("duration", "once".to_string()),
        ];
        if let Some(name) = name {
            params.push(("name", name.to_string()));
        }

        let response = self
            .client
            .post(self.url("coupons"))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Cancel a subscription immediately.
    pub async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<StripeSubscription, StripeError> {
        let response = self
            .client
            .delete(self.url(&format!("subscriptions/{subscription_id}")))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Set or clear cancellation at the end of the current period.
    pub async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> Result<StripeSubscription, StripeError> {
        let response = self
            .client
            .post(self.url(&format!("subscriptions/{subscription_id}")))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&[("cancel_at_period_end", cancel.to_string())])
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<StripeErrorResponse, _> = response.json().await;

        match error_body {
            Ok(stripe_error) => Err(StripeError::Api {
                error_type: stripe_error.error.error_type,
                message: stripe_error.error.message,
                code: stripe_error.error.code,
            }),
            Err(_) => Err(StripeError::Api {
                error_type: "unknown".to_string(),
                message: format!("HTTP {status}"),
                code: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> StripeClient {
        StripeClient::with_base_url("sk_test_123", server.uri()).unwrap()
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(
            StripeClient::new("  "),
            Err(StripeError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn api_errors_are_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/billing_portal/sessions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "type": "invalid_request_error",
                    "message": "No such customer",
                    "code": "resource_missing"
                }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .create_portal_session("cus_missing", "https://app/back")
            .await
            .unwrap_err();
        match err {
            StripeError::Api { message, code, .. } => {
                assert_eq!(message, "No such customer");
                assert_eq!(code.as_deref(), Some("resource_missing"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_coupon_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/coupons/NOPE"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"type": "invalid_request_error", "message": "No such coupon"}
            })))
            .mount(&server)
            .await;

        let coupon = client_for(&server).retrieve_coupon("NOPE").await.unwrap();
        assert!(coupon.is_none());
    }

    #[tokio::test]
    async fn customer_lookup_by_email() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers"))
            .and(query_param("email", "a@example.com"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [{"id": "cus_1", "email": "a@example.com"}],
                "has_more": false
            })))
            .mount(&server)
            .await;

        let customer = client_for(&server)
            .find_customer_by_email("a@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(customer.id, "cus_1");
    }

    #[tokio::test]
    async fn cancel_at_period_end_is_form_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/subscriptions/sub_1"))
            .and(body_string_contains("cancel_at_period_end=true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "sub_1", "status": "active", "cancel_at_period_end": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sub = client_for(&server)
            .set_cancel_at_period_end("sub_1", true)
            .await
            .unwrap();
        assert!(sub.cancel_at_period_end);
    }
}
