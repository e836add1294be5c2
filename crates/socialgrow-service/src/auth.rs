//! Request authentication.
//!
//! Bearer tokens are Supabase session JWTs. With a JWT secret configured they
//! are checked locally (HS256, audience `authenticated`), otherwise each token
//! is sent to the Supabase Auth `/auth/v1/user` endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use socialgrow_core::UserId;

use crate::error::ApiError;
use crate::state::AppState;

/// Audience Supabase puts on signed-in user sessions.
pub const SESSION_AUDIENCE: &str = "authenticated";

/// Timeout for remote session checks.
const REMOTE_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// An authenticated user extracted from a session token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user ID.
    pub user_id: UserId,
    /// Email on the session, when present.
    pub email: Option<String>,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        let Some(verifier) = &state.identity else {
            tracing::warn!("No session verifier configured - rejecting bearer token");
            return Err(ApiError::Unauthorized);
        };

        verifier.verify(token).await
    }
}

/// Turns a bearer token into a verified user.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify `token`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` for any invalid or expired token.
    async fn verify(&self, token: &str) -> Result<AuthUser, ApiError>;
}

/// Session JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID).
    pub sub: String,
    /// User email.
    #[serde(default)]
    pub email: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    /// Expiration time.
    pub exp: i64,
}

// ============================================================================
// Local verification
// ============================================================================

/// Verifies HS256 session tokens with the project JWT secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Create a verifier for tokens signed with `secret`.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[SESSION_AUDIENCE]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<AuthUser, ApiError> {
        let data = decode::<SessionClaims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "JWT validation failed");
            ApiError::Unauthorized
        })?;

        let user_id = data
            .claims
            .sub
            .parse::<UserId>()
            .map_err(|_| ApiError::Unauthorized)?;

        Ok(AuthUser {
            user_id,
            email: data.claims.email,
        })
    }
}

// ============================================================================
// Remote verification
// ============================================================================

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Verifies tokens by asking Supabase Auth who they belong to.
pub struct RemoteVerifier {
    client: reqwest::Client,
    user_url: String,
    anon_key: String,
}

impl RemoteVerifier {
    /// Create a verifier against a Supabase project.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(project_url: &str, anon_key: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(REMOTE_VERIFY_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            user_url: format!("{}/auth/v1/user", project_url.trim_end_matches('/')),
            anon_key: anon_key.into(),
        })
    }
}

#[async_trait]
impl IdentityVerifier for RemoteVerifier {
    async fn verify(&self, token: &str) -> Result<AuthUser, ApiError> {
        let response = self
            .client
            .get(&self.user_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, url = %self.user_url, "Session check failed");
                ApiError::Unauthorized
            })?;

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "Session rejected by auth server");
            return Err(ApiError::Unauthorized);
        }

        let user: SupabaseUser = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse auth user response");
            ApiError::Unauthorized
        })?;

        Ok(AuthUser {
            user_id: user.id.parse().map_err(|_| ApiError::Unauthorized)?,
            email: user.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token(secret: &str, sub: &str, aud: &str, exp_offset: i64) -> String {
        let claims = SessionClaims {
            sub: sub.into(),
            email: Some("u@example.com".into()),
            aud: Some(serde_json::Value::String(aud.into())),
            exp: chrono::Utc::now().timestamp() + exp_offset,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn local_verifier_accepts_valid_session() {
        let verifier = JwtVerifier::new("jwt-secret");
        let user = verifier
            .verify(&token("jwt-secret", "user-1", SESSION_AUDIENCE, 3600))
            .await
            .unwrap();
        assert_eq!(user.user_id.as_str(), "user-1");
        assert_eq!(user.email.as_deref(), Some("u@example.com"));
    }

    #[tokio::test]
    async fn local_verifier_rejects_bad_tokens() {
        let verifier = JwtVerifier::new("jwt-secret");
        for bad in [
            token("other-secret", "user-1", SESSION_AUDIENCE, 3600),
            token("jwt-secret", "user-1", "anon", 3600),
            token("jwt-secret", "user-1", SESSION_AUDIENCE, -3600),
            "not-a-jwt".to_string(),
        ] {
            assert!(matches!(
                verifier.verify(&bad).await,
                Err(ApiError::Unauthorized)
            ));
        }
    }

    #[tokio::test]
    async fn remote_verifier_asks_auth_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header("apikey", "anon"))
            .and(header("authorization", "Bearer good"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "user-9", "email": "n@example.com"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let verifier = RemoteVerifier::new(&server.uri(), "anon").unwrap();
        let user = verifier.verify("good").await.unwrap();
        assert_eq!(user.user_id.as_str(), "user-9");
        assert!(matches!(
            verifier.verify("bad").await,
            Err(ApiError::Unauthorized)
        ));
    }
}
