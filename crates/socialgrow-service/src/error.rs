//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use socialgrow_store::StoreError;

use crate::stripe::StripeError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists or lost a concurrent update.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", self.to_string()),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            Self::ExternalService(msg) => {
                tracing::warn!(error = %msg, "Upstream call failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "external_service_error",
                    msg.clone(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => {
                Self::NotFound(format!("{entity} not found: {id}"))
            }
            StoreError::Conflict { .. } => Self::Conflict(err.to_string()),
            StoreError::Unavailable(msg)
            | StoreError::Database(msg)
            | StoreError::Serialization(msg) => Self::ExternalService(msg),
        }
    }
}

impl From<StripeError> for ApiError {
    fn from(err: StripeError) -> Self {
        match err {
            StripeError::Api { message, .. } => Self::ExternalService(message),
            StripeError::Http(e) => Self::ExternalService(e.to_string()),
            StripeError::InvalidSignature | StripeError::SignatureExpired => {
                Self::BadRequest(err.to_string())
            }
            StripeError::Serialization(e) => Self::Internal(e.to_string()),
            StripeError::Configuration(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
            (ApiError::Forbidden, StatusCode::FORBIDDEN),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::Conflict("x".into()), StatusCode::CONFLICT),
            (ApiError::ExternalService("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn store_errors_map_onto_the_taxonomy() {
        let conflict = StoreError::Conflict {
            entity: "affiliate",
            field: "user_id".into(),
        };
        assert!(matches!(ApiError::from(conflict), ApiError::Conflict(_)));
        assert!(matches!(
            ApiError::from(StoreError::Unavailable("down".into())),
            ApiError::ExternalService(msg) if msg == "down"
        ));
        assert!(matches!(
            ApiError::from(StoreError::Database("HTTP 500: relation missing".into())),
            ApiError::ExternalService(msg) if msg == "HTTP 500: relation missing"
        ));
    }

    #[tokio::test]
    async fn storage_failure_message_reaches_the_client() {
        let err = ApiError::from(StoreError::Database("HTTP 503: pool exhausted".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["message"], "HTTP 503: pool exhausted");
    }

    #[test]
    fn stripe_api_message_passes_through() {
        let err = StripeError::Api {
            error_type: "card_error".into(),
            message: "Your card was declined.".into(),
            code: None,
        };
        assert!(matches!(
            ApiError::from(err),
            ApiError::ExternalService(msg) if msg == "Your card was declined."
        ));
    }
}
