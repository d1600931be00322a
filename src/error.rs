//! Error types and HTTP error response handling.
//!
//! This module defines the application errors, the per-attempt errors raised
//! while talking to the analysis API, and the counter store errors. Only
//! `AppError` ever reaches an HTTP client; store errors are absorbed by the
//! usage tracker.

use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Authentication Errors**: Invalid admin token or webhook signature
/// - **Validation Errors**: Invalid request data
/// - **Exhaustion**: Every credential was tried and none produced an analysis
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Admin token is missing or does not match.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Webhook signature is missing, malformed, or does not verify.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("Invalid request")]
    InvalidRequest(String),

    /// The attempt budget was consumed without a single successful analysis.
    ///
    /// Returns HTTP 503 Service Unavailable with a generic retry message.
    #[error("All API keys exhausted. Please try again later.")]
    AllKeysExhausted { attempts: usize },
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `InvalidApiKey` → 401 Unauthorized
/// - `InvalidSignature` → 401 Unauthorized
/// - `InvalidRequest` → 400 Bad Request
/// - `AllKeysExhausted` → 503 Service Unavailable
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::InvalidSignature => (
                StatusCode::UNAUTHORIZED,
                "invalid_signature",
                self.to_string(),
            ),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::AllKeysExhausted { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "all_keys_exhausted",
                self.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

/// Failure of a single analysis attempt.
///
/// None of these escape the rotation loop. Every variant marks the credential
/// failed for the current cycle and the loop moves on to the next one.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    /// Every credential in the current cycle has already failed.
    #[error("every credential failed in the current cycle")]
    CredentialExhausted,

    /// Cached usage for the credential is at or above the daily limit.
    #[error("daily quota reached ({used}/{limit})")]
    QuotaExceeded { used: i64, limit: i64 },

    #[error("analysis request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("upstream returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("malformed analysis response: {0}")]
    MalformedResponse(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Durable counter store failure (`DurableStoreUnavailable`).
///
/// Never fatal: the usage tracker logs it and keeps serving its cache.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),

    /// In-process store switched offline.
    #[error("counter store is offline")]
    Offline,
}

/// Startup configuration problems.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("no analysis API keys configured (GEMINI_API_KEYS)")]
    NoCredentials,

    #[error("reference UTC offset out of range: {0} hours")]
    InvalidOffset(i32),

    #[error("invalid GEMINI_BASE_URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_maps_to_service_unavailable() {
        let response = AppError::AllKeysExhausted { attempts: 4 }.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn invalid_request_keeps_its_message() {
        let response = AppError::InvalidRequest("bad chart".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn bad_signature_is_unauthorized() {
        let response = AppError::InvalidSignature.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
