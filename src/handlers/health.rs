//! Health check endpoint for service monitoring.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::SharedState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `healthy`, or `degraded` when the counter store is unreachable
    pub status: String,

    /// Counter store status
    pub store: String,

    /// Number of configured analysis API keys
    pub credentials: usize,

    /// Current server timestamp
    pub timestamp: DateTime<Utc>,
}

/// Health check handler.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "status": "healthy",
///   "store": "connected",
///   "credentials": 3,
///   "timestamp": "2025-12-21T19:00:00Z"
/// }
/// ```
///
/// A store outage does not fail the check: analysis keeps working from the
/// usage cache, so the service reports itself `degraded` instead.
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let (status, store) = match state.store.ping().await {
        Ok(()) => ("healthy", "connected"),
        Err(err) => {
            tracing::warn!(error = %err, "Health check could not reach counter store");
            ("degraded", "unavailable")
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        store: store.to_string(),
        credentials: state.analysis.credential_count(),
        timestamp: Utc::now(),
    })
}
