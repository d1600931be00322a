//! Admin view of API key usage.

use axum::{Json, extract::State};

use crate::{models::usage::UsageReport, state::SharedState};

/// Today's usage for every known API key.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "daily_limit": 1500,
///   "reference_day": "2025-06-02",
///   "credentials": [
///     { "id": "3f2a9c1d0b7e4a55", "label": "Primary", "used": 12, "remaining": 1488 }
///   ]
/// }
/// ```
pub async fn usage_report(State(state): State<SharedState>) -> Json<UsageReport> {
    let credentials = state.tracker.snapshot_all().await;

    Json(UsageReport {
        daily_limit: state.tracker.daily_limit(),
        reference_day: state.tracker.reference_day(),
        credentials,
    })
}
