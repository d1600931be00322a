//! Chart analysis endpoint.

use axum::{Json, extract::State};

use crate::{
    error::AppError,
    models::analysis::{AnalyzeChartsRequest, TradePlan},
    state::SharedState,
};

/// Analyze a 15 minute and a 1 hour chart screenshot.
///
/// # Request Body
///
/// ```json
/// {
///   "chart_15m": "data:image/jpeg;base64,/9j/4AAQ...",
///   "chart_1h": "data:image/jpeg;base64,/9j/4AAQ..."
/// }
/// ```
///
/// # Response (200 OK)
///
/// The `TradePlan` produced by the first API key that answered with a
/// usable plan.
///
/// # Errors
///
/// - `400 Bad Request`: a chart is empty
/// - `503 Service Unavailable`: every API key failed or is over quota
pub async fn analyze_charts(
    State(state): State<SharedState>,
    Json(request): Json<AnalyzeChartsRequest>,
) -> Result<Json<TradePlan>, AppError> {
    if request.chart_15m.trim().is_empty() || request.chart_1h.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "Both chart_15m and chart_1h images are required".to_string(),
        ));
    }

    let plan = state.analysis.analyze_charts(&request).await?;

    Ok(Json(plan))
}
