//! HTTP route table.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{handlers, middleware, state::SharedState};

/// Two base64 screenshots easily exceed axum's 2 MB default.
const ANALYSIS_BODY_LIMIT: usize = 20 * 1024 * 1024;

pub fn build_router(state: SharedState) -> Router {
    let admin_routes = Router::new()
        .route(
            "/api/v1/admin/credentials/usage",
            get(handlers::credentials::usage_report),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::admin_auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/api/v1/analysis",
            post(handlers::analysis::analyze_charts)
                .layer(DefaultBodyLimit::max(ANALYSIS_BODY_LIMIT)),
        )
        .route("/api/v1/payments/ipn", post(handlers::payments::receive_ipn))
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
