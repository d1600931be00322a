//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::services::{
    analysis_service::AnalysisService, counter_store::CounterStore, usage_tracker::UsageTracker,
};

pub struct AppState {
    pub tracker: Arc<UsageTracker>,
    pub analysis: Arc<AnalysisService>,
    pub store: Arc<dyn CounterStore>,

    /// Hex SHA-256 of the admin bearer token; the token itself is not kept
    pub admin_token_hash: String,

    pub ipn_secret: Option<String>,
}

pub type SharedState = Arc<AppState>;
