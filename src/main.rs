//! Chart Analysis Gateway - Main Application Entry Point
//!
//! A REST API that turns trading chart screenshots into trade plans using
//! the Gemini API. Requests are spread over a pool of API keys with
//! round-robin rotation, and each key's calls are counted per day against
//! a fixed quota.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Usage counters**: PostgreSQL with sqlx, or process memory without `DATABASE_URL`
//! - **Analysis**: Gemini `generateContent` over reqwest
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Open the counter store (and run migrations when it is Postgres)
//! 3. Register API keys with the usage tracker and warm its cache
//! 4. Schedule the daily usage rollover
//! 5. Build HTTP router and start server on configured port

mod config;
mod db;
mod error;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::{
    middleware::auth::hash_token,
    services::{
        analysis_service::AnalysisService,
        clock::{Clock, SystemClock},
        counter_store::{CounterStore, InMemoryCounterStore, PgCounterStore},
        gemini::GeminiClient,
        rotation::RotationSelector,
        scheduler::{DayRollover, TokioScheduler},
        usage_tracker::UsageTracker,
    },
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env()?;
    let credentials = config.credentials()?;
    let settings = config.tracker_settings()?;
    tracing::info!(
        keys = credentials.len(),
        daily_limit = settings.daily_limit,
        "Configuration loaded"
    );

    let store: Arc<dyn CounterStore> = match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = db::create_pool(database_url).await?;
            tracing::info!("Database pool created");

            db::run_migrations(&pool).await?;
            tracing::info!("Database migrations complete");

            Arc::new(PgCounterStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, API key usage will not survive restarts");
            Arc::new(InMemoryCounterStore::new())
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let tracker = Arc::new(UsageTracker::new(store.clone(), clock.clone(), settings));
    for credential in &credentials {
        tracker.register_credential(&credential.id, &credential.label);
    }
    tracker.refresh().await;

    let rollover = DayRollover::new(tracker.clone(), Arc::new(TokioScheduler::new(clock)));
    rollover.start();

    let analyzer = GeminiClient::new(&config.gemini_base_url()?, &config.gemini_model)?;
    tracing::info!(endpoint = %analyzer.endpoint(), "Analysis client ready");

    let analysis = AnalysisService::new(
        Arc::new(RotationSelector::new(credentials)),
        tracker.clone(),
        Arc::new(analyzer),
        config.analysis_timeout(),
    );

    let state = Arc::new(AppState {
        tracker,
        analysis: Arc::new(analysis),
        store,
        admin_token_hash: hash_token(&config.admin_api_token),
        ipn_secret: config.nowpayments_ipn_secret.clone(),
    });
    if state.ipn_secret.is_none() {
        tracing::warn!("NOWPAYMENTS_IPN_SECRET not set, payment notifications will be rejected");
    }

    let app = routes::build_router(state);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    rollover.stop();

    Ok(())
}
