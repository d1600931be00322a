//! Chart analysis with credential rotation.
//!
//! Each request makes up to `attempt_budget` sequential attempts. An attempt
//! picks the next eligible credential, checks its cached daily usage, calls
//! the analyzer under a timeout and parses the trade plan. Any failure marks
//! the credential failed for the current cycle and the loop moves on. Only
//! a successful analysis is counted against a credential's quota.

use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{AppError, AttemptError},
    models::{
        analysis::{AnalyzeChartsRequest, TradePlan},
        credential::Credential,
    },
    services::{
        gemini::{ChartAnalyzer, parse_trade_plan},
        rotation::RotationSelector,
        usage_tracker::UsageTracker,
    },
};

pub struct AnalysisService {
    selector: Arc<RotationSelector>,
    tracker: Arc<UsageTracker>,
    analyzer: Arc<dyn ChartAnalyzer>,
    call_timeout: Duration,
}

impl AnalysisService {
    pub fn new(
        selector: Arc<RotationSelector>,
        tracker: Arc<UsageTracker>,
        analyzer: Arc<dyn ChartAnalyzer>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            selector,
            tracker,
            analyzer,
            call_timeout,
        }
    }

    pub fn credential_count(&self) -> usize {
        self.selector.credential_count()
    }

    /// Two full passes over the credential list.
    pub fn default_attempt_budget(&self) -> usize {
        self.selector.credential_count() * 2
    }

    /// Analyze a chart pair with the default attempt budget.
    pub async fn analyze_charts(
        &self,
        request: &AnalyzeChartsRequest,
    ) -> Result<TradePlan, AppError> {
        self.run_analysis(self.default_attempt_budget(), request).await
    }

    /// Run the rotation loop.
    ///
    /// A cycle reset (every credential failed) consumes an attempt without
    /// calling the analyzer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AllKeysExhausted` once `attempt_budget` attempts
    /// have been made without a usable trade plan. Individual attempt errors
    /// are logged and never returned.
    pub async fn run_analysis(
        &self,
        attempt_budget: usize,
        request: &AnalyzeChartsRequest,
    ) -> Result<TradePlan, AppError> {
        for attempt in 1..=attempt_budget {
            let Some((index, credential)) = self.selector.next_credential() else {
                tracing::debug!(
                    attempt,
                    reason = %AttemptError::CredentialExhausted,
                    "Starting a new rotation cycle"
                );
                continue;
            };

            match self.attempt(&credential, request).await {
                Ok(plan) => {
                    if !self.tracker.record_usage(&credential.id).await {
                        tracing::warn!(
                            credential = %credential.label,
                            "Analysis succeeded but usage was not recorded"
                        );
                    }
                    tracing::info!(
                        credential = %credential.label,
                        attempt,
                        trade_id = %plan.trade_id,
                        "Chart analysis completed"
                    );
                    return Ok(plan);
                }
                Err(err) => {
                    tracing::warn!(
                        credential = %credential.label,
                        attempt,
                        error = %err,
                        "Analysis attempt failed, rotating to next key"
                    );
                    self.selector.on_attempt_failed(index);
                }
            }
        }

        tracing::error!(attempts = attempt_budget, "All API keys exhausted");
        Err(AppError::AllKeysExhausted {
            attempts: attempt_budget,
        })
    }

    async fn attempt(
        &self,
        credential: &Credential,
        request: &AnalyzeChartsRequest,
    ) -> Result<TradePlan, AttemptError> {
        let used = self.tracker.check_and_maybe_refresh(&credential.id).await;
        if self.tracker.is_over_quota(used) {
            return Err(AttemptError::QuotaExceeded {
                used,
                limit: self.tracker.daily_limit(),
            });
        }

        let text = tokio::time::timeout(
            self.call_timeout,
            self.analyzer.analyze(credential.secret(), request),
        )
        .await
        .map_err(|_| AttemptError::Timeout(self.call_timeout))??;

        parse_trade_plan(&text)
    }
}
