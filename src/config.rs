//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to deserialize environment variables into a
//! type-safe struct, then derives the credential list and tracker tunables.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::{
    error::ConfigError, models::credential::Credential, services::calendar::ReferenceCalendar,
    services::usage_tracker::TrackerSettings,
};

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (optional): PostgreSQL connection string. Without it the
///   usage counters live in process memory only.
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `GEMINI_API_KEYS` (required): comma-separated analysis API keys, in rotation order
/// - `GEMINI_KEY_LABELS` (optional): comma-separated display labels, same order
/// - `GEMINI_MODEL` (optional): defaults to `gemini-2.0-flash`
/// - `GEMINI_BASE_URL` (optional): defaults to the public v1beta endpoint
/// - `DAILY_LIMIT` (optional): per-key daily quota, defaults to 1500
/// - `REFERENCE_UTC_OFFSET_HOURS` (optional): quota day boundary, defaults to -4
/// - `USAGE_CACHE_TTL_SECS` (optional): usage cache staleness bound, defaults to 30
/// - `ANALYSIS_TIMEOUT_SECS` (optional): per-call timeout, defaults to 30
/// - `ADMIN_API_TOKEN` (required): bearer token for admin routes
/// - `NOWPAYMENTS_IPN_SECRET` (optional): IPN signing secret
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: Option<String>,

    #[serde(default = "default_port")]
    pub server_port: u16,

    pub gemini_api_keys: Vec<String>,

    #[serde(default)]
    pub gemini_key_labels: Vec<String>,

    #[serde(default = "default_model")]
    pub gemini_model: String,

    #[serde(default = "default_base_url")]
    pub gemini_base_url: String,

    #[serde(default = "default_daily_limit")]
    pub daily_limit: i64,

    #[serde(default = "default_offset_hours")]
    pub reference_utc_offset_hours: i32,

    #[serde(default = "default_cache_ttl")]
    pub usage_cache_ttl_secs: u64,

    #[serde(default = "default_timeout")]
    pub analysis_timeout_secs: u64,

    pub admin_api_token: String,

    pub nowpayments_ipn_secret: Option<String>,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

/// Free-tier Gemini keys allow 1500 requests per day.
fn default_daily_limit() -> i64 {
    1500
}

/// US Eastern daylight time. Not adjusted for DST.
fn default_offset_hours() -> i32 {
    -4
}

fn default_cache_ttl() -> u64 {
    30
}

fn default_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., GEMINI_API_KEYS)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(envy::from_env::<Config>()?)
    }

    /// Build the ordered credential list.
    ///
    /// Blank keys are dropped. Keys without a matching label get `Key #n`,
    /// numbered by their position in `GEMINI_API_KEYS`.
    pub fn credentials(&self) -> Result<Vec<Credential>, ConfigError> {
        let credentials: Vec<Credential> = self
            .gemini_api_keys
            .iter()
            .enumerate()
            .filter(|(_, key)| !key.trim().is_empty())
            .map(|(position, key)| {
                let label = self
                    .gemini_key_labels
                    .get(position)
                    .map(|label| label.trim())
                    .filter(|label| !label.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Key #{}", position + 1));
                Credential::new(key.trim(), label)
            })
            .collect();

        if credentials.is_empty() {
            return Err(ConfigError::NoCredentials);
        }

        Ok(credentials)
    }

    /// Quota and cache tunables for the usage tracker.
    pub fn tracker_settings(&self) -> Result<TrackerSettings, ConfigError> {
        let calendar = ReferenceCalendar::from_offset_hours(self.reference_utc_offset_hours)
            .ok_or(ConfigError::InvalidOffset(self.reference_utc_offset_hours))?;

        Ok(TrackerSettings {
            daily_limit: self.daily_limit,
            cache_ttl: Duration::from_secs(self.usage_cache_ttl_secs),
            calendar,
        })
    }

    /// Validated base URL of the analysis API.
    pub fn gemini_base_url(&self) -> Result<Url, ConfigError> {
        Ok(Url::parse(&self.gemini_base_url)?)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs)
    }
}
