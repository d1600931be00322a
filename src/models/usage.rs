//! Usage counter models.
//!
//! This module defines:
//! - `UsageRecord`: Durable per-credential, per-reference-day counter row
//! - `CachedUsage`: In-memory cache entry held by the usage tracker
//! - `UsageSnapshot`: Admin-facing usage line for one credential

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Durable usage counter for one credential on one reference day.
///
/// # Database Table
///
/// Maps to the `api_key_usage` table. The primary key is
/// `<credential_id>_<YYYY-MM-DD>` (see [`usage_key`]).
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct UsageRecord {
    pub credential_id: String,

    pub label: String,

    /// Successful calls on `day`
    ///
    /// Must be >= 0 (enforced by database CHECK constraint).
    pub usage_count: i64,

    pub last_used_at: DateTime<Utc>,

    /// Calendar day in the reference timezone
    pub day: NaiveDate,
}

/// Build the store key for a credential's counter on a given day.
pub fn usage_key(credential_id: &str, day: NaiveDate) -> String {
    format!("{}_{}", credential_id, day.format("%Y-%m-%d"))
}

/// Cached usage for one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedUsage {
    pub used: i64,
    pub label: String,
}

/// Usage line returned by the admin endpoint.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "3f2a9c1d0b7e4a55",
///   "label": "Primary",
///   "used": 1498,
///   "remaining": 2
/// }
/// ```
///
/// `remaining` goes negative when the store reports more calls than the limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub id: String,
    pub label: String,
    pub used: i64,
    pub remaining: i64,
}

/// Admin usage response.
#[derive(Debug, Serialize)]
pub struct UsageReport {
    pub daily_limit: i64,
    pub reference_day: NaiveDate,
    pub credentials: Vec<UsageSnapshot>,
}
