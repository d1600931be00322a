//! Per-credential daily usage tracking.
//!
//! The tracker keeps a cache of today's usage counts, refreshed from the
//! counter store whenever it is older than the configured staleness bound or
//! belongs to a previous reference day. Writes go straight to the store's
//! atomic increment and are mirrored into the cache optimistically.
//!
//! # Failure Handling
//!
//! Store failures are logged and otherwise ignored: a failed refresh keeps
//! the last known cache, a failed cleanup is retried at the next rollover,
//! and a failed increment is reported to the caller as `false`.
//!
//! # Concurrency
//!
//! Locks are never held across an `.await`. A quota check followed by an
//! increment is therefore not atomic; two requests may both pass the check
//! and push a key one or two calls past its limit. The store's increment is
//! atomic, so the counts themselves stay exact.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    models::usage::{CachedUsage, UsageSnapshot},
    services::{calendar::ReferenceCalendar, clock::Clock, counter_store::CounterStore},
};

const UNKNOWN_LABEL: &str = "Unknown Key";

/// Quota and cache tunables.
#[derive(Debug, Clone, Copy)]
pub struct TrackerSettings {
    /// Maximum successful calls per credential per reference day
    pub daily_limit: i64,

    /// Cache entries older than this are re-read from the store
    pub cache_ttl: Duration,

    pub calendar: ReferenceCalendar,
}

#[derive(Debug)]
struct UsageCache {
    entries: HashMap<String, CachedUsage>,
    /// `None` means never fetched (or invalidated by a rollover)
    last_fetched_at: Option<DateTime<Utc>>,
    /// Reference day the entries belong to
    day: NaiveDate,
}

pub struct UsageTracker {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    settings: TrackerSettings,
    /// Registered (id, label) pairs in registration order
    labels: Mutex<Vec<(String, String)>>,
    cache: Mutex<UsageCache>,
}

impl UsageTracker {
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        settings: TrackerSettings,
    ) -> Self {
        let day = settings.calendar.current_reference_day(clock.now());
        Self {
            store,
            clock,
            settings,
            labels: Mutex::new(Vec::new()),
            cache: Mutex::new(UsageCache {
                entries: HashMap::new(),
                last_fetched_at: None,
                day,
            }),
        }
    }

    pub fn daily_limit(&self) -> i64 {
        self.settings.daily_limit
    }

    /// Whether `used` calls put a credential at or over its daily quota.
    pub fn is_over_quota(&self, used: i64) -> bool {
        used >= self.settings.daily_limit
    }

    pub fn reference_day(&self) -> NaiveDate {
        self.settings.calendar.current_reference_day(self.clock.now())
    }

    /// When the next day rollover is due.
    pub fn next_rollover_at(&self) -> DateTime<Utc> {
        self.settings.calendar.next_midnight_after(self.clock.now())
    }

    /// Associate a display label with a credential id. Re-registering
    /// replaces the label; usage counts are untouched.
    pub fn register_credential(&self, id: &str, label: &str) {
        let mut labels = self.labels();
        match labels.iter_mut().find(|(known, _)| known == id) {
            Some((_, existing)) => *existing = label.to_string(),
            None => labels.push((id.to_string(), label.to_string())),
        }
    }

    /// Persist one successful call for `id` on the current reference day.
    ///
    /// Returns `false` when the store write failed; the cache is left alone
    /// in that case.
    pub async fn record_usage(&self, id: &str) -> bool {
        let today = self.reference_day();
        let label = self.label_for(id);

        match self.store.increment(id, &label, today, 1).await {
            Ok(()) => {
                let mut cache = self.cache();
                // A cache from a previous day is rebuilt on the next read anyway
                if cache.day == today {
                    let entry = cache
                        .entries
                        .entry(id.to_string())
                        .or_insert_with(|| CachedUsage {
                            used: 0,
                            label: label.clone(),
                        });
                    entry.used += 1;
                    entry.label = label;
                }
                true
            }
            Err(err) => {
                tracing::warn!(
                    credential = %label,
                    day = %today,
                    error = %err,
                    "Failed to record API key usage"
                );
                false
            }
        }
    }

    /// Cached usage for `id`, refreshed first if the cache is stale.
    pub async fn check_and_maybe_refresh(&self, id: &str) -> i64 {
        if self.is_stale() {
            self.refresh().await;
        }

        self.cache().entries.get(id).map_or(0, |entry| entry.used)
    }

    /// Usage for every known credential: registered ones first, in
    /// registration order, then any others the store reported, by id.
    pub async fn snapshot_all(&self) -> Vec<UsageSnapshot> {
        if self.is_stale() {
            self.refresh().await;
        }

        let labels = self.labels().clone();
        let cache = self.cache();
        let limit = self.settings.daily_limit;

        let mut snapshots: Vec<UsageSnapshot> = labels
            .iter()
            .map(|(id, label)| {
                let used = cache.entries.get(id).map_or(0, |entry| entry.used);
                UsageSnapshot {
                    id: id.clone(),
                    label: label.clone(),
                    used,
                    remaining: limit - used,
                }
            })
            .collect();

        let mut unregistered: Vec<(&String, &CachedUsage)> = cache
            .entries
            .iter()
            .filter(|(id, _)| !labels.iter().any(|(known, _)| known == *id))
            .collect();
        unregistered.sort_by(|a, b| a.0.cmp(b.0));

        snapshots.extend(unregistered.into_iter().map(|(id, entry)| UsageSnapshot {
            id: id.clone(),
            label: entry.label.clone(),
            used: entry.used,
            remaining: limit - entry.used,
        }));

        snapshots
    }

    /// Rebuild the cache from the store.
    ///
    /// Rolls the day over first if the reference day changed since the last
    /// refresh. On a read failure the previous cache is kept.
    pub async fn refresh(&self) {
        let now = self.clock.now();
        let today = self.settings.calendar.current_reference_day(now);
        let cached_day = self.cache().day;

        if cached_day != today {
            self.roll_over().await;
        }

        let records = match self.store.read_counters_since(today).await {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to refresh API key usage stats");
                return;
            }
        };

        let labels = self.labels().clone();
        let mut entries: HashMap<String, CachedUsage> = labels
            .iter()
            .map(|(id, label)| {
                (
                    id.clone(),
                    CachedUsage {
                        used: 0,
                        label: label.clone(),
                    },
                )
            })
            .collect();

        for record in records.into_iter().filter(|record| record.day == today) {
            let label = labels
                .iter()
                .find(|(id, _)| *id == record.credential_id)
                .map(|(_, label)| label.clone())
                .unwrap_or(record.label);
            entries.insert(
                record.credential_id,
                CachedUsage {
                    used: record.usage_count.max(0),
                    label,
                },
            );
        }

        let mut cache = self.cache();
        cache.entries = entries;
        cache.last_fetched_at = Some(now);
        cache.day = today;

        tracing::debug!(day = %today, credentials = cache.entries.len(), "API key usage refreshed");
    }

    /// Day rollover: drop past-day counters from the store and invalidate
    /// the cache.
    pub async fn roll_over(&self) {
        let today = self.reference_day();

        match self.store.delete_counters_before(today).await {
            Ok(removed) => {
                tracing::info!(day = %today, removed, "Cleaned up old API key usage data");
            }
            Err(err) => {
                tracing::warn!(
                    day = %today,
                    error = %err,
                    "API key usage cleanup failed, retrying at next rollover"
                );
            }
        }

        let mut cache = self.cache();
        cache.entries.clear();
        cache.last_fetched_at = None;
        cache.day = today;
    }

    fn is_stale(&self) -> bool {
        let now = self.clock.now();
        let today = self.settings.calendar.current_reference_day(now);
        let cache = self.cache();

        if cache.day != today {
            return true;
        }

        match cache.last_fetched_at {
            None => true,
            // A clock that stepped backwards leaves the cache fresh
            Some(fetched) => (now - fetched)
                .to_std()
                .is_ok_and(|elapsed| elapsed > self.settings.cache_ttl),
        }
    }

    fn label_for(&self, id: &str) -> String {
        if let Some((_, label)) = self.labels().iter().find(|(known, _)| known == id) {
            return label.clone();
        }

        self.cache()
            .entries
            .get(id)
            .map(|entry| entry.label.clone())
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
    }

    fn labels(&self) -> MutexGuard<'_, Vec<(String, String)>> {
        self.labels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache(&self) -> MutexGuard<'_, UsageCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::services::test_support::{TestHarness, credentials};

    #[tokio::test]
    async fn three_keys_with_limit_two_scenario() {
        let harness = TestHarness::new(2);
        let creds = credentials(3);
        harness.register(&creds);

        assert!(harness.tracker.record_usage(&creds[0].id).await);
        assert!(harness.tracker.record_usage(&creds[0].id).await);
        assert!(harness.tracker.record_usage(&creds[1].id).await);

        let snapshot = harness.tracker.snapshot_all().await;
        let summary: Vec<(&str, i64, i64)> = snapshot
            .iter()
            .map(|s| (s.label.as_str(), s.used, s.remaining))
            .collect();
        assert_eq!(
            summary,
            vec![("Key 0", 2, 0), ("Key 1", 1, 1), ("Key 2", 0, 2)]
        );
    }

    #[tokio::test]
    async fn usage_above_the_limit_reports_negative_remaining() {
        let harness = TestHarness::new(2);
        let creds = credentials(2);
        harness.register(&creds);
        harness.seed(&creds[0], 2).await;
        harness.seed(&creds[1], 3).await;

        let snapshot = harness.tracker.snapshot_all().await;
        assert_eq!(snapshot[0].remaining, 0);
        assert_eq!(snapshot[1].remaining, -1);

        let used = harness.tracker.check_and_maybe_refresh(&creds[1].id).await;
        assert_eq!(used, 3);
        assert!(harness.tracker.is_over_quota(used));
        assert!(harness.tracker.is_over_quota(2));
        assert!(!harness.tracker.is_over_quota(1));
    }

    #[tokio::test]
    async fn cache_converges_with_store_after_forced_refresh() {
        let harness = TestHarness::new(1500);
        let creds = credentials(3);
        harness.register(&creds);

        // Interleave tracker writes with writes from another process
        for i in 0..17 {
            let cred = &creds[(i * 7) % 3];
            assert!(harness.tracker.record_usage(&cred.id).await);
            if i % 4 == 0 {
                harness.seed(&creds[i % 3], 1).await;
            }
        }

        harness.tracker.refresh().await;

        let cached: i64 = harness
            .tracker
            .snapshot_all()
            .await
            .iter()
            .map(|s| s.used)
            .sum();
        let stored: i64 = harness
            .store_counts()
            .await
            .iter()
            .map(|(_, count)| count)
            .sum();
        assert_eq!(cached, stored);
        assert_eq!(stored, 17 + 5);
    }

    #[tokio::test]
    async fn cache_is_served_until_the_staleness_bound() {
        let harness = TestHarness::new(1500);
        let creds = credentials(1);
        harness.register(&creds);

        assert_eq!(harness.tracker.check_and_maybe_refresh(&creds[0].id).await, 0);

        // Another process uses the key
        harness.seed(&creds[0], 5).await;
        harness.clock.advance(ChronoDuration::seconds(20));
        assert_eq!(harness.tracker.check_and_maybe_refresh(&creds[0].id).await, 0);

        harness.clock.advance(ChronoDuration::seconds(11));
        assert_eq!(harness.tracker.check_and_maybe_refresh(&creds[0].id).await, 5);
    }

    #[tokio::test]
    async fn crossing_reference_midnight_resets_usage_and_cleans_the_store() {
        let harness = TestHarness::new(2);
        let creds = credentials(2);
        harness.register(&creds);
        let day_d = harness.tracker.reference_day();

        harness.tracker.record_usage(&creds[0].id).await;
        harness.tracker.record_usage(&creds[1].id).await;
        assert_eq!(harness.tracker.snapshot_all().await[0].used, 1);

        harness.clock.set(harness.tracker.next_rollover_at() + ChronoDuration::seconds(1));

        let snapshot = harness.tracker.snapshot_all().await;
        assert!(snapshot.iter().all(|s| s.used == 0 && s.remaining == 2));
        assert_ne!(harness.tracker.reference_day(), day_d);

        let leftover = harness.store.read_counters_since(day_d).await.unwrap();
        assert!(leftover.is_empty());
    }

    #[tokio::test]
    async fn midnight_invalidates_even_a_fresh_cache() {
        let harness = TestHarness::new(1500);
        let creds = credentials(1);
        harness.register(&creds);
        harness.clock.set(harness.tracker.next_rollover_at() - ChronoDuration::seconds(5));

        harness.tracker.record_usage(&creds[0].id).await;
        assert_eq!(harness.tracker.check_and_maybe_refresh(&creds[0].id).await, 1);

        harness.clock.advance(ChronoDuration::seconds(10));
        assert_eq!(harness.tracker.check_and_maybe_refresh(&creds[0].id).await, 0);
    }

    #[tokio::test]
    async fn failed_write_returns_false_and_leaves_cache_alone() {
        let harness = TestHarness::new(1500);
        let creds = credentials(1);
        harness.register(&creds);
        harness.tracker.refresh().await;

        harness.store.set_offline(true);
        assert!(!harness.tracker.record_usage(&creds[0].id).await);
        harness.store.set_offline(false);

        assert_eq!(harness.tracker.check_and_maybe_refresh(&creds[0].id).await, 0);
        assert!(harness.store_counts().await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_store_keeps_last_known_cache() {
        let harness = TestHarness::new(1500);
        let creds = credentials(1);
        harness.register(&creds);
        harness.tracker.record_usage(&creds[0].id).await;
        harness.tracker.record_usage(&creds[0].id).await;
        harness.tracker.refresh().await;

        harness.store.set_offline(true);
        harness.clock.advance(ChronoDuration::seconds(60));

        assert_eq!(harness.tracker.check_and_maybe_refresh(&creds[0].id).await, 2);
        assert_eq!(harness.tracker.snapshot_all().await[0].used, 2);
    }

    #[tokio::test]
    async fn failed_cleanup_still_clears_the_cache() {
        let harness = TestHarness::new(1500);
        let creds = credentials(1);
        harness.register(&creds);
        harness.tracker.record_usage(&creds[0].id).await;
        harness.tracker.refresh().await;

        harness.clock.set(harness.tracker.next_rollover_at());
        harness.store.set_offline(true);
        harness.tracker.roll_over().await;
        harness.store.set_offline(false);

        // Yesterday's row survived, today's cache starts empty
        assert_eq!(harness.store_counts().await.len(), 1);
        assert_eq!(harness.tracker.check_and_maybe_refresh(&creds[0].id).await, 0);
    }

    #[tokio::test]
    async fn registration_is_idempotent_and_relabels() {
        let harness = TestHarness::new(10);
        let creds = credentials(1);
        harness.tracker.register_credential(&creds[0].id, "First");
        harness.tracker.register_credential(&creds[0].id, "Second");
        harness.tracker.record_usage(&creds[0].id).await;

        let snapshot = harness.tracker.snapshot_all().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].label, "Second");
        assert_eq!(snapshot[0].used, 1);
    }

    #[tokio::test]
    async fn unregistered_keys_from_the_store_are_listed_after_registered_ones() {
        let harness = TestHarness::new(10);
        let creds = credentials(2);
        harness.tracker.register_credential(&creds[1].id, &creds[1].label);
        harness.seed(&creds[0], 4).await;

        let snapshot = harness.tracker.snapshot_all().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, creds[1].id);
        assert_eq!(snapshot[1].id, creds[0].id);
        assert_eq!(snapshot[1].label, creds[0].label);
        assert_eq!(snapshot[1].remaining, 6);
    }
}
