//! Shared fixtures for service tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::{
    models::credential::Credential,
    services::{
        calendar::ReferenceCalendar,
        clock::ManualClock,
        counter_store::{CounterStore, InMemoryCounterStore},
        usage_tracker::{TrackerSettings, UsageTracker},
    },
};

/// 08:00 in the UTC-4 reference timezone, well clear of midnight.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
}

pub fn credentials(n: usize) -> Vec<Credential> {
    (0..n)
        .map(|i| Credential::new(format!("secret-{i}"), format!("Key {i}")))
        .collect()
}

pub struct TestHarness {
    pub tracker: Arc<UsageTracker>,
    pub store: Arc<InMemoryCounterStore>,
    pub clock: Arc<ManualClock>,
}

impl TestHarness {
    pub fn new(daily_limit: i64) -> Self {
        let store = Arc::new(InMemoryCounterStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let settings = TrackerSettings {
            daily_limit,
            cache_ttl: Duration::from_secs(30),
            calendar: ReferenceCalendar::from_offset_hours(-4).unwrap(),
        };
        let tracker = Arc::new(UsageTracker::new(store.clone(), clock.clone(), settings));

        Self {
            tracker,
            store,
            clock,
        }
    }

    pub fn register(&self, credentials: &[Credential]) {
        for credential in credentials {
            self.tracker
                .register_credential(&credential.id, &credential.label);
        }
    }

    /// Write usage straight to the store, as another process would.
    pub async fn seed(&self, credential: &Credential, count: i64) {
        self.store
            .increment(
                &credential.id,
                &credential.label,
                self.tracker.reference_day(),
                count,
            )
            .await
            .unwrap();
    }

    /// Every stored counter, any day.
    pub async fn store_counts(&self) -> Vec<(String, i64)> {
        self.store
            .read_counters_since(NaiveDate::MIN)
            .await
            .unwrap()
            .into_iter()
            .map(|record| (record.credential_id, record.usage_count))
            .collect()
    }
}
