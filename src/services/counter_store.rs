//! Durable usage counters.
//!
//! The usage tracker only needs three operations from its backing store:
//! an atomic increment keyed by `(credential, day)`, a bulk read of today's
//! counters, and a bulk delete of past days.
//!
//! # Atomicity Guarantees
//!
//! `increment` must never lose an update under concurrent callers. The
//! Postgres store gets this from a single `INSERT ... ON CONFLICT DO UPDATE`
//! statement; the in-memory store from a mutex held for the whole update.

use std::collections::HashMap;
use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::{
    db::DbPool,
    error::StoreError,
    models::usage::{UsageRecord, usage_key},
};

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically add `amount` to the counter for `(credential_id, day)`,
    /// creating it if needed.
    async fn increment(
        &self,
        credential_id: &str,
        label: &str,
        day: NaiveDate,
        amount: i64,
    ) -> Result<(), StoreError>;

    /// All counters for `day` or later.
    async fn read_counters_since(&self, day: NaiveDate) -> Result<Vec<UsageRecord>, StoreError>;

    /// Remove counters strictly before `day`. Returns the number removed.
    async fn delete_counters_before(&self, day: NaiveDate) -> Result<u64, StoreError>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Counter store backed by the `api_key_usage` table.
#[derive(Debug, Clone)]
pub struct PgCounterStore {
    pool: DbPool,
}

impl PgCounterStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn increment(
        &self,
        credential_id: &str,
        label: &str,
        day: NaiveDate,
        amount: i64,
    ) -> Result<(), StoreError> {
        // Single statement upsert; the row lock taken by ON CONFLICT serializes
        // concurrent increments of the same key
        sqlx::query(
            r#"
            INSERT INTO api_key_usage (usage_key, credential_id, label, usage_count, last_used_at, day)
            VALUES ($1, $2, $3, $4, NOW(), $5)
            ON CONFLICT (usage_key) DO UPDATE
            SET usage_count = api_key_usage.usage_count + EXCLUDED.usage_count,
                label = EXCLUDED.label,
                last_used_at = NOW()
            "#,
        )
        .bind(usage_key(credential_id, day))
        .bind(credential_id)
        .bind(label)
        .bind(amount)
        .bind(day)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn read_counters_since(&self, day: NaiveDate) -> Result<Vec<UsageRecord>, StoreError> {
        let records = sqlx::query_as::<_, UsageRecord>(
            r#"
            SELECT credential_id, label, usage_count, last_used_at, day
            FROM api_key_usage
            WHERE day >= $1
            ORDER BY day DESC
            "#,
        )
        .bind(day)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn delete_counters_before(&self, day: NaiveDate) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM api_key_usage WHERE day < $1")
            .bind(day)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Process-local counter store.
///
/// Used when no database is configured (counters then reset on restart) and
/// as the store in tests. It can be switched offline to simulate an
/// unreachable backend.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    records: Mutex<HashMap<String, UsageRecord>>,
    offline: AtomicBool,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Offline`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Offline);
        }
        Ok(())
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, UsageRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(
        &self,
        credential_id: &str,
        label: &str,
        day: NaiveDate,
        amount: i64,
    ) -> Result<(), StoreError> {
        self.check_online()?;

        let mut records = self.records();
        let record = records
            .entry(usage_key(credential_id, day))
            .or_insert_with(|| UsageRecord {
                credential_id: credential_id.to_string(),
                label: label.to_string(),
                usage_count: 0,
                last_used_at: Utc::now(),
                day,
            });
        record.usage_count += amount;
        record.label = label.to_string();
        record.last_used_at = Utc::now();

        Ok(())
    }

    async fn read_counters_since(&self, day: NaiveDate) -> Result<Vec<UsageRecord>, StoreError> {
        self.check_online()?;

        let mut records: Vec<UsageRecord> = self
            .records()
            .values()
            .filter(|record| record.day >= day)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.day.cmp(&a.day));

        Ok(records)
    }

    async fn delete_counters_before(&self, day: NaiveDate) -> Result<u64, StoreError> {
        self.check_online()?;

        let mut records = self.records();
        let before = records.len();
        records.retain(|_, record| record.day >= day);

        Ok((before - records.len()) as u64)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_online()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[tokio::test]
    async fn increments_accumulate_per_credential_and_day() {
        let store = InMemoryCounterStore::new();
        store.increment("a", "A", day(1), 1).await.unwrap();
        store.increment("a", "A", day(1), 2).await.unwrap();
        store.increment("a", "A", day(2), 1).await.unwrap();
        store.increment("b", "B", day(2), 1).await.unwrap();

        let today = store.read_counters_since(day(2)).await.unwrap();
        assert_eq!(today.len(), 2);
        assert!(today.iter().all(|r| r.usage_count == 1));

        let all = store.read_counters_since(day(1)).await.unwrap();
        let yesterday = all.iter().find(|r| r.day == day(1)).unwrap();
        assert_eq!(yesterday.usage_count, 3);
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let store = Arc::new(InMemoryCounterStore::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.increment("a", "A", day(1), 1).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let records = store.read_counters_since(day(1)).await.unwrap();
        assert_eq!(records[0].usage_count, 50);
    }

    #[tokio::test]
    async fn delete_keeps_the_boundary_day() {
        let store = InMemoryCounterStore::new();
        store.increment("a", "A", day(1), 1).await.unwrap();
        store.increment("a", "A", day(2), 1).await.unwrap();

        let removed = store.delete_counters_before(day(2)).await.unwrap();
        assert_eq!(removed, 1);

        let remaining = store.read_counters_since(day(1)).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].day, day(2));
    }

    #[tokio::test]
    async fn offline_store_rejects_everything() {
        let store = InMemoryCounterStore::new();
        store.set_offline(true);

        assert!(matches!(
            store.increment("a", "A", day(1), 1).await,
            Err(StoreError::Offline)
        ));
        assert!(store.read_counters_since(day(1)).await.is_err());
        assert!(store.delete_counters_before(day(1)).await.is_err());
        assert!(store.ping().await.is_err());

        store.set_offline(false);
        assert!(store.ping().await.is_ok());
    }
}
