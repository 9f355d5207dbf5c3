//! Fixed-window counting stores.

use async_trait::async_trait;
use dashmap::DashMap;
use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

/// Counter state right after a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    /// Hits in the current window, including this one.
    pub count: i64,
    pub window_start: OffsetDateTime,
}

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("counter database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

/// Atomic increment primitive behind the rate limiter.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count one hit on `key`. The first hit of a window, or the first hit
    /// after the window lapsed, starts a new window at `now`.
    async fn hit(
        &self,
        key: &str,
        window: Duration,
        now: OffsetDateTime,
    ) -> Result<WindowHit, CounterError>;

    /// Drop every counter whose key starts with `prefix`. Returns how many.
    async fn clear_prefix(&self, prefix: &str) -> Result<u64, CounterError>;

    /// Drop every counter whose window ended at or before `now`. Returns how
    /// many.
    async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, CounterError>;
}

pub(crate) fn window_end(start: OffsetDateTime, window: Duration) -> OffsetDateTime {
    start.saturating_add(time::Duration::try_from(window).unwrap_or(time::Duration::MAX))
}

#[derive(Debug, Clone, Copy)]
struct MemoryCounter {
    count: i64,
    window_start: OffsetDateTime,
    expires_at: OffsetDateTime,
}

/// Per-process counters.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, MemoryCounter>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn hit(
        &self,
        key: &str,
        window: Duration,
        now: OffsetDateTime,
    ) -> Result<WindowHit, CounterError> {
        let fresh = MemoryCounter {
            count: 1,
            window_start: now,
            expires_at: window_end(now, window),
        };
        let counter = *self
            .counters
            .entry(key.to_string())
            .and_modify(|counter| {
                if now >= counter.expires_at {
                    *counter = fresh;
                } else {
                    counter.count = counter.count.saturating_add(1);
                }
            })
            .or_insert(fresh);
        Ok(WindowHit {
            count: counter.count,
            window_start: counter.window_start,
        })
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<u64, CounterError> {
        let mut removed = 0;
        self.counters.retain(|key, _| {
            let keep = !key.starts_with(prefix);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, CounterError> {
        let before = self.counters.len();
        self.counters.retain(|_, counter| counter.expires_at > now);
        Ok((before.saturating_sub(self.counters.len())) as u64)
    }
}

/// Counters in the `rate_limit_counters` table, shared by every process.
#[derive(Debug, Clone)]
pub struct PgCounterStore {
    pool: PgPool,
}

impl PgCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    #[tracing::instrument(skip_all, err, name = "SQL:HitRateLimitCounter")]
    async fn hit(
        &self,
        key: &str,
        window: Duration,
        now: OffsetDateTime,
    ) -> Result<WindowHit, CounterError> {
        let (count, window_start) = sqlx::query_as::<_, (i64, OffsetDateTime)>(
            r#"
            INSERT INTO rate_limit_counters (key, count, window_start, expires_at)
            VALUES ($1, 1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET
                count = CASE WHEN rate_limit_counters.expires_at <= $2
                             THEN 1 ELSE rate_limit_counters.count + 1 END,
                window_start = CASE WHEN rate_limit_counters.expires_at <= $2
                                    THEN $2 ELSE rate_limit_counters.window_start END,
                expires_at = CASE WHEN rate_limit_counters.expires_at <= $2
                                  THEN $3 ELSE rate_limit_counters.expires_at END
            RETURNING count, window_start
            "#,
        )
        .bind(key)
        .bind(now)
        .bind(window_end(now, window))
        .fetch_one(&self.pool)
        .await?;
        Ok(WindowHit {
            count,
            window_start,
        })
    }

    #[tracing::instrument(skip_all, err, name = "SQL:ClearRateLimitCounters")]
    async fn clear_prefix(&self, prefix: &str) -> Result<u64, CounterError> {
        let result = sqlx::query("DELETE FROM rate_limit_counters WHERE starts_with(key, $1)")
            .bind(prefix)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:PurgeExpiredRateLimitCounters")]
    async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, CounterError> {
        let result = sqlx::query("DELETE FROM rate_limit_counters WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[tokio::test]
    async fn window_resets_after_it_lapses() {
        let store = MemoryCounterStore::new();
        let start = datetime!(2026-05-01 10:00 UTC);
        let window = Duration::from_secs(60);

        assert_eq!(store.hit("k", window, start).await.unwrap().count, 1);
        let hit = store
            .hit("k", window, start + time::Duration::seconds(59))
            .await
            .unwrap();
        assert_eq!(hit.count, 2);
        assert_eq!(hit.window_start, start);

        let later = start + time::Duration::seconds(60);
        let hit = store.hit("k", window, later).await.unwrap();
        assert_eq!(hit.count, 1);
        assert_eq!(hit.window_start, later);
    }

    #[tokio::test]
    async fn clear_prefix_only_touches_matching_keys() {
        let store = MemoryCounterStore::new();
        let now = datetime!(2026-05-01 10:00 UTC);
        let window = Duration::from_secs(60);
        store.hit("payout_request:u1", window, now).await.unwrap();
        store.hit("payout_request:u2", window, now).await.unwrap();
        store.hit("refund:u1", window, now).await.unwrap();

        assert_eq!(store.clear_prefix("payout_request:").await.unwrap(), 2);
        assert_eq!(store.hit("refund:u1", window, now).await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn purge_drops_only_lapsed_windows() {
        let store = MemoryCounterStore::new();
        let now = datetime!(2026-05-01 10:00 UTC);
        store.hit("refund:u1", Duration::from_secs(60), now).await.unwrap();
        store.hit("refund:u2", Duration::from_secs(3600), now).await.unwrap();

        let later = now + time::Duration::seconds(60);
        assert_eq!(store.purge_expired(later).await.unwrap(), 1);
        assert_eq!(store.purge_expired(later).await.unwrap(), 0);

        let hit = store.hit("refund:u2", Duration::from_secs(3600), later).await.unwrap();
        assert_eq!(hit.count, 2);
        assert_eq!(hit.window_start, now);
    }
}
