//! Fixed-window rate limiting for money- and listing-mutating operations.
//!
//! The limiter fails open: when the counting store cannot be reached the
//! call is allowed and the decision is flagged as `degraded`. A counter
//! outage must never block a legitimate financial operation.

mod counter;

pub use counter::{CounterError, CounterStore, MemoryCounterStore, PgCounterStore, WindowHit};

use crate::config::{ConfigStore, RateLimitConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    PayoutRequest,
    PayoutReview,
    Refund,
    WalletAdjust,
    ListingMutation,
}

impl OperationType {
    pub const ALL: [OperationType; 5] = [
        OperationType::PayoutRequest,
        OperationType::PayoutReview,
        OperationType::Refund,
        OperationType::WalletAdjust,
        OperationType::ListingMutation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::PayoutRequest => "payout_request",
            OperationType::PayoutReview => "payout_review",
            OperationType::Refund => "refund",
            OperationType::WalletAdjust => "wallet_adjust",
            OperationType::ListingMutation => "listing_mutation",
        }
    }

    fn key_prefix(self) -> String {
        format!("{}:", self.as_str())
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: OffsetDateTime,
    /// The counting store failed and the call was let through unchecked.
    pub degraded: bool,
}

#[derive(Clone)]
pub struct RateLimiter {
    counters: Arc<dyn CounterStore>,
    config: ConfigStore<RateLimitConfig>,
}

impl RateLimiter {
    pub fn new(counters: Arc<dyn CounterStore>, config: ConfigStore<RateLimitConfig>) -> Self {
        Self { counters, config }
    }

    pub async fn check(&self, op: OperationType, identifier: &str) -> RateDecision {
        self.check_at(op, identifier, OffsetDateTime::now_utc()).await
    }

    /// [`check`](Self::check) against an explicit clock.
    pub async fn check_at(
        &self,
        op: OperationType,
        identifier: &str,
        now: OffsetDateTime,
    ) -> RateDecision {
        let Some(policy) = self.config.current().policy(op) else {
            return RateDecision {
                allowed: true,
                remaining: u32::MAX,
                reset_at: now,
                degraded: false,
            };
        };

        let key = format!("{}{identifier}", op.key_prefix());
        match self.counters.hit(&key, policy.window, now).await {
            Ok(hit) => {
                let max = i64::from(policy.max);
                let reset_at = counter::window_end(hit.window_start, policy.window);
                RateDecision {
                    allowed: hit.count <= max,
                    remaining: u32::try_from((max - hit.count).max(0)).unwrap_or(0),
                    reset_at,
                    degraded: false,
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    operation = %op,
                    key,
                    "Rate limit store unavailable, allowing request"
                );
                RateDecision {
                    allowed: true,
                    remaining: policy.max,
                    reset_at: now,
                    degraded: true,
                }
            }
        }
    }

    /// Clear the counters of every daily-scoped policy.
    pub async fn reset_daily(&self) -> Result<u64, CounterError> {
        let config = self.config.current();
        let mut cleared = 0;
        for op in config.daily_operations() {
            let removed = self.counters.clear_prefix(&op.key_prefix()).await?;
            info!(operation = %op, removed, "Daily rate limit counters cleared");
            cleared += removed;
        }
        Ok(cleared)
    }

    /// Drop counters whose window has ended. A lapsed counter would restart
    /// on its next hit anyway, so this only reclaims space.
    pub async fn purge_expired(&self, now: OffsetDateTime) -> Result<u64, CounterError> {
        let removed = self.counters.purge_expired(now).await?;
        if removed > 0 {
            info!(removed, "Expired rate limit counters purged");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitPolicy;
    use std::collections::HashMap;
    use std::time::Duration;
    use time::macros::datetime;

    fn limiter(policy: RateLimitPolicy) -> RateLimiter {
        let config = RateLimitConfig {
            policies: HashMap::from([(OperationType::Refund, policy)]),
        };
        RateLimiter::new(
            Arc::new(MemoryCounterStore::new()),
            ConfigStore::new(config),
        )
    }

    #[tokio::test]
    async fn unconfigured_operations_are_unlimited() {
        let limiter = limiter(RateLimitPolicy::per_window(1, Duration::from_secs(60)));
        for _ in 0..10 {
            assert!(limiter.check(OperationType::WalletAdjust, "a").await.allowed);
        }
    }

    #[tokio::test]
    async fn identifiers_are_counted_separately() {
        let limiter = limiter(RateLimitPolicy::per_window(1, Duration::from_secs(60)));
        let now = datetime!(2026-05-01 10:00 UTC);
        assert!(limiter.check_at(OperationType::Refund, "a", now).await.allowed);
        assert!(!limiter.check_at(OperationType::Refund, "a", now).await.allowed);
        assert!(limiter.check_at(OperationType::Refund, "b", now).await.allowed);
    }

    #[tokio::test]
    async fn reloaded_policy_applies_to_next_check() {
        let config = ConfigStore::new(RateLimitConfig {
            policies: HashMap::from([(
                OperationType::Refund,
                RateLimitPolicy::per_window(1, Duration::from_secs(60)),
            )]),
        });
        let limiter = RateLimiter::new(Arc::new(MemoryCounterStore::new()), config.clone());
        let now = datetime!(2026-05-01 10:00 UTC);
        limiter.check_at(OperationType::Refund, "a", now).await;
        assert!(!limiter.check_at(OperationType::Refund, "a", now).await.allowed);

        config.replace(RateLimitConfig {
            policies: HashMap::from([(
                OperationType::Refund,
                RateLimitPolicy::per_window(10, Duration::from_secs(60)),
            )]),
        });
        assert!(limiter.check_at(OperationType::Refund, "a", now).await.allowed);
    }
}
