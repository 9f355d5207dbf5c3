mod common;

use bazaar_core::config::{ConfigStore, RateLimitConfig, RateLimitPolicy};
use bazaar_core::rate_limit::{MemoryCounterStore, OperationType, RateLimiter};
use common::DownCounterStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use time::macros::datetime;

fn five_per_minute() -> RateLimitConfig {
    RateLimitConfig {
        policies: HashMap::from([(
            OperationType::PayoutReview,
            RateLimitPolicy::per_window(5, Duration::from_secs(60)),
        )]),
    }
}

#[tokio::test]
async fn sixth_call_in_the_window_is_refused() {
    let limiter = RateLimiter::new(
        Arc::new(MemoryCounterStore::new()),
        ConfigStore::new(five_per_minute()),
    );
    let start = datetime!(2026-06-01 09:00:00 UTC);

    for i in 0..5u32 {
        let decision = limiter
            .check_at(OperationType::PayoutReview, "admin-7", start + time::Duration::seconds(i.into()))
            .await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4 - i);
        assert_eq!(decision.reset_at, start + time::Duration::seconds(60));
    }

    let sixth = limiter
        .check_at(OperationType::PayoutReview, "admin-7", start + time::Duration::seconds(59))
        .await;
    assert!(!sixth.allowed);
    assert_eq!(sixth.remaining, 0);
    assert_eq!(sixth.reset_at, start + time::Duration::seconds(60));
    assert!(!sixth.degraded);

    let next_window = limiter
        .check_at(OperationType::PayoutReview, "admin-7", start + time::Duration::seconds(60))
        .await;
    assert!(next_window.allowed);
    assert_eq!(next_window.remaining, 4);
}

#[tokio::test]
async fn counter_outage_fails_open() {
    let limiter = RateLimiter::new(Arc::new(DownCounterStore), ConfigStore::new(five_per_minute()));
    let now = datetime!(2026-06-01 09:00:00 UTC);

    for _ in 0..20 {
        let decision = limiter
            .check_at(OperationType::PayoutReview, "admin-7", now)
            .await;
        assert!(decision.allowed);
        assert!(decision.degraded);
        assert_eq!(decision.remaining, 5);
    }
    assert!(limiter.reset_daily().await.is_err());
}

#[tokio::test]
async fn daily_reset_clears_only_daily_policies() {
    let config = RateLimitConfig {
        policies: HashMap::from([
            (OperationType::PayoutRequest, RateLimitPolicy::per_day(1)),
            (
                OperationType::Refund,
                RateLimitPolicy::per_window(1, Duration::from_secs(3600)),
            ),
        ]),
    };
    let limiter = RateLimiter::new(Arc::new(MemoryCounterStore::new()), ConfigStore::new(config));
    let now = datetime!(2026-06-01 09:00:00 UTC);

    for op in [OperationType::PayoutRequest, OperationType::Refund] {
        assert!(limiter.check_at(op, "user-1", now).await.allowed);
        assert!(!limiter.check_at(op, "user-1", now).await.allowed);
    }

    assert_eq!(limiter.reset_daily().await.unwrap(), 1);
    assert!(limiter.check_at(OperationType::PayoutRequest, "user-1", now).await.allowed);
    assert!(!limiter.check_at(OperationType::Refund, "user-1", now).await.allowed);
}

#[tokio::test]
async fn default_policies_cover_every_guarded_operation() {
    let config = RateLimitConfig::default();
    for op in OperationType::ALL {
        assert!(config.policy(op).is_some(), "{op} has no default policy");
    }
    assert_eq!(
        config.daily_operations().collect::<Vec<_>>(),
        vec![OperationType::PayoutRequest]
    );
}

#[tokio::test]
async fn lapsed_counters_are_purged() {
    let limiter = RateLimiter::new(
        Arc::new(MemoryCounterStore::new()),
        ConfigStore::new(five_per_minute()),
    );
    let start = datetime!(2026-06-01 09:00:00 UTC);
    for identifier in ["admin-1", "admin-2", "admin-3"] {
        limiter
            .check_at(OperationType::PayoutReview, identifier, start)
            .await;
    }
    limiter
        .check_at(OperationType::PayoutReview, "admin-4", start + time::Duration::seconds(30))
        .await;

    let after_first_window = start + time::Duration::seconds(60);
    assert_eq!(limiter.purge_expired(after_first_window).await.unwrap(), 3);

    let still_counting = limiter
        .check_at(OperationType::PayoutReview, "admin-4", after_first_window)
        .await;
    assert_eq!(still_counting.remaining, 3);
}
