use crate::rate_limit::OperationType;
use std::collections::HashMap;
use std::time::Duration;

/// Fixed-window policy for one operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Calls allowed per window.
    pub max: u32,
    pub window: Duration,
    /// Cleared by the daily reset job in addition to natural window expiry.
    pub daily: bool,
}

impl RateLimitPolicy {
    pub const fn per_window(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            daily: false,
        }
    }

    pub const fn per_day(max: u32) -> Self {
        Self {
            max,
            window: Duration::from_secs(24 * 60 * 60),
            daily: true,
        }
    }
}

/// Policies keyed by operation type. Operations without a policy are not limited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub policies: HashMap<OperationType, RateLimitPolicy>,
}

impl RateLimitConfig {
    pub fn policy(&self, op: OperationType) -> Option<RateLimitPolicy> {
        self.policies.get(&op).copied()
    }

    pub fn daily_operations(&self) -> impl Iterator<Item = OperationType> + '_ {
        self.policies
            .iter()
            .filter(|(_, policy)| policy.daily)
            .map(|(op, _)| *op)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let minute = Duration::from_secs(60);
        let policies = HashMap::from([
            (OperationType::PayoutRequest, RateLimitPolicy::per_day(5)),
            (OperationType::PayoutReview, RateLimitPolicy::per_window(60, minute)),
            (OperationType::Refund, RateLimitPolicy::per_window(10, minute)),
            (OperationType::WalletAdjust, RateLimitPolicy::per_window(20, minute)),
            (OperationType::ListingMutation, RateLimitPolicy::per_window(30, minute)),
        ]);
        Self { policies }
    }
}
