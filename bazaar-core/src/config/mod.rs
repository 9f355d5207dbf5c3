//! Validated runtime configuration for the wallet core.
//!
//! These types are what the core consumes. Loading and parsing the TOML file
//! is handled by the server crate, which converts its file representation
//! into the types here.

mod config_store;
mod rate_limit;

pub use config_store::{ConfigStore, ConfigWatcher};
pub use rate_limit::{RateLimitConfig, RateLimitPolicy};

use std::time::Duration;

/// Outbox dispatcher tuning.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Fallback poll interval when no commit wake-up arrives.
    pub poll_interval: Duration,
    /// Maximum events claimed per round.
    pub batch_size: usize,
    /// How long a claim keeps other dispatchers away from an event.
    pub claim_lease: Duration,
    /// Attempts after which an event becomes terminally `failed`.
    pub max_attempts: i32,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            batch_size: 100,
            claim_lease: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

/// Payout workflow and reconciliation tuning.
#[derive(Debug, Clone)]
pub struct PayoutConfig {
    /// Upper bound on every gateway call.
    pub gateway_timeout: Duration,
    /// Approved payouts younger than this are left to the inline call.
    pub reconciliation_grace: Duration,
    /// Approved payouts the gateway still reports as pending after this long
    /// are compensated.
    pub abandon_after: Duration,
    /// Payouts examined per reconciliation run.
    pub reconciliation_batch: i64,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(10),
            reconciliation_grace: Duration::from_secs(15 * 60),
            abandon_after: Duration::from_secs(72 * 60 * 60),
            reconciliation_batch: 500,
        }
    }
}

/// Listing lifecycle settings.
#[derive(Debug, Clone)]
pub struct ListingConfig {
    /// Lifetime granted when a listing is approved.
    pub active_days: u32,
    /// Listings handled per expiry job pass.
    pub batch_size: i64,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            active_days: 30,
            batch_size: 500,
        }
    }
}

/// Periods of the scheduled jobs.
#[derive(Debug, Clone)]
pub struct JobsConfig {
    pub expiry_reminder: Duration,
    pub payout_reconciliation: Duration,
    pub outbox_replay: Duration,
    pub rate_limit_reset: Duration,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            expiry_reminder: Duration::from_secs(60 * 60),
            payout_reconciliation: Duration::from_secs(24 * 60 * 60),
            outbox_replay: Duration::from_secs(5 * 60),
            rate_limit_reset: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Everything the core needs, grouped by component.
#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    pub outbox: OutboxConfig,
    pub payouts: PayoutConfig,
    pub listings: ListingConfig,
    pub jobs: JobsConfig,
    pub rate_limits: RateLimitConfig,
}
