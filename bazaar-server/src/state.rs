//! Application state shared across all request handlers.

use bazaar_core::config::{ConfigStore, RateLimitConfig};
use bazaar_core::ledger::LedgerEngine;
use bazaar_core::moderation::Moderation;
use bazaar_core::rate_limit::RateLimiter;
use bazaar_core::scheduler::SchedulerHandle;
use bazaar_core::transport::BroadcastHub;
use bazaar_core::workflow::{PayoutWorkflow, RefundWorkflow};
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub ledger: LedgerEngine,
    pub payouts: PayoutWorkflow,
    pub refunds: RefundWorkflow,
    pub moderation: Moderation,
    pub limiter: RateLimiter,
    /// Rate-limit policies, replaced on SIGHUP.
    pub rate_limits: ConfigStore<RateLimitConfig>,
    /// Live fan-out the outbox dispatcher publishes into.
    pub hub: Arc<BroadcastHub>,
    pub jobs: SchedulerHandle,
}
