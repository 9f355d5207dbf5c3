mod expiry;
mod outbox_replay;
mod rate_limit_reset;
mod reconciliation;

pub use expiry::{ExpiryReminderJob, ExpiryReport};
pub use outbox_replay::OutboxReplayJob;
pub use rate_limit_reset::RateLimitResetJob;
pub use reconciliation::{PayoutReconciliationJob, ReconciliationReport};
