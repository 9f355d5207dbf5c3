//! Payout and refund lifecycles.
//!
//! Payouts move `pending -> approved -> completed`, `pending -> rejected`,
//! or `approved -> failed`. A failed payout always carries a compensating
//! refund entry keyed by the payout id, so the user's balance self-heals.

mod payouts;
mod refunds;

pub use payouts::{NewPayout, PayoutWorkflow, ReconcileOutcome};
pub use refunds::{IssueRefund, NewRefund, RefundWorkflow};

/// Notification templates sent by the workflow.
pub mod templates {
    pub const PAYOUT_COMPLETED: &str = "payout.completed";
    pub const PAYOUT_FAILED: &str = "payout.failed";
    pub const PAYOUT_REJECTED: &str = "payout.rejected";
    pub const REFUND_APPROVED: &str = "refund.approved";
    pub const REFUND_REJECTED: &str = "refund.rejected";
}
