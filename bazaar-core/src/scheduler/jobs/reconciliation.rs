use crate::context::RequestContext;
use crate::scheduler::{Job, JobError};
use crate::workflow::{PayoutWorkflow, ReconcileOutcome};
use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub examined: usize,
    pub completed: usize,
    pub compensated: usize,
    pub still_pending: usize,
    pub deferred: usize,
    pub failed: usize,
}

/// Settles payouts stuck in `approved` against the gateway.
pub struct PayoutReconciliationJob {
    payouts: PayoutWorkflow,
}

impl PayoutReconciliationJob {
    pub fn new(payouts: PayoutWorkflow) -> Self {
        Self { payouts }
    }

    pub async fn run_at(&self, now: OffsetDateTime) -> Result<ReconciliationReport, JobError> {
        let ctx = RequestContext::for_job(self.name());
        let candidates = self.payouts.reconcilable(now).await?;
        let mut report = ReconciliationReport {
            examined: candidates.len(),
            ..Default::default()
        };

        for payout in &candidates {
            match self.payouts.reconcile(payout, now, &ctx).await {
                Ok(ReconcileOutcome::Completed) => report.completed += 1,
                Ok(ReconcileOutcome::Compensated) => report.compensated += 1,
                Ok(ReconcileOutcome::StillPending) => report.still_pending += 1,
                Ok(ReconcileOutcome::Deferred) => report.deferred += 1,
                Err(e) => {
                    error!(payout_id = %payout.id, error = %e, "Payout reconciliation failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            completed = report.completed,
            compensated = report.compensated,
            still_pending = report.still_pending,
            deferred = report.deferred,
            failed = report.failed,
            "Payout reconciliation finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl Job for PayoutReconciliationJob {
    fn name(&self) -> &'static str {
        "payout_reconciliation"
    }

    async fn run(&self) -> Result<(), JobError> {
        let report = self.run_at(OffsetDateTime::now_utc()).await?;
        if report.failed > 0 {
            return Err(JobError::Incomplete {
                failed: report.failed,
                total: report.examined,
            });
        }
        Ok(())
    }
}
