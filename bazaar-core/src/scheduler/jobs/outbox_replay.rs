use crate::outbox::OutboxDispatcher;
use crate::scheduler::{Job, JobError};
use async_trait::async_trait;
use tracing::info;

/// Sweeps the outbox for events the live dispatcher has not delivered,
/// such as ones whose claim lapsed after a crash.
pub struct OutboxReplayJob {
    dispatcher: OutboxDispatcher,
}

impl OutboxReplayJob {
    pub fn new(dispatcher: OutboxDispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl Job for OutboxReplayJob {
    fn name(&self) -> &'static str {
        "outbox_replay"
    }

    async fn run(&self) -> Result<(), JobError> {
        let report = self.dispatcher.dispatch_all().await?;
        info!(
            claimed = report.claimed,
            delivered = report.delivered,
            retrying = report.retrying,
            escalated = report.escalated,
            "Outbox replay finished"
        );
        Ok(())
    }
}
