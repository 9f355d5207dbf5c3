use crate::context::RequestContext;
use crate::entities::{Listing, ReminderWindow};
use crate::moderation::Moderation;
use crate::notify::{NotificationJob, NotificationSender};
use crate::scheduler::{Job, JobError};
use crate::store::Store;
use async_trait::async_trait;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryReport {
    pub reminders_sent: usize,
    pub expired: usize,
    pub failed: usize,
}

/// Sends the T-72h and T-1h expiry reminders and expires past-due listings.
///
/// A reminder's flag is set only after its notification is enqueued, so a
/// crash in between re-sends rather than drops it.
pub struct ExpiryReminderJob {
    store: Arc<dyn Store>,
    moderation: Moderation,
    notifier: Arc<dyn NotificationSender>,
    batch_size: i64,
}

impl ExpiryReminderJob {
    pub fn new(
        store: Arc<dyn Store>,
        moderation: Moderation,
        notifier: Arc<dyn NotificationSender>,
        batch_size: i64,
    ) -> Self {
        Self {
            store,
            moderation,
            notifier,
            batch_size,
        }
    }

    pub async fn run_at(&self, now: OffsetDateTime) -> Result<ExpiryReport, JobError> {
        let ctx = RequestContext::for_job(self.name());
        let mut report = ExpiryReport::default();

        for window in ReminderWindow::ALL {
            let listings = self
                .store
                .listings_needing_reminder(window, now, self.batch_size)
                .await?;
            for listing in listings {
                match self.remind(&listing, window, now, &ctx).await {
                    Ok(true) => report.reminders_sent += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(listing_id = %listing.id, ?window, error = %e, "Expiry reminder failed");
                        report.failed += 1;
                    }
                }
            }
        }

        let past_due = self.store.listings_past_due(now, self.batch_size).await?;
        for listing_id in past_due {
            match self.moderation.expire_listing(listing_id, now, &ctx).await {
                Ok(Some(_)) => report.expired += 1,
                Ok(None) => {}
                Err(e) => {
                    error!(%listing_id, error = %e, "Failed to expire listing");
                    report.failed += 1;
                }
            }
        }

        info!(
            reminders_sent = report.reminders_sent,
            expired = report.expired,
            failed = report.failed,
            "Expiry pass finished"
        );
        Ok(report)
    }

    async fn remind(
        &self,
        listing: &Listing,
        window: ReminderWindow,
        now: OffsetDateTime,
        ctx: &RequestContext,
    ) -> Result<bool, JobError> {
        // The 3-day reminder is redundant once the 1-hour one is due.
        let superseded = window == ReminderWindow::ThreeDays
            && listing.needs_reminder(ReminderWindow::OneHour, now);
        if !superseded {
            let job = NotificationJob::push(
                listing.seller_id,
                window.template_key(),
                serde_json::json!({
                    "listing_id": listing.id,
                    "title": listing.title,
                    "expires_at": listing.expires_at.map(OffsetDateTime::unix_timestamp),
                }),
            );
            self.notifier.enqueue(job, ctx).await?;
        }
        let marked = self
            .moderation
            .mark_reminder_sent(listing.id, window, now)
            .await?;
        Ok(marked && !superseded)
    }
}

#[async_trait]
impl Job for ExpiryReminderJob {
    fn name(&self) -> &'static str {
        "expiry_reminder"
    }

    async fn run(&self) -> Result<(), JobError> {
        let report = self.run_at(OffsetDateTime::now_utc()).await?;
        if report.failed > 0 {
            return Err(JobError::Incomplete {
                failed: report.failed,
                total: report.failed + report.reminders_sent + report.expired,
            });
        }
        Ok(())
    }
}
