//! Notification job enqueueing.
//!
//! The core never sends push, email or SMS itself. It enqueues an abstract
//! job that the sender workers pick up.

use crate::context::RequestContext;
use crate::entities::Channel;
use crate::error::StoreError;
use crate::outbox::EventOutbox;
use async_trait::async_trait;
use bazaar_sdk::objects::{NotificationChannel, NotificationPriority, NotifyPushPayload};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationJob {
    pub user_id: Uuid,
    pub template_key: String,
    pub payload: serde_json::Value,
    pub channel: NotificationChannel,
    pub priority: NotificationPriority,
}

impl NotificationJob {
    /// A normal-priority push notification.
    pub fn push(user_id: Uuid, template_key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            user_id,
            template_key: template_key.into(),
            payload,
            channel: NotificationChannel::Push,
            priority: NotificationPriority::Normal,
        }
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to enqueue notification: {0}")]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn enqueue(&self, job: NotificationJob, ctx: &RequestContext) -> Result<(), NotifyError>;
}

/// Enqueues notifications as `notify.push` outbox events, so a job is as
/// durable as any other event.
#[derive(Clone)]
pub struct OutboxNotifier {
    outbox: EventOutbox,
}

impl OutboxNotifier {
    pub fn new(outbox: EventOutbox) -> Self {
        Self { outbox }
    }
}

#[async_trait]
impl NotificationSender for OutboxNotifier {
    async fn enqueue(&self, job: NotificationJob, ctx: &RequestContext) -> Result<(), NotifyError> {
        let payload = NotifyPushPayload {
            user_id: job.user_id,
            template_key: job.template_key,
            channel: job.channel,
            priority: job.priority,
            data: job.payload,
        };
        self.outbox
            .emit_standalone(Channel::NotifyPush, &payload, ctx)
            .await?;
        Ok(())
    }
}

/// Enqueue `job`, logging instead of propagating a failure. Used after the
/// triggering mutation has already committed.
pub(crate) async fn enqueue_quietly(
    sender: &dyn NotificationSender,
    job: NotificationJob,
    ctx: &RequestContext,
) {
    let user_id = job.user_id;
    let template_key = job.template_key.clone();
    if let Err(e) = sender.enqueue(job, ctx).await {
        tracing::warn!(error = %e, %user_id, template_key, "Failed to enqueue notification");
    }
}
