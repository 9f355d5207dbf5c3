//! Transactional outbox.
//!
//! Events are appended inside the unit of work that performs the mutation,
//! so they become visible exactly when the mutation commits. Delivery is the
//! [`OutboxDispatcher`]'s job; [`EventOutbox::committed`] only nudges it.

mod dispatcher;

pub use dispatcher::{DispatchReport, OutboxDispatcher};

use crate::context::RequestContext;
use crate::entities::{Channel, NewOutboxEvent, OutboxEvent};
use crate::error::StoreError;
use crate::store::{Store, UnitOfWork};
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::mpsc;

/// Sender half of the dispatcher wake-up channel.
pub type OutboxWakeSender = mpsc::Sender<()>;
/// Receiver half of the dispatcher wake-up channel.
pub type OutboxWakeReceiver = mpsc::Receiver<()>;

/// Create the dispatcher wake-up channel.
///
/// Capacity is one: wake-ups that arrive while one is already pending
/// coalesce, since a single dispatch pass drains everything committed so far.
pub fn outbox_wake_channel() -> (OutboxWakeSender, OutboxWakeReceiver) {
    mpsc::channel(1)
}

/// Handle used by every mutator to append events.
#[derive(Clone)]
pub struct EventOutbox {
    store: Arc<dyn Store>,
    wake_tx: OutboxWakeSender,
}

impl EventOutbox {
    pub fn new(store: Arc<dyn Store>, wake_tx: OutboxWakeSender) -> Self {
        Self { store, wake_tx }
    }

    /// Append an event to `uow`. It is published only if `uow` commits.
    pub async fn emit<P: Serialize>(
        &self,
        uow: &mut dyn UnitOfWork,
        channel: Channel,
        payload: &P,
        ctx: &RequestContext,
    ) -> Result<OutboxEvent, StoreError> {
        let event = NewOutboxEvent {
            channel,
            payload: serde_json::to_value(payload)?,
            request_id: ctx.next_event_key(),
            created_at: OffsetDateTime::now_utc(),
        };
        uow.insert_outbox(event).await
    }

    /// Commit a single event in its own unit of work, for mutations whose
    /// state lives outside the core.
    pub async fn emit_standalone<P: Serialize>(
        &self,
        channel: Channel,
        payload: &P,
        ctx: &RequestContext,
    ) -> Result<OutboxEvent, StoreError> {
        let mut uow = self.store.begin().await?;
        let event = self.emit(uow.as_mut(), channel, payload, ctx).await?;
        uow.commit().await?;
        self.committed();
        Ok(event)
    }

    /// Signal that a unit carrying events has committed.
    pub fn committed(&self) {
        // A full channel already has a wake-up queued.
        let _ = self.wake_tx.try_send(());
    }
}
