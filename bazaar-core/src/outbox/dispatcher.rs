//! OutboxDispatcher processor.
//!
//! The dispatcher is responsible for:
//! - Claiming deliverable outbox events under a lease
//! - Publishing each to the live transport
//! - Marking an event `delivered` only once the transport accepted it
//! - Counting failed attempts and escalating events that exhaust them
//!
//! It wakes on commit signals from [`EventOutbox`](super::EventOutbox) and
//! falls back to a fixed poll interval.

use super::OutboxWakeReceiver;
use crate::config::OutboxConfig;
use crate::entities::OutboxStatus;
use crate::error::StoreError;
use crate::store::{OutboxClaim, Store};
use crate::transport::{LiveMessage, LiveTransport};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Outcome counters of one or more dispatch rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub claimed: usize,
    pub delivered: usize,
    pub retrying: usize,
    /// Events that just became terminally `failed`.
    pub escalated: usize,
}

impl DispatchReport {
    fn absorb(&mut self, other: DispatchReport) {
        self.claimed += other.claimed;
        self.delivered += other.delivered;
        self.retrying += other.retrying;
        self.escalated += other.escalated;
    }
}

#[derive(Clone)]
pub struct OutboxDispatcher {
    store: Arc<dyn Store>,
    transport: Arc<dyn LiveTransport>,
    config: OutboxConfig,
}

impl OutboxDispatcher {
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn LiveTransport>,
        config: OutboxConfig,
    ) -> Self {
        Self {
            store,
            transport,
            config,
        }
    }

    /// Run until shutdown, dispatching on every wake-up and poll tick.
    pub async fn run(self, wake_rx: OutboxWakeReceiver, mut shutdown_rx: watch::Receiver<bool>) {
        info!("OutboxDispatcher started");

        let mut wake_rx = Some(wake_rx);
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("OutboxDispatcher received shutdown signal");
                        break;
                    }
                    continue;
                }

                woke = recv_wake(&mut wake_rx) => {
                    if woke.is_none() {
                        debug!("Outbox wake channel closed, polling only");
                        wake_rx = None;
                        continue;
                    }
                }

                _ = ticker.tick() => {}
            }

            if let Err(e) = self.dispatch_all().await {
                error!(error = %e, "Outbox dispatch round failed");
            }
        }

        info!("OutboxDispatcher shutdown complete");
    }

    /// Dispatch rounds until nothing deliverable is left.
    ///
    /// A round that delivers nothing ends the pass, so a transport outage
    /// costs one attempt per event per pass rather than a tight retry loop.
    pub async fn dispatch_all(&self) -> Result<DispatchReport, StoreError> {
        let mut total = DispatchReport::default();
        loop {
            let round = self.dispatch_once(OffsetDateTime::now_utc()).await?;
            total.absorb(round);
            if round.claimed < self.config.batch_size || round.delivered == 0 {
                break;
            }
        }
        Ok(total)
    }

    /// Claim one batch and try to deliver each event in it.
    pub async fn dispatch_once(&self, now: OffsetDateTime) -> Result<DispatchReport, StoreError> {
        let claim = OutboxClaim {
            limit: self.config.batch_size,
            lease: self.config.claim_lease,
            max_attempts: self.config.max_attempts,
            now,
        };
        let events = self.store.claim_outbox(claim).await?;
        let mut report = DispatchReport {
            claimed: events.len(),
            ..DispatchReport::default()
        };

        for event in events {
            let message = LiveMessage::from_event(&event);
            match self.transport.publish(event.channel, &message).await {
                Ok(()) => {
                    self.store
                        .mark_delivered(event.id, OffsetDateTime::now_utc())
                        .await?;
                    debug!(event_id = %event.id, channel = %event.channel, "Outbox event delivered");
                    report.delivered += 1;
                }
                Err(e) => {
                    let updated = self
                        .store
                        .record_delivery_failure(
                            event.id,
                            &e.to_string(),
                            self.config.max_attempts,
                            OffsetDateTime::now_utc(),
                        )
                        .await?;
                    match updated {
                        Some(updated) if updated.status == OutboxStatus::Failed => {
                            error!(
                                event_id = %updated.id,
                                channel = %updated.channel,
                                request_id = %updated.request_id,
                                attempts = updated.attempts,
                                error = %e,
                                "Outbox event exhausted its delivery attempts"
                            );
                            report.escalated += 1;
                        }
                        _ => {
                            warn!(
                                event_id = %event.id,
                                channel = %event.channel,
                                attempts = event.attempts + 1,
                                error = %e,
                                "Outbox delivery failed, will retry"
                            );
                            report.retrying += 1;
                        }
                    }
                }
            }
        }

        Ok(report)
    }
}

async fn recv_wake(wake_rx: &mut Option<OutboxWakeReceiver>) -> Option<()> {
    match wake_rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::entities::Channel;
    use crate::outbox::{EventOutbox, outbox_wake_channel};
    use crate::store::MemoryStore;
    use crate::transport::{BroadcastHub, TransportError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DownTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LiveTransport for DownTransport {
        async fn publish(&self, _: Channel, _: &LiveMessage) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Unavailable("connection refused".into()))
        }
    }

    async fn seed(store: &MemoryStore, n: usize) {
        let (wake_tx, _wake_rx) = outbox_wake_channel();
        let outbox = EventOutbox::new(Arc::new(store.clone()), wake_tx);
        let ctx = RequestContext::new("seed");
        for i in 0..n {
            outbox
                .emit_standalone(Channel::SettingsUpdate, &serde_json::json!({ "i": i }), &ctx)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn delivers_and_marks_in_seq_order() {
        let store = MemoryStore::new();
        seed(&store, 3).await;
        let hub = BroadcastHub::new(16);
        let mut rx = hub.subscribe(Channel::SettingsUpdate).unwrap();

        let dispatcher =
            OutboxDispatcher::new(Arc::new(store.clone()), Arc::new(hub), OutboxConfig::default());
        let report = dispatcher.dispatch_all().await.unwrap();
        assert_eq!(report.delivered, 3);

        for expected in 0..3 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(msg.payload["i"], expected);
        }
        assert_eq!(store.count_outbox(OutboxStatus::Delivered).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn escalates_after_max_attempts() {
        let store = MemoryStore::new();
        seed(&store, 1).await;
        let transport = Arc::new(DownTransport {
            calls: AtomicUsize::new(0),
        });
        let config = OutboxConfig {
            max_attempts: 3,
            ..OutboxConfig::default()
        };
        let dispatcher = OutboxDispatcher::new(Arc::new(store.clone()), transport.clone(), config);

        for _ in 0..2 {
            let report = dispatcher.dispatch_all().await.unwrap();
            assert_eq!(report.retrying, 1);
        }
        let report = dispatcher.dispatch_all().await.unwrap();
        assert_eq!(report.escalated, 1);

        let report = dispatcher.dispatch_all().await.unwrap();
        assert_eq!(report.claimed, 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);

        let event = &store.outbox_events().await[0];
        assert_eq!(event.status, OutboxStatus::Failed);
        assert_eq!(event.attempts, 3);
        assert_eq!(event.last_error.as_deref(), Some("transport unavailable: connection refused"));
    }
}
