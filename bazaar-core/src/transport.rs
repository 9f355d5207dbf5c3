//! Live fan-out of outbox events to connected subscribers.

use crate::entities::{Channel, OutboxEvent};
use async_trait::async_trait;
use bazaar_sdk::objects::LiveFrame;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Per-channel buffer of the in-process hub. Subscribers further behind than
/// this receive a lag notice instead of the skipped events.
pub const DEFAULT_HUB_CAPACITY: usize = 1024;

/// Message handed to the live transport for one outbox event.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveMessage {
    pub event_id: Uuid,
    pub channel: Channel,
    /// Dedupe key for subscribers.
    pub request_id: String,
    pub payload: serde_json::Value,
}

impl LiveMessage {
    pub fn from_event(event: &OutboxEvent) -> Self {
        Self {
            event_id: event.id,
            channel: event.channel,
            request_id: event.request_id.clone(),
            payload: event.payload.clone(),
        }
    }

    pub fn to_frame(&self) -> LiveFrame {
        LiveFrame::Event {
            event_id: self.event_id,
            channel: self.channel.into(),
            request_id: self.request_id.clone(),
            payload: self.payload.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no transport registered for channel {0}")]
    UnknownChannel(Channel),

    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Capability the dispatcher publishes through. `Ok` means the transport
/// accepted the message; delivery to each subscriber is its own concern.
#[async_trait]
pub trait LiveTransport: Send + Sync {
    async fn publish(&self, channel: Channel, message: &LiveMessage) -> Result<(), TransportError>;
}

/// In-process hub with one broadcast channel per event channel.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    senders: HashMap<Channel, broadcast::Sender<LiveMessage>>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let senders = Channel::ALL
            .into_iter()
            .map(|channel| (channel, broadcast::channel(capacity).0))
            .collect();
        Self { senders }
    }

    pub fn subscribe(&self, channel: Channel) -> Option<broadcast::Receiver<LiveMessage>> {
        self.senders.get(&channel).map(|tx| tx.subscribe())
    }

    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.senders
            .get(&channel)
            .map_or(0, |tx| tx.receiver_count())
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_CAPACITY)
    }
}

#[async_trait]
impl LiveTransport for BroadcastHub {
    async fn publish(&self, channel: Channel, message: &LiveMessage) -> Result<(), TransportError> {
        let tx = self
            .senders
            .get(&channel)
            .ok_or(TransportError::UnknownChannel(channel))?;
        // With nobody listening there is nothing to deliver; the message is
        // still accepted.
        if tx.send(message.clone()).is_err() {
            tracing::trace!(%channel, "Published with no live subscribers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(channel: Channel) -> LiveMessage {
        LiveMessage {
            event_id: Uuid::now_v7(),
            channel,
            request_id: "req#0".into(),
            payload: serde_json::json!({"balance": 500}),
        }
    }

    #[tokio::test]
    async fn fan_out_is_scoped_by_channel() {
        let hub = BroadcastHub::new(16);
        let mut wallet_rx = hub.subscribe(Channel::WalletUpdate).unwrap();
        let mut listing_rx = hub.subscribe(Channel::ListingUpdate).unwrap();

        let msg = message(Channel::WalletUpdate);
        hub.publish(Channel::WalletUpdate, &msg).await.unwrap();

        assert_eq!(wallet_rx.recv().await.unwrap(), msg);
        assert!(listing_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_accepted() {
        let hub = BroadcastHub::default();
        assert_eq!(hub.subscriber_count(Channel::UserBlocked), 0);
        hub.publish(Channel::UserBlocked, &message(Channel::UserBlocked))
            .await
            .unwrap();
    }
}
