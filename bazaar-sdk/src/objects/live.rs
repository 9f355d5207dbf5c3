//! WebSocket frame types for the live event stream.
//!
//! The `GET /live/{channel}` endpoint upgrades to a WebSocket connection and
//! pushes [`LiveFrame`] JSON frames for every event published on that channel.
//!
//! # Protocol
//!
//! 1. After the upgrade the server forwards each published event as a
//!    [`LiveFrame::Event`].
//! 2. The same `request_id` may arrive more than once; clients dedupe on it.
//! 3. A client that falls behind receives a [`LiveFrame::Lagged`] frame with
//!    the number of skipped events and should resync from its source of truth.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EventChannel;

/// Server-to-client live stream frame.
///
/// ```json
/// {"type":"event","event_id":"...","channel":"wallet.update","request_id":"...","payload":{...}}
/// {"type":"lagged","skipped":12}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveFrame {
    Event {
        event_id: Uuid,
        channel: EventChannel,
        request_id: String,
        payload: serde_json::Value,
    },
    Lagged {
        skipped: u64,
    },
    Error {
        code: u16,
        reason: String,
    },
}

/// Well-known WebSocket close codes used by the live stream.
pub struct LiveCloseCode;

impl LiveCloseCode {
    pub const NORMAL: u16 = 1000;
    pub const INTERNAL_ERROR: u16 = 1011;
    pub const UNKNOWN_CHANNEL: u16 = 4004;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_frame_is_internally_tagged() {
        let frame = LiveFrame::Event {
            event_id: Uuid::nil(),
            channel: EventChannel::WalletUpdate,
            request_id: "req-1".into(),
            payload: serde_json::json!({"balance": 500}),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "event");
        assert_eq!(value["channel"], "wallet.update");
        assert_eq!(value["payload"]["balance"], 500);
    }
}
