use axum::{
    extract::{
        Path, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use bazaar_core::entities::Channel;
use bazaar_core::transport::LiveMessage;
use bazaar_sdk::objects::{EventChannel, LiveCloseCode, LiveFrame, UnknownChannel};
use tokio::sync::broadcast::{self, error::RecvError};

use super::ApiError;
use super::extractors::Principal;
use crate::state::AppState;

/// Channels whose payloads concern a single user's money or account and are
/// therefore limited to admin subscribers.
fn requires_admin(channel: EventChannel) -> bool {
    matches!(
        channel,
        EventChannel::WalletUpdate | EventChannel::NotifyPush | EventChannel::UserBlocked
    )
}

/// `GET /live/{channel}`: WebSocket stream of delivered events.
///
/// Pushes one [`LiveFrame::Event`] per event the outbox dispatcher
/// publishes on `channel`. Delivery is at least once; clients dedupe on
/// `request_id`. A subscriber that falls behind the hub buffer receives
/// [`LiveFrame::Lagged`] and should resync from its source of truth.
pub(super) async fn live_stream(
    State(state): State<AppState>,
    principal: Principal,
    Path(channel): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let channel: EventChannel = channel
        .parse()
        .map_err(|e: UnknownChannel| ApiError::NotFound(e.to_string()))?;
    if requires_admin(channel) && !principal.is_admin {
        return Err(ApiError::AdminRequired);
    }

    // Subscribe before the upgrade completes so nothing published in
    // between is missed.
    let rx = state
        .hub
        .subscribe(Channel::from(channel))
        .ok_or_else(|| ApiError::NotFound(format!("no live transport for {channel}")))?;

    tracing::debug!(%channel, subscriber = %principal.id, "Live subscriber connected");
    Ok(ws
        .on_upgrade(move |socket| handle_live_ws(socket, rx, channel))
        .into_response())
}

/// Background task that drives a single WebSocket connection until the
/// client disconnects or the hub closes.
async fn handle_live_ws(
    mut socket: WebSocket,
    mut rx: broadcast::Receiver<LiveMessage>,
    channel: EventChannel,
) {
    loop {
        tokio::select! {
            result = rx.recv() => {
                let frame = match result {
                    Ok(message) => message.to_frame(),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(%channel, skipped, "Live subscriber lagged");
                        LiveFrame::Lagged { skipped }
                    }
                    Err(RecvError::Closed) => break,
                };
                if send_json(&mut socket, &frame).await.is_err() {
                    return;
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = send_json(
        &mut socket,
        &LiveFrame::Error {
            code: LiveCloseCode::INTERNAL_ERROR,
            reason: "live transport closed".into(),
        },
    )
    .await;
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: LiveCloseCode::INTERNAL_ERROR,
            reason: "live transport closed".into(),
        })))
        .await;
}

/// Serialize `value` as JSON and send it as a text WebSocket frame.
///
/// Returns `Err(())` if the send fails (client disconnected).
async fn send_json<T: serde::Serialize>(socket: &mut WebSocket, value: &T) -> Result<(), ()> {
    let json = serde_json::to_string(value).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_channels_are_admin_only() {
        let open: Vec<_> = EventChannel::ALL
            .into_iter()
            .filter(|c| !requires_admin(*c))
            .collect();
        assert_eq!(
            open,
            vec![EventChannel::ListingUpdate, EventChannel::SettingsUpdate]
        );
    }
}
