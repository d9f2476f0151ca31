use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout};

use crate::realtime::{Admitted, ServerEvent};
use crate::state::AppState;
use crate::ws::protocol;

/// Run the actor-per-connection pattern for an admitted WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, serializes realtime events and forwards
///   control frames (pings, pongs, close)
/// - Reader task: processes incoming frames, dispatches to protocol handlers
///
/// The endpoint is registered before the writer starts; its roster snapshot
/// is already queued and goes out as the first frame.
pub async fn run_connection(socket: WebSocket, state: AppState, admitted: Admitted) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (event_tx, event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let (control_tx, control_rx) = mpsc::unbounded_channel::<Message>();

    let mut session = match state.realtime.activate(admitted, event_tx) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to activate WebSocket endpoint");
            return;
        }
    };

    tracing::info!(
        user = %session.identity(),
        endpoint = %session.endpoint(),
        "WebSocket actor started"
    );

    let writer_handle = tokio::spawn(writer_task(ws_sender, event_rx, control_rx));

    // Track pong reception; `peer_lost` fires when the peer stops answering
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();
    let (peer_lost_tx, mut peer_lost) = oneshot::channel::<()>();

    let ping_tx = control_tx.clone();
    let ping_interval = state.realtime_config.ping_interval();
    let pong_timeout = state.realtime_config.pong_timeout();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(ping_interval);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died
                break;
            }

            match timeout(pong_timeout, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    let _ = peer_lost_tx.send(());
                    break;
                }
            }
        }
    });

    // Reader loop: process incoming WebSocket messages
    loop {
        let next = tokio::select! {
            _ = &mut peer_lost => {
                tracing::info!(user = %session.identity(), "Peer unresponsive, dropping endpoint");
                break;
            }
            next = ws_receiver.next() => next,
        };

        match next {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_message(text.as_str(), &session);
                }
                Message::Binary(data) => {
                    tracing::debug!(
                        user = %session.identity(),
                        bytes = data.len(),
                        "Ignoring binary frame (expected JSON text)"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = control_tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user = %session.identity(),
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user = %session.identity(),
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(user = %session.identity(), "WebSocket stream ended");
                break;
            }
        }
    }

    // Deregister first so no new events are queued for this endpoint
    session.close();
    writer_handle.abort();
    ping_handle.abort();

    tracing::info!(
        user = %session.identity(),
        endpoint = %session.endpoint(),
        "WebSocket actor stopped"
    );
}

/// Writer task: serializes events and forwards control frames to the sink.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut events: mpsc::UnboundedReceiver<ServerEvent>,
    mut control: mpsc::UnboundedReceiver<Message>,
) {
    loop {
        let msg = tokio::select! {
            Some(event) = events.recv() => match serde_json::to_string(&event) {
                Ok(json) => Message::Text(json.into()),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode server event");
                    continue;
                }
            },
            Some(msg) = control.recv() => msg,
            else => break,
        };

        let closing = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() {
            // Connection is broken
            break;
        }
        if closing {
            break;
        }
    }
}
