use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection.
/// The identity is supplied out-of-band as ?username=...
#[derive(Debug, Deserialize)]
pub struct WsHandshakeQuery {
    pub username: Option<String>,
}

/// WebSocket close code sent when the handshake carries no identity.
pub const CLOSE_IDENTITY_MISSING: u16 = 4001;

/// GET /ws?username=NAME
/// WebSocket upgrade endpoint.
/// Without an identity, upgrades then immediately closes with 4001; the
/// registry is never touched. Otherwise spawns an actor for the connection.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsHandshakeQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match state.realtime.admit(params.username.as_deref()) {
        Ok(admitted) => {
            tracing::info!(user = %admitted.identity(), "WebSocket connection admitted");
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, admitted))
        }
        Err(err) => {
            tracing::warn!(
                close_code = CLOSE_IDENTITY_MISSING,
                error = %err,
                "WebSocket handshake rejected"
            );

            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code: CLOSE_IDENTITY_MISSING,
                    reason: "Identity missing".into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}
