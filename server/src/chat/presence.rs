//! Presence queries over HTTP.
//!
//! Read-only views of the session registry; the realtime layer pushes the
//! same information to connected clients as events.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct OnlineUsersResponse {
    pub users: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UserPresenceResponse {
    pub username: String,
    pub online: bool,
    /// Number of live connections
    pub endpoints: usize,
}

/// GET /api/presence: every identity with at least one live connection, sorted.
pub async fn get_online_users(State(state): State<AppState>) -> Json<OnlineUsersResponse> {
    Json(OnlineUsersResponse {
        users: state.realtime.presence().online_set(),
    })
}

/// GET /api/presence/{username}: presence of a single identity.
/// Unknown identities are simply offline.
pub async fn get_user_presence(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Json<UserPresenceResponse> {
    let endpoints = state.realtime.registry().endpoints_for(&username).len();
    Json(UserPresenceResponse {
        username,
        online: endpoints > 0,
        endpoints,
    })
}
