use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::chat::{directory, messages, presence};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// GET /health
async fn health_check() -> &'static str {
    "OK"
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Public routes (no identity required)
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/api/presence", get(presence::get_online_users))
        .route("/api/presence/{username}", get(presence::get_user_presence));

    // Realtime endpoint; the handshake carries its own identity
    let realtime_routes = Router::new().route("/ws", get(ws_handler::ws_upgrade));

    // Identified routes (X-Username required)
    let identified_routes = Router::new()
        .route("/api/chats", get(directory::list_chats))
        .route("/api/friends", axum::routing::post(directory::add_friend))
        .route("/api/communities", axum::routing::post(directory::join_community))
        .route(
            "/api/conversations/{id}/messages",
            get(messages::list_messages).post(messages::post_message),
        );

    Router::new()
        .merge(public_routes)
        .merge(realtime_routes)
        .merge(identified_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
