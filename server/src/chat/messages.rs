//! Persisted conversation history.
//!
//! Clients post every message here in addition to sending it over the
//! WebSocket; this is the durable copy, the live event is best effort.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Identity;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::store::StoredMessage;

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<StoredMessage>,
}

/// Only participants may read or write a conversation.
async fn ensure_participant(
    state: &AppState,
    identity: &Identity,
    conversation_id: &str,
) -> ApiResult<()> {
    let chats = state
        .directory
        .friends_and_communities_of(identity.as_str())
        .await?;
    if chats.iter().any(|chat| chat.id == conversation_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// GET /api/conversations/{id}/messages: history, oldest first.
pub async fn list_messages(
    State(state): State<AppState>,
    identity: Identity,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<HistoryResponse>> {
    ensure_participant(&state, &identity, &conversation_id).await?;
    let messages = state.messages.list(&conversation_id).await?;
    Ok(Json(HistoryResponse { messages }))
}

/// POST /api/conversations/{id}/messages: append a message.
/// Body: { "content": "..." }
pub async fn post_message(
    State(state): State<AppState>,
    identity: Identity,
    Path(conversation_id): Path<String>,
    Json(body): Json<PostMessageRequest>,
) -> ApiResult<(StatusCode, Json<StoredMessage>)> {
    if body.content.trim().is_empty() {
        return Err(ApiError::BadRequest("message content is empty".to_string()));
    }
    ensure_participant(&state, &identity, &conversation_id).await?;

    let message = state
        .messages
        .append(&conversation_id, identity.as_str(), &body.content, Utc::now())
        .await?;

    tracing::debug!(
        user = %identity.as_str(),
        conversation = %conversation_id,
        "Message persisted"
    );

    Ok((StatusCode::CREATED, Json(message)))
}
