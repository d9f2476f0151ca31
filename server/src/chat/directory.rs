//! The caller's chats: friends and communities.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::auth::middleware::Identity;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::store::{is_valid_username, ConversationRef, CONVERSATION_ID_SEPARATOR};

#[derive(Debug, Deserialize)]
pub struct AddFriendRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinCommunityRequest {
    pub name: String,
}

/// GET /api/chats: friends and communities of the caller.
pub async fn list_chats(
    State(state): State<AppState>,
    identity: Identity,
) -> ApiResult<Json<Vec<ConversationRef>>> {
    let chats = state
        .directory
        .friends_and_communities_of(identity.as_str())
        .await?;
    Ok(Json(chats))
}

/// POST /api/friends: befriend another user (symmetric).
/// Body: { "username": "..." }
pub async fn add_friend(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<AddFriendRequest>,
) -> ApiResult<StatusCode> {
    let friend = body.username.trim();
    if friend.is_empty() {
        return Err(ApiError::BadRequest("username is required".to_string()));
    }
    if !is_valid_username(friend) {
        return Err(ApiError::BadRequest(format!(
            "username may not contain '{CONVERSATION_ID_SEPARATOR}'"
        )));
    }
    if friend == identity.as_str() {
        return Err(ApiError::BadRequest("cannot befriend yourself".to_string()));
    }

    state.directory.add_friend(identity.as_str(), friend).await?;
    tracing::info!(user = %identity.as_str(), friend = %friend, "Friend added");
    Ok(StatusCode::OK)
}

/// POST /api/communities: join a community, creating it if needed.
/// Body: { "name": "..." }
pub async fn join_community(
    State(state): State<AppState>,
    identity: Identity,
    Json(body): Json<JoinCommunityRequest>,
) -> ApiResult<StatusCode> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("community name is required".to_string()));
    }

    state.directory.join_community(identity.as_str(), name).await?;
    tracing::info!(user = %identity.as_str(), community = %name, "Community joined");
    Ok(StatusCode::OK)
}
