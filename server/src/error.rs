//! Error types for the realtime core and the HTTP surface around it.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::store::StoreError;

/// Failures scoped to a single connection attempt or a single message.
/// None of these are fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RealtimeError {
    /// The handshake did not carry a usable identity.
    #[error("identity missing")]
    IdentityMissing,
    /// A direct message was addressed to nobody.
    #[error("recipient missing")]
    RecipientMissing,
    /// A direct message had no content.
    #[error("message content is empty")]
    EmptyMessage,
    /// An operation referenced an endpoint that is not registered.
    #[error("endpoint {0} is not registered")]
    UnknownEndpoint(crate::realtime::EndpointId),
}

impl RealtimeError {
    /// Code carried by `error` events on the wire.
    pub fn wire_code(&self) -> u16 {
        match self {
            Self::IdentityMissing => 401,
            Self::RecipientMissing | Self::EmptyMessage => 400,
            Self::UnknownEndpoint(_) => 410,
        }
    }
}

/// Errors returned by REST handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing X-Username header")]
    Unauthenticated,
    #[error("not a participant of this conversation")]
    Forbidden,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<RealtimeError> for ApiError {
    fn from(err: RealtimeError) -> Self {
        match err {
            RealtimeError::IdentityMissing => ApiError::Unauthenticated,
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(err) => {
                tracing::error!(error = %err, "Store operation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match &self {
            ApiError::Store(_) => "Internal storage error".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "error": { "message": message } }))).into_response()
    }
}
