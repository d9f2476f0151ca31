use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;
use crate::realtime::normalize_identity;
use crate::store::{is_valid_username, CONVERSATION_ID_SEPARATOR};

/// Header carrying the caller's username on REST requests.
pub const IDENTITY_HEADER: &str = "X-Username";

/// Caller identity for REST handlers, taken from the `X-Username` header.
/// Implements axum's FromRequestParts for use as an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub String);

impl Identity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(IDENTITY_HEADER)
            .and_then(|v| v.to_str().ok());

        let identity = normalize_identity(header).ok_or(ApiError::Unauthenticated)?;
        if !is_valid_username(identity) {
            return Err(ApiError::BadRequest(format!(
                "username may not contain '{CONVERSATION_ID_SEPARATOR}'"
            )));
        }
        Ok(Identity(identity.to_string()))
    }
}
