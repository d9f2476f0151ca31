//! Wire events exchanged over a realtime connection.
//!
//! Every frame is a JSON text message tagged by its `event` field.

use serde::{Deserialize, Serialize};

/// A direct message as it travels on the wire. Never persisted by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub content: String,
    pub from: String,
    pub to: String,
}

/// One entry of the online roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub username: String,
}

/// Events pushed from the server to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ServerEvent {
    /// Snapshot of who was online, sent once to a newly admitted endpoint.
    #[serde(rename = "users")]
    OnlineRoster { users: Vec<RosterEntry> },
    #[serde(rename = "user connected")]
    UserCameOnline { username: String },
    #[serde(rename = "user disconnected")]
    UserWentOffline { username: String },
    #[serde(rename = "private message")]
    DirectMessage(DirectMessage),
    #[serde(rename = "error")]
    Error { code: u16, message: String },
}

impl ServerEvent {
    pub fn roster<S: AsRef<str>>(identities: &[S]) -> Self {
        Self::OnlineRoster {
            users: identities
                .iter()
                .map(|id| RosterEntry {
                    username: id.as_ref().to_string(),
                })
                .collect(),
        }
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

/// Events sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ClientEvent {
    #[serde(rename = "private message")]
    PrivateMessage { to: String, content: String },
}
