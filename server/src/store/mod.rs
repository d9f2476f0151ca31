//! Collaborators of the realtime core: persisted message history and the
//! friends/communities directory.
//!
//! The realtime layer never calls these. The HTTP request layer writes every
//! message here independently of what the realtime layer delivered live.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use sqlite::SqliteStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database lock poisoned")]
    Poisoned,
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("invalid stored timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub author: String,
    pub content: String,
    pub time_sent: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Friend,
    Community,
}

/// A conversation a user takes part in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRef {
    pub id: String,
    /// Friend's username or community name.
    pub name: String,
    pub kind: ConversationKind,
}

/// Separator between the parts of a conversation id.
pub const CONVERSATION_ID_SEPARATOR: char = ':';

/// Whether `username` can take part in a friend conversation. Friend ids
/// are only unambiguous when neither name contains the separator.
pub fn is_valid_username(username: &str) -> bool {
    !username.contains(CONVERSATION_ID_SEPARATOR)
}

/// Conversation id shared by two friends, independent of argument order.
/// Both names must pass [`is_valid_username`].
pub fn friend_conversation_id(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("dm:{lo}:{hi}")
}

pub fn community_conversation_id(name: &str) -> String {
    format!("community:{name}")
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(
        &self,
        conversation_id: &str,
        author: &str,
        content: &str,
        time_sent: DateTime<Utc>,
    ) -> Result<StoredMessage, StoreError>;

    /// Messages of one conversation, oldest first.
    async fn list(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, StoreError>;
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn friends_and_communities_of(
        &self,
        identity: &str,
    ) -> Result<Vec<ConversationRef>, StoreError>;

    /// Make `a` and `b` friends of each other. Idempotent.
    async fn add_friend(&self, a: &str, b: &str) -> Result<(), StoreError>;

    /// Add `member` to a community, creating it on first use. Idempotent.
    async fn join_community(&self, member: &str, community: &str) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friend_conversation_id_is_symmetric() {
        assert_eq!(friend_conversation_id("bob", "alice"), "dm:alice:bob");
        assert_eq!(
            friend_conversation_id("alice", "bob"),
            friend_conversation_id("bob", "alice")
        );
    }

    #[test]
    fn separator_is_not_a_valid_username_character() {
        assert!(is_valid_username("alice"));
        assert!(!is_valid_username("a:b"));
        assert!(!is_valid_username(":"));
    }
}
