use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use super::{
    community_conversation_id, friend_conversation_id, ConversationKind, ConversationRef,
    Directory, MessageStore, StoreError, StoredMessage,
};
use crate::db::DbPool;

/// SQLite-backed [`MessageStore`] and [`Directory`].
#[derive(Clone)]
pub struct SqliteStore {
    db: DbPool,
}

impl SqliteStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Run a closure against the connection on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Poisoned)?;
            f(&conn)
        })
        .await?
    }
}

// Fixed precision so lexical order matches chronological order.
fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now() -> String {
    encode_time(&Utc::now())
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn append(
        &self,
        conversation_id: &str,
        author: &str,
        content: &str,
        time_sent: DateTime<Utc>,
    ) -> Result<StoredMessage, StoreError> {
        let message = StoredMessage {
            id: uuid::Uuid::now_v7().to_string(),
            conversation_id: conversation_id.to_string(),
            author: author.to_string(),
            content: content.to_string(),
            time_sent,
        };

        let row = message.clone();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, author, content, time_sent)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    row.id,
                    row.conversation_id,
                    row.author,
                    row.content,
                    encode_time(&row.time_sent)
                ],
            )?;
            Ok(())
        })
        .await?;

        Ok(message)
    }

    async fn list(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let conversation_id = conversation_id.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, author, content, time_sent FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY time_sent ASC, rowid ASC",
            )?;
            let rows = stmt.query_map(rusqlite::params![conversation_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;

            let mut messages = Vec::new();
            for row in rows {
                let (id, conversation_id, author, content, time_sent) = row?;
                messages.push(StoredMessage {
                    id,
                    conversation_id,
                    author,
                    content,
                    time_sent: DateTime::parse_from_rfc3339(&time_sent)?.with_timezone(&Utc),
                });
            }
            Ok(messages)
        })
        .await
    }
}

#[async_trait]
impl Directory for SqliteStore {
    async fn friends_and_communities_of(
        &self,
        identity: &str,
    ) -> Result<Vec<ConversationRef>, StoreError> {
        let identity = identity.to_string();
        self.blocking(move |conn| {
            let mut chats = Vec::new();

            let mut stmt =
                conn.prepare("SELECT friend FROM friendships WHERE username = ?1 ORDER BY friend")?;
            let friends = stmt.query_map(rusqlite::params![identity], |row| row.get::<_, String>(0))?;
            for friend in friends {
                let friend = friend?;
                chats.push(ConversationRef {
                    id: friend_conversation_id(&identity, &friend),
                    name: friend,
                    kind: ConversationKind::Friend,
                });
            }

            let mut stmt = conn.prepare(
                "SELECT community FROM community_members WHERE member = ?1 ORDER BY community",
            )?;
            let communities =
                stmt.query_map(rusqlite::params![identity], |row| row.get::<_, String>(0))?;
            for community in communities {
                let community = community?;
                chats.push(ConversationRef {
                    id: community_conversation_id(&community),
                    name: community,
                    kind: ConversationKind::Community,
                });
            }

            Ok(chats)
        })
        .await
    }

    async fn add_friend(&self, a: &str, b: &str) -> Result<(), StoreError> {
        let (a, b) = (a.to_string(), b.to_string());
        self.blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let created_at = now();
            for (user, friend) in [(&a, &b), (&b, &a)] {
                tx.execute(
                    "INSERT OR IGNORE INTO friendships (username, friend, created_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![user, friend, created_at],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn join_community(&self, member: &str, community: &str) -> Result<(), StoreError> {
        let (member, community) = (member.to_string(), community.to_string());
        self.blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let joined_at = now();
            tx.execute(
                "INSERT OR IGNORE INTO communities (name, created_at) VALUES (?1, ?2)",
                rusqlite::params![community, joined_at],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO community_members (community, member, joined_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![community, member, joined_at],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
