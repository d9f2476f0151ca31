use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: message history

CREATE TABLE messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    author TEXT NOT NULL,
    content TEXT NOT NULL,
    time_sent TEXT NOT NULL
);

CREATE INDEX idx_messages_conversation ON messages(conversation_id, time_sent);
",
        ),
        M::up(
            "-- Migration 2: directory (friends and communities)

CREATE TABLE friendships (
    username TEXT NOT NULL,
    friend TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (username, friend)
);

CREATE TABLE communities (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE community_members (
    community TEXT NOT NULL,
    member TEXT NOT NULL,
    joined_at TEXT NOT NULL,
    PRIMARY KEY (community, member),
    FOREIGN KEY (community) REFERENCES communities(name)
);

CREATE INDEX idx_community_members_member ON community_members(member);
",
        ),
    ])
}
