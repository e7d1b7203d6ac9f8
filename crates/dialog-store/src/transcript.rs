//! Ordered per-session dialog transcript, backed by a Redis list.
//!
//! Each session's transcript is one Redis key holding a JSON-encoded `{role, content}` entry
//! per `RPUSH`, preserving causal order: system, then alternating ai/user turns.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::config::RedisConfig;
use crate::error::Result;

/// One recorded turn in a dialog transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatHistoryEntry {
    /// `"system"`, `"ai"`, or `"user"`.
    pub role: String,
    /// Turn content.
    pub content: String,
}

/// Capability surface the engine depends on for recording and retiring a transcript.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Append a system-authored entry.
    async fn append_system(&self, session_id: &str, content: &str) -> Result<()>;
    /// Append a user-authored entry.
    async fn append_user(&self, session_id: &str, content: &str) -> Result<()>;
    /// Append an AI-authored entry.
    async fn append_ai(&self, session_id: &str, content: &str) -> Result<()>;
    /// Load the full, ordered transcript for a session.
    async fn list(&self, session_id: &str) -> Result<Vec<ChatHistoryEntry>>;
    /// Delete a session's transcript entirely.
    async fn delete(&self, session_id: &str) -> Result<()>;
}

/// Redis-backed transcript store.
#[derive(Clone)]
pub struct RedisTranscriptStore {
    conn: ConnectionManager,
}

impl RedisTranscriptStore {
    /// Connect to Redis, establishing an auto-reconnecting connection manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial connection fails.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    async fn add(&self, session_id: &str, role: &str, content: &str) -> Result<()> {
        let entry = ChatHistoryEntry { role: role.to_string(), content: content.to_string() };
        let data = serde_json::to_string(&entry)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.rpush(session_id, data).await?;
        Ok(())
    }
}

#[async_trait]
impl TranscriptStore for RedisTranscriptStore {
    async fn append_system(&self, session_id: &str, content: &str) -> Result<()> {
        self.add(session_id, "system", content).await
    }

    async fn append_user(&self, session_id: &str, content: &str) -> Result<()> {
        self.add(session_id, "user", content).await
    }

    async fn append_ai(&self, session_id: &str, content: &str) -> Result<()> {
        self.add(session_id, "ai", content).await
    }

    async fn list(&self, session_id: &str) -> Result<Vec<ChatHistoryEntry>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(session_id, 0, -1).await?;
        raw.iter()
            .map(|v| serde_json::from_str(v).map_err(Into::into))
            .collect()
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(session_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_history_entry_round_trips_through_json() {
        let entry = ChatHistoryEntry { role: "ai".into(), content: "你好".into() };
        let raw = serde_json::to_string(&entry).expect("serialize");
        let back: ChatHistoryEntry = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(entry, back);
    }
}
