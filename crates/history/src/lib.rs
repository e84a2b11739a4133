//! Conversation history persistence.
//!
//! Each completed question/answer pair is stored once. Inserting a record
//! first prunes everything but the most recent `retain` records, in the same
//! transaction, so at most `retain + 1` records exist afterwards.

pub mod id;
pub mod sqlite;

pub use id::conversation_id;
pub use sqlite::SqliteHistory;

use chrono::{DateTime, Utc};
use motolaw_core::AppResult;
use serde::{Deserialize, Serialize};

/// One stored question/answer pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub conversation_id: String,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationRecord {
    /// Build a record stamped now with a fresh conversation id.
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id(),
            question: question.into(),
            answer: answer.into(),
            created_at: Utc::now(),
        }
    }
}

/// Durable store for completed conversations.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// Prune to the retention limit, then insert `record`.
    async fn record(&self, record: ConversationRecord) -> AppResult<()>;

    /// Up to `limit` records, newest first.
    async fn recent(&self, limit: usize) -> AppResult<Vec<ConversationRecord>>;
}
