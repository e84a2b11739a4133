//! SQLite-backed history store.

use crate::{ConversationRecord, HistoryStore};
use chrono::{DateTime, SecondsFormat, Utc};
use motolaw_core::{AppError, AppResult};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// History store over a single SQLite connection.
///
/// The connection is shared behind a mutex and only touched on the blocking
/// pool.
#[derive(Clone)]
pub struct SqliteHistory {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    retain: usize,
}

impl std::fmt::Debug for SqliteHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHistory")
            .field("path", &self.path)
            .field("retain", &self.retain)
            .finish()
    }
}

impl SqliteHistory {
    /// Open or create the history database at `path`.
    pub fn open(path: &Path, retain: usize) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::History(format!("Failed to create history directory: {}", e))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::History(format!("Failed to open {:?}: {}", path, e)))?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS conversations (
                conversation_id TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| AppError::History(format!("Failed to create history table: {}", e)))?;

        tracing::debug!("Opened history store at {:?} (retain {})", path, retain);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
            retain,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| AppError::History("History connection poisoned".to_string()))?;
            op(&mut guard)
        })
        .await
        .map_err(|e| AppError::History(format!("History task failed: {}", e)))?
    }
}

fn insert_with_prune(conn: &mut Connection, retain: usize, record: &ConversationRecord) -> AppResult<usize> {
    let tx = conn
        .transaction()
        .map_err(|e| AppError::History(format!("Failed to begin transaction: {}", e)))?;

    let pruned = tx
        .execute(
            "DELETE FROM conversations WHERE rowid NOT IN (
                 SELECT rowid FROM conversations ORDER BY rowid DESC LIMIT ?1
             )",
            params![retain as i64],
        )
        .map_err(|e| AppError::History(format!("Failed to prune history: {}", e)))?;

    tx.execute(
        "INSERT INTO conversations (conversation_id, question, answer, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            record.conversation_id,
            record.question,
            record.answer,
            record.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        ],
    )
    .map_err(|e| AppError::History(format!("Failed to insert conversation: {}", e)))?;

    tx.commit()
        .map_err(|e| AppError::History(format!("Failed to commit conversation: {}", e)))?;

    Ok(pruned)
}

fn select_recent(conn: &Connection, limit: usize) -> AppResult<Vec<ConversationRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT conversation_id, question, answer, created_at FROM conversations
             ORDER BY rowid DESC LIMIT ?1",
        )
        .map_err(|e| AppError::History(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(|e| AppError::History(format!("Failed to query history: {}", e)))?;

    let mut records = Vec::new();
    for row in rows {
        let (conversation_id, question, answer, created_at) =
            row.map_err(|e| AppError::History(format!("Failed to read history row: {}", e)))?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| AppError::History(format!("Invalid timestamp {}: {}", created_at, e)))?
            .with_timezone(&Utc);
        records.push(ConversationRecord {
            conversation_id,
            question,
            answer,
            created_at,
        });
    }

    Ok(records)
}

#[async_trait::async_trait]
impl HistoryStore for SqliteHistory {
    async fn record(&self, record: ConversationRecord) -> AppResult<()> {
        let retain = self.retain;
        let conversation_id = record.conversation_id.clone();
        let pruned = self
            .with_conn(move |conn| insert_with_prune(conn, retain, &record))
            .await?;

        tracing::debug!(conversation_id, pruned, "Recorded conversation");
        Ok(())
    }

    async fn recent(&self, limit: usize) -> AppResult<Vec<ConversationRecord>> {
        self.with_conn(move |conn| select_recent(conn, limit)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp: &TempDir, retain: usize) -> SqliteHistory {
        SqliteHistory::open(&temp.path().join(".motolaw/history.sqlite"), retain).unwrap()
    }

    #[tokio::test]
    async fn test_record_and_recent_newest_first() {
        let temp = TempDir::new().unwrap();
        let history = store(&temp, 10);

        history
            .record(ConversationRecord::new("駕照更換規定?", "應於期滿前換照"))
            .await
            .unwrap();
        history
            .record(ConversationRecord::new("高速公路速限?", "依標誌"))
            .await
            .unwrap();

        let records = history.recent(10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].question, "高速公路速限?");
        assert_eq!(records[1].answer, "應於期滿前換照");
    }

    #[tokio::test]
    async fn test_retention_keeps_two_plus_new() {
        let temp = TempDir::new().unwrap();
        let history = store(&temp, 2);

        for i in 0..5 {
            history
                .record(ConversationRecord::new(format!("q{}", i), format!("a{}", i)))
                .await
                .unwrap();
        }

        let records = history.recent(10).await.unwrap();
        let questions: Vec<_> = records.iter().map(|r| r.question.as_str()).collect();
        assert_eq!(questions, vec!["q4", "q3", "q2"]);
    }

    #[tokio::test]
    async fn test_recent_respects_limit() {
        let temp = TempDir::new().unwrap();
        let history = store(&temp, 5);
        for i in 0..3 {
            history
                .record(ConversationRecord::new(format!("q{}", i), "a"))
                .await
                .unwrap();
        }

        assert_eq!(history.recent(1).await.unwrap().len(), 1);
        assert!(history.recent(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timestamp_round_trip() {
        let temp = TempDir::new().unwrap();
        let history = store(&temp, 2);
        let record = ConversationRecord::new("q", "a");
        history.record(record.clone()).await.unwrap();

        let stored = history.recent(1).await.unwrap().remove(0);
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn test_reopen_keeps_records() {
        let temp = TempDir::new().unwrap();
        store(&temp, 2)
            .record(ConversationRecord::new("q", "a"))
            .await
            .unwrap();

        let reopened = store(&temp, 2);
        assert_eq!(reopened.recent(5).await.unwrap().len(), 1);
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_value(ConversationRecord::new("q", "a")).unwrap();
        assert!(json.get("conversationId").is_some());
        assert!(json.get("createdAt").is_some());
    }
}
