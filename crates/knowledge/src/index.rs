//! SQLite-backed vector index for knowledge chunks.

use crate::types::{KnowledgeChunk, KnowledgeSource, ScoredChunk};
use chrono::{DateTime, Utc};
use motolaw_core::{AppError, AppResult};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;

/// Meta key holding the embedding signature the index was built with.
pub const EMBEDDING_META_KEY: &str = "embedding";

/// Initialize the SQLite index database.
pub fn init_index(db_path: &Path) -> AppResult<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::Knowledge(format!("Failed to create index directory: {}", e)))?;
    }

    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Knowledge(format!("Failed to open SQLite index: {}", e)))?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            id TEXT PRIMARY KEY,
            location TEXT NOT NULL UNIQUE,
            content_type TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            learned_at TEXT NOT NULL,
            size_bytes INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata TEXT,
            FOREIGN KEY (source_id) REFERENCES sources(id)
        );

        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_id);
        "#,
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to create tables: {}", e)))?;

    tracing::debug!("Initialized SQLite index at {:?}", db_path);
    Ok(conn)
}

/// Open an existing index for querying only.
pub fn open_index_readonly(db_path: &Path) -> AppResult<Connection> {
    Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to open SQLite index {:?}: {}", db_path, e)))
}

/// Insert a source into the index.
pub fn insert_source(conn: &Connection, source: &KnowledgeSource) -> AppResult<()> {
    conn.execute(
        "INSERT INTO sources (id, location, content_type, content_hash, learned_at, size_bytes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            source.id,
            source.location,
            source.content_type,
            source.content_hash,
            source.learned_at.to_rfc3339(),
            source.size_bytes as i64,
        ],
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to insert source: {}", e)))?;

    Ok(())
}

/// Look up a learned source by location, returning its id and content hash.
pub fn find_source(conn: &Connection, location: &str) -> AppResult<Option<(String, String)>> {
    conn.query_row(
        "SELECT id, content_hash FROM sources WHERE location = ?1",
        params![location],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
    .map_err(|e| AppError::Knowledge(format!("Failed to look up source: {}", e)))
}

/// Delete a source and all of its chunks.
pub fn delete_source(conn: &Connection, source_id: &str) -> AppResult<()> {
    conn.execute("DELETE FROM chunks WHERE source_id = ?1", params![source_id])
        .map_err(|e| AppError::Knowledge(format!("Failed to delete chunks: {}", e)))?;
    conn.execute("DELETE FROM sources WHERE id = ?1", params![source_id])
        .map_err(|e| AppError::Knowledge(format!("Failed to delete source: {}", e)))?;
    Ok(())
}

/// Insert a chunk with embedding into the index.
pub fn insert_chunk(conn: &Connection, chunk: &KnowledgeChunk) -> AppResult<()> {
    let embedding_bytes = embedding_to_bytes(
        chunk
            .embedding
            .as_ref()
            .ok_or_else(|| AppError::Knowledge("Chunk missing embedding".to_string()))?,
    );

    let metadata_json = serde_json::to_string(&chunk.metadata)
        .map_err(|e| AppError::Knowledge(format!("Failed to serialize metadata: {}", e)))?;

    conn.execute(
        "INSERT OR REPLACE INTO chunks (id, source_id, position, text, embedding, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            chunk.id,
            chunk.source_id,
            chunk.position as i64,
            chunk.text,
            embedding_bytes,
            metadata_json,
        ],
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to insert chunk: {}", e)))?;

    Ok(())
}

/// Query the index for the top-k most similar chunks, best first.
pub fn query_chunks(
    conn: &Connection,
    query_embedding: &[f32],
    top_k: usize,
) -> AppResult<Vec<ScoredChunk>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, source_id, position, text, embedding, metadata FROM chunks
             ORDER BY source_id, position",
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map([], |row| {
            let embedding_bytes: Vec<u8> = row.get(4)?;
            let metadata_json: Option<String> = row.get(5)?;
            Ok((
                KnowledgeChunk {
                    id: row.get(0)?,
                    source_id: row.get(1)?,
                    position: row.get::<_, i64>(2)? as u32,
                    text: row.get(3)?,
                    embedding: None,
                    metadata: serde_json::Value::Null,
                },
                embedding_bytes,
                metadata_json,
            ))
        })
        .map_err(|e| AppError::Knowledge(format!("Failed to query chunks: {}", e)))?;

    let mut results = Vec::new();
    for row in rows {
        let (mut chunk, embedding_bytes, metadata_json) =
            row.map_err(|e| AppError::Knowledge(format!("Failed to read chunk: {}", e)))?;

        let embedding = bytes_to_embedding(&embedding_bytes)?;
        if let Some(json) = metadata_json {
            chunk.metadata = serde_json::from_str(&json).unwrap_or(serde_json::Value::Null);
        }

        let score = cosine_similarity(query_embedding, &embedding);
        results.push(ScoredChunk { chunk, score });
    }

    // Stable sort keeps index order among ties
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top_k);

    tracing::debug!(
        "Retrieved {} chunks (requested top-{})",
        results.len(),
        top_k
    );

    Ok(results)
}

/// Get source count, chunk count and the most recent learn time.
pub fn get_stats(conn: &Connection) -> AppResult<(u32, u32, Option<DateTime<Utc>>)> {
    let sources_count: u32 = conn
        .query_row("SELECT COUNT(*) FROM sources", [], |row| {
            row.get::<_, i64>(0).map(|v| v as u32)
        })
        .map_err(|e| AppError::Knowledge(format!("Failed to count sources: {}", e)))?;

    let chunks_count: u32 = conn
        .query_row("SELECT COUNT(*) FROM chunks", [], |row| {
            row.get::<_, i64>(0).map(|v| v as u32)
        })
        .map_err(|e| AppError::Knowledge(format!("Failed to count chunks: {}", e)))?;

    let last_learned: Option<String> = conn
        .query_row("SELECT MAX(learned_at) FROM sources", [], |row| row.get(0))
        .map_err(|e| AppError::Knowledge(format!("Failed to read learn time: {}", e)))?;

    let last_learned = last_learned
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok((sources_count, chunks_count, last_learned))
}

/// Read a meta value.
pub fn get_meta(conn: &Connection, key: &str) -> AppResult<Option<String>> {
    conn.query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
        row.get(0)
    })
    .optional()
    .map_err(|e| AppError::Knowledge(format!("Failed to read index meta: {}", e)))
}

/// Write a meta value.
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> AppResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        params![key, value],
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to write index meta: {}", e)))?;
    Ok(())
}

/// Reset the index (delete all data).
pub fn reset_index(conn: &Connection) -> AppResult<()> {
    conn.execute_batch("DELETE FROM chunks; DELETE FROM sources; DELETE FROM meta;")
        .map_err(|e| AppError::Knowledge(format!("Failed to reset index: {}", e)))?;

    tracing::info!("Reset knowledge base index");
    Ok(())
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Knowledge(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(id: &str, location: &str) -> KnowledgeSource {
        KnowledgeSource {
            id: id.to_string(),
            location: location.to_string(),
            content_type: "text".to_string(),
            content_hash: "abc".to_string(),
            learned_at: Utc::now(),
            size_bytes: 100,
        }
    }

    fn chunk(id: &str, source_id: &str, position: u32, embedding: Vec<f32>) -> KnowledgeChunk {
        KnowledgeChunk {
            id: id.to_string(),
            source_id: source_id.to_string(),
            position,
            text: format!("text of {}", id),
            embedding: Some(embedding),
            metadata: serde_json::json!({"offset": 0}),
        }
    }

    #[test]
    fn test_init_index() {
        let temp = TempDir::new().unwrap();
        let conn = init_index(&temp.path().join("kb/index.sqlite")).unwrap();

        let table_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table'",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(table_count, 3);
    }

    #[test]
    fn test_insert_and_query_orders_by_similarity() {
        let temp = TempDir::new().unwrap();
        let conn = init_index(&temp.path().join("index.sqlite")).unwrap();

        insert_source(&conn, &source("s1", "rules.md")).unwrap();
        insert_chunk(&conn, &chunk("c1", "s1", 0, vec![0.0, 1.0, 0.0])).unwrap();
        insert_chunk(&conn, &chunk("c2", "s1", 1, vec![1.0, 0.0, 0.0])).unwrap();
        insert_chunk(&conn, &chunk("c3", "s1", 2, vec![0.7, 0.7, 0.0])).unwrap();

        let results = query_chunks(&conn, &[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "c2");
        assert_eq!(results[1].chunk.id, "c3");
        assert_eq!(results[0].chunk.metadata["offset"], 0);
    }

    #[test]
    fn test_find_and_delete_source() {
        let temp = TempDir::new().unwrap();
        let conn = init_index(&temp.path().join("index.sqlite")).unwrap();

        insert_source(&conn, &source("s1", "rules.md")).unwrap();
        insert_chunk(&conn, &chunk("c1", "s1", 0, vec![1.0])).unwrap();

        let found = find_source(&conn, "rules.md").unwrap();
        assert_eq!(found, Some(("s1".to_string(), "abc".to_string())));
        assert!(find_source(&conn, "other.md").unwrap().is_none());

        delete_source(&conn, "s1").unwrap();
        let (sources, chunks, _) = get_stats(&conn).unwrap();
        assert_eq!((sources, chunks), (0, 0));
    }

    #[test]
    fn test_stats_and_meta() {
        let temp = TempDir::new().unwrap();
        let conn = init_index(&temp.path().join("index.sqlite")).unwrap();

        insert_source(&conn, &source("s1", "a.md")).unwrap();
        insert_chunk(&conn, &chunk("c1", "s1", 0, vec![1.0])).unwrap();
        set_meta(&conn, EMBEDDING_META_KEY, "trigram/trigram-v1/384").unwrap();

        let (sources, chunks, last) = get_stats(&conn).unwrap();
        assert_eq!((sources, chunks), (1, 1));
        assert!(last.is_some());
        assert_eq!(
            get_meta(&conn, EMBEDDING_META_KEY).unwrap().as_deref(),
            Some("trigram/trigram-v1/384")
        );

        reset_index(&conn).unwrap();
        assert!(get_meta(&conn, EMBEDDING_META_KEY).unwrap().is_none());
        assert_eq!(get_stats(&conn).unwrap().0, 0);
    }

    #[test]
    fn test_readonly_open_rejects_writes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.sqlite");
        drop(init_index(&path).unwrap());

        let conn = open_index_readonly(&path).unwrap();
        assert!(insert_source(&conn, &source("s1", "a.md")).is_err());
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
