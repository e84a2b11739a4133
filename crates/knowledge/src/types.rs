//! Knowledge system type definitions.

use crate::embeddings::EmbeddingConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a knowledge base, stored in `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseConfig {
    /// Name of the knowledge base
    pub name: String,

    /// Chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    /// Overlap between consecutive chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,

    /// Embedding provider settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

fn default_chunk_size() -> u32 {
    1000
}

fn default_chunk_overlap() -> u32 {
    200
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

/// A learned source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSource {
    /// Unique source identifier
    pub id: String,

    /// File path or URL the text came from
    pub location: String,

    /// Content type ("markdown", "html", "text")
    pub content_type: String,

    /// SHA-256 of the extracted text
    pub content_hash: String,

    /// When this source was learned
    pub learned_at: DateTime<Utc>,

    /// Extracted text size in bytes
    pub size_bytes: u64,
}

/// A text chunk with embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    /// Unique chunk identifier
    pub id: String,

    /// Source document ID
    pub source_id: String,

    /// Position within source
    pub position: u32,

    /// Text content
    pub text: String,

    /// Embedding vector
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Metadata (location, byte offset)
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Options for the learn operation.
#[derive(Debug, Clone, Default)]
pub struct LearnOptions {
    /// Knowledge base name
    pub base_name: String,

    /// Local paths to learn from
    pub paths: Vec<PathBuf>,

    /// URLs to fetch and learn
    pub urls: Vec<String>,

    /// Substring patterns a path must contain (any)
    pub include: Vec<String>,

    /// Substring patterns that exclude a path
    pub exclude: Vec<String>,

    /// Reset the base before learning
    pub reset: bool,
}

/// Statistics from a learn operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearnStats {
    /// Number of sources indexed
    pub sources_count: u32,

    /// Sources skipped as unchanged
    pub unchanged_count: u32,

    /// Sources that failed to parse or fetch
    pub failed_count: u32,

    /// Number of chunks created
    pub chunks_count: u32,

    /// Total bytes processed
    pub bytes_processed: u64,

    /// Duration in seconds
    pub duration_secs: f64,
}

/// A chunk returned by retrieval together with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: KnowledgeChunk,
    pub score: f32,
}

/// Statistics for a knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseStats {
    /// Base name
    pub base_name: String,

    /// Number of sources
    pub sources_count: u32,

    /// Number of chunks
    pub chunks_count: u32,

    /// Database size in bytes
    pub db_size_bytes: u64,

    /// Most recent learn timestamp
    pub last_learn_at: Option<DateTime<Utc>>,

    /// Embedding provider and model recorded in the index
    pub embedding: Option<String>,
}

/// Internal chunk candidate before embedding.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub source_id: String,
    pub position: u32,
    pub text: String,
    pub metadata: serde_json::Value,
}
