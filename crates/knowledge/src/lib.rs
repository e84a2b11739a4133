//! Knowledge base management.
//!
//! Local-first retrieval over an SQLite index of embedded text chunks, plus
//! the web search client used as the live evidence source.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod parser;
pub mod types;
pub mod web;

pub use embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
pub use types::{
    BaseStats, KnowledgeBaseConfig, KnowledgeChunk, KnowledgeSource, LearnOptions, LearnStats,
    ScoredChunk,
};
pub use web::{WebResult, WebSearchClient};

use chrono::Utc;
use motolaw_core::{AppError, AppResult};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

/// Timeout for fetching URL sources during learn.
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// A parsed source ready for chunking.
struct ParsedSource {
    location: String,
    content_type: parser::ContentType,
    text: String,
}

/// Learn from sources and populate the knowledge base.
///
/// Sources whose extracted text is unchanged since the last learn are
/// skipped; changed sources replace their previous chunks.
pub async fn learn(workspace: &Path, options: LearnOptions) -> AppResult<LearnStats> {
    let start = Instant::now();

    tracing::info!("Starting learn operation for base '{}'", options.base_name);

    let config = config::load_config(workspace, &options.base_name)?;
    let index_path = config::get_index_path(workspace, &options.base_name);
    let mut conn = index::init_index(&index_path)?;

    if options.reset {
        tracing::info!("Resetting knowledge base");
        index::reset_index(&conn)?;
    }

    match index::get_meta(&conn, index::EMBEDDING_META_KEY)? {
        Some(recorded) => config.embedding.validate_consistency(&recorded)?,
        None => index::set_meta(
            &conn,
            index::EMBEDDING_META_KEY,
            &config.embedding.signature(),
        )?,
    }

    let provider = create_provider(&config.embedding)?;
    let mut stats = LearnStats::default();

    for path in collect_paths(&options) {
        let parsed = parser::parse_file(&path).map(|(text, content_type)| ParsedSource {
            location: path.to_string_lossy().to_string(),
            content_type,
            text,
        });
        index_source(&mut conn, provider.as_ref(), &config, parsed, &mut stats).await;
    }

    for url in &options.urls {
        let parsed = parser::fetch_url(url, FETCH_TIMEOUT)
            .await
            .map(|(text, content_type)| ParsedSource {
                location: url.clone(),
                content_type,
                text,
            });
        index_source(&mut conn, provider.as_ref(), &config, parsed, &mut stats).await;
    }

    config::save_config(workspace, &config)?;

    stats.duration_secs = start.elapsed().as_secs_f64();

    tracing::info!(
        "Learn operation completed: {} sources, {} unchanged, {} failed, {} chunks, {} bytes in {:.2}s",
        stats.sources_count,
        stats.unchanged_count,
        stats.failed_count,
        stats.chunks_count,
        stats.bytes_processed,
        stats.duration_secs
    );

    Ok(stats)
}

/// Expand file and directory arguments into the files to learn.
fn collect_paths(options: &LearnOptions) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in &options.paths {
        if path.is_file() {
            files.push(path.clone());
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let entry_path = entry.path();
                if entry_path.is_file() && should_include(entry_path, options) {
                    files.push(entry_path.to_path_buf());
                }
            }
        } else {
            tracing::warn!("Skipping missing path: {:?}", path);
        }
    }
    files
}

/// Check if a file should be included based on patterns.
fn should_include(path: &Path, options: &LearnOptions) -> bool {
    let path_str = path.to_string_lossy();

    if options.exclude.iter().any(|p| path_str.contains(p.as_str())) {
        return false;
    }

    options.include.is_empty() || options.include.iter().any(|p| path_str.contains(p.as_str()))
}

/// Index one parsed source, recording the outcome in `stats`.
async fn index_source(
    conn: &mut Connection,
    provider: &dyn EmbeddingProvider,
    config: &KnowledgeBaseConfig,
    parsed: AppResult<ParsedSource>,
    stats: &mut LearnStats,
) {
    let parsed = match parsed {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("Skipping source: {}", e);
            stats.failed_count += 1;
            return;
        }
    };

    let location = parsed.location.clone();
    match embed_and_store(conn, provider, config, parsed).await {
        Ok(Some((chunks, bytes))) => {
            stats.sources_count += 1;
            stats.chunks_count += chunks;
            stats.bytes_processed += bytes;
        }
        Ok(None) => stats.unchanged_count += 1,
        Err(e) => {
            tracing::warn!("Failed to index {}: {}", location, e);
            stats.failed_count += 1;
        }
    }
}

/// Chunk, embed and write a source. Returns `None` when it is unchanged.
async fn embed_and_store(
    conn: &mut Connection,
    provider: &dyn EmbeddingProvider,
    config: &KnowledgeBaseConfig,
    parsed: ParsedSource,
) -> AppResult<Option<(u32, u64)>> {
    let content_hash = format!("{:x}", Sha256::digest(parsed.text.as_bytes()));

    let previous = index::find_source(conn, &parsed.location)?;
    if let Some((_, ref hash)) = previous {
        if *hash == content_hash {
            tracing::debug!("Unchanged source: {}", parsed.location);
            return Ok(None);
        }
    }

    let source = KnowledgeSource {
        id: uuid::Uuid::new_v4().to_string(),
        location: parsed.location,
        content_type: parsed.content_type.as_str().to_string(),
        content_hash,
        learned_at: Utc::now(),
        size_bytes: parsed.text.len() as u64,
    };

    let candidates = chunker::chunk_text(
        &source.id,
        &source.location,
        &parsed.text,
        config.chunk_size as usize,
        config.chunk_overlap as usize,
    )?;

    let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
    let embeddings = provider.embed_batch(&texts).await?;
    if embeddings.len() != candidates.len() {
        return Err(AppError::Knowledge(format!(
            "Embedding provider returned {} vectors for {} chunks",
            embeddings.len(),
            candidates.len()
        )));
    }

    let tx = conn
        .transaction()
        .map_err(|e| AppError::Knowledge(format!("Failed to begin transaction: {}", e)))?;

    if let Some((old_id, _)) = previous {
        tracing::debug!("Replacing changed source: {}", source.location);
        index::delete_source(&tx, &old_id)?;
    }
    index::insert_source(&tx, &source)?;

    let chunks_count = candidates.len() as u32;
    for (candidate, embedding) in candidates.into_iter().zip(embeddings) {
        let chunk = KnowledgeChunk {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: candidate.source_id,
            position: candidate.position,
            text: candidate.text,
            embedding: Some(embedding),
            metadata: candidate.metadata,
        };
        index::insert_chunk(&tx, &chunk)?;
    }

    tx.commit()
        .map_err(|e| AppError::Knowledge(format!("Failed to commit source: {}", e)))?;

    tracing::debug!(
        "Indexed {}: {} chunks, {} bytes",
        source.location,
        chunks_count,
        source.size_bytes
    );

    Ok(Some((chunks_count, source.size_bytes)))
}

/// Read-only handle on a learned knowledge base.
///
/// Cheap to clone and safe to share across concurrent queries; every query
/// opens its own read-only SQLite connection on the blocking pool.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    name: String,
    index_path: PathBuf,
    provider: Arc<dyn EmbeddingProvider>,
    top_k: usize,
}

impl KnowledgeBase {
    /// Open a base that has been learned.
    pub fn open(workspace: &Path, base_name: &str, top_k: usize) -> AppResult<Self> {
        let config = config::load_config(workspace, base_name)?;
        let index_path = config::get_index_path(workspace, base_name);

        if !index_path.exists() {
            return Err(AppError::Knowledge(format!(
                "Knowledge base '{}' has no index. Run 'motolaw knowledge learn' first.",
                base_name
            )));
        }

        let conn = index::open_index_readonly(&index_path)?;
        if let Some(recorded) = index::get_meta(&conn, index::EMBEDDING_META_KEY)? {
            config.embedding.validate_consistency(&recorded)?;
        }

        Ok(Self {
            name: base_name.to_string(),
            index_path,
            provider: create_provider(&config.embedding)?,
            top_k,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return up to `top_k` chunks most similar to `query`, best first.
    ///
    /// Chunks with no similarity at all are left out.
    pub async fn retrieve(&self, query: &str) -> AppResult<Vec<ScoredChunk>> {
        let query_embedding = self.provider.embed(query).await?;
        let index_path = self.index_path.clone();
        let top_k = self.top_k;

        let results = tokio::task::spawn_blocking(move || {
            let conn = index::open_index_readonly(&index_path)?;
            index::query_chunks(&conn, &query_embedding, top_k)
        })
        .await
        .map_err(|e| AppError::Knowledge(format!("Retrieval task failed: {}", e)))??;

        let results: Vec<ScoredChunk> = results.into_iter().filter(|r| r.score > 0.0).collect();

        tracing::debug!(
            base = %self.name,
            hits = results.len(),
            top_score = results.first().map(|r| r.score).unwrap_or(0.0),
            "Knowledge base retrieval"
        );

        Ok(results)
    }
}

/// Clean (reset) a knowledge base.
pub fn clean(workspace: &Path, base_name: &str) -> AppResult<()> {
    tracing::info!("Cleaning knowledge base '{}'", base_name);

    let index_path = config::get_index_path(workspace, base_name);
    if !index_path.exists() {
        return Err(AppError::Knowledge(format!(
            "Knowledge base '{}' does not exist",
            base_name
        )));
    }

    let conn = index::init_index(&index_path)?;
    index::reset_index(&conn)?;

    tracing::info!("Knowledge base '{}' cleaned", base_name);
    Ok(())
}

/// Get statistics for a knowledge base.
pub fn stats(workspace: &Path, base_name: &str) -> AppResult<BaseStats> {
    let index_path = config::get_index_path(workspace, base_name);
    if !index_path.exists() {
        return Err(AppError::Knowledge(format!(
            "Knowledge base '{}' does not exist",
            base_name
        )));
    }

    let conn = index::open_index_readonly(&index_path)?;
    let (sources_count, chunks_count, last_learn_at) = index::get_stats(&conn)?;
    let embedding = index::get_meta(&conn, index::EMBEDDING_META_KEY)?;

    let db_size_bytes = std::fs::metadata(&index_path).map(|m| m.len()).unwrap_or(0);

    Ok(BaseStats {
        base_name: base_name.to_string(),
        sources_count,
        chunks_count,
        db_size_bytes,
        last_learn_at,
        embedding,
    })
}

#[cfg(test)]
mod tests;
