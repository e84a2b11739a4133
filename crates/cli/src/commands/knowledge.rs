//! Knowledge command handler.
//!
//! Handles learning, inspecting and resetting the regulation knowledge base.

use clap::{Args, Subcommand};
use motolaw_core::{config::AppConfig, AppResult};
use motolaw_knowledge::LearnOptions;
use std::path::PathBuf;

/// Knowledge base management
#[derive(Args, Debug)]
pub struct KnowledgeCommand {
    #[command(subcommand)]
    pub action: KnowledgeAction,
}

#[derive(Subcommand, Debug)]
pub enum KnowledgeAction {
    /// Learn from sources (files, directories, URLs)
    Learn(KnowledgeLearnCommand),
    /// Clean up knowledge base
    Clean(KnowledgeCleanCommand),
    /// Show knowledge base statistics
    Stats(KnowledgeStatsCommand),
}

/// Learn from sources
#[derive(Args, Debug)]
pub struct KnowledgeLearnCommand {
    /// Knowledge base name (default: knowledge.base from config)
    #[arg(long)]
    pub base: Option<String>,

    /// Paths to learn from
    #[arg(long)]
    pub path: Vec<PathBuf>,

    /// URLs to fetch and learn
    #[arg(long)]
    pub url: Vec<String>,

    /// Only learn paths containing one of these patterns
    #[arg(long)]
    pub include: Vec<String>,

    /// Skip paths containing one of these patterns
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Reset base before learning
    #[arg(long)]
    pub reset: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl KnowledgeLearnCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let base = base_name(&self.base, config);
        tracing::info!("Executing knowledge learn command for base '{}'", base);

        let options = LearnOptions {
            base_name: base.clone(),
            paths: self.path.clone(),
            urls: self.url.clone(),
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            reset: self.reset,
        };

        let stats = motolaw_knowledge::learn(&config.workspace, options).await?;

        if self.json {
            let output = serde_json::json!({
                "base": base,
                "sourcesCount": stats.sources_count,
                "unchangedCount": stats.unchanged_count,
                "failedCount": stats.failed_count,
                "chunksCount": stats.chunks_count,
                "bytesProcessed": stats.bytes_processed,
                "durationSecs": stats.duration_secs,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!(
                "Learned {} sources ({} chunks, {} bytes) in {:.2}s",
                stats.sources_count, stats.chunks_count, stats.bytes_processed, stats.duration_secs
            );
            if stats.unchanged_count > 0 {
                println!("  {} unchanged sources skipped", stats.unchanged_count);
            }
            if stats.failed_count > 0 {
                println!("  {} sources failed (see log for details)", stats.failed_count);
            }
        }

        Ok(())
    }
}

/// Clean knowledge base
#[derive(Args, Debug)]
pub struct KnowledgeCleanCommand {
    /// Knowledge base name (default: knowledge.base from config)
    #[arg(long)]
    pub base: Option<String>,
}

impl KnowledgeCleanCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let base = base_name(&self.base, config);
        tracing::info!("Executing knowledge clean command for base '{}'", base);

        motolaw_knowledge::clean(&config.workspace, &base)?;

        println!("Knowledge base '{}' cleaned", base);

        Ok(())
    }
}

/// Show knowledge base stats
#[derive(Args, Debug)]
pub struct KnowledgeStatsCommand {
    /// Knowledge base name (default: knowledge.base from config)
    #[arg(long)]
    pub base: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl KnowledgeStatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let base = base_name(&self.base, config);
        tracing::info!("Executing knowledge stats command for base '{}'", base);

        let stats = motolaw_knowledge::stats(&config.workspace, &base)?;

        if self.json {
            let output = serde_json::json!({
                "base": stats.base_name,
                "sourcesCount": stats.sources_count,
                "chunksCount": stats.chunks_count,
                "dbSizeBytes": stats.db_size_bytes,
                "lastLearnAt": stats.last_learn_at,
                "embedding": stats.embedding,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("Knowledge base: {}", stats.base_name);
            println!("  Sources: {}", stats.sources_count);
            println!("  Chunks: {}", stats.chunks_count);
            println!("  DB size: {} bytes", stats.db_size_bytes);
            if let Some(embedding) = stats.embedding {
                println!("  Embedding: {}", embedding);
            }
            if let Some(last_learn) = stats.last_learn_at {
                println!("  Last learn: {}", last_learn);
            }
        }

        Ok(())
    }
}

impl KnowledgeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            KnowledgeAction::Learn(cmd) => cmd.execute(config).await,
            KnowledgeAction::Clean(cmd) => cmd.execute(config).await,
            KnowledgeAction::Stats(cmd) => cmd.execute(config).await,
        }
    }
}

fn base_name(explicit: &Option<String>, config: &AppConfig) -> String {
    explicit
        .clone()
        .unwrap_or_else(|| config.knowledge.base.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> AppConfig {
        AppConfig {
            workspace: dir.path().to_path_buf(),
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_base_defaults_to_config() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);

        assert_eq!(base_name(&None, &config), config.knowledge.base);
        assert_eq!(base_name(&Some("other".to_string()), &config), "other");
    }

    #[tokio::test]
    async fn test_learn_then_stats_and_clean() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        let doc = temp.path().join("rules.md");
        std::fs::write(&doc, "# 道路交通管理處罰條例\n\n大型重型機車駕駛人應年滿二十歲。").unwrap();

        KnowledgeLearnCommand {
            base: None,
            path: vec![doc],
            url: vec![],
            include: vec![],
            exclude: vec![],
            reset: false,
            json: true,
        }
        .execute(&config)
        .await
        .unwrap();

        let stats = motolaw_knowledge::stats(&config.workspace, &config.knowledge.base).unwrap();
        assert_eq!(stats.sources_count, 1);
        assert!(stats.chunks_count >= 1);

        KnowledgeCleanCommand { base: None }
            .execute(&config)
            .await
            .unwrap();
        let stats = motolaw_knowledge::stats(&config.workspace, &config.knowledge.base).unwrap();
        assert_eq!(stats.chunks_count, 0);
    }
}
