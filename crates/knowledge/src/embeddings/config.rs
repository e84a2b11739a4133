//! Embedding configuration for a knowledge base.

use motolaw_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Embedding settings, the `embedding:` section of a base's `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    /// Provider name: "trigram" or "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Provider endpoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

impl EmbeddingConfig {
    /// Identity of the vector space produced by this configuration.
    pub fn signature(&self) -> String {
        format!("{}/{}/{}", self.provider, self.model, self.dimensions)
    }

    /// Check that an index built with `recorded` can be queried with this config.
    pub fn validate_consistency(&self, recorded: &str) -> AppResult<()> {
        let current = self.signature();
        if current != recorded {
            return Err(AppError::Knowledge(format!(
                "Embedding mismatch: index was built with '{}', config uses '{}'. \
                 Run 'motolaw knowledge learn --reset' to rebuild.",
                recorded, current
            )));
        }
        Ok(())
    }
}
