//! Embedding providers for knowledge bases.
//!
//! Each base selects its provider in `config.yaml`; the index records the
//! provider signature so queries never mix vector spaces.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{create_provider, EmbeddingProvider};
