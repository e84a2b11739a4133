//! Prompt system for motolaw.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions
//! - Built-in defaults compiled into the binary
//! - Per-workspace overrides under `.motolaw/prompts/`
//! - Handlebars template rendering

pub mod builder;
pub mod builtin;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use builtin::BUILTIN_PROMPT_IDS;
pub use loader::{list_prompts, load_prompt, PromptCatalog};
pub use types::{
    BuiltPrompt, BuiltPromptMetadata, PromptDefinition, PromptInputSpec, PromptOrigin,
    PromptOutputSpec,
};
