//! Prompt loader for YAML prompt definitions.
//!
//! A prompt is resolved from `.motolaw/prompts/<id>.yml` when that file
//! exists, otherwise from the built-in definition with the same id.

use crate::builtin::{builtin_source, BUILTIN_PROMPT_IDS};
use crate::types::{PromptDefinition, PromptOrigin};
use motolaw_core::config::STATE_DIR;
use motolaw_core::{AppError, AppResult};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(STATE_DIR).join("prompts")
}

/// Load a prompt definition by ID.
///
/// # Arguments
/// * `workspace_path` - Root workspace directory containing `.motolaw/`
/// * `prompt_id` - Prompt identifier (e.g., "judge.safety")
///
/// # Example
/// ```no_run
/// use motolaw_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (prompt, origin) = load_prompt(Path::new("."), "answer.rag")?;
/// println!("Loaded prompt: {} ({:?})", prompt.title, origin);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(
    workspace_path: &Path,
    prompt_id: &str,
) -> AppResult<(PromptDefinition, PromptOrigin)> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    let (contents, origin) = if prompt_file.exists() {
        tracing::debug!("Loading prompt override from: {:?}", prompt_file);
        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read prompt file {:?}: {}",
                prompt_file, e
            ))
        })?;
        (contents, PromptOrigin::Workspace)
    } else if let Some(source) = builtin_source(prompt_id) {
        (source.to_string(), PromptOrigin::BuiltIn)
    } else {
        return Err(AppError::Prompt(format!("Unknown prompt: {}", prompt_id)));
    };

    let definition: PromptDefinition = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", prompt_id, e))
    })?;

    validate_prompt(&definition, prompt_id)?;

    tracing::debug!(
        "Loaded prompt: {} ({}, {:?})",
        definition.id,
        definition.title,
        origin
    );

    Ok((definition, origin))
}

/// List every resolvable prompt id with its origin, sorted by id.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<(String, PromptOrigin)>> {
    let mut prompts: BTreeMap<String, PromptOrigin> = BUILTIN_PROMPT_IDS
        .iter()
        .map(|id| (id.to_string(), PromptOrigin::BuiltIn))
        .collect();

    let dir = prompts_dir(workspace_path);
    if dir.exists() {
        for entry in walkdir::WalkDir::new(&dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    prompts.insert(stem.to_string(), PromptOrigin::Workspace);
                }
            }
        }
    }

    Ok(prompts.into_iter().collect())
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition, requested_id: &str) -> AppResult<()> {
    if def.id != requested_id {
        return Err(AppError::Prompt(format!(
            "Prompt file for {} declares id {}",
            requested_id, def.id
        )));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}

/// Every built-in prompt, resolved once against a workspace.
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    prompts: HashMap<String, PromptDefinition>,
}

impl PromptCatalog {
    /// Resolve all built-in ids, applying workspace overrides.
    pub fn load(workspace_path: &Path) -> AppResult<Self> {
        let mut prompts = HashMap::new();
        for id in BUILTIN_PROMPT_IDS {
            let (definition, origin) = load_prompt(workspace_path, id)?;
            if origin == PromptOrigin::Workspace {
                tracing::info!(prompt = id, "Using workspace prompt override");
            }
            prompts.insert(id.to_string(), definition);
        }
        Ok(Self { prompts })
    }

    /// Built-in prompts only.
    pub fn builtin() -> AppResult<Self> {
        let mut prompts = HashMap::new();
        for id in BUILTIN_PROMPT_IDS {
            let source = builtin_source(id)
                .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", id)))?;
            let definition: PromptDefinition = serde_yaml::from_str(source)?;
            prompts.insert(id.to_string(), definition);
        }
        Ok(Self { prompts })
    }

    pub fn get(&self, prompt_id: &str) -> AppResult<&PromptDefinition> {
        self.prompts
            .get(prompt_id)
            .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_override(dir: &Path, id: &str, body: &str) {
        let prompts_dir = prompts_dir(dir);
        fs::create_dir_all(&prompts_dir).unwrap();
        fs::write(prompts_dir.join(format!("{}.yml", id)), body).unwrap();
    }

    fn override_yaml(id: &str) -> String {
        format!(
            r#"
id: {}
title: "Override"
apiVersion: "1.0"
createdBy: test
system: "Reply yes or no."
template: "Q: {{{{question}}}}"
output:
  format: label
"#,
            id
        )
    }

    #[test]
    fn test_load_builtin_prompt() {
        let temp_dir = TempDir::new().unwrap();
        let (prompt, origin) = load_prompt(temp_dir.path(), "judge.safety").unwrap();
        assert_eq!(prompt.id, "judge.safety");
        assert_eq!(origin, PromptOrigin::BuiltIn);
    }

    #[test]
    fn test_workspace_override_wins() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), "judge.safety", &override_yaml("judge.safety"));

        let (prompt, origin) = load_prompt(temp_dir.path(), "judge.safety").unwrap();
        assert_eq!(prompt.title, "Override");
        assert_eq!(origin, PromptOrigin::Workspace);
    }

    #[test]
    fn test_override_with_mismatched_id_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), "judge.route", &override_yaml("judge.safety"));

        assert!(load_prompt(temp_dir.path(), "judge.route").is_err());
    }

    #[test]
    fn test_load_unknown_prompt() {
        let temp_dir = TempDir::new().unwrap();
        assert!(load_prompt(temp_dir.path(), "nonexistent").is_err());
    }

    #[test]
    fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), "answer.rag", "invalid: yaml: content:");

        assert!(load_prompt(temp_dir.path(), "answer.rag").is_err());
    }

    #[test]
    fn test_list_prompts_marks_overrides() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), "answer.plain", &override_yaml("answer.plain"));
        write_override(temp_dir.path(), "custom.extra", &override_yaml("custom.extra"));

        let prompts = list_prompts(temp_dir.path()).unwrap();
        assert_eq!(prompts.len(), BUILTIN_PROMPT_IDS.len() + 1);
        assert!(prompts.contains(&("answer.plain".to_string(), PromptOrigin::Workspace)));
        assert!(prompts.contains(&("judge.route".to_string(), PromptOrigin::BuiltIn)));
        assert!(prompts.contains(&("custom.extra".to_string(), PromptOrigin::Workspace)));
    }

    #[test]
    fn test_catalog_resolves_all_builtins() {
        let temp_dir = TempDir::new().unwrap();
        write_override(temp_dir.path(), "judge.grounded", &override_yaml("judge.grounded"));

        let catalog = PromptCatalog::load(temp_dir.path()).unwrap();
        assert_eq!(catalog.get("judge.grounded").unwrap().title, "Override");
        assert_eq!(catalog.get("answer.rag").unwrap().output.format, "text");
        assert!(catalog.get("missing").is_err());

        assert!(PromptCatalog::builtin().unwrap().get("judge.route").is_ok());
    }
}
