//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, PromptDefinition};
use motolaw_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;

/// Build a prompt from a definition and input variables.
///
/// Both the system and user templates are rendered with the same
/// variables. Every variable listed under `input.variables` must be
/// supplied.
///
/// # Example
/// ```no_run
/// use motolaw_prompt::{build_prompt, PromptDefinition};
/// use std::collections::HashMap;
///
/// # fn example(def: PromptDefinition) -> Result<(), Box<dyn std::error::Error>> {
/// let mut vars = HashMap::new();
/// vars.insert("question".to_string(), "駕照更換規定?".to_string());
///
/// let built = build_prompt(&def, vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::trace!("Building prompt: {}", definition.id);

    if let Some(missing) = definition
        .input
        .variables
        .iter()
        .find(|name| !variables.contains_key(*name))
    {
        return Err(AppError::Prompt(format!(
            "Prompt {} is missing variable: {}",
            definition.id, missing
        )));
    }

    let system = definition
        .system
        .as_deref()
        .map(|template| render_template(template, &variables))
        .transpose()?;
    let user = render_template(&definition.template, &variables)?;

    Ok(BuiltPrompt::new(
        system,
        user,
        definition.id.clone(),
        variables,
    ))
}

/// Render a Handlebars template with variables.
fn render_template(template: &str, variables: &HashMap<String, String>) -> AppResult<String> {
    let mut handlebars = Handlebars::new();

    // Plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);

    handlebars
        .register_template_string("prompt", template)
        .map_err(|e| AppError::Prompt(format!("Failed to register template: {}", e)))?;

    let rendered = handlebars
        .render("prompt", &variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))?;

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PromptInputSpec, PromptOutputSpec};

    fn create_test_definition() -> PromptDefinition {
        PromptDefinition {
            id: "judge.test".to_string(),
            title: "Test".to_string(),
            api_version: "1.0".to_string(),
            created_by: "test".to_string(),
            system: Some("Documents:\n{{documents}}".to_string()),
            template: "Question: {{question}}".to_string(),
            input: PromptInputSpec {
                variables: vec!["question".to_string(), "documents".to_string()],
            },
            output: PromptOutputSpec {
                format: "label".to_string(),
            },
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_simple_template() {
        let rendered = render_template(
            "Question: {{question}}",
            &vars(&[("question", "Hello, world!")]),
        )
        .unwrap();
        assert_eq!(rendered, "Question: Hello, world!");
    }

    #[test]
    fn test_render_does_not_escape() {
        let rendered =
            render_template("{{documents}}", &vars(&[("documents", "<a> & \"b\"")])).unwrap();
        assert_eq!(rendered, "<a> & \"b\"");
    }

    #[test]
    fn test_build_prompt_renders_system_and_user() {
        let def = create_test_definition();
        let built = build_prompt(
            &def,
            vars(&[("question", "駕照更換規定?"), ("documents", "第一條")]),
        )
        .unwrap();

        assert_eq!(built.system.as_deref(), Some("Documents:\n第一條"));
        assert_eq!(built.user, "Question: 駕照更換規定?");
        assert_eq!(built.metadata.source_prompt_id, "judge.test");
        assert_eq!(built.metadata.resolved_variables.len(), 2);
    }

    #[test]
    fn test_build_prompt_missing_variable() {
        let def = create_test_definition();
        let err = build_prompt(&def, vars(&[("question", "q")])).unwrap_err();
        assert!(err.to_string().contains("documents"));
    }
}
