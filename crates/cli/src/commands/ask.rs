//! Ask command handler.
//!
//! Runs one question through the workflow and prints the answer.

use crate::wiring::{build_orchestrator, open_history};
use clap::Args;
use motolaw_core::{config::AppConfig, AppError, AppResult};
use motolaw_history::HistoryStore;
use motolaw_prompt::{list_prompts, PromptOrigin};
use motolaw_workflow::RunOutcome;
use std::path::PathBuf;
use std::sync::Arc;

/// Ask a single question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    #[arg(required_unless_present = "file")]
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Do not record this exchange in history
    #[arg(long)]
    pub no_history: bool,

    /// Print a JSON run report (answer, visited steps, retries)
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");

        let question = self.read_question()?;
        tracing::debug!("Question: {}", question);

        if config.verbose {
            for (id, origin) in list_prompts(&config.workspace)? {
                let origin = match origin {
                    PromptOrigin::BuiltIn => "built-in",
                    PromptOrigin::Workspace => "workspace",
                };
                tracing::debug!(prompt = %id, origin, "Prompt available");
            }
        }

        let history = if self.no_history {
            None
        } else {
            open_history(config)?.map(|store| store as Arc<dyn HistoryStore>)
        };

        let orchestrator = build_orchestrator(config, history)?;
        let outcome = orchestrator.answer(&question).await?;

        if self.json {
            println!("{}", render_report(&outcome)?);
        } else {
            println!("{}", outcome.answer.text());
        }

        Ok(())
    }

    fn read_question(&self) -> AppResult<String> {
        let question = match (&self.question, &self.file) {
            (Some(q), _) => q.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)?,
            (None, None) => String::new(),
        };

        let question = question.trim().to_string();
        if question.is_empty() {
            return Err(AppError::Config("No question provided".to_string()));
        }
        Ok(question)
    }
}

fn render_report(outcome: &RunOutcome) -> AppResult<String> {
    Ok(serde_json::to_string_pretty(outcome)?)
}
