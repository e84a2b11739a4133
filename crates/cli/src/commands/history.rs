//! History command handler.

use crate::wiring::open_history;
use clap::Args;
use motolaw_core::{config::AppConfig, AppResult};
use motolaw_history::{ConversationRecord, HistoryStore};

/// Show recent conversations
#[derive(Args, Debug)]
pub struct HistoryCommand {
    /// Number of records to show
    #[arg(short = 'n', long, default_value = "10")]
    pub limit: usize,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl HistoryCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing history command");

        let Some(store) = open_history(config)? else {
            println!("Conversation history is disabled");
            return Ok(());
        };

        let records = store.recent(self.limit).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&records)?);
        } else if records.is_empty() {
            println!("No conversations recorded yet");
        } else {
            for record in &records {
                print!("{}", format_record(record));
            }
        }

        Ok(())
    }
}

fn format_record(record: &ConversationRecord) -> String {
    format!(
        "[{}] {}\nQ: {}\nA: {}\n\n",
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        record.conversation_id,
        record.question,
        record.answer
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_record() {
        let mut record = ConversationRecord::new("今天天氣如何", "我無法確定答案");
        record.conversation_id = "1700000000000000000".to_string();

        let text = format_record(&record);
        assert!(text.contains("] 1700000000000000000\n"));
        assert!(text.contains("Q: 今天天氣如何\n"));
        assert!(text.contains("A: 我無法確定答案\n"));
    }
}
