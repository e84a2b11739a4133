//! Command handlers for the motolaw CLI.

pub mod ask;
pub mod history;
pub mod knowledge;
pub mod serve;

pub use ask::AskCommand;
pub use history::HistoryCommand;
pub use knowledge::KnowledgeCommand;
pub use serve::ServeCommand;
