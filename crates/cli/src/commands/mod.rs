//! Command handlers for the planes CLI.

pub mod ask;
pub mod import;
pub mod parties;
pub mod prompts;
pub mod stats;

pub use ask::AskCommand;
pub use import::ImportCommand;
pub use parties::PartiesCommand;
pub use prompts::PromptsCommand;
pub use stats::StatsCommand;
