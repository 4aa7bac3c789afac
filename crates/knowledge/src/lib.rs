//! Question answering over the 2026 Costa Rica government plans.
//!
//! - Party catalog (`catalog`)
//! - Query and passage embeddings (`embeddings`)
//! - Passage stores: LanceDB and in-memory (`store`)
//! - Retrieval strategy selection and execution (`retrieval`)
//! - Intent classification, party extraction and answering (`rag`)
//! - JSONL passage import (`import`)

pub mod catalog;
pub mod embeddings;
pub mod import;
pub mod rag;
pub mod retrieval;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use catalog::{Party, PartyCatalog};
pub use embeddings::{create_provider, EmbeddingProvider};
pub use import::{import_jsonl, ImportStats};
pub use rag::{
    AnswerBundle, AnswerEvent, AnswerKind, AnswerPipeline, AnswerRequest, AnswerStream, Citation,
    PipelineError, PipelinePrompts, PipelineSettings, TraceSink, TracingSink,
};
pub use retrieval::{select_strategy, RetrievalPlan, RetrievalResult, Strategy};
pub use store::{open_store, InMemoryStore, LanceDbStore, PartyFilter, PassageStore};
pub use types::{
    ConversationMessage, History, Intent, Passage, PassageRecord, Question, Role, SessionId,
};

use planes_core::{AppConfig, AppResult};
use std::sync::Arc;

/// Load the configured catalog, or the bundled one when none is configured.
pub fn load_catalog(config: &AppConfig) -> AppResult<Arc<PartyCatalog>> {
    let catalog = match config.catalog_path() {
        Some(path) => PartyCatalog::load(&path)?,
        None => PartyCatalog::bundled()?,
    };
    Ok(Arc::new(catalog))
}
