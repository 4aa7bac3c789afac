//! Query and passage embeddings.
//!
//! Provider-agnostic embedding generation. The pipeline embeds each
//! question exactly once before any store call; `import` embeds passages
//! in batches.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
