//! Passage storage and vector search.
//!
//! Backends implement `PassageStore`. Results come back ordered by
//! descending score; party filters are applied by the backend.

pub mod lancedb;
pub mod memory;

pub use self::lancedb::LanceDbStore;
pub use memory::InMemoryStore;

use crate::types::{EmbeddedPassage, Passage};
use planes_core::{AppConfig, AppResult};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Restricts a search to a set of party codes (union).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyFilter {
    parties: BTreeSet<String>,
}

impl PartyFilter {
    pub fn new<I, S>(parties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parties: parties.into_iter().map(Into::into).collect(),
        }
    }

    pub fn single(party: impl Into<String>) -> Self {
        Self::new([party.into()])
    }

    pub fn contains(&self, party: &str) -> bool {
        self.parties.contains(party)
    }

    pub fn parties(&self) -> &BTreeSet<String> {
        &self.parties
    }

    /// SQL predicate over the `party` column.
    pub fn to_sql(&self) -> String {
        let values: Vec<String> = self
            .parties
            .iter()
            .map(|p| format!("'{}'", p.replace('\'', "''")))
            .collect();
        format!("party IN ({})", values.join(", "))
    }
}

/// Trait for passage store backends.
#[async_trait::async_trait]
pub trait PassageStore: Send + Sync {
    /// Backend name for logs (e.g. "lancedb", "memory").
    fn backend_name(&self) -> &str;

    /// Top-`limit` passages most similar to the embedding, optionally restricted to parties.
    async fn search(
        &self,
        embedding: &[f32],
        filter: Option<&PartyFilter>,
        limit: usize,
    ) -> AppResult<Vec<Passage>>;

    /// Insert passages, replacing any with the same `(doc_id, position)`.
    ///
    /// Returns the number of passages written.
    async fn upsert(&self, passages: &[EmbeddedPassage]) -> AppResult<usize>;

    /// Number of stored passages.
    async fn count(&self) -> AppResult<usize>;
}

/// Open the configured persistent store.
pub async fn open_store(config: &AppConfig) -> AppResult<Arc<dyn PassageStore>> {
    let store = LanceDbStore::open(
        &config.store_path(),
        &config.store.table,
        config.embedding.dimensions,
    )
    .await?;
    Ok(Arc::new(store))
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
