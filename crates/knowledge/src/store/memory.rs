//! In-memory passage store with brute-force cosine search.

use crate::store::{cosine_similarity, PartyFilter, PassageStore};
use crate::types::{EmbeddedPassage, Passage};
use planes_core::AppResult;
use std::sync::RwLock;

/// Passage store held entirely in memory. Suited to tests and small corpora.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: RwLock<Vec<EmbeddedPassage>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PassageStore for InMemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn search(
        &self,
        embedding: &[f32],
        filter: Option<&PartyFilter>,
        limit: usize,
    ) -> AppResult<Vec<Passage>> {
        let rows = self.rows.read().unwrap_or_else(|e| e.into_inner());

        let mut scored: Vec<Passage> = rows
            .iter()
            .filter(|row| filter.map_or(true, |f| f.contains(&row.record.party)))
            .map(|row| {
                let score = cosine_similarity(embedding, &row.embedding);
                row.record.clone().into_passage(score)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.position.cmp(&b.position))
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        scored.truncate(limit);

        Ok(scored)
    }

    async fn upsert(&self, passages: &[EmbeddedPassage]) -> AppResult<usize> {
        let mut rows = self.rows.write().unwrap_or_else(|e| e.into_inner());

        for passage in passages {
            let key = (&passage.record.doc_id, passage.record.position);
            match rows
                .iter_mut()
                .find(|row| (&row.record.doc_id, row.record.position) == key)
            {
                Some(existing) => *existing = passage.clone(),
                None => rows.push(passage.clone()),
            }
        }

        Ok(passages.len())
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.rows.read().unwrap_or_else(|e| e.into_inner()).len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PassageRecord;

    fn row(party: &str, doc: &str, position: u32, embedding: Vec<f32>) -> EmbeddedPassage {
        EmbeddedPassage {
            record: PassageRecord {
                text: format!("{} {}", party, position),
                party: party.to_string(),
                doc_id: doc.to_string(),
                position,
                file_name: None,
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn test_search_orders_and_filters() {
        let store = InMemoryStore::new();
        store
            .upsert(&[
                row("PLN", "PLN.pdf", 0, vec![1.0, 0.0]),
                row("PLN", "PLN.pdf", 1, vec![0.6, 0.8]),
                row("PUSC", "PUSC.pdf", 0, vec![1.0, 0.1]),
            ])
            .await
            .unwrap();

        let all = store.search(&[1.0, 0.0], None, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].key(), ("PLN.pdf", 0));
        assert!(all.windows(2).all(|w| w[0].score >= w[1].score));

        let filter = PartyFilter::single("PUSC");
        let pusc = store.search(&[1.0, 0.0], Some(&filter), 10).await.unwrap();
        assert_eq!(pusc.len(), 1);
        assert_eq!(pusc[0].party, "PUSC");

        let limited = store.search(&[1.0, 0.0], None, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_key() {
        let store = InMemoryStore::new();
        store.upsert(&[row("PLN", "PLN.pdf", 0, vec![1.0])]).await.unwrap();
        store.upsert(&[row("PLN", "PLN.pdf", 0, vec![0.5])]).await.unwrap();
        store.upsert(&[row("PLN", "PLN.pdf", 1, vec![0.5])]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_equal_scores_break_ties_by_position() {
        let store = InMemoryStore::new();
        store
            .upsert(&[
                row("FA", "FA.pdf", 7, vec![1.0, 0.0]),
                row("FA", "FA.pdf", 2, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0], None, 10).await.unwrap();
        assert_eq!(results[0].position, 2);
        assert_eq!(results[1].position, 7);
    }
}
