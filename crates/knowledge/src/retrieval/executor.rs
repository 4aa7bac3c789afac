//! Retrieval execution.
//!
//! Every failure here degrades to an empty or partial `RetrievalResult`
//! with a failure note. Nothing propagates as an error.

use crate::catalog::PartyCatalog;
use crate::embeddings::EmbeddingProvider;
use crate::retrieval::strategy::{RetrievalPlan, Strategy};
use crate::retrieval::types::{compare_passages, rank_passages, RetrievalResult};
use crate::store::{PartyFilter, PassageStore};
use crate::types::Passage;
use futures::future::join_all;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Runs retrieval plans against a passage store.
#[derive(Clone)]
pub struct RetrievalExecutor {
    store: Arc<dyn PassageStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    catalog: Arc<PartyCatalog>,
    search_timeout: Duration,
}

/// Outcome of one per-party sub-query in a balanced retrieval.
struct PartyHits {
    party: String,
    passages: Vec<Passage>,
}

impl RetrievalExecutor {
    pub fn new(
        store: Arc<dyn PassageStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        catalog: Arc<PartyCatalog>,
        search_timeout: Duration,
    ) -> Self {
        Self {
            store,
            embedder,
            catalog,
            search_timeout,
        }
    }

    /// Execute a plan for the question.
    pub async fn execute(&self, question: &str, plan: &RetrievalPlan) -> RetrievalResult {
        let strategy = plan.strategy();

        if let RetrievalPlan::CatalogOnly = plan {
            return RetrievalResult::new(strategy, Vec::new());
        }

        let embedding = match self.embed(question).await {
            Ok(embedding) => embedding,
            Err(reason) => {
                tracing::warn!(strategy = %strategy, "Retrieval degraded: {}", reason);
                return RetrievalResult::failed(strategy, reason);
            }
        };

        let result = match plan {
            RetrievalPlan::Search { limit, filter, .. } => {
                self.search(strategy, &embedding, filter.as_ref(), *limit)
                    .await
            }
            RetrievalPlan::Balanced {
                per_party,
                max_total,
            } => self.balanced(&embedding, *per_party, *max_total).await,
            RetrievalPlan::CatalogOnly => RetrievalResult::new(strategy, Vec::new()),
        };

        tracing::info!(
            strategy = %strategy,
            count = result.metrics.count,
            mean_score = result.metrics.mean_score,
            missing = result.metrics.missing.len(),
            dropped = result.metrics.dropped.len(),
            "Retrieval complete"
        );

        result
    }

    async fn embed(&self, question: &str) -> Result<Vec<f32>, String> {
        match tokio::time::timeout(self.search_timeout, self.embedder.embed(question)).await {
            Ok(Ok(embedding)) => Ok(embedding),
            Ok(Err(e)) => Err(format!("Embedding failed: {}", e)),
            Err(_) => Err(format!(
                "Embedding timed out after {}s",
                self.search_timeout.as_secs_f32()
            )),
        }
    }

    /// Search once, keeping only passages that satisfy the filter.
    async fn search_passages(
        &self,
        embedding: &[f32],
        filter: Option<&PartyFilter>,
        limit: usize,
    ) -> Result<Vec<Passage>, String> {
        let search = self.store.search(embedding, filter, limit);
        let mut passages = match tokio::time::timeout(self.search_timeout, search).await {
            Ok(Ok(passages)) => passages,
            Ok(Err(e)) => return Err(format!("Vector search failed: {}", e)),
            Err(_) => {
                return Err(format!(
                    "Vector search timed out after {}s",
                    self.search_timeout.as_secs_f32()
                ))
            }
        };

        if let Some(filter) = filter {
            passages.retain(|p| filter.contains(&p.party));
        }
        let mut ranked = rank_passages(passages);
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn search(
        &self,
        strategy: Strategy,
        embedding: &[f32],
        filter: Option<&PartyFilter>,
        limit: usize,
    ) -> RetrievalResult {
        match self.search_passages(embedding, filter, limit).await {
            Ok(passages) if passages.is_empty() => {
                RetrievalResult::failed(strategy, "No passages found")
            }
            Ok(passages) => RetrievalResult::new(strategy, passages),
            Err(reason) => {
                tracing::warn!(strategy = %strategy, "Retrieval degraded: {}", reason);
                RetrievalResult::failed(strategy, reason)
            }
        }
    }

    /// One sub-query per catalog party, selected in rounds up to `max_total`.
    async fn balanced(
        &self,
        embedding: &[f32],
        per_party: usize,
        max_total: usize,
    ) -> RetrievalResult {
        let strategy = Strategy::BalancedAcrossParties;

        let queries = self.catalog.codes().map(|code| {
            let filter = PartyFilter::single(code);
            let span = tracing::debug_span!("party_search", party = code);
            async move {
                let outcome = self.search_passages(embedding, Some(&filter), per_party).await;
                (code.to_string(), outcome)
            }
            .instrument(span)
        });

        let mut missing = BTreeSet::new();
        let mut hits = Vec::new();
        for (party, outcome) in join_all(queries).await {
            match outcome {
                Ok(passages) if !passages.is_empty() => hits.push(PartyHits { party, passages }),
                Ok(_) => {
                    missing.insert(party);
                }
                Err(reason) => {
                    tracing::warn!(party = %party, "Party sub-query failed: {}", reason);
                    missing.insert(party);
                }
            }
        }

        let (selected, dropped) = select_in_rounds(hits, per_party, max_total);

        let mut result = if selected.is_empty() {
            RetrievalResult::failed(strategy, "No passages found for any party")
        } else {
            RetrievalResult::new(strategy, selected)
        };
        result.metrics.missing = missing;
        result.metrics.dropped = dropped;
        result
    }
}

/// Round-robin selection: every party's best passage before any party's second.
///
/// Parties are visited by their best score (descending), then code. Returns the
/// selected passages and the parties cut entirely by the cap.
fn select_in_rounds(
    mut hits: Vec<PartyHits>,
    per_party: usize,
    max_total: usize,
) -> (Vec<Passage>, BTreeSet<String>) {
    hits.sort_by(|a, b| {
        compare_passages(&a.passages[0], &b.passages[0]).then_with(|| a.party.cmp(&b.party))
    });

    let mut selected = Vec::new();
    let mut seen = HashSet::new();
    let mut contributed = BTreeSet::new();

    'rounds: for round in 0..per_party {
        for party in &hits {
            if selected.len() >= max_total {
                break 'rounds;
            }
            if let Some(passage) = party.passages.get(round) {
                if seen.insert((passage.doc_id.clone(), passage.position)) {
                    contributed.insert(party.party.clone());
                    selected.push(passage.clone());
                }
            }
        }
    }

    let dropped = hits
        .iter()
        .map(|h| h.party.clone())
        .filter(|party| !contributed.contains(party))
        .collect();

    (selected, dropped)
}
