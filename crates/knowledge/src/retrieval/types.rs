//! Retrieval results and their metrics.

use crate::retrieval::strategy::Strategy;
use crate::types::Passage;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Score spread over the returned passages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreDistribution {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub median: f32,
}

impl ScoreDistribution {
    pub fn from_scores(scores: &[f32]) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }

        let mut sorted = scores.to_vec();
        sorted.sort_by(f32::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Some(Self {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: sorted.iter().sum::<f32>() / sorted.len() as f32,
            median,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalMetrics {
    pub count: usize,
    pub mean_score: f32,
    pub distribution: Option<ScoreDistribution>,
    /// Passages per party code.
    pub party_counts: BTreeMap<String, usize>,
    /// Parties with at least one passage.
    pub represented: BTreeSet<String>,
    /// Parties a comparison searched that contributed zero passages, whether
    /// their search found nothing, failed or timed out.
    pub missing: BTreeSet<String>,
    /// Parties whose search did return passages, all of which fell outside the
    /// comparison's total cap (`comparisonMaxTotal`). Disjoint from `missing`.
    pub dropped: BTreeSet<String>,
}

impl RetrievalMetrics {
    pub fn from_passages(passages: &[Passage]) -> Self {
        let scores: Vec<f32> = passages.iter().map(|p| p.score).collect();
        let distribution = ScoreDistribution::from_scores(&scores);

        let mut party_counts = BTreeMap::new();
        for passage in passages {
            *party_counts.entry(passage.party.clone()).or_insert(0) += 1;
        }

        Self {
            count: passages.len(),
            mean_score: distribution.as_ref().map_or(0.0, |d| d.mean),
            distribution,
            represented: party_counts.keys().cloned().collect(),
            party_counts,
            missing: BTreeSet::new(),
            dropped: BTreeSet::new(),
        }
    }
}

/// Outcome of one retrieval. Created per question, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub strategy: Strategy,
    pub passages: Vec<Passage>,
    pub metrics: RetrievalMetrics,
    /// Why retrieval degraded, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl RetrievalResult {
    pub fn new(strategy: Strategy, passages: Vec<Passage>) -> Self {
        let metrics = RetrievalMetrics::from_passages(&passages);
        Self {
            strategy,
            passages,
            metrics,
            failure: None,
        }
    }

    /// Empty result carrying a failure note.
    pub fn failed(strategy: Strategy, reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::new(strategy, Vec::new())
        }
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

/// Descending score, then ascending position, then ascending document id.
pub fn compare_passages(a: &Passage, b: &Passage) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.position.cmp(&b.position))
        .then_with(|| a.doc_id.cmp(&b.doc_id))
}

/// Deduplicate by `(doc_id, position)` keeping the highest score, then rank.
pub fn rank_passages(passages: Vec<Passage>) -> Vec<Passage> {
    let mut best: HashMap<(String, u32), Passage> = HashMap::with_capacity(passages.len());
    for passage in passages {
        let key = (passage.doc_id.clone(), passage.position);
        match best.get(&key) {
            Some(existing) if existing.score >= passage.score => {}
            _ => {
                best.insert(key, passage);
            }
        }
    }

    let mut ranked: Vec<Passage> = best.into_values().collect();
    ranked.sort_by(compare_passages);
    ranked
}
