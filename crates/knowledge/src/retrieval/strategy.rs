//! Strategy selection: a pure lookup from intent and extracted parties to a retrieval plan.

use crate::store::PartyFilter;
use crate::types::Intent;
use planes_core::config::RetrievalConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    FilteredTopic,
    FilteredBroad,
    FallbackGeneral,
    BalancedAcrossParties,
    CatalogOnly,
    UnfilteredDefault,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::FilteredTopic => "filtered_topic",
            Strategy::FilteredBroad => "filtered_broad",
            Strategy::FallbackGeneral => "fallback_general",
            Strategy::BalancedAcrossParties => "balanced_across_parties",
            Strategy::CatalogOnly => "catalog_only",
            Strategy::UnfilteredDefault => "unfiltered_default",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a table row applies, by extracted party count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartiesFound {
    Any,
    None,
    AtLeastOne,
}

impl PartiesFound {
    fn matches(self, count: usize) -> bool {
        match self {
            PartiesFound::Any => true,
            PartiesFound::None => count == 0,
            PartiesFound::AtLeastOne => count > 0,
        }
    }
}

/// Which configured limit a row uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quota {
    SpecificParty,
    GeneralPlan,
    Comparison,
    Default,
    Zero,
}

struct Rule {
    intent: Intent,
    parties: PartiesFound,
    strategy: Strategy,
    quota: Quota,
}

const STRATEGY_TABLE: &[Rule] = &[
    Rule {
        intent: Intent::SpecificParty,
        parties: PartiesFound::AtLeastOne,
        strategy: Strategy::FilteredTopic,
        quota: Quota::SpecificParty,
    },
    Rule {
        intent: Intent::SpecificParty,
        parties: PartiesFound::None,
        strategy: Strategy::FallbackGeneral,
        quota: Quota::Default,
    },
    Rule {
        intent: Intent::PartyGeneralPlan,
        parties: PartiesFound::AtLeastOne,
        strategy: Strategy::FilteredBroad,
        quota: Quota::GeneralPlan,
    },
    Rule {
        intent: Intent::PartyGeneralPlan,
        parties: PartiesFound::None,
        strategy: Strategy::FallbackGeneral,
        quota: Quota::Default,
    },
    Rule {
        intent: Intent::GeneralComparison,
        parties: PartiesFound::Any,
        strategy: Strategy::BalancedAcrossParties,
        quota: Quota::Comparison,
    },
    Rule {
        intent: Intent::MetadataQuery,
        parties: PartiesFound::Any,
        strategy: Strategy::CatalogOnly,
        quota: Quota::Zero,
    },
    Rule {
        intent: Intent::Unclear,
        parties: PartiesFound::Any,
        strategy: Strategy::UnfilteredDefault,
        quota: Quota::Default,
    },
];

/// What the executor should do for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalPlan {
    /// One vector search, optionally restricted to parties.
    Search {
        strategy: Strategy,
        limit: usize,
        filter: Option<PartyFilter>,
    },
    /// One sub-query per catalog party, merged in rounds.
    Balanced { per_party: usize, max_total: usize },
    /// No vector search.
    CatalogOnly,
}

impl RetrievalPlan {
    pub fn strategy(&self) -> Strategy {
        match self {
            RetrievalPlan::Search { strategy, .. } => *strategy,
            RetrievalPlan::Balanced { .. } => Strategy::BalancedAcrossParties,
            RetrievalPlan::CatalogOnly => Strategy::CatalogOnly,
        }
    }

    /// Upper bound on returned passages.
    pub fn limit(&self) -> usize {
        match self {
            RetrievalPlan::Search { limit, .. } => *limit,
            RetrievalPlan::Balanced { max_total, .. } => *max_total,
            RetrievalPlan::CatalogOnly => 0,
        }
    }
}

/// Select the retrieval plan for an intent and the extracted parties.
pub fn select_strategy(
    intent: Intent,
    parties: &BTreeSet<String>,
    config: &RetrievalConfig,
) -> RetrievalPlan {
    let rule = STRATEGY_TABLE
        .iter()
        .find(|rule| rule.intent == intent && rule.parties.matches(parties.len()));

    let Some(rule) = rule else {
        return RetrievalPlan::Search {
            strategy: Strategy::UnfilteredDefault,
            limit: config.default_limit,
            filter: None,
        };
    };

    match rule.quota {
        Quota::Zero => RetrievalPlan::CatalogOnly,
        Quota::Comparison => RetrievalPlan::Balanced {
            per_party: config.comparison_per_party,
            max_total: config.comparison_max_total,
        },
        quota => {
            let limit = match quota {
                Quota::SpecificParty => config.specific_party_limit,
                Quota::GeneralPlan => config.general_plan_limit,
                _ => config.default_limit,
            };
            let filter = (rule.parties == PartiesFound::AtLeastOne)
                .then(|| PartyFilter::new(parties.iter().cloned()));
            RetrievalPlan::Search {
                strategy: rule.strategy,
                limit,
                filter,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parties(codes: &[&str]) -> BTreeSet<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_specific_party_with_party() {
        let plan = select_strategy(
            Intent::SpecificParty,
            &parties(&["PLN"]),
            &RetrievalConfig::default(),
        );
        assert_eq!(
            plan,
            RetrievalPlan::Search {
                strategy: Strategy::FilteredTopic,
                limit: 5,
                filter: Some(PartyFilter::single("PLN")),
            }
        );
    }

    #[test]
    fn test_specific_party_union_filter() {
        let plan = select_strategy(
            Intent::SpecificParty,
            &parties(&["PLN", "PUSC"]),
            &RetrievalConfig::default(),
        );
        match plan {
            RetrievalPlan::Search {
                filter: Some(filter),
                ..
            } => assert_eq!(filter.parties(), &parties(&["PLN", "PUSC"])),
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn test_general_plan() {
        let plan = select_strategy(
            Intent::PartyGeneralPlan,
            &parties(&["PUSC"]),
            &RetrievalConfig::default(),
        );
        assert_eq!(plan.strategy(), Strategy::FilteredBroad);
        assert_eq!(plan.limit(), 15);
    }

    #[test]
    fn test_no_parties_falls_back() {
        for intent in [Intent::SpecificParty, Intent::PartyGeneralPlan] {
            let plan = select_strategy(intent, &BTreeSet::new(), &RetrievalConfig::default());
            assert_eq!(
                plan,
                RetrievalPlan::Search {
                    strategy: Strategy::FallbackGeneral,
                    limit: 5,
                    filter: None,
                }
            );
        }
    }

    #[test]
    fn test_comparison_metadata_unclear() {
        let config = RetrievalConfig::default();
        assert_eq!(
            select_strategy(Intent::GeneralComparison, &parties(&["PLN"]), &config),
            RetrievalPlan::Balanced {
                per_party: 2,
                max_total: 10,
            }
        );
        assert_eq!(
            select_strategy(Intent::MetadataQuery, &BTreeSet::new(), &config),
            RetrievalPlan::CatalogOnly
        );
        assert_eq!(
            select_strategy(Intent::Unclear, &parties(&["PLN"]), &config),
            RetrievalPlan::Search {
                strategy: Strategy::UnfilteredDefault,
                limit: 5,
                filter: None,
            }
        );
    }

    #[test]
    fn test_every_intent_has_a_rule() {
        for intent in Intent::ALL {
            for count in [0, 1, 3] {
                assert!(STRATEGY_TABLE
                    .iter()
                    .any(|r| r.intent == intent && r.parties.matches(count)));
            }
        }
    }

    #[test]
    fn test_configured_limits() {
        let config = RetrievalConfig {
            specific_party_limit: 3,
            ..RetrievalConfig::default()
        };
        let plan = select_strategy(Intent::SpecificParty, &parties(&["FA"]), &config);
        assert_eq!(plan.limit(), 3);
    }
}
