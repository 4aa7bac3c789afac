//! Retrieval: strategy selection and execution against the passage store.

pub mod executor;
pub mod strategy;
pub mod types;

pub use executor::RetrievalExecutor;
pub use strategy::{select_strategy, RetrievalPlan, Strategy};
pub use types::{rank_passages, RetrievalMetrics, RetrievalResult, ScoreDistribution};
