//! Answer request and response types.

use crate::retrieval::{RetrievalMetrics, Strategy};
use crate::types::{History, Intent, Question, SessionId};
use planes_core::AppError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Answer given when retrieval produced nothing to ground on.
pub const NO_INFORMATION: &str = "No tengo información suficiente para responder esa pregunta.";

/// One question to answer, already validated by the caller.
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub question: Question,
    pub session_id: Option<SessionId>,
    pub history: History,
}

impl AnswerRequest {
    pub fn new(question: Question) -> Self {
        Self {
            question,
            session_id: None,
            history: History::default(),
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_history(mut self, history: History) -> Self {
        self.history = history;
        self
    }
}

/// A passage placed in the context, as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    /// `n` in `[Fuente n]`
    pub label: usize,
    pub party: String,
    pub doc_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    pub position: u32,
    pub score: f32,
    pub snippet: String,
    /// Whether the answer text mentions `[Fuente n]`
    pub referenced: bool,
}

/// How the answer text was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    Generated,
    Metadata,
    InsufficientInformation,
}

/// Ordered diagnostic steps of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiagnosticTrace {
    pub steps: Vec<String>,
    pub tags: Vec<String>,
}

/// Final result of answering one question.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerBundle {
    pub answer: String,
    pub kind: AnswerKind,
    pub intent: Intent,
    pub parties: BTreeSet<String>,
    pub strategy: Strategy,
    pub citations: Vec<Citation>,
    /// Passages returned by retrieval.
    pub retrieved: usize,
    pub metrics: RetrievalMetrics,
    pub trace: DiagnosticTrace,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Anonymous id derived from the session id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Item of a streamed answer: tokens, then exactly one `Complete`.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum AnswerEvent {
    Token(String),
    Complete(AnswerBundle),
}

/// Pipeline stage that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Prompt,
    Generation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Prompt => f.write_str("prompt"),
            Stage::Generation => f.write_str("generation"),
        }
    }
}

/// Terminal failure of a run, with everything known up to that point.
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: AppError,
    pub intent: Option<Intent>,
    pub parties: BTreeSet<String>,
    pub trace: DiagnosticTrace,
}

impl PipelineError {
    /// Kind of the underlying error ("llm", "rate_limited", "timeout", ...).
    pub fn kind(&self) -> &'static str {
        self.source.kind()
    }
}
