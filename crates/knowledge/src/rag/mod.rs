//! Question answering over government plans.
//!
//! Classify, extract parties, retrieve, assemble context and generate.

pub mod context;
pub mod extract;
pub mod intent;
pub mod metadata;
pub mod pipeline;
pub mod trace;
pub mod types;

pub use context::{assemble_context, build_citations, AssembledContext};
pub use extract::PartyExtractor;
pub use intent::IntentClassifier;
pub use metadata::answer_from_catalog;
pub use pipeline::{AnswerPipeline, AnswerStream, PipelinePrompts, PipelineSettings};
pub use trace::{TraceSink, TracingSink};
pub use types::{
    AnswerBundle, AnswerEvent, AnswerKind, AnswerRequest, Citation, DiagnosticTrace,
    PipelineError, Stage, NO_INFORMATION,
};

use planes_core::{AppError, AppResult};
use planes_llm::{LlmClient, LlmRequest};
use std::time::Duration;

/// Run a non-streaming completion under a timeout.
pub(crate) async fn complete_within(
    llm: &dyn LlmClient,
    request: &LlmRequest,
    timeout: Duration,
    operation: &str,
) -> AppResult<String> {
    match tokio::time::timeout(timeout, llm.complete(request)).await {
        Ok(response) => {
            let response = response?;
            tracing::debug!(
                operation,
                model = %response.model,
                prompt_tokens = response.usage.prompt_tokens,
                completion_tokens = response.usage.completion_tokens,
                "Completion received"
            );
            Ok(response.content)
        }
        Err(_) => Err(AppError::timeout(operation, timeout.as_secs())),
    }
}

/// Strip a surrounding markdown code fence, if any.
pub(crate) fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim()
}
