//! Answer pipeline: classify, extract, retrieve, assemble, generate.
//!
//! One sequential run per question. Classification, extraction and retrieval
//! degrade silently; only prompt rendering and generation can fail a run.

use crate::catalog::PartyCatalog;
use crate::embeddings::EmbeddingProvider;
use crate::rag::context::{assemble_context, build_citations, AssembledContext};
use crate::rag::extract::PartyExtractor;
use crate::rag::intent::IntentClassifier;
use crate::rag::metadata::answer_from_catalog;
use crate::rag::trace::{TraceRecorder, TraceSink, TracingSink};
use crate::rag::types::{
    AnswerBundle, AnswerEvent, AnswerKind, AnswerRequest, PipelineError, Stage, NO_INFORMATION,
};
use crate::rag::complete_within;
use crate::retrieval::{select_strategy, RetrievalExecutor, RetrievalMetrics, Strategy};
use crate::store::PassageStore;
use crate::types::Intent;
use futures::{Stream, StreamExt};
use planes_core::config::RetrievalConfig;
use planes_core::logging::preview_for_log;
use planes_core::{AppConfig, AppError, AppResult};
use planes_llm::{LlmClient, LlmRequest, LlmStream};
use planes_prompt::{
    build_prompt, builtin_prompt, load_prompt, PromptDefinition, ANSWER_GROUNDED,
    INTENT_CLASSIFY, PARTIES_EXTRACT,
};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::Instrument;

/// Streamed answer: `Token`s, then one `Complete`, or a terminal error.
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<AnswerEvent, PipelineError>> + Send>>;

/// Model, limits, timeouts and sampling for a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub model: String,
    pub retrieval: RetrievalConfig,
    pub classify_timeout: Duration,
    pub extract_timeout: Duration,
    pub search_timeout: Duration,
    pub generate_timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            retrieval: config.retrieval.clone(),
            classify_timeout: Duration::from_secs(config.timeouts.classify_secs),
            extract_timeout: Duration::from_secs(config.timeouts.extract_secs),
            search_timeout: Duration::from_secs(config.timeouts.search_secs),
            generate_timeout: Duration::from_secs(config.timeouts.generate_secs),
            temperature: config.generation.temperature,
            max_tokens: config.generation.max_tokens,
        }
    }
}

/// The three prompt definitions a pipeline renders.
#[derive(Debug, Clone)]
pub struct PipelinePrompts {
    pub intent: PromptDefinition,
    pub parties: PromptDefinition,
    pub answer: PromptDefinition,
}

impl PipelinePrompts {
    pub fn builtin() -> AppResult<Self> {
        Ok(Self {
            intent: builtin_prompt(INTENT_CLASSIFY)?,
            parties: builtin_prompt(PARTIES_EXTRACT)?,
            answer: builtin_prompt(ANSWER_GROUNDED)?,
        })
    }

    /// Built-ins, replaced by any overrides in the workspace.
    pub fn load(workspace: &Path) -> AppResult<Self> {
        Ok(Self {
            intent: load_prompt(workspace, INTENT_CLASSIFY)?,
            parties: load_prompt(workspace, PARTIES_EXTRACT)?,
            answer: load_prompt(workspace, ANSWER_GROUNDED)?,
        })
    }
}

pub struct AnswerPipeline {
    llm: Arc<dyn LlmClient>,
    catalog: Arc<PartyCatalog>,
    classifier: IntentClassifier,
    extractor: PartyExtractor,
    executor: RetrievalExecutor,
    answer_prompt: PromptDefinition,
    settings: PipelineSettings,
    sink: Arc<dyn TraceSink>,
}

/// Everything known before generation, carried into the final bundle.
struct Draft {
    recorder: TraceRecorder,
    intent: Intent,
    parties: BTreeSet<String>,
    strategy: Strategy,
    metrics: RetrievalMetrics,
    context: AssembledContext,
    session_id: Option<String>,
    user_id: Option<String>,
    streaming: bool,
    request: LlmRequest,
    generate_timeout: Duration,
}

enum Prepared {
    Ready(AnswerBundle),
    Generate(Draft),
}

impl Draft {
    fn complete(mut self, answer: String) -> AnswerBundle {
        self.recorder.step("Response generated");
        let citations = build_citations(&self.context, &answer);
        let retrieved = self.context.passages.len();
        let trace = self.recorder.finish(
            self.user_id.as_deref(),
            self.intent,
            &self.parties,
            citations.len(),
            self.streaming,
        );

        AnswerBundle {
            answer,
            kind: AnswerKind::Generated,
            intent: self.intent,
            parties: self.parties,
            strategy: self.strategy,
            citations,
            retrieved,
            metrics: self.metrics,
            trace,
            session_id: self.session_id,
            user_id: self.user_id,
        }
    }

    fn fail(mut self, error: AppError) -> PipelineError {
        tracing::error!(kind = error.kind(), "Generation failed: {}", error);
        self.recorder.step(format!("Error: {}", error));
        let trace = self.recorder.finish(
            self.user_id.as_deref(),
            self.intent,
            &self.parties,
            0,
            self.streaming,
        );

        PipelineError {
            stage: Stage::Generation,
            source: error,
            intent: Some(self.intent),
            parties: self.parties,
            trace,
        }
    }

    fn timeout_error(&self) -> AppError {
        AppError::timeout("generation", self.generate_timeout.as_secs())
    }
}

struct StreamState {
    inner: LlmStream,
    draft: Draft,
    answer: String,
    deadline: Instant,
}

impl AnswerPipeline {
    /// Pipeline with the built-in prompts and the tracing sink.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn PassageStore>,
        catalog: Arc<PartyCatalog>,
        settings: PipelineSettings,
    ) -> AppResult<Self> {
        Ok(Self::with_prompts(
            llm,
            embedder,
            store,
            catalog,
            settings,
            PipelinePrompts::builtin()?,
        ))
    }

    pub fn with_prompts(
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn PassageStore>,
        catalog: Arc<PartyCatalog>,
        settings: PipelineSettings,
        prompts: PipelinePrompts,
    ) -> Self {
        let classifier = IntentClassifier::new(
            llm.clone(),
            settings.model.clone(),
            prompts.intent,
            catalog.clone(),
            settings.classify_timeout,
        );
        let extractor = PartyExtractor::new(
            llm.clone(),
            settings.model.clone(),
            prompts.parties,
            catalog.clone(),
            settings.extract_timeout,
        );
        let executor =
            RetrievalExecutor::new(store, embedder, catalog.clone(), settings.search_timeout);

        Self {
            llm,
            catalog,
            classifier,
            extractor,
            executor,
            answer_prompt: prompts.answer,
            settings,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn catalog(&self) -> &PartyCatalog {
        &self.catalog
    }

    /// Answer a question with one non-streaming generation call.
    pub async fn answer(&self, request: AnswerRequest) -> Result<AnswerBundle, PipelineError> {
        let span = tracing::info_span!("answer", streaming = false);
        async move {
            let draft = match self.prepare(&request, false).await? {
                Prepared::Ready(bundle) => return Ok(bundle),
                Prepared::Generate(draft) => draft,
            };

            let generated = complete_within(
                self.llm.as_ref(),
                &draft.request,
                draft.generate_timeout,
                "generation",
            )
            .await;

            match generated {
                Ok(answer) => Ok(draft.complete(answer)),
                Err(e) => Err(draft.fail(e)),
            }
        }
        .instrument(span)
        .await
    }

    /// Answer a question, streaming generated tokens.
    ///
    /// Short-circuited answers (catalog, no information) arrive as a single `Complete`.
    pub async fn answer_stream(&self, request: AnswerRequest) -> Result<AnswerStream, PipelineError> {
        let span = tracing::info_span!("answer", streaming = true);
        let draft = match self.prepare(&request, true).instrument(span).await? {
            Prepared::Ready(bundle) => {
                let once = futures::stream::once(async move { Ok(AnswerEvent::Complete(bundle)) });
                return Ok(Box::pin(once));
            }
            Prepared::Generate(draft) => draft,
        };

        let deadline = Instant::now() + draft.generate_timeout;
        let inner = match tokio::time::timeout_at(deadline, self.llm.stream(&draft.request)).await {
            Ok(Ok(inner)) => inner,
            Ok(Err(e)) => return Err(draft.fail(e)),
            Err(_) => {
                let error = draft.timeout_error();
                return Err(draft.fail(error));
            }
        };

        let state = StreamState {
            inner,
            draft,
            answer: String::new(),
            deadline,
        };

        let stream = futures::stream::unfold(Some(state), |state| async move {
            let mut state = state?;
            loop {
                let next = tokio::time::timeout_at(state.deadline, state.inner.next()).await;
                match next {
                    Ok(Some(Ok(chunk))) => {
                        if chunk.content.is_empty() {
                            continue;
                        }
                        state.answer.push_str(&chunk.content);
                        return Some((Ok(AnswerEvent::Token(chunk.content)), Some(state)));
                    }
                    Ok(Some(Err(e))) => return Some((Err(state.draft.fail(e)), None)),
                    Ok(None) => {
                        let bundle = state.draft.complete(state.answer);
                        return Some((Ok(AnswerEvent::Complete(bundle)), None));
                    }
                    Err(_) => {
                        let error = state.draft.timeout_error();
                        return Some((Err(state.draft.fail(error)), None));
                    }
                }
            }
        });

        Ok(Box::pin(stream))
    }

    /// Everything up to the generation call.
    async fn prepare(
        &self,
        request: &AnswerRequest,
        streaming: bool,
    ) -> Result<Prepared, PipelineError> {
        let question = &request.question;
        let session_id = request.session_id.as_ref().map(|s| s.as_str().to_string());
        let user_id = request.session_id.as_ref().map(|s| s.anonymous_id());
        let mut recorder = TraceRecorder::new(self.sink.clone());

        tracing::info!(
            question = %preview_for_log(question.as_str(), 120),
            user_id = user_id.as_deref().unwrap_or("-"),
            history = request.history.messages().len(),
            "Answering question"
        );

        let intent = self.classifier.classify(question, &request.history).await;
        recorder.step(format!("Intent: {}", intent));

        if intent == Intent::MetadataQuery {
            let answer = answer_from_catalog(question.as_str(), &self.catalog);
            recorder.step("Answered from metadata");
            let parties = BTreeSet::new();
            let trace = recorder.finish(user_id.as_deref(), intent, &parties, 0, streaming);
            return Ok(Prepared::Ready(AnswerBundle {
                answer,
                kind: AnswerKind::Metadata,
                intent,
                parties,
                strategy: Strategy::CatalogOnly,
                citations: Vec::new(),
                retrieved: 0,
                metrics: RetrievalMetrics::default(),
                trace,
                session_id,
                user_id,
            }));
        }

        let parties = if intent.needs_party_extraction() {
            let parties = self.extractor.extract(question).await;
            let listed: Vec<&str> = parties.iter().map(String::as_str).collect();
            recorder.step(format!("Parties: [{}]", listed.join(", ")));
            parties
        } else {
            BTreeSet::new()
        };

        let plan = select_strategy(intent, &parties, &self.settings.retrieval);
        recorder.step(format!("Strategy: {}", plan.strategy()));

        let result = self
            .executor
            .execute(question.as_str(), &plan)
            .instrument(tracing::info_span!("retrieve", strategy = %plan.strategy()))
            .await;
        recorder.step(format!("Retrieved {} chunks", result.passages.len()));
        if let Some(failure) = &result.failure {
            recorder.step(format!("Retrieval failed: {}", failure));
        }

        if result.is_empty() {
            recorder.step("Insufficient information");
            let trace = recorder.finish(user_id.as_deref(), intent, &parties, 0, streaming);
            return Ok(Prepared::Ready(AnswerBundle {
                answer: NO_INFORMATION.to_string(),
                kind: AnswerKind::InsufficientInformation,
                intent,
                parties,
                strategy: result.strategy,
                citations: Vec::new(),
                retrieved: 0,
                metrics: result.metrics,
                trace,
                session_id,
                user_id,
            }));
        }

        let strategy = result.strategy;
        let metrics = result.metrics;
        let context = assemble_context(result.passages, self.settings.retrieval.context_truncate_chars);

        let llm_request = match self.answer_request(question.as_str(), &context, intent, streaming) {
            Ok(llm_request) => llm_request,
            Err(e) => {
                tracing::error!("Failed to build answer prompt: {}", e);
                recorder.step(format!("Error: {}", e));
                let trace = recorder.finish(user_id.as_deref(), intent, &parties, 0, streaming);
                return Err(PipelineError {
                    stage: Stage::Prompt,
                    source: e,
                    intent: Some(intent),
                    parties,
                    trace,
                });
            }
        };

        Ok(Prepared::Generate(Draft {
            recorder,
            intent,
            parties,
            strategy,
            metrics,
            context,
            session_id,
            user_id,
            streaming,
            request: llm_request,
            generate_timeout: self.settings.generate_timeout,
        }))
    }

    fn answer_request(
        &self,
        question: &str,
        context: &AssembledContext,
        intent: Intent,
        streaming: bool,
    ) -> AppResult<LlmRequest> {
        let flag = |on: bool| if on { "true" } else { "" }.to_string();

        let mut variables = HashMap::new();
        variables.insert("question".to_string(), question.to_string());
        variables.insert("context".to_string(), context.text.clone());
        variables.insert(
            "is_comparison".to_string(),
            flag(intent == Intent::GeneralComparison),
        );
        variables.insert(
            "is_general_plan".to_string(),
            flag(intent == Intent::PartyGeneralPlan),
        );

        let built = build_prompt(&self.answer_prompt, &variables)?;
        let mut request = LlmRequest::new(built.user, &self.settings.model)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        if streaming {
            request = request.with_streaming();
        }
        Ok(request)
    }
}
