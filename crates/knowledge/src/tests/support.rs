//! Test doubles and fixtures: scripted LLM, failing and slow stores, seeded corpus.

use crate::catalog::PartyCatalog;
use crate::embeddings::providers::mock::MockProvider;
use crate::embeddings::EmbeddingProvider;
use crate::rag::{AnswerPipeline, PipelineSettings, TraceSink};
use crate::store::{InMemoryStore, PartyFilter, PassageStore};
use crate::types::{EmbeddedPassage, Passage, PassageRecord};
use planes_core::config::RetrievalConfig;
use planes_core::{AppError, AppResult};
use planes_llm::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const EMBEDDING_DIM: usize = 128;

/// Parties with passages in the seeded corpus.
pub const SEEDED_PARTIES: [&str; 6] = ["PLN", "PUSC", "FA", "PLP", "PNR", "CR1"];

pub fn catalog() -> Arc<PartyCatalog> {
    Arc::new(PartyCatalog::bundled().unwrap())
}

pub fn embedder() -> Arc<dyn EmbeddingProvider> {
    Arc::new(MockProvider::new(EMBEDDING_DIM))
}

fn corpus() -> Vec<(&'static str, &'static str)> {
    vec![
        ("PLN", "Ampliar becas para educación técnica y universidades públicas."),
        ("PLN", "Reforma del sistema de salud y reducción de listas de espera en la CCSS."),
        ("PLN", "Programa de infraestructura vial para las zonas costeras."),
        ("PUSC", "Plan integral de seguridad ciudadana con más policías en los barrios."),
        ("PUSC", "Educación bilingüe en todas las escuelas públicas del país."),
        ("PUSC", "Fortalecimiento de los EBAIS y atención primaria de salud."),
        ("PUSC", "Reducción del gasto público y reforma fiscal progresiva."),
        ("FA", "Salud pública universal y fortalecimiento de la CCSS."),
        ("FA", "Transición energética y protección de los recursos hídricos."),
        ("PLP", "Apertura de mercados y reducción de trámites para empresas."),
        ("PLP", "Salud con participación de clínicas privadas y libre elección."),
        ("PNR", "Valores familiares y educación con enfoque en la familia."),
        ("CR1", "Salud digital con expediente electrónico y telemedicina."),
        ("CR1", "Seguridad fronteriza y combate al narcotráfico."),
    ]
}

fn seeded_passages() -> Vec<PassageRecord> {
    let mut positions: std::collections::HashMap<&str, u32> = std::collections::HashMap::new();
    corpus()
        .into_iter()
        .map(|(party, text)| {
            let position = positions.entry(party).or_insert(0);
            let record = PassageRecord {
                text: text.to_string(),
                party: party.to_string(),
                doc_id: format!("{}.pdf", party),
                position: *position,
                file_name: Some(format!("{}.pdf", party)),
            };
            *position += 1;
            record
        })
        .collect()
}

/// In-memory store holding the seeded corpus with mock embeddings.
pub async fn seeded_store() -> Arc<InMemoryStore> {
    let embedder = MockProvider::new(EMBEDDING_DIM);
    let records = seeded_passages();
    let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
    let embeddings = embedder.embed_batch(&texts).await.unwrap();

    let passages: Vec<EmbeddedPassage> = records
        .into_iter()
        .zip(embeddings)
        .map(|(record, embedding)| EmbeddedPassage { record, embedding })
        .collect();

    let store = InMemoryStore::new();
    store.upsert(&passages).await.unwrap();
    Arc::new(store)
}

/// In-memory store with one health passage for each of the first `parties`
/// catalog parties.
pub async fn wide_store(parties: usize) -> Arc<InMemoryStore> {
    let embedder = MockProvider::new(EMBEDDING_DIM);
    let records: Vec<PassageRecord> = catalog()
        .codes()
        .take(parties)
        .map(|code| PassageRecord {
            text: format!("Propuesta de salud pública del partido {}.", code),
            party: code.to_string(),
            doc_id: format!("{}.pdf", code),
            position: 0,
            file_name: Some(format!("{}.pdf", code)),
        })
        .collect();
    let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
    let embeddings = embedder.embed_batch(&texts).await.unwrap();

    let passages: Vec<EmbeddedPassage> = records
        .into_iter()
        .zip(embeddings)
        .map(|(record, embedding)| EmbeddedPassage { record, embedding })
        .collect();

    let store = InMemoryStore::new();
    store.upsert(&passages).await.unwrap();
    Arc::new(store)
}

/// Store whose every call fails, as if unreachable.
pub struct FailingStore;

#[async_trait::async_trait]
impl PassageStore for FailingStore {
    fn backend_name(&self) -> &str {
        "failing"
    }

    async fn search(
        &self,
        _embedding: &[f32],
        _filter: Option<&PartyFilter>,
        _limit: usize,
    ) -> AppResult<Vec<Passage>> {
        Err(AppError::Retrieval("connection refused".to_string()))
    }

    async fn upsert(&self, _passages: &[EmbeddedPassage]) -> AppResult<usize> {
        Err(AppError::Knowledge("connection refused".to_string()))
    }

    async fn count(&self) -> AppResult<usize> {
        Err(AppError::Knowledge("connection refused".to_string()))
    }
}

/// Delays searches whose filter includes one party.
pub struct SlowStore {
    inner: Arc<dyn PassageStore>,
    slow_party: String,
    delay: Duration,
}

impl SlowStore {
    pub fn new(inner: Arc<dyn PassageStore>, slow_party: &str, delay: Duration) -> Self {
        Self {
            inner,
            slow_party: slow_party.to_string(),
            delay,
        }
    }
}

#[async_trait::async_trait]
impl PassageStore for SlowStore {
    fn backend_name(&self) -> &str {
        "slow"
    }

    async fn search(
        &self,
        embedding: &[f32],
        filter: Option<&PartyFilter>,
        limit: usize,
    ) -> AppResult<Vec<Passage>> {
        if filter.is_some_and(|f| f.contains(&self.slow_party)) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.search(embedding, filter, limit).await
    }

    async fn upsert(&self, passages: &[EmbeddedPassage]) -> AppResult<usize> {
        self.inner.upsert(passages).await
    }

    async fn count(&self) -> AppResult<usize> {
        self.inner.count().await
    }
}

/// Scripted behaviour for one kind of LLM call.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// Provider error
    Fail,
    /// HTTP 429
    RateLimited,
    /// Never answers
    Hang,
}

impl Reply {
    pub fn text(value: &str) -> Self {
        Reply::Text(value.to_string())
    }

    async fn resolve(&self) -> AppResult<String> {
        match self {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Fail => Err(AppError::Llm("provider unavailable".to_string())),
            Reply::RateLimited => Err(AppError::RateLimited("quota exceeded".to_string())),
            Reply::Hang => {
                futures::future::pending::<()>().await;
                Err(AppError::Llm("unreachable".to_string()))
            }
        }
    }
}

/// LLM double that answers by call kind, recognized from the output schema.
pub struct ScriptedLlm {
    intent: Reply,
    parties: Reply,
    answer: Reply,
    requests: Mutex<Vec<LlmRequest>>,
    generation_calls: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallKind {
    Intent,
    Parties,
    Answer,
}

impl ScriptedLlm {
    pub fn new(intent: &str, parties: &str, answer: &str) -> Self {
        Self {
            intent: Reply::Text(format!("{{\"intent\": \"{}\"}}", intent)),
            parties: Reply::text(parties),
            answer: Reply::text(answer),
            requests: Mutex::new(Vec::new()),
            generation_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_intent(mut self, reply: Reply) -> Self {
        self.intent = reply;
        self
    }

    pub fn with_parties(mut self, reply: Reply) -> Self {
        self.parties = reply;
        self
    }

    pub fn with_answer(mut self, reply: Reply) -> Self {
        self.answer = reply;
        self
    }

    pub fn generation_calls(&self) -> usize {
        self.generation_calls.load(Ordering::SeqCst)
    }

    /// Requests sent for intent classification.
    pub fn intent_requests(&self) -> Vec<LlmRequest> {
        self.requests_of(CallKind::Intent)
    }

    /// Requests sent for party extraction.
    pub fn parties_requests(&self) -> Vec<LlmRequest> {
        self.requests_of(CallKind::Parties)
    }

    /// Requests sent for answer generation.
    pub fn answer_requests(&self) -> Vec<LlmRequest> {
        self.requests_of(CallKind::Answer)
    }

    fn requests_of(&self, kind: CallKind) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| call_kind(r) == kind)
            .cloned()
            .collect()
    }

    fn record(&self, request: &LlmRequest) -> &Reply {
        self.requests.lock().unwrap().push(request.clone());
        match call_kind(request) {
            CallKind::Intent => &self.intent,
            CallKind::Parties => &self.parties,
            CallKind::Answer => {
                self.generation_calls.fetch_add(1, Ordering::SeqCst);
                &self.answer
            }
        }
    }
}

fn call_kind(request: &LlmRequest) -> CallKind {
    let properties = request.format.as_ref().map(|f| &f["properties"]);
    match properties {
        Some(p) if p.get("intent").is_some() => CallKind::Intent,
        Some(p) if p.get("parties").is_some() => CallKind::Parties,
        _ => CallKind::Answer,
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let content = self.record(request).resolve().await?;
        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::new(10, 10),
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        let content = self.record(request).resolve().await?;
        let mut chunks: Vec<AppResult<LlmStreamChunk>> = content
            .split_inclusive(' ')
            .map(|token| {
                Ok(LlmStreamChunk {
                    content: token.to_string(),
                    done: false,
                })
            })
            .collect();
        chunks.push(Ok(LlmStreamChunk {
            content: String::new(),
            done: true,
        }));

        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// Records every step and completion it receives.
#[derive(Default)]
pub struct RecordingSink {
    pub steps: Mutex<Vec<String>>,
    pub completions: Mutex<Vec<(Option<String>, Vec<String>)>>,
}

impl TraceSink for RecordingSink {
    fn on_step(&self, step: &str) {
        self.steps.lock().unwrap().push(step.to_string());
    }

    fn on_complete(&self, user_id: Option<&str>, tags: &[String], _steps: &[String]) {
        self.completions
            .lock()
            .unwrap()
            .push((user_id.map(String::from), tags.to_vec()));
    }
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        model: "test-model".to_string(),
        retrieval: RetrievalConfig::default(),
        classify_timeout: Duration::from_millis(300),
        extract_timeout: Duration::from_millis(300),
        search_timeout: Duration::from_secs(2),
        generate_timeout: Duration::from_millis(500),
        temperature: 0.2,
        max_tokens: 512,
    }
}

/// Pipeline over the given LLM and store, with the bundled catalog and mock embeddings.
pub fn pipeline(llm: Arc<ScriptedLlm>, store: Arc<dyn PassageStore>) -> AnswerPipeline {
    AnswerPipeline::new(llm, embedder(), store, catalog(), settings()).unwrap()
}
