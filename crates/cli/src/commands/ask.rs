//! Ask command handler.
//!
//! Runs one question through the answer pipeline and prints the answer,
//! its sources and the diagnostic trace.

use clap::Args;
use futures::StreamExt;
use planes_core::{config::AppConfig, AppError, AppResult};
use planes_knowledge::{
    create_provider, load_catalog, open_store, AnswerBundle, AnswerEvent, AnswerPipeline,
    AnswerRequest, History, PipelineError, PipelinePrompts, PipelineSettings, Question, SessionId,
};
use planes_llm::create_client;
use std::io::Write;
use std::path::PathBuf;

/// Ask a question about the government plans
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question, between 3 and 500 characters
    pub question: String,

    /// Session identifier used to group traces
    #[arg(short, long)]
    pub session: Option<String>,

    /// JSON file with prior messages: [{"role": "user", "content": "..."}]
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Wait for the full answer instead of streaming tokens
    #[arg(long)]
    pub no_stream: bool,

    /// Output the answer bundle as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let request = self.build_request()?;
        let pipeline = build_pipeline(config).await?;

        let bundle = if self.no_stream || self.json {
            pipeline.answer(request).await.map_err(report_failure)?
        } else {
            self.stream_answer(&pipeline, request).await?
        };

        if self.json {
            let json = serde_json::to_string_pretty(&bundle)
                .map_err(|e| AppError::Serialization(e.to_string()))?;
            println!("{}", json);
        } else {
            if self.no_stream {
                println!("{}", bundle.answer);
            }
            print_sources_and_trace(&bundle);
        }

        Ok(())
    }

    fn build_request(&self) -> AppResult<AnswerRequest> {
        let mut request = AnswerRequest::new(Question::parse(&self.question)?);

        if let Some(ref session) = self.session {
            request = request.with_session(SessionId::parse(session)?);
        }

        if let Some(ref path) = self.history {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                AppError::InvalidInput(format!("Failed to read history {:?}: {}", path, e))
            })?;
            let history: History = serde_json::from_str(&contents).map_err(|e| {
                AppError::InvalidInput(format!("Invalid history {:?}: {}", path, e))
            })?;
            request = request.with_history(history);
        }

        Ok(request)
    }

    /// Print tokens as they arrive and return the final bundle.
    async fn stream_answer(
        &self,
        pipeline: &AnswerPipeline,
        request: AnswerRequest,
    ) -> AppResult<AnswerBundle> {
        let mut stream = pipeline.answer_stream(request).await.map_err(report_failure)?;
        let mut printed = false;

        while let Some(event) = stream.next().await {
            match event.map_err(report_failure)? {
                AnswerEvent::Token(token) => {
                    print!("{}", token);
                    std::io::stdout().flush().ok();
                    printed = true;
                }
                AnswerEvent::Complete(bundle) => {
                    if printed {
                        println!();
                    } else {
                        println!("{}", bundle.answer);
                    }
                    return Ok(bundle);
                }
            }
        }

        Err(AppError::Llm(
            "Answer stream ended without a final result".to_string(),
        ))
    }
}

/// Wire the pipeline from configuration.
async fn build_pipeline(config: &AppConfig) -> AppResult<AnswerPipeline> {
    let api_key = config.resolve_api_key(&config.provider);
    let llm = create_client(
        &config.provider,
        config.resolve_endpoint(),
        api_key.as_deref(),
        &config.resilience,
    )
    .map_err(AppError::Config)?;

    let embedder = create_provider(&config.embedding)?;
    let store = open_store(config).await?;
    let catalog = load_catalog(config)?;
    let prompts = PipelinePrompts::load(&config.workspace)?;

    tracing::debug!(
        provider = llm.provider_name(),
        embedder = embedder.provider_name(),
        store = store.backend_name(),
        parties = catalog.len(),
        "Pipeline ready"
    );

    Ok(AnswerPipeline::with_prompts(
        llm,
        embedder,
        store,
        catalog,
        PipelineSettings::from_config(config),
        prompts,
    ))
}

/// Log what the run got through before failing, and surface the cause.
fn report_failure(error: PipelineError) -> AppError {
    tracing::warn!(
        stage = %error.stage,
        kind = error.kind(),
        intent = ?error.intent,
        parties = ?error.parties,
        steps = ?error.trace.steps,
        "Answer failed"
    );
    error.source
}

fn print_sources_and_trace(bundle: &AnswerBundle) {
    if !bundle.citations.is_empty() {
        println!();
        println!("Fuentes:");
        for citation in &bundle.citations {
            let document = citation.file_name.as_deref().unwrap_or(&citation.doc_id);
            let marker = if citation.referenced { "*" } else { " " };
            println!(
                "{} [Fuente {}] {} | {} | posición {} | {:.3}",
                marker, citation.label, citation.party, document, citation.position, citation.score
            );
        }
    }

    println!();
    println!("Traza:");
    for step in &bundle.trace.steps {
        println!("  - {}", step);
    }

    tracing::info!(
        intent = %bundle.intent,
        strategy = %bundle.strategy,
        retrieved = bundle.retrieved,
        "Answered"
    );
}
