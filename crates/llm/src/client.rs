//! Generation request and response types and the `LlmClient` seam.
//!
//! Intent classification, party extraction and answer synthesis all go
//! through one `LlmClient`; only the answer step streams.

use futures::Stream;
use planes_core::AppResult;
use std::pin::Pin;

/// One generation call.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// User turn: the rendered question, context and history
    pub prompt: String,

    /// Model identifier (e.g., "llama3.2", "gpt-4o-mini")
    pub model: String,

    pub max_tokens: Option<u32>,

    pub temperature: Option<f32>,

    pub stream: bool,

    /// System turn, rendered from the prompt template
    pub system: Option<String>,

    /// JSON schema the output must conform to (classification calls)
    pub format: Option<serde_json::Value>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            stream: false,
            system: None,
            format: None,
        }
    }

    pub fn with_streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Constrain the output to a JSON schema.
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.format = Some(schema);
        self
    }
}

/// A finished, non-streamed generation.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,

    /// Model that served the call, as reported by the provider
    pub model: String,

    pub usage: LlmUsage,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl LlmUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Incremental answer text.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmStreamChunk {
    pub content: String,

    /// Set on the provider's final event
    pub done: bool,
}

pub type LlmStream = Pin<Box<dyn Stream<Item = AppResult<LlmStreamChunk>> + Send>>;

/// A generation backend (Ollama, OpenAI-compatible endpoints).
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider_name(&self) -> &str;

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = LlmRequest::new("¿Qué propone el PLN?", "llama3.2")
            .with_system("sistema")
            .with_temperature(0.2)
            .with_max_tokens(64)
            .with_schema(serde_json::json!({"type": "object"}));

        assert_eq!(request.system.as_deref(), Some("sistema"));
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(64));
        assert!(request.format.is_some());
        assert!(!request.stream);
        assert!(request.with_streaming().stream);
    }

    #[test]
    fn test_usage_total() {
        let usage = LlmUsage::new(10, 5);
        assert_eq!(usage.total_tokens, 15);
    }
}
