//! LLM provider factory.
//!
//! Builds a generation client from the provider name resolved by the
//! application configuration, wrapped in retry and circuit breaking.

use crate::client::LlmClient;
use crate::providers::{OllamaClient, OpenAiClient};
use crate::resilience::ResilientClient;
use crate::types::ProviderType;
use planes_core::config::ResilienceConfig;
use std::sync::Arc;

/// Create an LLM client based on the provider name.
///
/// # Arguments
/// * `provider` - Provider identifier ("ollama", "openai")
/// * `endpoint` - Optional custom endpoint URL
/// * `api_key` - Optional API key (required by "openai")
/// * `resilience` - Retry and circuit breaker settings
///
/// # Errors
/// Returns error if the provider is unknown or a required key is missing.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    api_key: Option<&str>,
    resilience: &ResilienceConfig,
) -> Result<Arc<dyn LlmClient>, String> {
    let client: Arc<dyn LlmClient> = match ProviderType::parse(provider) {
        Some(ProviderType::Ollama) => {
            let base_url = endpoint.unwrap_or("http://localhost:11434");
            Arc::new(OllamaClient::with_base_url(base_url))
        }
        Some(ProviderType::OpenAI) => {
            let api_key = api_key.ok_or_else(|| "OpenAI provider requires API key".to_string())?;
            match endpoint {
                Some(url) => Arc::new(OpenAiClient::with_base_url(url, api_key)),
                None => Arc::new(OpenAiClient::new(api_key)),
            }
        }
        None => return Err(format!("Unknown provider: {}", provider)),
    };

    Ok(Arc::new(ResilientClient::from_config(client, resilience)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resilience() -> ResilienceConfig {
        ResilienceConfig::default()
    }

    #[test]
    fn test_create_ollama_client() {
        let client = create_client("ollama", None, None, &resilience()).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_create_ollama_with_custom_endpoint() {
        let client = create_client("ollama", Some("http://localhost:8080"), None, &resilience());
        assert!(client.is_ok());
    }

    #[test]
    fn test_openai_requires_api_key() {
        match create_client("openai", None, None, &resilience()) {
            Err(err) => assert!(err.contains("OpenAI provider requires API key")),
            Ok(_) => panic!("Expected error for OpenAI without API key"),
        }
    }

    #[test]
    fn test_create_openai_client() {
        let client = create_client("openai", None, Some("sk-test"), &resilience()).unwrap();
        assert_eq!(client.provider_name(), "openai");
    }

    #[test]
    fn test_unknown_provider() {
        match create_client("unknown", None, None, &resilience()) {
            Err(err) => assert!(err.contains("Unknown provider")),
            Ok(_) => panic!("Expected error for unknown provider"),
        }
    }
}
