//! Generation provider crate for Planes.
//!
//! A provider-agnostic abstraction over chat/completion models. The
//! question-answering pipeline only sees the `LlmClient` trait, so tests
//! can swap in scripted clients.
//!
//! # Providers
//! - **Ollama**: Local LLM runtime (default)
//! - **OpenAI**: Any OpenAI-compatible chat completions endpoint
//!
//! Clients built by `create_client` retry rate-limited calls and stop
//! calling a provider that keeps failing (see `resilience`).
//!
//! # Example
//! ```no_run
//! use planes_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("¿Qué propone el PLN?", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod providers;
pub mod resilience;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiClient};
pub use resilience::{CircuitBreaker, CircuitState, ResilientClient, RetryPolicy};
pub use types::ProviderType;
