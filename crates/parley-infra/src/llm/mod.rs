//! LLM provider implementations.
//!
//! Contains the Ollama implementation of the [`LlmProvider`] trait defined in
//! `parley-core`, and [`create_provider`] which builds it from a
//! [`RelayConfig`].
//!
//! [`LlmProvider`]: parley_core::llm::provider::LlmProvider

pub mod ollama;

use std::time::Duration;

use parley_core::llm::box_provider::BoxLlmProvider;
use parley_types::config::RelayConfig;
use parley_types::llm::LlmError;

use self::ollama::OllamaProvider;

/// Create a [`BoxLlmProvider`] for the configured chat endpoint.
pub fn create_provider(config: &RelayConfig) -> Result<BoxLlmProvider, LlmError> {
    let provider = OllamaProvider::new(
        &config.endpoint,
        Duration::from_secs(config.request_timeout_secs),
    )?;
    Ok(BoxLlmProvider::new(provider))
}
