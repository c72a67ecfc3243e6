//! Ollama chat provider.
//!
//! [`OllamaProvider`] implements [`LlmProvider`] against `POST {host}/api/chat`
//! in both single-response and NDJSON streaming modes. The client carries
//! one overall timeout; nothing is retried.

pub mod streaming;
pub mod types;

use std::time::Duration;

use tracing::debug;

use parley_core::llm::provider::{EventStream, LlmProvider};
use parley_types::llm::{CompletionRequest, CompletionResponse, LlmError};

use self::streaming::create_ollama_stream;
use self::types::{OllamaChatChunk, OllamaChatRequest};

/// Classify a reqwest failure.
pub(crate) fn transport_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout(err.to_string())
    } else if err.is_decode() {
        LlmError::Deserialization(err.to_string())
    } else {
        LlmError::Provider {
            message: format!("HTTP request failed: {err}"),
        }
    }
}

/// Ollama-style `/api/chat` provider.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaProvider {
    /// Create a provider for `host` (e.g. `http://127.0.0.1:11434`).
    pub fn new(host: &str, timeout: Duration) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: host.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = OllamaChatRequest::from_completion(request, false);
        debug!(model = %body.model, messages = body.messages.len(), "Sending chat request");

        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await.map_err(transport_error)?;
        let chunk: OllamaChatChunk = serde_json::from_str(&text)
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;

        if let Some(message) = chunk.error {
            return Err(LlmError::Provider { message });
        }

        Ok(CompletionResponse {
            content: chunk.text().to_string(),
            model: if chunk.model.is_empty() {
                request.model.clone()
            } else {
                chunk.model.clone()
            },
            stop_reason: chunk.stop_reason(),
            usage: chunk.usage(),
        })
    }

    fn stream(&self, request: CompletionRequest) -> EventStream {
        let body = OllamaChatRequest::from_completion(&request, true);
        create_ollama_stream(&self.client, &self.url("/api/chat"), body)
    }
}
