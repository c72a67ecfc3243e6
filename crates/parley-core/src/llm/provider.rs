//! LlmProvider trait definition.
//!
//! This is the seam between the turn relay and whatever serves the model.
//! Uses RPITIT for `complete` and `Pin<Box<dyn Stream>>` for `stream`
//! (streams need to be object-safe for the BoxLlmProvider wrapper).

use std::pin::Pin;

use futures_util::Stream;

use parley_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent};

/// Events of one streamed reply, in order. Errors end the stream.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;

/// Trait for chat-completion backends (Ollama, test doubles).
///
/// Implementations live in parley-infra (e.g., `OllamaProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "ollama").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;

    /// Send a streaming completion request. Returns a stream of events.
    ///
    /// Errors (including connect failures) surface as `Err` items of the
    /// stream rather than from this call.
    fn stream(&self, request: CompletionRequest) -> EventStream;
}
