//! Type-erased provider handle.
//!
//! The relay picks its backend at startup, but [`LlmProvider::complete`]
//! returns an opaque future, so the trait is not dyn-compatible. The
//! blanket [`ErasedProvider`] impl boxes that future; [`BoxLlmProvider`] is
//! what the relay holds.

use std::future::Future;
use std::pin::Pin;

use parley_types::llm::{CompletionRequest, CompletionResponse, LlmError};

use super::provider::{EventStream, LlmProvider};

type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<CompletionResponse, LlmError>> + Send + 'a>>;

trait ErasedProvider: Send + Sync {
    fn provider_name(&self) -> &str;
    fn complete_erased<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a>;
    fn stream_erased(&self, request: CompletionRequest) -> EventStream;
}

impl<T: LlmProvider> ErasedProvider for T {
    fn provider_name(&self) -> &str {
        self.name()
    }

    fn complete_erased<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a> {
        Box::pin(self.complete(request))
    }

    fn stream_erased(&self, request: CompletionRequest) -> EventStream {
        self.stream(request)
    }
}

/// The chat backend selected at startup.
pub struct BoxLlmProvider {
    inner: Box<dyn ErasedProvider>,
}

impl BoxLlmProvider {
    pub fn new<T: LlmProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }

    /// Backend name used in span fields and `/health`.
    pub fn name(&self) -> &str {
        self.inner.provider_name()
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.inner.complete_erased(request).await
    }

    pub fn stream(&self, request: CompletionRequest) -> EventStream {
        self.inner.stream_erased(request)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{StreamExt, stream};
    use parley_types::llm::{Message, StopReason, StreamEvent, Usage};

    use super::*;

    struct Echo;

    impl LlmProvider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(CompletionResponse {
                content: last,
                model: request.model.clone(),
                stop_reason: StopReason::EndTurn,
                usage: Usage::default(),
            })
        }

        fn stream(&self, request: CompletionRequest) -> EventStream {
            let text = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            let events: Vec<Result<StreamEvent, LlmError>> =
                vec![Ok(StreamEvent::TextDelta { text }), Ok(StreamEvent::Done)];
            Box::pin(stream::iter(events))
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "m".into(),
            messages: vec![Message::user("ping")],
            max_tokens: 10,
            temperature: None,
            stream: false,
        }
    }

    #[tokio::test]
    async fn test_boxed_provider_delegates() {
        let provider = BoxLlmProvider::new(Echo);
        assert_eq!(provider.name(), "echo");
        assert_eq!(provider.complete(&request()).await.unwrap().content, "ping");

        let events: Vec<_> = provider.stream(request()).collect().await;
        assert_eq!(
            events[0].as_ref().unwrap(),
            &StreamEvent::TextDelta { text: "ping".into() }
        );
    }
}
