//! Wire types for the Ollama `/api/chat` endpoint.
//!
//! The same object shape is used for a non-streaming response and for each
//! line of a streamed (newline-delimited JSON) response.

use serde::{Deserialize, Serialize};

use parley_types::llm::{CompletionRequest, Message, StopReason, Usage};

/// Request body for `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<OllamaMessage>,
    pub stream: bool,
    pub options: OllamaOptions,
}

impl OllamaChatRequest {
    pub fn from_completion(request: &CompletionRequest, stream: bool) -> Self {
        Self {
            model: request.model.clone(),
            messages: request.messages.iter().map(OllamaMessage::from).collect(),
            stream,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }
}

/// Sampling options. `num_predict` caps generated tokens.
#[derive(Debug, Clone, Serialize)]
pub struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    pub num_predict: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl From<&Message> for OllamaMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role.to_string(),
            content: message.content.clone(),
        }
    }
}

/// One response object (or one streamed line).
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaChatChunk {
    #[serde(default)]
    pub model: String,
    pub message: Option<OllamaMessage>,
    #[serde(default)]
    pub done: bool,
    pub done_reason: Option<String>,
    pub prompt_eval_count: Option<u32>,
    pub eval_count: Option<u32>,
    /// Set instead of `message` when the server fails mid-request.
    pub error: Option<String>,
}

impl OllamaChatChunk {
    pub fn text(&self) -> &str {
        self.message.as_ref().map_or("", |m| m.content.as_str())
    }

    pub fn stop_reason(&self) -> StopReason {
        self.done_reason
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or(StopReason::EndTurn)
    }

    pub fn usage(&self) -> Usage {
        Usage {
            input_tokens: self.prompt_eval_count.unwrap_or(0),
            output_tokens: self.eval_count.unwrap_or(0),
        }
    }
}
