//! NDJSON stream adapter for Ollama's `/api/chat`.
//!
//! A streamed reply is one JSON object per line:
//! 1. N x `{message: {content}, done: false}` -- token deltas
//! 2. `{done: true, done_reason, prompt_eval_count, eval_count}` -- final line
//! 3. `{error: "..."}` may replace any line when generation fails
//!
//! Lines may be split across HTTP body chunks, so bytes are buffered until a
//! newline arrives. Lines that are not valid JSON are logged and skipped.

use futures_util::StreamExt;
use tracing::warn;

use parley_core::llm::provider::EventStream;
use parley_types::llm::{LlmError, StreamEvent};

use super::transport_error;
use super::types::{OllamaChatChunk, OllamaChatRequest};

/// Splits a byte stream into trimmed, non-empty lines.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append bytes and drain every complete line.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// The trailing line, if the body did not end with a newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let line = String::from_utf8_lossy(&std::mem::take(&mut self.pending))
            .trim()
            .to_string();
        (!line.is_empty()).then_some(line)
    }
}

fn decode_line(line: &str) -> Option<OllamaChatChunk> {
    match serde_json::from_str(line) {
        Ok(chunk) => Some(chunk),
        Err(err) => {
            warn!(error = %err, line, "Skipping malformed stream line");
            None
        }
    }
}

/// Map one decoded line to stream events. Returns true on the final line.
fn chunk_events(
    mut chunk: OllamaChatChunk,
    events: &mut Vec<StreamEvent>,
) -> Result<bool, LlmError> {
    if let Some(message) = chunk.error.take() {
        return Err(LlmError::Stream(message));
    }
    let text = chunk.text();
    if !text.is_empty() {
        events.push(StreamEvent::TextDelta {
            text: text.to_string(),
        });
    }
    if chunk.done {
        events.push(StreamEvent::MessageDelta {
            stop_reason: chunk.stop_reason(),
        });
        events.push(StreamEvent::Usage(chunk.usage()));
        return Ok(true);
    }
    Ok(false)
}

/// Open a streaming chat request and adapt it to [`StreamEvent`]s.
///
/// Order: `Connected`, then `TextDelta`s, then `MessageDelta` + `Usage` when
/// the final line arrives, then `Done`. A body that ends without a final line
/// still ends with `Done`.
pub fn create_ollama_stream(
    client: &reqwest::Client,
    url: &str,
    body: OllamaChatRequest,
) -> EventStream {
    let request = client.post(url).json(&body);

    Box::pin(async_stream::try_stream! {
        let response = request.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            Err::<(), _>(LlmError::Status { status: status.as_u16(), body })?;
            return;
        }

        yield StreamEvent::Connected;

        let mut bytes = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut finished = false;

        while !finished {
            let Some(chunk) = bytes.next().await else {
                break;
            };
            let chunk = chunk.map_err(transport_error)?;

            let mut events = Vec::new();
            for line in lines.push(&chunk) {
                if let Some(decoded) = decode_line(&line) {
                    if chunk_events(decoded, &mut events)? {
                        finished = true;
                        break;
                    }
                }
            }
            for event in events {
                yield event;
            }
        }

        if !finished {
            if let Some(decoded) = lines.finish().as_deref().and_then(decode_line) {
                let mut events = Vec::new();
                chunk_events(decoded, &mut events)?;
                for event in events {
                    yield event;
                }
            }
        }

        yield StreamEvent::Done;
    })
}
