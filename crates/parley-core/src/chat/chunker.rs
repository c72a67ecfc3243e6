//! Sentence chunking for speech pacing.
//!
//! Streamed tokens are buffered until the buffer ends in terminal
//! punctuation; the buffer is then emitted as one speakable unit. The
//! concatenation of all emitted units is always the input, byte for byte.

/// Characters that close a speakable unit.
const TERMINALS: [char; 5] = ['.', '!', '?', ':', ';'];

/// Accumulates streamed tokens into sentence-sized units.
#[derive(Debug, Default)]
pub struct SentenceChunker {
    buffer: String,
}

impl SentenceChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one token. Returns a unit when the buffer reaches a boundary.
    pub fn push(&mut self, token: &str) -> Option<String> {
        self.buffer.push_str(token);
        if self.at_boundary() {
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }

    /// Flush whatever is left once the stream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    fn at_boundary(&self) -> bool {
        self.buffer.trim_end().ends_with(TERMINALS) && !has_open_suggestion_tag(&self.buffer)
    }
}

/// Whether a `<<` suggestion tag has been opened but not yet closed.
fn has_open_suggestion_tag(text: &str) -> bool {
    match (text.rfind("<<"), text.rfind(">>")) {
        (Some(open), Some(close)) => open > close,
        (Some(_), None) => true,
        _ => false,
    }
}
