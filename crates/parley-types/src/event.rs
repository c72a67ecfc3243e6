//! Wire messages for the `/ws` voice channel.
//!
//! The browser sends either raw utterance text or a JSON [`ClientCommand`];
//! the server answers with JSON [`ServerMessage`] frames tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::chat::{SessionId, TurnReply};

/// Status text sent while the model is working on a turn.
pub const STATUS_THINKING: &str = "Thinking...";

/// Status text sent once the channel is ready for the next utterance.
pub const STATUS_LISTENING: &str = "Listening...";

/// Messages pushed from the server to a voice client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First frame on every connection.
    Session { session_id: SessionId },

    /// UI status line ("Thinking...", "Listening...").
    Status { content: String },

    /// A raw token as produced by the model.
    Chunk { content: String },

    /// A complete sentence ready for speech synthesis (markup removed).
    Sentence { content: String },

    /// The turn is finished. `full_text` is the speakable reply text.
    End { full_text: String, reply: TurnReply },

    /// The in-flight reply was abandoned because the user spoke.
    Interrupted,

    Pong,
}

impl ServerMessage {
    pub fn status(content: impl Into<String>) -> Self {
        ServerMessage::Status {
            content: content.into(),
        }
    }

    pub fn end(reply: TurnReply) -> Self {
        ServerMessage::End {
            full_text: reply.text.clone(),
            reply,
        }
    }
}

/// JSON commands a client may send instead of utterance text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Stop the reply currently being generated.
    Interrupt,
    /// Keep-alive ping. Server responds with `{"type":"pong"}`.
    Ping,
}

/// A decoded client text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Command(ClientCommand),
    Utterance(String),
    /// Whitespace-only text; ignored.
    Blank,
}

impl ClientFrame {
    /// Decode a text frame. Anything that is not a known JSON command is
    /// treated as utterance text.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return ClientFrame::Blank;
        }
        if trimmed.starts_with('{') {
            if let Ok(cmd) = serde_json::from_str::<ClientCommand>(trimmed) {
                return ClientFrame::Command(cmd);
            }
        }
        ClientFrame::Utterance(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_wire_shape() {
        let msg = ServerMessage::status(STATUS_THINKING);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["content"], "Thinking...");

        let chunk = serde_json::to_value(ServerMessage::Chunk {
            content: "Hel".into(),
        })
        .unwrap();
        assert_eq!(chunk["type"], "chunk");

        let pong = serde_json::to_string(&ServerMessage::Pong).unwrap();
        assert_eq!(pong, r#"{"type":"pong"}"#);
    }

    #[test]
    fn test_end_carries_full_text_and_reply() {
        let reply = TurnReply {
            text: "Hello, I'm James.".into(),
            language: "en".into(),
            suggestions: vec!["Pricing".into()],
        };
        let json = serde_json::to_value(ServerMessage::end(reply)).unwrap();
        assert_eq!(json["type"], "end");
        assert_eq!(json["full_text"], "Hello, I'm James.");
        assert_eq!(json["reply"]["suggestions"][0], "Pricing");
    }

    #[test]
    fn test_client_frame_parse() {
        assert_eq!(
            ClientFrame::parse(r#"{"type":"interrupt"}"#),
            ClientFrame::Command(ClientCommand::Interrupt)
        );
        assert_eq!(
            ClientFrame::parse(r#" {"type":"ping"} "#),
            ClientFrame::Command(ClientCommand::Ping)
        );
        assert_eq!(ClientFrame::parse("   \n"), ClientFrame::Blank);
        assert_eq!(
            ClientFrame::parse("  what does it cost? "),
            ClientFrame::Utterance("what does it cost?".into())
        );
        // Unknown JSON is spoken text, not an error.
        assert_eq!(
            ClientFrame::parse(r#"{"type":"dance"}"#),
            ClientFrame::Utterance(r#"{"type":"dance"}"#.into())
        );
    }
}
