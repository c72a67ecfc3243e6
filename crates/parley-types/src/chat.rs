//! Session, reply and turn telemetry types.
//!
//! A session is the conversation state of one live connection. Each turn
//! produces a [`TurnOutcome`] carrying the structured [`TurnReply`] that the
//! speaker consumes, and optionally a [`TurnRecord`] for the write-only log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Unique identifier for a conversation session.
///
/// Minted per connection (WebSocket) or per first REST call. Never persisted
/// beyond the session's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new SessionId using UUID v7 (time-sortable).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Default language code when the model omits its language tag.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Structured assistant reply, with inline markup removed.
///
/// `text` is what the browser speaks, `language` picks the synthesis voice
/// (lower-case ISO-639-1), and `suggestions` are follow-up options rendered
/// as buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReply {
    pub text: String,
    pub language: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl TurnReply {
    /// A plain reply in the default language with no suggestions.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: DEFAULT_LANGUAGE.to_string(),
            suggestions: Vec::new(),
        }
    }
}

/// Why a turn was answered with a fallback phrase instead of a model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Connect failure, HTTP error status, or broken stream.
    Transport,
    /// The outbound call exceeded the client timeout.
    Timeout,
    /// The model answered with nothing usable.
    Malformed,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::Transport => write!(f, "transport"),
            FallbackReason::Timeout => write!(f, "timeout"),
            FallbackReason::Malformed => write!(f, "malformed"),
        }
    }
}

/// Result of one relayed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// Structured reply for the speaker. Never has empty text.
    pub reply: TurnReply,
    /// Raw assistant text as produced by the model (markup included), or the
    /// fallback phrase.
    pub raw_text: String,
    /// Set when the reply is a fallback phrase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackReason>,
    pub latency_ms: u64,
}

impl TurnOutcome {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// One row of the optional write-only turn log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub session_id: SessionId,
    pub business: String,
    pub user_text: String,
    pub reply_text: String,
    pub language: String,
    pub fallback: Option<FallbackReason>,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_display_parse() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn test_session_id_serializes_as_plain_string() {
        let id = SessionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }

    #[test]
    fn test_turn_reply_plain() {
        let reply = TurnReply::plain("Connection unstable.");
        assert_eq!(reply.language, "en");
        assert!(reply.suggestions.is_empty());
    }

    #[test]
    fn test_turn_reply_suggestions_default_when_missing() {
        let reply: TurnReply =
            serde_json::from_str(r#"{"text":"Hola","language":"es"}"#).unwrap();
        assert!(reply.suggestions.is_empty());
        assert_eq!(reply.language, "es");
    }

    #[test]
    fn test_turn_outcome_omits_fallback_when_none() {
        let outcome = TurnOutcome {
            reply: TurnReply::plain("Hi"),
            raw_text: "[EN] Hi".to_string(),
            fallback: None,
            latency_ms: 12,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json.get("fallback").is_none());
        assert!(!outcome.is_fallback());
    }

    #[test]
    fn test_fallback_reason_serde() {
        let json = serde_json::to_string(&FallbackReason::Timeout).unwrap();
        assert_eq!(json, "\"timeout\"");
        assert_eq!(FallbackReason::Malformed.to_string(), "malformed");
    }
}
