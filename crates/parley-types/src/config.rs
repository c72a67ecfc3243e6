//! Relay configuration types for Parley.
//!
//! `RelayConfig` mirrors the optional `parley.toml` file. Every field has a
//! default so an empty file (or no file at all) yields a working setup that
//! talks to a local Ollama on its default port.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::chat::FallbackReason;

/// How replies are delivered over the voice channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Token chunks and speakable sentences as they arrive, then a final `end`.
    #[default]
    Stream,
    /// One `end` message per turn once the full reply is available.
    Single,
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseMode::Stream => write!(f, "stream"),
            ResponseMode::Single => write!(f, "single"),
        }
    }
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stream" => Ok(ResponseMode::Stream),
            "single" => Ok(ResponseMode::Single),
            other => Err(format!("invalid response mode: '{other}'")),
        }
    }
}

/// Top-level relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Base URL of the chat-completion server (without `/api/chat`).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Upper bound on generated tokens per reply (`num_predict`).
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Number of non-system messages kept in a session's history.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Overall timeout for one outbound chat call.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Sessions untouched for this long are dropped by the idle sweeper.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,

    /// Prompt catalog key used for new sessions.
    #[serde(default = "default_business")]
    pub business: String,

    #[serde(default)]
    pub response_mode: ResponseMode,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Postgres URL for the write-only turn log.
    #[serde(default)]
    pub database_url: Option<String>,

    /// SQLite URL for a shared session store.
    #[serde(default)]
    pub session_store_url: Option<String>,

    /// Directory with a static frontend to serve at `/`.
    #[serde(default)]
    pub web_dir: Option<String>,

    #[serde(default)]
    pub fallbacks: FallbackPhrases,

    /// Extra or overriding prompt catalog entries, keyed by business id.
    #[serde(default)]
    pub prompts: BTreeMap<String, String>,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_model() -> String {
    "qwen2.5:1.5b".to_string()
}

fn default_temperature() -> f64 {
    0.6
}

fn default_max_tokens() -> u32 {
    100
}

fn default_history_window() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_session_idle_secs() -> u64 {
    30 * 60
}

fn default_business() -> String {
    "sales_closer".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5047
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            history_window: default_history_window(),
            request_timeout_secs: default_request_timeout_secs(),
            session_idle_secs: default_session_idle_secs(),
            business: default_business(),
            response_mode: ResponseMode::default(),
            host: default_host(),
            port: default_port(),
            database_url: None,
            session_store_url: None,
            web_dir: None,
            fallbacks: FallbackPhrases::default(),
            prompts: BTreeMap::new(),
        }
    }
}

/// Static apology strings returned instead of surfacing an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackPhrases {
    #[serde(default = "default_transport_phrase")]
    pub transport: String,
    #[serde(default = "default_timeout_phrase")]
    pub timeout: String,
    #[serde(default = "default_malformed_phrase")]
    pub malformed: String,
}

fn default_transport_phrase() -> String {
    "Connection unstable.".to_string()
}

fn default_timeout_phrase() -> String {
    "Sorry, that took me too long. Could you say it again?".to_string()
}

fn default_malformed_phrase() -> String {
    "Sorry, I didn't catch that. Could you repeat it?".to_string()
}

impl Default for FallbackPhrases {
    fn default() -> Self {
        Self {
            transport: default_transport_phrase(),
            timeout: default_timeout_phrase(),
            malformed: default_malformed_phrase(),
        }
    }
}

impl FallbackPhrases {
    pub fn phrase(&self, reason: FallbackReason) -> &str {
        match reason {
            FallbackReason::Transport => &self.transport,
            FallbackReason::Timeout => &self.timeout,
            FallbackReason::Malformed => &self.malformed,
        }
    }
}
