//! CLI command definitions for the `parley` binary.
//!
//! Every relay setting can come from a flag, an environment variable or the
//! optional `--config` TOML file, in that order of precedence.

pub mod ask;
pub mod prompts;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use parley_types::config::{RelayConfig, ResponseMode};

/// Voice sales-agent relay between a browser and an LLM chat endpoint.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except warnings and errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit JSON log lines.
    #[arg(long, global = true, env = "PARLEY_LOG_JSON")]
    pub log_json: bool,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "PARLEY_OTEL")]
    pub otel: bool,

    /// TOML config file.
    #[arg(short, long, global = true, env = "PARLEY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub relay: RelayArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the WebSocket and REST server.
    Serve {
        /// Host to bind to.
        #[arg(long, env = "PARLEY_HOST")]
        host: Option<String>,

        /// Port to listen on.
        #[arg(short, long, env = "PARLEY_PORT")]
        port: Option<u16>,

        /// Directory with a static frontend to serve at `/`.
        #[arg(long, env = "PARLEY_WEB_DIR")]
        web_dir: Option<String>,
    },

    /// Relay a single utterance and print the reply.
    Ask {
        /// What the user says.
        message: String,
    },

    /// List the prompt catalog.
    Prompts {
        /// Print each system prompt in full.
        #[arg(long)]
        show: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Relay settings that override the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct RelayArgs {
    /// Base URL of the chat endpoint.
    #[arg(long, global = true, env = "OLLAMA_HOST")]
    pub endpoint: Option<String>,

    /// Model identifier.
    #[arg(long, global = true, env = "AI_MODEL")]
    pub model: Option<String>,

    #[arg(long, global = true, env = "PARLEY_TEMPERATURE")]
    pub temperature: Option<f64>,

    /// Maximum generated tokens per reply.
    #[arg(long, global = true, env = "PARLEY_MAX_TOKENS")]
    pub max_tokens: Option<u32>,

    /// Non-system messages kept per session.
    #[arg(long, global = true, env = "PARLEY_HISTORY_WINDOW")]
    pub history_window: Option<usize>,

    /// Overall timeout for one chat call, in seconds.
    #[arg(long, global = true, env = "PARLEY_REQUEST_TIMEOUT")]
    pub request_timeout: Option<u64>,

    /// Seconds without a turn before a session is dropped.
    #[arg(long, global = true, env = "PARLEY_SESSION_IDLE")]
    pub session_idle: Option<u64>,

    /// Prompt catalog key for new sessions.
    #[arg(short, long, global = true, env = "PARLEY_BUSINESS")]
    pub business: Option<String>,

    /// `stream` or `single`.
    #[arg(long, global = true, env = "PARLEY_RESPONSE_MODE")]
    pub response_mode: Option<ResponseMode>,

    /// Postgres URL for the turn log.
    #[arg(long, global = true, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// SQLite URL for a shared session store.
    #[arg(long, global = true, env = "SESSION_STORE_URL")]
    pub session_store_url: Option<String>,
}

impl RelayArgs {
    /// Overlay every flag that was given onto `config`.
    pub fn apply(&self, config: &mut RelayConfig) {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(window) = self.history_window {
            config.history_window = window;
        }
        if let Some(timeout) = self.request_timeout {
            config.request_timeout_secs = timeout;
        }
        if let Some(idle) = self.session_idle {
            config.session_idle_secs = idle;
        }
        if let Some(business) = &self.business {
            config.business = business.clone();
        }
        if let Some(mode) = self.response_mode {
            config.response_mode = mode;
        }
        if self.database_url.is_some() {
            config.database_url = self.database_url.clone();
        }
        if self.session_store_url.is_some() {
            config.session_store_url = self.session_store_url.clone();
        }
    }
}
