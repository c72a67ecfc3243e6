//! Application state wiring the relay to its infrastructure.
//!
//! AppState is shared by the CLI commands and every HTTP/WebSocket handler.

use std::sync::Arc;

use tokio::sync::mpsc;

use parley_core::chat::relay::{RelaySettings, TurnRelay};
use parley_core::prompt::PromptCatalog;
use parley_infra::diagnostics::{InfraReport, open_session_store, open_turn_log};
use parley_infra::llm::create_provider;
use parley_infra::postgres::TurnLogWriter;
use parley_types::config::{RelayConfig, ResponseMode};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub relay: TurnRelay,
    pub response_mode: ResponseMode,
    pub infra: Arc<InfraReport>,
}

impl AppState {
    pub fn new(relay: TurnRelay, response_mode: ResponseMode, infra: InfraReport) -> Self {
        Self {
            relay,
            response_mode,
            infra: Arc::new(infra),
        }
    }

    /// Build the relay from `config`: provider, prompt catalog, session store
    /// and, if reachable, the turn log writer.
    ///
    /// The writer stops once every clone of the state is dropped; finish it
    /// after that to flush queued records.
    pub async fn init(config: &RelayConfig) -> anyhow::Result<(Self, Option<TurnLogWriter>)> {
        let catalog = PromptCatalog::with_overrides(&config.prompts)?;
        let provider = create_provider(config)?;

        let (store, session_store) = open_session_store(config.session_store_url.as_deref()).await;
        let (turn_log, turn_log_status) = open_turn_log(config.database_url.as_deref()).await;
        let infra = InfraReport {
            session_store,
            turn_log: turn_log_status,
        };
        infra.log();

        let mut relay = TurnRelay::new(
            provider,
            store,
            catalog,
            &config.business,
            RelaySettings::from_config(config),
        )?;

        let mut writer = None;
        if let Some(log) = turn_log {
            let (tx, rx) = mpsc::unbounded_channel();
            writer = Some(log.spawn_writer(rx));
            relay = relay.with_turn_log(tx);
        }

        tracing::info!(
            endpoint = %config.endpoint,
            model = %config.model,
            business = %config.business,
            response_mode = %config.response_mode,
            history_window = config.history_window,
            session_idle_secs = config.session_idle_secs,
            "Relay ready"
        );

        Ok((Self::new(relay, config.response_mode, infra), writer))
    }
}
