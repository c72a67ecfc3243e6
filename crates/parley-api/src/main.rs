//! Parley entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, resolves the relay configuration, wires the relay to
//! its backends, then dispatches to a command or starts the server.

mod cli;
mod http;
mod state;

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use clap_complete::generate;

use parley_infra::config::{load_config, validate_config};
use parley_observe::tracing_setup::{LogOptions, init_tracing, shutdown_tracing};
use parley_types::config::RelayConfig;

use cli::{Cli, Commands};
use state::AppState;

/// How long shutdown waits for queued turn log rows.
const TURN_LOG_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need logging or state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "parley", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(&LogOptions {
        verbosity: cli.verbose,
        quiet: cli.quiet,
        json: cli.log_json,
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(cli.config.as_deref()).await;
    cli.relay.apply(&mut config);
    if let Commands::Serve {
        host,
        port,
        web_dir,
    } = &cli.command
    {
        if let Some(host) = host {
            config.host = host.clone();
        }
        if let Some(port) = port {
            config.port = *port;
        }
        if web_dir.is_some() {
            config.web_dir = web_dir.clone();
        }
    }
    validate_config(&config).context("invalid configuration")?;

    let (state, turn_log) = AppState::init(&config).await?;
    let result = dispatch(cli.command, state, &config, cli.quiet, cli.json).await;

    if let Some(writer) = turn_log {
        writer.finish(TURN_LOG_GRACE).await;
    }
    result
}

/// Run one command. Takes the state by value so its turn log senders are
/// gone when this returns.
async fn dispatch(
    command: Commands,
    state: AppState,
    config: &RelayConfig,
    quiet: bool,
    json: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Serve { .. } => {
            let addr = format!("{}:{}", config.host, config.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to bind {addr}"))?;

            if !quiet {
                println!();
                println!(
                    "  {} Parley listening on {}",
                    console::style("●").green().bold(),
                    console::style(format!("http://{addr}")).cyan()
                );
                println!(
                    "  {}",
                    console::style(format!(
                        "voice channel ws://{addr}/ws  ·  model {}  ·  business {}",
                        config.model, config.business
                    ))
                    .dim()
                );
                println!("  {}", console::style("Press Ctrl+C to stop").dim());
                println!();
            }

            let sweep_period = (Duration::from_secs(config.session_idle_secs) / 4)
                .clamp(Duration::from_secs(1), Duration::from_secs(60));
            let sweeper = state.relay.spawn_idle_sweeper(sweep_period);
            let router = http::router::build_router(state, config.web_dir.as_deref().map(Path::new));

            let served = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await;
            sweeper.abort();
            let _ = sweeper.await;
            served?;

            if !quiet {
                println!("\n  Server stopped.");
            }
        }

        Commands::Ask { message } => {
            cli::ask::ask(&state, &message, json).await?;
        }

        Commands::Prompts { show } => {
            cli::prompts::list_prompts(&state, show, json)?;
        }

        // Printed before tracing starts.
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
