//! One-shot relay command.

use anyhow::Result;
use console::style;

use crate::state::AppState;

/// Relay `message` as the first turn of a fresh session and print the reply.
pub async fn ask(state: &AppState, message: &str, json: bool) -> Result<()> {
    if message.trim().is_empty() {
        anyhow::bail!("message must not be empty");
    }

    let session = state.relay.open_session(None)?;
    let outcome = state.relay.run_turn(&session, message).await;
    state.relay.end_session(&session.id).await;

    if json {
        let body = serde_json::json!({
            "session_id": session.id,
            "business": session.business,
            "reply": outcome.reply,
            "fallback": outcome.fallback,
            "latency_ms": outcome.latency_ms,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style(format!("[{}]", outcome.reply.language)).dim(),
        style(&outcome.reply.text).bold()
    );
    if !outcome.reply.suggestions.is_empty() {
        let options: Vec<String> = outcome
            .reply
            .suggestions
            .iter()
            .map(|s| style(format!("‹{s}›")).cyan().to_string())
            .collect();
        println!("  {}", options.join("  "));
    }
    if let Some(reason) = outcome.fallback {
        println!("  {}", style(format!("fallback: {reason}")).yellow());
    }
    println!(
        "  {}",
        style(format!("{} ms · {}", outcome.latency_ms, session.business)).dim()
    );
    println!();

    Ok(())
}
