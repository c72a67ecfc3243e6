//! Prompt catalog listing.

use anyhow::Result;
use console::style;

use crate::state::AppState;

/// Print every catalog key, marking the default. With `show`, each system
/// prompt is printed in full.
pub fn list_prompts(state: &AppState, show: bool, json: bool) -> Result<()> {
    let catalog = state.relay.catalog();
    let default = state.relay.default_business();

    if json {
        let entries: Vec<_> = catalog
            .keys()
            .map(|key| {
                let mut entry = serde_json::json!({
                    "business": key,
                    "default": key == default,
                });
                if show {
                    entry["prompt"] = serde_json::json!(catalog.get(key));
                }
                entry
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!();
    for key in catalog.keys() {
        let marker = if key == default {
            style("*").green().bold().to_string()
        } else {
            " ".to_string()
        };
        println!("  {marker} {}", style(key).bold());
        if show {
            if let Some(prompt) = catalog.get(key) {
                println!("    {}", style(prompt).dim());
                println!();
            }
        }
    }
    println!();

    Ok(())
}
