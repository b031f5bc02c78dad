//! Layers command implementation

use colored::Colorize;
use conf_core::EngineSettings;

use super::start_engine;
use crate::error::Result;

/// Run the layers command
pub async fn run_layers(settings: EngineSettings, json: bool) -> Result<()> {
    let engine = start_engine(settings).await?;
    let status = engine.layer_status().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Layers (lowest precedence first)".bold());
    println!();
    for layer in &status {
        let state = match (&layer.last_error, layer.stale) {
            (Some(_), true) => "stale".yellow(),
            (Some(_), false) => "failed".red(),
            (None, _) if layer.keys == 0 => "empty".dimmed(),
            (None, _) => "ok".green(),
        };
        println!(
            "  {:<7} {} {}",
            layer.layer.as_str().cyan(),
            state,
            layer.source.to_string().dimmed()
        );
        if let Some(digest) = &layer.digest {
            println!("          {} keys, {}", layer.keys, digest.dimmed());
        }
        if let Some(error) = &layer.last_error {
            println!("          {}", error.red());
        }
    }

    Ok(())
}
