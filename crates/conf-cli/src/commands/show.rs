//! Show command implementation

use colored::Colorize;
use conf_core::EngineSettings;

use super::{format_value, start_engine};
use crate::error::Result;

/// Run the show command
pub async fn run_show(settings: EngineSettings, json: bool) -> Result<()> {
    let engine = start_engine(settings).await?;
    let snapshot = engine.snapshot();

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot.to_value())?);
        return Ok(());
    }

    println!(
        "{} {}",
        "Effective configuration".bold(),
        format!("(generation {})", snapshot.generation()).dimmed()
    );
    println!();
    if snapshot.provenance().is_empty() {
        println!("  {}", "Nothing configured".dimmed());
        return Ok(());
    }
    for (path, layer) in snapshot.provenance() {
        let value = snapshot.get(path).map(format_value).unwrap_or_default();
        println!(
            "  {} = {} {}",
            path.to_string().cyan(),
            value,
            format!("[{layer}]").dimmed()
        );
    }

    Ok(())
}
