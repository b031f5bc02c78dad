//! Watch command implementation

use colored::Colorize;
use conf_core::EngineSettings;

use super::{format_value, start_engine};
use crate::error::Result;

/// Run the watch command
///
/// Starts the engine with its background watchers and prints every change
/// event until Ctrl-C.
pub async fn run_watch(settings: EngineSettings, prefix: &str) -> Result<()> {
    let engine = start_engine(settings).await?;
    let mut changes = engine.subscribe(prefix)?;
    let watchers = engine.spawn_watchers();

    let scope = if prefix.is_empty() { "all paths" } else { prefix };
    println!(
        "{} {} at generation {} (Ctrl-C to stop)",
        "Watching".bold(),
        scope.cyan(),
        engine.accessor().generation()
    );

    let mut shown = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = changes.recv() => {
                let Some(event) = event else { break };
                if event.generation <= shown {
                    continue;
                }
                shown = event.generation;

                let snapshot = engine.snapshot();
                println!("{} {}", "generation".dimmed(), event.generation.to_string().bold());
                for path in &event.paths {
                    match (snapshot.get(path), snapshot.provenance_of(path)) {
                        (Some(value), Some(layer)) => println!(
                            "  {} = {} {}",
                            path.to_string().cyan(),
                            format_value(value),
                            format!("[{layer}]").dimmed()
                        ),
                        _ => println!("  {} {}", path.to_string().cyan(), "removed".yellow()),
                    }
                }
            }
        }
    }

    watchers.shutdown().await;
    Ok(())
}
