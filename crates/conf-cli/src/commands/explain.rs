//! Explain command implementation
//!
//! Shows the resolved value, the layer it came from, the policy for the path
//! and what every layer defines there.

use colored::Colorize;
use conf_core::{ConfigPath, EngineSettings, Layer, LayerSet};

use super::{format_value, start_engine};
use crate::error::{CliError, Result};

/// Run the explain command
pub async fn run_explain(settings: EngineSettings, path: &str) -> Result<()> {
    let path = ConfigPath::parse(path)?;
    if path.is_root() {
        return Err(CliError::user("explain needs a path, e.g. 'conf explain system_unit'"));
    }
    let engine = start_engine(settings).await?;
    let snapshot = engine.snapshot();
    let allowed = engine.policy().allowed_for(&path);

    println!("{}", path.to_string().bold());
    match snapshot.get(&path) {
        Some(value) => {
            let origin = snapshot
                .provenance_of(&path)
                .map_or_else(|| "merged".to_string(), |layer| layer.to_string());
            println!("  {}: {}", "Value".dimmed(), format_value(value).green());
            println!("  {}: {}", "From".dimmed(), origin.cyan());
        }
        None => println!("  {}: {}", "Value".dimmed(), "not set".yellow()),
    }
    let policy = if allowed == LayerSet::ALL {
        "any layer".to_string()
    } else {
        allowed.to_string()
    };
    println!("  {}: {}", "Policy".dimmed(), policy);
    println!();

    println!("{}:", "Layers".bold());
    let candidates = snapshot.candidates(&path);
    let winner = snapshot.provenance_of(&path);
    for layer in Layer::ALL.into_iter().rev() {
        let defined = candidates.iter().find(|(l, _)| *l == layer).map(|(_, v)| *v);
        let marker = if winner == Some(layer) {
            "*".green()
        } else {
            " ".normal()
        };
        let detail = match defined {
            None => "(not set)".dimmed().to_string(),
            Some(value) if !allowed.contains(layer) => {
                format!("{} {}", format_value(value), "(ignored by policy)".yellow())
            }
            Some(value) => format_value(value),
        };
        println!("  {marker} {:<7} {detail}", layer.as_str());
    }

    let nested: Vec<_> = snapshot
        .provenance()
        .iter()
        .filter(|(leaf, _)| leaf.starts_with(&path) && **leaf != path)
        .collect();
    if !nested.is_empty() {
        println!();
        println!("{}:", "Leaves".bold());
        for (leaf, layer) in nested {
            println!("    {} {}", leaf.to_string().cyan(), format!("[{layer}]").dimmed());
        }
    }

    Ok(())
}
