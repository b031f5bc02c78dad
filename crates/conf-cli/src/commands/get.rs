//! Get command implementation

use conf_core::{ConfigPath, EngineSettings};
use serde_json::Value;

use super::{format_value, start_engine};
use crate::error::{CliError, Result};

/// Run the get command
pub async fn run_get(settings: EngineSettings, path: &str) -> Result<()> {
    let path = ConfigPath::parse(path)?;
    let engine = start_engine(settings).await?;

    match engine.accessor().get_path(&path) {
        Some(value @ Value::Object(_)) => println!("{}", serde_json::to_string_pretty(&value)?),
        Some(value) => println!("{}", format_value(&value)),
        None => return Err(CliError::user(format!("'{path}' is not set"))),
    }
    Ok(())
}
