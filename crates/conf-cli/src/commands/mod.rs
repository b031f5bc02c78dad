//! Command implementations for conf-cli

pub mod explain;
pub mod get;
pub mod layers;
pub mod set;
pub mod show;
pub mod watch;

pub use explain::run_explain;
pub use get::run_get;
pub use layers::run_layers;
pub use set::run_set;
pub use show::run_show;
pub use watch::run_watch;

use std::path::Path;
use std::sync::Arc;

use conf_core::{ConfigEngine, EngineSettings};
use serde_json::Value;

use crate::error::Result;

/// Load engine settings from `path`, or from the default location if it
/// exists.
pub fn load_settings(path: Option<&Path>) -> Result<EngineSettings> {
    let settings = match path {
        Some(path) => EngineSettings::load(path)?,
        None => EngineSettings::load_or_default(&EngineSettings::default_location())?,
    };
    Ok(settings)
}

/// Start an engine without background watchers.
pub async fn start_engine(settings: EngineSettings) -> Result<Arc<ConfigEngine>> {
    Ok(ConfigEngine::start(settings).await?)
}

/// Strings bare, everything else as compact JSON.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_are_printed_bare() {
        assert_eq!(format_value(&json!("english")), "english");
        assert_eq!(format_value(&json!(1.5)), "1.5");
        assert_eq!(format_value(&json!(["a"])), r#"["a"]"#);
    }
}
