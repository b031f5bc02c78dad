//! Set command implementation
//!
//! Writes into the USER (or SYSTEM) layer file atomically. The value is
//! checked against the override policy and the schema first, so an edit
//! that the engine would ignore or reject is refused up front.

use colored::Colorize;
use conf_core::{ConfigPath, EngineSettings, Layer, Schema};
use serde_json::Value;

use super::format_value;
use crate::error::{CliError, Result};

/// Run the set command
pub fn run_set(settings: &EngineSettings, path: &str, raw: &str, system: bool) -> Result<()> {
    let path = ConfigPath::parse(path)?;
    if path.is_root() {
        return Err(CliError::user("set needs a path, e.g. 'conf set system_unit metric'"));
    }
    let value = parse_value(raw);
    let (layer, file) = if system {
        (Layer::System, &settings.system_path)
    } else {
        (Layer::User, &settings.user_path)
    };

    let policy = settings.override_policy()?;
    if !policy.is_allowed(&path, layer) {
        return Err(CliError::user(format!(
            "'{path}' cannot be set in the {layer} layer (allowed: {})",
            policy.allowed_for(&path)
        )));
    }
    check_schema(&Schema::builtin(), &path, &value)?;

    let mut document = conf_fs::load_document(file)?.unwrap_or_default();
    path.set_in(&mut document, value.clone())?;
    conf_fs::save_document(file, &document)?;
    tracing::debug!(%path, %layer, ?file, "Persisted configuration value");

    println!(
        "{} Set {} = {} in {} layer ({})",
        "✓".green(),
        path.to_string().cyan(),
        format_value(&value),
        layer,
        file.display()
    );
    Ok(())
}

/// JSON if it parses, otherwise the raw text as a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn check_schema(schema: &Schema, path: &ConfigPath, value: &Value) -> Result<()> {
    match value {
        Value::Object(map) => map
            .iter()
            .try_for_each(|(key, child)| check_schema(schema, &path.child(key), child)),
        leaf => schema
            .validate(path, leaf)
            .map_err(|message| CliError::user(format!("invalid value for '{path}': {message}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_parse_as_json_then_string() {
        assert_eq!(parse_value("1.2"), json!(1.2));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value(r#"["a","b"]"#), json!(["a", "b"]));
        assert_eq!(parse_value("english"), json!("english"));
        assert_eq!(parse_value("hey assistant"), json!("hey assistant"));
    }

    #[test]
    fn nested_values_are_checked_per_leaf() {
        let schema = Schema::builtin();
        let path = ConfigPath::parse("audio_ducking").unwrap();

        assert!(check_schema(&schema, &path, &json!({"volume": 0.5})).is_ok());
        assert!(check_schema(&schema, &path, &json!({"volume": 5})).is_err());
    }
}
