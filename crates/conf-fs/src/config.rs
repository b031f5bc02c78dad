//! Format-agnostic loading and saving of typed settings files

use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::document::{self, DocumentFormat};
use crate::{Error, Result};

/// Format-agnostic store for typed settings.
///
/// Detects the format from the file extension and round-trips through the
/// same parser as layer documents, so commented JSON works here too.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigStore;

impl ConfigStore {
    pub fn new() -> Self {
        Self
    }

    /// Load and deserialize a settings file.
    pub fn load<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let format = DocumentFormat::from_path(path)?;
        let content = crate::io::read_text(path)?;
        let tree = document::parse_document(&content, format, path)?;
        serde_json::from_value(Value::Object(tree)).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            format: format!("{format:?}"),
            message: e.to_string(),
        })
    }

    /// Serialize and atomically save a settings file.
    pub fn save<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let format = DocumentFormat::from_path(path)?;
        let serialize_error = |message: String| Error::ConfigSerialize {
            path: path.to_path_buf(),
            format: format!("{format:?}"),
            message,
        };
        match serde_json::to_value(value).map_err(|e| serialize_error(e.to_string()))? {
            Value::Object(tree) => document::save_document(path, &tree),
            _ => Err(serialize_error("value is not a mapping".into())),
        }
    }
}
