//! Layer documents: format detection, parsing and saving
//!
//! Every configuration layer is a mapping at the top level. Documents are
//! parsed into a [`Tree`] regardless of their on-disk format so the merge
//! engine only ever sees one value model.

use std::path::Path;

use serde_json::Value;

use crate::{Error, Result, comments, io};

/// Key/value tree of one configuration document.
pub type Tree = serde_json::Map<String, Value>;

/// On-disk format of a layer document, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// JSON with `//` and `/* */` comments (`.conf`, `.json`, `.jsonc`)
    CommentedJson,
    Toml,
    Yaml,
}

impl DocumentFormat {
    /// Detect the format from a path's extension.
    ///
    /// - `.conf`, `.json`, `.jsonc` -> commented JSON
    /// - `.toml` -> TOML
    /// - `.yaml`, `.yml` -> YAML
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "conf" | "json" | "jsonc" => Ok(Self::CommentedJson),
            "toml" => Ok(Self::Toml),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(Error::UnsupportedFormat { extension }),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::CommentedJson => "JSON",
            Self::Toml => "TOML",
            Self::Yaml => "YAML",
        }
    }
}

/// Parse document content into a tree.
///
/// The top-level value must be a mapping; an empty or whitespace-only
/// document is an empty tree.
pub fn parse_document(content: &str, format: DocumentFormat, path: &Path) -> Result<Tree> {
    let parse_error = |message: String| Error::ConfigParse {
        path: path.to_path_buf(),
        format: format.label().into(),
        message,
    };

    if content.trim().is_empty() {
        return Ok(Tree::new());
    }

    let value: Value = match format {
        DocumentFormat::CommentedJson => {
            let stripped = comments::strip_comments(content);
            if stripped.trim().is_empty() {
                return Ok(Tree::new());
            }
            serde_json::from_str(&stripped).map_err(|e| parse_error(e.to_string()))?
        }
        DocumentFormat::Toml => toml::from_str(content).map_err(|e| parse_error(e.to_string()))?,
        DocumentFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|e| parse_error(e.to_string()))?
        }
    };

    match value {
        Value::Object(tree) => Ok(tree),
        Value::Null => Ok(Tree::new()),
        other => Err(parse_error(format!(
            "top-level value must be a mapping, found {}",
            kind_name(&other)
        ))),
    }
}

/// Load a document from disk.
///
/// Returns `Ok(None)` when the file does not exist; a missing layer file is
/// an empty layer, not an error.
pub fn load_document(path: &Path) -> Result<Option<Tree>> {
    let format = DocumentFormat::from_path(path)?;
    let Some(content) = io::read_text_if_exists(path)? else {
        tracing::debug!(?path, "Layer document not present");
        return Ok(None);
    };
    parse_document(&content, format, path).map(Some)
}

/// Save a tree to disk in the format implied by the path.
///
/// Commented JSON documents are written as plain pretty-printed JSON;
/// comments of a hand-edited file are not preserved.
pub fn save_document(path: &Path, tree: &Tree) -> Result<()> {
    let format = DocumentFormat::from_path(path)?;
    let serialize_error = |message: String| Error::ConfigSerialize {
        path: path.to_path_buf(),
        format: format.label().into(),
        message,
    };

    let content = match format {
        DocumentFormat::CommentedJson => {
            let mut text =
                serde_json::to_string_pretty(tree).map_err(|e| serialize_error(e.to_string()))?;
            text.push('\n');
            text
        }
        DocumentFormat::Toml => {
            toml::to_string_pretty(tree).map_err(|e| serialize_error(e.to_string()))?
        }
        DocumentFormat::Yaml => {
            serde_yaml::to_string(tree).map_err(|e| serialize_error(e.to_string()))?
        }
    };

    io::write_atomic(path, content.as_bytes())
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
