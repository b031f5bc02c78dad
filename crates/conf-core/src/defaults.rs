//! The default document shipped with the engine

use std::path::Path;

use conf_fs::{DocumentFormat, Tree, parse_document};

const DEFAULT_DOCUMENT: &str = include_str!("../defaults/assistant.conf");

/// Raw text of the embedded default document.
pub fn default_document() -> &'static str {
    DEFAULT_DOCUMENT
}

/// Parse the embedded default document.
pub fn default_tree() -> conf_fs::Result<Tree> {
    parse_document(
        DEFAULT_DOCUMENT,
        DocumentFormat::CommentedJson,
        Path::new("<embedded>/assistant.conf"),
    )
}
