//! Document I/O for the layered configuration engine
//!
//! Provides format detection, comment-tolerant parsing, modification stamps
//! and atomic writes for the file-backed configuration layers.

pub mod checksum;
pub mod comments;
pub mod config;
pub mod document;
pub mod error;
pub mod io;

pub use checksum::compute_content_checksum;
pub use comments::strip_comments;
pub use config::ConfigStore;
pub use document::{DocumentFormat, Tree, load_document, parse_document, save_document};
pub use error::{Error, Result};
pub use io::FileStamp;
