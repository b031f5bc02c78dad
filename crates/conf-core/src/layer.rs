//! Configuration layers and their fixed precedence
//!
//! Four sources contribute configuration, lowest precedence first:
//!
//! 1. **Default** - the shipped default document
//! 2. **Remote** - settings fetched from the backend
//! 3. **System** - machine-wide file (e.g. `/etc/assistant/assistant.conf`)
//! 4. **User** - per-user file (e.g. `~/.assistant/assistant.conf`)
//!
//! The derived `Ord` on [`Layer`] *is* the precedence order.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use conf_fs::{FileStamp, Tree, compute_content_checksum};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One of the four configuration sources, ordered by precedence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Default,
    Remote,
    System,
    User,
}

impl Layer {
    /// All layers, lowest precedence first.
    pub const ALL: [Layer; 4] = [Layer::Default, Layer::Remote, Layer::System, Layer::User];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Remote => "remote",
            Self::System => "system",
            Self::User => "user",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Self::Default => 0b0001,
            Self::Remote => 0b0010,
            Self::System => 0b0100,
            Self::User => 0b1000,
        }
    }

    /// The set of layers at or above this one.
    pub fn and_above(self) -> LayerSet {
        LayerSet::from_layers(Self::ALL.into_iter().filter(|l| *l >= self))
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "remote" => Ok(Self::Remote),
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            other => Err(Error::Settings {
                message: format!("unknown layer '{other}'"),
            }),
        }
    }
}

/// A set of layers, used by override policies.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LayerSet(u8);

impl LayerSet {
    pub const EMPTY: LayerSet = LayerSet(0);
    pub const ALL: LayerSet = LayerSet(0b1111);

    pub fn from_layers(layers: impl IntoIterator<Item = Layer>) -> Self {
        let mut set = Self::EMPTY;
        for layer in layers {
            set.insert(layer);
        }
        set
    }

    pub fn insert(&mut self, layer: Layer) {
        self.0 |= layer.bit();
    }

    pub fn contains(self, layer: Layer) -> bool {
        self.0 & layer.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Member layers, lowest precedence first.
    pub fn iter(self) -> impl Iterator<Item = Layer> {
        Layer::ALL.into_iter().filter(move |l| self.contains(*l))
    }
}

impl fmt::Debug for LayerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for LayerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Layer::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

impl Serialize for LayerSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Where a layer's content came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "location", rename_all = "lowercase")]
pub enum LayerSource {
    /// The default document compiled into the binary
    Embedded,
    /// An in-memory tree supplied by the caller
    Literal,
    File(PathBuf),
    Remote(String),
    /// No source configured for this layer
    Unconfigured,
}

impl fmt::Display for LayerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedded => f.write_str("<embedded>"),
            Self::Literal => f.write_str("<literal>"),
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => f.write_str(url),
            Self::Unconfigured => f.write_str("<unconfigured>"),
        }
    }
}

/// The content of one layer at one point in time.
///
/// Immutable once built; a reload produces a new `ConfigLayer` rather than
/// mutating the old one.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLayer {
    layer: Layer,
    tree: Tree,
    source: LayerSource,
    digest: String,
    stamp: Option<FileStamp>,
    etag: Option<String>,
}

impl ConfigLayer {
    pub fn new(layer: Layer, tree: Tree, source: LayerSource) -> Self {
        let digest = compute_content_checksum(&serde_json::to_string(&tree).unwrap_or_default());
        Self {
            layer,
            tree,
            source,
            digest,
            stamp: None,
            etag: None,
        }
    }

    pub fn empty(layer: Layer, source: LayerSource) -> Self {
        Self::new(layer, Tree::new(), source)
    }

    /// Record the file stamp this layer was read at.
    pub fn with_stamp(mut self, stamp: Option<FileStamp>) -> Self {
        self.stamp = stamp;
        self
    }

    /// Record the remote entity tag this layer was fetched with.
    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn source(&self) -> &LayerSource {
        &self.source
    }

    /// `sha256:<hex>` digest of the canonical JSON of the tree.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn stamp(&self) -> Option<FileStamp> {
        self.stamp
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn precedence_order_is_total() {
        assert!(Layer::Default < Layer::Remote);
        assert!(Layer::Remote < Layer::System);
        assert!(Layer::System < Layer::User);

        let mut shuffled = vec![Layer::User, Layer::Default, Layer::System, Layer::Remote];
        shuffled.sort();
        assert_eq!(shuffled, Layer::ALL);
    }

    #[test]
    fn and_above_includes_self() {
        let set = Layer::System.and_above();
        assert!(set.contains(Layer::System));
        assert!(set.contains(Layer::User));
        assert!(!set.contains(Layer::Remote));
        assert_eq!(set.to_string(), "{system, user}");
    }

    #[test]
    fn parses_layer_names_case_insensitively() {
        assert_eq!("SYSTEM".parse::<Layer>().unwrap(), Layer::System);
        assert!("global".parse::<Layer>().is_err());
    }

    #[test]
    fn digest_tracks_content() {
        let tree = |v: serde_json::Value| v.as_object().cloned().unwrap();
        let a = ConfigLayer::new(Layer::User, tree(json!({"lang": "en-us"})), LayerSource::Literal);
        let b = ConfigLayer::new(Layer::User, tree(json!({"lang": "en-us"})), LayerSource::Literal);
        let c = ConfigLayer::new(Layer::User, tree(json!({"lang": "de-de"})), LayerSource::Literal);
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
    }
}
