//! Dotted configuration paths
//!
//! A [`ConfigPath`] such as `stt.module` addresses a node in a configuration
//! tree. Paths are the unit of addressing, validation and change
//! notification. Prefix tests are segment-wise, so `stt` prefixes
//! `stt.module` but not `stts`.

use std::fmt;
use std::str::FromStr;

use conf_fs::Tree;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ConfigPath {
    segments: Vec<String>,
}

impl ConfigPath {
    /// The root path; a prefix of every path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dotted path. The empty string is the root.
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Ok(Self::root());
        }
        let segments: Vec<String> = path.split('.').map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return Err(Error::InvalidPath {
                path: path.to_string(),
                reason: "empty segment".into(),
            });
        }
        Ok(Self { segments })
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn child(&self, key: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(key.to_string());
        Self { segments }
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.segments.split_last()?;
        Some(Self {
            segments: init.to_vec(),
        })
    }

    pub fn starts_with(&self, prefix: &ConfigPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Look up the value at this path. The root has no single value.
    pub fn lookup<'a>(&self, tree: &'a Tree) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        rest.iter()
            .try_fold(tree.get(first)?, |node, key| node.as_object()?.get(key))
    }
}

/// Remove and return the value at `path`.
pub(crate) fn remove_at(tree: &mut Tree, path: &ConfigPath) -> Option<Value> {
    let (last, init) = path.segments().split_last()?;
    let mut node = tree;
    for key in init {
        node = node.get_mut(key)?.as_object_mut()?;
    }
    node.remove(last)
}

/// Insert `value` at `path`, creating intermediate mappings.
///
/// Returns `false` without modifying the tree when an ancestor exists but is
/// not a mapping.
pub(crate) fn insert_at(tree: &mut Tree, path: &ConfigPath, value: Value) -> bool {
    let Some((last, init)) = path.segments().split_last() else {
        return false;
    };
    let mut node = tree;
    for key in init {
        let entry = node
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Tree::new()));
        match entry.as_object_mut() {
            Some(map) => node = map,
            None => return false,
        }
    }
    node.insert(last.clone(), value);
    true
}

impl ConfigPath {
    /// Set `value` at this path in a layer document, creating intermediate
    /// mappings. Fails for the root or when an ancestor is not a mapping.
    pub fn set_in(&self, tree: &mut Tree, value: Value) -> Result<()> {
        if self.is_root() {
            return Err(Error::InvalidPath {
                path: String::new(),
                reason: "the root cannot be assigned a value".into(),
            });
        }
        if insert_at(tree, self, value) {
            Ok(())
        } else {
            Err(Error::InvalidPath {
                path: self.to_string(),
                reason: "an ancestor is not a mapping".into(),
            })
        }
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for ConfigPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ConfigPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ConfigPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
