//! Layer store: loads each layer from its source and remembers the last
//! good version
//!
//! - File layers are re-read only when their stamp changes; a missing file
//!   is an empty layer.
//! - The remote layer is fetched through a [`RemoteSource`] under a timeout;
//!   on failure the previously fetched layer stays in place.
//! - The default layer is embedded, a literal tree, or a file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use conf_fs::{FileStamp, Tree, load_document};
use serde::Serialize;

use crate::defaults;
use crate::error::{Error, RemoteFetchError, Result};
use crate::layer::{ConfigLayer, Layer, LayerSource};
use crate::remote::{RemoteFetch, RemoteSource, translate_keys};

/// Where the DEFAULT layer comes from
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultSource {
    /// The default document compiled into the binary
    Embedded,
    Literal(Tree),
    File(PathBuf),
}

/// Diagnostic view of one layer's state in the store
#[derive(Debug, Clone, Serialize)]
pub struct LayerStatus {
    pub layer: Layer,
    pub source: LayerSource,
    pub digest: Option<String>,
    pub keys: usize,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub refresh_count: u64,
    pub last_error: Option<String>,
    /// True when the last refresh failed and an older version is in use
    pub stale: bool,
}

#[derive(Debug, Default)]
struct Slot {
    current: Option<Arc<ConfigLayer>>,
    refreshed_at: Option<DateTime<Utc>>,
    refresh_count: u64,
    last_error: Option<String>,
}

impl Slot {
    fn accept(&mut self, layer: ConfigLayer) -> Arc<ConfigLayer> {
        let layer = Arc::new(layer);
        self.current = Some(Arc::clone(&layer));
        self.refreshed_at = Some(Utc::now());
        self.refresh_count += 1;
        self.last_error = None;
        layer
    }

    fn keep(&mut self) -> Option<Arc<ConfigLayer>> {
        self.last_error = None;
        self.current.clone()
    }

    fn reject(&mut self, error: &Error) {
        self.last_error = Some(error.to_string());
    }
}

struct RemoteConfig {
    source: Arc<dyn RemoteSource>,
    timeout: Duration,
    translate_keys: bool,
}

/// Owns the sources of all four layers and their last loaded versions.
pub struct LayerStore {
    default: DefaultSource,
    system_path: PathBuf,
    user_path: PathBuf,
    remote: Option<RemoteConfig>,
    slots: [Slot; 4],
}

impl LayerStore {
    pub fn new(default: DefaultSource, system_path: PathBuf, user_path: PathBuf) -> Self {
        Self {
            default,
            system_path,
            user_path,
            remote: None,
            slots: Default::default(),
        }
    }

    /// Attach a remote source. Without one the REMOTE layer is always empty.
    pub fn with_remote(
        mut self,
        source: Arc<dyn RemoteSource>,
        timeout: Duration,
        translate_keys: bool,
    ) -> Self {
        self.remote = Some(RemoteConfig {
            source,
            timeout,
            translate_keys,
        });
        self
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Path of a file-backed layer.
    pub fn file_path(&self, layer: Layer) -> Option<&Path> {
        match layer {
            Layer::Default => match &self.default {
                DefaultSource::File(path) => Some(path),
                _ => None,
            },
            Layer::Remote => None,
            Layer::System => Some(&self.system_path),
            Layer::User => Some(&self.user_path),
        }
    }

    /// File-backed layers with the stamps recorded at their last load.
    pub fn watched_files(&self) -> Vec<(Layer, PathBuf, Option<FileStamp>)> {
        Layer::ALL
            .into_iter()
            .filter_map(|layer| {
                let path = self.file_path(layer)?.to_path_buf();
                let stamp = self.slot(layer).current.as_ref().and_then(|l| l.stamp());
                Some((layer, path, stamp))
            })
            .collect()
    }

    /// Last successfully loaded version of a layer.
    pub fn current(&self, layer: Layer) -> Option<Arc<ConfigLayer>> {
        self.slot(layer).current.clone()
    }

    /// Load a layer from its source.
    ///
    /// On failure the error is recorded and returned; the previous version
    /// remains available through [`LayerStore::current`].
    pub async fn load(&mut self, layer: Layer) -> Result<Arc<ConfigLayer>> {
        let outcome = match layer {
            Layer::Default => self.load_default(),
            Layer::Remote => self.load_remote().await,
            Layer::System | Layer::User => {
                let path = self.file_path(layer).map(Path::to_path_buf);
                match path {
                    Some(path) => self.load_file(layer, &path),
                    None => Ok(None),
                }
            }
        };

        match outcome {
            Ok(Some(fresh)) => {
                tracing::debug!(
                    %layer,
                    source = %fresh.source(),
                    digest = fresh.digest(),
                    "Layer refreshed"
                );
                Ok(self.slot_mut(layer).accept(fresh))
            }
            Ok(None) => match self.slot_mut(layer).keep() {
                Some(unchanged) => Ok(unchanged),
                None => {
                    let empty = ConfigLayer::empty(layer, LayerSource::Unconfigured);
                    Ok(self.slot_mut(layer).accept(empty))
                }
            },
            Err(error) => {
                self.slot_mut(layer).reject(&error);
                Err(error)
            }
        }
    }

    /// Per-layer diagnostics, lowest precedence first.
    pub fn status(&self) -> Vec<LayerStatus> {
        Layer::ALL
            .into_iter()
            .map(|layer| {
                let slot = self.slot(layer);
                LayerStatus {
                    layer,
                    source: slot
                        .current
                        .as_ref()
                        .map_or_else(|| self.describe_source(layer), |l| l.source().clone()),
                    digest: slot.current.as_ref().map(|l| l.digest().to_string()),
                    keys: slot.current.as_ref().map_or(0, |l| l.tree().len()),
                    refreshed_at: slot.refreshed_at,
                    refresh_count: slot.refresh_count,
                    last_error: slot.last_error.clone(),
                    stale: slot.last_error.is_some() && slot.current.is_some(),
                }
            })
            .collect()
    }

    /// `Ok(None)` means "nothing new": keep the current version.
    fn load_default(&self) -> Result<Option<ConfigLayer>> {
        match &self.default {
            DefaultSource::Embedded => {
                if self.slot(Layer::Default).current.is_some() {
                    return Ok(None);
                }
                let tree = defaults::default_tree().map_err(|source| Error::LayerDocument {
                    layer: Layer::Default,
                    source,
                })?;
                Ok(Some(ConfigLayer::new(
                    Layer::Default,
                    tree,
                    LayerSource::Embedded,
                )))
            }
            DefaultSource::Literal(tree) => {
                if self.slot(Layer::Default).current.is_some() {
                    return Ok(None);
                }
                Ok(Some(ConfigLayer::new(
                    Layer::Default,
                    tree.clone(),
                    LayerSource::Literal,
                )))
            }
            DefaultSource::File(path) => {
                if !path.exists() {
                    return Err(Error::SourceUnavailable {
                        layer: Layer::Default,
                        reason: format!("{} does not exist", path.display()),
                    });
                }
                self.load_file(Layer::Default, path)
            }
        }
    }

    fn load_file(&self, layer: Layer, path: &Path) -> Result<Option<ConfigLayer>> {
        let stamp = FileStamp::read(path).map_err(|source| Error::LayerDocument { layer, source })?;
        if let Some(current) = &self.slot(layer).current
            && current.stamp() == stamp
        {
            tracing::trace!(%layer, ?path, "Layer file unchanged");
            return Ok(None);
        }

        let tree = load_document(path)
            .map_err(|source| Error::LayerDocument { layer, source })?
            .unwrap_or_default();
        Ok(Some(
            ConfigLayer::new(layer, tree, LayerSource::File(path.to_path_buf())).with_stamp(stamp),
        ))
    }

    async fn load_remote(&self) -> Result<Option<ConfigLayer>> {
        let Some(remote) = &self.remote else {
            return Ok(None);
        };
        let previous_etag = self
            .slot(Layer::Remote)
            .current
            .as_ref()
            .and_then(|l| l.etag().map(str::to_owned));

        let fetched = tokio::time::timeout(remote.timeout, remote.source.fetch(previous_etag.as_deref()))
            .await
            .map_err(|_| RemoteFetchError::Timeout {
                after: remote.timeout,
            })??;

        match fetched {
            RemoteFetch::NotModified => Ok(None),
            RemoteFetch::Modified { tree, etag } => {
                let tree = if remote.translate_keys {
                    translate_keys(tree)
                } else {
                    tree
                };
                Ok(Some(
                    ConfigLayer::new(
                        Layer::Remote,
                        tree,
                        LayerSource::Remote(remote.source.describe()),
                    )
                    .with_etag(etag),
                ))
            }
        }
    }

    fn describe_source(&self, layer: Layer) -> LayerSource {
        match layer {
            Layer::Default => match &self.default {
                DefaultSource::Embedded => LayerSource::Embedded,
                DefaultSource::Literal(_) => LayerSource::Literal,
                DefaultSource::File(path) => LayerSource::File(path.clone()),
            },
            Layer::Remote => self
                .remote
                .as_ref()
                .map_or(LayerSource::Unconfigured, |r| {
                    LayerSource::Remote(r.source.describe())
                }),
            Layer::System => LayerSource::File(self.system_path.clone()),
            Layer::User => LayerSource::File(self.user_path.clone()),
        }
    }

    fn slot(&self, layer: Layer) -> &Slot {
        &self.slots[Self::index(layer)]
    }

    fn slot_mut(&mut self, layer: Layer) -> &mut Slot {
        &mut self.slots[Self::index(layer)]
    }

    fn index(layer: Layer) -> usize {
        match layer {
            Layer::Default => 0,
            Layer::Remote => 1,
            Layer::System => 2,
            Layer::User => 3,
        }
    }
}

impl std::fmt::Debug for LayerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerStore")
            .field("default", &self.default)
            .field("system_path", &self.system_path)
            .field("user_path", &self.user_path)
            .field(
                "remote",
                &self.remote.as_ref().map(|r| r.source.describe()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> LayerStore {
        LayerStore::new(
            DefaultSource::Literal(json!({"lang": "en-us"}).as_object().cloned().unwrap()),
            dir.path().join("system.conf"),
            dir.path().join("user.conf"),
        )
    }

    #[tokio::test]
    async fn missing_file_layer_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);

        let user = store.load(Layer::User).await.unwrap();

        assert!(user.is_empty());
        assert_eq!(user.source(), &LayerSource::File(dir.path().join("user.conf")));
        assert_eq!(user.stamp(), None);
    }

    #[tokio::test]
    async fn unchanged_file_is_not_reread() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("user.conf"), r#"{"lang": "de-de"}"#).unwrap();
        let mut store = store_in(&dir);

        let first = store.load(Layer::User).await.unwrap();
        let second = store.load(Layer::User).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.status()[3].refresh_count, 1);
    }

    #[tokio::test]
    async fn broken_file_keeps_previous_layer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("system.conf");
        fs::write(&path, r#"{"system_unit": "english"}"#).unwrap();
        let mut store = store_in(&dir);
        store.load(Layer::System).await.unwrap();

        fs::write(&path, r#"{"system_unit": "#).unwrap();
        let err = store.load(Layer::System).await.unwrap_err();

        assert!(matches!(err, Error::LayerDocument { layer: Layer::System, .. }));
        let current = store.current(Layer::System).unwrap();
        assert_eq!(current.tree()["system_unit"], "english");
        assert!(store.status()[2].stale);
    }

    #[tokio::test]
    async fn missing_default_file_is_source_unavailable() {
        let dir = TempDir::new().unwrap();
        let mut store = LayerStore::new(
            DefaultSource::File(dir.path().join("assistant.conf")),
            dir.path().join("system.conf"),
            dir.path().join("user.conf"),
        );

        let err = store.load(Layer::Default).await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { layer: Layer::Default, .. }));
    }

    #[tokio::test]
    async fn remote_without_source_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        let remote = store.load(Layer::Remote).await.unwrap();
        assert!(remote.is_empty());
        assert_eq!(remote.source(), &LayerSource::Unconfigured);
    }

    #[tokio::test]
    async fn embedded_default_loads_once() {
        let dir = TempDir::new().unwrap();
        let mut store = LayerStore::new(
            DefaultSource::Embedded,
            dir.path().join("system.conf"),
            dir.path().join("user.conf"),
        );
        let first = store.load(Layer::Default).await.unwrap();
        let second = store.load(Layer::Default).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.source(), &LayerSource::Embedded);
        assert!(!first.is_empty());
    }
}
