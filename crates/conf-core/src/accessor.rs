//! Lock-free read access to the current configuration
//!
//! The current [`EffectiveConfig`] lives behind an [`ArcSwap`]. Readers load
//! an `Arc` to one complete generation and never block the reload pipeline;
//! publishing swaps the pointer.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::layer::Layer;
use crate::merge::EffectiveConfig;
use crate::path::ConfigPath;

#[derive(Debug)]
pub struct ConfigAccessor {
    current: ArcSwap<EffectiveConfig>,
}

impl ConfigAccessor {
    pub fn new(initial: EffectiveConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// The current configuration. Stays valid and unchanged for as long as
    /// the caller holds it, whatever reloads happen meanwhile.
    pub fn snapshot(&self) -> Arc<EffectiveConfig> {
        self.current.load_full()
    }

    /// Value at a dotted path, or `None` if absent or malformed.
    pub fn get(&self, path: &str) -> Option<Value> {
        let path = ConfigPath::parse(path).ok()?;
        self.get_path(&path)
    }

    pub fn get_path(&self, path: &ConfigPath) -> Option<Value> {
        self.current.load().get(path).cloned()
    }

    /// Typed read. `None` when absent or not convertible to `T`.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        let value = self.get(path)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                tracing::debug!(path, error = %e, "Configuration value has unexpected type");
                None
            }
        }
    }

    /// Layer that supplied the leaf at `path`.
    pub fn provenance(&self, path: &str) -> Option<Layer> {
        let path = ConfigPath::parse(path).ok()?;
        self.current.load().provenance_of(&path)
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation()
    }

    pub(crate) fn publish(&self, config: EffectiveConfig) -> Arc<EffectiveConfig> {
        let config = Arc::new(config);
        self.current.store(Arc::clone(&config));
        config
    }
}

impl Default for ConfigAccessor {
    fn default() -> Self {
        Self::new(EffectiveConfig::empty())
    }
}
