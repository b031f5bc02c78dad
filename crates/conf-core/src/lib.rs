//! Layered configuration resolution for the voice assistant
//!
//! Settings come from four sources, lowest precedence first:
//!
//! - **Default**: the document shipped with the engine
//! - **Remote**: settings pushed by the backend, fetched over HTTP
//! - **System**: `/etc/assistant/assistant.conf`
//! - **User**: `~/.assistant/assistant.conf`
//!
//! # Architecture
//!
//! ```text
//!   LayerStore ──► merge ──► PolicyEnforcer ──► diff ──► ChangeNotifier
//!   (4 layers)               (policy+schema)     │
//!                                                └────► ConfigAccessor
//! ```
//!
//! [`ConfigEngine`] runs this pipeline on every reload and
//! [`ConfigEngine::spawn_watchers`] keeps it running as sources change.
//!
//! # Example
//!
//! ```ignore
//! use conf_core::{ConfigEngine, EngineSettings};
//!
//! let engine = ConfigEngine::start(EngineSettings::default()).await?;
//! let module: Option<String> = engine.accessor().get_as("stt.module");
//! let mut changes = engine.subscribe("stt")?;
//! let _watchers = engine.spawn_watchers();
//! ```

pub mod accessor;
pub mod defaults;
pub mod diff;
pub mod engine;
pub mod error;
pub mod layer;
pub mod merge;
pub mod notify;
pub mod path;
pub mod policy;
pub mod remote;
pub mod schema;
pub mod settings;
pub mod store;
pub mod watch;

pub use accessor::ConfigAccessor;
pub use diff::diff;
pub use engine::{ConfigEngine, ConfigEngineBuilder, ReloadReport, ReloadTrigger, SourceFailure};
pub use error::{Error, RemoteFetchError, Result, ValidationError};
pub use layer::{ConfigLayer, Layer, LayerSet, LayerSource};
pub use merge::{EffectiveConfig, Provenance, merge};
pub use notify::{ChangeEvent, ChangeNotifier, Subscription};
pub use path::ConfigPath;
pub use policy::{Enforcement, OverridePolicy, PolicyEnforcer, PolicyRule, PolicyViolation};
pub use remote::{HttpRemoteSource, RemoteFetch, RemoteSource, translate_keys};
pub use schema::{Constraint, PathPattern, Schema, ValueKind};
pub use settings::{EngineSettings, RemoteSettings, WatchSettings};
pub use store::{DefaultSource, LayerStatus, LayerStore};
pub use watch::WatchHandle;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn layers_resolve_in_precedence_order() {
        let layers: Vec<_> = Layer::ALL
            .into_iter()
            .rev()
            .map(|layer| {
                let tree = json!({"lang": layer.as_str()}).as_object().cloned().unwrap();
                Arc::new(ConfigLayer::new(layer, tree, LayerSource::Literal))
            })
            .collect();

        let effective = merge(&layers);
        let lang = ConfigPath::parse("lang").unwrap();

        assert_eq!(effective.get(&lang), Some(&json!("user")));
        assert_eq!(effective.provenance_of(&lang), Some(Layer::User));
    }
}
