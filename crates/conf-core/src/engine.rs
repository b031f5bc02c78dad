//! The reload pipeline
//!
//! [`ConfigEngine`] owns the layer store, the enforcer, the accessor and the
//! notifier, and runs `load → merge → enforce → diff → publish` one pass at
//! a time. Triggers that arrive while a pass runs are folded into a single
//! follow-up pass.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use crate::accessor::ConfigAccessor;
use crate::diff::diff;
use crate::error::{Error, Result, ValidationError};
use crate::layer::{ConfigLayer, Layer};
use crate::merge::{EffectiveConfig, merge};
use crate::notify::{ChangeNotifier, Subscription};
use crate::path::ConfigPath;
use crate::policy::{Enforcement, OverridePolicy, PolicyEnforcer, PolicyViolation};
use crate::remote::{HttpRemoteSource, RemoteSource};
use crate::schema::Schema;
use crate::settings::EngineSettings;
use crate::store::{DefaultSource, LayerStatus, LayerStore};

/// Why a reload was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadTrigger {
    Startup,
    FileChanged(Layer),
    RemotePoll,
    RemoteInvalidated,
    /// SIGHUP
    Signal,
    Manual,
}

impl ReloadTrigger {
    /// Whether this trigger asks for the remote layer to be fetched again.
    pub fn refreshes_remote(self) -> bool {
        matches!(
            self,
            Self::Startup | Self::RemotePoll | Self::RemoteInvalidated | Self::Signal
        )
    }
}

impl fmt::Display for ReloadTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Startup => f.write_str("startup"),
            Self::FileChanged(layer) => write!(f, "{layer} file changed"),
            Self::RemotePoll => f.write_str("remote poll"),
            Self::RemoteInvalidated => f.write_str("remote invalidated"),
            Self::Signal => f.write_str("signal"),
            Self::Manual => f.write_str("manual"),
        }
    }
}

/// A layer that could not be refreshed during a reload.
///
/// The previous version of the layer, if any, was used instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub layer: Layer,
    pub message: String,
}

/// What one reload pass did
#[derive(Debug, Clone)]
pub struct ReloadReport {
    pub trigger: ReloadTrigger,
    pub generation: u64,
    pub changed: BTreeSet<ConfigPath>,
    pub violations: Vec<PolicyViolation>,
    pub validation_errors: Vec<ValidationError>,
    pub source_errors: Vec<SourceFailure>,
    /// The remote layer was fetched (successfully) during this pass
    pub remote_refreshed: bool,
}

impl ReloadReport {
    pub fn is_clean(&self) -> bool {
        self.source_errors.is_empty() && self.validation_errors.is_empty()
    }
}

/// Layered configuration engine.
///
/// Create one with [`ConfigEngine::builder`]; it is shared as an `Arc` so
/// background watchers (see [`ConfigEngine::spawn_watchers`]) can drive
/// reloads.
pub struct ConfigEngine {
    settings: EngineSettings,
    accessor: ConfigAccessor,
    notifier: ChangeNotifier,
    enforcer: PolicyEnforcer,
    store: Mutex<LayerStore>,
    pending: AtomicBool,
    pending_remote: AtomicBool,
    remote_healthy: AtomicBool,
}

impl ConfigEngine {
    pub fn builder(settings: EngineSettings) -> ConfigEngineBuilder {
        ConfigEngineBuilder {
            settings,
            remote: None,
            default: None,
            policy: None,
            schema: None,
        }
    }

    /// Build an engine from settings alone and run the first reload.
    pub async fn start(settings: EngineSettings) -> Result<Arc<Self>> {
        Self::builder(settings).start().await
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn accessor(&self) -> &ConfigAccessor {
        &self.accessor
    }

    /// Current configuration snapshot.
    pub fn snapshot(&self) -> Arc<EffectiveConfig> {
        self.accessor.snapshot()
    }

    pub fn policy(&self) -> &OverridePolicy {
        self.enforcer.policy()
    }

    pub fn schema(&self) -> &Schema {
        self.enforcer.schema()
    }

    /// Subscribe to changes under a dotted path prefix (`""` for everything).
    pub fn subscribe(&self, prefix: &str) -> Result<Subscription> {
        Ok(self.notifier.subscribe(ConfigPath::parse(prefix)?))
    }

    /// Whether the last remote fetch succeeded. Always true without a remote.
    pub fn remote_healthy(&self) -> bool {
        self.remote_healthy.load(Ordering::SeqCst)
    }

    /// Per-layer diagnostics. Waits for a running reload to finish.
    pub async fn layer_status(&self) -> Vec<LayerStatus> {
        self.store.lock().await.status()
    }

    /// Fetch the remote layer again on the next pass and reload now.
    pub async fn invalidate_remote(self: &Arc<Self>) -> Result<Option<ReloadReport>> {
        self.reload(ReloadTrigger::RemoteInvalidated).await
    }

    /// Run the reload pipeline.
    ///
    /// Returns `None` when another reload is running; that reload performs
    /// one more pass which covers this request. Fails only when no default
    /// layer has ever been loaded.
    ///
    /// Passes run on a spawned task, so dropping the returned future does
    /// not abandon requests coalesced into it.
    pub async fn reload(self: &Arc<Self>, trigger: ReloadTrigger) -> Result<Option<ReloadReport>> {
        if trigger.refreshes_remote() {
            self.pending_remote.store(true, Ordering::SeqCst);
        }
        self.pending.store(true, Ordering::SeqCst);

        let engine = Arc::clone(self);
        match tokio::spawn(async move { engine.drain_pending(trigger).await }).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                tracing::debug!(%trigger, error = %e, "Reload task cancelled");
                Ok(None)
            }
        }
    }

    async fn drain_pending(&self, trigger: ReloadTrigger) -> Result<Option<ReloadReport>> {
        let mut report = None;
        loop {
            let Ok(mut store) = self.store.try_lock() else {
                tracing::debug!(%trigger, "Reload already running, request coalesced");
                return Ok(report);
            };
            while self.pending.swap(false, Ordering::SeqCst) {
                report = Some(self.run_pass(&mut store, trigger).await?);
            }
            drop(store);

            // A trigger may have set the flag after the last pass but before
            // the lock was released, and given up on try_lock.
            if !self.pending.load(Ordering::SeqCst) {
                return Ok(report);
            }
        }
    }

    async fn run_pass(&self, store: &mut LayerStore, trigger: ReloadTrigger) -> Result<ReloadReport> {
        let refresh_remote = self.pending_remote.swap(false, Ordering::SeqCst);
        let mut layers: Vec<Arc<ConfigLayer>> = Vec::with_capacity(Layer::ALL.len());
        let mut source_errors = Vec::new();
        let mut remote_refreshed = false;

        for layer in Layer::ALL {
            // Only remote-refreshing passes fetch REMOTE, even before the
            // first successful fetch.
            let outcome = match (layer, store.current(layer)) {
                (Layer::Remote, Some(current)) if !refresh_remote => Ok(current),
                (Layer::Remote, None) if !refresh_remote => continue,
                _ => store.load(layer).await,
            };
            match outcome {
                Ok(loaded) => {
                    if layer == Layer::Remote && refresh_remote && store.has_remote() {
                        remote_refreshed = true;
                        self.remote_healthy.store(true, Ordering::SeqCst);
                    }
                    layers.push(loaded);
                }
                Err(error) => {
                    let previous = store.current(layer);
                    if layer == Layer::Default && previous.is_none() {
                        return Err(Error::DefaultUnavailable {
                            reason: error.to_string(),
                        });
                    }
                    if layer == Layer::Remote {
                        self.remote_healthy.store(false, Ordering::SeqCst);
                    }
                    tracing::warn!(
                        %layer,
                        %error,
                        stale = previous.is_some(),
                        "Layer refresh failed, keeping previous version"
                    );
                    source_errors.push(SourceFailure {
                        layer,
                        message: error.to_string(),
                    });
                    layers.extend(previous);
                }
            }
        }

        let previous = self.accessor.snapshot();
        let baseline = (previous.generation() > 0).then_some(previous.as_ref());
        let Enforcement {
            config,
            violations,
            validation_errors,
        } = self.enforcer.enforce(merge(&layers), baseline);

        let generation = previous.generation() + 1;
        let config = config.with_generation(generation);
        let changed = diff(baseline, &config);
        self.accessor.publish(config);

        if !changed.is_empty() {
            let delivered = self.notifier.publish(generation, &changed);
            tracing::debug!(generation, delivered, "Published change event");
        }
        tracing::info!(
            %trigger,
            generation,
            changed = changed.len(),
            violations = violations.len(),
            invalid = validation_errors.len(),
            failed_sources = source_errors.len(),
            "Configuration reloaded"
        );

        Ok(ReloadReport {
            trigger,
            generation,
            changed,
            violations,
            validation_errors,
            source_errors,
            remote_refreshed,
        })
    }

    pub(crate) async fn watched_files(
        &self,
    ) -> Vec<(Layer, std::path::PathBuf, Option<conf_fs::FileStamp>)> {
        self.store.lock().await.watched_files()
    }

    pub(crate) async fn has_remote(&self) -> bool {
        self.store.lock().await.has_remote()
    }
}

impl fmt::Debug for ConfigEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigEngine")
            .field("generation", &self.accessor.generation())
            .field("policy", self.enforcer.policy())
            .field("subscribers", &self.notifier.subscriber_count())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ConfigEngine`]
///
/// Anything not set explicitly comes from the [`EngineSettings`]: an HTTP
/// remote when `[remote]` is present, the embedded or file defaults, and the
/// built-in policy extended by `[policy]`.
pub struct ConfigEngineBuilder {
    settings: EngineSettings,
    remote: Option<Arc<dyn RemoteSource>>,
    default: Option<DefaultSource>,
    policy: Option<OverridePolicy>,
    schema: Option<Schema>,
}

impl ConfigEngineBuilder {
    pub fn remote_source(mut self, remote: Arc<dyn RemoteSource>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn default_source(mut self, default: DefaultSource) -> Self {
        self.default = Some(default);
        self
    }

    pub fn policy(mut self, policy: OverridePolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Build the engine and publish generation 1.
    pub async fn start(self) -> Result<Arc<ConfigEngine>> {
        let engine = Arc::new(self.build()?);
        engine.reload(ReloadTrigger::Startup).await?;
        tracing::info!(
            generation = engine.accessor.generation(),
            "Configuration engine started"
        );
        Ok(engine)
    }

    fn build(self) -> Result<ConfigEngine> {
        let settings = self.settings;
        let policy = match self.policy {
            Some(policy) => policy,
            None => settings.override_policy()?,
        };
        let schema = self.schema.unwrap_or_else(Schema::builtin);
        let default = self.default.unwrap_or_else(|| settings.default_source());

        let remote = match (self.remote, &settings.remote) {
            (Some(remote), _) => Some(remote),
            (None, Some(remote)) => Some(Arc::new(HttpRemoteSource::new(
                &remote.url,
                remote.timeout(),
            )?) as Arc<dyn RemoteSource>),
            (None, None) => None,
        };

        let mut store = LayerStore::new(
            default,
            settings.system_path.clone(),
            settings.user_path.clone(),
        );
        if let Some(remote) = remote {
            let remote_settings = settings.remote.clone().unwrap_or_default();
            store = store.with_remote(
                remote,
                remote_settings.timeout(),
                remote_settings.translate_keys,
            );
        }

        Ok(ConfigEngine {
            settings,
            accessor: ConfigAccessor::default(),
            notifier: ChangeNotifier::new(),
            enforcer: PolicyEnforcer::new(policy, schema),
            store: Mutex::new(store),
            pending: AtomicBool::new(false),
            pending_remote: AtomicBool::new(false),
            remote_healthy: AtomicBool::new(true),
        })
    }
}
