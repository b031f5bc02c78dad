//! Override policy and enforcement
//!
//! Some settings only take effect when set at particular layers; the
//! machine's log level, for example, must not be changed by the backend.
//! An [`OverridePolicy`] maps path prefixes to the layers allowed to set
//! them, and the [`PolicyEnforcer`] re-resolves restricted subtrees from the
//! allowed layers only, then validates the result against the [`Schema`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result, ValidationError};
use crate::layer::{Layer, LayerSet};
use crate::merge::{EffectiveConfig, Provenance, merge_candidates};
use crate::path::{ConfigPath, insert_at, remove_at};
use crate::schema::Schema;

/// How a policy entry is written in settings files.
///
/// ```toml
/// [policy]
/// log_level = "system"              # system and above
/// server = ["default", "system", "user"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicyRule {
    Minimum(Layer),
    Allowed(Vec<Layer>),
}

impl PolicyRule {
    pub fn allowed(&self) -> LayerSet {
        match self {
            Self::Minimum(layer) => layer.and_above(),
            Self::Allowed(layers) => LayerSet::from_layers(layers.iter().copied()),
        }
    }
}

/// Path prefix → layers allowed to set values under it.
///
/// The most specific matching prefix decides. Paths without a matching
/// entry accept every layer.
#[derive(Debug, Clone, Default)]
pub struct OverridePolicy {
    entries: BTreeMap<ConfigPath, LayerSet>,
}

impl OverridePolicy {
    /// A policy without restrictions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrictions that ship with the engine.
    ///
    /// - `log_level`: machine-local, system or user only
    /// - `data_dir`, `ipc_path`: machine paths the backend must not move
    /// - `server`, `websocket`: endpoints the backend must not redirect
    pub fn builtin() -> Self {
        let local = Layer::System.and_above();
        let not_remote = LayerSet::from_layers([Layer::Default, Layer::System, Layer::User]);

        let mut policy = Self::new();
        for (path, allowed) in [
            ("log_level", local),
            ("data_dir", not_remote),
            ("ipc_path", not_remote),
            ("server", not_remote),
            ("websocket", not_remote),
        ] {
            policy
                .entries
                .insert(ConfigPath::from_segments(path.split('.')), allowed);
        }
        policy
    }

    /// Restrict a path prefix to a set of layers, replacing any previous
    /// restriction for the same prefix.
    pub fn restrict(&mut self, path: ConfigPath, allowed: LayerSet) -> Result<()> {
        if path.is_root() {
            return Err(Error::InvalidPath {
                path: String::new(),
                reason: "policy entries cannot restrict the root".into(),
            });
        }
        self.entries.insert(path, allowed);
        Ok(())
    }

    /// Apply rules as written in a settings file.
    pub fn extend_rules(&mut self, rules: &BTreeMap<String, PolicyRule>) -> Result<()> {
        for (raw, rule) in rules {
            self.restrict(ConfigPath::parse(raw)?, rule.allowed())?;
        }
        Ok(())
    }

    /// Layers allowed to set `path`.
    pub fn allowed_for(&self, path: &ConfigPath) -> LayerSet {
        self.entries
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or(LayerSet::ALL, |(_, allowed)| *allowed)
    }

    pub fn is_allowed(&self, path: &ConfigPath, layer: Layer) -> bool {
        self.allowed_for(path).contains(layer)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&ConfigPath, LayerSet)> {
        self.entries.iter().map(|(path, allowed)| (path, *allowed))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A value that was excluded because its layer may not set the path.
///
/// Not an error: recorded for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyViolation {
    pub path: ConfigPath,
    pub layer: Layer,
    pub allowed: LayerSet,
}

/// Outcome of enforcing policy and schema on a merged configuration
#[derive(Debug, Clone)]
pub struct Enforcement {
    pub config: EffectiveConfig,
    pub violations: Vec<PolicyViolation>,
    pub validation_errors: Vec<ValidationError>,
}

/// Applies an [`OverridePolicy`] and a [`Schema`] to merged configurations.
#[derive(Debug, Clone, Default)]
pub struct PolicyEnforcer {
    policy: OverridePolicy,
    schema: Schema,
}

impl PolicyEnforcer {
    pub fn new(policy: OverridePolicy, schema: Schema) -> Self {
        Self { policy, schema }
    }

    pub fn policy(&self) -> &OverridePolicy {
        &self.policy
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Enforce policy, then validate.
    ///
    /// `previous` is the last published configuration; invalid leaves fall
    /// back to their value there.
    pub fn enforce(
        &self,
        mut effective: EffectiveConfig,
        previous: Option<&EffectiveConfig>,
    ) -> Enforcement {
        let violations = self.apply_policy(&mut effective);
        let validation_errors = self.apply_schema(&mut effective, previous);
        Enforcement {
            config: effective,
            violations,
            validation_errors,
        }
    }

    fn apply_policy(&self, config: &mut EffectiveConfig) -> Vec<PolicyViolation> {
        let violations: Vec<PolicyViolation> = config
            .provenance()
            .iter()
            .filter_map(|(path, layer)| {
                let allowed = self.policy.allowed_for(path);
                (!allowed.contains(*layer)).then(|| PolicyViolation {
                    path: path.clone(),
                    layer: *layer,
                    allowed,
                })
            })
            .collect();

        for violation in &violations {
            tracing::info!(
                path = %violation.path,
                layer = %violation.layer,
                allowed = %violation.allowed,
                "Ignoring value from layer not allowed to set this path"
            );
        }

        // General prefixes first so more specific entries override them.
        let mut entries: Vec<(&ConfigPath, LayerSet)> = self.policy.entries().collect();
        entries.sort_by_key(|(path, _)| path.len());

        for (prefix, allowed) in entries {
            let mut resolved = Provenance::new();
            let value = {
                let candidates: Vec<_> = config
                    .candidates(prefix)
                    .into_iter()
                    .filter(|(layer, _)| allowed.contains(*layer))
                    .collect();
                merge_candidates(prefix, &candidates, &mut resolved)
            };

            let (tree, provenance) = config.parts_mut();
            let parent_is_scalar = prefix
                .parent()
                .and_then(|parent| parent.lookup(tree))
                .is_some_and(|node| !node.is_object());
            if parent_is_scalar {
                tracing::debug!(path = %prefix, "Restricted path is shadowed by a scalar ancestor");
                continue;
            }

            remove_at(tree, prefix);
            provenance.retain(|path, _| !path.starts_with(prefix));
            if let Some(value) = value
                && insert_at(tree, prefix, value)
            {
                provenance.extend(resolved);
            }
        }

        violations
    }

    fn apply_schema(
        &self,
        config: &mut EffectiveConfig,
        previous: Option<&EffectiveConfig>,
    ) -> Vec<ValidationError> {
        let failures = self.invalid_nodes(config);

        let mut errors = Vec::with_capacity(failures.len());
        for (path, layer, message) in failures {
            let fallback = previous.and_then(|prev| {
                let value = prev.get(&path)?.clone();
                let origins: Provenance = prev
                    .provenance()
                    .iter()
                    .filter(|(leaf, _)| leaf.starts_with(&path))
                    .map(|(leaf, origin)| (leaf.clone(), *origin))
                    .collect();
                Some((value, origins))
            });

            let (tree, provenance) = config.parts_mut();
            remove_at(tree, &path);
            provenance.retain(|leaf, _| !leaf.starts_with(&path));

            let restored = if let Some((value, origins)) = fallback
                && insert_at(tree, &path, value)
            {
                provenance.extend(origins);
                true
            } else {
                false
            };

            tracing::warn!(%path, %layer, restored, %message, "Rejected invalid configuration value");
            errors.push(ValidationError {
                path,
                layer,
                message,
                restored,
            });
        }
        errors
    }

    /// Nodes that fail a schema rule, outermost first.
    ///
    /// A mapping where a rule expects a scalar fails as a whole; nodes below
    /// a failing node are not visited.
    fn invalid_nodes(&self, config: &EffectiveConfig) -> Vec<(ConfigPath, Layer, String)> {
        let mut failures = Vec::new();
        let mut pending: Vec<(ConfigPath, &Value)> = config
            .tree()
            .iter()
            .map(|(key, value)| (ConfigPath::root().child(key), value))
            .collect();

        while let Some((path, value)) = pending.pop() {
            match self.schema.validate(&path, value) {
                Ok(()) => {
                    if let Some(map) = value.as_object() {
                        pending.extend(map.iter().map(|(key, child)| (path.child(key), child)));
                    }
                }
                Err(message) => {
                    let layer = origin_of(config, &path);
                    failures.push((path, layer, message));
                }
            }
        }

        failures.sort_by(|a, b| a.0.cmp(&b.0));
        failures
    }
}

/// Layer responsible for the node at `path`: the leaf's own layer, or the
/// highest layer supplying a leaf below it.
fn origin_of(config: &EffectiveConfig, path: &ConfigPath) -> Layer {
    config.provenance_of(path).unwrap_or_else(|| {
        config
            .provenance()
            .iter()
            .filter(|(leaf, _)| leaf.starts_with(path))
            .map(|(_, layer)| *layer)
            .max()
            .or_else(|| config.candidates(path).last().map(|(layer, _)| *layer))
            .unwrap_or(Layer::Default)
    })
}
