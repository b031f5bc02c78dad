//! Deep merge of layers into an effective configuration
//!
//! Layers are walked in precedence order. Mappings present in several layers
//! merge recursively; scalars and sequences are replaced outright by the
//! highest layer defining them. Every leaf records the layer it came from.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use conf_fs::Tree;
use serde_json::Value;

use crate::layer::{ConfigLayer, Layer};
use crate::path::ConfigPath;

/// Per-leaf record of the contributing layer
pub type Provenance = BTreeMap<ConfigPath, Layer>;

/// The merged configuration at one generation.
///
/// Immutable once published. Holds the layers it was built from so that a
/// path can be explained and restricted paths can be re-resolved.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    tree: Tree,
    provenance: Provenance,
    generation: u64,
    layers: Vec<Arc<ConfigLayer>>,
}

impl EffectiveConfig {
    /// The configuration before anything was loaded (generation 0).
    pub fn empty() -> Self {
        Self {
            tree: Tree::new(),
            provenance: Provenance::new(),
            generation: 0,
            layers: Vec::new(),
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The layers this configuration was merged from, lowest precedence first.
    pub fn layers(&self) -> &[Arc<ConfigLayer>] {
        &self.layers
    }

    pub fn layer(&self, layer: Layer) -> Option<&Arc<ConfigLayer>> {
        self.layers.iter().find(|l| l.layer() == layer)
    }

    /// Value at `path`: a leaf, or a whole mapping for an inner node.
    pub fn get(&self, path: &ConfigPath) -> Option<&Value> {
        path.lookup(&self.tree)
    }

    /// Layer that supplied the leaf at `path`. `None` for mappings and
    /// absent paths.
    pub fn provenance_of(&self, path: &ConfigPath) -> Option<Layer> {
        self.provenance.get(path).copied()
    }

    pub fn leaf_paths(&self) -> impl Iterator<Item = &ConfigPath> {
        self.provenance.keys()
    }

    /// Values every layer defines at `path`, lowest precedence first,
    /// ignoring policy.
    pub fn candidates(&self, path: &ConfigPath) -> Vec<(Layer, &Value)> {
        self.layers
            .iter()
            .filter_map(|l| path.lookup(l.tree()).map(|v| (l.layer(), v)))
            .collect()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.tree.clone())
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut Tree, &mut Provenance) {
        (&mut self.tree, &mut self.provenance)
    }
}

/// Identity is the resolved tree plus provenance; the generation and the
/// source layers are bookkeeping.
impl PartialEq for EffectiveConfig {
    fn eq(&self, other: &Self) -> bool {
        self.tree == other.tree && self.provenance == other.provenance
    }
}

/// Merge layers into an effective configuration.
///
/// Layers are ordered by precedence before merging, so the order of the
/// input slice does not matter. The result has generation 0; the engine
/// stamps a generation when publishing.
pub fn merge(layers: &[Arc<ConfigLayer>]) -> EffectiveConfig {
    let mut ordered: Vec<Arc<ConfigLayer>> = layers.to_vec();
    ordered.sort_by_key(|l| l.layer());

    let mut provenance = Provenance::new();
    let maps: Vec<(Layer, &Tree)> = ordered.iter().map(|l| (l.layer(), l.tree())).collect();
    let tree = merge_maps(&ConfigPath::root(), &maps, &mut provenance);

    tracing::trace!(leaves = provenance.len(), "Merged layers");

    EffectiveConfig {
        tree,
        provenance,
        generation: 0,
        layers: ordered,
    }
}

/// Resolve one node from the values layers define for it.
///
/// `candidates` must be in precedence order. The highest non-mapping value
/// shadows everything below it; mappings above it merge key by key.
pub(crate) fn merge_candidates(
    path: &ConfigPath,
    candidates: &[(Layer, &Value)],
    provenance: &mut Provenance,
) -> Option<Value> {
    let last_scalar = candidates.iter().rposition(|(_, v)| !v.is_object());

    match last_scalar {
        Some(i) if i + 1 == candidates.len() => {
            let (layer, value) = candidates[i];
            provenance.insert(path.clone(), layer);
            Some(value.clone())
        }
        _ if candidates.is_empty() => None,
        _ => {
            let start = last_scalar.map_or(0, |i| i + 1);
            let maps: Vec<(Layer, &Tree)> = candidates[start..]
                .iter()
                .filter_map(|(layer, v)| v.as_object().map(|m| (*layer, m)))
                .collect();
            Some(Value::Object(merge_maps(path, &maps, provenance)))
        }
    }
}

fn merge_maps(path: &ConfigPath, maps: &[(Layer, &Tree)], provenance: &mut Provenance) -> Tree {
    let keys: BTreeSet<&String> = maps.iter().flat_map(|(_, m)| m.keys()).collect();
    let mut merged = Tree::new();

    for key in keys {
        let children: Vec<(Layer, &Value)> = maps
            .iter()
            .filter_map(|(layer, m)| m.get(key).map(|v| (*layer, v)))
            .collect();
        if let Some(value) = merge_candidates(&path.child(key), &children, provenance) {
            merged.insert(key.clone(), value);
        }
    }

    merged
}
