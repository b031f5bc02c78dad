//! Differences between successive configurations

use std::collections::BTreeSet;

use crate::merge::EffectiveConfig;
use crate::path::ConfigPath;

/// Leaf paths whose value or provenance differ between two configurations.
///
/// A leaf present in only one of them counts as changed. With no previous
/// configuration every leaf of `current` is reported.
pub fn diff(previous: Option<&EffectiveConfig>, current: &EffectiveConfig) -> BTreeSet<ConfigPath> {
    let Some(previous) = previous else {
        return current.leaf_paths().cloned().collect();
    };

    previous
        .leaf_paths()
        .chain(current.leaf_paths())
        .filter(|path| {
            previous.provenance_of(path) != current.provenance_of(path)
                || previous.get(path) != current.get(path)
        })
        .cloned()
        .collect()
}
