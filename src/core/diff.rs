//! core::diff
//!
//! Snapshot comparison for reactor cycles.
//!
//! A [`ChangeSet`] maps every key whose value differs between two snapshots
//! to its new value, or to `None` when the key was removed. Values are
//! compared by deep (structural) equality, so rewriting an equal value never
//! shows up as a change.

use std::collections::BTreeMap;

use serde_json::Value;

use super::types::{NamespacePath, StoreKey};

/// A point-in-time view of store entries.
pub type Snapshot = BTreeMap<StoreKey, Value>;

/// The changes produced by one reactor cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    entries: BTreeMap<StoreKey, Option<Value>>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change. `None` marks a removal.
    pub fn insert(&mut self, key: StoreKey, value: Option<Value>) {
        self.entries.insert(key, value);
    }

    /// Whether no key changed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of changed keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over `(key, new value)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&StoreKey, Option<&Value>)> {
        self.entries.iter().map(|(k, v)| (k, v.as_ref()))
    }

    /// Whether `path` changed in this cycle.
    pub fn contains(&self, path: &NamespacePath) -> bool {
        self.entries.contains_key(StoreKey::encode(path).as_str())
    }

    /// The change recorded for `path`.
    ///
    /// Returns `None` if the path did not change, `Some(None)` if it was
    /// removed, and `Some(Some(value))` for a new value.
    pub fn get(&self, path: &NamespacePath) -> Option<Option<&Value>> {
        self.entries
            .get(StoreKey::encode(path).as_str())
            .map(Option::as_ref)
    }

    /// The changed paths, in key order.
    pub fn paths(&self) -> Vec<NamespacePath> {
        self.entries.keys().map(|k| k.path().clone()).collect()
    }
}

impl IntoIterator for ChangeSet {
    type Item = (StoreKey, Option<Value>);
    type IntoIter = std::collections::btree_map::IntoIter<StoreKey, Option<Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Compute the changes that turn `previous` into `current`.
///
/// Keys present in `current` whose value differs from `previous` (or that
/// are new) map to their current value. Keys present only in `previous`
/// map to `None`.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use statepool::core::diff::{diff, Snapshot};
/// use statepool::core::types::{NamespacePath, StoreKey};
///
/// let key = |s: &str| StoreKey::encode(&NamespacePath::from(["A", s]));
///
/// let mut previous = Snapshot::new();
/// previous.insert(key("kept"), json!(1));
/// previous.insert(key("gone"), json!(2));
///
/// let mut current = Snapshot::new();
/// current.insert(key("kept"), json!(1));
/// current.insert(key("new"), json!(3));
///
/// let changes = diff(&previous, &current);
/// assert_eq!(changes.len(), 2);
/// assert_eq!(changes.get(&NamespacePath::from(["A", "new"])), Some(Some(&json!(3))));
/// assert_eq!(changes.get(&NamespacePath::from(["A", "gone"])), Some(None));
/// ```
pub fn diff(previous: &Snapshot, current: &Snapshot) -> ChangeSet {
    let mut changes = ChangeSet::new();

    for (key, value) in current {
        if previous.get(key) != Some(value) {
            changes.insert(key.clone(), Some(value.clone()));
        }
    }
    for key in previous.keys() {
        if !current.contains_key(key) {
            changes.insert(key.clone(), None);
        }
    }

    changes
}
