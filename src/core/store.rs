//! core::store
//!
//! The namespaced key/value store.
//!
//! # Architecture
//!
//! The store is a flat, ordered map from [`StoreKey`] to JSON values. It is
//! pure data: lock checks and notification live in the engine, which owns the
//! store and funnels every mutation through [`Store::put`].
//!
//! Every effective write is recorded in a [`Journal`] for the current action:
//! the value the key held before its first write in the action, and which
//! party wrote it last. The reactor takes the journal at the end of the
//! action and diffs the recorded "before" values against the live values.
//!
//! # Invariants
//!
//! - Writing a value deep-equal to the current one is a no-op and is never
//!   journaled.
//! - A key's journaled "before" value is captured once per action, so several
//!   writes to one key within an action collapse into a single change.

use std::collections::BTreeMap;
use std::ops::Bound;

use serde_json::Value;

use super::diff::{self, ChangeSet, Snapshot};
use super::types::{ConsumerId, NamespacePath, StoreKey};

/// Who performed a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Any caller that is not a consumer session.
    External,
    /// A consumer session writing its own fields.
    Consumer(ConsumerId),
}

/// Journal record for one key within an action.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEntry {
    /// Value before the first write of the action (`None` if absent).
    pub before: Option<Value>,
    /// Author of the most recent write of the action.
    pub origin: Origin,
}

/// Writes recorded since the journal was last taken.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: BTreeMap<StoreKey, JournalEntry>,
}

impl Journal {
    /// Whether nothing was written.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct keys written.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// The last writer of `key` in this action.
    pub fn origin(&self, key: &StoreKey) -> Option<Origin> {
        self.entries.get(key).map(|e| e.origin)
    }

    /// Journaled keys with their last writer, in key order.
    pub fn writers(&self) -> impl Iterator<Item = (&StoreKey, Origin)> {
        self.entries.iter().map(|(key, entry)| (key, entry.origin))
    }

    /// Diff the journaled keys against their live values in `store`.
    ///
    /// Only journaled keys are compared: the previous snapshot is the set of
    /// recorded "before" values, the current snapshot the same keys as they
    /// are now. Keys written and then restored within the action drop out.
    pub fn changes(&self, store: &Store) -> ChangeSet {
        let mut previous = Snapshot::new();
        let mut current = Snapshot::new();

        for (key, entry) in &self.entries {
            if let Some(before) = &entry.before {
                previous.insert(key.clone(), before.clone());
            }
            if let Some(now) = store.get(key) {
                current.insert(key.clone(), now.clone());
            }
        }

        diff::diff(&previous, &current)
    }
}

/// The namespaced key/value store.
#[derive(Debug, Default)]
pub struct Store {
    entries: BTreeMap<StoreKey, Value>,
    journal: Journal,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` holds a value.
    pub fn contains(&self, key: &StoreKey) -> bool {
        self.entries.contains_key(key)
    }

    /// The value stored at `key`.
    pub fn get(&self, key: &StoreKey) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All stored paths, in key order.
    pub fn paths(&self) -> Vec<NamespacePath> {
        self.entries.keys().map(|k| k.path().clone()).collect()
    }

    /// Paths exactly one segment below `prefix`.
    ///
    /// Deeper descendants are skipped. Runs as a range scan over the
    /// contiguous block of keys that start with the encoded prefix.
    pub fn children(&self, prefix: &NamespacePath) -> Vec<NamespacePath> {
        let prefix = StoreKey::encode(prefix);
        let depth = prefix.path().len() + 1;

        self.entries
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .take_while(|(key, _)| key.is_under(&prefix))
            .filter(|(key, _)| key.path().len() == depth)
            .map(|(key, _)| key.path().clone())
            .collect()
    }

    /// Write `value` at `key`, or remove the key when `value` is `None`.
    ///
    /// Returns `false` without touching anything if the key already holds a
    /// deep-equal value (or is already absent).
    pub fn put(&mut self, key: StoreKey, value: Option<Value>, origin: Origin) -> bool {
        if self.entries.get(&key) == value.as_ref() {
            return false;
        }

        let before = match value {
            Some(value) => self.entries.insert(key.clone(), value),
            None => self.entries.remove(&key),
        };

        tracing::trace!(key = %key, ?origin, "store commit");

        self.journal
            .entries
            .entry(key)
            .and_modify(|entry| entry.origin = origin)
            .or_insert(JournalEntry { before, origin });
        true
    }

    /// Take the journal of the current action, starting a fresh one.
    pub fn take_journal(&mut self) -> Journal {
        std::mem::take(&mut self.journal)
    }

    /// Whether writes are waiting for a reactor cycle.
    pub fn has_pending(&self) -> bool {
        !self.journal.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(segments: &[&str]) -> NamespacePath {
        NamespacePath::new(segments.iter().copied())
    }

    fn key(segments: &[&str]) -> StoreKey {
        StoreKey::encode(&path(segments))
    }

    #[test]
    fn put_then_get() {
        let mut store = Store::new();
        assert!(store.put(key(&["A", "v"]), Some(json!(5)), Origin::External));
        assert_eq!(store.get(&key(&["A", "v"])), Some(&json!(5)));
        assert!(store.contains(&key(&["A", "v"])));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn equal_write_is_a_noop() {
        let mut store = Store::new();
        store.put(key(&["A", "v"]), Some(json!({"a": [1]})), Origin::External);
        store.take_journal();

        assert!(!store.put(key(&["A", "v"]), Some(json!({"a": [1]})), Origin::External));
        assert!(!store.has_pending());
    }

    #[test]
    fn removing_absent_key_is_a_noop() {
        let mut store = Store::new();
        assert!(!store.put(key(&["A", "v"]), None, Origin::External));
        assert!(!store.has_pending());
    }

    #[test]
    fn journal_keeps_first_before_value() {
        let mut store = Store::new();
        store.put(key(&["A", "v"]), Some(json!(1)), Origin::External);
        store.take_journal();

        store.put(key(&["A", "v"]), Some(json!(2)), Origin::External);
        store.put(key(&["A", "v"]), Some(json!(3)), Origin::External);

        let journal = store.take_journal();
        assert_eq!(journal.len(), 1);
        let changes = journal.changes(&store);
        assert_eq!(changes.get(&path(&["A", "v"])), Some(Some(&json!(3))));
    }

    #[test]
    fn restored_value_drops_out_of_changes() {
        let mut store = Store::new();
        store.put(key(&["A", "v"]), Some(json!(1)), Origin::External);
        store.take_journal();

        store.put(key(&["A", "v"]), Some(json!(2)), Origin::External);
        store.put(key(&["A", "v"]), Some(json!(1)), Origin::External);

        let journal = store.take_journal();
        assert!(journal.changes(&store).is_empty());
    }

    #[test]
    fn journal_tracks_last_writer() {
        let mut store = Store::new();
        let k = key(&["A", "v"]);
        let me = ConsumerId::new(7);

        store.put(k.clone(), Some(json!(1)), Origin::External);
        store.put(k.clone(), Some(json!(2)), Origin::Consumer(me));

        let journal = store.take_journal();
        assert_eq!(journal.origin(&k), Some(Origin::Consumer(me)));
    }

    #[test]
    fn removal_is_reported() {
        let mut store = Store::new();
        store.put(key(&["A", "v"]), Some(json!(1)), Origin::External);
        store.take_journal();

        assert!(store.put(key(&["A", "v"]), None, Origin::External));
        let changes = store.take_journal().changes(&store);
        assert_eq!(changes.get(&path(&["A", "v"])), Some(None));
    }

    #[test]
    fn children_returns_one_level_only() {
        let mut store = Store::new();
        for p in [
            &["App", "Users"][..],
            &["App", "Polls"][..],
            &["App", "Users", "Create", "Permitted"][..],
            &["Apps", "Other"][..],
            &["App"][..],
            &["Dialog", "state"][..],
        ] {
            store.put(key(p), Some(json!(true)), Origin::External);
        }

        let children = store.children(&path(&["App"]));
        assert_eq!(children.len(), 2);
        assert!(children.contains(&path(&["App", "Users"])));
        assert!(children.contains(&path(&["App", "Polls"])));
    }

    #[test]
    fn children_of_root_are_top_level_keys() {
        let mut store = Store::new();
        store.put(key(&["App"]), Some(json!(1)), Origin::External);
        store.put(key(&["App", "Users"]), Some(json!(1)), Origin::External);
        store.put(key(&["Snackbar"]), Some(json!(1)), Origin::External);

        let mut children = store.children(&NamespacePath::root());
        children.sort();
        assert_eq!(children, vec![path(&["App"]), path(&["Snackbar"])]);
    }
}
