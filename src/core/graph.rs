//! core::graph
//!
//! Consumer dependency graph.
//!
//! # Architecture
//!
//! The graph is bipartite:
//! - Consumer nodes carry the session payload and the set of keys they watch
//! - Key nodes carry the bare field name and the set of dependent consumers
//! - Edges point from consumer to key and are mirrored in both node kinds
//!
//! The payload type is generic so the graph stays independent of the session
//! layer. The pool stores weak session handles here: the graph routes to a
//! session but never keeps it alive.
//!
//! # Invariants
//!
//! - Every key node has at least one dependent consumer
//! - Removing a consumer prunes every key node it leaves without dependents
//! - Consumer and key edge sets are always mirror images

use std::collections::{BTreeSet, HashMap};

use super::types::{ConsumerId, StoreKey};

/// A consumer session's node.
#[derive(Debug)]
struct ConsumerNode<T> {
    keys: BTreeSet<StoreKey>,
    data: T,
}

/// A watched key's node.
#[derive(Debug)]
struct KeyNode {
    /// The field name consumers use for this key.
    field: String,
    dependents: BTreeSet<ConsumerId>,
}

/// A route from a changed key to one dependent consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route<'a, T> {
    pub consumer: ConsumerId,
    pub field: &'a str,
    pub data: &'a T,
}

/// The consumer/key dependency graph.
#[derive(Debug)]
pub struct DependencyGraph<T> {
    consumers: HashMap<ConsumerId, ConsumerNode<T>>,
    keys: HashMap<StoreKey, KeyNode>,
}

impl<T> Default for DependencyGraph<T> {
    fn default() -> Self {
        Self {
            consumers: HashMap::new(),
            keys: HashMap::new(),
        }
    }
}

impl<T> DependencyGraph<T> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a consumer node. Replaces (and unlinks) any node with the same id.
    pub fn add_consumer(&mut self, id: ConsumerId, data: T) {
        self.remove_consumer(id);
        self.consumers.insert(
            id,
            ConsumerNode {
                keys: BTreeSet::new(),
                data,
            },
        );
    }

    /// Add an edge from `consumer` to `key`, creating the key node if needed.
    ///
    /// Returns `false` if the consumer is not in the graph.
    pub fn add_dependency(
        &mut self,
        consumer: ConsumerId,
        key: StoreKey,
        field: impl Into<String>,
    ) -> bool {
        let Some(node) = self.consumers.get_mut(&consumer) else {
            return false;
        };
        node.keys.insert(key.clone());

        let field = field.into();
        self.keys
            .entry(key)
            .or_insert_with(|| KeyNode {
                field,
                dependents: BTreeSet::new(),
            })
            .dependents
            .insert(consumer);
        true
    }

    /// Remove a consumer and its edges, pruning orphaned key nodes.
    ///
    /// Returns the consumer's payload, or `None` if it was not present.
    pub fn remove_consumer(&mut self, id: ConsumerId) -> Option<T> {
        let node = self.consumers.remove(&id)?;

        for key in &node.keys {
            let orphaned = match self.keys.get_mut(key) {
                Some(key_node) => {
                    key_node.dependents.remove(&id);
                    key_node.dependents.is_empty()
                }
                None => false,
            };
            if orphaned {
                self.keys.remove(key);
            }
        }

        Some(node.data)
    }

    /// Consumers that directly depend on `key`, in id order.
    pub fn dependents_of(&self, key: &StoreKey) -> Vec<ConsumerId> {
        self.keys
            .get(key)
            .map(|node| node.dependents.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Keys that `consumer` depends on, in key order.
    pub fn dependencies_of(&self, consumer: ConsumerId) -> Vec<StoreKey> {
        self.consumers
            .get(&consumer)
            .map(|node| node.keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every dependent of `key` together with the field name it is bound to.
    pub fn routes(&self, key: &StoreKey) -> Vec<Route<'_, T>> {
        let Some(key_node) = self.keys.get(key) else {
            return Vec::new();
        };

        key_node
            .dependents
            .iter()
            .filter_map(|id| {
                self.consumers.get(id).map(|node| Route {
                    consumer: *id,
                    field: key_node.field.as_str(),
                    data: &node.data,
                })
            })
            .collect()
    }

    /// Whether a key node exists for `key`.
    pub fn contains_key(&self, key: &StoreKey) -> bool {
        self.keys.contains_key(key)
    }

    /// Number of consumer nodes.
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::NamespacePath;

    fn key(segments: &[&str]) -> StoreKey {
        StoreKey::encode(&NamespacePath::new(segments.iter().copied()))
    }

    fn id(raw: u64) -> ConsumerId {
        ConsumerId::new(raw)
    }

    #[test]
    fn empty_graph_has_no_routes() {
        let graph: DependencyGraph<()> = DependencyGraph::new();
        assert!(graph.routes(&key(&["A", "v"])).is_empty());
        assert!(graph.dependents_of(&key(&["A", "v"])).is_empty());
    }

    #[test]
    fn dependency_requires_consumer() {
        let mut graph: DependencyGraph<()> = DependencyGraph::new();
        assert!(!graph.add_dependency(id(0), key(&["A", "v"]), "v"));
        assert!(!graph.contains_key(&key(&["A", "v"])));
    }

    #[test]
    fn routes_carry_field_and_payload() {
        let mut graph = DependencyGraph::new();
        graph.add_consumer(id(0), "first");
        graph.add_consumer(id(1), "second");
        graph.add_dependency(id(0), key(&["A", "v"]), "v");
        graph.add_dependency(id(1), key(&["A", "v"]), "v");

        let routes = graph.routes(&key(&["A", "v"]));
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].consumer, id(0));
        assert_eq!(routes[0].field, "v");
        assert_eq!(*routes[0].data, "first");
        assert_eq!(*routes[1].data, "second");
    }

    #[test]
    fn edges_are_mirrored() {
        let mut graph: DependencyGraph<()> = DependencyGraph::new();
        graph.add_consumer(id(0), ());
        graph.add_dependency(id(0), key(&["A", "v"]), "v");
        graph.add_dependency(id(0), key(&["A", "w"]), "w");

        assert_eq!(graph.dependents_of(&key(&["A", "v"])), vec![id(0)]);
        assert_eq!(
            graph.dependencies_of(id(0)),
            vec![key(&["A", "v"]), key(&["A", "w"])]
        );
    }

    #[test]
    fn removing_last_dependent_prunes_key() {
        let mut graph: DependencyGraph<()> = DependencyGraph::new();
        graph.add_consumer(id(0), ());
        graph.add_dependency(id(0), key(&["A", "v"]), "v");

        assert!(graph.remove_consumer(id(0)).is_some());
        assert!(!graph.contains_key(&key(&["A", "v"])));
        assert!(graph.dependencies_of(id(0)).is_empty());
        assert_eq!(graph.consumer_count(), 0);
    }

    #[test]
    fn shared_key_survives_partial_removal() {
        let mut graph: DependencyGraph<()> = DependencyGraph::new();
        graph.add_consumer(id(0), ());
        graph.add_consumer(id(1), ());
        graph.add_dependency(id(0), key(&["A", "v"]), "v");
        graph.add_dependency(id(1), key(&["A", "v"]), "v");
        graph.add_dependency(id(0), key(&["A", "only"]), "only");

        graph.remove_consumer(id(0));

        assert!(graph.contains_key(&key(&["A", "v"])));
        assert!(!graph.contains_key(&key(&["A", "only"])));
        assert_eq!(graph.dependents_of(&key(&["A", "v"])), vec![id(1)]);
    }

    #[test]
    fn removing_unknown_consumer_is_none() {
        let mut graph: DependencyGraph<()> = DependencyGraph::new();
        assert!(graph.remove_consumer(id(9)).is_none());
    }

    #[test]
    fn re_adding_consumer_unlinks_old_edges() {
        let mut graph: DependencyGraph<u8> = DependencyGraph::new();
        graph.add_consumer(id(0), 1);
        graph.add_dependency(id(0), key(&["A", "v"]), "v");

        graph.add_consumer(id(0), 2);

        assert!(!graph.contains_key(&key(&["A", "v"])));
        graph.add_dependency(id(0), key(&["A", "w"]), "w");
        assert_eq!(*graph.routes(&key(&["A", "w"]))[0].data, 2);
        assert_eq!(graph.consumer_count(), 1);
    }
}
