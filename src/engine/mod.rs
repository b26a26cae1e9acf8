//! engine
//!
//! The pool context: store, locks, dependency graph, and subscribers behind
//! one handle.
//!
//! # Architecture
//!
//! [`Pool`] is the only way to reach the shared state. Every mutation funnels
//! through one internal write path:
//!
//! ```text
//! write -> lock check -> equality short-circuit -> store commit (journaled)
//!       -> [action boundary] -> reactor cycle -> subscribers -> dispatch
//! ```
//!
//! The action boundary is explicit. Each public write is its own action;
//! [`Pool::batch`] widens the boundary so any number of writes, including
//! writes from nested batches, produce exactly one reactor cycle.
//!
//! # Invariants
//!
//! - Validation (lock checks) happens strictly before any mutation
//! - One reactor cycle per action boundary, never one per key write
//! - Cycles never nest: writes made while a cycle runs are picked up by a
//!   follow-up cycle once the current one completes
//! - Writes made while the pool is stopped are committed silently and are
//!   not replayed by a later `start`
//!
//! # Example
//!
//! ```
//! use statepool::engine::Pool;
//! use serde_json::json;
//!
//! let pool = Pool::default();
//! assert!(pool.set(["App", "Permitted"], true).unwrap());
//! assert!(!pool.set(["App", "Permitted"], true).unwrap());
//! assert_eq!(pool.get(["App", "Permitted"]), Some(json!(true)));
//!
//! let unlock = pool.lock(["App", "Permitted"]).unwrap();
//! assert!(pool.set(["App", "Permitted"], false).is_err());
//! unlock.unlock().unwrap();
//! ```

pub mod reactor;
pub mod subscribers;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::config::PoolConfig;
use crate::core::diff::ChangeSet;
use crate::core::graph::DependencyGraph;
use crate::core::ops::lock::{LockError, LockHandle, LockRegistry};
use crate::core::store::{Origin, Store};
use crate::core::types::{ConsumerId, NamespacePath, StoreKey, SubscriptionId};
use crate::session::{Binding, Consumable, SessionInner};

use subscribers::Subscribers;

/// Errors from pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A write targeted a locked key.
    #[error("[{0}] is locked and cannot be modified")]
    LockViolation(NamespacePath),

    /// Lock-state misuse.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// A value could not be converted to JSON.
    #[error("failed to encode value for [{path}]: {source}")]
    Encode {
        path: NamespacePath,
        source: serde_json::Error,
    },

    /// A stored value did not match the requested type.
    #[error("failed to decode value at [{path}]: {source}")]
    Decode {
        path: NamespacePath,
        source: serde_json::Error,
    },

    /// The session was disposed.
    #[error("{0} has been disposed")]
    Disposed(ConsumerId),

    /// A global subscriber failed during a reactor cycle.
    #[error("{id} failed: {error:#}")]
    Subscriber {
        id: SubscriptionId,
        error: anyhow::Error,
    },
}

pub(crate) struct PoolInner {
    pub(crate) config: PoolConfig,
    pub(crate) store: RefCell<Store>,
    pub(crate) locks: LockRegistry,
    pub(crate) graph: RefCell<DependencyGraph<Weak<SessionInner>>>,
    pub(crate) subscribers: RefCell<Subscribers>,
    pub(crate) listening: Cell<bool>,
    pub(crate) cycle_running: Cell<bool>,
    batch_depth: Cell<usize>,
    next_consumer: Cell<u64>,
}

/// Handle to a pool.
///
/// Cloning is cheap and yields another handle to the same pool. A pool is
/// single-threaded: all mutation and notification happen synchronously on
/// the calling thread.
#[derive(Clone)]
pub struct Pool {
    inner: Rc<PoolInner>,
}

thread_local! {
    static GLOBAL: Pool = Pool::default();
}

/// Decrements the batch depth when an action scope ends, even on unwind.
struct ActionScope<'a> {
    depth: &'a Cell<usize>,
}

impl<'a> ActionScope<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self { depth }
    }
}

impl Drop for ActionScope<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

impl Pool {
    /// Create a pool. Starts listening immediately if `config.autostart`.
    pub fn new(config: PoolConfig) -> Self {
        let autostart = config.autostart;
        let pool = Self {
            inner: Rc::new(PoolInner {
                config,
                store: RefCell::new(Store::new()),
                locks: LockRegistry::new(),
                graph: RefCell::new(DependencyGraph::new()),
                subscribers: RefCell::new(Subscribers::default()),
                listening: Cell::new(false),
                cycle_running: Cell::new(false),
                batch_depth: Cell::new(0),
                next_consumer: Cell::new(0),
            }),
        };
        if autostart {
            pool.start();
        }
        pool
    }

    /// The pool shared by everything on the current thread.
    ///
    /// Created on first use with the default configuration.
    pub fn global() -> Self {
        GLOBAL.with(Pool::clone)
    }

    /// The configuration this pool was created with.
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start running reactor cycles. Idempotent.
    ///
    /// Writes committed while the pool was stopped are not replayed.
    pub fn start(&self) {
        if self.inner.listening.replace(true) {
            return;
        }
        let discarded = self.inner.store.borrow_mut().take_journal();
        tracing::debug!(discarded = discarded.len(), "pool started");
    }

    /// Stop running reactor cycles. Idempotent.
    pub fn stop(&self) {
        if self.inner.listening.replace(false) {
            tracing::debug!("pool stopped");
        }
    }

    /// Whether the pool is running reactor cycles.
    pub fn is_listening(&self) -> bool {
        self.inner.listening.get()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Whether `path` holds a value.
    pub fn has(&self, path: impl Into<NamespacePath>) -> bool {
        let key = StoreKey::encode(&path.into());
        self.inner.store.borrow().contains(&key)
    }

    /// The value at `path`.
    pub fn get(&self, path: impl Into<NamespacePath>) -> Option<Value> {
        let key = StoreKey::encode(&path.into());
        self.inner.store.borrow().get(&key).cloned()
    }

    /// The value at `path`, deserialized.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Decode` if the value does not match `T`.
    pub fn get_as<T: DeserializeOwned>(
        &self,
        path: impl Into<NamespacePath>,
    ) -> Result<Option<T>, PoolError> {
        let path = path.into();
        self.get(&path)
            .map(|value| serde_json::from_value(value))
            .transpose()
            .map_err(|source| PoolError::Decode { path, source })
    }

    /// Paths exactly one segment below `prefix` that hold a value.
    pub fn get_of(&self, prefix: impl Into<NamespacePath>) -> Vec<NamespacePath> {
        self.inner.store.borrow().children(&prefix.into())
    }

    /// Every stored path, in key order.
    pub fn keys(&self) -> Vec<NamespacePath> {
        self.inner.store.borrow().paths()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.store.borrow().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.store.borrow().is_empty()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Set the value at `path`.
    ///
    /// Returns `false` without committing or notifying when the new value is
    /// deep-equal to the current one.
    ///
    /// # Errors
    ///
    /// - `PoolError::LockViolation` if `path` is locked
    /// - `PoolError::Encode` if `value` cannot be represented as JSON
    /// - `PoolError::Subscriber` if a subscriber failed in the resulting cycle
    pub fn set(&self, path: impl Into<NamespacePath>, value: impl Serialize) -> Result<bool, PoolError> {
        let path = path.into();
        let value =
            serde_json::to_value(value).map_err(|source| PoolError::Encode { path: path.clone(), source })?;
        self.write(StoreKey::encode(&path), Some(value), Origin::External)
    }

    /// Remove the value at `path`.
    ///
    /// Returns `false` if there was nothing to remove.
    ///
    /// # Errors
    ///
    /// - `PoolError::LockViolation` if `path` is locked
    /// - `PoolError::Subscriber` if a subscriber failed in the resulting cycle
    pub fn remove(&self, path: impl Into<NamespacePath>) -> Result<bool, PoolError> {
        self.write(StoreKey::encode(&path.into()), None, Origin::External)
    }

    /// Run `f` as a single action.
    ///
    /// Every write inside `f` (including writes in nested batches) is
    /// coalesced into one reactor cycle that runs when the outermost batch
    /// returns. Writes that succeeded before `f` failed stay committed and
    /// are still notified.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, or `PoolError::Subscriber` if a
    /// subscriber failed in the closing cycle.
    pub fn batch<R>(&self, f: impl FnOnce() -> Result<R, PoolError>) -> Result<R, PoolError> {
        let outermost = self.inner.batch_depth.get() == 0;
        let result = {
            let _scope = ActionScope::enter(&self.inner.batch_depth);
            f()
        };
        if !outermost {
            return result;
        }

        let flushed = self.flush();
        let value = result?;
        flushed?;
        Ok(value)
    }

    /// Close the current action.
    fn flush(&self) -> Result<(), PoolError> {
        if !self.inner.listening.get() {
            let discarded = self.inner.store.borrow_mut().take_journal();
            if !discarded.is_empty() {
                tracing::trace!(keys = discarded.len(), "pool stopped, no cycle");
            }
            return Ok(());
        }
        reactor::run(&self.inner)
    }

    fn write(&self, key: StoreKey, value: Option<Value>, origin: Origin) -> Result<bool, PoolError> {
        self.ensure_writable(std::slice::from_ref(&key))?;
        self.batch(|| Ok(self.inner.store.borrow_mut().put(key, value, origin)))
    }

    /// Write several keys as one action, checking every lock first.
    ///
    /// Returns the number of keys whose value actually changed.
    pub(crate) fn write_all(
        &self,
        entries: Vec<(StoreKey, Option<Value>)>,
        origin: Origin,
    ) -> Result<usize, PoolError> {
        let keys: Vec<StoreKey> = entries.iter().map(|(key, _)| key.clone()).collect();
        self.ensure_writable(&keys)?;

        self.batch(|| {
            let mut store = self.inner.store.borrow_mut();
            Ok(entries
                .into_iter()
                .filter(|(key, value)| store.put(key.clone(), value.clone(), origin))
                .count())
        })
    }

    pub(crate) fn ensure_writable(&self, keys: &[StoreKey]) -> Result<(), PoolError> {
        match keys.iter().find(|key| self.inner.locks.is_locked(key)) {
            Some(key) => Err(PoolError::LockViolation(key.path().clone())),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Locks
    // =========================================================================

    /// Lock `path` against writes. The key need not exist.
    ///
    /// # Errors
    ///
    /// Returns `LockError::AlreadyLocked` if `path` is already locked.
    pub fn lock(&self, path: impl Into<NamespacePath>) -> Result<LockHandle, LockError> {
        self.inner.locks.lock(StoreKey::encode(&path.into()))
    }

    /// Release the lock on `path` without its handle.
    ///
    /// The handle issued for that lock becomes stale.
    ///
    /// # Errors
    ///
    /// Returns `LockError::AlreadyUnlocked` if `path` is not locked.
    pub fn unlock(&self, path: impl Into<NamespacePath>) -> Result<(), LockError> {
        self.inner.locks.release(&StoreKey::encode(&path.into()))
    }

    /// Whether `path` is locked.
    pub fn is_locked(&self, path: impl Into<NamespacePath>) -> bool {
        self.inner.locks.is_locked(&StoreKey::encode(&path.into()))
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Call `callback` with the changes of every reactor cycle.
    ///
    /// Each subscriber receives its own copy of the change set. If a
    /// subscriber returns an error, the subscribers after it are skipped for
    /// that cycle and the error is returned from the write that ended the
    /// action.
    pub fn subscribe_to_changes<F>(&self, callback: F) -> SubscriptionId
    where
        F: FnMut(ChangeSet) -> anyhow::Result<()> + 'static,
    {
        let id = self.inner.subscribers.borrow_mut().add(Box::new(callback));
        tracing::debug!(subscription = %id, "subscribed");
        id
    }

    /// Remove a subscription. Returns `false` if `id` was not subscribed.
    pub fn unsubscribe_to_changes(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.borrow_mut().remove(id)
    }

    /// Number of global subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.borrow().len()
    }

    // =========================================================================
    // Consumer sessions
    // =========================================================================

    /// Bind a consumer session.
    ///
    /// # Errors
    ///
    /// - `PoolError::LockViolation` if a default would be seeded into a
    ///   locked key (nothing is seeded in that case)
    /// - `PoolError::Subscriber` if a subscriber failed in the seeding cycle
    pub fn require_consumable(&self, binding: Binding) -> Result<Consumable, PoolError> {
        crate::session::bind(self, binding)
    }

    /// Consumers that watch `path`, in creation order.
    pub fn dependents_of(&self, path: impl Into<NamespacePath>) -> Vec<ConsumerId> {
        self.inner
            .graph
            .borrow()
            .dependents_of(&StoreKey::encode(&path.into()))
    }

    /// Paths watched by consumer `id`, in key order. Empty once disposed.
    pub fn dependencies_of(&self, id: ConsumerId) -> Vec<NamespacePath> {
        self.inner
            .graph
            .borrow()
            .dependencies_of(id)
            .into_iter()
            .map(|key| key.path().clone())
            .collect()
    }

    /// Whether any consumer watches `path`.
    pub fn is_watched(&self, path: impl Into<NamespacePath>) -> bool {
        self.inner
            .graph
            .borrow()
            .contains_key(&StoreKey::encode(&path.into()))
    }

    /// Number of live consumer sessions.
    pub fn consumer_count(&self) -> usize {
        self.inner.graph.borrow().consumer_count()
    }

    pub(crate) fn next_consumer_id(&self) -> ConsumerId {
        let raw = self.inner.next_consumer.get();
        self.inner.next_consumer.set(raw + 1);
        ConsumerId::new(raw)
    }

    pub(crate) fn value_of(&self, key: &StoreKey) -> Option<Value> {
        self.inner.store.borrow().get(key).cloned()
    }

    pub(crate) fn contains_key(&self, key: &StoreKey) -> bool {
        self.inner.store.borrow().contains(key)
    }

    /// Add a session and its watched keys to the dependency graph.
    pub(crate) fn attach(
        &self,
        id: ConsumerId,
        session: Weak<SessionInner>,
        keys: &[(StoreKey, String)],
    ) {
        let mut graph = self.inner.graph.borrow_mut();
        graph.add_consumer(id, session);
        for (key, field) in keys {
            graph.add_dependency(id, key.clone(), field.as_str());
        }
    }

    /// Remove a session from the dependency graph, pruning orphaned keys.
    pub(crate) fn detach(&self, id: ConsumerId) -> bool {
        self.inner.graph.borrow_mut().remove_consumer(id).is_some()
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("listening", &self.inner.listening.get())
            .field("keys", &self.inner.store.borrow().len())
            .field("locks", &self.inner.locks.len())
            .field("consumers", &self.inner.graph.borrow().consumer_count())
            .finish()
    }
}
