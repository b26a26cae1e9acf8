//! session
//!
//! Consumer sessions: the per-component handle onto the pool.
//!
//! # Modules
//!
//! - [`binding`] - Builder declaring namespace, fields, defaults, consumer
//! - [`consumer`] - Delivery surface (render target, callback, passive)
//! - [`state`] - Session phase and local mirror
//!
//! # Architecture
//!
//! A [`Consumable`] owns a local mirror of the fields it watches. Reads are
//! served from the mirror (or from the pause buffer while paused). Writes go
//! through [`Consumable::assign`]:
//!
//! - **Active**: real changes are written to the store as one action, and
//!   then delivered straight to the session's own consumer (the local echo).
//!   The reactor does not route those keys back to this session.
//! - **Paused**: changes are staged in the pause buffer without touching the
//!   store. A render target still sees them as a preview unless rendering is
//!   paused too. [`Consumable::resume`] flushes or discards the buffer.
//!
//! Changes made by anyone else arrive through the dependency graph: the
//! reactor stashes them in the mirror and releases the session once per
//! cycle, so a session renders at most once per cycle.
//!
//! # Invariants
//!
//! - A change a session makes to itself is delivered to its consumer once
//! - Deliveries are never re-entrant: a delivery triggered from inside a
//!   consumer callback is queued and runs after the current one returns
//! - A disposed session has no graph edges and never delivers again
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use statepool::engine::Pool;
//! use statepool::session::Binding;
//!
//! let pool = Pool::default();
//! let session = pool
//!     .require_consumable(Binding::new(["Counter"]).field("count").defaults([0]))
//!     .unwrap();
//!
//! session.pause(false).unwrap();
//! session.set("count", 1).unwrap();
//! session.set("count", 2).unwrap();
//! assert_eq!(session.get("count"), Some(json!(2)));
//! assert_eq!(pool.get(["Counter", "count"]), Some(json!(0)));
//!
//! session.resume(false).unwrap();
//! assert_eq!(pool.get(["Counter", "count"]), Some(json!(2)));
//! ```

pub mod binding;
pub mod consumer;
pub mod state;

pub use binding::Binding;
pub use consumer::{Consumer, RenderTarget};
pub use state::Phase;

pub(crate) use binding::bind;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::core::store::Origin;
use crate::core::types::{ConsumerId, NamespacePath, StoreKey};
use crate::engine::{Pool, PoolError};

use consumer::{Channel, Delivery};
use state::SessionState;

/// Field name to value map used for partial states and change sets.
pub type FieldChanges = serde_json::Map<String, Value>;

/// Shared session internals. The dependency graph holds these weakly.
pub(crate) struct SessionInner {
    id: ConsumerId,
    namespace: NamespacePath,
    fields: Vec<String>,
    pool: Pool,
    render_mode: bool,
    state: RefCell<SessionState>,
    consumer: RefCell<Consumer>,
    outbox: RefCell<VecDeque<Delivery>>,
    delivering: Cell<bool>,
}

/// Clears the delivering flag when a delivery loop ends, even on unwind.
struct DeliveryGuard<'a> {
    delivering: &'a Cell<bool>,
}

impl Drop for DeliveryGuard<'_> {
    fn drop(&mut self) {
        self.delivering.set(false);
    }
}

impl SessionInner {
    pub(crate) fn new(
        id: ConsumerId,
        namespace: NamespacePath,
        fields: Vec<String>,
        pool: Pool,
        mirror: FieldChanges,
        consumer: Consumer,
    ) -> Self {
        Self {
            id,
            namespace,
            fields,
            pool,
            render_mode: consumer.is_render(),
            state: RefCell::new(SessionState::new(mirror)),
            consumer: RefCell::new(consumer),
            outbox: RefCell::new(VecDeque::new()),
            delivering: Cell::new(false),
        }
    }

    pub(crate) fn namespace(&self) -> &NamespacePath {
        &self.namespace
    }

    fn key_for(&self, field: &str) -> StoreKey {
        StoreKey::encode(&self.namespace.child(field))
    }

    fn ensure_live(&self) -> Result<(), PoolError> {
        if self.state.borrow().is_disposed() {
            Err(PoolError::Disposed(self.id))
        } else {
            Ok(())
        }
    }

    /// Stash a routed store change. Called by the reactor during dispatch.
    pub(crate) fn stash(&self, field: &str, value: Option<Value>) -> bool {
        self.state.borrow_mut().stash(field, value)
    }

    /// Deliver everything stashed this cycle. Called once per touched
    /// session, after all changes of the cycle were stashed.
    pub(crate) fn release(&self) {
        let released = self.state.borrow_mut().release();
        if let Some(changes) = released {
            self.deliver(Channel::All, changes, None);
        }
    }

    /// Queue a delivery and drain the queue unless a drain is in progress.
    fn deliver(&self, channel: Channel, changes: FieldChanges, callback: Option<Box<dyn FnOnce()>>) {
        self.outbox.borrow_mut().push_back(Delivery {
            channel,
            changes,
            callback,
        });
        if self.delivering.replace(true) {
            return;
        }
        let _guard = DeliveryGuard {
            delivering: &self.delivering,
        };

        loop {
            let next = self.outbox.borrow_mut().pop_front();
            let Some(delivery) = next else {
                break;
            };

            let (disposed, mounted) = {
                let state = self.state.borrow();
                (state.is_disposed(), state.mounted)
            };
            if disposed {
                self.outbox.borrow_mut().clear();
                break;
            }

            if let Ok(mut consumer) = self.consumer.try_borrow_mut() {
                consumer.accept(delivery.channel, &delivery.changes, mounted);
            }
            if let Some(callback) = delivery.callback {
                callback();
            }
        }
    }

    fn assign_patch(
        &self,
        patch: FieldChanges,
        callback: Option<Box<dyn FnOnce()>>,
    ) -> Result<bool, PoolError> {
        let phase = self.state.borrow().phase;
        match phase {
            Phase::Disposed => Err(PoolError::Disposed(self.id)),
            Phase::Paused { no_render } => {
                let staged = self.state.borrow_mut().stage(patch, &self.fields);
                if staged.is_empty() {
                    return Ok(false);
                }
                tracing::trace!(consumer = %self.id, fields = staged.len(), "changes staged");

                if !no_render && self.render_mode {
                    self.deliver(Channel::Render, staged, callback);
                } else if let Some(callback) = callback {
                    callback();
                }
                Ok(false)
            }
            Phase::Active => self.commit(patch, Channel::All, callback),
        }
    }

    /// Write the real changes in `patch` to the store, then echo them to
    /// the consumer on `channel`.
    fn commit(
        &self,
        patch: FieldChanges,
        channel: Channel,
        callback: Option<Box<dyn FnOnce()>>,
    ) -> Result<bool, PoolError> {
        let changes = self.state.borrow().committed_changes(patch, &self.fields);
        if changes.is_empty() {
            return Ok(false);
        }

        let entries: Vec<(StoreKey, Option<Value>)> = changes
            .iter()
            .map(|(field, value)| (self.key_for(field), Some(value.clone())))
            .collect();
        let keys: Vec<StoreKey> = entries.iter().map(|(key, _)| key.clone()).collect();
        self.pool.ensure_writable(&keys)?;

        self.state.borrow_mut().commit(&changes);
        // The echo precedes every cycle this action triggers.
        self.pool.batch(|| {
            self.pool.write_all(entries, Origin::Consumer(self.id))?;
            self.deliver(channel, changes, callback);
            Ok(true)
        })
    }

    fn pause(&self, no_render: bool) -> Result<(), PoolError> {
        self.ensure_live()?;
        if self.state.borrow_mut().pause(no_render) {
            tracing::trace!(consumer = %self.id, no_render, "session paused");
        }
        Ok(())
    }

    fn resume(&self, skip_changes: bool) -> Result<FieldChanges, PoolError> {
        self.ensure_live()?;
        let window = self.state.borrow_mut().resume();
        let Some(window) = window else {
            return Ok(FieldChanges::new());
        };
        tracing::trace!(
            consumer = %self.id,
            cached = window.cached.len(),
            deferred = window.deferred.len(),
            skip_changes,
            "session resumed"
        );

        if !window.deferred.is_empty() {
            self.deliver(Channel::All, window.deferred.clone(), None);
        }

        if skip_changes {
            if !window.no_render {
                let restored: FieldChanges = {
                    let state = self.state.borrow();
                    window
                        .cached
                        .keys()
                        .filter(|field| !window.deferred.contains_key(*field))
                        .map(|field| {
                            let committed = state.mirror.get(field).cloned().unwrap_or(Value::Null);
                            (field.clone(), committed)
                        })
                        .collect()
                };
                if !restored.is_empty() {
                    self.deliver(Channel::Render, restored, None);
                }
            }
        } else {
            let channel = if window.no_render {
                Channel::All
            } else {
                Channel::Function
            };
            self.commit(window.cached.clone(), channel, None)?;
        }

        Ok(window.cached)
    }

    fn dispose(&self) -> bool {
        if !self.state.borrow_mut().dispose() {
            return false;
        }
        self.pool.detach(self.id);
        tracing::trace!(consumer = %self.id, "session disposed");
        true
    }
}

/// A consumer session bound to a pool.
///
/// Dropping the handle disposes the session.
pub struct Consumable {
    inner: Rc<SessionInner>,
}

impl Consumable {
    pub(crate) fn from_inner(inner: Rc<SessionInner>) -> Self {
        Self { inner }
    }

    /// The session id.
    pub fn id(&self) -> ConsumerId {
        self.inner.id
    }

    /// The namespace fields are resolved under.
    pub fn namespace(&self) -> &NamespacePath {
        &self.inner.namespace
    }

    /// The watched fields, in declaration order.
    pub fn fields(&self) -> &[String] {
        &self.inner.fields
    }

    /// The current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.inner.state.borrow().phase
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// The value of `field`: the pending value while paused, else the
    /// committed one. `None` for unwatched or absent fields, and after
    /// disposal.
    pub fn get(&self, field: &str) -> Option<Value> {
        let state = self.inner.state.borrow();
        if state.is_disposed() || !self.inner.fields.iter().any(|f| f == field) {
            return None;
        }
        state.effective(field).cloned()
    }

    /// The value of `field`, deserialized.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Decode` if the value does not match `T`.
    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> Result<Option<T>, PoolError> {
        self.get(field)
            .map(serde_json::from_value)
            .transpose()
            .map_err(|source| PoolError::Decode {
                path: self.inner.namespace.child(field),
                source,
            })
    }

    /// Every watched field that has a value, merged with pending changes.
    pub fn state(&self) -> FieldChanges {
        let state = self.inner.state.borrow();
        if state.is_disposed() {
            return FieldChanges::new();
        }
        state.merged(&self.inner.fields)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Set one field. Equivalent to `assign` with a single entry.
    ///
    /// # Errors
    ///
    /// Same as [`Consumable::assign`].
    pub fn set(&self, field: &str, value: impl Serialize) -> Result<bool, PoolError> {
        let value = serde_json::to_value(value).map_err(|source| PoolError::Encode {
            path: self.inner.namespace.child(field),
            source,
        })?;
        let mut patch = FieldChanges::new();
        patch.insert(field.to_string(), value);
        self.inner.assign_patch(patch, None)
    }

    /// Apply a partial state.
    ///
    /// `partial` must serialize to an object. Entries for unwatched fields
    /// and entries that would not change anything are dropped. Returns
    /// `true` if at least one field was written to the store; a paused
    /// session stages the changes instead and returns `false`.
    ///
    /// # Errors
    ///
    /// - `PoolError::Encode` if `partial` is not an object
    /// - `PoolError::LockViolation` if a changed field's key is locked
    ///   (nothing is written)
    /// - `PoolError::Disposed` after disposal
    /// - `PoolError::Subscriber` if a subscriber failed in the cycle
    pub fn assign(&self, partial: impl Serialize) -> Result<bool, PoolError> {
        let patch = self.to_patch(partial)?;
        self.inner.assign_patch(patch, None)
    }

    /// Apply the partial state computed from the current merged state.
    ///
    /// # Errors
    ///
    /// Same as [`Consumable::assign`].
    pub fn assign_with<P, F>(&self, updater: F) -> Result<bool, PoolError>
    where
        P: Serialize,
        F: FnOnce(&FieldChanges) -> P,
    {
        let current = self.state();
        let patch = self.to_patch(updater(&current))?;
        self.inner.assign_patch(patch, None)
    }

    /// Apply a partial state and run `callback` once the consumer has seen
    /// the changes.
    ///
    /// The callback runs right away if the consumer does not take the
    /// delivery, and not at all if nothing changed.
    ///
    /// # Errors
    ///
    /// Same as [`Consumable::assign`].
    pub fn assign_then<F>(&self, partial: impl Serialize, callback: F) -> Result<bool, PoolError>
    where
        F: FnOnce() + 'static,
    {
        let patch = self.to_patch(partial)?;
        self.inner.assign_patch(patch, Some(Box::new(callback)))
    }

    fn to_patch(&self, partial: impl Serialize) -> Result<FieldChanges, PoolError> {
        serde_json::to_value(partial)
            .and_then(serde_json::from_value)
            .map_err(|source| PoolError::Encode {
                path: self.inner.namespace.clone(),
                source,
            })
    }

    // =========================================================================
    // Pausing
    // =========================================================================

    /// Stop writes from reaching the store. With `no_render`, also stop
    /// deliveries to the consumer. No-op if already paused.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Disposed` after disposal.
    pub fn pause(&self, no_render: bool) -> Result<(), PoolError> {
        self.inner.pause(no_render)
    }

    /// End the pause window.
    ///
    /// Unless `skip_changes`, the staged changes are written to the store.
    /// Either way the staged changes are returned and the pause buffer is
    /// cleared. Returns an empty map if the session was not paused.
    ///
    /// # Errors
    ///
    /// - `PoolError::Disposed` after disposal
    /// - any error of the flush write (see [`Consumable::assign`]); the
    ///   session is resumed regardless
    pub fn resume(&self, skip_changes: bool) -> Result<FieldChanges, PoolError> {
        self.inner.resume(skip_changes)
    }

    /// Whether the session is paused.
    pub fn is_paused(&self) -> bool {
        self.inner.state.borrow().is_paused()
    }

    /// Whether deliveries to the consumer are paused.
    pub fn is_render_paused(&self) -> bool {
        self.inner.state.borrow().is_render_paused()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Mount hook: call once after the consumer's first paint.
    ///
    /// From now on render targets receive deliveries through `set_state`.
    pub fn mount(&self) {
        let mut state = self.inner.state.borrow_mut();
        if state.is_disposed() {
            tracing::warn!(consumer = %self.inner.id, "mount called on a disposed session");
        } else if state.mounted {
            tracing::warn!(consumer = %self.inner.id, "mount called twice");
        } else {
            state.mounted = true;
        }
    }

    /// Unmount hook: call once before teardown. Disposes the session.
    pub fn unmount(&self) {
        let mounted = std::mem::replace(&mut self.inner.state.borrow_mut().mounted, false);
        if !mounted {
            tracing::warn!(consumer = %self.inner.id, "unmount called on an unmounted session");
        }
        self.inner.dispose();
    }

    /// Whether the mount hook has run and the unmount hook has not.
    pub fn is_mounted(&self) -> bool {
        self.inner.state.borrow().mounted
    }

    /// Sever the session from the pool. Returns `false` if already disposed.
    ///
    /// Keys no other session watches are pruned from the dependency graph.
    pub fn dispose(&self) -> bool {
        self.inner.dispose()
    }

    /// Whether the session was disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.state.borrow().is_disposed()
    }
}

impl Drop for Consumable {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl fmt::Debug for Consumable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumable")
            .field("id", &self.inner.id)
            .field("namespace", &self.inner.namespace)
            .field("fields", &self.inner.fields)
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bind(pool: &Pool, fields: &[&str]) -> Consumable {
        pool.require_consumable(Binding::new(["A"]).fields(fields.iter().copied()))
            .unwrap()
    }

    #[test]
    fn set_writes_through() {
        let pool = Pool::default();
        let session = bind(&pool, &["x"]);

        assert!(session.set("x", 1).unwrap());
        assert!(!session.set("x", 1).unwrap());
        assert_eq!(pool.get(["A", "x"]), Some(json!(1)));
    }

    #[test]
    fn unwatched_field_is_ignored() {
        let pool = Pool::default();
        let session = bind(&pool, &["x"]);

        assert!(!session.set("y", 1).unwrap());
        assert!(!pool.has(["A", "y"]));
        assert_eq!(session.get("y"), None);
    }

    #[test]
    fn assign_requires_an_object() {
        let pool = Pool::default();
        let session = bind(&pool, &["x"]);
        assert!(matches!(session.assign(5), Err(PoolError::Encode { .. })));
    }

    #[test]
    fn assign_with_sees_merged_state() {
        let pool = Pool::default();
        let session = pool
            .require_consumable(Binding::new(["A"]).field("n").defaults([1]))
            .unwrap();

        session.pause(false).unwrap();
        session.set("n", 10).unwrap();
        session
            .assign_with(|state| {
                let n = state.get("n").and_then(Value::as_i64).unwrap_or(0);
                json!({ "n": n + 1 })
            })
            .unwrap();

        assert_eq!(session.get("n"), Some(json!(11)));
    }

    #[test]
    fn locked_field_blocks_whole_assign() {
        let pool = Pool::default();
        let session = bind(&pool, &["a", "b"]);
        let _handle = pool.lock(["A", "b"]).unwrap();

        let result = session.assign(json!({"a": 1, "b": 2}));
        assert!(matches!(result, Err(PoolError::LockViolation(_))));
        assert!(!pool.has(["A", "a"]));
        assert_eq!(session.get("a"), None);
    }

    #[test]
    fn disposed_session_rejects_operations() {
        let pool = Pool::default();
        let session = bind(&pool, &["x"]);
        assert!(session.dispose());
        assert!(!session.dispose());

        assert!(matches!(session.set("x", 1), Err(PoolError::Disposed(_))));
        assert!(matches!(session.pause(false), Err(PoolError::Disposed(_))));
        assert!(matches!(session.resume(false), Err(PoolError::Disposed(_))));
        assert_eq!(session.get("x"), None);
        assert!(session.state().is_empty());
        assert_eq!(session.phase(), Phase::Disposed);
    }

    #[test]
    fn drop_disposes() {
        let pool = Pool::default();
        {
            let _session = bind(&pool, &["x"]);
            assert!(pool.is_watched(["A", "x"]));
        }
        assert!(!pool.is_watched(["A", "x"]));
        assert_eq!(pool.consumer_count(), 0);
    }

    #[test]
    fn resume_when_not_paused_is_empty() {
        let pool = Pool::default();
        let session = bind(&pool, &["x"]);
        assert!(session.resume(false).unwrap().is_empty());
    }

    #[test]
    fn reentrant_assign_from_listener_is_queued() {
        let pool = Pool::default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);

        let session = pool
            .require_consumable(
                Binding::new(["A"])
                    .fields(["x"])
                    .listen(move |changes| sink.borrow_mut().push(changes.clone())),
            )
            .unwrap();

        // An external writer that reacts to x by writing x again.
        let writer = pool.clone();
        pool.subscribe_to_changes(move |changes| {
            if changes.get(&NamespacePath::from(["A", "x"])) == Some(Some(&json!(1))) {
                writer.set(["A", "x"], 2)?;
            }
            Ok(())
        });

        session.set("x", 1).unwrap();

        assert_eq!(pool.get(["A", "x"]), Some(json!(2)));
        assert_eq!(session.get("x"), Some(json!(2)));
        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].get("x"), Some(&json!(1)));
        assert_eq!(seen[1].get("x"), Some(&json!(2)));
    }
}
