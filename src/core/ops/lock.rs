//! core::ops::lock
//!
//! Per-key write locks.
//!
//! # Architecture
//!
//! The registry is a set of encoded keys that must not be written. Locking
//! is independent of existence: a key that holds no value can be locked to
//! forbid its creation.
//!
//! Every successful [`LockRegistry::lock`] issues a [`LockHandle`] tagged with
//! a fresh generation number. A handle only releases the lock it was issued
//! for, so a stale handle (its lock was already released, possibly re-taken
//! by someone else since) fails instead of releasing a lock it does not own.
//!
//! # Invariants
//!
//! - A key is locked at most once at a time
//! - Lock state is validated before it is mutated; a failed call changes
//!   nothing
//! - Dropping a handle does NOT release the lock
//!
//! # Example
//!
//! ```
//! use statepool::core::ops::lock::{LockError, LockRegistry};
//! use statepool::core::types::{NamespacePath, StoreKey};
//!
//! let registry = LockRegistry::new();
//! let key = StoreKey::encode(&NamespacePath::from(["App", "Permitted"]));
//!
//! let handle = registry.lock(key.clone()).unwrap();
//! assert!(registry.is_locked(&key));
//! assert!(matches!(registry.lock(key.clone()), Err(LockError::AlreadyLocked(_))));
//!
//! handle.unlock().unwrap();
//! assert!(!registry.is_locked(&key));
//! assert!(matches!(handle.unlock(), Err(LockError::AlreadyUnlocked(_))));
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::core::types::{NamespacePath, StoreKey};

/// Errors from lock-state misuse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    /// The key is already locked.
    #[error("[{0}] has already been locked")]
    AlreadyLocked(NamespacePath),

    /// The lock this call refers to is no longer held.
    #[error("[{0}] has already been unlocked")]
    AlreadyUnlocked(NamespacePath),
}

#[derive(Debug, Default)]
struct LockTable {
    /// Locked keys and the generation of the handle that holds them.
    held: HashMap<StoreKey, u64>,
    next_generation: u64,
}

/// The set of locked keys.
///
/// Cloning yields another handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct LockRegistry {
    table: Rc<RefCell<LockTable>>,
}

impl LockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `key`.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyLocked`] if the key is currently locked
    pub fn lock(&self, key: StoreKey) -> Result<LockHandle, LockError> {
        let mut table = self.table.borrow_mut();
        if table.held.contains_key(&key) {
            return Err(LockError::AlreadyLocked(key.path().clone()));
        }

        let generation = table.next_generation;
        table.next_generation += 1;
        table.held.insert(key.clone(), generation);

        tracing::debug!(key = %key, generation, "key locked");

        Ok(LockHandle {
            key,
            generation,
            table: Rc::clone(&self.table),
        })
    }

    /// Release the lock on `key` regardless of which handle holds it.
    ///
    /// Any outstanding handle for that lock becomes stale.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyUnlocked`] if the key is not locked
    pub fn release(&self, key: &StoreKey) -> Result<(), LockError> {
        match self.table.borrow_mut().held.remove(key) {
            Some(_) => {
                tracing::debug!(key = %key, "key unlocked out of band");
                Ok(())
            }
            None => Err(LockError::AlreadyUnlocked(key.path().clone())),
        }
    }

    /// Whether `key` is locked.
    pub fn is_locked(&self, key: &StoreKey) -> bool {
        self.table.borrow().held.contains_key(key)
    }

    /// Number of locked keys.
    pub fn len(&self) -> usize {
        self.table.borrow().held.len()
    }

    /// Whether no key is locked.
    pub fn is_empty(&self) -> bool {
        self.table.borrow().held.is_empty()
    }
}

/// The release side of one successful lock.
#[must_use = "a lock is only released by calling `unlock`"]
#[derive(Debug)]
pub struct LockHandle {
    key: StoreKey,
    generation: u64,
    table: Rc<RefCell<LockTable>>,
}

impl LockHandle {
    /// Release the lock this handle was issued for.
    ///
    /// # Errors
    ///
    /// - [`LockError::AlreadyUnlocked`] if this handle was already used, or
    ///   its lock was released out of band
    pub fn unlock(&self) -> Result<(), LockError> {
        let mut table = self.table.borrow_mut();
        if table.held.get(&self.key) != Some(&self.generation) {
            return Err(LockError::AlreadyUnlocked(self.key.path().clone()));
        }
        table.held.remove(&self.key);

        tracing::debug!(key = %self.key, generation = self.generation, "key unlocked");
        Ok(())
    }

    /// Whether the lock this handle was issued for is still held.
    pub fn is_held(&self) -> bool {
        self.table.borrow().held.get(&self.key) == Some(&self.generation)
    }

    /// The locked path.
    pub fn path(&self) -> &NamespacePath {
        self.key.path()
    }
}
