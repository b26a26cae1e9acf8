//! core::ops
//!
//! Write-guard operations on the store.
//!
//! # Modules
//!
//! - [`lock`] - Per-key write locks
//!
//! # Architecture
//!
//! Every store write checks the lock registry before it touches the store.
//! A locked key rejects the write with no partial effect.

pub mod lock;

pub use lock::{LockError, LockHandle, LockRegistry};
