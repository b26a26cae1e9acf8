//! core
//!
//! Core data structures for the pool.
//!
//! # Modules
//!
//! - [`types`] - Strong types: NamespacePath, StoreKey, ConsumerId, etc.
//! - [`codec`] - Bijective key encoding and prefix matching
//! - [`store`] - The namespaced key/value store and its write journal
//! - [`diff`] - Snapshot comparison
//! - [`graph`] - Consumer/key dependency graph
//! - [`ops`] - Write locks
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Everything here is plain data; notification lives in the engine
//! - Validation happens before mutation

pub mod codec;
pub mod config;
pub mod diff;
pub mod graph;
pub mod ops;
pub mod store;
pub mod types;
