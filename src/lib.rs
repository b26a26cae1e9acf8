//! statepool - a namespaced reactive state pool
//!
//! Many independently rendered components read and write one shared store
//! of JSON values keyed by namespace paths such as
//! `["App", "Users", "Create", "Permitted"]`. The pool decides what changed
//! and who must be told; how a change is displayed is up to the consumer.
//!
//! # Architecture
//!
//! - [`core`] - Paths and key encoding, the store, diffing, the dependency
//!   graph, locks, and configuration
//! - [`engine`] - The [`Pool`] handle, action boundaries, and the reactor
//! - [`session`] - Consumer sessions bound to a set of fields
//! - [`ui`] - Well-known namespaces for global UI state
//! - [`telemetry`] - Tracing subscriber setup
//!
//! # Guarantees
//!
//! 1. Writing a value deep-equal to the current one never notifies anyone
//! 2. A locked key rejects writes before anything is mutated
//! 3. All writes of one action produce exactly one reactor cycle
//! 4. A session is only told about keys it watches, at most once per cycle
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use statepool::{Binding, Pool};
//!
//! let pool = Pool::default();
//! let session = pool
//!     .require_consumable(Binding::new(["A"]).field("v").defaults([5]))
//!     .unwrap();
//! assert_eq!(session.get("v"), Some(json!(5)));
//!
//! pool.set(["A", "v"], 7).unwrap();
//! assert_eq!(session.get("v"), Some(json!(7)));
//!
//! drop(session);
//! assert!(!pool.is_watched(["A", "v"]));
//! ```

pub mod core;
pub mod engine;
pub mod session;
pub mod telemetry;
pub mod ui;

pub use crate::core::config::{Config, PoolConfig};
pub use crate::core::diff::ChangeSet;
pub use crate::core::types::{ConsumerId, NamespacePath, SubscriptionId};
pub use engine::{Pool, PoolError};
pub use session::{Binding, Consumable, FieldChanges, RenderTarget};
