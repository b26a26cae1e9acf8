//! ui::snackbar
//!
//! The global snackbar: three fields under `["Snackbar"]`.
//!
//! | Field      | Type   | Default |
//! |------------|--------|---------|
//! | `open`     | bool   | `false` |
//! | `content`  | string | `""`    |
//! | `duration` | u64 ms | `0`     |
//!
//! A duration of `0` means the snackbar stays until closed.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::core::types::NamespacePath;
use crate::engine::{Pool, PoolError};
use crate::session::{Binding, FieldChanges};

/// Namespace of the snackbar fields.
pub const NAMESPACE: &str = "Snackbar";

/// Display time used by [`show_snackbar`].
pub const DEFAULT_DURATION_MS: u64 = 3000;

/// Snapshot of the snackbar fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnackbarState {
    pub open: bool,
    pub content: String,
    pub duration: u64,
}

impl SnackbarState {
    /// A binding for the component that renders the snackbar.
    pub fn binding() -> Binding {
        Binding::new([NAMESPACE])
            .fields(["open", "content", "duration"])
            .defaults([json!(false), json!(""), json!(0)])
    }

    /// Read the snackbar fields from `pool`. Absent fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Decode` if a field holds a value of the wrong type.
    pub fn read(pool: &Pool) -> Result<Self, PoolError> {
        let defaults = Self::default();
        Ok(Self {
            open: pool.get_as(field("open"))?.unwrap_or(defaults.open),
            content: pool.get_as(field("content"))?.unwrap_or(defaults.content),
            duration: pool.get_as(field("duration"))?.unwrap_or(defaults.duration),
        })
    }

    /// Build from a session state or a delivered change set.
    ///
    /// Missing or mistyped fields take defaults.
    pub fn from_fields(fields: &FieldChanges) -> Self {
        let defaults = Self::default();
        Self {
            open: fields
                .get("open")
                .and_then(|v| v.as_bool())
                .unwrap_or(defaults.open),
            content: fields
                .get("content")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or(defaults.content),
            duration: fields
                .get("duration")
                .and_then(|v| v.as_u64())
                .unwrap_or(defaults.duration),
        }
    }
}

fn field(name: &str) -> NamespacePath {
    NamespacePath::from([NAMESPACE, name])
}

/// Set every snackbar field in one action.
///
/// # Errors
///
/// Returns the first write error; see [`Pool::set`].
pub fn run_snackbar(pool: &Pool, open: bool, content: &str, duration: u64) -> Result<(), PoolError> {
    pool.batch(|| {
        pool.set(field("content"), content)?;
        pool.set(field("duration"), duration)?;
        pool.set(field("open"), open)?;
        Ok(())
    })
}

/// Show `content` for [`DEFAULT_DURATION_MS`].
///
/// # Errors
///
/// See [`run_snackbar`].
pub fn show_snackbar(pool: &Pool, content: &str) -> Result<(), PoolError> {
    run_snackbar(pool, true, content, DEFAULT_DURATION_MS)
}

/// Close the snackbar, keeping its content.
///
/// # Errors
///
/// See [`Pool::set`].
pub fn hide_snackbar(pool: &Pool) -> Result<(), PoolError> {
    pool.set(field("open"), false).map(|_| ())
}
