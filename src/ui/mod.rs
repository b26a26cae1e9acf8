//! ui
//!
//! Well-known namespaces for global UI state.
//!
//! # Modules
//!
//! - [`snackbar`] - Toast notifications under `["Snackbar"]`
//! - [`dialog`] - Modal dialog under `["Dialog", "state"]`
//!
//! # Design
//!
//! Anything can raise a snackbar or open the dialog by writing to these
//! namespaces, and whichever component renders them binds a session to the
//! same namespace. Neither side depends on the other, only on the key
//! convention defined here.

pub mod dialog;
pub mod snackbar;

pub use dialog::{close_dialog, run_dialog, DialogPatch, DialogState};
pub use snackbar::{hide_snackbar, run_snackbar, show_snackbar, SnackbarState};
