//! ui::dialog
//!
//! The global dialog: one object under `["Dialog", "state"]`.
//!
//! Callers patch the object instead of replacing it, so opening the dialog
//! with a new title keeps whatever button texts were set before.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::types::NamespacePath;
use crate::engine::{Pool, PoolError};
use crate::session::Binding;

/// Namespace of the dialog.
pub const NAMESPACE: &str = "Dialog";

/// Field holding the dialog state.
pub const FIELD: &str = "state";

/// The full dialog state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogState {
    pub open: bool,
    pub title: String,
    pub content: String,
    pub close_text: String,
    pub proceed_text: String,
}

impl Default for DialogState {
    fn default() -> Self {
        Self {
            open: false,
            title: String::new(),
            content: String::new(),
            close_text: "Close".to_string(),
            proceed_text: "Proceed".to_string(),
        }
    }
}

impl DialogState {
    /// A binding for the component that renders the dialog.
    pub fn binding() -> Binding {
        Binding::new([NAMESPACE]).field(FIELD).defaults([default_value()])
    }

    /// Read the dialog state from `pool`, or the default if unset.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Decode` if the stored value is not a dialog state.
    pub fn read(pool: &Pool) -> Result<Self, PoolError> {
        Ok(pool.get_as(path())?.unwrap_or_default())
    }
}

/// A partial dialog state. Unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proceed_text: Option<String>,
}

impl DialogPatch {
    /// A patch that opens the dialog.
    pub fn open() -> Self {
        Self {
            open: Some(true),
            ..Self::default()
        }
    }

    /// A patch that closes the dialog.
    pub fn close() -> Self {
        Self {
            open: Some(false),
            ..Self::default()
        }
    }

    /// Set the heading.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the body text.
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set the dismiss button label.
    pub fn close_text(mut self, text: impl Into<String>) -> Self {
        self.close_text = Some(text.into());
        self
    }

    /// Set the confirm button label.
    pub fn proceed_text(mut self, text: impl Into<String>) -> Self {
        self.proceed_text = Some(text.into());
        self
    }
}

fn path() -> NamespacePath {
    NamespacePath::from([NAMESPACE, FIELD])
}

fn default_value() -> Value {
    json!({
        "open": false,
        "title": "",
        "content": "",
        "closeText": "Close",
        "proceedText": "Proceed",
    })
}

/// Shallow-merge `patch` into the stored dialog state.
///
/// An unset or non-object state is replaced by the default before merging.
/// Returns whether the stored state changed.
///
/// # Errors
///
/// See [`Pool::set`].
pub fn run_dialog(pool: &Pool, patch: &DialogPatch) -> Result<bool, PoolError> {
    let mut state = match pool.get(path()) {
        Some(Value::Object(map)) => map,
        _ => match default_value() {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        },
    };

    let patch = serde_json::to_value(patch).map_err(|source| PoolError::Encode {
        path: path(),
        source,
    })?;
    if let Value::Object(entries) = patch {
        state.extend(entries);
    }

    pool.set(path(), Value::Object(state))
}

/// Close the dialog, keeping the rest of its state.
///
/// # Errors
///
/// See [`Pool::set`].
pub fn close_dialog(pool: &Pool) -> Result<bool, PoolError> {
    run_dialog(pool, &DialogPatch::close())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_value_matches_default_state() {
        let state: DialogState = serde_json::from_value(default_value()).unwrap();
        assert_eq!(state, DialogState::default());
    }

    #[test]
    fn run_dialog_merges_onto_defaults() {
        let pool = Pool::default();
        run_dialog(&pool, &DialogPatch::open().title("Delete poll?")).unwrap();

        let state = DialogState::read(&pool).unwrap();
        assert!(state.open);
        assert_eq!(state.title, "Delete poll?");
        assert_eq!(state.close_text, "Close");
        assert_eq!(state.proceed_text, "Proceed");
    }

    #[test]
    fn patches_keep_earlier_fields() {
        let pool = Pool::default();
        run_dialog(&pool, &DialogPatch::open().proceed_text("Delete")).unwrap();
        run_dialog(&pool, &DialogPatch::default().content("This cannot be undone")).unwrap();

        let state = DialogState::read(&pool).unwrap();
        assert_eq!(state.proceed_text, "Delete");
        assert_eq!(state.content, "This cannot be undone");
        assert!(state.open);
    }

    #[test]
    fn close_keeps_content() {
        let pool = Pool::default();
        run_dialog(&pool, &DialogPatch::open().title("Hi")).unwrap();
        assert!(close_dialog(&pool).unwrap());
        assert!(!close_dialog(&pool).unwrap());

        let state = DialogState::read(&pool).unwrap();
        assert!(!state.open);
        assert_eq!(state.title, "Hi");
    }

    #[test]
    fn bound_dialog_receives_state_object() {
        let pool = Pool::default();
        let session = pool.require_consumable(DialogState::binding()).unwrap();

        run_dialog(&pool, &DialogPatch::open()).unwrap();

        let state: DialogState = session.get_as(FIELD).unwrap().unwrap();
        assert!(state.open);
    }

    #[test]
    fn patch_serializes_only_set_fields() {
        let patch = DialogPatch::close().close_text("Dismiss");
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({"open": false, "closeText": "Dismiss"})
        );
    }
}
