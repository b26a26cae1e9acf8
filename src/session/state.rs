//! session::state
//!
//! Per-session state machine and local mirror.
//!
//! # States
//!
//! ```text
//! Active <-> Paused { no_render } --> Disposed
//!    \__________________________________^
//! ```
//!
//! # Buffers
//!
//! - `mirror`: committed field values, as last seen in the store
//! - `cached`: changes staged by `assign` while paused
//! - `incoming`: values stashed by the current dispatch, not yet released
//! - `deferred`: released values held back while rendering is paused
//!
//! Everything here is plain data; delivery to the consumer and writes to the
//! store happen in the session handle.

use serde_json::Value;

use super::FieldChanges;

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Active,
    Paused { no_render: bool },
    Disposed,
}

/// What a pause window left behind.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct PauseWindow {
    pub(crate) cached: FieldChanges,
    pub(crate) deferred: FieldChanges,
    pub(crate) no_render: bool,
}

#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) phase: Phase,
    pub(crate) mirror: FieldChanges,
    pub(crate) mounted: bool,
    cached: FieldChanges,
    incoming: FieldChanges,
    deferred: FieldChanges,
}

impl SessionState {
    pub(crate) fn new(mirror: FieldChanges) -> Self {
        Self {
            phase: Phase::Active,
            mirror,
            mounted: false,
            cached: FieldChanges::new(),
            incoming: FieldChanges::new(),
            deferred: FieldChanges::new(),
        }
    }

    pub(crate) fn is_paused(&self) -> bool {
        matches!(self.phase, Phase::Paused { .. })
    }

    pub(crate) fn is_render_paused(&self) -> bool {
        matches!(self.phase, Phase::Paused { no_render: true })
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.phase == Phase::Disposed
    }

    /// The pending value while paused, else the committed one.
    pub(crate) fn effective(&self, field: &str) -> Option<&Value> {
        if self.is_paused() {
            if let Some(pending) = self.cached.get(field) {
                return Some(pending);
            }
        }
        self.mirror.get(field)
    }

    /// Effective values of every watched field that has one.
    pub(crate) fn merged(&self, fields: &[String]) -> FieldChanges {
        fields
            .iter()
            .filter_map(|field| {
                self.effective(field)
                    .map(|value| (field.clone(), value.clone()))
            })
            .collect()
    }

    /// Enter the paused phase. Returns `false` if already paused or disposed.
    pub(crate) fn pause(&mut self, no_render: bool) -> bool {
        if self.phase != Phase::Active {
            return false;
        }
        self.phase = Phase::Paused { no_render };
        self.cached.clear();
        true
    }

    /// Leave the paused phase, handing back the window's buffers.
    pub(crate) fn resume(&mut self) -> Option<PauseWindow> {
        let Phase::Paused { no_render } = self.phase else {
            return None;
        };
        self.phase = Phase::Active;
        Some(PauseWindow {
            cached: std::mem::take(&mut self.cached),
            deferred: std::mem::take(&mut self.deferred),
            no_render,
        })
    }

    /// Enter the terminal phase. Returns `false` if already disposed.
    pub(crate) fn dispose(&mut self) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.phase = Phase::Disposed;
        self.cached.clear();
        self.incoming.clear();
        self.deferred.clear();
        true
    }

    /// Entries of `patch` that would change a committed value.
    pub(crate) fn committed_changes(&self, patch: FieldChanges, fields: &[String]) -> FieldChanges {
        patch
            .into_iter()
            .filter(|(field, value)| {
                fields.contains(field) && self.mirror.get(field) != Some(value)
            })
            .collect()
    }

    /// Stage `patch` into the pause buffer.
    ///
    /// Entries for unwatched fields or equal to the field's effective value
    /// are dropped. Returns what was staged.
    pub(crate) fn stage(&mut self, patch: FieldChanges, fields: &[String]) -> FieldChanges {
        let staged: FieldChanges = patch
            .into_iter()
            .filter(|(field, value)| fields.contains(field) && self.effective(field) != Some(value))
            .collect();
        for (field, value) in &staged {
            self.cached.insert(field.clone(), value.clone());
        }
        staged
    }

    /// Record committed values in the mirror.
    pub(crate) fn commit(&mut self, changes: &FieldChanges) {
        for (field, value) in changes {
            self.mirror.insert(field.clone(), value.clone());
        }
    }

    /// Stash a routed store change into the mirror.
    ///
    /// `None` means the key was removed: the field leaves the mirror and is
    /// delivered as `null`. Returns `false` if the mirror already agrees.
    pub(crate) fn stash(&mut self, field: &str, value: Option<Value>) -> bool {
        if self.is_disposed() {
            return false;
        }
        match value {
            Some(value) => {
                if self.mirror.get(field) == Some(&value) {
                    return false;
                }
                self.mirror.insert(field.to_string(), value.clone());
                self.incoming.insert(field.to_string(), value);
            }
            None => {
                if self.mirror.remove(field).is_none() {
                    return false;
                }
                self.incoming.insert(field.to_string(), Value::Null);
            }
        }
        true
    }

    /// Take the stashed changes for delivery.
    ///
    /// While rendering is paused they move to the deferred buffer instead
    /// and `None` is returned.
    pub(crate) fn release(&mut self) -> Option<FieldChanges> {
        let incoming = std::mem::take(&mut self.incoming);
        if incoming.is_empty() {
            return None;
        }
        if self.is_render_paused() {
            self.deferred.extend(incoming);
            return None;
        }
        Some(incoming)
    }
}
