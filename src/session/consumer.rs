//! session::consumer
//!
//! The party a session delivers changes to.
//!
//! A session has exactly one consumer, fixed at binding time:
//!
//! - [`Consumer::Render`]: a render target (a UI component). Deliveries go
//!   through [`RenderTarget::set_state`] once mounted and
//!   [`RenderTarget::seed_state`] before that.
//! - [`Consumer::Function`]: a plain callback invoked with each change set.
//! - [`Consumer::Passive`]: nobody; the session is read through its mirror.

use std::fmt;

use super::FieldChanges;

/// A UI unit that renders a session's state.
pub trait RenderTarget {
    /// Merge `changes` into the target's state and schedule a repaint.
    fn set_state(&mut self, changes: &FieldChanges);

    /// Merge `changes` into the target's state without repainting.
    ///
    /// Used before the target is mounted.
    fn seed_state(&mut self, changes: &FieldChanges);
}

/// Delivery surface of a session.
#[derive(Default)]
pub enum Consumer {
    #[default]
    Passive,
    Function(Box<dyn FnMut(&FieldChanges)>),
    Render(Box<dyn RenderTarget>),
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Consumer::Passive => f.write_str("Passive"),
            Consumer::Function(_) => f.write_str("Function"),
            Consumer::Render(_) => f.write_str("Render"),
        }
    }
}

/// Which consumer modes a delivery is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Channel {
    /// Render targets only, e.g. previews of pending changes.
    Render,
    /// Function consumers only.
    Function,
    /// Every consumer mode.
    All,
}

/// A queued delivery and the callback to run once it has been handled.
pub(crate) struct Delivery {
    pub(crate) channel: Channel,
    pub(crate) changes: FieldChanges,
    pub(crate) callback: Option<Box<dyn FnOnce()>>,
}

impl Consumer {
    pub(crate) fn is_render(&self) -> bool {
        matches!(self, Consumer::Render(_))
    }

    /// Hand `changes` to the consumer if `channel` targets its mode.
    ///
    /// Returns whether the consumer took the delivery.
    pub(crate) fn accept(&mut self, channel: Channel, changes: &FieldChanges, mounted: bool) -> bool {
        match (self, channel) {
            (Consumer::Render(target), Channel::Render | Channel::All) => {
                if mounted {
                    target.set_state(changes);
                } else {
                    target.seed_state(changes);
                }
                true
            }
            (Consumer::Function(f), Channel::Function | Channel::All) => {
                (**f)(changes);
                true
            }
            _ => false,
        }
    }

    /// Seed a render target with the initial mirror.
    pub(crate) fn seed(&mut self, state: &FieldChanges) {
        if let Consumer::Render(target) = self {
            target.seed_state(state);
        }
    }
}
