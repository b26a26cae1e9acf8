//! engine::subscribers
//!
//! Global change subscribers.
//!
//! Subscribers are kept in subscription order. Callbacks are stored behind
//! `Rc` so the reactor can snapshot the list and release the registry before
//! invoking them: a callback may subscribe or unsubscribe (itself included)
//! without invalidating the iteration.

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::diff::ChangeSet;
use crate::core::types::SubscriptionId;

/// A global change callback.
pub type ChangeCallback = dyn FnMut(ChangeSet) -> anyhow::Result<()>;

pub(crate) type SharedCallback = Rc<RefCell<Box<ChangeCallback>>>;

#[derive(Default)]
pub(crate) struct Subscribers {
    next_id: u64,
    entries: Vec<(SubscriptionId, SharedCallback)>,
}

impl Subscribers {
    pub(crate) fn add(&mut self, callback: Box<ChangeCallback>) -> SubscriptionId {
        let id = SubscriptionId::new(self.next_id);
        self.next_id += 1;
        self.entries.push((id, Rc::new(RefCell::new(callback))));
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// The current subscribers, detached from the registry.
    pub(crate) fn snapshot(&self) -> Vec<(SubscriptionId, SharedCallback)> {
        self.entries
            .iter()
            .map(|(id, callback)| (*id, Rc::clone(callback)))
            .collect()
    }
}
