//! engine::reactor
//!
//! The reactor cycle: diff, notify subscribers, dispatch to sessions.
//!
//! # Architecture
//!
//! A cycle runs when an action closes while the pool is listening:
//!
//! 1. Take the action's write journal and diff it against the live store
//! 2. Hand every global subscriber its own copy of the change set
//! 3. Route each journaled key through the dependency graph to the
//!    sessions that watch it, stash the live values in their mirrors, then
//!    release every touched session exactly once
//!
//! An action whose writes all cancel out skips step 2 but still runs step 3:
//! a session may have echoed a value that a later write in the same action
//! took back.
//!
//! Writes performed by callbacks during steps 2 and 3 land in a fresh
//! journal. The runner loops until no journal is pending, so those writes
//! get their own follow-up cycle instead of a nested one.
//!
//! # Echo paths
//!
//! A session that writes its own fields already delivered the change to
//! its consumer directly. Dispatch skips a session for every key whose last
//! writer in the action was that session; all other sessions fall back to
//! comparing the live value against their mirror.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::core::diff::ChangeSet;
use crate::core::store::{Journal, Origin};
use crate::core::types::ConsumerId;
use crate::session::SessionInner;

use super::{PoolError, PoolInner};

/// Marks a cycle as running for its lifetime.
struct CycleGuard<'a> {
    running: &'a Cell<bool>,
}

impl<'a> CycleGuard<'a> {
    fn enter(running: &'a Cell<bool>) -> Option<Self> {
        if running.replace(true) {
            None
        } else {
            Some(Self { running })
        }
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.running.set(false);
    }
}

/// Run cycles until no writes are pending.
///
/// Returns immediately if a cycle is already running on this pool; the
/// running loop picks the new writes up.
///
/// # Errors
///
/// Returns the first subscriber failure. Dispatch and follow-up cycles still
/// run after a failure.
pub(crate) fn run(pool: &PoolInner) -> Result<(), PoolError> {
    let Some(_guard) = CycleGuard::enter(&pool.cycle_running) else {
        return Ok(());
    };

    let mut first_error = None;
    loop {
        let journal = pool.store.borrow_mut().take_journal();
        if journal.is_empty() {
            break;
        }
        if !pool.listening.get() {
            tracing::trace!(keys = journal.len(), "pool stopped mid-cycle, dropping writes");
            continue;
        }

        let changes = journal.changes(&pool.store.borrow());
        if changes.is_empty() {
            let touched = dispatch(pool, &journal);
            tracing::trace!(keys = journal.len(), touched, "action restored every key, no cycle");
            continue;
        }

        let notified = notify_subscribers(pool, &changes);
        let touched = dispatch(pool, &journal);

        if pool.config.logging.log_cycles {
            tracing::debug!(
                changes = changes.len(),
                subscribers = pool.subscribers.borrow().len(),
                touched,
                "reactor cycle"
            );
        } else {
            tracing::trace!(changes = changes.len(), touched, "reactor cycle");
        }

        if let Err(err) = notified {
            first_error.get_or_insert(err);
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Deliver `changes` to every global subscriber, stopping at the first
/// failure.
fn notify_subscribers(pool: &PoolInner, changes: &ChangeSet) -> Result<(), PoolError> {
    let subscribers = pool.subscribers.borrow().snapshot();

    for (id, callback) in subscribers {
        let Ok(mut callback) = callback.try_borrow_mut() else {
            tracing::trace!(subscription = %id, "subscriber busy, skipped");
            continue;
        };
        let callback: &mut super::subscribers::ChangeCallback = &mut **callback;
        callback(changes.clone()).map_err(|error| PoolError::Subscriber { id, error })?;
    }
    Ok(())
}

/// Route every journaled key to the sessions watching it. Returns the
/// number of sessions touched.
///
/// Sessions are handed the live store value. The last writer of a key is
/// skipped since its mirror already holds that value; every other session
/// drops values its mirror agrees with.
fn dispatch(pool: &PoolInner, journal: &Journal) -> usize {
    let mut touched: BTreeMap<ConsumerId, Rc<SessionInner>> = BTreeMap::new();
    let mut dead = Vec::new();

    for (key, origin) in journal.writers() {
        let value = pool.store.borrow().get(key).cloned();
        let routes: Vec<_> = pool
            .graph
            .borrow()
            .routes(key)
            .into_iter()
            .map(|route| (route.consumer, route.field.to_string(), route.data.clone()))
            .collect();

        for (id, field, session) in routes {
            if origin == Origin::Consumer(id) {
                continue;
            }
            let Some(session) = session.upgrade() else {
                dead.push(id);
                continue;
            };
            if session.stash(&field, value.clone()) {
                tracing::trace!(consumer = %id, key = %key, "dispatch");
                touched.entry(id).or_insert(session);
            }
        }
    }

    if !dead.is_empty() {
        let mut graph = pool.graph.borrow_mut();
        for id in dead {
            if graph.remove_consumer(id).is_some() {
                tracing::trace!(consumer = %id, "pruned dropped session");
            }
        }
    }

    let count = touched.len();
    for session in touched.into_values() {
        session.release();
    }
    count
}
