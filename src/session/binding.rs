//! session::binding
//!
//! Declares what a session watches and seeds it.
//!
//! # Seeding
//!
//! For each field, in declaration order:
//! - if a default is given at the field's position and the key is absent
//!   (or defaults are enforced), the default is written to the store and
//!   mirrored
//! - otherwise the store's current value, if any, is mirrored
//!
//! All seeded writes form one action, checked against locks up front.
//! Binding is the only read path that may write to the store.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use statepool::engine::Pool;
//! use statepool::session::Binding;
//!
//! let pool = Pool::default();
//! let session = pool
//!     .require_consumable(Binding::new(["A"]).fields(["v"]).defaults([json!(5)]))
//!     .unwrap();
//!
//! assert_eq!(session.get("v"), Some(json!(5)));
//! assert_eq!(pool.get(["A", "v"]), Some(json!(5)));
//! ```

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::core::store::Origin;
use crate::core::types::{NamespacePath, StoreKey};
use crate::engine::{Pool, PoolError};

use super::consumer::{Consumer, RenderTarget};
use super::{Consumable, FieldChanges, SessionInner};

/// Builder for a consumer session.
pub struct Binding {
    namespace: NamespacePath,
    fields: Vec<String>,
    defaults: Vec<Value>,
    enforce_defaults: Option<bool>,
    consumer: Consumer,
}

impl Binding {
    /// Bind under `namespace`, watching nothing yet.
    pub fn new(namespace: impl Into<NamespacePath>) -> Self {
        Self {
            namespace: namespace.into(),
            fields: Vec::new(),
            defaults: Vec::new(),
            enforce_defaults: None,
            consumer: Consumer::Passive,
        }
    }

    /// Watch `field`. Repeated names are ignored.
    pub fn field(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.fields.contains(&field) {
            self.fields.push(field);
        }
        self
    }

    /// Watch every field in `fields`, keeping first occurrences.
    pub fn fields<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        fields
            .into_iter()
            .fold(self, |binding, field| binding.field(field))
    }

    /// Default values, aligned by position with the watched fields.
    ///
    /// Fields past the end of `values` have no default.
    pub fn defaults<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.defaults = values.into_iter().map(Into::into).collect();
        self
    }

    /// Seed defaults even if the store already holds values.
    ///
    /// Falls back to `bindings.enforce_defaults` from the pool config.
    pub fn enforce_defaults(mut self, enforce: bool) -> Self {
        self.enforce_defaults = Some(enforce);
        self
    }

    /// Deliver changes to a render target.
    pub fn render(mut self, target: impl RenderTarget + 'static) -> Self {
        self.consumer = Consumer::Render(Box::new(target));
        self
    }

    /// Deliver changes to a callback.
    pub fn listen(mut self, listener: impl FnMut(&FieldChanges) + 'static) -> Self {
        self.consumer = Consumer::Function(Box::new(listener));
        self
    }

    /// The namespace fields are resolved under.
    pub fn namespace(&self) -> &NamespacePath {
        &self.namespace
    }

    /// The watched fields, deduplicated, in declaration order.
    pub fn field_names(&self) -> &[String] {
        &self.fields
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("namespace", &self.namespace)
            .field("fields", &self.fields)
            .field("defaults", &self.defaults)
            .field("enforce_defaults", &self.enforce_defaults)
            .field("consumer", &self.consumer)
            .finish()
    }
}

/// Seed the store, create the session, and add it to the graph.
pub(crate) fn bind(pool: &Pool, binding: Binding) -> Result<Consumable, PoolError> {
    let Binding {
        namespace,
        fields,
        defaults,
        enforce_defaults,
        mut consumer,
    } = binding;
    let enforce = enforce_defaults.unwrap_or(pool.config().bindings.enforce_defaults);

    let keys: Vec<(StoreKey, String)> = fields
        .iter()
        .map(|field| (StoreKey::encode(&namespace.child(field.as_str())), field.clone()))
        .collect();

    let mut mirror = FieldChanges::new();
    let mut seeds = Vec::new();
    for (index, (key, field)) in keys.iter().enumerate() {
        match defaults.get(index) {
            Some(default) if enforce || !pool.contains_key(key) => {
                mirror.insert(field.clone(), default.clone());
                seeds.push((key.clone(), Some(default.clone())));
            }
            _ => {
                if let Some(value) = pool.value_of(key) {
                    mirror.insert(field.clone(), value);
                }
            }
        }
    }

    let id = pool.next_consumer_id();
    // Attached inside the seeding action, so the closing cycle and its
    // follow-ups route to the new session.
    let attached = pool.batch(|| {
        if !seeds.is_empty() {
            pool.write_all(seeds, Origin::Consumer(id))?;
        }

        consumer.seed(&mirror);
        let session = Rc::new(SessionInner::new(
            id,
            namespace,
            fields,
            pool.clone(),
            mirror,
            consumer,
        ));
        pool.attach(id, Rc::downgrade(&session), &keys);
        Ok(session)
    });
    let session = match attached {
        Ok(session) => session,
        Err(err) => {
            pool.detach(id);
            return Err(err);
        }
    };

    tracing::debug!(
        consumer = %id,
        namespace = %session.namespace(),
        fields = keys.len(),
        "session bound"
    );
    Ok(Consumable::from_inner(session))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fields_are_deduplicated_in_order() {
        let binding = Binding::new(["A"]).fields(["b", "a", "b"]).field("a").field("c");
        assert_eq!(binding.field_names(), ["b", "a", "c"]);
    }

    #[test]
    fn defaults_align_with_deduplicated_fields() {
        let pool = Pool::default();
        let session = pool
            .require_consumable(
                Binding::new(["A"])
                    .fields(["x", "x", "y"])
                    .defaults([json!(1), json!(2)]),
            )
            .unwrap();

        assert_eq!(session.get("x"), Some(json!(1)));
        assert_eq!(session.get("y"), Some(json!(2)));
    }

    #[test]
    fn existing_value_wins_over_default() {
        let pool = Pool::default();
        pool.set(["A", "v"], 9).unwrap();

        let session = pool
            .require_consumable(Binding::new(["A"]).field("v").defaults([5]))
            .unwrap();
        assert_eq!(session.get("v"), Some(json!(9)));
        assert_eq!(pool.get(["A", "v"]), Some(json!(9)));
    }

    #[test]
    fn enforced_default_overwrites() {
        let pool = Pool::default();
        pool.set(["A", "v"], 9).unwrap();

        let session = pool
            .require_consumable(
                Binding::new(["A"])
                    .field("v")
                    .defaults([5])
                    .enforce_defaults(true),
            )
            .unwrap();
        assert_eq!(session.get("v"), Some(json!(5)));
        assert_eq!(pool.get(["A", "v"]), Some(json!(5)));
    }

    #[test]
    fn field_without_default_or_value_is_absent() {
        let pool = Pool::default();
        let session = pool
            .require_consumable(Binding::new(["A"]).fields(["v", "w"]).defaults([1]))
            .unwrap();
        assert_eq!(session.get("w"), None);
        assert!(!pool.has(["A", "w"]));
        assert!(pool.is_watched(["A", "w"]));
    }

    #[test]
    fn locked_seed_fails_without_seeding_anything() {
        let pool = Pool::default();
        let _handle = pool.lock(["A", "b"]).unwrap();

        let result = pool.require_consumable(
            Binding::new(["A"]).fields(["a", "b"]).defaults([1, 2]),
        );

        assert!(matches!(result, Err(PoolError::LockViolation(_))));
        assert!(!pool.has(["A", "a"]));
        assert_eq!(pool.consumer_count(), 0);
    }

    #[test]
    fn seeding_is_one_cycle() {
        let pool = Pool::default();
        let cycles = Rc::new(std::cell::Cell::new(0));
        let sink = Rc::clone(&cycles);
        pool.subscribe_to_changes(move |_| {
            sink.set(sink.get() + 1);
            Ok(())
        });

        let _session = pool
            .require_consumable(Binding::new(["A"]).fields(["a", "b", "c"]).defaults([1, 2, 3]))
            .unwrap();
        assert_eq!(cycles.get(), 1);
    }

    #[test]
    fn follow_up_write_to_a_seeded_key_reaches_the_session() {
        let pool = Pool::default();
        let writer = pool.clone();
        pool.subscribe_to_changes(move |changes| {
            let key = NamespacePath::from(["A", "v"]);
            if changes.get(&key) == Some(Some(&json!(5))) {
                writer.set(key, 99)?;
            }
            Ok(())
        });

        let session = pool
            .require_consumable(Binding::new(["A"]).field("v").defaults([5]))
            .unwrap();

        assert_eq!(pool.get(["A", "v"]), Some(json!(99)));
        assert_eq!(session.get("v"), Some(json!(99)));
    }

    #[test]
    fn subscriber_error_while_seeding_leaves_no_session() {
        let pool = Pool::default();
        pool.subscribe_to_changes(|_| anyhow::bail!("rejected"));

        let result = pool.require_consumable(Binding::new(["A"]).field("v").defaults([5]));

        assert!(matches!(result, Err(PoolError::Subscriber { .. })));
        assert_eq!(pool.get(["A", "v"]), Some(json!(5)));
        assert_eq!(pool.consumer_count(), 0);
        assert!(!pool.is_watched(["A", "v"]));
    }
}
