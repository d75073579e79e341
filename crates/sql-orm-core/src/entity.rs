// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! The data-object capability set (spec §3): the trait every persisted
//! entity instance implements, normally via `#[derive(Entity)]`. Captures
//! identity (primary key, created/changed timestamps, archived flag),
//! tracked mutation with rollback (C8), and delayed-field load state.

use std::collections::HashSet;

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::{codec::Value, error::OrmResult, registry::TypeDesc, tracking::ChangeBuffer};

/// Everything a persisted entity instance must expose to the connection
/// runtime (C5) and the tracking base (C8).
pub trait DataObject {
    /// The entity's registered metadata.
    fn type_desc(&self) -> &'static TypeDesc;

    /// The primary key. `Uuid::nil()` means "not yet persisted".
    fn primary_key(&self) -> Uuid;
    /// Assign the primary key without going through tracked mutation (keys
    /// are generated once on insert, never user-edited afterwards).
    fn set_primary_key(&mut self, value: Uuid);

    /// The creation timestamp.
    fn created(&self) -> NaiveDateTime;
    /// Assign the creation timestamp.
    fn set_created(&mut self, value: NaiveDateTime);

    /// The last-changed timestamp.
    fn changed(&self) -> NaiveDateTime;
    /// Assign the last-changed timestamp.
    fn set_changed(&mut self, value: NaiveDateTime);

    /// The archived/soft-delete flag, if the entity declares one.
    fn archived(&self) -> bool {
        false
    }
    /// Assign the archived flag. A no-op for entities with no archive field.
    fn set_archived(&mut self, _value: bool) {}

    /// The tracking buffer backing `dirty`/`commit`/`rollback`.
    fn change_buffer(&self) -> &ChangeBuffer;
    /// Mutable access to the tracking buffer.
    fn change_buffer_mut(&mut self) -> &mut ChangeBuffer;

    /// Read a field's current value by declared name, for row
    /// materialization and change logging.
    fn field_value(&self, name: &str) -> OrmResult<Value>;
    /// Assign a field's value by declared name, routed through tracked
    /// mutation (used by `set_tracked` and row materialization on load,
    /// which commits immediately afterwards).
    fn set_field_value(&mut self, name: &str, value: Value) -> OrmResult<()>;

    /// `true` if `field` is declared `delayed` and has been loaded on this
    /// instance.
    fn is_delayed_loaded(&self, field: &str) -> bool;
    /// Record that `field` has been loaded (or, for a write, is considered
    /// loaded going forward).
    fn mark_delayed_loaded(&mut self, field: &str);
    /// Clear every delayed-field loaded flag on this instance.
    fn reset_delayed_loaded(&mut self);

    /// Invoked once, after every column of a freshly materialized row has
    /// been assigned and the change buffer committed.
    fn after_load(&mut self) {}
    /// Invoked at the start of `save`, before insert/update is determined.
    fn before_save(&mut self) {}
    /// Invoked after a successful delete.
    fn after_delete(&mut self) {}

    /// `true` if any field has been mutated since the last `commit`.
    fn is_dirty(&self) -> bool {
        self.change_buffer().is_dirty()
    }

    /// The pre-change values of every mutated field, in mutation order.
    fn changed_properties(&self) -> &IndexMap<String, Value> {
        self.change_buffer().changed_properties()
    }

    /// Clear the tracked-change map without touching field values.
    fn commit(&mut self) {
        self.change_buffer_mut().commit();
    }

    /// Re-apply every buffered old value through `set_field_value`, then
    /// clear the buffer. Inverse writes are suppressed so they are not
    /// themselves re-tracked (spec §4.8).
    fn rollback(&mut self) {
        let pending: Vec<(String, Value)> = self
            .change_buffer()
            .changed_properties()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        self.change_buffer_mut().set_suppressed(true);
        for (field, old) in &pending {
            let _ = self.set_field_value(field, old.clone());
        }
        self.change_buffer_mut().set_suppressed(false);
        self.change_buffer_mut().commit();
    }

    /// Assign `value` to `field` through tracked mutation (dirties the
    /// instance if it changes the stored value).
    fn set_tracked(&mut self, field: &str, value: Value) -> OrmResult<()> {
        self.set_field_value(field, value)
    }

    /// Assign `value` to `field` without ever tracking the mutation.
    fn set_untracked(&mut self, field: &str, value: Value) -> OrmResult<()> {
        self.change_buffer_mut().set_suppressed(true);
        let result = self.set_field_value(field, value);
        self.change_buffer_mut().set_suppressed(false);
        result
    }
}

/// Bookkeeping helper for delayed-field loaded flags, composed into
/// generated entity structs alongside a [`ChangeBuffer`].
#[derive(Debug, Default, Clone)]
pub struct DelayedLoadState {
    loaded: HashSet<String>
}

impl DelayedLoadState {
    /// An empty state: no delayed field considered loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if `field` has been marked loaded.
    pub fn is_loaded(&self, field: &str) -> bool {
        self.loaded.contains(field)
    }

    /// Mark `field` loaded.
    pub fn mark_loaded(&mut self, field: &str) {
        self.loaded.insert(field.to_string());
    }

    /// Clear every loaded flag.
    pub fn reset(&mut self) {
        self.loaded.clear();
    }
}
