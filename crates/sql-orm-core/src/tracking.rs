// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! Entity tracking base (C8): dirty-field tracking with rollback.
//!
//! [`ChangeBuffer`] is the mutation primitive backing every generated
//! setter. It records, for each property first mutated since the last
//! `commit`, the pre-change value in an insertion-ordered map.

use indexmap::IndexMap;

use crate::codec::Value;

/// Per-instance tracked-mutation buffer.
#[derive(Debug, Default, Clone)]
pub struct ChangeBuffer {
    changes: IndexMap<String, Value>,
    dirty: bool,
    suppress: bool
}

/// Normalizes a string `Value::Null` read as the empty string, per spec §3.
fn normalize(value: &Value) -> Value {
    match value {
        Value::Null => Value::String(String::new()),
        other => other.clone()
    }
}

impl ChangeBuffer {
    /// A fresh, empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if any field has been mutated since the last `commit`.
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The pre-change values of every mutated field, in mutation order.
    pub fn changed_properties(&self) -> &IndexMap<String, Value> {
        &self.changes
    }

    /// Record a mutation of `field` from `old` to `new`.
    ///
    /// A no-op when `old == new` after normalization. While rollback is in
    /// progress (see [`ChangeBuffer::rollback`]) this never records or
    /// dirties, matching the "inverse writes are not themselves tracked"
    /// rule of spec §4.8.
    pub fn set(&mut self, field: &str, old: &Value, new: &Value) {
        let old = normalize(old);
        let new = normalize(new);
        if old == new {
            return;
        }
        if self.suppress {
            return;
        }
        if !self.changes.contains_key(field) {
            self.changes.insert(field.to_string(), old);
        }
        self.dirty = true;
    }

    /// Record a mutation without ever tracking it (the `unbuffered` variant
    /// of spec §4.8); used for fields that should never participate in
    /// dirty-tracking (e.g. delayed-loaded-flag bookkeeping).
    pub fn set_unbuffered(&mut self, _field: &str, _old: &Value, _new: &Value) {
        // Intentionally a no-op on the buffer: the caller still performs
        // the underlying assignment; only tracking is skipped.
    }

    /// Toggle rollback-suppression directly, for callers (like the entity
    /// capability trait's default `rollback`) that must apply inverse
    /// writes through their own setter rather than through a closure held
    /// alongside a borrow of `self`.
    pub fn set_suppressed(&mut self, value: bool) {
        self.suppress = value;
    }

    /// Clear the change map and the dirty flag.
    pub fn commit(&mut self) {
        self.changes.clear();
        self.dirty = false;
    }

    /// Re-apply each buffered old value via `apply`, under rollback
    /// suppression, then clear the buffer.
    pub fn rollback(&mut self, mut apply: impl FnMut(&str, &Value)) {
        self.suppress = true;
        for (field, old_value) in self.changes.iter() {
            apply(field, old_value);
        }
        self.suppress = false;
        self.changes.clear();
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_when_values_equal() {
        let mut buf = ChangeBuffer::new();
        buf.set("name", &Value::String("Ada".into()), &Value::String("Ada".into()));
        assert!(!buf.is_dirty());
        assert!(buf.changed_properties().is_empty());
    }

    #[test]
    fn first_mutation_is_recorded_once() {
        let mut buf = ChangeBuffer::new();
        buf.set("name", &Value::String("Ada".into()), &Value::String("Ada L".into()));
        buf.set("name", &Value::String("Ada L".into()), &Value::String("Ada Lovelace".into()));
        assert!(buf.is_dirty());
        assert_eq!(buf.changed_properties().len(), 1);
        assert_eq!(
            buf.changed_properties().get("name"),
            Some(&Value::String("Ada".into()))
        );
    }

    #[test]
    fn commit_clears_everything() {
        let mut buf = ChangeBuffer::new();
        buf.set("name", &Value::String("".into()), &Value::String("Ada".into()));
        buf.commit();
        assert!(!buf.is_dirty());
        assert!(buf.changed_properties().is_empty());
    }

    #[test]
    fn rollback_restores_pre_sequence_values() {
        let mut buf = ChangeBuffer::new();
        buf.set("name", &Value::String("Ada".into()), &Value::String("Ada L".into()));
        buf.set("age", &Value::I64(28), &Value::I64(29));

        let mut restored = Vec::new();
        buf.rollback(|field, old| restored.push((field.to_string(), old.clone())));

        assert!(!buf.is_dirty());
        assert!(buf.changed_properties().is_empty());
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0], ("name".to_string(), Value::String("Ada".into())));
        assert_eq!(restored[1], ("age".to_string(), Value::I64(28)));
    }

    #[test]
    fn null_string_normalizes_to_empty() {
        let mut buf = ChangeBuffer::new();
        buf.set("name", &Value::Null, &Value::String(String::new()));
        assert!(!buf.is_dirty());
    }
}
