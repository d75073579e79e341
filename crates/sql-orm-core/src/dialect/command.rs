// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! Command kinds and the placeholder-substitution helper shared by every
//! dialect's command template table.

use crate::registry::HostType;

/// The kind of schema object a `drop`/`create`/`exist` command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// A table.
    Table,
    /// A view.
    View,
    /// An index.
    Index,
    /// A trigger.
    Trigger,
    /// A stored procedure.
    Procedure,
    /// A foreign-key constraint.
    Constraint,
    /// A single column.
    Field
}

/// A trigger firing point, used with [`super::Dialect::trigger_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerEvent {
    /// `BEFORE INSERT`.
    BeforeInsert,
    /// `BEFORE UPDATE`.
    BeforeUpdate,
    /// `AFTER INSERT`.
    AfterInsert,
    /// `AFTER UPDATE`.
    AfterUpdate,
    /// `BEFORE DELETE`.
    BeforeDelete,
    /// `AFTER DELETE`.
    AfterDelete
}

/// Every textual command template a dialect can be asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `DROP <object>`.
    Drop(ObjectKind),
    /// `CREATE <object>`.
    Create(ObjectKind),
    /// `<object> exists` probe.
    Exist(ObjectKind),
    /// `SELECT #FIELDS# FROM #TABLENAME#` (full projection, no cap).
    SelectFull,
    /// A capped `SELECT`, dialect-specific cap placement.
    SelectTop,
    /// `SELECT ... WHERE #FIELDNAMEKEY# = ?`.
    SelectByKey,
    /// `SELECT COUNT(#NAME#) FROM #TABLENAME#`.
    SelectCount,
    /// `SELECT SUM(#NAME#) FROM #TABLENAME#`.
    SelectSum,
    /// `SELECT 1 ... WHERE #FIELDNAMEKEY# = ?` existence probe.
    SelectExistByKey,
    /// `SELECT #NAME# FROM #TABLENAME# WHERE #FIELDNAMEKEY# = ?` (single
    /// value, used for delayed-field loading).
    LoadSingleValue,
    /// `INSERT INTO #TABLENAME# (#FIELDS#) VALUES (#VALUES#)`.
    Insert,
    /// `UPDATE #TABLENAME# SET #PAIRS# WHERE #FIELDNAMEKEY# = ?`.
    Update,
    /// `DELETE FROM #TABLENAME# WHERE #FIELDNAMEKEY# = ?`.
    Delete,
    /// Column definition for a given host type.
    FieldDef(HostType),
    /// Statement wrapper emitted before any DDL.
    BeforeAlterSchema,
    /// Statement wrapper emitted after any DDL.
    AfterAlterSchema,
    /// Enable a trigger.
    EnableTrigger,
    /// Disable a trigger.
    DisableTrigger,
    /// `BEFORE INSERT` trigger body creating the row's key/timestamps.
    TriggerBeforeInsertBody,
    /// `BEFORE UPDATE` trigger body refreshing the changed-timestamp.
    TriggerBeforeUpdateBody,
    /// Probe for a string column's live maximum length.
    FieldLength,
    /// Widen a string column to the declared length.
    AlterFieldLength(HostType)
}

/// Replace every `#TOKEN#` occurrence in `template` with its value from
/// `vars`. Unreferenced vars are ignored; unmatched tokens are left as-is.
pub fn substitute(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        let token = format!("#{}#", name);
        out = out.replace(&token, value);
    }
    out
}
