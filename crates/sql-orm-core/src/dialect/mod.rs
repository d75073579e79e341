// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! The dialect translator (C2).
//!
//! A [`Dialect`] maps abstract SQL commands and type-specific value
//! representations onto one of the five supported concrete SQL variants.
//! Value marshalling itself (`to_db`/`from_db`) is dialect-independent and
//! delegates to [`crate::codec`]; the translator is the facade spec §4.2
//! names, not a second implementation of the codec rules.

mod command;
mod profiles;
mod rewrite;

pub use command::{CommandKind, ObjectKind, TriggerEvent, substitute};
pub use profiles::{Dialect, TopClause};
pub use rewrite::{FunctionSnippet, SnippetTable};

use crate::{
    codec::{self, Value},
    error::OrmResult,
    registry::HostType
};

impl Dialect {
    /// Marshal a host value to its driver-level representation. See
    /// [`codec::to_db`].
    pub fn to_db(self, value: &Value, host_type: HostType, compress_if_blob: bool) -> OrmResult<Value> {
        codec::to_db(value, host_type, compress_if_blob)
    }

    /// Marshal a driver-level value back to its host representation. See
    /// [`codec::from_db`].
    pub fn from_db(self, value: &Value, target_type: HostType) -> OrmResult<Value> {
        codec::from_db(value, target_type)
    }

    /// Apply the function-snippet rewriter for this dialect to `sql`.
    pub fn rewrite(self, sql: &str) -> String {
        self.snippet_table().rewrite(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_db_and_from_db_delegate_to_codec() {
        let d = Dialect::PostgreSql;
        let db = d.to_db(&Value::Enum(3), HostType::Enum, false).unwrap();
        assert_eq!(db, Value::I32(3));
        let back = d.from_db(&db, HostType::Enum).unwrap();
        assert_eq!(back, Value::Enum(3));
    }

    #[test]
    fn rewrite_applies_dialect_snippets() {
        let out = Dialect::MsSql.rewrite("WHERE d = #TODAY#");
        assert!(out.contains("GETDATE"));
    }
}
