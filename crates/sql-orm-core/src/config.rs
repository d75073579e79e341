// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! Configuration (spec §6): the data contract the connection runtime and
//! schema engine depend on. The concrete loader (environment, files, a
//! secrets manager) is explicitly out of scope; this module only defines
//! the struct and a convenience `figment`-backed environment loader,
//! mirroring the layered-config pattern of the teacher's sibling
//! workspaces.

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;

/// How a save resolves a conflicting concurrent update (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictMode {
    /// The first writer to commit wins; later writers fail with
    /// [`crate::error::OrmError::Conflict`].
    FirstWins,
    /// The last writer always wins; no conflict is ever raised.
    LastWins
}

/// The configuration record of spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    /// The logical database name.
    pub database_name: String,
    /// The driver-level connection string.
    pub connection_string: String,
    /// Which SQL variant to target.
    pub dialect: Dialect,
    /// How optimistic conflicts on save are resolved.
    pub conflict_mode: ConflictMode,
    /// Whether the schema engine may drop live columns with no declared
    /// counterpart.
    pub allow_drop_columns: bool,
    /// Entity-type names registered as base tables, checked before any
    /// dependent entity.
    pub base_table_types: Vec<String>,
    /// Entity-type names registered as base views.
    pub base_view_types: Vec<String>
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            database_name: String::new(),
            connection_string: String::new(),
            dialect: Dialect::PostgreSql,
            conflict_mode: ConflictMode::FirstWins,
            allow_drop_columns: false,
            base_table_types: Vec::new(),
            base_view_types: Vec::new()
        }
    }
}

impl Configuration {
    /// Load from the `SQL_ORM_` prefixed environment, layered over
    /// [`Configuration::default`]. Requires the `config-file` feature.
    #[cfg(feature = "config-file")]
    pub fn from_env() -> crate::error::OrmResult<Self> {
        use figment::{
            Figment,
            providers::{Env, Serialized}
        };

        Figment::from(Serialized::defaults(Self::default()))
            .merge(Env::prefixed("SQL_ORM_"))
            .extract()
            .map_err(|e| crate::error::OrmError::structural(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_first_wins_postgres_no_drop() {
        let cfg = Configuration::default();
        assert_eq!(cfg.dialect, Dialect::PostgreSql);
        assert_eq!(cfg.conflict_mode, ConflictMode::FirstWins);
        assert!(!cfg.allow_drop_columns);
    }
}
