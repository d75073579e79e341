// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! The error taxonomy of the mapper.
//!
//! Every fallible operation across the registry, dialect translator,
//! query builder, connection runtime and schema engine returns [`OrmError`].
//! Nothing in this crate retries on error; callers decide.

use std::fmt;

/// Top-level error kind, one variant per taxonomy entry.
#[derive(Debug, thiserror::Error)]
pub enum OrmError {
    /// Bad entity declaration: missing role, non-unique id/name, or a
    /// table declared as a view (or vice versa). Fatal at registration.
    #[error("structural error: {0}")]
    Structural(String),

    /// The schema engine could not create or alter a live database object.
    #[error("schema error: {message} (statement: {statement})")]
    Schema {
        /// What went wrong.
        message: String,
        /// The DDL text that failed.
        statement: String
    },

    /// No driver connection is available, or a transaction already exists.
    #[error("connection error: {0}")]
    Connection(String),

    /// A transaction commit or rollback failed.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// An optimistic conflict was detected on save under `FirstWins`.
    #[error("conflict: stored changed-timestamp is newer than the loaded instance")]
    Conflict,

    /// Marshalling between a host value and a driver value failed.
    #[error("conversion error: cannot convert {source_type} to {target_type}")]
    Conversion {
        /// The type being converted from.
        source_type: String,
        /// The type being converted to.
        target_type: String
    },

    /// Malformed query-builder usage.
    #[error("query error: {0}")]
    Query(String)
}

impl OrmError {
    /// Construct a [`OrmError::Structural`] error.
    pub fn structural(msg: impl fmt::Display) -> Self {
        Self::Structural(msg.to_string())
    }

    /// Construct a [`OrmError::Schema`] error.
    pub fn schema(message: impl fmt::Display, statement: impl Into<String>) -> Self {
        Self::Schema {
            message: message.to_string(),
            statement: statement.into()
        }
    }

    /// Construct a [`OrmError::Conversion`] error.
    pub fn conversion(source_type: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self::Conversion {
            source_type: source_type.into(),
            target_type: target_type.into()
        }
    }

    /// Construct a [`OrmError::Query`] error.
    pub fn query(msg: impl fmt::Display) -> Self {
        Self::Query(msg.to_string())
    }

    /// `true` for [`OrmError::Conflict`].
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

/// Convenience alias used throughout the crate.
pub type OrmResult<T> = Result<T, OrmError>;
