// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! Runtime engine for `sql-orm`: the type registry, dialect translator,
//! value codec, query builder, connection runtime, schema evolution
//! engine, event hub and entity tracking base that back the
//! `#[derive(Entity)]` macro in the `sql-orm` facade crate.
//!
//! Nothing here depends on a concrete database client; [`connection::Driver`]
//! is the synchronous seam a caller plugs a real driver into.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod events;
pub mod logging;
pub mod query;
pub mod registry;
pub mod schema;
pub mod tracking;

/// Re-exports of the types most callers need, mirroring the facade crate's
/// `sql_orm::prelude`.
pub mod prelude {
    pub use crate::{
        codec::{Bitmap, Value},
        config::{ConflictMode, Configuration},
        connection::{ChangeLogger, Connection, Driver, OrderMode, ReadOptions, Row},
        dialect::Dialect,
        entity::{DataObject, DelayedLoadState},
        error::{OrmError, OrmResult},
        events::{ChangeKind, EventHub, EventMessage, Subscription},
        query::QueryBuilder,
        registry::{ConstraintAction, EntityKind, FieldDesc, FieldRole, HostType, Registry, TypeDesc},
        schema::SystemInformation
    };
}
