// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! `#[derive(Entity)]` — declare a persistent table or view.
//!
//! This crate is the thin proc-macro facade over [`sql_orm_core`], which
//! holds the actual registry, dialect, query-builder, connection-runtime
//! and schema-engine logic. Most users depend on `sql-orm-core` directly
//! for its types and only pull this crate in for the derive macro.
//!
//! ```rust,ignore
//! use sql_orm::Entity;
//!
//! #[derive(Entity)]
//! #[entity(table = "person", id = 200, version = 1)]
//! struct Person {
//!     #[field(role = "primary_key")]
//!     id: uuid::Uuid,
//!     #[field(role = "created")]
//!     created: chrono::NaiveDateTime,
//!     #[field(role = "changed")]
//!     changed: chrono::NaiveDateTime,
//!     #[field(indexed)]
//!     name: String,
//! }
//! ```

use proc_macro::TokenStream;

/// Derive the data-object capability set and register the entity's
/// [`sql_orm_core::registry::TypeDesc`] with the process-wide registry.
///
/// See `sql-orm-macros` for the attribute grammar.
#[proc_macro_derive(Entity, attributes(entity, field))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    sql_orm_macros::derive_entity(input.into()).into()
}
