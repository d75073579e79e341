// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! Proc-macro implementation backing `#[derive(Entity)]`. This crate is an
//! implementation detail of `sql-orm`; depend on `sql-orm` for the derive
//! macro itself, or on `sql-orm-core` for the runtime types it expands
//! into.
//!
//! A struct annotated with `#[derive(Entity)]` must declare:
//! - a `#[field(role = "primary_key")]` field of type `uuid::Uuid` (tables
//!   only — views may omit it),
//! - `#[field(role = "created")]` / `#[field(role = "changed")]` fields of
//!   type `chrono::NaiveDateTime` (tables only),
//! - a plain `sql_orm_core::tracking::ChangeBuffer` field, which backs
//!   tracked mutation for every other field,
//! - optionally, a `sql_orm_core::entity::DelayedLoadState` field, if any
//!   field is declared `#[field(delayed)]`.
//!
//! See `sql_orm_core::registry::FieldDesc` for the full set of per-field
//! attributes this macro recognizes.

mod attrs;
mod codegen;
mod hosttype;

use darling::FromDeriveInput;
use proc_macro2::TokenStream;
use syn::{DeriveInput, parse2};

/// Expand `#[derive(Entity)]` for an annotated struct.
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let derive_input = match parse2::<DeriveInput>(input) {
        Ok(input) => input,
        Err(err) => return err.to_compile_error()
    };

    match attrs::EntityDef::from_derive_input(&derive_input) {
        Ok(def) => codegen::expand(&def),
        Err(err) => err.write_errors()
    }
}
