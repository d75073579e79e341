// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! Expands a parsed [`EntityDef`] into the `TypeDesc` builder and
//! `DataObject` impl backing `#[derive(Entity)]`.

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::Ident;

use crate::{
    attrs::{EntityDef, FieldAttrs},
    hosttype::{self, Host}
};

const ROLES: &[&str] = &["primary_key", "created", "changed", "archived"];

/// One declared entity column: a struct field carrying `#[field(...)]`
/// metadata, together with its inferred host type.
struct Column {
    attrs: FieldAttrs,
    ident: Ident,
    host: Host,
    is_option: bool
}

impl Column {
    fn name(&self) -> String {
        self.attrs.column_name()
    }

    fn role(&self) -> Option<&str> {
        self.attrs.role.as_deref()
    }
}

fn compile_error(message: impl std::fmt::Display) -> TokenStream {
    let message = message.to_string();
    quote! { compile_error!(#message); }
}

fn is_carrier_field(field: &FieldAttrs) -> bool {
    matches!(
        hosttype::type_last_segment(&field.ty).as_deref(),
        Some("ChangeBuffer") | Some("DelayedLoadState")
    )
}

/// Expand the derive for a parsed entity definition. Returns a
/// `compile_error!` token stream in place of any offending item instead of
/// panicking, so the user sees a normal diagnostic at the macro call site.
pub fn expand(def: &EntityDef) -> TokenStream {
    let ident = &def.ident;
    let all_fields = def.fields();

    let buffer_field = match all_fields
        .iter()
        .find(|f| hosttype::type_last_segment(&f.ty).as_deref() == Some("ChangeBuffer"))
    {
        Some(field) => field.field_ident().clone(),
        None => {
            return compile_error(format_args!(
                "#[derive(Entity)] requires a `sql_orm_core::tracking::ChangeBuffer` field on `{ident}`"
            ));
        }
    };
    let delayed_field = all_fields
        .iter()
        .find(|f| hosttype::type_last_segment(&f.ty).as_deref() == Some("DelayedLoadState"))
        .map(|field| field.field_ident().clone());

    let mut columns = Vec::new();
    for field in all_fields.iter().filter(|f| !is_carrier_field(f)) {
        let field_ident = field.field_ident().clone();

        if let Some(role) = &field.role
            && !ROLES.contains(&role.as_str())
        {
            return compile_error(format_args!(
                "field `{field_ident}` on `{ident}`: unknown role `{role}` (expected one of {ROLES:?})"
            ));
        }

        let (is_option, inner_ty) = hosttype::unwrap_option(&field.ty);
        match hosttype::infer(&inner_ty, field.host_type.as_deref()) {
            Ok(host) => columns.push(Column {
                attrs: field.clone(),
                ident: field_ident,
                host,
                is_option
            }),
            Err(message) => {
                return compile_error(format_args!("field `{field_ident}` on `{ident}`: {message}"));
            }
        }
    }

    let pk = columns.iter().find(|c| c.role() == Some("primary_key"));
    let created = columns.iter().find(|c| c.role() == Some("created"));
    let changed = columns.iter().find(|c| c.role() == Some("changed"));
    let archived = columns.iter().find(|c| c.role() == Some("archived"));

    let field_desc_tokens: Vec<TokenStream> = columns.iter().map(build_field_desc).collect();
    let field_value_arms: Vec<TokenStream> = columns.iter().map(build_field_value_arm).collect();
    let set_field_value_arms: Vec<TokenStream> =
        columns.iter().map(|c| build_set_field_value_arm(c, &buffer_field)).collect();

    let table = &def.table;
    let id = def.id;
    let version = def.version;
    let use_cache = def.use_cache;
    let log_changes = def.log_changes;
    let kind_tokens = if def.view {
        quote! { ::sql_orm_core::registry::EntityKind::View }
    } else {
        quote! { ::sql_orm_core::registry::EntityKind::Table }
    };
    let master_type_tokens = opt_string_tokens(&def.master_type);
    let query_template_tokens = opt_string_tokens(&def.query_template);

    let primary_key_impl = role_accessor_uuid(pk, "primary_key", "set_primary_key");
    let created_impl = role_accessor_datetime(created, "created", "set_created");
    let changed_impl = role_accessor_datetime(changed, "changed", "set_changed");
    let archived_impl = archived
        .map(|c| {
            let field = &c.ident;
            quote! {
                fn archived(&self) -> bool {
                    self.#field
                }
                fn set_archived(&mut self, value: bool) {
                    self.#field = value;
                }
            }
        })
        .unwrap_or_default();

    let (delayed_loaded, mark_loaded, reset_loaded) = match &delayed_field {
        Some(field) => (
            quote! {
                fn is_delayed_loaded(&self, field: &str) -> bool {
                    self.#field.is_loaded(field)
                }
            },
            quote! {
                fn mark_delayed_loaded(&mut self, field: &str) {
                    self.#field.mark_loaded(field);
                }
            },
            quote! {
                fn reset_delayed_loaded(&mut self) {
                    self.#field.reset();
                }
            }
        ),
        None => (
            quote! {
                fn is_delayed_loaded(&self, _field: &str) -> bool {
                    true
                }
            },
            quote! {
                fn mark_delayed_loaded(&mut self, _field: &str) {}
            },
            quote! {
                fn reset_delayed_loaded(&mut self) {}
            }
        )
    };

    quote! {
        impl #ident {
            fn __sql_orm_build_type_desc() -> ::sql_orm_core::error::OrmResult<::sql_orm_core::registry::TypeDesc> {
                Ok(::sql_orm_core::registry::TypeDesc::from_fields(
                    #kind_tokens,
                    #table,
                    #id,
                    #version,
                    #use_cache,
                    #log_changes,
                    #master_type_tokens,
                    #query_template_tokens,
                    vec![ #(#field_desc_tokens),* ]
                ))
            }
        }

        impl ::sql_orm_core::entity::DataObject for #ident {
            fn type_desc(&self) -> &'static ::sql_orm_core::registry::TypeDesc {
                ::sql_orm_core::registry::Registry::global()
                    .register(::std::any::TypeId::of::<Self>(), Self::__sql_orm_build_type_desc, None)
                    .unwrap_or_else(|err| panic!("registering entity `{}` failed: {err}", #table))
            }

            #primary_key_impl
            #created_impl
            #changed_impl
            #archived_impl

            fn change_buffer(&self) -> &::sql_orm_core::tracking::ChangeBuffer {
                &self.#buffer_field
            }
            fn change_buffer_mut(&mut self) -> &mut ::sql_orm_core::tracking::ChangeBuffer {
                &mut self.#buffer_field
            }

            fn field_value(&self, name: &str) -> ::sql_orm_core::error::OrmResult<::sql_orm_core::codec::Value> {
                match name {
                    #(#field_value_arms)*
                    other => Err(::sql_orm_core::error::OrmError::structural(format!(
                        "no such field {other} on {}", #table
                    )))
                }
            }

            fn set_field_value(
                &mut self,
                name: &str,
                value: ::sql_orm_core::codec::Value
            ) -> ::sql_orm_core::error::OrmResult<()> {
                match name {
                    #(#set_field_value_arms)*
                    other => {
                        return Err(::sql_orm_core::error::OrmError::structural(format!(
                            "no such field {other} on {}", #table
                        )));
                    }
                }
                Ok(())
            }

            #delayed_loaded
            #mark_loaded
            #reset_loaded
        }
    }
}

fn opt_string_tokens(opt: &Option<String>) -> TokenStream {
    match opt {
        Some(s) => quote! { Some(#s.to_string()) },
        None => quote! { None }
    }
}

fn role_tokens(role: Option<&str>) -> Option<TokenStream> {
    match role? {
        "primary_key" => Some(quote! { ::sql_orm_core::registry::FieldRole::PrimaryKey }),
        "created" => Some(quote! { ::sql_orm_core::registry::FieldRole::TimestampCreated }),
        "changed" => Some(quote! { ::sql_orm_core::registry::FieldRole::TimestampChanged }),
        "archived" => Some(quote! { ::sql_orm_core::registry::FieldRole::ArchiveFlag }),
        _ => None
    }
}

fn constraint_action_tokens(action: Option<&str>) -> TokenStream {
    match action {
        Some("cascade") => quote! { ::sql_orm_core::registry::ConstraintAction::Cascade },
        Some("set_default") => quote! { ::sql_orm_core::registry::ConstraintAction::SetDefault },
        Some("set_null") => quote! { ::sql_orm_core::registry::ConstraintAction::SetNull },
        _ => quote! { ::sql_orm_core::registry::ConstraintAction::NoAction }
    }
}

fn build_field_desc(col: &Column) -> TokenStream {
    let name = col.name();
    let host_tokens = col.host.host_type_tokens();
    let mut expr = quote! { ::sql_orm_core::registry::FieldDesc::new(#name, #host_tokens) };

    if let Some(role) = role_tokens(col.role()) {
        expr = quote! { #expr.with_role(#role) };
    }
    if let Some(max_length) = col.attrs.max_length {
        expr = quote! { #expr.with_max_length(#max_length) };
    }
    if let Some(definition) = &col.attrs.index_definition {
        expr = quote! { #expr.with_index_definition(#definition) };
    } else if col.attrs.indexed {
        expr = quote! { #expr.with_indexed(true) };
    }
    if col.attrs.unique {
        expr = quote! { #expr.with_unique(true) };
    }
    if col.attrs.delayed {
        expr = quote! { #expr.with_delayed(true) };
    }
    if col.attrs.searchable {
        expr = quote! { #expr.with_searchable(true) };
    }
    if col.attrs.use_soundex {
        expr = quote! { #expr.with_use_soundex(true) };
    }
    if col.attrs.log_changes {
        expr = quote! { #expr.with_log_changes(true) };
    }
    if col.attrs.compress {
        expr = quote! { #expr.with_compress(true) };
    }
    if let Some(block_size) = col.attrs.blob_block_size {
        expr = quote! { #expr.with_blob_block_size(#block_size) };
    }
    if let Some(source_field) = &col.attrs.source_field {
        expr = quote! { #expr.with_source_field(#source_field) };
    }
    if let Some(target_type) = &col.attrs.constraint_type {
        let on_update = constraint_action_tokens(col.attrs.constraint_on_update.as_deref());
        let on_delete = constraint_action_tokens(col.attrs.constraint_on_delete.as_deref());
        expr = quote! { #expr.with_constraint(#target_type, #on_update, #on_delete) };
    }

    expr
}

/// The `Value`-typed read expression for a column, shared by `field_value`
/// and by `set_field_value`'s pre-mutation snapshot of the old value.
fn read_expr(col: &Column) -> TokenStream {
    let field = &col.ident;
    let variant = col.host.variant_ident();
    match (col.is_option, col.host.needs_clone()) {
        (true, true) => quote! {
            self.#field.clone().map(::sql_orm_core::codec::Value::#variant).unwrap_or(::sql_orm_core::codec::Value::Null)
        },
        (true, false) => quote! {
            self.#field.map(::sql_orm_core::codec::Value::#variant).unwrap_or(::sql_orm_core::codec::Value::Null)
        },
        (false, true) => quote! { ::sql_orm_core::codec::Value::#variant(self.#field.clone()) },
        (false, false) => quote! { ::sql_orm_core::codec::Value::#variant(self.#field) }
    }
}

fn build_field_value_arm(col: &Column) -> TokenStream {
    let name = col.name();
    let get_expr = read_expr(col);
    quote! { #name => Ok(#get_expr), }
}

/// The expression converting the incoming `value: Value` into the column's
/// native Rust type, returning early with a conversion error on mismatch.
fn convert_expr(col: &Column) -> TokenStream {
    let variant = col.host.variant_ident();
    let host_label = format!("{:?}", col.host);

    if col.is_option {
        quote! {
            match value {
                ::sql_orm_core::codec::Value::Null => None,
                ::sql_orm_core::codec::Value::#variant(v) => Some(v),
                _ => return Err(::sql_orm_core::error::OrmError::conversion("value", #host_label))
            }
        }
    } else {
        match col.host.default_tokens() {
            Some(default) => quote! {
                match value {
                    ::sql_orm_core::codec::Value::#variant(v) => v,
                    ::sql_orm_core::codec::Value::Null => #default,
                    _ => return Err(::sql_orm_core::error::OrmError::conversion("value", #host_label))
                }
            },
            None => quote! {
                match value {
                    ::sql_orm_core::codec::Value::#variant(v) => v,
                    _ => return Err(::sql_orm_core::error::OrmError::conversion("value", #host_label))
                }
            }
        }
    }
}

fn build_set_field_value_arm(col: &Column, buffer_field: &Ident) -> TokenStream {
    let name = col.name();
    let field = &col.ident;
    let convert = convert_expr(col);

    if col.role().is_some() {
        quote! {
            #name => {
                self.#field = #convert;
            }
        }
    } else {
        let old_read = read_expr(col);
        quote! {
            #name => {
                let __old = #old_read;
                let __new = value.clone();
                let __converted = #convert;
                self.#buffer_field.set(#name, &__old, &__new);
                self.#field = __converted;
            }
        }
    }
}

fn role_accessor_uuid(col: Option<&Column>, getter: &str, setter: &str) -> TokenStream {
    let getter = format_ident!("{getter}");
    let setter = format_ident!("{setter}");
    match col {
        Some(c) => {
            let field = &c.ident;
            quote! {
                fn #getter(&self) -> ::uuid::Uuid {
                    self.#field
                }
                fn #setter(&mut self, value: ::uuid::Uuid) {
                    self.#field = value;
                }
            }
        }
        None => quote! {
            fn #getter(&self) -> ::uuid::Uuid {
                ::uuid::Uuid::nil()
            }
            fn #setter(&mut self, _value: ::uuid::Uuid) {}
        }
    }
}

fn role_accessor_datetime(col: Option<&Column>, getter: &str, setter: &str) -> TokenStream {
    let getter = format_ident!("{getter}");
    let setter = format_ident!("{setter}");
    match col {
        Some(c) => {
            let field = &c.ident;
            quote! {
                fn #getter(&self) -> ::chrono::NaiveDateTime {
                    self.#field
                }
                fn #setter(&mut self, value: ::chrono::NaiveDateTime) {
                    self.#field = value;
                }
            }
        }
        None => quote! {
            fn #getter(&self) -> ::chrono::NaiveDateTime {
                ::chrono::NaiveDateTime::MIN
            }
            fn #setter(&mut self, _value: ::chrono::NaiveDateTime) {}
        }
    }
}

#[cfg(test)]
mod tests {
    use darling::FromDeriveInput;
    use syn::{DeriveInput, parse_quote};

    use super::*;

    fn expand_str(input: DeriveInput) -> String {
        let def = EntityDef::from_derive_input(&input).unwrap();
        expand(&def).to_string()
    }

    #[test]
    fn expands_primary_key_and_tracked_field_accessors() {
        let input: DeriveInput = parse_quote! {
            #[entity(table = "person", id = 200, version = 1)]
            struct Person {
                #[field(role = "primary_key")]
                id: uuid::Uuid,
                #[field(role = "created")]
                created: chrono::NaiveDateTime,
                #[field(role = "changed")]
                changed: chrono::NaiveDateTime,
                #[field(indexed)]
                name: String,
                buffer: sql_orm_core::tracking::ChangeBuffer
            }
        };
        let expanded = expand_str(input);
        assert!(expanded.contains("PrimaryKey"));
        assert!(expanded.contains("TimestampCreated"));
        assert!(expanded.contains("with_indexed"));
        assert!(expanded.contains("fn field_value"));
        assert!(expanded.contains("fn set_field_value"));
        assert!(expanded.contains("buffer . set"));
    }

    #[test]
    fn missing_change_buffer_field_is_a_compile_error() {
        let input: DeriveInput = parse_quote! {
            #[entity(table = "person", id = 200, version = 1)]
            struct Person {
                #[field(role = "primary_key")]
                id: uuid::Uuid
            }
        };
        let expanded = expand_str(input);
        assert!(expanded.contains("compile_error"));
        assert!(expanded.contains("ChangeBuffer"));
    }

    #[test]
    fn unsupported_field_type_is_a_compile_error() {
        let input: DeriveInput = parse_quote! {
            #[entity(table = "person", id = 200, version = 1)]
            struct Person {
                #[field(role = "primary_key")]
                id: uuid::Uuid,
                address: std::net::IpAddr,
                buffer: sql_orm_core::tracking::ChangeBuffer
            }
        };
        let expanded = expand_str(input);
        assert!(expanded.contains("compile_error"));
    }

    #[test]
    fn role_fields_bypass_change_tracking() {
        let input: DeriveInput = parse_quote! {
            #[entity(table = "person", id = 200, version = 1)]
            struct Person {
                #[field(role = "primary_key")]
                id: uuid::Uuid,
                #[field(role = "created")]
                created: chrono::NaiveDateTime,
                #[field(role = "changed")]
                changed: chrono::NaiveDateTime,
                buffer: sql_orm_core::tracking::ChangeBuffer
            }
        };
        let expanded = expand_str(input);
        // the primary-key arm in set_field_value assigns directly; it must
        // not call buffer.set (only field_value's read arm may mention "id")
        let setter_start = expanded.find("fn set_field_value").unwrap();
        let pk_arm_start = setter_start + expanded[setter_start..].find("\"id\" =>").unwrap();
        let pk_arm_end = pk_arm_start + expanded[pk_arm_start..].find("\"created\" =>").unwrap();
        let pk_arm = &expanded[pk_arm_start..pk_arm_end];
        assert!(!pk_arm.contains("buffer . set"));
    }
}
