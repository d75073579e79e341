// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! Attribute parsing with darling.
//!
//! [`EntityDef`] parses the struct-level `#[entity(...)]` attribute and
//! its named fields; [`FieldAttrs`] parses each field's `#[field(...)]`
//! attribute.
//!
//! # Entity attributes
//!
//! | Attribute | Required | Default | Description |
//! |-----------|----------|---------|-------------|
//! | `table` | Yes | — | Table or view name |
//! | `id` | Yes | — | Declared entity id (spec: `>= 1`) |
//! | `version` | Yes | — | Declared schema version (spec: `>= 1`) |
//! | `view` | No | `false` | This entity is a read-only view |
//! | `query_template` | No | — | View SQL; may contain `#FIELDS#` |
//! | `master_type` | No | — | View-only: the table this view is derived from |
//! | `use_cache` | No | `false` | Loaded instances should be cached |
//! | `log_changes` | No | `false` | Saves are change-logged |
//!
//! # Field attributes
//!
//! | Attribute | Description |
//! |-----------|-------------|
//! | `role` | `"primary_key"`, `"created"`, `"changed"`, or `"archived"` |
//! | `host_type` | Override for types the Rust type alone can't disambiguate |
//! | `name` | Declared column name, if different from the Rust field name |
//! | `indexed`, `unique`, `delayed`, `searchable`, `use_soundex`, `log_changes`, `compress` | Flags, see [`FieldDesc`](sql_orm_core::registry::FieldDesc) |
//! | `max_length`, `blob_block_size` | Size hints |
//! | `index_definition` | Functional index expression; implies `indexed` |
//! | `source_field` | View-only: the column this field is mapped from |
//! | `constraint_type`, `constraint_on_update`, `constraint_on_delete` | Foreign-key target entity and actions |

use darling::{
    FromDeriveInput, FromField,
    ast::{Data, Fields}
};
use syn::{Ident, Type};

/// Entity-level attributes parsed from `#[entity(...)]`, plus its fields.
#[derive(Debug, FromDeriveInput)]
#[darling(attributes(entity), supports(struct_named))]
pub struct EntityDef {
    pub ident: Ident,
    pub data: Data<darling::util::Ignored, FieldAttrs>,

    pub table: String,
    pub id: u32,
    pub version: u32,

    #[darling(default)]
    pub view: bool,
    #[darling(default)]
    pub query_template: Option<String>,
    #[darling(default)]
    pub master_type: Option<String>,
    #[darling(default)]
    pub use_cache: bool,
    #[darling(default)]
    pub log_changes: bool
}

impl EntityDef {
    /// The struct's named fields, in declaration order.
    pub fn fields(&self) -> Vec<FieldAttrs> {
        let Fields { fields, .. } = self
            .data
            .as_ref()
            .take_struct()
            .expect("#[darling(supports(struct_named))] guarantees a named-field struct");
        fields.into_iter().cloned().collect()
    }
}

/// Per-field attributes parsed from `#[field(...)]`.
#[derive(Debug, Clone, FromField)]
#[darling(attributes(field))]
pub struct FieldAttrs {
    pub ident: Option<Ident>,
    pub ty: Type,

    #[darling(default)]
    pub role: Option<String>,
    #[darling(default)]
    pub host_type: Option<String>,
    #[darling(default, rename = "name")]
    pub column_name: Option<String>,
    #[darling(default)]
    pub max_length: Option<i32>,
    #[darling(default)]
    pub blob_block_size: Option<i32>,
    #[darling(default)]
    pub compress: bool,
    #[darling(default)]
    pub indexed: bool,
    #[darling(default)]
    pub index_definition: Option<String>,
    #[darling(default)]
    pub unique: bool,
    #[darling(default)]
    pub delayed: bool,
    #[darling(default)]
    pub searchable: bool,
    #[darling(default)]
    pub use_soundex: bool,
    #[darling(default)]
    pub log_changes: bool,
    #[darling(default)]
    pub source_field: Option<String>,
    #[darling(default)]
    pub constraint_type: Option<String>,
    #[darling(default)]
    pub constraint_on_update: Option<String>,
    #[darling(default)]
    pub constraint_on_delete: Option<String>
}

impl FieldAttrs {
    /// The struct field's identifier; always `Some` for a named-field struct.
    pub fn field_ident(&self) -> &Ident {
        self.ident.as_ref().expect("named struct field")
    }

    /// The declared column name: `name`, if set, else the field's own name.
    pub fn column_name(&self) -> String {
        self.column_name
            .clone()
            .unwrap_or_else(|| self.field_ident().to_string())
    }
}

#[cfg(test)]
mod tests {
    use darling::FromDeriveInput;
    use syn::{DeriveInput, parse_quote};

    use super::*;

    #[test]
    fn parses_required_entity_attributes() {
        let input: DeriveInput = parse_quote! {
            #[entity(table = "person", id = 200, version = 1)]
            struct Person {
                #[field(role = "primary_key")]
                id: uuid::Uuid
            }
        };
        let def = EntityDef::from_derive_input(&input).unwrap();
        assert_eq!(def.table, "person");
        assert_eq!(def.id, 200);
        assert_eq!(def.version, 1);
        assert!(!def.view);
    }

    #[test]
    fn field_attrs_read_role_and_flags() {
        let input: DeriveInput = parse_quote! {
            #[entity(table = "person", id = 200, version = 1)]
            struct Person {
                #[field(role = "primary_key")]
                id: uuid::Uuid,
                #[field(indexed, max_length = 64, name = "full_name")]
                name: String
            }
        };
        let def = EntityDef::from_derive_input(&input).unwrap();
        let fields = def.fields();
        assert_eq!(fields[0].role.as_deref(), Some("primary_key"));
        assert_eq!(fields[1].column_name(), "full_name");
        assert!(fields[1].indexed);
        assert_eq!(fields[1].max_length, Some(64));
    }

    #[test]
    fn view_attributes_are_optional_but_present_when_declared() {
        let input: DeriveInput = parse_quote! {
            #[entity(table = "active_person", id = 201, version = 1, view, master_type = "person", query_template = "SELECT #FIELDS# FROM person")]
            struct ActivePerson {
                #[field(role = "primary_key")]
                id: uuid::Uuid
            }
        };
        let def = EntityDef::from_derive_input(&input).unwrap();
        assert!(def.view);
        assert_eq!(def.master_type.as_deref(), Some("person"));
        assert_eq!(def.query_template.as_deref(), Some("SELECT #FIELDS# FROM person"));
    }
}
