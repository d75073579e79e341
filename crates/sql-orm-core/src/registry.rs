// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! The type metadata registry (C1).
//!
//! Builds and caches one [`TypeDesc`] per entity type, reflected once from
//! the entity's declarative metadata (normally produced by
//! `#[derive(Entity)]`) and never mutated afterwards. The registry enforces
//! that `entity_id` and `entity_name` are each globally unique.

use std::{
    any::TypeId,
    sync::{Mutex, OnceLock, RwLock}
};

use indexmap::IndexMap;

use crate::error::{OrmError, OrmResult};

/// Whether an entity is backed by a table or a read-only view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// A writable table.
    Table,
    /// A read-only view, composed from a `query_template`.
    View
}

/// The host-language representation of a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostType {
    /// 8-bit signed integer.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 32-bit floating point.
    F32,
    /// 64-bit floating point.
    F64,
    /// Fixed-point decimal.
    Decimal,
    /// Boolean.
    Bool,
    /// Variable-length string.
    String,
    /// Raw byte array.
    Bytes,
    /// A pixel bitmap, marshalled as PNG bytes on the wire.
    Image,
    /// Globally unique identifier.
    Guid,
    /// Date and time.
    DateTime,
    /// Fully-qualified name of a reflected type, stored as a string.
    TypeName,
    /// A 32-bit backed enum.
    Enum,
    /// A non-value serializable object, stored as (optionally compressed) JSON.
    Object
}

/// The role a field plays in its owning [`TypeDesc`]; each non-`None`
/// role may appear at most once per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// No special role.
    None,
    /// The primary key (a globally unique identifier).
    PrimaryKey,
    /// The creation timestamp, set on insert.
    TimestampCreated,
    /// The last-changed timestamp, set on insert and update.
    TimestampChanged,
    /// The archived/soft-delete flag.
    ArchiveFlag
}

/// Foreign-key action taken on the referenced row's update or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintAction {
    /// Take no action (and let the database reject the operation if it
    /// violates referential integrity).
    NoAction,
    /// Cascade the update/delete to this field's row.
    Cascade,
    /// Reset this field to its column default.
    SetDefault,
    /// Reset this field to `NULL`.
    SetNull
}

impl ConstraintAction {
    /// Render as the SQL keyword(s) used after `ON UPDATE`/`ON DELETE`.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Cascade => "CASCADE",
            Self::SetDefault => "SET DEFAULT",
            Self::SetNull => "SET NULL"
        }
    }
}

/// Immutable per-field metadata.
#[derive(Debug, Clone)]
pub struct FieldDesc {
    /// Column/property name.
    pub name: String,
    /// Host-language value representation.
    pub host_type: HostType,
    /// The structural role this field plays, if any.
    pub role: FieldRole,
    /// Maximum length for strings; `-1` means unbounded ("memo").
    pub max_length: i32,
    /// Blob storage block size, for byte-array/image/object fields.
    pub blob_block_size: i32,
    /// Whether object/image values are gzip-compressed on the wire.
    pub compress: bool,
    /// Whether a plain index is declared on this column.
    pub indexed: bool,
    /// An optional textual index expression (e.g. functional index).
    pub index_definition: Option<String>,
    /// Whether this column carries a `UNIQUE` constraint.
    pub unique: bool,
    /// Whether this field is omitted from the default SELECT projection.
    pub delayed: bool,
    /// Whether this field participates in free-text search.
    pub searchable: bool,
    /// Whether a soundex index should back `searchable` matching.
    pub use_soundex: bool,
    /// Whether changes to this field are written to the change log.
    pub log_changes: bool,
    /// View-only: the source column this field is mapped from.
    pub source_field: Option<String>,
    /// The entity-type name this field's value references, if any.
    pub constraint_type: Option<String>,
    /// `ON UPDATE` action for the foreign-key constraint.
    pub constraint_on_update: ConstraintAction,
    /// `ON DELETE` action for the foreign-key constraint.
    pub constraint_on_delete: ConstraintAction
}

impl FieldDesc {
    /// Start building a [`FieldDesc`] with the given name and host type;
    /// all other attributes take their spec-mandated defaults.
    pub fn new(name: impl Into<String>, host_type: HostType) -> Self {
        Self {
            name: name.into(),
            host_type,
            role: FieldRole::None,
            max_length: 100,
            blob_block_size: 512,
            compress: false,
            indexed: false,
            index_definition: None,
            unique: false,
            delayed: false,
            searchable: false,
            use_soundex: false,
            log_changes: false,
            source_field: None,
            constraint_type: None,
            constraint_on_update: ConstraintAction::NoAction,
            constraint_on_delete: ConstraintAction::NoAction
        }
    }

    /// Set the field's role.
    pub const fn with_role(mut self, role: FieldRole) -> Self {
        self.role = role;
        self
    }

    /// Set `max_length`.
    pub const fn with_max_length(mut self, max_length: i32) -> Self {
        self.max_length = max_length;
        self
    }

    /// Mark this field as indexed.
    pub const fn with_indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
    }

    /// Mark this field as delayed.
    pub const fn with_delayed(mut self, delayed: bool) -> Self {
        self.delayed = delayed;
        self
    }

    /// Mark this field as log-changes.
    pub const fn with_log_changes(mut self, log_changes: bool) -> Self {
        self.log_changes = log_changes;
        self
    }

    /// Mark this field `UNIQUE`.
    pub const fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Set `blob_block_size`.
    pub const fn with_blob_block_size(mut self, blob_block_size: i32) -> Self {
        self.blob_block_size = blob_block_size;
        self
    }

    /// Mark this field's blob payload gzip-compressed on the wire.
    pub const fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Mark this field as participating in free-text search.
    pub const fn with_searchable(mut self, searchable: bool) -> Self {
        self.searchable = searchable;
        self
    }

    /// Back `searchable` matching with a soundex index.
    pub const fn with_use_soundex(mut self, use_soundex: bool) -> Self {
        self.use_soundex = use_soundex;
        self
    }

    /// Set a textual index expression (e.g. a functional index), implying
    /// `indexed`.
    pub fn with_index_definition(mut self, definition: impl Into<String>) -> Self {
        self.indexed = true;
        self.index_definition = Some(definition.into());
        self
    }

    /// View-only: the source column this field is mapped from.
    pub fn with_source_field(mut self, source_field: impl Into<String>) -> Self {
        self.source_field = Some(source_field.into());
        self
    }

    /// Declare this field as a foreign key into `target_type`, with the
    /// given `ON UPDATE`/`ON DELETE` actions.
    pub fn with_constraint(
        mut self,
        target_type: impl Into<String>,
        on_update: ConstraintAction,
        on_delete: ConstraintAction
    ) -> Self {
        self.constraint_type = Some(target_type.into());
        self.constraint_on_update = on_update;
        self.constraint_on_delete = on_delete;
        self
    }
}

/// Immutable, process-cached entity description.
#[derive(Debug, Clone)]
pub struct TypeDesc {
    /// Table or view.
    pub kind: EntityKind,
    /// Declared entity name.
    pub name: String,
    /// Declared entity id. 1-99 are reserved for built-ins.
    pub id: u32,
    /// Declared schema version, used by the schema engine to gate convergence.
    pub version: u32,
    /// Whether loaded instances should be cached by the connection runtime.
    pub use_cache: bool,
    /// Whether saves against this (table) entity are change-logged.
    pub log_changes: bool,
    /// View-only: the table-kind entity this view is derived from.
    pub master_type: Option<String>,
    /// View-only: the SQL template, which may contain the literal token
    /// `#FIELDS#`.
    pub query_template: Option<String>,
    /// Declared fields, in source declaration order.
    pub fields: IndexMap<String, FieldDesc>
}

impl TypeDesc {
    /// The primary-key field, if any.
    pub fn key_field(&self) -> Option<&FieldDesc> {
        self.fields.values().find(|f| f.role == FieldRole::PrimaryKey)
    }

    /// The created-timestamp field, if any.
    pub fn created_field(&self) -> Option<&FieldDesc> {
        self.fields
            .values()
            .find(|f| f.role == FieldRole::TimestampCreated)
    }

    /// The changed-timestamp field, if any.
    pub fn changed_field(&self) -> Option<&FieldDesc> {
        self.fields
            .values()
            .find(|f| f.role == FieldRole::TimestampChanged)
    }

    /// The archive-flag field, if any.
    pub fn archived_field(&self) -> Option<&FieldDesc> {
        self.fields.values().find(|f| f.role == FieldRole::ArchiveFlag)
    }

    /// Build a [`TypeDesc`] from an ordered list of fields, keyed by each
    /// field's declared name. Used by generated `#[derive(Entity)]` code so
    /// callers never need to depend on `indexmap` directly.
    #[allow(clippy::too_many_arguments)]
    pub fn from_fields(
        kind: EntityKind,
        name: impl Into<String>,
        id: u32,
        version: u32,
        use_cache: bool,
        log_changes: bool,
        master_type: Option<String>,
        query_template: Option<String>,
        fields: Vec<FieldDesc>
    ) -> Self {
        let mut map = IndexMap::new();
        for field in fields {
            map.insert(field.name.clone(), field);
        }
        Self {
            kind,
            name: name.into(),
            id,
            version,
            use_cache,
            log_changes,
            master_type,
            query_template,
            fields: map
        }
    }

    /// Validate the structural invariants of spec §3.
    pub fn validate(&self) -> OrmResult<()> {
        if self.id < 1 {
            return Err(OrmError::structural("entity id must be >= 1"));
        }
        if self.version < 1 {
            return Err(OrmError::structural("entity version must be >= 1"));
        }

        let mut seen_roles: Vec<FieldRole> = Vec::new();
        for field in self.fields.values() {
            if field.role == FieldRole::None {
                continue;
            }
            if seen_roles.contains(&field.role) {
                return Err(OrmError::structural(format!(
                    "role {:?} appears more than once on entity {}",
                    field.role, self.name
                )));
            }
            seen_roles.push(field.role);
        }

        match self.kind {
            EntityKind::Table => {
                if self.key_field().is_none() {
                    return Err(OrmError::structural(format!(
                        "table {} has no primary-key field",
                        self.name
                    )));
                }
                if self.created_field().is_none() {
                    return Err(OrmError::structural(format!(
                        "table {} has no created-timestamp field",
                        self.name
                    )));
                }
                if self.changed_field().is_none() {
                    return Err(OrmError::structural(format!(
                        "table {} has no changed-timestamp field",
                        self.name
                    )));
                }
                if self.query_template.is_some() {
                    return Err(OrmError::structural(format!(
                        "entity {} declares both table fields and a view query_template",
                        self.name
                    )));
                }
            }
            EntityKind::View => {
                if self.query_template.is_none() {
                    return Err(OrmError::structural(format!(
                        "view {} has no query_template",
                        self.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Hook signature invoked after a fresh [`TypeDesc`] is built and validated,
/// letting downstream libraries attach extensions before it is published.
pub type AfterRegisterHook = fn(&mut TypeDesc);

struct RegistryEntry {
    desc: &'static TypeDesc
}

/// The process-wide, insert-once type registry.
///
/// Lookups are lock-free after warm-up (each entry, once inserted, is never
/// mutated or removed); insertion is serialized by a mutex so that two
/// threads racing to register the same type do not double-validate.
pub struct Registry {
    by_type: RwLock<std::collections::HashMap<TypeId, RegistryEntry>>,
    by_id: Mutex<std::collections::HashMap<u32, String>>,
    by_name: Mutex<std::collections::HashMap<String, u32>>
}

impl Registry {
    fn new() -> Self {
        Self {
            by_type: RwLock::new(std::collections::HashMap::new()),
            by_id: Mutex::new(std::collections::HashMap::new()),
            by_name: Mutex::new(std::collections::HashMap::new())
        }
    }

    /// The process-wide singleton.
    pub fn global() -> &'static Registry {
        static INSTANCE: OnceLock<Registry> = OnceLock::new();
        INSTANCE.get_or_init(Registry::new)
    }

    /// Look up an already-registered [`TypeDesc`] by type id.
    pub fn get(&self, type_id: TypeId) -> Option<&'static TypeDesc> {
        self.by_type.read().unwrap().get(&type_id).map(|e| e.desc)
    }

    /// Look up an already-registered [`TypeDesc`] by declared entity name
    /// (case-insensitive), used to resolve foreign-key references during
    /// schema convergence.
    pub fn find_by_name(&self, name: &str) -> Option<&'static TypeDesc> {
        let lower = name.to_lowercase();
        self.by_type
            .read()
            .unwrap()
            .values()
            .map(|e| e.desc)
            .find(|desc| desc.name.to_lowercase() == lower)
    }

    /// Register `desc` under `type_id`, validating it and enforcing
    /// id/name uniqueness. Idempotent: re-registering the same `type_id`
    /// with the same `desc.name`/`desc.id` returns the cached entry;
    /// registering a *different* id/name under an already-used id/name
    /// fails and nothing is cached.
    pub fn register(
        &'static self,
        type_id: TypeId,
        build: impl FnOnce() -> OrmResult<TypeDesc>,
        after_register: Option<AfterRegisterHook>
    ) -> OrmResult<&'static TypeDesc> {
        if let Some(existing) = self.get(type_id) {
            return Ok(existing);
        }

        // Serialize the build+validate+publish sequence so concurrent
        // first-callers cannot both pass the uniqueness check.
        let mut by_id = self.by_id.lock().unwrap();
        let mut by_name = self.by_name.lock().unwrap();

        if let Some(existing) = self.get(type_id) {
            return Ok(existing);
        }

        let mut desc = build()?;
        desc.validate()?;

        let lower_name = desc.name.to_lowercase();
        if let Some(owner) = by_name.get(&lower_name)
            && *owner != desc.id
        {
            return Err(OrmError::structural(format!(
                "entity name {} is already registered with a different id",
                desc.name
            )));
        }
        if let Some(owner) = by_id.get(&desc.id)
            && owner.to_lowercase() != lower_name
        {
            return Err(OrmError::structural(format!(
                "entity id {} is already registered under name {}",
                desc.id, owner
            )));
        }

        if let Some(hook) = after_register {
            hook(&mut desc);
        }

        let leaked: &'static TypeDesc = Box::leak(Box::new(desc));
        by_id.insert(leaked.id, leaked.name.clone());
        by_name.insert(lower_name, leaked.id);
        self.by_type
            .write()
            .unwrap()
            .insert(type_id, RegistryEntry { desc: leaked });

        Ok(leaked)
    }
}
