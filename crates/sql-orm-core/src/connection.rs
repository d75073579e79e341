// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! The connection runtime (C5): a transaction-scoped executor performing
//! insert/update/delete/select with partial-field writes, dirty tracking,
//! optimistic conflict detection, delayed field loading, change logging,
//! and transactional event buffering.
//!
//! The concrete database driver is out of scope (spec §1); [`Driver`] is
//! the synchronous boundary this runtime binds against, grounded in the
//! capability-driver shape of a Tauri-embedded database client and in the
//! teacher's own `Transactional` split — but blocking, per spec §5.

use chrono::Utc;
use uuid::Uuid;

use crate::{
    codec::Value,
    config::ConflictMode,
    dialect::Dialect,
    entity::DataObject,
    error::{OrmError, OrmResult},
    events::{ChangeKind, EventHub, EventMessage},
    registry::{FieldRole, TypeDesc}
};

/// One materialized row, with case-insensitive column lookup.
#[derive(Debug, Clone, Default)]
pub struct Row {
    columns: Vec<(String, Value)>
}

impl Row {
    /// Build a row from driver-supplied `(column_name, value)` pairs.
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    /// Look up a column by case-insensitive name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(col, _)| col.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Every column name as declared by the driver.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }
}

/// The synchronous boundary to a concrete database driver: an opaque
/// executor of parameterized SQL and scalar/row results. Errors are raw
/// driver-level text; [`Connection`] wraps them into the taxonomy of
/// spec §7.
pub trait Driver {
    /// Execute a statement with no result set, returning affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, String>;

    /// Execute a query, returning every row.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, String>;

    /// Execute a query expected to return exactly one scalar value.
    fn scalar(&mut self, sql: &str, params: &[Value]) -> Result<Value, String>;

    /// Open a transaction.
    fn begin_transaction(&mut self) -> Result<(), String>;
    /// Commit the open transaction.
    fn commit_transaction(&mut self) -> Result<(), String>;
    /// Roll back the open transaction.
    fn rollback_transaction(&mut self) -> Result<(), String>;
}

/// Persists field-level change-log entries, as `{key, field, old, new}`
/// tuples, for entities declaring `log_changes`.
pub trait ChangeLogger {
    /// Open a nested change batch, mirroring a connection's transaction.
    fn begin_batch(&mut self);
    /// Record one changed field.
    fn log_change(&mut self, entity: &str, key: Uuid, field: &str, old: &Value, new: &Value);
    /// Commit the open batch.
    fn commit_batch(&mut self);
    /// Discard the open batch.
    fn rollback_batch(&mut self);
}

/// Sort direction for [`ReadOptions::order_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderMode {
    /// No explicit ordering requested.
    #[default]
    None,
    /// Ascending.
    Ascending,
    /// Descending.
    Descending
}

/// Options recognized by the select/save family (spec §3).
pub struct ReadOptions<T> {
    /// Treat `save` as an insert even if the primary key is non-empty.
    pub force_create: bool,
    /// The field to order by, if any.
    pub order_by: Option<String>,
    /// Sort direction for `order_by`.
    pub order_mode: OrderMode,
    /// The field to group on, if any.
    pub group_on: Option<String>,
    /// Subset projection; empty means every non-delayed field.
    pub fields: Vec<String>,
    /// Cap on returned rows; `0` means unlimited.
    pub max_records: u32,
    /// Include delayed fields in the default projection.
    pub ignore_delayed: bool,
    /// Predicate applied after row materialization; rejected rows are
    /// omitted from list results.
    pub filter: Option<Box<dyn Fn(&T) -> bool>>,
    /// Force-write unchanged fields on update.
    pub write_all_fields: bool
}

impl<T> Default for ReadOptions<T> {
    fn default() -> Self {
        Self {
            force_create: false,
            order_by: None,
            order_mode: OrderMode::None,
            group_on: None,
            fields: Vec::new(),
            max_records: 0,
            ignore_delayed: false,
            filter: None,
            write_all_fields: false
        }
    }
}

fn system_information_from_row(row: &Row) -> OrmResult<crate::schema::SystemInformation> {
    let id = match row.get("id") {
        Some(Value::String(s)) => Uuid::parse_str(s).map_err(|_| OrmError::conversion("string", "Guid"))?,
        Some(Value::Guid(g)) => *g,
        _ => return Err(OrmError::structural("system_information row missing id"))
    };
    let entity_name = match row.get("entity_name") {
        Some(Value::String(s)) => s.clone(),
        _ => return Err(OrmError::structural("system_information row missing entity_name"))
    };
    let entity_id = match row.get("entity_id") {
        Some(Value::I32(n)) => *n as u32,
        Some(Value::I64(n)) => *n as u32,
        _ => return Err(OrmError::structural("system_information row missing entity_id"))
    };
    let declared_version = match row.get("declared_version") {
        Some(Value::I32(n)) => *n as u32,
        Some(Value::I64(n)) => *n as u32,
        _ => return Err(OrmError::structural("system_information row missing declared_version"))
    };
    let maintenance = matches!(row.get("maintenance"), Some(Value::Bool(true)));

    Ok(crate::schema::SystemInformation {
        id,
        entity_name,
        entity_id,
        declared_version,
        maintenance
    })
}

/// Rewrite each positional `?` in `sql`, left to right, into `@p0, @p1, …`.
pub fn bind_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut next = 0usize;
    for ch in sql.chars() {
        if ch == '?' {
            out.push_str(&format!("@p{next}"));
            next += 1;
        } else {
            out.push(ch);
        }
    }
    out
}

/// A transaction-scoped, single-threaded database connection.
pub struct Connection<D: Driver> {
    driver: D,
    dialect: Dialect,
    conflict_mode: ConflictMode,
    transaction_open: bool,
    outbox: Vec<EventMessage>,
    change_logger: Option<Box<dyn ChangeLogger>>,
    silent: bool
}

impl<D: Driver> Connection<D> {
    /// Open a connection over an already-constructed driver handle.
    pub fn new(driver: D, dialect: Dialect, conflict_mode: ConflictMode) -> Self {
        Self {
            driver,
            dialect,
            conflict_mode,
            transaction_open: false,
            outbox: Vec::new(),
            change_logger: None,
            silent: false
        }
    }

    /// Attach a change logger.
    pub fn set_change_logger(&mut self, logger: Box<dyn ChangeLogger>) {
        self.change_logger = Some(logger);
    }

    /// Suppress event delivery (both direct and outboxed) entirely.
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// `true` while a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.transaction_open
    }

    /// The dialect this connection targets.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Direct access to the underlying driver, for callers (notably the
    /// schema engine) that need driver-specific introspection beyond the
    /// [`Driver`] trait.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Begin a transaction. Fails if one is already open.
    pub fn begin(&mut self) -> OrmResult<()> {
        if self.transaction_open {
            return Err(OrmError::Connection("a transaction is already open".to_string()));
        }
        self.driver
            .begin_transaction()
            .map_err(OrmError::Connection)?;
        self.transaction_open = true;
        if let Some(logger) = &mut self.change_logger {
            logger.begin_batch();
        }
        Ok(())
    }

    /// Commit the open transaction: finalizes the driver transaction,
    /// flushes the outbox in enqueue order, then commits the change
    /// logger. A driver failure surfaces as [`OrmError::Transaction`] and
    /// delivers no events.
    pub fn commit(&mut self) -> OrmResult<()> {
        if !self.transaction_open {
            return Err(OrmError::Connection("no open transaction to commit".to_string()));
        }
        self.driver
            .commit_transaction()
            .map_err(OrmError::Transaction)?;
        self.transaction_open = false;

        let pending = std::mem::take(&mut self.outbox);
        if !self.silent {
            EventHub::global().publish_all(&pending);
        }

        if let Some(logger) = &mut self.change_logger {
            logger.commit_batch();
        }
        Ok(())
    }

    /// Roll back the open transaction: aborts the driver transaction,
    /// discards the outbox, rolls back the change logger. No events are
    /// delivered.
    pub fn rollback(&mut self) -> OrmResult<()> {
        if !self.transaction_open {
            return Err(OrmError::Connection("no open transaction to roll back".to_string()));
        }
        self.driver
            .rollback_transaction()
            .map_err(OrmError::Transaction)?;
        self.transaction_open = false;
        self.outbox.clear();
        if let Some(logger) = &mut self.change_logger {
            logger.rollback_batch();
        }
        Ok(())
    }

    /// Roll back any live transaction, then release the driver handle.
    pub fn close(mut self) -> OrmResult<()> {
        if self.transaction_open {
            self.rollback()?;
        }
        Ok(())
    }

    fn deliver_or_enqueue(&mut self, message: EventMessage) {
        if self.silent {
            return;
        }
        if self.transaction_open {
            self.outbox.push(message);
        } else {
            EventHub::global().publish(&message);
        }
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> OrmResult<u64> {
        let bound = bind_placeholders(sql);
        let rewritten = self.dialect.rewrite(&bound);
        self.driver
            .execute(&rewritten, params)
            .map_err(OrmError::Connection)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        let bound = bind_placeholders(sql);
        let rewritten = self.dialect.rewrite(&bound);
        self.driver
            .query(&rewritten, params)
            .map_err(OrmError::Connection)
    }

    fn scalar(&mut self, sql: &str, params: &[Value]) -> OrmResult<Value> {
        let bound = bind_placeholders(sql);
        let rewritten = self.dialect.rewrite(&bound);
        self.driver
            .scalar(&rewritten, params)
            .map_err(OrmError::Connection)
    }

    /// `SELECT key FROM tbl WHERE key <> ? AND field = ?`; `true` if no
    /// row matches.
    pub fn is_unique(&mut self, type_desc: &TypeDesc, field: &str, value: &Value, excluding_key: Uuid) -> OrmResult<bool> {
        let key_field = type_desc
            .key_field()
            .ok_or_else(|| OrmError::structural("entity has no primary key"))?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} <> ? AND {} = ?",
            key_field.name, type_desc.name, key_field.name, field
        );
        let rows = self.query(
            &sql,
            &[Value::String(excluding_key.to_string()), value.clone()]
        )?;
        Ok(rows.is_empty())
    }

    /// `exist_by_key`: `true` if a row with this primary key exists.
    fn exist_by_key(&mut self, type_desc: &TypeDesc, key: Uuid) -> OrmResult<bool> {
        let key_field = type_desc
            .key_field()
            .ok_or_else(|| OrmError::structural("entity has no primary key"))?;
        let sql = format!("SELECT 1 FROM {} WHERE {} = ?", type_desc.name, key_field.name);
        let rows = self.query(&sql, &[Value::String(key.to_string())])?;
        Ok(!rows.is_empty())
    }

    /// Persist `entity`: determines insert vs. update, applies the
    /// FirstWins conflict check, writes only the relevant fields, and
    /// delivers an `Added`/`Changed` event (spec §4.5).
    pub fn save<T: DataObject>(&mut self, entity: &mut T, options: &ReadOptions<T>) -> OrmResult<()> {
        entity.before_save();
        let type_desc = entity.type_desc();

        if type_desc.kind == crate::registry::EntityKind::View {
            return Err(OrmError::query("cannot save a view-kind entity"));
        }

        let is_insert =
            options.force_create || entity.primary_key().is_nil() || !self.exist_by_key(type_desc, entity.primary_key())?;

        if is_insert {
            self.save_insert(entity, type_desc)
        } else {
            self.save_update(entity, type_desc, options)
        }
    }

    fn save_update<T: DataObject>(
        &mut self,
        entity: &mut T,
        type_desc: &'static TypeDesc,
        options: &ReadOptions<T>
    ) -> OrmResult<()> {
        if self.conflict_mode == ConflictMode::FirstWins
            && let Some(changed_field) = type_desc.changed_field()
        {
            let sql = format!(
                "SELECT {} FROM {} WHERE {} = ?",
                changed_field.name,
                type_desc.name,
                type_desc.key_field().unwrap().name
            );
            let stored = self.scalar(&sql, &[Value::String(entity.primary_key().to_string())])?;
            if let Value::DateTime(stored_changed) = stored
                && stored_changed > entity.changed()
            {
                return Err(OrmError::Conflict);
            }
        }

        let field_names: Vec<String> = if !options.fields.is_empty() {
            options.fields.clone()
        } else if !options.write_all_fields {
            entity.changed_properties().keys().cloned().collect()
        } else {
            type_desc
                .fields
                .values()
                .filter(|f| f.role == FieldRole::None)
                .map(|f| f.name.clone())
                .collect()
        };

        if field_names.is_empty() {
            entity.commit();
            return Ok(());
        }

        let mut pairs = Vec::new();
        let mut values = Vec::new();
        let mut logged: Vec<(String, Value, Value)> = Vec::new();

        for name in &field_names {
            let Some(desc) = type_desc.fields.get(name) else {
                continue;
            };
            if matches!(desc.role, FieldRole::TimestampCreated | FieldRole::TimestampChanged) {
                continue;
            }
            if desc.delayed && !entity.is_delayed_loaded(&desc.name) {
                continue;
            }
            let old = entity
                .changed_properties()
                .get(name)
                .cloned()
                .unwrap_or(Value::Null);
            let new = entity.field_value(name)?;
            pairs.push(format!("{name} = ?"));
            values.push(self.dialect.to_db(&new, desc.host_type, desc.compress)?);
            if desc.log_changes {
                logged.push((name.clone(), old, new));
            }
        }

        let key_field = type_desc.key_field().unwrap();
        values.push(Value::String(entity.primary_key().to_string()));

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            type_desc.name,
            pairs.join(", "),
            key_field.name
        );
        self.execute(&sql, &values)?;

        self.log_changes(type_desc, entity.primary_key(), &logged);
        entity.commit();
        self.deliver_or_enqueue(EventMessage {
            entity_type: type_desc.name.clone(),
            change: ChangeKind::Changed,
            code: 0
        });
        Ok(())
    }

    fn save_insert<T: DataObject>(&mut self, entity: &mut T, type_desc: &'static TypeDesc) -> OrmResult<()> {
        if entity.primary_key().is_nil() {
            entity.set_primary_key(Uuid::new_v4());
        }
        let now = Utc::now().naive_utc();
        if let Some(created_field) = type_desc.created_field() {
            entity.set_field_value(&created_field.name, Value::DateTime(now))?;
        }
        if let Some(changed_field) = type_desc.changed_field() {
            entity.set_field_value(&changed_field.name, Value::DateTime(now))?;
        }

        let mut names = Vec::new();
        let mut values = Vec::new();
        for desc in type_desc.fields.values() {
            if desc.delayed && !entity.is_delayed_loaded(&desc.name) {
                continue;
            }
            let value = entity.field_value(&desc.name)?;
            names.push(desc.name.clone());
            values.push(self.dialect.to_db(&value, desc.host_type, desc.compress)?);
        }

        let placeholders = vec!["?"; names.len()].join(", ");
        let sql = format!("INSERT INTO {} ({}) VALUES ({})", type_desc.name, names.join(", "), placeholders);
        self.execute(&sql, &values)?;

        self.log_changes(type_desc, entity.primary_key(), &[]);
        entity.commit();
        self.deliver_or_enqueue(EventMessage {
            entity_type: type_desc.name.clone(),
            change: ChangeKind::Added,
            code: 0
        });
        Ok(())
    }

    fn log_changes(&mut self, type_desc: &TypeDesc, key: Uuid, logged: &[(String, Value, Value)]) {
        if !type_desc.log_changes || logged.is_empty() {
            return;
        }
        if let Some(logger) = &mut self.change_logger {
            for (field, old, new) in logged {
                logger.log_change(&type_desc.name, key, field, old, new);
            }
        }
    }

    /// Delete `entity` by primary key; fires `Deleted` if exactly one row
    /// was affected.
    pub fn delete<T: DataObject>(&mut self, entity: &mut T) -> OrmResult<()> {
        let type_desc = entity.type_desc();
        if type_desc.kind == crate::registry::EntityKind::View {
            return Err(OrmError::query("cannot delete a view-kind entity"));
        }
        let key_field = type_desc
            .key_field()
            .ok_or_else(|| OrmError::structural("entity has no primary key"))?;
        let sql = format!("DELETE FROM {} WHERE {} = ?", type_desc.name, key_field.name);
        let affected = self.execute(&sql, &[Value::String(entity.primary_key().to_string())])?;

        if affected == 1 {
            entity.after_delete();
            self.deliver_or_enqueue(EventMessage {
                entity_type: type_desc.name.clone(),
                change: ChangeKind::Deleted,
                code: 0
            });
        }
        Ok(())
    }

    /// `SELECT COUNT(field) FROM table`.
    pub fn count(&mut self, type_desc: &TypeDesc, field: &str) -> OrmResult<i64> {
        let sql = format!("SELECT COUNT({field}) FROM {}", type_desc.name);
        match self.scalar(&sql, &[])? {
            Value::I64(n) => Ok(n),
            Value::I32(n) => Ok(n as i64),
            other => Err(OrmError::conversion(format!("{other:?}"), "i64"))
        }
    }

    /// `SELECT SUM(field) FROM table`.
    pub fn sum(&mut self, type_desc: &TypeDesc, field: &str) -> OrmResult<Value> {
        let sql = format!("SELECT SUM({field}) FROM {}", type_desc.name);
        self.scalar(&sql, &[])
    }

    /// Raw tabular select: no materialization into an entity type.
    pub fn select_raw(&mut self, sql: &str, params: &[Value]) -> OrmResult<Vec<Row>> {
        self.query(sql, params)
    }

    fn projection(&self, type_desc: &TypeDesc, options: &ReadOptions<impl DataObject>) -> Vec<String> {
        if !options.fields.is_empty() {
            return options.fields.clone();
        }
        type_desc
            .fields
            .values()
            .filter(|f| options.ignore_delayed || !f.delayed)
            .map(|f| f.name.clone())
            .collect()
    }

    fn materialize<T: DataObject + Default>(&self, type_desc: &TypeDesc, row: &Row) -> OrmResult<T> {
        let mut entity = T::default();
        for desc in type_desc.fields.values() {
            let Some(raw) = row.get(&desc.name) else {
                continue;
            };
            let host_value = self.dialect.from_db(raw, desc.host_type)?;
            entity.set_field_value(&desc.name, host_value)?;
        }
        entity.commit();
        entity.after_load();
        Ok(entity)
    }

    /// Load a single row by primary key.
    pub fn select_one<T: DataObject + Default>(
        &mut self,
        type_desc: &'static TypeDesc,
        key: Uuid,
        options: &ReadOptions<T>
    ) -> OrmResult<Option<T>> {
        let key_field = type_desc
            .key_field()
            .ok_or_else(|| OrmError::structural("entity has no primary key"))?;
        let fields = self.projection(type_desc, options).join(", ");
        let sql = format!("SELECT {fields} FROM {} WHERE {} = ?", type_desc.name, key_field.name);
        let rows = self.query(&sql, &[Value::String(key.to_string())])?;
        match rows.first() {
            Some(row) => Ok(Some(self.materialize(type_desc, row)?)),
            None => Ok(None)
        }
    }

    /// Load every matching row, applying `options.filter` after
    /// materialization.
    pub fn select_list<T: DataObject + Default>(
        &mut self,
        type_desc: &'static TypeDesc,
        options: &ReadOptions<T>
    ) -> OrmResult<Vec<T>> {
        let fields = self.projection(type_desc, options).join(", ");
        let mut sql = format!("SELECT {fields} FROM {}", type_desc.name);

        if let Some(group_on) = &options.group_on {
            sql.push_str(&format!(" GROUP BY {group_on}"));
        }
        if let Some(order_by) = &options.order_by {
            let dir = match options.order_mode {
                OrderMode::Descending => "DESC",
                _ => "ASC"
            };
            sql.push_str(&format!(" ORDER BY {order_by} {dir}"));
        }
        if options.max_records > 0 {
            if let crate::dialect::TopClause::Leading(clause) = self.dialect.top_clause(options.max_records) {
                sql = sql.replacen("SELECT", &format!("SELECT {clause}"), 1);
            } else if let crate::dialect::TopClause::Trailing(clause) = self.dialect.top_clause(options.max_records) {
                sql.push(' ');
                sql.push_str(&clause);
            }
        }

        let rows = self.query(&sql, &[])?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let entity = self.materialize::<T>(type_desc, row)?;
            if options.filter.as_ref().is_none_or(|f| f(&entity)) {
                out.push(entity);
            }
            if options.max_records > 0 && out.len() as u32 >= options.max_records {
                break;
            }
        }
        Ok(out)
    }

    /// Run `sql` as a statement with no result, used by the schema engine
    /// for DDL that the dialect translator has already fully rendered.
    pub(crate) fn execute_ddl(&mut self, sql: &str) -> OrmResult<()> {
        self.execute(sql, &[]).map(|_| ())
    }

    /// `true` if `exists_sql` (an already-rendered existence probe) returns
    /// at least one row.
    pub(crate) fn table_exists(&mut self, exists_sql: &str) -> OrmResult<bool> {
        Ok(!self.query(exists_sql, &[])?.is_empty())
    }

    /// Run an already-rendered scalar probe with no parameters, used by the
    /// schema engine to read catalog metadata (e.g. a live column's width).
    pub(crate) fn scalar_probe(&mut self, sql: &str) -> OrmResult<Value> {
        self.scalar(sql, &[])
    }

    /// Column names of `table`, discovered from one live row. Returns an
    /// empty list for a table with no rows yet, which is a known
    /// limitation of probing via `SELECT *` rather than a catalog query.
    pub(crate) fn live_columns(&mut self, table: &str) -> OrmResult<Vec<String>> {
        let rows = self.query(&format!("SELECT * FROM {table}"), &[])?;
        Ok(rows
            .first()
            .map(|row| row.column_names().map(str::to_string).collect())
            .unwrap_or_default())
    }

    pub(crate) fn load_system_information(
        &mut self,
        entity_name: &str
    ) -> OrmResult<Option<crate::schema::SystemInformation>> {
        let rows = self.query(
            "SELECT id, entity_name, entity_id, declared_version, maintenance FROM system_information WHERE entity_name = ?",
            &[Value::String(entity_name.to_string())]
        )?;
        rows.first().map(system_information_from_row).transpose()
    }

    pub(crate) fn insert_system_information(&mut self, info: &crate::schema::SystemInformation) -> OrmResult<()> {
        self.execute(
            "INSERT INTO system_information (id, entity_name, entity_id, declared_version, maintenance) VALUES (?, ?, ?, ?, ?)",
            &[
                Value::String(info.id.to_string()),
                Value::String(info.entity_name.clone()),
                Value::I32(info.entity_id as i32),
                Value::I32(info.declared_version as i32),
                Value::Bool(info.maintenance),
            ]
        )?;
        Ok(())
    }

    pub(crate) fn update_system_information_maintenance(&mut self, entity_name: &str, value: bool) -> OrmResult<()> {
        self.execute(
            "UPDATE system_information SET maintenance = ? WHERE entity_name = ?",
            &[Value::Bool(value), Value::String(entity_name.to_string())]
        )?;
        Ok(())
    }

    pub(crate) fn update_system_information_version(&mut self, entity_name: &str, version: u32) -> OrmResult<()> {
        self.execute(
            "UPDATE system_information SET declared_version = ? WHERE entity_name = ?",
            &[Value::I32(version as i32), Value::String(entity_name.to_string())]
        )?;
        Ok(())
    }

    /// Fetch a single delayed field's value on demand.
    pub fn load_delayed_field(&mut self, type_desc: &TypeDesc, key: Uuid, field: &str) -> OrmResult<Value> {
        let key_field = type_desc
            .key_field()
            .ok_or_else(|| OrmError::structural("entity has no primary key"))?;
        let desc = type_desc
            .fields
            .get(field)
            .ok_or_else(|| OrmError::structural(format!("no such field {field}")))?;
        let sql = format!("SELECT {field} FROM {} WHERE {} = ?", type_desc.name, key_field.name);
        let raw = self.scalar(&sql, &[Value::String(key.to_string())])?;
        self.dialect.from_db(&raw, desc.host_type)
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::registry::{EntityKind, FieldDesc, HostType};

    fn person_desc() -> &'static TypeDesc {
        let mut fields = IndexMap::new();
        fields.insert(
            "id".to_string(),
            FieldDesc::new("id", HostType::Guid).with_role(FieldRole::PrimaryKey)
        );
        fields.insert(
            "created".to_string(),
            FieldDesc::new("created", HostType::DateTime).with_role(FieldRole::TimestampCreated)
        );
        fields.insert(
            "changed".to_string(),
            FieldDesc::new("changed", HostType::DateTime).with_role(FieldRole::TimestampChanged)
        );
        fields.insert("name".to_string(), FieldDesc::new("name", HostType::String));
        Box::leak(Box::new(TypeDesc {
            kind: EntityKind::Table,
            name: "connection_test_person".to_string(),
            id: 500,
            version: 1,
            use_cache: false,
            log_changes: false,
            master_type: None,
            query_template: None,
            fields
        }))
    }

    #[derive(Default)]
    struct Person {
        id: Uuid,
        created: chrono::NaiveDateTime,
        changed: chrono::NaiveDateTime,
        name: String,
        buffer: crate::tracking::ChangeBuffer
    }

    impl DataObject for Person {
        fn type_desc(&self) -> &'static TypeDesc {
            person_desc()
        }
        fn primary_key(&self) -> Uuid {
            self.id
        }
        fn set_primary_key(&mut self, value: Uuid) {
            self.id = value;
        }
        fn created(&self) -> chrono::NaiveDateTime {
            self.created
        }
        fn set_created(&mut self, value: chrono::NaiveDateTime) {
            self.created = value;
        }
        fn changed(&self) -> chrono::NaiveDateTime {
            self.changed
        }
        fn set_changed(&mut self, value: chrono::NaiveDateTime) {
            self.changed = value;
        }
        fn change_buffer(&self) -> &crate::tracking::ChangeBuffer {
            &self.buffer
        }
        fn change_buffer_mut(&mut self) -> &mut crate::tracking::ChangeBuffer {
            &mut self.buffer
        }
        fn field_value(&self, name: &str) -> OrmResult<Value> {
            match name {
                "id" => Ok(Value::Guid(self.id)),
                "created" => Ok(Value::DateTime(self.created)),
                "changed" => Ok(Value::DateTime(self.changed)),
                "name" => Ok(Value::String(self.name.clone())),
                other => Err(OrmError::structural(format!("no such field {other}")))
            }
        }
        fn set_field_value(&mut self, name: &str, value: Value) -> OrmResult<()> {
            match (name, value) {
                ("id", Value::Guid(g)) => self.id = g,
                ("created", Value::DateTime(d)) => self.created = d,
                ("changed", Value::DateTime(d)) => self.changed = d,
                ("name", Value::String(s)) => {
                    let old = Value::String(self.name.clone());
                    self.buffer.set("name", &old, &Value::String(s.clone()));
                    self.name = s;
                }
                (other, _) => return Err(OrmError::structural(format!("no such field {other}")))
            }
            Ok(())
        }
        fn is_delayed_loaded(&self, _field: &str) -> bool {
            true
        }
        fn mark_delayed_loaded(&mut self, _field: &str) {}
        fn reset_delayed_loaded(&mut self) {}
    }

    #[derive(Default)]
    struct FakeDriver {
        rows: Vec<Row>,
        executed: Vec<String>,
        fail_commit: bool
    }

    impl Driver for FakeDriver {
        fn execute(&mut self, sql: &str, _params: &[Value]) -> Result<u64, String> {
            self.executed.push(sql.to_string());
            Ok(1)
        }
        fn query(&mut self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>, String> {
            Ok(self.rows.clone())
        }
        fn scalar(&mut self, _sql: &str, _params: &[Value]) -> Result<Value, String> {
            Ok(Value::Null)
        }
        fn begin_transaction(&mut self) -> Result<(), String> {
            Ok(())
        }
        fn commit_transaction(&mut self) -> Result<(), String> {
            if self.fail_commit {
                Err("boom".to_string())
            } else {
                Ok(())
            }
        }
        fn rollback_transaction(&mut self) -> Result<(), String> {
            Ok(())
        }
    }

    #[test]
    fn placeholder_rewrite_is_positional() {
        assert_eq!(bind_placeholders("a = ? AND b = ?"), "a = @p0 AND b = @p1");
    }

    #[test]
    fn insert_generates_a_fresh_primary_key_and_timestamps() {
        let driver = FakeDriver::default();
        let mut conn = Connection::new(driver, Dialect::PostgreSql, ConflictMode::FirstWins);
        let mut person = Person {
            name: "Ada".to_string(),
            ..Default::default()
        };
        conn.save(&mut person, &ReadOptions::default()).unwrap();

        assert!(!person.primary_key().is_nil());
        assert!(person.created() > chrono::NaiveDateTime::MIN);
        assert!(!person.is_dirty());
    }

    #[test]
    fn begin_twice_is_a_connection_error() {
        let mut conn = Connection::new(FakeDriver::default(), Dialect::PostgreSql, ConflictMode::FirstWins);
        conn.begin().unwrap();
        assert!(conn.begin().is_err());
    }

    #[test]
    fn failed_commit_surfaces_as_transaction_error_and_drops_no_events() {
        let driver = FakeDriver {
            fail_commit: true,
            ..Default::default()
        };
        let mut conn = Connection::new(driver, Dialect::PostgreSql, ConflictMode::FirstWins);
        conn.begin().unwrap();
        let mut person = Person {
            name: "Ada".to_string(),
            ..Default::default()
        };
        conn.save(&mut person, &ReadOptions::default()).unwrap();
        let err = conn.commit().unwrap_err();
        assert!(matches!(err, OrmError::Transaction(_)));
    }

    #[test]
    fn rollback_clears_outbox_without_delivering() {
        let mut conn = Connection::new(FakeDriver::default(), Dialect::PostgreSql, ConflictMode::FirstWins);
        conn.begin().unwrap();
        let mut person = Person {
            name: "Ada".to_string(),
            ..Default::default()
        };
        conn.save(&mut person, &ReadOptions::default()).unwrap();
        assert_eq!(conn.outbox.len(), 1);
        conn.rollback().unwrap();
        assert!(conn.outbox.is_empty());
    }

    #[test]
    fn select_list_respects_filter() {
        let mut driver = FakeDriver::default();
        driver.rows = vec![
            Row::new(vec![("name".to_string(), Value::String("Ada".to_string()))]),
            Row::new(vec![("name".to_string(), Value::String("Bob".to_string()))]),
        ];
        let mut conn = Connection::new(driver, Dialect::PostgreSql, ConflictMode::FirstWins);
        let options: ReadOptions<Person> = ReadOptions {
            filter: Some(Box::new(|p: &Person| p.name == "Ada")),
            ..Default::default()
        };
        let results: Vec<Person> = conn.select_list(person_desc(), &options).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Ada");
    }
}
