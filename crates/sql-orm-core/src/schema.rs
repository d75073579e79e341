// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! The schema evolution engine (C6): converges a live database onto the
//! shape declared by the registered [`TypeDesc`]s, guarded by a
//! per-entity declared version recorded in `SystemInformation`.

use uuid::Uuid;

use crate::{
    config::Configuration,
    connection::{Connection, Driver},
    dialect::{CommandKind, ObjectKind, TriggerEvent},
    error::{OrmError, OrmResult},
    logging::trace_ddl,
    registry::{EntityKind, FieldDesc, FieldRole, HostType, TypeDesc}
};

/// One row of the `SystemInformation` bookkeeping table (spec §6): tracks,
/// per entity, which declared schema version has already been converged.
#[derive(Debug, Clone)]
pub struct SystemInformation {
    /// Primary key.
    pub id: Uuid,
    /// The entity name this row tracks; indexed and unique, at most 200
    /// characters.
    pub entity_name: String,
    /// The entity's declared id; indexed and unique.
    pub entity_id: u32,
    /// The schema version already converged against the live database.
    pub declared_version: u32,
    /// `true` while a convergence pass for this entity is in flight, so a
    /// crash mid-migration is detectable on the next run.
    pub maintenance: bool
}

impl SystemInformation {
    const TABLE: &'static str = "system_information";

    fn create_table_sql<D: Driver>(conn: &Connection<D>) -> String {
        let dialect = conn.dialect();
        format!(
            "CREATE TABLE {} (id {} PRIMARY KEY, entity_name {} NOT NULL UNIQUE, entity_id INTEGER NOT NULL UNIQUE, \
             declared_version INTEGER NOT NULL, maintenance {} NOT NULL)",
            Self::TABLE,
            dialect.command(CommandKind::FieldDef(HostType::Guid)),
            dialect
                .command(CommandKind::FieldDef(HostType::String))
                .replace("#SIZE#", "200"),
            dialect.command(CommandKind::FieldDef(HostType::Bool))
        )
    }
}

/// Entry point of spec §4.6: converge `type_desc` (and, recursively, every
/// entity it references via a foreign key) onto the live database.
///
/// `force` re-runs every DDL step even if `declared_version` already
/// matches, which is useful for repairing a database that drifted out of
/// band.
pub fn check<D: Driver>(
    conn: &mut Connection<D>,
    config: &Configuration,
    type_desc: &'static TypeDesc,
    force: bool
) -> OrmResult<()> {
    ensure_system_information_table(conn)?;

    let mut info = load_or_create_system_information(conn, type_desc)?;
    if !force && info.declared_version >= type_desc.version && !info.maintenance {
        return Ok(());
    }

    set_maintenance(conn, &info, true)?;
    info.maintenance = true;

    let result = match type_desc.kind {
        EntityKind::Table => check_table(conn, config, type_desc),
        EntityKind::View => check_view(conn, type_desc)
    };

    result?;

    set_maintenance(conn, &info, false)?;
    set_declared_version(conn, &info, type_desc.version)?;
    Ok(())
}

fn ensure_system_information_table<D: Driver>(conn: &mut Connection<D>) -> OrmResult<()> {
    let exists_sql = conn
        .dialect()
        .command(CommandKind::Exist(ObjectKind::Table))
        .replace("#NAME#", &format!("'{}'", SystemInformation::TABLE));
    if conn.table_exists(&exists_sql)? {
        return Ok(());
    }
    let sql = SystemInformation::create_table_sql(conn);
    apply_ddl(conn, &sql)
}

fn load_or_create_system_information<D: Driver>(
    conn: &mut Connection<D>,
    type_desc: &TypeDesc
) -> OrmResult<SystemInformation> {
    if let Some(found) = conn.load_system_information(&type_desc.name)? {
        return Ok(found);
    }
    let fresh = SystemInformation {
        id: Uuid::new_v4(),
        entity_name: type_desc.name.clone(),
        entity_id: type_desc.id,
        declared_version: 0,
        maintenance: false
    };
    conn.insert_system_information(&fresh)?;
    Ok(fresh)
}

fn set_maintenance<D: Driver>(conn: &mut Connection<D>, info: &SystemInformation, value: bool) -> OrmResult<()> {
    conn.update_system_information_maintenance(&info.entity_name, value)
}

fn set_declared_version<D: Driver>(conn: &mut Connection<D>, info: &SystemInformation, version: u32) -> OrmResult<()> {
    conn.update_system_information_version(&info.entity_name, version)
}

fn check_table<D: Driver>(conn: &mut Connection<D>, config: &Configuration, type_desc: &'static TypeDesc) -> OrmResult<()> {
    let table_exists_sql = conn
        .dialect()
        .command(CommandKind::Exist(ObjectKind::Table))
        .replace("#NAME#", &format!("'{}'", type_desc.name));

    if !conn.table_exists(&table_exists_sql)? {
        create_table(conn, type_desc)?;
    } else {
        for field in type_desc.fields.values() {
            converge_field(conn, type_desc, field)?;
        }
        if config.allow_drop_columns {
            drop_undeclared_columns(conn, type_desc)?;
        }
    }

    converge_indexes(conn, type_desc)?;
    converge_foreign_keys(conn, config, type_desc)?;
    Ok(())
}

/// Create `type_desc`'s table and, if it declares a key and a
/// changed-timestamp, its BEFORE INSERT/BEFORE UPDATE triggers — all
/// within one driver transaction (spec §4.6.3), so a failed trigger
/// install never leaves a table with no timestamp maintenance behind.
fn create_table<D: Driver>(conn: &mut Connection<D>, type_desc: &TypeDesc) -> OrmResult<()> {
    let dialect = conn.dialect();
    let columns: Vec<String> = type_desc
        .fields
        .values()
        .map(|field| {
            let mut def = dialect.command(CommandKind::FieldDef(field.host_type));
            def = def.replace("#SIZE#", &field.max_length.to_string());
            def = def.replace("#BLOCKSIZE#", &field.blob_block_size.to_string());
            if field.role == FieldRole::PrimaryKey {
                format!("{} {} PRIMARY KEY", field.name, def)
            } else {
                format!("{} {}{}", field.name, def, if field.unique { " UNIQUE" } else { "" })
            }
        })
        .collect();

    let sql = dialect
        .command(CommandKind::Create(ObjectKind::Table))
        .replace("#TABLENAME#", &type_desc.name)
        .replace("#FIELDS#", &columns.join(", "));

    conn.begin()?;
    if let Err(err) = create_table_and_triggers(conn, type_desc, &sql) {
        let _ = conn.rollback();
        return Err(err);
    }
    conn.commit()
}

fn create_table_and_triggers<D: Driver>(conn: &mut Connection<D>, type_desc: &TypeDesc, create_sql: &str) -> OrmResult<()> {
    apply_ddl(conn, create_sql)?;

    if let (Some(key_field), Some(changed_field)) = (type_desc.key_field(), type_desc.changed_field()) {
        let key_field = key_field.name.clone();
        let changed_field = changed_field.name.clone();
        install_trigger(
            conn,
            type_desc,
            TriggerEvent::BeforeInsert,
            CommandKind::TriggerBeforeInsertBody,
            "bi",
            &key_field,
            &changed_field
        )?;
        install_trigger(
            conn,
            type_desc,
            TriggerEvent::BeforeUpdate,
            CommandKind::TriggerBeforeUpdateBody,
            "bu",
            &key_field,
            &changed_field
        )?;
    }
    Ok(())
}

fn install_trigger<D: Driver>(
    conn: &mut Connection<D>,
    type_desc: &TypeDesc,
    event: TriggerEvent,
    body_kind: CommandKind,
    name_suffix: &str,
    key_field: &str,
    changed_field: &str
) -> OrmResult<()> {
    let dialect = conn.dialect();
    let body = dialect
        .command(body_kind)
        .replace("#FIELDNAMEKEY#", key_field)
        .replace("#CODE#", changed_field)
        .replace("#TABLENAME#", &type_desc.name);

    let name = format!("trg_{}_{name_suffix}", type_desc.name);
    let sql = dialect
        .command(CommandKind::Create(ObjectKind::Trigger))
        .replace("#NAME#", &name)
        .replace("#EVENT#", dialect.trigger_event(event))
        .replace("#TABLENAME#", &type_desc.name)
        .replace("#CODE#", &body);
    apply_ddl(conn, &sql)
}

fn converge_field<D: Driver>(conn: &mut Connection<D>, type_desc: &TypeDesc, field: &FieldDesc) -> OrmResult<()> {
    let dialect = conn.dialect();
    let exists_sql = dialect
        .command(CommandKind::Exist(ObjectKind::Field))
        .replace("#TABLENAME#", &format!("'{}'", type_desc.name))
        .replace("#NAME#", &format!("'{}'", field.name));

    if conn.table_exists(&exists_sql)? {
        if matches!(field.host_type, HostType::String | HostType::TypeName) {
            widen_field_if_narrower(conn, type_desc, field)?;
        }
        return Ok(());
    }

    let mut field_def = dialect.command(CommandKind::FieldDef(field.host_type));
    field_def = field_def.replace("#SIZE#", &field.max_length.to_string());
    field_def = field_def.replace("#BLOCKSIZE#", &field.blob_block_size.to_string());

    let sql = dialect
        .command(CommandKind::Create(ObjectKind::Field))
        .replace("#TABLENAME#", &type_desc.name)
        .replace("#NAME#", &field.name)
        .replace("#FIELDOPTIONS#", &field_def);
    apply_ddl(conn, &sql)
}

/// If `field` already exists but its live column is a narrower string than
/// declared, widen it (spec §4.6.3: "issue `alter_field_length`").
fn widen_field_if_narrower<D: Driver>(conn: &mut Connection<D>, type_desc: &TypeDesc, field: &FieldDesc) -> OrmResult<()> {
    let dialect = conn.dialect();
    let length_sql = dialect
        .command(CommandKind::FieldLength)
        .replace("#TABLENAME#", &format!("'{}'", type_desc.name))
        .replace("#NAME#", &format!("'{}'", field.name));

    let live_length = match conn.scalar_probe(&length_sql)? {
        crate::codec::Value::I32(n) => n as i64,
        crate::codec::Value::I64(n) => n,
        _ => return Ok(())
    };
    if live_length >= field.max_length as i64 {
        return Ok(());
    }

    let sql = dialect
        .command(CommandKind::AlterFieldLength(field.host_type))
        .replace("#TABLENAME#", &type_desc.name)
        .replace("#NAME#", &field.name)
        .replace("#SIZE#", &field.max_length.to_string());
    apply_ddl(conn, &sql)
}

fn drop_undeclared_columns<D: Driver>(conn: &mut Connection<D>, type_desc: &TypeDesc) -> OrmResult<()> {
    let live_columns = conn.live_columns(&type_desc.name)?;
    for column in live_columns {
        if type_desc.fields.contains_key(&column) {
            continue;
        }
        let sql = conn
            .dialect()
            .command(CommandKind::Drop(ObjectKind::Field))
            .replace("#TABLENAME#", &type_desc.name)
            .replace("#NAME#", &column);
        apply_ddl(conn, &sql)?;
    }
    Ok(())
}

fn converge_indexes<D: Driver>(conn: &mut Connection<D>, type_desc: &TypeDesc) -> OrmResult<()> {
    for field in type_desc.fields.values() {
        if !field.indexed && field.index_definition.is_none() {
            continue;
        }
        let index_name = if field.role == FieldRole::None {
            format!("IDX_{}", field.name)
        } else {
            format!("IDX_{}_{}", field.name, type_desc.id)
        };
        let exists_sql = conn
            .dialect()
            .command(CommandKind::Exist(ObjectKind::Index))
            .replace("#NAME#", &format!("'{index_name}'"));
        if conn.table_exists(&exists_sql)? {
            continue;
        }
        let options = if field.unique { "UNIQUE" } else { "" };
        let columns = field.index_definition.clone().unwrap_or_else(|| field.name.clone());
        let sql = conn
            .dialect()
            .command(CommandKind::Create(ObjectKind::Index))
            .replace("#FIELDOPTIONS#", options)
            .replace("#NAME#", &index_name)
            .replace("#TABLENAME#", &type_desc.name)
            .replace("#FIELDS#", &columns);
        apply_ddl(conn, &sql)?;
    }
    Ok(())
}

fn converge_foreign_keys<D: Driver>(conn: &mut Connection<D>, config: &Configuration, type_desc: &'static TypeDesc) -> OrmResult<()> {
    for field in type_desc.fields.values() {
        let Some(referenced_name) = &field.constraint_type else {
            continue;
        };
        let Some(referenced) = crate::registry::Registry::global().find_by_name(referenced_name) else {
            continue;
        };

        check(conn, config, referenced, false)?;

        let constraint_name = format!("FKEY_{}", field.name);
        let exists_sql = conn
            .dialect()
            .command(CommandKind::Exist(ObjectKind::Constraint))
            .replace("#NAME#", &format!("'{constraint_name}'"));
        if conn.table_exists(&exists_sql)? {
            continue;
        }

        let referenced_key = referenced
            .key_field()
            .ok_or_else(|| OrmError::structural(format!("{referenced_name} has no primary key to reference")))?;

        let sql = conn
            .dialect()
            .command(CommandKind::Create(ObjectKind::Constraint))
            .replace("#TABLENAME#", &type_desc.name)
            .replace("#NAME#", &constraint_name)
            .replace("#FIELDNAMEKEY#", &field.name)
            .replace("#FIELDOPTIONS#", &referenced.name)
            .replace("#EVENTCODE#", &referenced_key.name);
        apply_ddl(conn, &sql)?;
    }
    Ok(())
}

fn check_view<D: Driver>(conn: &mut Connection<D>, type_desc: &TypeDesc) -> OrmResult<()> {
    let template = type_desc
        .query_template
        .as_deref()
        .ok_or_else(|| OrmError::structural(format!("view {} has no query_template", type_desc.name)))?;

    let field_list: Vec<String> = type_desc
        .fields
        .values()
        .map(|f| f.source_field.clone().unwrap_or_else(|| f.name.clone()))
        .collect();
    let query = template.replace("#FIELDS#", &field_list.join(", "));

    let exists_sql = conn
        .dialect()
        .command(CommandKind::Exist(ObjectKind::View))
        .replace("#NAME#", &format!("'{}'", type_desc.name));

    if conn.table_exists(&exists_sql)? {
        let drop_sql = conn
            .dialect()
            .command(CommandKind::Drop(ObjectKind::View))
            .replace("#TABLENAME#", &type_desc.name);
        apply_ddl(conn, &drop_sql)?;
    }

    let create_sql = conn
        .dialect()
        .command(CommandKind::Create(ObjectKind::View))
        .replace("#TABLENAME#", &type_desc.name)
        .replace("#QUERY#", &query);
    apply_ddl(conn, &create_sql)
}

/// Run one DDL statement, wrapped in the dialect's `before_alter_schema`/
/// `after_alter_schema` statements (spec §4.6), which carry the session
/// flags a dialect needs around a schema change (e.g. Firebird disabling
/// constraint checks mid-migration). Empty wrapper templates are skipped.
fn apply_ddl<D: Driver>(conn: &mut Connection<D>, sql: &str) -> OrmResult<()> {
    let dialect = conn.dialect();

    let before = dialect.command(CommandKind::BeforeAlterSchema);
    if !before.is_empty() {
        conn.execute_ddl(&before)?;
    }

    trace_ddl(sql);
    let result = conn.execute_ddl(sql);

    let after = dialect.command(CommandKind::AfterAlterSchema);
    if !after.is_empty() {
        conn.execute_ddl(&after)?;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::Value, config::ConflictMode, connection::Row, dialect::Dialect, registry::HostType};
    use indexmap::IndexMap;

    /// A tiny stateful stand-in for a real driver: tracks which tables have
    /// been created (so existence probes and DDL convergence are
    /// idempotent) and a single hand-rolled `system_information` store.
    #[derive(Default)]
    struct FakeDriver {
        tables: std::collections::HashSet<String>,
        system_info: Vec<(Uuid, String, u32, u32, bool)>,
        ddl_log: Vec<String>
    }

    fn quoted_name(sql: &str) -> Option<String> {
        let start = sql.find('\'')? + 1;
        let end = sql[start..].find('\'')? + start;
        Some(sql[start..end].to_string())
    }

    impl Driver for FakeDriver {
        fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, String> {
            self.ddl_log.push(sql.to_string());

            if let Some(rest) = sql.strip_prefix("CREATE TABLE ") {
                let name = rest.split(['(', ' ']).next().unwrap_or_default();
                self.tables.insert(name.to_string());
            } else if sql.starts_with("INSERT INTO system_information") {
                let id = match &params[0] {
                    Value::String(s) => Uuid::parse_str(s).unwrap(),
                    _ => unreachable!()
                };
                let name = match &params[1] {
                    Value::String(s) => s.clone(),
                    _ => unreachable!()
                };
                let entity_id = match &params[2] {
                    Value::I32(n) => *n as u32,
                    _ => unreachable!()
                };
                let version = match &params[3] {
                    Value::I32(n) => *n as u32,
                    _ => unreachable!()
                };
                let maintenance = matches!(&params[4], Value::Bool(true));
                self.system_info.push((id, name, entity_id, version, maintenance));
            } else if sql.starts_with("UPDATE system_information SET maintenance") {
                let value = matches!(&params[0], Value::Bool(true));
                let name = match &params[1] {
                    Value::String(s) => s.clone(),
                    _ => unreachable!()
                };
                if let Some(row) = self.system_info.iter_mut().find(|r| r.1 == name) {
                    row.4 = value;
                }
            } else if sql.starts_with("UPDATE system_information SET declared_version") {
                let version = match &params[0] {
                    Value::I32(n) => *n as u32,
                    _ => unreachable!()
                };
                let name = match &params[1] {
                    Value::String(s) => s.clone(),
                    _ => unreachable!()
                };
                if let Some(row) = self.system_info.iter_mut().find(|r| r.1 == name) {
                    row.3 = version;
                }
            }
            Ok(0)
        }

        fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, String> {
            if sql.starts_with("SELECT id, entity_name, entity_id, declared_version, maintenance FROM system_information") {
                let name = match &params[0] {
                    Value::String(s) => s.clone(),
                    _ => unreachable!()
                };
                return Ok(self
                    .system_info
                    .iter()
                    .find(|r| r.1 == name)
                    .map(|(id, name, entity_id, version, maintenance)| {
                        vec![Row::new(vec![
                            ("id".to_string(), Value::String(id.to_string())),
                            ("entity_name".to_string(), Value::String(name.clone())),
                            ("entity_id".to_string(), Value::I32(*entity_id as i32)),
                            ("declared_version".to_string(), Value::I32(*version as i32)),
                            ("maintenance".to_string(), Value::Bool(*maintenance)),
                        ])]
                    })
                    .unwrap_or_default());
            }

            if let Some(name) = quoted_name(sql)
                && self.tables.contains(&name)
            {
                return Ok(vec![Row::new(vec![("ok".to_string(), Value::I32(1))])]);
            }
            Ok(vec![])
        }

        fn scalar(&mut self, _sql: &str, _params: &[Value]) -> Result<Value, String> {
            Ok(Value::Null)
        }
        fn begin_transaction(&mut self) -> Result<(), String> {
            Ok(())
        }
        fn commit_transaction(&mut self) -> Result<(), String> {
            Ok(())
        }
        fn rollback_transaction(&mut self) -> Result<(), String> {
            Ok(())
        }
    }

    fn widget_desc() -> &'static TypeDesc {
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
        Box::leak(Box::new(TypeDesc {
            kind: EntityKind::Table,
            name: "schema_test_widget".to_string(),
            id: 600,
            version: 1,
            use_cache: false,
            log_changes: false,
            master_type: None,
            query_template: None,
            fields
        }))
    }

    #[test]
    fn converging_a_missing_table_emits_create_table() {
        let mut conn = Connection::new(FakeDriver::default(), Dialect::PostgreSql, ConflictMode::FirstWins);
        let config = Configuration::default();
        check(&mut conn, &config, widget_desc(), false).unwrap();
        assert!(
            conn.driver()
                .ddl_log
                .iter()
                .any(|s| s.starts_with("CREATE TABLE schema_test_widget"))
        );
    }

    #[test]
    fn already_converged_version_is_a_no_op_on_second_pass() {
        let mut conn = Connection::new(FakeDriver::default(), Dialect::PostgreSql, ConflictMode::FirstWins);
        let config = Configuration::default();
        let desc = widget_desc();
        check(&mut conn, &config, desc, false).unwrap();
        let before = conn.driver().ddl_log.len();
        check(&mut conn, &config, desc, false).unwrap();
        assert_eq!(conn.driver().ddl_log.len(), before);
    }
}
