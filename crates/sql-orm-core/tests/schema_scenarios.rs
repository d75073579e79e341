// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! Exercises schema convergence (C6) against a hand-rolled in-memory
//! [`Driver`], covering the three-pass lifecycle: create from nothing,
//! converge a version bump onto a live table, then a fully-converged
//! no-op pass.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use sql_orm_core::{
    codec::Value,
    config::{ConflictMode, Configuration},
    connection::{Connection, Driver, Row},
    dialect::Dialect,
    registry::{EntityKind, FieldDesc, FieldRole, HostType, TypeDesc},
    schema::check
};
use uuid::Uuid;

/// Pulls every single-quoted substring out of an existence-probe query, in
/// order. PostgreSQL's field-existence probe carries two (table, column).
fn quoted_names(sql: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = sql;
    while let Some(start) = rest.find('\'') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('\'') else { break };
        names.push(after[..end].to_string());
        rest = &after[end + 1..];
    }
    names
}

#[derive(Default)]
struct TableDriver {
    tables: HashSet<String>,
    columns: HashMap<String, HashSet<String>>,
    indexes: HashSet<String>,
    system_info: Vec<(Uuid, String, u32, u32, bool)>,
    ddl_log: Vec<String>
}

impl Driver for TableDriver {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, String> {
        self.ddl_log.push(sql.to_string());

        if let Some(rest) = sql.strip_prefix("CREATE TABLE ") {
            let name = rest.split(['(', ' ']).next().unwrap_or_default().to_string();
            let open = rest.find('(').unwrap();
            let close = rest.rfind(')').unwrap();
            let cols: HashSet<String> = rest[open + 1..close]
                .split(", ")
                .map(|def| def.split(' ').next().unwrap().to_string())
                .collect();
            self.columns.insert(name.clone(), cols);
            self.tables.insert(name);
        } else if let Some(rest) = sql.strip_prefix("ALTER TABLE ") {
            let mut parts = rest.split(' ');
            let table = parts.next().unwrap_or_default().to_string();
            if rest.contains("ADD COLUMN") {
                let column = rest.split("ADD COLUMN ").nth(1).unwrap().split(' ').next().unwrap().to_string();
                self.columns.entry(table).or_default().insert(column);
            }
        } else if sql.starts_with("CREATE") && sql.contains("INDEX") {
            let name = sql.split("INDEX ").nth(1).unwrap().split(' ').next().unwrap().to_string();
            self.indexes.insert(name);
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

        if sql.contains("information_schema.columns") {
            let names = quoted_names(sql);
            let (table, column) = (&names[0], &names[1]);
            let found = self.columns.get(table).is_some_and(|cols| cols.contains(column));
            return Ok(if found {
                vec![Row::new(vec![("ok".to_string(), Value::I32(1))])]
            } else {
                vec![]
            });
        }
        if sql.contains("information_schema.tables") {
            let name = &quoted_names(sql)[0];
            return Ok(if self.tables.contains(name) {
                vec![Row::new(vec![("ok".to_string(), Value::I32(1))])]
            } else {
                vec![]
            });
        }
        if sql.contains("pg_indexes") {
            let name = &quoted_names(sql)[0];
            return Ok(if self.indexes.contains(name) {
                vec![Row::new(vec![("ok".to_string(), Value::I32(1))])]
            } else {
                vec![]
            });
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

fn person_desc(version: u32, with_city: bool) -> &'static TypeDesc {
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
    fields.insert(
        "name".to_string(),
        FieldDesc::new("name", HostType::String).with_max_length(100).with_indexed(true)
    );
    if with_city {
        fields.insert(
            "city".to_string(),
            FieldDesc::new("city", HostType::String).with_max_length(100).with_indexed(true)
        );
    }
    Box::leak(Box::new(TypeDesc {
        kind: EntityKind::Table,
        name: "scenario_person_f".to_string(),
        id: 800,
        version,
        use_cache: false,
        log_changes: false,
        master_type: None,
        query_template: None,
        fields
    }))
}

#[test]
fn scenario_f_schema_converges_then_version_bump_adds_one_column_and_index_then_settles() {
    let mut conn = Connection::new(TableDriver::default(), Dialect::PostgreSql, ConflictMode::FirstWins);
    let config = Configuration::default();

    // Pass 1: empty database. Creates system_information, the table, and
    // the index on `name`.
    let v1 = person_desc(1, false);
    check(&mut conn, &config, v1, false).unwrap();
    assert!(conn.driver().ddl_log.iter().any(|s| s.starts_with("CREATE TABLE scenario_person_f")));
    assert!(
        conn.driver()
            .ddl_log
            .iter()
            .any(|s| s.contains("INDEX") && s.contains("scenario_person_f") && s.contains("(name)"))
    );
    assert!(
        conn.driver()
            .ddl_log
            .iter()
            .any(|s| s.starts_with("CREATE TRIGGER") && s.contains("BEFORE INSERT") && s.contains("scenario_person_f"))
    );
    assert!(
        conn.driver()
            .ddl_log
            .iter()
            .any(|s| s.starts_with("CREATE TRIGGER") && s.contains("BEFORE UPDATE") && s.contains("scenario_person_f"))
    );
    let (_, _, _, version, _) = conn
        .driver()
        .system_info
        .iter()
        .find(|r| r.1 == "scenario_person_f")
        .cloned()
        .unwrap();
    assert_eq!(version, 1);

    // Pass 2: declared version bumps to 2 and adds `city`. Converges only
    // the new column and its index; every other column and index is
    // already present and must not be touched again.
    let before = conn.driver().ddl_log.len();
    let v2 = person_desc(2, true);
    check(&mut conn, &config, v2, false).unwrap();
    let added: Vec<&String> = conn.driver().ddl_log[before..].iter().collect();

    let added_columns: Vec<&&String> = added.iter().filter(|s| s.starts_with("ALTER TABLE")).collect();
    assert_eq!(added_columns.len(), 1);
    assert!(added_columns[0].contains("ADD COLUMN city"));

    let added_indexes: Vec<&&String> = added
        .iter()
        .filter(|s| s.starts_with("CREATE") && s.contains("INDEX"))
        .collect();
    assert_eq!(added_indexes.len(), 1);
    assert!(added_indexes[0].contains("(city)"));

    let (_, _, _, version, maintenance) = conn
        .driver()
        .system_info
        .iter()
        .find(|r| r.1 == "scenario_person_f")
        .cloned()
        .unwrap();
    assert_eq!(version, 2);
    assert!(!maintenance);

    // Pass 3: already converged. No further DDL at all.
    let before = conn.driver().ddl_log.len();
    check(&mut conn, &config, v2, false).unwrap();
    assert_eq!(conn.driver().ddl_log.len(), before);
}
