// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! Per-dialect command templates, trigger-event keywords and function
//! snippets for the five supported SQL variants.

use super::{
    command::{CommandKind, ObjectKind, TriggerEvent},
    rewrite::{FunctionSnippet, SnippetTable}
};
use crate::registry::HostType;

/// One of the five supported SQL variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Dialect {
    /// Microsoft SQL Server.
    MsSql,
    /// Azure SQL Database.
    AzureSql,
    /// PostgreSQL.
    PostgreSql,
    /// Firebird, server mode.
    FirebirdServer,
    /// Firebird, embedded mode.
    FirebirdEmbedded
}

impl Dialect {
    /// `true` for the two SQL-Server-family dialects.
    const fn is_sql_server_family(self) -> bool {
        matches!(self, Self::MsSql | Self::AzureSql)
    }

    /// `true` for the two Firebird-family dialects.
    const fn is_firebird_family(self) -> bool {
        matches!(self, Self::FirebirdServer | Self::FirebirdEmbedded)
    }

    /// Whether a PostgreSQL-style UPDATE...FROM is needed for an aliased
    /// UPDATE, per spec §4.4 ("Microsoft SQL UPDATE with alias uses
    /// `UPDATE alias SET ... FROM table alias`; other dialects use
    /// `UPDATE table alias SET ...`").
    pub const fn update_uses_from_alias(self) -> bool {
        self.is_sql_server_family()
    }

    /// Where the record cap goes for a capped SELECT.
    pub fn top_clause(self, count: u32) -> TopClause {
        match self {
            Self::PostgreSql => TopClause::Trailing(format!("LIMIT {count}")),
            Self::MsSql | Self::AzureSql => TopClause::Leading(format!("TOP {count}")),
            Self::FirebirdServer | Self::FirebirdEmbedded => {
                TopClause::Leading(format!("FIRST {count}"))
            }
        }
    }

    /// The textual template for `kind`.
    pub fn command(self, kind: CommandKind) -> String {
        match kind {
            CommandKind::Drop(obj) => self.drop_command(obj),
            CommandKind::Create(obj) => self.create_command(obj),
            CommandKind::Exist(obj) => self.exist_command(obj),
            CommandKind::SelectFull => "SELECT #FIELDS# FROM #TABLENAME#".to_string(),
            CommandKind::SelectTop => self.select_top_command(),
            CommandKind::SelectByKey => {
                "SELECT #FIELDS# FROM #TABLENAME# WHERE #FIELDNAMEKEY# = ?".to_string()
            }
            CommandKind::SelectCount => "SELECT COUNT(#NAME#) FROM #TABLENAME#".to_string(),
            CommandKind::SelectSum => "SELECT SUM(#NAME#) FROM #TABLENAME#".to_string(),
            CommandKind::SelectExistByKey => {
                "SELECT 1 FROM #TABLENAME# WHERE #FIELDNAMEKEY# = ?".to_string()
            }
            CommandKind::LoadSingleValue => {
                "SELECT #NAME# FROM #TABLENAME# WHERE #FIELDNAMEKEY# = ?".to_string()
            }
            CommandKind::Insert => {
                "INSERT INTO #TABLENAME# (#FIELDS#) VALUES (#VALUES#)".to_string()
            }
            CommandKind::Update => {
                "UPDATE #TABLENAME# SET #PAIRS# WHERE #FIELDNAMEKEY# = @v0".to_string()
            }
            CommandKind::Delete => "DELETE FROM #TABLENAME# WHERE #FIELDNAMEKEY# = ?".to_string(),
            CommandKind::FieldDef(host) => self.field_def_command(host),
            CommandKind::BeforeAlterSchema => self.before_alter_schema(),
            CommandKind::AfterAlterSchema => self.after_alter_schema(),
            CommandKind::EnableTrigger => self.enable_trigger_command(),
            CommandKind::DisableTrigger => self.disable_trigger_command(),
            CommandKind::TriggerBeforeInsertBody => self.trigger_before_insert_body(),
            CommandKind::TriggerBeforeUpdateBody => self.trigger_before_update_body(),
            CommandKind::FieldLength => self.field_length_command(),
            CommandKind::AlterFieldLength(host) => self.alter_field_length_command(host)
        }
    }

    /// Keyword for a trigger firing point.
    pub const fn trigger_event(self, event: TriggerEvent) -> &'static str {
        match event {
            TriggerEvent::BeforeInsert => "BEFORE INSERT",
            TriggerEvent::BeforeUpdate => "BEFORE UPDATE",
            TriggerEvent::AfterInsert => "AFTER INSERT",
            TriggerEvent::AfterUpdate => "AFTER UPDATE",
            TriggerEvent::BeforeDelete => "BEFORE DELETE",
            TriggerEvent::AfterDelete => "AFTER DELETE"
        }
    }

    fn select_top_command(self) -> String {
        match self.top_clause(0) {
            TopClause::Leading(_) => "SELECT #COUNT# #FIELDS# FROM #TABLENAME#".to_string(),
            TopClause::Trailing(_) => "SELECT #FIELDS# FROM #TABLENAME# LIMIT #COUNT#".to_string()
        }
    }

    fn drop_command(self, obj: ObjectKind) -> String {
        match obj {
            ObjectKind::Table => "DROP TABLE #TABLENAME#".to_string(),
            ObjectKind::View => "DROP VIEW #TABLENAME#".to_string(),
            ObjectKind::Index => "DROP INDEX #NAME#".to_string(),
            ObjectKind::Trigger if self.is_firebird_family() => {
                "DROP TRIGGER #NAME#".to_string()
            }
            ObjectKind::Trigger => "DROP TRIGGER #NAME# ON #TABLENAME#".to_string(),
            ObjectKind::Procedure => "DROP PROCEDURE #NAME#".to_string(),
            ObjectKind::Constraint => {
                "ALTER TABLE #TABLENAME# DROP CONSTRAINT #NAME#".to_string()
            }
            ObjectKind::Field => "ALTER TABLE #TABLENAME# DROP COLUMN #NAME#".to_string()
        }
    }

    fn create_command(self, obj: ObjectKind) -> String {
        match obj {
            ObjectKind::Table => "CREATE TABLE #TABLENAME# (#FIELDS#)".to_string(),
            ObjectKind::View => "CREATE VIEW #TABLENAME# AS #QUERY#".to_string(),
            ObjectKind::Index => {
                "CREATE #FIELDOPTIONS# INDEX #NAME# ON #TABLENAME# (#FIELDS#)".to_string()
            }
            ObjectKind::Trigger => "CREATE TRIGGER #NAME# #EVENT# ON #TABLENAME# #CODE#".to_string(),
            ObjectKind::Procedure => "CREATE PROCEDURE #NAME# #CODE#".to_string(),
            ObjectKind::Constraint => format!(
                "ALTER TABLE #TABLENAME# ADD CONSTRAINT #NAME# FOREIGN KEY (#FIELDNAMEKEY#) \
                 REFERENCES #FIELDOPTIONS# (#EVENTCODE#)"
            ),
            ObjectKind::Field => "ALTER TABLE #TABLENAME# ADD COLUMN #NAME# #FIELDOPTIONS#".to_string()
        }
    }

    fn exist_command(self, obj: ObjectKind) -> String {
        match (self, obj) {
            (Self::PostgreSql, ObjectKind::Table) => {
                "SELECT 1 FROM information_schema.tables WHERE table_name = #NAME#".to_string()
            }
            (Self::PostgreSql, ObjectKind::Field) => {
                "SELECT 1 FROM information_schema.columns WHERE table_name = #TABLENAME# AND \
                 column_name = #NAME#"
                    .to_string()
            }
            (Self::PostgreSql, ObjectKind::Index) => {
                "SELECT 1 FROM pg_indexes WHERE indexname = #NAME#".to_string()
            }
            (Self::PostgreSql, ObjectKind::Trigger) => {
                "SELECT 1 FROM information_schema.triggers WHERE trigger_name = #NAME#".to_string()
            }
            (d, ObjectKind::Table) if d.is_sql_server_family() => {
                "SELECT 1 FROM sys.tables WHERE name = #NAME#".to_string()
            }
            (d, ObjectKind::Field) if d.is_sql_server_family() => {
                "SELECT 1 FROM sys.columns WHERE object_id = OBJECT_ID(#TABLENAME#) AND name = #NAME#"
                    .to_string()
            }
            (d, ObjectKind::Index) if d.is_sql_server_family() => {
                "SELECT 1 FROM sys.indexes WHERE name = #NAME#".to_string()
            }
            (d, ObjectKind::Trigger) if d.is_sql_server_family() => {
                "SELECT 1 FROM sys.triggers WHERE name = #NAME#".to_string()
            }
            (d, ObjectKind::Table) if d.is_firebird_family() => {
                "SELECT 1 FROM rdb$relations WHERE rdb$relation_name = #NAME#".to_string()
            }
            (d, ObjectKind::Field) if d.is_firebird_family() => {
                "SELECT 1 FROM rdb$relation_fields WHERE rdb$relation_name = #TABLENAME# AND \
                 rdb$field_name = #NAME#"
                    .to_string()
            }
            (d, ObjectKind::Index) if d.is_firebird_family() => {
                "SELECT 1 FROM rdb$indices WHERE rdb$index_name = #NAME#".to_string()
            }
            (d, ObjectKind::Trigger) if d.is_firebird_family() => {
                "SELECT 1 FROM rdb$triggers WHERE rdb$trigger_name = #NAME#".to_string()
            }
            (_, ObjectKind::View) => {
                "SELECT 1 FROM information_schema.views WHERE table_name = #NAME#".to_string()
            }
            (_, ObjectKind::Procedure) => {
                "SELECT 1 FROM information_schema.routines WHERE routine_name = #NAME#".to_string()
            }
            (_, ObjectKind::Constraint) => {
                "SELECT 1 FROM information_schema.table_constraints WHERE constraint_name = #NAME#"
                    .to_string()
            }
        }
    }

    fn field_def_command(self, host: HostType) -> String {
        let sql_type = match (self, host) {
            (_, HostType::I8) => "SMALLINT",
            (_, HostType::I16) => "SMALLINT",
            (_, HostType::I32) => "INTEGER",
            (Self::PostgreSql, HostType::I64) => "BIGINT",
            (d, HostType::I64) if d.is_firebird_family() => "BIGINT",
            (_, HostType::I64) => "BIGINT",
            (_, HostType::F32) => "REAL",
            (_, HostType::F64) => "DOUBLE PRECISION",
            (Self::PostgreSql, HostType::Decimal) => "NUMERIC(18,4)",
            (_, HostType::Decimal) => "DECIMAL(18,4)",
            (Self::PostgreSql, HostType::Bool) => "BOOLEAN",
            (d, HostType::Bool) if d.is_firebird_family() => "BOOLEAN",
            (_, HostType::Bool) => "BIT",
            (_, HostType::String) => "#FIELDOPTIONS#",
            (Self::PostgreSql, HostType::Bytes) => "BYTEA",
            (d, HostType::Bytes) if d.is_firebird_family() => "BLOB SEGMENT SIZE #BLOCKSIZE#",
            (_, HostType::Bytes) => "VARBINARY(MAX)",
            (Self::PostgreSql, HostType::Image) => "BYTEA",
            (d, HostType::Image) if d.is_firebird_family() => "BLOB SEGMENT SIZE #BLOCKSIZE#",
            (_, HostType::Image) => "VARBINARY(MAX)",
            (Self::PostgreSql, HostType::Guid) => "UUID",
            (d, HostType::Guid) if d.is_firebird_family() => "CHAR(36)",
            (_, HostType::Guid) => "UNIQUEIDENTIFIER",
            (Self::PostgreSql, HostType::DateTime) => "TIMESTAMP",
            (_, HostType::DateTime) => "TIMESTAMP",
            (_, HostType::TypeName) => "#FIELDOPTIONS#",
            (_, HostType::Enum) => "INTEGER",
            (Self::PostgreSql, HostType::Object) => "BYTEA",
            (d, HostType::Object) if d.is_firebird_family() => "BLOB SEGMENT SIZE #BLOCKSIZE#",
            (_, HostType::Object) => "VARBINARY(MAX)"
        };

        match host {
            HostType::String | HostType::TypeName => {
                if self == Self::PostgreSql {
                    "VARCHAR(#SIZE#)".to_string()
                } else if self.is_firebird_family() {
                    "VARCHAR(#SIZE#) CHARACTER SET UTF8".to_string()
                } else {
                    "NVARCHAR(#SIZE#)".to_string()
                }
            }
            _ => sql_type.to_string()
        }
    }

    fn field_length_command(self) -> String {
        match self {
            Self::PostgreSql => "SELECT character_maximum_length FROM information_schema.columns \
                                  WHERE table_name = #TABLENAME# AND column_name = #NAME#"
                .to_string(),
            d if d.is_sql_server_family() => {
                "SELECT c.max_length FROM sys.columns c WHERE c.object_id = OBJECT_ID(#TABLENAME#) \
                 AND c.name = #NAME#"
                    .to_string()
            }
            d if d.is_firebird_family() => {
                "SELECT fld.rdb$field_length FROM rdb$relation_fields rel JOIN rdb$fields fld \
                 ON rel.rdb$field_source = fld.rdb$field_name WHERE rel.rdb$relation_name = #TABLENAME# \
                 AND rel.rdb$field_name = #NAME#"
                    .to_string()
            }
            _ => unreachable!("every dialect is sql-server, firebird or postgres family")
        }
    }

    fn alter_field_length_command(self, host: HostType) -> String {
        let field_def = self.field_def_command(host);
        match self {
            d if d.is_sql_server_family() => format!("ALTER TABLE #TABLENAME# ALTER COLUMN #NAME# {field_def}"),
            _ => format!("ALTER TABLE #TABLENAME# ALTER COLUMN #NAME# TYPE {field_def}")
        }
    }

    fn before_alter_schema(self) -> String {
        match self {
            Self::PostgreSql => String::new(),
            d if d.is_firebird_family() => String::new(),
            _ => "-- no session flags required".to_string()
        }
    }

    fn after_alter_schema(self) -> String {
        self.before_alter_schema()
    }

    fn enable_trigger_command(self) -> String {
        match self {
            Self::PostgreSql => "ALTER TABLE #TABLENAME# ENABLE TRIGGER #NAME#".to_string(),
            d if d.is_firebird_family() => "ALTER TRIGGER #NAME# ACTIVE".to_string(),
            _ => "ENABLE TRIGGER #NAME# ON #TABLENAME#".to_string()
        }
    }

    fn disable_trigger_command(self) -> String {
        match self {
            Self::PostgreSql => "ALTER TABLE #TABLENAME# DISABLE TRIGGER #NAME#".to_string(),
            d if d.is_firebird_family() => "ALTER TRIGGER #NAME# INACTIVE".to_string(),
            _ => "DISABLE TRIGGER #NAME# ON #TABLENAME#".to_string()
        }
    }

    fn trigger_before_insert_body(self) -> String {
        match self {
            Self::PostgreSql => {
                "BEGIN NEW.#FIELDNAMEKEY# := COALESCE(NEW.#FIELDNAMEKEY#, gen_random_uuid()); \
                 NEW.#CODE# := NOW(); RETURN NEW; END;"
                    .to_string()
            }
            d if d.is_firebird_family() => {
                "AS BEGIN IF (NEW.#FIELDNAMEKEY# IS NULL) THEN NEW.#FIELDNAMEKEY# = GEN_UUID(); \
                 NEW.#CODE# = CURRENT_TIMESTAMP; END"
                    .to_string()
            }
            _ => "AS BEGIN UPDATE #TABLENAME# SET #CODE# = GETDATE() WHERE #FIELDNAMEKEY# IN \
                  (SELECT #FIELDNAMEKEY# FROM inserted); END"
                .to_string()
        }
    }

    fn trigger_before_update_body(self) -> String {
        match self {
            Self::PostgreSql => {
                "BEGIN NEW.#CODE# := NOW(); RETURN NEW; END;".to_string()
            }
            d if d.is_firebird_family() => {
                "AS BEGIN NEW.#CODE# = CURRENT_TIMESTAMP; END".to_string()
            }
            _ => "AS BEGIN UPDATE #TABLENAME# SET #CODE# = GETDATE() WHERE #FIELDNAMEKEY# IN \
                  (SELECT #FIELDNAMEKEY# FROM inserted); END"
                .to_string()
        }
    }

    /// The function-snippet table for this dialect, pre-loaded with the
    /// core-bound tokens (spec §4.2).
    pub fn snippet_table(self) -> SnippetTable {
        let mut table = SnippetTable::new();

        let (today, empty_guid, now_year, now_month, now_day, hour, minute): (
            &str,
            &str,
            &str,
            &str,
            &str,
            &str,
            &str
        ) = match self {
            Self::PostgreSql => (
                "CURRENT_DATE",
                "'00000000-0000-0000-0000-000000000000'",
                "EXTRACT(YEAR FROM CURRENT_DATE)",
                "EXTRACT(MONTH FROM CURRENT_DATE)",
                "EXTRACT(DAY FROM CURRENT_DATE)",
                "EXTRACT(HOUR FROM CURRENT_TIMESTAMP)",
                "EXTRACT(MINUTE FROM CURRENT_TIMESTAMP)"
            ),
            d if d.is_firebird_family() => (
                "CURRENT_DATE",
                "'00000000-0000-0000-0000-000000000000'",
                "EXTRACT(YEAR FROM CURRENT_DATE)",
                "EXTRACT(MONTH FROM CURRENT_DATE)",
                "EXTRACT(DAY FROM CURRENT_DATE)",
                "EXTRACT(HOUR FROM CURRENT_TIMESTAMP)",
                "EXTRACT(MINUTE FROM CURRENT_TIMESTAMP)"
            ),
            _ => (
                "CAST(GETDATE() AS DATE)",
                "'00000000-0000-0000-0000-000000000000'",
                "DATEPART(YEAR, GETDATE())",
                "DATEPART(MONTH, GETDATE())",
                "DATEPART(DAY, GETDATE())",
                "DATEPART(HOUR, GETDATE())",
                "DATEPART(MINUTE, GETDATE())"
            )
        };

        table.placeholder("#TODAY#", today);
        table.placeholder("#EMPTYGUID#", empty_guid);
        table.placeholder("#YEAR#", now_year);
        table.placeholder("#MONTH#", now_month);
        table.placeholder("#DAY#", now_day);
        table.placeholder("#HOUR#", hour);
        table.placeholder("#MINUTE#", minute);

        let date_add_day = self.date_add_fragment("DAY");
        let date_add_month = self.date_add_fragment("MONTH");
        let date_add_year = self.date_add_fragment("YEAR");

        table.function(
            "YESTERDAY",
            FunctionSnippet {
                params: vec![],
                fragment: date_add_day.replace("<n>", "-1").replace("<base>", today)
            }
        );
        table.function(
            "TOMORROW",
            FunctionSnippet {
                params: vec![],
                fragment: date_add_day.replace("<n>", "1").replace("<base>", today)
            }
        );
        table.function(
            "PASTMONTH",
            FunctionSnippet {
                params: vec![],
                fragment: date_add_month.replace("<n>", "-1").replace("<base>", today)
            }
        );
        table.function(
            "FOLLOWMONTH",
            FunctionSnippet {
                params: vec![],
                fragment: date_add_month.replace("<n>", "1").replace("<base>", today)
            }
        );
        table.function(
            "PASTYEAR",
            FunctionSnippet {
                params: vec![],
                fragment: date_add_year.replace("<n>", "-1").replace("<base>", today)
            }
        );
        table.function(
            "FOLLOWYEAR",
            FunctionSnippet {
                params: vec![],
                fragment: date_add_year.replace("<n>", "1").replace("<base>", today)
            }
        );

        table
    }

    fn date_add_fragment(self, unit: &str) -> String {
        match self {
            Self::PostgreSql => format!("(<base> + INTERVAL '<n> {unit}')"),
            d if d.is_firebird_family() => format!("DATEADD({unit}, <n>, <base>)"),
            _ => format!("DATEADD({unit}, <n>, <base>)")
        }
    }
}

/// Where the record cap is placed in a capped `SELECT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopClause {
    /// Inserted right after `SELECT`.
    Leading(String),
    /// Appended at the end of the statement.
    Trailing(String)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_top_is_trailing_limit() {
        assert_eq!(
            Dialect::PostgreSql.top_clause(10),
            TopClause::Trailing("LIMIT 10".to_string())
        );
    }

    #[test]
    fn mssql_top_is_leading_top() {
        assert_eq!(
            Dialect::MsSql.top_clause(10),
            TopClause::Leading("TOP 10".to_string())
        );
        assert_eq!(
            Dialect::AzureSql.top_clause(10),
            TopClause::Leading("TOP 10".to_string())
        );
    }

    #[test]
    fn firebird_top_is_leading_first() {
        assert_eq!(
            Dialect::FirebirdServer.top_clause(5),
            TopClause::Leading("FIRST 5".to_string())
        );
        assert_eq!(
            Dialect::FirebirdEmbedded.top_clause(5),
            TopClause::Leading("FIRST 5".to_string())
        );
    }

    #[test]
    fn only_sql_server_family_updates_via_from_alias() {
        assert!(Dialect::MsSql.update_uses_from_alias());
        assert!(Dialect::AzureSql.update_uses_from_alias());
        assert!(!Dialect::PostgreSql.update_uses_from_alias());
        assert!(!Dialect::FirebirdServer.update_uses_from_alias());
    }

    #[test]
    fn trigger_event_keywords() {
        assert_eq!(
            Dialect::PostgreSql.trigger_event(TriggerEvent::BeforeInsert),
            "BEFORE INSERT"
        );
        assert_eq!(
            Dialect::MsSql.trigger_event(TriggerEvent::AfterDelete),
            "AFTER DELETE"
        );
    }

    #[test]
    fn every_dialect_has_a_complete_trigger_body() {
        for d in [
            Dialect::MsSql,
            Dialect::AzureSql,
            Dialect::PostgreSql,
            Dialect::FirebirdServer,
            Dialect::FirebirdEmbedded
        ] {
            assert!(!d.command(CommandKind::TriggerBeforeInsertBody).is_empty());
            assert!(!d.command(CommandKind::TriggerBeforeUpdateBody).is_empty());
        }
    }

    #[test]
    fn alter_field_length_keeps_the_type_keyword_off_sql_server_only() {
        let widened = Dialect::PostgreSql.command(CommandKind::AlterFieldLength(HostType::String));
        assert!(widened.starts_with("ALTER TABLE #TABLENAME# ALTER COLUMN #NAME# TYPE"));
        let widened = Dialect::MsSql.command(CommandKind::AlterFieldLength(HostType::String));
        assert!(widened.starts_with("ALTER TABLE #TABLENAME# ALTER COLUMN #NAME# NVARCHAR"));
    }

    #[test]
    fn snippet_table_resolves_today_and_yesterday() {
        let table = Dialect::PostgreSql.snippet_table();
        let out = table.rewrite("WHERE d = #TODAY# AND e = YESTERDAY()");
        assert!(out.contains("CURRENT_DATE"));
        assert!(out.contains("INTERVAL '-1 DAY'"));
    }
}
