// SPDX-FileCopyrightText: 2025-2026 The sql-orm authors
// SPDX-License-Identifier: MIT

//! The fluent query builder (C4).
//!
//! A single [`QueryBuilder`] instance is parameterized by an entity type
//! and an optional table alias, and composes exactly one of
//! SELECT/INSERT/UPDATE/DELETE. Emission assembles the dialect-specific
//! clause order, qualifies bare field references with the active alias,
//! then hands the result through the dialect's function-snippet rewriter.

use crate::{
    codec::Value,
    dialect::Dialect,
    error::{OrmError, OrmResult}
};

/// Which statement kind a builder has committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// Nothing has been selected/inserted/updated/deleted yet.
    Undefined,
    /// `SELECT`.
    Select,
    /// `INSERT`.
    Insert,
    /// `UPDATE`.
    Update,
    /// `DELETE`.
    Delete
}

/// Join strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    /// `LEFT JOIN`.
    Left,
    /// `RIGHT JOIN`.
    Right,
    /// `INNER JOIN`.
    Inner,
    /// `FULL JOIN`.
    Full
}

impl JoinMode {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Inner => "INNER JOIN",
            Self::Full => "FULL JOIN"
        }
    }
}

/// How a join's ON clause is expressed.
#[derive(Debug, Clone)]
pub enum JoinSpec {
    /// `ON left = right`, both qualified by the builder's alias rules.
    FieldPair {
        /// Field on the driving table/alias.
        left: String,
        /// Field on the joined table/alias.
        right: String
    },
    /// A raw, already-complete ON expression.
    Raw(String)
}

/// One entry of `joins[]`.
#[derive(Debug, Clone)]
pub struct Join {
    /// Join strategy.
    pub mode: JoinMode,
    /// Alias for the joined table.
    pub alias: String,
    /// The entity type being joined.
    pub target_type: String,
    /// The ON clause.
    pub spec: JoinSpec
}

/// The boolean connector preceding a WHERE element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    /// No connector: only valid for the very first top-level element.
    None,
    /// `AND`.
    And,
    /// `OR`.
    Or,
    /// `AND NOT`.
    AndNot,
    /// `OR NOT`.
    OrNot
}

impl Connector {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::None => "",
            Self::And => "AND ",
            Self::Or => "OR ",
            Self::AndNot => "AND NOT ",
            Self::OrNot => "OR NOT "
        }
    }
}

/// A WHERE-tree node: a leaf condition or a parenthesized nested group.
#[derive(Debug, Clone)]
pub enum WhereNode {
    /// `field op ?` with a captured parameter.
    Condition {
        /// Leading connector.
        connector: Connector,
        /// Field reference (alias-qualified at emission time).
        field: String,
        /// Comparison operator, e.g. `"="`, `">"`.
        op: String,
        /// The bound value.
        value: Value
    },
    /// A raw, already-complete boolean expression with its own captured
    /// parameters, in left-to-right order.
    Raw {
        /// Leading connector.
        connector: Connector,
        /// The raw expression text.
        expr: String,
        /// Parameters captured by the expression's `?` placeholders.
        values: Vec<Value>
    },
    /// A parenthesized group of nested elements.
    Group {
        /// Leading connector.
        connector: Connector,
        /// The nested elements, composed recursively.
        children: Vec<WhereNode>
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderMode {
    /// `ASC`.
    Ascending,
    /// `DESC`.
    Descending
}

/// One entry of the ordered FIFO of WHERE/GROUP/SORT elements.
#[derive(Debug, Clone)]
pub enum QueryElement {
    /// A WHERE condition or group, at the top level of the WHERE tree.
    Where(WhereNode),
    /// An ORDER BY term.
    OrderBy {
        /// Field reference.
        field: String,
        /// Sort direction.
        mode: OrderMode
    },
    /// A GROUP BY term.
    GroupBy {
        /// Field reference.
        field: String
    }
}

/// Fluent, stateful SQL builder for one entity type.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    entity_type: String,
    is_view: bool,
    alias: Option<String>,
    query_type: QueryType,
    fields: Vec<String>,
    top: Option<u32>,
    values: Vec<Value>,
    joins: Vec<Join>,
    elements: Vec<QueryElement>,
    last_where_was_top_level: bool
}

impl QueryBuilder {
    /// Start building a query over `entity_type`, optionally qualified by
    /// `alias`.
    pub fn new(entity_type: impl Into<String>, is_view: bool, alias: Option<&str>) -> Self {
        Self {
            entity_type: entity_type.into(),
            is_view,
            alias: alias.map(str::to_string),
            query_type: QueryType::Undefined,
            fields: Vec::new(),
            top: None,
            values: Vec::new(),
            joins: Vec::new(),
            elements: Vec::new(),
            last_where_was_top_level: false
        }
    }

    fn set_query_type(&mut self, qt: QueryType) -> OrmResult<()> {
        if qt != QueryType::Select && self.is_view {
            return Err(OrmError::query(format!(
                "{} is a view and cannot be the target of {:?}",
                self.entity_type, qt
            )));
        }
        match self.query_type {
            QueryType::Undefined => {
                self.query_type = qt;
                Ok(())
            }
            existing if existing == qt => Ok(()),
            existing => Err(OrmError::query(format!(
                "query already committed to {existing:?}, cannot also {qt:?}"
            )))
        }
    }

    /// Commit to a SELECT, capturing the projected fields (empty = `*`).
    pub fn select(&mut self, fields: &[&str]) -> OrmResult<&mut Self> {
        self.set_query_type(QueryType::Select)?;
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        Ok(self)
    }

    /// Commit to an INSERT.
    pub fn insert(&mut self) -> OrmResult<&mut Self> {
        self.set_query_type(QueryType::Insert)?;
        Ok(self)
    }

    /// Commit to an UPDATE.
    pub fn update(&mut self) -> OrmResult<&mut Self> {
        self.set_query_type(QueryType::Update)?;
        Ok(self)
    }

    /// Commit to a DELETE.
    pub fn delete(&mut self) -> OrmResult<&mut Self> {
        self.set_query_type(QueryType::Delete)?;
        Ok(self)
    }

    /// Add a field + value pair for INSERT/UPDATE.
    pub fn set_field(&mut self, field: &str, value: Value) -> &mut Self {
        self.fields.push(field.to_string());
        self.values.push(value);
        self
    }

    /// Cap the result set (SELECT only), settable once.
    pub fn top(&mut self, count: u32) -> OrmResult<&mut Self> {
        if self.query_type != QueryType::Select {
            return Err(OrmError::query("top() is only valid on a SELECT"));
        }
        if self.top.is_some() {
            return Err(OrmError::query("top() has already been set"));
        }
        self.top = Some(count);
        Ok(self)
    }

    /// Add a join.
    pub fn join(&mut self, mode: JoinMode, alias: &str, target_type: &str, spec: JoinSpec) -> &mut Self {
        self.joins.push(Join {
            mode,
            alias: alias.to_string(),
            target_type: target_type.to_string(),
            spec
        });
        self
    }

    /// The first, connector-less top-level WHERE condition.
    pub fn where_eq(&mut self, field: &str, value: Value) -> OrmResult<&mut Self> {
        self.where_op(field, "=", value)
    }

    /// The first, connector-less top-level WHERE condition with an
    /// explicit operator.
    pub fn where_op(&mut self, field: &str, op: &str, value: Value) -> OrmResult<&mut Self> {
        if !self.elements.is_empty() {
            return Err(OrmError::query(
                "a connector-less where() may only be the first element; use and()/or() instead"
            ));
        }
        self.elements.push(QueryElement::Where(WhereNode::Condition {
            connector: Connector::None,
            field: field.to_string(),
            op: op.to_string(),
            value
        }));
        self.last_where_was_top_level = true;
        Ok(self)
    }

    fn push_connected(&mut self, connector: Connector, field: &str, op: &str, value: Value) -> &mut Self {
        self.elements.push(QueryElement::Where(WhereNode::Condition {
            connector,
            field: field.to_string(),
            op: op.to_string(),
            value
        }));
        self
    }

    /// `AND field op value`.
    pub fn and(&mut self, field: &str, op: &str, value: Value) -> &mut Self {
        self.push_connected(Connector::And, field, op, value)
    }

    /// `OR field op value`.
    pub fn or(&mut self, field: &str, op: &str, value: Value) -> &mut Self {
        self.push_connected(Connector::Or, field, op, value)
    }

    /// `AND NOT field op value`.
    pub fn and_not(&mut self, field: &str, op: &str, value: Value) -> &mut Self {
        self.push_connected(Connector::AndNot, field, op, value)
    }

    /// `OR NOT field op value`.
    pub fn or_not(&mut self, field: &str, op: &str, value: Value) -> &mut Self {
        self.push_connected(Connector::OrNot, field, op, value)
    }

    fn nested_group(&mut self, connector: Connector, build: impl FnOnce(&mut NestedWhere)) -> &mut Self {
        let mut nested = NestedWhere::new();
        build(&mut nested);
        self.elements.push(QueryElement::Where(WhereNode::Group {
            connector,
            children: nested.children
        }));
        self
    }

    /// A nested, parenthesized `AND (...)` group.
    pub fn and_group(&mut self, build: impl FnOnce(&mut NestedWhere)) -> &mut Self {
        self.nested_group(Connector::And, build)
    }

    /// A nested, parenthesized `OR (...)` group.
    pub fn or_group(&mut self, build: impl FnOnce(&mut NestedWhere)) -> &mut Self {
        self.nested_group(Connector::Or, build)
    }

    /// The first ORDER BY term.
    pub fn order_by(&mut self, field: &str, mode: OrderMode) -> &mut Self {
        self.elements.push(QueryElement::OrderBy {
            field: field.to_string(),
            mode
        });
        self
    }

    /// A subsequent ORDER BY term; must follow `order_by`/`then_by`.
    pub fn then_by(&mut self, field: &str, mode: OrderMode) -> OrmResult<&mut Self> {
        if !matches!(self.elements.last(), Some(QueryElement::OrderBy { .. })) {
            return Err(OrmError::query("then_by() must follow order_by()/then_by()"));
        }
        Ok(self.order_by(field, mode))
    }

    /// The first GROUP BY term.
    pub fn group_by(&mut self, field: &str) -> &mut Self {
        self.elements.push(QueryElement::GroupBy {
            field: field.to_string()
        });
        self
    }

    /// A subsequent GROUP BY term; must follow `group_by`/`then_group_by`.
    pub fn then_group_by(&mut self, field: &str) -> OrmResult<&mut Self> {
        if !matches!(self.elements.last(), Some(QueryElement::GroupBy { .. })) {
            return Err(OrmError::query("then_group_by() must follow group_by()"));
        }
        Ok(self.group_by(field))
    }

    fn qualify(&self, field: &str) -> String {
        if field.contains('.') {
            field.to_string()
        } else if let Some(alias) = &self.alias {
            format!("{alias}.{field}")
        } else {
            field.to_string()
        }
    }

    fn emit_where_tree(&self, nodes: &[WhereNode], out: &mut String, params: &mut Vec<Value>) {
        for (i, node) in nodes.iter().enumerate() {
            match node {
                WhereNode::Condition { connector, field, op, value } => {
                    if i > 0 || *connector != Connector::None {
                        out.push_str(connector.as_sql());
                    }
                    out.push_str(&self.qualify(field));
                    out.push(' ');
                    out.push_str(op);
                    out.push_str(" ? ");
                    params.push(value.clone());
                }
                WhereNode::Raw { connector, expr, values } => {
                    if i > 0 || *connector != Connector::None {
                        out.push_str(connector.as_sql());
                    }
                    out.push_str(expr);
                    out.push(' ');
                    params.extend(values.iter().cloned());
                }
                WhereNode::Group { connector, children } => {
                    if i > 0 || *connector != Connector::None {
                        out.push_str(connector.as_sql());
                    }
                    out.push_str("( ");
                    self.emit_where_tree(children, out, params);
                    out.push_str(") ");
                }
            }
        }
    }

    /// Assemble the final `(sql, parameters)` pair, dialect-qualified and
    /// rewritten through the function-snippet rewriter.
    pub fn emit(&self, dialect: Dialect) -> OrmResult<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let table = self.qualified_table();

        let mut sql = match self.query_type {
            QueryType::Undefined => return Err(OrmError::query("no statement kind selected")),
            QueryType::Select => self.emit_select(dialect, &table, &mut params)?,
            QueryType::Insert => self.emit_insert(&table, &mut params),
            QueryType::Update => self.emit_update(dialect, &table, &mut params),
            QueryType::Delete => self.emit_delete(&table, &mut params)
        };

        sql = dialect.rewrite(&sql);
        Ok((sql.trim().to_string(), params))
    }

    fn qualified_table(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} {}", self.entity_type, alias),
            None => self.entity_type.clone()
        }
    }

    fn emit_joins(&self) -> String {
        let mut out = String::new();
        for join in &self.joins {
            out.push_str(join.mode.as_sql());
            out.push(' ');
            out.push_str(&join.target_type);
            out.push(' ');
            out.push_str(&join.alias);
            out.push_str(" ON ");
            match &join.spec {
                JoinSpec::FieldPair { left, right } => {
                    out.push_str(&self.qualify(left));
                    out.push_str(" = ");
                    out.push_str(&format!("{}.{}", join.alias, right));
                }
                JoinSpec::Raw(expr) => out.push_str(expr)
            }
            out.push(' ');
        }
        out
    }

    fn emit_where_clause(&self, params: &mut Vec<Value>) -> String {
        let top_level: Vec<WhereNode> = self
            .elements
            .iter()
            .filter_map(|e| match e {
                QueryElement::Where(node) => Some(node.clone()),
                _ => None
            })
            .collect();
        if top_level.is_empty() {
            return String::new();
        }
        let mut out = String::from("WHERE ");
        self.emit_where_tree(&top_level, &mut out, params);
        out
    }

    fn emit_group_order(&self) -> String {
        let mut group_fields = Vec::new();
        let mut order_terms = Vec::new();
        for e in &self.elements {
            match e {
                QueryElement::GroupBy { field } => group_fields.push(self.qualify(field)),
                QueryElement::OrderBy { field, mode } => {
                    let dir = match mode {
                        OrderMode::Ascending => "ASC",
                        OrderMode::Descending => "DESC"
                    };
                    order_terms.push(format!("{} {}", self.qualify(field), dir));
                }
                QueryElement::Where(_) => {}
            }
        }
        let mut out = String::new();
        if !group_fields.is_empty() {
            out.push_str("GROUP BY ");
            out.push_str(&group_fields.join(", "));
            out.push(' ');
        }
        if !order_terms.is_empty() {
            out.push_str("ORDER BY ");
            out.push_str(&order_terms.join(", "));
            out.push(' ');
        }
        out
    }

    fn emit_select(&self, dialect: Dialect, table: &str, params: &mut Vec<Value>) -> OrmResult<String> {
        let fields = if self.fields.is_empty() {
            "*".to_string()
        } else {
            self.fields
                .iter()
                .map(|f| self.qualify(f))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = String::from("SELECT ");
        if let Some(n) = self.top {
            if let crate::dialect::TopClause::Leading(clause) = dialect.top_clause(n) {
                sql.push_str(&clause);
                sql.push(' ');
            }
        }
        sql.push_str(&fields);
        sql.push_str(" FROM ");
        sql.push_str(table);
        sql.push(' ');
        sql.push_str(&self.emit_joins());
        sql.push_str(&self.emit_where_clause(params));
        sql.push(' ');
        sql.push_str(&self.emit_group_order());

        if let Some(n) = self.top {
            if let crate::dialect::TopClause::Trailing(clause) = dialect.top_clause(n) {
                sql.push(' ');
                sql.push_str(&clause);
            }
        }

        Ok(sql)
    }

    fn emit_insert(&self, table: &str, params: &mut Vec<Value>) -> String {
        let placeholders = vec!["?"; self.fields.len()].join(", ");
        params.extend(self.values.iter().cloned());
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            self.fields.join(", "),
            placeholders
        )
    }

    fn emit_update(&self, dialect: Dialect, table: &str, params: &mut Vec<Value>) -> String {
        let pairs: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("{} = ?", self.qualify(f)))
            .collect();
        params.extend(self.values.iter().cloned());

        let mut sql = if dialect.update_uses_from_alias() && self.alias.is_some() {
            format!(
                "UPDATE {} SET {} FROM {} {}",
                self.alias.as_ref().unwrap(),
                pairs.join(", "),
                self.entity_type,
                self.alias.as_ref().unwrap()
            )
        } else {
            format!("UPDATE {} SET {}", table, pairs.join(", "))
        };
        sql.push(' ');
        sql.push_str(&self.emit_where_clause(params));
        sql
    }

    fn emit_delete(&self, table: &str, params: &mut Vec<Value>) -> String {
        let mut sql = format!("DELETE FROM {table} ");
        sql.push_str(&self.emit_where_clause(params));
        sql
    }
}

/// Handle passed into `and_group`/`or_group` callbacks for composing a
/// nested WHERE group.
#[derive(Debug, Default)]
pub struct NestedWhere {
    children: Vec<WhereNode>
}

impl NestedWhere {
    fn new() -> Self {
        Self::default()
    }

    /// The first, connector-less condition within this group.
    pub fn where_op(&mut self, field: &str, op: &str, value: Value) -> &mut Self {
        self.children.push(WhereNode::Condition {
            connector: Connector::None,
            field: field.to_string(),
            op: op.to_string(),
            value
        });
        self
    }

    /// `AND field op value`.
    pub fn and(&mut self, field: &str, op: &str, value: Value) -> &mut Self {
        self.children.push(WhereNode::Condition {
            connector: Connector::And,
            field: field.to_string(),
            op: op.to_string(),
            value
        });
        self
    }

    /// `OR field op value`.
    pub fn or(&mut self, field: &str, op: &str, value: Value) -> &mut Self {
        self.children.push(WhereNode::Condition {
            connector: Connector::Or,
            field: field.to_string(),
            op: op.to_string(),
            value
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn views_reject_insert_update_delete() {
        let mut qb = QueryBuilder::new("person_view", true, None);
        assert!(qb.insert().is_err());
        assert!(qb.update().is_err());
        assert!(qb.delete().is_err());
        assert!(qb.select(&[]).is_ok());
    }

    #[test]
    fn re_entry_with_different_type_fails() {
        let mut qb = QueryBuilder::new("person", false, None);
        qb.select(&["name"]).unwrap();
        assert!(qb.insert().is_err());
    }

    #[test]
    fn top_is_select_only_and_set_once() {
        let mut qb = QueryBuilder::new("person", false, None);
        qb.select(&[]).unwrap();
        assert!(qb.top(10).is_ok());
        assert!(qb.top(20).is_err());
    }

    #[test]
    fn second_top_level_where_without_connector_fails() {
        let mut qb = QueryBuilder::new("person", false, None);
        qb.select(&[]).unwrap();
        qb.where_eq("name", Value::String("Ada".into())).unwrap();
        assert!(qb.where_eq("age", Value::I64(1)).is_err());
    }

    #[test]
    fn then_by_requires_preceding_order_by() {
        let mut qb = QueryBuilder::new("person", false, None);
        qb.select(&[]).unwrap();
        assert!(qb.then_by("age", OrderMode::Ascending).is_err());
        qb.order_by("name", OrderMode::Ascending);
        assert!(qb.then_by("age", OrderMode::Descending).is_ok());
    }

    #[test]
    fn bare_field_gets_alias_prefix_but_dotted_field_is_untouched() {
        let mut qb = QueryBuilder::new("person", false, Some("p"));
        qb.select(&["name", "other.city"]).unwrap();
        let (sql, _) = qb.emit(Dialect::PostgreSql).unwrap();
        assert!(sql.contains("p.name"));
        assert!(sql.contains("other.city"));
        assert!(!sql.contains("p.other.city"));
    }

    #[test]
    fn nested_where_group_and_parameter_order() {
        let mut qb = QueryBuilder::new("person", false, None);
        qb.select(&[]).unwrap();
        qb.where_eq("NAME", Value::String("Ada".into())).unwrap();
        qb.and_group(|g| {
            g.where_op("AGE", ">", Value::I64(30));
            g.or("CITY", "=", Value::String("Paris".into()));
        });
        let (sql, params) = qb.emit(Dialect::PostgreSql).unwrap();
        assert!(sql.contains("NAME = ?"));
        assert!(sql.contains("AND ( AGE > ? OR CITY = ? )"));
        assert_eq!(
            params,
            vec![
                Value::String("Ada".into()),
                Value::I64(30),
                Value::String("Paris".into())
            ]
        );
    }

    #[test]
    fn select_top_leading_on_mssql_trailing_on_postgres() {
        let mut qb = QueryBuilder::new("person", false, None);
        qb.select(&[]).unwrap();
        qb.top(5).unwrap();
        let (sql, _) = qb.emit(Dialect::MsSql).unwrap();
        assert!(sql.starts_with("SELECT TOP 5"));

        let mut qb2 = QueryBuilder::new("person", false, None);
        qb2.select(&[]).unwrap();
        qb2.top(5).unwrap();
        let (sql2, _) = qb2.emit(Dialect::PostgreSql).unwrap();
        assert!(sql2.trim_end().ends_with("LIMIT 5"));
    }

    #[test]
    fn insert_field_count_matches_value_count() {
        let mut qb = QueryBuilder::new("person", false, None);
        qb.insert().unwrap();
        qb.set_field("name", Value::String("Ada".into()));
        let (sql, params) = qb.emit(Dialect::PostgreSql).unwrap();
        assert!(sql.contains("INSERT INTO person (name) VALUES (?)"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn mssql_update_with_alias_uses_update_from_form() {
        let mut qb = QueryBuilder::new("person", false, Some("p"));
        qb.update().unwrap();
        qb.set_field("name", Value::String("Ada".into()));
        qb.where_eq("id", Value::I64(1)).unwrap();
        let (sql, _) = qb.emit(Dialect::MsSql).unwrap();
        assert!(sql.starts_with("UPDATE p SET"));
        assert!(sql.contains("FROM person p"));
    }
}
