//! Dialect-aware SQL compilation
//!
//! A [`Grammar`] turns the clauses collected by a [`Builder`] into a SQL
//! string. Bindings are not produced here: the builder already holds them,
//! partitioned by clause, and flattens them in the order the grammar emits
//! placeholders (see [`Grammar::binding_order`]).

mod mysql;
mod postgres;
mod sqlite;
mod sqlserver;

pub use postgres::numbered_placeholders;

use crate::builder::bindings::{BindingKind, Bindings};
use crate::builder::clause::{Having, Join, Lock, Order, Where};
use crate::builder::common::{Identifier, Operand, Record};
use crate::builder::Builder;
use crate::{Error, Result, Value};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

/// The closed set of SQL dialects a grammar can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Dialect {
    #[default]
    #[serde(rename = "generic")]
    Generic,
    #[serde(rename = "mysql", alias = "mariadb")]
    MySql,
    #[serde(rename = "pgsql", alias = "postgres", alias = "postgresql")]
    Postgres,
    #[serde(rename = "sqlite")]
    Sqlite,
    #[serde(rename = "sqlsrv", alias = "sqlserver", alias = "mssql")]
    SqlServer,
}

impl Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Generic => "generic",
            Dialect::MySql => "mysql",
            Dialect::Postgres => "pgsql",
            Dialect::Sqlite => "sqlite",
            Dialect::SqlServer => "sqlsrv",
        };
        f.write_str(name)
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "generic" => Ok(Dialect::Generic),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "pgsql" | "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "sqlite" => Ok(Dialect::Sqlite),
            "sqlsrv" | "sqlserver" | "mssql" => Ok(Dialect::SqlServer),
            other => Err(Error::config(format!("Unsupported driver [{}]", other))),
        }
    }
}

/// SQL fragments for each part of a SELECT, in emission order
#[derive(Debug, Default)]
pub(crate) struct Components {
    pub aggregate: Option<String>,
    pub columns: Option<String>,
    pub from: Option<String>,
    pub joins: Option<String>,
    pub wheres: Option<String>,
    pub groups: Option<String>,
    pub havings: Option<String>,
    pub orders: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub lock: Option<String>,
}

impl Components {
    pub fn concatenate(self) -> String {
        [
            self.aggregate,
            self.columns,
            self.from,
            self.joins,
            self.wheres,
            self.groups,
            self.havings,
            self.orders,
            self.limit,
            self.offset,
            self.lock,
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Compiles builder state into SQL for one dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grammar {
    dialect: Dialect,
    table_prefix: String,
    savepoints: Option<bool>,
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new(Dialect::Generic)
    }
}

impl Grammar {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            table_prefix: String::new(),
            savepoints: None,
        }
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Override whether nested transactions use savepoints
    pub fn with_savepoints(mut self, enabled: bool) -> Self {
        self.savepoints = Some(enabled);
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    pub fn supports_savepoints(&self) -> bool {
        self.savepoints.unwrap_or(true)
    }

    // ------------------------------------------------------------------
    // Wrapping
    // ------------------------------------------------------------------

    /// Quote a column reference, handling aliases, JSON paths and table segments
    pub fn wrap(&self, value: &str) -> Result<String> {
        if let Some((column, alias)) = split_alias(value) {
            return Ok(format!("{} as {}", self.wrap(column)?, self.wrap_value(alias)));
        }
        if is_json_selector(value) {
            return self.wrap_json_selector(value);
        }
        Ok(self.wrap_segments(value))
    }

    pub fn wrap_identifier(&self, value: &Identifier) -> Result<String> {
        match value {
            Identifier::Name(name) => self.wrap(name),
            Identifier::Raw(expression) => Ok(expression.value().to_string()),
        }
    }

    /// Quote a table name, prepending the table prefix to the table and its alias
    pub fn wrap_table(&self, table: &str) -> Result<String> {
        if let Some((table, alias)) = split_alias(table) {
            let alias = format!("{}{}", self.table_prefix, alias);
            return Ok(format!("{} as {}", self.wrap_table(table)?, self.wrap_value(&alias)));
        }
        let prefixed = format!("{}{}", self.table_prefix, table);
        Ok(prefixed
            .split('.')
            .map(|segment| self.wrap_value(segment))
            .collect::<Vec<_>>()
            .join("."))
    }

    pub fn wrap_table_identifier(&self, table: &Identifier) -> Result<String> {
        match table {
            Identifier::Name(name) => self.wrap_table(name),
            Identifier::Raw(expression) => Ok(expression.value().to_string()),
        }
    }

    /// Quote a single identifier segment, doubling embedded quote characters
    pub fn wrap_value(&self, value: &str) -> String {
        if value == "*" {
            return value.to_string();
        }
        match self.dialect {
            Dialect::MySql => format!("`{}`", value.replace('`', "``")),
            Dialect::SqlServer => format!("[{}]", value.replace(']', "]]")),
            _ => format!("\"{}\"", value.replace('"', "\"\"")),
        }
    }

    /// Quote `table.column` style references; the first of several segments is a table
    fn wrap_segments(&self, value: &str) -> String {
        let segments: Vec<&str> = value.split('.').collect();
        let count = segments.len();
        segments
            .iter()
            .enumerate()
            .map(|(index, segment)| {
                if index == 0 && count > 1 {
                    self.wrap_value(&format!("{}{}", self.table_prefix, segment))
                } else {
                    self.wrap_value(segment)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn wrap_json_selector(&self, value: &str) -> Result<String> {
        match self.dialect {
            Dialect::MySql => Ok(mysql::wrap_json_selector(self, value)),
            Dialect::Postgres => Ok(postgres::wrap_json_selector(self, value)),
            Dialect::Sqlite => Ok(sqlite::wrap_json_selector(self, value)),
            Dialect::SqlServer => Ok(sqlserver::wrap_json_selector(self, value)),
            Dialect::Generic => Err(unsupported_json()),
        }
    }

    /// Split `column->path` into the wrapped column and a `, '$."path"'` argument
    pub(crate) fn wrap_json_field_and_path(&self, column: &str) -> (String, String) {
        let mut parts = column.splitn(2, "->");
        let field = self.wrap_segments(parts.next().unwrap_or_default());
        let path = parts
            .next()
            .map(|path| format!(", {}", wrap_json_path(path, "->")))
            .unwrap_or_default();
        (field, path)
    }

    pub fn columnize(&self, columns: &[Identifier]) -> Result<String> {
        Ok(columns
            .iter()
            .map(|column| self.wrap_identifier(column))
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }

    fn columnize_names<S: AsRef<str>>(&self, columns: &[S]) -> Result<String> {
        Ok(columns
            .iter()
            .map(|column| self.wrap(column.as_ref()))
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }

    /// A placeholder, or the raw fragment for expressions
    pub fn parameter(&self, value: &Operand) -> String {
        match value {
            Operand::Value(_) => "?".to_string(),
            Operand::Expr(expression) => expression.value().to_string(),
        }
    }

    pub fn parameterize(&self, values: &[Operand]) -> String {
        values
            .iter()
            .map(|value| self.parameter(value))
            .collect::<Vec<_>>()
            .join(", ")
    }

    // ------------------------------------------------------------------
    // SELECT
    // ------------------------------------------------------------------

    pub fn compile_select(&self, query: &Builder) -> Result<String> {
        query.ensure_valid()?;

        if query.aggregate.is_some() && (!query.unions.is_empty() || !query.havings.is_empty()) {
            return self.compile_union_aggregate(query);
        }

        if self.dialect == Dialect::SqlServer && query.offset.unwrap_or(0) > 0 {
            if !query.unions.is_empty() {
                return Err(Error::sql_generation(
                    "SQL Server cannot offset a query with unions; call offset after union to page the combined rows",
                ));
            }
            let components = self.compile_components(query)?;
            return Ok(sqlserver::compile_ansi_offset(query, components));
        }

        let mut sql = self.compile_components(query)?.concatenate();

        if !query.unions.is_empty() {
            sql = format!("{} {}", self.wrap_union(&sql), self.compile_unions(query)?);
        }

        Ok(sql)
    }

    /// The order in which a query's binding partitions line up with its placeholders
    pub fn binding_order(&self, query: &Builder) -> Vec<BindingKind> {
        if self.dialect == Dialect::SqlServer && query.offset.unwrap_or(0) > 0 {
            // orders move into the row_number() window ahead of the from clause
            return vec![
                BindingKind::Select,
                BindingKind::Order,
                BindingKind::From,
                BindingKind::Join,
                BindingKind::Where,
                BindingKind::GroupBy,
                BindingKind::Having,
                BindingKind::Union,
                BindingKind::UnionOrder,
            ];
        }
        BindingKind::ALL.to_vec()
    }

    pub(crate) fn compile_components(&self, query: &Builder) -> Result<Components> {
        let mut components = Components::default();

        if let Some(aggregate) = &query.aggregate {
            components.aggregate = Some(self.compile_aggregate(query, &aggregate.columns, &aggregate.function)?);
        } else {
            components.columns = Some(self.compile_columns(query)?);
        }
        if let Some(from) = &query.from {
            components.from = Some(self.compile_from(query, from)?);
        }
        if !query.joins.is_empty() {
            components.joins = Some(self.compile_joins(&query.joins)?);
        }
        if !query.wheres.is_empty() {
            components.wheres = Some(self.compile_wheres(query)?);
        }
        if !query.groups.is_empty() {
            components.groups = Some(format!("group by {}", self.columnize(&query.groups)?));
        }
        if !query.havings.is_empty() {
            components.havings = Some(self.compile_havings(&query.havings)?);
        }
        if !query.orders.is_empty() {
            components.orders = Some(self.compile_orders(&query.orders)?);
        }
        if let Some(limit) = query.limit {
            components.limit = self.compile_limit(limit);
        }
        if let Some(offset) = query.offset {
            components.offset = self.compile_offset(offset);
        }
        if let Some(lock) = &query.lock {
            components.lock = self.compile_lock(lock);
        }

        Ok(components)
    }

    fn compile_aggregate(&self, query: &Builder, columns: &[Identifier], function: &str) -> Result<String> {
        let mut column = self.columnize(columns)?;
        if query.distinct && column != "*" {
            column = format!("distinct {}", column);
        }
        Ok(format!("select {}({}) as aggregate", function, column))
    }

    fn compile_columns(&self, query: &Builder) -> Result<String> {
        let mut select = String::from(if query.distinct { "select distinct " } else { "select " });

        if self.dialect == Dialect::SqlServer {
            if let Some(limit) = query.limit.filter(|limit| *limit > 0) {
                if query.offset.unwrap_or(0) == 0 {
                    select.push_str(&format!("top {} ", limit));
                }
            }
        }

        match &query.columns {
            Some(columns) if !columns.is_empty() => select.push_str(&self.columnize(columns)?),
            _ => select.push('*'),
        }
        Ok(select)
    }

    fn compile_from(&self, query: &Builder, from: &Identifier) -> Result<String> {
        let from = format!("from {}", self.wrap_table_identifier(from)?);
        if self.dialect == Dialect::SqlServer {
            return Ok(sqlserver::compile_from_lock(from, query.lock.as_ref()));
        }
        Ok(from)
    }

    pub(crate) fn compile_joins(&self, joins: &[Join]) -> Result<String> {
        Ok(joins
            .iter()
            .map(|join| {
                let table = self.wrap_table_identifier(&join.table)?;
                let table = if join.clause.joins.is_empty() {
                    table
                } else {
                    format!("({} {})", table, self.compile_joins(&join.clause.joins)?)
                };
                let wheres = self.compile_wheres(&join.clause)?;
                Ok(format!("{} join {} {}", join.kind, table, wheres).trim().to_string())
            })
            .collect::<Result<Vec<_>>>()?
            .join(" "))
    }

    pub(crate) fn compile_wheres(&self, query: &Builder) -> Result<String> {
        if query.wheres.is_empty() {
            return Ok(String::new());
        }
        let conjunction = if query.is_join { "on" } else { "where" };
        Ok(format!("{} {}", conjunction, self.compile_where_list(&query.wheres)?))
    }

    fn compile_where_list(&self, wheres: &[Where]) -> Result<String> {
        let parts = wheres
            .iter()
            .map(|clause| Ok(format!("{} {}", clause.boolean(), self.compile_where(clause)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(remove_leading_boolean(&parts.join(" ")))
    }

    fn compile_where(&self, clause: &Where) -> Result<String> {
        match clause {
            Where::Basic { column, operator, value, .. } => {
                if self.dialect == Dialect::Postgres && operator.is_like() {
                    return Ok(format!("{}::text {} {}", self.wrap(column)?, operator, self.parameter(value)));
                }
                let operator = match self.dialect {
                    // numbered placeholders read `??` back as a literal `?`
                    Dialect::Postgres => operator.as_str().replace('?', "??"),
                    _ => operator.as_str().to_string(),
                };
                Ok(format!("{} {} {}", self.wrap(column)?, operator, self.parameter(value)))
            }
            Where::JsonBoolean { column, operator, value, .. } => {
                let literal = if *value { "true" } else { "false" };
                let (selector, value) = match self.dialect {
                    Dialect::MySql => (mysql::wrap_json_boolean_selector(self, column), literal.to_string()),
                    Dialect::Postgres => (
                        postgres::wrap_json_boolean_selector(self, column),
                        format!("'{}'::jsonb", literal),
                    ),
                    Dialect::SqlServer => (self.wrap(column)?, format!("'{}'", literal)),
                    Dialect::Sqlite => (self.wrap(column)?, literal.to_string()),
                    Dialect::Generic => return Err(unsupported_json()),
                };
                Ok(format!("{} {} {}", selector, operator, value))
            }
            Where::Column { first, operator, second, .. } => {
                Ok(format!("{} {} {}", self.wrap(first)?, operator, self.wrap(second)?))
            }
            Where::Raw { sql, .. } => Ok(sql.clone()),
            Where::In { column, values, not, .. } => {
                if values.is_empty() {
                    return Ok(if *not { "1 = 1" } else { "0 = 1" }.to_string());
                }
                Ok(format!(
                    "{} {} ({})",
                    self.wrap(column)?,
                    if *not { "not in" } else { "in" },
                    self.parameterize(values)
                ))
            }
            Where::InSub { column, query, not, .. } => Ok(format!(
                "{} {} ({})",
                self.wrap(column)?,
                if *not { "not in" } else { "in" },
                self.compile_select(query)?
            )),
            Where::InRaw { column, values, not, .. } => {
                if values.is_empty() {
                    return Ok(if *not { "1 = 1" } else { "0 = 1" }.to_string());
                }
                let list = values.iter().map(|value| value.to_string()).collect::<Vec<_>>().join(", ");
                Ok(format!(
                    "{} {} ({})",
                    self.wrap(column)?,
                    if *not { "not in" } else { "in" },
                    list
                ))
            }
            Where::Null { column, not, .. } => {
                if self.dialect == Dialect::MySql && is_json_selector(column) {
                    return Ok(mysql::where_json_null(self, column, *not));
                }
                Ok(format!("{} is {}null", self.wrap(column)?, if *not { "not " } else { "" }))
            }
            Where::Between { column, min, max, not, .. } => Ok(format!(
                "{} {} {} and {}",
                self.wrap(column)?,
                if *not { "not between" } else { "between" },
                self.parameter(min),
                self.parameter(max)
            )),
            Where::BetweenColumns { column, min, max, not, .. } => Ok(format!(
                "{} {} {} and {}",
                self.wrap(column)?,
                if *not { "not between" } else { "between" },
                self.wrap(min)?,
                self.wrap(max)?
            )),
            Where::Date { part, column, operator, value, .. } => {
                let column = self.wrap(column)?;
                let value = self.parameter(value);
                Ok(match self.dialect {
                    Dialect::Postgres => postgres::date_based_where(*part, &column, operator.as_str(), &value),
                    Dialect::Sqlite => sqlite::date_based_where(*part, &column, operator.as_str(), &value),
                    Dialect::SqlServer => sqlserver::date_based_where(*part, &column, operator.as_str(), &value),
                    Dialect::Generic | Dialect::MySql => {
                        format!("{}({}) {} {}", part.as_str(), column, operator, value)
                    }
                })
            }
            Where::Nested { query, .. } => Ok(format!("({})", self.compile_where_list(&query.wheres)?)),
            Where::Sub { column, operator, query, .. } => Ok(format!(
                "{} {} ({})",
                self.wrap(column)?,
                operator,
                self.compile_select(query)?
            )),
            Where::Exists { query, not, .. } => Ok(format!(
                "{}exists ({})",
                if *not { "not " } else { "" },
                self.compile_select(query)?
            )),
            Where::RowValues { columns, operator, values, .. } => Ok(format!(
                "({}) {} ({})",
                self.columnize_names(columns)?,
                operator,
                self.parameterize(values)
            )),
            Where::JsonContains { column, value, not, .. } => {
                let value = self.parameter(value);
                let sql = match self.dialect {
                    Dialect::MySql => mysql::compile_json_contains(self, column, &value),
                    Dialect::Postgres => postgres::compile_json_contains(self, column, &value)?,
                    Dialect::Sqlite => sqlite::compile_json_contains(self, column, &value)?,
                    Dialect::SqlServer => sqlserver::compile_json_contains(self, column, &value),
                    Dialect::Generic => return Err(unsupported_json()),
                };
                Ok(format!("{}{}", if *not { "not " } else { "" }, sql))
            }
            Where::JsonLength { column, operator, value, .. } => {
                let value = self.parameter(value);
                match self.dialect {
                    Dialect::MySql => Ok(mysql::compile_json_length(self, column, operator.as_str(), &value)),
                    Dialect::Postgres => postgres::compile_json_length(self, column, operator.as_str(), &value),
                    Dialect::Sqlite => Ok(sqlite::compile_json_length(self, column, operator.as_str(), &value)),
                    Dialect::SqlServer => {
                        Ok(sqlserver::compile_json_length(self, column, operator.as_str(), &value))
                    }
                    Dialect::Generic => Err(unsupported_json()),
                }
            }
        }
    }

    fn compile_havings(&self, havings: &[Having]) -> Result<String> {
        let parts = havings
            .iter()
            .map(|having| self.compile_having(having))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("having {}", remove_leading_boolean(&parts.join(" "))))
    }

    fn compile_having(&self, having: &Having) -> Result<String> {
        match having {
            Having::Basic { column, operator, value, boolean } => Ok(format!(
                "{} {} {} {}",
                boolean,
                self.wrap(column)?,
                operator,
                self.parameter(value)
            )),
            Having::Raw { sql, boolean } => Ok(format!("{} {}", boolean, sql)),
            Having::Null { column, not, boolean } => Ok(format!(
                "{} {} is {}null",
                boolean,
                self.wrap(column)?,
                if *not { "not " } else { "" }
            )),
            Having::Between { column, min, max, not, boolean } => Ok(format!(
                "{} {} {} {} and {}",
                boolean,
                self.wrap(column)?,
                if *not { "not between" } else { "between" },
                self.parameter(min),
                self.parameter(max)
            )),
        }
    }

    pub(crate) fn compile_orders(&self, orders: &[Order]) -> Result<String> {
        if orders.is_empty() {
            return Ok(String::new());
        }
        let parts = orders
            .iter()
            .map(|order| match order {
                Order::Column { column, direction } => {
                    Ok(format!("{} {}", self.wrap_identifier(column)?, direction))
                }
                Order::Raw(sql) => Ok(sql.clone()),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("order by {}", parts.join(", ")))
    }

    pub(crate) fn compile_limit(&self, limit: u64) -> Option<String> {
        match self.dialect {
            Dialect::SqlServer => None,
            _ => Some(format!("limit {}", limit)),
        }
    }

    fn compile_offset(&self, offset: u64) -> Option<String> {
        match self.dialect {
            Dialect::SqlServer => None,
            _ => Some(format!("offset {}", offset)),
        }
    }

    fn compile_lock(&self, lock: &Lock) -> Option<String> {
        match (self.dialect, lock) {
            (Dialect::Sqlite, _) | (Dialect::SqlServer, _) => None,
            (_, Lock::Raw(sql)) => Some(sql.clone()),
            (Dialect::MySql, lock) => Some(mysql::compile_lock(lock).to_string()),
            (Dialect::Postgres, Lock::Update) => Some("for update".to_string()),
            (Dialect::Postgres, Lock::Shared) => Some("for share".to_string()),
            (Dialect::Generic, _) => None,
        }
    }

    fn wrap_union(&self, sql: &str) -> String {
        match self.dialect {
            Dialect::Sqlite => format!("select * from ({})", sql),
            Dialect::SqlServer => format!(
                "select * from ({}) as {}",
                sql,
                self.wrap_value(&format!("{}temp_table", self.table_prefix))
            ),
            _ => format!("({})", sql),
        }
    }

    fn compile_unions(&self, query: &Builder) -> Result<String> {
        let mut sql = String::new();

        for union in &query.unions {
            sql.push_str(if union.all { " union all " } else { " union " });
            sql.push_str(&self.wrap_union(&self.compile_select(&union.query)?));
        }
        if !query.union_orders.is_empty() {
            sql.push(' ');
            sql.push_str(&self.compile_orders(&query.union_orders)?);
        }
        if let Some(limit) = query.union_limit.and_then(|limit| self.compile_limit(limit)) {
            sql.push(' ');
            sql.push_str(&limit);
        }
        if let Some(offset) = query.union_offset.and_then(|offset| self.compile_offset(offset)) {
            sql.push(' ');
            sql.push_str(&offset);
        }

        Ok(sql.trim_start().to_string())
    }

    /// Aggregate over a union or a grouped query by selecting from it as a derived table
    fn compile_union_aggregate(&self, query: &Builder) -> Result<String> {
        let mut inner = query.clone();
        let aggregate = inner
            .aggregate
            .take()
            .ok_or_else(|| Error::sql_generation("Union aggregate requires an aggregate"))?;
        let sql = self.compile_aggregate(query, &aggregate.columns, &aggregate.function)?;
        Ok(format!(
            "{} from ({}) as {}",
            sql,
            self.compile_select(&inner)?,
            self.wrap_table("temp_table")?
        ))
    }

    pub fn compile_exists(&self, query: &Builder) -> Result<String> {
        if self.dialect == Dialect::SqlServer {
            return sqlserver::compile_exists(self, query);
        }
        Ok(format!(
            "select exists({}) as {}",
            self.compile_select(query)?,
            self.wrap("exists")?
        ))
    }

    pub fn compile_random(&self, seed: &str) -> String {
        match self.dialect {
            Dialect::MySql => format!("RAND({})", seed),
            Dialect::SqlServer => "NEWID()".to_string(),
            _ => "RANDOM()".to_string(),
        }
    }

    // ------------------------------------------------------------------
    // INSERT
    // ------------------------------------------------------------------

    fn table_of(&self, query: &Builder) -> Result<String> {
        query.ensure_valid()?;
        let from = query
            .from
            .as_ref()
            .ok_or_else(|| Error::invalid_query("A table must be set with from() before writing"))?;
        self.wrap_table_identifier(from)
    }

    pub fn compile_insert(&self, query: &Builder, records: &[Record]) -> Result<String> {
        let table = self.table_of(query)?;

        let first = match records.first() {
            Some(first) if !first.is_empty() => first,
            _ => {
                return Ok(match self.dialect {
                    Dialect::MySql => format!("insert into {} () values ()", table),
                    _ => format!("insert into {} default values", table),
                })
            }
        };

        let columns: Vec<&str> = first.iter().map(|(column, _)| column.as_str()).collect();
        let parameters = records
            .iter()
            .map(|record| {
                let values: Vec<Operand> = record.iter().map(|(_, value)| value.clone()).collect();
                format!("({})", self.parameterize(&values))
            })
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!(
            "insert into {} ({}) values {}",
            table,
            self.columnize_names(&columns)?,
            parameters
        ))
    }

    pub fn compile_insert_or_ignore(&self, query: &Builder, records: &[Record]) -> Result<String> {
        let sql = self.compile_insert(query, records)?;
        match self.dialect {
            Dialect::MySql => Ok(sql.replacen("insert", "insert ignore", 1)),
            Dialect::Postgres => Ok(format!("{} on conflict do nothing", sql)),
            Dialect::Sqlite => Ok(sql.replacen("insert", "insert or ignore", 1)),
            Dialect::Generic | Dialect::SqlServer => Err(Error::sql_generation(
                "This database engine does not support inserting while ignoring errors",
            )),
        }
    }

    pub fn compile_insert_get_id(
        &self,
        query: &Builder,
        record: &Record,
        sequence: Option<&str>,
    ) -> Result<String> {
        let sql = self.compile_insert(query, std::slice::from_ref(record))?;
        let sequence = sequence.unwrap_or("id");
        match self.dialect {
            Dialect::Postgres => Ok(format!("{} returning {}", sql, self.wrap(sequence)?)),
            Dialect::SqlServer => Ok(format!(
                "set nocount on;{};select scope_identity() as {}",
                sql,
                self.wrap(sequence)?
            )),
            _ => Ok(sql),
        }
    }

    pub fn compile_insert_using(&self, query: &Builder, columns: &[String], sql: &str) -> Result<String> {
        Ok(format!(
            "insert into {} ({}) {}",
            self.table_of(query)?,
            self.columnize_names(columns)?,
            sql
        ))
    }

    pub fn compile_upsert(
        &self,
        query: &Builder,
        records: &[Record],
        unique_by: &[String],
        update: &[String],
    ) -> Result<String> {
        match self.dialect {
            Dialect::MySql => mysql::compile_upsert(self, query, records, update),
            Dialect::Postgres | Dialect::Sqlite => {
                let sql = self.compile_insert(query, records)?;
                let columns = update
                    .iter()
                    .map(|column| {
                        Ok(format!(
                            "{} = {}.{}",
                            self.wrap(column)?,
                            self.wrap_value("excluded"),
                            self.wrap_value(column)
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!(
                    "{} on conflict ({}) do update set {}",
                    sql,
                    self.columnize_names(unique_by)?,
                    columns.join(", ")
                ))
            }
            Dialect::SqlServer => sqlserver::compile_upsert(self, query, records, unique_by, update),
            Dialect::Generic => Err(Error::sql_generation("This database engine does not support upserts")),
        }
    }

    // ------------------------------------------------------------------
    // UPDATE / DELETE
    // ------------------------------------------------------------------

    pub fn compile_update(&self, query: &Builder, values: &Record) -> Result<String> {
        let table = self.table_of(query)?;
        let has_joins_or_limit = !query.joins.is_empty() || query.limit.is_some();

        match self.dialect {
            Dialect::Postgres if has_joins_or_limit => {
                return self.compile_update_by_row_identifier(query, &table, values, "ctid")
            }
            Dialect::Sqlite if has_joins_or_limit => {
                return self.compile_update_by_row_identifier(query, &table, values, "rowid")
            }
            _ => {}
        }

        let columns = self.compile_update_columns(values)?;
        let wheres = self.compile_wheres(query)?;

        let sql = if query.joins.is_empty() {
            let mut sql = format!("update {} set {} {}", table, columns, wheres);
            if self.dialect == Dialect::MySql {
                sql = mysql::append_order_and_limit(self, query, sql.trim_end().to_string())?;
            }
            sql
        } else {
            let joins = self.compile_joins(&query.joins)?;
            match self.dialect {
                Dialect::SqlServer => format!(
                    "update {} set {} from {} {} {}",
                    alias_of(&table),
                    columns,
                    table,
                    joins,
                    wheres
                ),
                _ => format!("update {} {} set {} {}", table, joins, columns, wheres),
            }
        };

        Ok(sql.trim().to_string())
    }

    fn compile_update_columns(&self, values: &Record) -> Result<String> {
        Ok(values
            .iter()
            .map(|(column, value)| {
                let column = match self.dialect {
                    // set clauses may not be table qualified
                    Dialect::Postgres | Dialect::Sqlite => {
                        self.wrap(column.rsplit('.').next().unwrap_or(column))?
                    }
                    _ => self.wrap(column)?,
                };
                Ok(format!("{} = {}", column, self.parameter(value)))
            })
            .collect::<Result<Vec<_>>>()?
            .join(", "))
    }

    fn compile_update_by_row_identifier(
        &self,
        query: &Builder,
        table: &str,
        values: &Record,
        row_identifier: &str,
    ) -> Result<String> {
        let columns = self.compile_update_columns(values)?;
        let select = self.select_row_identifiers(query, row_identifier)?;
        Ok(format!(
            "update {} set {} where {} in ({})",
            table,
            columns,
            self.wrap(row_identifier)?,
            select
        ))
    }

    /// Select the physical row identifiers matched by the query's joins and wheres
    fn select_row_identifiers(&self, query: &Builder, row_identifier: &str) -> Result<String> {
        let alias = query
            .from
            .as_ref()
            .and_then(Identifier::name)
            .map(|from| split_alias(from).map(|(_, alias)| alias).unwrap_or(from).to_string())
            .ok_or_else(|| Error::invalid_query("Updates and deletes with joins or limits require a table name"))?;
        let mut select = query.clone();
        select.columns = Some(vec![Identifier::Name(format!("{}.{}", alias, row_identifier))]);
        self.compile_select(&select)
    }

    /// Bindings for an UPDATE in placeholder order
    pub fn prepare_bindings_for_update(&self, bindings: &Bindings, values: &Record) -> Vec<Value> {
        let values = values.iter().filter_map(|(_, value)| value.binding().cloned());
        match self.dialect {
            Dialect::Generic | Dialect::MySql => bindings
                .get(BindingKind::Join)
                .iter()
                .cloned()
                .chain(values)
                .chain(bindings.flatten_except(&[BindingKind::Select, BindingKind::Join]))
                .collect(),
            Dialect::Postgres | Dialect::Sqlite | Dialect::SqlServer => values
                .chain(bindings.flatten_except(&[BindingKind::Select]))
                .collect(),
        }
    }

    pub fn compile_delete(&self, query: &Builder) -> Result<String> {
        let table = self.table_of(query)?;
        let has_joins_or_limit = !query.joins.is_empty() || query.limit.is_some();

        match self.dialect {
            Dialect::Postgres if has_joins_or_limit => {
                return self.compile_delete_by_row_identifier(query, &table, "ctid")
            }
            Dialect::Sqlite if has_joins_or_limit => {
                return self.compile_delete_by_row_identifier(query, &table, "rowid")
            }
            _ => {}
        }

        let wheres = self.compile_wheres(query)?;

        let sql = if query.joins.is_empty() {
            let sql = format!("delete from {} {}", table, wheres).trim_end().to_string();
            match self.dialect {
                Dialect::MySql => mysql::append_order_and_limit(self, query, sql)?,
                Dialect::SqlServer => sqlserver::delete_top(query, sql),
                _ => sql,
            }
        } else {
            format!(
                "delete {} from {} {} {}",
                alias_of(&table),
                table,
                self.compile_joins(&query.joins)?,
                wheres
            )
        };

        Ok(sql.trim().to_string())
    }

    fn compile_delete_by_row_identifier(&self, query: &Builder, table: &str, row_identifier: &str) -> Result<String> {
        let select = self.select_row_identifiers(query, row_identifier)?;
        Ok(format!(
            "delete from {} where {} in ({})",
            table,
            self.wrap(row_identifier)?,
            select
        ))
    }

    pub fn prepare_bindings_for_delete(&self, bindings: &Bindings) -> Vec<Value> {
        bindings.flatten_except(&[BindingKind::Select])
    }

    /// Statements that empty the table, each with its own bindings
    pub fn compile_truncate(&self, query: &Builder) -> Result<Vec<(String, Vec<Value>)>> {
        let table = self.table_of(query)?;
        Ok(match self.dialect {
            Dialect::Postgres => vec![(format!("truncate {} restart identity cascade", table), vec![])],
            Dialect::Sqlite => {
                let name = query.from.as_ref().and_then(Identifier::name).unwrap_or_default();
                vec![
                    (
                        "delete from sqlite_sequence where name = ?".to_string(),
                        vec![Value::String(format!("{}{}", self.table_prefix, name))],
                    ),
                    (format!("delete from {}", table), vec![]),
                ]
            }
            _ => vec![(format!("truncate table {}", table), vec![])],
        })
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    pub fn compile_savepoint(&self, name: &str) -> String {
        match self.dialect {
            Dialect::SqlServer => format!("SAVE TRANSACTION {}", name),
            _ => format!("SAVEPOINT {}", name),
        }
    }

    pub fn compile_savepoint_rollback(&self, name: &str) -> String {
        match self.dialect {
            Dialect::SqlServer => format!("ROLLBACK TRANSACTION {}", name),
            _ => format!("ROLLBACK TO SAVEPOINT {}", name),
        }
    }

    /// Encode a value bound by a JSON containment check
    pub fn prepare_binding_for_json_contains(&self, value: Value) -> Value {
        match (self.dialect, &value) {
            (Dialect::SqlServer, Value::Bool(_)) => Value::String(value.to_json().to_string()),
            (Dialect::SqlServer, _) => value,
            _ => Value::String(value.to_json().to_string()),
        }
    }
}

fn unsupported_json() -> Error {
    Error::sql_generation("This database engine does not support JSON operations")
}

pub(crate) fn is_json_selector(value: &str) -> bool {
    value.contains("->")
}

/// Split `expr as alias` on the first case-insensitive ` as `
pub(crate) fn split_alias(value: &str) -> Option<(&str, &str)> {
    let lowered = value.to_ascii_lowercase();
    let position = lowered.find(" as ")?;
    Some((value[..position].trim_end(), value[position + 4..].trim_start()))
}

/// The alias part of an already wrapped `table as alias`
fn alias_of(table: &str) -> &str {
    table.rsplit(" as ").next().unwrap_or(table)
}

fn remove_leading_boolean(value: &str) -> String {
    value
        .strip_prefix("and ")
        .or_else(|| value.strip_prefix("or "))
        .unwrap_or(value)
        .to_string()
}

/// Build a `'$."a"."b"'` path from `a->b`
pub(crate) fn wrap_json_path(value: &str, delimiter: &str) -> String {
    let value = escape_json_path_quotes(value);
    let path = value
        .split(delimiter)
        .map(wrap_json_path_segment)
        .collect::<Vec<_>>()
        .join(".");
    if path.starts_with('[') {
        format!("'${}'", path)
    } else {
        format!("'$.{}'", path)
    }
}

fn wrap_json_path_segment(segment: &str) -> String {
    if segment.ends_with(']') {
        if let Some(position) = segment.find('[') {
            let (key, indices) = segment.split_at(position);
            if key.is_empty() {
                return indices.to_string();
            }
            return format!("\"{}\"{}", key, indices);
        }
    }
    format!("\"{}\"", segment)
}

/// Single quotes, with any escaping backslashes dropped, are doubled
fn escape_json_path_quotes(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    let mut pending_backslashes = String::new();
    for c in value.chars() {
        match c {
            '\\' => pending_backslashes.push(c),
            '\'' => {
                pending_backslashes.clear();
                escaped.push_str("''");
            }
            other => {
                escaped.push_str(&pending_backslashes);
                pending_backslashes.clear();
                escaped.push(other);
            }
        }
    }
    escaped.push_str(&pending_backslashes);
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_value_per_dialect() {
        assert_eq!(Grammar::new(Dialect::Generic).wrap_value("users"), "\"users\"");
        assert_eq!(Grammar::new(Dialect::MySql).wrap_value("users"), "`users`");
        assert_eq!(Grammar::new(Dialect::SqlServer).wrap_value("users"), "[users]");
        assert_eq!(Grammar::new(Dialect::Postgres).wrap_value("*"), "*");
    }

    #[test]
    fn test_embedded_quotes_are_doubled() {
        assert_eq!(Grammar::new(Dialect::Postgres).wrap_value("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(Grammar::new(Dialect::MySql).wrap_value("we`ird"), "`we``ird`");
        assert_eq!(Grammar::new(Dialect::SqlServer).wrap_value("we]ird"), "[we]]ird]");
    }

    #[test]
    fn test_wrap_segments_and_aliases() {
        let grammar = Grammar::new(Dialect::Generic);
        assert_eq!(grammar.wrap("users.name").unwrap(), "\"users\".\"name\"");
        assert_eq!(grammar.wrap("name AS n").unwrap(), "\"name\" as \"n\"");
        assert_eq!(grammar.wrap("users.*").unwrap(), "\"users\".*");
    }

    #[test]
    fn test_table_prefix_applies_to_tables_and_aliases() {
        let grammar = Grammar::new(Dialect::Generic).with_table_prefix("prefix_");
        assert_eq!(grammar.wrap_table("users").unwrap(), "\"prefix_users\"");
        assert_eq!(
            grammar.wrap_table("users as u").unwrap(),
            "\"prefix_users\" as \"prefix_u\""
        );
        assert_eq!(grammar.wrap("u.id").unwrap(), "\"prefix_u\".\"id\"");
    }

    #[test]
    fn test_json_selectors() {
        assert_eq!(
            Grammar::new(Dialect::MySql).wrap("items->price").unwrap(),
            "json_unquote(json_extract(`items`, '$.\"price\"'))"
        );
        assert_eq!(
            Grammar::new(Dialect::Sqlite).wrap("items->price->amount").unwrap(),
            "json_extract(\"items\", '$.\"price\".\"amount\"')"
        );
        assert_eq!(
            Grammar::new(Dialect::SqlServer).wrap("items->price").unwrap(),
            "json_value([items], '$.\"price\"')"
        );
        assert_eq!(
            Grammar::new(Dialect::Postgres).wrap("items->price->amount").unwrap(),
            "\"items\"->'price'->>'amount'"
        );
        assert!(Grammar::new(Dialect::Generic).wrap("items->price").is_err());
    }

    #[test]
    fn test_json_path_array_index() {
        assert_eq!(wrap_json_path("tags[0]", "->"), "'$.\"tags\"[0]'");
        assert_eq!(wrap_json_path("[1]", "->"), "'$[1]'");
        assert_eq!(wrap_json_path("it's", "->"), "'$.\"it''s\"'");
    }

    #[test]
    fn test_dialect_parsing() {
        assert_eq!("mariadb".parse::<Dialect>().unwrap(), Dialect::MySql);
        assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("mssql".parse::<Dialect>().unwrap(), Dialect::SqlServer);
        assert!("oracle".parse::<Dialect>().is_err());
        let dialect: Dialect = serde_json::from_str("\"sqlsrv\"").unwrap();
        assert_eq!(dialect, Dialect::SqlServer);
    }

    #[test]
    fn test_savepoint_sql() {
        assert_eq!(Grammar::new(Dialect::Postgres).compile_savepoint("trans2"), "SAVEPOINT trans2");
        assert_eq!(
            Grammar::new(Dialect::Postgres).compile_savepoint_rollback("trans2"),
            "ROLLBACK TO SAVEPOINT trans2"
        );
        assert_eq!(
            Grammar::new(Dialect::SqlServer).compile_savepoint("trans2"),
            "SAVE TRANSACTION trans2"
        );
        assert_eq!(
            Grammar::new(Dialect::SqlServer).compile_savepoint_rollback("trans2"),
            "ROLLBACK TRANSACTION trans2"
        );
        assert!(Grammar::new(Dialect::Sqlite).supports_savepoints());
        assert!(!Grammar::new(Dialect::Sqlite).with_savepoints(false).supports_savepoints());
    }

    #[test]
    fn test_random_per_dialect() {
        assert_eq!(Grammar::new(Dialect::MySql).compile_random(""), "RAND()");
        assert_eq!(Grammar::new(Dialect::SqlServer).compile_random(""), "NEWID()");
        assert_eq!(Grammar::new(Dialect::Postgres).compile_random(""), "RANDOM()");
    }

    #[test]
    fn test_json_contains_binding() {
        let value = Grammar::new(Dialect::MySql).prepare_binding_for_json_contains(Value::from("en"));
        assert_eq!(value, Value::from("\"en\""));
        let value = Grammar::new(Dialect::SqlServer).prepare_binding_for_json_contains(Value::from("en"));
        assert_eq!(value, Value::from("en"));
        let value = Grammar::new(Dialect::SqlServer).prepare_binding_for_json_contains(Value::from(true));
        assert_eq!(value, Value::from("true"));
    }
}
