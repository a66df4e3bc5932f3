//! Per-dialect handling of results the drivers cannot normalize

use crate::connection::{Connection, Driver, Row};
use crate::grammar::Dialect;
use crate::{Result, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Processor {
    dialect: Dialect,
}

impl Processor {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Hook applied to every selected result set
    pub fn process_select(&self, rows: Vec<Row>) -> Vec<Row> {
        rows
    }

    /// Run an insert compiled by `compile_insert_get_id` and return the new id.
    ///
    /// Postgres and SQL Server select the id back from the statement itself;
    /// the other dialects ask the driver for the last generated id.
    pub async fn process_insert_get_id<D: Driver>(
        &self,
        connection: &mut Connection<D>,
        sql: &str,
        bindings: &[Value],
        sequence: Option<&str>,
    ) -> Result<Value> {
        match self.dialect {
            Dialect::Postgres | Dialect::SqlServer => {
                let rows = connection.select_from_write_connection(sql, bindings).await?;
                let sequence = sequence.unwrap_or("id");
                let id = rows
                    .first()
                    .and_then(|row| row.get(sequence))
                    .map(Value::from_json)
                    .unwrap_or(Value::Null);
                Ok(numeric_id(id))
            }
            _ => {
                connection.insert(sql, bindings).await?;
                Ok(connection.last_insert_id().map(Value::I64).unwrap_or(Value::Null))
            }
        }
    }
}

/// Numeric strings become integers; anything else is returned as read
fn numeric_id(id: Value) -> Value {
    match &id {
        Value::String(s) => s.parse::<i64>().map(Value::I64).unwrap_or(id),
        Value::F64(f) if f.fract() == 0.0 => Value::I64(*f as i64),
        _ => id,
    }
}
