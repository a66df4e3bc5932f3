//! A [`Driver`] over a single `sqlx::AnyConnection`

use super::driver::{Driver, Row};
use super::Connection;
use crate::config::ConnectionConfig;
use crate::grammar::numbered_placeholders;
use crate::{Result, Value};
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyConnection, Column, Connection as _, Executor, Row as _, ValueRef};

/// One live connection opened through sqlx's runtime-selected backends.
///
/// Enable the `postgres`, `mysql` or `sqlite` features for the backends the
/// URLs point at.
#[derive(Debug)]
pub struct SqlxDriver {
    conn: AnyConnection,
    numbered: bool,
    last_insert_id: Option<i64>,
}

impl SqlxDriver {
    pub async fn connect(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let conn = AnyConnection::connect(url).await?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: AnyConnection) -> Self {
        let numbered = conn.backend_name().eq_ignore_ascii_case("postgresql");
        Self {
            conn,
            numbered,
            last_insert_id: None,
        }
    }

    /// Open the write handle and, when configured, the read handle; a lost
    /// connection re-opens both from the same URLs
    pub async fn open(config: &ConnectionConfig) -> Result<Connection<SqlxDriver>> {
        let (write, read) = Self::open_handles(config.url.clone(), read_url(config)).await?;
        let write_url = config.url.clone();
        let reconnect_read = read_url(config);

        let connection = Connection::from_config(config, write, read).with_reconnector(move || {
            Self::open_handles(write_url.clone(), reconnect_read.clone())
        });
        Ok(connection)
    }

    async fn open_handles(write: String, read: Option<String>) -> Result<(SqlxDriver, Option<SqlxDriver>)> {
        let write = Self::connect(&write).await?;
        let read = match read {
            Some(url) => Some(Self::connect(&url).await?),
            None => None,
        };
        Ok((write, read))
    }

    fn prepare(&self, sql: &str) -> String {
        if self.numbered {
            numbered_placeholders(sql)
        } else {
            sql.to_string()
        }
    }
}

fn read_url(config: &ConnectionConfig) -> Option<String> {
    config.read.as_ref().map(|read| read.url.clone())
}

fn bind_values<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    bindings: &[Value],
) -> Query<'q, Any, AnyArguments<'q>> {
    for value in bindings {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::I32(i) => query.bind(*i),
            Value::I64(i) => query.bind(*i),
            Value::F32(f) => query.bind(*f),
            Value::F64(f) => query.bind(*f),
            Value::String(s) => query.bind(s.clone()),
            Value::Bytes(b) => query.bind(b.clone()),
            // the any driver has no native json, date, uuid or decimal types
            other => query.bind(other.to_string()),
        };
    }
    query
}

/// Read each column with the first type the backend agrees to decode
fn row_to_json(row: &AnyRow) -> Row {
    let mut out = Row::new();
    for column in row.columns() {
        let index = column.ordinal();
        let is_null = row.try_get_raw(index).map(|raw| raw.is_null()).unwrap_or(true);

        let value = if is_null {
            serde_json::Value::Null
        } else if let Ok(v) = row.try_get::<i64, _>(index) {
            serde_json::Value::from(v)
        } else if let Ok(v) = row.try_get::<f64, _>(index) {
            serde_json::Value::from(v)
        } else if let Ok(v) = row.try_get::<bool, _>(index) {
            serde_json::Value::Bool(v)
        } else if let Ok(v) = row.try_get::<String, _>(index) {
            serde_json::Value::String(v)
        } else if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
            serde_json::Value::from(v)
        } else {
            serde_json::Value::Null
        };
        out.insert(column.name().to_string(), value);
    }
    out
}

impl Driver for SqlxDriver {
    async fn select(&mut self, sql: &str, bindings: &[Value]) -> Result<Vec<Row>> {
        let sql = self.prepare(sql);
        let rows = bind_values(sqlx::query(&sql), bindings)
            .fetch_all(&mut self.conn)
            .await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn affecting(&mut self, sql: &str, bindings: &[Value]) -> Result<u64> {
        let sql = self.prepare(sql);
        let result = bind_values(sqlx::query(&sql), bindings)
            .execute(&mut self.conn)
            .await?;
        self.last_insert_id = result.last_insert_id();
        Ok(result.rows_affected())
    }

    async fn statement(&mut self, sql: &str, bindings: &[Value]) -> Result<bool> {
        self.affecting(sql, bindings).await?;
        Ok(true)
    }

    async fn unprepared(&mut self, sql: &str) -> Result<bool> {
        (&mut self.conn).execute(sql).await?;
        Ok(true)
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        (&mut self.conn).execute("BEGIN").await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        (&mut self.conn).execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        (&mut self.conn).execute("ROLLBACK").await?;
        Ok(())
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.last_insert_id
    }
}
