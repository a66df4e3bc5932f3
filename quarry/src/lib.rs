//! Quarry - a fluent SQL query builder and connection engine for Rust
//!
//! Queries are assembled with a mutable [`Builder`], compiled for MySQL,
//! PostgreSQL, SQLite or SQL Server, and run through a [`Connection`] that
//! logs queries, reconnects after a lost connection and nests transactions
//! with savepoints.
//!
//! ```
//! use quarry::Dialect;
//!
//! let mut query = quarry::table(Dialect::MySql, "users");
//! query.where_(("active", true));
//!
//! assert_eq!(query.to_sql().unwrap(), "select * from `users` where `active` = ?");
//! ```

pub use quarry_core::*;

/// Open a connection described by `config` through sqlx.
///
/// The backend named by the URL must be enabled with the matching crate
/// feature (`postgres`, `mysql` or `sqlite`).
pub async fn connect(config: &ConnectionConfig) -> Result<Connection<SqlxDriver>> {
    SqlxDriver::open(config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[test]
    fn test_table_shorthand() {
        let mut query = table(Dialect::Postgres, "users");
        query.select(["id", "email"]).where_(("id", ">", 10)).limit(5);

        assert_eq!(
            query.to_sql().unwrap(),
            "select \"id\", \"email\" from \"users\" where \"id\" > ? limit 5"
        );
        assert_eq!(query.get_bindings(), vec![Value::I32(10)]);
    }

    #[test]
    fn test_query_without_table() {
        let mut query = query(Dialect::Sqlite);
        query.select_raw("1 + 1 as total", vec![]);
        assert_eq!(query.to_sql().unwrap(), "select 1 + 1 as total");
    }

    #[test]
    fn test_config_grammar() {
        let config = ConnectionConfig::from_json(r#"{"driver": "sqlserver", "url": "mssql://localhost/app"}"#).unwrap();
        let mut query = Builder::new(config.grammar());
        query.from("users").limit(1);
        assert_eq!(query.to_sql().unwrap(), "select top 1 * from [users]");
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_backends() {
        let config = ConnectionConfig::new(Dialect::MySql, "nosuchdb://localhost/app");
        let error = assert_err!(connect(&config).await);
        assert!(matches!(error, Error::Database(_)));
    }
}
