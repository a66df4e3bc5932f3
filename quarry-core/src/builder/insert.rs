//! Terminal inserts

use super::common::{IntoRecord, Record};
use super::Builder;
use crate::connection::{Connection, Driver};
use crate::{Error, Result, Value};

/// Bindings of every record, row by row; raw expressions bind nothing
pub(crate) fn record_bindings(records: &[Record]) -> Vec<Value> {
    records
        .iter()
        .flat_map(|record| record.iter().filter_map(|(_, value)| value.binding().cloned()))
        .collect()
}

/// Sort each record by column and check they all share the same columns
pub(crate) fn prepare_records<R: IntoRecord>(records: Vec<R>) -> Result<Vec<Record>> {
    let records: Vec<Record> = records
        .into_iter()
        .map(|record| {
            let mut record = record.into_record();
            record.sort_by(|a, b| a.0.cmp(&b.0));
            record
        })
        .collect();

    if let Some(first) = records.first() {
        let columns: Vec<&str> = first.iter().map(|(column, _)| column.as_str()).collect();
        let consistent = records
            .iter()
            .all(|record| record.iter().map(|(column, _)| column.as_str()).eq(columns.iter().copied()));
        if !consistent {
            return Err(Error::invalid_query("Every inserted record must have the same columns"));
        }
    }
    Ok(records)
}

impl Builder {
    /// Insert one record; an empty record inserts nothing
    pub async fn insert<D, R>(&self, conn: &mut Connection<D>, record: R) -> Result<bool>
    where
        D: Driver,
        R: IntoRecord,
    {
        let record = record.into_record();
        if record.is_empty() {
            return Ok(true);
        }
        let records = [record];
        let sql = self.grammar.compile_insert(self, &records)?;
        conn.insert(&sql, &record_bindings(&records)).await
    }

    /// Insert several records in one statement
    pub async fn insert_many<D, R>(&self, conn: &mut Connection<D>, records: Vec<R>) -> Result<bool>
    where
        D: Driver,
        R: IntoRecord,
    {
        if records.is_empty() {
            return Ok(true);
        }
        let records = prepare_records(records)?;
        let sql = self.grammar.compile_insert(self, &records)?;
        conn.insert(&sql, &record_bindings(&records)).await
    }

    /// Insert one record and return the id the database generated for it.
    ///
    /// `sequence` names the id column where the dialect reads it back
    /// (`id` by default).
    pub async fn insert_get_id<D, R>(&self, conn: &mut Connection<D>, record: R, sequence: Option<&str>) -> Result<Value>
    where
        D: Driver,
        R: IntoRecord,
    {
        let record = record.into_record();
        let sql = self.grammar.compile_insert_get_id(self, &record, sequence)?;
        let bindings = record_bindings(std::slice::from_ref(&record));
        let processor = conn.processor();
        processor.process_insert_get_id(conn, &sql, &bindings, sequence).await
    }

    /// Insert records, skipping those that violate a constraint
    pub async fn insert_or_ignore<D, R>(&self, conn: &mut Connection<D>, records: Vec<R>) -> Result<u64>
    where
        D: Driver,
        R: IntoRecord,
    {
        if records.is_empty() {
            return Ok(0);
        }
        let records = prepare_records(records)?;
        let sql = self.grammar.compile_insert_or_ignore(self, &records)?;
        conn.affecting_statement(&sql, &record_bindings(&records)).await
    }

    /// Insert the rows selected by a sub-query into `columns`
    pub async fn insert_using<D, F>(&self, conn: &mut Connection<D>, columns: &[&str], callback: F) -> Result<u64>
    where
        D: Driver,
        F: FnOnce(&mut Builder),
    {
        let query = self.sub(callback);
        let (select, bindings) = query.to_compiled()?;
        let columns: Vec<String> = columns.iter().map(|column| column.to_string()).collect();
        let sql = self.grammar.compile_insert_using(self, &columns, &select)?;
        conn.affecting_statement(&sql, &bindings).await
    }

    /// Insert records, updating `update` columns (all columns when `None`)
    /// of rows that collide on `unique_by`.
    ///
    /// An empty `update` list degrades to a plain insert.
    pub async fn upsert<D, R>(
        &self,
        conn: &mut Connection<D>,
        records: Vec<R>,
        unique_by: &[&str],
        update: Option<&[&str]>,
    ) -> Result<u64>
    where
        D: Driver,
        R: IntoRecord,
    {
        if records.is_empty() {
            return Ok(0);
        }
        let records = prepare_records(records)?;

        let update: Vec<String> = match update {
            Some([]) => {
                let sql = self.grammar.compile_insert(self, &records)?;
                let inserted = conn.insert(&sql, &record_bindings(&records)).await?;
                return Ok(u64::from(inserted));
            }
            Some(columns) => columns.iter().map(|column| column.to_string()).collect(),
            None => records[0].iter().map(|(column, _)| column.clone()).collect(),
        };
        let unique_by: Vec<String> = unique_by.iter().map(|column| column.to_string()).collect();

        let sql = self.grammar.compile_upsert(self, &records, &unique_by, &update)?;
        conn.affecting_statement(&sql, &record_bindings(&records)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::MockDriver;
    use crate::grammar::{Dialect, Grammar};
    use crate::builder::Operand;
    use crate::raw;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn setup(dialect: Dialect) -> (MockDriver, Connection<MockDriver>) {
        let driver = MockDriver::new("write");
        let conn = Connection::new(driver.clone(), Grammar::new(dialect));
        (driver, conn)
    }

    #[tokio::test]
    async fn test_insert_keeps_column_order() {
        let (driver, mut conn) = setup(Dialect::MySql);
        assert!(assert_ok!(
            conn.table("users")
                .insert(&mut conn, [("name", "taylor"), ("email", "taylor@example.com")])
                .await
        ));

        let call = driver.last_call().unwrap();
        assert_eq!(call.kind, "statement");
        assert_eq!(call.sql, "insert into `users` (`name`, `email`) values (?, ?)");
        assert_eq!(call.bindings, vec![Value::from("taylor"), Value::from("taylor@example.com")]);
    }

    #[tokio::test]
    async fn test_empty_insert_runs_nothing() {
        let (driver, mut conn) = setup(Dialect::MySql);
        let empty: Vec<(&str, Value)> = Vec::new();
        assert!(assert_ok!(conn.table("users").insert(&mut conn, empty).await));
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_insert_many_sorts_columns() {
        let (driver, mut conn) = setup(Dialect::Postgres);
        assert_ok!(
            conn.table("users")
                .insert_many(&mut conn, vec![[("name", "a"), ("email", "a@x")], [("email", "b@x"), ("name", "b")]])
                .await
        );

        let call = driver.last_call().unwrap();
        assert_eq!(call.sql, "insert into \"users\" (\"email\", \"name\") values (?, ?), (?, ?)");
        assert_eq!(
            call.bindings,
            vec![Value::from("a@x"), Value::from("a"), Value::from("b@x"), Value::from("b")]
        );
    }

    #[tokio::test]
    async fn test_insert_many_rejects_mismatched_records() {
        let (driver, mut conn) = setup(Dialect::Postgres);
        let error = assert_err!(
            conn.table("users")
                .insert_many(&mut conn, vec![vec![("name", "a")], vec![("email", "b@x")]])
                .await
        );
        assert!(error.is_compile());
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_raw_values_bind_nothing() {
        let (driver, mut conn) = setup(Dialect::Sqlite);
        assert_ok!(
            conn.table("users")
                .insert(&mut conn, vec![("name", Operand::Value("taylor".into())), ("created_at", Operand::Expr(raw("CURRENT_TIMESTAMP")))])
                .await
        );

        let call = driver.last_call().unwrap();
        assert_eq!(
            call.sql,
            "insert into \"users\" (\"name\", \"created_at\") values (?, CURRENT_TIMESTAMP)"
        );
        assert_eq!(call.bindings, vec![Value::from("taylor")]);
    }

    #[tokio::test]
    async fn test_insert_get_id_reads_last_insert_id() {
        let (driver, mut conn) = setup(Dialect::MySql);
        driver.set_last_insert_id(42);

        let id = assert_ok!(conn.table("users").insert_get_id(&mut conn, [("name", "taylor")], None).await);
        assert_eq!(id, Value::I64(42));
        assert_eq!(driver.calls_of("statement"), vec!["insert into `users` (`name`) values (?)".to_string()]);
    }

    #[tokio::test]
    async fn test_insert_get_id_postgres_returning() {
        let (driver, mut conn) = setup(Dialect::Postgres);
        driver.push_rows(vec![json!({"id": 7})]);

        let id = assert_ok!(conn.table("users").insert_get_id(&mut conn, [("name", "taylor")], None).await);
        assert_eq!(id, Value::I64(7));
        assert_eq!(
            driver.calls_of("select"),
            vec!["insert into \"users\" (\"name\") values (?) returning \"id\"".to_string()]
        );
    }

    #[tokio::test]
    async fn test_insert_or_ignore() {
        let (driver, mut conn) = setup(Dialect::Sqlite);
        assert_ok!(conn.table("users").insert_or_ignore(&mut conn, vec![[("email", "foo")]]).await);
        assert_eq!(
            driver.calls_of("affecting"),
            vec!["insert or ignore into \"users\" (\"email\") values (?)".to_string()]
        );

        let (_, mut conn) = setup(Dialect::SqlServer);
        let error = assert_err!(conn.table("users").insert_or_ignore(&mut conn, vec![[("email", "foo")]]).await);
        assert!(error.is_compile());
    }

    #[tokio::test]
    async fn test_insert_using() {
        let (driver, mut conn) = setup(Dialect::Postgres);
        assert_ok!(
            conn.table("table1")
                .insert_using(&mut conn, &["foo"], |query| {
                    query.select("bar").from("table2").where_(("foreign_id", "=", 5));
                })
                .await
        );

        let call = driver.last_call().unwrap();
        assert_eq!(
            call.sql,
            "insert into \"table1\" (\"foo\") select \"bar\" from \"table2\" where \"foreign_id\" = ?"
        );
        assert_eq!(call.bindings, vec![Value::I32(5)]);
    }

    #[tokio::test]
    async fn test_upsert_updates_all_columns_by_default() {
        let (driver, mut conn) = setup(Dialect::Postgres);
        assert_ok!(
            conn.table("users")
                .upsert(&mut conn, vec![[("email", "foo"), ("name", "bar")]], &["email"], None)
                .await
        );
        assert_eq!(
            driver.last_call().unwrap().sql,
            "insert into \"users\" (\"email\", \"name\") values (?, ?) on conflict (\"email\") do update set \"email\" = \"excluded\".\"email\", \"name\" = \"excluded\".\"name\""
        );
    }

    #[tokio::test]
    async fn test_upsert_with_no_update_columns_inserts() {
        let (driver, mut conn) = setup(Dialect::MySql);
        let affected = assert_ok!(
            conn.table("users")
                .upsert(&mut conn, vec![[("email", "foo")]], &["email"], Some(&[]))
                .await
        );
        assert_eq!(affected, 1);
        assert_eq!(driver.calls_of("statement"), vec!["insert into `users` (`email`) values (?)".to_string()]);
    }
}
