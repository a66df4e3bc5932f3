//! Terminal updates

use super::common::{IntoRecord, Operand, Record};
use super::Builder;
use crate::connection::{Connection, Driver};
use crate::{raw, Error, Result, Value};

/// Later values replace earlier ones with the same column
fn merge_records(mut base: Record, overrides: Record) -> Record {
    for (column, value) in overrides {
        match base.iter_mut().find(|(existing, _)| *existing == column) {
            Some(slot) => slot.1 = value,
            None => base.push((column, value)),
        }
    }
    base
}

impl Builder {
    /// Update matching rows, returning how many changed.
    ///
    /// An empty record updates nothing.
    pub async fn update<D, R>(&self, conn: &mut Connection<D>, values: R) -> Result<u64>
    where
        D: Driver,
        R: IntoRecord,
    {
        let values = values.into_record();
        if values.is_empty() {
            return Ok(0);
        }
        let sql = self.grammar.compile_update(self, &values)?;
        let bindings = self.grammar.prepare_bindings_for_update(&self.bindings, &values);
        conn.update(&sql, &bindings).await
    }

    /// Add `amount` to `column`, setting `extra` columns in the same statement
    pub async fn increment<D, T, R>(&self, conn: &mut Connection<D>, column: &str, amount: T, extra: R) -> Result<u64>
    where
        D: Driver,
        T: Into<Value>,
        R: IntoRecord,
    {
        self.step(conn, column, "+", amount.into(), extra.into_record()).await
    }

    /// Subtract `amount` from `column`, setting `extra` columns in the same statement
    pub async fn decrement<D, T, R>(&self, conn: &mut Connection<D>, column: &str, amount: T, extra: R) -> Result<u64>
    where
        D: Driver,
        T: Into<Value>,
        R: IntoRecord,
    {
        self.step(conn, column, "-", amount.into(), extra.into_record()).await
    }

    async fn step<D: Driver>(
        &self,
        conn: &mut Connection<D>,
        column: &str,
        sign: &str,
        amount: Value,
        extra: Record,
    ) -> Result<u64> {
        let numeric = match &amount {
            Value::I32(_) | Value::I64(_) => true,
            Value::F32(f) => f.is_finite(),
            Value::F64(f) => f.is_finite(),
            #[cfg(feature = "decimal-support")]
            Value::Decimal(_) => true,
            _ => false,
        };
        if !numeric {
            return Err(Error::invalid_query(format!(
                "Non-numeric value passed to {} method",
                if sign == "+" { "increment" } else { "decrement" }
            )));
        }

        let expression = format!("{} {} {}", self.grammar.wrap(column)?, sign, amount);
        let values = merge_records(vec![(column.to_string(), Operand::Expr(raw(expression)))], extra);
        self.update(conn, values).await
    }

    /// Update the row matching `attributes` with `values`, inserting
    /// `attributes` and `values` together when no row matches.
    ///
    /// Returns whether a row was written.
    pub async fn update_or_insert<D, A, R>(&self, conn: &mut Connection<D>, attributes: A, values: R) -> Result<bool>
    where
        D: Driver,
        A: IntoRecord,
        R: IntoRecord,
    {
        let attributes = attributes.into_record();
        let values = values.into_record();

        let mut query = self.clone();
        query.where_record(attributes.clone());

        if !query.exists(conn).await? {
            return self.insert(conn, merge_records(attributes, values)).await;
        }
        if values.is_empty() {
            return Ok(true);
        }
        query.limit(1);
        Ok(query.update(conn, values).await? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::JoinType;
    use crate::connection::mock::MockDriver;
    use crate::grammar::{Dialect, Grammar};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn setup(dialect: Dialect) -> (MockDriver, Connection<MockDriver>) {
        let driver = MockDriver::new("write");
        let conn = Connection::new(driver.clone(), Grammar::new(dialect));
        (driver, conn)
    }

    #[tokio::test]
    async fn test_update_binds_values_before_wheres() {
        let (driver, mut conn) = setup(Dialect::Postgres);
        driver.set_affected(3);

        let mut query = conn.table("users");
        query.where_(("id", ">", 10));
        let affected = assert_ok!(query.update(&mut conn, [("name", "taylor"), ("email", "foo")]).await);

        assert_eq!(affected, 3);
        let call = driver.last_call().unwrap();
        assert_eq!(call.kind, "affecting");
        assert_eq!(call.sql, "update \"users\" set \"name\" = ?, \"email\" = ? where \"id\" > ?");
        assert_eq!(call.bindings, vec![Value::from("taylor"), Value::from("foo"), Value::I32(10)]);
    }

    #[tokio::test]
    async fn test_mysql_update_with_join_binds_join_first() {
        let (driver, mut conn) = setup(Dialect::MySql);

        let mut query = conn.table("users");
        query
            .join_with(JoinType::Inner, "orders", |join| {
                join.on("users.id", "=", "orders.user_id").where_(("orders.id", 1));
            })
            .where_(("users.active", true));
        assert_ok!(query.update(&mut conn, [("email", "foo")]).await);

        let call = driver.last_call().unwrap();
        assert_eq!(
            call.sql,
            "update `users` inner join `orders` on `users`.`id` = `orders`.`user_id` and `orders`.`id` = ? set `email` = ? where `users`.`active` = ?"
        );
        assert_eq!(call.bindings, vec![Value::I32(1), Value::from("foo"), Value::Bool(true)]);
    }

    #[tokio::test]
    async fn test_empty_update_runs_nothing() {
        let (driver, mut conn) = setup(Dialect::MySql);
        let empty: Vec<(&str, Value)> = Vec::new();
        assert_eq!(assert_ok!(conn.table("users").update(&mut conn, empty).await), 0);
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_increment_with_extra_columns() {
        let (driver, mut conn) = setup(Dialect::MySql);

        let mut query = conn.table("users");
        query.where_(("id", 1));
        assert_ok!(query.increment(&mut conn, "votes", 5, [("name", "foo")]).await);

        let call = driver.last_call().unwrap();
        assert_eq!(call.sql, "update `users` set `votes` = `votes` + 5, `name` = ? where `id` = ?");
        assert_eq!(call.bindings, vec![Value::from("foo"), Value::I32(1)]);
    }

    #[tokio::test]
    async fn test_decrement_rejects_non_numeric_amounts() {
        let (driver, mut conn) = setup(Dialect::MySql);
        let none: Vec<(&str, Value)> = Vec::new();

        assert_ok!(conn.table("users").decrement(&mut conn, "votes", 1.5, none.clone()).await);
        assert_eq!(driver.last_call().unwrap().sql, "update `users` set `votes` = `votes` - 1.5");

        let error = assert_err!(conn.table("users").decrement(&mut conn, "votes", "1; drop table users", none).await);
        assert!(error.is_compile());
    }

    #[tokio::test]
    async fn test_update_or_insert_inserts_when_missing() {
        let (driver, mut conn) = setup(Dialect::MySql);
        driver.push_rows(vec![json!({"exists": 0})]);

        let written = assert_ok!(
            conn.table("users")
                .update_or_insert(&mut conn, [("email", "foo")], [("name", "bar")])
                .await
        );

        assert!(written);
        let calls = driver.calls();
        assert_eq!(calls[0].sql, "select exists(select * from `users` where (`email` = ?)) as `exists`");
        assert_eq!(calls[1].sql, "insert into `users` (`email`, `name`) values (?, ?)");
        assert_eq!(calls[1].bindings, vec![Value::from("foo"), Value::from("bar")]);
    }

    #[tokio::test]
    async fn test_update_or_insert_updates_one_row() {
        let (driver, mut conn) = setup(Dialect::MySql);
        driver.push_rows(vec![json!({"exists": 1})]);

        assert!(assert_ok!(
            conn.table("users")
                .update_or_insert(&mut conn, [("email", "foo")], [("name", "bar")])
                .await
        ));
        let call = driver.last_call().unwrap();
        assert_eq!(call.sql, "update `users` set `name` = ? where (`email` = ?) limit 1");
        assert_eq!(call.bindings, vec![Value::from("bar"), Value::from("foo")]);
    }

    #[tokio::test]
    async fn test_update_or_insert_with_nothing_to_update() {
        let (driver, mut conn) = setup(Dialect::MySql);
        driver.push_rows(vec![json!({"exists": true})]);
        let none: Vec<(&str, Value)> = Vec::new();

        assert!(assert_ok!(
            conn.table("users")
                .update_or_insert(&mut conn, [("email", "foo")], none)
                .await
        ));
        assert_eq!(driver.calls().len(), 1);
    }
}
