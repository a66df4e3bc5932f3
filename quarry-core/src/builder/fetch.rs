//! Terminal reads: rows, single values, aggregates and chunking

use super::bindings::BindingKind;
use super::clause::Aggregate;
use super::common::{Identifier, IntoOperand};
use super::Builder;
use crate::connection::{Connection, Driver, Row};
use crate::grammar::split_alias;
use crate::{Error, Result, Value};
use serde::de::DeserializeOwned;

impl Builder {
    /// Run the query and return every row
    pub async fn get<D: Driver>(&self, conn: &mut Connection<D>) -> Result<Vec<Row>> {
        let (sql, bindings) = self.to_compiled()?;
        conn.select_using(&sql, &bindings, !self.use_write).await
    }

    /// Run the query and deserialize every row into `T`
    pub async fn get_as<T, D>(&self, conn: &mut Connection<D>) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        D: Driver,
    {
        self.get(conn).await?.into_iter().map(hydrate).collect()
    }

    pub async fn first<D: Driver>(&self, conn: &mut Connection<D>) -> Result<Option<Row>> {
        let mut query = self.clone();
        query.take(1);
        Ok(query.get(conn).await?.into_iter().next())
    }

    pub async fn first_as<T, D>(&self, conn: &mut Connection<D>) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        D: Driver,
    {
        self.first(conn).await?.map(hydrate).transpose()
    }

    /// The row whose `id` equals `id`
    pub async fn find<T, D>(&self, conn: &mut Connection<D>, id: T) -> Result<Option<Row>>
    where
        T: IntoOperand,
        D: Driver,
    {
        let mut query = self.clone();
        query.where_(("id", id));
        query.first(conn).await
    }

    /// A single column of the first row
    pub async fn value<D: Driver>(&self, conn: &mut Connection<D>, column: &str) -> Result<Option<serde_json::Value>> {
        let mut query = self.clone();
        query.select(column);
        let key = result_key(column);
        Ok(query
            .first(conn)
            .await?
            .and_then(|mut row| row.remove(key))
            .filter(|value| !value.is_null()))
    }

    /// One column of every row
    pub async fn pluck<D: Driver>(&self, conn: &mut Connection<D>, column: &str) -> Result<Vec<serde_json::Value>> {
        let mut query = self.clone();
        if query.columns.is_none() {
            query.select(column);
        }
        let key = result_key(column);
        Ok(query
            .get(conn)
            .await?
            .into_iter()
            .map(|mut row| row.remove(key).unwrap_or(serde_json::Value::Null))
            .collect())
    }

    pub async fn count<D: Driver>(&self, conn: &mut Connection<D>) -> Result<u64> {
        let count = self.aggregate(conn, "count", vec![Identifier::Name("*".to_string())]).await?;
        Ok(count.as_ref().and_then(json_to_u64).unwrap_or(0))
    }

    pub async fn min<D: Driver>(&self, conn: &mut Connection<D>, column: &str) -> Result<Option<serde_json::Value>> {
        self.aggregate(conn, "min", vec![Identifier::Name(column.to_string())]).await
    }

    pub async fn max<D: Driver>(&self, conn: &mut Connection<D>, column: &str) -> Result<Option<serde_json::Value>> {
        self.aggregate(conn, "max", vec![Identifier::Name(column.to_string())]).await
    }

    pub async fn avg<D: Driver>(&self, conn: &mut Connection<D>, column: &str) -> Result<Option<serde_json::Value>> {
        self.aggregate(conn, "avg", vec![Identifier::Name(column.to_string())]).await
    }

    /// The sum of `column`, zero when nothing matched
    pub async fn sum<D: Driver>(&self, conn: &mut Connection<D>, column: &str) -> Result<serde_json::Value> {
        Ok(self
            .aggregate(conn, "sum", vec![Identifier::Name(column.to_string())])
            .await?
            .unwrap_or_else(|| serde_json::Value::from(0)))
    }

    async fn aggregate<D: Driver>(
        &self,
        conn: &mut Connection<D>,
        function: &str,
        columns: Vec<Identifier>,
    ) -> Result<Option<serde_json::Value>> {
        let mut query = self.clone();
        // unions and havings may refer to the selected columns
        if self.unions.is_empty() && self.havings.is_empty() {
            query.columns = None;
            query.bindings.clear(BindingKind::Select);
        }
        query.set_aggregate(function, columns);

        Ok(query
            .get(conn)
            .await?
            .into_iter()
            .next()
            .and_then(|mut row| row.remove("aggregate"))
            .filter(|value| !value.is_null()))
    }

    pub(crate) fn set_aggregate(&mut self, function: &str, columns: Vec<Identifier>) {
        self.aggregate = Some(Aggregate {
            function: function.to_string(),
            columns,
        });
        if self.groups.is_empty() {
            self.orders.clear();
            self.bindings.clear(BindingKind::Order);
        }
    }

    pub async fn exists<D: Driver>(&self, conn: &mut Connection<D>) -> Result<bool> {
        let sql = self.grammar.compile_exists(self)?;
        let rows = conn.select_using(&sql, &self.get_bindings(), !self.use_write).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("exists"))
            .map(is_truthy)
            .unwrap_or(false))
    }

    pub async fn doesnt_exist<D: Driver>(&self, conn: &mut Connection<D>) -> Result<bool> {
        Ok(!self.exists(conn).await?)
    }

    /// Walk the results `count` rows at a time with `limit`/`offset` paging.
    ///
    /// The query must be ordered. Stops early, returning `false`, when the
    /// callback returns `false`. Callbacks that modify the rows being paged
    /// over can shift later pages; use [`chunk_by_id`](Self::chunk_by_id)
    /// for that.
    pub async fn chunk<D, F>(&self, conn: &mut Connection<D>, count: u64, mut callback: F) -> Result<bool>
    where
        D: Driver,
        F: FnMut(Vec<Row>, u64) -> bool,
    {
        self.enforce_order_by()?;
        if count == 0 {
            return Ok(true);
        }

        let mut page = 1;
        loop {
            let mut query = self.clone();
            query.for_page(page, count);
            let rows = query.get(conn).await?;
            let fetched = rows.len() as u64;
            if fetched == 0 {
                break;
            }
            if !callback(rows, page) {
                return Ok(false);
            }
            if fetched != count {
                break;
            }
            page += 1;
        }
        Ok(true)
    }

    /// Walk the results `count` rows at a time, resuming after the last
    /// `column` value seen instead of using an offset.
    ///
    /// `alias` names the key in the result rows when it differs from
    /// `column` (for example `users.id` read back as `id`).
    pub async fn chunk_by_id<D, F>(
        &self,
        conn: &mut Connection<D>,
        count: u64,
        column: &str,
        alias: Option<&str>,
        mut callback: F,
    ) -> Result<bool>
    where
        D: Driver,
        F: FnMut(Vec<Row>, u64) -> bool,
    {
        if count == 0 {
            return Ok(true);
        }
        let alias = alias.unwrap_or(column);
        let mut last_id: Option<Value> = None;
        let mut page = 1;

        loop {
            let mut query = self.clone();
            query.for_page_after_id(count, last_id.take(), column);
            let rows = query.get(conn).await?;
            let fetched = rows.len() as u64;
            if fetched == 0 {
                break;
            }

            last_id = rows
                .last()
                .and_then(|row| row.get(alias))
                .filter(|value| !value.is_null())
                .map(Value::from_json);
            if last_id.is_none() {
                return Err(Error::invalid_query(format!(
                    "The chunk_by_id operation was aborted because the [{}] column is not present in the query result",
                    alias
                )));
            }

            if !callback(rows, page) {
                return Ok(false);
            }
            if fetched != count {
                break;
            }
            page += 1;
        }
        Ok(true)
    }

    fn enforce_order_by(&self) -> Result<()> {
        if self.orders.is_empty() && self.union_orders.is_empty() {
            return Err(Error::invalid_query(
                "You must specify an order_by clause when using this function",
            ));
        }
        Ok(())
    }
}

fn hydrate<T: DeserializeOwned>(row: Row) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::Object(row))?)
}

/// The key a selected column comes back under
fn result_key(column: &str) -> &str {
    match split_alias(column) {
        Some((_, alias)) => alias,
        None => column.rsplit('.').next().unwrap_or(column),
    }
}

pub(crate) fn json_to_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => matches!(s.as_str(), "1" | "t" | "true"),
        _ => false,
    }
}
