//! Statement execution, transactions and read/write routing
//!
//! A [`Connection`] owns a write [`Driver`] and, optionally, a read driver.
//! Every statement goes through one execution path that times it, tags
//! driver failures with the statement that caused them, transparently
//! reconnects once when the connection was lost outside a transaction, and
//! reports the statement to the query log and event sink.
//!
//! Transactions nest: the outermost level talks to the driver, inner levels
//! use savepoints named `trans2`, `trans3`, ... when the grammar supports
//! them.

pub mod detect;
mod driver;
pub mod events;
#[cfg(test)]
pub(crate) mod mock;
pub mod sqlx_driver;

pub use driver::{Driver, Row};
pub use events::{Event, EventSink};
pub use sqlx_driver::SqlxDriver;

use crate::builder::common::IntoIdentifier;
use crate::builder::{Builder, Macros};
use crate::grammar::Grammar;
use crate::processor::Processor;
use crate::{Error, Result, Value};
use futures::future::BoxFuture;
use log::{debug, error, warn};
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

/// Produces fresh write and read handles after the connection was lost
pub type Reconnector<D> = Box<dyn Fn() -> BoxFuture<'static, Result<(D, Option<D>)>> + Send + Sync>;

/// A statement recorded while query logging is enabled
#[derive(Debug, Clone, PartialEq)]
pub struct QueryLog {
    pub sql: String,
    pub bindings: Vec<Value>,
    pub time: Duration,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Select { use_read: bool },
    Affecting,
    Statement,
    Unprepared,
}

enum Outcome {
    Rows(Vec<Row>),
    Count(u64),
    Done(bool),
}

impl Op {
    /// What a statement reports while pretending
    fn pretended(self) -> Outcome {
        match self {
            Op::Select { .. } => Outcome::Rows(Vec::new()),
            Op::Affecting => Outcome::Count(0),
            Op::Statement | Op::Unprepared => Outcome::Done(true),
        }
    }
}

impl Outcome {
    fn into_rows(self) -> Vec<Row> {
        match self {
            Outcome::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    fn into_count(self) -> u64 {
        match self {
            Outcome::Count(count) => count,
            _ => 0,
        }
    }

    fn into_done(self) -> bool {
        match self {
            Outcome::Done(done) => done,
            _ => true,
        }
    }
}

fn savepoint_name(level: u32) -> String {
    format!("trans{}", level)
}

pub struct Connection<D: Driver> {
    name: String,
    write: D,
    read: Option<D>,
    reconnector: Option<Reconnector<D>>,
    grammar: Grammar,
    processor: Processor,
    macros: Macros,
    events: Option<EventSink>,
    transactions: u32,
    pretending: bool,
    logging_queries: bool,
    query_log: Vec<QueryLog>,
    records_modified: bool,
    sticky: bool,
    total_query_duration: Duration,
}

impl<D: Driver> fmt::Debug for Connection<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("dialect", &self.grammar.dialect())
            .field("transactions", &self.transactions)
            .field("pretending", &self.pretending)
            .field("has_read_driver", &self.read.is_some())
            .finish()
    }
}

impl<D: Driver> Connection<D> {
    pub fn new(driver: D, grammar: Grammar) -> Self {
        let processor = Processor::new(grammar.dialect());
        Self {
            name: "default".to_string(),
            write: driver,
            read: None,
            reconnector: None,
            grammar,
            processor,
            macros: Macros::default(),
            events: None,
            transactions: 0,
            pretending: false,
            logging_queries: false,
            query_log: Vec::new(),
            records_modified: false,
            sticky: false,
            total_query_duration: Duration::ZERO,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Route selects to a separate handle
    pub fn with_read_driver(mut self, driver: D) -> Self {
        self.read = Some(driver);
        self
    }

    pub fn with_reconnector<F, Fut>(mut self, reconnector: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(D, Option<D>)>> + Send + 'static,
    {
        self.set_reconnector(reconnector);
        self
    }

    pub fn with_events(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn with_macros(mut self, macros: Macros) -> Self {
        self.macros = macros;
        self
    }

    pub fn with_processor(mut self, processor: Processor) -> Self {
        self.processor = processor;
        self
    }

    /// Once this connection has written, keep reading from the write handle
    pub fn with_sticky(mut self, sticky: bool) -> Self {
        self.sticky = sticky;
        self
    }

    pub fn set_reconnector<F, Fut>(&mut self, reconnector: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(D, Option<D>)>> + Send + 'static,
    {
        self.reconnector = Some(Box::new(move || {
            let future: BoxFuture<'static, Result<(D, Option<D>)>> = Box::pin(reconnector());
            future
        }));
    }

    pub fn set_event_sink(&mut self, sink: Option<EventSink>) {
        self.events = sink;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn processor(&self) -> Processor {
        self.processor
    }

    pub fn macros(&self) -> &Macros {
        &self.macros
    }

    /// Registry handed to every builder this connection creates
    pub fn macros_mut(&mut self) -> &mut Macros {
        &mut self.macros
    }

    pub fn driver(&self) -> &D {
        &self.write
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.write
    }

    pub fn read_driver(&self) -> Option<&D> {
        self.read.as_ref()
    }

    /// Replace the write handle; any open transaction is forgotten
    pub fn set_driver(&mut self, driver: D) {
        self.write = driver;
        self.transactions = 0;
    }

    pub fn set_read_driver(&mut self, driver: Option<D>) {
        self.read = driver;
    }

    /// A builder with nothing selected yet
    pub fn query(&self) -> Builder {
        Builder::new(self.grammar.clone()).with_macros(self.macros.clone())
    }

    /// A builder selecting from `table`
    pub fn table<T: IntoIdentifier>(&self, table: T) -> Builder {
        let mut query = self.query();
        query.from(table);
        query
    }

    pub fn transaction_level(&self) -> u32 {
        self.transactions
    }

    pub fn pretending(&self) -> bool {
        self.pretending
    }

    pub fn records_have_been_modified(&self) -> bool {
        self.records_modified
    }

    pub fn set_records_modified(&mut self, modified: bool) {
        self.records_modified = modified;
    }

    pub fn total_query_duration(&self) -> Duration {
        self.total_query_duration
    }

    pub fn reset_total_query_duration(&mut self) {
        self.total_query_duration = Duration::ZERO;
    }

    // ------------------------------------------------------------------
    // Query log
    // ------------------------------------------------------------------

    pub fn enable_query_log(&mut self) {
        self.logging_queries = true;
    }

    pub fn disable_query_log(&mut self) {
        self.logging_queries = false;
    }

    pub fn logging(&self) -> bool {
        self.logging_queries
    }

    pub fn query_log(&self) -> &[QueryLog] {
        &self.query_log
    }

    pub fn flush_query_log(&mut self) {
        self.query_log.clear();
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Run a select, on the read handle when one is usable
    pub async fn select(&mut self, sql: &str, bindings: &[Value]) -> Result<Vec<Row>> {
        self.select_using(sql, bindings, true).await
    }

    pub async fn select_from_write_connection(&mut self, sql: &str, bindings: &[Value]) -> Result<Vec<Row>> {
        self.select_using(sql, bindings, false).await
    }

    pub async fn select_using(&mut self, sql: &str, bindings: &[Value], use_read: bool) -> Result<Vec<Row>> {
        let rows = self.run(Op::Select { use_read }, sql, bindings).await?.into_rows();
        Ok(self.processor.process_select(rows))
    }

    pub async fn select_one(&mut self, sql: &str, bindings: &[Value]) -> Result<Option<Row>> {
        Ok(self.select(sql, bindings).await?.into_iter().next())
    }

    /// The single column of the first row
    pub async fn scalar(&mut self, sql: &str, bindings: &[Value]) -> Result<Option<serde_json::Value>> {
        let Some(row) = self.select_one(sql, bindings).await? else {
            return Ok(None);
        };
        if row.len() > 1 {
            return Err(Error::invalid_query("The query returned more than one column"));
        }
        Ok(row.into_iter().next().map(|(_, value)| value))
    }

    pub async fn insert(&mut self, sql: &str, bindings: &[Value]) -> Result<bool> {
        self.statement(sql, bindings).await
    }

    pub async fn update(&mut self, sql: &str, bindings: &[Value]) -> Result<u64> {
        self.affecting_statement(sql, bindings).await
    }

    pub async fn delete(&mut self, sql: &str, bindings: &[Value]) -> Result<u64> {
        self.affecting_statement(sql, bindings).await
    }

    pub async fn statement(&mut self, sql: &str, bindings: &[Value]) -> Result<bool> {
        Ok(self.run(Op::Statement, sql, bindings).await?.into_done())
    }

    pub async fn affecting_statement(&mut self, sql: &str, bindings: &[Value]) -> Result<u64> {
        Ok(self.run(Op::Affecting, sql, bindings).await?.into_count())
    }

    /// Run raw SQL without binding anything
    pub async fn unprepared(&mut self, sql: &str) -> Result<bool> {
        Ok(self.run(Op::Unprepared, sql, &[]).await?.into_done())
    }

    pub fn last_insert_id(&self) -> Option<i64> {
        self.write.last_insert_id()
    }

    /// Collect the statements `callback` would run without running them
    pub async fn pretend<F>(&mut self, callback: F) -> Result<Vec<QueryLog>>
    where
        F: for<'c> FnOnce(&'c mut Connection<D>) -> BoxFuture<'c, Result<()>>,
    {
        let logging = self.logging_queries;
        let previous = std::mem::take(&mut self.query_log);
        self.logging_queries = true;
        self.pretending = true;

        let result = callback(self).await;

        self.pretending = false;
        self.logging_queries = logging;
        let log = std::mem::replace(&mut self.query_log, previous);
        result.map(|()| log)
    }

    async fn run(&mut self, op: Op, sql: &str, bindings: &[Value]) -> Result<Outcome> {
        let start = Instant::now();
        let outcome = match self.run_query_callback(op, sql, bindings).await {
            Ok(outcome) => outcome,
            Err(error) => self.try_again_if_caused_by_lost_connection(error, op, sql, bindings).await?,
        };
        self.log_query(sql, bindings, start.elapsed());
        Ok(outcome)
    }

    async fn try_again_if_caused_by_lost_connection(
        &mut self,
        error: Error,
        op: Op,
        sql: &str,
        bindings: &[Value],
    ) -> Result<Outcome> {
        // inside a transaction the server side state is gone with the connection
        if self.transactions > 0 || !error.is_connection_lost() {
            return Err(error);
        }
        warn!("Connection [{}] lost, reconnecting: {}", self.name, error);
        self.reconnect().await?;
        self.run_query_callback(op, sql, bindings).await
    }

    async fn run_query_callback(&mut self, op: Op, sql: &str, bindings: &[Value]) -> Result<Outcome> {
        if self.pretending {
            return Ok(op.pretended());
        }

        let result = match op {
            Op::Select { use_read } => self.select_driver(use_read).select(sql, bindings).await.map(Outcome::Rows),
            Op::Affecting => self.write.affecting(sql, bindings).await.map(Outcome::Count),
            Op::Statement => self.write.statement(sql, bindings).await.map(Outcome::Done),
            Op::Unprepared => self.write.unprepared(sql).await.map(Outcome::Done),
        };

        match result {
            Ok(outcome) => {
                match &outcome {
                    Outcome::Count(count) if *count > 0 => self.records_modified = true,
                    Outcome::Done(true) => self.records_modified = true,
                    _ => {}
                }
                Ok(outcome)
            }
            Err(error) => {
                error!("Query failed on [{}]: {} (SQL: {})", self.name, error, sql);
                Err(detect::classify(error, sql, bindings))
            }
        }
    }

    /// The handle a select should use
    fn select_driver(&mut self, use_read: bool) -> &mut D {
        let read_allowed = use_read && self.transactions == 0 && !(self.sticky && self.records_modified);
        match self.read.as_mut() {
            Some(read) if read_allowed => read,
            _ => &mut self.write,
        }
    }

    fn log_query(&mut self, sql: &str, bindings: &[Value], time: Duration) {
        self.total_query_duration += time;
        debug!("[{}] {} {:?} ({:?})", self.name, sql, bindings, time);

        if self.events.is_some() {
            self.fire(Event::QueryExecuted {
                sql: sql.to_string(),
                bindings: bindings.to_vec(),
                time,
                connection: self.name.clone(),
            });
        }
        if self.logging_queries {
            self.query_log.push(QueryLog {
                sql: sql.to_string(),
                bindings: bindings.to_vec(),
                time,
            });
        }
    }

    fn fire(&self, event: Event) {
        if let Some(sink) = &self.events {
            sink(&event);
        }
    }

    /// Swap in fresh handles from the reconnector
    pub async fn reconnect(&mut self) -> Result<()> {
        let reconnector = self.reconnector.as_ref().ok_or(Error::MissingReconnector)?;
        let (write, read) = reconnector().await?;
        self.write = write;
        self.read = read;
        self.transactions = 0;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    pub async fn begin_transaction(&mut self) -> Result<()> {
        self.create_transaction().await?;
        self.transactions += 1;
        debug!("[{}] transaction level {}", self.name, self.transactions);
        self.fire(Event::TransactionBeginning {
            connection: self.name.clone(),
        });
        Ok(())
    }

    async fn create_transaction(&mut self) -> Result<()> {
        if self.pretending {
            return Ok(());
        }

        if self.transactions == 0 {
            if let Err(error) = self.write.begin_transaction().await {
                if !detect::caused_by_lost_connection(&error) {
                    return Err(error);
                }
                warn!("Connection [{}] lost before beginning a transaction, reconnecting", self.name);
                self.reconnect().await?;
                self.write.begin_transaction().await?;
            }
        } else if self.grammar.supports_savepoints() {
            let sql = self.grammar.compile_savepoint(&savepoint_name(self.transactions + 1));
            self.write.unprepared(&sql).await?;
        }
        Ok(())
    }

    /// Leave the innermost level, committing when it is the outermost one
    pub async fn commit(&mut self) -> Result<()> {
        if self.transactions == 0 {
            return Ok(());
        }
        if let Err(error) = self.commit_driver().await {
            if detect::caused_by_lost_connection(&error) {
                self.transactions = 0;
            }
            return Err(error);
        }
        self.transactions -= 1;
        self.fire_committed();
        Ok(())
    }

    async fn commit_driver(&mut self) -> Result<()> {
        if self.transactions == 1 && !self.pretending {
            self.write.commit().await?;
        }
        Ok(())
    }

    fn fire_committed(&self) {
        if self.transactions == 0 {
            self.fire(Event::TransactionCommitted {
                connection: self.name.clone(),
            });
        }
    }

    /// Roll back to `to_level`, one level down by default.
    ///
    /// Rolling back to the current level or above does nothing.
    pub async fn rollback(&mut self, to_level: Option<u32>) -> Result<()> {
        let to_level = match to_level {
            Some(level) => level,
            None => match self.transactions.checked_sub(1) {
                Some(level) => level,
                None => return Ok(()),
            },
        };
        if to_level >= self.transactions {
            return Ok(());
        }

        if let Err(error) = self.perform_rollback(to_level).await {
            if detect::caused_by_lost_connection(&error) {
                self.transactions = 0;
            }
            return Err(error);
        }

        self.transactions = to_level;
        self.fire(Event::TransactionRolledBack {
            connection: self.name.clone(),
        });
        Ok(())
    }

    async fn perform_rollback(&mut self, to_level: u32) -> Result<()> {
        if self.pretending {
            return Ok(());
        }
        if to_level == 0 {
            self.write.rollback().await
        } else if self.grammar.supports_savepoints() {
            let sql = self.grammar.compile_savepoint_rollback(&savepoint_name(to_level + 1));
            self.write.unprepared(&sql).await.map(|_| ())
        } else {
            Ok(())
        }
    }

    /// Run `callback` inside a transaction, retrying up to `attempts` times
    /// when it fails on a deadlock or serialization conflict.
    ///
    /// ```ignore
    /// let id = connection
    ///     .transaction(3, |conn| {
    ///         Box::pin(async move {
    ///             conn.table("users").update(conn, [("votes", 1)]).await?;
    ///             Ok(1)
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn transaction<T, F>(&mut self, attempts: u32, mut callback: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnMut(&'c mut Connection<D>) -> BoxFuture<'c, Result<T>> + Send,
    {
        let attempts = attempts.max(1);
        let mut attempt = 1;

        loop {
            self.begin_transaction().await?;

            let value = match callback(self).await {
                Ok(value) => value,
                Err(error) => {
                    self.handle_transaction_error(error, attempt, attempts).await?;
                    attempt += 1;
                    continue;
                }
            };

            if let Err(error) = self.commit_driver().await {
                self.handle_commit_error(error, attempt, attempts)?;
                attempt += 1;
                continue;
            }

            self.transactions = self.transactions.saturating_sub(1);
            self.fire_committed();
            return Ok(value);
        }
    }

    /// Ok means the transaction should be attempted again
    async fn handle_transaction_error(&mut self, error: Error, attempt: u32, attempts: u32) -> Result<()> {
        let concurrency = detect::caused_by_concurrency_error(&error);

        // a conflict inside a nested level aborts the whole transaction
        if concurrency && self.transactions > 1 {
            self.transactions -= 1;
            return Err(error);
        }

        if let Err(rollback_error) = self.rollback(None).await {
            error!(
                "Rollback failed on [{}] after {}: {}",
                self.name, error, rollback_error
            );
            return Err(rollback_error);
        }

        if concurrency && attempt < attempts {
            warn!(
                "Transaction on [{}] hit a concurrency conflict, retrying ({}/{})",
                self.name, attempt, attempts
            );
            return Ok(());
        }
        Err(error)
    }

    fn handle_commit_error(&mut self, error: Error, attempt: u32, attempts: u32) -> Result<()> {
        self.transactions = self.transactions.saturating_sub(1);

        if detect::caused_by_concurrency_error(&error) && attempt < attempts {
            warn!(
                "Commit on [{}] hit a concurrency conflict, retrying ({}/{})",
                self.name, attempt, attempts
            );
            return Ok(());
        }
        if detect::caused_by_lost_connection(&error) {
            self.transactions = 0;
        }
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockDriver;
    use super::*;
    use crate::grammar::Dialect;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn connection(driver: &MockDriver) -> Connection<MockDriver> {
        Connection::new(driver.clone(), Grammar::new(Dialect::MySql))
    }

    #[tokio::test]
    async fn test_select_returns_rows() {
        let driver = MockDriver::new("write");
        driver.push_rows(vec![serde_json::json!({"id": 1, "name": "taylor"})]);
        let mut conn = connection(&driver);

        let rows = assert_ok!(conn.select("select * from users", &[]).await);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "taylor");
        assert_eq!(driver.calls_of("select"), vec!["select * from users".to_string()]);
    }

    #[tokio::test]
    async fn test_failures_carry_the_statement() {
        let driver = MockDriver::new("write");
        driver.fail_next("syntax error");
        let mut conn = connection(&driver);

        let error = assert_err!(conn.statement("selec 1", &[Value::from(1)]).await);
        assert!(error.is_query_execution());
        assert_eq!(error.sql(), Some("selec 1"));
        assert_eq!(error.bindings(), Some(&[Value::I32(1)][..]));
    }

    #[tokio::test]
    async fn test_lost_connection_reconnects_once() {
        let driver = MockDriver::new("write");
        driver.fail_next("server has gone away");
        let reconnects = Arc::new(AtomicUsize::new(0));
        let counter = reconnects.clone();
        let replacement = driver.clone();
        let mut conn = connection(&driver).with_reconnector(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let replacement = replacement.clone();
            async move { Ok((replacement, None)) }
        });

        assert!(assert_ok!(conn.statement("update users set a = 1", &[]).await));
        assert_eq!(reconnects.load(Ordering::SeqCst), 1);
        assert_eq!(driver.calls_of("statement").len(), 2);
    }

    #[tokio::test]
    async fn test_lost_connection_without_reconnector() {
        let driver = MockDriver::new("write");
        driver.fail_next("server has gone away");
        let mut conn = connection(&driver);

        let error = assert_err!(conn.statement("update users set a = 1", &[]).await);
        assert!(matches!(error, Error::MissingReconnector));
    }

    #[tokio::test]
    async fn test_lost_connection_inside_transaction_is_not_retried() {
        let driver = MockDriver::new("write");
        let mut conn = connection(&driver).with_reconnector({
            let driver = driver.clone();
            move || {
                let driver = driver.clone();
                async move { Ok((driver, None)) }
            }
        });

        assert_ok!(conn.begin_transaction().await);
        driver.fail_next("server has gone away");
        let error = assert_err!(conn.statement("update users set a = 1", &[]).await);
        assert!(error.is_connection_lost());
        assert_eq!(driver.calls_of("statement").len(), 1);
    }

    #[tokio::test]
    async fn test_deadlocks_are_retried_up_to_attempts() {
        let driver = MockDriver::new("write");
        driver.fail_always("Deadlock found when trying to get lock");
        let mut conn = connection(&driver);

        let error = assert_err!(
            conn.transaction(3, |conn| Box::pin(async move {
                conn.affecting_statement("update users set votes = votes + 1", &[]).await
            }))
            .await
        );

        assert!(error.is_deadlock());
        assert_eq!(driver.count_of("begin"), 3);
        assert_eq!(driver.count_of("rollback"), 3);
        assert_eq!(driver.count_of("commit"), 0);
        assert_eq!(conn.transaction_level(), 0);
    }

    #[tokio::test]
    async fn test_transaction_commits_and_returns_value() {
        let driver = MockDriver::new("write");
        driver.set_affected(2);
        let (sink, mut receiver) = events::channel();
        let mut conn = connection(&driver).with_events(sink);

        let count = assert_ok!(
            conn.transaction(1, |conn| Box::pin(async move {
                conn.affecting_statement("update users set votes = 1", &[]).await
            }))
            .await
        );

        assert_eq!(count, 2);
        assert_eq!(driver.count_of("begin"), 1);
        assert_eq!(driver.count_of("commit"), 1);
        assert_eq!(conn.transaction_level(), 0);

        assert!(matches!(receiver.try_recv(), Ok(Event::TransactionBeginning { .. })));
        assert!(matches!(receiver.try_recv(), Ok(Event::QueryExecuted { .. })));
        assert!(matches!(receiver.try_recv(), Ok(Event::TransactionCommitted { .. })));
    }

    #[tokio::test]
    async fn test_other_errors_roll_back_without_retrying() {
        let driver = MockDriver::new("write");
        driver.fail_always("no such table: users");
        let mut conn = connection(&driver);

        assert_err!(
            conn.transaction(5, |conn| Box::pin(async move {
                conn.statement("delete from users", &[]).await
            }))
            .await
        );
        assert_eq!(driver.count_of("begin"), 1);
        assert_eq!(driver.count_of("rollback"), 1);
    }

    #[tokio::test]
    async fn test_nested_transactions_use_savepoints() {
        let driver = MockDriver::new("write");
        let mut conn = connection(&driver);

        assert_ok!(conn.begin_transaction().await);
        assert_ok!(conn.begin_transaction().await);
        assert_eq!(conn.transaction_level(), 2);
        assert_ok!(conn.rollback(None).await);
        assert_eq!(conn.transaction_level(), 1);
        assert_ok!(conn.commit().await);
        assert_eq!(conn.transaction_level(), 0);

        assert_eq!(
            driver.calls_of("unprepared"),
            vec!["SAVEPOINT trans2".to_string(), "ROLLBACK TO SAVEPOINT trans2".to_string()]
        );
        assert_eq!(driver.count_of("begin"), 1);
        assert_eq!(driver.count_of("rollback"), 0);
        assert_eq!(driver.count_of("commit"), 1);
    }

    #[tokio::test]
    async fn test_nested_transactions_without_savepoints() {
        let driver = MockDriver::new("write");
        let mut conn = Connection::new(driver.clone(), Grammar::new(Dialect::MySql).with_savepoints(false));

        assert_ok!(conn.begin_transaction().await);
        assert_ok!(conn.begin_transaction().await);
        assert_ok!(conn.rollback(None).await);
        assert_eq!(conn.transaction_level(), 1);
        assert!(driver.calls_of("unprepared").is_empty());
    }

    #[tokio::test]
    async fn test_redundant_rollback_is_silent() {
        let driver = MockDriver::new("write");
        let (sink, mut receiver) = events::channel();
        let mut conn = connection(&driver).with_events(sink);

        assert_ok!(conn.rollback(None).await);
        assert!(receiver.try_recv().is_err());

        assert_ok!(conn.begin_transaction().await);
        assert!(matches!(receiver.try_recv(), Ok(Event::TransactionBeginning { .. })));
        assert_ok!(conn.rollback(Some(1)).await);
        assert_ok!(conn.rollback(Some(4)).await);
        assert_eq!(conn.transaction_level(), 1);
        assert_eq!(driver.count_of("rollback"), 0);
        assert!(receiver.try_recv().is_err());

        assert_ok!(conn.rollback(Some(0)).await);
        assert_eq!(conn.transaction_level(), 0);
        assert_eq!(driver.count_of("rollback"), 1);
        assert!(matches!(receiver.try_recv(), Ok(Event::TransactionRolledBack { .. })));
        assert!(receiver.try_recv().is_err());

        assert_ok!(conn.rollback(None).await);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_lost_connection_on_begin_reconnects_once() {
        let driver = MockDriver::new("write");
        driver.fail_next_begin("server has gone away");
        let reconnects = Arc::new(AtomicUsize::new(0));
        let counter = reconnects.clone();
        let replacement = driver.clone();
        let mut conn = connection(&driver).with_reconnector(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let replacement = replacement.clone();
            async move { Ok((replacement, None)) }
        });

        assert_ok!(conn.begin_transaction().await);
        assert_eq!(conn.transaction_level(), 1);
        assert_eq!(driver.count_of("begin"), 2);
        assert_eq!(reconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_begin_leaves_the_level_alone() {
        let driver = MockDriver::new("write");
        let (sink, mut receiver) = events::channel();
        let mut conn = connection(&driver).with_events(sink);

        driver.fail_next_begin("server has gone away");
        let error = assert_err!(conn.begin_transaction().await);
        assert!(matches!(error, Error::MissingReconnector));
        assert_eq!(conn.transaction_level(), 0);

        driver.fail_next_begin("access denied for user");
        assert_err!(conn.begin_transaction().await);
        assert_eq!(conn.transaction_level(), 0);
        assert_eq!(driver.count_of("begin"), 2);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_commit_deadlock_is_retried() {
        let driver = MockDriver::new("write");
        driver.fail_next_commit("Deadlock found when trying to get lock");
        let mut conn = connection(&driver);

        let count = assert_ok!(
            conn.transaction(2, |conn| Box::pin(async move {
                conn.affecting_statement("update users set votes = votes + 1", &[]).await
            }))
            .await
        );

        assert_eq!(count, 1);
        assert_eq!(driver.count_of("begin"), 2);
        assert_eq!(driver.count_of("commit"), 2);
        assert_eq!(driver.count_of("affecting"), 2);
        assert_eq!(conn.transaction_level(), 0);
    }

    #[tokio::test]
    async fn test_commit_deadlock_on_last_attempt_fails() {
        let driver = MockDriver::new("write");
        driver.fail_next_commit("Deadlock found when trying to get lock");
        let mut conn = connection(&driver);

        assert_err!(
            conn.transaction(1, |conn| Box::pin(async move {
                conn.affecting_statement("update users set votes = votes + 1", &[]).await
            }))
            .await
        );
        assert_eq!(driver.count_of("begin"), 1);
        assert_eq!(driver.count_of("commit"), 1);
        assert_eq!(conn.transaction_level(), 0);
    }

    #[tokio::test]
    async fn test_lost_connection_on_commit_resets_the_level() {
        let driver = MockDriver::new("write");
        let mut conn = connection(&driver);

        assert_ok!(conn.begin_transaction().await);
        assert_ok!(conn.begin_transaction().await);
        assert_ok!(conn.commit().await);
        assert_eq!(conn.transaction_level(), 1);

        driver.fail_next_commit("server has gone away");
        let error = assert_err!(conn.commit().await);
        assert!(detect::caused_by_lost_connection(&error));
        assert_eq!(conn.transaction_level(), 0);

        driver.fail_next_commit("server has gone away");
        assert_err!(
            conn.transaction(3, |conn| Box::pin(async move {
                conn.statement("delete from sessions", &[]).await
            }))
            .await
        );
        assert_eq!(conn.transaction_level(), 0);
        assert_eq!(driver.count_of("begin"), 2);
        assert_eq!(driver.count_of("commit"), 2);
    }

    #[tokio::test]
    async fn test_commit_without_transaction_is_a_noop() {
        let driver = MockDriver::new("write");
        let mut conn = connection(&driver);
        assert_ok!(conn.commit().await);
        assert_eq!(driver.count_of("commit"), 0);
    }

    #[tokio::test]
    async fn test_pretend_collects_statements() {
        let driver = MockDriver::new("write");
        let mut conn = connection(&driver);

        let log = assert_ok!(
            conn.pretend(|conn| Box::pin(async move {
                conn.statement("insert into users (name) values (?)", &[Value::from("taylor")])
                    .await?;
                let rows = conn.select("select * from users", &[]).await?;
                assert!(rows.is_empty());
                Ok(())
            }))
            .await
        );

        assert_eq!(log.len(), 2);
        assert_eq!(log[0].sql, "insert into users (name) values (?)");
        assert_eq!(log[0].bindings, vec![Value::from("taylor")]);
        assert!(driver.calls().is_empty());
        assert!(!conn.pretending());
        assert!(!conn.logging());
    }

    #[tokio::test]
    async fn test_reads_use_the_read_driver_outside_transactions() {
        let write = MockDriver::new("write");
        let read = MockDriver::new("read");
        let mut conn = connection(&write).with_read_driver(read.clone());

        assert_ok!(conn.select("select 1", &[]).await);
        assert_eq!(read.calls_of("select").len(), 1);

        assert_ok!(conn.select_from_write_connection("select 2", &[]).await);
        assert_eq!(write.calls_of("select"), vec!["select 2".to_string()]);

        assert_ok!(conn.begin_transaction().await);
        assert_ok!(conn.select("select 3", &[]).await);
        assert_eq!(write.calls_of("select").len(), 2);
        assert_eq!(read.calls_of("select").len(), 1);
    }

    #[tokio::test]
    async fn test_sticky_reads_after_a_write() {
        let write = MockDriver::new("write");
        let read = MockDriver::new("read");
        let mut conn = connection(&write).with_read_driver(read.clone()).with_sticky(true);

        assert_ok!(conn.select("select 1", &[]).await);
        assert_ok!(conn.statement("insert into users default values", &[]).await);
        assert!(conn.records_have_been_modified());
        assert_ok!(conn.select("select 2", &[]).await);

        assert_eq!(read.calls_of("select"), vec!["select 1".to_string()]);
        assert_eq!(write.calls_of("select"), vec!["select 2".to_string()]);
    }

    #[tokio::test]
    async fn test_query_log() {
        let driver = MockDriver::new("write");
        let mut conn = connection(&driver);

        assert_ok!(conn.select("select 1", &[]).await);
        assert!(conn.query_log().is_empty());

        conn.enable_query_log();
        assert_ok!(conn.select("select 2", &[]).await);
        assert_eq!(conn.query_log().len(), 1);
        assert_eq!(conn.query_log()[0].sql, "select 2");

        conn.flush_query_log();
        assert!(conn.query_log().is_empty());
    }

    #[tokio::test]
    async fn test_scalar() {
        let driver = MockDriver::new("write");
        driver.push_rows(vec![serde_json::json!({"aggregate": 3})]);
        driver.push_rows(vec![serde_json::json!({"a": 1, "b": 2})]);
        let mut conn = connection(&driver);

        let value = assert_ok!(conn.scalar("select count(*) as aggregate from users", &[]).await);
        assert_eq!(value, Some(serde_json::json!(3)));
        assert_err!(conn.scalar("select a, b from users", &[]).await);
        assert_eq!(assert_ok!(conn.scalar("select 1 where 0", &[]).await), None);
    }

    #[test]
    fn test_builders_share_grammar_and_macros() {
        let driver = MockDriver::new("write");
        let mut conn = connection(&driver);
        conn.macros_mut().register("active", |query: &mut Builder, _: &[Value]| {
            query.where_(("active", true));
            Ok(())
        });

        let mut query = conn.table("users");
        assert_ok!(query.call("active", &[]));
        assert_eq!(
            assert_ok!(query.to_sql()),
            "select * from `users` where `active` = ?"
        );
    }
}
