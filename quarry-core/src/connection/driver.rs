//! The seam between a [`Connection`](super::Connection) and a live database handle

use crate::{Result, Value};
use std::future::Future;

/// One result row, keyed by column name
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A single live database handle.
///
/// Statements arrive fully compiled with `?` placeholders; a driver for a
/// backend that numbers its parameters rewrites them before sending.
pub trait Driver: Send + 'static {
    /// Run a query and collect its rows
    fn select(&mut self, sql: &str, bindings: &[Value]) -> impl Future<Output = Result<Vec<Row>>> + Send;

    /// Run a statement and return the number of affected rows
    fn affecting(&mut self, sql: &str, bindings: &[Value]) -> impl Future<Output = Result<u64>> + Send;

    /// Run a statement, reporting success
    fn statement(&mut self, sql: &str, bindings: &[Value]) -> impl Future<Output = Result<bool>> + Send;

    /// Run raw SQL without preparing it
    fn unprepared(&mut self, sql: &str) -> impl Future<Output = Result<bool>> + Send;

    fn begin_transaction(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn commit(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn rollback(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// The id generated by the last insert on this handle, if any
    fn last_insert_id(&self) -> Option<i64>;
}
