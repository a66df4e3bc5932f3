//! Scriptable in-memory driver for tests

use super::driver::{Driver, Row};
use crate::{Error, Result, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub handle: String,
    pub kind: &'static str,
    pub sql: String,
    pub bindings: Vec<Value>,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<Call>,
    rows: VecDeque<Vec<Row>>,
    affected: u64,
    last_insert_id: Option<i64>,
    fail_next: Option<String>,
    fail_always: Option<String>,
    fail_begin: Option<String>,
    fail_commit: Option<String>,
}

/// Clones share their recorded calls and script
#[derive(Debug, Clone)]
pub struct MockDriver {
    label: String,
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            state: Arc::new(Mutex::new(MockState {
                affected: 1,
                ..MockState::default()
            })),
        }
    }

    /// Queue the result of the next select
    pub fn push_rows(&self, rows: Vec<serde_json::Value>) {
        let rows = rows
            .into_iter()
            .map(|row| row.as_object().cloned().unwrap_or_default())
            .collect();
        self.state.lock().unwrap().rows.push_back(rows);
    }

    pub fn set_affected(&self, affected: u64) {
        self.state.lock().unwrap().affected = affected;
    }

    pub fn set_last_insert_id(&self, id: i64) {
        self.state.lock().unwrap().last_insert_id = Some(id);
    }

    /// Fail the next statement with a driver error carrying `message`
    pub fn fail_next(&self, message: &str) {
        self.state.lock().unwrap().fail_next = Some(message.to_string());
    }

    pub fn fail_always(&self, message: &str) {
        self.state.lock().unwrap().fail_always = Some(message.to_string());
    }

    pub fn fail_next_begin(&self, message: &str) {
        self.state.lock().unwrap().fail_begin = Some(message.to_string());
    }

    pub fn fail_next_commit(&self, message: &str) {
        self.state.lock().unwrap().fail_commit = Some(message.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// SQL of every call of one kind, in order
    pub fn calls_of(&self, kind: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.kind == kind)
            .map(|call| call.sql)
            .collect()
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.calls().iter().filter(|call| call.kind == kind).count()
    }

    pub fn last_call(&self) -> Option<Call> {
        self.calls().pop()
    }

    fn record(&self, kind: &'static str, sql: &str, bindings: &[Value]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call {
            handle: self.label.clone(),
            kind,
            sql: sql.to_string(),
            bindings: bindings.to_vec(),
        });

        let failure = match kind {
            "begin" => state.fail_begin.take(),
            "commit" => state.fail_commit.take(),
            "rollback" => None,
            _ => state.fail_next.take().or_else(|| state.fail_always.clone()),
        };
        match failure {
            Some(message) => Err(Error::driver(message)),
            None => Ok(()),
        }
    }
}

impl Driver for MockDriver {
    async fn select(&mut self, sql: &str, bindings: &[Value]) -> Result<Vec<Row>> {
        self.record("select", sql, bindings)?;
        Ok(self.state.lock().unwrap().rows.pop_front().unwrap_or_default())
    }

    async fn affecting(&mut self, sql: &str, bindings: &[Value]) -> Result<u64> {
        self.record("affecting", sql, bindings)?;
        Ok(self.state.lock().unwrap().affected)
    }

    async fn statement(&mut self, sql: &str, bindings: &[Value]) -> Result<bool> {
        self.record("statement", sql, bindings)?;
        Ok(true)
    }

    async fn unprepared(&mut self, sql: &str) -> Result<bool> {
        self.record("unprepared", sql, &[])?;
        Ok(true)
    }

    async fn begin_transaction(&mut self) -> Result<()> {
        self.record("begin", "", &[])
    }

    async fn commit(&mut self) -> Result<()> {
        self.record("commit", "", &[])
    }

    async fn rollback(&mut self) -> Result<()> {
        self.record("rollback", "", &[])
    }

    fn last_insert_id(&self) -> Option<i64> {
        self.state.lock().unwrap().last_insert_id
    }
}
