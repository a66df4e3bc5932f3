//! Fluent query builder
//!
//! A [`Builder`] collects the clauses of one statement. Fluent methods take
//! `&mut self` and return it for chaining; bindings are recorded as clauses
//! are added, partitioned by [`BindingKind`] so that they can be flattened
//! in placeholder order whatever order the methods were called in.
//!
//! Mistakes detected while building (an unknown operator, mismatched row
//! value arity, ...) are held until the query is compiled, so chains never
//! need to be interrupted with `?`.

pub mod bindings;
pub mod clause;
pub mod common;
pub mod dynamic;
pub mod pagination;

mod delete;
mod fetch;
mod insert;
mod join;
mod select;
mod update;
mod wheres;

pub use bindings::{BindingKind, Bindings};
pub use clause::{Aggregate, DatePart, Having, Lock, Order, Union, Where};
pub use common::{
    Boolean, Identifier, IntoColumns, IntoCondition, IntoIdentifier, IntoOperand, IntoRecord, JoinType, Operand,
    Record, SortDirection,
};
pub use dynamic::{parse_dynamic_where, MacroFn, Macros};
pub use join::JoinClause;
pub use pagination::{LengthAwarePaginator, SimplePaginator};

use crate::grammar::Grammar;
use crate::{Error, Operator, Result, Value};

#[derive(Debug, Clone, Default)]
pub struct Builder {
    pub(crate) grammar: Grammar,
    pub(crate) macros: Macros,
    pub(crate) aggregate: Option<Aggregate>,
    pub(crate) columns: Option<Vec<Identifier>>,
    pub(crate) distinct: bool,
    pub(crate) from: Option<Identifier>,
    pub(crate) joins: Vec<clause::Join>,
    pub(crate) wheres: Vec<Where>,
    pub(crate) groups: Vec<Identifier>,
    pub(crate) havings: Vec<Having>,
    pub(crate) orders: Vec<Order>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) unions: Vec<Union>,
    pub(crate) union_orders: Vec<Order>,
    pub(crate) union_limit: Option<u64>,
    pub(crate) union_offset: Option<u64>,
    pub(crate) lock: Option<Lock>,
    pub(crate) bindings: Bindings,
    pub(crate) use_write: bool,
    pub(crate) is_join: bool,
    pub(crate) error: Option<String>,
}

impl Builder {
    /// Create a builder compiling with the given grammar
    pub fn new(grammar: Grammar) -> Self {
        Self {
            grammar,
            ..Self::default()
        }
    }

    pub fn with_macros(mut self, macros: Macros) -> Self {
        self.macros = macros;
        self
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn macros(&self) -> &Macros {
        &self.macros
    }

    /// A fresh builder sharing this one's grammar and macros
    pub fn new_query(&self) -> Builder {
        Builder {
            grammar: self.grammar.clone(),
            macros: self.macros.clone(),
            ..Builder::default()
        }
    }

    /// Build a sub-query on a fresh builder
    pub(crate) fn sub<F>(&self, callback: F) -> Builder
    where
        F: FnOnce(&mut Builder),
    {
        let mut query = self.new_query();
        callback(&mut query);
        query
    }

    /// Compile a sub-query now so its SQL can be embedded as a raw fragment
    pub(crate) fn compile_sub(&mut self, query: &Builder) -> Option<(String, Vec<Value>)> {
        match self.grammar.compile_select(query) {
            Ok(sql) => Some((sql, query.get_bindings())),
            Err(error) => {
                self.fail(error.to_string());
                None
            }
        }
    }

    /// Record a building mistake; the first one is reported at compile time
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    /// Carry over a mistake made while building a nested query
    pub(crate) fn absorb_error(&mut self, other: &Builder) {
        if let Some(message) = &other.error {
            self.fail(message.clone());
        }
    }

    /// Unwrap an operator, recording the error if it was rejected
    pub(crate) fn accept(&mut self, operator: Result<Operator>) -> Option<Operator> {
        match operator {
            Ok(operator) => Some(operator),
            Err(error) => {
                self.fail(error.to_string());
                None
            }
        }
    }

    pub(crate) fn ensure_valid(&self) -> Result<()> {
        match &self.error {
            Some(message) => Err(Error::invalid_query(message.clone())),
            None => Ok(()),
        }
    }

    pub fn add_binding(&mut self, kind: BindingKind, value: Value) -> &mut Self {
        self.bindings.push(kind, value);
        self
    }

    pub(crate) fn add_operand_binding(&mut self, kind: BindingKind, operand: &Operand) {
        if let Some(value) = operand.binding() {
            self.bindings.push(kind, value.clone());
        }
    }

    /// Send selects through the write driver
    pub fn use_write_driver(&mut self) -> &mut Self {
        self.use_write = true;
        self
    }

    /// Compile the query as a SELECT
    pub fn to_sql(&self) -> Result<String> {
        self.grammar.compile_select(self)
    }

    /// All bindings flattened in placeholder order
    pub fn get_bindings(&self) -> Vec<Value> {
        self.bindings.flatten_in(&self.grammar.binding_order(self))
    }

    pub fn raw_bindings(&self, kind: BindingKind) -> &[Value] {
        self.bindings.get(kind)
    }

    /// The SELECT statement together with its bindings
    pub fn to_compiled(&self) -> Result<(String, Vec<Value>)> {
        Ok((self.to_sql()?, self.get_bindings()))
    }

    /// Resolve a registered macro, then a dynamic where, by name
    pub fn call(&mut self, method: &str, args: &[Value]) -> Result<&mut Self> {
        if let Some(handler) = self.macros.get(method) {
            handler(self, args)?;
            return Ok(self);
        }
        if method.starts_with("where") {
            return self.dynamic_where(method, args);
        }
        Err(Error::undefined_method(method))
    }

    fn dynamic_where(&mut self, method: &str, args: &[Value]) -> Result<&mut Self> {
        let segments = parse_dynamic_where(method)?;
        if args.len() < segments.len() {
            return Err(Error::invalid_query(format!(
                "{} expects {} arguments, {} given",
                method,
                segments.len(),
                args.len()
            )));
        }
        for ((column, boolean), value) in segments.into_iter().zip(args) {
            self.add_where(column, Ok(Operator::EQ), Operand::Value(value.clone()), boolean);
        }
        Ok(self)
    }
}
