//! Quarry Core - query compilation, dialect grammars and the connection engine
//!
//! A [`Builder`] collects clauses and bindings, a [`Grammar`] renders them as
//! SQL for one [`Dialect`], and a [`Connection`] runs the result through a
//! [`Driver`] with query logging, reconnects and nested transactions.

pub mod builder;
pub mod config;
pub mod connection;
pub mod error;
pub mod expression;
pub mod grammar;
pub mod operator;
pub mod processor;
pub mod value;

// Re-export main types
pub use builder::{
    Boolean, Builder, IntoColumns, IntoCondition, IntoIdentifier, IntoOperand, IntoRecord, JoinClause, JoinType,
    LengthAwarePaginator, Macros, Operand, Record, SimplePaginator, SortDirection,
};
pub use config::{ConnectionConfig, ReadConfig};
pub use connection::{Connection, Driver, Event, EventSink, QueryLog, Row, SqlxDriver};
pub use error::{Error, Result};
pub use expression::{raw, Expression};
pub use grammar::{Dialect, Grammar};
pub use operator::{op, IntoOperator, Operator};
pub use processor::Processor;
pub use value::Value;

/// Create a builder with no table for the given dialect
pub fn query(dialect: Dialect) -> Builder {
    Builder::new(Grammar::new(dialect))
}

/// Create a builder selecting from `table` in the given dialect
pub fn table<T: IntoIdentifier>(dialect: Dialect, table: T) -> Builder {
    let mut query = query(dialect);
    query.from(table);
    query
}
