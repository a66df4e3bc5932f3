//! Error types for Quarry

use crate::value::Value;
use thiserror::Error;

/// The main error type for Quarry operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or execution error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Failure reported by a driver that does not speak sqlx
    #[error("Driver error: {message}")]
    Driver { message: String },

    /// SQL generation error
    #[error("SQL generation error: {message}")]
    SqlGeneration { message: String },

    /// Invalid query configuration
    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    /// The driver lost its connection while running a statement
    #[error("Connection lost: {source} (SQL: {sql})")]
    ConnectionLost {
        sql: String,
        bindings: Vec<Value>,
        #[source]
        source: Box<Error>,
    },

    /// Deadlock or serialization failure
    #[error("Deadlock: {source} (SQL: {sql})")]
    Deadlock {
        sql: String,
        bindings: Vec<Value>,
        #[source]
        source: Box<Error>,
    },

    /// Any other failure while executing a statement
    #[error("Query execution error: {source} (SQL: {sql})")]
    QueryExecution {
        sql: String,
        bindings: Vec<Value>,
        #[source]
        source: Box<Error>,
    },

    /// A lost connection could not be recovered because no reconnector is set
    #[error("Lost connection and no reconnector available")]
    MissingReconnector,

    /// No macro or dynamic where matches the called name
    #[error("Call to undefined method {method}")]
    UndefinedMethod { method: String },

    /// Connection configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience Result type for Quarry operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new SQL generation error
    pub fn sql_generation(message: impl Into<String>) -> Self {
        Self::SqlGeneration {
            message: message.into(),
        }
    }

    /// Create a new invalid query error
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn undefined_method(method: impl Into<String>) -> Self {
        Self::UndefinedMethod {
            method: method.into(),
        }
    }

    /// True for errors raised before any I/O happened
    pub fn is_compile(&self) -> bool {
        matches!(self, Self::SqlGeneration { .. } | Self::InvalidQuery { .. })
    }

    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost { .. })
    }

    pub fn is_deadlock(&self) -> bool {
        matches!(self, Self::Deadlock { .. })
    }

    /// Deadlocks count as query execution failures too
    pub fn is_query_execution(&self) -> bool {
        matches!(self, Self::QueryExecution { .. } | Self::Deadlock { .. })
    }

    /// The statement that failed, if this error came from execution
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::ConnectionLost { sql, .. }
            | Self::Deadlock { sql, .. }
            | Self::QueryExecution { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// The bindings of the statement that failed
    pub fn bindings(&self) -> Option<&[Value]> {
        match self {
            Self::ConnectionLost { bindings, .. }
            | Self::Deadlock { bindings, .. }
            | Self::QueryExecution { bindings, .. } => Some(bindings),
            _ => None,
        }
    }

    /// The underlying driver error, unwrapping execution context
    pub fn root(&self) -> &Error {
        match self {
            Self::ConnectionLost { source, .. }
            | Self::Deadlock { source, .. }
            | Self::QueryExecution { source, .. } => source.root(),
            other => other,
        }
    }
}
