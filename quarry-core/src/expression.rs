//! Raw SQL fragments

use std::fmt::{self, Display};

/// A literal SQL fragment emitted verbatim, never bound
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Expression(String);

impl Expression {
    pub fn new(value: impl Into<String>) -> Self {
        Expression(value.into())
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shorthand for [`Expression::new`]
pub fn raw(value: impl Into<String>) -> Expression {
    Expression::new(value)
}
