//! SQL operator types and conversions

use crate::error::{Error, Result};
use std::fmt::{self, Display};

/// Type-safe SQL comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operator(&'static str);

/// Every operator accepted from a string, in canonical (lowercase) form
const KNOWN: &[&str] = &[
    "=", "<", ">", "<=", ">=", "<>", "!=", "<=>",
    "like", "like binary", "not like", "ilike", "not ilike",
    "&", "|", "^", "<<", ">>", "&~",
    "is", "is not",
    "rlike", "not rlike", "regexp", "not regexp",
    "~", "~*", "!~", "!~*", "~~*", "!~~*",
    "similar to", "not similar to",
    // postgres json and array operators
    "@>", "<@", "?", "?|", "?&", "||", "-", "@?", "@@", "#-",
    "is distinct from", "is not distinct from",
];

impl Operator {
    pub const GT: Self = Operator(">");
    pub const LT: Self = Operator("<");
    pub const EQ: Self = Operator("=");
    pub const NEQ: Self = Operator("!=");
    pub const LTGT: Self = Operator("<>");
    pub const GTE: Self = Operator(">=");
    pub const LTE: Self = Operator("<=");
    pub const LIKE: Self = Operator("like");
    pub const NOT_LIKE: Self = Operator("not like");
    pub const ILIKE: Self = Operator("ilike");
    pub const CONTAINS: Self = Operator("@>");

    /// Create a custom operator for database-specific operations
    ///
    /// # Examples
    /// ```
    /// use quarry_core::Operator;
    ///
    /// // PostGIS distance operator
    /// let distance_op = Operator::custom("<->");
    /// assert_eq!(distance_op.as_str(), "<->");
    /// ```
    pub const fn custom(op: &'static str) -> Self {
        Operator(op)
    }

    /// Look up a known operator, ignoring case and surrounding whitespace
    pub fn parse(op: &str) -> Option<Self> {
        let op = op.trim();
        KNOWN
            .iter()
            .find(|known| known.eq_ignore_ascii_case(op))
            .map(|known| Operator(known))
    }

    /// Get the string representation of the operator
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Equality and inequality operators, which turn a null comparison into `is [not] null`
    pub(crate) fn is_equality(&self) -> bool {
        self.0 == "="
    }

    pub(crate) fn is_inequality(&self) -> bool {
        matches!(self.0, "!=" | "<>")
    }

    pub(crate) fn is_like(&self) -> bool {
        matches!(self.0, "like" | "not like" | "ilike" | "not ilike")
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trait for types that can be converted to SQL operators
pub trait IntoOperator {
    fn into_operator(self) -> Result<Operator>;
}

impl IntoOperator for Operator {
    fn into_operator(self) -> Result<Operator> {
        Ok(self)
    }
}

/// String operators are validated against the known list
impl IntoOperator for &str {
    fn into_operator(self) -> Result<Operator> {
        Operator::parse(self).ok_or_else(|| {
            Error::invalid_query(format!(
                "Unknown operator '{}'. Use Operator::custom for database-specific operators",
                self
            ))
        })
    }
}

/// Convenience module for operator constants
pub mod op {
    use super::Operator;

    pub const GT: Operator = Operator::GT;
    pub const LT: Operator = Operator::LT;
    pub const EQ: Operator = Operator::EQ;
    pub const NEQ: Operator = Operator::NEQ;
    pub const GTE: Operator = Operator::GTE;
    pub const LTE: Operator = Operator::LTE;
    pub const LIKE: Operator = Operator::LIKE;
    pub const NOT_LIKE: Operator = Operator::NOT_LIKE;
    pub const ILIKE: Operator = Operator::ILIKE;
}
