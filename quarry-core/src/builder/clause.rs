//! Clause nodes collected by the builder

use super::common::{Boolean, Identifier, JoinType, Operand, SortDirection};
use super::Builder;
use crate::Operator;

/// Part of a date or time compared by a date where
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Date,
    Day,
    Month,
    Year,
    Time,
}

impl DatePart {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatePart::Date => "date",
            DatePart::Day => "day",
            DatePart::Month => "month",
            DatePart::Year => "year",
            DatePart::Time => "time",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Where {
    Basic {
        column: String,
        operator: Operator,
        value: Operand,
        boolean: Boolean,
    },
    /// A JSON path compared against a boolean literal
    JsonBoolean {
        column: String,
        operator: Operator,
        value: bool,
        boolean: Boolean,
    },
    Column {
        first: String,
        operator: Operator,
        second: String,
        boolean: Boolean,
    },
    Raw {
        sql: String,
        boolean: Boolean,
    },
    In {
        column: String,
        values: Vec<Operand>,
        not: bool,
        boolean: Boolean,
    },
    InSub {
        column: String,
        query: Box<Builder>,
        not: bool,
        boolean: Boolean,
    },
    /// Integers inlined into the SQL
    InRaw {
        column: String,
        values: Vec<i64>,
        not: bool,
        boolean: Boolean,
    },
    Null {
        column: String,
        not: bool,
        boolean: Boolean,
    },
    Between {
        column: String,
        min: Operand,
        max: Operand,
        not: bool,
        boolean: Boolean,
    },
    BetweenColumns {
        column: String,
        min: String,
        max: String,
        not: bool,
        boolean: Boolean,
    },
    Date {
        part: DatePart,
        column: String,
        operator: Operator,
        value: Operand,
        boolean: Boolean,
    },
    Nested {
        query: Box<Builder>,
        boolean: Boolean,
    },
    Sub {
        column: String,
        operator: Operator,
        query: Box<Builder>,
        boolean: Boolean,
    },
    Exists {
        query: Box<Builder>,
        not: bool,
        boolean: Boolean,
    },
    RowValues {
        columns: Vec<String>,
        operator: Operator,
        values: Vec<Operand>,
        boolean: Boolean,
    },
    JsonContains {
        column: String,
        value: Operand,
        not: bool,
        boolean: Boolean,
    },
    JsonLength {
        column: String,
        operator: Operator,
        value: Operand,
        boolean: Boolean,
    },
}

impl Where {
    pub fn boolean(&self) -> Boolean {
        match self {
            Where::Basic { boolean, .. }
            | Where::JsonBoolean { boolean, .. }
            | Where::Column { boolean, .. }
            | Where::Raw { boolean, .. }
            | Where::In { boolean, .. }
            | Where::InSub { boolean, .. }
            | Where::InRaw { boolean, .. }
            | Where::Null { boolean, .. }
            | Where::Between { boolean, .. }
            | Where::BetweenColumns { boolean, .. }
            | Where::Date { boolean, .. }
            | Where::Nested { boolean, .. }
            | Where::Sub { boolean, .. }
            | Where::Exists { boolean, .. }
            | Where::RowValues { boolean, .. }
            | Where::JsonContains { boolean, .. }
            | Where::JsonLength { boolean, .. } => *boolean,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Having {
    Basic {
        column: String,
        operator: Operator,
        value: Operand,
        boolean: Boolean,
    },
    Raw {
        sql: String,
        boolean: Boolean,
    },
    Null {
        column: String,
        not: bool,
        boolean: Boolean,
    },
    Between {
        column: String,
        min: Operand,
        max: Operand,
        not: bool,
        boolean: Boolean,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Order {
    Column {
        column: Identifier,
        direction: SortDirection,
    },
    Raw(String),
}

impl Order {
    /// True if this ordering is on exactly the given column name
    pub(crate) fn is_on(&self, name: &str) -> bool {
        matches!(self, Order::Column { column: Identifier::Name(column), .. } if column == name)
    }
}

#[derive(Debug, Clone)]
pub struct Union {
    pub query: Box<Builder>,
    pub all: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub function: String,
    pub columns: Vec<Identifier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lock {
    Update,
    Shared,
    Raw(String),
}

/// A join target and its ON conditions, held in a nested builder
#[derive(Debug, Clone)]
pub struct Join {
    pub kind: JoinType,
    pub table: Identifier,
    pub clause: Box<Builder>,
}
