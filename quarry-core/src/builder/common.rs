//! Common types and traits shared by the query builder and grammars

use crate::{Expression, IntoOperator, Operator, Result, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// How a clause is joined to the clause before it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boolean {
    And,
    Or,
}

impl Boolean {
    pub fn as_str(&self) -> &'static str {
        match self {
            Boolean::And => "and",
            Boolean::Or => "or",
        }
    }
}

impl std::fmt::Display for Boolean {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Right-hand side of a comparison: a bound value or a raw fragment
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    Expr(Expression),
}

impl Operand {
    /// The binding this operand contributes, if any
    pub fn binding(&self) -> Option<&Value> {
        match self {
            Operand::Value(value) => Some(value),
            Operand::Expr(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Operand::Value(Value::Null))
    }
}

/// Trait for values usable on the right-hand side of a clause
pub trait IntoOperand {
    fn into_operand(self) -> Operand;
}

impl IntoOperand for Operand {
    fn into_operand(self) -> Operand {
        self
    }
}

impl IntoOperand for Expression {
    fn into_operand(self) -> Operand {
        Operand::Expr(self)
    }
}

impl<T> IntoOperand for Option<T>
where
    T: Into<Value>,
{
    fn into_operand(self) -> Operand {
        Operand::Value(self.into())
    }
}

macro_rules! impl_into_operand {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoOperand for $ty {
                fn into_operand(self) -> Operand {
                    Operand::Value(Value::from(self))
                }
            }
        )*
    };
}

impl_into_operand!(
    Value,
    (),
    bool,
    i32,
    i64,
    u32,
    f32,
    f64,
    String,
    &String,
    &str,
    Vec<u8>,
    serde_json::Value,
    NaiveDate,
    NaiveTime,
    NaiveDateTime,
    DateTime<Utc>,
);

#[cfg(feature = "uuid-support")]
impl_into_operand!(uuid::Uuid);

#[cfg(feature = "decimal-support")]
impl_into_operand!(rust_decimal::Decimal);

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Value(value)
    }
}

/// Trait for conditions that can be used in WHERE and HAVING clauses
pub trait IntoCondition {
    fn into_condition(self) -> (String, Result<Operator>, Operand);
}

// Implementation for shorthand equality: where_(("age", 18))
impl<T> IntoCondition for (&str, T)
where
    T: IntoOperand,
{
    fn into_condition(self) -> (String, Result<Operator>, Operand) {
        (self.0.to_string(), Ok(Operator::EQ), self.1.into_operand())
    }
}

// Implementation for explicit operators: where_(("age", op::GT, 18)) or where_(("age", ">", 18))
impl<T, O> IntoCondition for (&str, O, T)
where
    T: IntoOperand,
    O: IntoOperator,
{
    fn into_condition(self) -> (String, Result<Operator>, Operand) {
        (
            self.0.to_string(),
            self.1.into_operator(),
            self.2.into_operand(),
        )
    }
}

/// A column, table or alias reference: a name to be quoted or a raw fragment
#[derive(Debug, Clone, PartialEq)]
pub enum Identifier {
    Name(String),
    Raw(Expression),
}

impl Identifier {
    /// The name if this is not a raw fragment
    pub fn name(&self) -> Option<&str> {
        match self {
            Identifier::Name(name) => Some(name),
            Identifier::Raw(_) => None,
        }
    }
}

/// Trait to convert a single item into an identifier
pub trait IntoIdentifier {
    fn into_identifier(self) -> Identifier;
}

impl IntoIdentifier for Identifier {
    fn into_identifier(self) -> Identifier {
        self
    }
}

impl IntoIdentifier for &str {
    fn into_identifier(self) -> Identifier {
        Identifier::Name(self.to_string())
    }
}

impl IntoIdentifier for String {
    fn into_identifier(self) -> Identifier {
        Identifier::Name(self)
    }
}

impl IntoIdentifier for &String {
    fn into_identifier(self) -> Identifier {
        Identifier::Name(self.clone())
    }
}

impl IntoIdentifier for Expression {
    fn into_identifier(self) -> Identifier {
        Identifier::Raw(self)
    }
}

/// Trait to convert various types into columns
pub trait IntoColumns {
    fn into_columns(self) -> Vec<Identifier>;
}

impl IntoColumns for &str {
    fn into_columns(self) -> Vec<Identifier> {
        vec![self.into_identifier()]
    }
}

impl IntoColumns for String {
    fn into_columns(self) -> Vec<Identifier> {
        vec![self.into_identifier()]
    }
}

impl IntoColumns for Expression {
    fn into_columns(self) -> Vec<Identifier> {
        vec![self.into_identifier()]
    }
}

impl<T: IntoIdentifier> IntoColumns for Vec<T> {
    fn into_columns(self) -> Vec<Identifier> {
        self.into_iter().map(IntoIdentifier::into_identifier).collect()
    }
}

impl<T: IntoIdentifier, const N: usize> IntoColumns for [T; N] {
    fn into_columns(self) -> Vec<Identifier> {
        self.into_iter().map(IntoIdentifier::into_identifier).collect()
    }
}

// For tuples
impl<A: IntoIdentifier, B: IntoIdentifier> IntoColumns for (A, B) {
    fn into_columns(self) -> Vec<Identifier> {
        vec![self.0.into_identifier(), self.1.into_identifier()]
    }
}

impl<A: IntoIdentifier, B: IntoIdentifier, C: IntoIdentifier> IntoColumns for (A, B, C) {
    fn into_columns(self) -> Vec<Identifier> {
        vec![
            self.0.into_identifier(),
            self.1.into_identifier(),
            self.2.into_identifier(),
        ]
    }
}

impl<A, B, C, D> IntoColumns for (A, B, C, D)
where
    A: IntoIdentifier,
    B: IntoIdentifier,
    C: IntoIdentifier,
    D: IntoIdentifier,
{
    fn into_columns(self) -> Vec<Identifier> {
        vec![
            self.0.into_identifier(),
            self.1.into_identifier(),
            self.2.into_identifier(),
            self.3.into_identifier(),
        ]
    }
}

/// JOIN types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Cross,
}

impl std::fmt::Display for JoinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinType::Inner => write!(f, "inner"),
            JoinType::Left => write!(f, "left"),
            JoinType::Right => write!(f, "right"),
            JoinType::Cross => write!(f, "cross"),
        }
    }
}

/// Sort direction for ORDER BY clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl std::fmt::Display for SortDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

/// One row of column/value pairs for INSERT, UPDATE and upserts
pub type Record = Vec<(String, Operand)>;

/// Trait for types that can be converted to a record
pub trait IntoRecord {
    fn into_record(self) -> Record;
}

impl<T: IntoOperand> IntoRecord for Vec<(&str, T)> {
    fn into_record(self) -> Record {
        self.into_iter()
            .map(|(column, value)| (column.to_string(), value.into_operand()))
            .collect()
    }
}

impl<T: IntoOperand, const N: usize> IntoRecord for [(&str, T); N] {
    fn into_record(self) -> Record {
        self.into_iter()
            .map(|(column, value)| (column.to_string(), value.into_operand()))
            .collect()
    }
}

impl IntoRecord for Vec<(String, Operand)> {
    fn into_record(self) -> Record {
        self
    }
}

// Map keys are sorted so the column order is deterministic
impl IntoRecord for HashMap<String, Value> {
    fn into_record(self) -> Record {
        let sorted: BTreeMap<String, Value> = self.into_iter().collect();
        sorted.into_record()
    }
}

impl IntoRecord for BTreeMap<String, Value> {
    fn into_record(self) -> Record {
        self.into_iter()
            .map(|(column, value)| (column, Operand::Value(value)))
            .collect()
    }
}

impl IntoRecord for serde_json::Map<String, serde_json::Value> {
    fn into_record(self) -> Record {
        self.into_iter()
            .map(|(column, value)| (column, Operand::Value(Value::from_json(&value))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::op;
    use crate::raw;

    #[test]
    fn test_string_operator_conversion() {
        let (column, operator, value) = ("age", ">", 18).into_condition();
        assert_eq!(column, "age");
        assert_eq!(operator.unwrap(), op::GT);
        assert_eq!(value, Operand::Value(Value::I32(18)));
    }

    #[test]
    fn test_condition_trait_implementations() {
        let (column, operator, value) = ("name", "John").into_condition();
        assert_eq!(column, "name");
        assert_eq!(operator.unwrap(), op::EQ);
        assert_eq!(value, Operand::Value("John".into()));

        let (_, operator, value) = ("age", op::GT, raw("18")).into_condition();
        assert_eq!(operator.unwrap(), op::GT);
        assert_eq!(value, Operand::Expr(raw("18")));
    }

    #[test]
    fn test_unknown_operator_is_deferred() {
        let (_, operator, _) = ("age", "=>", 18).into_condition();
        assert!(operator.is_err());
    }

    #[test]
    fn test_into_columns_implementations() {
        assert_eq!(
            "name".into_columns(),
            vec![Identifier::Name("name".to_string())]
        );
        assert_eq!(vec!["a", "b"].into_columns().len(), 2);
        assert_eq!(["a", "b", "c"].into_columns().len(), 3);
        assert_eq!(
            ("id", raw("count(*) as total")).into_columns()[1],
            Identifier::Raw(raw("count(*) as total"))
        );
    }

    #[test]
    fn test_into_record_from_maps_is_sorted() {
        let mut data = HashMap::new();
        data.insert("name".to_string(), Value::from("John"));
        data.insert("age".to_string(), Value::from(30));
        let record = data.into_record();
        assert_eq!(record[0].0, "age");
        assert_eq!(record[1].0, "name");
    }

    #[test]
    fn test_null_operand() {
        assert!(None::<i32>.into_operand().is_null());
        assert_eq!(Operand::Expr(raw("now()")).binding(), None);
    }
}
