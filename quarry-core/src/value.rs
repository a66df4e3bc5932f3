//! Value types for SQL bindings

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// A scalar bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 32-bit integer
    I32(i32),
    /// 64-bit integer
    I64(i64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// String value
    String(String),
    /// Bytes value
    Bytes(Vec<u8>),
    /// JSON document, bound as its serialized text
    Json(serde_json::Value),
    /// Calendar date
    Date(NaiveDate),
    /// Time of day
    Time(NaiveTime),
    /// Date and time without zone
    DateTime(NaiveDateTime),
    #[cfg(feature = "uuid-support")]
    Uuid(uuid::Uuid),
    #[cfg(feature = "decimal-support")]
    Decimal(rust_decimal::Decimal),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the SQL type name for this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::I32(_) => "INTEGER",
            Value::I64(_) => "BIGINT",
            Value::F32(_) => "REAL",
            Value::F64(_) => "DOUBLE PRECISION",
            Value::String(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
            Value::Json(_) => "JSON",
            Value::Date(_) => "DATE",
            Value::Time(_) => "TIME",
            Value::DateTime(_) => "TIMESTAMP",
            #[cfg(feature = "uuid-support")]
            Value::Uuid(_) => "UUID",
            #[cfg(feature = "decimal-support")]
            Value::Decimal(_) => "DECIMAL",
        }
    }

    /// Coerce to the integer this value starts with.
    ///
    /// Strings keep their leading (optionally signed) digits, so `"12abc"`
    /// becomes `12`; values with no numeric prefix yield `None`.
    pub fn leading_integer(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::I32(i) => Some(i64::from(*i)),
            Value::I64(i) => Some(*i),
            Value::F32(f) if f.is_finite() => Some(f.trunc() as i64),
            Value::F64(f) if f.is_finite() => Some(f.trunc() as i64),
            Value::String(s) => leading_integer(s),
            Value::Json(serde_json::Value::Number(n)) => {
                n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            }
            #[cfg(feature = "decimal-support")]
            Value::Decimal(d) => {
                use rust_decimal::prelude::ToPrimitive;
                d.trunc().to_i64()
            }
            _ => None,
        }
    }

    /// Convert a column read back from a driver row into a binding
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::I64(i),
                None => Value::F64(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            other => Value::Json(other.clone()),
        }
    }

    /// The JSON form of this value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::I32(i) => serde_json::Value::from(*i),
            Value::I64(i) => serde_json::Value::from(*i),
            Value::F32(v) => serde_json::Value::from(f64::from(*v)),
            Value::F64(v) => serde_json::Value::from(*v),
            Value::Bytes(b) => serde_json::Value::from(b.clone()),
            Value::Json(j) => j.clone(),
            other => serde_json::Value::String(other.to_string()),
        }
    }

    /// Zero-pad a numeric day or month to two digits, leaving anything else as is
    pub(crate) fn two_digits(self) -> Self {
        match &self {
            Value::I32(_) | Value::I64(_) => match self.leading_integer() {
                Some(n) => Value::String(format!("{:02}", n)),
                None => self,
            },
            Value::String(s) if s.len() < 2 && s.chars().all(|c| c.is_ascii_digit()) => {
                Value::String(format!("{:0>2}", s))
            }
            _ => self,
        }
    }
}

fn leading_integer(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude: i64 = digits[..end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::I32(i) => write!(f, "{}", i),
            Value::I64(i) => write!(f, "{}", i),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Json(j) => write!(f, "{}", j),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            #[cfg(feature = "uuid-support")]
            Value::Uuid(u) => write!(f, "{}", u),
            #[cfg(feature = "decimal-support")]
            Value::Decimal(d) => write!(f, "{}", d),
        }
    }
}

// Implement From for common types
impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(val: bool) -> Self {
        Value::Bool(val)
    }
}

impl From<i32> for Value {
    fn from(val: i32) -> Self {
        Value::I32(val)
    }
}

impl From<i64> for Value {
    fn from(val: i64) -> Self {
        Value::I64(val)
    }
}

impl From<u32> for Value {
    fn from(val: u32) -> Self {
        Value::I64(i64::from(val))
    }
}

impl From<f32> for Value {
    fn from(val: f32) -> Self {
        Value::F32(val)
    }
}

impl From<f64> for Value {
    fn from(val: f64) -> Self {
        Value::F64(val)
    }
}

impl From<String> for Value {
    fn from(val: String) -> Self {
        Value::String(val)
    }
}

impl From<&String> for Value {
    fn from(val: &String) -> Self {
        Value::String(val.clone())
    }
}

impl From<&str> for Value {
    fn from(val: &str) -> Self {
        Value::String(val.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(val: Vec<u8>) -> Self {
        Value::Bytes(val)
    }
}

impl From<serde_json::Value> for Value {
    fn from(val: serde_json::Value) -> Self {
        Value::Json(val)
    }
}

impl From<NaiveDate> for Value {
    fn from(val: NaiveDate) -> Self {
        Value::Date(val)
    }
}

impl From<NaiveTime> for Value {
    fn from(val: NaiveTime) -> Self {
        Value::Time(val)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(val: NaiveDateTime) -> Self {
        Value::DateTime(val)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(val: DateTime<Utc>) -> Self {
        Value::DateTime(val.naive_utc())
    }
}

#[cfg(feature = "uuid-support")]
impl From<uuid::Uuid> for Value {
    fn from(val: uuid::Uuid) -> Self {
        Value::Uuid(val)
    }
}

#[cfg(feature = "decimal-support")]
impl From<rust_decimal::Decimal> for Value {
    fn from(val: rust_decimal::Decimal) -> Self {
        Value::Decimal(val)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}
