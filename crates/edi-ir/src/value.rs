//! Typed values produced by data-type decoding

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value decoded from raw EDI text
///
/// Raw text stays the canonical representation throughout parsing; decoding
/// to a `Value` happens per the grammar node's declared data type, either
/// during validation or on caller demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Plain text
    String(String),

    /// Whole number
    Integer(i64),

    /// Decimal number
    Decimal(f64),

    /// Calendar date
    Date(NaiveDate),

    /// Time of day
    Time(NaiveTime),
}

impl Value {
    /// Borrow the text content, when this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric content as an integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric content, widening integers
    #[allow(clippy::cast_precision_loss)]
    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            Value::Decimal(d) => Some(*d),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Time(t) => write!(f, "{t}"),
        }
    }
}
