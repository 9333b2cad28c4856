//! Data types for value nodes
//!
//! Decoding turns unescaped raw text into a typed [`Value`] per the node's
//! declared type; encoding renders a [`Value`] back to raw text. Both honor
//! the active delimiter set's decimal separator rather than a fixed locale.

use chrono::{NaiveDate, NaiveTime};
use edi_ir::Value;
use serde::{Deserialize, Serialize};

use crate::{Delimiters, Error, Result};

/// Decode/encode semantics of a field, component or sub-component
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataType {
    /// Uninterpreted text (the default)
    #[default]
    String,
    /// Whole number
    Integer,
    /// Decimal number using the delimiter set's decimal separator
    Decimal,
    /// Calendar date with a chrono format string (e.g. `%y%m%d`)
    Date { format: String },
    /// Time of day with a chrono format string (e.g. `%H%M`)
    Time { format: String },
}

impl DataType {
    /// Date type with the given chrono format
    pub fn date(format: impl Into<String>) -> Self {
        Self::Date {
            format: format.into(),
        }
    }

    /// Time type with the given chrono format
    pub fn time(format: impl Into<String>) -> Self {
        Self::Time {
            format: format.into(),
        }
    }

    /// Short type name for error messages
    pub fn name(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Decimal => "decimal",
            DataType::Date { .. } => "date",
            DataType::Time { .. } => "time",
        }
    }

    /// Decode unescaped raw text into a typed value
    pub fn decode(&self, raw: &str, delimiters: &Delimiters) -> Result<Value> {
        match self {
            DataType::String => Ok(Value::String(raw.to_string())),
            DataType::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| Error::decode(raw, "integer", e.to_string())),
            DataType::Decimal => {
                let sep = delimiters.decimal_separator;
                if sep != '.' && raw.contains('.') {
                    return Err(Error::decode(
                        raw,
                        "decimal",
                        format!("'.' is not the decimal separator (expected '{sep}')"),
                    ));
                }
                let normalized = raw.trim().replace(sep, ".");
                normalized
                    .parse::<f64>()
                    .map(Value::Decimal)
                    .map_err(|e| Error::decode(raw, "decimal", e.to_string()))
            }
            DataType::Date { format } => NaiveDate::parse_from_str(raw, format)
                .map(Value::Date)
                .map_err(|e| Error::decode(raw, "date", e.to_string())),
            DataType::Time { format } => NaiveTime::parse_from_str(raw, format)
                .map(Value::Time)
                .map_err(|e| Error::decode(raw, "time", e.to_string())),
        }
    }

    /// Render a typed value back to raw (unescaped) text
    pub fn encode(&self, value: &Value, delimiters: &Delimiters) -> Result<String> {
        match (self, value) {
            (DataType::String, v) => Ok(v.to_string()),
            (DataType::Integer, Value::Integer(i)) => Ok(i.to_string()),
            (DataType::Decimal, Value::Integer(i)) => Ok(i.to_string()),
            (DataType::Decimal, Value::Decimal(d)) => Ok(d
                .to_string()
                .replace('.', &delimiters.decimal_separator.to_string())),
            (DataType::Date { format }, Value::Date(d)) => Ok(d.format(format).to_string()),
            (DataType::Time { format }, Value::Time(t)) => Ok(t.format(format).to_string()),
            _ => Err(Error::Encode {
                expected: self.name(),
                found: value_kind(value),
            }),
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Integer(_) => "integer",
        Value::Decimal(_) => "decimal",
        Value::Date(_) => "date",
        Value::Time(_) => "time",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comma_decimal() -> Delimiters {
        Delimiters {
            decimal_separator: ',',
            ..Delimiters::default()
        }
    }

    #[test]
    fn test_decimal_decode_honors_separator() {
        let dot = Delimiters::default();
        let comma = comma_decimal();
        assert_eq!(
            DataType::Decimal.decode("1.1", &dot).unwrap(),
            Value::Decimal(1.1)
        );
        assert_eq!(
            DataType::Decimal.decode("1,1", &comma).unwrap(),
            Value::Decimal(1.1)
        );
    }

    #[test]
    fn test_decimal_decode_rejects_wrong_separator() {
        let err = DataType::Decimal.decode("1.1", &comma_decimal()).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn test_decimal_encode_honors_separator() {
        let value = Value::Decimal(1.1);
        assert_eq!(
            DataType::Decimal.encode(&value, &Delimiters::default()).unwrap(),
            "1.1"
        );
        assert_eq!(
            DataType::Decimal.encode(&value, &comma_decimal()).unwrap(),
            "1,1"
        );
    }

    #[test]
    fn test_integer_decode() {
        let d = Delimiters::default();
        assert_eq!(
            DataType::Integer.decode("42", &d).unwrap(),
            Value::Integer(42)
        );
        let err = DataType::Integer.decode("4x2", &d).unwrap_err();
        assert!(matches!(
            err,
            Error::Decode {
                expected: "integer",
                ..
            }
        ));
    }

    #[test]
    fn test_date_decode_and_encode() {
        let d = Delimiters::default();
        let dt = DataType::date("%y%m%d");
        let decoded = dt.decode("090114", &d).unwrap();
        assert_eq!(
            decoded,
            Value::Date(NaiveDate::from_ymd_opt(2009, 1, 14).unwrap())
        );
        assert_eq!(dt.encode(&decoded, &d).unwrap(), "090114");
    }

    #[test]
    fn test_time_decode() {
        let d = Delimiters::default();
        let t = DataType::time("%H%M");
        assert_eq!(
            t.decode("0800", &d).unwrap(),
            Value::Time(NaiveTime::from_hms_opt(8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_encode_kind_mismatch() {
        let d = Delimiters::default();
        let err = DataType::Integer
            .encode(&Value::String("x".into()), &d)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Encode {
                expected: "integer",
                found: "string"
            }
        ));
    }
}
