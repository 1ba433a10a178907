//! Host values.
//!
//! `HostValue` is the dynamically typed carrier used on the host side of
//! every call boundary. Values live only for the duration of a single
//! crossing; handlers never retain references to them.

use crate::error::{MarshalError, Result};
use chrono::{DateTime, Utc};

/// A dynamically typed host value.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    /// The absent value. Accepted and produced only by nullable handlers.
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    /// Ordered sequence.
    Seq(Vec<HostValue>),
    /// Mapping in insertion order. Duplicate keys are rejected on write.
    Map(Vec<(HostValue, HostValue)>),
    /// Set in insertion order.
    Set(Vec<HostValue>),
    /// Named record: field name to value.
    Record(Vec<(String, HostValue)>),
    /// Tagged variant: case name plus payload.
    Variant {
        case: String,
        payload: Box<HostValue>,
    },
}

impl HostValue {
    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    /// The carrier's name, used in coercion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::UInt(_) => "uint",
            HostValue::Float(_) => "float",
            HostValue::Text(_) => "text",
            HostValue::Bytes(_) => "bytes",
            HostValue::Timestamp(_) => "timestamp",
            HostValue::Seq(_) => "sequence",
            HostValue::Map(_) => "map",
            HostValue::Set(_) => "set",
            HostValue::Record(_) => "record",
            HostValue::Variant { .. } => "variant",
        }
    }

    fn coercion_error(&self, descriptor: &str) -> MarshalError {
        MarshalError::CoercionError {
            descriptor: descriptor.to_string(),
            found: self.kind(),
        }
    }

    /// Coerce to a signed integer. Floats must be integral; bool maps to 0/1.
    pub fn coerce_i64(&self, descriptor: &str) -> Result<i64> {
        match self {
            HostValue::Int(v) => Ok(*v),
            HostValue::UInt(v) => i64::try_from(*v).map_err(|_| MarshalError::OutOfRange {
                descriptor: descriptor.to_string(),
                value: v.to_string(),
            }),
            HostValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(*f as i64),
            HostValue::Bool(b) => Ok(i64::from(*b)),
            _ => Err(self.coercion_error(descriptor)),
        }
    }

    /// Coerce to an unsigned integer. Negative inputs are out of range.
    pub fn coerce_u64(&self, descriptor: &str) -> Result<u64> {
        match self {
            HostValue::UInt(v) => Ok(*v),
            HostValue::Int(v) => u64::try_from(*v).map_err(|_| MarshalError::OutOfRange {
                descriptor: descriptor.to_string(),
                value: v.to_string(),
            }),
            HostValue::Float(f) if f.fract() == 0.0 && f.is_finite() && *f >= 0.0 => {
                Ok(*f as u64)
            }
            HostValue::Bool(b) => Ok(u64::from(*b)),
            _ => Err(self.coercion_error(descriptor)),
        }
    }

    pub fn coerce_f64(&self, descriptor: &str) -> Result<f64> {
        match self {
            HostValue::Float(v) => Ok(*v),
            HostValue::Int(v) => Ok(*v as f64),
            HostValue::UInt(v) => Ok(*v as f64),
            HostValue::Bool(b) => Ok(f64::from(u8::from(*b))),
            _ => Err(self.coercion_error(descriptor)),
        }
    }

    pub fn coerce_bool(&self, descriptor: &str) -> Result<bool> {
        match self {
            HostValue::Bool(b) => Ok(*b),
            HostValue::Int(v) => Ok(*v != 0),
            HostValue::UInt(v) => Ok(*v != 0),
            _ => Err(self.coercion_error(descriptor)),
        }
    }

    /// Coerce to text. Numeric and boolean carriers convert via their
    /// canonical textual form; other shapes fail.
    pub fn coerce_text(&self, descriptor: &str) -> Result<String> {
        match self {
            HostValue::Text(s) => Ok(s.clone()),
            HostValue::Int(v) => Ok(v.to_string()),
            HostValue::UInt(v) => Ok(v.to_string()),
            HostValue::Float(v) => Ok(v.to_string()),
            HostValue::Bool(b) => Ok(b.to_string()),
            _ => Err(self.coercion_error(descriptor)),
        }
    }

    pub fn coerce_bytes(&self, descriptor: &str) -> Result<Vec<u8>> {
        match self {
            HostValue::Bytes(b) => Ok(b.clone()),
            HostValue::Text(s) => Ok(s.as_bytes().to_vec()),
            _ => Err(self.coercion_error(descriptor)),
        }
    }

    /// Coerce to a timestamp. Text parses as RFC 3339; integers are epoch
    /// milliseconds.
    pub fn coerce_timestamp(&self, descriptor: &str) -> Result<DateTime<Utc>> {
        match self {
            HostValue::Timestamp(t) => Ok(*t),
            HostValue::Text(s) => DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| self.coercion_error(descriptor)),
            HostValue::Int(ms) => {
                DateTime::from_timestamp_millis(*ms).ok_or_else(|| MarshalError::OutOfRange {
                    descriptor: descriptor.to_string(),
                    value: ms.to_string(),
                })
            }
            _ => Err(self.coercion_error(descriptor)),
        }
    }
}

impl std::fmt::Display for HostValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostValue::Null => write!(f, "null"),
            HostValue::Bool(b) => write!(f, "{b}"),
            HostValue::Int(v) => write!(f, "{v}"),
            HostValue::UInt(v) => write!(f, "{v}"),
            HostValue::Float(v) => write!(f, "{v}"),
            HostValue::Text(s) => write!(f, "{s:?}"),
            HostValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            HostValue::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            HostValue::Seq(items) => write!(f, "<sequence of {}>", items.len()),
            HostValue::Map(entries) => write!(f, "<map of {}>", entries.len()),
            HostValue::Set(items) => write!(f, "<set of {}>", items.len()),
            HostValue::Record(fields) => write!(f, "<record of {} fields>", fields.len()),
            HostValue::Variant { case, .. } => write!(f, "<variant {case}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_coercions() {
        assert_eq!(HostValue::Int(42).coerce_i64("i64").unwrap(), 42);
        assert_eq!(HostValue::UInt(7).coerce_i64("i64").unwrap(), 7);
        assert_eq!(HostValue::Float(3.0).coerce_i64("i64").unwrap(), 3);
        assert_eq!(HostValue::Bool(true).coerce_i64("i64").unwrap(), 1);

        let err = HostValue::Float(3.5).coerce_i64("i64").unwrap_err();
        assert!(matches!(err, MarshalError::CoercionError { .. }));

        let err = HostValue::Int(-1).coerce_u64("u64").unwrap_err();
        assert!(matches!(err, MarshalError::OutOfRange { .. }));
    }

    #[test]
    fn text_coercion_uses_canonical_forms() {
        assert_eq!(
            HostValue::Int(-12).coerce_text("string").unwrap(),
            "-12".to_string()
        );
        assert_eq!(
            HostValue::Bool(false).coerce_text("string").unwrap(),
            "false".to_string()
        );
        let err = HostValue::Seq(vec![]).coerce_text("string").unwrap_err();
        assert!(matches!(err, MarshalError::CoercionError { .. }));
    }

    #[test]
    fn timestamp_coercion() {
        let t = HostValue::Text("2024-01-02T03:04:05Z".to_string())
            .coerce_timestamp("time.Time")
            .unwrap();
        assert_eq!(t.timestamp(), 1704164645);

        let t = HostValue::Int(1_000).coerce_timestamp("Date").unwrap();
        assert_eq!(t.timestamp(), 1);
    }
}
