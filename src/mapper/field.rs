//! Field descriptors and the values that flow through them.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// Declared kind of a mapped field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8 text.
    Str,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// Boolean.
    Bool,
    /// 64-bit float.
    Double,
    /// UTC timestamp.
    Timestamp,
    /// Homogeneous list of the inner kind.
    List(&'static FieldKind),
    /// Any JSON value, passed through untouched.
    Document,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str => f.write_str("string"),
            Self::Int32 => f.write_str("int32"),
            Self::Int64 => f.write_str("int64"),
            Self::Bool => f.write_str("bool"),
            Self::Double => f.write_str("double"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::List(inner) => write!(f, "list of {inner}"),
            Self::Document => f.write_str("document"),
        }
    }
}

/// A converted field value.
///
/// `Null` stands for an absent optional value; setters receive it only from
/// callers that build values by hand, never from decoding.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// No value.
    Null,
    /// Text.
    Str(String),
    /// 32-bit integer.
    Int32(i32),
    /// 64-bit integer.
    Int64(i64),
    /// Boolean.
    Bool(bool),
    /// 64-bit float.
    Double(f64),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
    /// Converted list elements.
    List(Vec<FieldValue>),
    /// Raw JSON.
    Document(Value),
}

impl FieldValue {
    /// Take the text out of a `Str`.
    #[must_use]
    pub fn into_string(self) -> Option<String> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The integer held by an `Int32`.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int32(n) => Some(*n),
            _ => None,
        }
    }

    /// The integer held by an `Int64` or a widened `Int32`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(n) => Some(*n),
            Self::Int32(n) => Some(i64::from(*n)),
            _ => None,
        }
    }

    /// The flag held by a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The instant held by a `Timestamp`.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Unwrap a list of strings, dropping elements of any other kind.
    #[must_use]
    pub fn into_strings(self) -> Option<Vec<String>> {
        match self {
            Self::List(items) => Some(items.into_iter().filter_map(Self::into_string).collect()),
            _ => None,
        }
    }

    /// Raw JSON for a `Document`; other non-null kinds are rendered with
    /// [`FieldValue::into_json`].
    #[must_use]
    pub fn into_document(self) -> Option<Value> {
        match self {
            Self::Null => None,
            Self::Document(value) => Some(value),
            other => Some(other.into_json()),
        }
    }

    /// Render the value as JSON.
    ///
    /// Timestamps are written as RFC 3339 with microsecond precision;
    /// non-finite floats become `null`.
    #[must_use]
    pub fn into_json(self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Str(s) => Value::String(s),
            Self::Int32(n) => Value::from(n),
            Self::Int64(n) => Value::from(n),
            Self::Bool(b) => Value::Bool(b),
            Self::Double(x) => serde_json::Number::from_f64(x).map_or(Value::Null, Value::Number),
            Self::Timestamp(ts) => Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
            Self::List(items) => Value::Array(items.into_iter().map(Self::into_json).collect()),
            Self::Document(value) => value,
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self { Self::Str(value) }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self { Self::Int32(value) }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self { Self::Bool(value) }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self { value.map_or(Self::Null, Into::into) }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self { Self::Timestamp(value) }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self { Self::Document(value) }
}

/// Static description of one field of a mapped record.
pub struct FieldSpec<T> {
    /// Canonical field name.
    pub name: &'static str,
    /// Alternative keys in priority order. The first one is the output key.
    pub aliases: &'static [&'static str],
    /// Declared kind used for conversion.
    pub kind: FieldKind,
    /// Read the field for serialisation.
    pub get: fn(&T) -> FieldValue,
    /// Store a converted value.
    pub set: fn(&mut T, FieldValue),
}

impl<T> FieldSpec<T> {
    /// Key used when serialising this field.
    #[must_use]
    pub fn output_key(&self) -> &'static str { self.aliases.first().copied().unwrap_or(self.name) }
}

impl<T> fmt::Debug for FieldSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
