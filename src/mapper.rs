//! Mapping between untyped JSON documents and statically declared records.
//!
//! A record type implements [`Mapped`] by listing its fields once as a static
//! table of [`FieldSpec`]s. Decoding walks the table: each field is looked up
//! by its canonical name, then by each alias in order, all case-insensitive.
//! A key holding an explicit `null` counts as absent and the search moves on;
//! a field with no usable key keeps its default. Values are converted
//! according to the declared [`FieldKind`]; any value that cannot be
//! converted fails the whole decode.
//!
//! Encoding mirrors the table, writing each field under its first alias (or
//! its canonical name when it has none).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

pub mod error;
pub mod field;

pub use error::MapError;
pub use field::{FieldKind, FieldSpec, FieldValue};

/// A record shape with a static field table.
pub trait Mapped: Default + Sized + 'static {
    /// The field table, in serialisation order.
    fn fields() -> &'static [FieldSpec<Self>];
}

/// Decode a record from a JSON document.
///
/// # Errors
///
/// Returns [`MapError::NotAnObject`] if `doc` is not an object and
/// [`MapError::TypeMismatch`] if a present field cannot be converted.
pub fn decode<T: Mapped>(doc: &Value) -> Result<T, MapError> {
    let Value::Object(map) = doc else {
        return Err(MapError::NotAnObject {
            found: json_type(doc),
        });
    };

    let mut record = T::default();
    for spec in T::fields() {
        let Some(raw) = resolve(map, spec) else {
            continue;
        };
        let value = convert(spec.kind, raw).ok_or_else(|| MapError::TypeMismatch {
            field: spec.name,
            expected: spec.kind,
            found: describe(raw),
        })?;
        (spec.set)(&mut record, value);
    }
    Ok(record)
}

/// Parse JSON text and decode a record from it.
///
/// # Errors
///
/// Returns [`MapError::Json`] for malformed text, otherwise as [`decode`].
pub fn decode_str<T: Mapped>(text: &str) -> Result<T, MapError> {
    let doc: Value = serde_json::from_str(text)?;
    decode(&doc)
}

/// Encode a record as a JSON object.
#[must_use]
pub fn encode<T: Mapped>(record: &T) -> Value {
    let map: Map<String, Value> = T::fields()
        .iter()
        .map(|spec| (spec.output_key().to_owned(), (spec.get)(record).into_json()))
        .collect();
    Value::Object(map)
}

/// Find the document value for a field, skipping explicit nulls.
fn resolve<'a, T>(map: &'a Map<String, Value>, spec: &FieldSpec<T>) -> Option<&'a Value> {
    std::iter::once(spec.name)
        .chain(spec.aliases.iter().copied())
        .find_map(|key| lookup(map, key).filter(|value| !value.is_null()))
}

/// Case-insensitive key lookup preferring an exact match.
pub(crate) fn lookup<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).or_else(|| {
        map.iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
            .map(|(_, value)| value)
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Bool(_) | Value::Number(_) => format!("{} {value}", json_type(value)),
        Value::String(s) if s.chars().count() <= 32 => format!("string {value}"),
        other => json_type(other).to_owned(),
    }
}

/// Convert `value` to `kind`, or `None` if it does not fit.
fn convert(kind: FieldKind, value: &Value) -> Option<FieldValue> {
    match kind {
        FieldKind::Str => match value {
            Value::String(s) => Some(FieldValue::Str(s.clone())),
            Value::Number(n) => Some(FieldValue::Str(n.to_string())),
            Value::Bool(b) => Some(FieldValue::Str(b.to_string())),
            _ => None,
        },
        FieldKind::Int32 => to_i64(value)
            .and_then(|n| i32::try_from(n).ok())
            .map(FieldValue::Int32),
        FieldKind::Int64 => to_i64(value).map(FieldValue::Int64),
        FieldKind::Bool => match value {
            Value::Bool(b) => Some(FieldValue::Bool(*b)),
            Value::Number(n) => n.as_i64().map(|n| FieldValue::Bool(n != 0)),
            Value::String(s) if s.trim().eq_ignore_ascii_case("true") => {
                Some(FieldValue::Bool(true))
            }
            Value::String(s) if s.trim().eq_ignore_ascii_case("false") => {
                Some(FieldValue::Bool(false))
            }
            _ => None,
        },
        FieldKind::Double => match value {
            Value::Number(n) => n.as_f64().map(FieldValue::Double),
            Value::String(s) => s.trim().parse().ok().map(FieldValue::Double),
            _ => None,
        },
        FieldKind::Timestamp => match value {
            Value::String(s) => parse_timestamp(s).map(FieldValue::Timestamp),
            _ => None,
        },
        FieldKind::List(inner) => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| convert(*inner, item))
                .collect::<Option<Vec<_>>>()
                .map(FieldValue::List),
            _ => None,
        },
        FieldKind::Document => Some(FieldValue::Document(value.clone())),
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "float is integral and range-checked before the cast"
)]
fn to_i64(value: &Value) -> Option<i64> {
    // 2^63 is exactly representable; i64::MAX as f64 rounds up to it.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|x| x.fract() == 0.0 && *x >= -LIMIT && *x < LIMIT)
                .map(|x| x as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Parse RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]` or `YYYY-MM-DD`, as UTC.
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}
