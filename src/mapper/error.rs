//! Errors raised while mapping untyped documents onto records.

use thiserror::Error;

use super::field::FieldKind;

/// A document could not be mapped onto the requested record type.
#[derive(Debug, Error)]
pub enum MapError {
    /// The message text is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Records can only be read from JSON objects.
    #[error("expected a JSON object, found {found}")]
    NotAnObject {
        /// JSON type that was supplied instead.
        found: &'static str,
    },

    /// A field value could not be converted to the declared kind.
    #[error("field `{field}` expects {expected}, found {found}")]
    TypeMismatch {
        /// Canonical name of the field.
        field: &'static str,
        /// Declared kind of the field.
        expected: FieldKind,
        /// JSON type or value that failed to convert.
        found: String,
    },
}
