//! Error handling for propsync
//!
//! Provides the error taxonomy shared by every layer:
//! - Wiring errors (bad event types, bad paths, unknown binding kinds at setup time)
//! - Schema errors (event payloads that fail their declared schema)
//!
//! Runtime mismatches (a change with no matching binding, a view that went away
//! during teardown) are not errors; they are logged and skipped by the caller.
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

use crate::event_bus::FieldType;

/// Wiring error type
///
/// Raised while connecting components together. These indicate a programming
/// mistake and are always returned to the caller, never swallowed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WiringError {
    /// Event type identifier is empty or blank
    #[error("Invalid event type: '{event_type}'")]
    InvalidEventType {
        /// The offending identifier.
        event_type: String,
    },

    /// Path string could not be used to address a model slot
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        /// The path as supplied by the caller.
        path: String,
        /// Why the path was rejected.
        reason: String,
    },

    /// Dependent binding kind is not one of the known effects
    #[error("Unknown dependent binding type: {kind}")]
    UnknownDependentBindingType {
        /// The kind string supplied by the caller.
        kind: String,
    },

    /// The binding no longer holds a view (it was destroyed)
    #[error("Binding {binding} has no attached view")]
    ViewDetached {
        /// Display form of the binding identifier.
        binding: String,
    },
}

/// Schema error type
///
/// Raised when an event cannot be built for its declared schema. A failing
/// payload indicates a producer bug, so dispatch refuses it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// Event type is not declared in the registry
    #[error("Unknown event type: {event_type}")]
    UnknownEventType {
        /// The undeclared event type.
        event_type: String,
    },

    /// Event type is declared but has no schema entry
    #[error("No schema registered for event type {event_type}")]
    SchemaMissing {
        /// The event type whose schema is missing.
        event_type: String,
    },

    /// Required field absent from the payload
    #[error("{event_type}: missing required field '{field}' ({expected})")]
    MissingRequiredField {
        /// The event type being created.
        event_type: String,
        /// The missing field.
        field: String,
        /// The declared type of the field.
        expected: FieldType,
    },

    /// Required field present but null
    #[error("{event_type}: required field '{field}' ({expected}) is null")]
    NullRequiredField {
        /// The event type being created.
        event_type: String,
        /// The null field.
        field: String,
        /// The declared type of the field.
        expected: FieldType,
    },

    /// Field value does not match its declared type
    #[error("{event_type}: field '{field}' expected {expected}, got {actual}")]
    TypeMismatch {
        /// The event type being created.
        event_type: String,
        /// The mismatching field.
        field: String,
        /// The declared type of the field.
        expected: FieldType,
        /// The runtime type that was supplied.
        actual: String,
    },
}

/// Main error type for propsync
///
/// A unified error type that can represent any error from the core.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Wiring error
    #[error(transparent)]
    Wiring(#[from] WiringError),

    /// Schema error
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a wiring error
    pub fn is_wiring_error(&self) -> bool {
        matches!(self, Error::Wiring(_))
    }

    /// Check if this is a schema validation error
    pub fn is_schema_error(&self) -> bool {
        matches!(self, Error::Schema(_))
    }

    /// Shorthand for an [`WiringError::InvalidPath`] error
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Wiring(WiringError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        })
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_display() {
        let err = SchemaError::MissingRequiredField {
            event_type: "MODEL_TO_VIEW_PROPERTY_CHANGED".to_string(),
            field: "Value".to_string(),
            expected: FieldType::Any,
        };
        assert_eq!(
            err.to_string(),
            "MODEL_TO_VIEW_PROPERTY_CHANGED: missing required field 'Value' (any)"
        );

        let err = SchemaError::TypeMismatch {
            event_type: "CLIENT_ERROR".to_string(),
            field: "ID".to_string(),
            expected: FieldType::String,
            actual: "number".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "CLIENT_ERROR: field 'ID' expected string, got number"
        );
    }

    #[test]
    fn test_error_classification() {
        let err: Error = WiringError::InvalidEventType {
            event_type: String::new(),
        }
        .into();
        assert!(err.is_wiring_error());
        assert!(!err.is_schema_error());

        let err: Error = SchemaError::UnknownEventType {
            event_type: "NOPE".to_string(),
        }
        .into();
        assert!(err.is_schema_error());

        let err = Error::invalid_path("a..b", "empty segment");
        assert_eq!(err.to_string(), "Invalid path 'a..b': empty segment");
    }
}
