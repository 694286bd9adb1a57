//! Per-request error taxonomy returned by the dispatcher.

use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize, Serializer};
use tessera_core::{DecodeError, UnsupportedFormatError};
use uuid::Uuid;

use super::operation::Verb;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Category of a failed dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// One or more parameters failed to decode.
    Validation,
    /// No resource at the requested path.
    NotFound,
    /// The resource exists but has no operation for the verb.
    MethodNotAllowed,
    /// No codec for the body or the response in the negotiated format.
    UnsupportedFormat,
    /// An outcome the operation declared, by name.
    Declared(String),
    /// The caller cancelled, or the call timed out, before the result was encoded.
    Cancelled,
    /// Anything else. Details are logged, never returned.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => f.write_str("validation"),
            ErrorKind::NotFound => f.write_str("not-found"),
            ErrorKind::MethodNotAllowed => f.write_str("method-not-allowed"),
            ErrorKind::UnsupportedFormat => f.write_str("unsupported-format"),
            ErrorKind::Declared(kind) => f.write_str(kind),
            ErrorKind::Cancelled => f.write_str("cancelled"),
            ErrorKind::Internal => f.write_str("internal"),
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// StatusTable
// ---------------------------------------------------------------------------

/// Status code attached to each built-in error kind. Declared outcomes carry
/// their own status from the operation definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusTable {
    pub validation: u16,
    pub not_found: u16,
    pub method_not_allowed: u16,
    pub unsupported_format: u16,
    pub cancelled: u16,
    pub internal: u16,
}

impl StatusTable {
    /// HTTP status codes.
    #[must_use]
    pub fn http() -> Self {
        Self {
            validation: StatusCode::BAD_REQUEST.as_u16(),
            not_found: StatusCode::NOT_FOUND.as_u16(),
            method_not_allowed: StatusCode::METHOD_NOT_ALLOWED.as_u16(),
            unsupported_format: StatusCode::UNSUPPORTED_MEDIA_TYPE.as_u16(),
            cancelled: StatusCode::REQUEST_TIMEOUT.as_u16(),
            internal: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        }
    }

    /// Status for a built-in kind. Declared kinds fall back to the internal
    /// status; the dispatcher never asks for them.
    #[must_use]
    pub fn status_for(&self, kind: &ErrorKind) -> u16 {
        match kind {
            ErrorKind::Validation => self.validation,
            ErrorKind::NotFound => self.not_found,
            ErrorKind::MethodNotAllowed => self.method_not_allowed,
            ErrorKind::UnsupportedFormat => self.unsupported_format,
            ErrorKind::Cancelled => self.cancelled,
            ErrorKind::Declared(_) | ErrorKind::Internal => self.internal,
        }
    }
}

impl Default for StatusTable {
    fn default() -> Self {
        Self::http()
    }
}

// ---------------------------------------------------------------------------
// StructuredError
// ---------------------------------------------------------------------------

/// Error returned to the caller of a dispatch.
///
/// Serializes to a transport-neutral document; an adapter can write it as a
/// response body as-is.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
#[error("{kind}: {message}")]
pub struct StructuredError {
    pub kind: ErrorKind,
    /// Filled from the [`StatusTable`] before the error leaves the dispatcher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
    /// Every parameter failure, each path starting with the parameter name.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<DecodeError>,
    /// Verbs the resource does support.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<Verb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl StructuredError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            errors: Vec::new(),
            allowed: Vec::new(),
            detail: None,
            correlation_id: None,
        }
    }

    #[must_use]
    pub fn validation(errors: Vec<DecodeError>) -> Self {
        let message = match errors.len() {
            1 => "1 invalid parameter".to_string(),
            n => format!("{n} invalid parameters"),
        };
        Self {
            errors,
            ..Self::new(ErrorKind::Validation, message)
        }
    }

    #[must_use]
    pub fn not_found(path: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("no resource at {path}"))
    }

    #[must_use]
    pub fn method_not_allowed(verb: Verb, allowed: Vec<Verb>) -> Self {
        Self {
            allowed,
            ..Self::new(
                ErrorKind::MethodNotAllowed,
                format!("{verb} is not supported here"),
            )
        }
    }

    #[must_use]
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// Logs `cause` under a fresh correlation id and returns an error that
    /// carries only the id.
    #[must_use]
    pub fn internal(cause: &dyn fmt::Display) -> Self {
        let id = Uuid::new_v4();
        tracing::error!(correlation_id = %id, error = %cause, "internal error");
        Self {
            correlation_id: Some(id),
            ..Self::new(ErrorKind::Internal, "internal error")
        }
    }

    /// Sets the status from `table` unless one is already set.
    #[must_use]
    pub fn with_status_from(mut self, table: &StatusTable) -> Self {
        if self.status.is_none() {
            self.status = Some(table.status_for(&self.kind));
        }
        self
    }
}

impl From<UnsupportedFormatError> for StructuredError {
    fn from(e: UnsupportedFormatError) -> Self {
        Self::new(ErrorKind::UnsupportedFormat, e.to_string())
    }
}
