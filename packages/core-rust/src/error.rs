//! Error types for schema construction and wire codecs.
//!
//! Build-time failures ([`BuildError`]) abort the build phase. Per-value
//! failures ([`DecodeError`], [`EncodeError`], [`UnsupportedFormatError`]) are
//! returned to the caller and carry enough context to report where in a nested
//! value the problem sits.

use std::fmt;

use serde::Serialize;

use crate::codec::WireFormat;
use crate::descriptor::TypeDescriptor;

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// One step in the path from the root of a value to a nested sub-value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Object field name, mapping key, or parameter name.
    Field(String),
    /// Array index.
    Index(usize),
}

impl PathSegment {
    pub fn field(name: impl Into<String>) -> Self {
        PathSegment::Field(name.into())
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => f.write_str(name),
            PathSegment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// Renders a path as `a.b[2].c`; the empty path renders as `$`.
#[must_use]
pub fn display_path(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "$".to_string();
    }
    let mut out = String::new();
    for segment in path {
        if let PathSegment::Field(_) = segment {
            if !out.is_empty() {
                out.push('.');
            }
        }
        out.push_str(&segment.to_string());
    }
    out
}

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

/// Why a decode was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecodeReason {
    /// The wire value has the wrong shape or could not be parsed.
    TypeMismatch,
    /// The value parsed but violates a length, bound, pattern or enumeration.
    ConstraintViolation,
    /// A required object field or parameter is absent.
    MissingRequiredField,
    /// A tagged union's tag names no known variant.
    UnknownDiscriminator,
}

impl fmt::Display for DecodeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DecodeReason::TypeMismatch => "type-mismatch",
            DecodeReason::ConstraintViolation => "constraint-violation",
            DecodeReason::MissingRequiredField => "missing-required-field",
            DecodeReason::UnknownDiscriminator => "unknown-discriminator",
        })
    }
}

/// Caller-supplied data does not conform to its schema.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
#[error("{reason} at {}: {message}", display_path(.path))]
pub struct DecodeError {
    /// Field/index chain to the offending sub-value.
    pub path: Vec<PathSegment>,
    pub reason: DecodeReason,
    /// Human-readable detail.
    pub message: String,
}

impl DecodeError {
    pub fn new(path: &[PathSegment], reason: DecodeReason, message: impl Into<String>) -> Self {
        Self {
            path: path.to_vec(),
            reason,
            message: message.into(),
        }
    }

    pub(crate) fn mismatch(path: &[PathSegment], message: impl Into<String>) -> Self {
        Self::new(path, DecodeReason::TypeMismatch, message)
    }

    pub(crate) fn constraint(path: &[PathSegment], message: impl Into<String>) -> Self {
        Self::new(path, DecodeReason::ConstraintViolation, message)
    }

    /// Returns the same error with `prefix` prepended to its path.
    #[must_use]
    pub fn prefixed(mut self, prefix: PathSegment) -> Self {
        self.path.insert(0, prefix);
        self
    }
}

/// A value handed to an encoder does not conform to its schema.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot encode value at {}: {message}", display_path(.path))]
pub struct EncodeError {
    pub path: Vec<PathSegment>,
    pub message: String,
}

impl EncodeError {
    pub fn new(path: &[PathSegment], message: impl Into<String>) -> Self {
        Self {
            path: path.to_vec(),
            message: message.into(),
        }
    }
}

/// No codec is registered for a schema kind in the requested wire format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no {format} codec for {kind} schema")]
pub struct UnsupportedFormatError {
    pub kind: &'static str,
    pub format: WireFormat,
}

// ---------------------------------------------------------------------------
// Build errors
// ---------------------------------------------------------------------------

/// Errors raised while building schemas, operations and resource trees.
///
/// All variants are fatal to the build step: a tree whose build produced one
/// of these never freezes.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BuildError {
    #[error("cannot resolve schema for {descriptor:?}: {reason}")]
    SchemaResolution {
        /// The descriptor that has no mapping.
        descriptor: Box<TypeDescriptor>,
        reason: String,
    },
    #[error("ambiguous union {union}: {detail}")]
    AmbiguousUnion { union: String, detail: String },
    #[error("resource tree is frozen; cannot {action}")]
    Frozen { action: String },
    #[error("invalid definition: {reason}")]
    Invalid { reason: String },
    #[error("build failed earlier and the tree cannot be frozen: {cause}")]
    Poisoned { cause: String },
}

impl BuildError {
    pub(crate) fn unresolvable(descriptor: &TypeDescriptor, reason: impl Into<String>) -> Self {
        BuildError::SchemaResolution {
            descriptor: Box::new(descriptor.clone()),
            reason: reason.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        BuildError::Invalid {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_display() {
        let path = vec![
            PathSegment::field("tags"),
            PathSegment::Index(2),
            PathSegment::field("name"),
        ];
        assert_eq!(display_path(&path), "tags[2].name");
        assert_eq!(display_path(&[]), "$");
    }

    #[test]
    fn decode_error_message_includes_path_and_reason() {
        let err = DecodeError::mismatch(&[PathSegment::field("limit")], "expecting int");
        assert_eq!(err.to_string(), "type-mismatch at limit: expecting int");
    }

    #[test]
    fn prefixed_prepends_segment() {
        let err = DecodeError::constraint(&[PathSegment::Index(0)], "too long")
            .prefixed(PathSegment::field("body"));
        assert_eq!(err.path, vec![PathSegment::field("body"), PathSegment::Index(0)]);
    }

    #[test]
    fn reason_serializes_kebab_case() {
        let json = serde_json::to_string(&DecodeReason::MissingRequiredField).unwrap();
        assert_eq!(json, "\"missing-required-field\"");
    }
}
