//! Schema Model: wire-format independent description of a value's shape.
//!
//! Schemas live in an arena ([`SchemaSet`]) and refer to each other through
//! [`SchemaId`] handles. A schema graph may only be cyclic through a
//! [`SchemaKind::Reference`] node; every other edge points at a node that does
//! not (transitively) contain its parent.

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::{Serialize, Serializer};

use crate::types::Value;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Opaque handle to a node in a [`SchemaSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SchemaId(u32);

impl SchemaId {
    pub(crate) fn from_index(index: usize) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        SchemaId(index as u32)
    }

    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Constraints
// ---------------------------------------------------------------------------

/// A compiled regular expression that must match at the start of a string.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error if `pattern` is not a valid expression.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Pattern)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    #[must_use]
    pub fn matches(&self, s: &str) -> bool {
        self.0.find(s).is_some_and(|m| m.start() == 0)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Validation metadata carried by every schema node.
///
/// Length bounds apply to strings (in characters), byte strings, arrays and
/// mappings. Numeric bounds apply to ints, floats and decimals and are
/// inclusive. `unique_items` turns an array into a set: duplicates are
/// rejected and encoders emit the items in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Constraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unique_items: bool,
}

impl Constraints {
    #[must_use]
    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    #[must_use]
    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    #[must_use]
    pub fn minimum(mut self, n: f64) -> Self {
        self.minimum = Some(n);
        self
    }

    #[must_use]
    pub fn maximum(mut self, n: f64) -> Self {
        self.maximum = Some(n);
        self
    }

    #[must_use]
    pub fn unique_items(mut self) -> Self {
        self.unique_items = true;
        self
    }

    /// Adds a pattern constraint.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error for an invalid pattern.
    pub fn pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.pattern = Some(Pattern::new(pattern)?);
        Ok(self)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Constraints::default()
    }

    /// Overlays `other` on top of `self`; bounds set in `other` win.
    #[must_use]
    pub fn merged(&self, other: &Constraints) -> Constraints {
        Constraints {
            min_length: other.min_length.or(self.min_length),
            max_length: other.max_length.or(self.max_length),
            minimum: other.minimum.or(self.minimum),
            maximum: other.maximum.or(self.maximum),
            pattern: other.pattern.clone().or_else(|| self.pattern.clone()),
            unique_items: other.unique_items || self.unique_items,
        }
    }

    /// Checks a decoded value against the constraints.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        if let Some(len) = value.length() {
            if let Some(min) = self.min_length {
                if len < min {
                    return Err(format!("minimum length: {min}"));
                }
            }
            if let Some(max) = self.max_length {
                if len > max {
                    return Err(format!("maximum length: {max}"));
                }
            }
        }
        if let Some(n) = value.as_f64() {
            if let Some(min) = self.minimum {
                if n < min {
                    return Err(format!("minimum value: {min}"));
                }
            }
            if let Some(max) = self.maximum {
                if n > max {
                    return Err(format!("maximum value: {max}"));
                }
            }
        }
        if let (Some(pattern), Value::String(s)) = (&self.pattern, value) {
            if !pattern.matches(s) {
                return Err(format!("does not match pattern: '{}'", pattern.as_str()));
            }
        }
        if self.unique_items && value.has_duplicates() {
            return Err("items are not unique".to_string());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Schema nodes
// ---------------------------------------------------------------------------

/// Scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Bool,
    Int,
    Float,
    String,
    Bytes,
    Decimal,
    DateTime,
    Date,
    Uuid,
}

impl Primitive {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Int => "int",
            Primitive::Float => "float",
            Primitive::String => "string",
            Primitive::Bytes => "bytes",
            Primitive::Decimal => "decimal",
            Primitive::DateTime => "datetime",
            Primitive::Date => "date",
            Primitive::Uuid => "uuid",
        }
    }
}

/// A named member of an object schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub schema: SchemaId,
    pub required: bool,
    pub description: Option<String>,
}

/// How a union picks the variant for a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "policy")]
pub enum Discriminator {
    /// Variants are distinguished by shape; they must not overlap.
    Untagged,
    /// Every variant is an object carrying `field` with a distinct literal.
    Tagged { field: String },
}

/// The shape of a schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    Primitive(Primitive),
    Array {
        items: SchemaId,
    },
    Mapping {
        key: SchemaId,
        value: SchemaId,
    },
    Object {
        fields: Vec<Field>,
    },
    Union {
        variants: Vec<SchemaId>,
        discriminator: Discriminator,
    },
    Enumeration {
        values: Vec<Value>,
    },
    Optional {
        inner: SchemaId,
        default: Option<Value>,
    },
    /// Back-reference to a named schema; the only permitted cycle edge.
    Reference {
        name: String,
        target: SchemaId,
    },
}

impl SchemaKind {
    /// Kind name used in diagnostics and the export traversal.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SchemaKind::Primitive(p) => p.name(),
            SchemaKind::Array { .. } => "array",
            SchemaKind::Mapping { .. } => "mapping",
            SchemaKind::Object { .. } => "object",
            SchemaKind::Union { .. } => "union",
            SchemaKind::Enumeration { .. } => "enumeration",
            SchemaKind::Optional { .. } => "optional",
            SchemaKind::Reference { .. } => "reference",
        }
    }
}

/// A schema node: shape plus constraint and documentation metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub kind: SchemaKind,
    pub constraints: Constraints,
    /// Set for schemas resolved from named descriptors.
    pub name: Option<String>,
    pub description: Option<String>,
}

impl Schema {
    #[must_use]
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            constraints: Constraints::default(),
            name: None,
            description: None,
        }
    }
}

// ---------------------------------------------------------------------------
// SchemaSet
// ---------------------------------------------------------------------------

/// Immutable arena of schema nodes produced by the resolver.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    pub(crate) nodes: Vec<Schema>,
    pub(crate) named: BTreeMap<String, SchemaId>,
}

impl SchemaSet {
    /// Returns the node for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued for this set. Operations are checked with
    /// [`SchemaSet::contains`] when a resource tree freezes.
    #[must_use]
    pub fn get(&self, id: SchemaId) -> &Schema {
        &self.nodes[id.index()]
    }

    #[must_use]
    pub fn try_get(&self, id: SchemaId) -> Option<&Schema> {
        self.nodes.get(id.index())
    }

    #[must_use]
    pub fn contains(&self, id: SchemaId) -> bool {
        id.index() < self.nodes.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a named schema.
    #[must_use]
    pub fn named(&self, name: &str) -> Option<SchemaId> {
        self.named.get(name).copied()
    }

    /// Iterates named schemas in name order.
    pub fn names(&self) -> impl Iterator<Item = (&str, SchemaId)> {
        self.named.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// Literal of a tagged-union variant's tag field.
    ///
    /// Returns `None` unless `variant` is an object whose `field` is a
    /// single-literal string enumeration.
    #[must_use]
    pub fn tag_literal(&self, variant: SchemaId, field: &str) -> Option<&str> {
        let SchemaKind::Object { fields } = &self.get(self.deref(variant)).kind else {
            return None;
        };
        let tag = fields.iter().find(|f| f.name == field)?;
        match &self.get(self.deref(tag.schema)).kind {
            SchemaKind::Enumeration { values } if values.len() == 1 => values[0].as_str(),
            _ => None,
        }
    }

    /// Follows reference nodes until a non-reference node is reached.
    #[must_use]
    pub fn deref(&self, mut id: SchemaId) -> SchemaId {
        // References always target a filled, non-reference slot, but bound the
        // walk anyway so a malformed set cannot spin.
        for _ in 0..=self.nodes.len() {
            match &self.get(id).kind {
                SchemaKind::Reference { target, .. } => id = *target,
                _ => return id,
            }
        }
        id
    }
}
