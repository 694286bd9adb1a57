//! Language-neutral type descriptors: the input to the schema resolver.
//!
//! A host adapter translates its native type annotations into these values.
//! Recursive and forward references go through [`TypeDescriptor::Lazy`], which
//! names a descriptor registered with [`SchemaResolver::define`](crate::SchemaResolver::define).

use crate::schema::{Constraints, Primitive};
use crate::types::Value;

/// Declared type of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    Primitive(Primitive),
    Array(Box<TypeDescriptor>),
    Mapping {
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
    /// Value or null. An absent field decodes to `default` when one is given.
    Optional {
        inner: Box<TypeDescriptor>,
        default: Option<Value>,
    },
    Union {
        variants: Vec<TypeDescriptor>,
        tag: Option<String>,
    },
    /// Closed set of literal values.
    Enumeration(Vec<Value>),
    /// Named composite with ordered fields.
    Struct(StructDescriptor),
    /// Reference by name to a descriptor registered with the resolver.
    Lazy(String),
    /// Inner type with additional constraints.
    Constrained {
        inner: Box<TypeDescriptor>,
        constraints: Constraints,
    },
    /// Inner type with a human-readable description.
    Described {
        inner: Box<TypeDescriptor>,
        description: String,
    },
    /// A native construct the host adapter could not map. Always fails to resolve.
    Opaque(String),
}

/// Fields of a named composite.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: TypeDescriptor,
    pub required: bool,
    pub description: Option<String>,
}

impl FieldDescriptor {
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl TypeDescriptor {
    #[must_use]
    pub fn bool() -> Self {
        TypeDescriptor::Primitive(Primitive::Bool)
    }

    #[must_use]
    pub fn int() -> Self {
        TypeDescriptor::Primitive(Primitive::Int)
    }

    #[must_use]
    pub fn float() -> Self {
        TypeDescriptor::Primitive(Primitive::Float)
    }

    #[must_use]
    pub fn string() -> Self {
        TypeDescriptor::Primitive(Primitive::String)
    }

    #[must_use]
    pub fn bytes() -> Self {
        TypeDescriptor::Primitive(Primitive::Bytes)
    }

    /// Exact decimal number; travels as a string in structured formats.
    #[must_use]
    pub fn decimal() -> Self {
        TypeDescriptor::Primitive(Primitive::Decimal)
    }

    #[must_use]
    pub fn datetime() -> Self {
        TypeDescriptor::Primitive(Primitive::DateTime)
    }

    #[must_use]
    pub fn date() -> Self {
        TypeDescriptor::Primitive(Primitive::Date)
    }

    #[must_use]
    pub fn uuid() -> Self {
        TypeDescriptor::Primitive(Primitive::Uuid)
    }

    #[must_use]
    pub fn array(items: TypeDescriptor) -> Self {
        TypeDescriptor::Array(Box::new(items))
    }

    /// Array whose items are distinct; encoders sort it.
    #[must_use]
    pub fn set(items: TypeDescriptor) -> Self {
        TypeDescriptor::array(items).constrained(Constraints::default().unique_items())
    }

    #[must_use]
    pub fn mapping(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        TypeDescriptor::Mapping {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    #[must_use]
    pub fn optional(inner: TypeDescriptor) -> Self {
        TypeDescriptor::Optional {
            inner: Box::new(inner),
            default: None,
        }
    }

    #[must_use]
    pub fn optional_with_default(inner: TypeDescriptor, default: impl Into<Value>) -> Self {
        TypeDescriptor::Optional {
            inner: Box::new(inner),
            default: Some(default.into()),
        }
    }

    #[must_use]
    pub fn union(variants: Vec<TypeDescriptor>) -> Self {
        TypeDescriptor::Union {
            variants,
            tag: None,
        }
    }

    #[must_use]
    pub fn tagged_union(tag: impl Into<String>, variants: Vec<TypeDescriptor>) -> Self {
        TypeDescriptor::Union {
            variants,
            tag: Some(tag.into()),
        }
    }

    pub fn enumeration<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        TypeDescriptor::Enumeration(values.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn lazy(name: impl Into<String>) -> Self {
        TypeDescriptor::Lazy(name.into())
    }

    /// Starts a named struct descriptor.
    #[must_use]
    pub fn structure(name: impl Into<String>) -> StructBuilder {
        StructBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn constrained(self, constraints: Constraints) -> Self {
        TypeDescriptor::Constrained {
            inner: Box::new(self),
            constraints,
        }
    }

    #[must_use]
    pub fn described(self, description: impl Into<String>) -> Self {
        TypeDescriptor::Described {
            inner: Box::new(self),
            description: description.into(),
        }
    }

    /// Cursor-paged result for `item`: `{items, cursor?, remaining?}`.
    ///
    /// `cursor` is an opaque token the caller passes back to fetch the next
    /// page; it is absent on the last page.
    #[must_use]
    pub fn page(name: impl Into<String>, item: TypeDescriptor) -> Self {
        TypeDescriptor::structure(name)
            .field("items", TypeDescriptor::array(item))
            .optional_field("cursor", TypeDescriptor::optional(TypeDescriptor::bytes()))
            .optional_field("remaining", TypeDescriptor::optional(TypeDescriptor::int()))
            .build()
    }
}

/// Builder for [`TypeDescriptor::Struct`].
#[derive(Debug, Clone)]
pub struct StructBuilder {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl StructBuilder {
    /// Adds a required field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            ty,
            required: true,
            description: None,
        });
        self
    }

    /// Adds a field that may be absent.
    #[must_use]
    pub fn optional_field(mut self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            ty,
            required: false,
            description: None,
        });
        self
    }

    #[must_use]
    pub fn build(self) -> TypeDescriptor {
        TypeDescriptor::Struct(StructDescriptor {
            name: self.name,
            fields: self.fields,
        })
    }
}
