//! Structural export of a [`SchemaSet`] for external documentation generators.
//!
//! The description is deliberately close to JSON Schema: named objects nested
//! inside another schema are emitted as `{"$ref": name}` and their full shape
//! is available from [`SchemaSet::definitions`]. Optional schemas render as
//! their inner schema with `nullable: true`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::codec::json::to_json;
use crate::codec::{scalar, CodecContext};
use crate::options::CodecOptions;
use crate::schema::{Constraints, Discriminator, SchemaId, SchemaKind, SchemaSet};
use crate::types::Value;

/// Serializable description of one schema node.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Description {
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub constraints: Constraints,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Description>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Box<Description>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Box<Description>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<Description>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub literals: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

/// A named object member, in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub name: String,
    pub schema: Description,
}

impl SchemaSet {
    /// Describes the schema at `id`. Named objects below the root are
    /// rendered as references.
    #[must_use]
    pub fn describe(&self, id: SchemaId) -> Description {
        self.describe_node(id, true)
    }

    /// Full descriptions of every named schema, keyed by name.
    #[must_use]
    pub fn definitions(&self) -> BTreeMap<String, Description> {
        self.names()
            .map(|(name, id)| (name.to_string(), self.describe_node(id, true)))
            .collect()
    }

    fn describe_node(&self, id: SchemaId, root: bool) -> Description {
        let schema = self.get(id);
        if let SchemaKind::Reference { name, .. } = &schema.kind {
            return reference(name);
        }
        if let (Some(name), false) = (&schema.name, root) {
            return reference(name);
        }

        let mut out = Description {
            kind: Some(schema.kind.name()),
            title: schema.name.clone(),
            description: schema.description.clone(),
            constraints: schema.constraints.clone(),
            ..Description::default()
        };
        match &schema.kind {
            SchemaKind::Primitive(_) | SchemaKind::Reference { .. } => {}
            SchemaKind::Array { items } => {
                out.items = Some(Box::new(self.describe_node(*items, false)));
            }
            SchemaKind::Mapping { key, value } => {
                out.keys = Some(Box::new(self.describe_node(*key, false)));
                out.values = Some(Box::new(self.describe_node(*value, false)));
            }
            SchemaKind::Object { fields } => {
                for field in fields {
                    let mut schema = self.describe_node(field.schema, false);
                    if field.description.is_some() {
                        schema.description.clone_from(&field.description);
                    }
                    out.properties.push(Property {
                        name: field.name.clone(),
                        schema,
                    });
                    if field.required {
                        out.required.push(field.name.clone());
                    }
                }
            }
            SchemaKind::Union {
                variants,
                discriminator,
            } => {
                out.variants = variants
                    .iter()
                    .map(|v| self.describe_node(*v, false))
                    .collect();
                if let Discriminator::Tagged { field } = discriminator {
                    out.discriminator = Some(field.clone());
                }
            }
            SchemaKind::Enumeration { values } => {
                out.literals = values.iter().map(literal_json).collect();
            }
            SchemaKind::Optional { inner, default } => {
                let mut inner_desc = self.describe_node(*inner, false);
                inner_desc.nullable = true;
                inner_desc.default = default.as_ref().and_then(|d| {
                    let options = CodecOptions::default();
                    to_json(&CodecContext::new(self, &options), d, id).ok()
                });
                if inner_desc.description.is_none() {
                    inner_desc.description = out.description;
                }
                return inner_desc;
            }
        }
        out
    }
}

fn reference(name: &str) -> Description {
    Description {
        reference: Some(name.to_string()),
        ..Description::default()
    }
}

fn literal_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => (*b).into(),
        Value::Int(i) => (*i).into(),
        Value::Float(f) => (*f).into(),
        Value::String(s) => s.clone().into(),
        Value::Bytes(b) => scalar::encode_base64(b).into(),
        Value::Decimal(d) => d.to_string().into(),
        Value::DateTime(dt) => scalar::format_datetime(dt).into(),
        Value::Date(d) => scalar::format_date(d).into(),
        Value::Uuid(u) => u.to_string().into(),
        other => serde_json::Value::String(other.to_string()),
    }
}
