//! Wire shape classes: the coarse node kinds a structured format can carry.
//!
//! The resolver uses them to reject untagged unions whose variants overlap,
//! and the tree codec uses them to pick the one variant a node can belong to.

use crate::schema::{Primitive, SchemaId, SchemaKind, SchemaSet};
use crate::types::Value;

pub(crate) const NULL: u8 = 1;
pub(crate) const BOOL: u8 = 1 << 1;
pub(crate) const NUMBER: u8 = 1 << 2;
pub(crate) const STRING: u8 = 1 << 3;
pub(crate) const ARRAY: u8 = 1 << 4;
pub(crate) const OBJECT: u8 = 1 << 5;

pub(crate) fn class_names(classes: u8) -> String {
    [
        (NULL, "null"),
        (BOOL, "bool"),
        (NUMBER, "number"),
        (STRING, "string"),
        (ARRAY, "array"),
        (OBJECT, "object"),
    ]
    .iter()
    .filter(|(bit, _)| classes & bit != 0)
    .map(|(_, name)| *name)
    .collect::<Vec<_>>()
    .join(", ")
}

/// Class a value of the in-memory model is written as.
pub(crate) fn value_class(value: &Value) -> u8 {
    match value {
        Value::Null => NULL,
        Value::Bool(_) => BOOL,
        Value::Int(_) | Value::Float(_) => NUMBER,
        Value::Array(_) => ARRAY,
        Value::Map(_) | Value::Object(_) => OBJECT,
        Value::String(_)
        | Value::Bytes(_)
        | Value::Decimal(_)
        | Value::DateTime(_)
        | Value::Date(_)
        | Value::Uuid(_) => STRING,
    }
}

/// Classes a schema can take in a structured format.
pub(crate) fn shape_classes(set: &SchemaSet, id: SchemaId) -> u8 {
    match &set.get(set.deref(id)).kind {
        SchemaKind::Primitive(Primitive::Bool) => BOOL,
        SchemaKind::Primitive(Primitive::Int | Primitive::Float) => NUMBER,
        SchemaKind::Primitive(_) => STRING,
        SchemaKind::Array { .. } => ARRAY,
        SchemaKind::Mapping { .. } | SchemaKind::Object { .. } | SchemaKind::Reference { .. } => {
            OBJECT
        }
        SchemaKind::Enumeration { values } => values.iter().fold(0, |acc, v| acc | value_class(v)),
        SchemaKind::Optional { inner, .. } => NULL | shape_classes(set, *inner),
        SchemaKind::Union { variants, .. } => variants
            .iter()
            .fold(0, |acc, v| acc | shape_classes(set, *v)),
    }
}

/// Variants of an untagged union that may hold a value of class `class`.
///
/// Resolved unions are disjoint, so at most one variant matches unless the
/// candidates are string enumerations with disjoint literals.
pub(crate) fn candidates(set: &SchemaSet, variants: &[SchemaId], class: u8) -> Vec<SchemaId> {
    variants
        .iter()
        .copied()
        .filter(|v| shape_classes(set, *v) & class != 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TypeDescriptor;
    use crate::resolver::SchemaResolver;

    #[test]
    fn optional_adds_null_to_inner_classes() {
        let mut r = SchemaResolver::new();
        let id = r
            .resolve(&TypeDescriptor::optional(TypeDescriptor::array(
                TypeDescriptor::int(),
            )))
            .unwrap();
        assert_eq!(shape_classes(r.schemas(), id), NULL | ARRAY);
        assert_eq!(class_names(NULL | ARRAY), "null, array");
    }

    #[test]
    fn candidates_follow_value_class() {
        let mut r = SchemaResolver::new();
        let int = r.resolve(&TypeDescriptor::int()).unwrap();
        let text = r.resolve(&TypeDescriptor::string()).unwrap();
        let set = r.schemas();
        assert_eq!(candidates(set, &[int, text], value_class(&Value::Int(1))), vec![int]);
        assert!(candidates(set, &[int, text], value_class(&Value::Bool(true))).is_empty());
    }
}
