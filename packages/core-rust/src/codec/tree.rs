//! Schema-directed conversion between [`Value`] and a structured wire tree.
//!
//! JSON and MessagePack share this walk; each format only supplies a [`Tree`]
//! implementation describing how its document model looks.

use std::collections::{BTreeMap, HashMap};

use super::{scalar, text, CodecContext};
use crate::error::{DecodeError, DecodeReason, EncodeError, PathSegment};
use crate::options::AbsentPolicy;
use crate::schema::{Discriminator, Field, Primitive, SchemaId, SchemaKind};
use crate::shape;
use crate::types::{Decimal, Value};

// ---------------------------------------------------------------------------
// Tree abstraction
// ---------------------------------------------------------------------------

/// Borrowed view of one node of a wire document.
pub(crate) enum Node<'a, T> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'a str),
    Bin(&'a [u8]),
    Array(&'a [T]),
    Object(Vec<(&'a str, &'a T)>),
    /// Something the format can carry but a schema never describes.
    Invalid(&'static str),
}

impl<T> Node<'_, T> {
    fn describe(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "bool",
            Node::Int(_) => "int",
            Node::Float(_) => "float",
            Node::Str(_) => "string",
            Node::Bin(_) => "binary",
            Node::Array(_) => "array",
            Node::Object(_) => "object",
            Node::Invalid(what) => what,
        }
    }

    fn class(&self) -> u8 {
        match self {
            Node::Null => shape::NULL,
            Node::Bool(_) => shape::BOOL,
            Node::Int(_) | Node::Float(_) => shape::NUMBER,
            Node::Str(_) | Node::Bin(_) => shape::STRING,
            Node::Array(_) => shape::ARRAY,
            Node::Object(_) => shape::OBJECT,
            Node::Invalid(_) => 0,
        }
    }
}

/// Document model of a structured wire format.
pub(crate) trait Tree: Sized {
    fn node(&self) -> Node<'_, Self>;
    fn null() -> Self;
    fn bool(b: bool) -> Self;
    fn int(i: i64) -> Self;
    /// `None` when the format cannot carry the float (e.g. NaN in JSON).
    fn float(f: f64) -> Option<Self>;
    fn string(s: String) -> Self;
    fn binary(b: &[u8]) -> Self;
    fn array(items: Vec<Self>) -> Self;
    fn object(entries: Vec<(String, Self)>) -> Self;
}

fn nested<R>(
    path: &mut Vec<PathSegment>,
    segment: PathSegment,
    f: impl FnOnce(&mut Vec<PathSegment>) -> R,
) -> R {
    path.push(segment);
    let result = f(path);
    path.pop();
    result
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

pub(crate) fn decode<T: Tree>(
    cx: &CodecContext<'_>,
    tree: &T,
    id: SchemaId,
    path: &mut Vec<PathSegment>,
) -> Result<Value, DecodeError> {
    let schema = cx.schemas.get(id);
    let node = tree.node();
    let value = match &schema.kind {
        SchemaKind::Primitive(p) => decode_primitive(*p, &node, path)?,
        SchemaKind::Array { items } => {
            let Node::Array(elems) = node else {
                return Err(DecodeError::mismatch(
                    path,
                    format!("expecting array; got {}", node.describe()),
                ));
            };
            let mut out = Vec::with_capacity(elems.len());
            for (i, elem) in elems.iter().enumerate() {
                out.push(nested(path, PathSegment::Index(i), |p| {
                    decode(cx, elem, *items, p)
                })?);
            }
            Value::Array(out)
        }
        SchemaKind::Mapping { key, value } => {
            let Node::Object(entries) = node else {
                return Err(DecodeError::mismatch(
                    path,
                    format!("expecting mapping; got {}", node.describe()),
                ));
            };
            let mut out = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                let entry = nested(path, PathSegment::field(k), |p| {
                    let k = text::decode_str(cx, k, *key, p)?;
                    let v = decode(cx, v, *value, p)?;
                    Ok::<_, DecodeError>((k, v))
                })?;
                out.push(entry);
            }
            Value::Map(out)
        }
        SchemaKind::Object { fields } => decode_object(cx, &node, fields, path)?,
        SchemaKind::Union {
            variants,
            discriminator,
        } => match discriminator {
            Discriminator::Untagged => decode_untagged(cx, tree, &node, variants, path)?,
            Discriminator::Tagged { field } => {
                let variant = select_tagged(cx, &node, variants, field, path)?;
                decode(cx, tree, variant, path)?
            }
        },
        SchemaKind::Enumeration { values } => {
            let literal = match node {
                Node::Str(s) => Value::String(s.to_string()),
                Node::Int(i) => Value::Int(i),
                Node::Float(f) => Value::Float(f),
                Node::Bool(b) => Value::Bool(b),
                other => {
                    return Err(DecodeError::mismatch(
                        path,
                        format!("expecting enumeration literal; got {}", other.describe()),
                    ))
                }
            };
            if !values.contains(&literal) {
                return Err(DecodeError::constraint(
                    path,
                    format!(
                        "expecting one of: {}; got {literal}",
                        scalar::literal_list(values)
                    ),
                ));
            }
            literal
        }
        SchemaKind::Optional { inner, .. } => match node {
            Node::Null => Value::Null,
            _ => decode(cx, tree, *inner, path)?,
        },
        SchemaKind::Reference { target, .. } => decode(cx, tree, *target, path)?,
    };
    schema
        .constraints
        .check(&value)
        .map_err(|msg| DecodeError::constraint(path, msg))?;
    Ok(value)
}

/// Decodes through the variant whose shape admits the node, so a nested
/// failure keeps its own path and reason.
fn decode_untagged<T: Tree>(
    cx: &CodecContext<'_>,
    tree: &T,
    node: &Node<'_, T>,
    variants: &[SchemaId],
    path: &mut Vec<PathSegment>,
) -> Result<Value, DecodeError> {
    match shape::candidates(cx.schemas, variants, node.class()).as_slice() {
        [] => {
            let accepted = variants
                .iter()
                .fold(0, |acc, v| acc | shape::shape_classes(cx.schemas, *v));
            Err(DecodeError::mismatch(
                path,
                format!(
                    "expecting {}; got {}",
                    shape::class_names(accepted),
                    node.describe()
                ),
            ))
        }
        [only] => decode(cx, tree, *only, path),
        several => several
            .iter()
            .find_map(|v| decode(cx, tree, *v, &mut path.clone()).ok())
            .ok_or_else(|| DecodeError::constraint(path, "value does not match any union variant")),
    }
}

fn decode_primitive<T>(
    p: Primitive,
    node: &Node<'_, T>,
    path: &[PathSegment],
) -> Result<Value, DecodeError> {
    let mismatch = || {
        DecodeError::mismatch(
            path,
            format!("expecting {}; got {}", p.name(), node.describe()),
        )
    };
    let parsed = |r: Result<Value, String>| r.map_err(|msg| DecodeError::mismatch(path, msg));
    match (p, node) {
        (Primitive::Bool, Node::Bool(b)) => Ok(Value::Bool(*b)),
        (Primitive::Int, Node::Int(i)) => Ok(Value::Int(*i)),
        (Primitive::Int, Node::Float(f)) => {
            scalar::float_to_int(*f).map(Value::Int).ok_or_else(mismatch)
        }
        (Primitive::Float, Node::Float(f)) => Ok(Value::Float(*f)),
        #[allow(clippy::cast_precision_loss)]
        (Primitive::Float, Node::Int(i)) => Ok(Value::Float(*i as f64)),
        (Primitive::String, Node::Str(s)) => Ok(Value::String((*s).to_string())),
        (Primitive::Bytes, Node::Bin(b)) => Ok(Value::Bytes(b.to_vec())),
        (Primitive::Bytes, Node::Str(s)) => parsed(scalar::decode_base64(s).map(Value::Bytes)),
        (Primitive::Decimal, Node::Str(s)) => parsed(
            s.parse::<Decimal>()
                .map(Value::Decimal)
                .map_err(|e| e.to_string()),
        ),
        (Primitive::DateTime, Node::Str(s)) => {
            parsed(scalar::parse_datetime(s).map(Value::DateTime))
        }
        (Primitive::Date, Node::Str(s)) => parsed(scalar::parse_date(s).map(Value::Date)),
        (Primitive::Uuid, Node::Str(s)) => parsed(scalar::parse_uuid(s).map(Value::Uuid)),
        _ => Err(mismatch()),
    }
}

fn decode_object<T: Tree>(
    cx: &CodecContext<'_>,
    node: &Node<'_, T>,
    fields: &[Field],
    path: &mut Vec<PathSegment>,
) -> Result<Value, DecodeError> {
    let Node::Object(entries) = node else {
        return Err(DecodeError::mismatch(
            path,
            format!("expecting object; got {}", node.describe()),
        ));
    };
    let lookup: HashMap<&str, &T> = entries.iter().copied().collect();
    if cx.options.deny_unknown_fields {
        if let Some((unknown, _)) = entries
            .iter()
            .find(|(k, _)| !fields.iter().any(|f| f.name == *k))
        {
            return Err(nested(path, PathSegment::field(*unknown), |p| {
                DecodeError::constraint(p, "unknown field")
            }));
        }
    }
    let mut out = BTreeMap::new();
    for field in fields {
        match lookup.get(field.name.as_str()) {
            Some(tree) => {
                let v = nested(path, PathSegment::field(&field.name), |p| {
                    decode(cx, *tree, field.schema, p)
                })?;
                out.insert(field.name.clone(), v);
            }
            None if field.required => {
                return Err(nested(path, PathSegment::field(&field.name), |p| {
                    DecodeError::new(
                        p,
                        DecodeReason::MissingRequiredField,
                        "missing required field",
                    )
                }));
            }
            None => {
                if let Some(v) = absent_value(cx, field.schema) {
                    out.insert(field.name.clone(), v);
                }
            }
        }
    }
    Ok(Value::Object(out))
}

/// Value recorded for an absent optional field: the declared default, an
/// explicit null under [`AbsentPolicy::Null`], or nothing.
pub(crate) fn absent_value(cx: &CodecContext<'_>, id: SchemaId) -> Option<Value> {
    match &cx.schemas.get(cx.schemas.deref(id)).kind {
        SchemaKind::Optional {
            default: Some(default),
            ..
        } => Some(default.clone()),
        SchemaKind::Optional { default: None, .. } => match cx.options.absent {
            AbsentPolicy::Null => Some(Value::Null),
            AbsentPolicy::Omit => None,
        },
        _ => None,
    }
}

fn select_tagged<T>(
    cx: &CodecContext<'_>,
    node: &Node<'_, T>,
    variants: &[SchemaId],
    field: &str,
    path: &mut Vec<PathSegment>,
) -> Result<SchemaId, DecodeError>
where
    T: Tree,
{
    let Node::Object(entries) = node else {
        return Err(DecodeError::mismatch(
            path,
            format!("expecting object; got {}", node.describe()),
        ));
    };
    nested(path, PathSegment::field(field), |p| {
        let Some((_, tag)) = entries.iter().find(|(k, _)| *k == field) else {
            return Err(DecodeError::new(
                p,
                DecodeReason::MissingRequiredField,
                "missing discriminator",
            ));
        };
        let Node::Str(tag) = tag.node() else {
            return Err(DecodeError::mismatch(p, "discriminator must be a string"));
        };
        variants
            .iter()
            .copied()
            .find(|v| cx.schemas.tag_literal(*v, field) == Some(tag))
            .ok_or_else(|| {
                DecodeError::new(
                    p,
                    DecodeReason::UnknownDiscriminator,
                    format!("unknown discriminator: {tag:?}"),
                )
            })
    })
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

pub(crate) fn encode<T: Tree>(
    cx: &CodecContext<'_>,
    value: &Value,
    id: SchemaId,
    path: &mut Vec<PathSegment>,
) -> Result<T, EncodeError> {
    let schema = cx.schemas.get(id);
    schema
        .constraints
        .check(value)
        .map_err(|msg| EncodeError::new(path, msg))?;
    let mismatch = || {
        EncodeError::new(
            path,
            format!("expecting {}; got {}", schema.kind.name(), value.kind_name()),
        )
    };
    match (&schema.kind, value) {
        (SchemaKind::Primitive(p), _) => encode_primitive(*p, value, path),
        (SchemaKind::Array { items }, Value::Array(elems)) => {
            let mut out = Vec::with_capacity(elems.len());
            for (i, elem) in emission_order(elems, schema.constraints.unique_items)
                .into_iter()
                .enumerate()
            {
                out.push(nested(path, PathSegment::Index(i), |p| {
                    encode(cx, elem, *items, p)
                })?);
            }
            Ok(T::array(out))
        }
        (SchemaKind::Mapping { key, value: value_id }, Value::Map(entries)) => {
            let mut out = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                let key_text = text::encode_str(cx, k, *key, path)?;
                let encoded = nested(path, PathSegment::field(&key_text), |p| {
                    encode(cx, v, *value_id, p)
                })?;
                out.push((key_text, encoded));
            }
            Ok(T::object(out))
        }
        (SchemaKind::Mapping { key, value: value_id }, Value::Object(fields)) => {
            let mut out = Vec::with_capacity(fields.len());
            for (k, v) in fields {
                let key_text =
                    text::encode_str(cx, &Value::String(k.clone()), *key, path)?;
                let encoded =
                    nested(path, PathSegment::field(k), |p| encode(cx, v, *value_id, p))?;
                out.push((key_text, encoded));
            }
            Ok(T::object(out))
        }
        (SchemaKind::Object { fields }, Value::Object(map)) => {
            if let Some(unknown) = map.keys().find(|k| !fields.iter().any(|f| &f.name == *k)) {
                return Err(EncodeError::new(path, format!("unknown field: {unknown}")));
            }
            let mut out = Vec::with_capacity(fields.len());
            for field in fields {
                match map.get(&field.name) {
                    Some(v) => {
                        let encoded = nested(path, PathSegment::field(&field.name), |p| {
                            encode(cx, v, field.schema, p)
                        })?;
                        out.push((field.name.clone(), encoded));
                    }
                    None if field.required => {
                        return Err(nested(path, PathSegment::field(&field.name), |p| {
                            EncodeError::new(p, "missing required field")
                        }));
                    }
                    None => {}
                }
            }
            Ok(T::object(out))
        }
        (
            SchemaKind::Union {
                variants,
                discriminator: Discriminator::Untagged,
            },
            _,
        ) => match shape::candidates(cx.schemas, variants, shape::value_class(value)).as_slice() {
            [] => Err(mismatch()),
            [only] => encode(cx, value, *only, path),
            several => several
                .iter()
                .find_map(|v| encode(cx, value, *v, &mut path.clone()).ok())
                .ok_or_else(|| EncodeError::new(path, "value does not match any union variant")),
        },
        (
            SchemaKind::Union {
                variants,
                discriminator: Discriminator::Tagged { field },
            },
            Value::Object(map),
        ) => {
            let tag = map.get(field).and_then(Value::as_str).ok_or_else(|| {
                EncodeError::new(path, format!("missing discriminator: {field}"))
            })?;
            let variant = variants
                .iter()
                .copied()
                .find(|v| cx.schemas.tag_literal(*v, field) == Some(tag))
                .ok_or_else(|| {
                    EncodeError::new(path, format!("unknown discriminator: {tag:?}"))
                })?;
            encode(cx, value, variant, path)
        }
        (SchemaKind::Enumeration { values }, _) => {
            if !values.contains(value) {
                return Err(EncodeError::new(
                    path,
                    format!("expecting one of: {}", scalar::literal_list(values)),
                ));
            }
            match value {
                Value::String(s) => Ok(T::string(s.clone())),
                Value::Int(i) => Ok(T::int(*i)),
                Value::Bool(b) => Ok(T::bool(*b)),
                Value::Float(f) => T::float(*f).ok_or_else(mismatch),
                _ => Err(mismatch()),
            }
        }
        (SchemaKind::Optional { .. }, Value::Null) => Ok(T::null()),
        (SchemaKind::Optional { inner, .. }, _) => encode(cx, value, *inner, path),
        (SchemaKind::Reference { target, .. }, _) => encode(cx, value, *target, path),
        _ => Err(mismatch()),
    }
}

/// Items in the order they are written: ascending for sets, as given otherwise.
pub(crate) fn emission_order(elems: &[Value], unique: bool) -> Vec<&Value> {
    let mut ordered: Vec<&Value> = elems.iter().collect();
    if unique {
        ordered.sort_by(|a, b| a.total_cmp(b));
    }
    ordered
}

fn encode_primitive<T: Tree>(
    p: Primitive,
    value: &Value,
    path: &[PathSegment],
) -> Result<T, EncodeError> {
    match (p, value) {
        (Primitive::Bool, Value::Bool(b)) => Ok(T::bool(*b)),
        (Primitive::Int, Value::Int(i)) => Ok(T::int(*i)),
        (Primitive::Float, Value::Float(f)) => {
            T::float(*f).ok_or_else(|| EncodeError::new(path, "float is not finite"))
        }
        #[allow(clippy::cast_precision_loss)]
        (Primitive::Float, Value::Int(i)) => {
            T::float(*i as f64).ok_or_else(|| EncodeError::new(path, "float is not finite"))
        }
        (Primitive::String, Value::String(s)) => Ok(T::string(s.clone())),
        (Primitive::Bytes, Value::Bytes(b)) => Ok(T::binary(b)),
        (Primitive::Decimal, Value::Decimal(d)) => Ok(T::string(d.to_string())),
        (Primitive::DateTime, Value::DateTime(dt)) => Ok(T::string(scalar::format_datetime(dt))),
        (Primitive::Date, Value::Date(d)) => Ok(T::string(scalar::format_date(d))),
        (Primitive::Uuid, Value::Uuid(u)) => Ok(T::string(u.to_string())),
        _ => Err(EncodeError::new(
            path,
            format!("expecting {}; got {}", p.name(), value.kind_name()),
        )),
    }
}
