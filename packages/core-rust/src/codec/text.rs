//! Plain scalar text codec.
//!
//! Used for path, query and header parameters, which are inherently strings,
//! and for mapping keys inside structured formats. Arrays of scalars are
//! comma-separated with double-quote escaping.
//!
//! For optional schemas null is the empty string. A present value whose text
//! is empty, or is itself one quoted field, is wrapped in double quotes so it
//! stays distinct from null.
//!
//! An untagged union has a text form only when no string could be read by
//! two of its variants: `union[int, string]` has none, since `"7"` would be
//! both.

use std::collections::HashSet;

use bytes::Bytes;

use super::{scalar, tree, CodecContext};
use crate::error::{DecodeError, EncodeError, PathSegment};
use crate::schema::{Discriminator, Primitive, SchemaId, SchemaKind, SchemaSet};
use crate::shape;
use crate::types::{Decimal, Value};

/// Whether a schema has a text representation.
pub(crate) fn text_capable(schemas: &SchemaSet, id: SchemaId) -> bool {
    capable(schemas, id, true, &mut HashSet::new())
}

// ---------------------------------------------------------------------------
// Text classes
// ---------------------------------------------------------------------------

const T_EMPTY: u8 = 1;
const T_BOOL: u8 = 1 << 1;
const T_NUMBER: u8 = 1 << 2;
const T_DATETIME: u8 = 1 << 3;
const T_DATE: u8 = 1 << 4;
const T_UUID: u8 = 1 << 5;
/// Any other fixed word, e.g. an enumeration literal.
const T_WORD: u8 = 1 << 6;
/// Free text; overlaps every class.
const T_ANY: u8 = 1 << 7;

/// Class of a concrete string.
fn classify(s: &str) -> u8 {
    if s.is_empty() {
        T_EMPTY
    } else if s == "true" || s == "false" {
        T_BOOL
    } else if s.parse::<f64>().is_ok() {
        T_NUMBER
    } else if scalar::parse_datetime(s).is_ok() {
        T_DATETIME
    } else if scalar::parse_date(s).is_ok() {
        T_DATE
    } else if s.contains('-') && scalar::parse_uuid(s).is_ok() {
        T_UUID
    } else {
        T_WORD
    }
}

/// Classes of every string a schema's text decoder accepts.
fn text_classes(schemas: &SchemaSet, id: SchemaId) -> u8 {
    match &schemas.get(schemas.deref(id)).kind {
        SchemaKind::Primitive(Primitive::Bool) => T_BOOL,
        SchemaKind::Primitive(Primitive::Int | Primitive::Float | Primitive::Decimal) => T_NUMBER,
        SchemaKind::Primitive(Primitive::DateTime) => T_DATETIME,
        SchemaKind::Primitive(Primitive::Date) => T_DATE,
        SchemaKind::Primitive(Primitive::Uuid) => T_UUID,
        SchemaKind::Enumeration { values } => values.iter().fold(0, |acc, v| {
            acc | scalar::literal_text(v).map_or(T_ANY, |text| classify(&text))
        }),
        SchemaKind::Optional { inner, .. } => T_EMPTY | text_classes(schemas, *inner),
        SchemaKind::Union { variants, .. } => variants
            .iter()
            .fold(0, |acc, v| acc | text_classes(schemas, *v)),
        _ => T_ANY,
    }
}

fn literal_texts(schemas: &SchemaSet, id: SchemaId) -> Option<HashSet<String>> {
    match &schemas.get(schemas.deref(id)).kind {
        SchemaKind::Enumeration { values } => values.iter().map(scalar::literal_text).collect(),
        _ => None,
    }
}

/// Whether no string is accepted by both `a` and `b`.
fn text_disjoint(schemas: &SchemaSet, a: SchemaId, b: SchemaId) -> bool {
    let (ca, cb) = (text_classes(schemas, a), text_classes(schemas, b));
    if (ca | cb) & T_ANY != 0 {
        return false;
    }
    if ca & cb == 0 {
        return true;
    }
    match (literal_texts(schemas, a), literal_texts(schemas, b)) {
        (Some(x), Some(y)) => x.is_disjoint(&y),
        _ => false,
    }
}

fn capable(
    schemas: &SchemaSet,
    id: SchemaId,
    allow_array: bool,
    seen: &mut HashSet<SchemaId>,
) -> bool {
    if !seen.insert(id) {
        return false;
    }
    let result = match &schemas.get(id).kind {
        SchemaKind::Primitive(_) | SchemaKind::Enumeration { .. } => true,
        SchemaKind::Optional { inner, .. } => capable(schemas, *inner, allow_array, seen),
        SchemaKind::Reference { target, .. } => capable(schemas, *target, allow_array, seen),
        SchemaKind::Array { items } => allow_array && capable(schemas, *items, false, seen),
        SchemaKind::Union {
            variants,
            discriminator: Discriminator::Untagged,
        } => {
            variants
                .iter()
                .all(|v| capable(schemas, *v, allow_array, seen))
                && variants.iter().enumerate().all(|(i, a)| {
                    variants[i + 1..]
                        .iter()
                        .all(|b| text_disjoint(schemas, *a, *b))
                })
        }
        SchemaKind::Union { .. } | SchemaKind::Mapping { .. } | SchemaKind::Object { .. } => false,
    };
    seen.remove(&id);
    result
}

pub(crate) fn decode_binding(
    cx: &CodecContext<'_>,
    raw: &[u8],
    id: SchemaId,
) -> Result<Value, DecodeError> {
    let s = std::str::from_utf8(raw)
        .map_err(|_| DecodeError::mismatch(&[], "expecting UTF-8 text"))?;
    decode_str(cx, s, id, &mut Vec::new())
}

pub(crate) fn encode_binding(
    cx: &CodecContext<'_>,
    value: &Value,
    id: SchemaId,
) -> Result<Bytes, EncodeError> {
    encode_str(cx, value, id, &mut Vec::new()).map(Bytes::from)
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

pub(crate) fn decode_str(
    cx: &CodecContext<'_>,
    s: &str,
    id: SchemaId,
    path: &mut Vec<PathSegment>,
) -> Result<Value, DecodeError> {
    let schema = cx.schemas.get(id);
    let value = match &schema.kind {
        SchemaKind::Primitive(p) => decode_primitive(*p, s)
            .map_err(|msg| DecodeError::mismatch(path, msg))?,
        SchemaKind::Enumeration { values } => values
            .iter()
            .find(|v| scalar::literal_text(v).as_deref() == Some(s))
            .cloned()
            .ok_or_else(|| {
                DecodeError::constraint(
                    path,
                    format!(
                        "expecting one of: {}; got {s:?}",
                        scalar::literal_list(values)
                    ),
                )
            })?,
        SchemaKind::Optional { inner, .. } => {
            if s.is_empty() {
                Value::Null
            } else if let Some(present) = single_quoted(s) {
                decode_str(cx, &present, *inner, path)?
            } else {
                decode_str(cx, s, *inner, path)?
            }
        }
        SchemaKind::Reference { target, .. } => decode_str(cx, s, *target, path)?,
        SchemaKind::Array { items } => {
            let fields = split(s).map_err(|msg| DecodeError::mismatch(path, msg))?;
            let mut out = Vec::with_capacity(fields.len());
            for (i, field) in fields.iter().enumerate() {
                path.push(PathSegment::Index(i));
                let item = decode_str(cx, field, *items, path);
                path.pop();
                out.push(item?);
            }
            Value::Array(out)
        }
        SchemaKind::Union {
            variants,
            discriminator: Discriminator::Untagged,
        } => decode_untagged(cx, s, variants, path)?,
        other => {
            return Err(DecodeError::mismatch(
                path,
                format!("{} has no text representation", other.name()),
            ))
        }
    };
    schema
        .constraints
        .check(&value)
        .map_err(|msg| DecodeError::constraint(path, msg))?;
    Ok(value)
}

/// Decodes through the one variant whose text class admits `s`, keeping that
/// variant's error. Input in no variant's canonical class, such as a UUID
/// without hyphens, is tried against every variant in order.
fn decode_untagged(
    cx: &CodecContext<'_>,
    s: &str,
    variants: &[SchemaId],
    path: &mut Vec<PathSegment>,
) -> Result<Value, DecodeError> {
    let class = classify(s) | T_ANY;
    let candidates: Vec<SchemaId> = variants
        .iter()
        .copied()
        .filter(|v| text_classes(cx.schemas, *v) & class != 0)
        .collect();
    if let [only] = candidates.as_slice() {
        return decode_str(cx, s, *only, path);
    }
    let pool = if candidates.is_empty() {
        variants
    } else {
        candidates.as_slice()
    };
    pool.iter()
        .find_map(|v| decode_str(cx, s, *v, &mut path.clone()).ok())
        .ok_or_else(|| {
            if candidates.is_empty() {
                DecodeError::mismatch(path, "value does not match any union variant")
            } else {
                DecodeError::constraint(path, "value does not match any union variant")
            }
        })
}

fn decode_primitive(p: Primitive, s: &str) -> Result<Value, String> {
    match p {
        Primitive::Bool => match s {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err("expecting true or false".to_string()),
        },
        Primitive::Int => s
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format!("expecting int; got {s:?}")),
        Primitive::Float => match s.parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(Value::Float(f)),
            _ => Err(format!("expecting float; got {s:?}")),
        },
        Primitive::String => Ok(Value::String(s.to_string())),
        Primitive::Bytes => scalar::decode_base64(s).map(Value::Bytes),
        Primitive::Decimal => s
            .parse::<Decimal>()
            .map(Value::Decimal)
            .map_err(|e| e.to_string()),
        Primitive::DateTime => scalar::parse_datetime(s).map(Value::DateTime),
        Primitive::Date => scalar::parse_date(s).map(Value::Date),
        Primitive::Uuid => scalar::parse_uuid(s).map(Value::Uuid),
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

pub(crate) fn encode_str(
    cx: &CodecContext<'_>,
    value: &Value,
    id: SchemaId,
    path: &mut Vec<PathSegment>,
) -> Result<String, EncodeError> {
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
        (SchemaKind::Primitive(p), _) => encode_primitive(*p, value).ok_or_else(mismatch),
        (SchemaKind::Enumeration { values }, _) if values.contains(value) => {
            scalar::literal_text(value).ok_or_else(mismatch)
        }
        (SchemaKind::Optional { .. }, Value::Null) => Ok(String::new()),
        (SchemaKind::Optional { inner, .. }, _) => {
            let text = encode_str(cx, value, *inner, path)?;
            if text.is_empty() || single_quoted(&text).is_some() {
                Ok(quote(&text))
            } else {
                Ok(text)
            }
        }
        (SchemaKind::Reference { target, .. }, _) => encode_str(cx, value, *target, path),
        (SchemaKind::Array { items }, Value::Array(elems)) => {
            let mut fields = Vec::with_capacity(elems.len());
            for (i, elem) in tree::emission_order(elems, schema.constraints.unique_items)
                .into_iter()
                .enumerate()
            {
                path.push(PathSegment::Index(i));
                let field = encode_str(cx, elem, *items, path);
                path.pop();
                fields.push(field?);
            }
            Ok(join(&fields))
        }
        (
            SchemaKind::Union {
                variants,
                discriminator: Discriminator::Untagged,
            },
            _,
        ) => match shape::candidates(cx.schemas, variants, shape::value_class(value)).as_slice() {
            [] => Err(mismatch()),
            [only] => encode_str(cx, value, *only, path),
            several => several
                .iter()
                .find_map(|v| encode_str(cx, value, *v, &mut path.clone()).ok())
                .ok_or_else(|| EncodeError::new(path, "value does not match any union variant")),
        },
        _ => Err(mismatch()),
    }
}

fn encode_primitive(p: Primitive, value: &Value) -> Option<String> {
    match (p, value) {
        (Primitive::Bool, Value::Bool(b)) => Some(b.to_string()),
        (Primitive::Int, Value::Int(i)) => Some(i.to_string()),
        (Primitive::Float, Value::Float(f)) if f.is_finite() => Some(f.to_string()),
        (Primitive::Float, Value::Int(i)) => Some(i.to_string()),
        (Primitive::String, Value::String(s)) => Some(s.clone()),
        (Primitive::Bytes, Value::Bytes(b)) => Some(scalar::encode_base64(b)),
        (Primitive::Decimal, Value::Decimal(d)) => Some(d.to_string()),
        (Primitive::DateTime, Value::DateTime(dt)) => Some(scalar::format_datetime(dt)),
        (Primitive::Date, Value::Date(d)) => Some(scalar::format_date(d)),
        (Primitive::Uuid, Value::Uuid(u)) => Some(u.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Comma-separated fields
// ---------------------------------------------------------------------------

fn needs_quotes(field: &str) -> bool {
    field.contains([',', '"', '\n', '\r'])
}

/// Joins fields with commas. A lone empty field is quoted so it stays
/// distinguishable from the empty list.
fn join(fields: &[String]) -> String {
    if let [only] = fields {
        if only.is_empty() {
            return "\"\"".to_string();
        }
    }
    fields
        .iter()
        .map(|f| {
            if needs_quotes(f) {
                quote(f)
            } else {
                f.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Content of `s` when `s` is exactly one quoted field.
fn single_quoted(s: &str) -> Option<String> {
    if !s.starts_with('"') {
        return None;
    }
    match split(s) {
        Ok(mut fields) if fields.len() == 1 => fields.pop(),
        _ => None,
    }
}

fn split(s: &str) -> Result<Vec<String>, String> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    let mut fields = Vec::new();
    let mut chars = s.chars().peekable();
    loop {
        let mut field = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        field.push('"');
                    }
                    Some('"') => break,
                    Some(c) => field.push(c),
                    None => return Err("unterminated quoted field".to_string()),
                }
            }
            match chars.next() {
                None => {
                    fields.push(field);
                    return Ok(fields);
                }
                Some(',') => fields.push(field),
                Some(_) => return Err("unexpected character after quoted field".to_string()),
            }
        } else {
            loop {
                match chars.next() {
                    Some(',') => break,
                    Some(c) => field.push(c),
                    None => {
                        fields.push(field);
                        return Ok(fields);
                    }
                }
            }
            fields.push(field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_handles_quotes() {
        assert_eq!(split("a,b").unwrap(), vec!["a", "b"]);
        assert_eq!(split("\"a,b\",c").unwrap(), vec!["a,b", "c"]);
        assert_eq!(split("\"say \"\"hi\"\"\"").unwrap(), vec!["say \"hi\""]);
        assert_eq!(split("a,").unwrap(), vec!["a", ""]);
        assert!(split("").unwrap().is_empty());
        assert!(split("\"open").is_err());
    }

    #[test]
    fn join_escapes_and_round_trips() {
        let fields = vec!["plain".to_string(), "with,comma".to_string(), "q\"".to_string()];
        let joined = join(&fields);
        assert_eq!(joined, "plain,\"with,comma\",\"q\"\"\"");
        assert_eq!(split(&joined).unwrap(), fields);
    }

    #[test]
    fn lone_empty_field_is_not_the_empty_list() {
        let joined = join(&[String::new()]);
        assert_eq!(split(&joined).unwrap(), vec![String::new()]);
        assert!(split(&join(&[])).unwrap().is_empty());
    }

    #[test]
    fn primitive_text_forms() {
        assert_eq!(decode_primitive(Primitive::Bool, "true").unwrap(), Value::Bool(true));
        assert!(decode_primitive(Primitive::Bool, "yes").is_err());
        assert_eq!(decode_primitive(Primitive::Int, "-42").unwrap(), Value::Int(-42));
        assert!(decode_primitive(Primitive::Int, "abc").is_err());
        assert!(decode_primitive(Primitive::Float, "NaN").is_err());
    }
}
