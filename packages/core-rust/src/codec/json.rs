//! Structured text codec (JSON).
//!
//! Bytes travel as base64 strings; timestamps, dates and UUIDs as strings;
//! mapping keys use their text form.

use bytes::Bytes;
use serde_json::{Map, Number};

use super::tree::{self, Node, Tree};
use super::{scalar, CodecContext};
use crate::error::{DecodeError, EncodeError};
use crate::schema::SchemaId;
use crate::types::Value;

impl Tree for serde_json::Value {
    fn node(&self) -> Node<'_, Self> {
        match self {
            serde_json::Value::Null => Node::Null,
            serde_json::Value::Bool(b) => Node::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Node::Int(i)
                } else if n.is_u64() {
                    Node::Invalid("integer out of range")
                } else {
                    n.as_f64().map_or(Node::Invalid("number"), Node::Float)
                }
            }
            serde_json::Value::String(s) => Node::Str(s),
            serde_json::Value::Array(items) => Node::Array(items),
            serde_json::Value::Object(map) => {
                Node::Object(map.iter().map(|(k, v)| (k.as_str(), v)).collect())
            }
        }
    }

    fn null() -> Self {
        serde_json::Value::Null
    }

    fn bool(b: bool) -> Self {
        serde_json::Value::Bool(b)
    }

    fn int(i: i64) -> Self {
        serde_json::Value::Number(i.into())
    }

    fn float(f: f64) -> Option<Self> {
        Number::from_f64(f).map(serde_json::Value::Number)
    }

    fn string(s: String) -> Self {
        serde_json::Value::String(s)
    }

    fn binary(b: &[u8]) -> Self {
        serde_json::Value::String(scalar::encode_base64(b))
    }

    fn array(items: Vec<Self>) -> Self {
        serde_json::Value::Array(items)
    }

    fn object(entries: Vec<(String, Self)>) -> Self {
        serde_json::Value::Object(entries.into_iter().collect::<Map<_, _>>())
    }
}

/// Decodes an already-parsed JSON document.
///
/// # Errors
///
/// Returns a [`DecodeError`] if `doc` does not conform to the schema.
pub fn from_json(
    cx: &CodecContext<'_>,
    doc: &serde_json::Value,
    id: SchemaId,
) -> Result<Value, DecodeError> {
    tree::decode(cx, doc, id, &mut Vec::new())
}

/// Encodes a value into a JSON document.
///
/// # Errors
///
/// Returns an [`EncodeError`] if `value` does not conform to the schema.
pub fn to_json(
    cx: &CodecContext<'_>,
    value: &Value,
    id: SchemaId,
) -> Result<serde_json::Value, EncodeError> {
    tree::encode(cx, value, id, &mut Vec::new())
}

pub(crate) fn decode_binding(
    cx: &CodecContext<'_>,
    raw: &[u8],
    id: SchemaId,
) -> Result<Value, DecodeError> {
    let doc: serde_json::Value = serde_json::from_slice(raw)
        .map_err(|e| DecodeError::mismatch(&[], format!("malformed JSON: {e}")))?;
    from_json(cx, &doc, id)
}

pub(crate) fn encode_binding(
    cx: &CodecContext<'_>,
    value: &Value,
    id: SchemaId,
) -> Result<Bytes, EncodeError> {
    let doc = to_json(cx, value, id)?;
    serde_json::to_vec(&doc)
        .map(Bytes::from)
        .map_err(|e| EncodeError::new(&[], e.to_string()))
}
