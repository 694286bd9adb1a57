//! Structured binary codec (`MessagePack`).
//!
//! Same document shape as JSON, except bytes travel as native binary.

use bytes::Bytes;

use super::tree::{self, Node, Tree};
use super::CodecContext;
use crate::error::{DecodeError, EncodeError};
use crate::schema::SchemaId;
use crate::types::Value;

impl Tree for rmpv::Value {
    fn node(&self) -> Node<'_, Self> {
        match self {
            rmpv::Value::Nil => Node::Null,
            rmpv::Value::Boolean(b) => Node::Bool(*b),
            rmpv::Value::Integer(i) => i
                .as_i64()
                .map_or(Node::Invalid("integer out of range"), Node::Int),
            rmpv::Value::F32(f) => Node::Float(f64::from(*f)),
            rmpv::Value::F64(f) => Node::Float(*f),
            rmpv::Value::String(s) => s.as_str().map_or(Node::Invalid("non-UTF-8 string"), Node::Str),
            rmpv::Value::Binary(b) => Node::Bin(b),
            rmpv::Value::Array(items) => Node::Array(items),
            rmpv::Value::Map(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (k, v) in entries {
                    match k.as_str() {
                        Some(k) => out.push((k, v)),
                        None => return Node::Invalid("map with non-string key"),
                    }
                }
                Node::Object(out)
            }
            rmpv::Value::Ext(..) => Node::Invalid("extension value"),
        }
    }

    fn null() -> Self {
        rmpv::Value::Nil
    }

    fn bool(b: bool) -> Self {
        rmpv::Value::Boolean(b)
    }

    fn int(i: i64) -> Self {
        rmpv::Value::from(i)
    }

    fn float(f: f64) -> Option<Self> {
        Some(rmpv::Value::F64(f))
    }

    fn string(s: String) -> Self {
        rmpv::Value::from(s)
    }

    fn binary(b: &[u8]) -> Self {
        rmpv::Value::Binary(b.to_vec())
    }

    fn array(items: Vec<Self>) -> Self {
        rmpv::Value::Array(items)
    }

    fn object(entries: Vec<(String, Self)>) -> Self {
        rmpv::Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (rmpv::Value::from(k), v))
                .collect(),
        )
    }
}

pub(crate) fn decode_binding(
    cx: &CodecContext<'_>,
    raw: &[u8],
    id: SchemaId,
) -> Result<Value, DecodeError> {
    let mut reader = raw;
    let doc = rmpv::decode::read_value(&mut reader)
        .map_err(|e| DecodeError::mismatch(&[], format!("malformed MessagePack: {e}")))?;
    if !reader.is_empty() {
        return Err(DecodeError::mismatch(&[], "trailing bytes after MessagePack value"));
    }
    tree::decode(cx, &doc, id, &mut Vec::new())
}

pub(crate) fn encode_binding(
    cx: &CodecContext<'_>,
    value: &Value,
    id: SchemaId,
) -> Result<Bytes, EncodeError> {
    let doc: rmpv::Value = tree::encode(cx, value, id, &mut Vec::new())?;
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &doc).map_err(|e| EncodeError::new(&[], e.to_string()))?;
    Ok(Bytes::from(buf))
}
