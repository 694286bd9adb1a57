//! Raw byte payload codec.
//!
//! Every schema has a raw form. Bytes pass through untouched, other scalars
//! and enumerations travel as their UTF-8 text form, and everything else
//! (containers, optionals, unions) travels as JSON.

use bytes::Bytes;

use super::{json, text, CodecContext};
use crate::error::{DecodeError, EncodeError};
use crate::schema::{Primitive, SchemaId, SchemaKind};
use crate::types::Value;

pub(crate) fn decode_binding(
    cx: &CodecContext<'_>,
    raw: &[u8],
    id: SchemaId,
) -> Result<Value, DecodeError> {
    let schema = cx.schemas.get(id);
    match &schema.kind {
        SchemaKind::Primitive(Primitive::Bytes) => {
            let value = Value::Bytes(raw.to_vec());
            schema
                .constraints
                .check(&value)
                .map_err(|msg| DecodeError::constraint(&[], msg))?;
            Ok(value)
        }
        SchemaKind::Primitive(_) | SchemaKind::Enumeration { .. } => {
            text::decode_binding(cx, raw, id)
        }
        _ => json::decode_binding(cx, raw, id),
    }
}

pub(crate) fn encode_binding(
    cx: &CodecContext<'_>,
    value: &Value,
    id: SchemaId,
) -> Result<Bytes, EncodeError> {
    let schema = cx.schemas.get(id);
    match (&schema.kind, value) {
        (SchemaKind::Primitive(Primitive::Bytes), Value::Bytes(b)) => {
            schema
                .constraints
                .check(value)
                .map_err(|msg| EncodeError::new(&[], msg))?;
            Ok(Bytes::from(b.clone()))
        }
        (SchemaKind::Primitive(Primitive::Bytes), _) => Err(EncodeError::new(
            &[],
            format!("expecting bytes; got {}", value.kind_name()),
        )),
        (SchemaKind::Primitive(_) | SchemaKind::Enumeration { .. }, _) => {
            text::encode_binding(cx, value, id)
        }
        _ => json::encode_binding(cx, value, id),
    }
}
