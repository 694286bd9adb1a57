//! Tessera Core: value model, type descriptors, schemas, resolver and codecs.

pub mod codec;
pub mod descriptor;
pub mod error;
pub mod export;
pub mod options;
pub mod patch;
pub mod resolver;
pub mod schema;
mod shape;
pub mod types;

pub use codec::{CodecBinding, CodecContext, CodecRegistry, WireFormat};
pub use descriptor::{FieldDescriptor, StructBuilder, StructDescriptor, TypeDescriptor};
pub use error::{
    display_path, BuildError, DecodeError, DecodeReason, EncodeError, PathSegment,
    UnsupportedFormatError,
};
pub use export::{Description, Property};
pub use options::{AbsentPolicy, CodecOptions};
pub use patch::merge_patch;
pub use resolver::SchemaResolver;
pub use schema::{
    Constraints, Discriminator, Field, Pattern, Primitive, Schema, SchemaId, SchemaKind, SchemaSet,
};
pub use types::{Decimal, ParseDecimalError, Value};
