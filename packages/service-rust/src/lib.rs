//! Tessera service layer: operations on a resource tree, served by a
//! dispatcher that decodes, invokes and encodes through the core codecs.

pub mod service;
pub mod telemetry;

pub use service::{
    DispatchCall, DispatchConfig, DispatchRequest, Dispatcher, EncodedResult, ErrorKind,
    Operation, Resource, ResourceTree, StructuredError, Verb,
};
pub use telemetry::{init_tracing, LogFormat};
