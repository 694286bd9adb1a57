//! Operations, resources and request dispatch.
//!
//! 1. **Operations** (`operation`): typed parameters, return schema, declared outcomes, handler
//! 2. **Resources** (`resource`): path tree built up front, then frozen
//! 3. **Dispatch** (`dispatch`): decode, invoke, encode
//! 4. **Middleware** (`middleware`): pre-routing stages and tower layers
//! 5. **Errors** (`error`): the per-request error document and status table

pub mod config;
pub mod dispatch;
pub mod error;
pub mod middleware;
pub mod operation;
pub mod resource;

pub use config::DispatchConfig;
pub use dispatch::{
    DispatchCall, DispatchRequest, Dispatcher, DispatcherBuilder, EncodedResult, RawParams,
};
pub use error::{ErrorKind, StatusTable, StructuredError};
pub use operation::{
    handler_fn, Arguments, ErrorOutcome, Handler, HandlerError, HandlerFn, Operation,
    OperationBuilder, ParamSource, Parameter, UnknownVerb, Verb,
};
pub use resource::{Located, Resource, ResourceTree};
