//! Middleware for the dispatch path.
//!
//! - [`chain`]: ordered pre-routing stages run inside the dispatcher
//! - [`timeout`]: per-call timeout enforcement (tower layer)
//! - [`metrics`]: dispatch timing and outcome via `tracing` spans (tower layer)
//! - [`pipeline`]: composes the tower layers around a dispatcher

pub mod chain;
pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use chain::{BodyLimit, DefaultAccept, Middleware, NormalizePath, RequestContext};
pub use metrics::MetricsLayer;
pub use pipeline::build_dispatch_pipeline;
pub use timeout::TimeoutLayer;
