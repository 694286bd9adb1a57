//! Pipeline composition: wraps the dispatcher in the tower layers.

use tower::ServiceBuilder;

use super::metrics::MetricsLayer;
use super::timeout::TimeoutLayer;
use crate::service::config::DispatchConfig;
use crate::service::dispatch::{DispatchCall, Dispatcher, EncodedResult};
use crate::service::error::StructuredError;

/// Builds the dispatch pipeline.
///
/// Layer order (outermost to innermost):
/// 1. `TimeoutLayer` -- bounds the whole call and cancels it on expiry
/// 2. `MetricsLayer` -- records timing and outcome around the dispatcher
#[must_use]
pub fn build_dispatch_pipeline(
    dispatcher: Dispatcher,
    config: &DispatchConfig,
) -> impl tower::Service<DispatchCall, Response = EncodedResult, Error = StructuredError> + Clone
{
    ServiceBuilder::new()
        .layer(TimeoutLayer::from_config(config))
        .layer(MetricsLayer)
        .service(dispatcher)
}
