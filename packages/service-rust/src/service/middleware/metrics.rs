//! Dispatch instrumentation via `tracing` spans.
//!
//! Each call gets an `info_span!("dispatch")` carrying verb, path, duration
//! and outcome; the outcome is `ok` or the error kind.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::dispatch::{DispatchCall, EncodedResult};
use crate::service::error::StructuredError;

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that records dispatch timing and outcome.
#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<DispatchCall> for MetricsService<S>
where
    S: Service<DispatchCall, Response = EncodedResult, Error = StructuredError> + Send,
    S::Future: Send + 'static,
{
    type Response = EncodedResult;
    type Error = StructuredError;
    type Future = Pin<Box<dyn Future<Output = Result<EncodedResult, StructuredError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: DispatchCall) -> Self::Future {
        let verb = call.request.verb;
        let path = call.request.path.clone();

        let span = info_span!(
            "dispatch",
            verb = %verb,
            path = %path,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(call);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;
                let outcome = match &result {
                    Ok(_) => "ok".to_string(),
                    Err(e) => e.kind.to_string(),
                };

                let span = tracing::Span::current();
                span.record("duration_ms", duration_ms);
                span.record("outcome", outcome.as_str());
                tracing::info!(
                    %verb,
                    %path,
                    duration_ms,
                    outcome = outcome.as_str(),
                    "dispatch complete"
                );

                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tessera_core::WireFormat;
    use tower::ServiceExt;

    use super::*;
    use crate::service::dispatch::DispatchRequest;
    use crate::service::operation::Verb;

    /// Succeeds for `/ok`, fails with not-found otherwise.
    struct PathService;

    impl Service<DispatchCall> for PathService {
        type Response = EncodedResult;
        type Error = StructuredError;
        type Future =
            Pin<Box<dyn Future<Output = Result<EncodedResult, StructuredError>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, call: DispatchCall) -> Self::Future {
            Box::pin(async move {
                if call.request.path == "/ok" {
                    Ok(EncodedResult {
                        format: Some(WireFormat::Text),
                        body: Bytes::from_static(b"ok"),
                    })
                } else {
                    Err(StructuredError::not_found(&call.request.path))
                }
            })
        }
    }

    #[tokio::test]
    async fn passes_results_through() {
        let ok = MetricsLayer
            .layer(PathService)
            .oneshot(DispatchCall::from(DispatchRequest::new(Verb::Get, "/ok")))
            .await
            .unwrap();
        assert_eq!(ok.body, Bytes::from_static(b"ok"));

        let err = MetricsLayer
            .layer(PathService)
            .oneshot(DispatchCall::from(DispatchRequest::new(
                Verb::Get,
                "/missing",
            )))
            .await
            .unwrap_err();
        assert_eq!(err.message, "no resource at /missing");
    }
}
