//! Timeout middleware for dispatch calls.
//!
//! On expiry the call's cancellation token is cancelled and the caller gets
//! `ErrorKind::Cancelled`.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service};

use crate::service::config::DispatchConfig;
use crate::service::dispatch::{DispatchCall, EncodedResult};
use crate::service::error::StructuredError;

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer that bounds each dispatch call. `None` passes calls through.
#[derive(Debug, Clone)]
pub struct TimeoutLayer {
    timeout: Option<Duration>,
    status: u16,
}

impl TimeoutLayer {
    #[must_use]
    pub fn new(timeout: Option<Duration>, status: u16) -> Self {
        Self { timeout, status }
    }

    /// Timeout and cancelled status taken from `config`.
    #[must_use]
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.call_timeout(), config.statuses.cancelled)
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            timeout: self.timeout,
            status: self.status,
        }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    timeout: Option<Duration>,
    status: u16,
}

impl<S> Service<DispatchCall> for TimeoutService<S>
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
        let Some(timeout) = self.timeout else {
            return Box::pin(self.inner.call(call));
        };
        let token = call.cancel.clone();
        let status = self.status;
        let fut = self.inner.call(call);
        Box::pin(async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    token.cancel();
                    let mut err = StructuredError::cancelled(format!(
                        "timed out after {}ms",
                        timeout.as_millis()
                    ));
                    err.status = Some(status);
                    Err(err)
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
