//! Request-scoped middleware stages run by the dispatcher before routing.
//!
//! A stage receives the request context and either hands back a (possibly
//! rewritten) context or stops the request with a [`StructuredError`].

use async_trait::async_trait;
use tessera_core::WireFormat;
use uuid::Uuid;

use crate::service::dispatch::DispatchRequest;
use crate::service::error::{ErrorKind, StructuredError};
use crate::service::resource::split_path;

/// Request plus the identifier the dispatcher logs it under.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request: DispatchRequest,
    pub request_id: Uuid,
}

impl RequestContext {
    #[must_use]
    pub fn new(request: DispatchRequest) -> Self {
        Self {
            request,
            request_id: Uuid::new_v4(),
        }
    }
}

/// One stage of the pre-routing chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns the error that ends the request.
    async fn handle(&self, cx: RequestContext) -> Result<RequestContext, StructuredError>;
}

// ---------------------------------------------------------------------------
// Built-in stages
// ---------------------------------------------------------------------------

/// Collapses repeated slashes and drops a trailing slash.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizePath;

#[async_trait]
impl Middleware for NormalizePath {
    fn name(&self) -> &'static str {
        "normalize-path"
    }

    async fn handle(&self, mut cx: RequestContext) -> Result<RequestContext, StructuredError> {
        cx.request.path = format!("/{}", split_path(&cx.request.path).join("/"));
        Ok(cx)
    }
}

/// Rejects bodies larger than `max_bytes`.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimit {
    max_bytes: usize,
}

impl BodyLimit {
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl Middleware for BodyLimit {
    fn name(&self) -> &'static str {
        "body-limit"
    }

    async fn handle(&self, cx: RequestContext) -> Result<RequestContext, StructuredError> {
        let len = cx.request.params.body.as_ref().map_or(0, |b| b.len());
        if len > self.max_bytes {
            let mut err = StructuredError::new(
                ErrorKind::Validation,
                format!("body of {len} bytes exceeds the {} byte limit", self.max_bytes),
            );
            err.status = Some(http::StatusCode::PAYLOAD_TOO_LARGE.as_u16());
            return Err(err);
        }
        Ok(cx)
    }
}

/// Supplies an accept list when the caller sent none.
#[derive(Debug, Clone, Copy)]
pub struct DefaultAccept {
    format: WireFormat,
}

impl DefaultAccept {
    #[must_use]
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }
}

#[async_trait]
impl Middleware for DefaultAccept {
    fn name(&self) -> &'static str {
        "default-accept"
    }

    async fn handle(&self, mut cx: RequestContext) -> Result<RequestContext, StructuredError> {
        if cx.request.accept.is_empty() {
            cx.request.accept.push(self.format);
        }
        Ok(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::operation::Verb;

    fn cx(path: &str) -> RequestContext {
        RequestContext::new(DispatchRequest::new(Verb::Get, path))
    }

    #[tokio::test]
    async fn normalize_path_collapses_slashes() {
        let out = NormalizePath.handle(cx("//orders///42/")).await.unwrap();
        assert_eq!(out.request.path, "/orders/42");

        let root = NormalizePath.handle(cx("")).await.unwrap();
        assert_eq!(root.request.path, "/");
    }

    #[tokio::test]
    async fn body_limit_rejects_oversized_body() {
        let mut big = cx("/upload");
        big.request = big.request.body(WireFormat::Bytes, vec![0u8; 17]);
        let err = BodyLimit::new(16).handle(big).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.status, Some(413));

        let mut small = cx("/upload");
        small.request = small.request.body(WireFormat::Bytes, vec![0u8; 16]);
        assert!(BodyLimit::new(16).handle(small).await.is_ok());
    }

    #[tokio::test]
    async fn default_accept_only_fills_empty_list() {
        let out = DefaultAccept::new(WireFormat::MsgPack)
            .handle(cx("/"))
            .await
            .unwrap();
        assert_eq!(out.request.accept, vec![WireFormat::MsgPack]);

        let mut explicit = cx("/");
        explicit.request = explicit.request.accept(WireFormat::Text);
        let out = DefaultAccept::new(WireFormat::MsgPack)
            .handle(explicit)
            .await
            .unwrap();
        assert_eq!(out.request.accept, vec![WireFormat::Text]);
    }
}
