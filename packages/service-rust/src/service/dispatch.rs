//! Dispatcher: turns a raw request into an encoded result or a
//! [`StructuredError`].
//!
//! Steps, in order: middleware stages, path walk, verb match, parameter
//! decoding (all parameters, then fail with every problem found), handler
//! invocation, response negotiation and encoding. Everything the dispatcher
//! reads is immutable, so concurrent dispatches share one instance.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tessera_core::{
    BuildError, CodecContext, CodecRegistry, DecodeError, DecodeReason, PathSegment, SchemaId,
    SchemaKind, SchemaSet, Value, WireFormat,
};
use tokio_util::sync::CancellationToken;
use tower::Service;
use tracing::{debug, warn};

use super::config::DispatchConfig;
use super::error::{ErrorKind, StructuredError};
use super::middleware::{BodyLimit, DefaultAccept, Middleware, NormalizePath, RequestContext};
use super::operation::{Arguments, HandlerError, Operation, ParamSource, Verb};
use super::resource::ResourceTree;

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

/// Raw, undecoded parameter sources of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawParams {
    pub query: BTreeMap<String, String>,
    /// Keys are lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: Option<Bytes>,
}

impl RawParams {
    /// Header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// A request as handed over by a transport adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    pub path: String,
    pub verb: Verb,
    pub params: RawParams,
    /// Wire format of the body.
    pub format: WireFormat,
    /// Acceptable response formats, most preferred first.
    pub accept: Vec<WireFormat>,
}

impl DispatchRequest {
    #[must_use]
    pub fn new(verb: Verb, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            verb,
            params: RawParams::default(),
            format: WireFormat::Json,
            accept: Vec::new(),
        }
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.query.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params
            .headers
            .insert(name.to_ascii_lowercase(), value.into());
        self
    }

    #[must_use]
    pub fn body(mut self, format: WireFormat, body: impl Into<Bytes>) -> Self {
        self.format = format;
        self.params.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn accept(mut self, format: WireFormat) -> Self {
        self.accept.push(format);
        self
    }
}

/// Encoded handler result.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedResult {
    /// `None` for operations without a return schema; the body is then empty.
    pub format: Option<WireFormat>,
    pub body: Bytes,
}

impl EncodedResult {
    #[must_use]
    pub fn content_type(&self) -> Option<&'static str> {
        self.format.map(WireFormat::content_type)
    }
}

/// A request paired with the token that cancels it; the unit of work for
/// the tower pipeline.
#[derive(Debug, Clone)]
pub struct DispatchCall {
    pub request: DispatchRequest,
    pub cancel: CancellationToken,
}

impl From<DispatchRequest> for DispatchCall {
    fn from(request: DispatchRequest) -> Self {
        Self {
            request,
            cancel: CancellationToken::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

struct Inner {
    tree: ResourceTree,
    registry: CodecRegistry,
    middleware: Vec<Arc<dyn Middleware>>,
    config: DispatchConfig,
}

/// Shared, read-only request dispatcher. Cloning is cheap.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

/// Assembles a [`Dispatcher`].
pub struct DispatcherBuilder {
    tree: ResourceTree,
    registry: CodecRegistry,
    middleware: Vec<Arc<dyn Middleware>>,
    config: DispatchConfig,
}

impl DispatcherBuilder {
    /// Replaces the default codec registry.
    #[must_use]
    pub fn registry(mut self, registry: CodecRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Appends a stage after the built-in ones.
    #[must_use]
    pub fn middleware(mut self, stage: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(stage));
        self
    }

    /// Freezes the tree (if not frozen yet) and checks that every path,
    /// query and header parameter has a text codec.
    ///
    /// # Errors
    ///
    /// Returns the freeze error, or [`BuildError::Invalid`] for a parameter
    /// the registry cannot read from text.
    pub fn build(mut self) -> Result<Dispatcher, BuildError> {
        self.tree.freeze()?;
        let schemas = self.tree.schemas();
        for (route, op) in self.tree.routes() {
            for p in op.params().iter().filter(|p| p.source != ParamSource::Body) {
                if !self.registry.supports(schemas, p.schema, WireFormat::Text) {
                    return Err(BuildError::invalid(format!(
                        "parameter {} of {} at {route} has no text form",
                        p.name,
                        op.name()
                    )));
                }
            }
        }

        let mut chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(NormalizePath)];
        if let Some(max) = self.config.max_body_bytes {
            chain.push(Arc::new(BodyLimit::new(max)));
        }
        chain.push(Arc::new(DefaultAccept::new(self.config.default_format)));
        chain.append(&mut self.middleware);

        debug!(
            stages = ?chain.iter().map(|m| m.name()).collect::<Vec<_>>(),
            "dispatcher ready"
        );
        Ok(Dispatcher {
            inner: Arc::new(Inner {
                tree: self.tree,
                registry: self.registry,
                middleware: chain,
                config: self.config,
            }),
        })
    }
}

impl Dispatcher {
    #[must_use]
    pub fn builder(tree: ResourceTree) -> DispatcherBuilder {
        DispatcherBuilder {
            tree,
            registry: CodecRegistry::new(),
            middleware: Vec::new(),
            config: DispatchConfig::default(),
        }
    }

    #[must_use]
    pub fn tree(&self) -> &ResourceTree {
        &self.inner.tree
    }

    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    /// Dispatches one request.
    ///
    /// Cancelling `cancel` before the result is encoded drops the handler
    /// and yields [`ErrorKind::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns a [`StructuredError`] with its status filled from the
    /// configured status table.
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
        cancel: &CancellationToken,
    ) -> Result<EncodedResult, StructuredError> {
        let verb = request.verb;
        let path = request.path.clone();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(StructuredError::cancelled("request cancelled")),
            r = self.run(request) => r,
        };
        result.map_err(|e| {
            if !matches!(e.kind, ErrorKind::Internal) {
                warn!(%verb, %path, kind = %e.kind, message = %e.message, "request failed");
            }
            e.with_status_from(&self.inner.config.statuses)
        })
    }

    async fn run(&self, request: DispatchRequest) -> Result<EncodedResult, StructuredError> {
        let mut cx = RequestContext::new(request);
        for stage in &self.inner.middleware {
            cx = stage.handle(cx).await?;
        }
        let RequestContext {
            request,
            request_id,
        } = cx;

        let located = self
            .inner
            .tree
            .locate(&request.path)
            .ok_or_else(|| StructuredError::not_found(&request.path))?;
        let allowed = located.resource.allowed_verbs();
        if allowed.is_empty() {
            return Err(StructuredError::not_found(&request.path));
        }
        let op = located
            .resource
            .operation(request.verb)
            .cloned()
            .ok_or_else(|| StructuredError::method_not_allowed(request.verb, allowed))?;

        let args = self.decode_arguments(&op, &request, &located.captures)?;
        debug!(%request_id, operation = op.name(), "invoking handler");
        let value = op
            .handler()
            .call(args)
            .await
            .map_err(|e| self.handler_failure(&op, e))?;
        self.encode_result(&op, &value, &request.accept)
    }

    fn codec_cx(&self) -> CodecContext<'_> {
        CodecContext::new(self.inner.tree.schemas(), &self.inner.config.codec)
    }

    fn decode_arguments(
        &self,
        op: &Operation,
        request: &DispatchRequest,
        captures: &BTreeMap<String, String>,
    ) -> Result<Arguments, StructuredError> {
        let schemas = self.inner.tree.schemas();
        let cx = self.codec_cx();
        let mut values = BTreeMap::new();
        let mut errors = Vec::new();

        for param in op.params() {
            let (raw, format) = match param.source {
                ParamSource::Path => (
                    captures.get(&param.name).map(String::as_bytes),
                    WireFormat::Text,
                ),
                ParamSource::Query => (
                    request.params.query.get(&param.name).map(String::as_bytes),
                    WireFormat::Text,
                ),
                ParamSource::Header => (
                    request.params.header(&param.name).map(str::as_bytes),
                    WireFormat::Text,
                ),
                ParamSource::Body => (
                    request
                        .params
                        .body
                        .as_deref()
                        .filter(|body| !body.is_empty()),
                    request.format,
                ),
            };
            let segment = PathSegment::field(&param.name);
            let Some(raw) = raw else {
                if param.required {
                    errors.push(DecodeError::new(
                        &[segment],
                        DecodeReason::MissingRequiredField,
                        "missing required parameter",
                    ));
                } else if let Some(default) = default_of(schemas, param.schema) {
                    values.insert(param.name.clone(), default);
                }
                continue;
            };
            let binding = self
                .inner
                .registry
                .codec_for(schemas, param.schema, format)?;
            match binding.decode(&cx, raw, param.schema) {
                Ok(value) => {
                    values.insert(param.name.clone(), value);
                }
                Err(e) => errors.push(e.prefixed(segment)),
            }
        }

        if errors.is_empty() {
            Ok(Arguments::new(values))
        } else {
            Err(StructuredError::validation(errors))
        }
    }

    fn handler_failure(&self, op: &Operation, err: HandlerError) -> StructuredError {
        match err {
            HandlerError::Declared { kind, detail } => match op.declared(&kind) {
                Some(outcome) => {
                    let message = outcome.description.clone().unwrap_or_else(|| kind.clone());
                    let mut e = StructuredError::new(ErrorKind::Declared(kind), message);
                    e.status = Some(outcome.status);
                    if self.inner.config.expose_declared_details {
                        e.detail = detail;
                    }
                    e
                }
                None => StructuredError::internal(&format!(
                    "operation {} reported undeclared outcome {kind}",
                    op.name()
                )),
            },
            HandlerError::Other(e) => {
                StructuredError::internal(&format!("operation {} failed: {e:#}", op.name()))
            }
        }
    }

    fn encode_result(
        &self,
        op: &Operation,
        value: &Value,
        accept: &[WireFormat],
    ) -> Result<EncodedResult, StructuredError> {
        let Some(schema) = op.returns() else {
            if !value.is_null() {
                return Err(StructuredError::internal(&format!(
                    "operation {} returned {} but declares no return schema",
                    op.name(),
                    value.kind_name()
                )));
            }
            return Ok(EncodedResult {
                format: None,
                body: Bytes::new(),
            });
        };
        let schemas = self.inner.tree.schemas();
        let registry = &self.inner.registry;
        let format = registry.negotiate(schemas, schema, accept, self.inner.config.default_format)?;
        let body = registry
            .codec_for(schemas, schema, format)?
            .encode(&self.codec_cx(), value, schema)
            .map_err(|e| {
                StructuredError::internal(&format!(
                    "operation {} returned a nonconforming value: {e}",
                    op.name()
                ))
            })?;
        Ok(EncodedResult {
            format: Some(format),
            body,
        })
    }
}

/// Declared default of an optional parameter schema.
fn default_of(schemas: &SchemaSet, id: SchemaId) -> Option<Value> {
    match &schemas.get(schemas.deref(id)).kind {
        SchemaKind::Optional { default, .. } => default.clone(),
        _ => None,
    }
}

impl Service<DispatchCall> for Dispatcher {
    type Response = EncodedResult;
    type Error = StructuredError;
    type Future = Pin<Box<dyn Future<Output = Result<EncodedResult, StructuredError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: DispatchCall) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { this.dispatch(call.request, &call.cancel).await })
    }
}
