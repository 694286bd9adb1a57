//! Operation model: a callable unit with declared parameters, return schema
//! and error outcomes.
//!
//! Operations are built once with [`OperationBuilder`] and are immutable
//! afterwards. Schemas are referenced by [`SchemaId`]; codecs are looked up at
//! dispatch time, never stored here.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tessera_core::{BuildError, SchemaId, Value};

// ---------------------------------------------------------------------------
// Verb
// ---------------------------------------------------------------------------

/// Request method analogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Put,
    Post,
    Patch,
    Delete,
}

impl Verb {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Put => "PUT",
            Verb::Post => "POST",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a verb name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown verb: {0}")]
pub struct UnknownVerb(pub String);

impl FromStr for Verb {
    type Err = UnknownVerb;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Verb::Get),
            "PUT" => Ok(Verb::Put),
            "POST" => Ok(Verb::Post),
            "PATCH" => Ok(Verb::Patch),
            "DELETE" => Ok(Verb::Delete),
            _ => Err(UnknownVerb(s.to_string())),
        }
    }
}

impl TryFrom<&http::Method> for Verb {
    type Error = UnknownVerb;

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Where a parameter's raw value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    /// A `{name}` segment of the resource path.
    Path,
    Query,
    Header,
    /// The whole request body, in the request's wire format.
    Body,
}

/// A declared operation parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub schema: SchemaId,
    pub source: ParamSource,
    pub required: bool,
    pub description: Option<String>,
}

impl Parameter {
    fn new(name: impl Into<String>, schema: SchemaId, source: ParamSource) -> Self {
        Self {
            name: name.into(),
            schema,
            source,
            required: true,
            description: None,
        }
    }

    /// Captured from the `{name}` path segment. Always required.
    #[must_use]
    pub fn path(name: impl Into<String>, schema: SchemaId) -> Self {
        Self::new(name, schema, ParamSource::Path)
    }

    #[must_use]
    pub fn query(name: impl Into<String>, schema: SchemaId) -> Self {
        Self::new(name, schema, ParamSource::Query)
    }

    /// Header parameters match header names case-insensitively.
    #[must_use]
    pub fn header(name: impl Into<String>, schema: SchemaId) -> Self {
        Self::new(name, schema, ParamSource::Header)
    }

    #[must_use]
    pub fn body(name: impl Into<String>, schema: SchemaId) -> Self {
        Self::new(name, schema, ParamSource::Body)
    }

    /// Allows the parameter to be absent.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A failure the operation declares it may return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorOutcome {
    pub kind: String,
    pub status: u16,
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Decoded parameter values, keyed by parameter name.
///
/// Absent optional parameters without a default are not present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(BTreeMap<String, Value>);

impl Arguments {
    #[must_use]
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn take(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

/// Failure reported by a handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// One of the operation's declared outcomes.
    #[error("{kind}")]
    Declared {
        kind: String,
        detail: Option<String>,
    },
    /// Anything else; reported to the caller as an internal error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    #[must_use]
    pub fn declared(kind: impl Into<String>) -> Self {
        HandlerError::Declared {
            kind: kind.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn declared_with(kind: impl Into<String>, detail: impl Into<String>) -> Self {
        HandlerError::Declared {
            kind: kind.into(),
            detail: Some(detail.into()),
        }
    }
}

/// Business logic behind an operation.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Runs with fully decoded arguments. The returned value is encoded
    /// against the operation's return schema.
    async fn call(&self, args: Arguments) -> Result<Value, HandlerError>;
}

/// [`Handler`] backed by an async closure. Built with [`handler_fn`].
pub struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    async fn call(&self, args: Arguments) -> Result<Value, HandlerError> {
        (self.0)(args).await
    }
}

/// Wraps an async closure as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send,
{
    HandlerFn(f)
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// An immutable, callable unit attached to a resource.
pub struct Operation {
    name: String,
    verb: Verb,
    params: Vec<Parameter>,
    returns: Option<SchemaId>,
    errors: Vec<ErrorOutcome>,
    summary: Option<String>,
    description: Option<String>,
    deprecated: bool,
    handler: Arc<dyn Handler>,
}

impl Operation {
    /// Starts building an operation.
    #[must_use]
    pub fn builder(name: impl Into<String>, verb: Verb) -> OperationBuilder {
        OperationBuilder {
            name: name.into(),
            verb,
            params: Vec::new(),
            returns: None,
            errors: Vec::new(),
            summary: None,
            description: None,
            deprecated: false,
            handler: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn verb(&self) -> Verb {
        self.verb
    }

    #[must_use]
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    #[must_use]
    pub fn returns(&self) -> Option<SchemaId> {
        self.returns
    }

    #[must_use]
    pub fn errors(&self) -> &[ErrorOutcome] {
        &self.errors
    }

    #[must_use]
    pub fn declared(&self, kind: &str) -> Option<&ErrorOutcome> {
        self.errors.iter().find(|e| e.kind == kind)
    }

    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn is_deprecated(&self) -> bool {
        self.deprecated
    }

    pub(crate) fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    /// Every schema the operation refers to.
    pub fn schema_ids(&self) -> impl Iterator<Item = SchemaId> + '_ {
        self.params.iter().map(|p| p.schema).chain(self.returns)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("verb", &self.verb)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Operation`]; `build` is the only way to obtain one.
pub struct OperationBuilder {
    name: String,
    verb: Verb,
    params: Vec<Parameter>,
    returns: Option<SchemaId>,
    errors: Vec<ErrorOutcome>,
    summary: Option<String>,
    description: Option<String>,
    deprecated: bool,
    handler: Option<Arc<dyn Handler>>,
}

impl OperationBuilder {
    #[must_use]
    pub fn param(mut self, param: Parameter) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn returns(mut self, schema: SchemaId) -> Self {
        self.returns = Some(schema);
        self
    }

    /// Declares an outcome the handler may report, with its status.
    #[must_use]
    pub fn error(mut self, kind: impl Into<String>, status: u16) -> Self {
        self.errors.push(ErrorOutcome {
            kind: kind.into(),
            status,
            description: None,
        });
        self
    }

    /// Like [`error`](Self::error), with a caller-facing description.
    #[must_use]
    pub fn error_described(
        mut self,
        kind: impl Into<String>,
        status: u16,
        description: impl Into<String>,
    ) -> Self {
        self.errors.push(ErrorOutcome {
            kind: kind.into(),
            status,
            description: Some(description.into()),
        });
        self
    }

    #[must_use]
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    #[must_use]
    pub fn handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Validates the definition and produces the operation.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Invalid`] if the handler is missing, two
    /// parameters or two error outcomes share a name, or more than one
    /// parameter reads the body.
    pub fn build(self) -> Result<Operation, BuildError> {
        let Some(handler) = self.handler else {
            return Err(BuildError::invalid(format!(
                "operation {} has no handler",
                self.name
            )));
        };
        let mut names = HashSet::new();
        for p in &self.params {
            if !names.insert(p.name.as_str()) {
                return Err(BuildError::invalid(format!(
                    "operation {} declares parameter {} twice",
                    self.name, p.name
                )));
            }
        }
        if self
            .params
            .iter()
            .filter(|p| p.source == ParamSource::Body)
            .count()
            > 1
        {
            return Err(BuildError::invalid(format!(
                "operation {} reads the body more than once",
                self.name
            )));
        }
        let mut kinds = HashSet::new();
        for e in &self.errors {
            if !kinds.insert(e.kind.as_str()) {
                return Err(BuildError::invalid(format!(
                    "operation {} declares outcome {} twice",
                    self.name, e.kind
                )));
            }
        }
        let params = self
            .params
            .into_iter()
            .map(|p| match p.source {
                ParamSource::Path => Parameter {
                    required: true,
                    ..p
                },
                _ => p,
            })
            .collect();
        Ok(Operation {
            name: self.name,
            verb: self.verb,
            params,
            returns: self.returns,
            errors: self.errors,
            summary: self.summary,
            description: self.description,
            deprecated: self.deprecated,
            handler,
        })
    }
}
