//! Resource tree: hierarchical namespace of operations addressed by path
//! segments.
//!
//! A segment is either a literal (`orders`) or a capture (`{id}`) that binds
//! the raw segment to the path parameter `id`. The tree is mutable until
//! [`ResourceTree::freeze`]; after that every attach fails and the dispatcher
//! may share it freely.

use std::collections::{BTreeMap, HashSet};
use std::convert::Infallible;
use std::sync::Arc;

use tessera_core::{BuildError, SchemaSet};
use tracing::{debug, info};

use super::operation::{Operation, ParamSource, Verb};

// ---------------------------------------------------------------------------
// Segments
// ---------------------------------------------------------------------------

enum Segment<'a> {
    Literal(&'a str),
    Capture(&'a str),
}

fn parse_segment(raw: &str) -> Result<Segment<'_>, BuildError> {
    if let Some(name) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
        if name.is_empty() || name.contains(['{', '}']) {
            return Err(BuildError::invalid(format!("malformed path capture: {raw}")));
        }
        return Ok(Segment::Capture(name));
    }
    if raw.contains(['{', '}']) {
        return Err(BuildError::invalid(format!("malformed path segment: {raw}")));
    }
    Ok(Segment::Literal(raw))
}

/// Splits a path into its non-empty segments.
pub(crate) fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// A node of the tree: operations keyed by verb plus child resources.
#[derive(Debug, Default)]
pub struct Resource {
    description: Option<String>,
    operations: BTreeMap<Verb, Arc<Operation>>,
    children: BTreeMap<String, Resource>,
    capture: Option<(String, Box<Resource>)>,
}

impl Resource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds an operation.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Invalid`] if an operation with the same verb or
    /// name is already present.
    pub fn add_operation(&mut self, op: Operation) -> Result<(), BuildError> {
        if let Some(existing) = self.operations.get(&op.verb()) {
            return Err(BuildError::invalid(format!(
                "{} already handled by operation {}",
                op.verb(),
                existing.name()
            )));
        }
        if self.operations.values().any(|o| o.name() == op.name()) {
            return Err(BuildError::invalid(format!(
                "operation {} already attached",
                op.name()
            )));
        }
        self.operations.insert(op.verb(), Arc::new(op));
        Ok(())
    }

    /// Builder form of [`add_operation`](Self::add_operation).
    ///
    /// # Errors
    ///
    /// See [`add_operation`](Self::add_operation).
    pub fn with_operation(mut self, op: Operation) -> Result<Self, BuildError> {
        self.add_operation(op)?;
        Ok(self)
    }

    /// Mounts `child` under a single segment (`name` or `{param}`).
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Invalid`] if the segment is malformed or already
    /// taken.
    pub fn add_child(&mut self, segment: &str, child: Resource) -> Result<(), BuildError> {
        match parse_segment(segment)? {
            Segment::Literal(name) => {
                if self.children.contains_key(name) {
                    return Err(BuildError::invalid(format!(
                        "resource {name} already attached"
                    )));
                }
                self.children.insert(name.to_string(), child);
            }
            Segment::Capture(name) => {
                if let Some((existing, _)) = &self.capture {
                    return Err(BuildError::invalid(format!(
                        "capture {{{name}}} conflicts with {{{existing}}}"
                    )));
                }
                self.capture = Some((name.to_string(), Box::new(child)));
            }
        }
        Ok(())
    }

    /// Builder form of [`add_child`](Self::add_child).
    ///
    /// # Errors
    ///
    /// See [`add_child`](Self::add_child).
    pub fn with_child(mut self, segment: &str, child: Resource) -> Result<Self, BuildError> {
        self.add_child(segment, child)?;
        Ok(self)
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn operation(&self, verb: Verb) -> Option<&Arc<Operation>> {
        self.operations.get(&verb)
    }

    pub fn operations(&self) -> impl Iterator<Item = &Arc<Operation>> {
        self.operations.values()
    }

    /// Verbs with an operation, in a stable order.
    #[must_use]
    pub fn allowed_verbs(&self) -> Vec<Verb> {
        self.operations.keys().copied().collect()
    }

    /// Finds or creates the child for `segment`.
    fn child_mut(&mut self, segment: &str) -> Result<&mut Resource, BuildError> {
        match parse_segment(segment)? {
            Segment::Literal(name) => Ok(self.children.entry(name.to_string()).or_default()),
            Segment::Capture(name) => {
                let (existing, child) = self
                    .capture
                    .get_or_insert_with(|| (name.to_string(), Box::default()));
                if existing.as_str() != name {
                    return Err(BuildError::invalid(format!(
                        "capture {{{name}}} conflicts with {{{existing}}}"
                    )));
                }
                Ok(child.as_mut())
            }
        }
    }

    /// Resolves raw path segments, literal children first, recording
    /// capture bindings.
    fn locate<'a>(
        &'a self,
        segments: &[&str],
        captures: &mut Vec<(String, String)>,
    ) -> Option<&'a Resource> {
        let Some((head, rest)) = segments.split_first() else {
            return Some(self);
        };
        if let Some(found) = self
            .children
            .get(*head)
            .and_then(|child| child.locate(rest, captures))
        {
            return Some(found);
        }
        let (name, child) = self.capture.as_ref()?;
        captures.push((name.clone(), (*head).to_string()));
        let found = child.locate(rest, captures);
        if found.is_none() {
            captures.pop();
        }
        found
    }

    /// Visits every resource with its route and the captures along it,
    /// stopping at the first error.
    fn walk<'a, E>(
        &'a self,
        route: &mut Vec<String>,
        captured: &mut Vec<String>,
        visit: &mut dyn FnMut(&str, &[String], &'a Resource) -> Result<(), E>,
    ) -> Result<(), E> {
        visit(&format!("/{}", route.join("/")), captured, self)?;
        for (name, child) in &self.children {
            route.push(name.clone());
            child.walk(route, captured, visit)?;
            route.pop();
        }
        if let Some((name, child)) = &self.capture {
            route.push(format!("{{{name}}}"));
            captured.push(name.clone());
            child.walk(route, captured, visit)?;
            captured.pop();
            route.pop();
        }
        Ok(())
    }

    /// [`Resource::walk`] with a visitor that cannot fail.
    fn for_each<'a>(&'a self, visit: &mut dyn FnMut(&str, &'a Resource)) {
        let walked = self.walk(&mut Vec::new(), &mut Vec::new(), &mut |route, _, resource| {
            visit(route, resource);
            Ok::<(), Infallible>(())
        });
        match walked {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }
}

// ---------------------------------------------------------------------------
// ResourceTree
// ---------------------------------------------------------------------------

/// Root of the resource hierarchy plus the schemas its operations use.
#[derive(Debug)]
pub struct ResourceTree {
    schemas: Arc<SchemaSet>,
    root: Resource,
    frozen: bool,
    poisoned: Option<String>,
}

/// Result of resolving a request path.
#[derive(Debug)]
pub struct Located<'a> {
    pub resource: &'a Resource,
    /// Capture name to raw segment.
    pub captures: BTreeMap<String, String>,
}

impl ResourceTree {
    #[must_use]
    pub fn new(schemas: Arc<SchemaSet>) -> Self {
        Self {
            schemas,
            root: Resource::new(),
            frozen: false,
            poisoned: None,
        }
    }

    #[must_use]
    pub fn schemas(&self) -> &Arc<SchemaSet> {
        &self.schemas
    }

    #[must_use]
    pub fn root(&self) -> &Resource {
        &self.root
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Attaches `op` to the resource at `path`, creating intermediate
    /// resources as needed.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Frozen`] after [`freeze`](Self::freeze), or
    /// [`BuildError::Invalid`] for a malformed path or a conflicting
    /// operation. A failed attach poisons the tree.
    pub fn attach_operation(&mut self, path: &str, op: Operation) -> Result<(), BuildError> {
        self.ensure_mutable("attach an operation")?;
        let name = op.name().to_string();
        let result = self.resource_mut(path).and_then(|r| r.add_operation(op));
        self.record(result)?;
        debug!(path, operation = %name, "operation attached");
        Ok(())
    }

    /// Mounts a pre-built resource at `path`. The last segment of `path`
    /// names the mounted resource.
    ///
    /// # Errors
    ///
    /// Same as [`attach_operation`](Self::attach_operation); mounting at the
    /// root or over an existing resource is invalid.
    pub fn attach_resource(&mut self, path: &str, resource: Resource) -> Result<(), BuildError> {
        self.ensure_mutable("attach a resource")?;
        let segments = split_path(path);
        let result = match segments.split_last() {
            None => Err(BuildError::invalid("cannot mount a resource at the root")),
            Some((last, parents)) => self
                .resource_mut(&parents.join("/"))
                .and_then(|parent| parent.add_child(last, resource)),
        };
        self.record(result)?;
        debug!(path, "resource attached");
        Ok(())
    }

    /// Validates the tree and makes it read-only.
    ///
    /// # Errors
    ///
    /// - [`BuildError::Poisoned`] if an earlier attach failed.
    /// - [`BuildError::Invalid`] if an operation uses a path parameter that no
    ///   capture on its route provides, a route captures a name twice, or an
    ///   operation refers to a schema outside the tree's schema set.
    pub fn freeze(&mut self) -> Result<(), BuildError> {
        if self.frozen {
            return Ok(());
        }
        if let Some(cause) = &self.poisoned {
            return Err(BuildError::Poisoned {
                cause: cause.clone(),
            });
        }
        let schemas = Arc::clone(&self.schemas);
        let mut operations = 0usize;
        self.root
            .walk(&mut Vec::new(), &mut Vec::new(), &mut |route, captured, resource| {
                let unique: HashSet<&String> = captured.iter().collect();
                if unique.len() != captured.len() {
                    return Err(BuildError::invalid(format!(
                        "route {route} captures a name twice"
                    )));
                }
                for op in resource.operations() {
                    operations += 1;
                    for p in op.params().iter().filter(|p| p.source == ParamSource::Path) {
                        if !captured.contains(&p.name) {
                            return Err(BuildError::invalid(format!(
                                "operation {} at {route} declares path parameter {} \
                                 but the route has no {{{}}} segment",
                                op.name(),
                                p.name,
                                p.name
                            )));
                        }
                    }
                    if let Some(id) = op.schema_ids().find(|id| !schemas.contains(*id)) {
                        return Err(BuildError::invalid(format!(
                            "operation {} at {route} refers to unknown schema {id}",
                            op.name()
                        )));
                    }
                }
                Ok(())
            })?;
        self.frozen = true;
        info!(operations, "resource tree frozen");
        Ok(())
    }

    /// Resolves a request path.
    #[must_use]
    pub fn locate(&self, path: &str) -> Option<Located<'_>> {
        let segments = split_path(path);
        let mut captures = Vec::new();
        let resource = self.root.locate(&segments, &mut captures)?;
        Some(Located {
            resource,
            captures: captures.into_iter().collect(),
        })
    }

    /// Every operation with its route, in route order.
    #[must_use]
    pub fn routes(&self) -> Vec<(String, Arc<Operation>)> {
        let mut out = Vec::new();
        self.root.for_each(&mut |route, resource| {
            out.extend(resource.operations().map(|op| (route.to_string(), Arc::clone(op))));
        });
        out
    }

    fn ensure_mutable(&self, action: &str) -> Result<(), BuildError> {
        if self.frozen {
            return Err(BuildError::Frozen {
                action: action.to_string(),
            });
        }
        Ok(())
    }

    fn resource_mut(&mut self, path: &str) -> Result<&mut Resource, BuildError> {
        let mut current = &mut self.root;
        for segment in split_path(path) {
            current = current.child_mut(segment)?;
        }
        Ok(current)
    }

    fn record(&mut self, result: Result<(), BuildError>) -> Result<(), BuildError> {
        if let Err(e) = &result {
            if self.poisoned.is_none() {
                self.poisoned = Some(e.to_string());
            }
        }
        result
    }
}
