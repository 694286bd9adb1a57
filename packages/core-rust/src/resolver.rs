//! Schema Resolver: turns [`TypeDescriptor`]s into nodes of a [`SchemaSet`].
//!
//! Named structs are keyed by name. Resolving a struct reserves its slot and
//! marks the name in progress; re-entering an in-progress name produces a
//! [`SchemaKind::Reference`] to the reserved slot instead of recursing, so
//! recursive shapes terminate with a finite graph.
//!
//! Checks that need the whole graph (union ambiguity, mapping keys, optional
//! defaults) run once the outermost `resolve` call has filled every slot. A
//! failed `resolve` leaves the resolver exactly as it was before the call.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::codec::{self, text};
use crate::descriptor::{StructDescriptor, TypeDescriptor};
use crate::error::BuildError;
use crate::schema::{Discriminator, Field, Schema, SchemaId, SchemaKind, SchemaSet};
use crate::shape::{class_names, shape_classes, STRING};
use crate::types::Value;

/// Graph-wide checks deferred until every reserved slot is filled.
enum Deferred {
    Union(SchemaId),
    MappingKey {
        key: SchemaId,
        descriptor: TypeDescriptor,
    },
    Default {
        optional: SchemaId,
        descriptor: TypeDescriptor,
    },
}

/// Builds a [`SchemaSet`] from type descriptors.
#[derive(Default)]
pub struct SchemaResolver {
    set: SchemaSet,
    catalog: HashMap<String, StructDescriptor>,
    in_progress: HashSet<String>,
    deferred: Vec<Deferred>,
}

impl SchemaResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named struct so that [`TypeDescriptor::Lazy`] can refer to
    /// it, including from inside its own fields.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Invalid`] if `descriptor` is not a struct named
    /// `name`, or if `name` is already defined differently.
    pub fn define(
        &mut self,
        name: impl Into<String>,
        descriptor: TypeDescriptor,
    ) -> Result<(), BuildError> {
        let name = name.into();
        let TypeDescriptor::Struct(st) = descriptor else {
            return Err(BuildError::invalid(format!(
                "only struct descriptors can be defined by name; got {descriptor:?} for {name}"
            )));
        };
        if st.name != name {
            return Err(BuildError::invalid(format!(
                "struct {} defined under the name {name}",
                st.name
            )));
        }
        match self.catalog.get(&name) {
            Some(existing) if *existing != st => Err(BuildError::invalid(format!(
                "conflicting definitions for {name}"
            ))),
            Some(_) => Ok(()),
            None => {
                self.catalog.insert(name, st);
                Ok(())
            }
        }
    }

    /// Resolves a descriptor to a schema node.
    ///
    /// # Errors
    ///
    /// - [`BuildError::SchemaResolution`] for opaque descriptors, unknown lazy
    ///   names, mapping keys without a text form, and defaults that do not
    ///   conform to their schema.
    /// - [`BuildError::AmbiguousUnion`] for unions whose variants cannot be told
    ///   apart.
    pub fn resolve(&mut self, descriptor: &TypeDescriptor) -> Result<SchemaId, BuildError> {
        let mark = self.set.nodes.len();
        let named = self.set.named.clone();
        let catalog_names: HashSet<String> = self.catalog.keys().cloned().collect();

        let result = self
            .resolve_node(descriptor)
            .and_then(|id| self.run_deferred().map(|()| id));

        if result.is_err() {
            self.set.nodes.truncate(mark);
            self.set.named = named;
            self.catalog.retain(|name, _| catalog_names.contains(name));
            self.in_progress.clear();
            self.deferred.clear();
        }
        result
    }

    /// Read access to the schemas resolved so far.
    #[must_use]
    pub fn schemas(&self) -> &SchemaSet {
        &self.set
    }

    /// Consumes the resolver, yielding the immutable schema arena.
    #[must_use]
    pub fn finish(self) -> Arc<SchemaSet> {
        debug!(nodes = self.set.len(), "schema set finished");
        Arc::new(self.set)
    }

    // ------ descriptor walk ------

    fn push(&mut self, schema: Schema) -> SchemaId {
        let id = SchemaId::from_index(self.set.nodes.len());
        self.set.nodes.push(schema);
        id
    }

    fn resolve_node(&mut self, descriptor: &TypeDescriptor) -> Result<SchemaId, BuildError> {
        match descriptor {
            TypeDescriptor::Primitive(p) => Ok(self.push(Schema::new(SchemaKind::Primitive(*p)))),
            TypeDescriptor::Array(items) => {
                let items = self.resolve_node(items)?;
                Ok(self.push(Schema::new(SchemaKind::Array { items })))
            }
            TypeDescriptor::Mapping { key, value } => {
                let key_id = self.resolve_node(key)?;
                let value = self.resolve_node(value)?;
                self.deferred.push(Deferred::MappingKey {
                    key: key_id,
                    descriptor: descriptor.clone(),
                });
                Ok(self.push(Schema::new(SchemaKind::Mapping { key: key_id, value })))
            }
            TypeDescriptor::Optional { inner, default } => {
                let inner = self.resolve_node(inner)?;
                let id = self.push(Schema::new(SchemaKind::Optional {
                    inner,
                    default: default.clone(),
                }));
                if default.is_some() {
                    self.deferred.push(Deferred::Default {
                        optional: id,
                        descriptor: descriptor.clone(),
                    });
                }
                Ok(id)
            }
            TypeDescriptor::Union { variants, tag } => {
                if variants.is_empty() {
                    return Err(BuildError::unresolvable(descriptor, "union has no variants"));
                }
                let variants = variants
                    .iter()
                    .map(|v| self.resolve_node(v))
                    .collect::<Result<Vec<_>, _>>()?;
                let discriminator = match tag {
                    Some(field) => Discriminator::Tagged {
                        field: field.clone(),
                    },
                    None => Discriminator::Untagged,
                };
                let id = self.push(Schema::new(SchemaKind::Union {
                    variants,
                    discriminator,
                }));
                self.deferred.push(Deferred::Union(id));
                Ok(id)
            }
            TypeDescriptor::Enumeration(values) => {
                if values.is_empty() {
                    return Err(BuildError::unresolvable(descriptor, "enumeration has no values"));
                }
                if let Some(bad) = values
                    .iter()
                    .find(|v| matches!(v, Value::Array(_) | Value::Map(_) | Value::Object(_)))
                {
                    return Err(BuildError::unresolvable(
                        descriptor,
                        format!("enumeration literal must be a scalar; got {}", bad.kind_name()),
                    ));
                }
                Ok(self.push(Schema::new(SchemaKind::Enumeration {
                    values: values.clone(),
                })))
            }
            TypeDescriptor::Struct(st) => self.resolve_struct(st, descriptor),
            TypeDescriptor::Lazy(name) => {
                if let Some(id) = self.reentry(name) {
                    return Ok(id);
                }
                let Some(st) = self.catalog.get(name).cloned() else {
                    return Err(BuildError::unresolvable(
                        descriptor,
                        format!("no definition registered for {name}"),
                    ));
                };
                self.resolve_struct(&st, descriptor)
            }
            TypeDescriptor::Constrained { inner, constraints } => {
                let id = self.annotatable(inner)?;
                let node = &mut self.set.nodes[id.index()];
                node.constraints = node.constraints.merged(constraints);
                Ok(id)
            }
            TypeDescriptor::Described { inner, description } => {
                let id = self.annotatable(inner)?;
                self.set.nodes[id.index()].description = Some(description.clone());
                Ok(id)
            }
            TypeDescriptor::Opaque(native) => Err(BuildError::unresolvable(
                descriptor,
                format!("no schema mapping for native type {native}"),
            )),
        }
    }

    /// Resolves `inner` to a node that may carry extra metadata. Named nodes
    /// are shared, so they get an anonymous copy.
    fn annotatable(&mut self, inner: &TypeDescriptor) -> Result<SchemaId, BuildError> {
        let id = self.resolve_node(inner)?;
        let node = &self.set.nodes[id.index()];
        if node.name.is_none() {
            return Ok(id);
        }
        let copy = Schema {
            name: None,
            ..node.clone()
        };
        Ok(self.push(copy))
    }

    /// Back-reference for an in-progress name, or the memoized node for a
    /// completed one.
    fn reentry(&mut self, name: &str) -> Option<SchemaId> {
        let target = self.set.named(name)?;
        if self.in_progress.contains(name) {
            debug!(name, %target, "recursive reference");
            return Some(self.push(Schema::new(SchemaKind::Reference {
                name: name.to_string(),
                target,
            })));
        }
        Some(target)
    }

    fn resolve_struct(
        &mut self,
        st: &StructDescriptor,
        descriptor: &TypeDescriptor,
    ) -> Result<SchemaId, BuildError> {
        match self.catalog.get(&st.name) {
            Some(known) if known != st => {
                return Err(BuildError::unresolvable(
                    descriptor,
                    format!("{} already resolved with a different shape", st.name),
                ));
            }
            Some(_) => {}
            None => {
                self.catalog.insert(st.name.clone(), st.clone());
            }
        }
        if let Some(id) = self.reentry(&st.name) {
            return Ok(id);
        }

        let slot = self.push(Schema::new(SchemaKind::Object { fields: Vec::new() }));
        self.set.named.insert(st.name.clone(), slot);
        self.in_progress.insert(st.name.clone());

        let mut fields = Vec::with_capacity(st.fields.len());
        let mut seen = HashSet::new();
        for field in &st.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(BuildError::unresolvable(
                    descriptor,
                    format!("duplicate field {} in {}", field.name, st.name),
                ));
            }
            let schema = self.resolve_node(&field.ty)?;
            fields.push(Field {
                name: field.name.clone(),
                schema,
                required: field.required,
                description: field.description.clone(),
            });
        }

        self.in_progress.remove(&st.name);
        let node = &mut self.set.nodes[slot.index()];
        node.kind = SchemaKind::Object { fields };
        node.name = Some(st.name.clone());
        debug!(name = %st.name, id = %slot, "resolved named schema");
        Ok(slot)
    }

    // ------ deferred checks ------

    fn run_deferred(&mut self) -> Result<(), BuildError> {
        let mut deferred = std::mem::take(&mut self.deferred);
        // Defaults encode through unions and keys, so they go last.
        deferred.sort_by_key(|d| matches!(d, Deferred::Default { .. }));
        for check in deferred {
            match check {
                Deferred::Union(id) => check_union(&self.set, id)?,
                Deferred::MappingKey { key, descriptor } => {
                    if !text::text_capable(&self.set, key) {
                        return Err(BuildError::unresolvable(
                            &descriptor,
                            format!(
                                "mapping key of kind {} has no text form",
                                self.set.get(key).kind.name()
                            ),
                        ));
                    }
                }
                Deferred::Default {
                    optional,
                    descriptor,
                } => {
                    let SchemaKind::Optional {
                        default: Some(default),
                        ..
                    } = &self.set.get(optional).kind
                    else {
                        continue;
                    };
                    if let Err(e) = codec::conforms(&self.set, optional, default) {
                        return Err(BuildError::unresolvable(
                            &descriptor,
                            format!("default does not conform: {e}"),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Union ambiguity
// ---------------------------------------------------------------------------

fn string_literals(set: &SchemaSet, id: SchemaId) -> Option<HashSet<&str>> {
    match &set.get(set.deref(id)).kind {
        SchemaKind::Enumeration { values } => values.iter().map(Value::as_str).collect(),
        _ => None,
    }
}

fn union_label(set: &SchemaSet, id: SchemaId) -> String {
    if let Some(name) = &set.get(id).name {
        return name.clone();
    }
    let SchemaKind::Union { variants, .. } = &set.get(id).kind else {
        return id.to_string();
    };
    let parts: Vec<String> = variants
        .iter()
        .map(|v| {
            let node = set.get(set.deref(*v));
            node.name
                .clone()
                .unwrap_or_else(|| node.kind.name().to_string())
        })
        .collect();
    format!("union[{}]", parts.join(", "))
}

fn check_union(set: &SchemaSet, id: SchemaId) -> Result<(), BuildError> {
    let SchemaKind::Union {
        variants,
        discriminator,
    } = &set.get(id).kind
    else {
        return Ok(());
    };
    let ambiguous = |detail: String| BuildError::AmbiguousUnion {
        union: union_label(set, id),
        detail,
    };

    match discriminator {
        Discriminator::Tagged { field } => {
            let mut literals: BTreeMap<&str, usize> = BTreeMap::new();
            for (i, variant) in variants.iter().enumerate() {
                let Some(literal) = set.tag_literal(*variant, field) else {
                    return Err(ambiguous(format!(
                        "variant {i} has no single-literal string field {field}"
                    )));
                };
                if let Some(j) = literals.insert(literal, i) {
                    return Err(ambiguous(format!(
                        "variants {j} and {i} share tag value {literal:?}"
                    )));
                }
            }
            Ok(())
        }
        Discriminator::Untagged => {
            let classes: Vec<u8> = variants.iter().map(|v| shape_classes(set, *v)).collect();
            for i in 0..variants.len() {
                for j in (i + 1)..variants.len() {
                    let overlap = classes[i] & classes[j];
                    if overlap == 0 {
                        continue;
                    }
                    if overlap == STRING && disjoint_literals(set, variants[i], variants[j]) {
                        continue;
                    }
                    return Err(ambiguous(format!(
                        "variants {i} and {j} both accept {}",
                        class_names(overlap)
                    )));
                }
            }
            Ok(())
        }
    }
}

fn disjoint_literals(set: &SchemaSet, a: SchemaId, b: SchemaId) -> bool {
    match (string_literals(set, a), string_literals(set, b)) {
        (Some(a), Some(b)) => a.is_disjoint(&b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::json::{from_json, to_json};
    use crate::codec::CodecContext;
    use crate::options::CodecOptions;
    use crate::schema::{Constraints, Primitive};

    fn node_descriptor() -> TypeDescriptor {
        TypeDescriptor::structure("Node")
            .field("value", TypeDescriptor::int())
            .field("children", TypeDescriptor::array(TypeDescriptor::lazy("Node")))
            .build()
    }

    #[test]
    fn composite_descriptors_resolve_recursively() {
        let mut r = SchemaResolver::new();
        let id = r
            .resolve(&TypeDescriptor::mapping(
                TypeDescriptor::string(),
                TypeDescriptor::array(TypeDescriptor::optional(TypeDescriptor::int())),
            ))
            .unwrap();
        let set = r.schemas();
        let SchemaKind::Mapping { key, value } = set.get(id).kind else {
            panic!("expected mapping");
        };
        assert_eq!(set.get(key).kind, SchemaKind::Primitive(Primitive::String));
        let SchemaKind::Array { items } = set.get(value).kind else {
            panic!("expected array");
        };
        assert!(matches!(set.get(items).kind, SchemaKind::Optional { .. }));
    }

    #[test]
    fn recursive_struct_terminates_with_back_reference() {
        let mut r = SchemaResolver::new();
        r.define("Node", node_descriptor()).unwrap();
        let id = r.resolve(&TypeDescriptor::lazy("Node")).unwrap();
        let set = r.finish();

        let SchemaKind::Object { fields } = &set.get(id).kind else {
            panic!("expected object");
        };
        let SchemaKind::Array { items } = set.get(fields[1].schema).kind else {
            panic!("expected array");
        };
        assert_eq!(
            set.get(items).kind,
            SchemaKind::Reference {
                name: "Node".into(),
                target: id
            }
        );
        assert_eq!(set.named("Node"), Some(id));

        let options = CodecOptions::default();
        let cx = CodecContext::new(&set, &options);
        let doc = serde_json::json!({
            "value": 1,
            "children": [{"value": 2, "children": [{"value": 3, "children": []}]}]
        });
        let decoded = from_json(&cx, &doc, id).unwrap();
        assert_eq!(to_json(&cx, &decoded, id).unwrap(), doc);
    }

    #[test]
    fn struct_without_define_can_refer_to_itself() {
        let mut r = SchemaResolver::new();
        let id = r.resolve(&node_descriptor()).unwrap();
        assert_eq!(r.schemas().named("Node"), Some(id));
    }

    #[test]
    fn named_structs_are_memoized() {
        let mut r = SchemaResolver::new();
        let point = TypeDescriptor::structure("Point")
            .field("x", TypeDescriptor::float())
            .field("y", TypeDescriptor::float())
            .build();
        let a = r.resolve(&point).unwrap();
        let b = r.resolve(&TypeDescriptor::array(point)).unwrap();
        let SchemaKind::Array { items } = r.schemas().get(b).kind else {
            panic!("expected array");
        };
        assert_eq!(items, a);
    }

    #[test]
    fn resolution_is_deterministic() {
        let descriptor = TypeDescriptor::structure("Order")
            .field("id", TypeDescriptor::uuid())
            .optional_field("note", TypeDescriptor::optional(TypeDescriptor::string()))
            .field("lines", TypeDescriptor::array(node_descriptor()))
            .build();
        let mut a = SchemaResolver::new();
        let mut b = SchemaResolver::new();
        let ia = a.resolve(&descriptor).unwrap();
        let ib = b.resolve(&descriptor).unwrap();
        assert_eq!(ia, ib);
        assert_eq!(a.schemas().nodes, b.schemas().nodes);
    }

    #[test]
    fn opaque_descriptor_is_reported() {
        let mut r = SchemaResolver::new();
        let bad = TypeDescriptor::Opaque("Callable[[int], int]".into());
        let err = r
            .resolve(&TypeDescriptor::array(bad.clone()))
            .unwrap_err();
        match err {
            BuildError::SchemaResolution { descriptor, .. } => assert_eq!(*descriptor, bad),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_lazy_name_fails() {
        let mut r = SchemaResolver::new();
        let err = r.resolve(&TypeDescriptor::lazy("Missing")).unwrap_err();
        assert!(matches!(err, BuildError::SchemaResolution { .. }));
    }

    #[test]
    fn failed_resolve_rolls_back() {
        let mut r = SchemaResolver::new();
        r.resolve(&TypeDescriptor::int()).unwrap();
        let before = r.schemas().len();
        let broken = TypeDescriptor::structure("Broken")
            .field("x", TypeDescriptor::Opaque("Thread".into()))
            .build();
        assert!(r.resolve(&broken).is_err());
        assert_eq!(r.schemas().len(), before);
        assert_eq!(r.schemas().named("Broken"), None);

        let fixed = TypeDescriptor::structure("Broken")
            .field("x", TypeDescriptor::int())
            .build();
        assert!(r.resolve(&fixed).is_ok());
    }

    #[test]
    fn overlapping_untagged_union_is_ambiguous() {
        let mut r = SchemaResolver::new();
        let err = r
            .resolve(&TypeDescriptor::union(vec![
                TypeDescriptor::int(),
                TypeDescriptor::float(),
            ]))
            .unwrap_err();
        assert!(matches!(err, BuildError::AmbiguousUnion { .. }));

        let err = r
            .resolve(&TypeDescriptor::union(vec![
                TypeDescriptor::string(),
                TypeDescriptor::uuid(),
            ]))
            .unwrap_err();
        assert!(err.to_string().contains("string"));
    }

    #[test]
    fn two_object_variants_are_ambiguous_without_a_tag() {
        let cat = TypeDescriptor::structure("Cat")
            .field("name", TypeDescriptor::string())
            .build();
        let dog = TypeDescriptor::structure("Dog")
            .field("name", TypeDescriptor::string())
            .build();
        let mut r = SchemaResolver::new();
        let err = r
            .resolve(&TypeDescriptor::union(vec![cat, dog]))
            .unwrap_err();
        assert!(matches!(err, BuildError::AmbiguousUnion { .. }));
    }

    #[test]
    fn disjoint_untagged_union_resolves() {
        let mut r = SchemaResolver::new();
        assert!(r
            .resolve(&TypeDescriptor::union(vec![
                TypeDescriptor::int(),
                TypeDescriptor::string(),
                TypeDescriptor::array(TypeDescriptor::int()),
            ]))
            .is_ok());
        assert!(r
            .resolve(&TypeDescriptor::union(vec![
                TypeDescriptor::enumeration(["a", "b"]),
                TypeDescriptor::enumeration(["c"]),
            ]))
            .is_ok());
    }

    #[test]
    fn tagged_union_requires_distinct_literals() {
        let circle = TypeDescriptor::structure("Circle")
            .field("type", TypeDescriptor::enumeration(["circle"]))
            .field("radius", TypeDescriptor::float())
            .build();
        let square = TypeDescriptor::structure("Square")
            .field("type", TypeDescriptor::enumeration(["square"]))
            .field("side", TypeDescriptor::float())
            .build();
        let disk = TypeDescriptor::structure("Disk")
            .field("type", TypeDescriptor::enumeration(["circle"]))
            .build();

        let mut r = SchemaResolver::new();
        assert!(r
            .resolve(&TypeDescriptor::tagged_union(
                "type",
                vec![circle.clone(), square.clone()]
            ))
            .is_ok());
        let err = r
            .resolve(&TypeDescriptor::tagged_union("type", vec![circle, disk]))
            .unwrap_err();
        assert!(err.to_string().contains("share tag value"));
        let err = r
            .resolve(&TypeDescriptor::tagged_union(
                "kind",
                vec![square, TypeDescriptor::int()],
            ))
            .unwrap_err();
        assert!(matches!(err, BuildError::AmbiguousUnion { .. }));
    }

    #[test]
    fn mapping_key_must_have_text_form() {
        let key = TypeDescriptor::structure("Key")
            .field("k", TypeDescriptor::string())
            .build();
        let mut r = SchemaResolver::new();
        let err = r
            .resolve(&TypeDescriptor::mapping(key, TypeDescriptor::int()))
            .unwrap_err();
        assert!(matches!(err, BuildError::SchemaResolution { .. }));
        assert!(r
            .resolve(&TypeDescriptor::mapping(
                TypeDescriptor::date(),
                TypeDescriptor::int()
            ))
            .is_ok());
    }

    #[test]
    fn default_must_conform() {
        let mut r = SchemaResolver::new();
        assert!(r
            .resolve(&TypeDescriptor::optional_with_default(TypeDescriptor::int(), 3))
            .is_ok());
        let err = r
            .resolve(&TypeDescriptor::optional_with_default(
                TypeDescriptor::int(),
                "three",
            ))
            .unwrap_err();
        assert!(err.to_string().contains("default"));
    }

    #[test]
    fn constraints_on_named_struct_do_not_leak() {
        let tag = TypeDescriptor::structure("Tag")
            .field("label", TypeDescriptor::string())
            .build();
        let mut r = SchemaResolver::new();
        let plain = r.resolve(&tag).unwrap();
        let described = r.resolve(&tag.described("a tag")).unwrap();
        assert_ne!(plain, described);
        assert_eq!(r.schemas().get(plain).description, None);
        assert_eq!(
            r.schemas().get(described).description.as_deref(),
            Some("a tag")
        );

        let bounded = r
            .resolve(
                &TypeDescriptor::string().constrained(Constraints::default().max_length(3)),
            )
            .unwrap();
        assert_eq!(r.schemas().get(bounded).constraints.max_length, Some(3));
    }

    #[test]
    fn define_rejects_conflicts() {
        let mut r = SchemaResolver::new();
        r.define("Node", node_descriptor()).unwrap();
        r.define("Node", node_descriptor()).unwrap();
        let other = TypeDescriptor::structure("Node").build();
        assert!(r.define("Node", other).is_err());
        assert!(r.define("Alias", TypeDescriptor::int()).is_err());
    }
}
