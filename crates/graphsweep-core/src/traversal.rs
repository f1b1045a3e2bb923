//! Breadth-first reachability walk
//!
//! Shared by the graph collector and by snapshot services whose save walk
//! doubles as the inline collection strategy. Each object is expanded at
//! most once; every reference encountered is reported as an edge, including
//! references to objects that were already expanded.

use std::collections::{HashSet, VecDeque};

use crate::descriptor::{ClassDescriptor, ContainerDescriptor, TypeDescriptorProvider};
use crate::errors::{Result, SweepError};
use crate::heap::{Body, Handle, Heap, Object, Value};

/// Observer of a walk
pub trait TraversalVisitor {
    /// Called once per expanded object, in breadth-first order
    fn on_object(&mut self, handle: Handle, is_container: bool);

    /// Called for every `(child, parent)` reference encountered
    fn on_edge(&mut self, child: Handle, parent: Handle);
}

/// Fans events out to two visitors
pub struct TeeVisitor<'a> {
    first: &'a mut dyn TraversalVisitor,
    second: &'a mut dyn TraversalVisitor,
}

impl<'a> TeeVisitor<'a> {
    pub fn new(first: &'a mut dyn TraversalVisitor, second: &'a mut dyn TraversalVisitor) -> Self {
        Self { first, second }
    }
}

impl TraversalVisitor for TeeVisitor<'_> {
    fn on_object(&mut self, handle: Handle, is_container: bool) {
        self.first.on_object(handle, is_container);
        self.second.on_object(handle, is_container);
    }

    fn on_edge(&mut self, child: Handle, parent: Handle) {
        self.first.on_edge(child, parent);
        self.second.on_edge(child, parent);
    }
}

/// Walk everything reachable from the heap root
///
/// # Errors
///
/// Returns `MissingRoot` if the heap has no root, or `DanglingHandle` if a
/// reference points outside the heap.
pub fn walk(
    heap: &Heap,
    provider: &dyn TypeDescriptorProvider,
    visitor: &mut dyn TraversalVisitor,
) -> Result<()> {
    let root = heap.root().ok_or(SweepError::MissingRoot)?;
    heap.get(root)?;

    let mut visited: HashSet<Handle> = HashSet::new();
    let mut undescribed: HashSet<String> = HashSet::new();
    let mut queue = VecDeque::new();
    let mut values = Vec::new();
    let mut refs = Vec::new();

    visited.insert(root);
    queue.push_back(root);

    while let Some(handle) = queue.pop_front() {
        let object = heap.get(handle)?;
        visitor.on_object(handle, object.shape().is_container());

        values.clear();
        child_values(heap, provider, object, &mut values, &mut undescribed);

        refs.clear();
        for value in &values {
            collect_refs(heap, provider, value, &mut refs);
        }

        for &child in &refs {
            if !heap.contains(child) {
                return Err(SweepError::DanglingHandle {
                    handle: child.to_string(),
                });
            }
            visitor.on_edge(child, handle);
            if visited.insert(child) {
                queue.push_back(child);
            }
        }
    }

    Ok(())
}

/// Values an object exposes to the walk, per its descriptor
fn child_values(
    heap: &Heap,
    provider: &dyn TypeDescriptorProvider,
    object: &Object,
    out: &mut Vec<Value>,
    undescribed: &mut HashSet<String>,
) {
    let type_name = heap
        .type_info(object.ty)
        .map(|t| t.name.as_str())
        .unwrap_or_default();

    match &object.body {
        Body::Record(_) => match provider.class_descriptor(type_name) {
            Some(ClassDescriptor::Members(members)) => {
                for member in members {
                    match object.field(member) {
                        Some(value) => out.push(value.clone()),
                        None => tracing::debug!(
                            type_name = type_name,
                            member = member.as_str(),
                            "Described member missing on object"
                        ),
                    }
                }
            }
            Some(ClassDescriptor::Collect(collect)) => collect(object, out),
            None => {
                if undescribed.insert(type_name.to_string()) {
                    tracing::warn!(
                        type_name = type_name,
                        "No class descriptor; treating type as a leaf"
                    );
                }
            }
        },
        body => match provider.container_descriptor(type_name, body.shape()) {
            ContainerDescriptor::Elements => match body {
                Body::List(values) | Body::Array(values) => out.extend(values.iter().cloned()),
                Body::Queue(values) => out.extend(values.iter().cloned()),
                Body::Map(entries) => {
                    for entry in entries {
                        out.push(entry.key.clone());
                        out.push(entry.value.clone());
                    }
                }
                Body::Record(_) => {}
            },
            ContainerDescriptor::NoChildren => {}
            ContainerDescriptor::Collect(collect) => collect(object, out),
        },
    }
}

/// Flatten a value into the handles it references
///
/// Inline structs are descended through their struct descriptor; an
/// undescribed struct is a leaf, as are all primitives.
fn collect_refs(
    heap: &Heap,
    provider: &dyn TypeDescriptorProvider,
    value: &Value,
    out: &mut Vec<Handle>,
) {
    match value {
        Value::Ref(h) => out.push(*h),
        Value::Struct(s) => {
            let Some(info) = heap.type_info(s.ty) else {
                return;
            };
            if let Some(members) = provider.struct_descriptor(&info.name) {
                for member in members {
                    if let Some(inner) = s.field(member) {
                        collect_refs(heap, provider, inner, out);
                    }
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorRegistry;
    use crate::heap::Field;

    #[derive(Default)]
    struct Recording {
        objects: Vec<Handle>,
        edges: Vec<(Handle, Handle)>,
    }

    impl TraversalVisitor for Recording {
        fn on_object(&mut self, handle: Handle, _is_container: bool) {
            self.objects.push(handle);
        }

        fn on_edge(&mut self, child: Handle, parent: Handle) {
            self.edges.push((child, parent));
        }
    }

    #[test]
    fn test_cycle_expands_each_object_once() {
        let mut heap = Heap::new();
        let ty = heap.intern_type("World", "Node");
        let a = heap.alloc(ty, Body::Record(vec![Field::new("next", Value::Null)]));
        let b = heap.alloc(ty, Body::Record(vec![Field::new("next", Value::Ref(a))]));
        heap.set_field(a, "next", Value::Ref(b)).unwrap();
        heap.set_root(a);

        let registry = DescriptorRegistry::builder().class("Node", ["next"]).build();
        let mut rec = Recording::default();
        walk(&heap, &registry, &mut rec).unwrap();

        assert_eq!(rec.objects, vec![a, b]);
        assert_eq!(rec.edges, vec![(b, a), (a, b)]);
    }

    #[test]
    fn test_missing_root_is_error() {
        let heap = Heap::new();
        let registry = DescriptorRegistry::default();
        let mut rec = Recording::default();
        assert_eq!(
            walk(&heap, &registry, &mut rec),
            Err(SweepError::MissingRoot)
        );
    }

    #[test]
    fn test_undescribed_type_is_leaf() {
        let mut heap = Heap::new();
        let ty = heap.intern_type("World", "Mystery");
        let child = heap.alloc(ty, Body::Record(vec![]));
        let root = heap.alloc(ty, Body::Record(vec![Field::new("x", Value::Ref(child))]));
        heap.set_root(root);

        let mut rec = Recording::default();
        walk(&heap, &DescriptorRegistry::default(), &mut rec).unwrap();
        assert_eq!(rec.objects, vec![root]);
        assert!(rec.edges.is_empty());
    }
}
