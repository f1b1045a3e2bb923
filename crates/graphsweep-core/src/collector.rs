//! Graph collection: reachable objects plus parent/child adjacency
//!
//! Two strategies produce an [`ObjectGraph`]:
//! - **Full**: [`GraphCollector::collect`] walks the heap itself.
//! - **Inline**: an [`EdgeRecorder`] rides along an external traversal (a
//!   snapshot service's save walk) and [`GraphCollector::from_observed`]
//!   turns what it saw into the same graph.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::time::Instant;

use crate::descriptor::TypeDescriptorProvider;
use crate::errors::Result;
use crate::heap::{Handle, Heap};
use crate::traversal::{self, TraversalVisitor};
use crate::{log_op_end, log_op_error, log_op_start};

/// Reachable object set with both adjacency directions
///
/// The parent and child maps are exact inverses of each other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectGraph {
    objects: Vec<Handle>,
    containers: Vec<Handle>,
    container_set: HashSet<Handle>,
    parents: HashMap<Handle, BTreeSet<Handle>>,
    children: HashMap<Handle, BTreeSet<Handle>>,
}

const NO_HANDLES: &BTreeSet<Handle> = &BTreeSet::new();

impl ObjectGraph {
    /// Composite (non-container) objects in discovery order
    pub fn objects(&self) -> &[Handle] {
        &self.objects
    }

    /// Container objects in discovery order
    pub fn containers(&self) -> &[Handle] {
        &self.containers
    }

    pub fn is_container(&self, handle: Handle) -> bool {
        self.container_set.contains(&handle)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.parents.contains_key(&handle) || self.children.contains_key(&handle)
    }

    pub fn parents(&self, handle: Handle) -> &BTreeSet<Handle> {
        self.parents.get(&handle).unwrap_or(NO_HANDLES)
    }

    pub fn children(&self, handle: Handle) -> &BTreeSet<Handle> {
        self.children.get(&handle).unwrap_or(NO_HANDLES)
    }

    /// Total reachable objects, containers included
    pub fn len(&self) -> usize {
        self.objects.len() + self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All distinct ancestors up to `depth` levels above `handle`
    ///
    /// Breadth-first; a visited set keeps cycles from repeating ancestors
    /// and `handle` itself is never reported.
    pub fn ancestors(&self, handle: Handle, depth: usize) -> Vec<Handle> {
        let mut visited = HashSet::from([handle]);
        let mut out = Vec::new();
        let mut frontier = vec![handle];
        for _ in 0..depth {
            let mut next = Vec::new();
            for h in frontier {
                for &p in self.parents(h) {
                    if visited.insert(p) {
                        out.push(p);
                        next.push(p);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        out
    }

    /// Nearest ancestor (breadth-first, within `depth`) satisfying `pred`
    pub fn first_ancestor(
        &self,
        handle: Handle,
        depth: usize,
        pred: impl Fn(Handle) -> bool,
    ) -> Option<Handle> {
        let mut visited = HashSet::from([handle]);
        let mut queue = VecDeque::from([(handle, 0usize)]);
        while let Some((h, level)) = queue.pop_front() {
            if level == depth {
                continue;
            }
            for &p in self.parents(h) {
                if !visited.insert(p) {
                    continue;
                }
                if pred(p) {
                    return Some(p);
                }
                queue.push_back((p, level + 1));
            }
        }
        None
    }

    /// Every `(child, parent)` edge, order independent
    pub fn edge_set(&self) -> BTreeSet<(Handle, Handle)> {
        self.parents
            .iter()
            .flat_map(|(&child, ps)| ps.iter().map(move |&p| (child, p)))
            .collect()
    }

    /// Per-type counts of reachable composite objects
    pub fn histogram(&self, heap: &Heap) -> TypeHistogram {
        let mut counts = BTreeMap::new();
        for &h in &self.objects {
            let name = heap.type_name(h).unwrap_or("<unknown>");
            *counts.entry(name.to_string()).or_insert(0) += 1;
        }
        TypeHistogram { counts }
    }

    fn add_object(&mut self, handle: Handle, is_container: bool) {
        if is_container {
            if self.container_set.insert(handle) {
                self.containers.push(handle);
            }
        } else if !self.objects.contains(&handle) {
            self.objects.push(handle);
        }
        self.parents.entry(handle).or_default();
        self.children.entry(handle).or_default();
    }

    fn add_edge(&mut self, child: Handle, parent: Handle) {
        self.parents.entry(child).or_default().insert(parent);
        self.children.entry(parent).or_default().insert(child);
    }
}

/// Visitor that builds an [`ObjectGraph`] from walk events
#[derive(Debug, Default)]
pub struct EdgeRecorder {
    graph: ObjectGraph,
    seen: HashSet<Handle>,
}

impl EdgeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any event was observed
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl TraversalVisitor for EdgeRecorder {
    fn on_object(&mut self, handle: Handle, is_container: bool) {
        if self.seen.insert(handle) {
            if is_container {
                self.graph.container_set.insert(handle);
                self.graph.containers.push(handle);
            } else {
                self.graph.objects.push(handle);
            }
        }
        self.graph.parents.entry(handle).or_default();
        self.graph.children.entry(handle).or_default();
    }

    fn on_edge(&mut self, child: Handle, parent: Handle) {
        self.graph.add_edge(child, parent);
    }
}

/// Stateless collector; every call returns a fresh graph
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphCollector;

impl GraphCollector {
    /// Full strategy: walk the heap from its root
    ///
    /// # Errors
    ///
    /// Propagates walk errors (`MissingRoot`, `DanglingHandle`); the heap is
    /// never modified.
    pub fn collect(heap: &Heap, provider: &dyn TypeDescriptorProvider) -> Result<ObjectGraph> {
        let start = Instant::now();
        log_op_start!("collect");

        let mut recorder = EdgeRecorder::new();
        match traversal::walk(heap, provider, &mut recorder) {
            Ok(()) => {
                let graph = recorder.into_graph();
                log_op_end!(
                    "collect",
                    duration_ms = start.elapsed().as_millis() as u64,
                    object_count = graph.objects().len(),
                    container_count = graph.containers().len()
                );
                Ok(graph)
            }
            Err(err) => {
                log_op_error!(
                    "collect",
                    err.clone(),
                    duration_ms = start.elapsed().as_millis() as u64
                );
                Err(err)
            }
        }
    }

    /// Inline strategy: adopt the graph observed during an external walk
    pub fn from_observed(recorder: EdgeRecorder) -> ObjectGraph {
        let graph = recorder.into_graph();
        tracing::debug!(
            object_count = graph.objects().len(),
            container_count = graph.containers().len(),
            "Adopted observed object graph"
        );
        graph
    }

    /// Build a graph from raw parts; used by tests and hosts that already know the edges
    pub fn from_edges(
        objects: impl IntoIterator<Item = (Handle, bool)>,
        edges: impl IntoIterator<Item = (Handle, Handle)>,
    ) -> ObjectGraph {
        let mut graph = ObjectGraph::default();
        for (h, is_container) in objects {
            graph.add_object(h, is_container);
        }
        for (child, parent) in edges {
            graph.add_edge(child, parent);
        }
        graph
    }
}

impl EdgeRecorder {
    pub fn into_graph(self) -> ObjectGraph {
        self.graph
    }
}

/// Type name → reachable object count
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeHistogram {
    counts: BTreeMap<String, usize>,
}

impl TypeHistogram {
    pub fn get(&self, type_name: &str) -> usize {
        self.counts.get(type_name).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Per-type drop from `self` to `after`; types with no change are omitted
    pub fn delta(&self, after: &TypeHistogram) -> BTreeMap<String, i64> {
        let names: BTreeSet<&String> = self.counts.keys().chain(after.counts.keys()).collect();
        names
            .into_iter()
            .filter_map(|name| {
                let diff = self.get(name) as i64 - after.get(name) as i64;
                (diff != 0).then(|| (name.clone(), diff))
            })
            .collect()
    }
}
