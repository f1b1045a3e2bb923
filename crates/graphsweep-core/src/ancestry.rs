//! Ancestry chains and namespace authority routing
//!
//! When an object's immediate parent lives in an infrastructure namespace
//! (a collection wrapper, an engine-internal holder) nobody can speak for
//! it, so routing climbs the parent chain until it meets a namespace some
//! addon has authority over.

use std::collections::HashSet;

use crate::addon::{AddonSet, NamespacePattern};
use crate::collector::ObjectGraph;
use crate::heap::{Handle, Heap};

/// Escalation never climbs further than this
pub const MAX_ESCALATION_DEPTH: usize = 32;

/// Ordered chain `[child, parent, grandparent, ...]`
///
/// Immutable: [`AncestryChain::extended`] returns a new chain and refuses to
/// revisit a node, so a chain is always acyclic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestryChain {
    nodes: Vec<Handle>,
    visited: HashSet<Handle>,
}

impl AncestryChain {
    /// Chain of a child and its immediate parent
    pub fn new(child: Handle, parent: Handle) -> Self {
        let mut chain = Self {
            nodes: vec![child],
            visited: HashSet::from([child]),
        };
        if chain.visited.insert(parent) {
            chain.nodes.push(parent);
        }
        chain
    }

    pub fn child(&self) -> Handle {
        self.nodes[0]
    }

    /// Immediate parent; the child itself for a degenerate self-edge chain
    pub fn parent(&self) -> Handle {
        self.nodes.get(1).copied().unwrap_or(self.nodes[0])
    }

    /// Furthest ancestor reached so far
    pub fn top(&self) -> Handle {
        self.nodes[self.nodes.len() - 1]
    }

    pub fn nodes(&self) -> &[Handle] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.visited.contains(&handle)
    }

    /// This chain with `ancestor` appended, or `None` if it is already on the chain
    pub fn extended(&self, ancestor: Handle) -> Option<Self> {
        if self.visited.contains(&ancestor) {
            return None;
        }
        let mut next = self.clone();
        next.nodes.push(ancestor);
        next.visited.insert(ancestor);
        Some(next)
    }
}

/// Who, if anyone, may approve detaching a child from a parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityOutcome {
    /// Addon at this index has authority over the chain's top
    Authority { addon: usize, chain: AncestryChain },
    /// Escalation hit a wrapper with several parents
    Ambiguous { chain: AncestryChain },
    /// The climb ended without finding authority
    Unauthorized { chain: AncestryChain },
}

impl AuthorityOutcome {
    pub fn chain(&self) -> &AncestryChain {
        match self {
            AuthorityOutcome::Authority { chain, .. }
            | AuthorityOutcome::Ambiguous { chain }
            | AuthorityOutcome::Unauthorized { chain } => chain,
        }
    }
}

/// Routes parent edges to the addon with authority over them
pub struct AuthorityRouter<'a> {
    heap: &'a Heap,
    graph: &'a ObjectGraph,
    addons: &'a AddonSet,
    wrappers: &'a [NamespacePattern],
}

impl<'a> AuthorityRouter<'a> {
    pub fn new(
        heap: &'a Heap,
        graph: &'a ObjectGraph,
        addons: &'a AddonSet,
        wrappers: &'a [NamespacePattern],
    ) -> Self {
        Self {
            heap,
            graph,
            addons,
            wrappers,
        }
    }

    /// Containers and objects of wrapper namespaces carry no authority of their own
    pub fn is_wrapper(&self, handle: Handle) -> bool {
        if self.graph.is_container(handle) {
            return true;
        }
        let namespace = self.heap.namespace_of(handle).unwrap_or_default();
        self.wrappers.iter().any(|p| p.matches(namespace))
    }

    /// Find the authority for detaching `child` from `parent`
    pub fn route(&self, child: Handle, parent: Handle) -> AuthorityOutcome {
        let mut chain = AncestryChain::new(child, parent);

        loop {
            let top = chain.top();
            let namespace = self.heap.namespace_of(top).unwrap_or_default();
            if let Some(addon) = self.addons.authority_for(namespace) {
                return AuthorityOutcome::Authority { addon, chain };
            }

            if !self.is_wrapper(top) || chain.len() > MAX_ESCALATION_DEPTH {
                return AuthorityOutcome::Unauthorized { chain };
            }

            let parents = self.graph.parents(top);
            let next = match parents.len() {
                0 => return AuthorityOutcome::Unauthorized { chain },
                1 => parents.iter().next().copied(),
                _ => {
                    tracing::debug!(
                        object = %child,
                        branch = %top,
                        parent_count = parents.len(),
                        "Authority escalation reached a branch point"
                    );
                    return AuthorityOutcome::Ambiguous { chain };
                }
            };

            match next.and_then(|n| chain.extended(n)) {
                Some(extended) => chain = extended,
                None => return AuthorityOutcome::Unauthorized { chain },
            }
        }
    }
}
