//! Dependency resolution: from removability votes to a safe removal set
//!
//! Resolution runs in three steps:
//! 1. **Candidates**: composite objects that some enabled addon marks
//!    removable and no enabled addon marks essential. The first addon (in
//!    evaluation order) that voted removable owns the candidate.
//! 2. **Per-candidate resolution**: every parent edge must be detachable,
//!    either because the parent is itself going away or because the addon
//!    with authority over the edge (found by ancestry escalation) has a
//!    handler whose dry-run succeeds. Every dependency the owner reports is
//!    resolved recursively; a dependency that is itself a candidate keeps
//!    its own owner, whose dependencies are consulted too. One failure fails
//!    the candidate. Failures are memoized.
//! 3. **Closure**: repeatedly drop any accepted object with a dependency, or
//!    a parent it relied on, outside the accepted set. The set only shrinks,
//!    so this reaches a fixed point.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Instant;

use crate::addon::{AddonSet, NamespacePattern};
use crate::ancestry::{AncestryChain, AuthorityOutcome, AuthorityRouter};
use crate::collector::ObjectGraph;
use crate::descriptor::TypeDescriptorProvider;
use crate::errors::{Result, SweepError};
use crate::heap::{Handle, Heap};
use crate::unlinker::{UnlinkStrategy, Unlinker};
use crate::{log_op_end, log_op_start};

/// Which handler detaches an edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeHandler {
    /// A remove-child handler of the authority addon, by index
    Addon(usize),
    /// The built-in unlinker, with the strategy its dry-run chose
    Unlinker(UnlinkStrategy),
}

/// How one parent edge of a removable object gets resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeResolution {
    /// The parent is removed in the same run; nothing to detach
    ParentRemoved,
    Detach {
        /// Addon whose judgment approved the edge
        authority: usize,
        chain: AncestryChain,
        handler: EdgeHandler,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgePlan {
    pub parent: Handle,
    pub resolution: EdgeResolution,
}

/// Everything needed to remove one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalPlan {
    pub object: Handle,
    /// Addon the removal is attributed to
    pub owner: usize,
    pub edges: Vec<EdgePlan>,
    pub dependencies: Vec<Handle>,
}

impl RemovalPlan {
    /// Detach the object from every planned parent
    ///
    /// # Errors
    ///
    /// Returns `RemovalFailed` if a handler that succeeded in dry-run now
    /// fails; the run must be aborted.
    pub fn execute(
        &self,
        heap: &mut Heap,
        graph: &ObjectGraph,
        provider: &dyn TypeDescriptorProvider,
        addons: &AddonSet,
    ) -> Result<()> {
        for edge in &self.edges {
            let EdgeResolution::Detach {
                authority,
                chain,
                handler,
            } = &edge.resolution
            else {
                continue;
            };

            let detached = match handler {
                EdgeHandler::Addon(index) => addons
                    .get(*authority)
                    .is_some_and(|a| a.addon.apply_handler(*index, heap, graph, chain)),
                EdgeHandler::Unlinker(_) => {
                    Unlinker::apply(heap, graph, provider, self.object, edge.parent)?.is_some()
                }
            };

            if !detached {
                return Err(SweepError::RemovalFailed {
                    object: self.object.to_string(),
                    parent: edge.parent.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Outcome of resolution for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    removable: Vec<Handle>,
    plans: HashMap<Handle, RemovalPlan>,
    failed: BTreeSet<Handle>,
    blocked: Vec<(Handle, Handle)>,
    candidate_count: usize,
}

impl Resolution {
    /// Removable objects in collection order
    pub fn removable(&self) -> &[Handle] {
        &self.removable
    }

    pub fn is_removable(&self, handle: Handle) -> bool {
        self.plans.contains_key(&handle)
    }

    pub fn plan(&self, handle: Handle) -> Option<&RemovalPlan> {
        self.plans.get(&handle)
    }

    pub fn owner_of(&self, handle: Handle) -> Option<usize> {
        self.plans.get(&handle).map(|p| p.owner)
    }

    /// Objects proven unremovable this run
    pub fn failed(&self) -> &BTreeSet<Handle> {
        &self.failed
    }

    /// `(object, blocking ancestor)` pairs recorded under compatibility mode
    pub fn blocked(&self) -> &[(Handle, Handle)] {
        &self.blocked
    }

    pub fn candidate_count(&self) -> usize {
        self.candidate_count
    }

    pub fn len(&self) -> usize {
        self.removable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.removable.is_empty()
    }

    /// Removal counts per owning addon id
    pub fn counts_by_addon(&self, addons: &AddonSet) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for plan in self.plans.values() {
            *counts
                .entry(addons.id_of(plan.owner).to_string())
                .or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Default)]
struct ResolveState {
    accepted: HashMap<Handle, RemovalPlan>,
    failed: HashSet<Handle>,
    in_progress: HashSet<Handle>,
    blocked: Vec<(Handle, Handle)>,
}

/// Computes the removal set of a run
pub struct DependencyResolver<'a> {
    heap: &'a Heap,
    graph: &'a ObjectGraph,
    provider: &'a dyn TypeDescriptorProvider,
    addons: &'a AddonSet,
    router: AuthorityRouter<'a>,
    compatibility_mode: bool,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(
        heap: &'a Heap,
        graph: &'a ObjectGraph,
        provider: &'a dyn TypeDescriptorProvider,
        addons: &'a AddonSet,
        wrappers: &'a [NamespacePattern],
        compatibility_mode: bool,
    ) -> Self {
        Self {
            heap,
            graph,
            provider,
            addons,
            router: AuthorityRouter::new(heap, graph, addons, wrappers),
            compatibility_mode,
        }
    }

    /// Resolve the removable set; read-only over the heap
    pub fn resolve(&self) -> Resolution {
        let start = Instant::now();
        log_op_start!("resolve", compatibility_mode = self.compatibility_mode);

        let candidates: Vec<(Handle, usize)> = self
            .graph
            .objects()
            .iter()
            .filter_map(|&h| self.candidate_owner(h).map(|owner| (h, owner)))
            .collect();
        let candidate_owners: HashMap<Handle, usize> = candidates.iter().copied().collect();

        let mut state = ResolveState::default();
        for &(object, owner) in &candidates {
            self.resolve_object(object, owner, &candidate_owners, &mut state);
        }
        self.close(&mut state);

        let removable: Vec<Handle> = self
            .graph
            .objects()
            .iter()
            .copied()
            .filter(|h| state.accepted.contains_key(h))
            .collect();

        let resolution = Resolution {
            removable,
            plans: state.accepted,
            failed: state.failed.into_iter().collect(),
            blocked: state.blocked,
            candidate_count: candidates.len(),
        };

        log_op_end!(
            "resolve",
            duration_ms = start.elapsed().as_millis() as u64,
            candidate_count = resolution.candidate_count,
            removable_count = resolution.len(),
            failed_count = resolution.failed.len(),
            blocked_count = resolution.blocked.len()
        );
        resolution
    }

    /// Owner of a fresh candidate, or `None` if it is not one
    fn candidate_owner(&self, object: Handle) -> Option<usize> {
        if self.graph.parents(object).is_empty() {
            return None;
        }
        let owner = self.addons.removable_owner(self.heap, self.graph, object)?;
        if let Some(veto) = self.addons.essential_veto(self.heap, self.graph, object) {
            tracing::debug!(
                object = %object,
                owner = self.addons.id_of(owner),
                vetoed_by = self.addons.id_of(veto),
                "Removable object vetoed as essential"
            );
            return None;
        }
        Some(owner)
    }

    /// Resolve `object` on behalf of `requester`, the owner of whatever pulled it in
    fn resolve_object(
        &self,
        object: Handle,
        requester: usize,
        candidates: &HashMap<Handle, usize>,
        state: &mut ResolveState,
    ) -> bool {
        if state.failed.contains(&object) {
            return false;
        }
        // Accepted, or provisionally accepted while its own dependencies resolve
        if state.accepted.contains_key(&object) || state.in_progress.contains(&object) {
            return true;
        }

        if self.graph.is_container(object)
            || !self.graph.contains(object)
            || self.graph.parents(object).is_empty()
        {
            tracing::debug!(object = %object, "Not a removable graph object");
            state.failed.insert(object);
            return false;
        }
        if let Some(veto) = self.addons.essential_veto(self.heap, self.graph, object) {
            tracing::debug!(
                object = %object,
                vetoed_by = self.addons.id_of(veto),
                "Dependency vetoed as essential"
            );
            state.failed.insert(object);
            return false;
        }

        let owner = candidates.get(&object).copied().unwrap_or(requester);
        state.in_progress.insert(object);

        let mut edges = Vec::new();
        for &parent in self.graph.parents(object) {
            if parent == object {
                continue;
            }
            if candidates.contains_key(&parent)
                || state.accepted.contains_key(&parent)
                || state.in_progress.contains(&parent)
            {
                edges.push(EdgePlan {
                    parent,
                    resolution: EdgeResolution::ParentRemoved,
                });
                continue;
            }
            match self.resolve_edge(object, parent, state) {
                Some(resolution) => edges.push(EdgePlan { parent, resolution }),
                None => return self.fail(object, state),
            }
        }

        let mut dependencies = self.dependencies_of(owner, object);
        if requester != owner {
            for dependency in self.dependencies_of(requester, object) {
                if !dependencies.contains(&dependency) {
                    dependencies.push(dependency);
                }
            }
        }
        for &dependency in &dependencies {
            if !self.resolve_object(dependency, owner, candidates, state) {
                tracing::debug!(
                    object = %object,
                    dependency = %dependency,
                    "Dependency cannot be removed"
                );
                return self.fail(object, state);
            }
        }

        state.in_progress.remove(&object);
        state.accepted.insert(
            object,
            RemovalPlan {
                object,
                owner,
                edges,
                dependencies,
            },
        );
        true
    }

    /// What `addon` says `object` depends on, self-references dropped
    fn dependencies_of(&self, addon: usize, object: Handle) -> Vec<Handle> {
        let Some(ctx) = self.addons.context(addon, self.heap, self.graph) else {
            return Vec::new();
        };
        self.addons
            .get(addon)
            .map(|a| a.addon.dependencies(&ctx, object))
            .unwrap_or_default()
            .into_iter()
            .filter(|&d| d != object)
            .collect()
    }

    fn fail(&self, object: Handle, state: &mut ResolveState) -> bool {
        state.in_progress.remove(&object);
        state.failed.insert(object);
        false
    }

    /// Route one parent edge and pick its handler
    fn resolve_edge(
        &self,
        object: Handle,
        parent: Handle,
        state: &mut ResolveState,
    ) -> Option<EdgeResolution> {
        match self.router.route(object, parent) {
            AuthorityOutcome::Authority { addon, chain } => self.pick_handler(addon, chain),
            AuthorityOutcome::Ambiguous { chain } => {
                tracing::info!(
                    object = %object,
                    branch = %chain.top(),
                    "Ambiguous ancestry; object left in place"
                );
                None
            }
            AuthorityOutcome::Unauthorized { chain } => {
                if self.compatibility_mode {
                    tracing::info!(
                        object = %object,
                        blocker = %chain.top(),
                        "No authority over parent in compatibility mode; blocked"
                    );
                    state.blocked.push((object, chain.top()));
                    return None;
                }
                match self.addons.catch_all() {
                    Some(catch_all) => self.pick_handler(catch_all, chain),
                    None => None,
                }
            }
        }
    }

    /// The addon's first approving handler, else the built-in unlinker
    fn pick_handler(&self, authority: usize, chain: AncestryChain) -> Option<EdgeResolution> {
        let active = self.addons.get(authority)?;
        let ctx = self.addons.context(authority, self.heap, self.graph)?;

        if let Some(index) = active.addon.approving_handler(&ctx, &chain) {
            return Some(EdgeResolution::Detach {
                authority,
                chain,
                handler: EdgeHandler::Addon(index),
            });
        }

        match Unlinker::dry_run(
            self.heap,
            self.graph,
            self.provider,
            chain.child(),
            chain.parent(),
        ) {
            Ok(Some(strategy)) => Some(EdgeResolution::Detach {
                authority,
                chain,
                handler: EdgeHandler::Unlinker(strategy),
            }),
            Ok(None) => {
                tracing::debug!(
                    object = %chain.child(),
                    parent = %chain.parent(),
                    "No unlink strategy for parent"
                );
                None
            }
            Err(err) => {
                tracing::warn!(
                    object = %chain.child(),
                    parent = %chain.parent(),
                    error = %err,
                    "Unlink dry-run failed"
                );
                None
            }
        }
    }

    /// Shrink the accepted set until every dependency and relied-on parent is inside it
    fn close(&self, state: &mut ResolveState) {
        let mut rounds = 0usize;
        loop {
            let dropped: Vec<Handle> = state
                .accepted
                .values()
                .filter(|plan| {
                    plan.dependencies
                        .iter()
                        .any(|d| !state.accepted.contains_key(d))
                        || plan.edges.iter().any(|e| {
                            e.resolution == EdgeResolution::ParentRemoved
                                && !state.accepted.contains_key(&e.parent)
                        })
                })
                .map(|plan| plan.object)
                .collect();

            if dropped.is_empty() {
                break;
            }
            rounds += 1;
            for object in dropped {
                tracing::debug!(object = %object, "Dropped from removable set by closure");
                state.accepted.remove(&object);
                state.failed.insert(object);
            }
        }
        tracing::debug!(rounds = rounds, "Dependency closure reached a fixed point");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addon::{Addon, AddonRegistry, DEFAULT_OWNER};
    use crate::collector::GraphCollector;
    use crate::config::RunConfig;
    use crate::descriptor::DescriptorRegistry;
    use crate::heap::{Body, Field, Value};

    struct Fixture {
        heap: Heap,
        registry: DescriptorRegistry,
        world: Handle,
        list: Handle,
        heroes: Vec<Handle>,
    }

    /// world.heroes -> list of `n` heroes
    fn fixture(n: usize) -> Fixture {
        let mut heap = Heap::new();
        let world_ty = heap.intern_type("World", "World");
        let hero_ty = heap.intern_type("World.Characters", "Hero");
        let list_ty = heap.intern_type("Sys.Collections", "List");
        let heroes: Vec<Handle> = (0..n)
            .map(|_| heap.alloc(hero_ty, Body::Record(vec![])))
            .collect();
        let list = heap.alloc(
            list_ty,
            Body::List(heroes.iter().map(|h| Value::Ref(*h)).collect()),
        );
        let world = heap.alloc(
            world_ty,
            Body::Record(vec![Field::new("heroes", Value::Ref(list))]),
        );
        heap.set_root(world);
        let registry = DescriptorRegistry::builder()
            .class("World", ["heroes"])
            .class("Hero", Vec::<&str>::new())
            .build();
        Fixture {
            heap,
            registry,
            world,
            list,
            heroes,
        }
    }

    fn resolve(f: &Fixture, addons: AddonRegistry, config: &RunConfig) -> Resolution {
        let graph = GraphCollector::collect(&f.heap, &f.registry).unwrap();
        let set = AddonSet::resolve(&addons, config).unwrap();
        let wrappers = config.wrapper_patterns().unwrap();
        DependencyResolver::new(
            &f.heap,
            &graph,
            &f.registry,
            &set,
            &wrappers,
            config.compatibility_mode,
        )
        .resolve()
    }

    fn removes(targets: Vec<Handle>) -> Addon {
        Addon::builder("remover", "Remover")
            .authority("World")
            .unwrap()
            .removable(move |_, h| targets.contains(&h))
            .build()
    }

    #[test]
    fn test_authorized_candidate_is_removable() {
        let f = fixture(2);
        let mut addons = AddonRegistry::new();
        addons.register("mod", removes(vec![f.heroes[0]]));

        let resolution = resolve(&f, addons, &RunConfig::default());
        assert_eq!(resolution.removable(), &[f.heroes[0]]);

        let plan = resolution.plan(f.heroes[0]).unwrap();
        assert_eq!(plan.edges.len(), 1);
        match &plan.edges[0].resolution {
            EdgeResolution::Detach { chain, handler, .. } => {
                assert_eq!(chain.nodes(), &[f.heroes[0], f.list, f.world]);
                assert_eq!(handler, &EdgeHandler::Unlinker(UnlinkStrategy::Sequential));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_essential_veto_is_global() {
        let f = fixture(1);
        let hero = f.heroes[0];
        let mut addons = AddonRegistry::new();
        addons.register("mod_a", removes(vec![hero]));
        addons.register(
            "mod_b",
            Addon::builder("b", "B")
                .removable(move |_, h| h == hero)
                .build(),
        );
        addons.register(
            "mod_c",
            Addon::builder("c", "C")
                .essential(move |_, h| h == hero)
                .build(),
        );

        let resolution = resolve(&f, addons, &RunConfig::default());
        assert!(resolution.is_empty());
        assert_eq!(resolution.candidate_count(), 0);
    }

    #[test]
    fn test_unauthorized_blocked_in_compatibility_mode() {
        let f = fixture(1);
        let hero = f.heroes[0];
        let mut addons = AddonRegistry::new();
        addons.register(
            "mod",
            Addon::builder("a", "A")
                .removable(move |_, h| h == hero)
                .build(),
        );
        addons.register(DEFAULT_OWNER, Addon::builder("graphsweep", "Default").build());
        let config = RunConfig {
            compatibility_mode: true,
            ..RunConfig::default()
        };

        let resolution = resolve(&f, addons, &config);
        assert!(resolution.is_empty());
        assert_eq!(resolution.blocked(), &[(hero, f.world)]);
        assert!(resolution.failed().contains(&hero));
    }

    #[test]
    fn test_unauthorized_falls_back_to_catch_all() {
        let f = fixture(1);
        let hero = f.heroes[0];
        let mut addons = AddonRegistry::new();
        addons.register(
            "mod",
            Addon::builder("a", "A")
                .removable(move |_, h| h == hero)
                .build(),
        );
        addons.register(DEFAULT_OWNER, Addon::builder("graphsweep", "Default").build());

        let resolution = resolve(&f, addons, &RunConfig::default());
        assert_eq!(resolution.removable(), &[hero]);
        assert!(resolution.blocked().is_empty());
    }

    #[test]
    fn test_dependency_without_removal_path_fails_both() {
        let mut f = fixture(1);
        let hero = f.heroes[0];
        // Only referenced from a plain array, which no strategy can edit
        let arr_ty = f.heap.intern_type("Sys.Collections", "Array");
        let item_ty = f.heap.intern_type("World.Items", "Item");
        let item = f.heap.alloc(item_ty, Body::Record(vec![]));
        let arr = f.heap.alloc(arr_ty, Body::Array(vec![Value::Ref(item)]));
        f.heap.get_mut(f.world).unwrap().body = Body::Record(vec![
            Field::new("heroes", Value::Ref(f.list)),
            Field::new("items", Value::Ref(arr)),
        ]);
        f.registry = DescriptorRegistry::builder()
            .class("World", ["heroes", "items"])
            .class("Hero", Vec::<&str>::new())
            .class("Item", Vec::<&str>::new())
            .build();

        let mut addons = AddonRegistry::new();
        addons.register(
            "mod",
            Addon::builder("a", "A")
                .authority("World")
                .unwrap()
                .removable(move |_, h| h == hero)
                .dependencies(move |_, h| if h == hero { vec![item] } else { vec![] })
                .build(),
        );

        let resolution = resolve(&f, addons, &RunConfig::default());
        assert!(resolution.is_empty());
        assert!(resolution.failed().contains(&hero));
        assert!(resolution.failed().contains(&item));
    }

    #[test]
    fn test_cyclic_dependencies_resolve_together() {
        let f = fixture(2);
        let (a, b) = (f.heroes[0], f.heroes[1]);
        let mut addons = AddonRegistry::new();
        addons.register(
            "mod",
            Addon::builder("x", "X")
                .authority("World")
                .unwrap()
                .removable(move |_, h| h == a)
                .dependencies(move |_, h| {
                    if h == a {
                        vec![b]
                    } else if h == b {
                        vec![a]
                    } else {
                        vec![]
                    }
                })
                .build(),
        );

        let resolution = resolve(&f, addons, &RunConfig::default());
        assert_eq!(resolution.removable(), &[a, b]);
        assert_eq!(resolution.owner_of(b), Some(0));
    }

    /// `mod_a` removes A (needing D), `mod_d` removes D (needing E)
    fn chained_owners(f: &Fixture, e_essential: bool) -> AddonRegistry {
        let (a, d, e) = (f.heroes[0], f.heroes[1], f.heroes[2]);
        let mut addons = AddonRegistry::new();
        addons.register(
            "mod_a",
            Addon::builder("a", "A")
                .authority("World")
                .unwrap()
                .removable(move |_, h| h == a)
                .dependencies(move |_, h| if h == a { vec![d] } else { vec![] })
                .build(),
        );
        addons.register(
            "mod_d",
            Addon::builder("d", "D")
                .removable(move |_, h| h == d)
                .dependencies(move |_, h| if h == d { vec![e] } else { vec![] })
                .build(),
        );
        addons.register(
            "mod_e",
            Addon::builder("e", "E")
                .essential(move |_, h| e_essential && h == e)
                .build(),
        );
        addons
    }

    #[test]
    fn test_candidate_reached_as_dependency_keeps_its_owner() {
        let f = fixture(3);
        let (a, d, e) = (f.heroes[0], f.heroes[1], f.heroes[2]);

        let resolution = resolve(&f, chained_owners(&f, false), &RunConfig::default());
        assert_eq!(resolution.removable(), &[a, d, e]);
        assert_eq!(resolution.owner_of(a), Some(0));
        assert_eq!(resolution.owner_of(d), Some(1));
        assert_eq!(resolution.plan(d).unwrap().dependencies, vec![e]);
    }

    #[test]
    fn test_owner_dependency_on_essential_object_fails_the_chain() {
        let f = fixture(3);
        let (a, d, e) = (f.heroes[0], f.heroes[1], f.heroes[2]);

        // A is discovered first and pulls D in; D's own owner still decides
        let resolution = resolve(&f, chained_owners(&f, true), &RunConfig::default());
        assert!(resolution.is_empty());
        assert!(resolution.failed().contains(&a));
        assert!(resolution.failed().contains(&d));
        assert!(resolution.failed().contains(&e));
    }

    #[test]
    fn test_custom_handler_preferred_over_unlinker() {
        let f = fixture(1);
        let hero = f.heroes[0];
        let mut addons = AddonRegistry::new();
        addons.register(
            "mod",
            Addon::builder("a", "A")
                .authority("World")
                .unwrap()
                .removable(move |_, h| h == hero)
                .remove_child(|_, _| false, |_, _, _| false)
                .remove_child(|_, chain| chain.len() == 3, |_, _, _| true)
                .build(),
        );

        let resolution = resolve(&f, addons, &RunConfig::default());
        let plan = resolution.plan(hero).unwrap();
        assert!(matches!(
            plan.edges[0].resolution,
            EdgeResolution::Detach {
                handler: EdgeHandler::Addon(1),
                ..
            }
        ));
    }

    #[test]
    fn test_execute_detaches_from_list() {
        let mut f = fixture(2);
        let hero = f.heroes[0];
        let mut addons = AddonRegistry::new();
        addons.register("mod", removes(vec![hero]));
        let config = RunConfig::default();

        let graph = GraphCollector::collect(&f.heap, &f.registry).unwrap();
        let set = AddonSet::resolve(&addons, &config).unwrap();
        let wrappers = config.wrapper_patterns().unwrap();
        let resolution =
            DependencyResolver::new(&f.heap, &graph, &f.registry, &set, &wrappers, false).resolve();

        let plan = resolution.plan(hero).unwrap().clone();
        plan.execute(&mut f.heap, &graph, &f.registry, &set).unwrap();

        let after = GraphCollector::collect(&f.heap, &f.registry).unwrap();
        assert!(!after.contains(hero));
        assert_eq!(after.histogram(&f.heap).get("Hero"), 1);
    }
}
