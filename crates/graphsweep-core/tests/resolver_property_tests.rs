#![allow(clippy::unwrap_used, clippy::expect_used)]

use graphsweep_core::addon::AddonSet;
use graphsweep_core::resolver::EdgeResolution;
use graphsweep_core::traversal::TraversalVisitor;
use graphsweep_core::{
    Addon, AddonRegistry, Body, CompletionNotifier, DependencyResolver, DescriptorRegistry,
    EdgeRecorder, Field, GraphCollector, Handle, Heap, MemorySnapshotService, RunConfig,
    SnapshotService, Value,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct Item {
    a: Option<usize>,
    b: Option<usize>,
    in_vault: bool,
    removable: bool,
    essential: bool,
    deps: Vec<usize>,
}

/// `World { items: List, vault: Array }`; every item sits in `items`
///
/// Items are allocated first, so item `i` has handle `i`.
fn build(items: &[Item]) -> (Heap, DescriptorRegistry) {
    let mut heap = Heap::new();
    let item_ty = heap.intern_type("World.Items", "Item");
    let list_ty = heap.intern_type("Sys.Collections", "List");
    let array_ty = heap.intern_type("Sys.Collections", "Array");
    let world_ty = heap.intern_type("World", "World");

    let handles: Vec<Handle> = items
        .iter()
        .map(|_| {
            heap.alloc(
                item_ty,
                Body::Record(vec![
                    Field::new("a", Value::Null),
                    Field::new("b", Value::Null),
                ]),
            )
        })
        .collect();
    for (i, item) in items.iter().enumerate() {
        for (name, target) in [("a", item.a), ("b", item.b)] {
            if let Some(t) = target {
                heap.set_field(handles[i], name, Value::Ref(handles[t]))
                    .unwrap();
            }
        }
    }

    let list = heap.alloc(
        list_ty,
        Body::List(handles.iter().map(|h| Value::Ref(*h)).collect()),
    );
    let vault = heap.alloc(
        array_ty,
        Body::Array(
            items
                .iter()
                .zip(&handles)
                .filter(|(item, _)| item.in_vault)
                .map(|(_, h)| Value::Ref(*h))
                .collect(),
        ),
    );
    let world = heap.alloc(
        world_ty,
        Body::Record(vec![
            Field::new("items", Value::Ref(list)),
            Field::new("vault", Value::Ref(vault)),
        ]),
    );
    heap.set_root(world);

    let descriptors = DescriptorRegistry::builder()
        .class("World", ["items", "vault"])
        .class("Item", ["a", "b"])
        .build();
    (heap, descriptors)
}

fn addon(items: &[Item]) -> Addon {
    let removable: Vec<bool> = items.iter().map(|i| i.removable).collect();
    let essential: Vec<bool> = items.iter().map(|i| i.essential).collect();
    let deps: Vec<Vec<usize>> = items.iter().map(|i| i.deps.clone()).collect();

    Addon::builder("items", "Items")
        .authority("World*")
        .unwrap()
        .removable(move |_, h| removable.get(h.index()).copied().unwrap_or(false))
        .essential(move |_, h| essential.get(h.index()).copied().unwrap_or(false))
        .dependencies(move |_, h| {
            deps.get(h.index())
                .map(|d| d.iter().map(|&i| Handle(i as u32)).collect())
                .unwrap_or_default()
        })
        .build()
}

/// Votes and dependencies for the items whose index has `parity`
fn parity_addon(id: &str, items: &[Item], parity: usize) -> Addon {
    let removable: Vec<bool> = items.iter().map(|i| i.removable).collect();
    let deps: Vec<Vec<usize>> = items.iter().map(|i| i.deps.clone()).collect();

    Addon::builder(id, id)
        .authority("World*")
        .unwrap()
        .removable(move |_, h| {
            h.index() % 2 == parity && removable.get(h.index()).copied().unwrap_or(false)
        })
        .dependencies(move |_, h| {
            if h.index() % 2 != parity {
                return Vec::new();
            }
            deps.get(h.index())
                .map(|d| d.iter().map(|&i| Handle(i as u32)).collect())
                .unwrap_or_default()
        })
        .build()
}

fn items_strategy() -> impl Strategy<Value = Vec<Item>> {
    (2usize..12).prop_flat_map(|n| {
        let item = (
            proptest::option::of(0..n),
            proptest::option::of(0..n),
            proptest::bool::weighted(0.15),
            proptest::bool::weighted(0.6),
            proptest::bool::weighted(0.1),
            proptest::collection::vec(0..n, 0..3),
        )
            .prop_map(|(a, b, in_vault, removable, essential, deps)| Item {
                a,
                b,
                in_vault,
                removable,
                essential,
                deps,
            });
        proptest::collection::vec(item, n)
    })
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 96, .. ProptestConfig::default() })]

    #[test]
    fn removable_set_is_closed(items in items_strategy()) {
        let (heap, descriptors) = build(&items);
        let mut registry = AddonRegistry::new();
        registry.register("mod_items", addon(&items));
        let config = RunConfig::default();

        let graph = GraphCollector::collect(&heap, &descriptors).unwrap();
        let set = AddonSet::resolve(&registry, &config).unwrap();
        let wrappers = config.wrapper_patterns().unwrap();
        let resolution =
            DependencyResolver::new(&heap, &graph, &descriptors, &set, &wrappers, false).resolve();

        for &object in resolution.removable() {
            let item = &items[object.index()];
            prop_assert!(!item.essential);
            prop_assert!(!item.in_vault);
            prop_assert!(!resolution.failed().contains(&object));
            for &dep in &item.deps {
                if dep != object.index() {
                    prop_assert!(resolution.is_removable(Handle(dep as u32)));
                }
            }

            let plan = resolution.plan(object).unwrap();
            for &parent in graph.parents(object) {
                if parent == object {
                    continue;
                }
                let edge = plan.edges.iter().find(|e| e.parent == parent).unwrap();
                if edge.resolution == EdgeResolution::ParentRemoved {
                    prop_assert!(resolution.is_removable(parent));
                }
            }
        }
    }

    #[test]
    fn removable_set_is_closed_across_owners(items in items_strategy()) {
        let (heap, descriptors) = build(&items);
        let essential: Vec<bool> = items.iter().map(|i| i.essential).collect();
        let mut registry = AddonRegistry::new();
        registry.register("mod_evens", parity_addon("evens", &items, 0));
        registry.register("mod_odds", parity_addon("odds", &items, 1));
        registry.register(
            "mod_guard",
            Addon::builder("guard", "Guard")
                .essential(move |_, h| essential.get(h.index()).copied().unwrap_or(false))
                .build(),
        );
        let config = RunConfig::default();

        let graph = GraphCollector::collect(&heap, &descriptors).unwrap();
        let set = AddonSet::resolve(&registry, &config).unwrap();
        let wrappers = config.wrapper_patterns().unwrap();
        let resolution =
            DependencyResolver::new(&heap, &graph, &descriptors, &set, &wrappers, false).resolve();

        for &object in resolution.removable() {
            let item = &items[object.index()];
            prop_assert!(!item.essential);
            let owner = resolution.owner_of(object).unwrap();
            if item.removable {
                prop_assert_eq!(owner, object.index() % 2);
            }
            // The owner's addon reports `deps` only for its own parity
            if owner == object.index() % 2 {
                for &dep in &item.deps {
                    if dep != object.index() {
                        prop_assert!(resolution.is_removable(Handle(dep as u32)));
                    }
                }
            }
        }
    }

    #[test]
    fn executed_plans_remove_exactly_the_set(items in items_strategy()) {
        let (mut heap, descriptors) = build(&items);
        let mut registry = AddonRegistry::new();
        registry.register("mod_items", addon(&items));
        let config = RunConfig::default();

        let graph = GraphCollector::collect(&heap, &descriptors).unwrap();
        let set = AddonSet::resolve(&registry, &config).unwrap();
        let wrappers = config.wrapper_patterns().unwrap();
        let resolution =
            DependencyResolver::new(&heap, &graph, &descriptors, &set, &wrappers, false).resolve();

        let before = graph.histogram(&heap);
        for &object in resolution.removable() {
            resolution
                .plan(object)
                .unwrap()
                .execute(&mut heap, &graph, &descriptors, &set)
                .unwrap();
        }
        let after_graph = GraphCollector::collect(&heap, &descriptors).unwrap();

        for &object in resolution.removable() {
            prop_assert!(!after_graph.contains(object));
        }
        let removed: i64 = before.delta(&after_graph.histogram(&heap)).values().sum();
        prop_assert_eq!(removed, resolution.len() as i64);
    }

    #[test]
    fn inline_and_full_collection_agree(items in items_strategy()) {
        let (heap, descriptors) = build(&items);
        let full = GraphCollector::collect(&heap, &descriptors).unwrap();

        let mut service = MemorySnapshotService::new();
        let (notifier, _completions) = CompletionNotifier::channel();
        let mut recorder = EdgeRecorder::new();
        service
            .save_as(
                "before_cleaning_world_0",
                &heap,
                &descriptors,
                Some(&mut recorder as &mut dyn TraversalVisitor),
                notifier,
            )
            .unwrap();
        let inline = GraphCollector::from_observed(recorder);

        prop_assert_eq!(full.edge_set(), inline.edge_set());
        prop_assert_eq!(full.objects(), inline.objects());
        prop_assert_eq!(full.containers(), inline.containers());
    }

    #[test]
    fn repeated_full_collection_is_identical(items in items_strategy()) {
        let (heap, descriptors) = build(&items);
        let first = GraphCollector::collect(&heap, &descriptors).unwrap();
        let second = GraphCollector::collect(&heap, &descriptors).unwrap();

        prop_assert_eq!(first.edge_set(), second.edge_set());
        prop_assert_eq!(first.objects(), second.objects());
        prop_assert_eq!(first.containers(), second.containers());
        prop_assert_eq!(first.histogram(&heap), second.histogram(&heap));
    }
}
