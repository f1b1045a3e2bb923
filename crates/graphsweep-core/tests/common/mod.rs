use graphsweep_core::addon::AddonSet;
use graphsweep_core::{
    AddonRegistry, Body, DependencyResolver, DescriptorRegistry, Field, GraphCollector, Handle,
    Heap, ObjectGraph, Resolution, RunConfig, Value,
};

/// A small world: `World.heroes` and `World.clans` are lists
///
/// Heroes carry `alive`, `clan` and `name` fields; clans carry a `leader`.
pub struct TestWorld {
    pub heap: Heap,
    pub descriptors: DescriptorRegistry,
    pub world: Handle,
    pub heroes: Handle,
    pub clans: Handle,
}

impl TestWorld {
    pub fn new() -> Self {
        let mut heap = Heap::new();
        let world_ty = heap.intern_type("World", "World");
        let list_ty = heap.intern_type("Sys.Collections", "List");
        let heroes = heap.alloc(list_ty, Body::List(vec![]));
        let clans = heap.alloc(list_ty, Body::List(vec![]));
        let world = heap.alloc(
            world_ty,
            Body::Record(vec![
                Field::new("heroes", Value::Ref(heroes)),
                Field::new("clans", Value::Ref(clans)),
            ]),
        );
        heap.set_root(world);
        heap.register_named("world", world);

        let descriptors = DescriptorRegistry::builder()
            .class("World", ["heroes", "clans"])
            .class("Hero", ["clan"])
            .class("Clan", ["leader"])
            .build();

        Self {
            heap,
            descriptors,
            world,
            heroes,
            clans,
        }
    }

    /// Add a hero to the world's hero list
    pub fn hero(&mut self, name: &str, alive: bool) -> Handle {
        let ty = self.heap.intern_type("World.Characters", "Hero");
        let hero = self.heap.alloc(
            ty,
            Body::Record(vec![
                Field::new("name", Value::Str(name.to_string())),
                Field::new("alive", Value::Bool(alive)),
                Field::new("clan", Value::Null),
            ]),
        );
        self.push(self.heroes, hero);
        hero
    }

    /// Add a clan led by `leader`; the leader joins it
    #[allow(dead_code)]
    pub fn clan(&mut self, leader: Handle) -> Handle {
        let ty = self.heap.intern_type("World.Clans", "Clan");
        let clan = self.heap.alloc(
            ty,
            Body::Record(vec![Field::new("leader", Value::Ref(leader))]),
        );
        self.push(self.clans, clan);
        self.heap
            .set_field(leader, "clan", Value::Ref(clan))
            .unwrap();
        clan
    }

    fn push(&mut self, list: Handle, item: Handle) {
        if let Body::List(values) = &mut self.heap.get_mut(list).unwrap().body {
            values.push(Value::Ref(item));
        }
    }

    pub fn graph(&self) -> ObjectGraph {
        GraphCollector::collect(&self.heap, &self.descriptors).unwrap()
    }

    /// Collect and resolve under the given addons and configuration
    pub fn resolve(&self, addons: &AddonRegistry, config: &RunConfig) -> Resolution {
        let graph = self.graph();
        let set = AddonSet::resolve(addons, config).unwrap();
        let wrappers = config.wrapper_patterns().unwrap();
        DependencyResolver::new(
            &self.heap,
            &graph,
            &self.descriptors,
            &set,
            &wrappers,
            config.compatibility_mode,
        )
        .resolve()
    }
}

/// Whether a hero is marked dead
#[allow(dead_code)]
pub fn is_dead(heap: &Heap, handle: Handle) -> bool {
    heap.type_name(handle) == Some("Hero")
        && heap
            .get(handle)
            .ok()
            .and_then(|o| o.field("alive"))
            .and_then(Value::as_bool)
            == Some(false)
}
