use graphsweep_core::config::{DefaultAddonRules, DetachedRule};
use graphsweep_core::{
    AddonRegistry, Body, DescriptorRegistry, Field, Handle, Heap, RunConfig, SnapshotService,
    Value,
};
use graphsweep_engine::{register_default_addon, CleanupOrchestrator};

/// World with a hero list; heroes carry `alive` and `clan`
pub struct World {
    pub heap: Heap,
    pub world: Handle,
    pub heroes: Handle,
}

impl World {
    /// One hero per entry of `alive`, each registered as `hero.<index>`
    pub fn with_heroes(alive: &[bool]) -> Self {
        let mut heap = Heap::new();
        let world_ty = heap.intern_type("World", "World");
        let list_ty = heap.intern_type("Sys.Collections", "List");
        let hero_ty = heap.intern_type("World.Characters", "Hero");

        let mut members = Vec::new();
        for (index, is_alive) in alive.iter().enumerate() {
            let hero = heap.alloc(
                hero_ty,
                Body::Record(vec![
                    Field::new("name", Value::Str(format!("hero {}", index))),
                    Field::new("alive", Value::Bool(*is_alive)),
                    Field::new("clan", Value::Null),
                ]),
            );
            heap.register_named(format!("hero.{}", index), hero);
            members.push(Value::Ref(hero));
        }
        let heroes = heap.alloc(list_ty, Body::List(members));
        let world = heap.alloc(
            world_ty,
            Body::Record(vec![
                Field::new("heroes", Value::Ref(heroes)),
                Field::new("banner", Value::Null),
            ]),
        );
        heap.set_root(world);
        heap.register_named("world", world);

        Self {
            heap,
            world,
            heroes,
        }
    }

    /// Handles currently in the hero list
    pub fn hero_list(&self) -> Vec<Handle> {
        match &self.heap.get(self.heroes).unwrap().body {
            Body::List(values) => values.iter().filter_map(Value::as_handle).collect(),
            _ => Vec::new(),
        }
    }
}

pub fn descriptors() -> DescriptorRegistry {
    DescriptorRegistry::builder()
        .class("World", ["heroes", "banner"])
        .class("Hero", ["clan"])
        .class("Banner", Vec::<&str>::new())
        .build()
}

/// Dead, clanless heroes are detached; phases are held one tick
pub fn config() -> RunConfig {
    RunConfig {
        message_delay_ticks: 1,
        default_addon: DefaultAddonRules {
            detached: vec![DetachedRule {
                type_name: "Hero".to_string(),
                active_field: "alive".to_string(),
                anchor_fields: vec!["clan".to_string()],
            }],
            abandoned: Vec::new(),
        },
        ..RunConfig::default()
    }
}

pub fn registry(config: &RunConfig) -> AddonRegistry {
    let mut registry = AddonRegistry::new();
    register_default_addon(&mut registry, &config.default_addon);
    registry
}

/// Tick until the run completes; returns the tick count
pub fn run_to_end<S: SnapshotService>(o: &mut CleanupOrchestrator<S>, heap: &mut Heap) -> usize {
    for ticks in 1..=500 {
        o.tick(heap);
        if o.completed() {
            return ticks;
        }
    }
    panic!("run did not complete; stuck in {:?}/{:?}", o.state(), o.sub_phase());
}
