use graphsweep_core::heap::{Body, Field, Value};
use graphsweep_core::{DescriptorRegistry, Handle, Heap};

/// `World.heroes` list of three heroes; the second is also the world's champion
pub fn sample_world() -> (Heap, DescriptorRegistry, Vec<Handle>) {
    let mut heap = Heap::new();
    let world_ty = heap.intern_type("World", "World");
    let hero_ty = heap.intern_type("World.Characters", "Hero");
    let list_ty = heap.intern_type("Sys.Collections", "List");

    let heroes: Vec<Handle> = ["Aldric", "Brand", "Cora"]
        .iter()
        .map(|name| {
            heap.alloc(
                hero_ty,
                Body::Record(vec![Field::new("name", Value::Str(name.to_string()))]),
            )
        })
        .collect();
    let list = heap.alloc(
        list_ty,
        Body::List(heroes.iter().map(|h| Value::Ref(*h)).collect()),
    );
    let world = heap.alloc(
        world_ty,
        Body::Record(vec![
            Field::new("heroes", Value::Ref(list)),
            Field::new("champion", Value::Ref(heroes[1])),
        ]),
    );
    heap.set_root(world);
    heap.register_named("world", world);

    let descriptors = DescriptorRegistry::builder()
        .class("World", ["heroes", "champion"])
        .class("Hero", Vec::<&str>::new())
        .build();
    (heap, descriptors, heroes)
}
