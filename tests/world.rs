mod common;

use relecs::{ArchetypeId, Entity, RegistryError, World, WorldConfig};

use common::*;

fn world() -> World {
    init_logging();
    let mut world = World::new();
    setup_world(&mut world);
    world
}

// ── Entities and components ──────────────────────────────────────────────────

#[test]
fn created_entities_start_in_the_empty_archetype() {
    let mut world = world();
    let e = world.create();
    assert!(world.is_alive(e));
    assert_eq!(world.archetype(e), Some(ArchetypeId::EMPTY));
    assert!(world.component_types(e).is_empty());
    assert_eq!(world.len(), 1);
}

#[test]
fn destroyed_handles_are_stale_after_reuse() {
    let mut world = world();
    let e = world.create();
    assert!(world.destroy(e));
    assert!(!world.destroy(e));
    assert!(!world.is_alive(e));

    let reused = world.create();
    assert_eq!(reused.index, e.index);
    assert_ne!(reused.generation, e.generation);
    assert!(!world.is_alive(e));
    assert_eq!(world.entity_at(e.index), Some(reused));
}

#[test]
fn reserved_entities_exist_once_materialized() {
    let mut world = world();
    let e = world.reserve();
    assert!(!world.is_alive(e));
    assert!(world.materialize(e));
    assert!(!world.materialize(e));
    assert!(world.is_alive(e));
}

#[test]
fn adding_components_moves_between_archetypes() {
    let mut world = world();
    let a = world.create();
    let b = world.create();
    world.add(a, Integer(1)).add(b, Integer(2)).add(b, Parent(a));

    assert_eq!(world.get::<Integer>(a), Some(&Integer(1)));
    assert_eq!(world.get::<Parent>(b), Some(&Parent(a)));
    assert!(!world.has::<Parent>(a));
    assert_ne!(world.archetype(a), world.archetype(b));
    assert_eq!(world.component_types(b).len(), 2);

    assert!(world.remove::<Parent>(b));
    assert!(!world.remove::<Parent>(b));
    assert_eq!(world.archetype(a), world.archetype(b));
    assert_eq!(world.get::<Integer>(b), Some(&Integer(2)));
}

#[test]
fn moves_between_older_and_newer_archetypes_keep_values() {
    #[derive(Debug, PartialEq)]
    struct Mass(f32);

    let mut world = world();
    world.register_component::<Mass>().unwrap();
    let a = world.create();
    let b = world.create();
    world.add(a, Integer(1)).add(a, Parent(b)).add(a, Mass(0.5));
    world.add(b, Mass(2.0)).add(b, Integer(2));

    assert!(world.remove::<Integer>(a));
    assert!(world.remove::<Mass>(b));
    world.add(a, Integer(3)).add(b, Parent(a));

    assert_eq!(world.get::<Integer>(a), Some(&Integer(3)));
    assert_eq!(world.get::<Parent>(a), Some(&Parent(b)));
    assert_eq!(world.get::<Mass>(a), Some(&Mass(0.5)));
    assert_eq!(world.get::<Integer>(b), Some(&Integer(2)));
    assert_eq!(world.get::<Parent>(b), Some(&Parent(a)));
    assert!(!world.has::<Mass>(b));
    assert!(world.tables().dense_tables().count() >= 6);
}

#[test]
fn re_adding_overwrites_in_place() {
    let mut world = world();
    let e = world.create();
    world.add(e, Integer(1));
    let archetype = world.archetype(e);
    world.add(e, Integer(5));
    assert_eq!(world.archetype(e), archetype);
    assert_eq!(world.get::<Integer>(e), Some(&Integer(5)));

    world.get_mut::<Integer>(e).unwrap().0 += 1;
    assert_eq!(world.get::<Integer>(e), Some(&Integer(6)));
}

#[test]
fn swap_erase_keeps_other_rows_addressable() {
    let mut world = world();
    let entities: Vec<Entity> = (0..4)
        .map(|i| {
            let e = world.create();
            world.add(e, Integer(i));
            e
        })
        .collect();
    world.destroy(entities[1]);
    world.remove::<Integer>(entities[0]);

    assert_eq!(world.get::<Integer>(entities[2]), Some(&Integer(2)));
    assert_eq!(world.get::<Integer>(entities[3]), Some(&Integer(3)));
    assert_eq!(world.get::<Integer>(entities[0]), None);
    assert_eq!(world.get::<Integer>(entities[1]), None);
}

#[test]
fn dropping_components_runs_their_destructors() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Tracked(Arc<AtomicUsize>);
    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let drops = Arc::new(AtomicUsize::new(0));
    let mut world = world();
    world.register_component::<Tracked>().unwrap();
    let a = world.create();
    let b = world.create();
    world.add(a, Tracked(drops.clone())).add(b, Tracked(drops.clone()));

    world.add(a, Tracked(drops.clone()));
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    world.remove::<Tracked>(a);
    assert_eq!(drops.load(Ordering::SeqCst), 2);
    world.destroy(b);
    assert_eq!(drops.load(Ordering::SeqCst), 3);
}

#[test]
fn parallel_iteration_visits_every_component() {
    let mut world = world();
    for i in 0..100 {
        let e = world.create();
        world.add(e, Integer(i));
        if i % 2 == 0 {
            world.add(e, Parent(e));
        }
    }
    world.par_for_each_mut::<Integer, _>(|_, value| value.0 *= 2);
    let sum: i32 = world.entities().filter_map(|e| world.get::<Integer>(e)).map(|i| i.0).sum();
    assert_eq!(sum, 2 * (0..100).sum::<i32>());
}

#[test]
#[should_panic]
fn adding_to_a_dead_entity_panics() {
    let mut world = world();
    let e = world.create();
    world.destroy(e);
    world.add(e, Integer(1));
}

#[test]
#[should_panic]
fn adding_an_unregistered_component_panics() {
    let mut world = world();
    let e = world.create();
    world.add(e, 1u64);
}

// ── Registration ─────────────────────────────────────────────────────────────

#[test]
fn registering_a_type_twice_fails() {
    let mut world = world();
    assert!(matches!(
        world.register_component::<Integer>(),
        Err(RegistryError::AlreadyRegistered { .. })
    ));
    assert!(world.register_relation::<Integer>().is_err());
}

// ── Relations ────────────────────────────────────────────────────────────────

#[test]
fn relations_are_directed_and_overwritable() {
    let mut world = world();
    let a = world.create();
    let b = world.create();
    world.relate(a, b, Weight(1.0));
    assert!(world.related::<Weight>(a, b));
    assert!(!world.related::<Weight>(b, a));

    world.relate(a, b, Weight(3.0));
    assert_eq!(world.relation::<Weight>(a, b), Some(&Weight(3.0)));
    world.relation_mut::<Weight>(a, b).unwrap().0 = 4.0;
    assert_eq!(world.relation::<Weight>(a, b), Some(&Weight(4.0)));

    assert!(world.unrelate::<Weight>(a, b));
    assert!(!world.unrelate::<Weight>(a, b));
    assert!(!world.related::<Weight>(a, b));
}

#[test]
fn symmetric_relations_ignore_direction() {
    let mut world = world();
    let a = world.create();
    let b = world.create();
    world.relate(b, a, Friends);
    assert!(world.related::<Friends>(a, b));
    assert!(world.related::<Friends>(b, a));
    assert!(world.unrelate::<Friends>(a, b));
    assert!(!world.related::<Friends>(b, a));
}

#[test]
fn destroying_an_entity_removes_its_edges() {
    let mut f = Fixture::new();
    let (e1, e2, e3, e4) = (f.e1, f.e2, f.e3, f.e4);
    f.world.destroy(e1);
    assert!(!f.world.related::<Empty>(e2, e1));
    assert!(f.world.related::<Empty>(e4, e3));
    assert!(f.world.related::<Friends>(e3, e2));
    assert!(!f.world.related::<ChildOf>(e1, e2));
    assert!(f.world.related::<ChildOf>(e2, e4));
}

#[test]
fn tree_depths_follow_re_parenting() {
    let mut f = Fixture::new();
    let (e1, e2, e3, e4) = (f.e1, f.e2, f.e3, f.e4);
    let child_of = f.world.types().id_of::<ChildOf>().unwrap();
    let depth = |world: &World, e| world.tree_depth(child_of, e);

    assert_eq!([depth(&f.world, e1), depth(&f.world, e2), depth(&f.world, e3), depth(&f.world, e4)], [2, 1, 1, 0]);

    // Moving e1 under e3 keeps its depth.
    f.world.relate(e1, e3, ChildOf);
    assert!(!f.world.related::<ChildOf>(e1, e2));
    assert_eq!(depth(&f.world, e1), 2);

    // Hanging the whole tree under a new root pushes every layer down.
    let root = f.world.create();
    f.world.relate(e4, root, ChildOf);
    assert_eq!(
        [depth(&f.world, root), depth(&f.world, e4), depth(&f.world, e3), depth(&f.world, e1)],
        [0, 1, 2, 3]
    );
    assert!(f.world.related::<ChildOf>(e1, e3));

    // Unrelating lifts the subtree back to the roots.
    assert!(f.world.unrelate::<ChildOf>(e4, root));
    assert_eq!([depth(&f.world, e4), depth(&f.world, e2), depth(&f.world, e1)], [0, 1, 2]);
}

#[test]
fn destroying_a_tree_node_turns_its_children_into_roots() {
    let mut f = Fixture::new();
    let (e1, e2, e3, e4) = (f.e1, f.e2, f.e3, f.e4);
    let child_of = f.world.types().id_of::<ChildOf>().unwrap();
    f.world.destroy(e4);
    assert_eq!(f.world.tree_depth(child_of, e2), 0);
    assert_eq!(f.world.tree_depth(child_of, e3), 0);
    assert_eq!(f.world.tree_depth(child_of, e1), 1);
    assert!(f.world.related::<ChildOf>(e1, e2));
}

#[test]
#[should_panic]
fn tree_cycles_panic() {
    let mut f = Fixture::new();
    let (e1, e4) = (f.e1, f.e4);
    f.world.relate(e4, e1, ChildOf);
}

#[test]
fn relations_with_dead_entities_are_absent() {
    let mut world = world();
    let a = world.create();
    let b = world.create();
    world.relate(a, b, Empty);
    world.destroy(b);
    let c = world.create();
    assert_eq!(c.index, b.index);
    assert!(!world.related::<Empty>(a, c));
}

// ── Resources ────────────────────────────────────────────────────────────────

#[test]
fn resources_are_inserted_replaced_and_removed() {
    let mut world = world();
    assert!(!world.has_resource::<String>());
    world.insert_resource(String::from("a"));
    world.resource_mut::<String>().unwrap().push('b');
    assert_eq!(world.resource::<String>().map(String::as_str), Some("ab"));

    world.insert_resource(String::from("c"));
    assert_eq!(world.remove_resource::<String>(), Some(String::from("c")));
    assert!(!world.has_resource::<String>());
    assert!(world.resource::<String>().is_none());
}

#[test]
#[should_panic]
fn components_cannot_be_inserted_as_resources() {
    let mut world = world();
    world.insert_resource(Integer(1));
}

// ── Reset and configuration ──────────────────────────────────────────────────

#[test]
fn reset_keeps_types_and_drops_state() {
    let mut f = Fixture::new();
    f.world.insert_resource(7u32);
    f.world.reset();

    assert!(f.world.is_empty());
    assert!(!f.world.is_alive(f.e1));
    assert!(!f.world.has_resource::<u32>());
    assert!(f.world.types().id_of::<Integer>().is_some());

    let e = f.world.create();
    f.world.add(e, Integer(1));
    assert_eq!(f.world.get::<Integer>(e), Some(&Integer(1)));
}

#[test]
fn config_is_kept_by_the_world() {
    let config = WorldConfig::default().with_entity_capacity(8).with_observer_wave_limit(3);
    let world = World::with_config(config.clone());
    assert_eq!(world.config(), &config);
}
