#![allow(dead_code)]

use relecs::{Entity, World};

/// Routes `log` output through the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Integer(pub i32);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Parent(pub Entity);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Empty;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Friends;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChildOf;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Weight(pub f32);

/// Registers the shared test schema.
pub fn setup_world(world: &mut World) {
    world.register_component::<Integer>().unwrap();
    world.register_component::<Parent>().unwrap();
    world.register_relation::<Empty>().unwrap();
    world.register_symmetric_relation::<Friends>().unwrap();
    world.register_tree_relation::<ChildOf>().unwrap();
    world.register_relation::<Weight>().unwrap();
}

/// Four entities related the same way in most query tests:
///
/// * `e1` has no components, `e2` and `e3` have `Integer`, `e4` has `Parent`,
/// * `Empty`: e1 -> e1, e1 -> e2, e2 -> e1, e4 -> e3,
/// * `Friends`: e1 - e1, e2 - e3, e4 - e2,
/// * `ChildOf`: e1 -> e2 -> e4, e3 -> e4.
pub struct Fixture {
    pub world: World,
    pub e1: Entity,
    pub e2: Entity,
    pub e3: Entity,
    pub e4: Entity,
}

impl Fixture {
    pub fn new() -> Self {
        init_logging();
        let mut world = World::new();
        setup_world(&mut world);

        let e1 = world.create();
        let e2 = world.create();
        world.add(e2, Integer(2));
        let e3 = world.create();
        world.add(e3, Integer(3));
        let e4 = world.create();
        world.add(e4, Parent(e1));

        world.relate(e1, e1, Empty);
        world.relate(e1, e2, Empty);
        world.relate(e2, e1, Empty);
        world.relate(e4, e3, Empty);

        world.relate(e1, e1, Friends);
        world.relate(e2, e3, Friends);
        world.relate(e4, e2, Friends);

        world.relate(e1, e2, ChildOf);
        world.relate(e2, e4, ChildOf);
        world.relate(e3, e4, ChildOf);

        Self { world, e1, e2, e3, e4 }
    }
}
