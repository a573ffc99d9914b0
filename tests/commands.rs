mod common;

use relecs::{
    Blueprint, ColumnId, CommandBuffer, Commands, Entity, MapEntities, Observer, ObserverEvent, World, WorldConfig,
};

use common::*;

impl MapEntities for Parent {
    fn map_entities(&mut self, map: &mut dyn FnMut(Entity) -> Entity) {
        self.0.map_entities(map);
    }
}

fn world() -> World {
    init_logging();
    let mut world = World::new();
    setup_world(&mut world);
    world.insert_resource(Vec::<String>::new());
    world
}

fn column<T: 'static>(world: &World) -> ColumnId {
    ColumnId::make(world.types().id_of::<T>().unwrap())
}

fn record(world: &mut World, line: String) {
    world.resource_mut::<Vec<String>>().unwrap().push(line);
}

fn logged(world: &World) -> Vec<String> {
    world.resource::<Vec<String>>().unwrap().clone()
}

/// Hooks an observer appending `label entity` to the log.
fn trace(world: &mut World, event: ObserverEvent, column: ColumnId, label: &'static str) -> relecs::ObserverId {
    world.observers_mut().hook(
        event,
        column,
        Observer::new(label, move |world, entity, _| record(world, format!("{} {}", label, entity.index))),
    )
}

// ── Commands ─────────────────────────────────────────────────────────────────

#[test]
fn commands_apply_on_commit_in_order() {
    let mut world = world();
    let mut buffer = CommandBuffer::new(&world);
    let a;
    let b;
    {
        let mut commands = Commands::new(&mut buffer);
        a = commands.create().add(Integer(1)).entity();
        b = commands.create().relate_to(a, Weight(2.0)).entity();
        commands.add(a, Integer(3)).add(b, Parent(a));
    }
    assert_eq!(buffer.len(), 6);
    assert!(!world.is_alive(a));

    buffer.commit(&mut world);
    assert!(buffer.is_empty());
    assert_eq!(world.get::<Integer>(a), Some(&Integer(3)));
    assert_eq!(world.get::<Parent>(b), Some(&Parent(a)));
    assert_eq!(world.relation::<Weight>(b, a), Some(&Weight(2.0)));

    {
        let mut commands = Commands::new(&mut buffer);
        commands.remove::<Integer>(a).unrelate::<Weight>(b, a).destroy(b);
    }
    buffer.commit(&mut world);
    assert!(!world.has::<Integer>(a));
    assert!(!world.is_alive(b));
}

#[test]
fn commands_on_dead_entities_are_skipped() {
    let mut world = world();
    let mut buffer = CommandBuffer::new(&world);
    let e = world.create();
    world.destroy(e);
    {
        let mut commands = Commands::new(&mut buffer);
        commands.add(e, Integer(1)).remove::<Integer>(e).destroy(e);
        let live = commands.create().entity();
        commands.relate(live, e, Empty);
    }
    buffer.commit(&mut world);
    assert!(!world.is_alive(e));
    assert_eq!(world.len(), 1);
}

#[test]
fn cleared_buffers_do_nothing() {
    let mut world = world();
    let mut buffer = CommandBuffer::new(&world);
    let e = buffer.create();
    buffer.clear();
    buffer.commit(&mut world);
    assert!(!world.is_alive(e));
    assert!(world.is_empty());
}

// ── Observers ────────────────────────────────────────────────────────────────

#[test]
fn observers_run_after_the_whole_batch() {
    let mut world = world();
    let integer = column::<Integer>(&world);
    world.observers_mut().hook_on_add(
        integer,
        Observer::new("count", |world, _, _| {
            let alive = world.len();
            record(world, format!("alive {}", alive));
        }),
    );

    let mut buffer = CommandBuffer::new(&world);
    {
        let mut commands = Commands::new(&mut buffer);
        commands.create().add(Integer(1));
        commands.create().add(Integer(2));
    }
    buffer.commit(&mut world);
    assert_eq!(logged(&world), vec!["alive 2", "alive 2"]);
}

#[test]
fn every_event_kind_reaches_its_hooks() {
    let mut world = world();
    let (integer, weight) = (column::<Integer>(&world), column::<Weight>(&world));
    trace(&mut world, ObserverEvent::Add, integer, "add");
    trace(&mut world, ObserverEvent::Remove, integer, "remove");
    trace(&mut world, ObserverEvent::Destroy, integer, "destroy");
    trace(&mut world, ObserverEvent::Relate, weight, "relate");
    trace(&mut world, ObserverEvent::Unrelate, weight, "unrelate");

    let a = world.create();
    let b = world.create();
    let mut buffer = CommandBuffer::new(&world);
    {
        let mut commands = Commands::new(&mut buffer);
        commands.add(a, Integer(1)).relate(a, b, Weight(1.0));
    }
    buffer.commit(&mut world);
    {
        let mut commands = Commands::new(&mut buffer);
        commands.unrelate::<Weight>(a, b).remove::<Integer>(a).remove::<Integer>(a);
    }
    buffer.commit(&mut world);
    {
        let mut commands = Commands::new(&mut buffer);
        commands.add(b, Integer(2)).destroy(b);
    }
    buffer.commit(&mut world);

    let (a, b) = (a.index, b.index);
    assert_eq!(
        logged(&world),
        vec![
            format!("add {}", a),
            format!("relate {}", a),
            format!("unrelate {}", a),
            format!("remove {}", a),
            format!("add {}", b),
            format!("destroy {}", b),
        ]
    );
}

#[test]
fn destroy_hooks_receive_dead_handles() {
    let mut world = world();
    let integer = column::<Integer>(&world);
    world.observers_mut().hook_on_destroy(
        integer,
        Observer::new("dead", |world, entity, _| {
            let alive = world.is_alive(entity);
            record(world, format!("alive {}", alive));
        }),
    );
    let e = world.create();
    world.add(e, Integer(1));

    let mut buffer = CommandBuffer::new(&world);
    buffer.destroy(e);
    buffer.commit(&mut world);
    assert_eq!(logged(&world), vec!["alive false"]);
}

#[test]
fn observer_commands_form_the_next_wave() {
    let mut world = world();
    let integer = column::<Integer>(&world);
    let parent = column::<Parent>(&world);
    world.observers_mut().hook_on_add(
        integer,
        Observer::new("adopt", |_, entity, commands| {
            commands.add(entity, Parent(entity));
        }),
    );
    trace(&mut world, ObserverEvent::Add, parent, "parent");

    let e = world.create();
    let mut buffer = CommandBuffer::new(&world);
    buffer.push(relecs::Command::Add { entity: e, value: relecs::AnyValue::new(Integer(1)) });
    buffer.commit(&mut world);

    assert_eq!(world.get::<Parent>(e), Some(&Parent(e)));
    assert_eq!(logged(&world), vec![format!("parent {}", e.index)]);
}

#[test]
fn unhooked_observers_stop_running() {
    let mut world = world();
    let integer = column::<Integer>(&world);
    let id = trace(&mut world, ObserverEvent::Add, integer, "add");
    assert!(world.observers().is_hooked(id));

    let e = world.create();
    let mut buffer = CommandBuffer::new(&world);
    Commands::new(&mut buffer).add(e, Integer(1));
    buffer.commit(&mut world);

    assert!(world.observers_mut().unhook(id));
    assert!(!world.observers_mut().unhook(id));
    Commands::new(&mut buffer).add(e, Integer(2));
    buffer.commit(&mut world);

    assert_eq!(logged(&world), vec![format!("add {}", e.index)]);
    assert!(world.observers().is_empty());
}

#[test]
fn unhooking_a_later_hook_skips_it_in_the_same_wave() {
    let mut world = world();
    let integer = column::<Integer>(&world);
    world.observers_mut().hook_on_add(
        integer,
        Observer::new("unhook next", |world, entity, _| {
            let next = *world.resource::<relecs::ObserverId>().unwrap();
            world.observers_mut().unhook(next);
            record(world, format!("first {}", entity.index));
        }),
    );
    let next = trace(&mut world, ObserverEvent::Add, integer, "second");
    world.insert_resource(next);

    let mut buffer = CommandBuffer::new(&world);
    let (a, b) = {
        let mut commands = Commands::new(&mut buffer);
        (commands.create().add(Integer(1)).entity(), commands.create().add(Integer(2)).entity())
    };
    buffer.commit(&mut world);

    assert!(!world.observers().is_hooked(next));
    assert_eq!(logged(&world), vec![format!("first {}", a.index), format!("first {}", b.index)]);
}

#[test]
fn a_hook_can_unhook_itself() {
    let mut world = world();
    let integer = column::<Integer>(&world);
    let once = world.observers_mut().hook_on_add(
        integer,
        Observer::new("once", |world, entity, _| {
            let me = *world.resource::<relecs::ObserverId>().unwrap();
            assert!(world.observers_mut().unhook(me));
            record(world, format!("once {}", entity.index));
        }),
    );
    world.insert_resource(once);
    trace(&mut world, ObserverEvent::Add, integer, "after");

    let mut buffer = CommandBuffer::new(&world);
    let (a, b) = {
        let mut commands = Commands::new(&mut buffer);
        (commands.create().add(Integer(1)).entity(), commands.create().add(Integer(2)).entity())
    };
    buffer.commit(&mut world);

    assert!(!world.observers().is_hooked(once));
    assert_eq!(world.observers().len(), 1);
    assert_eq!(
        logged(&world),
        vec![format!("once {}", a.index), format!("after {}", a.index), format!("after {}", b.index)]
    );
}

#[test]
fn observers_survive_world_reset() {
    let mut world = world();
    let integer = column::<Integer>(&world);
    trace(&mut world, ObserverEvent::Add, integer, "add");
    world.reset();
    world.insert_resource(Vec::<String>::new());

    let mut buffer = CommandBuffer::new(&world);
    let e = Commands::new(&mut buffer).create().add(Integer(1)).entity();
    buffer.commit(&mut world);
    assert_eq!(logged(&world), vec![format!("add {}", e.index)]);
}

#[test]
#[should_panic]
fn observer_loops_hit_the_wave_limit() {
    init_logging();
    let mut world = World::with_config(WorldConfig::default().with_observer_wave_limit(3));
    setup_world(&mut world);
    let integer = column::<Integer>(&world);
    world.observers_mut().hook_on_add(
        integer,
        Observer::new("again", |_, entity, commands| {
            commands.add(entity, Integer(0));
        }),
    );
    let e = world.create();
    let mut buffer = CommandBuffer::new(&world);
    Commands::new(&mut buffer).add(e, Integer(1));
    buffer.commit(&mut world);
}

// ── Blueprints ───────────────────────────────────────────────────────────────

fn family() -> Blueprint {
    let mut blueprint = Blueprint::new();
    let parent = blueprint.create("parent");
    let child = blueprint.create("child-1");
    blueprint
        .add(parent, Integer(10))
        .add_mapped(child, Parent(parent))
        .relate(child, parent, ChildOf);
    blueprint
}

#[test]
fn spawning_a_blueprint_remaps_its_entities() {
    let mut world = world();
    let blueprint = family();
    let mut buffer = CommandBuffer::new(&world);

    let first = Commands::new(&mut buffer).spawn(&blueprint);
    let second = Commands::new(&mut buffer).spawn(&blueprint);
    buffer.commit(&mut world);

    for spawned in [&first, &second] {
        let (parent, child) = (spawned.entity("parent"), spawned.entity("child-1"));
        assert_eq!(world.get::<Integer>(parent), Some(&Integer(10)));
        assert_eq!(world.get::<Parent>(child), Some(&Parent(parent)));
        assert!(world.related::<ChildOf>(child, parent));
    }
    assert_ne!(first.entity("parent"), second.entity("parent"));
    assert_eq!(world.len(), 4);
    assert_eq!(first.len(), 2);
    assert_eq!(first.get("missing"), None);
}

#[test]
fn merged_blueprints_are_prefixed() {
    let mut house = Blueprint::new();
    let home = house.create("home");
    house.add(home, Integer(1));
    house.merge("a", &family()).merge("b", &family());

    assert_eq!(house.len(), 5);
    let a_child = house.entity("a.child-1").unwrap();
    assert_eq!(house.name(a_child), Some("a.child-1"));
    assert!(house.entity("b.parent").is_some());
    assert!(house.entity("child-1").is_none());

    let mut world = world();
    let mut buffer = CommandBuffer::new(&world);
    let spawned = Commands::new(&mut buffer).spawn(&house);
    buffer.commit(&mut world);

    let child = spawned.entity("a.child-1");
    let parent = spawned.entity("a.parent");
    assert_eq!(world.get::<Parent>(child), Some(&Parent(parent)));
    assert!(world.related::<ChildOf>(child, parent));
    assert!(!world.related::<ChildOf>(child, spawned.entity("b.parent")));
    assert_eq!(world.get::<Integer>(spawned.entity("b.parent")), Some(&Integer(10)));
}

#[test]
fn re_adding_to_a_template_replaces_the_value() {
    let mut blueprint = Blueprint::new();
    let e = blueprint.create("e");
    blueprint.add(e, Integer(1)).add(e, Integer(2));

    let mut world = world();
    let mut buffer = CommandBuffer::new(&world);
    let spawned = Commands::new(&mut buffer).spawn(&blueprint);
    buffer.commit(&mut world);
    assert_eq!(world.get::<Integer>(spawned.entity("e")), Some(&Integer(2)));
}

#[test]
#[should_panic]
fn invalid_template_names_panic() {
    Blueprint::new().create("Bad Name");
}

#[test]
#[should_panic]
fn duplicate_template_names_panic() {
    let mut blueprint = Blueprint::new();
    blueprint.create("a");
    blueprint.create("a");
}
