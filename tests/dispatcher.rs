mod common;

use relecs::{
    CommandBuffer, Commands, Condition, Dispatcher, DispatcherConfig, DispatcherError, FnSystem, SystemId,
    SystemInfo, World,
};

use common::init_logging;

fn order(world: &mut World) -> &mut Vec<i32> {
    world.resource_mut::<Vec<i32>>().unwrap()
}

/// System pushing `n` to the order.
fn push(n: i32) -> FnSystem {
    FnSystem::world(format!("push-{}", n), move |world, _| order(world).push(n))
}

/// Condition pushing `n` to the order and returning `result`.
fn push_and(n: i32, result: bool) -> Condition {
    Box::new(FnSystem::world(format!("cond-{}", n), move |world, _| {
        order(world).push(n);
        result
    }))
}

/// Succeeds twice, fails, then succeeds twice more and fails for good. Shared
/// counters make nested groups interleave predictably.
fn succeed_twice() -> Condition {
    Box::new(FnSystem::world("succeed-twice", |world, _| {
        let counter = world.resource_mut::<i32>().unwrap();
        *counter += 1;
        if *counter == 4 {
            *counter += 1;
            return false;
        }
        *counter <= 8
    }))
}

struct Harness {
    world: World,
    buffer: CommandBuffer,
    dispatcher: Dispatcher,
}

impl Harness {
    fn new() -> Self {
        init_logging();
        let mut world = World::new();
        world.insert_resource(Vec::<i32>::new());
        world.insert_resource(0i32);
        let buffer = CommandBuffer::new(&world);
        Self { world, buffer, dispatcher: Dispatcher::default() }
    }

    fn system(&mut self, n: i32) -> SystemId {
        self.dispatcher.add_system(push(n))
    }

    fn tag_system(&mut self, system: SystemId, tag: &str) {
        let tag = self.dispatcher.add_tag(tag);
        self.dispatcher.system_add_tag(system, tag);
    }

    fn after(&mut self, system: SystemId, tag: &str) {
        let tag = self.dispatcher.add_tag(tag);
        self.dispatcher.system_set_after_tag(system, tag);
    }

    fn before(&mut self, system: SystemId, tag: &str) {
        let tag = self.dispatcher.add_tag(tag);
        self.dispatcher.system_set_before_tag(system, tag);
    }

    fn tag_after(&mut self, tag: &str, other: &str) {
        let (tag, other) = (self.dispatcher.add_tag(tag), self.dispatcher.add_tag(other));
        self.dispatcher.tag_set_after_tag(tag, other);
    }

    fn tag_before(&mut self, tag: &str, other: &str) {
        let (tag, other) = (self.dispatcher.add_tag(tag), self.dispatcher.add_tag(other));
        self.dispatcher.tag_set_before_tag(tag, other);
    }

    fn inherit(&mut self, tag: &str, parent: &str) {
        let (tag, parent) = (self.dispatcher.add_tag(tag), self.dispatcher.add_tag(parent));
        self.dispatcher.tag_inherit_tag(tag, parent);
    }

    fn tag_condition(&mut self, tag: &str, condition: Condition) {
        let tag = self.dispatcher.add_tag(tag);
        self.dispatcher.tag_add_condition(tag, condition);
    }

    fn repeat(&mut self, tag: &str) {
        let tag = self.dispatcher.add_tag(tag);
        self.dispatcher.tag_repeat_while(tag, succeed_twice());
    }

    /// Compiles, then runs the chain twice from a clean order and counter.
    fn check(&mut self, expected: &[i32]) {
        self.dispatcher.compile_chain().unwrap();
        for run in 1..=2 {
            order(&mut self.world).clear();
            *self.world.resource_mut::<i32>().unwrap() = 0;
            self.dispatcher.call_systems(&mut self.world, &mut self.buffer);
            assert_eq!(self.world.resource::<Vec<i32>>().unwrap(), expected, "run {}", run);
        }
    }
}

#[test]
fn unconstrained_systems_run_in_reverse_order() {
    let mut h = Harness::new();
    h.system(1);
    h.system(2);
    h.system(3);
    h.check(&[3, 2, 1]);
}

#[test]
fn system_constraints_order_systems() {
    let mut h = Harness::new();
    let s1 = h.system(1);
    h.after(s1, "2");
    let s2 = h.system(2);
    h.tag_system(s2, "2");
    h.after(s2, "3");
    let s3 = h.system(3);
    h.tag_system(s3, "3");
    h.check(&[3, 2, 1]);
}

#[test]
fn tag_constraints_order_tagged_systems() {
    let mut h = Harness::new();
    for n in 1..=3 {
        let s = h.system(n);
        h.tag_system(s, &n.to_string());
    }
    h.tag_after("1", "2");
    h.tag_before("3", "2");
    h.check(&[3, 2, 1]);
}

fn one_three_two() -> Harness {
    let mut h = Harness::new();
    let s1 = h.system(1);
    h.tag_system(s1, "1");
    h.before(s1, "3");
    let s2 = h.system(2);
    h.tag_system(s2, "2");
    h.after(s2, "3");
    let s3 = h.system(3);
    h.tag_system(s3, "3");
    h.check(&[1, 3, 2]);
    h
}

#[test]
fn before_and_after_tags_are_respected() {
    one_three_two();
}

#[test]
fn redundant_and_repeated_constraints_change_nothing() {
    let mut h = one_three_two();
    h.tag_before("1", "3");
    h.tag_before("1", "3");
    h.tag_before("1", "2");
    h.tag_after("2", "3");
    h.tag_after("2", "3");
    h.tag_after("2", "1");
    h.tag_after("3", "1");
    h.tag_after("3", "1");
    h.tag_before("3", "2");
    h.tag_before("3", "2");
    h.check(&[1, 3, 2]);
}

#[test]
fn systems_run_when_all_conditions_pass() {
    let mut h = Harness::new();
    let s1 = h.system(1);
    h.dispatcher.system_add_condition(s1, push_and(2, true));
    h.dispatcher.system_add_condition(s1, push_and(3, true));
    let s4 = h.system(4);
    h.tag_system(s4, "4");
    let s5 = h.system(5);
    h.tag_system(s5, "5");
    h.inherit("4", "45");
    h.inherit("5", "45");
    h.tag_condition("45", push_and(6, true));

    // 5 runs first after its inherited condition; 4 reuses the cached
    // result; 1 checks its own conditions in order.
    h.check(&[6, 5, 4, 2, 3, 1]);
}

#[test]
fn failing_conditions_skip_systems_and_stop_evaluation() {
    let mut h = Harness::new();
    let s1 = h.system(1);
    h.tag_system(s1, "1");
    h.dispatcher.system_add_condition(s1, push_and(2, true));
    h.dispatcher.system_add_condition(s1, push_and(3, false));
    h.dispatcher.system_add_condition(s1, push_and(4, true));
    let s5 = h.system(5);
    h.tag_system(s5, "5");

    h.inherit("5", "6");
    h.inherit("6", "7");
    h.inherit("6", "7");
    h.tag_condition("7", push_and(8, true));
    h.tag_condition("7", push_and(9, false));
    h.tag_condition("7", push_and(10, false));

    let s11 = h.system(11);
    h.after(s11, "1");

    h.check(&[8, 9, 2, 3, 11]);
}

#[test]
fn constraints_are_transitive_through_empty_tags() {
    let mut h = Harness::new();
    let s1 = h.system(1);
    h.before(s1, "a");
    h.tag_before("a", "b");
    let s3 = h.system(3);
    h.tag_system(s3, "b");
    h.check(&[1, 3]);
}

#[test]
fn repeat_while_repeats_its_group() {
    let mut h = Harness::new();
    h.repeat("repeat");
    let s1 = h.system(1);
    let tag = h.dispatcher.add_tag("repeat");
    h.dispatcher.system_set_group(s1, tag);
    h.check(&[1, 1, 1]);
}

fn nested_groups(h: &mut Harness) {
    let s1 = h.system(1);
    h.tag_system(s1, "principal");
    h.tag_system(s1, "first");

    let s2 = h.system(2);
    h.tag_system(s2, "subtag");
    h.after(s2, "first");
    h.before(s2, "last");

    let s3 = h.system(3);
    h.tag_system(s3, "subtag");
    h.tag_system(s3, "last");
}

#[test]
fn repeat_while_nests_inside_inherited_group() {
    let mut h = Harness::new();
    h.repeat("principal");
    h.inherit("subtag", "principal");
    h.repeat("subtag");
    nested_groups(&mut h);
    h.check(&[1, 2, 3, 2, 3, 1, 2, 3, 2, 3]);
}

#[test]
fn conditions_of_outer_group_tag_run_once_per_call() {
    let mut h = Harness::new();
    h.repeat("principal");
    h.tag_condition("principal", push_and(5, true));
    h.inherit("subtag", "principal");
    h.repeat("subtag");
    nested_groups(&mut h);
    h.check(&[5, 1, 2, 3, 2, 3, 1, 2, 3, 2, 3]);
}

#[test]
fn conditions_of_inner_group_tag_run_once_per_call() {
    let mut h = Harness::new();
    h.repeat("principal");
    h.inherit("subtag", "principal");
    h.repeat("subtag");
    h.tag_condition("subtag", push_and(5, true));
    nested_groups(&mut h);
    h.check(&[1, 5, 2, 3, 2, 3, 1, 2, 3, 2, 3]);
}

#[test]
fn ordering_cycles_are_rejected() {
    let mut h = Harness::new();
    let s1 = h.system(1);
    h.tag_system(s1, "a");
    h.before(s1, "b");
    let s2 = h.system(2);
    h.tag_system(s2, "b");
    h.before(s2, "a");
    assert!(matches!(h.dispatcher.compile_chain(), Err(DispatcherError::Cycle { .. })));
    assert!(!h.dispatcher.is_compiled());
}

#[test]
fn inheritance_cycles_are_rejected() {
    let mut h = Harness::new();
    h.inherit("a", "b");
    h.inherit("b", "a");
    assert!(matches!(
        h.dispatcher.compile_chain(),
        Err(DispatcherError::InheritanceCycle { .. })
    ));
}

#[test]
fn systems_cannot_join_unrelated_groups() {
    let mut h = Harness::new();
    h.repeat("left");
    h.repeat("right");
    let s1 = h.system(1);
    h.tag_system(s1, "left");
    h.tag_system(s1, "right");
    assert!(matches!(
        h.dispatcher.compile_chain(),
        Err(DispatcherError::ConflictingGroups { .. })
    ));
}

#[test]
fn invalid_access_declarations_are_rejected() {
    let mut h = Harness::new();
    h.dispatcher.add_system(FnSystem::new("raw", SystemInfo::world().with_commands(), |_: &mut World, _: &mut Commands<'_>| {}));
    assert!(matches!(
        h.dispatcher.compile_chain(),
        Err(DispatcherError::InvalidSystem { .. })
    ));
}

#[test]
fn strict_access_requires_ordering_between_conflicting_systems() {
    init_logging();
    let mut world = World::new();
    let counter = world.register_resource::<u64>().unwrap();
    let mut writes = SystemInfo::new();
    writes.write(world.types(), counter);

    let mut dispatcher = Dispatcher::new(DispatcherConfig::default().with_strict_access(true));
    let a = dispatcher.add_system(FnSystem::new("a", writes.clone(), |_: &mut World, _: &mut Commands<'_>| {}));
    let b = dispatcher.add_system(FnSystem::new("b", writes, |_: &mut World, _: &mut Commands<'_>| {}));
    assert!(matches!(
        dispatcher.compile_chain(),
        Err(DispatcherError::UnorderedConflict { .. })
    ));

    let tag = dispatcher.add_tag("a");
    dispatcher.system_add_tag(a, tag);
    dispatcher.system_set_after_tag(b, tag);
    dispatcher.compile_chain().unwrap();
    assert_eq!(dispatcher.chain(), vec![a, b]);
}

#[test]
fn chain_and_stages_reflect_compiled_order() {
    init_logging();
    let mut world = World::new();
    let counter = world.register_resource::<u64>().unwrap();
    let mut reads = SystemInfo::new();
    reads.read(world.types(), counter);

    let mut dispatcher = Dispatcher::default();
    let a = dispatcher.add_system(FnSystem::new("a", reads.clone(), |_: &mut World, _: &mut Commands<'_>| {}));
    let b = dispatcher.add_system(FnSystem::new("b", reads, |_: &mut World, _: &mut Commands<'_>| {}));
    let c = dispatcher.add_system(FnSystem::world("c", |_: &mut World, _: &mut Commands<'_>| {}));
    dispatcher.compile_chain().unwrap();

    assert_eq!(dispatcher.chain(), vec![c, b, a]);
    let stages: Vec<Vec<usize>> = dispatcher.stages().into_iter().map(|s| s.systems).collect();
    assert_eq!(stages, vec![vec![c.0], vec![b.0, a.0]]);
}

#[test]
fn commands_are_committed_after_each_group_iteration() {
    let mut h = Harness::new();
    h.world.register_component::<u8>().unwrap();
    h.repeat("spawn");
    let spawner = h.dispatcher.add_system(FnSystem::world("spawner", |_: &mut World, commands: &mut Commands<'_>| {
        commands.create().add(1u8);
    }));
    let tag = h.dispatcher.add_tag("spawn");
    h.dispatcher.system_add_tag(spawner, tag);
    let counter = h.dispatcher.add_system(FnSystem::world("counter", |world: &mut World, _: &mut Commands<'_>| {
        let alive = world.len() as i32;
        order(world).push(alive);
    }));
    h.dispatcher.system_set_after_tag(counter, tag);
    h.dispatcher.compile_chain().unwrap();
    h.dispatcher.call_systems(&mut h.world, &mut h.buffer);

    // The group ran three times and each iteration committed its spawn.
    assert_eq!(h.world.resource::<Vec<i32>>().unwrap(), &[3]);
    assert!(h.buffer.is_empty());
}

#[test]
#[should_panic]
fn calling_an_uncompiled_chain_panics() {
    let mut h = Harness::new();
    h.system(1);
    h.dispatcher.call_systems(&mut h.world, &mut h.buffer);
}
