#![allow(dead_code)]

use relecs::{Entity, World};

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;

#[derive(Clone, Copy)]
pub struct Wealth {
    pub value: f32,
}

#[derive(Clone, Copy)]
pub struct Productivity {
    pub rate: f32,
}

pub struct Trades;

pub struct Owns;

pub fn make_world() -> World {
    let mut world = World::new();
    world.register_component::<Wealth>().unwrap();
    world.register_component::<Productivity>().unwrap();
    world.register_relation::<Trades>().unwrap();
    world.register_tree_relation::<Owns>().unwrap();
    world
}

/// Spawns `agent_count` agents; every other one also gets a productivity.
pub fn populate(world: &mut World, agent_count: usize) -> Vec<Entity> {
    (0..agent_count)
        .map(|i| {
            let e = world.create();
            world.add(e, Wealth { value: 100.0 });
            if i % 2 == 0 {
                world.add(e, Productivity { rate: 1.0 });
            }
            e
        })
        .collect()
}

/// Links every agent to its next `degree` neighbours.
pub fn connect(world: &mut World, agents: &[Entity], degree: usize) {
    for (i, &from) in agents.iter().enumerate() {
        for step in 1..=degree {
            world.relate(from, agents[(i + step) % agents.len()], Trades);
        }
    }
}

/// Hangs the agents under each other as a binary tree.
pub fn nest(world: &mut World, agents: &[Entity]) {
    for i in 1..agents.len() {
        world.relate(agents[i], agents[(i - 1) / 2], Owns);
    }
}
