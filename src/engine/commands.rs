//! # Commands
//!
//! Deferred structural mutations of the world.
//!
//! ## Purpose
//! Systems and observers never change the shape of the world while they run.
//! Instead they record [`Command`] values in a [`CommandBuffer`], through the
//! [`Commands`] façade, and the buffer applies them at a synchronization
//! point with [`CommandBuffer::commit`].
//!
//! ## Design
//! - Commands are plain data describing *what* changes, applied in the order
//!   they were recorded.
//! - Entities created through commands are reserved immediately from the
//!   world's shared [`EntityReserver`], so their handles can be used by later
//!   commands of the same batch.
//! - Values travel type-erased as [`AnyValue`]s; removals name the Rust type.
//!
//! ## Commit and observers
//! `commit` applies the whole batch, then runs the observer hooks triggered by
//! it as one wave (see [`crate::engine::observers`]). Commands recorded by
//! the hooks are applied as the next batch, until the buffer stays empty.
//!
//! ## Invariants
//! - Commands targeting entities that are dead at commit time are skipped
//!   with a warning; a stale handle never resurrects an entity.
//! - Component and relation types must be registered by commit time.

use std::any::TypeId;

use crate::engine::blueprint::{Blueprint, SpawnedBlueprint};
use crate::engine::entity::EntityReserver;
use crate::engine::observers::{ObserverEvent, Observers};
use crate::engine::storage::AnyValue;
use crate::engine::types::{ColumnId, Entity};
use crate::engine::world::World;


/// A deferred world mutation.
///
/// Commands are produced by systems and observers and consumed by
/// [`CommandBuffer::commit`].

#[derive(Debug)]
pub enum Command {
    /// Materializes an entity reserved by the buffer.
    Create {
        /// Reserved handle of the new entity.
        entity: Entity,
    },

    /// Destroys an entity with all of its components and relations.
    Destroy {
        /// Entity to destroy.
        entity: Entity,
    },

    /// Adds or overwrites a component.
    ///
    /// ## Behavior
    /// - Moves the entity to the archetype including the component, unless it
    ///   already has it, in which case the value is overwritten.
    Add {
        /// Target entity.
        entity: Entity,
        /// Component value; its type must be a registered component.
        value: AnyValue,
    },

    /// Removes a component, dropping its value.
    Remove {
        /// Target entity.
        entity: Entity,
        /// Rust type of the component.
        type_id: TypeId,
    },

    /// Inserts or overwrites a relation edge.
    Relate {
        /// Source of the edge.
        from: Entity,
        /// Destination of the edge.
        to: Entity,
        /// Relation value; its type must be a registered relation.
        value: AnyValue,
    },

    /// Removes a relation edge.
    Unrelate {
        /// Source of the edge.
        from: Entity,
        /// Destination of the edge.
        to: Entity,
        /// Rust type of the relation.
        type_id: TypeId,
    },
}

/// Ordered queue of commands bound to one world's entity reserver.
#[derive(Debug)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    reserver: EntityReserver,
}

impl CommandBuffer {
    /// Creates an empty buffer for `world`.
    pub fn new(world: &World) -> Self {
        Self { commands: Vec::new(), reserver: world.reserver().clone() }
    }

    /// Appends a raw command.
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Reserves an entity and records its creation.
    pub fn create(&mut self) -> Entity {
        let entity = self.reserver.reserve();
        self.commands.push(Command::Create { entity });
        entity
    }

    /// Records the destruction of an entity.
    pub fn destroy(&mut self, entity: Entity) {
        self.commands.push(Command::Destroy { entity });
    }

    /// Records the addition of a type-erased component.
    pub fn add_value(&mut self, entity: Entity, value: AnyValue) {
        self.commands.push(Command::Add { entity, value });
    }

    /// Records the removal of a component.
    pub fn remove_type(&mut self, entity: Entity, type_id: TypeId) {
        self.commands.push(Command::Remove { entity, type_id });
    }

    /// Records the insertion of a type-erased relation edge.
    pub fn relate_value(&mut self, from: Entity, to: Entity, value: AnyValue) {
        self.commands.push(Command::Relate { from, to, value });
    }

    /// Records the removal of a relation edge.
    pub fn unrelate_type(&mut self, from: Entity, to: Entity, type_id: TypeId) {
        self.commands.push(Command::Unrelate { from, to, type_id });
    }

    /// Number of pending commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if no command is pending.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drops every pending command. Reserved entities stay reserved but are
    /// never materialized.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Applies every pending command to `world`, then runs the observer waves
    /// they trigger.
    ///
    /// # Panics
    /// If observers keep producing commands for more than
    /// `WorldConfig::observer_wave_limit` waves.
    pub fn commit(&mut self, world: &mut World) {
        let limit = world.config().observer_wave_limit;
        let mut waves = 0usize;

        while !self.commands.is_empty() {
            if waves > limit {
                log::error!("observer chain did not settle after {} waves", limit);
                panic!("observer wave limit of {} exceeded", limit);
            }

            let batch = std::mem::take(&mut self.commands);
            let count = batch.len();
            let mut events = Vec::new();
            for command in batch {
                apply(world, command, &mut events);
            }
            log::debug!("committed {} commands, {} observer events", count, events.len());

            for (event, entity, column) in events {
                Observers::notify(world, self, event, entity, column);
            }
            waves += 1;
        }
    }
}

fn apply(world: &mut World, command: Command, events: &mut Vec<(ObserverEvent, Entity, ColumnId)>) {
    match command {
        Command::Create { entity } => {
            if !world.materialize(entity) {
                log::warn!("entity {} could not be created: handle is stale or already alive", entity);
            }
        }
        Command::Destroy { entity } => {
            let Some(archetype) = world.archetype(entity) else {
                log::warn!("skipped destroying dead entity {}", entity);
                return;
            };
            let columns: Vec<_> = world.archetypes().columns(archetype).collect();
            world.destroy(entity);
            events.extend(columns.into_iter().map(|column| (ObserverEvent::Destroy, entity, column)));
        }
        Command::Add { entity, value } => {
            if !world.is_alive(entity) {
                log::warn!("skipped adding `{}` to dead entity {}", value.ops().name(), entity);
                return;
            }
            let column = world.add_value(entity, value);
            events.push((ObserverEvent::Add, entity, column));
        }
        Command::Remove { entity, type_id } => {
            if !world.is_alive(entity) {
                log::warn!("skipped removing a component from dead entity {}", entity);
                return;
            }
            if let Some(column) = world.remove_type(entity, type_id) {
                events.push((ObserverEvent::Remove, entity, column));
            }
        }
        Command::Relate { from, to, value } => {
            if !world.is_alive(from) || !world.is_alive(to) {
                log::warn!("skipped relating {} to {} with `{}`: entity is dead", from, to, value.ops().name());
                return;
            }
            let column = world.relate_value(from, to, value);
            events.push((ObserverEvent::Relate, from, column));
        }
        Command::Unrelate { from, to, type_id } => {
            if let Some(column) = world.unrelate_type(from, to, type_id) {
                events.push((ObserverEvent::Unrelate, from, column));
            }
        }
    }
}

/// Typed façade over a [`CommandBuffer`], handed to systems and observers.
pub struct Commands<'a> {
    buffer: &'a mut CommandBuffer,
}

impl<'a> Commands<'a> {
    /// Wraps a buffer.
    pub fn new(buffer: &'a mut CommandBuffer) -> Self {
        Self { buffer }
    }

    /// Reserves a new entity and returns a builder to add its components.
    pub fn create(&mut self) -> EntityBuilder<'_> {
        let entity = self.buffer.create();
        EntityBuilder { entity, buffer: &mut *self.buffer }
    }

    /// Destroys an entity.
    pub fn destroy(&mut self, entity: Entity) -> &mut Self {
        self.buffer.destroy(entity);
        self
    }

    /// Adds or overwrites a component.
    pub fn add<T: Send + Sync + 'static>(&mut self, entity: Entity, value: T) -> &mut Self {
        self.buffer.add_value(entity, AnyValue::new(value));
        self
    }

    /// Removes a component.
    pub fn remove<T: 'static>(&mut self, entity: Entity) -> &mut Self {
        self.buffer.remove_type(entity, TypeId::of::<T>());
        self
    }

    /// Inserts or overwrites a relation edge.
    pub fn relate<T: Send + Sync + 'static>(&mut self, from: Entity, to: Entity, value: T) -> &mut Self {
        self.buffer.relate_value(from, to, AnyValue::new(value));
        self
    }

    /// Removes a relation edge.
    pub fn unrelate<T: 'static>(&mut self, from: Entity, to: Entity) -> &mut Self {
        self.buffer.unrelate_type(from, to, TypeId::of::<T>());
        self
    }

    /// Spawns a copy of every entity of `blueprint`.
    pub fn spawn(&mut self, blueprint: &Blueprint) -> SpawnedBlueprint {
        blueprint.instantiate(&mut *self.buffer)
    }

    /// Underlying buffer.
    pub fn buffer(&mut self) -> &mut CommandBuffer {
        &mut *self.buffer
    }
}

/// Builder returned by [`Commands::create`].
pub struct EntityBuilder<'a> {
    entity: Entity,
    buffer: &'a mut CommandBuffer,
}

impl<'a> EntityBuilder<'a> {
    /// Adds a component to the new entity.
    pub fn add<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.buffer.add_value(self.entity, AnyValue::new(value));
        self
    }

    /// Relates the new entity to `to`.
    pub fn relate_to<T: Send + Sync + 'static>(self, to: Entity, value: T) -> Self {
        self.buffer.relate_value(self.entity, to, AnyValue::new(value));
        self
    }

    /// Handle of the new entity.
    pub fn entity(&self) -> Entity {
        self.entity
    }
}
