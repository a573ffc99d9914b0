//! System abstractions.
//!
//! A **system** is a unit of logic run by the
//! [`Dispatcher`](crate::engine::dispatcher::Dispatcher). Systems:
//! - declare which data types they read and write through a [`SystemInfo`],
//! - receive the world and a [`Commands`] handle for structural changes,
//! - are ordered by tags and explicit constraints, never by their access.
//!
//! ## Access declarations
//!
//! Execution is sequential, but every system still declares its access. Two
//! systems whose declarations are [compatible](SystemInfo::compatible) could
//! run concurrently; the dispatcher uses this to report conflicting systems
//! that have no ordering between them and to plan
//! [stages](crate::engine::scheduler::make_stages).
//!
//! Relations count as component data: writing a relation value conflicts with
//! any other access to that relation.
//!
//! ## Conditions
//!
//! A condition is a system returning `bool`. It gates the systems it is
//! attached to, directly or through their tags.
//!
//! ## Function-backed systems
//!
//! [`FnSystem`] wraps a closure together with its name and access, so most
//! systems need no dedicated type.

use crate::engine::commands::Commands;
use crate::engine::query::QueryAccess;
use crate::engine::registry::Types;
use crate::engine::types::{DataTypeId, Signature};
use crate::engine::world::World;


/// Static access declaration of a system.

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemInfo {
    /// Component and relation types read.
    pub component_reads: Signature,
    /// Component and relation types written.
    pub component_writes: Signature,
    /// Resource types read.
    pub resource_reads: Signature,
    /// Resource types written.
    pub resource_writes: Signature,
    /// The system records commands.
    pub uses_commands: bool,
    /// The system accesses the world directly, beyond any declaration.
    pub uses_world: bool,
}

impl SystemInfo {
    /// Declaration of a system with no access.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declaration of a system using the world directly.
    pub fn world() -> Self {
        Self { uses_world: true, ..Self::default() }
    }

    /// Builds a declaration from the access of a query.
    pub fn from_access(types: &Types, access: &QueryAccess) -> Self {
        let mut info = Self::default();
        for &id in &access.reads {
            info.read(types, id);
        }
        for &id in &access.writes {
            info.write(types, id);
        }
        info
    }

    /// Declares a read.
    pub fn read(&mut self, types: &Types, id: DataTypeId) -> &mut Self {
        if types.is_resource(id) {
            self.resource_reads.set(id.index());
        } else {
            self.component_reads.set(id.index());
        }
        self
    }

    /// Declares a write.
    pub fn write(&mut self, types: &Types, id: DataTypeId) -> &mut Self {
        if types.is_resource(id) {
            self.resource_writes.set(id.index());
        } else {
            self.component_writes.set(id.index());
        }
        self
    }

    /// Declares command usage.
    pub fn with_commands(mut self) -> Self {
        self.uses_commands = true;
        self
    }

    /// Adds every access of `other`.
    pub fn merge(&mut self, other: &SystemInfo) {
        self.component_reads.union_with(&other.component_reads);
        self.component_writes.union_with(&other.component_writes);
        self.resource_reads.union_with(&other.resource_reads);
        self.resource_writes.union_with(&other.resource_writes);
        self.uses_commands |= other.uses_commands;
        self.uses_world |= other.uses_world;
    }

    /// Returns `true` if no type is both read and written, and direct world
    /// access is not combined with any other declaration.
    pub fn valid(&self) -> bool {
        if self.component_reads.intersects(&self.component_writes)
            || self.resource_reads.intersects(&self.resource_writes)
        {
            return false;
        }
        !(self.uses_world
            && (self.uses_commands
                || !self.component_reads.is_empty()
                || !self.component_writes.is_empty()
                || !self.resource_reads.is_empty()
                || !self.resource_writes.is_empty()))
    }

    /// Returns `true` if the two systems may run unordered.
    pub fn compatible(&self, other: &SystemInfo) -> bool {
        if self.uses_world || other.uses_world {
            return false;
        }
        let writes_into = |a: &SystemInfo, b: &SystemInfo| {
            a.component_writes.intersects(&b.component_reads)
                || a.component_writes.intersects(&b.component_writes)
                || a.resource_writes.intersects(&b.resource_reads)
                || a.resource_writes.intersects(&b.resource_writes)
        };
        !writes_into(self, other) && !writes_into(other, self)
    }
}

/// A unit of executable logic producing `O`.
///
/// Systems are `Send` so a dispatcher can be moved across threads; they run
/// one at a time.

pub trait System<O = ()>: Send {
    /// Human-readable name, used in logs and errors.
    fn name(&self) -> &str;

    /// Access declaration.
    fn info(&self) -> SystemInfo;

    /// Runs the system.
    fn run(&mut self, world: &mut World, commands: &mut Commands<'_>) -> O;
}

/// A system returning `bool`, used to gate other systems.
pub type Condition = Box<dyn System<bool>>;

type SystemFn<O> = Box<dyn FnMut(&mut World, &mut Commands<'_>) -> O + Send>;

/// A [`System`] backed by a closure.
///
/// It stores:
/// - a human-readable name,
/// - the declared access,
/// - the closure itself.

pub struct FnSystem<O = ()> {
    name: String,
    info: SystemInfo,
    f: SystemFn<O>,
}

impl<O> FnSystem<O> {
    /// Creates a function-backed system.
    pub fn new<F>(name: impl Into<String>, info: SystemInfo, f: F) -> Self
    where
        F: FnMut(&mut World, &mut Commands<'_>) -> O + Send + 'static,
    {
        Self { name: name.into(), info, f: Box::new(f) }
    }

    /// Creates a system with direct world access.
    pub fn world<F>(name: impl Into<String>, f: F) -> Self
    where
        F: FnMut(&mut World, &mut Commands<'_>) -> O + Send + 'static,
    {
        Self::new(name, SystemInfo::world(), f)
    }
}

impl<O> std::fmt::Debug for FnSystem<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSystem").field("name", &self.name).field("info", &self.info).finish()
    }
}

impl<O> System<O> for FnSystem<O> {
    fn name(&self) -> &str {
        &self.name
    }

    fn info(&self) -> SystemInfo {
        self.info.clone()
    }

    fn run(&mut self, world: &mut World, commands: &mut Commands<'_>) -> O {
        (self.f)(world, commands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::storage::TypeOps;

    struct Position;
    struct Velocity;
    struct Clock;

    fn types() -> (Types, DataTypeId, DataTypeId, DataTypeId) {
        let mut types = Types::new();
        let position = types.add_component(TypeOps::of::<Position>()).unwrap();
        let velocity = types.add_component(TypeOps::of::<Velocity>()).unwrap();
        let clock = types.add_resource(TypeOps::of::<Clock>()).unwrap();
        (types, position, velocity, clock)
    }

    #[test]
    fn read_and_write_of_one_type_is_invalid() {
        let (types, position, _, _) = types();
        let mut info = SystemInfo::new();
        info.read(&types, position);
        assert!(info.valid());
        info.write(&types, position);
        assert!(!info.valid());
    }

    #[test]
    fn world_access_excludes_other_declarations() {
        let (types, _, _, clock) = types();
        assert!(SystemInfo::world().valid());
        let mut info = SystemInfo::world();
        info.read(&types, clock);
        assert!(!info.valid());
        assert!(!SystemInfo::world().with_commands().valid());
    }

    #[test]
    fn compatibility_follows_writes() {
        let (types, position, velocity, clock) = types();
        let mut reader = SystemInfo::new();
        reader.read(&types, position).read(&types, clock);
        let mut other_reader = SystemInfo::new();
        other_reader.read(&types, position);
        let mut writer = SystemInfo::new();
        writer.write(&types, position);
        let mut unrelated = SystemInfo::new();
        unrelated.write(&types, velocity);

        assert!(reader.compatible(&other_reader));
        assert!(!reader.compatible(&writer));
        assert!(!writer.compatible(&reader));
        assert!(writer.compatible(&unrelated));
        assert!(!reader.compatible(&SystemInfo::world()));
    }
}
