//! # relecs
//!
//! Archetype-based Entity-Component-Relation runtime.
//!
//! ## Design Goals
//! - Archetype storage for components, sparse tables for relations
//! - Relations as first-class query terms, including tree traversal
//! - Deferred structural changes through command buffers
//! - Deterministic, tag-driven system ordering with conditions and
//!   repeating groups
//!
//! ## Quick start
//! ```rust
//! use relecs::prelude::*;
//!
//! struct Position(f32);
//! struct Velocity(f32);
//!
//! let mut world = World::new();
//! world.register_component::<Position>().unwrap();
//! world.register_component::<Velocity>().unwrap();
//!
//! let entity = world.create();
//! world.add(entity, Position(0.0)).add(entity, Velocity(2.0));
//!
//! let mut query = Query::<(&mut Position, &Velocity)>::new(&world);
//! let mut view = query.view(&mut world);
//! while let Some((position, velocity)) = view.next() {
//!     position.0 += velocity.0;
//! }
//! assert_eq!(world.get::<Position>(entity).map(|p| p.0), Some(2.0));
//! ```

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

// Core types

pub use engine::types::{
    ArchetypeId,
    ColumnId,
    DataTypeId,
    Entity,
    Signature,
};

pub use engine::registry::{DataKind, RelationFlags, Types};
pub use engine::storage::{AnyValue, TypeOps};
pub use engine::world::World;

// Queries

pub use engine::query::{
    Down,
    Query,
    QueryData,
    QueryFilter,
    QueryTerm,
    QueryView,
    ReadOnlyQueryData,
    Traversal,
    Up,
};

// Structural changes

pub use engine::observers::{Observer, ObserverEvent, ObserverId};
pub use engine::commands::{Command, CommandBuffer, Commands};
pub use engine::blueprint::{Blueprint, MapEntities, SpawnedBlueprint};

// Execution

pub use engine::systems::{Condition, FnSystem, System, SystemInfo};
pub use engine::scheduler::Stage;
pub use engine::dispatcher::{Dispatcher, SystemId, TagId};
pub use engine::app::App;

pub use engine::config::{DispatcherConfig, WorldConfig};

pub use engine::error::{
    DispatcherError,
    ECSError,
    ECSResult,
    RegistryError,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used types.
///
/// Import with:
/// ```rust
/// use relecs::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        App,
        Blueprint,
        CommandBuffer,
        Commands,
        Dispatcher,
        Down,
        Entity,
        FnSystem,
        Query,
        QueryTerm,
        QueryView,
        System,
        SystemInfo,
        Up,
        World,
    };
}
