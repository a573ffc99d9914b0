//! Error types for registration and dispatch.
//!
//! The runtime distinguishes three kinds of failure:
//!
//! * **Contract violations** (using a destroyed entity, indexing past a table,
//!   pinning a query target twice, relating entities into a tree cycle). These
//!   indicate a bug in the calling code and abort with a panic after logging
//!   at `error` level. They never appear here.
//! * **Expected absence** (looking up an unknown type name, querying a
//!   component the entity does not have). These are `Option`/`bool` results.
//! * **Declaration conflicts**, detected while the schema and the system graph
//!   are assembled. These are the errors of this module.
//!
//! ## Typical flow
//! Low-level modules ([`Types`](crate::engine::registry::Types),
//! [`Dispatcher`](crate::engine::dispatcher::Dispatcher)) return their focused
//! error type. Code that drives several of them uses `?` to bubble failures
//! into [`ECSError`]:
//!
//! ```ignore
//! fn build(world: &mut World, dispatcher: &mut Dispatcher) -> ECSResult<()> {
//!     world.register_component::<Position>()?;
//!     dispatcher.compile_chain()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Display vs. Debug
//! * `Display` (generated by `thiserror`) is short and meant for logs.
//! * `Debug` (derived) keeps the full structure for diagnostics.

use thiserror::Error;

use crate::engine::types::DataTypeId;


/// Failure to register a data type.

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The Rust type already has an id.
    #[error("type `{name}` is already registered as {existing:?}")]
    AlreadyRegistered {
        /// Name of the type.
        name: String,
        /// Id it was registered with.
        existing: DataTypeId,
    },

    /// Another type was registered under the same name.
    #[error("a different type is already registered under the name `{name}`")]
    NameTaken {
        /// Conflicting name.
        name: String,
    },

    /// A relation was declared both symmetric and tree.
    #[error("relation `{name}` cannot be both symmetric and a tree")]
    SymmetricTree {
        /// Name of the relation type.
        name: String,
    },
}

/// Failure to compile the dispatcher's system chain.

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatcherError {
    /// The ordering constraints between systems and tags form a cycle.
    #[error("cycle detected in the system chain while visiting `{node}`")]
    Cycle {
        /// Name of the system or tag closing the cycle.
        node: String,
    },

    /// A tag inherits from itself, directly or transitively.
    #[error("tag `{tag}` inherits from itself")]
    InheritanceCycle {
        /// Tag closing the inheritance cycle.
        tag: String,
    },

    /// A system declares an impossible access set.
    #[error("system `{system}` declares an invalid access set")]
    InvalidSystem {
        /// Name of the offending system.
        system: String,
    },

    /// Two systems with conflicting access have no ordering between them.
    #[error("systems `{first}` and `{second}` conflict on data access but are not ordered")]
    UnorderedConflict {
        /// First system of the pair.
        first: String,
        /// Second system of the pair.
        second: String,
    },

    /// A system belongs to two repeating groups, neither nested in the other.
    #[error("system `{system}` belongs to unrelated repeating tags `{first}` and `{second}`")]
    ConflictingGroups {
        /// Name of the offending system.
        system: String,
        /// First repeating tag.
        first: String,
        /// Second repeating tag.
        second: String,
    },
}

/// Aggregate error for code that drives several engine subsystems.

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ECSError {
    /// Registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Chain compilation failed.
    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),
}

/// Convenient alias for results carrying an [`ECSError`].
pub type ECSResult<T> = Result<T, ECSError>;
