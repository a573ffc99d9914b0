//! Runtime configuration.
//!
//! Both configuration structs are plain values with sensible defaults and
//! `with_*` setters, so they can be built inline or loaded from a file when
//! the `serde` feature is enabled.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};


/// Default number of entity slots reserved up front.
pub const DEFAULT_ENTITY_CAPACITY: usize = 1024;

/// Default maximum number of observer waves processed by a single commit.
pub const DEFAULT_OBSERVER_WAVE_LIMIT: usize = 1024;

/// Settings of a [`World`](crate::engine::world::World).

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WorldConfig {
    /// Number of entity slots reserved when the world is created.
    pub entity_capacity: usize,

    /// Maximum number of breadth-first observer waves a single commit may
    /// run. Exceeding it means observers keep triggering each other, which is
    /// treated as a contract violation.
    pub observer_wave_limit: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            entity_capacity: DEFAULT_ENTITY_CAPACITY,
            observer_wave_limit: DEFAULT_OBSERVER_WAVE_LIMIT,
        }
    }
}

impl WorldConfig {
    /// Sets the initial entity capacity.
    pub fn with_entity_capacity(mut self, capacity: usize) -> Self {
        self.entity_capacity = capacity;
        self
    }

    /// Sets the observer wave limit.
    pub fn with_observer_wave_limit(mut self, limit: usize) -> Self {
        self.observer_wave_limit = limit;
        self
    }
}

/// Settings of a [`Dispatcher`](crate::engine::dispatcher::Dispatcher).

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DispatcherConfig {
    /// Reject chains where two systems with conflicting data access have no
    /// ordering constraint between them. When unset, such pairs are only
    /// logged as warnings.
    pub strict_access: bool,
}

impl DispatcherConfig {
    /// Enables or disables strict access checking.
    pub fn with_strict_access(mut self, strict: bool) -> Self {
        self.strict_access = strict;
        self
    }
}
