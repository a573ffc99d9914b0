//! Entity allocation and liveness tracking.
//!
//! Two structures cooperate:
//!
//! * [`EntityReserver`] hands out entity handles. It is shared (behind an
//!   `Arc<Mutex<_>>`) between the world and every command buffer created from
//!   it, so systems can obtain the handle of an entity they are about to
//!   create without touching the world.
//! * [`EntityPool`] is owned by the world and records which reserved handles
//!   have been materialized, their archetype, and their current generation.
//!
//! A reserved entity is not alive until the world materializes it. Destroying
//! an entity bumps its slot's generation and returns the index to the
//! reserver's free list.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::engine::types::{ArchetypeId, Entity, GenerationID, IndexID, NULL_INDEX};


#[derive(Default)]
struct Allocator {
    next_index: IndexID,
    free: Vec<(IndexID, GenerationID)>,
}

/// Thread-safe source of entity handles.
#[derive(Clone, Default)]
pub struct EntityReserver {
    inner: Arc<Mutex<Allocator>>,
}

impl EntityReserver {
    fn lock(&self) -> MutexGuard<'_, Allocator> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserves a new entity handle.
    ///
    /// # Panics
    /// If the index space is exhausted.
    pub fn reserve(&self) -> Entity {
        let mut allocator = self.lock();
        if let Some((index, generation)) = allocator.free.pop() {
            return Entity::new(index, generation);
        }
        let index = allocator.next_index;
        if index == NULL_INDEX {
            log::error!("entity index space exhausted");
            panic!("no entity indices left");
        }
        allocator.next_index += 1;
        Entity::new(index, 0)
    }

    fn release(&self, index: IndexID, next_generation: GenerationID) {
        self.lock().free.push((index, next_generation));
    }

    fn reset(&self) {
        let mut allocator = self.lock();
        allocator.next_index = 0;
        allocator.free.clear();
    }
}

impl std::fmt::Debug for EntityReserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let allocator = self.lock();
        f.debug_struct("EntityReserver")
            .field("next_index", &allocator.next_index)
            .field("free", &allocator.free.len())
            .finish()
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    generation: GenerationID,
    archetype: Option<ArchetypeId>,
}

/// Liveness and archetype of every materialized entity.
#[derive(Debug, Default)]
pub struct EntityPool {
    reserver: EntityReserver,
    slots: Vec<Slot>,
    alive: usize,
}

impl EntityPool {
    /// Creates a pool with room for `capacity` entities.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            reserver: EntityReserver::default(),
            slots: Vec::with_capacity(capacity),
            alive: 0,
        }
    }

    /// Handle to the shared reserver.
    pub fn reserver(&self) -> &EntityReserver {
        &self.reserver
    }

    /// Reserves a handle without materializing it.
    pub fn reserve(&self) -> Entity {
        self.reserver.reserve()
    }

    /// Materializes a reserved handle in `archetype`.
    ///
    /// Returns `false` if the handle is already alive or stale.
    pub fn materialize(&mut self, entity: Entity, archetype: ArchetypeId) -> bool {
        let index = entity.index as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, Slot::default());
        }
        let slot = &mut self.slots[index];
        if slot.archetype.is_some() || slot.generation != entity.generation {
            return false;
        }
        slot.archetype = Some(archetype);
        self.alive += 1;
        true
    }

    /// Releases a live entity, bumping its generation.
    ///
    /// Returns `false` if the handle was not alive.
    pub fn release(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let slot = &mut self.slots[entity.index as usize];
        slot.archetype = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.alive -= 1;
        self.reserver.release(entity.index, slot.generation);
        true
    }

    /// Returns `true` if the handle refers to a materialized, live entity.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.index as usize)
            .map_or(false, |slot| slot.archetype.is_some() && slot.generation == entity.generation)
    }

    /// Archetype of a live entity.
    #[inline]
    pub fn archetype(&self, entity: Entity) -> Option<ArchetypeId> {
        if self.is_alive(entity) {
            self.slots[entity.index as usize].archetype
        } else {
            None
        }
    }

    /// Moves a live entity to another archetype.
    pub fn set_archetype(&mut self, entity: Entity, archetype: ArchetypeId) {
        debug_assert!(self.is_alive(entity));
        self.slots[entity.index as usize].archetype = Some(archetype);
    }

    /// Live handle currently occupying `index`, if any.
    pub fn entity_at(&self, index: IndexID) -> Option<Entity> {
        self.slots
            .get(index as usize)
            .filter(|slot| slot.archetype.is_some())
            .map(|slot| Entity::new(index, slot.generation))
    }

    /// Number of live entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.alive
    }

    /// Returns `true` if no entity is alive.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.alive == 0
    }

    /// Iterates over every live entity in index order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            slot.archetype.map(|_| Entity::new(i as IndexID, slot.generation))
        })
    }

    /// Forgets every entity and restarts index allocation.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.alive = 0;
        self.reserver.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_slots_are_reused_with_a_new_generation() {
        let mut pool = EntityPool::with_capacity(4);
        let a = pool.reserve();
        assert!(!pool.is_alive(a));
        assert!(pool.materialize(a, ArchetypeId::EMPTY));
        assert!(pool.is_alive(a));

        assert!(pool.release(a));
        assert!(!pool.release(a));

        let b = pool.reserve();
        assert_eq!(b.index, a.index);
        assert_ne!(b.generation, a.generation);
        assert!(!pool.materialize(a, ArchetypeId::EMPTY));
        assert!(pool.materialize(b, ArchetypeId::EMPTY));
        assert_eq!(pool.iter().collect::<Vec<_>>(), vec![b]);
    }
}
