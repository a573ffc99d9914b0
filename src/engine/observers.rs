//! # Observers
//!
//! Observers are callbacks hooked to a structural event on one column:
//!
//! | Event | Fires when |
//! |---|---|
//! | [`ObserverEvent::Add`] | a component is added or overwritten |
//! | [`ObserverEvent::Remove`] | a component the entity had is removed |
//! | [`ObserverEvent::Destroy`] | an entity is destroyed, once per component it had |
//! | [`ObserverEvent::Relate`] | an edge of a relation is inserted or overwritten |
//! | [`ObserverEvent::Unrelate`] | an existing edge of a relation is removed |
//!
//! For relation events the observed entity is the edge's `from` entity.
//!
//! ## Execution model
//!
//! Events are only produced by [`CommandBuffer::commit`]. Every command of a
//! batch is applied first, then the events of the batch run as one *wave* in
//! the order they were produced. Commands issued by the hooks of a wave form
//! the next batch. Waves continue until no commands are left, or abort with a
//! panic once [`WorldConfig::observer_wave_limit`] is exceeded.
//!
//! Hooks of the same column run in registration order.
//!
//! ## Unhooking
//!
//! Hooks live in slots. While a hook runs its closure is taken out of the
//! slot, so it can receive `&mut World`; it is put back only if the slot was
//! not unhooked in the meantime. Unhooking therefore takes effect
//! immediately, even from inside another hook of the same wave.
//!
//! [`CommandBuffer::commit`]: crate::engine::commands::CommandBuffer::commit
//! [`WorldConfig::observer_wave_limit`]: crate::engine::config::WorldConfig::observer_wave_limit

use std::collections::HashMap;

use crate::engine::commands::{CommandBuffer, Commands};
use crate::engine::types::{ColumnId, Entity};
use crate::engine::world::World;


/// Structural event an observer reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObserverEvent {
    /// Component added or overwritten.
    Add,
    /// Component removed.
    Remove,
    /// Entity destroyed.
    Destroy,
    /// Relation edge inserted or overwritten.
    Relate,
    /// Relation edge removed.
    Unrelate,
}

/// Handle of a hooked observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub usize);

type ObserverFn = Box<dyn FnMut(&mut World, Entity, &mut Commands<'_>) + Send>;

/// A named observer callback.
pub struct Observer {
    name: String,
    run: ObserverFn,
}

impl Observer {
    /// Wraps a callback receiving the world, the observed entity and the
    /// commands of the current wave.
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: FnMut(&mut World, Entity, &mut Commands<'_>) + Send + 'static,
    {
        Self { name: name.into(), run: Box::new(f) }
    }

    /// Name of the observer.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer").field("name", &self.name).finish()
    }
}

struct Slot {
    observer: Option<Observer>,
    alive: bool,
}

/// Registry of observer hooks.
#[derive(Default)]
pub struct Observers {
    slots: Vec<Slot>,
    hooks: HashMap<(ObserverEvent, ColumnId), Vec<ObserverId>>,
}

impl Observers {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hooks an observer to `event` on `column`.
    pub fn hook(&mut self, event: ObserverEvent, column: ColumnId, observer: Observer) -> ObserverId {
        let id = ObserverId(self.slots.len());
        log::debug!("hooked observer `{}` to {:?} on {:?}", observer.name, event, column);
        self.slots.push(Slot { observer: Some(observer), alive: true });
        self.hooks.entry((event, column)).or_default().push(id);
        id
    }

    /// Hooks an observer to component additions.
    pub fn hook_on_add(&mut self, column: ColumnId, observer: Observer) -> ObserverId {
        self.hook(ObserverEvent::Add, column, observer)
    }

    /// Hooks an observer to component removals.
    pub fn hook_on_remove(&mut self, column: ColumnId, observer: Observer) -> ObserverId {
        self.hook(ObserverEvent::Remove, column, observer)
    }

    /// Hooks an observer to the destruction of entities with the component.
    pub fn hook_on_destroy(&mut self, column: ColumnId, observer: Observer) -> ObserverId {
        self.hook(ObserverEvent::Destroy, column, observer)
    }

    /// Hooks an observer to relation insertions.
    pub fn hook_on_relate(&mut self, column: ColumnId, observer: Observer) -> ObserverId {
        self.hook(ObserverEvent::Relate, column, observer)
    }

    /// Hooks an observer to relation removals.
    pub fn hook_on_unrelate(&mut self, column: ColumnId, observer: Observer) -> ObserverId {
        self.hook(ObserverEvent::Unrelate, column, observer)
    }

    /// Removes an observer. Returns `false` if it was already removed.
    pub fn unhook(&mut self, id: ObserverId) -> bool {
        let Some(slot) = self.slots.get_mut(id.0) else {
            return false;
        };
        if !slot.alive {
            return false;
        }
        slot.alive = false;
        slot.observer = None;
        for ids in self.hooks.values_mut() {
            ids.retain(|hooked| *hooked != id);
        }
        true
    }

    /// Returns `true` if the observer is still hooked.
    pub fn is_hooked(&self, id: ObserverId) -> bool {
        self.slots.get(id.0).map_or(false, |slot| slot.alive)
    }

    /// Number of hooked observers.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.alive).count()
    }

    /// Returns `true` if no observer is hooked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every hook of `event` on `column` for `entity`. Commands issued
    /// by the hooks are pushed into `buffer`. Returns `true` if at least one
    /// hook ran.
    pub fn notify(
        world: &mut World,
        buffer: &mut CommandBuffer,
        event: ObserverEvent,
        entity: Entity,
        column: ColumnId,
    ) -> bool {
        let Some(ids) = world.observers().hooks.get(&(event, column)).cloned() else {
            return false;
        };

        let mut triggered = false;
        for id in ids {
            let Some(mut observer) = world.observers_mut().take(id) else {
                continue;
            };
            log::trace!("running observer `{}` for {:?} on {}", observer.name, event, entity);
            {
                let mut commands = Commands::new(buffer);
                (observer.run)(world, entity, &mut commands);
            }
            world.observers_mut().restore(id, observer);
            triggered = true;
        }
        triggered
    }

    fn take(&mut self, id: ObserverId) -> Option<Observer> {
        let slot = self.slots.get_mut(id.0)?;
        if !slot.alive {
            return None;
        }
        slot.observer.take()
    }

    fn restore(&mut self, id: ObserverId, observer: Observer) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            if slot.alive {
                slot.observer = Some(observer);
            }
        }
    }

    /// Removes every hook.
    pub fn reset(&mut self) {
        self.slots.clear();
        self.hooks.clear();
    }
}
