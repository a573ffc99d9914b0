//! # Blueprints
//!
//! A [`Blueprint`] is a named collection of template entities with cloneable
//! components and relations. Spawning it through
//! [`Commands::spawn`](crate::engine::commands::Commands::spawn) reserves one
//! world entity per template entity and records commands adding clones of
//! every value.
//!
//! ## Entity handles
//!
//! Template entities are blueprint-local handles (`index` = creation order,
//! generation 0). They only have meaning inside their blueprint. Values that
//! store entity handles can opt into remapping by implementing
//! [`MapEntities`] and being added with [`Blueprint::add_mapped`] or
//! [`Blueprint::relate_mapped`]; their handles are then translated to the
//! spawned entities. Null handles are left untouched.
//!
//! ## Names
//!
//! Entity names consist of lowercase ASCII letters, digits and `-`. Merging a
//! blueprint into another prefixes the merged names with `prefix.`, so merged
//! names are paths such as `car.wheel-1`.

use std::collections::HashMap;

use crate::engine::commands::CommandBuffer;
use crate::engine::storage::AnyValue;
use crate::engine::types::Entity;


/// Values holding entity handles that must follow their entities when copied
/// into another context.
pub trait MapEntities {
    /// Replaces every stored handle `e` with `map(e)`.
    fn map_entities(&mut self, map: &mut dyn FnMut(Entity) -> Entity);
}

impl MapEntities for Entity {
    fn map_entities(&mut self, map: &mut dyn FnMut(Entity) -> Entity) {
        *self = map(*self);
    }
}

impl<T: MapEntities> MapEntities for Vec<T> {
    fn map_entities(&mut self, map: &mut dyn FnMut(Entity) -> Entity) {
        for item in self {
            item.map_entities(map);
        }
    }
}

impl<T: MapEntities> MapEntities for Option<T> {
    fn map_entities(&mut self, map: &mut dyn FnMut(Entity) -> Entity) {
        if let Some(item) = self {
            item.map_entities(map);
        }
    }
}

/// Returns `true` if `name` is a valid blueprint entity name.
pub fn valid_entity_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Template of a group of entities.
#[derive(Debug, Default)]
pub struct Blueprint {
    names: Vec<String>,
    by_name: HashMap<String, Entity>,
    components: Vec<(Entity, AnyValue)>,
    relations: Vec<(Entity, Entity, AnyValue)>,
}

impl Blueprint {
    /// Creates an empty blueprint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a template entity.
    ///
    /// # Panics
    /// If the name is invalid or already used.
    pub fn create(&mut self, name: &str) -> Entity {
        if !valid_entity_name(name) {
            log::error!("blueprint entity name `{}` is invalid", name);
            panic!("invalid blueprint entity name `{}`", name);
        }
        self.insert_name(name.to_string())
    }

    fn insert_name(&mut self, name: String) -> Entity {
        if self.by_name.contains_key(&name) {
            log::error!("blueprint already has an entity named `{}`", name);
            panic!("duplicate blueprint entity name `{}`", name);
        }
        let entity = Entity::new(self.names.len() as u32, 0);
        self.by_name.insert(name.clone(), entity);
        self.names.push(name);
        entity
    }

    fn check_entity(&self, entity: Entity) {
        if entity.generation != 0 || entity.index as usize >= self.names.len() {
            log::error!("entity {} does not belong to the blueprint", entity);
            panic!("entity {} was not created by this blueprint", entity);
        }
    }

    /// Adds (or replaces) a component of a template entity.
    pub fn add<T: Clone + Send + Sync + 'static>(&mut self, entity: Entity, value: T) -> &mut Self {
        self.add_value(entity, AnyValue::cloneable(value))
    }

    /// Adds a component whose entity handles are remapped on spawn.
    pub fn add_mapped<T: Clone + MapEntities + Send + Sync + 'static>(&mut self, entity: Entity, value: T) -> &mut Self {
        self.add_value(entity, AnyValue::mapped(value))
    }

    /// Adds a type-erased component.
    ///
    /// # Panics
    /// If the entity is not a template entity or the value is not cloneable.
    pub fn add_value(&mut self, entity: Entity, value: AnyValue) -> &mut Self {
        self.check_entity(entity);
        assert!(value.ops().is_cloneable(), "blueprint component `{}` must be cloneable", value.ops().name());
        let type_id = value.type_id();
        self.components.retain(|(e, v)| !(*e == entity && v.type_id() == type_id));
        self.components.push((entity, value));
        self
    }

    /// Relates two template entities (replacing an existing edge).
    pub fn relate<T: Clone + Send + Sync + 'static>(&mut self, from: Entity, to: Entity, value: T) -> &mut Self {
        self.relate_value(from, to, AnyValue::cloneable(value))
    }

    /// Relates two template entities with a value whose entity handles are
    /// remapped on spawn.
    pub fn relate_mapped<T: Clone + MapEntities + Send + Sync + 'static>(
        &mut self,
        from: Entity,
        to: Entity,
        value: T,
    ) -> &mut Self {
        self.relate_value(from, to, AnyValue::mapped(value))
    }

    /// Relates two template entities with a type-erased value.
    ///
    /// # Panics
    /// If either entity is not a template entity or the value is not
    /// cloneable.
    pub fn relate_value(&mut self, from: Entity, to: Entity, value: AnyValue) -> &mut Self {
        self.check_entity(from);
        self.check_entity(to);
        assert!(value.ops().is_cloneable(), "blueprint relation `{}` must be cloneable", value.ops().name());
        let type_id = value.type_id();
        self.relations
            .retain(|(f, t, v)| !(*f == from && *t == to && v.type_id() == type_id));
        self.relations.push((from, to, value));
        self
    }

    /// Template entity named `name`.
    pub fn entity(&self, name: &str) -> Option<Entity> {
        self.by_name.get(name).copied()
    }

    /// Name of a template entity.
    pub fn name(&self, entity: Entity) -> Option<&str> {
        self.names.get(entity.index as usize).map(String::as_str)
    }

    /// Iterates over the template entities and their names.
    pub fn entities(&self) -> impl Iterator<Item = (Entity, &str)> + '_ {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (Entity::new(i as u32, 0), name.as_str()))
    }

    /// Number of template entities.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if the blueprint has no entities.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Copies every entity of `other` into this blueprint, naming them
    /// `prefix.name`.
    ///
    /// # Panics
    /// If the prefix is invalid or was already merged.
    pub fn merge(&mut self, prefix: &str, other: &Blueprint) -> &mut Self {
        if !valid_entity_name(prefix) {
            log::error!("blueprint prefix `{}` is invalid", prefix);
            panic!("invalid blueprint prefix `{}`", prefix);
        }
        let mapping: Vec<Entity> = other
            .names
            .iter()
            .map(|name| self.insert_name(format!("{}.{}", prefix, name)))
            .collect();

        let mut remap = |entity: Entity| remap_handle(&mapping, entity);
        for (entity, value) in &other.components {
            let copy = clone_mapped(value, &mut remap);
            self.components.push((mapping[entity.index as usize], copy));
        }
        for (from, to, value) in &other.relations {
            let copy = clone_mapped(value, &mut remap);
            self.relations
                .push((mapping[from.index as usize], mapping[to.index as usize], copy));
        }
        self
    }

    /// Removes every entity.
    pub fn clear(&mut self) {
        self.names.clear();
        self.by_name.clear();
        self.components.clear();
        self.relations.clear();
    }

    /// Records commands creating a copy of every template entity.
    pub(crate) fn instantiate(&self, buffer: &mut CommandBuffer) -> SpawnedBlueprint {
        let spawned: Vec<Entity> = self.names.iter().map(|_| buffer.create()).collect();

        let mut remap = |entity: Entity| remap_handle(&spawned, entity);
        for (entity, value) in &self.components {
            buffer.add_value(spawned[entity.index as usize], clone_mapped(value, &mut remap));
        }
        for (from, to, value) in &self.relations {
            buffer.relate_value(
                spawned[from.index as usize],
                spawned[to.index as usize],
                clone_mapped(value, &mut remap),
            );
        }
        log::debug!("spawned blueprint with {} entities", spawned.len());

        SpawnedBlueprint {
            entities: self.names.iter().cloned().zip(spawned).collect(),
        }
    }
}

fn remap_handle(mapping: &[Entity], entity: Entity) -> Entity {
    if entity.is_null() {
        return entity;
    }
    match mapping.get(entity.index as usize) {
        Some(mapped) if entity.generation == 0 => *mapped,
        _ => {
            log::error!("blueprint value references entity {} outside the blueprint", entity);
            panic!("entity {} does not belong to the blueprint", entity);
        }
    }
}

fn clone_mapped(value: &AnyValue, remap: &mut dyn FnMut(Entity) -> Entity) -> AnyValue {
    let Some(mut copy) = value.try_clone() else {
        panic!("blueprint value `{}` is not cloneable", value.ops().name());
    };
    copy.map_entities(remap);
    copy
}

/// Entities spawned from a blueprint, by template name.
#[derive(Clone, Debug, Default)]
pub struct SpawnedBlueprint {
    entities: HashMap<String, Entity>,
}

impl SpawnedBlueprint {
    /// Spawned entity of the template named `name`.
    pub fn get(&self, name: &str) -> Option<Entity> {
        self.entities.get(name).copied()
    }

    /// Spawned entity of the template named `name`.
    ///
    /// # Panics
    /// If the blueprint had no entity with that name.
    pub fn entity(&self, name: &str) -> Entity {
        match self.get(name) {
            Some(entity) => entity,
            None => panic!("spawned blueprint has no entity named `{}`", name),
        }
    }

    /// Iterates over the spawned entities and their template names.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Entity)> + '_ {
        self.entities.iter().map(|(name, entity)| (name.as_str(), *entity))
    }

    /// Number of spawned entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if nothing was spawned.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
