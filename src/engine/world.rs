//! # World
//!
//! The [`World`] owns every piece of runtime state: the type registry, the
//! entity pool, the archetype graph, the dense and sparse tables, the
//! resources and the observers.
//!
//! ## Structural changes
//!
//! Adding or removing a component moves the entity's row from the table of
//! its current archetype to the table of the archetype reached through
//! [`ArchetypeGraph::with`] / [`ArchetypeGraph::without`]. Re-adding a
//! component the entity already has overwrites the value in place.
//!
//! ## Relations
//!
//! Relation edges live in sparse tables addressed by
//! [`SparseRelationTableId`]. Symmetric relations are stored once, with the
//! lower entity index as `from`. Tree relations are layered by depth: the edge
//! `child -> parent` is stored in layer `depth(parent)`, where roots have depth
//! zero. Re-parenting an entity therefore moves every edge of its subtree to
//! its new layer.
//!
//! ## Contract violations
//!
//! Mutating a dead entity, using an unregistered type, or relating entities
//! into a tree cycle are bugs in the caller and panic after logging at `error`
//! level. Reads on dead entities return `None`.

use std::any::TypeId;
use std::collections::HashMap;

use rayon::prelude::*;

use crate::engine::archetype::ArchetypeGraph;
use crate::engine::config::WorldConfig;
use crate::engine::entity::{EntityPool, EntityReserver};
use crate::engine::error::RegistryError;
use crate::engine::observers::Observers;
use crate::engine::registry::{DataKind, RelationFlags, Types};
use crate::engine::storage::{AnyValue, TypeOps};
use crate::engine::table::{DenseTable, SparseRelationTableId, Tables};
use crate::engine::types::{ArchetypeId, ColumnId, DataTypeId, Entity};


/// Container of all entities, their data, resources and observers.
pub struct World {
    config: WorldConfig,
    types: Types,
    entities: EntityPool,
    archetypes: ArchetypeGraph,
    tables: Tables,
    resources: HashMap<DataTypeId, AnyValue>,
    observers: Observers,
    epoch: u64,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Creates an empty world with the default configuration.
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    /// Creates an empty world.
    pub fn with_config(config: WorldConfig) -> Self {
        let mut tables = Tables::new();
        tables.dense_or_create(ArchetypeId::EMPTY, std::iter::empty(), &Types::new());
        Self {
            entities: EntityPool::with_capacity(config.entity_capacity),
            config,
            types: Types::new(),
            archetypes: ArchetypeGraph::new(),
            tables,
            resources: HashMap::new(),
            observers: Observers::new(),
            epoch: 0,
        }
    }

    /// Configuration of the world.
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    // ── Registration ───────────────────────────────────────────────────────

    /// Registers `T` as a component.
    pub fn register_component<T: Send + Sync + 'static>(&mut self) -> Result<DataTypeId, RegistryError> {
        self.types.add_component(TypeOps::of::<T>())
    }

    /// Registers a component described by `ops`.
    pub fn register_component_with(&mut self, ops: TypeOps) -> Result<DataTypeId, RegistryError> {
        self.types.add_component(ops)
    }

    /// Registers `T` as a directed relation.
    pub fn register_relation<T: Send + Sync + 'static>(&mut self) -> Result<DataTypeId, RegistryError> {
        self.types.add_relation(TypeOps::of::<T>(), RelationFlags::DIRECTED)
    }

    /// Registers `T` as a symmetric relation.
    pub fn register_symmetric_relation<T: Send + Sync + 'static>(&mut self) -> Result<DataTypeId, RegistryError> {
        self.types.add_relation(TypeOps::of::<T>(), RelationFlags::SYMMETRIC)
    }

    /// Registers `T` as a tree relation.
    pub fn register_tree_relation<T: Send + Sync + 'static>(&mut self) -> Result<DataTypeId, RegistryError> {
        self.types.add_relation(TypeOps::of::<T>(), RelationFlags::TREE)
    }

    /// Registers `T` as a resource.
    pub fn register_resource<T: Send + Sync + 'static>(&mut self) -> Result<DataTypeId, RegistryError> {
        self.types.add_resource(TypeOps::of::<T>())
    }

    /// The type registry.
    #[inline]
    pub fn types(&self) -> &Types {
        &self.types
    }

    fn expect_kind(&self, type_id: TypeId, name: &str, wanted: &str, is_kind: impl Fn(&Types, DataTypeId) -> bool) -> DataTypeId {
        match self.types.id(type_id) {
            Some(id) if is_kind(&self.types, id) => id,
            Some(id) => {
                log::error!("`{}` is registered as {:?}, not as a {}", name, self.types.kind(id), wanted);
                panic!("type `{}` is not a {}", name, wanted);
            }
            None => {
                log::error!("`{}` was used as a {} without being registered", name, wanted);
                panic!("type `{}` is not registered", name);
            }
        }
    }

    fn component_id(&self, type_id: TypeId, name: &str) -> DataTypeId {
        self.expect_kind(type_id, name, "component", Types::is_component)
    }

    fn relation_id(&self, type_id: TypeId, name: &str) -> DataTypeId {
        self.expect_kind(type_id, name, "relation", Types::is_relation)
    }

    // ── Entities ───────────────────────────────────────────────────────────

    /// Handle to the shared entity reserver.
    pub fn reserver(&self) -> &EntityReserver {
        self.entities.reserver()
    }

    /// Reserves an entity handle without creating the entity.
    pub fn reserve(&self) -> Entity {
        self.entities.reserve()
    }

    /// Creates a new entity without components.
    pub fn create(&mut self) -> Entity {
        let entity = self.entities.reserve();
        self.materialize(entity);
        entity
    }

    /// Creates a previously reserved entity. Returns `false` if it is already
    /// alive or its handle is stale.
    pub fn materialize(&mut self, entity: Entity) -> bool {
        if !self.entities.materialize(entity, ArchetypeId::EMPTY) {
            return false;
        }
        self.tables
            .dense_or_create(ArchetypeId::EMPTY, std::iter::empty(), &self.types)
            .push_back(entity);
        log::trace!("created entity {}", entity);
        true
    }

    /// Destroys an entity, its components and every relation touching it.
    ///
    /// Children of a destroyed tree node become roots. Returns `false` if the
    /// entity was not alive.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        let Some(archetype) = self.entities.archetype(entity) else {
            log::debug!("entity {} does not exist", entity);
            return false;
        };

        let relations: Vec<DataTypeId> = self.tables.relation_types().collect();
        for data_type in relations {
            if self.types.is_tree_relation(data_type) {
                self.detach_tree_node(data_type, entity);
            } else {
                for layer in self.tables.relation_layers_mut(data_type) {
                    layer.erase_from(entity);
                    layer.erase_to(entity);
                }
            }
        }

        if let Some(table) = self.tables.dense_mut(archetype) {
            if let Some(row) = table.row(entity.index) {
                table.swap_erase(row);
            }
        }
        self.entities.release(entity);
        log::trace!("destroyed entity {}", entity);
        true
    }

    /// Returns `true` if the handle refers to a live entity.
    #[inline]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Archetype of a live entity.
    #[inline]
    pub fn archetype(&self, entity: Entity) -> Option<ArchetypeId> {
        self.entities.archetype(entity)
    }

    /// Archetype and dense row of a live entity.
    pub fn location(&self, entity: Entity) -> Option<(ArchetypeId, usize)> {
        let archetype = self.entities.archetype(entity)?;
        let row = self.tables.dense(archetype)?.row(entity.index)?;
        Some((archetype, row))
    }

    /// Live handle currently using slot `index`.
    pub fn entity_at(&self, index: u32) -> Option<Entity> {
        self.entities.entity_at(index)
    }

    /// Number of live entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entity is alive.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterates over every live entity in index order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter()
    }

    fn expect_alive(&self, entity: Entity, action: &str) -> ArchetypeId {
        match self.entities.archetype(entity) {
            Some(archetype) => archetype,
            None => {
                log::error!("tried to {} on dead entity {}", action, entity);
                panic!("entity {} is not alive", entity);
            }
        }
    }

    // ── Components ─────────────────────────────────────────────────────────

    /// Adds (or overwrites) a component.
    ///
    /// # Panics
    /// If the entity is dead or `T` is not a registered component.
    pub fn add<T: Send + Sync + 'static>(&mut self, entity: Entity, value: T) -> &mut Self {
        self.add_value(entity, AnyValue::new(value));
        self
    }

    /// Adds (or overwrites) a type-erased component and returns its column.
    ///
    /// # Panics
    /// If the entity is dead or the value's type is not a registered component.
    pub fn add_value(&mut self, entity: Entity, value: AnyValue) -> ColumnId {
        let data_type = self.component_id(value.type_id(), value.ops().name());
        let column = ColumnId::make(data_type);
        let archetype = self.expect_alive(entity, "add a component");

        if self.archetypes.contains(archetype, column) {
            let table = self.dense_table_of(archetype);
            let Some(row) = table.row(entity.index) else {
                panic!("entity {} has no row in its archetype table", entity);
            };
            value.move_into_row(table.column_mut(column), row);
            log::trace!("overwrote `{}` on entity {}", self.types.name(data_type), entity);
            return column;
        }

        let target = self.archetypes.with(archetype, column);
        self.move_entity(entity, archetype, target);
        let table = self.dense_table_of(target);
        value.move_into(table.column_mut(column));
        self.entities.set_archetype(entity, target);
        log::trace!("added `{}` to entity {}", self.types.name(data_type), entity);
        column
    }

    /// Removes a component. Returns `false` if the entity did not have it.
    ///
    /// # Panics
    /// If the entity is dead or `T` is not a registered component.
    pub fn remove<T: 'static>(&mut self, entity: Entity) -> bool {
        let data_type = self.component_id(TypeId::of::<T>(), std::any::type_name::<T>());
        self.remove_column(entity, ColumnId::make(data_type))
    }

    /// Removes the component with the given Rust type id.
    pub fn remove_type(&mut self, entity: Entity, type_id: TypeId) -> Option<ColumnId> {
        let data_type = self.component_id(type_id, "<erased>");
        let column = ColumnId::make(data_type);
        self.remove_column(entity, column).then_some(column)
    }

    /// Removes the component stored in `column`. Returns `false` if the
    /// entity did not have it.
    pub fn remove_column(&mut self, entity: Entity, column: ColumnId) -> bool {
        let archetype = self.expect_alive(entity, "remove a component");
        if !self.archetypes.contains(archetype, column) {
            return false;
        }
        let target = self.archetypes.without(archetype, column);
        self.move_entity(entity, archetype, target);
        self.entities.set_archetype(entity, target);
        log::trace!("removed `{}` from entity {}", self.types.name(column.data_type()), entity);
        true
    }

    fn dense_table_of(&mut self, archetype: ArchetypeId) -> &mut DenseTable {
        self.tables
            .dense_or_create(archetype, self.archetypes.columns(archetype), &self.types)
    }

    /// Moves the entity's row between two archetype tables. Columns only
    /// present in `to` are left for the caller to fill.
    fn move_entity(&mut self, entity: Entity, from: ArchetypeId, to: ArchetypeId) {
        self.dense_table_of(to);
        let (source, target) = self.tables.dense_pair_mut(from, to);
        let Some(row) = source.row(entity.index) else {
            panic!("entity {} has no row in archetype {:?}", entity, from);
        };
        source.swap_move(row, target);
    }

    /// Reference to a component, if the entity is alive and has it.
    pub fn get<T: 'static>(&self, entity: Entity) -> Option<&T> {
        let column = ColumnId::make(self.component_id(TypeId::of::<T>(), std::any::type_name::<T>()));
        let (archetype, row) = self.location(entity)?;
        let table = self.tables.dense(archetype)?;
        Some(table.try_column(column)?.get::<T>(row))
    }

    /// Mutable reference to a component, if the entity is alive and has it.
    pub fn get_mut<T: 'static>(&mut self, entity: Entity) -> Option<&mut T> {
        let column = ColumnId::make(self.component_id(TypeId::of::<T>(), std::any::type_name::<T>()));
        let (archetype, row) = self.location(entity)?;
        let table = self.tables.dense_mut(archetype)?;
        if !table.has_column(column) {
            return None;
        }
        Some(table.column_mut(column).get_mut::<T>(row))
    }

    /// Returns `true` if the entity is alive and has `T`.
    pub fn has<T: 'static>(&self, entity: Entity) -> bool {
        let column = ColumnId::make(self.component_id(TypeId::of::<T>(), std::any::type_name::<T>()));
        self.has_column(entity, column)
    }

    /// Returns `true` if the entity is alive and has the column.
    pub fn has_column(&self, entity: Entity, column: ColumnId) -> bool {
        self.entities
            .archetype(entity)
            .map_or(false, |archetype| self.archetypes.contains(archetype, column))
    }

    /// Component types of a live entity, in ascending id order. Empty for
    /// dead entities.
    pub fn component_types(&self, entity: Entity) -> Vec<DataTypeId> {
        match self.entities.archetype(entity) {
            Some(archetype) => self.archetypes.columns(archetype).map(ColumnId::data_type).collect(),
            None => Vec::new(),
        }
    }

    /// Runs `f` on every `T` in parallel, one rayon pass per archetype.
    ///
    /// # Panics
    /// If `T` is not a registered component.
    pub fn par_for_each_mut<T, F>(&mut self, f: F)
    where
        T: Send + Sync + 'static,
        F: Fn(Entity, &mut T) + Send + Sync,
    {
        let column = ColumnId::make(self.component_id(TypeId::of::<T>(), std::any::type_name::<T>()));
        for (_, table) in self.tables.dense_tables_mut() {
            let Some((values, entities)) = table.column_with_entities_mut(column) else {
                continue;
            };
            values
                .as_mut_slice::<T>()
                .par_iter_mut()
                .zip(entities.par_iter())
                .for_each(|(value, entity)| f(*entity, value));
        }
    }

    // ── Relations ──────────────────────────────────────────────────────────

    /// Relates two entities, overwriting an existing edge between them.
    ///
    /// # Panics
    /// If either entity is dead, `T` is not a registered relation, or the edge
    /// would close a cycle in a tree relation.
    pub fn relate<T: Send + Sync + 'static>(&mut self, from: Entity, to: Entity, value: T) -> &mut Self {
        self.relate_value(from, to, AnyValue::new(value));
        self
    }

    /// Relates two entities with a type-erased value and returns the
    /// relation's column.
    pub fn relate_value(&mut self, from: Entity, to: Entity, value: AnyValue) -> ColumnId {
        let data_type = self.relation_id(value.type_id(), value.ops().name());
        self.expect_alive(from, "relate");
        self.expect_alive(to, "relate");
        let ops = *self.types.ops(data_type);

        let DataKind::Relation(flags) = self.types.kind(data_type) else {
            unreachable!("relation ids always have the relation kind");
        };

        if flags.tree {
            self.relate_tree(data_type, ops, from, to, value);
        } else {
            let (from, to) = self.normalize(flags, from, to);
            self.tables
                .sparse_or_create(SparseRelationTableId::new(data_type, 0), ops)
                .insert_value(from, to, value);
        }
        log::trace!("related {} to {} with `{}`", from, to, ops.name());
        ColumnId::make(data_type)
    }

    fn normalize(&self, flags: RelationFlags, from: Entity, to: Entity) -> (Entity, Entity) {
        if flags.symmetric && from.index > to.index {
            (to, from)
        } else {
            (from, to)
        }
    }

    fn relate_tree(&mut self, data_type: DataTypeId, ops: TypeOps, child: Entity, parent: Entity, value: AnyValue) {
        let mut ancestor = Some(parent);
        while let Some(current) = ancestor {
            if current == child {
                log::error!("relating {} to {} with `{}` would create a cycle", child, parent, ops.name());
                panic!("tree relation cycle between {} and {}", child, parent);
            }
            ancestor = self.tree_parent(data_type, current).map(|(_, up)| up);
        }

        let old_depth = self.tree_depth(data_type, child);
        if let Some((layer, old_parent)) = self.tree_parent(data_type, child) {
            if let Some(table) = self.tables.sparse_mut(SparseRelationTableId::new(data_type, layer)) {
                table.erase(child, old_parent);
            }
        }

        let layer = self.tree_depth(data_type, parent);
        self.tables
            .sparse_or_create(SparseRelationTableId::new(data_type, layer), ops)
            .insert_value(child, parent, value);
        self.propagate_depth(data_type, ops, child, old_depth, layer + 1);
    }

    /// Parent of `entity` in a tree relation, with the layer of the edge.
    fn tree_parent(&self, data_type: DataTypeId, entity: Entity) -> Option<(usize, Entity)> {
        self.tables
            .relation_layers(data_type)
            .iter()
            .enumerate()
            .find_map(|(layer, table)| table.first_from(entity).map(|row| (layer, table.to_entity(row))))
    }

    /// Depth of `entity` in a tree relation; roots have depth zero.
    pub fn tree_depth(&self, data_type: DataTypeId, entity: Entity) -> usize {
        self.tree_parent(data_type, entity).map_or(0, |(layer, _)| layer + 1)
    }

    /// Moves the edges of `entity`'s children from layer `old` to layer
    /// `new`, recursing into the subtree.
    fn propagate_depth(&mut self, data_type: DataTypeId, ops: TypeOps, entity: Entity, old: usize, new: usize) {
        if old == new {
            return;
        }
        let children: Vec<Entity> = match self.tables.sparse(SparseRelationTableId::new(data_type, old)) {
            Some(table) => table.view_to(entity).map(|(child, _, _)| child).collect(),
            None => return,
        };
        if children.is_empty() {
            return;
        }

        for &child in &children {
            self.propagate_depth(data_type, ops, child, old + 1, new + 1);
        }
        self.tables.sparse_or_create(SparseRelationTableId::new(data_type, new), ops);
        let (source, target) = self.tables.sparse_pair_mut(data_type, old, new);
        source.move_to(entity, target);
    }

    /// Unlinks a tree node from its parent and turns its children into roots.
    fn detach_tree_node(&mut self, data_type: DataTypeId, entity: Entity) {
        let ops = *self.types.ops(data_type);
        let depth = self.tree_depth(data_type, entity);
        let children: Vec<Entity> = match self.tables.sparse(SparseRelationTableId::new(data_type, depth)) {
            Some(table) => table.view_to(entity).map(|(child, _, _)| child).collect(),
            None => Vec::new(),
        };
        for child in children {
            if let Some(table) = self.tables.sparse_mut(SparseRelationTableId::new(data_type, depth)) {
                table.erase(child, entity);
            }
            self.propagate_depth(data_type, ops, child, depth + 1, 0);
        }
        if let Some((layer, parent)) = self.tree_parent(data_type, entity) {
            if let Some(table) = self.tables.sparse_mut(SparseRelationTableId::new(data_type, layer)) {
                table.erase(entity, parent);
            }
        }
    }

    /// Removes the edge `(from, to)`. Returns `false` if it did not exist.
    ///
    /// # Panics
    /// If `T` is not a registered relation.
    pub fn unrelate<T: 'static>(&mut self, from: Entity, to: Entity) -> bool {
        let data_type = self.relation_id(TypeId::of::<T>(), std::any::type_name::<T>());
        self.unrelate_data_type(data_type, from, to)
    }

    /// Removes the edge `(from, to)` of the relation with the given Rust type
    /// id, returning its column if the edge existed.
    pub fn unrelate_type(&mut self, from: Entity, to: Entity, type_id: TypeId) -> Option<ColumnId> {
        let data_type = self.relation_id(type_id, "<erased>");
        self.unrelate_data_type(data_type, from, to)
            .then_some(ColumnId::make(data_type))
    }

    fn unrelate_data_type(&mut self, data_type: DataTypeId, from: Entity, to: Entity) -> bool {
        let Some((layer, row)) = self.find_edge(data_type, from, to) else {
            return false;
        };
        let id = SparseRelationTableId::new(data_type, layer);
        let Some(table) = self.tables.sparse_mut(id) else {
            return false;
        };
        let (stored_from, stored_to) = (table.from_entity(row), table.to_entity(row));
        table.erase(stored_from, stored_to);

        if self.types.is_tree_relation(data_type) {
            let ops = *self.types.ops(data_type);
            self.propagate_depth(data_type, ops, stored_from, layer + 1, 0);
        }
        log::trace!("unrelated {} from {} with `{}`", from, to, self.types.name(data_type));
        true
    }

    /// Layer and row of the edge `(from, to)`, after symmetric normalization.
    /// Handles must refer to live entities.
    pub fn find_edge(&self, data_type: DataTypeId, from: Entity, to: Entity) -> Option<(usize, usize)> {
        if !self.is_alive(from) || !self.is_alive(to) {
            return None;
        }
        let DataKind::Relation(flags) = self.types.kind(data_type) else {
            return None;
        };
        let (from, to) = self.normalize(flags, from, to);
        self.tables
            .relation_layers(data_type)
            .iter()
            .enumerate()
            .find_map(|(layer, table)| table.row(from, to).map(|row| (layer, row)))
    }

    /// Returns `true` if the edge `(from, to)` exists.
    pub fn related<T: 'static>(&self, from: Entity, to: Entity) -> bool {
        let data_type = self.relation_id(TypeId::of::<T>(), std::any::type_name::<T>());
        self.find_edge(data_type, from, to).is_some()
    }

    /// Value of the edge `(from, to)`.
    pub fn relation<T: 'static>(&self, from: Entity, to: Entity) -> Option<&T> {
        let data_type = self.relation_id(TypeId::of::<T>(), std::any::type_name::<T>());
        let (layer, row) = self.find_edge(data_type, from, to)?;
        let table = self.tables.sparse(SparseRelationTableId::new(data_type, layer))?;
        Some(table.get::<T>(row))
    }

    /// Mutable value of the edge `(from, to)`.
    pub fn relation_mut<T: 'static>(&mut self, from: Entity, to: Entity) -> Option<&mut T> {
        let data_type = self.relation_id(TypeId::of::<T>(), std::any::type_name::<T>());
        let (layer, row) = self.find_edge(data_type, from, to)?;
        let table = self.tables.sparse_mut(SparseRelationTableId::new(data_type, layer))?;
        Some(table.get_mut::<T>(row))
    }

    // ── Resources ──────────────────────────────────────────────────────────

    /// Inserts (or replaces) a resource, registering its type if needed.
    ///
    /// # Panics
    /// If `T` is registered as something other than a resource.
    pub fn insert_resource<T: Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        let data_type = match self.types.id_of::<T>() {
            Some(id) => id,
            None => match self.register_resource::<T>() {
                Ok(id) => id,
                Err(err) => {
                    log::error!("{}", err);
                    panic!("{}", err);
                }
            },
        };
        if !self.types.is_resource(data_type) {
            log::error!("`{}` is registered as {:?}", std::any::type_name::<T>(), self.types.kind(data_type));
            panic!("type `{}` is not a resource", std::any::type_name::<T>());
        }
        self.resources.insert(data_type, AnyValue::new(value));
        self
    }

    /// Reference to a resource.
    pub fn resource<T: 'static>(&self) -> Option<&T> {
        let data_type = self.types.id_of::<T>()?;
        self.resources.get(&data_type)?.downcast_ref::<T>()
    }

    /// Mutable reference to a resource.
    pub fn resource_mut<T: 'static>(&mut self) -> Option<&mut T> {
        let data_type = self.types.id_of::<T>()?;
        self.resources.get_mut(&data_type)?.downcast_mut::<T>()
    }

    /// Removes and returns a resource.
    pub fn remove_resource<T: 'static>(&mut self) -> Option<T> {
        let data_type = self.types.id_of::<T>()?;
        self.resources.remove(&data_type)?.downcast::<T>().ok()
    }

    /// Returns `true` if the resource is present.
    pub fn has_resource<T: 'static>(&self) -> bool {
        self.types
            .id_of::<T>()
            .map_or(false, |id| self.resources.contains_key(&id))
    }

    // ── Internals exposed to queries and observers ─────────────────────────

    /// The archetype graph.
    #[inline]
    pub fn archetypes(&self) -> &ArchetypeGraph {
        &self.archetypes
    }

    /// Dense and sparse tables.
    #[inline]
    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    /// Observer hooks.
    #[inline]
    pub fn observers(&self) -> &Observers {
        &self.observers
    }

    /// Mutable observer hooks.
    #[inline]
    pub fn observers_mut(&mut self) -> &mut Observers {
        &mut self.observers
    }

    /// Number of resets so far. Anything caching archetype ids must be
    /// rebuilt when it changes.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Drops every entity, relation and resource. Registered types and
    /// observer hooks are kept.
    pub fn reset(&mut self) {
        self.entities.reset();
        self.archetypes.reset();
        self.tables.reset();
        self.tables.dense_or_create(ArchetypeId::EMPTY, std::iter::empty(), &self.types);
        self.resources.clear();
        self.epoch += 1;
        log::debug!("world reset");
    }
}
