//! # Type Registry
//!
//! Assigns every registered Rust type a stable [`DataTypeId`] and records what
//! kind of data it is. The registry is owned by a
//! [`World`](crate::engine::world::World); there is no global registration
//! state, so separate worlds (and tests) never interfere.
//!
//! ## Kinds
//!
//! * **Components** live in archetype columns, one value per entity.
//! * **Relations** live in sparse relation tables, one value per
//!   `(from, to)` pair. A relation may be *symmetric* (the pair is unordered)
//!   or a *tree* (each entity has at most one outgoing edge), never both.
//! * **Resources** are singletons owned by the world.
//!
//! ## Ids
//!
//! Ids are assigned in registration order starting at 0. Callers other than
//! test fixtures should not rely on the numbering.
//!
//! ## Failure model
//!
//! Registration conflicts are reported as [`RegistryError`]; the world layer
//! decides whether they are fatal.

use std::any::TypeId;
use std::collections::HashMap;

use crate::engine::error::RegistryError;
use crate::engine::storage::TypeOps;
use crate::engine::types::DataTypeId;


/// Flags of a relation type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RelationFlags {
    /// `(a, b)` and `(b, a)` are the same edge.
    pub symmetric: bool,
    /// Each `from` entity has at most one outgoing edge.
    pub tree: bool,
}

impl RelationFlags {
    /// Plain directed relation.
    pub const DIRECTED: RelationFlags = RelationFlags { symmetric: false, tree: false };
    /// Symmetric relation.
    pub const SYMMETRIC: RelationFlags = RelationFlags { symmetric: true, tree: false };
    /// Tree relation.
    pub const TREE: RelationFlags = RelationFlags { symmetric: false, tree: true };
}

/// Kind of a registered type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// Per-entity data stored in archetypes.
    Component,
    /// Per-pair data stored in sparse relation tables.
    Relation(RelationFlags),
    /// World singleton.
    Resource,
}

/// Registry entry.
#[derive(Clone, Debug)]
pub struct TypeEntry {
    ops: TypeOps,
    kind: DataKind,
}

impl TypeEntry {
    /// Operations of the type.
    pub fn ops(&self) -> &TypeOps {
        &self.ops
    }

    /// Kind of the type.
    pub fn kind(&self) -> DataKind {
        self.kind
    }

    /// Name of the type.
    pub fn name(&self) -> &'static str {
        self.ops.name()
    }
}

/// The type registry.
#[derive(Default, Debug)]
pub struct Types {
    entries: Vec<TypeEntry>,
    by_type: HashMap<TypeId, DataTypeId>,
    by_name: HashMap<&'static str, DataTypeId>,
}

impl Types {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component type.
    pub fn add_component(&mut self, ops: TypeOps) -> Result<DataTypeId, RegistryError> {
        self.add(ops, DataKind::Component)
    }

    /// Registers a relation type.
    pub fn add_relation(&mut self, ops: TypeOps, flags: RelationFlags) -> Result<DataTypeId, RegistryError> {
        if flags.symmetric && flags.tree {
            return Err(RegistryError::SymmetricTree { name: ops.name().to_string() });
        }
        self.add(ops, DataKind::Relation(flags))
    }

    /// Registers a resource type.
    pub fn add_resource(&mut self, ops: TypeOps) -> Result<DataTypeId, RegistryError> {
        self.add(ops, DataKind::Resource)
    }

    fn add(&mut self, ops: TypeOps, kind: DataKind) -> Result<DataTypeId, RegistryError> {
        if let Some(&existing) = self.by_type.get(&ops.type_id()) {
            return Err(RegistryError::AlreadyRegistered { name: ops.name().to_string(), existing });
        }
        if self.by_name.contains_key(ops.name()) {
            return Err(RegistryError::NameTaken { name: ops.name().to_string() });
        }

        let id = DataTypeId(self.entries.len() as u32);
        self.by_type.insert(ops.type_id(), id);
        self.by_name.insert(ops.name(), id);
        self.entries.push(TypeEntry { ops, kind });
        log::debug!("registered {:?} `{}` as {:?}", kind, ops.name(), id);
        Ok(id)
    }

    /// Id of a Rust type, if registered.
    #[inline]
    pub fn id(&self, type_id: TypeId) -> Option<DataTypeId> {
        self.by_type.get(&type_id).copied()
    }

    /// Id of `T`, if registered.
    #[inline]
    pub fn id_of<T: 'static>(&self) -> Option<DataTypeId> {
        self.id(TypeId::of::<T>())
    }

    /// Id of the type registered under `name`.
    pub fn find(&self, name: &str) -> Option<DataTypeId> {
        self.by_name.get(name).copied()
    }

    /// Returns `true` if the id was issued by this registry.
    #[inline]
    pub fn contains(&self, id: DataTypeId) -> bool {
        id.index() < self.entries.len()
    }

    /// Registry entry of `id`.
    ///
    /// # Panics
    /// If `id` was not issued by this registry.
    pub fn entry(&self, id: DataTypeId) -> &TypeEntry {
        match self.entries.get(id.index()) {
            Some(entry) => entry,
            None => {
                log::error!("unknown data type id {:?}", id);
                panic!("data type {:?} is not registered", id);
            }
        }
    }

    /// Operations of `id`.
    #[inline]
    pub fn ops(&self, id: DataTypeId) -> &TypeOps {
        self.entry(id).ops()
    }

    /// Name of `id`.
    #[inline]
    pub fn name(&self, id: DataTypeId) -> &'static str {
        self.entry(id).name()
    }

    /// Kind of `id`.
    #[inline]
    pub fn kind(&self, id: DataTypeId) -> DataKind {
        self.entry(id).kind()
    }

    /// Returns `true` if `id` is a component.
    pub fn is_component(&self, id: DataTypeId) -> bool {
        matches!(self.entries.get(id.index()).map(TypeEntry::kind), Some(DataKind::Component))
    }

    /// Returns `true` if `id` is a relation.
    pub fn is_relation(&self, id: DataTypeId) -> bool {
        matches!(self.entries.get(id.index()).map(TypeEntry::kind), Some(DataKind::Relation(_)))
    }

    /// Returns `true` if `id` is a resource.
    pub fn is_resource(&self, id: DataTypeId) -> bool {
        matches!(self.entries.get(id.index()).map(TypeEntry::kind), Some(DataKind::Resource))
    }

    /// Returns `true` if `id` is a symmetric relation.
    pub fn is_symmetric_relation(&self, id: DataTypeId) -> bool {
        matches!(
            self.entries.get(id.index()).map(TypeEntry::kind),
            Some(DataKind::Relation(RelationFlags { symmetric: true, .. }))
        )
    }

    /// Returns `true` if `id` is a tree relation.
    pub fn is_tree_relation(&self, id: DataTypeId) -> bool {
        matches!(
            self.entries.get(id.index()).map(TypeEntry::kind),
            Some(DataKind::Relation(RelationFlags { tree: true, .. }))
        )
    }

    /// Number of registered types.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over every registered id and entry.
    pub fn iter(&self) -> impl Iterator<Item = (DataTypeId, &TypeEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (DataTypeId(i as u32), entry))
    }

    /// Forgets every registration.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.by_type.clear();
        self.by_name.clear();
    }
}
