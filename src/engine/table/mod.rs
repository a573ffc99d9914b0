//! # Tables
//!
//! Owner of all entity data of a world:
//!
//! * one [`DenseTable`] per archetype, created lazily the first time an entity
//!   enters the archetype and stored at the archetype's arena index, and
//! * one or more [`SparseRelationTable`]s per relation type, addressed by
//!   [`SparseRelationTableId`].
//!
//! Non-tree relations only ever use depth 0. Tree relations keep one table per
//! depth layer: layer `d` holds the edges whose `to` entity (the parent) sits
//! at depth `d` of its tree, roots having depth 0.

pub mod dense;
pub mod sparse;

use std::collections::HashMap;

use crate::engine::registry::Types;
use crate::engine::storage::TypeOps;
use crate::engine::types::{ArchetypeId, ColumnId, DataTypeId};

pub use dense::DenseTable;
pub use sparse::{SparseRelationTable, SparseRelationView};


/// Address of one sparse relation table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SparseRelationTableId {
    /// Relation type stored in the table.
    pub data_type: DataTypeId,
    /// Depth layer (always 0 for non-tree relations).
    pub depth: usize,
}

impl SparseRelationTableId {
    /// Builds an id.
    pub const fn new(data_type: DataTypeId, depth: usize) -> Self {
        Self { data_type, depth }
    }
}

/// Every dense and sparse table of a world.
#[derive(Default)]
pub struct Tables {
    dense: Vec<Option<DenseTable>>,
    relations: HashMap<DataTypeId, Vec<SparseRelationTable>>,
}

impl Tables {
    /// Creates an empty set of tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dense table of `archetype`, if it was ever created.
    #[inline]
    pub fn dense(&self, archetype: ArchetypeId) -> Option<&DenseTable> {
        self.dense.get(archetype.index()).and_then(Option::as_ref)
    }

    /// Mutable dense table of `archetype`, if it was ever created.
    #[inline]
    pub fn dense_mut(&mut self, archetype: ArchetypeId) -> Option<&mut DenseTable> {
        self.dense.get_mut(archetype.index()).and_then(Option::as_mut)
    }

    /// Dense table of `archetype`, creating it with `columns` if needed.
    pub fn dense_or_create(
        &mut self,
        archetype: ArchetypeId,
        columns: impl Iterator<Item = ColumnId>,
        types: &Types,
    ) -> &mut DenseTable {
        let index = archetype.index();
        if self.dense.len() <= index {
            self.dense.resize_with(index + 1, || None);
        }
        self.dense[index].get_or_insert_with(|| {
            let mut table = DenseTable::new();
            for column in columns {
                table.add_column(column, *types.ops(column.data_type()));
            }
            log::debug!("created dense table for archetype {:?}", archetype);
            table
        })
    }

    /// Mutable access to two distinct dense tables at once.
    ///
    /// # Panics
    /// If `a == b` or either table does not exist.
    pub fn dense_pair_mut(&mut self, a: ArchetypeId, b: ArchetypeId) -> (&mut DenseTable, &mut DenseTable) {
        assert_ne!(a, b, "dense_pair_mut needs two different archetypes");
        let (low, high) = (a.index().min(b.index()), a.index().max(b.index()));
        if high >= self.dense.len() {
            panic!("dense tables {:?} and {:?} must both exist", a, b);
        }
        let (head, tail) = self.dense.split_at_mut(high);
        let pair = match (head[low].as_mut(), tail[0].as_mut()) {
            (Some(low), Some(high)) => (low, high),
            _ => panic!("dense tables {:?} and {:?} must both exist", a, b),
        };
        if a.index() < b.index() {
            pair
        } else {
            (pair.1, pair.0)
        }
    }

    /// Iterates over every dense table.
    pub fn dense_tables(&self) -> impl Iterator<Item = (ArchetypeId, &DenseTable)> + '_ {
        self.dense
            .iter()
            .enumerate()
            .filter_map(|(index, table)| Some((ArchetypeId(index as u32), table.as_ref()?)))
    }

    /// Iterates mutably over every dense table.
    pub fn dense_tables_mut(&mut self) -> impl Iterator<Item = (ArchetypeId, &mut DenseTable)> + '_ {
        self.dense
            .iter_mut()
            .enumerate()
            .filter_map(|(index, table)| Some((ArchetypeId(index as u32), table.as_mut()?)))
    }

    /// Sparse table `id`, if it was ever created.
    pub fn sparse(&self, id: SparseRelationTableId) -> Option<&SparseRelationTable> {
        self.relations.get(&id.data_type).and_then(|layers| layers.get(id.depth))
    }

    /// Mutable sparse table `id`, if it was ever created.
    pub fn sparse_mut(&mut self, id: SparseRelationTableId) -> Option<&mut SparseRelationTable> {
        self.relations.get_mut(&id.data_type).and_then(|layers| layers.get_mut(id.depth))
    }

    /// Sparse table `id`, creating it (and any shallower layer) if needed.
    pub fn sparse_or_create(&mut self, id: SparseRelationTableId, ops: TypeOps) -> &mut SparseRelationTable {
        let layers = self.relations.entry(id.data_type).or_default();
        while layers.len() <= id.depth {
            log::debug!("created relation table `{}` at depth {}", ops.name(), layers.len());
            layers.push(SparseRelationTable::new(ops));
        }
        &mut layers[id.depth]
    }

    /// Mutable access to two adjacent-or-not layers of the same relation.
    ///
    /// # Panics
    /// If the depths are equal or either layer does not exist.
    pub fn sparse_pair_mut(
        &mut self,
        data_type: DataTypeId,
        a: usize,
        b: usize,
    ) -> (&mut SparseRelationTable, &mut SparseRelationTable) {
        assert_ne!(a, b, "sparse_pair_mut needs two different depths");
        let Some(layers) = self.relations.get_mut(&data_type) else {
            panic!("relation {:?} has no tables", data_type);
        };
        if a < b {
            let (low, high) = layers.split_at_mut(b);
            (&mut low[a], &mut high[0])
        } else {
            let (low, high) = layers.split_at_mut(a);
            (&mut high[0], &mut low[b])
        }
    }

    /// Every depth layer of a relation, shallowest first.
    pub fn relation_layers(&self, data_type: DataTypeId) -> &[SparseRelationTable] {
        match self.relations.get(&data_type) {
            Some(layers) => layers,
            None => &[],
        }
    }

    /// Number of depth layers of a relation.
    pub fn relation_depth(&self, data_type: DataTypeId) -> usize {
        self.relations.get(&data_type).map_or(0, Vec::len)
    }

    /// Mutable depth layers of a relation.
    pub fn relation_layers_mut(&mut self, data_type: DataTypeId) -> &mut [SparseRelationTable] {
        match self.relations.get_mut(&data_type) {
            Some(layers) => layers,
            None => &mut [],
        }
    }

    /// Iterates over every relation type with at least one table.
    pub fn relation_types(&self) -> impl Iterator<Item = DataTypeId> + '_ {
        self.relations.keys().copied()
    }

    /// Drops every table.
    pub fn reset(&mut self) {
        self.dense.clear();
        self.relations.clear();
    }
}
