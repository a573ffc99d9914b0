//! Dense, columnar storage for the entities of one archetype.
//!
//! A dense table keeps one [`Column`] per component of its archetype plus the
//! implicit entity column, all of the same length. Row `r` of every column
//! belongs to the entity `entities[r]`; the reverse lookup is a map from entity
//! index to row.
//!
//! Rows are not stable. Removing a row moves the last row into its slot
//! (swap-erase) and both lookups are updated together with the column data.

use std::collections::HashMap;

use crate::engine::storage::{Column, TypeOps};
use crate::engine::types::{ColumnId, Entity, IndexID};


/// Storage for all entities of one archetype.
#[derive(Default)]
pub struct DenseTable {
    columns: Vec<(ColumnId, Column)>,
    entities: Vec<Entity>,
    rows: HashMap<IndexID, usize>,
}

impl DenseTable {
    /// Creates a table without columns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a column. Must be called while the table is empty.
    ///
    /// # Panics
    /// If rows already exist or the column is already declared.
    pub fn add_column(&mut self, id: ColumnId, ops: TypeOps) {
        assert!(self.entities.is_empty(), "columns must be declared before rows are pushed");
        assert!(!self.has_column(id), "column {:?} declared twice", id);
        let position = self.columns.partition_point(|(c, _)| *c < id);
        self.columns.insert(position, (id, Column::new(ops)));
    }

    /// Returns `true` if the table has the column.
    #[inline]
    pub fn has_column(&self, id: ColumnId) -> bool {
        self.position(id).is_some()
    }

    #[inline]
    fn position(&self, id: ColumnId) -> Option<usize> {
        self.columns.binary_search_by_key(&id, |(c, _)| *c).ok()
    }

    /// Column `id`.
    ///
    /// # Panics
    /// If the table has no such column.
    pub fn column(&self, id: ColumnId) -> &Column {
        match self.position(id) {
            Some(p) => &self.columns[p].1,
            None => panic!("dense table has no column {:?}", id),
        }
    }

    /// Mutable column `id`.
    ///
    /// # Panics
    /// If the table has no such column.
    pub fn column_mut(&mut self, id: ColumnId) -> &mut Column {
        match self.position(id) {
            Some(p) => &mut self.columns[p].1,
            None => panic!("dense table has no column {:?}", id),
        }
    }

    /// Mutable column `id` together with the entity of every row.
    pub fn column_with_entities_mut(&mut self, id: ColumnId) -> Option<(&mut Column, &[Entity])> {
        let position = self.position(id)?;
        Some((&mut self.columns[position].1, &self.entities))
    }

    /// Column `id`, if present.
    pub fn try_column(&self, id: ColumnId) -> Option<&Column> {
        self.position(id).map(|p| &self.columns[p].1)
    }

    /// Iterates over the declared column ids in ascending order.
    pub fn column_ids(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.columns.iter().map(|(id, _)| *id)
    }

    /// Appends a row for `entity` and returns its index.
    ///
    /// Every column must then receive exactly one value (through
    /// [`Column::push`], [`Column::push_default`], [`Column::push_copy`] or
    /// [`Column::push_move`]) before the table is read again.
    pub fn push_back(&mut self, entity: Entity) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        self.rows.insert(entity.index, row);
        row
    }

    /// Row of the entity with index `index`.
    #[inline]
    pub fn row(&self, index: IndexID) -> Option<usize> {
        self.rows.get(&index).copied()
    }

    /// Entity stored at `row`.
    ///
    /// # Panics
    /// If `row` is out of bounds.
    #[inline]
    pub fn entity(&self, row: usize) -> Entity {
        assert!(row < self.entities.len(), "row {} out of bounds ({} rows)", row, self.entities.len());
        self.entities[row]
    }

    /// Entities in row order.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Number of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the table has no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Removes `row`, dropping its values and moving the last row into it.
    pub fn swap_erase(&mut self, row: usize) {
        let entity = self.entity(row);
        for (_, column) in &mut self.columns {
            column.swap_erase(row);
        }
        self.forget_row(row, entity);
    }

    /// Moves `row` into `dst`.
    ///
    /// Values of columns shared with `dst` are moved, values of columns only
    /// present here are dropped, and columns only present in `dst` are left
    /// for the caller to fill. The entity is appended to `dst` and this table
    /// is left as if [`DenseTable::swap_erase`] had run.
    pub fn swap_move(&mut self, row: usize, dst: &mut DenseTable) {
        let entity = self.entity(row);
        dst.push_back(entity);
        for (id, column) in &mut self.columns {
            match dst.position(*id) {
                Some(p) => column.swap_move(row, &mut dst.columns[p].1),
                None => column.swap_erase(row),
            }
        }
        self.forget_row(row, entity);
    }

    fn forget_row(&mut self, row: usize, entity: Entity) {
        self.rows.remove(&entity.index);
        let last = self.entities.len() - 1;
        if row != last {
            let moved = self.entities[last];
            self.rows.insert(moved.index, row);
        }
        self.entities.swap_remove(row);
    }

    /// Drops every row.
    pub fn clear(&mut self) {
        for (_, column) in &mut self.columns {
            column.clear();
        }
        self.entities.clear();
        self.rows.clear();
    }
}
