//! Sparse storage for the edges of one relation type.
//!
//! Each row of a [`SparseRelationTable`] is an edge `(from, to)` with its
//! value. Three indices are kept in sync with the rows:
//!
//! * a map from the packed pair of entity indices to the row, giving O(1)
//!   `insert`/`contains`/`erase`,
//! * an intrusive doubly linked list threading all rows with the same `from`
//!   entity, and
//! * the same for the `to` entity.
//!
//! The lists make bulk removal and per-entity views O(degree) instead of
//! O(table size). Row removal is swap-erase, so the neighbours of the moved
//! last row are re-linked to its new position.

use std::collections::HashMap;

use crate::engine::storage::{AnyValue, Column, TypeOps};
use crate::engine::types::{Entity, IndexID};


const NONE: usize = usize::MAX;

#[derive(Clone, Copy, Debug)]
struct Link {
    prev: usize,
    next: usize,
}

#[derive(Clone, Copy, Debug)]
struct Endpoint {
    first: usize,
    last: usize,
    count: usize,
}

#[inline]
fn pair_key(from: IndexID, to: IndexID) -> u64 {
    (from as u64) | ((to as u64) << 32)
}

fn append(links: &mut Vec<Link>, index: &mut HashMap<IndexID, Endpoint>, key: IndexID, row: usize) {
    match index.get_mut(&key) {
        Some(endpoint) => {
            links.push(Link { prev: endpoint.last, next: NONE });
            links[endpoint.last].next = row;
            endpoint.last = row;
            endpoint.count += 1;
        }
        None => {
            links.push(Link { prev: NONE, next: NONE });
            index.insert(key, Endpoint { first: row, last: row, count: 1 });
        }
    }
}

fn unlink(links: &mut [Link], index: &mut HashMap<IndexID, Endpoint>, key: IndexID, row: usize) {
    let Link { prev, next } = links[row];
    if prev != NONE {
        links[prev].next = next;
    }
    if next != NONE {
        links[next].prev = prev;
    }
    let mut emptied = false;
    if let Some(endpoint) = index.get_mut(&key) {
        if endpoint.first == row {
            endpoint.first = next;
        }
        if endpoint.last == row {
            endpoint.last = prev;
        }
        endpoint.count -= 1;
        emptied = endpoint.count == 0;
    }
    if emptied {
        index.remove(&key);
    }
}

/// Points the neighbours and endpoint of row `old` at row `new`.
fn relink(links: &mut [Link], index: &mut HashMap<IndexID, Endpoint>, key: IndexID, old: usize, new: usize) {
    let Link { prev, next } = links[old];
    if prev != NONE {
        links[prev].next = new;
    }
    if next != NONE {
        links[next].prev = new;
    }
    if let Some(endpoint) = index.get_mut(&key) {
        if endpoint.first == old {
            endpoint.first = new;
        }
        if endpoint.last == old {
            endpoint.last = new;
        }
    }
}

/// Edge storage of one relation type.
pub struct SparseRelationTable {
    values: Column,
    from: Vec<Entity>,
    to: Vec<Entity>,
    from_links: Vec<Link>,
    to_links: Vec<Link>,
    from_index: HashMap<IndexID, Endpoint>,
    to_index: HashMap<IndexID, Endpoint>,
    pairs: HashMap<u64, usize>,
}

impl SparseRelationTable {
    /// Creates an empty table storing values described by `ops`.
    pub fn new(ops: TypeOps) -> Self {
        Self {
            values: Column::new(ops),
            from: Vec::new(),
            to: Vec::new(),
            from_links: Vec::new(),
            to_links: Vec::new(),
            from_index: HashMap::new(),
            to_index: HashMap::new(),
            pairs: HashMap::new(),
        }
    }

    /// Operations of the stored value type.
    pub fn ops(&self) -> &TypeOps {
        self.values.ops()
    }

    /// Number of edges.
    #[inline]
    pub fn len(&self) -> usize {
        self.from.len()
    }

    /// Returns `true` if there are no edges.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.from.is_empty()
    }

    /// Inserts or overwrites the edge `(from, to)` by moving the value at
    /// `src`. Returns `true` if an existing edge was overwritten.
    ///
    /// # Safety
    /// `src` must point to a live value of the table's type; ownership moves
    /// into the table.
    pub unsafe fn insert_move(&mut self, from: Entity, to: Entity, src: *const u8) -> bool {
        if let Some(&row) = self.pairs.get(&pair_key(from.index, to.index)) {
            // SAFETY: forwarded caller contract.
            unsafe { self.values.set_move(row, src) };
            self.from[row] = from;
            self.to[row] = to;
            return true;
        }

        let row = self.from.len();
        // SAFETY: forwarded caller contract.
        unsafe { self.values.push_move(src) };
        self.from.push(from);
        self.to.push(to);
        append(&mut self.from_links, &mut self.from_index, from.index, row);
        append(&mut self.to_links, &mut self.to_index, to.index, row);
        self.pairs.insert(pair_key(from.index, to.index), row);
        false
    }

    /// Inserts or overwrites the edge `(from, to)` with an erased value.
    ///
    /// # Panics
    /// If the value is not of the table's type.
    pub fn insert_value(&mut self, from: Entity, to: Entity, value: AnyValue) -> bool {
        assert!(
            value.type_id() == self.values.ops().type_id(),
            "relation value of `{}` inserted into a table of `{}`",
            value.ops().name(),
            self.values.ops().name()
        );
        // SAFETY: the type was checked; the value's bytes are handed over.
        value.consume_with(|src| unsafe { self.insert_move(from, to, src) })
    }

    /// Inserts or overwrites the edge `(from, to)` with a typed value.
    ///
    /// # Panics
    /// If `T` is not the table's type.
    pub fn insert<T: 'static>(&mut self, from: Entity, to: Entity, value: T) -> bool {
        assert!(self.values.ops().is::<T>(), "relation table stores `{}`", self.values.ops().name());
        let value = std::mem::ManuallyDrop::new(value);
        // SAFETY: the type was checked and `value` is never dropped here.
        unsafe { self.insert_move(from, to, (&*value as *const T).cast::<u8>()) }
    }

    /// Row of the edge `(from, to)`.
    #[inline]
    pub fn row(&self, from: Entity, to: Entity) -> Option<usize> {
        self.pairs.get(&pair_key(from.index, to.index)).copied()
    }

    /// Returns `true` if the edge `(from, to)` exists.
    #[inline]
    pub fn contains(&self, from: Entity, to: Entity) -> bool {
        self.pairs.contains_key(&pair_key(from.index, to.index))
    }

    /// Erases the edge `(from, to)`. Returns `true` if it existed.
    pub fn erase(&mut self, from: Entity, to: Entity) -> bool {
        match self.row(from, to) {
            Some(row) => {
                self.erase_row(row, true);
                true
            }
            None => false,
        }
    }

    /// Erases every edge leaving `from`, returning how many were erased.
    pub fn erase_from(&mut self, from: Entity) -> usize {
        let mut count = 0;
        while let Some(row) = self.first_from(from) {
            self.erase_row(row, true);
            count += 1;
        }
        count
    }

    /// Erases every edge arriving at `to`, returning how many were erased.
    pub fn erase_to(&mut self, to: Entity) -> usize {
        let mut count = 0;
        while let Some(row) = self.first_to(to) {
            self.erase_row(row, true);
            count += 1;
        }
        count
    }

    /// Moves every edge leaving `from` into `dst`, keeping their values.
    /// Returns `true` if any edge was moved.
    pub fn move_from(&mut self, from: Entity, dst: &mut SparseRelationTable) -> bool {
        let mut moved = false;
        while let Some(row) = self.first_from(from) {
            self.move_row(row, dst);
            moved = true;
        }
        moved
    }

    /// Moves every edge arriving at `to` into `dst`, keeping their values.
    /// Returns `true` if any edge was moved.
    pub fn move_to(&mut self, to: Entity, dst: &mut SparseRelationTable) -> bool {
        let mut moved = false;
        while let Some(row) = self.first_to(to) {
            self.move_row(row, dst);
            moved = true;
        }
        moved
    }

    fn move_row(&mut self, row: usize, dst: &mut SparseRelationTable) {
        assert_eq!(
            self.values.ops().type_id(),
            dst.values.ops().type_id(),
            "relation edges moved between tables of different types"
        );
        let (from, to) = (self.from[row], self.to[row]);
        // SAFETY: the row is live and of the destination's type; it is
        // forgotten right after, so the value is owned exactly once.
        unsafe { dst.insert_move(from, to, self.values.ptr(row)) };
        self.erase_row(row, false);
    }

    fn erase_row(&mut self, row: usize, drop_value: bool) {
        let (from, to) = (self.from[row], self.to[row]);
        unlink(&mut self.from_links, &mut self.from_index, from.index, row);
        unlink(&mut self.to_links, &mut self.to_index, to.index, row);
        self.pairs.remove(&pair_key(from.index, to.index));

        let last = self.from.len() - 1;
        if row != last {
            let (last_from, last_to) = (self.from[last], self.to[last]);
            relink(&mut self.from_links, &mut self.from_index, last_from.index, last, row);
            relink(&mut self.to_links, &mut self.to_index, last_to.index, last, row);
            self.pairs.insert(pair_key(last_from.index, last_to.index), row);
        }

        self.from.swap_remove(row);
        self.to.swap_remove(row);
        self.from_links.swap_remove(row);
        self.to_links.swap_remove(row);
        if drop_value {
            self.values.swap_erase(row);
        } else {
            self.values.swap_forget(row);
        }
    }

    /// First edge leaving `from`.
    #[inline]
    pub fn first_from(&self, from: Entity) -> Option<usize> {
        self.from_index.get(&from.index).map(|e| e.first)
    }

    /// Edge after `row` in its `from` list.
    #[inline]
    pub fn next_from(&self, row: usize) -> Option<usize> {
        Some(self.from_links[row].next).filter(|&next| next != NONE)
    }

    /// First edge arriving at `to`.
    #[inline]
    pub fn first_to(&self, to: Entity) -> Option<usize> {
        self.to_index.get(&to.index).map(|e| e.first)
    }

    /// Edge after `row` in its `to` list.
    #[inline]
    pub fn next_to(&self, row: usize) -> Option<usize> {
        Some(self.to_links[row].next).filter(|&next| next != NONE)
    }

    /// Number of edges leaving `from`.
    pub fn count_from(&self, from: Entity) -> usize {
        self.from_index.get(&from.index).map_or(0, |e| e.count)
    }

    /// Number of edges arriving at `to`.
    pub fn count_to(&self, to: Entity) -> usize {
        self.to_index.get(&to.index).map_or(0, |e| e.count)
    }

    /// `from` endpoint of `row`.
    #[inline]
    pub fn from_entity(&self, row: usize) -> Entity {
        self.from[row]
    }

    /// `to` endpoint of `row`.
    #[inline]
    pub fn to_entity(&self, row: usize) -> Entity {
        self.to[row]
    }

    /// Pointer to the value of `row`.
    #[inline]
    pub fn value_ptr(&self, row: usize) -> *const u8 {
        self.values.ptr(row)
    }

    /// Mutable pointer to the value of `row`. The caller must not create
    /// aliasing references.
    #[inline]
    pub fn value_ptr_mut(&self, row: usize) -> *mut u8 {
        self.values.ptr_mut(row)
    }

    /// Typed value of `row`.
    pub fn get<T: 'static>(&self, row: usize) -> &T {
        self.values.get::<T>(row)
    }

    /// Typed mutable value of `row`.
    pub fn get_mut<T: 'static>(&mut self, row: usize) -> &mut T {
        self.values.get_mut::<T>(row)
    }

    /// Every edge in row order.
    pub fn view(&self) -> SparseRelationView<'_> {
        SparseRelationView { table: self, cursor: Cursor::All(0) }
    }

    /// Edges leaving `from`, in insertion order.
    pub fn view_from(&self, from: Entity) -> SparseRelationView<'_> {
        SparseRelationView { table: self, cursor: Cursor::From(self.first_from(from)) }
    }

    /// Edges arriving at `to`, in insertion order.
    pub fn view_to(&self, to: Entity) -> SparseRelationView<'_> {
        SparseRelationView { table: self, cursor: Cursor::To(self.first_to(to)) }
    }

    /// Drops every edge.
    pub fn clear(&mut self) {
        self.values.clear();
        self.from.clear();
        self.to.clear();
        self.from_links.clear();
        self.to_links.clear();
        self.from_index.clear();
        self.to_index.clear();
        self.pairs.clear();
    }
}

#[derive(Clone, Copy, Debug)]
enum Cursor {
    All(usize),
    From(Option<usize>),
    To(Option<usize>),
}

/// Lazy sequence of `(from, to, row)` triples over a relation table.
///
/// The table is borrowed for the lifetime of the view, so it cannot be
/// structurally modified while the view is alive.
#[derive(Clone)]
pub struct SparseRelationView<'a> {
    table: &'a SparseRelationTable,
    cursor: Cursor,
}

impl<'a> Iterator for SparseRelationView<'a> {
    type Item = (Entity, Entity, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let row = match &mut self.cursor {
            Cursor::All(next) => {
                if *next >= self.table.len() {
                    return None;
                }
                *next += 1;
                *next - 1
            }
            Cursor::From(next) => {
                let row = (*next)?;
                *next = self.table.next_from(row);
                row
            }
            Cursor::To(next) => {
                let row = (*next)?;
                *next = self.table.next_to(row);
                row
            }
        };
        Some((self.table.from[row], self.table.to[row], row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(index: u32) -> Entity {
        Entity::new(index, 0)
    }

    #[test]
    fn lists_survive_swap_erase_of_linked_rows() {
        let mut table = SparseRelationTable::new(TypeOps::of::<u32>());
        table.insert(e(0), e(1), 10u32);
        table.insert(e(0), e(2), 20u32);
        table.insert(e(3), e(1), 30u32);
        table.insert(e(0), e(3), 40u32);

        assert!(table.erase(e(0), e(1)));

        let from_zero: Vec<_> = table.view_from(e(0)).map(|(_, to, row)| (to, *table.get::<u32>(row))).collect();
        assert_eq!(from_zero, vec![(e(2), 20), (e(3), 40)]);
        let to_one: Vec<_> = table.view_to(e(1)).map(|(from, _, _)| from).collect();
        assert_eq!(to_one, vec![e(3)]);
        assert_eq!(table.count_from(e(0)), 2);
        assert_eq!(table.len(), 3);
    }
}
