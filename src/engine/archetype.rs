//! # Archetype graph
//!
//! An *archetype* is the set of component columns shared by a group of
//! entities. The graph is an arena of archetype nodes, each identified by a
//! canonical [`ArchetypeId`], with memoized edges to the archetypes reached by
//! adding or removing one column.
//!
//! ## Canonical ids
//!
//! Every node's column set is also indexed in a map from [`Signature`] to id,
//! so two different paths that reach the same column set (for example adding
//! `A` then `B`, or `B` then `A`) always yield the same id. Archetypes can
//! therefore be compared by id instead of by column set.
//!
//! ## Discovery
//!
//! Queries discover matching archetypes incrementally with
//! [`ArchetypeGraph::collect`]: ids are allocated sequentially, so a query only
//! has to remember how many nodes it has already inspected.

use std::collections::HashMap;

use crate::engine::types::{ArchetypeId, ColumnId, Signature};


#[derive(Debug, Default)]
struct Node {
    columns: Signature,
    with_edges: HashMap<ColumnId, ArchetypeId>,
    without_edges: HashMap<ColumnId, ArchetypeId>,
}

/// Arena of archetypes with memoized transitions.
#[derive(Debug)]
pub struct ArchetypeGraph {
    nodes: Vec<Node>,
    by_columns: HashMap<Signature, ArchetypeId>,
}

impl Default for ArchetypeGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchetypeGraph {
    /// Creates a graph holding only [`ArchetypeId::EMPTY`].
    pub fn new() -> Self {
        let mut by_columns = HashMap::new();
        by_columns.insert(Signature::new(), ArchetypeId::EMPTY);
        Self { nodes: vec![Node::default()], by_columns }
    }

    fn node(&self, archetype: ArchetypeId) -> &Node {
        match self.nodes.get(archetype.index()) {
            Some(node) => node,
            None => {
                log::error!("unknown archetype {:?}", archetype);
                panic!("archetype {:?} does not exist", archetype);
            }
        }
    }

    /// Returns `true` if `archetype` has the column.
    #[inline]
    pub fn contains(&self, archetype: ArchetypeId, column: ColumnId) -> bool {
        self.node(archetype).columns.has(column.0 as usize)
    }

    /// Column set of `archetype`.
    #[inline]
    pub fn signature(&self, archetype: ArchetypeId) -> &Signature {
        &self.node(archetype).columns
    }

    /// Iterates over the columns of `archetype` in ascending id order.
    pub fn columns(&self, archetype: ArchetypeId) -> impl Iterator<Item = ColumnId> + '_ {
        self.node(archetype).columns.iter().map(|bit| ColumnId(bit as u32))
    }

    /// Archetype with the columns of `archetype` plus `column`.
    ///
    /// Adding a column the archetype already has returns it unchanged.
    pub fn with(&mut self, archetype: ArchetypeId, column: ColumnId) -> ArchetypeId {
        if self.contains(archetype, column) {
            return archetype;
        }
        if let Some(&next) = self.node(archetype).with_edges.get(&column) {
            return next;
        }

        let mut columns = self.node(archetype).columns.clone();
        columns.set(column.0 as usize);
        let next = self.intern(columns);

        self.nodes[archetype.index()].with_edges.insert(column, next);
        self.nodes[next.index()].without_edges.insert(column, archetype);
        next
    }

    /// Archetype with the columns of `archetype` minus `column`.
    ///
    /// Removing a missing column returns the archetype unchanged.
    pub fn without(&mut self, archetype: ArchetypeId, column: ColumnId) -> ArchetypeId {
        if !self.contains(archetype, column) {
            return archetype;
        }
        if let Some(&prev) = self.node(archetype).without_edges.get(&column) {
            return prev;
        }

        let mut columns = self.node(archetype).columns.clone();
        columns.clear(column.0 as usize);
        let prev = self.intern(columns);

        self.nodes[archetype.index()].without_edges.insert(column, prev);
        self.nodes[prev.index()].with_edges.insert(column, archetype);
        prev
    }

    fn intern(&mut self, columns: Signature) -> ArchetypeId {
        if let Some(&id) = self.by_columns.get(&columns) {
            return id;
        }
        let id = ArchetypeId(self.nodes.len() as u32);
        log::debug!("new archetype {:?} with {} columns", id, columns.count());
        self.by_columns.insert(columns.clone(), id);
        self.nodes.push(Node { columns, ..Node::default() });
        id
    }

    /// Id of the archetype with exactly `columns`, if it exists.
    pub fn find(&self, columns: &Signature) -> Option<ArchetypeId> {
        self.by_columns.get(columns).copied()
    }

    /// Appends to `out` every archetype created since `*seen` whose columns
    /// include all of `required`, then advances `*seen`.
    pub fn collect(&self, required: &Signature, seen: &mut usize, out: &mut Vec<ArchetypeId>) {
        for index in *seen..self.nodes.len() {
            if self.nodes[index].columns.contains_all(required) {
                out.push(ArchetypeId(index as u32));
            }
        }
        *seen = self.nodes.len();
    }

    /// Number of archetypes.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: the empty archetype exists from the start.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drops every archetype except [`ArchetypeId::EMPTY`].
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
