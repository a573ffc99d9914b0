//! Core Identifiers and Bit-Level Sets
//!
//! This module defines the **fundamental identifiers and signatures** shared by
//! every subsystem of the runtime: the type registry, the archetype graph, the
//! tables, the query engine and the dispatcher.
//!
//! ## Entity Representation
//!
//! Entities are a pair of a dense slot index and a generation counter:
//!
//! ```text
//! | generation (32 bits) | index (32 bits) |
//! ```
//!
//! - **Index** identifies the slot in the world's entity pool.
//! - **Generation** is bumped every time the slot is released, so handles to a
//!   destroyed entity never compare equal to the slot's next occupant.
//!
//! The index `u32::MAX` is reserved for [`Entity::NULL`].
//!
//! ## Data Types and Columns
//!
//! Every registered Rust type (component, relation or resource) receives a
//! [`DataTypeId`]. Component data lives in archetype columns, addressed by
//! [`ColumnId`]. Archetypes themselves are identified by [`ArchetypeId`].
//!
//! ## Signatures
//!
//! [`Signature`] is a growable bitset. It is used wherever the runtime needs a
//! set of small integers with cheap equality, hashing and subset tests:
//! archetype column sets, system access sets and condition masks.
//!
//! ## Safety and Performance
//!
//! This module contains **no unsafe code**. Signatures are kept normalized
//! (no trailing zero words) so that derived `Eq` and `Hash` are structural.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};


/// Dense slot index of an entity.
pub type IndexID = u32;
/// Generation counter used to detect stale entities.
pub type GenerationID = u32;

/// Reserved index of the null entity.
pub const NULL_INDEX: IndexID = IndexID::MAX;

/// Handle to an entity living in a [`World`](crate::engine::world::World).
///
/// Handles are plain values: copying one does not keep the entity alive, and a
/// handle outlives the entity it names. Use
/// [`World::is_alive`](crate::engine::world::World::is_alive) to check whether
/// it still refers to a live entity.

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Entity {
    /// Slot index inside the entity pool.
    pub index: IndexID,
    /// Generation of the slot when the handle was issued.
    pub generation: GenerationID,
}

impl Entity {
    /// Handle that never refers to a live entity.
    pub const NULL: Entity = Entity { index: NULL_INDEX, generation: 0 };

    /// Builds a handle from its parts.
    #[inline]
    pub const fn new(index: IndexID, generation: GenerationID) -> Self {
        Self { index, generation }
    }

    /// Returns `true` if this is the null handle.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.index == NULL_INDEX
    }

    /// Packs the handle into a single `u64`.
    #[inline]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }

    /// Unpacks a handle produced by [`Entity::to_bits`].
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self { index: bits as u32, generation: (bits >> 32) as u32 }
    }
}

impl Default for Entity {
    fn default() -> Self {
        Entity::NULL
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}#{}", self.index, self.generation)
        }
    }
}

/// Identifier of a registered data type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DataTypeId(pub u32);

impl DataTypeId {
    /// Position of the type in the registry.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of a column inside an archetype.
///
/// Component columns wrap the component's [`DataTypeId`]. Relations are never
/// stored in archetypes; their column id is only used to address observers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ColumnId(pub u32);

impl ColumnId {
    /// Builds the column id of a data type.
    #[inline]
    pub const fn make(data_type: DataTypeId) -> Self {
        ColumnId(data_type.0)
    }

    /// Data type stored in the column.
    #[inline]
    pub const fn data_type(self) -> DataTypeId {
        DataTypeId(self.0)
    }
}

/// Canonical identifier of a set of component columns.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ArchetypeId(pub u32);

impl ArchetypeId {
    /// The archetype without any columns.
    pub const EMPTY: ArchetypeId = ArchetypeId(0);

    /// Position of the archetype in the graph arena.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Growable bitset over small integer ids.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    words: Vec<u64>,
}

impl Signature {
    /// Creates an empty signature.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets bit `bit`.
    #[inline]
    pub fn set(&mut self, bit: usize) {
        let word = bit / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (bit % 64);
    }

    /// Clears bit `bit`.
    #[inline]
    pub fn clear(&mut self, bit: usize) {
        let word = bit / 64;
        if let Some(w) = self.words.get_mut(word) {
            *w &= !(1u64 << (bit % 64));
            self.normalize();
        }
    }

    /// Returns `true` if bit `bit` is set.
    #[inline]
    pub fn has(&self, bit: usize) -> bool {
        self.words
            .get(bit / 64)
            .map_or(false, |w| (w >> (bit % 64)) & 1 == 1)
    }

    /// Returns `true` if no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if every bit of `other` is also set in `self`.
    pub fn contains_all(&self, other: &Signature) -> bool {
        other.words.iter().enumerate().all(|(i, &b)| {
            let a = self.words.get(i).copied().unwrap_or(0);
            a & b == b
        })
    }

    /// Returns `true` if `self` and `other` share at least one bit.
    pub fn intersects(&self, other: &Signature) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Sets every bit of `other` in `self`.
    pub fn union_with(&mut self, other: &Signature) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= *b;
        }
    }

    /// Clears every bit.
    pub fn reset(&mut self) {
        self.words.clear();
    }

    /// Iterates over the set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let base = word_index * 64;
                let mut bits = word;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let tz = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some(base + tz)
                })
            })
    }

    fn normalize(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl FromIterator<usize> for Signature {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut signature = Signature::new();
        for bit in iter {
            signature.set(bit);
        }
        signature
    }
}

/// Builds a column signature from a list of column ids.
pub fn build_signature(columns: &[ColumnId]) -> Signature {
    columns.iter().map(|c| c.0 as usize).collect()
}
