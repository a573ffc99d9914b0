//! Query terms and target resolution.
//!
//! A query matches tuples of entities. Each position of the tuple is a
//! *target*, numbered from zero. Terms constrain targets:
//!
//! * an **entity** term asks for the handle of a target,
//! * a **component** term requires (`with`), forbids (`without`) or optionally
//!   reads (`optional`) a component on a target,
//! * a **relation** term requires an edge of a relation from one target to
//!   another.
//!
//! Terms written by hand (explicit terms) may leave their targets unset; the
//! terms derived from a typed query (implicit terms) always start unset.
//! [`QueryTerm::resolve`] merges both lists and assigns every target.

use crate::engine::registry::Types;
use crate::engine::types::DataTypeId;


/// Marker of a target that has not been assigned yet.
pub const UNSET_TARGET: i32 = -1;

/// Order in which the edges of a relation are visited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Traversal {
    /// Storage order.
    #[default]
    Random,
    /// Tree relations: leaves first, walking towards the roots.
    Up,
    /// Tree relations: roots first, walking towards the leaves.
    Down,
}

/// One constraint of a query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryTerm {
    /// Yields the handle of a target.
    Entity {
        /// Target index.
        target: i32,
    },
    /// Constrains a target by one of its components.
    Component {
        /// Component type.
        data_type: DataTypeId,
        /// Target index.
        target: i32,
        /// The target must not have the component.
        without: bool,
        /// The target may lack the component.
        optional: bool,
    },
    /// Requires a relation edge between two targets.
    Relation {
        /// Relation type.
        data_type: DataTypeId,
        /// Target of the edge's `from` entity.
        from_target: i32,
        /// Target of the edge's `to` entity.
        to_target: i32,
        /// Visiting order of the edges.
        traversal: Traversal,
    },
}

impl QueryTerm {
    /// Entity term.
    pub const fn entity(target: i32) -> Self {
        QueryTerm::Entity { target }
    }

    /// Requires the component.
    pub const fn with_component(data_type: DataTypeId, target: i32) -> Self {
        QueryTerm::Component { data_type, target, without: false, optional: false }
    }

    /// Forbids the component.
    pub const fn without_component(data_type: DataTypeId, target: i32) -> Self {
        QueryTerm::Component { data_type, target, without: true, optional: false }
    }

    /// Reads the component if present.
    pub const fn opt_component(data_type: DataTypeId, target: i32) -> Self {
        QueryTerm::Component { data_type, target, without: false, optional: true }
    }

    /// Requires a relation edge, visited in storage order.
    pub const fn relation(data_type: DataTypeId, from_target: i32, to_target: i32) -> Self {
        Self::relation_traversal(data_type, from_target, to_target, Traversal::Random)
    }

    /// Requires a relation edge, visited in the given order.
    pub const fn relation_traversal(
        data_type: DataTypeId,
        from_target: i32,
        to_target: i32,
        traversal: Traversal,
    ) -> Self {
        QueryTerm::Relation { data_type, from_target, to_target, traversal }
    }

    /// Returns `true` for entity terms.
    pub fn is_entity(&self) -> bool {
        matches!(self, QueryTerm::Entity { .. })
    }

    /// Returns `true` for component terms.
    pub fn is_component(&self) -> bool {
        matches!(self, QueryTerm::Component { .. })
    }

    /// Returns `true` for relation terms.
    pub fn is_relation(&self) -> bool {
        matches!(self, QueryTerm::Relation { .. })
    }

    /// Structural equality of two terms.
    pub fn compare(&self, other: &QueryTerm) -> bool {
        self == other
    }

    /// Returns `true` if `explicit` can supply the targets of `self`.
    ///
    /// Components must agree on `without`; the optional flag of the explicit
    /// term is ignored.
    fn accepts(&self, explicit: &QueryTerm) -> bool {
        match (self, explicit) {
            (QueryTerm::Entity { .. }, QueryTerm::Entity { .. }) => true,
            (
                QueryTerm::Component { data_type: a, without: wa, .. },
                QueryTerm::Component { data_type: b, without: wb, .. },
            ) => a == b && wa == wb,
            (QueryTerm::Relation { data_type: a, .. }, QueryTerm::Relation { data_type: b, .. }) => a == b,
            _ => false,
        }
    }

    /// Assigns unset targets from the running `current` target, or moves it
    /// to the term's own targets.
    fn assign(mut self, current: &mut i32) -> Self {
        match &mut self {
            QueryTerm::Entity { target } | QueryTerm::Component { target, .. } => {
                if *target == UNSET_TARGET {
                    *target = *current;
                } else {
                    *current = *target;
                }
            }
            QueryTerm::Relation { from_target, to_target, .. } => {
                if *from_target == UNSET_TARGET {
                    *from_target = *current;
                }
                if *to_target == UNSET_TARGET {
                    *to_target = *from_target + 1;
                }
                *current = *to_target;
            }
        }
        self
    }

    /// Copies the targets of `explicit` into `self`.
    fn adopt(&mut self, explicit: &QueryTerm) {
        match (self, explicit) {
            (QueryTerm::Entity { target }, QueryTerm::Entity { target: t })
            | (QueryTerm::Component { target, .. }, QueryTerm::Component { target: t, .. }) => *target = *t,
            (
                QueryTerm::Relation { from_target, to_target, traversal, .. },
                QueryTerm::Relation { from_target: f, to_target: t, traversal: tr, .. },
            ) => {
                *from_target = *f;
                *to_target = *t;
                if *tr != Traversal::Random {
                    *traversal = *tr;
                }
            }
            _ => {}
        }
    }

    /// Merges explicit terms with the implicit terms of a typed query.
    ///
    /// Every implicit term is matched, in order, against the remaining
    /// explicit terms. Explicit terms skipped on the way are emitted first.
    /// A matched implicit term takes the targets of its explicit counterpart;
    /// an unmatched one takes the current target (relations span the current
    /// target and the next one). Leftover explicit terms are appended.
    ///
    /// `implicit` is updated in place with the assigned targets.
    pub fn resolve(types: &Types, explicit: &[QueryTerm], implicit: &mut [QueryTerm]) -> Vec<QueryTerm> {
        let mut current = 0;
        let mut cursor = 0;
        let mut resolved = Vec::with_capacity(explicit.len() + implicit.len());

        for term in implicit.iter_mut() {
            match explicit[cursor..].iter().position(|e| term.accepts(e)) {
                Some(offset) => {
                    for skipped in &explicit[cursor..cursor + offset] {
                        resolved.push(skipped.assign(&mut current));
                    }
                    let matched = explicit[cursor + offset].assign(&mut current);
                    term.adopt(&matched);
                    cursor += offset + 1;
                }
                None => {
                    *term = term.assign(&mut current);
                }
            }
            resolved.push(*term);
        }

        for rest in &explicit[cursor..] {
            resolved.push(rest.assign(&mut current));
        }

        for term in &resolved {
            if let QueryTerm::Component { data_type, .. } | QueryTerm::Relation { data_type, .. } = term {
                if types.contains(*data_type) {
                    log::trace!("query term on `{}`: {:?}", types.name(*data_type), term);
                }
            }
        }
        resolved
    }
}
