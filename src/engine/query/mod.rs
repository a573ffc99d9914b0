//! Typed queries over entities, components and relations.
//!
//! ## Layers
//! * [`term`]: the constraints of a query and their target resolution.
//! * [`filter`]: evaluation of resolved terms against the world.
//! * [`data`]: reading a match back as Rust values.
//!
//! [`Query`] ties the three together:
//!
//! ```ignore
//! let mut query = Query::<(&mut Position, &Velocity)>::new(&world);
//! let mut view = query.view(&mut world);
//! while let Some((position, velocity)) = view.next() {
//!     position.x += velocity.x;
//! }
//! ```
//!
//! ## Relations
//! A relation in the data spans two targets. The query below visits every
//! child (target 0) with its parent (target 1), leaves first:
//!
//! ```ignore
//! let mut query = Query::<(Entity, Up<&ChildOf>, Entity)>::new(&world);
//! ```
//!
//! ## Aliasing
//! Items are lent by [`QueryView::next`], so at most one item is alive at a
//! time. A type written by a query may appear only once in it and must not be
//! read by it as well.

pub mod data;
pub mod filter;
pub mod term;

use std::marker::PhantomData;

pub use data::{Down, Fetch, QueryAccess, QueryData, ReadOnlyQueryData, Up};
pub use filter::{FilterView, Link, QueryFilter, QueryMatch, RelationMatch};
pub use term::{QueryTerm, Traversal, UNSET_TARGET};

use crate::engine::registry::Types;
use crate::engine::systems::SystemInfo;
use crate::engine::types::Entity;
use crate::engine::world::World;


/// A typed query, built once and viewed many times.
pub struct Query<D: QueryData> {
    filter: QueryFilter,
    terms: Vec<QueryTerm>,
    slots: Vec<usize>,
    info: SystemInfo,
    marker: PhantomData<fn() -> D>,
}

fn check_access(types: &Types, access: &QueryAccess) {
    for (i, written) in access.writes.iter().enumerate() {
        if access.writes[..i].contains(written) || access.reads.contains(written) {
            log::error!("query accesses `{}` mutably more than once", types.name(*written));
            panic!("type `{}` is written by the query and accessed again", types.name(*written));
        }
    }
}

fn slot_of(filter: &QueryFilter, term: &QueryTerm) -> usize {
    match *term {
        QueryTerm::Entity { target } | QueryTerm::Component { target, .. } => target as usize,
        QueryTerm::Relation { data_type, from_target, to_target, .. } => {
            match filter.link_index(data_type, from_target as usize, to_target as usize) {
                Some(link) => link,
                None => panic!("relation term {:?} has no link", term),
            }
        }
    }
}

impl<D: QueryData> Query<D> {
    /// Builds the query from the terms of `D` alone.
    pub fn new(world: &World) -> Self {
        Self::with_terms(world, &[])
    }

    /// Builds the query from the terms of `D` merged with `explicit` terms.
    ///
    /// # Panics
    /// If a type of `D` is not registered, or is written and accessed again.
    pub fn with_terms(world: &World, explicit: &[QueryTerm]) -> Self {
        let types = world.types();
        let mut terms = Vec::new();
        D::terms(types, &mut terms);
        let resolved = QueryTerm::resolve(types, explicit, &mut terms);
        let filter = QueryFilter::new(world, &resolved);
        let slots = terms.iter().map(|term| slot_of(&filter, term)).collect();

        let mut access = QueryAccess::default();
        D::access(types, &mut access);
        check_access(types, &access);
        let info = SystemInfo::from_access(types, &access);

        log::debug!(
            "built query `{}` with {} terms over {} targets",
            std::any::type_name::<D>(),
            resolved.len(),
            filter.target_count()
        );
        Self { filter, terms, slots, info, marker: PhantomData }
    }

    /// Discovers archetypes created since the last update.
    pub fn update(&mut self, world: &World) {
        self.filter.update(world);
    }

    /// Access of the query.
    pub fn info(&self) -> &SystemInfo {
        &self.info
    }

    /// Compiled filter.
    pub fn filter(&self) -> &QueryFilter {
        &self.filter
    }

    /// Resolved terms of `D`, in fetch order.
    pub fn terms(&self) -> &[QueryTerm] {
        &self.terms
    }

    /// Starts iterating over `world`.
    pub fn view<'w>(&'w mut self, world: &'w mut World) -> QueryView<'w, D> {
        self.filter.update(world);
        let world: &'w World = world;
        self.make_view(world)
    }

    /// Starts iterating over a shared `world`.
    pub fn view_ref<'w>(&'w mut self, world: &'w World) -> QueryView<'w, D>
    where
        D: ReadOnlyQueryData,
    {
        self.filter.update(world);
        self.make_view(world)
    }

    fn make_view<'w>(&'w self, world: &'w World) -> QueryView<'w, D> {
        QueryView {
            inner: self.filter.view(world),
            terms: &self.terms,
            slots: &self.slots,
            marker: PhantomData,
        }
    }
}

/// One pass of a [`Query`] over the world.
pub struct QueryView<'w, D: QueryData> {
    inner: FilterView<'w>,
    terms: &'w [QueryTerm],
    slots: &'w [usize],
    marker: PhantomData<fn() -> D>,
}

impl<'w, D: QueryData> QueryView<'w, D> {
    /// Fixes `target` to `entity`.
    ///
    /// # Panics
    /// If the target does not exist, is already pinned, or iteration has
    /// started.
    pub fn pin(self, target: usize, entity: Entity) -> Self {
        Self { inner: self.inner.pin(target, entity), ..self }
    }

    /// The world being iterated.
    pub fn world(&self) -> &'w World {
        self.inner.world()
    }

    fn fetch<'a>(&'a self) -> D::Item<'a> {
        let world: &'a World = self.inner.world();
        let mut fetch = Fetch {
            world,
            matched: self.inner.current(),
            terms: self.terms,
            slots: self.slots,
            cursor: 0,
        };
        // SAFETY: the match satisfies the terms and the item borrows the view,
        // so no other item of this query is alive.
        unsafe { D::fetch(&mut fetch) }
    }

    fn fetch_owned(self) -> D::Item<'w> {
        let world: &'w World = self.inner.world();
        let mut fetch = Fetch {
            world,
            matched: self.inner.current(),
            terms: self.terms,
            slots: self.slots,
            cursor: 0,
        };
        // SAFETY: the view is consumed, so this is the last item it yields.
        unsafe { D::fetch(&mut fetch) }
    }

    /// Next match.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<D::Item<'_>> {
        if self.inner.advance() {
            Some(self.fetch())
        } else {
            None
        }
    }

    /// First match.
    pub fn first(mut self) -> Option<D::Item<'w>> {
        if self.inner.advance() {
            Some(self.fetch_owned())
        } else {
            None
        }
    }

    /// Match with `entity` as target 0.
    pub fn at(self, entity: Entity) -> Option<D::Item<'w>> {
        self.pin(0, entity).first()
    }

    /// Number of matches.
    pub fn count(mut self) -> usize {
        let mut count = 0;
        while self.inner.advance() {
            count += 1;
        }
        count
    }

    /// Raw matches, without fetching values.
    pub fn matches(self) -> FilterView<'w> {
        self.inner
    }
}

impl<'w, D: ReadOnlyQueryData> QueryView<'w, D> {
    /// Standard iterator over read-only items.
    pub fn iter(self) -> QueryIter<'w, D> {
        QueryIter { view: self }
    }
}

/// Iterator over the items of a read-only query.
pub struct QueryIter<'w, D: ReadOnlyQueryData> {
    view: QueryView<'w, D>,
}

impl<'w, D: ReadOnlyQueryData> Iterator for QueryIter<'w, D> {
    type Item = D::Item<'w>;

    fn next(&mut self) -> Option<D::Item<'w>> {
        if !self.view.inner.advance() {
            return None;
        }
        let world: &'w World = self.view.inner.world();
        let mut fetch = Fetch {
            world,
            matched: self.view.inner.current(),
            terms: self.view.terms,
            slots: self.view.slots,
            cursor: 0,
        };
        // SAFETY: read-only items never alias mutably.
        Some(unsafe { D::fetch(&mut fetch) })
    }
}
