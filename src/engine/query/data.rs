//! Typed access to the data of a query match.
//!
//! A [`QueryData`] type describes both the implicit terms of a typed query
//! and how to read one match back as Rust values:
//!
//! | Type | Term | Item |
//! |---|---|---|
//! | [`Entity`] | entity | the bound handle |
//! | `&T` / `&mut T` | component or relation, by the kind `T` is registered as | the value |
//! | `Option<&T>` / `Option<&mut T>` | optional component | the value, if present |
//! | [`Up<Q>`] / [`Down<Q>`] | the terms of `Q`, with their relations visited up or down | `Q`'s item |
//! | tuples of up to eight | concatenated terms | tuple of items |

use std::marker::PhantomData;

use crate::engine::query::filter::QueryMatch;
use crate::engine::query::term::{QueryTerm, Traversal, UNSET_TARGET};
use crate::engine::registry::{DataKind, Types};
use crate::engine::types::{ColumnId, DataTypeId, Entity};
use crate::engine::world::World;


/// Data types read and written by a query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryAccess {
    /// Types read.
    pub reads: Vec<DataTypeId>,
    /// Types written.
    pub writes: Vec<DataTypeId>,
}

/// Cursor over the resolved implicit terms of one match.
pub struct Fetch<'a, 'w> {
    pub(crate) world: &'w World,
    pub(crate) matched: &'a QueryMatch,
    pub(crate) terms: &'a [QueryTerm],
    /// Target index of entity and component terms, link index of relation
    /// terms.
    pub(crate) slots: &'a [usize],
    pub(crate) cursor: usize,
}

impl<'a, 'w> Fetch<'a, 'w> {
    fn take(&mut self) -> (QueryTerm, usize) {
        let taken = (self.terms[self.cursor], self.slots[self.cursor]);
        self.cursor += 1;
        taken
    }

    /// Pointer to the value of the next term, or null if the bound entity has
    /// no such component.
    fn next_ptr(&mut self) -> *mut u8 {
        let (term, slot) = self.take();
        match term {
            QueryTerm::Component { data_type, .. } => {
                let (archetype, row) = self.matched.locations[slot];
                self.world
                    .tables()
                    .dense(archetype)
                    .and_then(|table| table.try_column(ColumnId::make(data_type)))
                    .map_or(std::ptr::null_mut(), |column| column.ptr_mut(row))
            }
            QueryTerm::Relation { data_type, .. } => {
                let edge = self.matched.relations[slot];
                self.world.tables().relation_layers(data_type)[edge.depth].value_ptr_mut(edge.row)
            }
            QueryTerm::Entity { .. } => unreachable!("entity terms carry no value"),
        }
    }
}

/// Data fetched by a typed query.
///
/// # Safety
/// `terms` must push exactly one term per value `fetch` consumes, in the same
/// order, and `access` must report every type `fetch` reads or writes.
pub unsafe trait QueryData {
    /// Value produced for one match.
    type Item<'w>;

    /// Appends the implicit terms, with unset targets.
    fn terms(types: &Types, out: &mut Vec<QueryTerm>);

    /// Records the accessed types.
    fn access(types: &Types, access: &mut QueryAccess);

    /// Reads the item of the current match.
    ///
    /// # Safety
    /// The match must satisfy the terms, and no other live reference may
    /// alias the values written by this item.
    unsafe fn fetch<'w>(fetch: &mut Fetch<'_, 'w>) -> Self::Item<'w>;
}

/// Query data that never writes.
///
/// # Safety
/// `access` must report no writes.
pub unsafe trait ReadOnlyQueryData: QueryData {}

fn registered<T: 'static>(types: &Types) -> DataTypeId {
    match types.id_of::<T>() {
        Some(id) => id,
        None => {
            log::error!("query on unregistered type `{}`", std::any::type_name::<T>());
            panic!("type `{}` is not registered", std::any::type_name::<T>());
        }
    }
}

fn value_term(types: &Types, data_type: DataTypeId) -> QueryTerm {
    match types.kind(data_type) {
        DataKind::Component => QueryTerm::with_component(data_type, UNSET_TARGET),
        DataKind::Relation(_) => QueryTerm::relation(data_type, UNSET_TARGET, UNSET_TARGET),
        DataKind::Resource => {
            log::error!("query on resource `{}`", types.name(data_type));
            panic!("resources cannot be queried");
        }
    }
}

fn optional_term(types: &Types, data_type: DataTypeId) -> QueryTerm {
    if !types.is_component(data_type) {
        log::error!("optional query term on `{}`, which is not a component", types.name(data_type));
        panic!("only components can be optional");
    }
    QueryTerm::opt_component(data_type, UNSET_TARGET)
}

unsafe impl QueryData for Entity {
    type Item<'w> = Entity;

    fn terms(_types: &Types, out: &mut Vec<QueryTerm>) {
        out.push(QueryTerm::entity(UNSET_TARGET));
    }

    fn access(_types: &Types, _access: &mut QueryAccess) {}

    unsafe fn fetch<'w>(fetch: &mut Fetch<'_, 'w>) -> Entity {
        let (_, target) = fetch.take();
        fetch.matched.entities[target]
    }
}

unsafe impl ReadOnlyQueryData for Entity {}

unsafe impl<T: 'static> QueryData for &T {
    type Item<'w> = &'w T;

    fn terms(types: &Types, out: &mut Vec<QueryTerm>) {
        out.push(value_term(types, registered::<T>(types)));
    }

    fn access(types: &Types, access: &mut QueryAccess) {
        access.reads.push(registered::<T>(types));
    }

    unsafe fn fetch<'w>(fetch: &mut Fetch<'_, 'w>) -> &'w T {
        let ptr = fetch.next_ptr();
        // SAFETY: required terms always have a value, of type `T`.
        unsafe { &*(ptr as *const T) }
    }
}

unsafe impl<T: 'static> ReadOnlyQueryData for &T {}

unsafe impl<T: 'static> QueryData for &mut T {
    type Item<'w> = &'w mut T;

    fn terms(types: &Types, out: &mut Vec<QueryTerm>) {
        out.push(value_term(types, registered::<T>(types)));
    }

    fn access(types: &Types, access: &mut QueryAccess) {
        access.writes.push(registered::<T>(types));
    }

    unsafe fn fetch<'w>(fetch: &mut Fetch<'_, 'w>) -> &'w mut T {
        let ptr = fetch.next_ptr();
        // SAFETY: required terms always have a value, of type `T`; the caller
        // rules out aliasing.
        unsafe { &mut *(ptr as *mut T) }
    }
}

unsafe impl<T: 'static> QueryData for Option<&T> {
    type Item<'w> = Option<&'w T>;

    fn terms(types: &Types, out: &mut Vec<QueryTerm>) {
        out.push(optional_term(types, registered::<T>(types)));
    }

    fn access(types: &Types, access: &mut QueryAccess) {
        access.reads.push(registered::<T>(types));
    }

    unsafe fn fetch<'w>(fetch: &mut Fetch<'_, 'w>) -> Option<&'w T> {
        let ptr = fetch.next_ptr() as *const T;
        // SAFETY: non-null pointers address a live `T`.
        unsafe { ptr.as_ref() }
    }
}

unsafe impl<T: 'static> ReadOnlyQueryData for Option<&T> {}

unsafe impl<T: 'static> QueryData for Option<&mut T> {
    type Item<'w> = Option<&'w mut T>;

    fn terms(types: &Types, out: &mut Vec<QueryTerm>) {
        out.push(optional_term(types, registered::<T>(types)));
    }

    fn access(types: &Types, access: &mut QueryAccess) {
        access.writes.push(registered::<T>(types));
    }

    unsafe fn fetch<'w>(fetch: &mut Fetch<'_, 'w>) -> Option<&'w mut T> {
        let ptr = fetch.next_ptr() as *mut T;
        // SAFETY: non-null pointers address a live `T`; the caller rules out
        // aliasing.
        unsafe { ptr.as_mut() }
    }
}

fn set_traversal(terms: &mut [QueryTerm], order: Traversal) {
    for term in terms {
        if let QueryTerm::Relation { traversal, .. } = term {
            *traversal = order;
        }
    }
}

/// Visits the relations of `Q` from the leaves towards the roots.
pub struct Up<Q>(PhantomData<Q>);

/// Visits the relations of `Q` from the roots towards the leaves.
pub struct Down<Q>(PhantomData<Q>);

macro_rules! impl_traversal {
    ($wrapper:ident, $order:expr) => {
        unsafe impl<Q: QueryData> QueryData for $wrapper<Q> {
            type Item<'w> = Q::Item<'w>;

            fn terms(types: &Types, out: &mut Vec<QueryTerm>) {
                let start = out.len();
                Q::terms(types, out);
                set_traversal(&mut out[start..], $order);
            }

            fn access(types: &Types, access: &mut QueryAccess) {
                Q::access(types, access);
            }

            unsafe fn fetch<'w>(fetch: &mut Fetch<'_, 'w>) -> Self::Item<'w> {
                // SAFETY: forwarded contract.
                unsafe { Q::fetch(fetch) }
            }
        }

        unsafe impl<Q: ReadOnlyQueryData> ReadOnlyQueryData for $wrapper<Q> {}
    };
}

impl_traversal!(Up, Traversal::Up);
impl_traversal!(Down, Traversal::Down);

macro_rules! impl_query_data_tuple {
    ($($name:ident),+) => {
        unsafe impl<$($name: QueryData),+> QueryData for ($($name,)+) {
            type Item<'w> = ($($name::Item<'w>,)+);

            fn terms(types: &Types, out: &mut Vec<QueryTerm>) {
                $($name::terms(types, out);)+
            }

            fn access(types: &Types, access: &mut QueryAccess) {
                $($name::access(types, access);)+
            }

            unsafe fn fetch<'w>(fetch: &mut Fetch<'_, 'w>) -> Self::Item<'w> {
                // SAFETY: forwarded contract; elements are fetched in term order.
                unsafe { ($($name::fetch(fetch),)+) }
            }
        }

        unsafe impl<$($name: ReadOnlyQueryData),+> ReadOnlyQueryData for ($($name,)+) {}
    };
}

impl_query_data_tuple!(A);
impl_query_data_tuple!(A, B);
impl_query_data_tuple!(A, B, C);
impl_query_data_tuple!(A, B, C, D);
impl_query_data_tuple!(A, B, C, D, E);
impl_query_data_tuple!(A, B, C, D, E, F);
impl_query_data_tuple!(A, B, C, D, E, F, G);
impl_query_data_tuple!(A, B, C, D, E, F, G, H);
