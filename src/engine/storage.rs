//! # Type-erased storage
//!
//! The tables of the runtime store values whose Rust type is only known at
//! registration time. This module provides the three building blocks they
//! share:
//!
//! * [`TypeOps`]: a manual vtable (layout, drop, optional clone and default)
//!   captured once per registered type,
//! * [`Column`]: a contiguous, growable array of values of one erased type,
//! * [`AnyValue`]: a single owned value of an erased type, used to carry
//!   components and relations through command buffers and blueprints.
//!
//! ## Ownership discipline
//!
//! Every value written into a column or an `AnyValue` is dropped exactly once:
//! either explicitly (erase, overwrite) or when its container is dropped.
//! Moving a value between containers is a bitwise copy that transfers
//! ownership; the source slot is forgotten, never dropped.
//!
//! ## Zero-sized types
//!
//! Marker types occupy no memory. Columns of zero-sized types never allocate
//! and every row points to the same dangling, well-aligned address.
//!
//! ## Unsafe code
//!
//! This module contains the runtime's raw memory management. Every `unsafe`
//! function documents the invariant its caller must uphold.

use std::alloc::{self, Layout};
use std::any::TypeId;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};

use crate::engine::blueprint::MapEntities;
use crate::engine::types::Entity;


/// Per-type operation table.
///
/// Built from a Rust type with [`TypeOps::of`], optionally extended with
/// [`TypeOps::with_clone`] and [`TypeOps::with_default`]. Columns and values
/// carry a copy of it, so they never need to know the concrete type.

#[derive(Clone, Copy)]
pub struct TypeOps {
    name: &'static str,
    type_id: TypeId,
    layout: Layout,
    drop: unsafe fn(*mut u8),
    clone: Option<unsafe fn(*const u8, *mut u8)>,
    default: Option<unsafe fn(*mut u8)>,
    map_entities: Option<unsafe fn(*mut u8, &mut dyn FnMut(Entity) -> Entity)>,
}

unsafe fn drop_erased<T>(ptr: *mut u8) {
    // SAFETY: caller guarantees `ptr` points to a live, owned `T`.
    unsafe { ptr.cast::<T>().drop_in_place() }
}

unsafe fn clone_erased<T: Clone>(src: *const u8, dst: *mut u8) {
    // SAFETY: caller guarantees `src` is a live `T` and `dst` is writable.
    unsafe { dst.cast::<T>().write((*src.cast::<T>()).clone()) }
}

unsafe fn default_erased<T: Default>(dst: *mut u8) {
    // SAFETY: caller guarantees `dst` is writable and suitably aligned.
    unsafe { dst.cast::<T>().write(T::default()) }
}

unsafe fn map_entities_erased<T: MapEntities>(ptr: *mut u8, map: &mut dyn FnMut(Entity) -> Entity) {
    // SAFETY: caller guarantees `ptr` points to a live, exclusively borrowed `T`.
    unsafe { (*ptr.cast::<T>()).map_entities(map) }
}

impl TypeOps {
    /// Captures the layout and destructor of `T`.
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
            layout: Layout::new::<T>(),
            drop: drop_erased::<T>,
            clone: None,
            default: None,
            map_entities: None,
        }
    }

    /// Adds the clone operation of `T`.
    ///
    /// # Panics
    /// If `T` is not the type these operations were built for.
    pub fn with_clone<T: Clone + 'static>(mut self) -> Self {
        assert_eq!(self.type_id, TypeId::of::<T>(), "clone operation of a different type");
        self.clone = Some(clone_erased::<T>);
        self
    }

    /// Adds the default constructor of `T`.
    ///
    /// # Panics
    /// If `T` is not the type these operations were built for.
    pub fn with_default<T: Default + 'static>(mut self) -> Self {
        assert_eq!(self.type_id, TypeId::of::<T>(), "default operation of a different type");
        self.default = Some(default_erased::<T>);
        self
    }

    /// Adds the entity remapping operation of `T`.
    ///
    /// # Panics
    /// If `T` is not the type these operations were built for.
    pub fn with_entity_map<T: MapEntities + 'static>(mut self) -> Self {
        assert_eq!(self.type_id, TypeId::of::<T>(), "entity map operation of a different type");
        self.map_entities = Some(map_entities_erased::<T>);
        self
    }

    /// Overrides the reported type name.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Name of the type.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Rust type id of the type.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Memory layout of one value.
    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Returns `true` if values of the type occupy no memory.
    #[inline]
    pub fn is_zero_sized(&self) -> bool {
        self.layout.size() == 0
    }

    /// Returns `true` if values can be cloned through these operations.
    #[inline]
    pub fn is_cloneable(&self) -> bool {
        self.clone.is_some()
    }

    /// Returns `true` if values can be default-constructed.
    #[inline]
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Returns `true` if values hold entity handles that can be remapped.
    #[inline]
    pub fn maps_entities(&self) -> bool {
        self.map_entities.is_some()
    }

    /// Returns `true` if these operations describe `T`.
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl std::fmt::Debug for TypeOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeOps")
            .field("name", &self.name)
            .field("size", &self.layout.size())
            .field("align", &self.layout.align())
            .finish()
    }
}

fn dangling(layout: Layout) -> NonNull<u8> {
    NonNull::new(layout.align() as *mut u8).unwrap_or(NonNull::dangling())
}

/// Contiguous array of values of a single erased type.
///
/// ## Invariants
/// * Rows `0..len` are initialized, rows `len..cap` are not.
/// * For zero-sized types `cap` is `usize::MAX` and nothing is allocated.

pub struct Column {
    ops: TypeOps,
    data: NonNull<u8>,
    len: usize,
    cap: usize,
}

// SAFETY: `TypeOps::of` requires `Send + Sync` element types, and a column
// hands out element access only through `&self`/`&mut self`.
unsafe impl Send for Column {}
// SAFETY: see above.
unsafe impl Sync for Column {}

impl Column {
    /// Creates an empty column for the described type.
    pub fn new(ops: TypeOps) -> Self {
        let cap = if ops.is_zero_sized() { usize::MAX } else { 0 };
        Self { ops, data: dangling(ops.layout), len: 0, cap }
    }

    /// Creates an empty column with room for `capacity` values.
    pub fn with_capacity(ops: TypeOps, capacity: usize) -> Self {
        let mut column = Self::new(ops);
        column.reserve(capacity);
        column
    }

    /// Operations of the stored type.
    #[inline]
    pub fn ops(&self) -> &TypeOps {
        &self.ops
    }

    /// Number of stored values.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the column holds no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ensures room for `additional` more values.
    pub fn reserve(&mut self, additional: usize) {
        let size = self.ops.layout.size();
        if size == 0 || self.len + additional <= self.cap {
            return;
        }

        let new_cap = self
            .len
            .checked_add(additional)
            .map(|required| required.max(self.cap.saturating_mul(2)).max(4));
        let bytes = new_cap.and_then(|cap| size.checked_mul(cap));
        let new_layout = match bytes.map(|bytes| Layout::from_size_align(bytes, self.ops.layout.align())) {
            Some(Ok(layout)) => layout,
            _ => {
                log::error!("column of `{}` cannot grow by {} rows", self.ops.name, additional);
                panic!("column capacity overflow");
            }
        };

        let new_data = if self.cap == 0 {
            // SAFETY: `new_layout` has non-zero size.
            unsafe { alloc::alloc(new_layout) }
        } else {
            let old_layout = Layout::from_size_align(size * self.cap, self.ops.layout.align())
                .unwrap_or(new_layout);
            // SAFETY: `data` was allocated with `old_layout`; the new size is non-zero.
            unsafe { alloc::realloc(self.data.as_ptr(), old_layout, new_layout.size()) }
        };

        self.data = match NonNull::new(new_data) {
            Some(data) => data,
            None => alloc::handle_alloc_error(new_layout),
        };
        self.cap = new_layout.size() / size;
    }

    #[inline]
    fn slot(&self, row: usize) -> *mut u8 {
        // SAFETY: callers only pass rows within the allocation; for zero-sized
        // types the offset is always zero.
        unsafe { self.data.as_ptr().add(row * self.ops.layout.size()) }
    }

    #[inline]
    fn check_row(&self, row: usize) {
        assert!(row < self.len, "row {} out of bounds for column of `{}` with {} rows", row, self.ops.name, self.len);
    }

    #[inline]
    fn check_type<T: 'static>(&self) {
        assert!(self.ops.is::<T>(), "column stores `{}`, not `{}`", self.ops.name, std::any::type_name::<T>());
    }

    /// Appends a value by moving its bytes from `src`.
    ///
    /// # Safety
    /// `src` must point to a live value of the column's type. Ownership moves
    /// into the column; the caller must not use or drop the source afterwards.
    pub unsafe fn push_move(&mut self, src: *const u8) {
        self.reserve(1);
        let dst = self.slot(self.len);
        // SAFETY: `dst` is an uninitialized slot inside the allocation and the
        // caller guarantees `src` is a valid value of the same layout.
        unsafe { ptr::copy_nonoverlapping(src, dst, self.ops.layout.size()) };
        self.len += 1;
    }

    /// Appends a typed value.
    ///
    /// # Panics
    /// If `T` is not the column's type.
    pub fn push<T: 'static>(&mut self, value: T) {
        self.check_type::<T>();
        let value = ManuallyDrop::new(value);
        // SAFETY: the type matches and `value` is never dropped here.
        unsafe { self.push_move((&*value as *const T).cast::<u8>()) }
    }

    /// Appends a default-constructed value.
    ///
    /// # Panics
    /// If the type has no default constructor.
    pub fn push_default(&mut self) {
        let Some(default) = self.ops.default else {
            log::error!("`{}` has no default constructor", self.ops.name);
            panic!("type `{}` cannot be default-constructed", self.ops.name);
        };
        self.reserve(1);
        // SAFETY: the slot is uninitialized, aligned and within the allocation.
        unsafe { default(self.slot(self.len)) };
        self.len += 1;
    }

    /// Appends a clone of the value at `src`.
    ///
    /// # Safety
    /// `src` must point to a live value of the column's type.
    ///
    /// # Panics
    /// If the type is not cloneable.
    pub unsafe fn push_copy(&mut self, src: *const u8) {
        let Some(clone) = self.ops.clone else {
            log::error!("`{}` is not cloneable", self.ops.name);
            panic!("type `{}` cannot be cloned", self.ops.name);
        };
        self.reserve(1);
        // SAFETY: caller guarantees `src`; the slot is uninitialized.
        unsafe { clone(src, self.slot(self.len)) };
        self.len += 1;
    }

    /// Replaces the value at `row` with the one at `src`, dropping the old one.
    ///
    /// # Safety
    /// Same contract as [`Column::push_move`].
    pub unsafe fn set_move(&mut self, row: usize, src: *const u8) {
        self.check_row(row);
        let dst = self.slot(row);
        // SAFETY: `dst` holds a live value which is dropped before being
        // overwritten with the caller's value.
        unsafe {
            (self.ops.drop)(dst);
            ptr::copy_nonoverlapping(src, dst, self.ops.layout.size());
        }
    }

    /// Drops the value at `row` and moves the last value into its place.
    pub fn swap_erase(&mut self, row: usize) {
        self.check_row(row);
        // SAFETY: the row is live; it is dropped once and then overwritten by
        // the last row, whose slot is forgotten.
        unsafe { (self.ops.drop)(self.slot(row)) };
        self.fill_from_last(row);
    }

    /// Moves the value at `row` to the end of `dst`, then moves the last value
    /// of `self` into `row`. Nothing is dropped.
    ///
    /// # Panics
    /// If the columns store different types.
    pub fn swap_move(&mut self, row: usize, dst: &mut Column) {
        self.check_row(row);
        assert_eq!(self.ops.type_id, dst.ops.type_id, "cannot move values between columns of different types");
        // SAFETY: the row is live and of the same type as `dst`; its slot is
        // forgotten right after.
        unsafe { dst.push_move(self.slot(row)) };
        self.fill_from_last(row);
    }

    /// Removes the value at `row` without dropping it, moving the last value
    /// into its place. The caller must already own a bitwise copy of it.
    pub(crate) fn swap_forget(&mut self, row: usize) {
        self.check_row(row);
        self.fill_from_last(row);
    }

    fn fill_from_last(&mut self, row: usize) {
        let last = self.len - 1;
        if row != last {
            // SAFETY: both rows are inside the allocation and distinct.
            unsafe { ptr::copy_nonoverlapping(self.slot(last), self.slot(row), self.ops.layout.size()) };
        }
        self.len = last;
    }

    /// Pointer to the value at `row`.
    #[inline]
    pub fn ptr(&self, row: usize) -> *const u8 {
        self.check_row(row);
        self.slot(row)
    }

    /// Mutable pointer to the value at `row`.
    ///
    /// Obtained through a shared reference: the caller is responsible for not
    /// creating aliasing references to the same row.
    #[inline]
    pub fn ptr_mut(&self, row: usize) -> *mut u8 {
        self.check_row(row);
        self.slot(row)
    }

    /// Typed reference to the value at `row`.
    pub fn get<T: 'static>(&self, row: usize) -> &T {
        self.check_type::<T>();
        // SAFETY: the row is live and of type `T`.
        unsafe { &*self.ptr(row).cast::<T>() }
    }

    /// Typed mutable reference to the value at `row`.
    pub fn get_mut<T: 'static>(&mut self, row: usize) -> &mut T {
        self.check_type::<T>();
        // SAFETY: the row is live, of type `T`, and `self` is borrowed mutably.
        unsafe { &mut *self.ptr_mut(row).cast::<T>() }
    }

    /// All values as a typed slice.
    pub fn as_slice<T: 'static>(&self) -> &[T] {
        self.check_type::<T>();
        // SAFETY: rows `0..len` are initialized values of type `T`.
        unsafe { std::slice::from_raw_parts(self.data.as_ptr().cast::<T>(), self.len) }
    }

    /// All values as a typed mutable slice.
    pub fn as_mut_slice<T: 'static>(&mut self) -> &mut [T] {
        self.check_type::<T>();
        // SAFETY: rows `0..len` are initialized values of type `T`.
        unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr().cast::<T>(), self.len) }
    }

    /// Drops every value, keeping the allocation.
    pub fn clear(&mut self) {
        let len = self.len;
        self.len = 0;
        for row in 0..len {
            // SAFETY: each row was live and is dropped exactly once.
            unsafe { (self.ops.drop)(self.slot(row)) };
        }
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        self.clear();
        let size = self.ops.layout.size();
        if size != 0 && self.cap != 0 {
            if let Ok(layout) = Layout::from_size_align(size * self.cap, self.ops.layout.align()) {
                // SAFETY: the allocation was made with exactly this layout.
                unsafe { alloc::dealloc(self.data.as_ptr(), layout) };
            }
        }
    }
}

/// A single owned value of an erased type.

pub struct AnyValue {
    ops: TypeOps,
    data: NonNull<u8>,
}

// SAFETY: `TypeOps::of` requires `Send + Sync` value types.
unsafe impl Send for AnyValue {}
// SAFETY: see above.
unsafe impl Sync for AnyValue {}

impl AnyValue {
    /// Wraps a value.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self::with_ops(TypeOps::of::<T>(), value)
    }

    /// Wraps a cloneable value, keeping its clone operation.
    pub fn cloneable<T: Clone + Send + Sync + 'static>(value: T) -> Self {
        Self::with_ops(TypeOps::of::<T>().with_clone::<T>(), value)
    }

    fn with_ops<T: 'static>(ops: TypeOps, value: T) -> Self {
        let raw = Box::into_raw(Box::new(value)).cast::<u8>();
        let data = NonNull::new(raw).unwrap_or_else(|| dangling(ops.layout));
        Self { ops, data }
    }

    /// Operations of the stored type.
    #[inline]
    pub fn ops(&self) -> &TypeOps {
        &self.ops
    }

    /// Rust type id of the stored value.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.ops.type_id
    }

    /// Pointer to the stored value.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.data.as_ptr()
    }

    /// Typed reference to the stored value, if it is a `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        if self.ops.is::<T>() {
            // SAFETY: the value is a live `T`.
            Some(unsafe { &*self.data.as_ptr().cast::<T>() })
        } else {
            None
        }
    }

    /// Typed mutable reference to the stored value, if it is a `T`.
    pub fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        if self.ops.is::<T>() {
            // SAFETY: the value is a live `T`, borrowed mutably through `self`.
            Some(unsafe { &mut *self.data.as_ptr().cast::<T>() })
        } else {
            None
        }
    }

    /// Unwraps the value, or gives it back if it is not a `T`.
    pub fn downcast<T: 'static>(self) -> Result<T, AnyValue> {
        if !self.ops.is::<T>() {
            return Err(self);
        }
        let this = ManuallyDrop::new(self);
        // SAFETY: the value is a live `T`; its storage is released without
        // running the destructor, which now belongs to the returned value.
        let value = unsafe { this.data.as_ptr().cast::<T>().read() };
        this.release();
        Ok(value)
    }

    /// Wraps a cloneable value holding entity handles, keeping both its clone
    /// and its entity remapping operations.
    pub fn mapped<T: Clone + MapEntities + Send + Sync + 'static>(value: T) -> Self {
        Self::with_ops(TypeOps::of::<T>().with_clone::<T>().with_entity_map::<T>(), value)
    }

    /// Rewrites the entity handles stored in the value through `map`.
    /// Returns `false` if the type has no remapping operation.
    pub fn map_entities(&mut self, map: &mut dyn FnMut(Entity) -> Entity) -> bool {
        match self.ops.map_entities {
            Some(remap) => {
                // SAFETY: the value is live and borrowed mutably through `self`.
                unsafe { remap(self.data.as_ptr(), map) };
                true
            }
            None => false,
        }
    }

    /// Clones the value, if its type registered a clone operation.
    pub fn try_clone(&self) -> Option<AnyValue> {
        let clone = self.ops.clone?;
        let data = if self.ops.is_zero_sized() {
            dangling(self.ops.layout)
        } else {
            // SAFETY: the layout has non-zero size.
            let raw = unsafe { alloc::alloc(self.ops.layout) };
            match NonNull::new(raw) {
                Some(data) => data,
                None => alloc::handle_alloc_error(self.ops.layout),
            }
        };
        // SAFETY: `self.data` is live and `data` is a fresh, writable slot.
        unsafe { clone(self.data.as_ptr(), data.as_ptr()) };
        Some(AnyValue { ops: self.ops, data })
    }

    /// Moves the value to the end of `column`.
    ///
    /// # Panics
    /// If the column stores a different type.
    pub fn move_into(self, column: &mut Column) {
        assert_eq!(self.ops.type_id, column.ops.type_id, "value of `{}` pushed into a column of `{}`", self.ops.name, column.ops.name);
        let this = ManuallyDrop::new(self);
        // SAFETY: the value is live and of the column's type; ownership moves
        // into the column and the box is released without dropping it.
        unsafe { column.push_move(this.data.as_ptr()) };
        this.release();
    }

    /// Moves the value into `row` of `column`, dropping the previous value.
    ///
    /// # Panics
    /// If the column stores a different type.
    pub fn move_into_row(self, column: &mut Column, row: usize) {
        assert_eq!(self.ops.type_id, column.ops.type_id, "value of `{}` written into a column of `{}`", self.ops.name, column.ops.name);
        let this = ManuallyDrop::new(self);
        // SAFETY: same as `move_into`.
        unsafe { column.set_move(row, this.data.as_ptr()) };
        this.release();
    }

    /// Hands the value's bytes to `consume`, which takes ownership of them,
    /// then frees the storage without dropping.
    pub(crate) fn consume_with<R>(self, consume: impl FnOnce(*const u8) -> R) -> R {
        let this = ManuallyDrop::new(self);
        let result = consume(this.data.as_ptr());
        this.release();
        result
    }

    fn release(&self) {
        if !self.ops.is_zero_sized() {
            // SAFETY: non-zero-sized values were boxed or allocated with
            // exactly `ops.layout`.
            unsafe { alloc::dealloc(self.data.as_ptr(), self.ops.layout) };
        }
    }
}

impl Drop for AnyValue {
    fn drop(&mut self) {
        // SAFETY: the value is live and dropped exactly once.
        unsafe { (self.ops.drop)(self.data.as_ptr()) };
        self.release();
    }
}

impl std::fmt::Debug for AnyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyValue").field("type", &self.ops.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counted(Arc<AtomicUsize>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn swap_erase_drops_once_and_moves_last() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut column = Column::new(TypeOps::of::<(u32, Counted)>());
        for i in 0..3u32 {
            column.push((i, Counted(drops.clone())));
        }

        column.swap_erase(0);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert_eq!(column.len(), 2);
        assert_eq!(column.get::<(u32, Counted)>(0).0, 2);
        assert_eq!(column.get::<(u32, Counted)>(1).0, 1);

        drop(column);
        assert_eq!(drops.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn swap_move_transfers_ownership() {
        let drops = Arc::new(AtomicUsize::new(0));
        let ops = TypeOps::of::<Counted>();
        let mut a = Column::new(ops);
        let mut b = Column::new(ops);
        a.push(Counted(drops.clone()));
        a.push(Counted(drops.clone()));

        a.swap_move(0, &mut b);
        assert_eq!((a.len(), b.len()), (1, 1));
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(a);
        drop(b);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn zero_sized_columns_track_length() {
        #[derive(Clone, Copy, Default)]
        struct Marker;

        let mut column = Column::new(TypeOps::of::<Marker>().with_default::<Marker>());
        column.push(Marker);
        column.push_default();
        column.swap_erase(1);
        assert_eq!(column.len(), 1);
    }

    #[test]
    #[should_panic(expected = "column capacity overflow")]
    fn oversized_reservations_panic_instead_of_wrapping() {
        let mut column = Column::new(TypeOps::of::<[u64; 4]>());
        column.push([0u64; 4]);
        column.reserve(usize::MAX / 16);
    }

    #[test]
    fn any_value_round_trips_and_clones() {
        let value = AnyValue::cloneable(String::from("hello"));
        let copy = value.try_clone().unwrap();
        assert_eq!(copy.downcast_ref::<String>().map(String::as_str), Some("hello"));
        assert!(value.downcast_ref::<u32>().is_none());
        assert_eq!(value.downcast::<String>().ok().as_deref(), Some("hello"));
        assert!(AnyValue::new(3u8).try_clone().is_none());
    }
}
