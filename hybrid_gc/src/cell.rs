//! Mutable handle field.
//!
//! A `GcCell` wraps one [`Gc`] and never lends out a reference to it. Reads
//! return a new root handle, so every `&T` a caller holds is backed by a
//! count of its own and survives any later retarget of the cell.

use crate::alloc::Gc;
use crate::heap::BlockRef;
use crate::roots::HandleRole;
use crate::trace::{Trace, Tracer};
use std::fmt;

/// A handle field that can be retargeted through a shared reference.
///
/// The wrapped handle keeps its classification across every mutation: inside
/// a managed object it stays a child edge of that object. Handles moved out
/// by [`replace`](GcCell::replace) or [`take`](GcCell::take) are roots.
///
/// # Example
///
/// ```
/// use hybrid_gc::{Gc, GcCell, Heap, Trace, Tracer};
///
/// struct Node {
///     next: GcCell<Node>,
/// }
///
/// unsafe impl Trace for Node {
///     fn trace(&self, tracer: &mut dyn Tracer) {
///         self.next.trace(tracer);
///     }
/// }
///
/// let heap = Heap::with_defaults().unwrap();
/// let a = Gc::new(Node { next: GcCell::null() });
/// let b = Gc::new(Node { next: GcCell::null() });
/// a.next.set(&b);
/// b.next.set(&a);
/// drop((a, b));
///
/// assert_eq!(heap.collect().blocks_freed, 2);
/// ```
pub struct GcCell<T: Trace + 'static> {
    handle: Gc<T>,
}

impl<T: Trace + 'static> GcCell<T> {
    /// Wrap `handle`.
    pub fn new(handle: Gc<T>) -> Self {
        Self { handle }
    }

    /// Create a cell holding a null handle.
    pub fn null() -> Self {
        Self::new(Gc::null())
    }

    /// New root handle to the current target.
    #[inline]
    pub fn get(&self) -> Gc<T> {
        self.handle.clone()
    }

    /// Point the cell at the target of `value`.
    ///
    /// The previous target loses one count once the cell already holds the
    /// new one, and is freed if that was its last.
    pub fn set(&self, value: &Gc<T>) {
        drop(self.replace(value.clone()));
    }

    /// Release the current target, leaving the cell null.
    pub fn set_null(&self) {
        drop(self.take());
    }

    /// Store `value` and return the previous target as a root handle.
    ///
    /// `value` gives up its own slot; the cell keeps its classification.
    pub fn replace(&self, value: Gc<T>) -> Gc<T> {
        // SAFETY: the cell never lends a reference through its handle, and
        // `take` moves the count out so nothing is released here
        let previous = unsafe { self.handle.take() };
        // SAFETY: as above; the handle is null so `set` releases nothing
        unsafe { self.handle.set(&value) };
        // The cell now holds its own count on the new target
        drop(value);
        previous
    }

    /// Move the target out as a root handle, leaving the cell null.
    pub fn take(&self) -> Gc<T> {
        // SAFETY: the cell never lends a reference through its handle
        unsafe { self.handle.take() }
    }

    /// Check if the cell has no live target.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.handle.is_null()
    }

    /// Block the cell points at, if it is still live.
    pub fn block(&self) -> Option<BlockRef> {
        self.handle.block()
    }

    /// Classification of the wrapped handle.
    pub fn role(&self) -> Option<HandleRole> {
        self.handle.role()
    }

    /// Check if the cell points at the same live object as `other`.
    #[inline]
    pub fn ptr_eq(&self, other: &Gc<T>) -> bool {
        Gc::ptr_eq(&self.handle, other)
    }
}

impl<T: Trace + 'static> Default for GcCell<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: Trace + 'static> From<Gc<T>> for GcCell<T> {
    fn from(handle: Gc<T>) -> Self {
        Self::new(handle)
    }
}

impl<T: Trace + 'static> fmt::Debug for GcCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GcCell").field(&self.handle).finish()
    }
}

/// Safety: reports the wrapped handle, which is stored inline.
unsafe impl<T: Trace + 'static> Trace for GcCell<T> {
    #[inline]
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.handle.trace(tracer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Heap;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Holder {
        slot: GcCell<Leaf>,
    }

    unsafe impl Trace for Holder {
        fn trace(&self, tracer: &mut dyn Tracer) {
            self.slot.trace(tracer);
        }
    }

    struct Leaf {
        value: u32,
        drops: Rc<Cell<usize>>,
    }

    impl Drop for Leaf {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    unsafe impl Trace for Leaf {
        fn trace(&self, _tracer: &mut dyn Tracer) {}
    }

    fn leaf(value: u32, drops: &Rc<Cell<usize>>) -> Gc<Leaf> {
        Gc::new(Leaf {
            value,
            drops: drops.clone(),
        })
    }

    fn holder(slot: Gc<Leaf>) -> Gc<Holder> {
        Gc::new(Holder {
            slot: GcCell::new(slot),
        })
    }

    #[test]
    fn test_stored_cell_is_child_edge() {
        let heap = Heap::with_defaults().unwrap();
        let drops = Rc::new(Cell::new(0));
        let holder = holder(leaf(1, &drops));

        let owner = holder.block().unwrap();
        assert_eq!(holder.slot.role(), Some(HandleRole::Child(owner)));
        assert_eq!(heap.root_count(), 1);
    }

    #[test]
    fn test_get_returns_root_clone() {
        let heap = Heap::with_defaults().unwrap();
        let drops = Rc::new(Cell::new(0));
        let holder = holder(leaf(7, &drops));

        let read = holder.slot.get();
        assert_eq!(read.value, 7);
        assert_eq!(read.role(), Some(HandleRole::Root));
        assert_eq!(read.ref_count(), 2);
        assert_eq!(heap.root_count(), 2);
    }

    #[test]
    fn test_set_releases_previous_target() {
        let heap = Heap::with_defaults().unwrap();
        let drops = Rc::new(Cell::new(0));
        let holder = holder(leaf(1, &drops));

        holder.slot.set(&leaf(2, &drops));
        assert_eq!(drops.get(), 1);
        assert_eq!(holder.slot.get().value, 2);
        assert_eq!(heap.block_count(), 2);

        let owner = holder.block().unwrap();
        assert_eq!(holder.slot.role(), Some(HandleRole::Child(owner)));

        holder.slot.set_null();
        assert!(holder.slot.is_null());
        assert_eq!(drops.get(), 2);
        assert_eq!(heap.block_count(), 1);
    }

    #[test]
    fn test_borrow_through_clone_survives_set_null() {
        let heap = Heap::with_defaults().unwrap();
        let drops = Rc::new(Cell::new(0));
        let holder = holder(leaf(3, &drops));

        let pinned = holder.slot.get();
        let value: &Leaf = &pinned;
        holder.slot.set_null();
        assert_eq!(value.value, 3);
        assert_eq!(drops.get(), 0);

        drop(pinned);
        assert_eq!(drops.get(), 1);
        assert_eq!(heap.block_count(), 1);
    }

    #[test]
    fn test_replace_promotes_extracted_handle() {
        let heap = Heap::with_defaults().unwrap();
        let drops = Rc::new(Cell::new(0));
        let holder = holder(leaf(1, &drops));
        let owner = holder.block().unwrap();

        let incoming = leaf(2, &drops);
        let previous = holder.slot.replace(incoming);
        assert_eq!(previous.value, 1);
        assert_eq!(previous.role(), Some(HandleRole::Root));
        assert_eq!(holder.slot.role(), Some(HandleRole::Child(owner)));
        assert_eq!(holder.slot.get().ref_count(), 2);

        // The extracted handle is the only thing keeping its target alive
        drop(holder);
        assert_eq!(drops.get(), 1);
        assert_eq!(heap.collect().blocks_freed, 0);
        assert_eq!(previous.value, 1);
        assert_eq!(heap.block_count(), 1);
    }

    #[test]
    fn test_take_then_collect_keeps_target() {
        let heap = Heap::with_defaults().unwrap();
        let drops = Rc::new(Cell::new(0));
        let holder = holder(leaf(4, &drops));

        let taken = holder.slot.take();
        assert!(holder.slot.is_null());
        assert_eq!(taken.role(), Some(HandleRole::Root));

        drop(holder);
        assert_eq!(heap.collect().blocks_freed, 0);
        assert_eq!(taken.value, 4);
        assert_eq!(drops.get(), 0);
    }

    #[test]
    fn test_cell_outside_heap_objects_is_root() {
        let heap = Heap::with_defaults().unwrap();
        let drops = Rc::new(Cell::new(0));
        let cell = GcCell::new(leaf(5, &drops));
        assert_eq!(cell.role(), Some(HandleRole::Root));

        let other = leaf(6, &drops);
        cell.set(&other);
        assert!(cell.ptr_eq(&other));
        assert_eq!(heap.collect().blocks_freed, 0);
        assert_eq!(heap.block_count(), 1);
    }
}
