//! Growable sequence of managed handles.
//!
//! A `GcVec` keeps its elements in a storage block of its own, tagged
//! [`BlockKind::Container`]. Element handles are child edges of that
//! storage block, and the `GcVec` handle is in turn a root or a child edge of
//! whatever holds it. Elements are therefore reachable exactly when the
//! vector is, and an unreachable vector is swept together with its storage.

use crate::alloc::Gc;
use crate::error::GcResult;
use crate::heap::{managed, BlockKind};
use crate::roots::HandleRole;
use crate::trace::{Trace, Tracer};
use std::cell::RefCell;
use std::fmt;

/// Backing storage of a [`GcVec`].
struct VecStorage<T: Trace + 'static> {
    items: RefCell<Vec<Gc<T>>>,
}

/// Safety: reports only the element handles it owns. A list that is
/// mutably borrowed while being traced is skipped, so its elements stay as
/// they were classified.
unsafe impl<T: Trace + 'static> Trace for VecStorage<T> {
    fn trace(&self, tracer: &mut dyn Tracer) {
        if let Ok(items) = self.items.try_borrow() {
            for item in items.iter() {
                item.trace(tracer);
            }
        }
    }
}

/// A vector of [`Gc`] handles whose elements are traced through the vector.
///
/// Elements are handed out as fresh root handles; pushing a handle in
/// demotes it to a child edge of the storage block and popping it out
/// promotes it back to a root.
///
/// # Example
///
/// ```
/// use hybrid_gc::{Gc, GcVec, Heap};
///
/// let heap = Heap::with_defaults().unwrap();
/// let list = GcVec::new();
/// list.push(Gc::new(1u32));
/// list.push(Gc::new(2u32));
///
/// assert_eq!(list.len(), 2);
/// assert_eq!(*list.get(1).unwrap(), 2);
/// assert_eq!(heap.root_count(), 1);
/// ```
pub struct GcVec<T: Trace + 'static> {
    storage: Gc<VecStorage<T>>,
}

impl<T: Trace + 'static> GcVec<T> {
    /// Create an empty vector.
    ///
    /// # Panics
    ///
    /// Panics if no heap is initialized on this thread.
    pub fn new() -> Self {
        Self::try_new().unwrap_or_else(|err| panic!("failed to allocate GcVec storage: {err}"))
    }

    /// Create an empty vector.
    pub fn try_new() -> GcResult<Self> {
        Self::try_with_capacity(0)
    }

    /// Create an empty vector with room for `capacity` elements.
    pub fn try_with_capacity(capacity: usize) -> GcResult<Self> {
        let storage = VecStorage {
            items: RefCell::new(Vec::with_capacity(capacity)),
        };
        let storage = managed::alloc_object(storage, BlockKind::Container)?;
        Ok(Self { storage })
    }

    /// Append an element, adopting it as an edge of the storage block.
    pub fn push(&self, item: Gc<T>) {
        let Ok(storage) = self.storage.try_get() else {
            return;
        };
        if let Some(block) = self.storage.block() {
            item.reclassify(HandleRole::Child(block));
        }
        storage.items.borrow_mut().push(item);
    }

    /// Remove the last element, returning it as a root handle.
    pub fn pop(&self) -> Option<Gc<T>> {
        let storage = self.storage.try_get().ok()?;
        let item = storage.items.borrow_mut().pop()?;
        item.reclassify(HandleRole::Root);
        Some(item)
    }

    /// New root handle to the element at `index`.
    pub fn get(&self, index: usize) -> Option<Gc<T>> {
        let storage = self.storage.try_get().ok()?;
        let items = storage.items.borrow();
        items.get(index).map(Gc::clone)
    }

    /// Point the element at `index` at the target of `item`.
    ///
    /// Returns false if `index` is out of bounds. The previous target is
    /// released after the element is replaced, so its destructor may use
    /// this vector.
    pub fn set(&self, index: usize, item: &Gc<T>) -> bool {
        let (Ok(storage), Some(block)) = (self.storage.try_get(), self.storage.block()) else {
            return false;
        };
        let fresh = item.clone();
        fresh.reclassify(HandleRole::Child(block));
        let previous = {
            let mut items = storage.items.borrow_mut();
            match items.get_mut(index) {
                Some(slot) => std::mem::replace(slot, fresh),
                None => return false,
            }
        };
        drop(previous);
        true
    }

    /// Insert an element at `index`, shifting later elements.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&self, index: usize, item: Gc<T>) {
        let Ok(storage) = self.storage.try_get() else {
            return;
        };
        let len = storage.items.borrow().len();
        assert!(index <= len, "insertion index {index} out of bounds (len {len})");

        if let Some(block) = self.storage.block() {
            item.reclassify(HandleRole::Child(block));
        }
        storage.items.borrow_mut().insert(index, item);
    }

    /// Remove the element at `index`, returning it as a root handle.
    pub fn remove(&self, index: usize) -> Option<Gc<T>> {
        let storage = self.storage.try_get().ok()?;
        let item = {
            let mut items = storage.items.borrow_mut();
            if index >= items.len() {
                return None;
            }
            items.remove(index)
        };
        item.reclassify(HandleRole::Root);
        Some(item)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.storage
            .try_get()
            .map(|storage| storage.items.borrow().len())
            .unwrap_or(0)
    }

    /// Check if there are no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every element.
    pub fn clear(&self) {
        let Ok(storage) = self.storage.try_get() else {
            return;
        };
        let items = std::mem::take(&mut *storage.items.borrow_mut());
        drop(items);
    }

    /// Root handles to every element, in order.
    pub fn to_vec(&self) -> Vec<Gc<T>> {
        self.storage
            .try_get()
            .map(|storage| storage.items.borrow().iter().map(Gc::clone).collect())
            .unwrap_or_default()
    }

    /// Check if some element points at the same object as `item`.
    pub fn contains(&self, item: &Gc<T>) -> bool {
        self.storage
            .try_get()
            .map(|storage| {
                storage
                    .items
                    .borrow()
                    .iter()
                    .any(|element| Gc::ptr_eq(element, item))
            })
            .unwrap_or(false)
    }
}

impl<T: Trace + 'static> Default for GcVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Trace + 'static> Clone for GcVec<T> {
    /// Shares the same storage.
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
        }
    }
}

impl<T: Trace + 'static> fmt::Debug for GcVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcVec")
            .field("len", &self.len())
            .field("storage", &self.storage.block())
            .finish()
    }
}

/// Safety: reports the storage handle, which is stored inline.
unsafe impl<T: Trace + 'static> Trace for GcVec<T> {
    #[inline]
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.storage.trace(tracer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Heap;

    #[test]
    fn test_push_adopts_elements() {
        let heap = Heap::with_defaults().unwrap();
        let list = GcVec::new();
        let item = Gc::new(5u32);
        let storage = list.storage.as_ptr().cast::<u8>();

        list.push(item.clone());
        assert_eq!(list.len(), 1);
        assert_eq!(heap.root_count(), 2); // list + item
        let info = heap.find(storage).unwrap();
        assert_eq!(info.kind, BlockKind::Container);
        assert_eq!(info.edges, 1);
        assert_eq!(item.role(), Some(HandleRole::Root));
        assert_eq!(list.get(0).unwrap().role(), Some(HandleRole::Root));
        assert!(list.contains(&item));
    }

    #[test]
    fn test_pop_promotes_to_root() {
        let heap = Heap::with_defaults().unwrap();
        let list = GcVec::new();
        list.push(Gc::new(1u32));
        list.push(Gc::new(2u32));
        assert_eq!(heap.root_count(), 1);

        let last = list.pop().unwrap();
        assert_eq!(*last, 2);
        assert_eq!(last.role(), Some(HandleRole::Root));
        assert_eq!(heap.root_count(), 2);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_elements_survive_collection() {
        let heap = Heap::with_defaults().unwrap();
        let list = GcVec::new();
        for i in 0..10u32 {
            list.push(Gc::new(i));
        }

        let result = heap.collect();
        assert_eq!(result.blocks_freed, 0);
        assert_eq!(heap.block_count(), 11);
        assert_eq!(list.to_vec().iter().map(|item| **item).sum::<u32>(), 45);
    }

    #[test]
    fn test_set_insert_remove() {
        let heap = Heap::with_defaults().unwrap();
        let list = GcVec::new();
        list.push(Gc::new(1u32));
        list.push(Gc::new(3u32));

        list.insert(1, Gc::new(2u32));
        let values: Vec<u32> = list.to_vec().iter().map(|item| **item).collect();
        assert_eq!(values, [1, 2, 3]);

        assert!(list.set(0, &Gc::new(10u32)));
        assert_eq!(*list.get(0).unwrap(), 10);
        assert!(!list.set(7, &Gc::new(0u32)));
        assert_eq!(heap.block_count(), 4);

        let removed = list.remove(1).unwrap();
        assert_eq!(*removed, 2);
        assert!(list.remove(5).is_none());
        drop(removed);
        assert_eq!(heap.block_count(), 3);
    }

    #[test]
    fn test_set_keeps_element_as_child() {
        let heap = Heap::with_defaults().unwrap();
        let list = GcVec::new();
        list.push(Gc::new(1u32));
        let storage = list.storage.as_ptr().cast::<u8>();

        let replacement = Gc::new(2u32);
        assert!(list.set(0, &replacement));
        assert_eq!(replacement.role(), Some(HandleRole::Root));
        assert_eq!(replacement.ref_count(), 2);
        assert_eq!(heap.find(storage).unwrap().edges, 1);
        assert_eq!(heap.root_count(), 2); // list + replacement
    }

    #[test]
    fn test_element_clone_survives_set_and_clear() {
        let heap = Heap::with_defaults().unwrap();
        let list = GcVec::new();
        list.push(Gc::new(1u32));

        let first = list.get(0).unwrap();
        let value: &u32 = &first;
        assert!(list.set(0, &Gc::new(2u32)));
        assert_eq!(*value, 1);

        list.clear();
        assert_eq!(*value, 1);
        assert_eq!(heap.block_count(), 2); // storage + first
    }

    #[test]
    fn test_set_tolerates_destructor_shrinking_vec() {
        struct Entry {
            value: u32,
            on_drop: Option<GcVec<Entry>>,
        }

        impl Drop for Entry {
            fn drop(&mut self) {
                if let Some(list) = self.on_drop.take() {
                    list.clear();
                }
            }
        }

        unsafe impl Trace for Entry {
            fn trace(&self, tracer: &mut dyn Tracer) {
                self.on_drop.trace(tracer);
            }
        }

        let heap = Heap::with_defaults().unwrap();
        let list = GcVec::new();
        list.push(Gc::new(Entry {
            value: 1,
            on_drop: Some(list.clone()),
        }));
        list.push(Gc::new(Entry {
            value: 2,
            on_drop: None,
        }));

        // Releasing the first entry empties the vector it is being replaced in
        let replacement = Gc::new(Entry {
            value: 3,
            on_drop: None,
        });
        assert!(list.set(0, &replacement));
        assert!(list.is_empty());
        assert_eq!(replacement.value, 3);
        assert_eq!(replacement.ref_count(), 1);
        assert_eq!(heap.block_count(), 2); // storage + replacement
    }

    #[test]
    fn test_clear_releases_elements() {
        let heap = Heap::with_defaults().unwrap();
        let list = GcVec::new();
        list.push(Gc::new(1u32));
        list.push(Gc::new(2u32));

        list.clear();
        assert!(list.is_empty());
        assert_eq!(heap.block_count(), 1);
    }

    #[test]
    fn test_dropping_vec_frees_storage_and_elements() {
        let heap = Heap::with_defaults().unwrap();
        {
            let list = GcVec::new();
            list.push(Gc::new(1u32));
        }
        assert_eq!(heap.block_count(), 0);
        assert_eq!(heap.root_count(), 0);
    }
}
