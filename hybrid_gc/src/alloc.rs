//! Reference-counted managed handle.
//!
//! `Gc<T>` points at a managed block and holds one unit of its count. Every
//! handle has a slot in the heap's handle table recording its role: a root
//! (stored outside any managed block) or a child edge of the block it is
//! stored in. Handles start out as roots and are demoted to child edges when
//! the value holding them is moved into a block.

use crate::error::{GcError, GcResult};
use crate::heap::{managed, with_state, BlockKind, BlockRef};
use crate::roots::{HandleId, HandleRole};
use crate::trace::{Trace, Tracer};
use std::cell::Cell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

/// A counted reference to a managed object.
///
/// Dropping the last handle to a block frees it immediately. Blocks kept
/// alive only by a cycle are freed by [`Heap::collect`](crate::Heap::collect).
///
/// A `Gc` field is fixed once its object is allocated. Fields that change
/// belong in a [`GcCell`](crate::GcCell); the in-place mutators on `Gc`
/// itself are `unsafe`.
///
/// Handles are bound to the thread that created them. Once that thread's
/// heap is torn down they become inert: every operation is a no-op and
/// dereferencing fails.
pub struct Gc<T: Trace + 'static> {
    /// Slot in the handle table.
    id: Cell<HandleId>,
    /// Address of the target object, valid while the target is registered.
    ptr: Cell<Option<NonNull<T>>>,
    _marker: PhantomData<T>,
}

impl<T: Trace + 'static> Gc<T> {
    pub(crate) fn from_parts(id: HandleId, ptr: Option<NonNull<T>>) -> Self {
        Self {
            id: Cell::new(id),
            ptr: Cell::new(ptr),
            _marker: PhantomData,
        }
    }

    /// Create a null root handle.
    pub fn null() -> Self {
        let id = with_state(|state| state.register_handle(HandleRole::Root, None))
            .unwrap_or(HandleId::DETACHED);
        Self::from_parts(id, None)
    }

    /// Allocate `value` in a new managed block.
    ///
    /// # Panics
    ///
    /// Panics if no heap is initialized on this thread or the allocation
    /// fails. Use [`Gc::try_new`] to handle those cases.
    pub fn new(value: T) -> Self {
        Self::try_new(value).unwrap_or_else(|err| {
            panic!(
                "failed to allocate Gc<{}>: {err}",
                std::any::type_name::<T>()
            )
        })
    }

    /// Allocate `value` in a new managed block.
    pub fn try_new(value: T) -> GcResult<Self> {
        managed::alloc_object(value, BlockKind::Object)
    }

    /// Borrow the target object.
    ///
    /// Fails with [`GcError::NullDereference`] if the handle is null or its
    /// target has been released, and with [`GcError::NoHeap`] if the heap is
    /// gone.
    pub fn try_get(&self) -> GcResult<&T> {
        let target = with_state(|state| state.target_of(self.id.get())).ok_or(GcError::NoHeap)?;
        match (target, self.ptr.get()) {
            // SAFETY: the target block is registered, so the object at its
            // start address is initialized and not yet destroyed
            (Some(_), Some(ptr)) => Ok(unsafe { ptr.as_ref() }),
            _ => Err(GcError::NullDereference),
        }
    }

    /// Check if the handle has no live target.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.block().is_none()
    }

    /// Block this handle points at, if it is still live.
    pub fn block(&self) -> Option<BlockRef> {
        with_state(|state| state.target_of(self.id.get())).flatten()
    }

    /// Current classification of this handle.
    ///
    /// Returns `None` for handles not registered with a live heap.
    pub fn role(&self) -> Option<HandleRole> {
        with_state(|state| state.handles.role(self.id.get())).flatten()
    }

    /// Reference count of the target block.
    pub fn ref_count(&self) -> usize {
        with_state(|state| {
            let block = state.target_of(self.id.get())?;
            state.registry.get(block).map(|entry| entry.count())
        })
        .flatten()
        .unwrap_or(0)
    }

    /// Point this handle at the target of `other`.
    ///
    /// The previous target loses one count and is freed immediately if that
    /// was its last. [`GcCell::set`](crate::GcCell::set) is the safe way to
    /// retarget a field.
    ///
    /// # Safety
    ///
    /// No reference obtained through this handle (by `Deref` or
    /// [`Gc::try_get`]), or through any handle reachable only from its
    /// previous target, may be used after this call.
    pub unsafe fn set(&self, other: &Gc<T>) {
        let id = self.attached_id();
        let target = with_state(|state| state.target_of(other.id.get())).flatten();
        self.ptr.set(target.and(other.ptr.get()));

        let released = with_state(|state| state.retarget(id, target)).flatten();
        managed::destroy_released(released);
    }

    /// Make this handle null, releasing its target.
    ///
    /// # Safety
    ///
    /// Same contract as [`Gc::set`].
    pub unsafe fn set_null(&self) {
        self.ptr.set(None);
        let id = self.id.get();
        if id.is_detached() {
            return;
        }
        let released = with_state(|state| state.retarget(id, None)).flatten();
        managed::destroy_released(released);
    }

    /// Move the target out into a new root handle, leaving this one null.
    ///
    /// The count moves with the target, so nothing is freed by the call
    /// itself, but dropping the returned handle may free it.
    ///
    /// # Safety
    ///
    /// Same contract as [`Gc::set`], applied to the moment the returned
    /// handle stops keeping the target alive.
    pub unsafe fn take(&self) -> Gc<T> {
        let id = self.id.get();
        let ptr = self.ptr.take();
        let root = with_state(|state| {
            state.target_of(id)?;
            state.split_off(id)
        })
        .flatten();

        match root {
            Some(root) => Gc::from_parts(root, ptr),
            None => Gc::null(),
        }
    }

    /// Check if two handles point at the same live object.
    ///
    /// Two null handles compare equal.
    #[inline]
    pub fn ptr_eq(this: &Gc<T>, other: &Gc<T>) -> bool {
        std::ptr::eq(this.as_ptr(), other.as_ptr())
    }

    /// Address of the target object, or null.
    pub fn as_ptr(&self) -> *const T {
        match (self.block(), self.ptr.get()) {
            (Some(_), Some(ptr)) => ptr.as_ptr(),
            _ => std::ptr::null(),
        }
    }

    /// Change the classification of this handle.
    pub(crate) fn reclassify(&self, role: HandleRole) {
        let id = self.attached_id();
        with_state(|state| state.reclassify(id, role));
    }

    /// Slot of this handle, registering it as a null root if it was created
    /// while no heap was installed.
    fn attached_id(&self) -> HandleId {
        let id = self.id.get();
        if !id.is_detached() {
            return id;
        }
        let id = with_state(|state| state.register_handle(HandleRole::Root, None))
            .unwrap_or(HandleId::DETACHED);
        self.ptr.set(None);
        self.id.set(id);
        id
    }
}

impl<T: Trace + 'static> Clone for Gc<T> {
    fn clone(&self) -> Self {
        let cloned = with_state(|state| {
            let target = state.target_of(self.id.get());
            let id = state.register_handle(HandleRole::Root, target);
            (id, target)
        });

        match cloned {
            Some((id, target)) => Self::from_parts(id, target.and(self.ptr.get())),
            None => Self::from_parts(HandleId::DETACHED, None),
        }
    }
}

impl<T: Trace + 'static> Drop for Gc<T> {
    fn drop(&mut self) {
        let id = self.id.get();
        if id.is_detached() {
            return;
        }
        let released = with_state(|state| state.drop_handle(id)).flatten();
        managed::destroy_released(released);
    }
}

impl<T: Trace + 'static> Deref for Gc<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the handle is null, its target was released, or the heap is
    /// gone. See [`Gc::try_get`].
    #[inline]
    fn deref(&self) -> &T {
        match self.try_get() {
            Ok(value) => value,
            Err(err) => panic!(
                "cannot dereference Gc<{}>: {err}",
                std::any::type_name::<T>()
            ),
        }
    }
}

impl<T: Trace + 'static> Default for Gc<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: Trace + 'static> PartialEq for Gc<T> {
    fn eq(&self, other: &Self) -> bool {
        Gc::ptr_eq(self, other)
    }
}

impl<T: Trace + 'static> Eq for Gc<T> {}

impl<T: Trace + 'static> Hash for Gc<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_ptr().hash(state);
    }
}

impl<T: Trace + 'static> fmt::Debug for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gc")
            .field("id", &self.id.get())
            .field("block", &self.block())
            .finish()
    }
}

impl<T: Trace + 'static> fmt::Pointer for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.as_ptr(), f)
    }
}

/// Safety: reports exactly the handle itself.
unsafe impl<T: Trace + 'static> Trace for Gc<T> {
    #[inline]
    fn trace(&self, tracer: &mut dyn Tracer) {
        tracer.trace_handle(self.attached_id());
    }
}
