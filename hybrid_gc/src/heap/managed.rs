//! Managed object allocation and release hooks.
//!
//! Allocation obtains storage from the global allocator and registers it as
//! a block; release unregisters the block, runs the destructor of whatever
//! lives in it and returns the storage. Destruction always happens with the
//! context unborrowed because destructors drop handles.

use super::block::{AddrRange, BlockEntry, BlockKind, BlockRef, DropFn};
use super::context::{self, HeapState};
use crate::alloc::Gc;
use crate::error::{GcError, GcResult};
use crate::roots::{HandleId, HandleRole};
use crate::stats::ReleaseReason;
use crate::trace::{CollectingTracer, Trace};
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use tracing::{error, trace};

/// Layout used for a block holding one `T`.
///
/// Zero-sized types are padded to one byte so every block has a range.
pub(crate) fn block_layout<T>() -> GcResult<Layout> {
    let layout = Layout::new::<T>();
    Layout::from_size_align(layout.size().max(1), layout.align()).map_err(|_| {
        GcError::OutOfMemory {
            size: layout.size(),
        }
    })
}

/// Drop a `T` stored at `ptr`.
///
/// # Safety
///
/// `ptr` must point to an initialized `T` that is not used afterwards.
unsafe fn drop_shim<T>(ptr: *mut u8) {
    // SAFETY: upheld by the caller
    unsafe { std::ptr::drop_in_place(ptr.cast::<T>()) }
}

/// Allocation hook: obtain storage and register it as a new block with a
/// zero count and no edges.
pub(crate) fn allocate_block(
    state: &mut HeapState,
    layout: Layout,
    drop_fn: Option<DropFn>,
    kind: BlockKind,
    type_name: &'static str,
) -> GcResult<(NonNull<u8>, BlockRef)> {
    let size = layout.size();
    if size == 0 || size > state.config.max_alloc_size {
        return Err(GcError::OutOfMemory { size });
    }

    // SAFETY: layout has a non-zero size
    let raw = unsafe { alloc::alloc(layout) };
    let ptr = NonNull::new(raw).ok_or(GcError::OutOfMemory { size })?;

    let range = AddrRange::from_len(ptr.as_ptr() as usize, size);
    let entry = BlockEntry::new(
        range,
        context::next_stamp(),
        kind,
        layout,
        drop_fn,
        type_name,
    );

    match state.registry.register(entry) {
        Ok(block) => {
            state.stats.record_allocation(size);
            trace!(
                start = range.start(),
                end = range.end(),
                ?kind,
                type_name,
                "block registered"
            );
            Ok((ptr, block))
        }
        Err(err) => {
            error!(%err, "allocator returned memory overlapping a live block");
            // SAFETY: allocated above with this layout and never handed out
            unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
            Err(err)
        }
    }
}

/// Move `value` into a new block and return the first root handle to it.
///
/// Handles stored inside `value` are adopted as child edges of the block.
pub(crate) fn alloc_object<T: Trace + 'static>(value: T, kind: BlockKind) -> GcResult<Gc<T>> {
    let layout = block_layout::<T>()?;
    let (storage, block) = context::with_state(|state| {
        allocate_block(
            state,
            layout,
            Some(drop_shim::<T> as DropFn),
            kind,
            std::any::type_name::<T>(),
        )
    })
    .ok_or(GcError::NoHeap)??;

    let object = storage.cast::<T>();
    // SAFETY: storage is fresh, sized and aligned for T
    unsafe { object.as_ptr().write(value) };

    let mut adopted = CollectingTracer::new();
    // SAFETY: just initialized; no other reference exists yet
    unsafe { object.as_ref() }.trace(&mut adopted);

    let root = context::with_state(|state| {
        for handle in adopted.into_handles() {
            state.reclassify(handle, HandleRole::Child(block));
        }
        state.register_handle(HandleRole::Root, Some(block))
    })
    .unwrap_or(HandleId::DETACHED);

    Ok(Gc::from_parts(root, Some(object)))
}

/// Release hook for an address handed out by the heap.
///
/// Unregisters the block and returns it for destruction. An address that is
/// not the start of a live block is a usage error and changes nothing.
pub(crate) fn release_block(state: &mut HeapState, address: usize) -> GcResult<BlockEntry> {
    let block = state
        .registry
        .find(address)
        .filter(|block| block.start() == address)
        .ok_or(GcError::ForeignRelease { address })?;

    state
        .registry
        .unregister(block)
        .ok_or(GcError::ForeignRelease { address })
}

/// Run a block's destructor and return its storage to the allocator.
///
/// Must be called with the context unborrowed.
pub(crate) fn destroy(entry: BlockEntry, reason: ReleaseReason) {
    let start = entry.range.start();
    let ptr = start as *mut u8;

    if let Some(drop_fn) = entry.drop_fn {
        // SAFETY: the entry was unregistered, so this is the only destruction
        // of the value stored at its start address
        unsafe { drop_fn(ptr) };
    }
    // SAFETY: storage was allocated by `allocate_block` with this layout
    unsafe { alloc::dealloc(ptr, entry.layout) };

    let size = entry.size();
    context::with_state(|state| state.stats.record_release(size, reason));
    trace!(start, size, ?reason, type_name = entry.type_name, "block freed");
}

/// Destroy an optional entry released by an eager count decrement.
#[inline]
pub(crate) fn destroy_released(entry: Option<BlockEntry>) {
    if let Some(entry) = entry {
        destroy(entry, ReleaseReason::Eager);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_layout_pads_zero_sized_types() {
        let layout = block_layout::<()>().unwrap();
        assert_eq!(layout.size(), 1);

        let layout = block_layout::<u64>().unwrap();
        assert_eq!(layout.size(), 8);
        assert_eq!(layout.align(), std::mem::align_of::<u64>());
    }

    #[test]
    fn test_alloc_without_heap_fails() {
        // Tests run on their own threads; none has a heap installed here.
        let result = alloc_object(5u32, BlockKind::Object);
        assert_eq!(result.err(), Some(GcError::NoHeap));
    }
}
