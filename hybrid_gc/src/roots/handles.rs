//! Handle slot table.
//!
//! Rust values move without running code, so a handle cannot tell where it
//! lives by looking at its own address. Instead every [`Gc`](crate::Gc)
//! owns a slot in this table recording its role (root or child edge of a
//! block) and its current target. The root set and the per-block edge sets
//! hold [`HandleId`]s into this table.

use crate::heap::BlockRef;

/// Identifier of a handle slot.
///
/// The stamp is unique per registration across every heap created on the
/// thread, so an id never resolves to a slot that was reused later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId {
    index: u32,
    stamp: u64,
}

impl HandleId {
    /// Id of a handle that is not registered with any heap.
    pub const DETACHED: HandleId = HandleId {
        index: u32::MAX,
        stamp: 0,
    };

    /// Check if this id refers to no slot.
    #[inline]
    pub fn is_detached(&self) -> bool {
        self.stamp == 0
    }
}

/// Classification of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleRole {
    /// Lives outside any managed block; a traversal seed.
    Root,
    /// Stored inside the given block; one outgoing edge of it.
    Child(BlockRef),
}

impl HandleRole {
    /// Check if this is a root.
    #[inline]
    pub fn is_root(&self) -> bool {
        matches!(self, HandleRole::Root)
    }

    /// Owning block of a child edge.
    #[inline]
    pub fn owner(&self) -> Option<BlockRef> {
        match self {
            HandleRole::Root => None,
            HandleRole::Child(block) => Some(*block),
        }
    }
}

/// One registered handle.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HandleSlot {
    stamp: u64,
    pub(crate) role: HandleRole,
    pub(crate) target: Option<BlockRef>,
}

/// Arena of handle slots with index reuse.
#[derive(Debug, Default)]
pub struct HandleTable {
    slots: Vec<Option<HandleSlot>>,
    free: Vec<u32>,
    live: usize,
}

impl HandleTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with room for `capacity` handles.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Register a new slot. `stamp` must be non-zero and never reused.
    pub(crate) fn insert(
        &mut self,
        stamp: u64,
        role: HandleRole,
        target: Option<BlockRef>,
    ) -> HandleId {
        debug_assert_ne!(stamp, 0, "stamp 0 is reserved for detached handles");
        let slot = HandleSlot {
            stamp,
            role,
            target,
        };

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(slot);
                index
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Some(slot));
                index
            }
        };

        self.live += 1;
        HandleId { index, stamp }
    }

    #[inline]
    pub(crate) fn get(&self, id: HandleId) -> Option<&HandleSlot> {
        self.slots
            .get(id.index as usize)?
            .as_ref()
            .filter(|slot| slot.stamp == id.stamp)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: HandleId) -> Option<&mut HandleSlot> {
        self.slots
            .get_mut(id.index as usize)?
            .as_mut()
            .filter(|slot| slot.stamp == id.stamp)
    }

    /// Remove a slot, returning its final state.
    pub(crate) fn remove(&mut self, id: HandleId) -> Option<HandleSlot> {
        self.get(id)?;
        let slot = self.slots[id.index as usize].take();
        self.free.push(id.index);
        self.live -= 1;
        slot
    }

    /// Check if a handle is registered.
    #[inline]
    pub fn contains(&self, id: HandleId) -> bool {
        self.get(id).is_some()
    }

    /// Role of a handle.
    #[inline]
    pub fn role(&self, id: HandleId) -> Option<HandleRole> {
        self.get(id).map(|slot| slot.role)
    }

    /// Current target of a handle (`None` if null or unregistered).
    #[inline]
    pub fn target(&self, id: HandleId) -> Option<BlockRef> {
        self.get(id).and_then(|slot| slot.target)
    }

    /// Replace a handle's target, returning the previous one.
    ///
    /// The outer `None` means the handle is not registered.
    pub(crate) fn set_target(
        &mut self,
        id: HandleId,
        target: Option<BlockRef>,
    ) -> Option<Option<BlockRef>> {
        let slot = self.get_mut(id)?;
        Some(std::mem::replace(&mut slot.target, target))
    }

    /// Clear a handle's target, returning it.
    pub(crate) fn take_target(&mut self, id: HandleId) -> Option<BlockRef> {
        self.get_mut(id)?.target.take()
    }

    pub(crate) fn set_role(&mut self, id: HandleId, role: HandleRole) -> bool {
        match self.get_mut(id) {
            Some(slot) => {
                slot.role = role;
                true
            }
            None => false,
        }
    }

    /// Number of registered handles.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Check if no handles are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}
