//! Root tracking and handle management.
//!
//! GC roots are the handles that live outside any managed block: locals,
//! fields of host structs, entries in host collections. Every other handle
//! is a child edge recorded on the block that stores it.

mod handles;

pub use handles::{HandleId, HandleRole, HandleTable};

use rustc_hash::FxHashSet;

/// Root set for garbage collection.
///
/// Holds the ids of all live root handles; the mark phase seeds its
/// worklist from their targets.
#[derive(Debug, Default)]
pub struct RootSet {
    handles: FxHashSet<HandleId>,
}

impl RootSet {
    /// Create a new empty root set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle as a root.
    #[inline]
    pub fn insert(&mut self, handle: HandleId) -> bool {
        self.handles.insert(handle)
    }

    /// Unregister a handle.
    #[inline]
    pub fn remove(&mut self, handle: HandleId) -> bool {
        self.handles.remove(&handle)
    }

    /// Check if a handle is a registered root.
    #[inline]
    pub fn contains(&self, handle: HandleId) -> bool {
        self.handles.contains(&handle)
    }

    /// Iterate over root handles.
    pub fn iter(&self) -> impl Iterator<Item = HandleId> + '_ {
        self.handles.iter().copied()
    }

    /// Number of registered roots.
    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Check if there are no roots.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
