//! Error and diagnostic types.
//!
//! Every fallible operation returns [`GcResult`]. Usage errors are programming
//! mistakes on the caller's side (foreign frees, null dereferences, array
//! forms); corruption errors mean the allocator handed out overlapping memory.
//! Neither leaves the registry in a modified state.

use crate::config::ConfigError;
use std::fmt;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type GcResult<T> = Result<T, GcError>;

/// Errors reported by the collector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GcError {
    /// Release requested for an address the registry does not track
    /// (double free or a pointer the collector never handed out).
    #[error("attempt to free a non-managed address {address:#x}")]
    ForeignRelease {
        /// Offending address.
        address: usize,
    },

    /// A null (or severed) handle was dereferenced.
    #[error("dereference of a null handle")]
    NullDereference,

    /// Array-form allocation or release of managed objects.
    #[error("array allocation of managed objects is not supported")]
    ArrayUnsupported,

    /// No heap is initialized on the current thread.
    #[error("no heap is initialized on this thread")]
    NoHeap,

    /// `Heap::init` was called while a heap was already live on this thread.
    #[error("a heap is already initialized on this thread")]
    AlreadyInitialized,

    /// A new block overlapped an existing one.
    #[error("block [{start:#x}, {end:#x}] overlaps a live block")]
    Corruption {
        /// First byte of the rejected range.
        start: usize,
        /// Last byte of the rejected range.
        end: usize,
    },

    /// The global allocator refused the request.
    #[error("out of memory allocating {size} bytes")]
    OutOfMemory {
        /// Requested size in bytes.
        size: usize,
    },

    /// The heap configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl GcError {
    /// True for errors caused by misuse of the API.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            GcError::ForeignRelease { .. }
                | GcError::NullDereference
                | GcError::ArrayUnsupported
                | GcError::NoHeap
                | GcError::AlreadyInitialized
        )
    }
}

/// Non-fatal observation that the heap is not quiescent.
///
/// Produced when blocks or root handles are still live at a point where the
/// host expects none (typically teardown). A non-zero block count with zero
/// roots means a cycle was never collected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeakWarning {
    /// Blocks still registered.
    pub blocks: usize,
    /// Bytes held by those blocks.
    pub bytes: usize,
    /// Root handles still registered.
    pub roots: usize,
}

impl LeakWarning {
    /// True if nothing is leaked.
    pub fn is_empty(&self) -> bool {
        self.blocks == 0 && self.roots == 0
    }
}

impl fmt::Display for LeakWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} blocks ({} bytes) and {} root handles still live",
            self.blocks, self.bytes, self.roots
        )
    }
}

/// Outcome of tearing down a heap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Blocks freed by the final collection (zero if it was disabled).
    pub final_freed: usize,
    /// What was still live after the final collection.
    pub leaks: Option<LeakWarning>,
}

impl TeardownReport {
    /// True if the heap was empty at teardown.
    pub fn is_clean(&self) -> bool {
        self.leaks.is_none()
    }
}
