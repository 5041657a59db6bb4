//! Block metadata.
//!
//! A block is one live allocation: an inclusive address range plus the
//! bookkeeping the collector needs (reference count, outgoing edges, how to
//! destroy and free it).

use crate::roots::HandleId;
use rustc_hash::FxHashSet;
use std::alloc::Layout;
use std::cmp::Ordering;

/// Type-erased destructor run on a block's storage before it is freed.
pub(crate) type DropFn = unsafe fn(*mut u8);

/// Inclusive address range `[start, end]` of one allocation.
///
/// Ordering treats any two overlapping ranges as equal. Stored ranges never
/// overlap, so among them the order is total; a single-address range then
/// compares equal to exactly the block containing it, which turns an ordered
/// lookup into a containment query.
#[derive(Debug, Clone, Copy)]
pub struct AddrRange {
    start: usize,
    end: usize,
}

impl AddrRange {
    /// Create a range from its first and last byte.
    #[inline]
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "inverted range");
        Self { start, end }
    }

    /// Create a range covering `len` bytes from `start`.
    ///
    /// Empty allocations still occupy one byte.
    #[inline]
    pub fn from_len(start: usize, len: usize) -> Self {
        Self::new(start, start + len.max(1) - 1)
    }

    /// Single-address range used for lookups.
    #[inline]
    pub fn point(addr: usize) -> Self {
        Self {
            start: addr,
            end: addr,
        }
    }

    /// First byte.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Last byte.
    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of bytes covered.
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Check if an address falls inside this range.
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.start && addr <= self.end
    }

    /// Check if two ranges share at least one byte.
    #[inline]
    pub fn overlaps(&self, other: &AddrRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl Ord for AddrRange {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.overlaps(other) {
            Ordering::Equal
        } else {
            self.start.cmp(&other.start)
        }
    }
}

impl PartialOrd for AddrRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for AddrRange {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AddrRange {}

/// Stable reference to a registered block.
///
/// Carries the block's start address and a serial number unique to the
/// allocation, so a reference to a freed block never resolves to a later
/// block that reuses the same memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRef {
    start: usize,
    serial: u64,
}

impl BlockRef {
    #[inline]
    pub(crate) fn new(start: usize, serial: u64) -> Self {
        Self { start, serial }
    }

    /// Start address of the block.
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// Allocation serial number.
    #[inline]
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

/// What a block's storage holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// A managed object allocated through [`Heap::alloc`](crate::Heap::alloc).
    Object,
    /// Backing storage of a container collaborator such as
    /// [`GcVec`](crate::GcVec). Swept exactly like objects.
    Container,
    /// Untyped storage from the raw allocation hook. Owned by the host and
    /// only released through [`Heap::free`](crate::Heap::free).
    Raw,
}

/// Registry entry for one live block.
pub struct BlockEntry {
    pub(crate) range: AddrRange,
    pub(crate) serial: u64,
    pub(crate) kind: BlockKind,
    /// Number of handles currently targeting this block.
    pub(crate) count: usize,
    /// Handles stored inside this block (its outgoing edges).
    pub(crate) edges: FxHashSet<HandleId>,
    pub(crate) layout: Layout,
    pub(crate) drop_fn: Option<DropFn>,
    pub(crate) type_name: &'static str,
}

impl BlockEntry {
    pub(crate) fn new(
        range: AddrRange,
        serial: u64,
        kind: BlockKind,
        layout: Layout,
        drop_fn: Option<DropFn>,
        type_name: &'static str,
    ) -> Self {
        Self {
            range,
            serial,
            kind,
            count: 0,
            edges: FxHashSet::default(),
            layout,
            drop_fn,
            type_name,
        }
    }

    /// Reference to this entry.
    #[inline]
    pub fn block_ref(&self) -> BlockRef {
        BlockRef::new(self.range.start(), self.serial)
    }

    /// Address range.
    #[inline]
    pub fn range(&self) -> AddrRange {
        self.range
    }

    /// Size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.range.len()
    }

    /// Current reference count.
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Block kind.
    #[inline]
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Outgoing edges.
    pub fn edges(&self) -> impl Iterator<Item = HandleId> + '_ {
        self.edges.iter().copied()
    }

    /// Snapshot for callers outside the collector.
    pub fn info(&self) -> BlockInfo {
        BlockInfo {
            block: self.block_ref(),
            start: self.range.start(),
            end: self.range.end(),
            kind: self.kind,
            count: self.count,
            edges: self.edges.len(),
            type_name: self.type_name,
        }
    }
}

impl std::fmt::Debug for BlockEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockEntry")
            .field("start", &format_args!("{:#x}", self.range.start()))
            .field("end", &format_args!("{:#x}", self.range.end()))
            .field("kind", &self.kind)
            .field("count", &self.count)
            .field("edges", &self.edges.len())
            .field("type", &self.type_name)
            .finish()
    }
}

/// Read-only description of a live block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInfo {
    /// Reference to the block.
    pub block: BlockRef,
    /// First byte.
    pub start: usize,
    /// Last byte.
    pub end: usize,
    /// What the block holds.
    pub kind: BlockKind,
    /// Reference count.
    pub count: usize,
    /// Number of outgoing edges.
    pub edges: usize,
    /// Name of the stored type.
    pub type_name: &'static str,
}
