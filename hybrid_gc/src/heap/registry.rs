//! Block registry.
//!
//! Maps live address ranges to their [`BlockEntry`]. Keys are
//! [`AddrRange`]s whose ordering treats overlap as equality, so `find` on any
//! interior address is a single `O(log n)` B-tree lookup.

use super::block::{AddrRange, BlockEntry, BlockRef};
use crate::error::{GcError, GcResult};
use std::collections::BTreeMap;

/// Ordered set of live blocks.
#[derive(Default)]
pub struct BlockRegistry {
    /// Live blocks keyed by range.
    blocks: BTreeMap<AddrRange, BlockEntry>,
    /// Sum of all block sizes.
    total_bytes: usize,
}

impl BlockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new block.
    ///
    /// Fails with [`GcError::Corruption`] if the range overlaps a live block;
    /// the registry is left untouched in that case.
    pub fn register(&mut self, entry: BlockEntry) -> GcResult<BlockRef> {
        let range = entry.range;
        if self.blocks.contains_key(&range) {
            return Err(GcError::Corruption {
                start: range.start(),
                end: range.end(),
            });
        }

        let block = entry.block_ref();
        self.total_bytes += entry.size();
        self.blocks.insert(range, entry);
        Ok(block)
    }

    /// Find the block containing `addr`.
    #[inline]
    pub fn find(&self, addr: usize) -> Option<BlockRef> {
        self.blocks
            .get(&AddrRange::point(addr))
            .map(BlockEntry::block_ref)
    }

    /// Entry for a block, if it is still live.
    #[inline]
    pub fn get(&self, block: BlockRef) -> Option<&BlockEntry> {
        self.blocks
            .get(&AddrRange::point(block.start()))
            .filter(|entry| entry.serial == block.serial())
    }

    /// Mutable entry for a block, if it is still live.
    #[inline]
    pub fn get_mut(&mut self, block: BlockRef) -> Option<&mut BlockEntry> {
        self.blocks
            .get_mut(&AddrRange::point(block.start()))
            .filter(|entry| entry.serial == block.serial())
    }

    /// Check if a block is still live.
    #[inline]
    pub fn contains(&self, block: BlockRef) -> bool {
        self.get(block).is_some()
    }

    /// Remove a block and hand back its metadata.
    ///
    /// The underlying storage is not freed here. Returns `None` if the block
    /// was already removed.
    pub fn unregister(&mut self, block: BlockRef) -> Option<BlockEntry> {
        if !self.contains(block) {
            return None;
        }
        let entry = self.blocks.remove(&AddrRange::point(block.start()))?;
        self.total_bytes -= entry.size();
        Some(entry)
    }

    /// All live blocks, in address order.
    pub fn all(&self) -> impl Iterator<Item = BlockRef> + '_ {
        self.blocks.values().map(BlockEntry::block_ref)
    }

    /// All live entries, in address order.
    pub fn entries(&self) -> impl Iterator<Item = &BlockEntry> + '_ {
        self.blocks.values()
    }

    /// Number of live blocks.
    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check if no blocks are live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Bytes held by live blocks.
    #[inline]
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Check registry invariants.
    ///
    /// Consecutive blocks must be strictly ordered and disjoint, and `find`
    /// on the first and last byte of each block must return that block.
    pub fn verify(&self) -> GcResult<()> {
        let mut previous: Option<AddrRange> = None;
        let mut bytes = 0;

        for (range, entry) in &self.blocks {
            if let Some(prev) = previous {
                if prev.end() >= range.start() {
                    return Err(GcError::Corruption {
                        start: range.start(),
                        end: range.end(),
                    });
                }
            }

            let block = entry.block_ref();
            if self.find(range.start()) != Some(block) || self.find(range.end()) != Some(block) {
                return Err(GcError::Corruption {
                    start: range.start(),
                    end: range.end(),
                });
            }

            bytes += entry.size();
            previous = Some(*range);
        }

        if bytes != self.total_bytes {
            return Err(GcError::Corruption { start: 0, end: 0 });
        }
        Ok(())
    }
}

impl std::fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.blocks.values()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::block::BlockKind;
    use std::alloc::Layout;

    // Entries at synthetic addresses; the registry never touches the memory.
    fn entry(start: usize, len: usize, serial: u64) -> BlockEntry {
        BlockEntry::new(
            AddrRange::from_len(start, len),
            serial,
            BlockKind::Raw,
            Layout::from_size_align(len.max(1), 1).unwrap(),
            None,
            "test",
        )
    }

    #[test]
    fn test_register_and_find() {
        let mut registry = BlockRegistry::new();
        let a = registry.register(entry(0x1000, 64, 1)).unwrap();
        let b = registry.register(entry(0x2000, 32, 2)).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.total_bytes(), 96);

        assert_eq!(registry.find(0x1000), Some(a));
        assert_eq!(registry.find(0x103f), Some(a));
        assert_eq!(registry.find(0x1040), None);
        assert_eq!(registry.find(0x2010), Some(b));
        assert_eq!(registry.find(0x0fff), None);
    }

    #[test]
    fn test_overlapping_registration_is_corruption() {
        let mut registry = BlockRegistry::new();
        registry.register(entry(0x1000, 64, 1)).unwrap();

        let err = registry.register(entry(0x1020, 64, 2)).unwrap_err();
        assert_eq!(
            err,
            GcError::Corruption {
                start: 0x1020,
                end: 0x105f
            }
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.total_bytes(), 64);
    }

    #[test]
    fn test_unregister() {
        let mut registry = BlockRegistry::new();
        let a = registry.register(entry(0x1000, 64, 1)).unwrap();

        let removed = registry.unregister(a).expect("block should be live");
        assert_eq!(removed.size(), 64);
        assert!(registry.is_empty());
        assert_eq!(registry.total_bytes(), 0);
        assert_eq!(registry.find(0x1000), None);

        // Second removal is a no-op
        assert!(registry.unregister(a).is_none());
    }

    #[test]
    fn test_stale_ref_does_not_match_reused_address() {
        let mut registry = BlockRegistry::new();
        let old = registry.register(entry(0x1000, 64, 1)).unwrap();
        registry.unregister(old);

        let new = registry.register(entry(0x1000, 64, 2)).unwrap();
        assert!(registry.get(old).is_none());
        assert!(registry.unregister(old).is_none());
        assert!(registry.contains(new));
    }

    #[test]
    fn test_all_in_address_order() {
        let mut registry = BlockRegistry::new();
        let c = registry.register(entry(0x3000, 8, 3)).unwrap();
        let a = registry.register(entry(0x1000, 8, 1)).unwrap();
        let b = registry.register(entry(0x2000, 8, 2)).unwrap();

        let all: Vec<_> = registry.all().collect();
        assert_eq!(all, vec![a, b, c]);
        assert!(registry.verify().is_ok());
    }
}
