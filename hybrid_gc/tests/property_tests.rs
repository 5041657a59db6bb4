//! Property-based tests for the registry and the collector.
//!
//! - Registry: live blocks never overlap and every interior address maps
//!   back to its block
//! - Collector: after a collection exactly the blocks reachable from roots
//!   remain, and every destructor ran at most once

use hybrid_gc::{Gc, GcVec, Heap, Trace, Tracer};
use proptest::prelude::*;
use std::alloc::Layout;
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

// =============================================================================
// Registry
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn registry_blocks_disjoint_and_findable(
        sizes in prop::collection::vec(1usize..512, 1..40),
        free_mask in prop::collection::vec(any::<bool>(), 40),
    ) {
        let heap = Heap::with_defaults().unwrap();

        let blocks: Vec<_> = sizes
            .iter()
            .map(|&size| {
                let layout = Layout::from_size_align(size, 8).unwrap();
                (heap.allocate(layout).unwrap(), size)
            })
            .collect();
        prop_assert_eq!(heap.block_count(), sizes.len());
        prop_assert_eq!(heap.live_bytes(), sizes.iter().sum::<usize>());

        for &(ptr, size) in &blocks {
            let start = ptr.as_ptr() as usize;
            for offset in [0, size / 2, size - 1] {
                let info = heap.find(unsafe { ptr.as_ptr().add(offset) });
                let info = info.unwrap();
                prop_assert_eq!(info.start, start);
                prop_assert_eq!(info.end, start + size - 1);
            }
        }

        let mut ranges: Vec<(usize, usize)> = blocks
            .iter()
            .map(|&(ptr, size)| (ptr.as_ptr() as usize, ptr.as_ptr() as usize + size - 1))
            .collect();
        ranges.sort_unstable();
        for pair in ranges.windows(2) {
            prop_assert!(pair[0].1 < pair[1].0);
        }

        let mut freed = Vec::new();
        let mut kept = Vec::new();
        for (index, &(ptr, size)) in blocks.iter().enumerate() {
            if free_mask[index] {
                unsafe { heap.free(ptr).unwrap() };
                freed.push(ptr);
            } else {
                kept.push((ptr, size));
            }
        }

        for ptr in &freed {
            prop_assert!(heap.find(ptr.as_ptr()).is_none());
        }
        prop_assert_eq!(heap.block_count(), kept.len());
        prop_assert!(heap.verify().is_ok());

        for (ptr, _) in kept {
            unsafe { heap.free(ptr).unwrap() };
        }
        prop_assert!(heap.shutdown().is_clean());
    }
}

// =============================================================================
// Collector
// =============================================================================

struct Vertex {
    id: usize,
    edges: GcVec<Vertex>,
    dropped: Rc<RefCell<Vec<usize>>>,
}

impl Drop for Vertex {
    fn drop(&mut self) {
        self.dropped.borrow_mut().push(self.id);
    }
}

unsafe impl Trace for Vertex {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.edges.trace(tracer);
    }
}

/// Vertices reachable from `roots` in the adjacency lists `edges`.
fn reachable(edges: &[Vec<usize>], roots: &[usize]) -> HashSet<usize> {
    let mut seen: HashSet<usize> = roots.iter().copied().collect();
    let mut queue: VecDeque<usize> = roots.iter().copied().collect();
    while let Some(vertex) = queue.pop_front() {
        for &next in &edges[vertex] {
            if seen.insert(next) {
                queue.push_back(next);
            }
        }
    }
    seen
}

fn graph_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>, Vec<bool>)> {
    (1usize..24).prop_flat_map(|count| {
        (
            Just(count),
            prop::collection::vec((0..count, 0..count), 0..count * 3),
            prop::collection::vec(any::<bool>(), count),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn collect_keeps_exactly_reachable((count, wiring, rooted) in graph_strategy()) {
        let heap = Heap::with_defaults().unwrap();
        let dropped = Rc::new(RefCell::new(Vec::new()));

        let vertices: Vec<Gc<Vertex>> = (0..count)
            .map(|id| {
                Gc::new(Vertex {
                    id,
                    edges: GcVec::new(),
                    dropped: dropped.clone(),
                })
            })
            .collect();

        let mut edges = vec![Vec::new(); count];
        for &(from, to) in &wiring {
            vertices[from].edges.push(vertices[to].clone());
            edges[from].push(to);
        }

        let roots: Vec<usize> = (0..count).filter(|&id| rooted[id]).collect();
        let live = reachable(&edges, &roots);

        let kept: Vec<Gc<Vertex>> = vertices
            .into_iter()
            .enumerate()
            .filter(|(id, _)| rooted[*id])
            .map(|(_, vertex)| vertex)
            .collect();

        let result = heap.collect();

        // Each vertex owns one edge vector
        prop_assert_eq!(heap.block_count(), live.len() * 2);
        prop_assert_eq!(result.live_blocks, live.len() * 2);
        prop_assert_eq!(heap.root_count(), kept.len());

        let mut gone = dropped.borrow().clone();
        gone.sort_unstable();
        let mut expected: Vec<usize> = (0..count).filter(|id| !live.contains(id)).collect();
        expected.sort_unstable();
        prop_assert_eq!(gone, expected);

        drop(kept);
        prop_assert!(heap.shutdown().is_clean());

        let mut all = dropped.borrow().clone();
        all.sort_unstable();
        prop_assert_eq!(all, (0..count).collect::<Vec<_>>());
    }
}
