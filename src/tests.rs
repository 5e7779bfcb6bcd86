extern crate std;

use std::collections::BTreeMap;

/// A reference model of the heap's occupancy. It tracks every live payload
/// range by offset and panics when a new allocation overlaps a live one or
/// escapes the arena.
pub struct ShadowHeap {
    arena_size: usize,
    live: BTreeMap<u32, u32>,
}

impl ShadowHeap {
    pub fn new(arena_size: usize) -> Self {
        Self {
            arena_size,
            live: BTreeMap::new(),
        }
    }

    pub fn allocate(&mut self, start: u32, len: u32) {
        assert!(len > 0);
        let end = start as usize + len as usize;
        assert!(
            end <= self.arena_size,
            "allocation {}..{} escapes the arena",
            start,
            end
        );
        if let Some((&below, &below_len)) = self.live.range(..=start).next_back() {
            assert!(
                below as usize + below_len as usize <= start as usize,
                "allocation at {} overlaps the one at {}",
                start,
                below
            );
        }
        if let Some((&above, _)) = self.live.range(start + 1..).next() {
            assert!(
                end <= above as usize,
                "allocation at {} overlaps the one at {}",
                start,
                above
            );
        }
        self.live.insert(start, len);
    }

    /// Forgets a live range, returning its length.
    pub fn release(&mut self, start: u32) -> u32 {
        self.live
            .remove(&start)
            .expect("releasing a range the model does not know about")
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}
