//! The free-list allocator core
use core::{fmt, marker::PhantomData};

use crate::{arena::Arena, fit::FitStrategy, utils::align_up};

/// The alignment boundary, in bytes, of every header and payload.
///
/// Request lengths are rounded up to a multiple of this before searching
/// the chain; a single word on 32-bit targets and a double word on 64-bit
/// targets.
pub const ALIGNMENT: usize = core::mem::size_of::<usize>();

/// Extra bytes prepended to each header so that writing one block's
/// metadata cannot invalidate a cache line belonging to the neighboring
/// block. Zero unless the target needs it (e.g. `16 - RAW_HEADER_SIZE` for
/// a 16-byte cache line).
const CACHE_LINE_PAD: usize = 0;

/// One header word per field: state tag, requested size, prev link,
/// next link.
const RAW_HEADER_SIZE: usize = CACHE_LINE_PAD + 4 * core::mem::size_of::<u32>();

/// The per-block metadata overhead, in bytes: the in-place header size
/// rounded up to [`ALIGNMENT`].
///
/// A block's payload starts exactly this many bytes after the block itself,
/// and a free block is only ever split when the remainder can host another
/// header of this size.
pub const HEADER_SIZE: usize = align_up(RAW_HEADER_SIZE, ALIGNMENT);

/// The link encoding of "no neighbor".
const LINK_NONE: u32 = u32::MAX;

const STATE_FREE: u32 = 0;
const STATE_USED: u32 = 1;

#[inline]
fn decode_link(word: u32) -> Option<u32> {
    (word != LINK_NONE).then_some(word)
}

#[inline]
fn encode_link(link: Option<u32>) -> u32 {
    match link {
        Some(offset) => offset,
        None => LINK_NONE,
    }
}

/// A block's occupancy. A free block carries no requested size at all, so
/// reading a stale one is impossible by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    Free,
    Used { requested: u32 },
}

/// The decoded form of one in-place block header.
#[derive(Debug, Clone, Copy)]
struct BlockHdr {
    state: BlockState,
    /// Offset of the neighboring header at the lower address, if any.
    prev: Option<u32>,
    /// Offset of the neighboring header at the higher address, if any.
    next: Option<u32>,
}

impl BlockHdr {
    #[inline]
    fn is_free(&self) -> bool {
        matches!(self.state, BlockState::Free)
    }

    /// The caller-visible size recorded at allocation time. Zero for free
    /// blocks.
    #[inline]
    fn requested(&self) -> u32 {
        match self.state {
            BlockState::Free => 0,
            BlockState::Used { requested } => requested,
        }
    }
}

/// One chain entry as seen by a [`FitStrategy`] or the diagnostics: the
/// block's offset, its occupancy, and its usable capacity.
#[derive(Debug, Clone, Copy)]
pub struct BlockInfo {
    /// Byte offset of the block's header from the arena start.
    pub offset: u32,
    pub is_free: bool,
    /// Caller-usable bytes between this block's header and the next
    /// header (or the arena end), excluding the header itself.
    pub capacity: usize,
}

/// A handle to a live allocation: the payload's byte offset from the arena
/// start.
///
/// Handles are only produced by [`Heap::allocate`] and cannot be forged.
/// A handle is invalidated by releasing it; using a stale handle afterwards
/// is detected and reported by [`Heap::deallocate`]. The one remaining
/// caller obligation is to not mix up handles of *different* heap values
/// whose offsets happen to alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapPtr(u32);

impl HeapPtr {
    /// The payload's byte offset from the arena start, mainly useful for
    /// correlating a handle with a [`Heap::dump_blocks`] snapshot.
    #[inline]
    pub fn offset(self) -> usize {
        self.0 as usize
    }
}

/// The error reported by [`Heap::deallocate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeallocError {
    /// The handle does not name a live allocation of this heap: it was
    /// already released, or belongs to a different heap.
    DoubleFreeOrInvalidPointer,
}

impl fmt::Display for DeallocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DoubleFreeOrInvalidPointer => f.write_str("double free or invalid pointer"),
        }
    }
}

#[cfg(feature = "std")]
#[cfg_attr(feature = "doc_cfg", doc(cfg(feature = "std")))]
impl std::error::Error for DeallocError {}

#[cfg_attr(doc, svgbobdoc::transform)]
/// A fixed-capacity heap: a `SIZE`-byte arena managed through a doubly
/// linked chain of block headers embedded in the arena itself.
///
/// # Data Structure Overview
///
/// <center>
/// ```svgbob
///   head
///    |
///    v   Arena (SIZE bytes)
///  ,-----+----------+-----+--------+-----+----------------,
///  | hdr | payload  | hdr | payload| hdr |  free capacity |
///  | A   | of A     | B   | of B   | C   |  of C          |
///  '-+-+-+----------+-+-+-+--------+-+---+----------------'
///      |    ^         | |    ^       |
///      |    |         | |    |       |
///      '----+---------' '----+-------'
///        next/prev        next/prev
/// ```
/// </center>
///
/// # Properties
///
/// The chain is strictly address-ordered and covers the arena with no gaps
/// and no overlaps: a block's capacity is exactly the bytes between its
/// header and the next header (or the arena end). No two adjacent blocks
/// are ever both free; coalescing is applied eagerly on every release.
///
/// All links are offsets, so a `Heap` is an ordinary owned value: moving it
/// or placing it in a `static` (via [`Heap::new`] or
/// [`const_default1::ConstDefault`]) is fine.
///
/// `S` selects the fit policy ([`FirstFit`](crate::FirstFit),
/// [`BestFit`](crate::BestFit), or [`DefaultFit`](crate::DefaultFit));
/// `SIZE` is the arena size in bytes and must be a multiple of
/// [`ALIGNMENT`], at most `u32::MAX`, and large enough for one header plus
/// one aligned payload word.
pub struct Heap<S, const SIZE: usize> {
    arena: Arena<SIZE>,
    /// Offset of the chain head, or `None` before the first allocation
    /// builds the chain.
    head: Option<u32>,
    /// Number of outstanding allocations.
    live: usize,
    _strategy: PhantomData<S>,
}

impl<S, const SIZE: usize> fmt::Debug for Heap<S, SIZE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("size", &SIZE)
            .field("head", &self.head)
            .field("live", &self.live)
            .finish()
    }
}

impl<S, const SIZE: usize> const_default1::ConstDefault for Heap<S, SIZE> {
    const DEFAULT: Self = Self::new();
}

impl<S, const SIZE: usize> Default for Heap<S, SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, const SIZE: usize> Heap<S, SIZE> {
    /// Evaluates successfully if the parameters are valid.
    const VALID: () = {
        if SIZE % ALIGNMENT != 0 {
            panic!("`SIZE` must be a multiple of `ALIGNMENT`");
        }
        if SIZE < HEADER_SIZE + ALIGNMENT {
            panic!("`SIZE` is too small to hold a single block");
        }
        if SIZE > u32::MAX as usize {
            panic!("`SIZE` must be addressable with 32-bit offsets");
        }
    };

    /// An empty heap. The block chain is built lazily by the first
    /// allocation.
    pub const fn new() -> Self {
        let () = Self::VALID;
        Self {
            arena: Arena::new(),
            head: None,
            live: 0,
            _strategy: PhantomData,
        }
    }

    /// Builds the chain on first use: a single header at offset zero
    /// spanning the whole arena, marked free. Idempotent.
    fn ensure_chain(&mut self) {
        if self.head.is_some() {
            return;
        }
        self.store_hdr(
            0,
            BlockHdr {
                state: BlockState::Free,
                prev: None,
                next: None,
            },
        );
        self.head = Some(0);
    }

    #[inline]
    fn load_hdr(&self, offset: u32) -> BlockHdr {
        let base = offset as usize + CACHE_LINE_PAD;
        let state = match self.arena.read_word(base) {
            STATE_FREE => BlockState::Free,
            _ => BlockState::Used {
                requested: self.arena.read_word(base + 4),
            },
        };
        BlockHdr {
            state,
            prev: decode_link(self.arena.read_word(base + 8)),
            next: decode_link(self.arena.read_word(base + 12)),
        }
    }

    #[inline]
    fn store_hdr(&mut self, offset: u32, hdr: BlockHdr) {
        let base = offset as usize + CACHE_LINE_PAD;
        let (state, requested) = match hdr.state {
            BlockState::Free => (STATE_FREE, 0),
            BlockState::Used { requested } => (STATE_USED, requested),
        };
        self.arena.write_word(base, state);
        self.arena.write_word(base + 4, requested);
        self.arena.write_word(base + 8, encode_link(hdr.prev));
        self.arena.write_word(base + 12, encode_link(hdr.next));
    }

    /// Iterates over the chain in address order. Empty before the chain is
    /// built.
    fn blocks(&self) -> Blocks<'_, S, SIZE> {
        Blocks {
            heap: self,
            cursor: self.head,
        }
    }

    /// The authoritative usable size of a block: the bytes between its
    /// header and the next header's offset (or the arena end for the tail
    /// block), minus the header itself. Distinct from the *requested* size,
    /// which only records what the caller asked for.
    #[inline]
    fn capacity_of(&self, offset: u32, hdr: &BlockHdr) -> usize {
        let end = match hdr.next {
            Some(next) => next as usize,
            None => SIZE,
        };
        end - offset as usize - HEADER_SIZE
    }

    /// The total span of a block, header included.
    #[inline]
    fn span_of(&self, offset: u32, hdr: &BlockHdr) -> usize {
        self.capacity_of(offset, hdr) + HEADER_SIZE
    }

    /// Recovers the header owning `ptr`: one aligned-header-size worth of
    /// bytes before the payload, validated against the arena bounds and
    /// then against actual chain membership. `None` if `ptr` does not name
    /// a block of this heap.
    fn block_at(&self, ptr: HeapPtr) -> Option<(u32, BlockHdr)> {
        let offset = (ptr.0 as usize).checked_sub(HEADER_SIZE)?;
        if offset % ALIGNMENT != 0 || offset >= SIZE {
            return None;
        }
        let offset = offset as u32;
        // The chain is address-ordered, so the scan can stop at the first
        // block at or past `offset`.
        let (found, hdr) = self.blocks().find(|&(o, _)| o >= offset)?;
        (found == offset).then_some((offset, hdr))
    }

    /// Release a previously allocated block.
    ///
    /// The block is marked free and eagerly merged with free neighbors, so
    /// no two adjacent free blocks ever exist.
    ///
    /// Unlike its C ancestry, this is a checked operation: releasing a
    /// handle twice, or a handle this heap never produced, leaves the heap
    /// untouched and reports [`DeallocError::DoubleFreeOrInvalidPointer`].
    pub fn deallocate(&mut self, ptr: HeapPtr) -> Result<(), DeallocError> {
        let (offset, mut hdr) = self
            .block_at(ptr)
            .filter(|(_, hdr)| !hdr.is_free())
            .ok_or(DeallocError::DoubleFreeOrInvalidPointer)?;

        hdr.state = BlockState::Free;
        self.store_hdr(offset, hdr);
        self.coalesce(offset);
        self.live -= 1;
        Ok(())
    }

    /// Merges the freed block at `offset` with its free neighbors. Called
    /// once per release; headers absorbed here simply become part of the
    /// merged block's capacity.
    fn coalesce(&mut self, offset: u32) {
        let hdr = self.load_hdr(offset);
        let prev = hdr.prev.map(|p| (p, self.load_hdr(p)));
        let next = hdr.next.map(|n| (n, self.load_hdr(n)));

        match (prev, next) {
            // Both neighbors free: splice this block and `next` out,
            // extending `prev` over all three.
            (Some((p, mut ph)), Some((_, nh))) if ph.is_free() && nh.is_free() => {
                ph.next = nh.next;
                self.store_hdr(p, ph);
                if let Some(nn) = nh.next {
                    let mut nnh = self.load_hdr(nn);
                    nnh.prev = Some(p);
                    self.store_hdr(nn, nnh);
                }
            }
            // Only `prev` free: splice this block out, extending `prev`
            // forward.
            (Some((p, mut ph)), _) if ph.is_free() => {
                ph.next = hdr.next;
                self.store_hdr(p, ph);
                if let Some(n) = hdr.next {
                    let mut nh = self.load_hdr(n);
                    nh.prev = Some(p);
                    self.store_hdr(n, nh);
                }
            }
            // Only `next` free: splice `next` out, extending this block
            // forward.
            (_, Some((_, nh))) if nh.is_free() => {
                let mut hdr = hdr;
                hdr.next = nh.next;
                self.store_hdr(offset, hdr);
                if let Some(nn) = nh.next {
                    let mut nnh = self.load_hdr(nn);
                    nnh.prev = Some(offset);
                    self.store_hdr(nn, nnh);
                }
            }
            // Neither neighbor free: the block stands alone.
            _ => {}
        }
    }

    /// Shared access to a live allocation's payload, `requested_size`
    /// bytes long. `None` if `ptr` does not name a live allocation.
    pub fn payload(&self, ptr: HeapPtr) -> Option<&[u8]> {
        let (_, hdr) = self.block_at(ptr)?;
        match hdr.state {
            BlockState::Used { requested } => {
                let start = ptr.0 as usize;
                Some(self.arena.bytes(start..start + requested as usize))
            }
            BlockState::Free => None,
        }
    }

    /// Exclusive access to a live allocation's payload.
    pub fn payload_mut(&mut self, ptr: HeapPtr) -> Option<&mut [u8]> {
        let (_, hdr) = self.block_at(ptr)?;
        match hdr.state {
            BlockState::Used { requested } => {
                let start = ptr.0 as usize;
                Some(self.arena.bytes_mut(start..start + requested as usize))
            }
            BlockState::Free => None,
        }
    }

    /// The size the caller asked for when the block was allocated, before
    /// alignment rounding. Zero for an invalid handle.
    pub fn requested_size(&self, ptr: HeapPtr) -> usize {
        match self.block_at(ptr) {
            Some((_, hdr)) => hdr.requested() as usize,
            None => 0,
        }
    }

    /// The usable capacity assigned to a used block, alignment rounding
    /// and absorbed split slack included. Zero for a free block or an
    /// invalid handle.
    pub fn assigned_size(&self, ptr: HeapPtr) -> usize {
        match self.block_at(ptr) {
            Some((offset, hdr)) if !hdr.is_free() => self.capacity_of(offset, &hdr),
            _ => 0,
        }
    }

    /// The total span of the block owning `ptr`, header overhead included.
    /// Zero for an invalid handle.
    pub fn total_size(&self, ptr: HeapPtr) -> usize {
        match self.block_at(ptr) {
            Some((offset, hdr)) => self.span_of(offset, &hdr),
            None => 0,
        }
    }

    /// Aggregate usable capacity of all free blocks.
    ///
    /// An empty heap reports `SIZE - HEADER_SIZE`: the head block's header
    /// is permanent overhead.
    pub fn free_capacity(&self) -> usize {
        if self.head.is_none() {
            return SIZE - HEADER_SIZE;
        }
        self.blocks()
            .filter(|(_, hdr)| hdr.is_free())
            .map(|(offset, hdr)| self.capacity_of(offset, &hdr))
            .sum()
    }

    /// Aggregate usable capacity of all used blocks.
    pub fn used_capacity(&self) -> usize {
        self.blocks()
            .filter(|(_, hdr)| !hdr.is_free())
            .map(|(offset, hdr)| self.capacity_of(offset, &hdr))
            .sum()
    }

    /// Aggregate span of all blocks. Always equal to `SIZE`: the chain
    /// covers the arena with no gaps and no overlaps.
    pub fn total_span(&self) -> usize {
        if self.head.is_none() {
            return SIZE;
        }
        self.blocks()
            .map(|(offset, hdr)| self.span_of(offset, &hdr))
            .sum()
    }

    /// Number of outstanding allocations.
    #[inline]
    pub fn live_allocations(&self) -> usize {
        self.live
    }

    /// Writes a tabular snapshot of the block chain to `out`, one row per
    /// block plus a totals row. Read-only; meant for debugging, not for
    /// normal control flow.
    ///
    /// The `Assigned` column is a block's usable capacity; the assigned
    /// total only counts used blocks. The `Total` column is the block's
    /// span, and its column total always equals the arena size.
    pub fn dump_blocks(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(
            out,
            " # |       Prev |    Current |       Next | Status | Requested |  Assigned |     Total"
        )?;
        writeln!(
            out,
            "---+------------+------------+------------+--------+-----------+-----------+----------"
        )?;
        let mut requested_total = 0usize;
        let mut assigned_total = 0usize;
        let mut span_total = 0usize;
        for (i, (offset, hdr)) in self.blocks().enumerate() {
            let capacity = self.capacity_of(offset, &hdr);
            let span = self.span_of(offset, &hdr);
            writeln!(
                out,
                "{:>2} | {:>10} | {:>10} | {:>10} |  {}  | {:>9} | {:>9} | {:>9}",
                i,
                Link(hdr.prev),
                offset,
                Link(hdr.next),
                if hdr.is_free() { "free" } else { "used" },
                hdr.requested(),
                capacity,
                span,
            )?;
            requested_total += hdr.requested() as usize;
            if !hdr.is_free() {
                assigned_total += capacity;
            }
            span_total += span;
        }
        writeln!(
            out,
            "---+------------+------------+------------+--------+-----------+-----------+----------"
        )?;
        writeln!(
            out,
            "   |            |            |            |        | {:>9} | {:>9} | {:>9}",
            requested_total, assigned_total, span_total,
        )
    }
}

impl<S: FitStrategy, const SIZE: usize> Heap<S, SIZE> {
    /// Attempt to allocate `size` bytes.
    ///
    /// Returns a handle to the payload on success, or `None` when `size`
    /// is zero (a deliberate no-op) or when no free block is large enough
    /// (exhaustion). Check the result before using the handle; exhaustion
    /// is an expected outcome, not an error.
    ///
    /// The request is rounded up to [`ALIGNMENT`], the configured
    /// [`FitStrategy`] picks a free block, and the block is split when its
    /// tail can host another header; a remainder smaller than that stays
    /// with the allocation as slack.
    pub fn allocate(&mut self, size: usize) -> Option<HeapPtr> {
        self.ensure_chain();
        if size == 0 {
            return None;
        }
        let len = size.checked_add(ALIGNMENT - 1)? & !(ALIGNMENT - 1);

        let offset = S::find_fit(
            self.blocks().map(|(offset, hdr)| BlockInfo {
                offset,
                is_free: hdr.is_free(),
                capacity: self.capacity_of(offset, &hdr),
            }),
            len,
        )?;

        let mut hdr = self.load_hdr(offset);
        let capacity = self.capacity_of(offset, &hdr);
        debug_assert!(hdr.is_free());
        debug_assert!(capacity >= len);

        // `size <= capacity <= SIZE <= u32::MAX`, so the cast is lossless.
        hdr.state = BlockState::Used {
            requested: size as u32,
        };

        if capacity >= len + HEADER_SIZE {
            // Carve a new free block out of the tail capacity and link it
            // in as the immediate successor.
            let new_offset = offset + (HEADER_SIZE + len) as u32;
            if let Some(n) = hdr.next {
                let mut nh = self.load_hdr(n);
                nh.prev = Some(new_offset);
                self.store_hdr(n, nh);
            }
            self.store_hdr(
                new_offset,
                BlockHdr {
                    state: BlockState::Free,
                    prev: Some(offset),
                    next: hdr.next,
                },
            );
            hdr.next = Some(new_offset);
        }

        self.store_hdr(offset, hdr);
        self.live += 1;
        Some(HeapPtr(offset + HEADER_SIZE as u32))
    }
}

struct Blocks<'a, S, const SIZE: usize> {
    heap: &'a Heap<S, SIZE>,
    cursor: Option<u32>,
}

impl<S, const SIZE: usize> Iterator for Blocks<'_, S, SIZE> {
    type Item = (u32, BlockHdr);

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.cursor?;
        let hdr = self.heap.load_hdr(offset);
        self.cursor = hdr.next;
        Some((offset, hdr))
    }
}

/// `Display`s a link, `-` for "none".
struct Link(Option<u32>);

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(offset) => fmt::Display::fmt(&offset, f),
            None => f.pad("-"),
        }
    }
}
