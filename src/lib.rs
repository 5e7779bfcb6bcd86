//! This crate implements a fixed-capacity free-list memory allocator for
//! resource-constrained targets that lack a general-purpose heap.
//!
//!  - **Deterministic, low-overhead bookkeeping.** Every block is described
//!    by a small header embedded in the arena itself; allocation is a single
//!    bounded scan of the block chain, release is a constant number of
//!    header updates.
//!
//!  - **Two interchangeable search policies.** [`FirstFit`] takes the first
//!    free block that fits, [`BestFit`] takes the smallest one. The policy is
//!    a type parameter of [`Heap`], so exactly one is compiled into a given
//!    build and there is no runtime dispatch.
//!
//!  - **No raw pointers.** All links between blocks are byte offsets into
//!    the arena, so the whole heap is a plain owned value: it can be moved,
//!    placed in a `static`, or instantiated several times for independent
//!    subsystems. Handing a stale or foreign handle to [`Heap::deallocate`]
//!    is a detectable error, not undefined behavior.
//!
//!  - **This crate supports `#![no_std]`.** It can be used in bare-metal and
//!    RTOS-based applications.
//!
//! # Examples
//!
//! ```rust
//! use linkfit::{Heap, FirstFit};
//!
//! // A 4 KiB heap using the first-fit policy. `Heap::new` is `const`, so
//! // this also works in a `static`.
//! let mut heap: Heap<FirstFit, 4096> = Heap::new();
//!
//! let a = heap.allocate(64).unwrap();
//! let b = heap.allocate(128).unwrap();
//! assert_eq!(heap.requested_size(a), 64);
//!
//! heap.payload_mut(a).unwrap()[0] = 42;
//! assert_eq!(heap.payload(a).unwrap()[0], 42);
//!
//! heap.deallocate(a).unwrap();
//! heap.deallocate(b).unwrap();
//! assert_eq!(heap.live_allocations(), 0);
//! ```
//!
//! The default policy is best-fit; enabling the `first-fit` cargo feature
//! switches the [`DefaultFit`] alias over to [`FirstFit`] instead.
//!
//! # Details
//!
//! The allocator assumes a single logical owner. There is no internal
//! locking; concurrent use from multiple threads requires an external
//! mutual-exclusion wrapper.
//!
//! Free space is never returned to the underlying memory system. The arena
//! is part of the [`Heap`] value and lives exactly as long as it does.
#![no_std]
#![cfg_attr(feature = "doc_cfg", feature(doc_cfg))]

mod arena;
mod fit;
mod heap;
mod utils;
pub use self::{
    fit::{BestFit, DefaultFit, FirstFit, FitStrategy},
    heap::{BlockInfo, DeallocError, Heap, HeapPtr, ALIGNMENT, HEADER_SIZE},
};

#[cfg(any(test, feature = "std"))]
extern crate std;

#[cfg(test)]
mod tests;
