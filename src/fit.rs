//! Fit-search strategies.
//!
//! A strategy is a read-only scan over the block chain: it inspects every
//! [`BlockInfo`] the iterator yields (in address order, starting at the
//! chain head) and picks the block an allocation should use. Returning
//! `None` is the out-of-memory signal consumed by the engine, not an error.

use crate::heap::BlockInfo;

/// A policy for choosing the free block that services an allocation.
///
/// Exactly one strategy is compiled into a given [`Heap`](crate::Heap)
/// through its type parameter. Custom policies can be plugged in by
/// implementing this trait.
pub trait FitStrategy {
    /// Scans `blocks` in address order and returns the offset of the block
    /// the allocation should be placed in, or `None` if no free block has
    /// `capacity >= len`.
    ///
    /// `len` is the alignment-rounded request length.
    fn find_fit(blocks: impl Iterator<Item = BlockInfo>, len: usize) -> Option<u32>;
}

/// First-fit: take the first free block that is large enough.
///
/// Stops scanning at the first hit, so it is cheap on average, at the price
/// of accumulating fragmentation toward low addresses over time.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstFit;

/// Best-fit: take the smallest free block that is large enough.
///
/// Always scans the whole chain. Minimizes the leftover slack per
/// allocation but tends to produce many small leftover fragments.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestFit;

impl FitStrategy for FirstFit {
    #[inline]
    fn find_fit(mut blocks: impl Iterator<Item = BlockInfo>, len: usize) -> Option<u32> {
        blocks
            .find(|b| b.is_free && b.capacity >= len)
            .map(|b| b.offset)
    }
}

impl FitStrategy for BestFit {
    #[inline]
    fn find_fit(blocks: impl Iterator<Item = BlockInfo>, len: usize) -> Option<u32> {
        let mut smallest: Option<BlockInfo> = None;
        for b in blocks {
            if !b.is_free || b.capacity < len {
                continue;
            }
            match smallest {
                // Strict `<`, so ties go to the first-encountered (lowest
                // offset) block.
                Some(s) if s.capacity <= b.capacity => {}
                _ => smallest = Some(b),
            }
        }
        smallest.map(|b| b.offset)
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "first-fit")] {
        /// The strategy selected by cargo features: [`FirstFit`], because
        /// the `first-fit` feature is enabled.
        pub type DefaultFit = FirstFit;
    } else {
        /// The strategy selected by cargo features: [`BestFit`] unless the
        /// `first-fit` feature is enabled.
        pub type DefaultFit = BestFit;
    }
}
