//! The fixed-capacity backing store.
use core::ops::Range;

/// A fixed-size contiguous byte region. Its bounds are determined by the
/// `SIZE` parameter once and never change; offset `0` is the start address
/// and `SIZE` the end address of everything the allocator manages.
///
/// The arena has no behavior of its own. [`Heap`](crate::Heap) is the sole
/// writer and goes through the word-level accessors below to maintain the
/// block headers stored in place.
// The alignment makes offset-aligned payloads also address-aligned when the
// heap is placed in a `static`.
#[repr(C, align(16))]
pub(crate) struct Arena<const SIZE: usize> {
    bytes: [u8; SIZE],
}

impl<const SIZE: usize> Arena<SIZE> {
    pub(crate) const fn new() -> Self {
        Self { bytes: [0; SIZE] }
    }

    #[inline]
    pub(crate) fn read_word(&self, offset: usize) -> u32 {
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[offset..offset + 4]);
        u32::from_ne_bytes(word)
    }

    #[inline]
    pub(crate) fn write_word(&mut self, offset: usize, value: u32) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
    }

    #[inline]
    pub(crate) fn bytes(&self, range: Range<usize>) -> &[u8] {
        &self.bytes[range]
    }

    #[inline]
    pub(crate) fn bytes_mut(&mut self, range: Range<usize>) -> &mut [u8] {
        &mut self.bytes[range]
    }
}
