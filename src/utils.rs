/// Rounds `x` up to the nearest multiple of `align`.
///
/// `align` must be a power of two and `x + align` must not overflow.
#[inline]
pub(crate) const fn align_up(x: usize, align: usize) -> usize {
    (x + align - 1) & !(align - 1)
}
