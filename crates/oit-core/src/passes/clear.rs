use crate::tables::{HeadTable, LengthTable};

/// Reset one pixel to the empty list.
#[inline]
pub fn clear_pixel(heads: &HeadTable, lengths: &LengthTable, index: usize) {
    heads.reset(index);
    lengths.reset(index);
}
