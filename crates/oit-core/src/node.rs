use bytemuck::{Pod, Zeroable};

/// Reserved slot index meaning "no node": an empty Head or the end of a chain.
pub const SENTINEL: u32 = u32::MAX;

/// One captured fragment sample as laid out in device memory:
/// three consecutive `u32`s, 12-byte stride, no padding.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct ListNode {
    pub packed_color: u32,
    pub depth_key: u32,
    pub next: u32,
}

impl ListNode {
    /// Node for `color` at `depth` linking to `next`.
    pub fn new(color: [f32; 4], depth: f32, next: u32, mode: DepthKeyMode) -> Self {
        Self {
            packed_color: pack_unorm4x8(color),
            depth_key: mode.encode(depth),
            next,
        }
    }

    #[inline]
    pub fn color(&self) -> [f32; 4] {
        unpack_unorm4x8(self.packed_color)
    }

    #[inline]
    pub fn is_tail(&self) -> bool {
        self.next == SENTINEL
    }
}

/// How a floating-point depth becomes the `u32` the resolve sort compares.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DepthKeyMode {
    /// Raw IEEE-754 bit pattern. Orders correctly only when every depth in the
    /// frame has the same sign.
    #[default]
    Raw,
    /// Sign-aware transform that preserves float order across zero.
    Sortable,
}

impl DepthKeyMode {
    #[inline]
    pub fn encode(self, depth: f32) -> u32 {
        let bits = depth.to_bits();
        match self {
            Self::Raw => bits,
            Self::Sortable => {
                if bits & 0x8000_0000 != 0 {
                    !bits
                } else {
                    bits ^ 0x8000_0000
                }
            }
        }
    }
}

/// Quantize straight RGBA to 8 bits per channel, red in the low byte.
/// Same bit layout as GLSL `packUnorm4x8` / WGSL `pack4x8unorm`.
#[inline]
pub fn pack_unorm4x8(c: [f32; 4]) -> u32 {
    c.iter().enumerate().fold(0u32, |acc, (i, v)| {
        let q = (v.clamp(0.0, 1.0) * 255.0).round() as u32;
        acc | (q << (8 * i))
    })
}

#[inline]
pub fn unpack_unorm4x8(packed: u32) -> [f32; 4] {
    [
        (packed & 0xff) as f32 / 255.0,
        ((packed >> 8) & 0xff) as f32 / 255.0,
        ((packed >> 16) & 0xff) as f32 / 255.0,
        ((packed >> 24) & 0xff) as f32 / 255.0,
    ]
}
