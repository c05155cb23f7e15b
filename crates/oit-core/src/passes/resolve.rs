use crate::node::{SENTINEL, unpack_unorm4x8};
use crate::tables::NodeSource;

/// Sort key plus payload copied out of the arena into the local working buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortEntry {
    pub packed_color: u32,
    pub depth_key: u32,
}

/// A pixel's transparency contribution: premultiplied color over black plus the
/// fraction of the background still visible.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedPixel {
    pub rgb: [f32; 3],
    pub transmittance: f32,
}

impl ResolvedPixel {
    /// No layers: nothing added, background fully visible.
    pub const EMPTY: Self = Self { rgb: [0.0; 3], transmittance: 1.0 };

    #[inline]
    pub fn to_rgba(self) -> [f32; 4] {
        [self.rgb[0], self.rgb[1], self.rgb[2], self.transmittance]
    }

    /// Final color over an opaque background.
    #[inline]
    pub fn over(self, background: [f32; 3]) -> [f32; 3] {
        [
            self.rgb[0] + background[0] * self.transmittance,
            self.rgb[1] + background[1] * self.transmittance,
            self.rgb[2] + background[2] * self.transmittance,
        ]
    }
}

/// Resolve kernel body for one pixel.
///
/// Returns `None` for an empty list without touching `nodes`. Otherwise walks at
/// most `min(length, max_fragments)` nodes, stopping early at [`SENTINEL`] or at a
/// slot the storage does not hold, then sorts and composites them. `scratch` is
/// the per-worker local buffer and is reused across pixels.
pub fn resolve_pixel<N: NodeSource + ?Sized>(
    head: u32,
    length: u32,
    max_fragments: u32,
    nodes: &N,
    scratch: &mut Vec<SortEntry>,
) -> Option<ResolvedPixel> {
    if head == SENTINEL {
        return None;
    }

    let len = length.min(max_fragments) as usize;
    scratch.clear();
    let mut index = head;
    while scratch.len() < len && index != SENTINEL {
        let Some(node) = nodes.node(index) else { break };
        scratch.push(SortEntry {
            packed_color: node.packed_color,
            depth_key: node.depth_key,
        });
        index = node.next;
    }

    sort_far_to_near(scratch);
    Some(composite(scratch))
}

/// Stable insertion sort by depth key, descending. Inputs are small and
/// usually close to sorted.
pub fn sort_far_to_near(entries: &mut [SortEntry]) {
    for i in 1..entries.len() {
        let temp = entries[i];
        let mut j = i;
        while j > 0 && entries[j - 1].depth_key < temp.depth_key {
            entries[j] = entries[j - 1];
            j -= 1;
        }
        entries[j] = temp;
    }
}

/// Back-to-front "over" accumulation of already sorted entries.
pub fn composite(sorted: &[SortEntry]) -> ResolvedPixel {
    let mut rgb = [0.0f32; 3];
    let mut alpha = 1.0f32;
    for entry in sorted {
        let [r, g, b, a] = unpack_unorm4x8(entry.packed_color);
        alpha *= 1.0 - a;
        for (acc, c) in rgb.iter_mut().zip([r, g, b]) {
            *acc = *acc * (1.0 - a) + c * a;
        }
    }
    ResolvedPixel { rgb, transmittance: alpha }
}
