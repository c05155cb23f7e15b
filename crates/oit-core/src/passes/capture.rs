use crate::counter::FragmentCounter;
use crate::node::{DepthKeyMode, ListNode};
use crate::tables::{FragmentArena, HeadTable, LengthTable};
use crate::target::OpaqueDepth;

/// One covered sample of a transparent primitive, as produced by rasterization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fragment {
    pub x: u32,
    pub y: u32,
    /// Clip-space z before perspective division.
    pub depth: f32,
    /// Straight RGBA.
    pub color: [f32; 4],
}

impl Fragment {
    pub fn new(x: u32, y: u32, depth: f32, color: [f32; 4]) -> Self {
        Self { x, y, depth, color }
    }
}

/// What happened to a fragment. Only used for accounting; none of these are errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureOutcome {
    Linked { slot: u32 },
    /// Rejected by the early opaque depth test; no slot was allocated.
    Occluded,
    /// The counter ran past capacity; the slot was consumed but nothing was written.
    ArenaExhausted,
    /// Coordinates outside the target.
    OutOfBounds,
}

/// Everything a capture invocation touches.
pub struct CaptureTargets<'a> {
    pub counter: &'a FragmentCounter,
    pub heads: &'a HeadTable,
    pub lengths: &'a LengthTable,
    pub arena: &'a FragmentArena,
    pub opaque: Option<&'a OpaqueDepth>,
    pub depth_key: DepthKeyMode,
}

/// Capture kernel body: depth test, allocate, push onto the pixel's list, count, fill.
///
/// The push is a single exchange on the pixel's head, so concurrent invocations
/// on the same pixel never lose each other's link.
pub fn capture_fragment(t: &CaptureTargets<'_>, fragment: &Fragment) -> CaptureOutcome {
    let Some(index) = t.heads.index(fragment.x, fragment.y) else {
        return CaptureOutcome::OutOfBounds;
    };

    if let Some(opaque) = t.opaque {
        if !opaque.passes(index, fragment.depth) {
            return CaptureOutcome::Occluded;
        }
    }

    let slot = t.counter.allocate();
    if slot >= t.arena.capacity() {
        return CaptureOutcome::ArenaExhausted;
    }

    let prev = t.heads.exchange(index, slot);
    t.lengths.increment(index);
    t.arena
        .write(slot, ListNode::new(fragment.color, fragment.depth, prev, t.depth_key));

    CaptureOutcome::Linked { slot }
}
