//! oit-core: per-pixel linked-list order-independent transparency.
//!
//! A frame runs three passes over shared tables:
//!
//! 1. **Clear** resets every pixel's Head to [`SENTINEL`] and Length to zero.
//! 2. **Capture** runs once per transparent fragment, in any order and
//!    concurrently: it takes a slot from the frame-wide counter, pushes the slot
//!    onto its pixel's list with one atomic exchange, bumps the pixel's Length,
//!    and fills the node.
//! 3. **Resolve** runs once per pixel: it copies at most `max_fragments` nodes,
//!    sorts them far to near, and composites them back to front.
//!
//! [`ABuffer`] runs the passes on a CPU worker pool. [`gpu::GpuABuffer`] binds the
//! same layout as `wgpu` storage buffers and runs the WGSL kernels from
//! `oit-shaders`.

/// Re-export wgpu for downstream crates while avoiding direct dependency leakage.
pub use wgpu;

mod abuffer;
mod counter;
mod error;
pub mod gpu;
mod node;
pub mod passes;
mod tables;
mod target;

pub use abuffer::{ABuffer, CaptureStats, FramePhase};
pub use counter::FragmentCounter;
pub use error::{OitError, Result};
pub use node::{DepthKeyMode, ListNode, SENTINEL, pack_unorm4x8, unpack_unorm4x8};
pub use passes::{Fragment, ResolvedPixel};
pub use tables::{FragmentArena, HeadTable, LengthTable, NodeSource};
pub use target::{ColorTarget, OpaqueDepth};

/// Local sort buffer size used when none is configured.
pub const DEFAULT_MAX_FRAGMENTS: u32 = 16;

/// Largest `max_fragments` accepted; the GPU resolve shader keeps its sort
/// buffer in function-local memory.
pub const MAX_FRAGMENTS_LIMIT: u32 = 64;

/// Arena slots per pixel when capacity is derived from the resolution.
pub const DEFAULT_LAYERS_PER_PIXEL: u32 = 4;

/// What the GPU resolve emits for a pixel no fragment reached.
///
/// The CPU resolve writes every pixel of its own target, using
/// [`ResolvedPixel::EMPTY`] for empty ones, so both policies composite to the
/// same image there.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EmptyPixelPolicy {
    /// Leave the color attachment as the opaque pass left it.
    #[default]
    Discard,
    /// Blend "no contribution": black with full transmittance.
    Transparent,
}

/// Sizing and behavior of an A-buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ABufferDesc {
    pub width: u32,
    pub height: u32,
    /// Arena slots for the whole frame (`OffsetMax`).
    pub capacity: u32,
    /// Per-pixel traversal bound in resolve.
    pub max_fragments: u32,
    pub depth_key: DepthKeyMode,
    pub empty_pixel: EmptyPixelPolicy,
}

impl ABufferDesc {
    /// Descriptor with [`DEFAULT_LAYERS_PER_PIXEL`] slots per pixel and default policies.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            capacity: width
                .saturating_mul(height)
                .saturating_mul(DEFAULT_LAYERS_PER_PIXEL),
            max_fragments: DEFAULT_MAX_FRAGMENTS,
            depth_key: DepthKeyMode::default(),
            empty_pixel: EmptyPixelPolicy::default(),
        }
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_max_fragments(mut self, max_fragments: u32) -> Self {
        self.max_fragments = max_fragments;
        self
    }

    pub fn with_depth_key(mut self, depth_key: DepthKeyMode) -> Self {
        self.depth_key = depth_key;
        self
    }

    pub fn with_empty_pixel(mut self, empty_pixel: EmptyPixelPolicy) -> Self {
        self.empty_pixel = empty_pixel;
        self
    }

    /// Same descriptor at a new resolution, with the arena scaled to keep the
    /// current slots per pixel. An explicit capacity scales like a derived one.
    pub fn resized(self, width: u32, height: u32) -> Self {
        let old_pixels = (self.width as u64 * self.height as u64).max(1);
        let new_pixels = width as u64 * height as u64;
        let capacity = (self.capacity as u64).saturating_mul(new_pixels).div_ceil(old_pixels);
        Self {
            width,
            height,
            capacity: capacity.min(FragmentCounter::LIMIT as u64) as u32,
            ..self
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(OitError::InvalidDescriptor(format!(
                "resolution {}x{} has no pixels",
                self.width, self.height
            )));
        }
        // the counter stops handing out slots at LIMIT, so SENTINEL is never one
        if self.capacity == 0 || self.capacity > FragmentCounter::LIMIT {
            return Err(OitError::InvalidDescriptor(format!(
                "capacity {} must be in 1..={}",
                self.capacity,
                FragmentCounter::LIMIT
            )));
        }
        if !(1..=MAX_FRAGMENTS_LIMIT).contains(&self.max_fragments) {
            return Err(OitError::InvalidDescriptor(format!(
                "max_fragments {} must be in 1..={}",
                self.max_fragments, MAX_FRAGMENTS_LIMIT
            )));
        }
        Ok(())
    }
}
