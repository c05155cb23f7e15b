use rayon::prelude::*;
use tracing::{debug, trace};

use crate::counter::FragmentCounter;
use crate::error::{OitError, Result};
use crate::node::{ListNode, SENTINEL};
use crate::passes::capture::CaptureTargets;
use crate::passes::{CaptureOutcome, Fragment, ResolvedPixel, capture_fragment, clear_pixel, resolve_pixel};
use crate::tables::{FragmentArena, HeadTable, LengthTable, NodeSource};
use crate::target::{ColorTarget, OpaqueDepth};
use crate::ABufferDesc;

/// Where the current frame is in its clear → capture → resolve sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    Cleared,
    Capturing,
    Resolved,
}

/// Per-batch capture accounting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub linked: u32,
    pub occluded: u32,
    pub exhausted: u32,
    pub out_of_bounds: u32,
}

impl CaptureStats {
    fn record(mut self, outcome: CaptureOutcome) -> Self {
        match outcome {
            CaptureOutcome::Linked { .. } => self.linked += 1,
            CaptureOutcome::Occluded => self.occluded += 1,
            CaptureOutcome::ArenaExhausted => self.exhausted += 1,
            CaptureOutcome::OutOfBounds => self.out_of_bounds += 1,
        }
        self
    }

    fn merge(self, other: Self) -> Self {
        Self {
            linked: self.linked + other.linked,
            occluded: self.occluded + other.occluded,
            exhausted: self.exhausted + other.exhausted,
            out_of_bounds: self.out_of_bounds + other.out_of_bounds,
        }
    }
}

/// CPU A-buffer: the shared tables plus the worker pool that runs the passes.
///
/// Each pass runs to completion inside `ThreadPool::install` before the call
/// returns, which is the barrier between passes. Passes take `&mut self`, so a
/// capture can never overlap a clear or a resolve.
pub struct ABuffer {
    desc: ABufferDesc,
    counter: FragmentCounter,
    heads: HeadTable,
    lengths: LengthTable,
    arena: FragmentArena,
    pool: rayon::ThreadPool,
    phase: FramePhase,
}

impl ABuffer {
    /// Allocate tables for `desc` with a default-sized worker pool.
    pub fn new(desc: ABufferDesc) -> Result<Self> {
        Self::with_threads(desc, None)
    }

    pub fn with_threads(desc: ABufferDesc, threads: Option<usize>) -> Result<Self> {
        desc.validate()?;
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("oit-worker-{i}"));
        if let Some(n) = threads {
            builder = builder.num_threads(n);
        }
        let pool = builder.build()?;
        debug!(
            width = desc.width,
            height = desc.height,
            capacity = desc.capacity,
            threads = pool.current_num_threads(),
            "allocated A-buffer"
        );
        Ok(Self {
            counter: FragmentCounter::new(),
            heads: HeadTable::new(desc.width, desc.height),
            lengths: LengthTable::new(desc.width, desc.height),
            arena: FragmentArena::new(desc.capacity),
            pool,
            phase: FramePhase::Cleared,
            desc,
        })
    }

    pub fn desc(&self) -> &ABufferDesc { &self.desc }
    pub fn phase(&self) -> FramePhase { self.phase }
    pub fn heads(&self) -> &HeadTable { &self.heads }
    pub fn lengths(&self) -> &LengthTable { &self.lengths }
    pub fn arena(&self) -> &FragmentArena { &self.arena }
    pub fn counter(&self) -> &FragmentCounter { &self.counter }

    /// Reallocate for a new resolution, keeping the same arena slots per
    /// pixel (see [`ABufferDesc::resized`]). Leaves the buffer cleared.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let desc = self.desc.resized(width, height);
        desc.validate()?;
        self.heads = HeadTable::new(width, height);
        self.lengths = LengthTable::new(width, height);
        if desc.capacity != self.desc.capacity {
            self.arena = FragmentArena::new(desc.capacity);
        }
        debug!(width, height, capacity = desc.capacity, "resized A-buffer");
        self.counter.reset();
        self.phase = FramePhase::Cleared;
        self.desc = desc;
        Ok(())
    }

    /// Clear pass: every Head to SENTINEL, every Length to zero, counter to zero.
    pub fn clear(&mut self) {
        self.counter.reset();
        let (heads, lengths) = (&self.heads, &self.lengths);
        self.pool
            .install(|| (0..heads.len()).into_par_iter().for_each(|i| clear_pixel(heads, lengths, i)));
        self.phase = FramePhase::Cleared;
    }

    /// Capture pass over one batch of fragments (typically one draw call).
    pub fn capture(&mut self, fragments: &[Fragment]) -> Result<CaptureStats> {
        self.capture_batch(fragments, None)
    }

    /// Capture with an early test against previously rendered opaque depth.
    pub fn capture_with_depth(&mut self, fragments: &[Fragment], opaque: &OpaqueDepth) -> Result<CaptureStats> {
        opaque.check_size(self.desc.width, self.desc.height)?;
        self.capture_batch(fragments, Some(opaque))
    }

    fn capture_batch(&mut self, fragments: &[Fragment], opaque: Option<&OpaqueDepth>) -> Result<CaptureStats> {
        if self.phase == FramePhase::Resolved {
            return Err(OitError::FrameResolved);
        }
        self.phase = FramePhase::Capturing;

        let targets = CaptureTargets {
            counter: &self.counter,
            heads: &self.heads,
            lengths: &self.lengths,
            arena: &self.arena,
            opaque,
            depth_key: self.desc.depth_key,
        };
        let stats = self.pool.install(|| {
            fragments
                .par_iter()
                .map(|f| capture_fragment(&targets, f))
                .fold(CaptureStats::default, CaptureStats::record)
                .reduce(CaptureStats::default, CaptureStats::merge)
        });
        if stats.out_of_bounds > 0 {
            trace!(dropped = stats.out_of_bounds, "fragments outside the target");
        }
        Ok(stats)
    }

    /// Resolve pass: sort and composite every pixel into `target`
    /// (rgb = premultiplied color, alpha = transmittance).
    ///
    /// Every pixel of `target` is written, so a target can be reused across
    /// frames. Pixels no fragment reached get [`ResolvedPixel::EMPTY`], which
    /// leaves the background unchanged under [`ColorTarget::composite_onto`];
    /// [`EmptyPixelPolicy`](crate::EmptyPixelPolicy) only matters to the GPU resolve, which blends
    /// straight onto the color attachment. A frame is resolved once; clear
    /// before the next one.
    pub fn resolve(&mut self, target: &mut ColorTarget) -> Result<()> {
        if self.phase == FramePhase::Resolved {
            return Err(OitError::FrameResolved);
        }
        target.check_size("resolve target", self.desc.width, self.desc.height)?;

        let requested = self.counter.allocated();
        if requested > self.desc.capacity {
            debug!(requested, capacity = self.desc.capacity, "fragment arena exhausted; excess fragments dropped");
        }

        let width = self.desc.width as usize;
        let max_fragments = self.desc.max_fragments;
        let (heads, lengths, arena) = (&self.heads, &self.lengths, &self.arena);
        self.pool.install(|| {
            target.pixels_mut().par_chunks_mut(width).enumerate().for_each_init(
                || Vec::with_capacity(max_fragments as usize),
                |scratch, (y, row)| {
                    for (x, out) in row.iter_mut().enumerate() {
                        let index = y * width + x;
                        let pixel = resolve_pixel(heads.head(index), lengths.length(index), max_fragments, arena, scratch);
                        *out = pixel.unwrap_or(ResolvedPixel::EMPTY).to_rgba();
                    }
                },
            )
        });
        self.phase = FramePhase::Resolved;
        Ok(())
    }

    /// Walk the list at `(x, y)` from Head, most recently linked first.
    /// Stops at SENTINEL and never visits more nodes than the arena holds.
    pub fn chain(&self, x: u32, y: u32) -> Vec<ListNode> {
        let Some(index) = self.heads.index(x, y) else {
            return Vec::new();
        };
        let mut nodes = Vec::new();
        let mut slot = self.heads.head(index);
        while slot != SENTINEL && nodes.len() < self.arena.capacity() as usize {
            let Some(node) = self.arena.node(slot) else { break };
            nodes.push(node);
            slot = node.next;
        }
        nodes
    }
}
