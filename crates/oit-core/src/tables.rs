//! Shared per-frame storage: the Head and Length tables and the fragment arena.
//!
//! Every cell is an `AtomicU32` so all capture invocations can share `&self`.
//! Arena node contents are written by exactly one invocation and only read
//! after the capture barrier, so their stores are relaxed.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::node::{ListNode, SENTINEL};

#[derive(Debug)]
struct PixelGrid {
    width: u32,
    height: u32,
    cells: Box<[AtomicU32]>,
}

impl PixelGrid {
    fn new(width: u32, height: u32, value: u32) -> Self {
        let cells = (0..width as usize * height as usize)
            .map(|_| AtomicU32::new(value))
            .collect();
        Self { width, height, cells }
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y as usize * self.width as usize + x as usize)
    }

    fn load(&self, index: usize) -> u32 {
        self.cells[index].load(Ordering::Acquire)
    }

    fn snapshot(&self) -> Vec<u32> {
        self.cells.iter().map(|c| c.load(Ordering::Acquire)).collect()
    }
}

/// Per-pixel list head: a valid arena slot or [`SENTINEL`].
#[derive(Debug)]
pub struct HeadTable(PixelGrid);

impl HeadTable {
    pub fn new(width: u32, height: u32) -> Self {
        Self(PixelGrid::new(width, height, SENTINEL))
    }

    pub fn width(&self) -> u32 { self.0.width }
    pub fn height(&self) -> u32 { self.0.height }
    pub fn len(&self) -> usize { self.0.cells.len() }
    pub fn is_empty(&self) -> bool { self.0.cells.is_empty() }

    /// Row-major index of `(x, y)`, or `None` outside the table.
    #[inline]
    pub fn index(&self, x: u32, y: u32) -> Option<usize> {
        self.0.index(x, y)
    }

    /// Lock-free push: install `slot` as the new head and return the previous one.
    #[inline]
    pub fn exchange(&self, index: usize, slot: u32) -> u32 {
        self.0.cells[index].swap(slot, Ordering::AcqRel)
    }

    #[inline]
    pub fn head(&self, index: usize) -> u32 {
        self.0.load(index)
    }

    /// Clear-pass kernel body for one pixel.
    #[inline]
    pub fn reset(&self, index: usize) {
        self.0.cells[index].store(SENTINEL, Ordering::Release);
    }

    /// Copy out in the row-major `u32` layout the GPU binding uses.
    pub fn snapshot(&self) -> Vec<u32> {
        self.0.snapshot()
    }
}

/// Per-pixel count of linked nodes.
#[derive(Debug)]
pub struct LengthTable(PixelGrid);

impl LengthTable {
    pub fn new(width: u32, height: u32) -> Self {
        Self(PixelGrid::new(width, height, 0))
    }

    #[inline]
    pub fn increment(&self, index: usize) {
        self.0.cells[index].fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    pub fn length(&self, index: usize) -> u32 {
        self.0.load(index)
    }

    #[inline]
    pub fn reset(&self, index: usize) {
        self.0.cells[index].store(0, Ordering::Release);
    }

    pub fn snapshot(&self) -> Vec<u32> {
        self.0.snapshot()
    }
}

/// One arena slot; same 12-byte layout as [`ListNode`].
#[repr(C)]
#[derive(Debug, Default)]
struct ArenaSlot {
    packed_color: AtomicU32,
    depth_key: AtomicU32,
    next: AtomicU32,
}

/// Fixed-capacity node storage shared by the whole frame, addressed by slot index.
#[derive(Debug)]
pub struct FragmentArena {
    slots: Box<[ArenaSlot]>,
}

impl FragmentArena {
    pub fn new(capacity: u32) -> Self {
        let slots = (0..capacity).map(|_| ArenaSlot::default()).collect();
        Self { slots }
    }

    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Fill `slot`. Each slot is written by exactly one capture invocation per frame.
    #[inline]
    pub fn write(&self, slot: u32, node: ListNode) {
        let s = &self.slots[slot as usize];
        s.packed_color.store(node.packed_color, Ordering::Relaxed);
        s.depth_key.store(node.depth_key, Ordering::Relaxed);
        s.next.store(node.next, Ordering::Relaxed);
    }

    /// Read back the first `count` slots (clamped to capacity) in device layout.
    pub fn snapshot(&self, count: u32) -> Vec<ListNode> {
        let count = count.min(self.capacity());
        (0..count).filter_map(|slot| self.node(slot)).collect()
    }
}

/// Read access to captured nodes, implemented by the live arena and by plain
/// node slices (e.g. a GPU readback).
pub trait NodeSource {
    /// Node stored at `slot`, or `None` if the slot is outside the storage.
    fn node(&self, slot: u32) -> Option<ListNode>;
}

impl NodeSource for FragmentArena {
    #[inline]
    fn node(&self, slot: u32) -> Option<ListNode> {
        self.slots.get(slot as usize).map(|s| ListNode {
            packed_color: s.packed_color.load(Ordering::Relaxed),
            depth_key: s.depth_key.load(Ordering::Relaxed),
            next: s.next.load(Ordering::Relaxed),
        })
    }
}

impl NodeSource for [ListNode] {
    #[inline]
    fn node(&self, slot: u32) -> Option<ListNode> {
        self.get(slot as usize).copied()
    }
}

impl NodeSource for Vec<ListNode> {
    #[inline]
    fn node(&self, slot: u32) -> Option<ListNode> {
        self.as_slice().node(slot)
    }
}
