use std::collections::HashMap;

use crate::node::ListNode;
use crate::ABufferDesc;

/// Sizes of one device table set. Head and Length are flat per-pixel arrays,
/// so any resolution with the same pixel count shares a layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TableLayout {
    pub pixels: u32,
    pub capacity: u32,
}

impl TableLayout {
    pub fn of(desc: &ABufferDesc) -> Self {
        Self {
            pixels: desc.width.saturating_mul(desc.height),
            capacity: desc.capacity,
        }
    }

    /// Bytes of one per-pixel table (Head or Length).
    pub fn pixel_table_bytes(&self) -> u64 {
        self.pixels as u64 * 4
    }

    /// Bytes of the node arena at the 12-byte device stride.
    pub fn arena_bytes(&self) -> u64 {
        arena_bytes(self.capacity)
    }

    /// Largest single storage binding; checked against the device limit.
    pub fn largest_binding(&self) -> u64 {
        self.arena_bytes().max(self.pixel_table_bytes())
    }

    /// Device memory held by the whole set, counter included.
    pub fn total_bytes(&self) -> u64 {
        4 + 2 * self.pixel_table_bytes() + self.arena_bytes()
    }
}

/// Bytes needed for `capacity` nodes at the 12-byte device stride.
pub fn arena_bytes(capacity: u32) -> u64 {
    capacity as u64 * std::mem::size_of::<ListNode>() as u64
}

/// Counter, Head, Length and node arena storage buffers for one layout.
pub(crate) struct GpuTables {
    pub(crate) layout: TableLayout,
    pub(crate) counter: wgpu::Buffer,
    pub(crate) heads: wgpu::Buffer,
    pub(crate) lengths: wgpu::Buffer,
    pub(crate) nodes: wgpu::Buffer,
}

impl GpuTables {
    fn create(device: &wgpu::Device, layout: TableLayout) -> Self {
        let storage = |label: &str, size: u64| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        };
        Self {
            layout,
            counter: storage("oit-counter", 4),
            heads: storage("oit-heads", layout.pixel_table_bytes()),
            lengths: storage("oit-lengths", layout.pixel_table_bytes()),
            nodes: storage("oit-nodes", layout.arena_bytes()),
        }
    }
}

/// Table sets parked by a resize, keyed by layout. Going back to a previous
/// size picks its set up again instead of allocating. Sets are always cleared
/// by the clear pass before use, so nothing carries over.
#[derive(Default)]
pub struct TablePool {
    free: HashMap<TableLayout, Vec<GpuTables>>,
}

impl TablePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn acquire(&mut self, device: &wgpu::Device, layout: TableLayout) -> GpuTables {
        self.free
            .get_mut(&layout)
            .and_then(Vec::pop)
            .unwrap_or_else(|| GpuTables::create(device, layout))
    }

    pub(crate) fn release(&mut self, tables: GpuTables) {
        self.free.entry(tables.layout).or_default().push(tables);
    }

    /// Table sets currently parked.
    pub fn len(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Device memory held by parked sets.
    pub fn parked_bytes(&self) -> u64 {
        self.free
            .iter()
            .map(|(layout, sets)| layout.total_bytes() * sets.len() as u64)
            .sum()
    }
}
