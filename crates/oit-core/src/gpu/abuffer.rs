use std::sync::Arc;

use oit_shaders::{CLEAR_WORKGROUP_SIZE, FrameParams};
use tracing::debug;

use super::pipeline::OitPipelines;
use super::readback::map_staging;
use super::tables::{GpuTables, TableLayout, TablePool};
use crate::error::{OitError, Result};
use crate::node::ListNode;
use crate::ABufferDesc;

/// Device copies of the A-buffer tables, as read back after a frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableSnapshot {
    pub counter: u32,
    pub heads: Vec<u32>,
    pub lengths: Vec<u32>,
    pub nodes: Vec<ListNode>,
}

/// Workgroup counts covering `width x height` with the clear kernel.
pub fn clear_workgroups(width: u32, height: u32) -> (u32, u32) {
    (
        width.div_ceil(CLEAR_WORKGROUP_SIZE),
        height.div_ceil(CLEAR_WORKGROUP_SIZE),
    )
}

/// GPU A-buffer: storage buffers in the shared device layout plus the clear,
/// capture and resolve pipelines that operate on them.
///
/// Per frame, record [`clear`](Self::clear), then draw transparent geometry inside
/// [`begin_capture`](Self::begin_capture), then [`resolve`](Self::resolve) onto
/// the opaque color target. Pass boundaries inside one encoder order the
/// storage accesses.
///
/// Table sets left behind by [`resize`](Self::resize) stay in a [`TablePool`]
/// and are picked up again when the buffer returns to that size.
pub struct GpuABuffer {
    device: Arc<wgpu::Device>,
    desc: ABufferDesc,
    params: wgpu::Buffer,
    tables: GpuTables,
    pool: TablePool,
    pipelines: OitPipelines,
    bind_group: wgpu::BindGroup,
}

impl GpuABuffer {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: &wgpu::Queue,
        desc: ABufferDesc,
        target_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        Self::check_limits(&device, &desc)?;

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("oit-frame-params"),
            size: std::mem::size_of::<FrameParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut pool = TablePool::new();
        let tables = pool.acquire(&device, TableLayout::of(&desc));
        let pipelines = OitPipelines::new(&device, &desc, target_format, depth_format);
        let bind_group = Self::make_bind_group(&device, &pipelines.bgl, &params, &tables);

        let abuffer = Self {
            device,
            desc,
            params,
            tables,
            pool,
            pipelines,
            bind_group,
        };
        abuffer.write_params(queue);
        debug!(
            width = desc.width,
            height = desc.height,
            capacity = desc.capacity,
            "allocated GPU A-buffer"
        );
        Ok(abuffer)
    }

    pub fn desc(&self) -> &ABufferDesc { &self.desc }
    pub fn table_pool(&self) -> &TablePool { &self.pool }

    fn check_limits(device: &wgpu::Device, desc: &ABufferDesc) -> Result<()> {
        desc.validate()?;
        let max = device.limits().max_storage_buffer_binding_size as u64;
        let largest = TableLayout::of(desc).largest_binding();
        if largest > max {
            return Err(OitError::InvalidDescriptor(format!(
                "storage binding of {largest} bytes exceeds device limit {max}"
            )));
        }
        Ok(())
    }

    fn make_bind_group(
        device: &wgpu::Device,
        bgl: &wgpu::BindGroupLayout,
        params: &wgpu::Buffer,
        tables: &GpuTables,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("oit-bind-group"),
            layout: bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: tables.counter.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: tables.heads.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: tables.lengths.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 4, resource: tables.nodes.as_entire_binding() },
            ],
        })
    }

    fn write_params(&self, queue: &wgpu::Queue) {
        let params = FrameParams {
            width: self.desc.width,
            height: self.desc.height,
            capacity: self.desc.capacity,
            max_fragments: self.desc.max_fragments,
        };
        queue.write_buffer(&self.params, 0, bytemuck::bytes_of(&params));
    }

    /// Switch to a new resolution, keeping the same arena slots per pixel
    /// (see [`ABufferDesc::resized`]). The previous table set is parked in the
    /// pool. Clear before the next capture.
    pub fn resize(&mut self, queue: &wgpu::Queue, width: u32, height: u32) -> Result<()> {
        let desc = self.desc.resized(width, height);
        Self::check_limits(&self.device, &desc)?;
        let layout = TableLayout::of(&desc);
        if layout != self.tables.layout {
            let tables = self.pool.acquire(&self.device, layout);
            let old = std::mem::replace(&mut self.tables, tables);
            self.pool.release(old);
        }
        debug!(
            width,
            height,
            capacity = desc.capacity,
            parked_bytes = self.pool.parked_bytes(),
            "resized GPU A-buffer"
        );
        self.desc = desc;
        self.bind_group = Self::make_bind_group(&self.device, &self.pipelines.bgl, &self.params, &self.tables);
        self.write_params(queue);
        Ok(())
    }

    /// Clear pass (also resets the slot counter).
    pub fn clear(&self, encoder: &mut wgpu::CommandEncoder) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("oit-clear-pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipelines.clear);
        pass.set_bind_group(0, &self.bind_group, &[]);
        let (x, y) = clear_workgroups(self.desc.width, self.desc.height);
        pass.dispatch_workgroups(x, y, 1);
    }

    /// Begin the capture pass. The returned pass has the capture pipeline and
    /// bind group set; draw `CaptureVertex` buffers into it. `opaque_depth` is
    /// tested but never written.
    pub fn begin_capture<'pass>(
        &'pass self,
        encoder: &'pass mut wgpu::CommandEncoder,
        opaque_depth: &'pass wgpu::TextureView,
    ) -> wgpu::RenderPass<'pass> {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("oit-capture-pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: opaque_depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipelines.capture);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass
    }

    /// Resolve pass: blend every pixel's sorted layers onto `target`.
    pub fn resolve(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("oit-resolve-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipelines.resolve);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    /// Copy counter, Head, Length and the used part of the arena back to the host.
    pub fn read_tables(&self, queue: &wgpu::Queue) -> Result<TableSnapshot> {
        let layout = self.tables.layout;
        let pixels = layout.pixel_table_bytes();
        let nodes = layout.arena_bytes();
        let (heads_at, lengths_at, nodes_at, counter_at) = (0, pixels, pixels * 2, pixels * 2 + nodes);

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("oit-readback-tables"),
            size: counter_at + 4,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("oit-readback-tables-encoder"),
        });
        encoder.copy_buffer_to_buffer(&self.tables.heads, 0, &staging, heads_at, pixels);
        encoder.copy_buffer_to_buffer(&self.tables.lengths, 0, &staging, lengths_at, pixels);
        encoder.copy_buffer_to_buffer(&self.tables.nodes, 0, &staging, nodes_at, nodes);
        encoder.copy_buffer_to_buffer(&self.tables.counter, 0, &staging, counter_at, 4);

        let capacity = self.desc.capacity;
        map_staging(&self.device, queue, encoder, &staging, |data| {
            let words = |from: u64, to: u64| -> Vec<u32> {
                bytemuck::cast_slice(&data[from as usize..to as usize]).to_vec()
            };
            let counter = words(counter_at, counter_at + 4)[0];
            let used = counter.min(capacity) as usize;
            let all: &[ListNode] = bytemuck::cast_slice(&data[nodes_at as usize..counter_at as usize]);
            TableSnapshot {
                counter,
                heads: words(heads_at, lengths_at),
                lengths: words(lengths_at, nodes_at),
                nodes: all[..used].to_vec(),
            }
        })
    }
}
