//! wgpu host setup for the A-buffer: storage buffers in the device layout,
//! the three OIT pipelines, frame attachments, and readback helpers.

mod abuffer;
mod pipeline;
mod readback;
mod tables;
mod targets;

pub use abuffer::{GpuABuffer, TableSnapshot, clear_workgroups};
pub use pipeline::{OitPipelines, RESOLVE_BLEND, capture_vertex_layout};
pub use readback::{padded_bytes_per_row, read_texture_rgba8};
pub use tables::{TableLayout, TablePool, arena_bytes};
pub use targets::FrameTargets;
pub use oit_shaders::{CaptureVertex, FrameParams};

/// Depth format the capture pipeline tests against by default.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Request a headless adapter and device. Returns `None` when no adapter is available.
pub async fn request_headless_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::default();
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        })
        .await?;
    adapter
        .request_device(&wgpu::DeviceDescriptor::default(), None)
        .await
        .ok()
}
