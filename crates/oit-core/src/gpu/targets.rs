use super::readback::read_texture_rgba8;
use super::DEPTH_FORMAT;
use crate::error::Result;

/// Color and depth attachments for one frame: the opaque pass draws into both,
/// capture tests against the depth, and resolve blends onto the color.
pub struct FrameTargets {
    width: u32,
    height: u32,
    pub color: wgpu::Texture,
    pub color_view: wgpu::TextureView,
    pub depth: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
}

impl FrameTargets {
    /// `color_format` must be a four-byte RGBA format for [`read_color`](Self::read_color).
    pub fn new(device: &wgpu::Device, width: u32, height: u32, color_format: wgpu::TextureFormat) -> Self {
        let attachment = |label: &str, format, usage| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            })
        };
        let color = attachment(
            "oit-frame-color",
            color_format,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        );
        let depth = attachment("oit-frame-depth", DEPTH_FORMAT, wgpu::TextureUsages::RENDER_ATTACHMENT);
        Self {
            width,
            height,
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
            depth,
        }
    }

    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }

    /// Opaque pass: clears color to `background` and depth to the far plane.
    pub fn begin_opaque<'pass>(
        &'pass self,
        encoder: &'pass mut wgpu::CommandEncoder,
        background: wgpu::Color,
    ) -> wgpu::RenderPass<'pass> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("oit-opaque-pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(background),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }

    /// Tightly packed RGBA8 rows of the color attachment.
    pub fn read_color(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u8>> {
        read_texture_rgba8(device, queue, &self.color, self.width, self.height)
    }
}
