use std::sync::mpsc;

use crate::error::{OitError, Result};

/// `bytes_per_row` for a texture copy, padded to wgpu's row alignment.
pub fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    let unpadded = width * bytes_per_pixel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Submit `encoder`, map `staging` and hand its bytes to `read`.
pub(crate) fn map_staging<T>(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    encoder: wgpu::CommandEncoder,
    staging: &wgpu::Buffer,
    read: impl FnOnce(&[u8]) -> T,
) -> Result<T> {
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);

    receiver
        .recv()
        .map_err(|_| OitError::Readback("map_async callback channel dropped".into()))?
        .map_err(|e| OitError::Readback(e.to_string()))?;

    let data = slice.get_mapped_range();
    let out = read(&data[..]);
    drop(data);
    staging.unmap();
    Ok(out)
}

/// Copy an RGBA8 texture back to tightly packed rows.
pub fn read_texture_rgba8(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
) -> Result<Vec<u8>> {
    let tight_bpr = width as usize * 4;
    let padded_bpr = padded_bytes_per_row(width, 4);
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("oit-readback-texture"),
        size: padded_bpr as u64 * height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("oit-readback-texture-encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_bpr),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );

    map_staging(device, queue, encoder, &staging, |data| {
        let mut tight = vec![0u8; tight_bpr * height as usize];
        // Depad rows
        for (row, dst) in tight.chunks_exact_mut(tight_bpr).enumerate() {
            let src = row * padded_bpr as usize;
            dst.copy_from_slice(&data[src..src + tight_bpr]);
        }
        tight
    })
}
