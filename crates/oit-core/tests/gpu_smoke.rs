//! Runs one frame through the wgpu passes and checks the device tables against
//! the CPU resolve. Skips when no adapter is available (CI without a GPU).

use anyhow::Result;
use oit_core::gpu::{CaptureVertex, DEPTH_FORMAT, FrameTargets, GpuABuffer, TableLayout, request_headless_device};
use oit_core::passes::resolve_pixel;
use oit_core::{ABufferDesc, SENTINEL};
use wgpu::util::DeviceExt;

const W: u32 = 16;
const H: u32 = 16;

/// Oversized triangle covering the whole viewport at clip depth `z`.
fn fullscreen(z: f32, color: [f32; 4]) -> [CaptureVertex; 3] {
    [[-1.0, -1.0], [3.0, -1.0], [-1.0, 3.0]].map(|[x, y]| CaptureVertex {
        clip_position: [x, y, z, 1.0],
        color,
    })
}

#[test]
fn gpu_frame_matches_cpu_resolve() -> Result<()> {
    let Some((device, queue)) = pollster::block_on(request_headless_device()) else {
        eprintln!("no wgpu adapter available; skipping");
        return Ok(());
    };
    let device = std::sync::Arc::new(device);

    let color_format = wgpu::TextureFormat::Rgba8Unorm;
    let desc = ABufferDesc::new(W, H).with_capacity(1024);
    let mut abuf = GpuABuffer::new(device.clone(), &queue, desc, color_format, DEPTH_FORMAT)?;
    let targets = FrameTargets::new(&device, W, H, color_format);

    let mut vertices = Vec::new();
    vertices.extend(fullscreen(0.75, [0.0, 0.0, 1.0, 0.5]));
    vertices.extend(fullscreen(0.25, [1.0, 0.0, 0.0, 0.5]));
    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("gpu-smoke-vertices"),
        contents: bytemuck::cast_slice(&vertices),
        usage: wgpu::BufferUsages::VERTEX,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("gpu-smoke-encoder"),
    });
    // Opaque pass: black background, empty depth.
    drop(targets.begin_opaque(&mut encoder, wgpu::Color::BLACK));
    abuf.clear(&mut encoder);
    {
        let mut pass = abuf.begin_capture(&mut encoder, &targets.depth_view);
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        pass.draw(0..vertices.len() as u32, 0..1);
    }
    abuf.resolve(&mut encoder, &targets.color_view);
    queue.submit(std::iter::once(encoder.finish()));

    let tables = abuf.read_tables(&queue)?;
    assert_eq!(tables.counter, 2 * W * H);
    assert!(tables.lengths.iter().all(|&l| l == 2));
    assert!(tables.heads.iter().all(|&h| h != SENTINEL && h < 2 * W * H));

    let pixels = targets.read_color(&device, &queue)?;
    let mut scratch = Vec::new();
    for i in [0usize, 17, (W * H - 1) as usize] {
        let cpu = resolve_pixel(tables.heads[i], tables.lengths[i], 16, tables.nodes.as_slice(), &mut scratch)
            .expect("pixel has two layers");
        let expected = cpu.over([0.0, 0.0, 0.0]);
        for c in 0..3 {
            let got = pixels[i * 4 + c] as f32 / 255.0;
            assert!((got - expected[c]).abs() <= 2.0 / 255.0, "pixel {i} channel {c}: {got} vs {}", expected[c]);
        }
    }

    // Resizing keeps the slots per pixel and parks the previous tables.
    let full = TableLayout::of(abuf.desc());
    abuf.resize(&queue, 8, 4)?;
    assert_eq!((abuf.desc().width, abuf.desc().height, abuf.desc().capacity), (8, 4, 128));
    assert_eq!(abuf.table_pool().len(), 1);
    assert_eq!(abuf.table_pool().parked_bytes(), full.total_bytes());

    // Going back picks the parked set up again rather than allocating a new one.
    abuf.resize(&queue, W, H)?;
    assert_eq!(abuf.desc().capacity, 1024);
    assert_eq!(abuf.table_pool().len(), 1);
    assert_eq!(abuf.table_pool().parked_bytes(), TableLayout::of(&desc.resized(8, 4)).total_bytes());

    // Same pixel count in another shape: the live set is kept.
    abuf.resize(&queue, 2 * W, H / 2)?;
    assert_eq!(abuf.desc().capacity, 1024);
    assert_eq!(abuf.table_pool().len(), 1);
    Ok(())
}
