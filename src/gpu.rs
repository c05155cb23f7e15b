//! GPU backend for the demo: opaque pass, then clear → capture → resolve on
//! the same encoder, then readback of the sRGB color target.

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info};
use oit_config::OitConfig;
use oit_core::ABufferDesc;
use oit_core::gpu::{
    CaptureVertex, DEPTH_FORMAT, FrameTargets, GpuABuffer, capture_vertex_layout, request_headless_device,
};
use wgpu::util::DeviceExt;

use crate::scene::Scene;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

fn opaque_pipeline(device: &wgpu::Device) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("demo-opaque-shader"),
        source: wgpu::ShaderSource::Wgsl(oit_shaders::OPAQUE_WGSL.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("demo-opaque-layout"),
        bind_group_layouts: &[],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("demo-opaque-pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: "vs_opaque",
            buffers: &[capture_vertex_layout()],
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: "fs_opaque",
            targets: &[Some(wgpu::ColorTargetState {
                format: COLOR_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    })
}

fn vertex_buffer(device: &wgpu::Device, label: &str, vertices: &[CaptureVertex]) -> Option<wgpu::Buffer> {
    if vertices.is_empty() {
        return None;
    }
    Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(vertices),
        usage: wgpu::BufferUsages::VERTEX,
    }))
}

/// Render the scene on the GPU and return tightly packed sRGB RGBA8 rows.
pub fn render(config: &OitConfig, desc: ABufferDesc, scene: &Scene) -> Result<Vec<u8>> {
    let (device, queue) =
        pollster::block_on(request_headless_device()).context("No suitable GPU adapters found")?;
    let device = Arc::new(device);

    let abuf = GpuABuffer::new(device.clone(), &queue, desc, COLOR_FORMAT, DEPTH_FORMAT)?;
    let opaque = opaque_pipeline(&device);
    let targets = FrameTargets::new(&device, desc.width, desc.height, COLOR_FORMAT);

    let opaque_vertices = scene.opaque_vertices();
    let transparent_vertices = scene.transparent_vertices();
    let opaque_vb = vertex_buffer(&device, "demo-opaque-vertices", &opaque_vertices);
    let transparent_vb = vertex_buffer(&device, "demo-transparent-vertices", &transparent_vertices);

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("demo-frame-encoder"),
    });
    {
        let [r, g, b] = config.demo.background;
        let background = wgpu::Color { r: r as f64, g: g as f64, b: b as f64, a: 1.0 };
        let mut pass = targets.begin_opaque(&mut encoder, background);
        if let Some(vb) = &opaque_vb {
            pass.set_pipeline(&opaque);
            pass.set_vertex_buffer(0, vb.slice(..));
            pass.draw(0..opaque_vertices.len() as u32, 0..1);
        }
    }

    abuf.clear(&mut encoder);
    {
        let mut pass = abuf.begin_capture(&mut encoder, &targets.depth_view);
        if let Some(vb) = &transparent_vb {
            pass.set_vertex_buffer(0, vb.slice(..));
            pass.draw(0..transparent_vertices.len() as u32, 0..1);
        }
    }
    abuf.resolve(&mut encoder, &targets.color_view);
    queue.submit(std::iter::once(encoder.finish()));

    if log::log_enabled!(log::Level::Debug) {
        let tables = abuf.read_tables(&queue)?;
        let deepest = tables.lengths.iter().copied().max().unwrap_or(0);
        debug!(
            "GPU capture: {} fragments requested, capacity {}, deepest pixel {}",
            tables.counter, desc.capacity, deepest
        );
    }

    let pixels = targets.read_color(&device, &queue)?;
    info!("GPU frame resolved ({}x{})", desc.width, desc.height);
    Ok(pixels)
}
