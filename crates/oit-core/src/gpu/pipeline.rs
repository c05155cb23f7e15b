use oit_shaders::{CaptureVertex, FrameParams};

use crate::{ABufferDesc, DepthKeyMode, EmptyPixelPolicy};

/// Blend for the resolve output: `dst = src.rgb + dst.rgb * src.a`, where the
/// shader's alpha is transmittance. Destination alpha is kept.
pub const RESOLVE_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::SrcAlpha,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::Zero,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

const CAPTURE_VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x4, 1 => Float32x4];

/// Vertex buffer layout for [`CaptureVertex`]: clip position then straight RGBA.
pub fn capture_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<CaptureVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &CAPTURE_VERTEX_ATTRIBUTES,
    }
}

/// The three OIT pipelines and their shared bind group layout.
pub struct OitPipelines {
    pub bgl: wgpu::BindGroupLayout,
    pub clear: wgpu::ComputePipeline,
    pub capture: wgpu::RenderPipeline,
    pub resolve: wgpu::RenderPipeline,
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl OitPipelines {
    pub fn new(
        device: &wgpu::Device,
        desc: &ABufferDesc,
        target_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Self {
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("oit-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: std::num::NonZeroU64::new(
                            std::mem::size_of::<FrameParams>() as u64,
                        ),
                    },
                    count: None,
                },
                storage_entry(1),
                storage_entry(2),
                storage_entry(3),
                storage_entry(4),
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("oit-pipeline-layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let clear_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("oit-clear-shader"),
            source: wgpu::ShaderSource::Wgsl(oit_shaders::clear_wgsl().into()),
        });
        let clear = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("oit-clear-pipeline"),
            layout: Some(&layout),
            module: &clear_shader,
            entry_point: "cs_clear",
        });

        let capture_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("oit-capture-shader"),
            source: wgpu::ShaderSource::Wgsl(
                oit_shaders::capture_wgsl(desc.depth_key == DepthKeyMode::Sortable).into(),
            ),
        });
        let capture = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("oit-capture-pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &capture_shader,
                entry_point: "vs_capture",
                buffers: &[capture_vertex_layout()],
            },
            // No color targets: everything goes through the storage buffers.
            fragment: Some(wgpu::FragmentState {
                module: &capture_shader,
                entry_point: "fs_capture",
                targets: &[],
            }),
            primitive: wgpu::PrimitiveState::default(),
            // Early test against opaque depth; transparent surfaces never write it.
            depth_stencil: Some(wgpu::DepthStencilState {
                format: depth_format,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let resolve_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("oit-resolve-shader"),
            source: wgpu::ShaderSource::Wgsl(
                oit_shaders::resolve_wgsl(
                    desc.max_fragments,
                    desc.empty_pixel == EmptyPixelPolicy::Discard,
                )
                .into(),
            ),
        });
        let resolve = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("oit-resolve-pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &resolve_shader,
                entry_point: "vs_resolve",
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &resolve_shader,
                entry_point: "fs_resolve",
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(RESOLVE_BLEND),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        Self { bgl, clear, capture, resolve }
    }
}
