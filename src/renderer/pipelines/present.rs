// src/renderer/pipelines/present.rs
//! Draws the composited frame to the swapchain, scaled to fit.

use super::base::{fsq_vertex_buffer, impl_post_pass, COMMON_WGSL, FSQ_LAYOUT};

pub struct PresentPass {
    pub pipeline: wgpu::RenderPipeline,
    pub bind_group: wgpu::BindGroup,
    pub bgl: wgpu::BindGroupLayout,
    pub fsq_vb: wgpu::Buffer,
}

impl_post_pass!(PresentPass);

impl PresentPass {
    pub fn new(device: &wgpu::Device, dst_format: wgpu::TextureFormat, input: &wgpu::TextureView) -> Self {
        let bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Present BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        // Float state images are not filterable; the shader
                        // interpolates with `textureLoad`.
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    },
                    count: None,
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Present WGSL"),
            source: wgpu::ShaderSource::Wgsl(
                format!("{COMMON_WGSL}\n{}", include_str!("../../../shaders/present.wgsl")).into(),
            ),
        });

        let pl = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Present PL"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Present Pipeline"),
            layout: Some(&pl),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[FSQ_LAYOUT],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: dst_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let bind_group = Self::make_bind_group(device, &bgl, input);
        Self {
            pipeline,
            bind_group,
            bgl,
            fsq_vb: fsq_vertex_buffer(device),
        }
    }

    /// Points the blit at another texture.
    pub fn set_input(&mut self, device: &wgpu::Device, input: &wgpu::TextureView) {
        self.bind_group = Self::make_bind_group(device, &self.bgl, input);
    }

    fn make_bind_group(device: &wgpu::Device, bgl: &wgpu::BindGroupLayout, input: &wgpu::TextureView) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Present BG"),
            layout: bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(input),
            }],
        })
    }
}
