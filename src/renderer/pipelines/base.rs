// src/renderer/pipelines/base.rs
//! Shared utilities for rendering pipelines.

use crate::renderer::gpu::Gpu;
use std::marker::PhantomData;
use wgpu::util::DeviceExt;

/// Helpers every rain shader is compiled with: the fullscreen vertex stage,
/// the integer hash and texel fetch helpers.
pub const COMMON_WGSL: &str = include_str!("../../../shaders/common.wgsl");

/// Creates a vertex buffer for a full-screen quad (triangle).
///
/// Uses the three-vertex trick: a single triangle that covers the entire screen.
/// Vertices at (-1,-3), (3,1), (-1,1) create a triangle that covers [-1,1]x[-1,1]
/// when clipped.
pub fn fsq_vertex_buffer(device: &wgpu::Device) -> wgpu::Buffer {
    let fsq = [[-1.0_f32, -3.0], [3.0, 1.0], [-1.0, 1.0]];

    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("FSQ Vertex Buffer"),
        contents: bytemuck::cast_slice(&fsq),
        usage: wgpu::BufferUsages::VERTEX,
    })
}

/// Vertex layout matching [`fsq_vertex_buffer`].
pub const FSQ_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &[wgpu::VertexAttribute {
        offset: 0,
        shader_location: 0,
        format: wgpu::VertexFormat::Float32x2,
    }],
};

/// Trait for full-screen passes that render to a texture view.
pub trait PostPass {
    fn draw(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView);
}

/// Implements [`PostPass`] for a struct with `pipeline`, `bind_group` and
/// `fsq_vb` fields.
macro_rules! impl_post_pass {
    ($pass_struct:ty) => {
        impl $crate::renderer::pipelines::base::PostPass for $pass_struct {
            fn draw(&self, encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView) {
                $crate::renderer::pipelines::base::execute_pass(
                    &self.pipeline,
                    encoder,
                    &self.bind_group,
                    &self.fsq_vb,
                    view,
                    stringify!($pass_struct),
                );
            }
        }
    };
}

pub(crate) use impl_post_pass;

/// Records one fullscreen draw into `dst`.
pub fn execute_pass(
    pipeline: &wgpu::RenderPipeline,
    encoder: &mut wgpu::CommandEncoder,
    bind_group: &wgpu::BindGroup,
    fs_vbo: &wgpu::Buffer,
    dst: &wgpu::TextureView,
    label: &str,
) {
    let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: dst,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });

    rpass.set_pipeline(pipeline);
    rpass.set_bind_group(0, bind_group, &[]);
    rpass.set_vertex_buffer(0, fs_vbo.slice(..));
    rpass.draw(0..3, 0..1);
}

/// What a shader expects at bindings 1, 2, ... (binding 0 is always the UBO).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Read with `textureLoad`; any float format.
    Texture,
    /// Read with `textureSample`; needs a filterable format.
    FilteredTexture,
    Sampler,
}

impl Slot {
    fn binding_type(self) -> wgpu::BindingType {
        let texture = |filterable| wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        };
        match self {
            Slot::Texture => texture(false),
            Slot::FilteredTexture => texture(true),
            Slot::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        }
    }
}

/// A fullscreen fragment shader with one uniform block of type `U`.
///
/// Each instance owns its UBO, so a pass that runs the same shader twice in
/// one submission needs two instances.
pub struct ShaderPass<U> {
    label: &'static str,
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    ubo: wgpu::Buffer,
    fs_vbo: wgpu::Buffer,
    _ubo_type: PhantomData<U>,
}

impl<U: bytemuck::Pod> ShaderPass<U> {
    /// Compiles `source` (appended to [`COMMON_WGSL`]) for an `out_fmt` target.
    pub fn new(
        device: &wgpu::Device,
        label: &'static str,
        source: &str,
        slots: &[Slot],
        out_fmt: wgpu::TextureFormat,
    ) -> Self {
        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<U>() as u64),
            },
            count: None,
        }];
        entries.extend(slots.iter().enumerate().map(|(i, slot)| wgpu::BindGroupLayoutEntry {
            binding: i as u32 + 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: slot.binding_type(),
            count: None,
        }));
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(label),
            entries: &entries,
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(format!("{COMMON_WGSL}\n{source}").into()),
        });

        let pipe_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipe_layout),
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
                    format: out_fmt,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let ubo = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<U>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            label,
            pipeline,
            layout,
            ubo,
            fs_vbo: fsq_vertex_buffer(device),
            _ubo_type: PhantomData,
        }
    }

    /// Uploads `params` and records a draw into `dst`. `inputs` fill the slots
    /// in order.
    pub fn draw(
        &self,
        gpu: &Gpu,
        encoder: &mut wgpu::CommandEncoder,
        dst: &wgpu::TextureView,
        inputs: &[wgpu::BindingResource<'_>],
        params: &U,
    ) {
        gpu.queue.write_buffer(&self.ubo, 0, bytemuck::bytes_of(params));

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: self.ubo.as_entire_binding(),
        }];
        entries.extend(inputs.iter().enumerate().map(|(i, resource)| wgpu::BindGroupEntry {
            binding: i as u32 + 1,
            resource: resource.clone(),
        }));
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.label),
            layout: &self.layout,
            entries: &entries,
        });

        execute_pass(&self.pipeline, encoder, &bind_group, &self.fs_vbo, dst, self.label);
    }
}

/// Linear clamp-to-edge sampler for uploaded atlases.
pub fn linear_sampler(device: &wgpu::Device, label: &str) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}
