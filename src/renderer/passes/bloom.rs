// src/renderer/passes/bloom.rs
//! Bloom on the GPU: high-pass, separable blur at half resolution, combine.

use crate::config::Config;
use crate::data::Size;
use crate::error::{RainError, Result};
use crate::pipeline::bloom::{gaussian_weights, half, BloomParams, BLOOM, MAX_RADIUS};
use crate::pipeline::{Frame, Output, Pass, Upstream, GLYPHS};
use crate::renderer::gpu::{Gpu, GpuImage, STATE_FORMAT};
use crate::renderer::pipelines::base::{ShaderPass, Slot};
use bytemuck::{Pod, Zeroable};
use std::sync::Arc;

const WEIGHT_VEC4S: usize = (MAX_RADIUS + 1).div_ceil(4);

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct UboHighPass {
    threshold: f32,
    _pad: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct UboBlur {
    direction: [i32; 2],
    radius: u32,
    _pad: u32,
    weights: [[f32; 4]; WEIGHT_VEC4S],
}

impl UboBlur {
    fn new(direction: [i32; 2], weights: &[f32]) -> Self {
        let mut packed = [[0.0; 4]; WEIGHT_VEC4S];
        for (i, w) in weights.iter().take(MAX_RADIUS + 1).enumerate() {
            packed[i / 4][i % 4] = *w;
        }
        Self {
            direction,
            radius: weights.len().saturating_sub(1).min(MAX_RADIUS) as u32,
            _pad: 0,
            weights: packed,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct UboCombine {
    strength: f32,
    _pad: [f32; 3],
}

/// Intermediate images, reallocated on resize.
struct Targets {
    high: GpuImage,
    scratch: GpuImage,
    blurred: GpuImage,
    out: GpuImage,
}

impl Targets {
    fn new(gpu: &Gpu, size: Size) -> Self {
        let small = half(size);
        Self {
            high: GpuImage::new(gpu, small, STATE_FORMAT, "Bloom High Pass"),
            scratch: GpuImage::new(gpu, small, STATE_FORMAT, "Bloom Scratch"),
            blurred: GpuImage::new(gpu, small, STATE_FORMAT, "Bloom Blurred"),
            out: GpuImage::new(gpu, size, STATE_FORMAT, "Bloom Out"),
        }
    }
}

pub struct GpuBloomPass {
    gpu: Arc<Gpu>,
    params: BloomParams,
    size: Size,
    high_pass: ShaderPass<UboHighPass>,
    blur_x: ShaderPass<UboBlur>,
    blur_y: ShaderPass<UboBlur>,
    combine: ShaderPass<UboCombine>,
    weights: Vec<f32>,
    targets: Targets,
}

impl GpuBloomPass {
    pub fn new(gpu: Arc<Gpu>, cfg: &Config) -> Self {
        Self::with_params(gpu, BloomParams::from_config(cfg))
    }

    pub fn with_params(gpu: Arc<Gpu>, params: BloomParams) -> Self {
        if params.is_identity() {
            log::debug!("bloom disabled; passing glyphs through");
        }
        let blur_src = include_str!("../../../shaders/bloom_blur.wgsl");
        let device = &gpu.device;
        let high_pass = ShaderPass::new(
            device,
            "Bloom High Pass",
            include_str!("../../../shaders/bloom_high_pass.wgsl"),
            &[Slot::Texture],
            STATE_FORMAT,
        );
        // One instance per axis: each owns the UBO its draw reads.
        let blur_x = ShaderPass::new(device, "Bloom Blur X", blur_src, &[Slot::Texture], STATE_FORMAT);
        let blur_y = ShaderPass::new(device, "Bloom Blur Y", blur_src, &[Slot::Texture], STATE_FORMAT);
        let combine = ShaderPass::new(
            device,
            "Bloom Combine",
            include_str!("../../../shaders/bloom_combine.wgsl"),
            &[Slot::Texture, Slot::Texture],
            STATE_FORMAT,
        );
        let targets = Targets::new(&gpu, Size::default());
        Self {
            gpu,
            params,
            size: Size::default(),
            high_pass,
            blur_x,
            blur_y,
            combine,
            weights: vec![1.0],
            targets,
        }
    }
}

impl Pass for GpuBloomPass {
    fn name(&self) -> &'static str {
        "bloom"
    }

    fn set_size(&mut self, size: Size) {
        if size == self.size {
            return;
        }
        self.size = size;
        if self.params.is_identity() {
            return;
        }
        self.targets = Targets::new(&self.gpu, size);
        self.weights = gaussian_weights(self.params.sigma(half(size).height));
    }

    fn execute(&mut self, _frame: &Frame<'_>, upstream: &Upstream<'_>, should_render: bool) -> Result<()> {
        if self.params.is_identity() || !should_render || self.size.is_empty() {
            return Ok(());
        }
        let input = upstream.texture(GLYPHS)?;
        if input.size() != self.size {
            return Err(RainError::BufferMismatch {
                front: (input.size().width, input.size().height),
                back: (self.size.width, self.size.height),
            });
        }
        let gpu = &self.gpu;
        let t = &self.targets;
        let view = wgpu::BindingResource::TextureView;
        let mut encoder = gpu.encoder("Bloom Encoder");
        self.high_pass.draw(
            gpu,
            &mut encoder,
            t.high.view(),
            &[view(input.view())],
            &UboHighPass {
                threshold: self.params.threshold,
                _pad: [0.0; 3],
            },
        );
        self.blur_x.draw(
            gpu,
            &mut encoder,
            t.scratch.view(),
            &[view(t.high.view())],
            &UboBlur::new([1, 0], &self.weights),
        );
        self.blur_y.draw(
            gpu,
            &mut encoder,
            t.blurred.view(),
            &[view(t.scratch.view())],
            &UboBlur::new([0, 1], &self.weights),
        );
        self.combine.draw(
            gpu,
            &mut encoder,
            t.out.view(),
            &[view(input.view()), view(t.blurred.view())],
            &UboCombine {
                strength: self.params.strength,
                _pad: [0.0; 3],
            },
        );
        gpu.submit(encoder);
        Ok(())
    }

    fn output(&self, name: &str) -> Option<Output<'_>> {
        if name != BLOOM {
            return None;
        }
        if self.params.is_identity() {
            Some(Output::Alias(GLYPHS))
        } else {
            Some(Output::Texture(&self.targets.out))
        }
    }

    fn reads(&self) -> Option<&'static [&'static str]> {
        Some(&[GLYPHS])
    }
}
