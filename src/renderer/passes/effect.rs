// src/renderer/passes/effect.rs
//! Final compositing on the GPU. One shader covers every strategy; a mode
//! word picks the branch.

use crate::config::{Config, EffectKind};
use crate::data::{BufferId, Palette, Size, Surface};
use crate::error::{RainError, Result};
use crate::math::seed_bits;
use crate::pipeline::clicks::MAX_CLICKS;
use crate::pipeline::effect::{effect_input, Overlay, Strategy, Tint, COLOR};
use crate::pipeline::{Frame, Output, Pass, Upstream};
use crate::renderer::gpu::{Gpu, GpuImage, STATE_FORMAT};
use crate::renderer::pipelines::base::{ShaderPass, Slot};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use std::{sync::Arc, task::Poll};

/// Palette stops and stripe colours that fit in the uniform block.
pub const MAX_COLORS: usize = 16;

const MODE_RAW: u32 = 0;
const MODE_GRADIENT: u32 = 1;
const MODE_STRIPES: u32 = 2;
const MODE_MIRROR: u32 = 3;
const MODE_IMAGE: u32 = 4;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct UboEffect {
    background: [f32; 4],
    cursor: [f32; 4],
    glint: [f32; 4],
    mode: u32,
    stop_count: u32,
    stripe_count: u32,
    click_count: u32,
    dither: f32,
    seed: u32,
    aspect: f32,
    has_camera: u32,
    ripple_speed: f32,
    ripple_thickness: f32,
    _pad: [f32; 2],
    stops: [[f32; 4]; MAX_COLORS],
    stripes: [[f32; 4]; MAX_COLORS],
    clicks: [[f32; 4]; MAX_CLICKS],
}

fn rgba(v: Vec3, w: f32) -> [f32; 4] {
    [v.x, v.y, v.z, w]
}

fn pack_stops(palette: &Palette) -> ([[f32; 4]; MAX_COLORS], u32) {
    let mut packed = [[0.0; 4]; MAX_COLORS];
    for (slot, (at, color)) in packed.iter_mut().zip(palette.stops()) {
        *slot = rgba(*color, *at);
    }
    (packed, palette.stops().len().min(MAX_COLORS) as u32)
}

pub struct GpuEffectPass {
    gpu: Arc<Gpu>,
    kind: EffectKind,
    tint: Tint,
    strategy: Strategy,
    kernel: ShaderPass<UboEffect>,
    out: GpuImage,
    overlay: Option<GpuImage>,
    /// Last uploaded camera frame and the host buffer it came from.
    camera: Option<(BufferId, GpuImage)>,
    /// Bound where a strategy has no overlay or camera.
    blank: GpuImage,
}

impl GpuEffectPass {
    pub fn new(gpu: Arc<Gpu>, cfg: &Config, kind: EffectKind) -> Result<Self> {
        if cfg.palette.len() > MAX_COLORS {
            return Err(RainError::Palette(format!(
                "{} stops, the GPU compositor takes at most {MAX_COLORS}",
                cfg.palette.len()
            )));
        }
        if cfg.stripe_colors.len() > MAX_COLORS {
            return Err(RainError::config(
                "stripeColors",
                format!("at most {MAX_COLORS} colours"),
            ));
        }
        let strategy = Strategy::new(cfg, kind)?;
        let kernel = ShaderPass::new(
            &gpu.device,
            "Effect",
            include_str!("../../../shaders/effect.wgsl"),
            &[Slot::Texture, Slot::Texture, Slot::Texture],
            STATE_FORMAT,
        );
        let out = GpuImage::new(&gpu, Size::default(), STATE_FORMAT, "Color Image");
        let blank = GpuImage::from_surface(&gpu, &Surface::filled(Size::new(1, 1), Vec3::ZERO), "Blank");
        Ok(Self {
            gpu,
            kind,
            tint: Tint::from_config(cfg),
            strategy,
            kernel,
            out,
            overlay: None,
            camera: None,
            blank,
        })
    }

    /// Keeps the camera texture in step with the latest host frame.
    fn sync_camera(&mut self, frame: Option<&Surface<Vec3>>) {
        let Some(frame) = frame.filter(|f| !f.size().is_empty()) else {
            self.camera = None;
            return;
        };
        let current = self.camera.as_ref().map(|(id, _)| *id);
        if current != Some(frame.id()) {
            self.camera = Some((frame.id(), GpuImage::from_surface(&self.gpu, frame, "Camera Frame")));
        }
    }

    fn params(&self, frame: &Frame<'_>) -> UboEffect {
        let size = self.out.size();
        let mut ubo = UboEffect {
            background: rgba(self.tint.background, 1.0),
            cursor: rgba(self.tint.cursor, 0.0),
            glint: rgba(self.tint.glint, 0.0),
            mode: MODE_RAW,
            stop_count: 0,
            stripe_count: 0,
            click_count: 0,
            dither: self.tint.dither,
            seed: seed_bits(frame.real_time),
            aspect: size.aspect(),
            has_camera: self.camera.is_some() as u32,
            ripple_speed: 0.0,
            ripple_thickness: 1.0,
            _pad: [0.0; 2],
            stops: [[0.0; 4]; MAX_COLORS],
            stripes: [[0.0; 4]; MAX_COLORS],
            clicks: [[0.0; 4]; MAX_CLICKS],
        };
        match &self.strategy {
            Strategy::Raw => {}
            Strategy::Gradient(palette) => {
                ubo.mode = MODE_GRADIENT;
                (ubo.stops, ubo.stop_count) = pack_stops(palette);
            }
            Strategy::Stripes { colors, .. } => {
                ubo.mode = MODE_STRIPES;
                for (slot, c) in ubo.stripes.iter_mut().zip(colors) {
                    *slot = rgba(*c, 1.0);
                }
                ubo.stripe_count = colors.len().min(MAX_COLORS) as u32;
            }
            Strategy::Mirror {
                palette,
                speed,
                thickness,
            } => {
                ubo.mode = MODE_MIRROR;
                (ubo.stops, ubo.stop_count) = pack_stops(palette);
                ubo.ripple_speed = *speed;
                ubo.ripple_thickness = *thickness;
                for (slot, click) in ubo.clicks.iter_mut().zip(frame.clicks.iter()) {
                    // Ages are taken in f64 on the host.
                    let age = (frame.real_time - click.time) as f32;
                    *slot = [click.uv.x, click.uv.y, age, 0.0];
                    ubo.click_count += 1;
                }
            }
            Strategy::Image(_) => ubo.mode = MODE_IMAGE,
        }
        ubo
    }
}

impl Pass for GpuEffectPass {
    fn name(&self) -> &'static str {
        "color"
    }

    fn poll_ready(&mut self) -> Poll<Result<()>> {
        let ready = self.strategy.poll_ready();
        if let (Poll::Ready(Ok(())), Strategy::Image(Overlay::Loaded(image))) = (&ready, &self.strategy) {
            if self.overlay.is_none() {
                self.overlay = Some(GpuImage::from_surface(&self.gpu, image, "Overlay"));
            }
        }
        ready
    }

    fn set_size(&mut self, size: Size) {
        if size == self.out.size() {
            return;
        }
        self.out = GpuImage::new(&self.gpu, size, STATE_FORMAT, "Color Image");
    }

    fn execute(&mut self, frame: &Frame<'_>, upstream: &Upstream<'_>, should_render: bool) -> Result<()> {
        let size = self.out.size();
        if !should_render || size.is_empty() {
            return Ok(());
        }
        let input = upstream.texture(effect_input(self.kind)[0])?;
        if input.size() != size {
            return Err(RainError::BufferMismatch {
                front: (input.size().width, input.size().height),
                back: (size.width, size.height),
            });
        }
        if matches!(self.strategy, Strategy::Mirror { .. }) {
            self.sync_camera(frame.camera);
        }

        let params = self.params(frame);
        let overlay = self.overlay.as_ref().unwrap_or(&self.blank);
        let camera = self.camera.as_ref().map_or(&self.blank, |(_, image)| image);
        let mut encoder = self.gpu.encoder("Effect Encoder");
        self.kernel.draw(
            &self.gpu,
            &mut encoder,
            self.out.view(),
            &[
                wgpu::BindingResource::TextureView(input.view()),
                wgpu::BindingResource::TextureView(overlay.view()),
                wgpu::BindingResource::TextureView(camera.view()),
            ],
            &params,
        );
        self.gpu.submit(encoder);
        Ok(())
    }

    fn output(&self, name: &str) -> Option<Output<'_>> {
        (name == COLOR).then_some(Output::Texture(&self.out))
    }

    fn reads(&self) -> Option<&'static [&'static str]> {
        Some(effect_input(self.kind))
    }
}
