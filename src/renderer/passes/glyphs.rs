// src/renderer/passes/glyphs.rs
//! Glyph rasterization on the GPU, anti-aliased with `fwidth`.

use crate::config::Config;
use crate::data::{GlyphAtlas, Size, Surface};
use crate::error::{RainError, Result};
use crate::pipeline::glyphs::{AtlasLoader, BrightnessCurves, GlyphLayout, GLYPHS};
use crate::pipeline::{Frame, Output, Pass, Upstream, RAINDROPS, SYMBOLS};
use crate::renderer::gpu::{Gpu, GpuImage, STATE_FORMAT};
use crate::renderer::pipelines::base::{linear_sampler, ShaderPass, Slot};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use std::sync::Arc;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct UboGlyphs {
    grid: [u32; 2],
    atlas_grid: [u32; 2],
    pixels: [f32; 2],
    rotation: [f32; 2],
    edge_crop: f32,
    vertical_spacing: f32,
    base_brightness: f32,
    base_contrast: f32,
    glint_brightness: f32,
    glint_contrast: f32,
    sequence_length: u32,
    flip: u32,
    isolate_cursor: u32,
    has_glint: u32,
    _pad: [u32; 2],
}

/// The current atlas as textures.
struct AtlasTextures {
    source: Arc<GlyphAtlas>,
    msdf: GpuImage,
    /// A 1x1 stand-in when the font has no glint map.
    glint: GpuImage,
}

impl AtlasTextures {
    fn upload(gpu: &Gpu, atlas: &Arc<GlyphAtlas>) -> Self {
        let msdf = GpuImage::from_surface(gpu, atlas.msdf(), "Glyph MSDF");
        let glint = match atlas.glint() {
            Some(glint) => GpuImage::from_surface(gpu, glint, "Glint MSDF"),
            None => GpuImage::from_surface(gpu, &Surface::filled(Size::new(1, 1), Vec3::ZERO), "Glint MSDF"),
        };
        Self {
            source: atlas.clone(),
            msdf,
            glint,
        }
    }
}

pub struct GpuGlyphPass {
    gpu: Arc<Gpu>,
    atlas: AtlasLoader,
    textures: Option<AtlasTextures>,
    layout: GlyphLayout,
    curves: BrightnessCurves,
    kernel: ShaderPass<UboGlyphs>,
    sampler: wgpu::Sampler,
    image: GpuImage,
}

impl GpuGlyphPass {
    pub fn new(gpu: Arc<Gpu>, cfg: &Config) -> Result<Self> {
        Ok(Self::with_loader(gpu, cfg, AtlasLoader::spawn(cfg)?))
    }

    pub fn with_atlas(gpu: Arc<Gpu>, cfg: &Config, atlas: Arc<GlyphAtlas>) -> Self {
        Self::with_loader(gpu, cfg, AtlasLoader::loaded(atlas))
    }

    fn with_loader(gpu: Arc<Gpu>, cfg: &Config, atlas: AtlasLoader) -> Self {
        let kernel = ShaderPass::new(
            &gpu.device,
            "Glyphs",
            include_str!("../../../shaders/glyphs.wgsl"),
            &[
                Slot::Texture,
                Slot::Texture,
                Slot::FilteredTexture,
                Slot::FilteredTexture,
                Slot::Sampler,
            ],
            STATE_FORMAT,
        );
        let sampler = linear_sampler(&gpu.device, "Atlas Sampler");
        let image = GpuImage::new(&gpu, Size::default(), STATE_FORMAT, "Glyph Image");
        Self {
            gpu,
            atlas,
            textures: None,
            layout: GlyphLayout::from_config(cfg),
            curves: BrightnessCurves::from_config(cfg),
            kernel,
            sampler,
            image,
        }
    }

    /// Uploads the atlas again whenever the loader swapped it.
    fn sync_textures(&mut self) {
        let atlas = self.atlas.current();
        let stale = self
            .textures
            .as_ref()
            .map_or(true, |t| !Arc::ptr_eq(&t.source, atlas));
        if stale {
            log::debug!("uploading glyph atlas ({} glyphs)", atlas.sequence_length());
            self.textures = Some(AtlasTextures::upload(&self.gpu, atlas));
        }
    }
}

impl Pass for GpuGlyphPass {
    fn name(&self) -> &'static str {
        "glyphs"
    }

    fn set_size(&mut self, size: Size) {
        if size == self.image.size() {
            return;
        }
        self.image = GpuImage::new(&self.gpu, size, STATE_FORMAT, "Glyph Image");
    }

    fn execute(&mut self, _frame: &Frame<'_>, upstream: &Upstream<'_>, should_render: bool) -> Result<()> {
        self.atlas.refresh();
        let size = self.image.size();
        if !should_render || size.is_empty() {
            return Ok(());
        }
        let raindrops = upstream.texture(RAINDROPS)?;
        let symbols = upstream.texture(SYMBOLS)?;
        let grid = raindrops.size();
        if grid != symbols.size() || grid.is_empty() {
            return Err(RainError::BufferMismatch {
                front: (grid.width, grid.height),
                back: (symbols.size().width, symbols.size().height),
            });
        }

        let atlas = self.atlas.current().clone();
        let (layout, curves) = (self.layout, self.curves);
        let params = UboGlyphs {
            grid: [grid.width, grid.height],
            atlas_grid: atlas.grid(),
            pixels: [size.width as f32, size.height as f32],
            rotation: layout.rotation.to_array(),
            edge_crop: layout.edge_crop,
            vertical_spacing: layout.vertical_spacing,
            base_brightness: curves.base_brightness,
            base_contrast: curves.base_contrast,
            glint_brightness: curves.glint_brightness,
            glint_contrast: curves.glint_contrast,
            sequence_length: atlas.sequence_length().max(1),
            flip: layout.flip as u32,
            isolate_cursor: curves.isolate_cursor as u32,
            has_glint: atlas.has_glint() as u32,
            _pad: [0; 2],
        };

        self.sync_textures();
        let Some(textures) = &self.textures else {
            return Ok(());
        };
        let mut encoder = self.gpu.encoder("Glyph Encoder");
        self.kernel.draw(
            &self.gpu,
            &mut encoder,
            self.image.view(),
            &[
                wgpu::BindingResource::TextureView(raindrops.view()),
                wgpu::BindingResource::TextureView(symbols.view()),
                wgpu::BindingResource::TextureView(textures.msdf.view()),
                wgpu::BindingResource::TextureView(textures.glint.view()),
                wgpu::BindingResource::Sampler(&self.sampler),
            ],
            &params,
        );
        self.gpu.submit(encoder);
        Ok(())
    }

    fn output(&self, name: &str) -> Option<Output<'_>> {
        (name == GLYPHS).then_some(Output::Texture(&self.image))
    }

    fn reads(&self) -> Option<&'static [&'static str]> {
        Some(&[RAINDROPS, SYMBOLS])
    }
}
