// src/pipeline/glyphs.rs
//! Glyph rasterization: simulation state + MSDF atlas -> brightness image.
//!
//! Output channels: R = glyph body, G = cursor highlight, B = glint.
//! Values are unbounded so bloom can threshold above 1.0.

use super::pass::{Frame, Output, Pass, Upstream};
use super::{raindrop::RAINDROPS, symbols::SYMBOLS};
use crate::config::Config;
use crate::data::{
    assets::{spawn_atlas, Pending},
    GlyphAtlas, RaindropCell, Size, Surface,
};
use crate::error::{RainError, Result};
use crate::math::{finite_rgb, median3};
use glam::{Vec2, Vec3};
use std::{sync::Arc, task::Poll};

pub const GLYPHS: &str = "glyphs";

/// Where and how a glyph sits inside its grid cell.
#[derive(Debug, Clone, Copy)]
pub struct GlyphLayout {
    pub edge_crop: f32,
    pub vertical_spacing: f32,
    pub flip: bool,
    /// `(cos, sin)` of the glyph rotation.
    pub rotation: Vec2,
}

impl GlyphLayout {
    pub fn from_config(cfg: &Config) -> Self {
        let angle = cfg.glyph_rotation.to_radians();
        Self {
            edge_crop: cfg.glyph_edge_crop,
            vertical_spacing: cfg.glyph_vertical_spacing,
            flip: cfg.glyph_flip,
            rotation: Vec2::new(angle.cos(), angle.sin()),
        }
    }

    /// Maps a cell-local point (y up) to glyph space, or `None` if the point
    /// falls in the gap between glyphs.
    pub fn to_glyph(&self, local: Vec2) -> Option<Vec2> {
        let mut p = local - 0.5;
        p.y *= self.vertical_spacing;
        // Rotate the lookup by the inverse angle so the glyph turns by +angle.
        let (c, s) = (self.rotation.x, self.rotation.y);
        p = Vec2::new(c * p.x + s * p.y, -s * p.x + c * p.y);
        if self.flip {
            p.x = -p.x;
        }
        p *= 1.0 - self.edge_crop;
        let g = p + 0.5;
        (g.x >= 0.0 && g.x <= 1.0 && g.y >= 0.0 && g.y <= 1.0).then_some(g)
    }
}

/// Brightness curves applied to the simulated cell brightness.
#[derive(Debug, Clone, Copy)]
pub struct BrightnessCurves {
    pub base_brightness: f32,
    pub base_contrast: f32,
    pub glint_brightness: f32,
    pub glint_contrast: f32,
    pub isolate_cursor: bool,
}

impl BrightnessCurves {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            base_brightness: cfg.base_brightness,
            base_contrast: cfg.base_contrast,
            glint_brightness: cfg.glint_brightness,
            glint_contrast: cfg.glint_contrast,
            isolate_cursor: cfg.isolate_cursor,
        }
    }

    /// Channel values for a fully covered texel of `cell`.
    pub fn channels(&self, cell: RaindropCell, coverage: f32, glint_coverage: f32) -> Vec3 {
        let base = (cell.brightness * self.base_contrast + self.base_brightness).max(0.0);
        let cursor = cell.cursor;
        let body = base * (1.0 - cursor);
        let highlight = cursor * (1.0 + base);
        let glint = (cell.brightness * self.glint_contrast + self.glint_brightness).max(0.0);
        let (r, g) = if self.isolate_cursor {
            (body, highlight)
        } else {
            (body + highlight, 0.0)
        };
        Vec3::new(r * coverage, g * coverage, glint * glint_coverage)
    }
}

/// Anti-aliased coverage from a signed distance and its screen-space rate of change.
pub fn coverage(distance: f32, width: f32) -> f32 {
    if !distance.is_finite() {
        return 0.0;
    }
    if width.is_finite() && width > 1e-6 {
        (distance / width + 0.5).clamp(0.0, 1.0)
    } else if distance >= 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Screen-space rate of change of a distance, from its neighbours
/// `[right, left, below, above]` that lie in the same cell.
///
/// Uses the forward difference on each axis, falling back to the backward one.
pub fn edge_width(d: f32, [right, left, below, above]: [Option<f32>; 4]) -> f32 {
    let finite = |n: &f32| n.is_finite();
    let axis = |fwd: Option<f32>, back: Option<f32>| {
        fwd.filter(finite)
            .or(back.filter(finite))
            .map_or(0.0, |n| (n - d).abs())
    };
    axis(right, left) + axis(below, above)
}

enum AtlasSlot {
    Loading {
        pending: Pending<Arc<GlyphAtlas>>,
        placeholder: Arc<GlyphAtlas>,
    },
    Loaded(Arc<GlyphAtlas>),
    /// Loading failed; keep drawing the placeholder.
    Fallback(Arc<GlyphAtlas>),
}

/// The font atlas a glyph pass draws with: a placeholder until the real one
/// arrives from the loader thread.
pub struct AtlasLoader {
    font_name: &'static str,
    slot: AtlasSlot,
    warned_loading: bool,
}

impl AtlasLoader {
    /// Starts loading the configured font.
    pub fn spawn(cfg: &Config) -> Result<Self> {
        let font = cfg.font_descriptor()?;
        let placeholder = Arc::new(GlyphAtlas::placeholder(font));
        Ok(Self {
            font_name: font.name,
            slot: AtlasSlot::Loading {
                pending: spawn_atlas(font, cfg.asset_dir.clone()),
                placeholder,
            },
            warned_loading: false,
        })
    }

    pub fn loaded(atlas: Arc<GlyphAtlas>) -> Self {
        Self {
            font_name: "custom",
            slot: AtlasSlot::Loaded(atlas),
            warned_loading: false,
        }
    }

    pub fn current(&self) -> &Arc<GlyphAtlas> {
        match &self.slot {
            AtlasSlot::Loading { placeholder, .. } => placeholder,
            AtlasSlot::Loaded(a) | AtlasSlot::Fallback(a) => a,
        }
    }

    /// Whether the real atlas (not the placeholder) is in use.
    pub fn is_loaded(&self) -> bool {
        matches!(self.slot, AtlasSlot::Loaded(_))
    }

    /// Swaps in the loaded atlas once the loader is done. Never blocks.
    pub fn refresh(&mut self) {
        let AtlasSlot::Loading { pending, placeholder } = &mut self.slot else {
            return;
        };
        match pending.poll() {
            Poll::Pending => {
                if !self.warned_loading {
                    log::warn!("glyph atlas `{}` still loading; drawing placeholder", self.font_name);
                    self.warned_loading = true;
                }
            }
            Poll::Ready(Ok(atlas)) => {
                log::info!(
                    "glyph atlas `{}` loaded ({} glyphs)",
                    self.font_name,
                    atlas.sequence_length()
                );
                self.slot = AtlasSlot::Loaded(atlas);
            }
            Poll::Ready(Err(e)) => {
                log::error!("glyph atlas `{}` failed: {e}; drawing placeholder", self.font_name);
                self.slot = AtlasSlot::Fallback(placeholder.clone());
            }
        }
    }
}

pub struct GlyphPass {
    atlas: AtlasLoader,
    layout: GlyphLayout,
    curves: BrightnessCurves,
    size: Size,
    /// Per-pixel signed distances: x = glyph, y = glint.
    distance: Surface<Vec2>,
    image: Surface<Vec3>,
}

impl GlyphPass {
    /// Starts loading the configured font; draws a placeholder until it arrives.
    pub fn new(cfg: &Config) -> Result<Self> {
        Ok(Self::with_loader(cfg, AtlasLoader::spawn(cfg)?))
    }

    /// Uses an already loaded atlas.
    pub fn with_atlas(cfg: &Config, atlas: Arc<GlyphAtlas>) -> Self {
        Self::with_loader(cfg, AtlasLoader::loaded(atlas))
    }

    fn with_loader(cfg: &Config, atlas: AtlasLoader) -> Self {
        Self {
            atlas,
            layout: GlyphLayout::from_config(cfg),
            curves: BrightnessCurves::from_config(cfg),
            size: Size::default(),
            distance: Surface::new(Size::default()),
            image: Surface::new(Size::default()),
        }
    }

    pub fn atlas_loaded(&self) -> bool {
        self.atlas.is_loaded()
    }

    pub fn image(&self) -> &Surface<Vec3> {
        &self.image
    }
}

/// Pixel-to-cell mapping for one frame.
#[derive(Clone, Copy)]
struct CellMap {
    pixels: Vec2,
    grid: Size,
}

impl CellMap {
    /// Cell index (row 0 at top) and cell-local position (y up) of a pixel centre.
    fn locate(&self, x: u32, y: u32) -> ((u32, u32), Vec2) {
        let gx = (x as f32 + 0.5) / self.pixels.x * self.grid.width as f32;
        let gy = (1.0 - (y as f32 + 0.5) / self.pixels.y) * self.grid.height as f32;
        let col = (gx.floor() as u32).min(self.grid.width - 1);
        let row_up = (gy.floor().max(0.0) as u32).min(self.grid.height - 1);
        let local = Vec2::new(gx - col as f32, gy - row_up as f32);
        ((col, self.grid.height - 1 - row_up), local)
    }
}

impl Pass for GlyphPass {
    fn name(&self) -> &'static str {
        "glyphs"
    }

    fn set_size(&mut self, size: Size) {
        if size == self.size {
            return;
        }
        self.size = size;
        self.distance = Surface::new(size);
        self.image = Surface::new(size);
    }

    fn execute(&mut self, _frame: &Frame<'_>, upstream: &Upstream<'_>, should_render: bool) -> Result<()> {
        self.atlas.refresh();
        if !should_render || self.size.is_empty() {
            return Ok(());
        }
        let raindrops = upstream.raindrops(RAINDROPS)?;
        let symbols = upstream.symbols(SYMBOLS)?;
        if raindrops.size() != symbols.size() || raindrops.size().is_empty() {
            return Err(RainError::BufferMismatch {
                front: (raindrops.width(), raindrops.height()),
                back: (symbols.width(), symbols.height()),
            });
        }

        let atlas = self.atlas.current().clone();
        let layout = self.layout;
        let curves = self.curves;
        let map = CellMap {
            pixels: Vec2::new(self.size.width as f32, self.size.height as f32),
            grid: raindrops.size(),
        };

        // Signed distances per pixel.
        self.distance.par_for_each_mut(|x, y, d| {
            let ((cx, cy), local) = map.locate(x, y);
            *d = match layout.to_glyph(local) {
                Some(g) => {
                    let symbol = symbols.get(cx, cy).symbol;
                    let sample = |tex: &Surface<Vec3>| {
                        let t = tex.sample_texel(atlas.texel_position(tex, symbol, g));
                        median3(t.x, t.y, t.z) - 0.5
                    };
                    let glint = atlas.glint().map_or(f32::NEG_INFINITY, &sample);
                    Vec2::new(sample(atlas.msdf()), glint)
                }
                None => Vec2::splat(f32::NEG_INFINITY),
            };
        });

        // Coverage from the screen-space derivative, then brightness curves.
        let distance = &self.distance;
        let (w, h) = (self.size.width as i64, self.size.height as i64);
        self.image.par_for_each_mut(|x, y, out| {
            let (cell, _) = map.locate(x, y);
            let d = distance.get(x, y);
            let near = |nx: i64, ny: i64| {
                if nx < 0 || ny < 0 || nx >= w || ny >= h {
                    return None;
                }
                let (nx, ny) = (nx as u32, ny as u32);
                (map.locate(nx, ny).0 == cell).then(|| distance.get(nx, ny))
            };
            let (xi, yi) = (x as i64, y as i64);
            let around = [near(xi + 1, yi), near(xi - 1, yi), near(xi, yi + 1), near(xi, yi - 1)];
            let glyph_width = edge_width(d.x, around.map(|n| n.map(|n| n.x)));
            let glint_width = edge_width(d.y, around.map(|n| n.map(|n| n.y)));
            let rgb = curves.channels(
                raindrops.get(cell.0, cell.1),
                coverage(d.x, glyph_width),
                coverage(d.y, glint_width),
            );
            *out = finite_rgb(rgb);
        });
        Ok(())
    }

    fn output(&self, name: &str) -> Option<Output<'_>> {
        (name == GLYPHS).then_some(Output::Image(&self.image))
    }

    fn reads(&self) -> Option<&'static [&'static str]> {
        Some(&[RAINDROPS, SYMBOLS])
    }
}
