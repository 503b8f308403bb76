// src/data/atlas.rs
//! Glyph atlases: multi-channel distance field textures laid out on a grid.

use super::{surface::Surface, types::Size};
use crate::error::{RainError, Result};
use crate::math::hash::hash3;
use glam::{Vec2, Vec3};
use std::path::PathBuf;

/// Describes a font before its textures are loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct FontDescriptor {
    pub name: &'static str,
    pub source: AtlasSource,
    pub sequence_length: u32,
    /// Atlas grid as `[columns, rows]`.
    pub grid: [u32; 2],
}

#[derive(Debug, Clone, PartialEq)]
pub enum AtlasSource {
    /// MSDF image files relative to the asset directory.
    Files {
        msdf: &'static str,
        glint: Option<&'static str>,
    },
    /// Distance field generated on the host.
    Procedural,
}

const FONTS: &[FontDescriptor] = &[
    FontDescriptor {
        name: "procedural",
        source: AtlasSource::Procedural,
        sequence_length: 64,
        grid: [8, 8],
    },
    file_font("matrixcode", "matrixcode_msdf.png", None, 57, [8, 8]),
    file_font("gothic", "gothic_msdf.png", None, 27, [8, 8]),
    file_font("coptic", "coptic_msdf.png", None, 32, [8, 8]),
    file_font("huberfishA", "huberfish_a_msdf.png", None, 34, [6, 6]),
    file_font("huberfishD", "huberfish_d_msdf.png", None, 34, [6, 6]),
    file_font("gtarg_tenretniolleh", "gtarg_tenretniolleh_msdf.png", None, 36, [8, 8]),
    file_font("gtarg_alientext", "gtarg_alientext_msdf.png", None, 38, [8, 5]),
    file_font("neomatrixology", "neomatrixology_msdf.png", None, 12, [4, 4]),
    file_font(
        "resurrections",
        "resurrections_msdf.png",
        Some("resurrections_glint_msdf.png"),
        135,
        [13, 12],
    ),
];

const fn file_font(
    name: &'static str,
    msdf: &'static str,
    glint: Option<&'static str>,
    sequence_length: u32,
    grid: [u32; 2],
) -> FontDescriptor {
    FontDescriptor {
        name,
        source: AtlasSource::Files { msdf, glint },
        sequence_length,
        grid,
    }
}

impl FontDescriptor {
    pub fn lookup(name: &str) -> Option<&'static FontDescriptor> {
        FONTS.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        FONTS.iter().map(|f| f.name)
    }

    pub fn msdf_path(&self, asset_dir: &std::path::Path) -> Option<PathBuf> {
        match self.source {
            AtlasSource::Files { msdf, .. } => Some(asset_dir.join(msdf)),
            AtlasSource::Procedural => None,
        }
    }

    pub fn glint_path(&self, asset_dir: &std::path::Path) -> Option<PathBuf> {
        match self.source {
            AtlasSource::Files { glint, .. } => glint.map(|g| asset_dir.join(g)),
            AtlasSource::Procedural => None,
        }
    }
}

/// A loaded glyph atlas. Immutable once built and shared read-only.
#[derive(Debug, Clone)]
pub struct GlyphAtlas {
    sequence_length: u32,
    grid: [u32; 2],
    msdf: Surface<Vec3>,
    glint: Option<Surface<Vec3>>,
}

impl GlyphAtlas {
    pub fn new(
        sequence_length: u32,
        grid: [u32; 2],
        msdf: Surface<Vec3>,
        glint: Option<Surface<Vec3>>,
    ) -> Result<Self> {
        let capacity = grid[0] as u64 * grid[1] as u64;
        if grid[0] == 0 || grid[1] == 0 {
            return Err(RainError::config("glyphTextureGridSize", "grid must be non-empty"));
        }
        if sequence_length == 0 || sequence_length as u64 > capacity {
            return Err(RainError::config(
                "glyphSequenceLength",
                format!("{sequence_length} glyphs do not fit a {}x{} atlas", grid[0], grid[1]),
            ));
        }
        if msdf.size().is_empty() {
            return Err(RainError::Load("empty MSDF texture".into()));
        }
        Ok(Self {
            sequence_length,
            grid,
            msdf,
            glint,
        })
    }

    /// A 1x1 atlas that draws nothing. Stands in while the real atlas loads.
    pub fn placeholder(font: &FontDescriptor) -> Self {
        Self {
            sequence_length: font.sequence_length.max(1),
            grid: [font.grid[0].max(1), font.grid[1].max(1)],
            msdf: Surface::filled(Size::new(1, 1), Vec3::ZERO),
            glint: None,
        }
    }

    pub fn sequence_length(&self) -> u32 {
        self.sequence_length
    }

    pub fn grid(&self) -> [u32; 2] {
        self.grid
    }

    pub fn has_glint(&self) -> bool {
        self.glint.is_some()
    }

    pub fn msdf(&self) -> &Surface<Vec3> {
        &self.msdf
    }

    pub fn glint(&self) -> Option<&Surface<Vec3>> {
        self.glint.as_ref()
    }

    /// Maps a glyph index and a glyph-local coordinate to a continuous texel
    /// position in the atlas.
    ///
    /// `local` is in `[0, 1]^2` with y pointing up; atlas row 0 is the top row.
    pub fn texel_position(&self, texture: &Surface<Vec3>, symbol: u32, local: Vec2) -> Vec2 {
        let symbol = symbol % self.sequence_length;
        let col = (symbol % self.grid[0]) as f32;
        let row = (symbol / self.grid[0]) as f32;
        let cell = Vec2::new(
            texture.width() as f32 / self.grid[0] as f32,
            texture.height() as f32 / self.grid[1] as f32,
        );
        let uv = Vec2::new(col + local.x, row + (1.0 - local.y));
        uv * cell - 0.5
    }

    /// Builds a distance field atlas of blocky 5x7 glyphs.
    ///
    /// Glyph shapes come from the coordinate hash so the atlas is identical on
    /// every run. `cell_px` is the edge length of one glyph cell in texels.
    pub fn procedural(font: &FontDescriptor, cell_px: u32) -> Result<Self> {
        let [cols, rows] = font.grid;
        let size = Size::new(cols * cell_px, rows * cell_px);
        let mut msdf = Surface::filled(size, Vec3::ZERO);
        let bitmaps: Vec<u64> = (0..cols * rows).map(glyph_bitmap).collect();
        let cell = cell_px as f32;
        msdf.par_for_each_mut(|x, y, texel| {
            let (gc, gr) = (x / cell_px, y / cell_px);
            let bits = bitmaps[(gr * cols + gc) as usize];
            let local = Vec2::new((x % cell_px) as f32 + 0.5, (y % cell_px) as f32 + 0.5) / cell;
            let d = bitmap_distance(bits, local) * cell;
            *texel = Vec3::splat((0.5 + d / (2.0 * PROCEDURAL_RANGE_PX)).clamp(0.0, 1.0));
        });
        Self::new(font.sequence_length, font.grid, msdf, None)
    }
}

const GLYPH_COLS: u32 = 5;
const GLYPH_ROWS: u32 = 7;
/// Distance in texels mapped to the full `[0, 1]` range of the field.
const PROCEDURAL_RANGE_PX: f32 = 4.0;
/// Fraction of the cell left empty on every side.
const GLYPH_MARGIN: f32 = 0.15;

/// Bit `r * 5 + c` set means the pixel at column `c`, row `r` (top-down) is ink.
fn glyph_bitmap(index: u32) -> u64 {
    let lo = hash3(index, 0, 0x6d73_6466) as u64;
    let hi = hash3(index, 1, 0x6d73_6466) as u64;
    let mut bits = (lo | (hi << 32)) & ((1u64 << (GLYPH_COLS * GLYPH_ROWS)) - 1);
    // Keep glyphs legible: a spine in the middle column and no near-empty cells.
    if bits.count_ones() < 12 {
        for r in 0..GLYPH_ROWS {
            bits |= 1 << (r * GLYPH_COLS + GLYPH_COLS / 2);
        }
    }
    bits
}

/// Signed distance (in cell units) from `p` to the ink outline; positive inside.
fn bitmap_distance(bits: u64, p: Vec2) -> f32 {
    let inner = 1.0 - 2.0 * GLYPH_MARGIN;
    let pixel = Vec2::new(inner / GLYPH_COLS as f32, inner / GLYPH_ROWS as f32);
    let q = (p - GLYPH_MARGIN) / pixel;
    let inside = q.x >= 0.0
        && q.y >= 0.0
        && (q.x as u32) < GLYPH_COLS
        && (q.y as u32) < GLYPH_ROWS
        && bits & (1 << ((q.y as u32) * GLYPH_COLS + q.x as u32)) != 0;

    let mut nearest = f32::MAX;
    for r in 0..GLYPH_ROWS {
        for c in 0..GLYPH_COLS {
            let ink = bits & (1 << (r * GLYPH_COLS + c)) != 0;
            if ink == inside {
                continue;
            }
            let min = Vec2::new(GLYPH_MARGIN, GLYPH_MARGIN) + pixel * Vec2::new(c as f32, r as f32);
            let max = min + pixel;
            let d = (min - p).max(p - max).max(Vec2::ZERO).length();
            nearest = nearest.min(d);
        }
    }
    if inside {
        // The glyph box edge also bounds the ink.
        let lo = p - GLYPH_MARGIN;
        let hi = Vec2::splat(1.0 - GLYPH_MARGIN) - p;
        nearest = nearest.min(lo.min_element()).min(hi.min_element());
        nearest
    } else {
        -nearest.min(1.0)
    }
}
