// src/data/types.rs
//! Core data types shared by every stage of the pipeline.

use serde::{Deserialize, Serialize};

/// A 2D extent, either in pixels or in grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Height over width. Zero-width sizes report 1.
    pub fn aspect(&self) -> f32 {
        if self.width == 0 {
            1.0
        } else {
            self.height as f32 / self.width as f32
        }
    }

    /// Scales both axes and keeps at least one pixel on each.
    pub fn scaled(&self, factor: f32) -> Self {
        let scale = |v: u32| ((v as f32 * factor).round() as u32).max(1);
        Self::new(scale(self.width), scale(self.height))
    }

    /// The glyph grid for a viewport of this pixel size.
    ///
    /// The column count is fixed by configuration; the row count follows the
    /// viewport aspect ratio divided by the glyph height-to-width ratio.
    pub fn grid_for_viewport(&self, num_columns: u32, glyph_height_to_width: f32) -> Self {
        let rows = (num_columns as f32 * self.aspect() / glyph_height_to_width).round();
        Self::new(num_columns.max(1), (rows as u32).max(1))
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Per-cell raindrop state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RaindropCell {
    /// Sawtooth position in `[0, 1)`; 0 is the drop head, rising along the tail.
    pub phase: f32,
    /// Unbounded brightness; negative values mean "darker than the base level".
    pub brightness: f32,
    /// Closeness to the drop head in `[0, 1]`, 1 at the head cell.
    pub cursor: f32,
    /// Set on the tick the phase wrapped (a new drop head arrived).
    pub reset: bool,
}

/// Per-cell glyph state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SymbolCell {
    /// Index into the glyph sequence.
    pub symbol: u32,
    /// Fraction of the way to the next symbol swap, `[0, 1)`.
    pub age: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_follows_aspect() {
        let grid = Size::new(800, 600).grid_for_viewport(80, 1.0);
        assert_eq!(grid, Size::new(80, 60));
        let grid = Size::new(1600, 1200).grid_for_viewport(80, 1.0);
        assert_eq!(grid, Size::new(80, 60));
        let grid = Size::new(600, 800).grid_for_viewport(60, 2.0);
        assert_eq!(grid, Size::new(60, 40));
    }

    #[test]
    fn test_grid_never_empty() {
        assert_eq!(Size::new(1000, 1).grid_for_viewport(10, 1.0), Size::new(10, 1));
        assert_eq!(Size::new(0, 0).grid_for_viewport(0, 1.0), Size::new(1, 1));
    }

    #[test]
    fn test_scaled_keeps_a_pixel() {
        assert_eq!(Size::new(800, 600).scaled(0.5), Size::new(400, 300));
        assert_eq!(Size::new(1, 1).scaled(0.1), Size::new(1, 1));
    }
}
