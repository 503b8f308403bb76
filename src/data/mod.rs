// src/data/mod.rs
//! Data containers for the rain pipeline.
//!
//! This module provides:
//! - Owned 2D surfaces and the ping-pong double buffer
//! - Per-cell simulation state types
//! - Glyph atlases, palettes and background asset loading

pub mod assets;
pub mod atlas;
pub mod double_buffer;
pub mod palette;
pub mod surface;
pub mod types;

// Re-export commonly used types
pub use atlas::{FontDescriptor, GlyphAtlas};
pub use double_buffer::DoubleBuffer;
pub use palette::{Color, Palette, PaletteStop};
pub use surface::{BufferId, Surface};
pub use types::{RaindropCell, Size, SymbolCell};
