// src/lib.rs
//! Real-time "digital rain" renderer.
//!
//! A fixed chain of passes simulates falling raindrops and cycling symbols
//! per grid cell, rasterizes glyphs from a distance-field atlas, blooms the
//! result and composites it to colour. The passes run as WGSL fragment
//! shaders over ping-pong textures; each also has a data-parallel host kernel
//! that serves as the reference and as the `--cpu` fallback.

pub mod app;
pub mod config;
pub mod data;
pub mod error;
pub mod math;
pub mod pipeline;
pub mod renderer;
