// src/math/mod.rs
//! Mathematical utilities for the rain pipeline.
//!
//! This module provides:
//! - Stateless coordinate hashing (per-cell randomness)
//! - NaN-safe numeric helpers and the MSDF channel median
//! - Colour space conversion

pub mod color;
pub mod hash;
pub mod robust;

pub use self::color::hsl_to_rgb;
pub use self::hash::{random_float, random_index, seed_bits};
pub use self::robust::{finite_rgb, fract, median3, saturate};
