// src/data/palette.rs
//! Colour values and the brightness-to-colour gradient.

use crate::error::{RainError, Result};
use crate::math::hsl_to_rgb;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A colour as written in configuration files.
///
/// Serialized as `{ "space": "hsl", "values": [h, s, l] }` or
/// `{ "space": "rgb", "values": [r, g, b] }`, all components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "space", content = "values", rename_all = "lowercase")]
pub enum Color {
    Rgb([f32; 3]),
    Hsl([f32; 3]),
}

impl Color {
    pub const BLACK: Color = Color::Rgb([0.0, 0.0, 0.0]);
    pub const WHITE: Color = Color::Rgb([1.0, 1.0, 1.0]);

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Color::Rgb([r, g, b])
    }

    pub fn hsl(h: f32, s: f32, l: f32) -> Self {
        Color::Hsl([h, s, l])
    }

    pub fn to_rgb(self) -> Vec3 {
        match self {
            Color::Rgb(v) => Vec3::from_array(v),
            Color::Hsl([h, s, l]) => hsl_to_rgb(h, s, l),
        }
    }

    pub fn is_finite(&self) -> bool {
        match self {
            Color::Rgb(v) | Color::Hsl(v) => v.iter().all(|c| c.is_finite()),
        }
    }
}

/// One gradient stop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaletteStop {
    pub color: Color,
    pub at: f32,
}

impl PaletteStop {
    pub fn new(color: Color, at: f32) -> Self {
        Self { color, at }
    }
}

/// A validated gradient: stops sorted by strictly increasing `at` in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct Palette {
    stops: Vec<(f32, Vec3)>,
}

impl Palette {
    pub fn new(stops: &[PaletteStop]) -> Result<Self> {
        if stops.is_empty() {
            return Err(RainError::Palette("no stops".into()));
        }
        let mut prev: Option<f32> = None;
        for (i, stop) in stops.iter().enumerate() {
            if !stop.at.is_finite() || !(0.0..=1.0).contains(&stop.at) {
                return Err(RainError::Palette(format!(
                    "stop {i} has position {} outside [0, 1]",
                    stop.at
                )));
            }
            if !stop.color.is_finite() {
                return Err(RainError::Palette(format!("stop {i} has a non-finite colour")));
            }
            if let Some(p) = prev {
                if stop.at <= p {
                    return Err(RainError::Palette(format!(
                        "stop {i} at {} does not follow previous stop at {p}",
                        stop.at
                    )));
                }
            }
            prev = Some(stop.at);
        }
        Ok(Self {
            stops: stops.iter().map(|s| (s.at, s.color.to_rgb())).collect(),
        })
    }

    /// Two-stop ramp from `from` at 0 to `to` at 1.
    pub fn ramp(from: Vec3, to: Vec3) -> Self {
        Self {
            stops: vec![(0.0, from), (1.0, to)],
        }
    }

    /// Piecewise-linear lookup, clamped to the first and last stop colours.
    ///
    /// Sampling exactly at a stop position returns that stop's colour.
    pub fn sample(&self, t: f32) -> Vec3 {
        let t = if t.is_nan() { 0.0 } else { t };
        let (first_at, first) = self.stops[0];
        if t <= first_at {
            return first;
        }
        for pair in self.stops.windows(2) {
            let (a_at, a) = pair[0];
            let (b_at, b) = pair[1];
            if t == b_at {
                return b;
            }
            if t < b_at {
                return a.lerp(b, (t - a_at) / (b_at - a_at));
            }
        }
        self.stops[self.stops.len() - 1].1
    }

    /// `(position, colour)` pairs in increasing position.
    pub fn stops(&self) -> &[(f32, Vec3)] {
        &self.stops
    }

    /// Last stop colour; the "brightest" colour of the gradient.
    pub fn peak(&self) -> Vec3 {
        self.stops[self.stops.len() - 1].1
    }
}
