// src/config.rs
//! Tunables for one pipeline instance.
//!
//! A `Config` is assembled once (preset, optional JSON file, CLI overrides),
//! validated, and then frozen for the lifetime of the pipeline. Changing any
//! field means restarting the pipeline.

use crate::data::{atlas::FontDescriptor, Color, Palette, PaletteStop};
use crate::error::{RainError, Result};
use anyhow::Context;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The compositor strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "camelCase")]
pub enum EffectKind {
    /// Raw glyph brightness channels, no bloom, no colour. Debug view.
    None,
    /// Single-colour ramp from the background to the brightest palette colour.
    Plain,
    /// Gradient lookup with dithering.
    Palette,
    /// Vertical colour bands from `stripeColors`.
    #[value(alias = "customStripes")]
    #[serde(alias = "customStripes")]
    Stripes,
    Pride,
    TransPride,
    /// Camera frame or click ripples blended with the rain.
    Mirror,
    /// Static image overlay.
    Image,
}

impl std::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EffectKind::None => "none",
            EffectKind::Plain => "plain",
            EffectKind::Palette => "palette",
            EffectKind::Stripes => "stripes",
            EffectKind::Pride => "pride",
            EffectKind::TransPride => "trans-pride",
            EffectKind::Mirror => "mirror",
            EffectKind::Image => "image",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    // Glyphs
    pub font: String,
    pub asset_dir: PathBuf,
    pub glyph_edge_crop: f32,
    pub glyph_height_to_width: f32,
    pub glyph_vertical_spacing: f32,
    pub glyph_flip: bool,
    /// Degrees, counter-clockwise.
    pub glyph_rotation: f32,

    // Simulation
    pub num_columns: u32,
    pub fall_speed: f32,
    pub animation_speed: f32,
    pub cycle_speed: f32,
    pub cycle_frame_skip: u32,
    pub raindrop_length: f32,
    pub brightness_decay: f32,
    pub loops: bool,
    pub volumetric: bool,

    // Brightness curves
    pub base_brightness: f32,
    pub base_contrast: f32,
    pub glint_brightness: f32,
    pub glint_contrast: f32,
    pub isolate_cursor: bool,

    // Bloom
    pub bloom_size: f32,
    pub bloom_strength: f32,
    pub high_pass_threshold: f32,

    // Compositing
    pub effect: EffectKind,
    pub dither_magnitude: f32,
    pub palette: Vec<PaletteStop>,
    pub stripe_colors: Vec<Color>,
    pub background_color: Color,
    pub cursor_color: Color,
    pub cursor_intensity: f32,
    pub glint_color: Color,
    pub glint_intensity: f32,
    pub image_path: Option<PathBuf>,
    pub ripple_speed: f32,
    pub ripple_thickness: f32,

    // Output
    pub resolution: f32,
    pub fps: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            font: "procedural".into(),
            asset_dir: PathBuf::from("assets"),
            glyph_edge_crop: 0.0,
            glyph_height_to_width: 1.0,
            glyph_vertical_spacing: 1.0,
            glyph_flip: false,
            glyph_rotation: 0.0,

            num_columns: 80,
            fall_speed: 0.3,
            animation_speed: 1.0,
            cycle_speed: 0.03,
            cycle_frame_skip: 1,
            raindrop_length: 0.75,
            brightness_decay: 1.0,
            loops: false,
            volumetric: false,

            base_brightness: -0.5,
            base_contrast: 1.1,
            glint_brightness: -1.5,
            glint_contrast: 2.5,
            isolate_cursor: true,

            bloom_size: 0.4,
            bloom_strength: 0.7,
            high_pass_threshold: 0.1,

            effect: EffectKind::Palette,
            dither_magnitude: 0.05,
            palette: vec![
                PaletteStop::new(Color::hsl(0.3, 0.9, 0.0), 0.0),
                PaletteStop::new(Color::hsl(0.3, 0.9, 0.2), 0.2),
                PaletteStop::new(Color::hsl(0.3, 0.9, 0.7), 0.7),
                PaletteStop::new(Color::hsl(0.3, 0.9, 0.8), 0.8),
            ],
            stripe_colors: vec![
                Color::rgb(0.0, 0.4, 1.0),
                Color::rgb(1.0, 0.4, 0.6),
                Color::rgb(1.0, 1.0, 1.0),
            ],
            background_color: Color::BLACK,
            cursor_color: Color::hsl(0.242, 1.0, 0.73),
            cursor_intensity: 2.0,
            glint_color: Color::WHITE,
            glint_intensity: 1.0,
            image_path: None,
            ripple_speed: 0.2,
            ripple_thickness: 0.2,

            resolution: 0.75,
            fps: 60.0,
        }
    }
}

const PRESETS: &[&str] = &["classic", "operator", "nightmare", "paradise", "resurrections", "3d"];

impl Config {
    /// Names accepted by [`Config::preset`].
    pub fn preset_names() -> &'static [&'static str] {
        PRESETS
    }

    /// A named look, built on top of the defaults.
    pub fn preset(name: &str) -> Option<Self> {
        let base = Self::default();
        let cfg = match name {
            "classic" => base,
            "operator" => Self {
                cursor_color: Color::hsl(0.375, 1.0, 0.66),
                bloom_size: 0.6,
                bloom_strength: 0.75,
                high_pass_threshold: 0.0,
                cycle_speed: 0.01,
                cycle_frame_skip: 8,
                brightness_decay: 0.05,
                base_brightness: 0.0,
                base_contrast: 1.5,
                glyph_edge_crop: 0.15,
                raindrop_length: 1.5,
                palette: vec![
                    PaletteStop::new(Color::hsl(0.4, 0.8, 0.0), 0.0),
                    PaletteStop::new(Color::hsl(0.4, 0.8, 0.5), 0.5),
                    PaletteStop::new(Color::hsl(0.4, 0.8, 1.0), 1.0),
                ],
                ..base
            },
            "nightmare" => Self {
                font: "gothic".into(),
                isolate_cursor: false,
                high_pass_threshold: 0.7,
                base_brightness: -0.8,
                brightness_decay: 0.75,
                fall_speed: 1.2,
                raindrop_length: 0.5,
                num_columns: 60,
                palette: vec![
                    PaletteStop::new(Color::hsl(0.0, 1.0, 0.0), 0.0),
                    PaletteStop::new(Color::hsl(0.0, 1.0, 0.2), 0.2),
                    PaletteStop::new(Color::hsl(0.0, 1.0, 0.4), 0.4),
                    PaletteStop::new(Color::hsl(0.1, 1.0, 0.7), 0.7),
                    PaletteStop::new(Color::hsl(0.2, 1.0, 1.0), 1.0),
                ],
                ..base
            },
            "paradise" => Self {
                font: "coptic".into(),
                isolate_cursor: false,
                bloom_strength: 1.0,
                high_pass_threshold: 0.0,
                cycle_speed: 0.005,
                base_brightness: -1.3,
                base_contrast: 2.0,
                brightness_decay: 0.05,
                fall_speed: 0.02,
                raindrop_length: 0.4,
                palette: vec![
                    PaletteStop::new(Color::hsl(0.0, 0.0, 0.0), 0.0),
                    PaletteStop::new(Color::hsl(0.0, 0.8, 0.3), 0.1),
                    PaletteStop::new(Color::hsl(0.1, 0.8, 0.5), 0.5),
                    PaletteStop::new(Color::hsl(0.1, 1.0, 0.6), 0.9),
                    PaletteStop::new(Color::hsl(0.1, 1.0, 0.9), 1.0),
                ],
                ..base
            },
            "resurrections" => Self {
                font: "resurrections".into(),
                glyph_edge_crop: 0.1,
                cursor_color: Color::hsl(0.292, 1.0, 0.8),
                base_brightness: -0.7,
                base_contrast: 1.17,
                high_pass_threshold: 0.0,
                num_columns: 70,
                palette: vec![
                    PaletteStop::new(Color::hsl(0.375, 0.9, 0.0), 0.0),
                    PaletteStop::new(Color::hsl(0.375, 1.0, 0.6), 0.92),
                    PaletteStop::new(Color::hsl(0.375, 1.0, 1.0), 1.0),
                ],
                ..base
            },
            "3d" => Self {
                volumetric: true,
                fall_speed: 0.5,
                base_brightness: -0.9,
                base_contrast: 1.5,
                raindrop_length: 0.3,
                ..base
            },
            _ => return None,
        };
        Some(cfg)
    }

    /// Reads a JSON config. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        Self::default().with_json_file(path)
    }

    /// Overrides the fields present in a JSON file; the rest keep this config's values.
    pub fn with_json_file(&self, path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        self.with_json(&text)
            .with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn with_json(&self, text: &str) -> anyhow::Result<Self> {
        let overrides: serde_json::Value = serde_json::from_str(text)?;
        let serde_json::Value::Object(overrides) = overrides else {
            anyhow::bail!("a config file must hold a JSON object");
        };
        let mut merged = serde_json::to_value(self)?;
        if let serde_json::Value::Object(fields) = &mut merged {
            fields.extend(overrides);
        }
        Ok(serde_json::from_value(merged)?)
    }

    pub fn font_descriptor(&self) -> Result<&'static FontDescriptor> {
        FontDescriptor::lookup(&self.font).ok_or_else(|| {
            let known: Vec<_> = FontDescriptor::names().collect();
            RainError::config("font", format!("unknown font `{}` (known: {})", self.font, known.join(", ")))
        })
    }

    /// Checks every tunable that later stages divide by or index with.
    pub fn validate(&self) -> Result<()> {
        fn finite(field: &'static str, v: f32) -> Result<()> {
            if v.is_finite() {
                Ok(())
            } else {
                Err(RainError::config(field, format!("{v} is not a finite number")))
            }
        }
        fn positive(field: &'static str, v: f32) -> Result<()> {
            finite(field, v)?;
            if v > 0.0 {
                Ok(())
            } else {
                Err(RainError::config(field, format!("{v} must be greater than zero")))
            }
        }
        fn non_negative(field: &'static str, v: f32) -> Result<()> {
            finite(field, v)?;
            if v >= 0.0 {
                Ok(())
            } else {
                Err(RainError::config(field, format!("{v} must not be negative")))
            }
        }

        if self.num_columns == 0 {
            return Err(RainError::config("numColumns", "at least one column is required"));
        }
        if self.cycle_frame_skip == 0 {
            return Err(RainError::config("cycleFrameSkip", "must be at least 1"));
        }
        positive("raindropLength", self.raindrop_length)?;
        positive("glyphHeightToWidth", self.glyph_height_to_width)?;
        positive("glyphVerticalSpacing", self.glyph_vertical_spacing)?;
        positive("resolution", self.resolution)?;
        positive("fps", self.fps)?;
        non_negative("fallSpeed", self.fall_speed)?;
        non_negative("animationSpeed", self.animation_speed)?;
        non_negative("cycleSpeed", self.cycle_speed)?;
        non_negative("ditherMagnitude", self.dither_magnitude)?;
        non_negative("cursorIntensity", self.cursor_intensity)?;
        non_negative("glintIntensity", self.glint_intensity)?;
        non_negative("rippleSpeed", self.ripple_speed)?;
        positive("rippleThickness", self.ripple_thickness)?;
        for (field, v) in [
            ("bloomSize", self.bloom_size),
            ("bloomStrength", self.bloom_strength),
            ("highPassThreshold", self.high_pass_threshold),
            ("baseBrightness", self.base_brightness),
            ("baseContrast", self.base_contrast),
            ("glintBrightness", self.glint_brightness),
            ("glintContrast", self.glint_contrast),
            ("glyphRotation", self.glyph_rotation),
        ] {
            finite(field, v)?;
        }
        if !(0.0..1.0).contains(&self.glyph_edge_crop) {
            return Err(RainError::config("glyphEdgeCrop", "must be in [0, 1)"));
        }
        if !(self.brightness_decay > 0.0 && self.brightness_decay <= 1.0) {
            return Err(RainError::config("brightnessDecay", "must be in (0, 1]"));
        }
        for (field, c) in [
            ("backgroundColor", self.background_color),
            ("cursorColor", self.cursor_color),
            ("glintColor", self.glint_color),
        ] {
            if !c.is_finite() {
                return Err(RainError::config(field, "colour has a non-finite component"));
            }
        }
        Palette::new(&self.palette)?;
        if self.stripe_colors.is_empty() || self.stripe_colors.iter().any(|c| !c.is_finite()) {
            return Err(RainError::config("stripeColors", "need at least one finite colour"));
        }
        self.font_descriptor()?;
        self.check_effect(self.effect)
    }

    /// Checks that `effect` has everything it needs in this config.
    pub fn check_effect(&self, effect: EffectKind) -> Result<()> {
        if effect == EffectKind::Image && self.image_path.is_none() {
            return Err(RainError::config("imagePath", "the image effect needs an image"));
        }
        Ok(())
    }
}
