// src/pipeline/effect.rs
//! Final compositing: brightness channels -> display colour.
//!
//! Each [`EffectKind`] maps to one [`Strategy`] with its own inputs. Switching
//! effects builds a new `EffectPass`; nothing else in the pipeline changes.

use super::bloom::BLOOM;
use super::clicks::ClickRing;
use super::glyphs::GLYPHS;
use super::pass::{Frame, Output, Pass, Upstream};
use crate::config::{Config, EffectKind};
use crate::data::{assets::spawn_texture, assets::Pending, Color, Palette, Size, Surface};
use crate::error::{RainError, Result};
use crate::math::{random_float, saturate, seed_bits};
use glam::{Vec2, Vec3};
use std::{sync::Arc, task::Poll};

pub const COLOR: &str = "color";

/// How fast a ripple fades, per second.
const RIPPLE_DECAY: f32 = 1.0;
/// How far a ripple pushes the overlay lookup, in uv units at full strength.
const RIPPLE_DISPLACEMENT: f32 = 0.02;

pub fn pride_colors() -> Vec<Color> {
    vec![
        Color::rgb(0.89, 0.01, 0.01),
        Color::rgb(1.0, 0.55, 0.0),
        Color::rgb(1.0, 0.93, 0.0),
        Color::rgb(0.0, 0.5, 0.15),
        Color::rgb(0.14, 0.25, 0.56),
        Color::rgb(0.45, 0.16, 0.51),
    ]
}

pub fn trans_pride_colors() -> Vec<Color> {
    let blue = Color::rgb(0.36, 0.81, 0.98);
    let pink = Color::rgb(0.96, 0.66, 0.72);
    vec![blue, pink, Color::WHITE, pink, blue]
}

/// The channel tints shared by every colouring strategy.
#[derive(Debug, Clone, Copy)]
pub struct Tint {
    pub background: Vec3,
    /// `cursorColor * cursorIntensity`.
    pub cursor: Vec3,
    /// `glintColor * glintIntensity`.
    pub glint: Vec3,
    pub dither: f32,
}

impl Tint {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            background: cfg.background_color.to_rgb(),
            cursor: cfg.cursor_color.to_rgb() * cfg.cursor_intensity,
            glint: cfg.glint_color.to_rgb() * cfg.glint_intensity,
            dither: cfg.dither_magnitude,
        }
    }

    /// Brightness lowered by a per-pixel random amount to break up banding.
    pub fn dithered(&self, brightness: f32, x: u32, y: u32, seed: u32) -> f32 {
        brightness - random_float(x, y, seed) * self.dither
    }

    /// `background + body + cursor + glint`, each term clamped, the sum not.
    pub fn compose(&self, body: Vec3, channels: Vec3) -> Vec3 {
        self.background
            + saturate(body)
            + saturate(self.cursor * channels.y)
            + saturate(self.glint * channels.z)
    }
}

/// Per-column colours, rebuilt on resize.
fn stripe_texture(colors: &[Vec3], width: u32) -> Surface<Vec3> {
    let n = colors.len().max(1);
    let texels = (0..width)
        .map(|x| {
            let i = (x as usize * n / width.max(1) as usize).min(n - 1);
            colors.get(i).copied().unwrap_or(Vec3::ONE)
        })
        .collect();
    Surface::from_vec(Size::new(width, 1), texels).unwrap_or_else(|| Surface::new(Size::new(width, 1)))
}

/// Sum of all live ripples at `uv` and the lookup offset they cause.
///
/// `aspect` is height over width; distances are measured in widths.
pub fn ripples(clicks: &ClickRing, uv: Vec2, aspect: f32, now: f64, speed: f32, thickness: f32) -> (f32, Vec2) {
    let stretch = Vec2::new(1.0, aspect);
    clicks.iter().fold((0.0, Vec2::ZERO), |(sum, offset), click| {
        let age = (now - click.time) as f32;
        if age < 0.0 {
            return (sum, offset);
        }
        let delta = (uv - click.uv) * stretch;
        let ring = (1.0 - (delta.length() - age * speed).abs() / thickness).max(0.0);
        let strength = ring * (-age * RIPPLE_DECAY).exp();
        (
            sum + strength,
            offset + delta.normalize_or_zero() * strength * RIPPLE_DISPLACEMENT,
        )
    })
}

pub(crate) enum Overlay {
    Loading(Pending<Arc<Surface<Vec3>>>),
    Loaded(Arc<Surface<Vec3>>),
}

/// The closed set of compositing strategies.
pub(crate) enum Strategy {
    Raw,
    Gradient(Palette),
    Stripes {
        colors: Vec<Vec3>,
        texture: Surface<Vec3>,
    },
    Mirror {
        palette: Palette,
        speed: f32,
        thickness: f32,
    },
    Image(Overlay),
}

impl Strategy {
    pub(crate) fn new(cfg: &Config, kind: EffectKind) -> Result<Self> {
        cfg.check_effect(kind)?;
        let palette = || Palette::new(&cfg.palette);
        let rgb = |colors: &[Color]| colors.iter().map(|c| c.to_rgb()).collect::<Vec<_>>();
        Ok(match kind {
            EffectKind::None => Strategy::Raw,
            // The background is added by `Tint::compose`, so the ramp starts at black.
            EffectKind::Plain => Strategy::Gradient(Palette::ramp(Vec3::ZERO, palette()?.peak())),
            EffectKind::Palette => Strategy::Gradient(palette()?),
            EffectKind::Stripes | EffectKind::Pride | EffectKind::TransPride => {
                let colors = match kind {
                    EffectKind::Pride => rgb(&pride_colors()),
                    EffectKind::TransPride => rgb(&trans_pride_colors()),
                    _ => rgb(&cfg.stripe_colors),
                };
                Strategy::Stripes {
                    colors,
                    texture: Surface::new(Size::default()),
                }
            }
            EffectKind::Mirror => Strategy::Mirror {
                palette: palette()?,
                speed: cfg.ripple_speed,
                thickness: cfg.ripple_thickness,
            },
            EffectKind::Image => {
                let path = cfg
                    .image_path
                    .clone()
                    .ok_or_else(|| RainError::config("imagePath", "the image effect needs an image"))?;
                Strategy::Image(Overlay::Loading(spawn_texture(path)))
            }
        })
    }

    /// Resolves once the overlay image (if any) is decoded.
    pub(crate) fn poll_ready(&mut self) -> Poll<Result<()>> {
        let Strategy::Image(overlay) = self else {
            return Poll::Ready(Ok(()));
        };
        let Overlay::Loading(pending) = overlay else {
            return Poll::Ready(Ok(()));
        };
        match pending.poll() {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(texture)) => {
                log::info!("overlay image loaded ({}x{})", texture.width(), texture.height());
                *overlay = Overlay::Loaded(texture);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
        }
    }
}

/// The upstream image a compositor for `kind` reads.
pub fn effect_input(kind: EffectKind) -> &'static [&'static str] {
    match kind {
        EffectKind::None => &[GLYPHS],
        _ => &[BLOOM],
    }
}

pub struct EffectPass {
    kind: EffectKind,
    tint: Tint,
    strategy: Strategy,
    size: Size,
    out: Surface<Vec3>,
}

impl EffectPass {
    pub fn new(cfg: &Config, kind: EffectKind) -> Result<Self> {
        Ok(Self {
            kind,
            tint: Tint::from_config(cfg),
            strategy: Strategy::new(cfg, kind)?,
            size: Size::default(),
            out: Surface::new(Size::default()),
        })
    }

    /// An image effect with an already decoded overlay.
    pub fn with_overlay(cfg: &Config, overlay: Arc<Surface<Vec3>>) -> Self {
        Self {
            kind: EffectKind::Image,
            tint: Tint::from_config(cfg),
            strategy: Strategy::Image(Overlay::Loaded(overlay)),
            size: Size::default(),
            out: Surface::new(Size::default()),
        }
    }

    pub fn image(&self) -> &Surface<Vec3> {
        &self.out
    }
}

impl Pass for EffectPass {
    fn name(&self) -> &'static str {
        "color"
    }

    fn poll_ready(&mut self) -> Poll<Result<()>> {
        self.strategy.poll_ready()
    }

    fn set_size(&mut self, size: Size) {
        if size == self.size {
            return;
        }
        self.size = size;
        self.out = Surface::new(size);
        if let Strategy::Stripes { colors, texture } = &mut self.strategy {
            *texture = stripe_texture(colors, size.width);
        }
    }

    fn execute(&mut self, frame: &Frame<'_>, upstream: &Upstream<'_>, should_render: bool) -> Result<()> {
        if !should_render || self.size.is_empty() {
            return Ok(());
        }
        let input = upstream.image(effect_input(self.kind)[0])?;
        if input.size() != self.size {
            return Err(RainError::BufferMismatch {
                front: (input.width(), input.height()),
                back: (self.size.width, self.size.height),
            });
        }

        let tint = self.tint;
        let seed = seed_bits(frame.real_time);
        let inv = Vec2::new(1.0 / self.size.width as f32, 1.0 / self.size.height as f32);
        let aspect = self.size.aspect();
        let out = &mut self.out;
        match &self.strategy {
            Strategy::Raw => out.data_mut().copy_from_slice(input.data()),
            Strategy::Gradient(palette) => out.par_for_each_mut(|x, y, texel| {
                let c = input.get(x, y);
                let body = palette.sample(tint.dithered(c.x, x, y, seed));
                *texel = tint.compose(body, c);
            }),
            Strategy::Stripes { texture, .. } => out.par_for_each_mut(|x, y, texel| {
                let c = input.get(x, y);
                let b = tint.dithered(c.x, x, y, seed).clamp(0.0, 1.0);
                *texel = tint.compose(texture.get(x, 0) * b, c);
            }),
            Strategy::Mirror {
                palette,
                speed,
                thickness,
            } => {
                let (clicks, camera, now) = (frame.clicks, frame.camera, frame.real_time);
                out.par_for_each_mut(|x, y, texel| {
                    let c = input.get(x, y);
                    let uv = (Vec2::new(x as f32, y as f32) + 0.5) * inv;
                    let (ripple, offset) = ripples(clicks, uv, aspect, now, *speed, *thickness);
                    let b = tint.dithered(c.x, x, y, seed);
                    let body = match camera {
                        Some(cam) => cam.sample(uv + offset) * b.clamp(0.0, 1.0),
                        None => palette.sample(b * (1.0 + ripple)),
                    };
                    *texel = tint.compose(body, c);
                });
            }
            Strategy::Image(Overlay::Loaded(image)) => out.par_for_each_mut(|x, y, texel| {
                let c = input.get(x, y);
                let uv = (Vec2::new(x as f32, y as f32) + 0.5) * inv;
                let b = tint.dithered(c.x, x, y, seed).clamp(0.0, 1.0);
                *texel = tint.compose(image.sample(uv) * b, c);
            }),
            // Not executed before the ready gate opens.
            Strategy::Image(Overlay::Loading(_)) => {}
        }
        Ok(())
    }

    fn output(&self, name: &str) -> Option<Output<'_>> {
        (name == COLOR).then_some(Output::Image(&self.out))
    }

    fn reads(&self) -> Option<&'static [&'static str]> {
        Some(effect_input(self.kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PaletteStop;
    use crate::pipeline::clicks::Click;

    struct Source(&'static str, Surface<Vec3>);

    impl Pass for Source {
        fn name(&self) -> &'static str {
            self.0
        }
        fn set_size(&mut self, _size: Size) {}
        fn execute(&mut self, _: &Frame<'_>, _: &Upstream<'_>, _: bool) -> Result<()> {
            Ok(())
        }
        fn output(&self, name: &str) -> Option<Output<'_>> {
            (name == self.0).then_some(Output::Image(&self.1))
        }
    }

    fn composite(cfg: &Config, kind: EffectKind, image: Surface<Vec3>) -> Surface<Vec3> {
        composite_at(cfg, kind, image, &ClickRing::default(), None, 1.5)
    }

    fn composite_at(
        cfg: &Config,
        kind: EffectKind,
        image: Surface<Vec3>,
        clicks: &ClickRing,
        camera: Option<&Surface<Vec3>>,
        now: f64,
    ) -> Surface<Vec3> {
        let size = image.size();
        let passes: Vec<Box<dyn Pass>> = vec![
            Box::new(Source("glyphs", image.clone())),
            Box::new(Source("bloom", image)),
        ];
        let mut pass = EffectPass::new(cfg, kind).unwrap();
        pass.set_size(size);
        let frame = Frame {
            tick: 3,
            real_time: now,
            sim_time: now,
            clicks,
            camera,
        };
        pass.execute(&frame, &Upstream::new(&passes, "color"), true).unwrap();
        pass.out
    }

    fn click_at_centre() -> ClickRing {
        let mut clicks = ClickRing::default();
        clicks.push(Click {
            uv: Vec2::new(0.5, 0.5),
            time: 0.0,
        });
        clicks
    }

    fn gray_config() -> Config {
        Config {
            palette: vec![
                PaletteStop::new(Color::BLACK, 0.0),
                PaletteStop::new(Color::WHITE, 1.0),
            ],
            dither_magnitude: 0.0,
            ..Config::default()
        }
    }

    #[test]
    fn test_palette_midpoint_is_gray() {
        let image = Surface::filled(Size::new(4, 4), Vec3::new(0.5, 0.0, 0.0));
        let out = composite(&gray_config(), EffectKind::Palette, image);
        assert!(out.data().iter().all(|c| *c == Vec3::splat(0.5)));
    }

    #[test]
    fn test_palette_exact_at_stops() {
        let cfg = Config {
            dither_magnitude: 0.0,
            ..Config::default()
        };
        let palette = Palette::new(&cfg.palette).unwrap();
        for stop in &cfg.palette {
            let image = Surface::filled(Size::new(2, 2), Vec3::new(stop.at, 0.0, 0.0));
            let out = composite(&cfg, EffectKind::Palette, image);
            assert_eq!(out.get(1, 1), saturate(palette.sample(stop.at)));
            assert_eq!(palette.sample(stop.at), stop.color.to_rgb());
        }
    }

    #[test]
    fn test_plain_dark_pixel_is_background() {
        let cfg = Config {
            background_color: Color::rgb(0.0, 0.0, 0.2),
            ..gray_config()
        };
        let mut image = Surface::filled(Size::new(2, 1), Vec3::ZERO);
        image.set(1, 0, Vec3::new(1.0, 0.0, 0.0));
        let out = composite(&cfg, EffectKind::Plain, image);
        assert_eq!(out.get(0, 0), Vec3::new(0.0, 0.0, 0.2));
        // A fully lit pixel adds the brightest palette colour once.
        assert_eq!(out.get(1, 0), Vec3::new(1.0, 1.0, 1.2));
    }

    #[test]
    fn test_raw_passthrough() {
        let mut image = Surface::filled(Size::new(3, 2), Vec3::new(0.25, 2.0, 0.5));
        image.set(1, 1, Vec3::new(7.0, 0.0, 0.0));
        let out = composite(&Config::default(), EffectKind::None, image.clone());
        assert_eq!(out.data(), image.data());
    }

    #[test]
    fn test_channels_clamped_before_sum() {
        let cfg = Config {
            background_color: Color::rgb(0.5, 0.5, 0.5),
            cursor_color: Color::WHITE,
            cursor_intensity: 4.0,
            ..gray_config()
        };
        let image = Surface::filled(Size::new(2, 2), Vec3::new(3.0, 3.0, 0.0));
        let out = composite(&cfg, EffectKind::Palette, image);
        // 0.5 background + 1.0 body + 1.0 cursor, no final clamp.
        assert_eq!(out.get(0, 0), Vec3::splat(2.5));
    }

    #[test]
    fn test_dither_only_darkens() {
        let cfg = Config {
            dither_magnitude: 0.1,
            ..gray_config()
        };
        let image = Surface::filled(Size::new(8, 8), Vec3::new(0.5, 0.0, 0.0));
        let out = composite(&cfg, EffectKind::Palette, image);
        assert!(out.data().iter().all(|c| c.x <= 0.5 && c.x >= 0.4));
        assert!(out.data().iter().any(|c| c.x < 0.5));
    }

    #[test]
    fn test_stripes_follow_columns() {
        let cfg = Config {
            dither_magnitude: 0.0,
            stripe_colors: vec![Color::rgb(1.0, 0.0, 0.0), Color::rgb(0.0, 0.0, 1.0)],
            ..Config::default()
        };
        let image = Surface::filled(Size::new(4, 2), Vec3::new(1.0, 0.0, 0.0));
        let out = composite(&cfg, EffectKind::Stripes, image);
        assert_eq!(out.get(0, 0), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(out.get(3, 1), Vec3::new(0.0, 0.0, 1.0));

        let image = Surface::filled(Size::new(12, 1), Vec3::new(1.0, 0.0, 0.0));
        let out = composite(&cfg, EffectKind::TransPride, image);
        assert_eq!(out.get(0, 0), out.get(11, 0));
        assert_ne!(out.get(0, 0), out.get(6, 0));
    }

    #[test]
    fn test_ripple_ring_expands_and_fades() {
        let mut clicks = ClickRing::default();
        clicks.push(Click {
            uv: Vec2::new(0.5, 0.5),
            time: 0.0,
        });
        let at = |r: f32, now: f64| ripples(&clicks, Vec2::new(0.5 + r, 0.5), 1.0, now, 0.2, 0.05).0;
        // At t=1 the ring sits 0.2 from the click.
        assert!(at(0.2, 1.0) > 0.3);
        assert_eq!(at(0.05, 1.0), 0.0);
        assert!(at(0.4, 2.0) < at(0.2, 1.0));
        // Clicks from the future contribute nothing.
        assert_eq!(ripples(&clicks, Vec2::new(0.5, 0.5), 1.0, -1.0, 0.2, 0.05).0, 0.0);
    }

    #[test]
    fn test_mirror_ripple_brightens_palette() {
        let cfg = Config {
            ripple_speed: 0.25,
            ripple_thickness: 0.1,
            ..gray_config()
        };
        let size = Size::new(64, 64);
        let image = Surface::filled(size, Vec3::new(0.5, 0.0, 0.0));
        let still = composite_at(&cfg, EffectKind::Mirror, image.clone(), &ClickRing::default(), None, 1.0);
        assert!(still.data().iter().all(|c| (*c - Vec3::splat(0.5)).length() < 1e-6));

        // One second after the click the ring is 0.25 widths out.
        let rippled = composite_at(&cfg, EffectKind::Mirror, image, &click_at_centre(), None, 1.0);
        let on_ring = rippled.get(48, 32);
        assert!(on_ring.x > 0.6, "{on_ring:?}");
        assert_eq!(rippled.get(32, 32), Vec3::splat(0.5));
        assert_eq!(rippled.get(0, 0), Vec3::splat(0.5));
    }

    #[test]
    fn test_mirror_samples_displaced_camera() {
        let cfg = Config {
            ripple_speed: 0.25,
            ripple_thickness: 0.1,
            ..gray_config()
        };
        let size = Size::new(64, 64);
        // Red grows left to right.
        let ramp = (0..size.area())
            .map(|i| Vec3::new((i % 64) as f32 / 63.0, 0.0, 0.0))
            .collect();
        let camera = Surface::from_vec(size, ramp).unwrap();
        let image = Surface::filled(size, Vec3::new(1.0, 0.0, 0.0));

        let plain = composite_at(&cfg, EffectKind::Mirror, image.clone(), &ClickRing::default(), Some(&camera), 1.0);
        let expected = camera.sample((Vec2::new(48.0, 32.0) + 0.5) / 64.0);
        assert!((plain.get(48, 32) - expected).length() < 1e-5);

        // On the ring right of the click the lookup is pushed further right.
        let rippled = composite_at(&cfg, EffectKind::Mirror, image, &click_at_centre(), Some(&camera), 1.0);
        assert!(rippled.get(48, 32).x > plain.get(48, 32).x + 0.005);
        assert_eq!(rippled.get(48, 32).y, 0.0);
        assert_eq!(rippled.get(2, 2), plain.get(2, 2));
    }

    #[test]
    fn test_image_requires_path_and_gates_on_load() {
        let cfg = Config::default();
        assert!(EffectPass::new(&cfg, EffectKind::Image).is_err());

        let cfg = Config {
            image_path: Some("definitely/missing.png".into()),
            ..Config::default()
        };
        let mut pass = EffectPass::new(&cfg, EffectKind::Image).unwrap();
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        let result = loop {
            if let Poll::Ready(r) = pass.poll_ready() {
                break r;
            }
            assert!(std::time::Instant::now() < deadline);
            std::thread::yield_now();
        };
        assert!(matches!(result, Err(RainError::Asset { .. })));
    }

    #[test]
    fn test_image_overlay_modulates() {
        let cfg = gray_config();
        let overlay = Arc::new(Surface::filled(Size::new(2, 2), Vec3::new(0.0, 1.0, 0.0)));
        let mut pass = EffectPass::with_overlay(&cfg, overlay);
        assert!(matches!(pass.poll_ready(), Poll::Ready(Ok(()))));
        let size = Size::new(4, 4);
        pass.set_size(size);
        let image = Surface::filled(size, Vec3::new(0.5, 0.0, 0.0));
        let passes: Vec<Box<dyn Pass>> = vec![Box::new(Source("bloom", image))];
        let clicks = ClickRing::default();
        let frame = Frame {
            tick: 0,
            real_time: 0.0,
            sim_time: 0.0,
            clicks: &clicks,
            camera: None,
        };
        pass.execute(&frame, &Upstream::new(&passes, "color"), true).unwrap();
        let texel = pass.image().get(2, 2);
        assert!((texel - Vec3::new(0.0, 0.5, 0.0)).length() < 1e-6, "{texel:?}");
    }
}
