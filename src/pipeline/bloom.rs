// src/pipeline/bloom.rs
//! Bloom: high-pass, separable gaussian blur at half resolution, additive combine.

use super::glyphs::GLYPHS;
use super::pass::{Frame, Output, Pass, Upstream};
use crate::config::Config;
use crate::data::{Size, Surface};
use crate::error::{RainError, Result};
use glam::{Vec2, Vec3};

pub const BLOOM: &str = "bloom";

/// Gaussian sigma in half-resolution pixels per unit of `bloomSize`, relative
/// to the half-resolution height.
const SIGMA_PER_HEIGHT: f32 = 0.05;
/// Widest blur kernel, in taps on each side of the centre.
pub const MAX_RADIUS: usize = 64;

// -------------------- Parameters --------------------

#[derive(Clone, Copy, Debug)]
pub struct BloomParams {
    pub size: f32,
    pub strength: f32,
    pub threshold: f32,
}

impl BloomParams {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            size: cfg.bloom_size,
            strength: cfg.bloom_strength,
            threshold: cfg.high_pass_threshold,
        }
    }

    /// Bloom with no size or no strength adds nothing.
    pub fn is_identity(&self) -> bool {
        !(self.size > 0.0 && self.strength > 0.0)
    }

    /// Blur sigma for a half-resolution image `half_height` pixels tall.
    pub fn sigma(&self, half_height: u32) -> f32 {
        (self.size * half_height as f32 * SIGMA_PER_HEIGHT).max(0.5)
    }
}

/// Normalized gaussian weights `w[0..=radius]` for offsets `0, ±1, ...`.
pub fn gaussian_weights(sigma: f32) -> Vec<f32> {
    let radius = ((sigma * 3.0).ceil() as usize).clamp(1, MAX_RADIUS);
    let mut w: Vec<f32> = (0..=radius)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total = w[0] + 2.0 * w[1..].iter().sum::<f32>();
    w.iter_mut().for_each(|v| *v /= total);
    w
}

/// Bloom works at half resolution, never below one pixel.
pub fn half(size: Size) -> Size {
    Size::new((size.width / 2).max(1), (size.height / 2).max(1))
}

// -------------------- Steps --------------------

/// 2x2 box downsample followed by `max(0, x - threshold)`.
struct HighPass {
    out: Surface<Vec3>,
}

impl HighPass {
    fn run(&mut self, input: &Surface<Vec3>, threshold: f32) {
        self.out.par_for_each_mut(|x, y, texel| {
            let (sx, sy) = (2 * x as i64, 2 * y as i64);
            let avg = (input.get_clamped(sx, sy)
                + input.get_clamped(sx + 1, sy)
                + input.get_clamped(sx, sy + 1)
                + input.get_clamped(sx + 1, sy + 1))
                * 0.25;
            *texel = (avg - Vec3::splat(threshold)).max(Vec3::ZERO);
        });
    }
}

/// Horizontal pass into `scratch`, vertical pass into `out`.
struct Blur {
    scratch: Surface<Vec3>,
    out: Surface<Vec3>,
    weights: Vec<f32>,
}

impl Blur {
    fn run(&mut self, input: &Surface<Vec3>) {
        let weights = &self.weights;
        let tap = |get: &dyn Fn(i64) -> Vec3| {
            weights
                .iter()
                .enumerate()
                .skip(1)
                .fold(get(0) * weights[0], |acc, (i, w)| {
                    acc + (get(i as i64) + get(-(i as i64))) * *w
                })
        };
        self.scratch.par_for_each_mut(|x, y, texel| {
            *texel = tap(&|d| input.get_clamped(x as i64 + d, y as i64));
        });
        let scratch = &self.scratch;
        self.out.par_for_each_mut(|x, y, texel| {
            *texel = tap(&|d| scratch.get_clamped(x as i64, y as i64 + d));
        });
    }
}

/// `input + upsample(blur) * strength` at full resolution.
struct Combine {
    out: Surface<Vec3>,
}

impl Combine {
    fn run(&mut self, input: &Surface<Vec3>, blur: &Surface<Vec3>, strength: f32) {
        let inv = Vec2::new(1.0 / input.width() as f32, 1.0 / input.height() as f32);
        self.out.par_for_each_mut(|x, y, texel| {
            let uv = (Vec2::new(x as f32, y as f32) + 0.5) * inv;
            *texel = input.get(x, y) + blur.sample(uv) * strength;
        });
    }
}

// -------------------- Pass --------------------

pub struct BloomPass {
    params: BloomParams,
    size: Size,
    high_pass: HighPass,
    blur: Blur,
    combine: Combine,
    blur_runs: u64,
}

impl BloomPass {
    pub fn new(cfg: &Config) -> Self {
        Self::with_params(BloomParams::from_config(cfg))
    }

    pub fn with_params(params: BloomParams) -> Self {
        if params.is_identity() {
            log::debug!("bloom disabled; passing glyphs through");
        }
        Self {
            params,
            size: Size::default(),
            high_pass: HighPass {
                out: Surface::new(Size::default()),
            },
            blur: Blur {
                scratch: Surface::new(Size::default()),
                out: Surface::new(Size::default()),
                weights: vec![1.0],
            },
            combine: Combine {
                out: Surface::new(Size::default()),
            },
            blur_runs: 0,
        }
    }

    pub fn params(&self) -> BloomParams {
        self.params
    }

    /// How many frames actually ran the blur.
    pub fn blur_runs(&self) -> u64 {
        self.blur_runs
    }
}

impl Pass for BloomPass {
    fn name(&self) -> &'static str {
        "bloom"
    }

    fn set_size(&mut self, size: Size) {
        if size == self.size {
            return;
        }
        self.size = size;
        if self.params.is_identity() {
            return;
        }
        let small = half(size);
        self.high_pass.out = Surface::new(small);
        self.blur.scratch = Surface::new(small);
        self.blur.out = Surface::new(small);
        self.blur.weights = gaussian_weights(self.params.sigma(small.height));
        self.combine.out = Surface::new(size);
    }

    fn execute(&mut self, _frame: &Frame<'_>, upstream: &Upstream<'_>, should_render: bool) -> Result<()> {
        if self.params.is_identity() || !should_render || self.size.is_empty() {
            return Ok(());
        }
        let input = upstream.image(GLYPHS)?;
        if input.size() != self.size {
            return Err(RainError::BufferMismatch {
                front: (input.width(), input.height()),
                back: (self.size.width, self.size.height),
            });
        }
        self.high_pass.run(input, self.params.threshold);
        self.blur.run(&self.high_pass.out);
        self.combine.run(input, &self.blur.out, self.params.strength);
        self.blur_runs += 1;
        Ok(())
    }

    fn output(&self, name: &str) -> Option<Output<'_>> {
        if name != BLOOM {
            return None;
        }
        if self.params.is_identity() {
            Some(Output::Alias(GLYPHS))
        } else {
            Some(Output::Image(&self.combine.out))
        }
    }

    fn reads(&self) -> Option<&'static [&'static str]> {
        Some(&[GLYPHS])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::clicks::ClickRing;

    struct Glyphs(Surface<Vec3>);

    impl Pass for Glyphs {
        fn name(&self) -> &'static str {
            "glyphs"
        }
        fn set_size(&mut self, _size: Size) {}
        fn execute(&mut self, _: &Frame<'_>, _: &Upstream<'_>, _: bool) -> Result<()> {
            Ok(())
        }
        fn output(&self, name: &str) -> Option<Output<'_>> {
            (name == GLYPHS).then_some(Output::Image(&self.0))
        }
    }

    fn run(params: BloomParams, image: Surface<Vec3>) -> (BloomPass, Vec<Box<dyn Pass>>) {
        let size = image.size();
        let passes: Vec<Box<dyn Pass>> = vec![Box::new(Glyphs(image))];
        let mut bloom = BloomPass::with_params(params);
        bloom.set_size(size);
        let clicks = ClickRing::default();
        let frame = Frame {
            tick: 0,
            real_time: 0.0,
            sim_time: 0.0,
            clicks: &clicks,
            camera: None,
        };
        bloom
            .execute(&frame, &Upstream::new(&passes, "bloom"), true)
            .unwrap();
        (bloom, passes)
    }

    fn params() -> BloomParams {
        BloomParams {
            size: 0.4,
            strength: 0.7,
            threshold: 0.1,
        }
    }

    #[test]
    fn test_weights_normalized() {
        for sigma in [0.5, 1.0, 3.3, 12.0] {
            let w = gaussian_weights(sigma);
            let total = w[0] + 2.0 * w[1..].iter().sum::<f32>();
            assert!((total - 1.0).abs() < 1e-5);
            assert!(w.windows(2).all(|p| p[0] >= p[1]));
        }
    }

    #[test]
    fn test_disabled_bloom_is_identity() {
        for (size, strength) in [(0.0, 0.7), (0.4, 0.0), (-1.0, -1.0)] {
            let image = Surface::filled(Size::new(8, 8), Vec3::splat(2.0));
            let id = image.id();
            let (bloom, passes) = run(
                BloomParams {
                    size,
                    strength,
                    threshold: 0.1,
                },
                image,
            );
            assert_eq!(bloom.blur_runs(), 0);
            let mut chain = passes;
            chain.push(Box::new(bloom));
            let out = Upstream::new(&chain, "color").image(BLOOM).unwrap();
            assert_eq!(out.id(), id);
        }
    }

    #[test]
    fn test_below_threshold_is_unchanged() {
        let image = Surface::filled(Size::new(16, 12), Vec3::splat(0.05));
        let (bloom, passes) = run(params(), image);
        assert_eq!(bloom.blur_runs(), 1);
        let Output::Image(input) = passes[0].output(GLYPHS).unwrap() else {
            panic!("glyphs is an image");
        };
        let Output::Image(out) = bloom.output(BLOOM).unwrap() else {
            panic!("bloom is an image");
        };
        assert_eq!(out.data(), input.data());
    }

    #[test]
    fn test_bright_texel_spreads() {
        let mut image = Surface::filled(Size::new(32, 32), Vec3::ZERO);
        for (x, y) in [(16, 16), (17, 16), (16, 17), (17, 17)] {
            image.set(x, y, Vec3::splat(4.0));
        }
        let (bloom, _) = run(params(), image);
        let Output::Image(out) = bloom.output(BLOOM).unwrap() else {
            panic!("bloom is an image");
        };
        assert!(out.get(16, 16).x > 4.0);
        assert!(out.get(12, 16).x > 0.0);
        assert!(out.get(12, 16).x < out.get(15, 16).x);
        assert_eq!(out.get(0, 0), Vec3::ZERO);
    }

    #[test]
    fn test_resize_is_idempotent() {
        let mut bloom = BloomPass::with_params(params());
        bloom.set_size(Size::new(64, 48));
        let id = bloom.combine.out.id();
        bloom.set_size(Size::new(64, 48));
        assert_eq!(bloom.combine.out.id(), id);
        bloom.set_size(Size::new(32, 48));
        assert_ne!(bloom.combine.out.id(), id);
        assert_eq!(bloom.high_pass.out.size(), Size::new(16, 24));
    }
}
