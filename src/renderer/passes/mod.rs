// src/renderer/passes/mod.rs
//! GPU renditions of the rain passes.
//!
//! Each pass runs its kernel as a fullscreen fragment shader over the grid
//! or the render target and keeps its state in textures. The host passes in
//! [`crate::pipeline`] implement the same rules and are the reference the
//! GPU output is checked against.

pub mod bloom;
pub mod effect;
pub mod glyphs;
pub mod raindrops;
pub mod symbols;

pub use bloom::GpuBloomPass;
pub use effect::GpuEffectPass;
pub use glyphs::GpuGlyphPass;
pub use raindrops::GpuRaindropPass;
pub use symbols::GpuSymbolPass;

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::Pass;
use crate::renderer::gpu::Gpu;
use std::sync::Arc;

/// Builds the standard pass list on `gpu`.
pub fn build_passes(cfg: &Config, gpu: &Arc<Gpu>) -> Result<Vec<Box<dyn Pass>>> {
    let font = cfg.font_descriptor()?;
    Ok(vec![
        Box::new(GpuRaindropPass::new(gpu.clone(), cfg)),
        Box::new(GpuSymbolPass::new(gpu.clone(), cfg, font.sequence_length)),
        Box::new(GpuGlyphPass::new(gpu.clone(), cfg)?),
        Box::new(GpuBloomPass::new(gpu.clone(), cfg)),
        Box::new(GpuEffectPass::new(gpu.clone(), cfg, cfg.effect)?),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectKind;
    use crate::data::{Color, FontDescriptor, GlyphAtlas, PaletteStop, Size, Surface};
    use crate::pipeline::bloom::BloomParams;
    use crate::pipeline::{
        ClickRing, Frame, Output, RaindropPass, SymbolPass, Upstream, BLOOM, COLOR, GLYPHS, RAINDROPS, SYMBOLS,
    };
    use crate::renderer::gpu::GpuImage;
    use glam::{Vec3, Vec4};

    /// A device, or `None` on machines without an adapter.
    fn gpu() -> Option<Arc<Gpu>> {
        match Gpu::headless() {
            Ok(gpu) => Some(gpu),
            Err(e) => {
                eprintln!("skipping GPU test: {e}");
                None
            }
        }
    }

    /// Exposes a fixed texture under one name.
    struct Source(&'static str, GpuImage);

    impl Pass for Source {
        fn name(&self) -> &'static str {
            self.0
        }
        fn set_size(&mut self, _size: Size) {}
        fn execute(&mut self, _: &Frame<'_>, _: &Upstream<'_>, _: bool) -> Result<()> {
            Ok(())
        }
        fn output(&self, name: &str) -> Option<Output<'_>> {
            (name == self.0).then_some(Output::Texture(&self.1))
        }
    }

    /// Runs every pass once, in order, the way the orchestrator does.
    fn run(passes: &mut [Box<dyn Pass>], tick: u64, time: f64) {
        let clicks = ClickRing::default();
        let frame = Frame {
            tick,
            real_time: time,
            sim_time: time,
            clicks: &clicks,
            camera: None,
        };
        for i in 0..passes.len() {
            let (before, rest) = passes.split_at_mut(i);
            let pass = &mut rest[0];
            pass.execute(&frame, &Upstream::new(before, pass.name()), true).unwrap();
        }
    }

    fn texels(gpu: &Gpu, pass: &dyn Pass, name: &str) -> (Size, Vec<Vec4>) {
        match pass.output(name) {
            Some(Output::Texture(t)) => (t.size(), t.read_back(gpu).unwrap()),
            _ => panic!("`{name}` is not a texture"),
        }
    }

    fn sized(mut passes: Vec<Box<dyn Pass>>, size: Size) -> Vec<Box<dyn Pass>> {
        for pass in &mut passes {
            pass.set_size(size);
        }
        passes
    }

    #[test]
    fn test_raindrops_follow_host_rule() {
        let Some(gpu) = gpu() else { return };
        let cfg = Config {
            num_columns: 16,
            loops: true,
            ..Config::default()
        };
        let size = Size::new(64, 64);
        let mut device = sized(vec![Box::new(GpuRaindropPass::new(gpu.clone(), &cfg))], size);
        let mut host = sized(vec![Box::new(RaindropPass::new(&cfg))], size);

        // Cells that wrapped on either side may disagree about the reset.
        let mut near_wrap = Vec::new();
        for tick in 0..4 {
            let time = tick as f64 / 60.0;
            run(&mut device, tick, time);
            run(&mut host, tick, time);
            let (grid, gpu_cells) = texels(&gpu, device[0].as_ref(), RAINDROPS);
            let Some(Output::Raindrops(expected)) = host[0].output(RAINDROPS) else {
                panic!("host raindrops missing");
            };
            assert_eq!(grid, expected.size());
            near_wrap.resize(gpu_cells.len(), false);
            for (i, (got, want)) in gpu_cells.iter().zip(expected.data()).enumerate() {
                near_wrap[i] |= want.phase < 0.01 || want.phase > 0.99;
                if near_wrap[i] {
                    continue;
                }
                assert!((got.x - want.phase).abs() < 2e-3, "phase {} vs {}", got.x, want.phase);
                assert!((got.y - want.brightness).abs() < 2e-2, "brightness {} vs {}", got.y, want.brightness);
                assert!((got.z - want.cursor).abs() < 0.05, "cursor {} vs {}", got.z, want.cursor);
                assert_eq!(got.w > 0.5, want.reset);
            }
        }
        assert!(near_wrap.iter().any(|skipped| !skipped));
    }

    #[test]
    fn test_symbols_follow_host_rule() {
        let Some(gpu) = gpu() else { return };
        let cfg = Config {
            num_columns: 16,
            loops: false,
            cycle_speed: 0.3,
            ..Config::default()
        };
        let sequence_length = cfg.font_descriptor().unwrap().sequence_length;
        let size = Size::new(64, 64);
        let mut device = sized(
            vec![
                Box::new(GpuRaindropPass::new(gpu.clone(), &cfg)),
                Box::new(GpuSymbolPass::new(gpu.clone(), &cfg, sequence_length)),
            ],
            size,
        );
        let mut host = sized(
            vec![
                Box::new(RaindropPass::new(&cfg)),
                Box::new(SymbolPass::new(&cfg, sequence_length)),
            ],
            size,
        );

        for tick in 0..6 {
            let time = tick as f64 / 60.0;
            run(&mut device, tick, time);
            run(&mut host, tick, time);
            let (_, gpu_cells) = texels(&gpu, device[1].as_ref(), SYMBOLS);
            let Some(Output::Symbols(expected)) = host[1].output(SYMBOLS) else {
                panic!("host symbols missing");
            };
            assert_eq!(gpu_cells.len(), expected.data().len());
            for (got, want) in gpu_cells.iter().zip(expected.data()) {
                assert_eq!(got.x as u32, want.symbol);
                assert!((got.y - want.age).abs() < 1e-5, "age {} vs {}", got.y, want.age);
            }
        }
    }

    #[test]
    fn test_glyphs_are_finite_and_lit() {
        let Some(gpu) = gpu() else { return };
        let cfg = Config {
            num_columns: 16,
            ..Config::default()
        };
        let font = FontDescriptor::lookup("procedural").unwrap();
        let atlas = Arc::new(GlyphAtlas::procedural(font, 32).unwrap());
        let mut passes = sized(
            vec![
                Box::new(GpuRaindropPass::new(gpu.clone(), &cfg)),
                Box::new(GpuSymbolPass::new(gpu.clone(), &cfg, font.sequence_length)),
                Box::new(GpuGlyphPass::with_atlas(gpu.clone(), &cfg, atlas)),
            ],
            Size::new(256, 256),
        );
        run(&mut passes, 0, 0.0);
        let (_, image) = texels(&gpu, passes[2].as_ref(), GLYPHS);
        assert!(image.iter().all(|c| c.is_finite()));
        assert!(image.iter().any(|c| c.x > 0.0));
    }

    #[test]
    fn test_bloom_brightens_and_disabled_bloom_aliases() {
        let Some(gpu) = gpu() else { return };
        let size = Size::new(32, 32);
        let mut glyphs = Surface::filled(size, Vec3::ZERO);
        glyphs.set(16, 16, Vec3::new(1.0, 0.0, 0.0));
        let source = || -> Box<dyn Pass> { Box::new(Source(GLYPHS, GpuImage::from_surface(&gpu, &glyphs, "Glyphs"))) };
        let params = BloomParams {
            size: 0.5,
            strength: 1.0,
            threshold: 0.0,
        };

        let mut passes = sized(vec![source(), Box::new(GpuBloomPass::with_params(gpu.clone(), params))], size);
        run(&mut passes, 0, 0.0);
        let (_, out) = texels(&gpu, passes[1].as_ref(), BLOOM);
        // The lit texel spreads into its neighbours.
        assert!(out[16 * 32 + 18].x > 0.0);
        assert!(out[16 * 32 + 16].x >= 1.0 - 1e-3);

        let off = BloomParams { strength: 0.0, ..params };
        let mut passes = sized(vec![source(), Box::new(GpuBloomPass::with_params(gpu.clone(), off))], size);
        run(&mut passes, 0, 0.0);
        assert!(matches!(passes[1].output(BLOOM), Some(Output::Alias(GLYPHS))));
    }

    #[test]
    fn test_palette_midpoint_is_gray() {
        let Some(gpu) = gpu() else { return };
        let cfg = Config {
            palette: vec![
                PaletteStop::new(Color::BLACK, 0.0),
                PaletteStop::new(Color::WHITE, 1.0),
            ],
            dither_magnitude: 0.0,
            ..Config::default()
        };
        let size = Size::new(8, 8);
        let input = Surface::filled(size, Vec3::new(0.5, 0.0, 0.0));
        let mut passes = sized(
            vec![
                Box::new(Source(BLOOM, GpuImage::from_surface(&gpu, &input, "Bloom"))),
                Box::new(GpuEffectPass::new(gpu.clone(), &cfg, EffectKind::Palette).unwrap()),
            ],
            size,
        );
        run(&mut passes, 0, 0.0);
        let (_, out) = texels(&gpu, passes[1].as_ref(), COLOR);
        // 0.5 arrives as 128/255 through the upload format.
        assert!(out.iter().all(|c| (c.truncate() - Vec3::splat(0.5)).abs().max_element() < 0.01));
    }

    #[test]
    fn test_too_many_stops_rejected() {
        let Some(gpu) = gpu() else { return };
        let cfg = Config {
            palette: (0..20).map(|i| PaletteStop::new(Color::WHITE, i as f32 / 19.0)).collect(),
            ..Config::default()
        };
        assert!(GpuEffectPass::new(gpu, &cfg, EffectKind::Palette).is_err());
    }
}
