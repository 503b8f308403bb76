// tests/pipeline.rs
//! End-to-end runs of the full pass chain.

use glam::{Vec2, Vec3};
use matrix_rain::{
    config::{Config, EffectKind},
    data::{BufferId, Color, PaletteStop, Size, Surface},
    error::Result,
    pipeline::{
        EffectPass, Frame, Output, Pass, PassState, Pipeline, Upstream, BLOOM, COLOR, GLYPHS,
        RAINDROPS, SYMBOLS,
    },
};
use std::time::{Duration, Instant};

fn config() -> Config {
    Config {
        resolution: 1.0,
        ..Config::default()
    }
}

fn buffer_id(p: &Pipeline, name: &'static str) -> Option<BufferId> {
    match p.lookup(name).ok()? {
        Output::Raindrops(s) => Some(s.id()),
        Output::Symbols(s) => Some(s.id()),
        Output::Image(s) => Some(s.id()),
        Output::Texture(t) => Some(t.id()),
        Output::Alias(_) => None,
    }
}

/// Runs frames until `done` holds, failing after a generous timeout.
fn run_until(p: &mut Pipeline, mut done: impl FnMut(&Pipeline) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(20);
    let mut t = 0.0;
    loop {
        p.frame(t, true).unwrap();
        if done(p) {
            return;
        }
        assert!(Instant::now() < deadline, "pipeline did not settle");
        std::thread::sleep(Duration::from_millis(5));
        t += 1.0 / 60.0;
    }
}

fn has_glyphs(p: &Pipeline) -> bool {
    p.image(GLYPHS)
        .is_some_and(|img| img.data().iter().any(|c| c.x > 0.0))
}

#[test]
fn test_looping_column_is_periodic() {
    let cfg = Config {
        num_columns: 10,
        fall_speed: 1.0,
        raindrop_length: 1.0,
        loops: true,
        ..config()
    };
    let mut p = Pipeline::start(&Size::new(100, 100), cfg).unwrap();
    p.frame(0.25, false).unwrap();
    assert_eq!(p.grid(), Size::new(10, 10));
    let first: Vec<f32> = p.raindrops().unwrap().data().iter().map(|c| c.brightness).collect();

    // One full cycle later: raindropLength / fallSpeed.
    p.frame(1.25, false).unwrap();
    let later: Vec<f32> = p.raindrops().unwrap().data().iter().map(|c| c.brightness).collect();
    for (a, b) in first.iter().zip(&later) {
        assert!((a - b).abs() < 1e-3, "{a} vs {b}");
    }
}

#[test]
fn test_effect_none_passes_raw_glyphs() {
    let cfg = Config {
        effect: EffectKind::None,
        ..config()
    };
    let mut p = Pipeline::start(&Size::new(160, 120), cfg).unwrap();
    run_until(&mut p, has_glyphs);
    let glyphs = p.image(GLYPHS).unwrap();
    let out = p.image(COLOR).unwrap();
    assert_eq!(glyphs.size(), out.size());
    for (g, o) in glyphs.data().iter().zip(out.data()) {
        assert_eq!(g.x, o.x);
    }
}

#[test]
fn test_zero_bloom_strength_forwards_glyphs() {
    let cfg = Config {
        bloom_strength: 0.0,
        ..config()
    };
    let mut p = Pipeline::start(&Size::new(120, 90), cfg).unwrap();
    run_until(&mut p, has_glyphs);
    assert_eq!(buffer_id(&p, BLOOM), buffer_id(&p, GLYPHS));
    assert_eq!(p.image(BLOOM).unwrap().data(), p.image(GLYPHS).unwrap().data());
}

#[test]
fn test_resize_mid_run() {
    let cfg = Config {
        resolution: 0.25,
        ..Config::default()
    };
    let mut p = Pipeline::start(&Size::new(800, 600), cfg).unwrap();
    for i in 0..3 {
        p.frame(i as f64 / 60.0, true).unwrap();
    }
    assert_eq!(p.grid(), Size::new(80, 60));
    let glyph_buffer = buffer_id(&p, GLYPHS);

    p.resize(1600, 1200);
    assert!(p.frame(0.1, true).unwrap());
    assert_eq!(p.output().size(), Size::new(400, 300));
    assert_eq!(p.grid(), Size::new(80, 60));
    assert_ne!(buffer_id(&p, GLYPHS), glyph_buffer);

    p.resize(1600, 900);
    p.frame(0.2, true).unwrap();
    assert_eq!(p.grid(), Size::new(80, 45));
    for name in p.pass_names() {
        assert_eq!(p.pass_state(name), Some(PassState::Executing), "{name}");
    }
}

#[test]
fn test_same_size_resize_keeps_buffers() {
    let mut p = Pipeline::start(&Size::new(200, 100), config()).unwrap();
    p.frame(0.0, true).unwrap();
    let before: Vec<_> = [RAINDROPS, SYMBOLS, GLYPHS, BLOOM, COLOR]
        .into_iter()
        .map(|n| buffer_id(&p, n))
        .collect();
    p.resize(200, 100);
    let after: Vec<_> = [RAINDROPS, SYMBOLS, GLYPHS, BLOOM, COLOR]
        .into_iter()
        .map(|n| buffer_id(&p, n))
        .collect();
    assert_eq!(before, after);
}

/// A constant brightness image standing in for the bloom output.
struct Constant(Surface<Vec3>);

impl Pass for Constant {
    fn name(&self) -> &'static str {
        "bloom"
    }
    fn set_size(&mut self, size: Size) {
        if size != self.0.size() {
            self.0 = Surface::filled(size, Vec3::new(0.5, 0.0, 0.0));
        }
    }
    fn execute(&mut self, _: &Frame<'_>, _: &Upstream<'_>, _: bool) -> Result<()> {
        Ok(())
    }
    fn output(&self, name: &str) -> Option<Output<'_>> {
        (name == BLOOM).then_some(Output::Image(&self.0))
    }
}

#[test]
fn test_black_to_white_palette_midpoint() {
    let cfg = Config {
        palette: vec![
            PaletteStop::new(Color::BLACK, 0.0),
            PaletteStop::new(Color::WHITE, 1.0),
        ],
        dither_magnitude: 0.0,
        ..config()
    };
    let effect = EffectPass::new(&cfg, EffectKind::Palette).unwrap();
    let passes: Vec<Box<dyn Pass>> = vec![
        Box::new(Constant(Surface::new(Size::default()))),
        Box::new(effect),
    ];
    let mut p = Pipeline::with_passes(&Size::new(6, 4), cfg, passes);
    for t in [0.0, 0.5] {
        assert!(p.frame(t, true).unwrap());
        assert!(p.output().data().iter().all(|c| *c == Vec3::splat(0.5)));
    }
}

#[test]
fn test_effect_switch_replaces_only_compositor() {
    let mut p = Pipeline::start(&Size::new(120, 90), config()).unwrap();
    p.frame(0.0, true).unwrap();
    let kept = [RAINDROPS, SYMBOLS, GLYPHS, BLOOM];
    let before: Vec<_> = kept.into_iter().map(|n| buffer_id(&p, n)).collect();
    let color = buffer_id(&p, COLOR);

    p.set_effect(EffectKind::Pride).unwrap();
    assert_eq!(p.pass_state(COLOR), Some(PassState::Uninitialized));
    p.frame(0.1, true).unwrap();
    assert_eq!(p.pass_state(COLOR), Some(PassState::Executing));
    // The visible half of a ping-pong buffer follows tick parity, so compare
    // at the same parity as before the switch.
    p.frame(0.2, true).unwrap();
    let after: Vec<_> = kept.into_iter().map(|n| buffer_id(&p, n)).collect();
    assert_eq!(before, after);
    assert_ne!(buffer_id(&p, COLOR), color);

    assert!(p.set_effect(EffectKind::Image).is_err());
}

#[test]
fn test_raw_effect_leaves_bloom_idle() {
    let cfg = Config {
        effect: EffectKind::None,
        ..config()
    };
    let mut p = Pipeline::start(&Size::new(160, 120), cfg).unwrap();
    run_until(&mut p, has_glyphs);
    // Nothing reads the bloom, so its combine target is never written.
    let bloom = p.image(BLOOM).unwrap();
    assert_ne!(bloom.id(), p.image(GLYPHS).unwrap().id());
    assert!(bloom.data().iter().all(|c| *c == Vec3::ZERO));
}

#[test]
fn test_mirror_clicks_and_camera_reach_the_frame() {
    let cfg = Config {
        palette: vec![
            PaletteStop::new(Color::BLACK, 0.0),
            PaletteStop::new(Color::WHITE, 1.0),
        ],
        dither_magnitude: 0.0,
        ripple_speed: 0.25,
        ripple_thickness: 0.1,
        ..config()
    };
    let mirror = |cfg: &Config| -> Vec<Box<dyn Pass>> {
        vec![
            Box::new(Constant(Surface::new(Size::default()))),
            Box::new(EffectPass::new(cfg, EffectKind::Mirror).unwrap()),
        ]
    };
    let size = Size::new(64, 64);

    // Without a camera a ripple brightens the palette lookup on its ring.
    let mut p = Pipeline::with_passes(&size, cfg.clone(), mirror(&cfg));
    p.frame(0.0, true).unwrap();
    assert_eq!(p.output().get(48, 32), Vec3::splat(0.5));
    p.click(Vec2::new(0.5, 0.5), 0.0);
    assert_eq!(p.clicks().len(), 1);
    p.frame(1.0, true).unwrap();
    assert!(p.output().get(48, 32).x > 0.6, "{:?}", p.output().get(48, 32));
    assert_eq!(p.output().get(32, 32), Vec3::splat(0.5));

    // With a camera the ring displaces the camera lookup instead.
    let ramp = (0..size.area())
        .map(|i| Vec3::new(0.0, (i % 64) as f32 / 63.0, 0.0))
        .collect();
    let camera = Surface::from_vec(size, ramp).unwrap();
    let mut p = Pipeline::with_passes(&size, cfg.clone(), mirror(&cfg));
    p.set_camera_frame(Some(camera.clone()));
    p.frame(1.0, true).unwrap();
    let (still, centre) = (p.output().get(48, 32), p.output().get(32, 32));
    assert!((still.y - 0.5 * camera.get(48, 32).y).abs() < 1e-3, "{still:?}");
    assert_eq!(still.x, 0.0);
    p.click(Vec2::new(0.5, 0.5), 0.0);
    p.frame(1.0, true).unwrap();
    // Right of the click the lookup is pushed further up the ramp.
    assert!(p.output().get(48, 32).y > still.y + 0.002);
    assert_eq!(p.output().get(32, 32), centre);
}

#[test]
fn test_missing_image_falls_back_to_background() {
    let cfg = Config {
        effect: EffectKind::Image,
        image_path: Some("no/such/overlay.png".into()),
        background_color: Color::rgb(0.0, 0.0, 0.2),
        ..config()
    };
    let mut p = Pipeline::start(&Size::new(40, 30), cfg).unwrap();
    run_until(&mut p, |p| p.pass_state(COLOR) == Some(PassState::Failed));
    // Everything upstream keeps running.
    assert_eq!(p.pass_state(GLYPHS), Some(PassState::Executing));
    assert!(p.frame(1.0, true).unwrap());
    assert!(p.output().data().iter().all(|c| *c == Vec3::new(0.0, 0.0, 0.2)));
}

#[test]
fn test_ticks_advance_when_not_rendering() {
    let mut p = Pipeline::start(&Size::new(40, 30), config()).unwrap();
    assert!(!p.frame(0.0, false).unwrap());
    assert!(!p.frame(0.1, false).unwrap());
    assert!(p.frame(0.2, true).unwrap());
    assert_eq!(p.tick(), 3);
}

#[test]
fn test_restart_applies_new_config() {
    let mut p = Pipeline::start(&Size::new(100, 100), config()).unwrap();
    p.frame(0.0, true).unwrap();
    let cfg = Config {
        num_columns: 20,
        ..config()
    };
    p.restart(cfg).unwrap();
    assert_eq!(p.tick(), 0);
    p.frame(0.0, true).unwrap();
    assert_eq!(p.grid(), Size::new(20, 20));
}
