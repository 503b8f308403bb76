// src/pipeline/mod.rs
//! The rain pipeline: an ordered list of passes and the loop that drives them.
//!
//! Pass order is raindrops -> symbols -> glyphs -> bloom -> color. Each pass
//! reads only the outputs of the passes before it. The same chain exists
//! twice: on the GPU ([`Backend::Gpu`]) and as host kernels ([`Backend::Host`]).

pub mod bloom;
pub mod clicks;
pub mod effect;
pub mod glyphs;
pub mod pass;
pub mod raindrop;
pub mod symbols;

pub use bloom::{BloomPass, BLOOM};
pub use clicks::{Click, ClickRing};
pub use effect::{EffectPass, COLOR};
pub use glyphs::{GlyphPass, GLYPHS};
pub use pass::{Frame, Output, Pass, PassState, Upstream};
pub use raindrop::{RaindropPass, RAINDROPS};
pub use symbols::{SymbolPass, SYMBOLS};

use crate::config::{Config, EffectKind};
use crate::data::{RaindropCell, Size, Surface};
use crate::error::Result;
use crate::renderer::{gpu::Gpu, passes as gpu_passes};
use glam::{Vec2, Vec3};
use std::{sync::Arc, task::Poll};

/// Anything that can report the pixel size of the area being drawn to.
pub trait DisplaySurface {
    fn pixel_size(&self) -> Size;
}

impl DisplaySurface for Size {
    fn pixel_size(&self) -> Size {
        *self
    }
}

/// Where the passes run.
#[derive(Clone)]
pub enum Backend {
    /// Data-parallel host kernels on the rayon pool.
    Host,
    Gpu(Arc<Gpu>),
}

impl Backend {
    pub fn build_passes(&self, cfg: &Config) -> Result<Vec<Box<dyn Pass>>> {
        match self {
            Backend::Host => build_passes(cfg),
            Backend::Gpu(gpu) => gpu_passes::build_passes(cfg, gpu),
        }
    }

    pub fn effect(&self, cfg: &Config, kind: EffectKind) -> Result<Box<dyn Pass>> {
        Ok(match self {
            Backend::Host => Box::new(EffectPass::new(cfg, kind)?),
            Backend::Gpu(gpu) => Box::new(gpu_passes::GpuEffectPass::new(gpu.clone(), cfg, kind)?),
        })
    }
}

/// Builds the standard host pass list for a config.
pub fn build_passes(cfg: &Config) -> Result<Vec<Box<dyn Pass>>> {
    let font = cfg.font_descriptor()?;
    Ok(vec![
        Box::new(RaindropPass::new(cfg)),
        Box::new(SymbolPass::new(cfg, font.sequence_length)),
        Box::new(GlyphPass::new(cfg)?),
        Box::new(BloomPass::new(cfg)),
        Box::new(EffectPass::new(cfg, cfg.effect)?),
    ])
}

pub struct Pipeline {
    config: Arc<Config>,
    backend: Backend,
    passes: Vec<Box<dyn Pass>>,
    states: Vec<PassState>,
    /// Whether a pass has been through the ready gate and received a size.
    sized: Vec<bool>,
    tick: u64,
    surface_size: Size,
    render_size: Size,
    clicks: ClickRing,
    camera: Option<Surface<Vec3>>,
    /// Shown when the compositor has nothing valid to show.
    blank: Surface<Vec3>,
    running: bool,
}

impl Pipeline {
    /// Validates `config` and builds the standard host passes for `surface`.
    pub fn start(surface: &impl DisplaySurface, config: Config) -> Result<Self> {
        Self::start_on(surface, config, Backend::Host)
    }

    /// Validates `config` and builds the standard passes on `backend`.
    pub fn start_on(surface: &impl DisplaySurface, config: Config, backend: Backend) -> Result<Self> {
        config.validate()?;
        let passes = backend.build_passes(&config)?;
        let mut pipeline = Self::with_passes(surface, config, passes);
        pipeline.backend = backend;
        Ok(pipeline)
    }

    /// Drives a custom pass list on the host backend. The last pass must
    /// expose [`COLOR`].
    pub fn with_passes(surface: &impl DisplaySurface, config: Config, passes: Vec<Box<dyn Pass>>) -> Self {
        let surface_size = surface.pixel_size();
        let render_size = surface_size.scaled(config.resolution);
        let background = config.background_color.to_rgb();
        log::info!(
            "pipeline start: {} passes, surface {}x{}, render {}x{}",
            passes.len(),
            surface_size.width,
            surface_size.height,
            render_size.width,
            render_size.height
        );
        let n = passes.len();
        Self {
            config: Arc::new(config),
            backend: Backend::Host,
            passes,
            states: vec![PassState::Uninitialized; n],
            sized: vec![false; n],
            tick: 0,
            surface_size,
            render_size,
            clicks: ClickRing::default(),
            camera: None,
            blank: Surface::filled(render_size, background),
            running: true,
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Size of every image in the pipeline: the surface scaled by `resolution`.
    pub fn render_size(&self) -> Size {
        self.render_size
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn pass_state(&self, name: &str) -> Option<PassState> {
        self.passes
            .iter()
            .position(|p| p.name() == name)
            .map(|i| self.states[i])
    }

    /// Looks up any named output, as the passes after the last one would see it.
    pub fn lookup(&self, name: &'static str) -> Result<Output<'_>> {
        Upstream::new(&self.passes, "pipeline").find(name)
    }

    /// Current raindrop state, if the simulation has been sized.
    pub fn raindrops(&self) -> Option<&Surface<RaindropCell>> {
        match self.lookup(RAINDROPS) {
            Ok(Output::Raindrops(s)) => Some(s),
            _ => None,
        }
    }

    /// An image output such as [`GLYPHS`], [`BLOOM`] or [`COLOR`].
    pub fn image(&self, name: &'static str) -> Option<&Surface<Vec3>> {
        Upstream::new(&self.passes, "pipeline").image(name).ok()
    }

    /// Glyph grid in cells.
    pub fn grid(&self) -> Size {
        match self.lookup(RAINDROPS) {
            Ok(Output::Raindrops(s)) => s.size(),
            Ok(Output::Texture(t)) => t.size(),
            _ => Size::default(),
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// The composited frame as a host image, or a background-coloured image
    /// when the compositor has no valid host output at the current size.
    pub fn output(&self) -> &Surface<Vec3> {
        match self.image(COLOR) {
            Some(img) if img.size() == self.render_size => img,
            _ => &self.blank,
        }
    }

    /// What the renderer should show: the composited image or texture, or
    /// the background image when the compositor has nothing valid.
    pub fn presentable(&self) -> Output<'_> {
        match self.lookup(COLOR) {
            Ok(Output::Image(img)) if img.size() == self.render_size => Output::Image(img),
            Ok(Output::Texture(tex)) if tex.size() == self.render_size => Output::Texture(tex),
            _ => Output::Image(&self.blank),
        }
    }

    /// Records a viewport change. Takes effect before the next frame's passes
    /// run; passes still loading get the latest size when they become ready.
    pub fn resize(&mut self, width: u32, height: u32) {
        let surface = Size::new(width, height);
        self.surface_size = surface;
        let render = surface.scaled(self.config.resolution);
        if render == self.render_size {
            return;
        }
        log::info!("resize: surface {width}x{height}, render {}x{}", render.width, render.height);
        self.render_size = render;
        self.blank = Surface::filled(render, self.config.background_color.to_rgb());
        for (i, pass) in self.passes.iter_mut().enumerate() {
            if !self.sized[i] {
                continue;
            }
            pass.set_size(render);
            if self.states[i].can_execute() {
                self.states[i] = PassState::Resized;
            }
        }
    }

    /// Replaces the compositor with a new strategy. Every other pass and its
    /// buffers stay as they are.
    pub fn set_effect(&mut self, kind: EffectKind) -> Result<()> {
        let pass = self.backend.effect(&self.config, kind)?;
        self.replace_last(pass);
        log::info!("effect: {kind}");
        Ok(())
    }

    /// Replaces the last pass.
    pub fn replace_last(&mut self, pass: Box<dyn Pass>) {
        match self.passes.last_mut() {
            Some(last) => {
                *last = pass;
                let i = self.passes.len() - 1;
                self.states[i] = PassState::Uninitialized;
                self.sized[i] = false;
            }
            None => {
                self.passes.push(pass);
                self.states.push(PassState::Uninitialized);
                self.sized.push(false);
            }
        }
    }

    /// Tears down every pass and starts over with `config` at the current size.
    pub fn restart(&mut self, config: Config) -> Result<()> {
        let surface = self.surface_size;
        let mut fresh = Self::start_on(&surface, config, self.backend.clone())?;
        fresh.camera = self.camera.take();
        *self = fresh;
        Ok(())
    }

    /// Drops every pass. Later frames do nothing.
    pub fn stop(&mut self) {
        log::info!("pipeline stopped after {} ticks", self.tick);
        self.passes.clear();
        self.states.clear();
        self.sized.clear();
        self.running = false;
    }

    /// Records a click at `uv` (origin top-left) for the mirror ripples.
    pub fn click(&mut self, uv: Vec2, real_time: f64) {
        self.clicks.push(Click { uv, time: real_time });
    }

    pub fn clicks(&self) -> &ClickRing {
        &self.clicks
    }

    /// Attaches the latest camera frame for the mirror effect.
    pub fn set_camera_frame(&mut self, frame: Option<Surface<Vec3>>) {
        self.camera = frame;
    }

    /// Moves every pass that is not yet ready one step through its lifecycle.
    fn advance_lifecycle(&mut self) {
        for (i, pass) in self.passes.iter_mut().enumerate() {
            let state = self.states[i];
            if !matches!(state, PassState::Uninitialized | PassState::Loading) {
                continue;
            }
            match pass.poll_ready() {
                Poll::Pending => {
                    if state == PassState::Uninitialized {
                        log::debug!("pass `{}` loading", pass.name());
                    }
                    self.states[i] = PassState::Loading;
                }
                Poll::Ready(Ok(())) => {
                    pass.set_size(self.render_size);
                    self.sized[i] = true;
                    self.states[i] = PassState::Ready;
                    log::debug!("pass `{}` ready", pass.name());
                }
                Poll::Ready(Err(e)) => {
                    log::error!("pass `{}` failed to load: {e}; skipping it", pass.name());
                    self.states[i] = PassState::Failed;
                }
            }
        }
    }

    /// Which passes have a reader downstream. The last pass always does.
    fn consumed(&self) -> Vec<bool> {
        let n = self.passes.len();
        let mut needed = vec![false; n];
        if let Some(last) = needed.last_mut() {
            *last = true;
        }
        for j in (0..n).rev() {
            if !needed[j] {
                continue;
            }
            match self.passes[j].reads() {
                None => needed[..j].fill(true),
                Some(inputs) => {
                    for (i, pass) in self.passes[..j].iter().enumerate() {
                        if inputs.contains(&pass.name()) {
                            needed[i] = true;
                        }
                    }
                }
            }
        }
        needed
    }

    /// Runs one frame.
    ///
    /// The tick advances by exactly one per call. With `should_render == false`
    /// the simulation advances but no image is produced. Passes whose output
    /// nothing downstream reads are run with `should_render == false` too.
    /// Returns whether a frame was rendered; see [`Pipeline::presentable`].
    pub fn frame(&mut self, real_time: f64, should_render: bool) -> Result<bool> {
        if !self.running {
            return Ok(false);
        }
        self.advance_lifecycle();
        let consumed = self.consumed();

        let frame = Frame {
            tick: self.tick,
            real_time,
            sim_time: real_time * self.config.animation_speed as f64,
            clicks: &self.clicks,
            camera: self.camera.as_ref(),
        };
        for i in 0..self.passes.len() {
            if !self.states[i].can_execute() {
                continue;
            }
            let (before, rest) = self.passes.split_at_mut(i);
            let pass = &mut rest[0];
            let upstream = Upstream::new(before, pass.name());
            match pass.execute(&frame, &upstream, should_render && consumed[i]) {
                Ok(()) => self.states[i] = PassState::Executing,
                Err(e) => {
                    log::error!("pass `{}` failed: {e}; skipping it", pass.name());
                    self.states[i] = PassState::Failed;
                }
            }
        }
        self.tick += 1;

        Ok(should_render)
    }
}
