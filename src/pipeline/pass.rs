// src/pipeline/pass.rs
//! The uniform contract every pipeline stage implements.

use super::clicks::ClickRing;
use crate::data::{RaindropCell, Size, Surface, SymbolCell};
use crate::error::{RainError, Result};
use crate::renderer::gpu::GpuImage;
use glam::Vec3;
use std::task::Poll;

/// Per-frame inputs, computed once by the orchestrator before any pass runs.
pub struct Frame<'a> {
    /// Strictly increasing by one per frame, rendered or not.
    pub tick: u64,
    /// Wall-clock seconds since the pipeline started.
    pub real_time: f64,
    /// `real_time * animationSpeed`.
    pub sim_time: f64,
    pub clicks: &'a ClickRing,
    /// Latest externally supplied camera frame, if any.
    pub camera: Option<&'a Surface<Vec3>>,
}

/// A named output a pass exposes to the passes after it.
#[derive(Clone, Copy)]
pub enum Output<'a> {
    Raindrops(&'a Surface<RaindropCell>),
    Symbols(&'a Surface<SymbolCell>),
    Image(&'a Surface<Vec3>),
    /// GPU-resident state or image. State texels pack a cell as
    /// `(phase, brightness, cursor, reset)` or `(symbol, age, 0, 0)`.
    Texture(&'a GpuImage),
    /// This output is the upstream output with the given name, unchanged.
    Alias(&'static str),
}

/// One stage of the pipeline.
///
/// Passes own their buffers. The orchestrator owns the passes and calls them
/// in order: `poll_ready` until it resolves, then `set_size` with the latest
/// size, then `execute` once per frame.
pub trait Pass: Send {
    fn name(&self) -> &'static str;

    /// Resolves once the pass's resources are available. Must not block.
    fn poll_ready(&mut self) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    /// Reallocates owned buffers for a new output size.
    ///
    /// Calling it again with the same size must not reallocate anything.
    fn set_size(&mut self, size: Size);

    /// Advances the pass by one frame.
    ///
    /// With `should_render == false` the pass must not produce new visible
    /// output; simulation passes still advance their state.
    fn execute(&mut self, frame: &Frame<'_>, upstream: &Upstream<'_>, should_render: bool) -> Result<()>;

    /// Looks up one of this pass's declared outputs.
    fn output(&self, name: &str) -> Option<Output<'_>>;

    /// Upstream outputs `execute` reads. `None` means it may read any of them.
    ///
    /// The orchestrator skips rendering a pass whose output no later pass reads.
    fn reads(&self) -> Option<&'static [&'static str]> {
        None
    }
}

/// Read-only view of the passes that run before the current one.
pub struct Upstream<'a> {
    passes: &'a [Box<dyn Pass>],
    consumer: &'static str,
}

impl<'a> Upstream<'a> {
    pub fn new(passes: &'a [Box<dyn Pass>], consumer: &'static str) -> Self {
        Self { passes, consumer }
    }

    /// Finds the latest output called `name`, following aliases.
    pub fn find(&self, name: &'static str) -> Result<Output<'a>> {
        let passes: &'a [Box<dyn Pass>] = self.passes;
        let mut wanted = name;
        let mut end = passes.len();
        while end > 0 {
            let found = passes[..end]
                .iter()
                .enumerate()
                .rev()
                .find_map(|(i, p)| p.output(wanted).map(|o| (i, o)));
            match found {
                Some((i, Output::Alias(target))) => {
                    wanted = target;
                    end = i;
                }
                Some((_, out)) => return Ok(out),
                None => break,
            }
        }
        Err(self.missing(name))
    }

    pub fn raindrops(&self, name: &'static str) -> Result<&'a Surface<RaindropCell>> {
        match self.find(name)? {
            Output::Raindrops(s) => Ok(s),
            _ => Err(self.missing(name)),
        }
    }

    pub fn symbols(&self, name: &'static str) -> Result<&'a Surface<SymbolCell>> {
        match self.find(name)? {
            Output::Symbols(s) => Ok(s),
            _ => Err(self.missing(name)),
        }
    }

    pub fn image(&self, name: &'static str) -> Result<&'a Surface<Vec3>> {
        match self.find(name)? {
            Output::Image(s) => Ok(s),
            _ => Err(self.missing(name)),
        }
    }

    pub fn texture(&self, name: &'static str) -> Result<&'a GpuImage> {
        match self.find(name)? {
            Output::Texture(t) => Ok(t),
            _ => Err(self.missing(name)),
        }
    }

    fn missing(&self, input: &'static str) -> RainError {
        RainError::MissingInput {
            pass: self.consumer,
            input,
        }
    }
}

/// Lifecycle of a pass as tracked by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Uninitialized,
    Loading,
    Ready,
    Executing,
    Resized,
    /// Loading or execution failed; the pass is skipped from now on.
    Failed,
}

impl PassState {
    /// Whether `execute` may be called in this state.
    pub fn can_execute(self) -> bool {
        matches!(self, PassState::Ready | PassState::Executing | PassState::Resized)
    }
}
