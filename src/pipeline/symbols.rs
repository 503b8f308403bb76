// src/pipeline/symbols.rs
//! Symbol cycling: which glyph each cell shows, and for how long.

use super::pass::{Frame, Output, Pass, Upstream};
use super::raindrop::RAINDROPS;
use crate::config::Config;
use crate::data::{DoubleBuffer, RaindropCell, Size, Surface, SymbolCell};
use crate::error::{RainError, Result};
use crate::math::hash::{hash3, to_unit};
use crate::math::{random_index, seed_bits};

pub const SYMBOLS: &str = "symbols";

const AGE_SALT: u32 = 0x9e37_79b9;

#[derive(Debug, Clone, Copy)]
pub struct SymbolRule {
    /// Age added on every non-skipped tick: `cycleSpeed * animationSpeed`.
    pub increment: f32,
    pub frame_skip: u32,
    pub loops: bool,
    pub sequence_length: u32,
}

impl SymbolRule {
    pub fn new(cfg: &Config, sequence_length: u32) -> Self {
        Self {
            increment: cfg.cycle_speed * cfg.animation_speed,
            frame_skip: cfg.cycle_frame_skip.max(1),
            loops: cfg.loops,
            sequence_length: sequence_length.max(1),
        }
    }

    fn random_symbol(&self, x: u32, y: u32, seed: u32) -> u32 {
        random_index(x, y, seed, self.sequence_length)
    }

    fn random_age(x: u32, y: u32, seed: u32) -> f32 {
        to_unit(hash3(x, y, seed ^ AGE_SALT))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &self,
        x: u32,
        y: u32,
        tick: u64,
        sim_time: f64,
        prev: SymbolCell,
        raindrop: RaindropCell,
        first: bool,
    ) -> SymbolCell {
        let seed = seed_bits(sim_time);
        if first || (self.loops && raindrop.reset) {
            return SymbolCell {
                symbol: self.random_symbol(x, y, seed),
                age: Self::random_age(x, y, seed),
            };
        }

        let mut cell = prev;
        if tick % self.frame_skip as u64 == 0 {
            cell.age += self.increment;
        }
        if cell.age >= 1.0 {
            cell.age = cell.age.fract();
            cell.symbol = if self.sequence_length > 1 {
                // Draw from the other symbols so a swap is always visible.
                let r = random_index(x, y, seed, self.sequence_length - 1);
                (prev.symbol % self.sequence_length + 1 + r) % self.sequence_length
            } else {
                0
            };
        }
        cell
    }
}

/// Owns the symbol state. Runs after the raindrop pass within the same tick.
pub struct SymbolPass {
    rule: SymbolRule,
    num_columns: u32,
    glyph_height_to_width: f32,
    state: DoubleBuffer<SymbolCell>,
    last_tick: Option<u64>,
}

impl SymbolPass {
    pub fn new(cfg: &Config, sequence_length: u32) -> Self {
        Self {
            rule: SymbolRule::new(cfg, sequence_length),
            num_columns: cfg.num_columns,
            glyph_height_to_width: cfg.glyph_height_to_width,
            state: DoubleBuffer::new(Size::new(0, 0)),
            last_tick: None,
        }
    }

    pub fn state(&self) -> &Surface<SymbolCell> {
        let completed = self.last_tick.map_or(0, |t| t + 1);
        self.state.front(completed)
    }
}

impl Pass for SymbolPass {
    fn name(&self) -> &'static str {
        "symbols"
    }

    fn set_size(&mut self, size: Size) {
        let grid = size.grid_for_viewport(self.num_columns, self.glyph_height_to_width);
        if self.state.resize(grid) {
            self.last_tick = None;
        }
    }

    fn execute(&mut self, frame: &Frame<'_>, upstream: &Upstream<'_>, _should_render: bool) -> Result<()> {
        let raindrops = upstream.raindrops(RAINDROPS)?;
        if raindrops.size() != self.state.size() {
            return Err(RainError::BufferMismatch {
                front: (raindrops.width(), raindrops.height()),
                back: (self.state.size().width, self.state.size().height),
            });
        }
        let first = self.last_tick.is_none();
        let rule = self.rule;
        let (tick, sim_time) = (frame.tick, frame.sim_time);
        let (prev, next) = self.state.split(tick);
        next.par_for_each_mut(|x, y, cell| {
            *cell = rule.step(x, y, tick, sim_time, prev.get(x, y), raindrops.get(x, y), first);
        });
        self.last_tick = Some(tick);
        Ok(())
    }

    fn output(&self, name: &str) -> Option<Output<'_>> {
        (name == SYMBOLS).then(|| Output::Symbols(self.state()))
    }

    fn reads(&self) -> Option<&'static [&'static str]> {
        Some(&[RAINDROPS])
    }
}
