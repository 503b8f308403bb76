// src/pipeline/raindrop.rs
//! Raindrop simulation: one sawtooth per column, advanced once per tick.

use super::pass::{Frame, Output, Pass, Upstream};
use crate::config::Config;
use crate::data::{DoubleBuffer, RaindropCell, Size};
use crate::error::Result;
use crate::math::{fract, random_float};

pub const RAINDROPS: &str = "raindrops";

/// Rain-time units covered by one grid row.
const ROW_SPAN: f64 = 0.01;
/// Lowest brightness a cell can fall to, far behind a drop head.
const BRIGHTNESS_FLOOR: f32 = -1.0;
/// How much the farthest volumetric column slows down and dims.
const DEPTH_SLOWDOWN: f64 = 0.65;
const DEPTH_DIMMING: f32 = 0.6;
/// Non-periodic rain restarts after this many seconds of sim time on the GPU.
const SHADER_TIME_WRAP: f64 = 4096.0;
/// Largest f32 below 1.0.
const PHASE_MAX: f32 = 1.0 - f32::EPSILON / 2.0;

/// Irregular but monotonic time warp used when drops do not loop.
pub fn wobble(x: f64) -> f64 {
    x + 0.3 * (std::f64::consts::SQRT_2 * x).sin() + 0.2 * (5f64.sqrt() * x).sin()
}

/// The per-cell update rule. Pure: no field changes while the grid is simulated.
#[derive(Debug, Clone, Copy)]
pub struct RaindropRule {
    pub fall_speed: f64,
    pub raindrop_length: f64,
    pub brightness_decay: f32,
    pub loops: bool,
    pub volumetric: bool,
}

impl RaindropRule {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            fall_speed: cfg.fall_speed as f64,
            raindrop_length: cfg.raindrop_length as f64,
            brightness_decay: cfg.brightness_decay,
            loops: cfg.loops,
            volumetric: cfg.volumetric,
        }
    }

    /// Static depth of a column in `[0, 1)`; 0 unless volumetric.
    pub fn column_depth(&self, x: u32) -> f32 {
        if self.volumetric {
            random_float(x, 2, 0)
        } else {
            0.0
        }
    }

    /// Speed multiplier of a column. Exactly 1 in loop mode.
    pub fn column_speed(&self, x: u32) -> f64 {
        let base = if self.loops {
            1.0
        } else {
            0.5 + 0.5 * random_float(x, 1, 0) as f64
        };
        base * (1.0 - DEPTH_SLOWDOWN * self.column_depth(x) as f64)
    }

    /// Continuous rain time of a cell. Its fractional part is the sawtooth phase.
    ///
    /// `row` counts up from the bottom of the grid.
    pub fn rain_time(&self, x: u32, row: f64, sim_time: f64) -> f64 {
        let offset = random_float(x, 0, 0) as f64 * 1000.0;
        let column_time = offset + sim_time * self.fall_speed * self.column_speed(x);
        let t = (row * ROW_SPAN + column_time) / self.raindrop_length;
        if self.loops {
            t
        } else {
            wobble(t)
        }
    }

    /// Sim time needed for a looping column to complete one cycle.
    pub fn period(&self) -> f64 {
        self.raindrop_length / self.fall_speed
    }

    /// Sim time as handed to the GPU kernel.
    ///
    /// Whole periods are dropped when every column shares one period, which
    /// leaves the phases unchanged while keeping the value small enough for f32.
    pub fn shader_time(&self, sim_time: f64) -> f32 {
        let wrap = if self.loops && !self.volumetric {
            self.period() * (SHADER_TIME_WRAP / self.period()).ceil()
        } else {
            SHADER_TIME_WRAP
        };
        sim_time.rem_euclid(wrap) as f32
    }

    pub fn step(&self, x: u32, row: u32, sim_time: f64, prev: RaindropCell, first: bool) -> RaindropCell {
        let t = self.rain_time(x, row as f64, sim_time);
        let below = self.rain_time(x, row as f64 - 1.0, sim_time);
        let phase = fract(t);

        // Rows between this cell and the head below it.
        let rows_from_head = phase / (t - below).max(1e-9);
        let cursor = (1.0 - rows_from_head).clamp(0.0, 1.0) as f32;

        let value = 1.0 - phase;
        let dim = 1.0 - DEPTH_DIMMING * self.column_depth(x);
        let target = (((value * 1.25).ln() * 3.0) as f32).max(BRIGHTNESS_FLOOR) * dim;

        let phase = (phase as f32).min(PHASE_MAX);
        let reset = !first && phase < prev.phase;
        let brightness = if first || reset {
            target
        } else {
            prev.brightness + (target - prev.brightness) * self.brightness_decay
        };

        RaindropCell {
            phase,
            brightness,
            cursor,
            reset,
        }
    }
}

/// Owns the raindrop state and advances it every tick.
pub struct RaindropPass {
    rule: RaindropRule,
    num_columns: u32,
    glyph_height_to_width: f32,
    state: DoubleBuffer<RaindropCell>,
    last_tick: Option<u64>,
}

impl RaindropPass {
    pub fn new(cfg: &Config) -> Self {
        Self {
            rule: RaindropRule::from_config(cfg),
            num_columns: cfg.num_columns,
            glyph_height_to_width: cfg.glyph_height_to_width,
            state: DoubleBuffer::new(Size::new(0, 0)),
            last_tick: None,
        }
    }

    pub fn rule(&self) -> &RaindropRule {
        &self.rule
    }

    pub fn grid(&self) -> Size {
        self.state.size()
    }

    /// The last completed state.
    pub fn state(&self) -> &crate::data::Surface<RaindropCell> {
        let completed = self.last_tick.map_or(0, |t| t + 1);
        self.state.front(completed)
    }
}

impl Pass for RaindropPass {
    fn name(&self) -> &'static str {
        "raindrops"
    }

    fn set_size(&mut self, size: Size) {
        let grid = size.grid_for_viewport(self.num_columns, self.glyph_height_to_width);
        if self.state.resize(grid) {
            log::debug!("raindrop grid {}x{}", grid.width, grid.height);
            self.last_tick = None;
        }
    }

    fn execute(&mut self, frame: &Frame<'_>, _upstream: &Upstream<'_>, _should_render: bool) -> Result<()> {
        let first = self.last_tick.is_none();
        let rule = self.rule;
        let sim_time = frame.sim_time;
        let (prev, next) = self.state.split(frame.tick);
        let rows = next.height();
        next.par_for_each_mut(|x, y, cell| {
            *cell = rule.step(x, rows - 1 - y, sim_time, prev.get(x, y), first);
        });
        self.last_tick = Some(frame.tick);
        Ok(())
    }

    fn output(&self, name: &str) -> Option<Output<'_>> {
        (name == RAINDROPS).then(|| Output::Raindrops(self.state()))
    }

    fn reads(&self) -> Option<&'static [&'static str]> {
        Some(&[])
    }
}
