// src/renderer/passes/symbols.rs
//! Symbol cycling on the GPU.

use crate::config::Config;
use crate::data::Size;
use crate::error::{RainError, Result};
use crate::math::seed_bits;
use crate::pipeline::raindrop::RAINDROPS;
use crate::pipeline::symbols::{SymbolRule, SYMBOLS};
use crate::pipeline::{Frame, Output, Pass, Upstream};
use crate::renderer::gpu::{Gpu, STATE_FORMAT};
use crate::renderer::pipelines::base::{ShaderPass, Slot};
use crate::renderer::targets::PingPong;
use bytemuck::{Pod, Zeroable};
use std::sync::Arc;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct UboSymbols {
    increment: f32,
    sequence_length: u32,
    seed: u32,
    advance: u32,
    loops: u32,
    first: u32,
    _pad: [u32; 2],
}

pub struct GpuSymbolPass {
    gpu: Arc<Gpu>,
    rule: SymbolRule,
    num_columns: u32,
    glyph_height_to_width: f32,
    kernel: ShaderPass<UboSymbols>,
    state: PingPong,
    last_tick: Option<u64>,
}

impl GpuSymbolPass {
    pub fn new(gpu: Arc<Gpu>, cfg: &Config, sequence_length: u32) -> Self {
        let kernel = ShaderPass::new(
            &gpu.device,
            "Symbols",
            include_str!("../../../shaders/symbols.wgsl"),
            &[Slot::Texture, Slot::Texture],
            STATE_FORMAT,
        );
        let state = PingPong::new(&gpu, Size::default(), "Symbol State");
        Self {
            gpu,
            rule: SymbolRule::new(cfg, sequence_length),
            num_columns: cfg.num_columns,
            glyph_height_to_width: cfg.glyph_height_to_width,
            kernel,
            state,
            last_tick: None,
        }
    }
}

impl Pass for GpuSymbolPass {
    fn name(&self) -> &'static str {
        "symbols"
    }

    fn set_size(&mut self, size: Size) {
        let grid = size.grid_for_viewport(self.num_columns, self.glyph_height_to_width);
        if self.state.resize(&self.gpu, grid) {
            self.last_tick = None;
        }
    }

    fn execute(&mut self, frame: &Frame<'_>, upstream: &Upstream<'_>, _should_render: bool) -> Result<()> {
        let raindrops = upstream.texture(RAINDROPS)?;
        let grid = self.state.size();
        if raindrops.size() != grid {
            return Err(RainError::BufferMismatch {
                front: (raindrops.size().width, raindrops.size().height),
                back: (grid.width, grid.height),
            });
        }
        if grid.is_empty() {
            return Ok(());
        }
        let rule = &self.rule;
        let params = UboSymbols {
            increment: rule.increment,
            sequence_length: rule.sequence_length,
            seed: seed_bits(frame.sim_time),
            advance: (frame.tick % rule.frame_skip as u64 == 0) as u32,
            loops: rule.loops as u32,
            first: self.last_tick.is_none() as u32,
            _pad: [0; 2],
        };
        let prev = self.state.front(frame.tick);
        let next = self.state.back(frame.tick);
        let mut encoder = self.gpu.encoder("Symbol Encoder");
        self.kernel.draw(
            &self.gpu,
            &mut encoder,
            next.view(),
            &[
                wgpu::BindingResource::TextureView(prev.view()),
                wgpu::BindingResource::TextureView(raindrops.view()),
            ],
            &params,
        );
        self.gpu.submit(encoder);
        self.last_tick = Some(frame.tick);
        Ok(())
    }

    fn output(&self, name: &str) -> Option<Output<'_>> {
        let completed = self.last_tick.map_or(0, |t| t + 1);
        (name == SYMBOLS).then(|| Output::Texture(self.state.front(completed)))
    }

    fn reads(&self) -> Option<&'static [&'static str]> {
        Some(&[RAINDROPS])
    }
}
