// src/renderer/passes/raindrops.rs
//! Raindrop simulation on the GPU.

use crate::config::Config;
use crate::data::Size;
use crate::error::Result;
use crate::pipeline::raindrop::{RaindropRule, RAINDROPS};
use crate::pipeline::{Frame, Output, Pass, Upstream};
use crate::renderer::gpu::{Gpu, STATE_FORMAT};
use crate::renderer::pipelines::base::{ShaderPass, Slot};
use crate::renderer::targets::PingPong;
use bytemuck::{Pod, Zeroable};
use std::sync::Arc;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct UboRain {
    sim_time: f32,
    fall_speed: f32,
    raindrop_length: f32,
    brightness_decay: f32,
    loops: u32,
    volumetric: u32,
    first: u32,
    rows: u32,
}

pub struct GpuRaindropPass {
    gpu: Arc<Gpu>,
    rule: RaindropRule,
    num_columns: u32,
    glyph_height_to_width: f32,
    kernel: ShaderPass<UboRain>,
    state: PingPong,
    last_tick: Option<u64>,
}

impl GpuRaindropPass {
    pub fn new(gpu: Arc<Gpu>, cfg: &Config) -> Self {
        let kernel = ShaderPass::new(
            &gpu.device,
            "Raindrops",
            include_str!("../../../shaders/raindrops.wgsl"),
            &[Slot::Texture],
            STATE_FORMAT,
        );
        let state = PingPong::new(&gpu, Size::default(), "Raindrop State");
        Self {
            gpu,
            rule: RaindropRule::from_config(cfg),
            num_columns: cfg.num_columns,
            glyph_height_to_width: cfg.glyph_height_to_width,
            kernel,
            state,
            last_tick: None,
        }
    }
}

impl Pass for GpuRaindropPass {
    fn name(&self) -> &'static str {
        "raindrops"
    }

    fn set_size(&mut self, size: Size) {
        let grid = size.grid_for_viewport(self.num_columns, self.glyph_height_to_width);
        if self.state.resize(&self.gpu, grid) {
            log::debug!("raindrop grid {}x{}", grid.width, grid.height);
            self.last_tick = None;
        }
    }

    fn execute(&mut self, frame: &Frame<'_>, _upstream: &Upstream<'_>, _should_render: bool) -> Result<()> {
        let grid = self.state.size();
        if grid.is_empty() {
            return Ok(());
        }
        let rule = &self.rule;
        let params = UboRain {
            sim_time: rule.shader_time(frame.sim_time),
            fall_speed: rule.fall_speed as f32,
            raindrop_length: rule.raindrop_length as f32,
            brightness_decay: rule.brightness_decay,
            loops: rule.loops as u32,
            volumetric: rule.volumetric as u32,
            first: self.last_tick.is_none() as u32,
            rows: grid.height,
        };
        let prev = self.state.front(frame.tick);
        let next = self.state.back(frame.tick);
        let mut encoder = self.gpu.encoder("Raindrop Encoder");
        self.kernel.draw(
            &self.gpu,
            &mut encoder,
            next.view(),
            &[wgpu::BindingResource::TextureView(prev.view())],
            &params,
        );
        self.gpu.submit(encoder);
        self.last_tick = Some(frame.tick);
        Ok(())
    }

    fn output(&self, name: &str) -> Option<Output<'_>> {
        let completed = self.last_tick.map_or(0, |t| t + 1);
        (name == RAINDROPS).then(|| Output::Texture(self.state.front(completed)))
    }

    fn reads(&self) -> Option<&'static [&'static str]> {
        Some(&[])
    }
}
