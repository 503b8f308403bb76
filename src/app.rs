// src/app.rs
use crate::{
    config::{Config, EffectKind},
    data::Size,
    error::RainError,
    pipeline::{Backend, DisplaySurface, Pipeline},
    renderer::Renderer,
};
use anyhow::Result;
use clap::ValueEnum;
use glam::Vec2;
use std::{sync::Arc, time::Instant};
use winit::{
    event::{ElementState, MouseButton},
    keyboard::KeyCode,
    window::Window,
};

impl DisplaySurface for Window {
    fn pixel_size(&self) -> Size {
        let size = self.inner_size();
        Size::new(size.width, size.height)
    }
}

pub struct App {
    pub window: Arc<Window>,
    pub renderer: Renderer,
    pipeline: Pipeline,

    // Timing
    start: Instant,
    last_render: Option<f64>,

    // Input
    cursor: Vec2,
}

impl App {
    /// Opens the renderer and starts the pipeline on the GPU, or on the host
    /// when `on_host` is set.
    pub async fn new(window: Arc<Window>, config: Config, on_host: bool) -> Result<Self> {
        let render_size = window.pixel_size().scaled(config.resolution);
        let renderer = Renderer::new(window.clone(), render_size).await?;
        let backend = if on_host {
            Backend::Host
        } else {
            Backend::Gpu(renderer.gpu())
        };
        let pipeline = Pipeline::start_on(&*window, config, backend)?;
        Ok(Self {
            window,
            renderer,
            pipeline,
            start: Instant::now(),
            last_render: None,
            cursor: Vec2::ZERO,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.renderer.resize(new_size);
        self.pipeline.resize(new_size.width, new_size.height);
    }

    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Advances the pipeline by one tick and presents a frame if the FPS cap allows.
    pub fn redraw(&mut self) -> Result<(), RainError> {
        let now = self.now();
        let interval = 1.0 / self.pipeline.config().fps as f64;
        let should_render = self.last_render.map_or(true, |t| now - t >= interval);
        if should_render {
            self.last_render = Some(now);
        }
        if self.pipeline.frame(now, should_render)? {
            self.renderer.render(self.pipeline.presentable())?;
        }
        Ok(())
    }

    pub fn handle_cursor(&mut self, position: (f64, f64)) {
        self.cursor = Vec2::new(position.0 as f32, position.1 as f32);
    }

    pub fn handle_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        if button != MouseButton::Left || state != ElementState::Pressed {
            return;
        }
        let size = self.window.pixel_size();
        if size.is_empty() {
            return;
        }
        let uv = self.cursor / Vec2::new(size.width as f32, size.height as f32);
        let now = self.now();
        self.pipeline.click(uv, now);
    }

    /// Number keys pick an effect; `R` restarts the pipeline.
    pub fn handle_key(&mut self, key: KeyCode) {
        let digit = match key {
            KeyCode::Digit1 => Some(0),
            KeyCode::Digit2 => Some(1),
            KeyCode::Digit3 => Some(2),
            KeyCode::Digit4 => Some(3),
            KeyCode::Digit5 => Some(4),
            KeyCode::Digit6 => Some(5),
            KeyCode::Digit7 => Some(6),
            KeyCode::Digit8 => Some(7),
            _ => None,
        };
        if let Some(kind) = digit.and_then(|i| EffectKind::value_variants().get(i)) {
            if let Err(e) = self.pipeline.set_effect(*kind) {
                log::warn!("cannot switch to {kind}: {e}");
            }
            return;
        }
        if key == KeyCode::KeyR {
            let config = Config::clone(self.pipeline.config());
            match self.pipeline.restart(config) {
                Ok(()) => {
                    self.start = Instant::now();
                    self.last_render = None;
                }
                Err(e) => log::error!("restart failed: {e}"),
            }
        }
    }
}
