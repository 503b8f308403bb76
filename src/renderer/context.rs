// src/renderer/context.rs
//! The window surface and the device it presents with.

use super::gpu::Gpu;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use winit::window::Window;

pub struct GpuContext {
    pub surface: wgpu::Surface<'static>,
    /// Shared with every GPU pass, so pass textures can be presented directly.
    pub gpu: Arc<Gpu>,
    pub config: wgpu::SurfaceConfiguration,
    pub size: winit::dpi::PhysicalSize<u32>,
    pub surface_format: wgpu::TextureFormat,
}

impl GpuContext {
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        // The surface needs to live as long as the window that created it.
        let surface = instance.create_surface(window.clone())?;
        let (adapter, gpu) = Gpu::request(&instance, Some(&surface)).await?;
        let limit = gpu.device.limits().max_texture_dimension_2d;
        log::debug!("max texture dimension {limit}");

        // Composited colours are already display values; an sRGB target would
        // encode them a second time.
        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| anyhow!("Surface reports no supported formats."))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.clamp(1, limit),
            height: size.height.clamp(1, limit),
            present_mode: wgpu::PresentMode::Fifo, // Vsync
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);

        Ok(Self {
            surface,
            gpu,
            config,
            size,
            surface_format,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            let limit = self.gpu.device.limits().max_texture_dimension_2d;
            self.size = new_size;
            self.config.width = new_size.width.min(limit);
            self.config.height = new_size.height.min(limit);
            self.surface.configure(&self.gpu.device, &self.config);
        }
    }

    /// Reconfigures the surface at its current size, after it was lost or outdated.
    pub fn reconfigure(&mut self) {
        self.resize(self.size);
    }
}
