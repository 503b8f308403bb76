// src/renderer/mod.rs
//! Presents composited frames. Owns the GPU context, the host upload texture
//! and the blit pipeline. The rain passes themselves live in [`passes`].

pub mod context;
pub mod gpu;
pub mod passes;
pub mod pipelines;
pub mod targets;

use self::{
    context::GpuContext,
    gpu::{Gpu, GpuImage, UPLOAD_FORMAT},
    pipelines::{base::PostPass, present::PresentPass},
};
use crate::data::{BufferId, Size};
use crate::error::RainError;
use crate::pipeline::Output;
use std::sync::Arc;
use winit::window::Window;

pub struct Renderer {
    pub context: GpuContext,
    /// Receives host-composited frames.
    upload: GpuImage,
    /// The texture the blit currently reads.
    bound: BufferId,
    present: PresentPass,
}

impl Renderer {
    pub async fn new(window: Arc<Window>, render_size: Size) -> anyhow::Result<Self> {
        let context = GpuContext::new(window).await?;
        let upload = GpuImage::new(&context.gpu, render_size, UPLOAD_FORMAT, "Host Frame");
        let present = PresentPass::new(&context.gpu.device, context.surface_format, upload.view());
        Ok(Self {
            bound: upload.id(),
            context,
            upload,
            present,
        })
    }

    /// The device every GPU pass must be created on.
    pub fn gpu(&self) -> Arc<Gpu> {
        self.context.gpu.clone()
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        self.context.resize(new_size);
    }

    /// Draws a pipeline output to the window. Host images are uploaded first;
    /// GPU textures are blitted in place.
    ///
    /// A lost or outdated surface is reconfigured and the frame dropped. Only
    /// an out-of-memory device is reported, as [`RainError::RendererLost`].
    pub fn render(&mut self, output: Output<'_>) -> Result<(), RainError> {
        let gpu = self.context.gpu.clone();
        let source = match output {
            Output::Image(image) => {
                if self.upload.size() != image.size() {
                    log::debug!("upload texture {}x{}", image.width(), image.height());
                    self.upload = GpuImage::new(&gpu, image.size(), UPLOAD_FORMAT, "Host Frame");
                }
                self.upload.upload(&gpu, image);
                &self.upload
            }
            Output::Texture(texture) => texture,
            Output::Raindrops(_) | Output::Symbols(_) | Output::Alias(_) => {
                return Err(RainError::RendererLost("output is not an image".into()));
            }
        };
        if source.id() != self.bound {
            self.present.set_input(&gpu.device, source.view());
            self.bound = source.id();
        }

        let output = match self.context.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost; reconfiguring");
                self.context.reconfigure();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("surface timeout; dropping frame");
                return Ok(());
            }
            Err(e) => {
                return Err(RainError::RendererLost(e.to_string()));
            }
        };
        let swap_view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = gpu.encoder("Frame Encoder");
        self.present.draw(&mut encoder, &swap_view);
        gpu.submit(encoder);
        output.present();
        Ok(())
    }
}
