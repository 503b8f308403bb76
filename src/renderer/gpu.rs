// src/renderer/gpu.rs
//! The shared device handle and the textures the GPU passes read and write.

use crate::data::{BufferId, Size, Surface};
use crate::error::{RainError, Result};
use anyhow::anyhow;
use glam::{Vec3, Vec4};
use std::sync::{mpsc, Arc};

/// Format of simulation state and of every intermediate image.
///
/// 32-bit float is not filterable, so shaders read it with `textureLoad`
/// and interpolate by hand.
pub const STATE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
/// Format of uploaded colour images (atlases, overlays, camera frames).
pub const UPLOAD_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Device and queue, shared by the window context and every GPU pass.
pub struct Gpu {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl Gpu {
    /// Limits for the rain passes: WebGPU defaults, with the texture size
    /// raised to whatever the adapter allows so large windows still fit.
    fn required_limits(adapter: &wgpu::Adapter) -> wgpu::Limits {
        wgpu::Limits::default().using_resolution(adapter.limits())
    }

    /// Picks an adapter (compatible with `surface` if given) and opens a device on it.
    pub async fn request(
        instance: &wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
    ) -> anyhow::Result<(wgpu::Adapter, Arc<Gpu>)> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("Failed to find a suitable GPU adapter."))?;
        log::info!("adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Rain Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: Self::required_limits(&adapter),
                },
                None, // Trace path
            )
            .await?;
        device.on_uncaptured_error(Box::new(|e| log::error!("wgpu: {e}")));

        Ok((
            adapter,
            Arc::new(Self { device, queue }),
        ))
    }

    /// A device with no window attached.
    pub fn headless() -> anyhow::Result<Arc<Gpu>> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let (_, gpu) = pollster::block_on(Self::request(&instance, None))?;
        Ok(gpu)
    }

    pub fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    pub fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

/// One texture plus its default view.
///
/// Like a [`Surface`], every allocation gets a fresh [`BufferId`].
pub struct GpuImage {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: Size,
    id: BufferId,
}

impl GpuImage {
    /// Allocates a texture. Empty sizes get a 1x1 texture but keep reporting
    /// the empty size.
    pub fn new(gpu: &Gpu, size: Size, format: wgpu::TextureFormat, label: &str) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            size,
            id: BufferId::next(),
        }
    }

    /// Allocates an [`UPLOAD_FORMAT`] texture holding `image`.
    pub fn from_surface(gpu: &Gpu, image: &Surface<Vec3>, label: &str) -> Self {
        let texture = Self::new(gpu, image.size(), UPLOAD_FORMAT, label);
        texture.upload(gpu, image);
        texture
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }

    /// Writes `image` into an [`UPLOAD_FORMAT`] texture of the same size.
    pub fn upload(&self, gpu: &Gpu, image: &Surface<Vec3>) {
        if image.size() != self.size || self.size.is_empty() || self.format() != UPLOAD_FORMAT {
            log::warn!(
                "skipping upload: image {}x{} vs texture {}x{} {:?}",
                image.width(),
                image.height(),
                self.size.width,
                self.size.height,
                self.format()
            );
            return;
        }
        gpu.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &super::targets::to_rgba8(image),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.size.width * 4),
                rows_per_image: Some(self.size.height),
            },
            extent(self.size),
        );
    }

    /// Copies a [`STATE_FORMAT`] texture back to the host. Blocks until the
    /// GPU is done.
    pub fn read_back(&self, gpu: &Gpu) -> Result<Vec<Vec4>> {
        if self.format() != STATE_FORMAT {
            return Err(RainError::RendererLost(format!(
                "cannot read back {:?}",
                self.format()
            )));
        }
        if self.size.is_empty() {
            return Ok(Vec::new());
        }
        let (width, height) = (self.size.width, self.size.height);
        let texel_bytes = 16;
        let bytes_per_row = (width * texel_bytes + 255) & !255;
        let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (bytes_per_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = gpu.encoder("Readback Encoder");
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            extent(self.size),
        );
        gpu.submit(encoder);

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| RainError::RendererLost(e.to_string()))?
            .map_err(|e| RainError::RendererLost(e.to_string()))?;

        let data = slice.get_mapped_range();
        let mut texels = Vec::with_capacity(self.size.area());
        for row in 0..height {
            let start = (row * bytes_per_row) as usize;
            let end = start + (width * texel_bytes) as usize;
            texels.extend(data[start..end].chunks_exact(16).map(|px| {
                let channel = |i: usize| {
                    f32::from_le_bytes([px[4 * i], px[4 * i + 1], px[4 * i + 2], px[4 * i + 3]])
                };
                Vec4::new(channel(0), channel(1), channel(2), channel(3))
            }));
        }
        drop(data);
        staging.unmap();
        Ok(texels)
    }

    /// Reads back an image pass output as RGB.
    pub fn read_rgb(&self, gpu: &Gpu) -> Result<Surface<Vec3>> {
        let texels = self.read_back(gpu)?.into_iter().map(|t| t.truncate()).collect();
        Surface::from_vec(self.size, texels)
            .ok_or_else(|| RainError::RendererLost("readback size mismatch".into()))
    }
}

fn extent(size: Size) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.width.max(1),
        height: size.height.max(1),
        depth_or_array_layers: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_device_reads_back_state() {
        let Ok(gpu) = Gpu::headless() else {
            eprintln!("skipping GPU test: no adapter");
            return;
        };
        assert!(gpu.device.limits().max_texture_dimension_2d >= wgpu::Limits::default().max_texture_dimension_2d);

        // Rows narrower than the copy alignment still come back unpadded.
        let state = GpuImage::new(&gpu, Size::new(3, 2), STATE_FORMAT, "State");
        let texels = state.read_back(&gpu).unwrap();
        assert_eq!(texels.len(), 6);
        assert!(texels.iter().all(|t| *t == Vec4::ZERO));

        let image = Surface::filled(Size::new(2, 2), Vec3::ONE);
        let upload = GpuImage::from_surface(&gpu, &image, "Upload");
        assert!(upload.read_back(&gpu).is_err());
        assert_ne!(upload.id(), state.id());
    }
}
