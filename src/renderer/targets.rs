// src/renderer/targets.rs
//! Render targets: host image conversion and the ping-pong pair that holds
//! GPU simulation state.

use super::gpu::{Gpu, GpuImage, STATE_FORMAT};
use crate::data::{Size, Surface};
use glam::Vec3;
use rayon::prelude::*;

/// Converts an image to RGBA8, clamping to the displayable range. Non-finite
/// texels become black.
pub fn to_rgba8(image: &Surface<Vec3>) -> Vec<u8> {
    let mut bytes = vec![0u8; image.data().len() * 4];
    bytes
        .par_chunks_mut(4)
        .zip(image.data().par_iter())
        .for_each(|(px, c)| {
            let channel = |v: f32| {
                if v.is_finite() {
                    (v.clamp(0.0, 1.0) * 255.0).round() as u8
                } else {
                    0
                }
            };
            px.copy_from_slice(&[channel(c.x), channel(c.y), channel(c.z), 255]);
        });
    bytes
}

/// Two state textures that alternate between read and write by tick parity.
///
/// Tick `t` writes `halves[t % 2]` and reads `halves[(t + 1) % 2]`, the same
/// rule as [`crate::data::DoubleBuffer`].
pub struct PingPong {
    halves: [GpuImage; 2],
    label: &'static str,
}

impl PingPong {
    pub fn new(gpu: &Gpu, size: Size, label: &'static str) -> Self {
        Self {
            halves: [
                GpuImage::new(gpu, size, STATE_FORMAT, label),
                GpuImage::new(gpu, size, STATE_FORMAT, label),
            ],
            label,
        }
    }

    pub fn size(&self) -> Size {
        self.halves[0].size()
    }

    /// Reallocates both halves. Returns false, touching nothing, if the size
    /// is unchanged.
    pub fn resize(&mut self, gpu: &Gpu, size: Size) -> bool {
        if self.size() == size {
            return false;
        }
        *self = Self::new(gpu, size, self.label);
        true
    }

    /// The half `tick` writes into.
    pub fn back(&self, tick: u64) -> &GpuImage {
        &self.halves[(tick % 2) as usize]
    }

    /// The half holding the last completed frame as seen from `tick`.
    pub fn front(&self, tick: u64) -> &GpuImage {
        &self.halves[((tick + 1) % 2) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba8_clamps_and_scrubs() {
        let mut image = Surface::filled(Size::new(2, 1), Vec3::new(0.5, 2.5, -1.0));
        image.set(1, 0, Vec3::new(f32::NAN, f32::INFINITY, 1.0));
        assert_eq!(to_rgba8(&image), vec![128, 255, 0, 255, 0, 0, 255, 255]);
    }

    #[test]
    fn test_ping_pong_alternates_and_resizes_once() {
        let Ok(gpu) = Gpu::headless() else {
            eprintln!("skipping GPU test: no adapter");
            return;
        };
        let mut state = PingPong::new(&gpu, Size::new(4, 3), "Test State");
        assert_eq!(state.back(0).id(), state.front(1).id());
        assert_ne!(state.back(0).id(), state.front(0).id());

        let before = state.back(0).id();
        assert!(!state.resize(&gpu, Size::new(4, 3)));
        assert_eq!(state.back(0).id(), before);
        assert!(state.resize(&gpu, Size::new(8, 6)));
        assert_ne!(state.back(0).id(), before);
        assert_eq!(state.size(), Size::new(8, 6));
    }
}
