// src/data/surface.rs
//! Owned 2D buffers: the CPU-side equivalent of a render target texture.

use super::types::Size;
use glam::Vec2;
use rayon::prelude::*;
use std::ops::{Add, Mul};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one allocation.
///
/// A new id is handed out every time a surface is allocated, so comparing ids
/// tells whether a buffer was reallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u64);

impl BufferId {
    pub(crate) fn next() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A row-major 2D buffer. Row 0 is the top row.
#[derive(Debug, Clone)]
pub struct Surface<T> {
    id: BufferId,
    size: Size,
    data: Vec<T>,
}

impl<T: Copy + Default> Surface<T> {
    pub fn new(size: Size) -> Self {
        Self::filled(size, T::default())
    }
}

impl<T: Copy> Surface<T> {
    pub fn filled(size: Size, value: T) -> Self {
        Self {
            id: BufferId::next(),
            size,
            data: vec![value; size.area()],
        }
    }

    /// Wraps existing row-major data.
    ///
    /// Returns `None` when the data length does not match the size.
    pub fn from_vec(size: Size, data: Vec<T>) -> Option<Self> {
        (data.len() == size.area()).then(|| Self {
            id: BufferId::next(),
            size,
            data,
        })
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> T {
        self.data[y as usize * self.size.width as usize + x as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: T) {
        let w = self.size.width as usize;
        self.data[y as usize * w + x as usize] = value;
    }

    /// Texel fetch with clamp-to-edge addressing.
    #[inline]
    pub fn get_clamped(&self, x: i64, y: i64) -> T {
        let x = x.clamp(0, self.size.width as i64 - 1) as u32;
        let y = y.clamp(0, self.size.height as i64 - 1) as u32;
        self.get(x, y)
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

impl<T: Copy + Send + Sync> Surface<T> {
    /// Runs `kernel(x, y, &mut texel)` for every texel, rows in parallel.
    pub fn par_for_each_mut<F>(&mut self, kernel: F)
    where
        F: Fn(u32, u32, &mut T) + Sync,
    {
        let w = self.size.width as usize;
        if w == 0 {
            return;
        }
        self.data
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, texel) in row.iter_mut().enumerate() {
                    kernel(x as u32, y as u32, texel);
                }
            });
    }
}

impl<T> Surface<T>
where
    T: Copy + Add<Output = T> + Mul<f32, Output = T>,
{
    /// Bilinear sample at normalized coordinates, texel centres at `(i + 0.5) / n`.
    pub fn sample(&self, uv: Vec2) -> T {
        let p = uv * Vec2::new(self.size.width as f32, self.size.height as f32) - 0.5;
        self.sample_texel(p)
    }

    /// Bilinear sample at a continuous texel coordinate (integer = texel centre).
    pub fn sample_texel(&self, p: Vec2) -> T {
        let base = p.floor();
        let t = p - base;
        let (x0, y0) = (base.x as i64, base.y as i64);
        let a = self.get_clamped(x0, y0);
        let b = self.get_clamped(x0 + 1, y0);
        let c = self.get_clamped(x0, y0 + 1);
        let d = self.get_clamped(x0 + 1, y0 + 1);
        let top = a * (1.0 - t.x) + b * t.x;
        let bottom = c * (1.0 - t.x) + d * t.x;
        top * (1.0 - t.y) + bottom * t.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_ids_are_unique() {
        let a: Surface<f32> = Surface::new(Size::new(2, 2));
        let b: Surface<f32> = Surface::new(Size::new(2, 2));
        assert_ne!(a.id(), b.id());
        let c = a.clone();
        assert_eq!(a.id(), c.id());
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(Surface::from_vec(Size::new(2, 2), vec![0.0f32; 3]).is_none());
        assert!(Surface::from_vec(Size::new(2, 2), vec![0.0f32; 4]).is_some());
    }

    #[test]
    fn test_par_for_each_visits_every_texel() {
        let mut s: Surface<u32> = Surface::new(Size::new(7, 5));
        s.par_for_each_mut(|x, y, v| *v = y * 100 + x);
        assert_eq!(s.get(0, 0), 0);
        assert_eq!(s.get(6, 4), 406);
        assert_eq!(s.get(3, 2), 203);
    }

    #[test]
    fn test_sample_hits_texel_centres() {
        let s = Surface::from_vec(Size::new(2, 1), vec![0.0f32, 1.0]).unwrap();
        assert_eq!(s.sample(Vec2::new(0.25, 0.5)), 0.0);
        assert_eq!(s.sample(Vec2::new(0.75, 0.5)), 1.0);
        assert!((s.sample(Vec2::new(0.5, 0.5)) - 0.5).abs() < 1e-6);
        // Clamp to edge outside the texture.
        assert_eq!(s.sample(Vec2::new(-1.0, 0.5)), 0.0);
        assert_eq!(s.sample(Vec2::new(2.0, 0.5)), 1.0);
    }

    #[test]
    fn test_sample_vec3() {
        let s = Surface::from_vec(Size::new(1, 2), vec![Vec3::ZERO, Vec3::ONE]).unwrap();
        let mid = s.sample(Vec2::new(0.5, 0.5));
        assert!((mid - Vec3::splat(0.5)).abs().max_element() < 1e-6);
    }
}
