// src/data/double_buffer.rs
//! Ping-pong state storage.
//!
//! Two equally sized surfaces alternate between "read from" and "write to".
//! Which half plays which role is a pure function of the frame tick, never a
//! stored pointer, so there is nothing to forget to swap.

use super::{surface::Surface, types::Size};
use crate::error::{RainError, Result};

pub struct DoubleBuffer<T> {
    halves: [Surface<T>; 2],
}

impl<T: Copy + Default> DoubleBuffer<T> {
    pub fn new(size: Size) -> Self {
        Self {
            halves: [Surface::new(size), Surface::new(size)],
        }
    }

    /// Reallocates both halves to `size`.
    ///
    /// Returns `false` without touching either half when the size is unchanged.
    pub fn resize(&mut self, size: Size) -> bool {
        if self.size() == size {
            return false;
        }
        self.halves = [Surface::new(size), Surface::new(size)];
        true
    }
}

impl<T: Copy> DoubleBuffer<T> {
    /// Builds a buffer from two existing surfaces. They must match in size.
    pub fn from_pair(a: Surface<T>, b: Surface<T>) -> Result<Self> {
        if a.size() != b.size() {
            return Err(RainError::BufferMismatch {
                front: (a.width(), a.height()),
                back: (b.width(), b.height()),
            });
        }
        Ok(Self { halves: [a, b] })
    }

    pub fn size(&self) -> Size {
        self.halves[0].size()
    }

    #[inline]
    fn back_index(tick: u64) -> usize {
        (tick % 2) as usize
    }

    #[inline]
    fn front_index(tick: u64) -> usize {
        ((tick + 1) % 2) as usize
    }

    /// The half holding the last completed frame as seen from `tick`.
    pub fn front(&self, tick: u64) -> &Surface<T> {
        &self.halves[Self::front_index(tick)]
    }

    /// The half that `tick` writes into.
    pub fn back(&self, tick: u64) -> &Surface<T> {
        &self.halves[Self::back_index(tick)]
    }

    /// Read view of the front half and write view of the back half for `tick`.
    pub fn split(&mut self, tick: u64) -> (&Surface<T>, &mut Surface<T>) {
        let [even, odd] = &mut self.halves;
        if Self::back_index(tick) == 0 {
            (&*odd, even)
        } else {
            (&*even, odd)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_front_is_previous_back() {
        let buf: DoubleBuffer<f32> = DoubleBuffer::new(Size::new(4, 4));
        for t in 1..10u64 {
            assert_eq!(buf.front(t).id(), buf.back(t - 1).id());
            assert_ne!(buf.front(t).id(), buf.back(t).id());
        }
    }

    #[test]
    fn test_split_matches_accessors() {
        let mut buf: DoubleBuffer<f32> = DoubleBuffer::new(Size::new(2, 2));
        for t in 0..4u64 {
            let front_id = buf.front(t).id();
            let back_id = buf.back(t).id();
            let (front, back) = buf.split(t);
            assert_eq!(front.id(), front_id);
            assert_eq!(back.id(), back_id);
        }
    }

    #[test]
    fn test_written_value_visible_next_tick() {
        let mut buf: DoubleBuffer<u32> = DoubleBuffer::new(Size::new(1, 1));
        for t in 0..6u64 {
            let (front, back) = buf.split(t);
            let prev = front.get(0, 0);
            back.set(0, 0, prev + 1);
        }
        assert_eq!(buf.front(6).get(0, 0), 6);
    }

    #[test]
    fn test_resize_is_idempotent() {
        let mut buf: DoubleBuffer<f32> = DoubleBuffer::new(Size::new(3, 3));
        let ids = (buf.front(0).id(), buf.back(0).id());
        assert!(!buf.resize(Size::new(3, 3)));
        assert_eq!((buf.front(0).id(), buf.back(0).id()), ids);
        assert!(buf.resize(Size::new(5, 3)));
        assert_eq!(buf.front(0).size(), Size::new(5, 3));
        assert_eq!(buf.back(0).size(), Size::new(5, 3));
        assert_ne!(buf.front(0).id(), ids.0);
    }

    #[test]
    fn test_mismatched_pair_fails() {
        let a: Surface<f32> = Surface::new(Size::new(2, 2));
        let b: Surface<f32> = Surface::new(Size::new(2, 3));
        assert!(matches!(
            DoubleBuffer::from_pair(a, b),
            Err(RainError::BufferMismatch { .. })
        ));
    }
}
