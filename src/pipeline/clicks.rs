// src/pipeline/clicks.rs
//! Fixed-size history of pointer clicks, used by the mirror effect's ripples.

use glam::Vec2;

pub const MAX_CLICKS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Click {
    /// Normalized position, origin top-left.
    pub uv: Vec2,
    /// `Frame::real_time` at the click.
    pub time: f64,
}

/// Circular buffer of the last [`MAX_CLICKS`] clicks. The oldest is overwritten.
#[derive(Debug, Clone, Default)]
pub struct ClickRing {
    slots: [Option<Click>; MAX_CLICKS],
    next: usize,
}

impl ClickRing {
    pub fn push(&mut self, click: Click) {
        self.slots[self.next] = Some(click);
        self.next = (self.next + 1) % MAX_CLICKS;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Click> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_keeps_latest() {
        let mut ring = ClickRing::default();
        assert!(ring.is_empty());
        for i in 0..7 {
            ring.push(Click {
                uv: Vec2::ZERO,
                time: i as f64,
            });
        }
        assert_eq!(ring.len(), MAX_CLICKS);
        let mut times: Vec<f64> = ring.iter().map(|c| c.time).collect();
        times.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(times, vec![2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
