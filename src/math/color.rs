// src/math/color.rs
//! Colour space conversion.

use glam::Vec3;

/// Converts HSL (all components in `[0, 1]`, hue wraps) to RGB.
pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> Vec3 {
    let h = h.rem_euclid(1.0);
    let s = s.clamp(0.0, 1.0);
    let l = l.clamp(0.0, 1.0);
    let channel = |n: f32| {
        let k = (n + h * 12.0).rem_euclid(12.0);
        let a = s * l.min(1.0 - l);
        l - a * (k - 3.0).min(9.0 - k).clamp(-1.0, 1.0)
    };
    Vec3::new(channel(0.0), channel(8.0), channel(4.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 1e-5
    }

    #[test]
    fn test_primaries() {
        assert!(close(hsl_to_rgb(0.0, 1.0, 0.5), Vec3::new(1.0, 0.0, 0.0)));
        assert!(close(hsl_to_rgb(1.0 / 3.0, 1.0, 0.5), Vec3::new(0.0, 1.0, 0.0)));
        assert!(close(hsl_to_rgb(2.0 / 3.0, 1.0, 0.5), Vec3::new(0.0, 0.0, 1.0)));
    }

    #[test]
    fn test_greys() {
        assert!(close(hsl_to_rgb(0.3, 0.9, 0.0), Vec3::ZERO));
        assert!(close(hsl_to_rgb(0.3, 0.9, 1.0), Vec3::ONE));
        assert!(close(hsl_to_rgb(0.7, 0.0, 0.5), Vec3::splat(0.5)));
    }
}
