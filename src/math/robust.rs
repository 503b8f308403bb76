// src/math/robust.rs
//! Numeric helpers that must never let NaN or Inf escape into later stages.

use glam::Vec3;

/// Median of three values.
///
/// Used to turn a multi-channel distance sample into a single signed distance.
/// At glyph corners the three channels disagree and the median picks the value
/// that keeps the corner sharp.
#[inline]
pub fn median3(a: f32, b: f32, c: f32) -> f32 {
    a.min(b).max(a.max(b).min(c))
}

/// Fractional part in `[0, 1)`, also for negative inputs.
#[inline]
pub fn fract(x: f64) -> f64 {
    let f = x - x.floor();
    // `x - floor(x)` rounds up to 1.0 for tiny negative x.
    if f >= 1.0 {
        0.0
    } else {
        f
    }
}

/// Replaces a colour that has any non-finite channel with black.
#[inline]
pub fn finite_rgb(v: Vec3) -> Vec3 {
    if v.is_finite() {
        v
    } else {
        Vec3::ZERO
    }
}

/// Clamps each channel to `[0, 1]`.
#[inline]
pub fn saturate(v: Vec3) -> Vec3 {
    v.clamp(Vec3::ZERO, Vec3::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median3_orders() {
        assert_eq!(median3(1.0, 2.0, 3.0), 2.0);
        assert_eq!(median3(3.0, 1.0, 2.0), 2.0);
        assert_eq!(median3(2.0, 3.0, 1.0), 2.0);
        assert_eq!(median3(0.5, 0.5, 0.9), 0.5);
    }

    #[test]
    fn test_fract_negative() {
        assert!((fract(-0.25) - 0.75).abs() < 1e-12);
        assert_eq!(fract(3.0), 0.0);
        assert!(fract(-1e-20) < 1.0);
    }

    #[test]
    fn test_finite_guards() {
        assert_eq!(finite_rgb(Vec3::new(1.0, f32::NAN, 0.0)), Vec3::ZERO);
        assert_eq!(saturate(Vec3::new(-1.0, 0.5, 2.0)), Vec3::new(0.0, 0.5, 1.0));
    }
}
