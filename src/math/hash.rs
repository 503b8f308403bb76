// src/math/hash.rs
//! Stateless per-cell pseudo-random numbers.
//!
//! Every random decision in the pipeline is a pure function of a cell or pixel
//! coordinate and a seed (usually the simulation time), so kernels can run in
//! any order and tests can reproduce any cell by passing the same inputs.

/// PCG-style integer mix of a single word.
#[inline]
pub fn mix32(v: u32) -> u32 {
    let state = v.wrapping_mul(747_796_405).wrapping_add(2_891_336_453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277_803_737);
    (word >> 22) ^ word
}

/// Hashes a 2D integer coordinate together with a 32-bit salt.
#[inline]
pub fn hash3(x: u32, y: u32, salt: u32) -> u32 {
    mix32(x ^ mix32(y ^ mix32(salt)))
}

/// Uniform float in `[0, 1)` for integer coordinate `(x, y)` and a seed word.
#[inline]
pub fn random_float(x: u32, y: u32, seed: u32) -> f32 {
    to_unit(hash3(x, y, seed))
}

/// Uniform integer in `[0, n)`. Returns 0 for `n == 0`.
///
/// Scales a 24-bit unit float so the GPU kernels compute the same index
/// without 64-bit arithmetic.
#[inline]
pub fn random_index(x: u32, y: u32, seed: u32, n: u32) -> u32 {
    if n == 0 {
        return 0;
    }
    ((random_float(x, y, seed) * n as f32) as u32).min(n - 1)
}

/// Folds every bit of a time value into a seed word, so two ticks that are
/// only a few microseconds apart still get unrelated streams.
#[inline]
pub fn seed_bits(time: f64) -> u32 {
    let bits = time.to_bits();
    (bits ^ (bits >> 32)) as u32
}

/// Maps the top 24 bits of a hash to `[0, 1)`.
#[inline]
pub fn to_unit(h: u32) -> f32 {
    (h >> 8) as f32 * (1.0 / 16_777_216.0)
}
