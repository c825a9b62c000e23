//! Deterministic hash noise shared by the procedural renderers.
//!
//! Everything here is a pure function of its inputs, so re-rendering an
//! overlay or frame with the same seed reproduces the same pixels.

#[inline]
pub fn hash_u32(mut x: u32) -> u32 {
    x = x.wrapping_mul(0x9E3779B9);
    x ^= x >> 16;
    x = x.wrapping_mul(0x85EBCA6B);
    x ^= x >> 13;
    x = x.wrapping_mul(0xC2B2AE35);
    x ^= x >> 16;
    x
}

/// Hash a lattice point to [0, 1).
#[inline]
pub fn hash_f32(x: i32, y: i32, seed: u32) -> f32 {
    let h = hash_u32(
        (x as u32)
            .wrapping_mul(374761393)
            .wrapping_add((y as u32).wrapping_mul(668265263))
            .wrapping_add(seed),
    );
    (h & 0x00FF_FFFF) as f32 / 16_777_216.0
}

/// Smoothly interpolated value noise in [0, 1).
pub fn value_noise(x: f32, y: f32, seed: u32) -> f32 {
    let xi = x.floor() as i32;
    let yi = y.floor() as i32;
    let fade = |t: f32| t * t * t * (t * (t * 6.0 - 15.0) + 10.0);
    let u = fade(x - xi as f32);
    let v = fade(y - yi as f32);

    let n00 = hash_f32(xi, yi, seed);
    let n10 = hash_f32(xi + 1, yi, seed);
    let n01 = hash_f32(xi, yi + 1, seed);
    let n11 = hash_f32(xi + 1, yi + 1, seed);

    let top = n00 + u * (n10 - n00);
    let bottom = n01 + u * (n11 - n01);
    top + v * (bottom - top)
}

/// Fractal sum of `octaves` value-noise layers, normalised to [0, 1).
pub fn fbm(x: f32, y: f32, seed: u32, octaves: u32) -> f32 {
    let mut sum = 0.0;
    let mut amp = 1.0;
    let mut norm = 0.0;
    let mut freq = 1.0;
    for o in 0..octaves.max(1) {
        sum += value_noise(x * freq, y * freq, seed.wrapping_add(o * 1013)) * amp;
        norm += amp;
        amp *= 0.5;
        freq *= 2.0;
    }
    sum / norm
}
