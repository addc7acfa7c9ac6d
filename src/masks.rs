// masks.rs -- convolution masks used by the built-in filters.
//
// Flat layout matches `Buffer`: axis 0 fastest, so element (x, y) of a
// k-wide mask is `mask[x + y * k]`.

/// 3x3 Gaussian low-pass, un-normalized (sums to ~0.99).
pub const GAUSS_LOWPASS_3X3: [f32; 9] = [
    0.057118, 0.124758, 0.057118,
    0.124758, 0.272496, 0.124758,
    0.057118, 0.124758, 0.057118,
];

/// 3x3 binomial smoothing kernel; divide the accumulated sum by 16.
pub const SMOOTH_3X3: [i32; 9] = [
    1, 2, 1,
    2, 4, 2,
    1, 2, 1,
];

/// Horizontal Prewitt gradient; divide the accumulated sum by 6.
pub const GRAD_X_3X3: [i32; 9] = [
    -1, -1, -1,
     0,  0,  0,
     1,  1,  1,
];

/// Vertical Prewitt gradient; divide the accumulated sum by 6.
pub const GRAD_Y_3X3: [i32; 9] = [
    -1, 0, 1,
    -1, 0, 1,
    -1, 0, 1,
];

/// 3x3 box average, already normalized.
pub const AVG_3X3: [f32; 9] = [
    0.111111, 0.111111, 0.111111,
    0.111111, 0.111111, 0.111111,
    0.111111, 0.111111, 0.111111,
];

/// 5x5 Laplacian: uniform surround against a heavy center.
pub const LAPLACE_5X5: [f32; 25] = [
    1.0, 1.0, 1.0, 1.0, 1.0,
    1.0, 1.0, 1.0, 1.0, 1.0,
    1.0, 1.0, -24.0, 1.0, 1.0,
    1.0, 1.0, 1.0, 1.0, 1.0,
    1.0, 1.0, 1.0, 1.0, 1.0,
];

/// Square spatial Gaussian `exp(-(dx^2 + dy^2) / (2 sigma^2))`,
/// un-normalized (center weight 1.0). `size` must be odd.
pub fn spatial_gauss(size: usize, sigma: f32) -> Vec<f32> {
    debug_assert!(size % 2 == 1);
    let half = (size / 2) as i64;
    let inv = 1.0 / (2.0 * sigma * sigma);
    let mut mask = Vec::with_capacity(size * size);
    for dy in -half..=half {
        for dx in -half..=half {
            let d2 = (dx * dx + dy * dy) as f32;
            mask.push((-d2 * inv).exp());
        }
    }
    mask
}

/// The 13x13 spatial mask the bilateral filter pairs with its range
/// kernel.
pub fn bilateral_mask() -> Vec<f32> {
    spatial_gauss(13, 3.0)
}

/// Dilated Gaussian for one a-trous stage: the 3x3 low-pass taps
/// spread `spacing` apart, zeros in between. Returns the flat mask and
/// its side length `2 * spacing + 1`.
pub fn atrous_mask(spacing: usize) -> (Vec<f32>, usize) {
    let size = 2 * spacing + 1;
    let mut mask = vec![0.0f32; size * size];
    for ty in 0..3 {
        for tx in 0..3 {
            mask[tx * spacing + ty * spacing * size] = GAUSS_LOWPASS_3X3[tx + ty * 3];
        }
    }
    (mask, size)
}
