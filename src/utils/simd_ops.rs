//! Vectorized kernels on flat f32 buffers
//!
//! Complex images are reinterpreted as interleaved (re, im) f32 slices, so a
//! real inner product or an axpy over a complex image is a plain f32 loop.
//! With the `simd` feature these use 128-bit lanes (f32x4, native SSE/NEON or
//! WASM SIMD); otherwise scalar fallbacks are compiled.

#[cfg(feature = "simd")]
use wide::f32x4;

/// SIMD lane width (4 for f32x4)
#[cfg(feature = "simd")]
pub const SIMD_WIDTH: usize = 4;

#[cfg(not(feature = "simd"))]
pub const SIMD_WIDTH: usize = 1;

// ============================================================================
// Reductions
// ============================================================================

/// sum(a[i] * b[i]), accumulated in lanes
#[cfg(feature = "simd")]
#[inline]
pub fn dot_product_f32(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let chunks = a.len() / SIMD_WIDTH;

    let mut sum = f32x4::ZERO;
    for i in 0..chunks {
        let idx = i * SIMD_WIDTH;
        let va = f32x4::from(&a[idx..idx + SIMD_WIDTH]);
        let vb = f32x4::from(&b[idx..idx + SIMD_WIDTH]);
        sum += va * vb;
    }

    let mut result = sum.reduce_add();
    for i in chunks * SIMD_WIDTH..a.len() {
        result += a[i] * b[i];
    }
    result
}

/// sum(a[i] * b[i]), accumulated in f64 to keep long reductions stable
#[cfg(not(feature = "simd"))]
#[inline]
pub fn dot_product_f32(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(&ai, &bi)| ai as f64 * bi as f64)
        .sum::<f64>() as f32
}

// ============================================================================
// Fused Multiply-Add
// ============================================================================

/// a[i] += alpha * b[i]
#[cfg(feature = "simd")]
#[inline]
pub fn axpy_f32(a: &mut [f32], alpha: f32, b: &[f32]) {
    debug_assert_eq!(a.len(), b.len());
    let chunks = a.len() / SIMD_WIDTH;
    let valpha = f32x4::splat(alpha);

    for i in 0..chunks {
        let idx = i * SIMD_WIDTH;
        let va = f32x4::from(&a[idx..idx + SIMD_WIDTH]);
        let vb = f32x4::from(&b[idx..idx + SIMD_WIDTH]);
        a[idx..idx + SIMD_WIDTH].copy_from_slice((va + valpha * vb).as_array_ref());
    }

    for i in chunks * SIMD_WIDTH..a.len() {
        a[i] += alpha * b[i];
    }
}

#[cfg(not(feature = "simd"))]
#[inline]
pub fn axpy_f32(a: &mut [f32], alpha: f32, b: &[f32]) {
    debug_assert_eq!(a.len(), b.len());
    for (ai, &bi) in a.iter_mut().zip(b.iter()) {
        *ai += alpha * bi;
    }
}

/// a[i] = b[i] + beta * a[i] (CG search direction update)
#[cfg(feature = "simd")]
#[inline]
pub fn xpby_f32(a: &mut [f32], b: &[f32], beta: f32) {
    debug_assert_eq!(a.len(), b.len());
    let chunks = a.len() / SIMD_WIDTH;
    let vbeta = f32x4::splat(beta);

    for i in 0..chunks {
        let idx = i * SIMD_WIDTH;
        let va = f32x4::from(&a[idx..idx + SIMD_WIDTH]);
        let vb = f32x4::from(&b[idx..idx + SIMD_WIDTH]);
        a[idx..idx + SIMD_WIDTH].copy_from_slice((vb + vbeta * va).as_array_ref());
    }

    for i in chunks * SIMD_WIDTH..a.len() {
        a[i] = b[i] + beta * a[i];
    }
}

#[cfg(not(feature = "simd"))]
#[inline]
pub fn xpby_f32(a: &mut [f32], b: &[f32], beta: f32) {
    debug_assert_eq!(a.len(), b.len());
    for (ai, &bi) in a.iter_mut().zip(b.iter()) {
        *ai = bi + beta * *ai;
    }
}

// ============================================================================
// Element-wise
// ============================================================================

/// Soft thresholding (shrinkage): sign(x) * max(|x| - t, 0)
#[inline]
pub fn shrink(x: f32, threshold: f32) -> f32 {
    if x > threshold {
        x - threshold
    } else if x < -threshold {
        x + threshold
    } else {
        0.0
    }
}

/// Logistic function
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_product_with_remainder() {
        let a = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let b = vec![2.0f32, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];

        let expected: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        assert!((dot_product_f32(&a, &b) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_axpy_and_xpby() {
        let mut a = vec![1.0f32, 2.0, 3.0, 4.0, 5.0];
        let b = vec![2.0f32, 3.0, 4.0, 5.0, 6.0];

        axpy_f32(&mut a, 0.5, &b);
        assert_eq!(a, vec![2.0, 3.5, 5.0, 6.5, 8.0]);

        xpby_f32(&mut a, &b, 2.0);
        assert_eq!(a, vec![6.0, 10.0, 14.0, 18.0, 22.0]);
    }

    #[test]
    fn test_shrink() {
        assert!((shrink(1.0, 0.5) - 0.5).abs() < 1e-7);
        assert!((shrink(-1.0, 0.5) + 0.5).abs() < 1e-7);
        assert_eq!(shrink(0.3, 0.5), 0.0);
        assert_eq!(shrink(-0.3, 0.5), 0.0);
    }

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-7);
        assert!(sigmoid(20.0) > 0.999);
        assert!(sigmoid(-20.0) < 1e-3);
    }
}
