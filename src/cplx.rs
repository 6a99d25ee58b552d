//! Complex tensor algebra
//!
//! Elementwise operations on complex samples. Data is stored as `Complex32`,
//! which has the same memory layout as a tensor with a trailing (re, im) axis
//! of size 2; `interleave`/`deinterleave` convert between the two views.
//!
//! Planes are row-major: index = col + row * ncols.

use num_complex::Complex32;

use crate::utils::simd_ops::dot_product_f32;

/// Spatial axis of a 2D plane
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneAxis {
    /// Alternate along the row index
    Row,
    /// Alternate along the column index
    Col,
}

/// Index into a row-major plane
#[inline(always)]
pub fn idx2d(row: usize, col: usize, ncols: usize) -> usize {
    col + row * ncols
}

/// Elementwise complex product
pub fn multiply(a: &[Complex32], b: &[Complex32]) -> Vec<Complex32> {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(&x, &y)| x * y).collect()
}

/// In-place elementwise product `a *= b`
#[inline]
pub fn multiply_inplace(a: &mut [Complex32], b: &[Complex32]) {
    debug_assert_eq!(a.len(), b.len());
    for (x, &y) in a.iter_mut().zip(b.iter()) {
        *x *= y;
    }
}

/// Negate the imaginary part
pub fn conjugate(a: &[Complex32]) -> Vec<Complex32> {
    a.iter().map(|z| z.conj()).collect()
}

/// Alternate the sign along one axis of every `nrows x ncols` plane in `data`.
///
/// Odd indices along `axis` are negated. Multiplying by `(-1)^n` before a DFT
/// moves the zero frequency to the center of the spectrum; the operation is
/// its own inverse.
pub fn fft_shift(data: &mut [Complex32], axis: PlaneAxis, nrows: usize, ncols: usize) {
    let plane = nrows * ncols;
    if plane == 0 {
        return;
    }
    for chunk in data.chunks_mut(plane) {
        for row in 0..nrows {
            for col in 0..ncols {
                let odd = match axis {
                    PlaneAxis::Row => row % 2 == 1,
                    PlaneAxis::Col => col % 2 == 1,
                };
                if odd {
                    let i = idx2d(row, col, ncols);
                    chunk[i] = -chunk[i];
                }
            }
        }
    }
}

/// Checkerboard sign pattern `(-1)^(row + col)` of one plane
pub fn checkerboard(nrows: usize, ncols: usize) -> Vec<f32> {
    let mut out = vec![1.0f32; nrows * ncols];
    for row in 0..nrows {
        for col in 0..ncols {
            if (row + col) % 2 == 1 {
                out[idx2d(row, col, ncols)] = -1.0;
            }
        }
    }
    out
}

/// Convert to the flat (re, im) interleaved layout
pub fn interleave(a: &[Complex32]) -> Vec<f32> {
    bytemuck::cast_slice::<Complex32, f32>(a).to_vec()
}

/// Convert from the flat (re, im) interleaved layout.
///
/// A trailing unpaired value is ignored.
pub fn deinterleave(pairs: &[f32]) -> Vec<Complex32> {
    pairs
        .chunks_exact(2)
        .map(|p| Complex32::new(p[0], p[1]))
        .collect()
}

/// Real inner product over both components: `Σ a.re*b.re + a.im*b.im`
///
/// This is `Re⟨a, b⟩`, the inner product in which the encoding operator and
/// its adjoint are adjoint to each other.
#[inline]
pub fn real_inner(a: &[Complex32], b: &[Complex32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    dot_product_f32(
        bytemuck::cast_slice::<Complex32, f32>(a),
        bytemuck::cast_slice::<Complex32, f32>(b),
    )
}

/// Squared L2 norm over both components
#[inline]
pub fn norm_squared(a: &[Complex32]) -> f32 {
    real_inner(a, a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiply_matches_formula() {
        let a = vec![Complex32::new(1.0, 2.0), Complex32::new(-0.5, 0.25)];
        let b = vec![Complex32::new(3.0, -1.0), Complex32::new(2.0, 4.0)];
        let c = multiply(&a, &b);

        for i in 0..a.len() {
            let re = a[i].re * b[i].re - a[i].im * b[i].im;
            let im = a[i].re * b[i].im + a[i].im * b[i].re;
            assert!((c[i].re - re).abs() < 1e-6);
            assert!((c[i].im - im).abs() < 1e-6);
        }
    }

    #[test]
    fn test_conjugate_negates_imag() {
        let a = vec![Complex32::new(1.0, 2.0), Complex32::new(-3.0, -4.0)];
        let c = conjugate(&a);
        assert_eq!(c[0], Complex32::new(1.0, -2.0));
        assert_eq!(c[1], Complex32::new(-3.0, 4.0));
    }

    #[test]
    fn test_fft_shift_is_involution() {
        let (nr, nc) = (3, 4);
        let original: Vec<Complex32> = (0..2 * nr * nc)
            .map(|i| Complex32::new(i as f32, -(i as f32) * 0.5))
            .collect();

        for axis in [PlaneAxis::Row, PlaneAxis::Col] {
            let mut data = original.clone();
            fft_shift(&mut data, axis, nr, nc);
            assert_ne!(data, original);
            fft_shift(&mut data, axis, nr, nc);
            assert_eq!(data, original);
        }
    }

    #[test]
    fn test_row_and_col_shift_equal_checkerboard() {
        let (nr, nc) = (4, 6);
        let mut data = vec![Complex32::new(1.0, 1.0); nr * nc];
        fft_shift(&mut data, PlaneAxis::Row, nr, nc);
        fft_shift(&mut data, PlaneAxis::Col, nr, nc);

        let board = checkerboard(nr, nc);
        for (z, &s) in data.iter().zip(board.iter()) {
            assert_eq!(z.re, s);
            assert_eq!(z.im, s);
        }
        assert_eq!(board[idx2d(0, 0, nc)], 1.0);
        assert_eq!(board[idx2d(0, 1, nc)], -1.0);
        assert_eq!(board[idx2d(1, 0, nc)], -1.0);
    }

    #[test]
    fn test_interleave_layout() {
        let a = vec![Complex32::new(1.0, 2.0), Complex32::new(3.0, 4.0)];
        let flat = interleave(&a);
        assert_eq!(flat, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(deinterleave(&flat), a);
    }

    #[test]
    fn test_real_inner() {
        let a = vec![Complex32::new(1.0, 2.0), Complex32::new(3.0, -1.0)];
        let b = vec![Complex32::new(0.5, -1.0), Complex32::new(2.0, 2.0)];
        // 0.5 - 2 + 6 - 2
        assert!((real_inner(&a, &b) - 2.5).abs() < 1e-6);
        assert!((norm_squared(&a) - 15.0).abs() < 1e-6);
    }
}
