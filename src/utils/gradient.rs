//! Gradient operators for TV regularization
//!
//! Forward difference gradient and its adjoint on 2D planes of complex
//! images. Both components of a complex sample are differenced independently.
//!
//! Boundary handling:
//! - gradient: Neumann (replicate) at the last index, so the difference there is zero
//! - divergence: zero padding at the first index
//!
//! `divergence` returns `Gᵀd`, the negated backward-difference divergence, so
//! `⟨gradient(x), d⟩ = ⟨x, divergence(d)⟩` holds exactly and
//! `divergence(gradient(x))` is positive semi-definite.

use num_complex::Complex32;

use crate::cplx::real_inner;
use crate::tensor::{ComplexImage, ImageShape};

/// Two-component gradient field of a complex image.
///
/// `dx` differences along columns, `dy` along rows.
#[derive(Clone, Debug, PartialEq)]
pub struct GradientField {
    shape: ImageShape,
    pub dx: Vec<Complex32>,
    pub dy: Vec<Complex32>,
}

impl GradientField {
    pub fn zeros(shape: ImageShape) -> Self {
        let zero = Complex32::new(0.0, 0.0);
        Self { shape, dx: vec![zero; shape.len()], dy: vec![zero; shape.len()] }
    }

    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    /// `Re⟨self, other⟩` summed over both components
    pub fn inner(&self, other: &GradientField) -> f32 {
        real_inner(&self.dx, &other.dx) + real_inner(&self.dy, &other.dy)
    }

    /// Apply `f` to every real scalar of both components
    pub fn map_components<F>(&mut self, f: F)
    where
        F: Fn(f32) -> f32,
    {
        for z in self.dx.iter_mut().chain(self.dy.iter_mut()) {
            z.re = f(z.re);
            z.im = f(z.im);
        }
    }

    /// `self += alpha * other`
    pub fn add_scaled(&mut self, alpha: f32, other: &GradientField) {
        for (a, &b) in self.dx.iter_mut().zip(other.dx.iter()) {
            *a += b * alpha;
        }
        for (a, &b) in self.dy.iter_mut().zip(other.dy.iter()) {
            *a += b * alpha;
        }
    }
}

/// Forward difference gradient of one plane (in-place)
///
/// # Arguments
/// * `gx`, `gy` - Output components (pre-allocated to nrows * ncols)
/// * `x` - Input plane (nrows * ncols, row-major)
/// * `nrows`, `ncols` - Plane dimensions
#[inline]
pub fn fgrad_plane(
    gx: &mut [Complex32], gy: &mut [Complex32],
    x: &[Complex32],
    nrows: usize, ncols: usize,
) {
    let zero = Complex32::new(0.0, 0.0);
    for r in 0..nrows {
        let row = r * ncols;
        let next_row = (r + 1) * ncols;
        for c in 0..ncols {
            let idx = c + row;
            let x_val = x[idx];
            gx[idx] = if c + 1 < ncols { x[idx + 1] - x_val } else { zero };
            gy[idx] = if r + 1 < nrows { x[c + next_row] - x_val } else { zero };
        }
    }
}

/// Adjoint of `fgrad_plane` (in-place)
///
/// # Arguments
/// * `div` - Output plane (pre-allocated to nrows * ncols)
/// * `gx`, `gy` - Gradient components
/// * `nrows`, `ncols` - Plane dimensions
#[inline]
pub fn bdiv_plane(
    div: &mut [Complex32],
    gx: &[Complex32], gy: &[Complex32],
    nrows: usize, ncols: usize,
) {
    let zero = Complex32::new(0.0, 0.0);
    for r in 0..nrows {
        let row = r * ncols;
        for c in 0..ncols {
            let idx = c + row;

            // the last-index difference is identically zero, so its entry of d is ignored
            let x_here = if c + 1 < ncols { gx[idx] } else { zero };
            let x_prev = if c > 0 { gx[idx - 1] } else { zero };
            let y_here = if r + 1 < nrows { gy[idx] } else { zero };
            let y_prev = if r > 0 { gy[idx - ncols] } else { zero };

            div[idx] = (x_prev - x_here) + (y_prev - y_here);
        }
    }
}

/// Forward difference gradient of every plane of `x`
pub fn gradient(x: &ComplexImage) -> GradientField {
    let shape = x.shape();
    let mut field = GradientField::zeros(shape);
    let p = shape.plane_len();
    for ((src, gx), gy) in x
        .data()
        .chunks(p)
        .zip(field.dx.chunks_mut(p))
        .zip(field.dy.chunks_mut(p))
    {
        fgrad_plane(gx, gy, src, shape.rows, shape.cols);
    }
    field
}

/// Adjoint of `gradient`
pub fn divergence(d: &GradientField) -> ComplexImage {
    let shape = d.shape();
    let mut out = ComplexImage::zeros(shape);
    let p = shape.plane_len();
    for ((dst, gx), gy) in out
        .data_mut()
        .chunks_mut(p)
        .zip(d.dx.chunks(p))
        .zip(d.dy.chunks(p))
    {
        bdiv_plane(dst, gx, gy, shape.rows, shape.cols);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(shape: ImageShape, f: impl Fn(usize) -> Complex32) -> ComplexImage {
        ComplexImage::from_vec(shape, (0..shape.len()).map(f).collect()).unwrap()
    }

    #[test]
    fn test_gradient_of_constant_is_zero() {
        let shape = ImageShape::new(1, 2, 5, 4);
        let x = image(shape, |_| Complex32::new(3.0, -1.0));
        let g = gradient(&x);
        for z in g.dx.iter().chain(g.dy.iter()) {
            assert_eq!(*z, Complex32::new(0.0, 0.0));
        }
    }

    #[test]
    fn test_gradient_of_column_ramp() {
        let shape = ImageShape::new(1, 1, 3, 4);
        let x = image(shape, |i| Complex32::new((i % 4) as f32 * 2.0, 0.0));
        let g = gradient(&x);

        for r in 0..3 {
            for c in 0..4 {
                let expected = if c < 3 { 2.0 } else { 0.0 };
                assert!((g.dx[c + r * 4].re - expected).abs() < 1e-6);
                assert_eq!(g.dy[c + r * 4].re, 0.0);
            }
        }
    }

    #[test]
    fn test_divergence_is_adjoint() {
        let shape = ImageShape::new(2, 1, 6, 5);
        let x = image(shape, |i| Complex32::new((i as f32 * 0.7).sin(), (i as f32 * 1.3).cos()));
        let mut d = GradientField::zeros(shape);
        for i in 0..shape.len() {
            d.dx[i] = Complex32::new((i as f32 * 0.4).cos(), (i as f32 * 0.9).sin());
            d.dy[i] = Complex32::new((i as f32 * 0.2).sin(), -(i as f32 * 0.5).cos());
        }

        let lhs = gradient(&x).inner(&d);
        let rhs = x.inner(&divergence(&d));
        assert!((lhs - rhs).abs() < 1e-4, "<Gx,d> = {}, <x,G'd> = {}", lhs, rhs);
    }

    #[test]
    fn test_div_grad_is_positive_semidefinite() {
        let shape = ImageShape::new(1, 1, 4, 4);
        let x = image(shape, |i| Complex32::new((i * i % 7) as f32, (i % 3) as f32));
        let energy = x.inner(&divergence(&gradient(&x)));
        assert!(energy >= 0.0);
    }
}
