//! Conjugate Gradient solver
//!
//! Solves Ax = b for Hermitian positive (semi-)definite A acting on complex
//! images. Inner products are the real part of the complex inner product,
//! which is the Euclidean inner product of the interleaved (re, im) buffers.

use num_complex::Complex32;

use crate::error::{ensure_shape, Result};
use crate::tensor::ComplexImage;
use crate::utils::simd_ops::xpby_f32;

/// Conjugate gradient solver
///
/// Solves Ax = b where A is a linear operator represented by a closure.
///
/// # Arguments
/// * `a_op` - Closure that computes A*x
/// * `b` - Right-hand side
/// * `x0` - Initial guess (warm start)
/// * `tol` - Relative residual tolerance, `||r|| < tol * ||b||` stops early
/// * `max_iter` - Maximum iterations
///
/// # Returns
/// Solution x
pub fn cg_solve<F>(
    a_op: F,
    b: &ComplexImage,
    x0: &ComplexImage,
    tol: f32,
    max_iter: usize,
) -> Result<ComplexImage>
where
    F: Fn(&ComplexImage) -> Result<ComplexImage>,
{
    ensure_shape("cg initial guess", &b.shape().dims(), &x0.shape().dims())?;
    let mut x = x0.clone();

    // r = b - A*x
    let ax = a_op(&x)?;
    let mut r = b.sub(&ax);
    let mut p = r.clone();

    let mut rsold = r.norm_squared();
    let b_norm = b.norm_squared().sqrt();

    if rsold.sqrt() <= tol * b_norm {
        return Ok(x);
    }

    for iter in 0..max_iter {
        let ap = a_op(&p)?;
        let pap = p.inner(&ap);

        if pap.abs() < 1e-20 {
            log::trace!("cg: curvature vanished at iteration {}", iter);
            break;
        }

        let alpha = rsold / pap;

        // x = x + alpha * p
        x.add_scaled(alpha, &p);

        // r = r - alpha * A*p
        r.add_scaled(-alpha, &ap);

        let rsnew = r.norm_squared();

        // Check convergence
        if rsnew.sqrt() < tol * b_norm {
            log::trace!("cg: converged after {} iterations", iter + 1);
            break;
        }

        let beta = rsnew / rsold;

        // p = r + beta * p
        xpby_f32(
            bytemuck::cast_slice_mut::<Complex32, f32>(p.data_mut()),
            bytemuck::cast_slice::<Complex32, f32>(r.data()),
            beta,
        );

        rsold = rsnew;
    }

    Ok(x)
}
