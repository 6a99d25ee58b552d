//! Data-consistency solvers of one unrolled stage
//!
//! Each solver approximately minimizes
//!
//!   E(x) = ½||Ax - y||² + λ Φ(x - p)
//!
//! starting from the current estimate, where `p` is the stage prior and
//! `Φ` is selected by `Regularizer`. `aty` is the precomputed `Aᴴy`.

use num_complex::Complex32;

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::operators::{EncodingOperator, NormalOperator, Regularizer};
use crate::solvers::cg_solve;
use crate::tensor::{ComplexImage, ImageShape};
use crate::utils::gradient::{divergence, gradient, GradientField};
use crate::utils::simd_ops::shrink;

/// Relative residual at which inner CG solves stop early
pub const CG_TOLERANCE: f32 = 1e-6;

// ============================================================================
// Quasi-Newton (gradient descent)
// ============================================================================

/// `x ← x - α (AᴴA x - Aᴴy + λ R(x - p))`, repeated `iterations` times
pub fn quasi_newton(
    ctx: &ExecutionContext,
    normal: &NormalOperator,
    aty: &ComplexImage,
    x0: &ComplexImage,
    prior: &ComplexImage,
    step_size: f32,
    iterations: usize,
) -> Result<ComplexImage> {
    let mut x = x0.clone();
    for _ in 0..iterations {
        let mut grad = normal.apply_anchored(ctx, &x, Some(prior))?;
        grad.add_scaled(-1.0, aty);
        x.add_scaled(-step_size, &grad);
    }
    Ok(x)
}

// ============================================================================
// Conjugate gradient
// ============================================================================

/// Solve `(AᴴA + λR) x = Aᴴy + λ R(p)` warm started at `x0`
///
/// Only valid for linear `R`; the caller checks `Regularizer::is_linear`.
pub fn conjugate_gradient(
    ctx: &ExecutionContext,
    normal: &NormalOperator,
    aty: &ComplexImage,
    x0: &ComplexImage,
    prior: &ComplexImage,
    iterations: usize,
) -> Result<ComplexImage> {
    let mut rhs = aty.clone();
    if normal.lambda() != 0.0 {
        rhs.add_scaled(normal.lambda(), &normal.regularizer().apply(prior));
    }
    cg_solve(|v| normal.apply(ctx, v), &rhs, x0, CG_TOLERANCE, iterations)
}

// ============================================================================
// ADMM
// ============================================================================

/// Auxiliary variable of the ADMM split
trait SplitVariable: Clone {
    fn add_scaled(&mut self, alpha: f32, other: &Self);
    fn map_components<F: Fn(f32) -> f32>(&mut self, f: F);
}

impl SplitVariable for ComplexImage {
    fn add_scaled(&mut self, alpha: f32, other: &Self) {
        ComplexImage::add_scaled(self, alpha, other);
    }

    fn map_components<F: Fn(f32) -> f32>(&mut self, f: F) {
        for z in self.data_mut().iter_mut() {
            *z = Complex32::new(f(z.re), f(z.im));
        }
    }
}

impl SplitVariable for GradientField {
    fn add_scaled(&mut self, alpha: f32, other: &Self) {
        GradientField::add_scaled(self, alpha, other);
    }

    fn map_components<F: Fn(f32) -> f32>(&mut self, f: F) {
        GradientField::map_components(self, f);
    }
}

/// Linear map `L` of the split `z = L(x - p)`
trait Split {
    type Var: SplitVariable;
    fn apply(&self, x: &ComplexImage) -> Self::Var;
    fn adjoint(&self, v: &Self::Var) -> ComplexImage;
    fn zeros(&self, shape: ImageShape) -> Self::Var;
}

/// `L = I`
struct IdentitySplit;

impl Split for IdentitySplit {
    type Var = ComplexImage;

    fn apply(&self, x: &ComplexImage) -> ComplexImage {
        x.clone()
    }

    fn adjoint(&self, v: &ComplexImage) -> ComplexImage {
        v.clone()
    }

    fn zeros(&self, shape: ImageShape) -> ComplexImage {
        ComplexImage::zeros(shape)
    }
}

/// `L = ∇`
struct GradientSplit;

impl Split for GradientSplit {
    type Var = GradientField;

    fn apply(&self, x: &ComplexImage) -> GradientField {
        gradient(x)
    }

    fn adjoint(&self, v: &GradientField) -> ComplexImage {
        divergence(v)
    }

    fn zeros(&self, shape: ImageShape) -> GradientField {
        GradientField::zeros(shape)
    }
}

/// ADMM parameters of one stage
#[derive(Clone, Copy, Debug)]
pub struct AdmmParams {
    pub lambda: f32,
    pub rho: f32,
    pub regularizer: Regularizer,
    /// Outer ADMM iterations
    pub iterations: usize,
    /// CG steps per x-update
    pub cg_iterations: usize,
}

/// ADMM on `½||Ax - y||² + λΦ(z)` subject to `z = L(x - p)`
///
/// Auxiliary `z` and scaled dual `u` start at zero.
pub fn admm(
    ctx: &ExecutionContext,
    encoding: &EncodingOperator,
    aty: &ComplexImage,
    x0: &ComplexImage,
    prior: &ComplexImage,
    params: AdmmParams,
) -> Result<ComplexImage> {
    match params.regularizer {
        Regularizer::Identity => admm_split(ctx, &IdentitySplit, encoding, aty, x0, prior, params),
        Regularizer::TvL2 | Regularizer::TvL1 => admm_split(ctx, &GradientSplit, encoding, aty, x0, prior, params),
    }
}

fn admm_split<S: Split>(
    ctx: &ExecutionContext,
    split: &S,
    encoding: &EncodingOperator,
    aty: &ComplexImage,
    x0: &ComplexImage,
    prior: &ComplexImage,
    params: AdmmParams,
) -> Result<ComplexImage> {
    let AdmmParams { lambda, rho, regularizer, iterations, cg_iterations } = params;
    let shape = x0.shape();

    let mut x = x0.clone();
    let mut z = split.zeros(shape);
    let mut u = split.zeros(shape);
    let lp = split.apply(prior);

    // (AᴴA + ρLᴴL)
    let system = |v: &ComplexImage| -> Result<ComplexImage> {
        let mut out = encoding.normal(ctx, v)?;
        out.add_scaled(rho, &split.adjoint(&split.apply(v)));
        Ok(out)
    };

    let threshold = lambda / rho;
    let quadratic_scale = rho / (lambda + rho);

    for _ in 0..iterations {
        // x-update: rhs = Aᴴy + ρLᴴ(z - u + Lp)
        let mut v = z.clone();
        v.add_scaled(-1.0, &u);
        v.add_scaled(1.0, &lp);
        let mut rhs = aty.clone();
        rhs.add_scaled(rho, &split.adjoint(&v));
        x = cg_solve(&system, &rhs, &x, CG_TOLERANCE, cg_iterations)?;

        // z-update: prox of λΦ/ρ at L(x - p) + u
        let mut d = split.apply(&x);
        d.add_scaled(-1.0, &lp);
        let mut w = d.clone();
        w.add_scaled(1.0, &u);
        match regularizer {
            Regularizer::TvL1 => w.map_components(|c| shrink(c, threshold)),
            Regularizer::Identity | Regularizer::TvL2 => w.map_components(|c| c * quadratic_scale),
        }
        z = w;

        // u-update: u += L(x - p) - z
        u.add_scaled(1.0, &d);
        u.add_scaled(-1.0, &z);
    }

    Ok(x)
}
