//! Data-consistency normal-equation operator
//!
//! N(x) = AᴴA x + λ R(x)
//!
//! with R chosen by `Regularizer`:
//! - Identity: R(x) = x
//! - TvL2:     R(x) = Gᵀ G x
//! - TvL1:     R(x) = Gᵀ ( Gx / sqrt((Gx)² + ε) ), ε = 3e-5, per real component
//!
//! `Gᵀ` is `utils::gradient::divergence`. One call is one operator
//! evaluation; iterating is left to the solvers.

use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::error::{ensure_shape, Result};
use crate::operators::encoding::EncodingOperator;
use crate::tensor::ComplexImage;
use crate::utils::gradient::{divergence, gradient};

/// Smoothing constant of the l1-TV gradient
pub const TV_SMOOTHING_EPS: f32 = 3e-5;

/// Regularization policy of the data-consistency step
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regularizer {
    /// Tikhonov: λ/2 ||x||²
    #[default]
    Identity,
    /// Quadratic gradient penalty: λ/2 ||∇x||²
    TvL2,
    /// Smoothed total variation: λ Σ sqrt((∇x)² + ε)
    TvL1,
}

impl Regularizer {
    /// Linear policies can be solved with conjugate gradient
    pub fn is_linear(self) -> bool {
        !matches!(self, Regularizer::TvL1)
    }

    /// R(x)
    pub fn apply(self, x: &ComplexImage) -> ComplexImage {
        match self {
            Regularizer::Identity => x.clone(),
            Regularizer::TvL2 => divergence(&gradient(x)),
            Regularizer::TvL1 => {
                let mut g = gradient(x);
                g.map_components(|v| v / (v * v + TV_SMOOTHING_EPS).sqrt());
                divergence(&g)
            }
        }
    }
}

/// `AᴴA + λR` bound to one encoding operator
#[derive(Debug, Clone, Copy)]
pub struct NormalOperator<'a> {
    encoding: &'a EncodingOperator<'a>,
    lambda: f32,
    regularizer: Regularizer,
}

impl<'a> NormalOperator<'a> {
    pub fn new(encoding: &'a EncodingOperator<'a>, lambda: f32, regularizer: Regularizer) -> Self {
        Self { encoding, lambda, regularizer }
    }

    pub fn encoding(&self) -> &EncodingOperator<'a> {
        self.encoding
    }

    pub fn lambda(&self) -> f32 {
        self.lambda
    }

    pub fn regularizer(&self) -> Regularizer {
        self.regularizer
    }

    /// `AᴴA x + λ R(x)`
    pub fn apply(&self, ctx: &ExecutionContext, x: &ComplexImage) -> Result<ComplexImage> {
        self.apply_anchored(ctx, x, None)
    }

    /// `AᴴA x + λ R(x - anchor)`
    ///
    /// This is the gradient of `½||Ax - y||² + λΦ(x - anchor)` up to the
    /// constant `-Aᴴy`. With `lambda == 0` the regularizer is not evaluated.
    pub fn apply_anchored(
        &self,
        ctx: &ExecutionContext,
        x: &ComplexImage,
        anchor: Option<&ComplexImage>,
    ) -> Result<ComplexImage> {
        let mut out = self.encoding.normal(ctx, x)?;
        if self.lambda == 0.0 {
            return Ok(out);
        }

        let reg = match anchor {
            Some(p) => {
                ensure_shape("anchor image", &x.shape().dims(), &p.shape().dims())?;
                self.regularizer.apply(&x.sub(p))
            }
            None => self.regularizer.apply(x),
        };
        out.add_scaled(self.lambda, &reg);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::encoding::KspaceCentering;
    use crate::tensor::{CoilMaps, CoilShape, ImageShape, SamplingMask};
    use num_complex::Complex32;

    fn setup() -> (CoilMaps, SamplingMask, ComplexImage) {
        let s = CoilShape::new(1, 2, 1, 4, 4);
        let csm_data = (0..s.len())
            .map(|i| Complex32::from_polar(0.5 + (i % 3) as f32 * 0.1, i as f32 * 0.3))
            .collect();
        let csm = CoilMaps::from_vec(s, csm_data).unwrap();
        let mask = SamplingMask::new(1, 4, 4, (0..16).map(|i| (i % 2) as f32).collect()).unwrap();
        let x = ComplexImage::from_vec(
            ImageShape::new(1, 1, 4, 4),
            (0..16).map(|i| Complex32::new((i as f32).sin(), (i as f32 * 0.5).cos())).collect(),
        )
        .unwrap();
        (csm, mask, x)
    }

    #[test]
    fn test_zero_lambda_equals_normal() {
        let (csm, mask, x) = setup();
        let ctx = ExecutionContext::sequential();
        let enc = EncodingOperator::new(&csm, &mask, None, KspaceCentering::None).unwrap();
        let expected = enc.adjoint(&ctx, &enc.forward(&ctx, &x).unwrap()).unwrap();

        for reg in [Regularizer::Identity, Regularizer::TvL2, Regularizer::TvL1] {
            let out = NormalOperator::new(&enc, 0.0, reg).apply(&ctx, &x).unwrap();
            assert_eq!(out, expected);
        }
    }

    #[test]
    fn test_identity_adds_scaled_input() {
        let (csm, mask, x) = setup();
        let ctx = ExecutionContext::sequential();
        let enc = EncodingOperator::new(&csm, &mask, None, KspaceCentering::None).unwrap();
        let base = enc.normal(&ctx, &x).unwrap();
        let out = NormalOperator::new(&enc, 0.25, Regularizer::Identity).apply(&ctx, &x).unwrap();

        for ((o, b), xi) in out.data().iter().zip(base.data()).zip(x.data()) {
            assert!((*o - (*b + *xi * 0.25)).norm() < 1e-5);
        }
    }

    #[test]
    fn test_anchor_at_x_removes_regularizer() {
        let (csm, mask, x) = setup();
        let ctx = ExecutionContext::sequential();
        let enc = EncodingOperator::new(&csm, &mask, None, KspaceCentering::None).unwrap();
        let base = enc.normal(&ctx, &x).unwrap();

        for reg in [Regularizer::Identity, Regularizer::TvL2, Regularizer::TvL1] {
            let out = NormalOperator::new(&enc, 2.0, reg)
                .apply_anchored(&ctx, &x, Some(&x))
                .unwrap();
            for (o, b) in out.data().iter().zip(base.data()) {
                assert!((*o - *b).norm() < 1e-5, "{:?}", reg);
            }
        }
    }

    #[test]
    fn test_tv_of_constant_image_is_zero() {
        let x = ComplexImage::from_vec(ImageShape::new(1, 1, 3, 3), vec![Complex32::new(2.0, -1.0); 9]).unwrap();
        for reg in [Regularizer::TvL2, Regularizer::TvL1] {
            let r = reg.apply(&x);
            assert!(r.data().iter().all(|z| z.norm() < 1e-6));
        }
    }

    #[test]
    fn test_tv_l1_is_bounded() {
        // |g / sqrt(g² + ε)| < 1, so each output entry is bounded by 4 in magnitude per component
        let x = ComplexImage::from_vec(
            ImageShape::new(1, 1, 4, 4),
            (0..16).map(|i| Complex32::new(((i * 37) % 11) as f32 * 100.0, 0.0)).collect(),
        )
        .unwrap();
        let r = Regularizer::TvL1.apply(&x);
        assert!(r.data().iter().all(|z| z.re.abs() <= 4.0 + 1e-4 && z.im.abs() <= 4.0 + 1e-4));
        assert!(!Regularizer::TvL1.is_linear());
        assert!(Regularizer::TvL2.is_linear());
    }
}
