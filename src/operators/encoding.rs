//! Forward and adjoint multi-coil MRI encoding operator
//!
//! forward:  y_c = M ⊙ F( K ⊙ S_c ⊙ x )
//! adjoint:  x   = Σ_c conj(S_c) ⊙ K ⊙ Fᴴ( M ⊙ y_c )
//!
//! where S_c are coil sensitivities, K the ±1 sign corrections (flip pattern
//! and optional row/column centering shifts), F the unitary 2D DFT and M the
//! real sampling mask. Because every factor is either unitary, real diagonal or
//! a coil broadcast/sum pair, `adjoint` is the exact adjoint of `forward`.

use num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::cplx::{fft_shift, PlaneAxis};
use crate::error::{ensure_shape, ReconError, Result};
use crate::fft::Fft2dPlan;
use crate::tensor::{CoilMaps, CoilShape, ComplexImage, FlipPattern, ImageShape, KSpace, SamplingMask};
use rustfft::FftDirection;

/// Extra sign alternation applied around the DFT to center k-space
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KspaceCentering {
    /// No shift beyond the flip pattern
    #[default]
    None,
    /// Alternate the sign of every other row
    Rows,
    /// Alternate along rows and columns
    RowsAndCols,
}

impl KspaceCentering {
    fn apply(self, plane: &mut [Complex32], nrows: usize, ncols: usize) {
        match self {
            KspaceCentering::None => {}
            KspaceCentering::Rows => fft_shift(plane, PlaneAxis::Row, nrows, ncols),
            KspaceCentering::RowsAndCols => {
                fft_shift(plane, PlaneAxis::Row, nrows, ncols);
                fft_shift(plane, PlaneAxis::Col, nrows, ncols);
            }
        }
    }
}

/// Encoding operator for one reconstruction call.
///
/// Holds borrowed, read-only inputs plus the cached FFT plan. Construction
/// validates every shape, so `forward`/`adjoint` only need to check their
/// own argument.
#[derive(Debug, Clone)]
pub struct EncodingOperator<'a> {
    csm: &'a CoilMaps,
    mask: &'a SamplingMask,
    flip: Option<&'a FlipPattern>,
    centering: KspaceCentering,
    plan: Fft2dPlan,
}

impl<'a> EncodingOperator<'a> {
    pub fn new(
        csm: &'a CoilMaps,
        mask: &'a SamplingMask,
        flip: Option<&'a FlipPattern>,
        centering: KspaceCentering,
    ) -> Result<Self> {
        let s = csm.shape();
        ensure_shape("sampling mask plane", &[s.rows, s.cols], &[mask.rows(), mask.cols()])?;
        if mask.echoes() != 1 && mask.echoes() != s.echoes {
            return Err(ReconError::ShapeMismatch {
                what: "sampling mask echoes",
                expected: vec![s.echoes],
                actual: vec![mask.echoes()],
            });
        }
        if let Some(flip) = flip {
            ensure_shape("flip pattern", &[s.echoes, s.rows, s.cols], &flip.dims())?;
        }

        Ok(Self {
            csm,
            mask,
            flip,
            centering,
            plan: Fft2dPlan::new(s.rows, s.cols),
        })
    }

    /// Shape of the images this operator maps from
    pub fn image_shape(&self) -> ImageShape {
        self.csm.shape().image_shape()
    }

    /// Shape of the k-space this operator maps to
    pub fn kspace_shape(&self) -> CoilShape {
        self.csm.shape()
    }

    pub fn mask(&self) -> &SamplingMask {
        self.mask
    }

    /// Apply flip and centering signs to one plane (self-inverse)
    #[inline]
    fn apply_signs(&self, plane: &mut [Complex32], echo: usize) {
        let s = self.csm.shape();
        if let Some(flip) = self.flip {
            for (z, &f) in plane.iter_mut().zip(flip.plane(echo)) {
                *z *= f;
            }
        }
        self.centering.apply(plane, s.rows, s.cols);
    }

    /// Image to masked multi-coil k-space
    pub fn forward(&self, ctx: &ExecutionContext, image: &ComplexImage) -> Result<KSpace> {
        ensure_shape("image", &self.image_shape().dims(), &image.shape().dims())?;
        let s = self.csm.shape();
        let p = s.plane_len();
        let mut kspace = KSpace::zeros(s);

        ctx.for_each_chunk(kspace.data_mut(), p, |plane_idx, plane| {
            let e = plane_idx % s.echoes;
            let c = (plane_idx / s.echoes) % s.coils;
            let b = plane_idx / (s.echoes * s.coils);

            // coil image
            for ((dst, &x), &sens) in plane.iter_mut().zip(image.plane(b, e)).zip(self.csm.plane(b, c, e)) {
                *dst = sens * x;
            }
            self.apply_signs(plane, e);
            self.plan.transform_plane(plane, FftDirection::Forward);

            for (z, &m) in plane.iter_mut().zip(self.mask.plane(e)) {
                *z *= m;
            }
        });

        Ok(kspace)
    }

    /// Multi-coil k-space to coil-combined image
    pub fn adjoint(&self, ctx: &ExecutionContext, kspace: &KSpace) -> Result<ComplexImage> {
        ensure_shape("k-space", &self.kspace_shape().dims(), &kspace.shape().dims())?;
        let s = self.csm.shape();
        let p = s.plane_len();
        let mut image = ComplexImage::zeros(self.image_shape());

        ctx.for_each_chunk(image.data_mut(), p, |plane_idx, out| {
            let e = plane_idx % s.echoes;
            let b = plane_idx / s.echoes;
            let mut buffer = vec![Complex32::new(0.0, 0.0); p];

            for c in 0..s.coils {
                for ((dst, &y), &m) in buffer.iter_mut().zip(kspace.plane(b, c, e)).zip(self.mask.plane(e)) {
                    *dst = y * m;
                }
                self.plan.transform_plane(&mut buffer, FftDirection::Inverse);
                self.apply_signs(&mut buffer, e);

                for ((acc, &z), &sens) in out.iter_mut().zip(buffer.iter()).zip(self.csm.plane(b, c, e)) {
                    *acc += sens.conj() * z;
                }
            }
        });

        Ok(image)
    }

    /// `AᴴA x`
    pub fn normal(&self, ctx: &ExecutionContext, image: &ComplexImage) -> Result<ComplexImage> {
        let kspace = self.forward(ctx, image)?;
        self.adjoint(ctx, &kspace)
    }

    /// `||A x - M y||²`, the data-consistency residual
    pub fn data_residual(&self, ctx: &ExecutionContext, image: &ComplexImage, kspace: &KSpace) -> Result<f32> {
        ensure_shape("k-space", &self.kspace_shape().dims(), &kspace.shape().dims())?;
        let simulated = self.forward(ctx, image)?;
        let s = self.csm.shape();
        let p = s.plane_len();

        let mut total = 0.0f64;
        for (plane_idx, (sim, meas)) in simulated.data().chunks(p).zip(kspace.data().chunks(p)).enumerate() {
            let e = plane_idx % s.echoes;
            for ((&a, &y), &m) in sim.iter().zip(meas).zip(self.mask.plane(e)) {
                total += (a - y * m).norm_sqr() as f64;
            }
        }
        Ok(total as f32)
    }
}

/// Simulate masked k-space from an image
pub fn forward(
    ctx: &ExecutionContext,
    image: &ComplexImage,
    csm: &CoilMaps,
    mask: &SamplingMask,
    flip: Option<&FlipPattern>,
) -> Result<KSpace> {
    EncodingOperator::new(csm, mask, flip, KspaceCentering::None)?.forward(ctx, image)
}

/// Coil-combined image from k-space
pub fn adjoint(
    ctx: &ExecutionContext,
    kspace: &KSpace,
    csm: &CoilMaps,
    mask: &SamplingMask,
    flip: Option<&FlipPattern>,
) -> Result<ComplexImage> {
    EncodingOperator::new(csm, mask, flip, KspaceCentering::None)?.adjoint(ctx, kspace)
}
