//! Unrolled iterative reconstruction
//!
//! K stages, each a prior step `p_k = D(x_k)` followed by a data-consistency
//! solve of `min_x ½||Ax - y||² + λΦ(x - p_k)`. Starts from the zero-filled
//! image `Aᴴy`.

pub mod data_consistency;
pub mod unrolled;

use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::denoisers::NamedParameter;
use crate::error::{ensure_shape, ReconError, Result};
use crate::operators::{EncodingOperator, KspaceCentering};
use crate::sampling::DerivedMask;
use crate::tensor::{CoilMaps, ComplexImage, FlipPattern, KSpace, SamplingMask};

pub use unrolled::UnrolledNetwork;

/// Per-call measurement inputs
#[derive(Clone, Debug)]
pub struct ReconInputs {
    /// Measured k-space (batch, coil, echo, row, col)
    pub kspace: KSpace,
    /// Coil sensitivities, same shape as `kspace`
    pub coil_maps: CoilMaps,
    pub mask: SamplingMask,
    pub flip: Option<FlipPattern>,
}

impl ReconInputs {
    pub fn new(kspace: KSpace, coil_maps: CoilMaps, mask: SamplingMask, flip: Option<FlipPattern>) -> Result<Self> {
        ensure_shape("coil maps", &kspace.shape().dims(), &coil_maps.shape().dims())?;
        Ok(Self { kspace, coil_maps, mask, flip })
    }

    /// Same acquisition seen through `mask`; measured k-space is re-masked
    pub fn with_mask(&self, mask: SamplingMask) -> Result<Self> {
        let s = self.kspace.shape();
        ensure_shape("sampling mask plane", &[s.rows, s.cols], &[mask.rows(), mask.cols()])?;
        if mask.echoes() != 1 && mask.echoes() != s.echoes {
            return Err(ReconError::ShapeMismatch {
                what: "sampling mask echoes",
                expected: vec![s.echoes],
                actual: vec![mask.echoes()],
            });
        }

        let mut kspace = self.kspace.clone();
        for (plane_idx, plane) in kspace.data_mut().chunks_mut(s.plane_len()).enumerate() {
            for (z, &m) in plane.iter_mut().zip(mask.plane(plane_idx % s.echoes)) {
                *z *= m;
            }
        }

        Ok(Self {
            kspace,
            coil_maps: self.coil_maps.clone(),
            mask,
            flip: self.flip.clone(),
        })
    }

    /// Encoding operator over these inputs
    pub fn encoding(&self, centering: KspaceCentering) -> Result<EncodingOperator<'_>> {
        ensure_shape("coil maps", &self.kspace.shape().dims(), &self.coil_maps.shape().dims())?;
        EncodingOperator::new(&self.coil_maps, &self.mask, self.flip.as_ref(), centering)
    }
}

/// Zero-filled reconstruction `Aᴴy`
pub fn zero_filled(ctx: &ExecutionContext, inputs: &ReconInputs, centering: KspaceCentering) -> Result<ComplexImage> {
    inputs.encoding(centering)?.adjoint(ctx, &inputs.kspace)
}

/// Learnable scalars of the data-consistency step
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegularizationState {
    /// Regularization weight λ
    pub lambda: f32,
    /// Gradient step α of the quasi-Newton solver
    pub step_size: f32,
    /// ADMM penalty ρ
    pub rho: f32,
}

/// Result of one unrolled pass
#[derive(Clone, Debug)]
pub struct UnrollOutput {
    /// Zero-filled starting point `x_0`
    pub initial: ComplexImage,
    /// `x_1 ... x_K`
    pub estimates: Vec<ComplexImage>,
    /// `p_1 ... p_K`
    pub priors: Vec<ComplexImage>,
}

impl UnrollOutput {
    /// Last stage estimate
    pub fn final_estimate(&self) -> &ComplexImage {
        self.estimates.last().unwrap_or(&self.initial)
    }
}

/// Unrolled pass through a mask drawn from the learned sampling pattern
#[derive(Clone, Debug)]
pub struct LearnedReconstruction {
    pub output: UnrollOutput,
    /// Uniform draws the mask was thresholded against
    pub thresholds: Vec<f32>,
    /// Soft surrogate and the binary mask the operator used
    pub mask: DerivedMask,
}

/// Learnable parameters of a network, for the caller to persist
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
    pub regularization: RegularizationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_logits: Option<Vec<f32>>,
    #[serde(default)]
    pub denoiser: Vec<NamedParameter>,
}
