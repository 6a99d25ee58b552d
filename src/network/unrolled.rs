//! Unrolled network driver
//!
//! Owns the learnable state (regularization scalars, denoiser weights and
//! optional learned mask logits). `reconstruct` borrows it immutably, so
//! one network can serve concurrent calls.

use rand::Rng;

use crate::config::{ReconConfig, SolverKind};
use crate::context::ExecutionContext;
use crate::denoisers::Denoiser;
use crate::error::{ensure_shape, ReconError, Result};
use crate::network::data_consistency::{self, AdmmParams};
use crate::network::{LearnedReconstruction, NetworkState, ReconInputs, RegularizationState, UnrollOutput};
use crate::operators::NormalOperator;
use crate::sampling::LearnedMask;
use crate::tensor::{ComplexImage, EchoLayout, SamplingMask};

/// K-stage unrolled reconstruction network
pub struct UnrolledNetwork {
    config: ReconConfig,
    regularization: RegularizationState,
    denoiser: Box<dyn Denoiser>,
    learned_mask: Option<LearnedMask>,
}

impl UnrolledNetwork {
    pub fn new(config: ReconConfig) -> Result<Self> {
        config.validate()?;
        let denoiser = config.denoiser.build(config.denoiser_channels(), config.seed)?;
        let learned_mask = config.learned_mask.clone().map(LearnedMask::new).transpose()?;
        let regularization = RegularizationState {
            lambda: config.lambda,
            step_size: config.step_size,
            rho: config.rho,
        };

        log::debug!(
            "unrolled network: {} stages, {:?} solver, {:?} regularizer, {} denoiser",
            config.unrolls,
            config.solver,
            config.regularizer,
            denoiser.name()
        );

        Ok(Self { config, regularization, denoiser, learned_mask })
    }

    pub fn config(&self) -> &ReconConfig {
        &self.config
    }

    pub fn regularization(&self) -> RegularizationState {
        self.regularization
    }

    pub fn regularization_mut(&mut self) -> &mut RegularizationState {
        &mut self.regularization
    }

    pub fn denoiser(&self) -> &dyn Denoiser {
        self.denoiser.as_ref()
    }

    pub fn learned_mask(&self) -> Option<&LearnedMask> {
        self.learned_mask.as_ref()
    }

    pub fn learned_mask_mut(&mut self) -> Option<&mut LearnedMask> {
        self.learned_mask.as_mut()
    }


    /// Snapshot of every learnable parameter
    pub fn state(&self) -> NetworkState {
        NetworkState {
            regularization: self.regularization,
            mask_logits: self.learned_mask.as_ref().map(|m| m.logits().to_vec()),
            denoiser: self.denoiser.parameters(),
        }
    }

    /// Restore a snapshot taken from a network with the same configuration
    pub fn load_state(&mut self, state: &NetworkState) -> Result<()> {
        let r = state.regularization;
        if !(r.lambda >= 0.0 && r.step_size > 0.0 && r.rho > 0.0) {
            return Err(ReconError::InvalidConfig(format!("invalid regularization state {:?}", r)));
        }
        match (&self.learned_mask, &state.mask_logits) {
            (Some(mask), Some(logits)) => ensure_shape("mask logits", &[mask.len()], &[logits.len()])?,
            (Some(_), None) => return Err(ReconError::MissingParameter("mask_logits".to_string())),
            (None, Some(_)) => {
                return Err(ReconError::InvalidConfig(
                    "state carries mask logits but the network has no learned mask".to_string(),
                ))
            }
            (None, None) => {}
        }

        self.denoiser.load_parameters(&state.denoiser)?;
        if let (Some(mask), Some(logits)) = (self.learned_mask.as_mut(), &state.mask_logits) {
            mask.set_logits(logits.clone())?;
        }
        self.regularization = r;
        Ok(())
    }

    /// Zero-filled reconstruction `Aᴴy`
    pub fn zero_filled(&self, ctx: &ExecutionContext, inputs: &ReconInputs) -> Result<ComplexImage> {
        super::zero_filled(ctx, inputs, self.config.centering)
    }

    /// Prior step on the channel view of `x`
    pub fn prior(&self, ctx: &ExecutionContext, x: &ComplexImage) -> Result<ComplexImage> {
        let layout = self.config.echo_layout;
        let channels = x.to_channels(layout);
        let denoised = self.denoiser.denoise(ctx, &channels)?;
        ComplexImage::from_channels(x.shape(), layout, &denoised)
    }

    fn require_learned_mask(&self) -> Result<&LearnedMask> {
        self.learned_mask
            .as_ref()
            .ok_or_else(|| ReconError::MissingParameter("learned_mask".to_string()))
    }

    /// Run all K stages through the learned mask thresholded at `thresholds`
    ///
    /// The derived binary mask replaces `inputs.mask` and re-masks the
    /// measured k-space, so `inputs` should carry the fully sampled
    /// acquisition. The returned thresholds and soft mask pair with
    /// `LearnedMask::backward`.
    pub fn reconstruct_learned(
        &self,
        ctx: &ExecutionContext,
        inputs: &ReconInputs,
        thresholds: &[f32],
    ) -> Result<LearnedReconstruction> {
        let learned = self.require_learned_mask()?;
        let derived = learned.derive_mask(thresholds)?;
        let cfg = learned.config();
        let mask = SamplingMask::new(cfg.echoes, cfg.rows, cfg.cols, derived.binary.clone())?;
        log::debug!("learned mask samples {:.1}% of k-space", 100.0 * mask.sampling_ratio());

        let output = self.reconstruct(ctx, &inputs.with_mask(mask)?)?;
        Ok(LearnedReconstruction { output, thresholds: thresholds.to_vec(), mask: derived })
    }

    /// Draw fresh thresholds from `rng`, then `reconstruct_learned`
    pub fn reconstruct_sampled<R: Rng + ?Sized>(
        &self,
        ctx: &ExecutionContext,
        inputs: &ReconInputs,
        rng: &mut R,
    ) -> Result<LearnedReconstruction> {
        let thresholds = self.require_learned_mask()?.sample_thresholds(rng);
        self.reconstruct_learned(ctx, inputs, &thresholds)
    }

    /// Run all K stages
    ///
    /// # Returns
    /// The zero-filled start, K estimates and the K priors they were pulled toward
    pub fn reconstruct(&self, ctx: &ExecutionContext, inputs: &ReconInputs) -> Result<UnrollOutput> {
        let encoding = inputs.encoding(self.config.centering)?;
        let shape = encoding.image_shape();
        // separate echoes always reach the denoiser as two channels
        if self.config.echo_layout == EchoLayout::Concatenated && shape.echoes != self.config.echoes {
            return Err(ReconError::ShapeMismatch {
                what: "echoes",
                expected: vec![self.config.echoes],
                actual: vec![shape.echoes],
            });
        }

        let RegularizationState { lambda, step_size, rho } = self.regularization;
        let regularizer = self.config.regularizer;
        let normal = NormalOperator::new(&encoding, lambda, regularizer);

        let aty = encoding.adjoint(ctx, &inputs.kspace)?;
        let mut x = aty.clone();
        let mut estimates = Vec::with_capacity(self.config.unrolls);
        let mut priors = Vec::with_capacity(self.config.unrolls);

        for k in 0..self.config.unrolls {
            let prior = self.prior(ctx, &x)?;

            x = match self.config.solver {
                SolverKind::QuasiNewton => data_consistency::quasi_newton(
                    ctx, &normal, &aty, &x, &prior, step_size, self.config.inner_iterations,
                )?,
                SolverKind::ConjugateGradient => data_consistency::conjugate_gradient(
                    ctx, &normal, &aty, &x, &prior, self.config.inner_iterations,
                )?,
                SolverKind::Admm => {
                    let params = AdmmParams {
                        lambda,
                        rho,
                        regularizer,
                        iterations: self.config.inner_iterations,
                        cg_iterations: self.config.cg_iterations,
                    };
                    data_consistency::admm(ctx, &encoding, &aty, &x, &prior, params)?
                }
            };

            if log::log_enabled!(log::Level::Debug) {
                let residual = encoding.data_residual(ctx, &x, &inputs.kspace)?;
                log::debug!("stage {}/{}: data residual {:.6e}", k + 1, self.config.unrolls, residual);
            }

            priors.push(prior);
            estimates.push(x.clone());
        }

        log::info!(
            "reconstructed {:?} with {} unrolled stages",
            shape.dims(),
            self.config.unrolls
        );

        Ok(UnrollOutput { initial: aty, estimates, priors })
    }
}

impl std::fmt::Debug for UnrolledNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnrolledNetwork")
            .field("config", &self.config)
            .field("regularization", &self.regularization)
            .field("denoiser", &self.denoiser.name())
            .field("learned_mask", &self.learned_mask.is_some())
            .finish()
    }
}
