//! Reconstruction configuration
//!
//! Loaded from JSON with `serde`; every field has a default so partial
//! documents are accepted. `validate` checks cross-field constraints once,
//! before a network is built.

use serde::{Deserialize, Serialize};

use crate::denoisers::DenoiserKind;
use crate::error::{ReconError, Result};
use crate::operators::{KspaceCentering, Regularizer};
use crate::sampling::LearnedMaskConfig;
use crate::tensor::EchoLayout;

/// Data-consistency solver of each unrolled stage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Gradient descent with a learnable step size
    #[default]
    QuasiNewton,
    /// Conjugate gradient on the regularized normal equations
    ConjugateGradient,
    /// Alternating direction method of multipliers
    Admm,
}

/// Unrolled network configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconConfig {
    /// Number of unrolled stages K
    pub unrolls: usize,
    /// Echoes of the data the network is built for
    pub echoes: usize,
    pub solver: SolverKind,
    pub regularizer: Regularizer,
    pub echo_layout: EchoLayout,
    /// Gradient steps (QN), CG steps (CG) or ADMM iterations (ADMM) per stage
    pub inner_iterations: usize,
    /// CG steps of each ADMM x-update
    pub cg_iterations: usize,
    /// Initial regularization weight λ
    pub lambda: f32,
    /// Initial gradient step α
    pub step_size: f32,
    /// ADMM penalty ρ
    pub rho: f32,
    pub centering: KspaceCentering,
    pub denoiser: DenoiserKind,
    /// Seed of the denoiser weight initialization
    pub seed: u64,
    /// Trainable sampling pattern, if any
    pub learned_mask: Option<LearnedMaskConfig>,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            unrolls: 5,
            echoes: 1,
            solver: SolverKind::QuasiNewton,
            regularizer: Regularizer::Identity,
            echo_layout: EchoLayout::Concatenated,
            inner_iterations: 1,
            cg_iterations: 10,
            lambda: 1e-3,
            step_size: 0.1,
            rho: 1e-1,
            centering: KspaceCentering::None,
            denoiser: DenoiserKind::default(),
            seed: 0,
            learned_mask: None,
        }
    }
}

impl ReconConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ReconConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Plain regularized iterations: zero prior, TV penalty, echoes concatenated
    pub fn tv_unrolled(unrolls: usize, echoes: usize, solver: SolverKind, lambda: f32) -> Self {
        Self {
            unrolls,
            echoes,
            solver,
            regularizer: Regularizer::TvL1,
            echo_layout: EchoLayout::Concatenated,
            lambda,
            denoiser: DenoiserKind::Zero,
            ..Default::default()
        }
    }

    /// Input channels seen by the denoiser
    pub fn denoiser_channels(&self) -> usize {
        match self.echo_layout {
            EchoLayout::Concatenated => 2 * self.echoes,
            EchoLayout::Separate => 2,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.unrolls == 0 {
            return Err(ReconError::InvalidConfig("at least one unrolled stage is required".to_string()));
        }
        if self.echoes == 0 {
            return Err(ReconError::InvalidConfig("echoes must be non-zero".to_string()));
        }
        if self.inner_iterations == 0 {
            return Err(ReconError::InvalidConfig("inner_iterations must be non-zero".to_string()));
        }
        if !(self.lambda >= 0.0 && self.lambda.is_finite()) {
            return Err(ReconError::InvalidConfig(format!("lambda must be >= 0, got {}", self.lambda)));
        }
        match self.solver {
            SolverKind::QuasiNewton => {
                if !(self.step_size > 0.0 && self.step_size.is_finite()) {
                    return Err(ReconError::InvalidConfig(format!(
                        "step_size must be positive, got {}",
                        self.step_size
                    )));
                }
            }
            SolverKind::ConjugateGradient => {
                if !self.regularizer.is_linear() {
                    return Err(ReconError::InvalidConfig(format!(
                        "conjugate gradient needs a linear regularizer, got {:?}",
                        self.regularizer
                    )));
                }
            }
            SolverKind::Admm => {
                if !(self.rho > 0.0 && self.rho.is_finite()) {
                    return Err(ReconError::InvalidConfig(format!("rho must be positive, got {}", self.rho)));
                }
                if self.cg_iterations == 0 {
                    return Err(ReconError::InvalidConfig("cg_iterations must be non-zero".to_string()));
                }
            }
        }
        if let Some(mask) = &self.learned_mask {
            mask.validate()?;
            if mask.echoes != 1 && mask.echoes != self.echoes {
                return Err(ReconError::InvalidConfig(format!(
                    "learned mask has {} planes for {} echoes",
                    mask.echoes, self.echoes
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ReconConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.unrolls, 5);
        assert_eq!(config.lambda, 1e-3);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = ReconConfig {
            solver: SolverKind::Admm,
            regularizer: Regularizer::TvL1,
            echoes: 3,
            learned_mask: Some(LearnedMaskConfig { rows: 8, cols: 8, ..Default::default() }),
            ..Default::default()
        };
        let json = config.to_json().unwrap();
        assert_eq!(ReconConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_partial_document() {
        let config = ReconConfig::from_json(r#"{"unrolls": 3, "solver": "admm", "echo_layout": "separate"}"#).unwrap();
        assert_eq!(config.unrolls, 3);
        assert_eq!(config.solver, SolverKind::Admm);
        assert_eq!(config.echo_layout, EchoLayout::Separate);
        assert_eq!(config.inner_iterations, 1);
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(ReconConfig::from_json("{\"unrolls\": "), Err(ReconError::Config(_))));
        assert!(matches!(
            ReconConfig::from_json(r#"{"unrolls": 0}"#),
            Err(ReconError::InvalidConfig(_))
        ));
        assert!(ReconConfig::from_json(r#"{"solver": "conjugate_gradient", "regularizer": "tv_l1"}"#).is_err());
        assert!(ReconConfig::from_json(r#"{"solver": "admm", "rho": 0.0}"#).is_err());
    }

    #[test]
    fn test_denoiser_channels() {
        let mut config = ReconConfig { echoes: 4, ..Default::default() };
        assert_eq!(config.denoiser_channels(), 8);
        config.echo_layout = EchoLayout::Separate;
        assert_eq!(config.denoiser_channels(), 2);
        assert_eq!(ReconConfig::tv_unrolled(10, 2, SolverKind::Admm, 1e-3).denoiser, DenoiserKind::Zero);
    }
}
