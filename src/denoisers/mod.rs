//! Prior (denoising) step of the unrolled network
//!
//! The network only relies on the black-box contract of `Denoiser`: a real
//! channel tensor in, a tensor of the same shape out. Variants are chosen
//! by `DenoiserKind`:
//! - `Identity`: passes the estimate through
//! - `Zero`: zero prior, which turns the unrolled network into plain
//!   regularized (e.g. TV) iterations
//! - `ResidualCnn`: 3x3 convolutional residual network, optionally with
//!   squeeze-and-excitation channel attention

pub mod resnet;

use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::error::Result;
use crate::tensor::ChannelTensor;

pub use resnet::ResidualCnn;

/// A named flat weight buffer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedParameter {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl NamedParameter {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, values: Vec<f32>) -> Self {
        Self { name: name.into(), shape, values }
    }
}

/// Prior update `p = D(x)` on the channel view of an image
pub trait Denoiser: Send + Sync {
    fn name(&self) -> &'static str;

    /// Output has the same dimensions as `input`
    fn denoise(&self, ctx: &ExecutionContext, input: &ChannelTensor) -> Result<ChannelTensor>;

    /// Learnable weights, in a stable order
    fn parameters(&self) -> Vec<NamedParameter>;

    /// Restore weights previously returned by `parameters`
    fn load_parameters(&mut self, params: &[NamedParameter]) -> Result<()>;
}

/// Pass-through prior
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityDenoiser;

impl Denoiser for IdentityDenoiser {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn denoise(&self, _ctx: &ExecutionContext, input: &ChannelTensor) -> Result<ChannelTensor> {
        Ok(input.clone())
    }

    fn parameters(&self) -> Vec<NamedParameter> {
        Vec::new()
    }

    fn load_parameters(&mut self, _params: &[NamedParameter]) -> Result<()> {
        Ok(())
    }
}

/// Zero prior
#[derive(Clone, Copy, Debug, Default)]
pub struct ZeroDenoiser;

impl Denoiser for ZeroDenoiser {
    fn name(&self) -> &'static str {
        "zero"
    }

    fn denoise(&self, _ctx: &ExecutionContext, input: &ChannelTensor) -> Result<ChannelTensor> {
        let [b, c, r, w] = input.dims();
        Ok(ChannelTensor::zeros(b, c, r, w))
    }

    fn parameters(&self) -> Vec<NamedParameter> {
        Vec::new()
    }

    fn load_parameters(&mut self, _params: &[NamedParameter]) -> Result<()> {
        Ok(())
    }
}

/// Denoiser selection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DenoiserKind {
    Identity,
    Zero,
    ResidualCnn {
        /// Feature channels of the hidden layers
        features: usize,
        /// Number of convolution layers (>= 2)
        depth: usize,
        /// Squeeze-and-excitation on the last hidden layer
        attention: bool,
    },
}

impl Default for DenoiserKind {
    fn default() -> Self {
        DenoiserKind::ResidualCnn { features: 32, depth: 5, attention: false }
    }
}

impl DenoiserKind {
    /// Instantiate for `channels` input channels; weights are seeded by `seed`
    pub fn build(&self, channels: usize, seed: u64) -> Result<Box<dyn Denoiser>> {
        Ok(match *self {
            DenoiserKind::Identity => Box::new(IdentityDenoiser),
            DenoiserKind::Zero => Box::new(ZeroDenoiser),
            DenoiserKind::ResidualCnn { features, depth, attention } => {
                Box::new(ResidualCnn::new(channels, features, depth, attention, seed)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(dims: [usize; 4]) -> ChannelTensor {
        let n = dims.iter().product();
        ChannelTensor::from_vec(dims, (0..n).map(|i| (i as f32 * 0.3).sin()).collect()).unwrap()
    }

    #[test]
    fn test_identity_and_zero() {
        let ctx = ExecutionContext::sequential();
        let x = ramp([2, 4, 3, 3]);

        assert_eq!(IdentityDenoiser.denoise(&ctx, &x).unwrap(), x);
        let z = ZeroDenoiser.denoise(&ctx, &x).unwrap();
        assert_eq!(z.dims(), x.dims());
        assert!(z.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_build_from_kind() {
        let d = DenoiserKind::Zero.build(2, 0).unwrap();
        assert_eq!(d.name(), "zero");
        let d = DenoiserKind::default().build(4, 0).unwrap();
        assert_eq!(d.name(), "residual_cnn");
        assert!(!d.parameters().is_empty());
        assert!(DenoiserKind::ResidualCnn { features: 8, depth: 1, attention: false }.build(2, 0).is_err());
    }

    #[test]
    fn test_kind_serde() {
        let kind = DenoiserKind::ResidualCnn { features: 16, depth: 3, attention: true };
        let json = serde_json::to_string(&kind).unwrap();
        assert!(json.contains("\"type\":\"residual_cnn\""));
        assert_eq!(serde_json::from_str::<DenoiserKind>(&json).unwrap(), kind);
        assert_eq!(serde_json::from_str::<DenoiserKind>(r#"{"type":"zero"}"#).unwrap(), DenoiserKind::Zero);
    }
}
