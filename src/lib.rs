//! qsm-unroll: unrolled data-consistency reconstruction for multi-echo MRI
//!
//! Reconstructs multi-coil, multi-echo k-space (gradient-echo / QSM
//! acquisitions) with K unrolled stages, each pairing a prior step with a
//! physics-based data-consistency solve through the coil-sensitivity
//! encoding operator.
//!
//! # Modules
//! - `cplx`: complex elementwise algebra and sign-alternation shifts
//! - `tensor`: shape-checked image, coil, mask and channel containers
//! - `fft`: batched unitary 2D FFT using rustfft
//! - `operators`: forward/adjoint encoding and the data-consistency normal operator
//! - `solvers`: conjugate gradient on complex images
//! - `denoisers`: prior step (identity, zero, residual CNN)
//! - `network`: unrolled reconstruction (quasi-Newton, CG and ADMM stages)
//! - `sampling`: LOUPE learned undersampling mask
//! - `export`: float32 volumes for the external susceptibility-mapping tool
//! - `utils`: gradient operators, SIMD kernels
//!
//! # Example
//! ```no_run
//! use qsm_unroll::{ExecutionContext, ReconConfig, ReconInputs, UnrolledNetwork};
//! # fn run(inputs: ReconInputs) -> qsm_unroll::Result<()> {
//! let net = UnrolledNetwork::new(ReconConfig::default())?;
//! let output = net.reconstruct(&ExecutionContext::global(), &inputs)?;
//! assert_eq!(output.estimates.len(), net.config().unrolls);
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod error;
pub mod context;
pub mod config;
pub mod cplx;
pub mod tensor;
pub mod fft;

// Algorithm modules
pub mod operators;
pub mod solvers;
pub mod denoisers;
pub mod network;
pub mod sampling;
pub mod utils;

// I/O modules
pub mod export;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use config::{ReconConfig, SolverKind};
pub use context::ExecutionContext;
pub use error::{ReconError, Result};
pub use network::{LearnedReconstruction, NetworkState, ReconInputs, RegularizationState, UnrollOutput, UnrolledNetwork};
pub use operators::{EncodingOperator, KspaceCentering, NormalOperator, Regularizer};
pub use tensor::{
    ChannelTensor, CoilMaps, CoilShape, ComplexImage, EchoLayout, FlipPattern, ImageShape, KSpace, SamplingMask,
};
