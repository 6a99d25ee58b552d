//! Error type shared by every reconstruction component

use thiserror::Error;

/// Errors raised by the reconstruction core.
///
/// Every variant is raised before any computation starts, so a failed call
/// never leaves partially written outputs behind.
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("invalid dimension: {0}")]
    InvalidDimension(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("missing parameter `{0}`")]
    MissingParameter(String),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("malformed configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReconError>;

/// Check that `actual` equals `expected`, reporting `what` otherwise.
pub(crate) fn ensure_shape(what: &'static str, expected: &[usize], actual: &[usize]) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ReconError::ShapeMismatch {
            what,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}
