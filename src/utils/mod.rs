//! Utility functions for reconstruction
//!
//! This module provides common utility functions:
//! - Gradient operators (forward differences and their adjoint)
//! - SIMD-accelerated operations (optional, with `simd` feature)

pub mod gradient;
pub mod simd_ops;

pub use gradient::*;
pub use simd_ops::*;
