//! Iterative solvers for the data-consistency step
//!
//! - CG: Conjugate gradient on complex images

pub mod cg;

pub use cg::*;
