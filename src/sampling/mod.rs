//! Undersampling pattern parameterization
//!
//! - `loupe`: learned probabilistic mask with straight-through sampling

pub mod loupe;

pub use loupe::{DerivedMask, LearnedMask, LearnedMaskConfig};
