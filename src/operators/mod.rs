//! MRI operators
//!
//! - `encoding`: multi-coil forward/adjoint encoding `A`, `Aᴴ`
//! - `normal`: data-consistency operator `AᴴA + λR`

pub mod encoding;
pub mod normal;

pub use encoding::{EncodingOperator, KspaceCentering};
pub use normal::{NormalOperator, Regularizer, TV_SMOOTHING_EPS};
