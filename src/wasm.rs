//! WebAssembly exports
//!
//! Flat buffers cross the boundary: complex data is interleaved (re, im)
//! float32, laid out (coil, echo, row, col) for k-space and coil maps and
//! (echo, row, col) for images. One slice per call.

use wasm_bindgen::prelude::*;

use crate::config::{ReconConfig, SolverKind};
use crate::context::ExecutionContext;
use crate::error::ReconError;
use crate::network::{self, ReconInputs, UnrolledNetwork};
use crate::operators::KspaceCentering;
use crate::tensor::{CoilMaps, CoilShape, FlipPattern, KSpace, SamplingMask};

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console)]
    fn log(s: &str);
}

macro_rules! console_log {
    ($($t:tt)*) => (log(&format_args!($($t)*).to_string()))
}

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

fn to_js(err: ReconError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

#[allow(clippy::too_many_arguments)]
fn build_inputs(
    kspace: &[f32],
    csm: &[f32],
    mask: &[f32],
    ncoils: usize,
    nechoes: usize,
    nrows: usize,
    ncols: usize,
    flip: bool,
) -> Result<ReconInputs, ReconError> {
    let shape = CoilShape::new(1, ncoils, nechoes, nrows, ncols);
    let plane = nrows * ncols;
    if plane == 0 || mask.len() % plane != 0 {
        return Err(ReconError::InvalidDimension(format!(
            "mask of {} values does not tile {}x{} planes",
            mask.len(),
            nrows,
            ncols
        )));
    }
    let mask = SamplingMask::new(mask.len() / plane, nrows, ncols, mask.to_vec())?;
    let flip = if flip { Some(FlipPattern::checkerboard(nechoes, nrows, ncols)) } else { None };
    ReconInputs::new(
        KSpace::from_interleaved(shape, kspace)?,
        CoilMaps::from_interleaved(shape, csm)?,
        mask,
        flip,
    )
}

// ============================================================================
// WASM Exports: Reconstruction
// ============================================================================

/// Zero-filled coil-combined reconstruction
///
/// # Arguments
/// * `kspace` - Interleaved k-space (2 * ncoils * nechoes * nrows * ncols)
/// * `csm` - Interleaved coil maps, same layout as `kspace`
/// * `mask` - Sampling mask (nrows * ncols, or nechoes * nrows * ncols)
/// * `ncoils`, `nechoes`, `nrows`, `ncols` - Dimensions
/// * `flip` - Apply the checkerboard sign correction
///
/// # Returns
/// Interleaved image (2 * nechoes * nrows * ncols)
#[wasm_bindgen]
#[allow(clippy::too_many_arguments)]
pub fn zero_filled_wasm(
    kspace: &[f32],
    csm: &[f32],
    mask: &[f32],
    ncoils: usize,
    nechoes: usize,
    nrows: usize,
    ncols: usize,
    flip: bool,
) -> Result<Vec<f32>, JsValue> {
    console_log!("WASM zero_filled: {} coils, {} echoes, {}x{}", ncoils, nechoes, nrows, ncols);

    let inputs = build_inputs(kspace, csm, mask, ncoils, nechoes, nrows, ncols, flip).map_err(to_js)?;
    let image = network::zero_filled(&ExecutionContext::sequential(), &inputs, KspaceCentering::None)
        .map_err(to_js)?;

    console_log!("WASM zero_filled complete");
    Ok(image.to_interleaved())
}

/// TV-regularized unrolled reconstruction (zero prior, smoothed l1-TV)
///
/// # Arguments
/// * `kspace`, `csm`, `mask`, `ncoils`, `nechoes`, `nrows`, `ncols`, `flip` - As in `zero_filled_wasm`
/// * `unrolls` - Number of stages
/// * `lambda` - TV weight
/// * `admm` - Use ADMM stages instead of gradient steps
///
/// # Returns
/// Interleaved final estimate (2 * nechoes * nrows * ncols)
#[wasm_bindgen]
#[allow(clippy::too_many_arguments)]
pub fn tv_unrolled_wasm(
    kspace: &[f32],
    csm: &[f32],
    mask: &[f32],
    ncoils: usize,
    nechoes: usize,
    nrows: usize,
    ncols: usize,
    flip: bool,
    unrolls: usize,
    lambda: f32,
    admm: bool,
) -> Result<Vec<f32>, JsValue> {
    console_log!(
        "WASM tv_unrolled: {} coils, {} echoes, {}x{}, K={}, lambda={:.2e}, admm={}",
        ncoils, nechoes, nrows, ncols, unrolls, lambda, admm
    );

    let solver = if admm { SolverKind::Admm } else { SolverKind::QuasiNewton };
    let config = ReconConfig::tv_unrolled(unrolls, nechoes, solver, lambda);
    let net = UnrolledNetwork::new(config).map_err(to_js)?;
    let inputs = build_inputs(kspace, csm, mask, ncoils, nechoes, nrows, ncols, flip).map_err(to_js)?;
    let output = net.reconstruct(&ExecutionContext::sequential(), &inputs).map_err(to_js)?;

    console_log!("WASM tv_unrolled complete");
    Ok(output.final_estimate().to_interleaved())
}

/// Reconstruction driven by a JSON `ReconConfig`
#[wasm_bindgen]
#[allow(clippy::too_many_arguments)]
pub fn reconstruct_wasm(
    config_json: &str,
    kspace: &[f32],
    csm: &[f32],
    mask: &[f32],
    ncoils: usize,
    nechoes: usize,
    nrows: usize,
    ncols: usize,
    flip: bool,
) -> Result<Vec<f32>, JsValue> {
    let config = ReconConfig::from_json(config_json).map_err(to_js)?;
    console_log!("WASM reconstruct: {:?} solver, K={}", config.solver, config.unrolls);

    let net = UnrolledNetwork::new(config).map_err(to_js)?;
    let inputs = build_inputs(kspace, csm, mask, ncoils, nechoes, nrows, ncols, flip).map_err(to_js)?;
    let output = net.reconstruct(&ExecutionContext::sequential(), &inputs).map_err(to_js)?;

    console_log!("WASM reconstruct complete");
    Ok(output.final_estimate().to_interleaved())
}
