//! FFT wrapper for 2D plane transforms using rustfft
//!
//! Transforms one `nrows x ncols` plane at a time; callers spread planes over
//! an `ExecutionContext`. Planes are stored row-major (column index fastest),
//! matching the (batch, coil, echo, row, col) layout of the reconstruction
//! tensors.
//!
//! Both directions are unitary: forward and inverse are scaled by
//! `1/sqrt(nrows * ncols)`, so the inverse is the exact adjoint of the forward
//! transform and Parseval holds without extra factors.

use num_complex::Complex32;
use rustfft::{Fft, FftDirection, FftPlanner};
use std::sync::Arc;

/// Cached forward and inverse plans for one plane geometry.
///
/// Plans are shared between threads; scratch buffers are allocated per call
/// so the plan itself stays immutable.
#[derive(Clone)]
pub struct Fft2dPlan {
    nrows: usize,
    ncols: usize,
    scale: f32,
    // Forward FFT plans
    fft_row: Arc<dyn Fft<f32>>,
    fft_col: Arc<dyn Fft<f32>>,
    // Inverse FFT plans
    ifft_row: Arc<dyn Fft<f32>>,
    ifft_col: Arc<dyn Fft<f32>>,
}

impl Fft2dPlan {
    /// Create plans for `nrows x ncols` planes
    pub fn new(nrows: usize, ncols: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();

        // "row" plans run along the row index (length nrows), "col" plans along
        // the contiguous column index (length ncols).
        let fft_row = planner.plan_fft(nrows, FftDirection::Forward);
        let fft_col = planner.plan_fft(ncols, FftDirection::Forward);
        let ifft_row = planner.plan_fft(nrows, FftDirection::Inverse);
        let ifft_col = planner.plan_fft(ncols, FftDirection::Inverse);

        let n = (nrows * ncols).max(1) as f32;

        Self {
            nrows,
            ncols,
            scale: 1.0 / n.sqrt(),
            fft_row,
            fft_col,
            ifft_row,
            ifft_col,
        }
    }

    #[inline]
    pub fn plane_len(&self) -> usize {
        self.nrows * self.ncols
    }

    /// Transform a single plane in place
    pub fn transform_plane(&self, plane: &mut [Complex32], direction: FftDirection) {
        let (nrows, ncols) = (self.nrows, self.ncols);
        let (along_col, along_row) = match direction {
            FftDirection::Forward => (&self.fft_col, &self.fft_row),
            FftDirection::Inverse => (&self.ifft_col, &self.ifft_row),
        };

        let scratch_len = along_col
            .get_inplace_scratch_len()
            .max(along_row.get_inplace_scratch_len());
        let mut scratch = vec![Complex32::new(0.0, 0.0); scratch_len];

        // Transform along columns (contiguous, stride 1)
        for row in 0..nrows {
            let start = row * ncols;
            along_col.process_with_scratch(&mut plane[start..start + ncols], &mut scratch);
        }

        // Transform along rows (stride ncols)
        let mut buffer = vec![Complex32::new(0.0, 0.0); nrows];
        for col in 0..ncols {
            for row in 0..nrows {
                buffer[row] = plane[col + row * ncols];
            }
            along_row.process_with_scratch(&mut buffer, &mut scratch);
            for row in 0..nrows {
                plane[col + row * ncols] = buffer[row];
            }
        }

        // Unitary scaling
        for val in plane.iter_mut() {
            *val *= self.scale;
        }
    }
}

impl std::fmt::Debug for Fft2dPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft2dPlan")
            .field("nrows", &self.nrows)
            .field("ncols", &self.ncols)
            .finish()
    }
}
