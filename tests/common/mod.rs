//! Common test utilities for reconstruction integration tests

#![allow(dead_code)]

use num_complex::Complex32;
use qsm_unroll::{CoilMaps, CoilShape, ComplexImage, ImageShape, KSpace};
use rand::rngs::StdRng;
use rand::Rng;

/// ||a - b|| / ||b||
pub fn relative_error(a: &ComplexImage, b: &ComplexImage) -> f64 {
    let mut diff = 0.0f64;
    let mut norm = 0.0f64;
    for (x, y) in a.data().iter().zip(b.data()) {
        diff += (*x - *y).norm_sqr() as f64;
        norm += y.norm_sqr() as f64;
    }
    if norm == 0.0 {
        return diff.sqrt();
    }
    (diff / norm).sqrt()
}

/// RMSE of complex magnitudes, only within mask (non-zero values)
pub fn rmse(a: &ComplexImage, b: &ComplexImage, mask: &[f32]) -> f64 {
    let p = mask.len();
    let mut sum_sq = 0.0;
    let mut count = 0usize;
    for (i, (x, y)) in a.data().iter().zip(b.data()).enumerate() {
        if mask[i % p] > 0.0 {
            sum_sq += (*x - *y).norm_sqr() as f64;
            count += 1;
        }
    }
    if count == 0 {
        return 0.0;
    }
    (sum_sq / count as f64).sqrt()
}

pub fn random_image(rng: &mut StdRng, shape: ImageShape) -> ComplexImage {
    let data = (0..shape.len())
        .map(|_| Complex32::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
        .collect();
    ComplexImage::from_vec(shape, data).unwrap()
}

pub fn random_coil_data(rng: &mut StdRng, shape: CoilShape) -> KSpace {
    let data = (0..shape.len())
        .map(|_| Complex32::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
        .collect();
    KSpace::from_vec(shape, data).unwrap()
}

/// Coil 0 uniform, coil 1 a linear phase ramp along columns, energy normalized
pub fn two_coil_maps(echoes: usize, rows: usize, cols: usize) -> CoilMaps {
    let shape = CoilShape::new(1, 2, echoes, rows, cols);
    let mut data = Vec::with_capacity(shape.len());
    for c in 0..2 {
        for _ in 0..echoes {
            for _ in 0..rows {
                for col in 0..cols {
                    data.push(if c == 0 {
                        Complex32::new(1.0, 0.0)
                    } else {
                        Complex32::from_polar(1.0, 0.25 * col as f32)
                    });
                }
            }
        }
    }
    let mut csm = CoilMaps::from_vec(shape, data).unwrap();
    csm.normalize_energy();
    csm
}

/// Smooth complex phantom: a bright disc with a slow phase ramp per echo
pub fn phantom(shape: ImageShape) -> ComplexImage {
    let (rows, cols) = (shape.rows as f32, shape.cols as f32);
    let mut data = Vec::with_capacity(shape.len());
    for _ in 0..shape.batch {
        for e in 0..shape.echoes {
            for r in 0..shape.rows {
                for c in 0..shape.cols {
                    let dy = (r as f32 + 0.5) / rows - 0.5;
                    let dx = (c as f32 + 0.5) / cols - 0.5;
                    let mag = if dx * dx + dy * dy < 0.12 { 1.0 } else { 0.2 };
                    let phase = 0.3 * (e as f32 + 1.0) * dx;
                    data.push(Complex32::from_polar(mag, phase));
                }
            }
        }
    }
    ComplexImage::from_vec(shape, data).unwrap()
}
