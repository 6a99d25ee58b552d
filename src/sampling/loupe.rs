//! LOUPE: learned probabilistic undersampling pattern
//!
//! Pipeline from trainable logits to a k-space mask:
//!
//! 1. `p = sigmoid(slope * logit)`
//! 2. rescale so the mean over the learnable entries hits the adjusted target
//!    `s' = (s·N - n_cal) / (N - n_cal)`; with the calibration block forced to 1
//!    the mean over all N entries is then exactly `s`:
//!    - `mean(p) >= s'`: `p' = p · s' / mean(p)`
//!    - otherwise:      `p' = 1 - (1 - p)(1 - s') / (1 - mean(p))`
//! 3. threshold against uniform draws `u`:
//!    soft `sigmoid(sample_slope · (p' - u))`, binary `p' > u`
//!
//! The binary mask is used in the forward pass and the soft mask carries the
//! gradient (straight-through estimator). `backward` is the exact
//! vector-Jacobian product of steps 1-3, including the mean in the rescale.

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_shape, ReconError, Result};
use crate::tensor::SamplingMask;
use crate::utils::simd_ops::sigmoid;

/// Geometry and hyper-parameters of a learned mask
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnedMaskConfig {
    /// Mask planes: 1 (shared by all echoes) or the number of echoes
    pub echoes: usize,
    pub rows: usize,
    pub cols: usize,
    /// Target fraction of sampled k-space locations
    pub sparsity: f32,
    /// Slope of the logit sigmoid
    pub slope: f32,
    /// Slope of the soft thresholding sigmoid
    pub sample_slope: f32,
    /// Fully sampled centered block (rows, cols); [0, 0] disables it
    pub calibration: [usize; 2],
    /// Seed of the logit initialization
    pub seed: u64,
}

impl Default for LearnedMaskConfig {
    fn default() -> Self {
        Self {
            echoes: 1,
            rows: 0,
            cols: 0,
            sparsity: 0.1,
            slope: 5.0,
            sample_slope: 12.0,
            calibration: [0, 0],
            seed: 0,
        }
    }
}

impl LearnedMaskConfig {
    pub fn validate(&self) -> Result<()> {
        if self.echoes == 0 || self.rows == 0 || self.cols == 0 {
            return Err(ReconError::InvalidConfig(format!(
                "learned mask needs non-zero geometry, got {}x{}x{}",
                self.echoes, self.rows, self.cols
            )));
        }
        if !(self.sparsity > 0.0 && self.sparsity < 1.0) {
            return Err(ReconError::InvalidConfig(format!(
                "mask sparsity must lie in (0, 1), got {}",
                self.sparsity
            )));
        }
        if self.slope <= 0.0 || self.sample_slope <= 0.0 {
            return Err(ReconError::InvalidConfig("mask slopes must be positive".to_string()));
        }
        let [cr, cc] = self.calibration;
        if cr > self.rows || cc > self.cols {
            return Err(ReconError::InvalidConfig(format!(
                "calibration block {}x{} exceeds the {}x{} plane",
                cr, cc, self.rows, self.cols
            )));
        }
        let n = (self.echoes * self.rows * self.cols) as f32;
        let n_cal = (self.echoes * cr * cc) as f32;
        if self.sparsity * n <= n_cal || n_cal >= n {
            return Err(ReconError::InvalidConfig(format!(
                "sparsity {} leaves no budget outside the calibration block",
                self.sparsity
            )));
        }
        Ok(())
    }
}

/// Masks derived from one set of thresholds
#[derive(Clone, Debug, PartialEq)]
pub struct DerivedMask {
    /// Differentiable surrogate
    pub soft: Vec<f32>,
    /// 0/1 mask used in the forward pass
    pub binary: Vec<f32>,
}

/// Trainable sampling pattern
#[derive(Clone, Debug)]
pub struct LearnedMask {
    config: LearnedMaskConfig,
    logits: Vec<f32>,
    calibration: Vec<bool>,
}

impl LearnedMask {
    /// Initialize logits so that `p` is uniform on (0, 1)
    pub fn new(config: LearnedMaskConfig) -> Result<Self> {
        config.validate()?;
        let n = config.echoes * config.rows * config.cols;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let eps = 1e-2f32;
        let logits = (0..n)
            .map(|_| {
                let x: f32 = rng.gen_range(eps..1.0 - eps);
                -(1.0 / x - 1.0).ln() / config.slope
            })
            .collect();
        let calibration = calibration_region(&config);
        Ok(Self { config, logits, calibration })
    }

    pub fn config(&self) -> &LearnedMaskConfig {
        &self.config
    }

    /// Number of mask entries
    pub fn len(&self) -> usize {
        self.logits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logits.is_empty()
    }

    pub fn logits(&self) -> &[f32] {
        &self.logits
    }

    pub fn set_logits(&mut self, logits: Vec<f32>) -> Result<()> {
        ensure_shape("mask logits", &[self.logits.len()], &[logits.len()])?;
        self.logits = logits;
        Ok(())
    }

    /// Plain SGD step on the logits
    pub fn apply_gradient(&mut self, grad: &[f32], learning_rate: f32) -> Result<()> {
        ensure_shape("mask logit gradient", &[self.logits.len()], &[grad.len()])?;
        for (l, &g) in self.logits.iter_mut().zip(grad) {
            *l -= learning_rate * g;
        }
        Ok(())
    }

    /// `sigmoid(slope * logit)`
    pub fn probability(&self) -> Vec<f32> {
        let slope = self.config.slope;
        self.logits.iter().map(|&l| sigmoid(slope * l)).collect()
    }

    /// Adjusted target over the learnable entries
    fn learnable_target(&self) -> f32 {
        let n = self.logits.len() as f32;
        let n_cal = self.calibration.iter().filter(|&&c| c).count() as f32;
        (self.config.sparsity * n - n_cal) / (n - n_cal)
    }

    /// Mean probability over the learnable entries
    fn learnable_mean(&self, p: &[f32]) -> f32 {
        let (sum, count) = p
            .iter()
            .zip(&self.calibration)
            .filter(|(_, &cal)| !cal)
            .fold((0.0f64, 0usize), |(s, c), (&v, _)| (s + v as f64, c + 1));
        (sum / count.max(1) as f64) as f32
    }

    /// Probability rescaled to the target sparsity, calibration entries at 1
    pub fn rescaled(&self) -> Vec<f32> {
        let p = self.probability();
        let target = self.learnable_target();
        let mean = self.learnable_mean(&p);

        p.iter()
            .zip(&self.calibration)
            .map(|(&pi, &cal)| {
                if cal {
                    1.0
                } else if mean >= target {
                    pi * target / mean
                } else {
                    1.0 - (1.0 - pi) * (1.0 - target) / (1.0 - mean)
                }
            })
            .collect()
    }

    /// Draw one uniform threshold per entry
    pub fn sample_thresholds<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f32> {
        (0..self.logits.len()).map(|_| rng.gen::<f32>()).collect()
    }

    /// Soft and binary masks for the given thresholds
    pub fn derive_mask(&self, thresholds: &[f32]) -> Result<DerivedMask> {
        ensure_shape("mask thresholds", &[self.logits.len()], &[thresholds.len()])?;
        let p = self.rescaled();
        let a = self.config.sample_slope;

        let mut soft = Vec::with_capacity(p.len());
        let mut binary = Vec::with_capacity(p.len());
        for ((&pi, &u), &cal) in p.iter().zip(thresholds).zip(&self.calibration) {
            if cal {
                soft.push(1.0);
                binary.push(1.0);
            } else {
                soft.push(sigmoid(a * (pi - u)));
                binary.push(if pi > u { 1.0 } else { 0.0 });
            }
        }
        Ok(DerivedMask { soft, binary })
    }

    /// Draw thresholds and return the binary mask for the encoding operator
    pub fn sample_mask<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<SamplingMask> {
        let thresholds = self.sample_thresholds(rng);
        let derived = self.derive_mask(&thresholds)?;
        SamplingMask::new(self.config.echoes, self.config.rows, self.config.cols, derived.binary)
    }

    /// Gradient w.r.t. the logits given the gradient w.r.t. the mask
    ///
    /// # Arguments
    /// * `thresholds` - The draws used in the forward pass
    /// * `grad_mask` - dL/dmask, passed straight through to the soft mask
    ///
    /// # Returns
    /// dL/dlogit, zero on calibration entries
    pub fn backward(&self, thresholds: &[f32], grad_mask: &[f32]) -> Result<Vec<f32>> {
        let n = self.logits.len();
        ensure_shape("mask thresholds", &[n], &[thresholds.len()])?;
        ensure_shape("mask gradient", &[n], &[grad_mask.len()])?;

        let p = self.probability();
        let target = self.learnable_target();
        let mean = self.learnable_mean(&p);
        let derived = self.derive_mask(thresholds)?;
        let a = self.config.sample_slope;
        let n_learn = self.calibration.iter().filter(|&&c| !c).count().max(1) as f32;

        // Through the soft threshold: d soft / d p' = a · s (1 - s)
        let g_rescaled: Vec<f32> = grad_mask
            .iter()
            .zip(&derived.soft)
            .zip(&self.calibration)
            .map(|((&g, &s), &cal)| if cal { 0.0 } else { g * a * s * (1.0 - s) })
            .collect();

        // Through the rescale, including its dependence on mean(p)
        let mut g_p = vec![0.0f32; n];
        if mean >= target {
            let coupling: f32 = g_rescaled.iter().zip(&p).map(|(&g, &pi)| g * pi).sum();
            let shared = target * coupling / (mean * mean * n_learn);
            for i in 0..n {
                if !self.calibration[i] {
                    g_p[i] = g_rescaled[i] * target / mean - shared;
                }
            }
        } else {
            let c = 1.0 - target;
            let d = 1.0 - mean;
            let coupling: f32 = g_rescaled.iter().zip(&p).map(|(&g, &pi)| g * (1.0 - pi)).sum();
            let shared = c * coupling / (d * d * n_learn);
            for i in 0..n {
                if !self.calibration[i] {
                    g_p[i] = g_rescaled[i] * c / d - shared;
                }
            }
        }

        // Through the logit sigmoid
        let slope = self.config.slope;
        Ok(g_p
            .iter()
            .zip(&p)
            .map(|(&g, &pi)| g * slope * pi * (1.0 - pi))
            .collect())
    }
}

/// Centered calibration block, replicated on every mask plane
fn calibration_region(config: &LearnedMaskConfig) -> Vec<bool> {
    let (rows, cols) = (config.rows, config.cols);
    let [cr, cc] = config.calibration;
    let mut region = vec![false; config.echoes * rows * cols];
    if cr == 0 || cc == 0 {
        return region;
    }
    let r0 = rows / 2 - cr / 2;
    let c0 = cols / 2 - cc / 2;
    for e in 0..config.echoes {
        for r in r0..r0 + cr {
            for c in c0..c0 + cc {
                region[e * rows * cols + r * cols + c] = true;
            }
        }
    }
    region
}
