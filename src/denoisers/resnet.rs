//! Residual convolutional denoiser
//!
//! ```text
//! x ─┬─ conv3x3 ─ ReLU ─ (conv3x3 ─ ReLU) x (depth - 2) ─ [SE] ─ conv3x3 ─┬─ + ─ p
//!    └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Convolutions use zero "same" padding. Weights are Kaiming-uniform
//! initialized from a seeded `StdRng`; biases start at zero. Samples of a
//! batch are processed in parallel through the execution context.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::context::ExecutionContext;
use crate::denoisers::{Denoiser, NamedParameter};
use crate::error::{ensure_shape, ReconError, Result};
use crate::tensor::ChannelTensor;
use crate::utils::simd_ops::sigmoid;

const KERNEL: usize = 3;

/// Reduction ratio of the squeeze-and-excitation bottleneck
const SE_REDUCTION: usize = 4;

// ============================================================================
// Layers
// ============================================================================

/// 3x3 convolution, weights laid out (out, in, kh, kw)
#[derive(Clone, Debug)]
struct Conv2d {
    in_ch: usize,
    out_ch: usize,
    weight: Vec<f32>,
    bias: Vec<f32>,
}

impl Conv2d {
    fn new(in_ch: usize, out_ch: usize, rng: &mut StdRng) -> Self {
        let fan_in = in_ch * KERNEL * KERNEL;
        let bound = (6.0 / fan_in as f32).sqrt();
        let weight = (0..out_ch * fan_in).map(|_| rng.gen_range(-bound..bound)).collect();
        Self { in_ch, out_ch, weight, bias: vec![0.0; out_ch] }
    }

    fn weight_shape(&self) -> Vec<usize> {
        vec![self.out_ch, self.in_ch, KERNEL, KERNEL]
    }

    /// Convolve one sample of shape (in_ch, rows, cols)
    fn forward(&self, input: &[f32], rows: usize, cols: usize) -> Vec<f32> {
        let plane = rows * cols;
        let mut out = vec![0.0f32; self.out_ch * plane];

        for oc in 0..self.out_ch {
            let dst = &mut out[oc * plane..(oc + 1) * plane];
            dst.fill(self.bias[oc]);

            for ic in 0..self.in_ch {
                let src = &input[ic * plane..(ic + 1) * plane];
                let w = &self.weight[(oc * self.in_ch + ic) * KERNEL * KERNEL..][..KERNEL * KERNEL];

                for kh in 0..KERNEL {
                    for kw in 0..KERNEL {
                        let wv = w[kh * KERNEL + kw];
                        if wv == 0.0 {
                            continue;
                        }
                        // output (r, c) reads input (r + kh - 1, c + kw - 1)
                        let r_lo = 1usize.saturating_sub(kh);
                        let r_hi = (rows + 1).saturating_sub(kh).min(rows);
                        let c_lo = 1usize.saturating_sub(kw);
                        let c_hi = (cols + 1).saturating_sub(kw).min(cols);
                        for r in r_lo..r_hi {
                            let ir = r + kh - 1;
                            let drow = &mut dst[r * cols..(r + 1) * cols];
                            let srow = &src[ir * cols..(ir + 1) * cols];
                            for c in c_lo..c_hi {
                                drow[c] += wv * srow[c + kw - 1];
                            }
                        }
                    }
                }
            }
        }
        out
    }
}

/// Squeeze-and-excitation channel attention
#[derive(Clone, Debug)]
struct SqueezeExcitation {
    channels: usize,
    hidden: usize,
    fc1: Vec<f32>, // (hidden, channels)
    b1: Vec<f32>,
    fc2: Vec<f32>, // (channels, hidden)
    b2: Vec<f32>,
}

impl SqueezeExcitation {
    fn new(channels: usize, rng: &mut StdRng) -> Self {
        let hidden = (channels / SE_REDUCTION).max(1);
        let b1 = (6.0 / channels as f32).sqrt();
        let b2 = (6.0 / hidden as f32).sqrt();
        Self {
            channels,
            hidden,
            fc1: (0..hidden * channels).map(|_| rng.gen_range(-b1..b1)).collect(),
            b1: vec![0.0; hidden],
            fc2: (0..channels * hidden).map(|_| rng.gen_range(-b2..b2)).collect(),
            b2: vec![0.0; channels],
        }
    }

    /// Rescale each channel of one sample in place
    fn forward(&self, features: &mut [f32], plane: usize) {
        // squeeze: global average per channel
        let squeeze: Vec<f32> = features
            .chunks(plane)
            .map(|ch| ch.iter().sum::<f32>() / plane as f32)
            .collect();

        // excitation: FC - ReLU - FC - sigmoid
        let hidden: Vec<f32> = (0..self.hidden)
            .map(|h| {
                let w = &self.fc1[h * self.channels..(h + 1) * self.channels];
                let v = self.b1[h] + w.iter().zip(&squeeze).map(|(a, b)| a * b).sum::<f32>();
                v.max(0.0)
            })
            .collect();

        for (c, ch) in features.chunks_mut(plane).enumerate() {
            let w = &self.fc2[c * self.hidden..(c + 1) * self.hidden];
            let gate = sigmoid(self.b2[c] + w.iter().zip(&hidden).map(|(a, b)| a * b).sum::<f32>());
            for v in ch.iter_mut() {
                *v *= gate;
            }
        }
    }
}

// ============================================================================
// Network
// ============================================================================

/// Residual CNN prior `p = x + f(x)`
#[derive(Clone, Debug)]
pub struct ResidualCnn {
    channels: usize,
    features: usize,
    layers: Vec<Conv2d>,
    attention: Option<SqueezeExcitation>,
}

impl ResidualCnn {
    /// # Arguments
    /// * `channels` - Input/output channels (2 * echoes when concatenated, else 2)
    /// * `features` - Hidden feature channels
    /// * `depth` - Number of convolution layers, at least 2
    /// * `attention` - Insert squeeze-and-excitation before the last layer
    /// * `seed` - Weight initialization seed
    pub fn new(channels: usize, features: usize, depth: usize, attention: bool, seed: u64) -> Result<Self> {
        if channels == 0 || features == 0 {
            return Err(ReconError::InvalidConfig("residual CNN needs non-zero channels".to_string()));
        }
        if depth < 2 {
            return Err(ReconError::InvalidConfig(format!(
                "residual CNN needs at least 2 layers, got {}",
                depth
            )));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut layers = Vec::with_capacity(depth);
        layers.push(Conv2d::new(channels, features, &mut rng));
        for _ in 0..depth - 2 {
            layers.push(Conv2d::new(features, features, &mut rng));
        }
        layers.push(Conv2d::new(features, channels, &mut rng));

        let attention = if attention { Some(SqueezeExcitation::new(features, &mut rng)) } else { None };

        Ok(Self { channels, features, layers, attention })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn features(&self) -> usize {
        self.features
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    fn forward_sample(&self, input: &[f32], rows: usize, cols: usize) -> Vec<f32> {
        let plane = rows * cols;
        let last = self.layers.len() - 1;
        let mut h = input.to_vec();

        for (i, layer) in self.layers.iter().enumerate() {
            if i == last {
                if let Some(se) = &self.attention {
                    se.forward(&mut h, plane);
                }
            }
            h = layer.forward(&h, rows, cols);
            if i != last {
                for v in h.iter_mut() {
                    *v = v.max(0.0);
                }
            }
        }

        // residual connection
        for (o, &x) in h.iter_mut().zip(input) {
            *o += x;
        }
        h
    }
}

impl Denoiser for ResidualCnn {
    fn name(&self) -> &'static str {
        "residual_cnn"
    }

    fn denoise(&self, ctx: &ExecutionContext, input: &ChannelTensor) -> Result<ChannelTensor> {
        if input.channels() != self.channels {
            return Err(ReconError::ShapeMismatch {
                what: "denoiser input channels",
                expected: vec![self.channels],
                actual: vec![input.channels()],
            });
        }
        let (rows, cols) = (input.rows(), input.cols());
        let outputs = ctx.map_indices(input.batch(), |b| self.forward_sample(input.sample(b), rows, cols));
        ChannelTensor::from_vec(input.dims(), outputs.concat())
    }

    fn parameters(&self) -> Vec<NamedParameter> {
        let mut params = Vec::new();
        for (i, layer) in self.layers.iter().enumerate() {
            params.push(NamedParameter::new(format!("conv{}.weight", i), layer.weight_shape(), layer.weight.clone()));
            params.push(NamedParameter::new(format!("conv{}.bias", i), vec![layer.out_ch], layer.bias.clone()));
        }
        if let Some(se) = &self.attention {
            params.push(NamedParameter::new("attention.fc1.weight", vec![se.hidden, se.channels], se.fc1.clone()));
            params.push(NamedParameter::new("attention.fc1.bias", vec![se.hidden], se.b1.clone()));
            params.push(NamedParameter::new("attention.fc2.weight", vec![se.channels, se.hidden], se.fc2.clone()));
            params.push(NamedParameter::new("attention.fc2.bias", vec![se.channels], se.b2.clone()));
        }
        params
    }

    fn load_parameters(&mut self, params: &[NamedParameter]) -> Result<()> {
        // Validate everything before touching any weight
        let expected = self.parameters();
        let mut ordered = Vec::with_capacity(expected.len());
        for want in &expected {
            let found = params
                .iter()
                .find(|p| p.name == want.name)
                .ok_or_else(|| ReconError::MissingParameter(want.name.clone()))?;
            ensure_shape("denoiser parameter", &want.shape, &found.shape)?;
            ensure_shape("denoiser parameter buffer", &[want.values.len()], &[found.values.len()])?;
            ordered.push(found.values.clone());
        }

        let mut values = ordered.into_iter();
        for layer in self.layers.iter_mut() {
            if let (Some(w), Some(b)) = (values.next(), values.next()) {
                layer.weight = w;
                layer.bias = b;
            }
        }
        if let Some(se) = self.attention.as_mut() {
            if let (Some(fc1), Some(b1), Some(fc2), Some(b2)) =
                (values.next(), values.next(), values.next(), values.next())
            {
                se.fc1 = fc1;
                se.b1 = b1;
                se.fc2 = fc2;
                se.b2 = b2;
            }
        }
        Ok(())
    }
}
