//! Shape-checked containers for images, coil data, masks and channel tensors
//!
//! All containers are flat row-major buffers:
//! - `ComplexImage`: (batch, echo, row, col) complex
//! - `CoilTensor`: (batch, coil, echo, row, col) complex, used for both coil
//!   sensitivity maps and k-space
//! - `SamplingMask`: (echo, row, col) real in [0, 1], echo may be 1 (shared)
//! - `FlipPattern`: (echo, row, col) of +1/-1
//! - `ChannelTensor`: (batch, channel, row, col) real, the denoiser view

use num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::cplx;
use crate::error::{ensure_shape, ReconError, Result};
use crate::utils::simd_ops::axpy_f32;

// ============================================================================
// Layouts and shapes
// ============================================================================

/// How echoes are presented to the denoiser
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EchoLayout {
    /// (batch, 2*echo, row, col): one joint prior across all echoes.
    /// Channel `2e` holds the real part of echo `e`, `2e + 1` the imaginary part.
    Concatenated,
    /// (batch*echo, 2, row, col): the prior is applied to each echo alone.
    Separate,
}

impl Default for EchoLayout {
    fn default() -> Self {
        EchoLayout::Concatenated
    }
}

/// Shape of a complex image
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub batch: usize,
    pub echoes: usize,
    pub rows: usize,
    pub cols: usize,
}

impl ImageShape {
    pub fn new(batch: usize, echoes: usize, rows: usize, cols: usize) -> Self {
        Self { batch, echoes, rows, cols }
    }

    #[inline]
    pub fn plane_len(&self) -> usize {
        self.rows * self.cols
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.batch * self.echoes * self.plane_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dims(&self) -> [usize; 4] {
        [self.batch, self.echoes, self.rows, self.cols]
    }

    /// Shape of the channel tensor presented to a denoiser
    pub fn channel_dims(&self, layout: EchoLayout) -> [usize; 4] {
        match layout {
            EchoLayout::Concatenated => [self.batch, 2 * self.echoes, self.rows, self.cols],
            EchoLayout::Separate => [self.batch * self.echoes, 2, self.rows, self.cols],
        }
    }

    fn validate(&self) -> Result<()> {
        if self.len() == 0 {
            return Err(ReconError::InvalidDimension(format!(
                "image shape {:?} has a zero-sized axis",
                self.dims()
            )));
        }
        Ok(())
    }
}

/// Shape of per-coil data (coil maps or k-space)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoilShape {
    pub batch: usize,
    pub coils: usize,
    pub echoes: usize,
    pub rows: usize,
    pub cols: usize,
}

impl CoilShape {
    pub fn new(batch: usize, coils: usize, echoes: usize, rows: usize, cols: usize) -> Self {
        Self { batch, coils, echoes, rows, cols }
    }

    #[inline]
    pub fn plane_len(&self) -> usize {
        self.rows * self.cols
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.batch * self.coils * self.echoes * self.plane_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dims(&self) -> [usize; 5] {
        [self.batch, self.coils, self.echoes, self.rows, self.cols]
    }

    /// Shape of the coil-combined image
    pub fn image_shape(&self) -> ImageShape {
        ImageShape::new(self.batch, self.echoes, self.rows, self.cols)
    }

    /// Offset of plane (b, c, e)
    #[inline]
    pub fn plane_offset(&self, b: usize, c: usize, e: usize) -> usize {
        ((b * self.coils + c) * self.echoes + e) * self.plane_len()
    }
}

// ============================================================================
// Complex image
// ============================================================================

/// Complex image of shape (batch, echo, row, col)
#[derive(Clone, Debug, PartialEq)]
pub struct ComplexImage {
    shape: ImageShape,
    data: Vec<Complex32>,
}

impl ComplexImage {
    pub fn zeros(shape: ImageShape) -> Self {
        Self { shape, data: vec![Complex32::new(0.0, 0.0); shape.len()] }
    }

    pub fn from_vec(shape: ImageShape, data: Vec<Complex32>) -> Result<Self> {
        shape.validate()?;
        ensure_shape("image buffer", &[shape.len()], &[data.len()])?;
        Ok(Self { shape, data })
    }

    /// Build from a buffer with a trailing (re, im) axis
    pub fn from_interleaved(shape: ImageShape, pairs: &[f32]) -> Result<Self> {
        ensure_shape("interleaved image buffer", &[2 * shape.len()], &[pairs.len()])?;
        Self::from_vec(shape, cplx::deinterleave(pairs))
    }

    pub fn to_interleaved(&self) -> Vec<f32> {
        cplx::interleave(&self.data)
    }

    #[inline]
    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    #[inline]
    pub fn data(&self) -> &[Complex32] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [Complex32] {
        &mut self.data
    }

    /// Plane (b, e)
    pub fn plane(&self, b: usize, e: usize) -> &[Complex32] {
        let p = self.shape.plane_len();
        let start = (b * self.shape.echoes + e) * p;
        &self.data[start..start + p]
    }

    /// `self += alpha * other`
    pub fn add_scaled(&mut self, alpha: f32, other: &ComplexImage) {
        debug_assert_eq!(self.shape, other.shape);
        axpy_f32(
            bytemuck::cast_slice_mut::<Complex32, f32>(&mut self.data),
            alpha,
            bytemuck::cast_slice::<Complex32, f32>(&other.data),
        );
    }

    /// `self - other`
    pub fn sub(&self, other: &ComplexImage) -> ComplexImage {
        let mut out = self.clone();
        out.add_scaled(-1.0, other);
        out
    }

    /// `Re⟨self, other⟩`
    pub fn inner(&self, other: &ComplexImage) -> f32 {
        cplx::real_inner(&self.data, &other.data)
    }

    pub fn norm_squared(&self) -> f32 {
        cplx::norm_squared(&self.data)
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|z| z.re.is_finite() && z.im.is_finite())
    }

    /// Real channel view in the given echo layout
    pub fn to_channels(&self, layout: EchoLayout) -> ChannelTensor {
        let [batch, channels, rows, cols] = self.shape.channel_dims(layout);
        let p = self.shape.plane_len();
        let mut data = vec![0.0f32; batch * channels * p];

        // Both layouts share the memory order (b, e, re/im, row, col); they
        // differ only in how the leading axes are grouped.
        let planes = self.shape.batch * self.shape.echoes;
        for plane in 0..planes {
            let src = &self.data[plane * p..(plane + 1) * p];
            let re_start = (2 * plane) * p;
            let im_start = (2 * plane + 1) * p;
            for (i, z) in src.iter().enumerate() {
                data[re_start + i] = z.re;
                data[im_start + i] = z.im;
            }
        }

        ChannelTensor { batch, channels, rows, cols, data }
    }

    /// Inverse of `to_channels`
    pub fn from_channels(shape: ImageShape, layout: EchoLayout, channels: &ChannelTensor) -> Result<Self> {
        ensure_shape("channel tensor", &shape.channel_dims(layout), &channels.dims())?;
        let p = shape.plane_len();
        let planes = shape.batch * shape.echoes;
        let mut data = vec![Complex32::new(0.0, 0.0); shape.len()];
        for plane in 0..planes {
            let re = &channels.data[(2 * plane) * p..(2 * plane + 1) * p];
            let im = &channels.data[(2 * plane + 1) * p..(2 * plane + 2) * p];
            for i in 0..p {
                data[plane * p + i] = Complex32::new(re[i], im[i]);
            }
        }
        Self::from_vec(shape, data)
    }
}

// ============================================================================
// Coil data (sensitivity maps and k-space)
// ============================================================================

/// Complex per-coil data of shape (batch, coil, echo, row, col)
#[derive(Clone, Debug, PartialEq)]
pub struct CoilTensor {
    shape: CoilShape,
    data: Vec<Complex32>,
}

/// Coil sensitivity maps
pub type CoilMaps = CoilTensor;

/// Multi-coil, multi-echo k-space
pub type KSpace = CoilTensor;

impl CoilTensor {
    pub fn zeros(shape: CoilShape) -> Self {
        Self { shape, data: vec![Complex32::new(0.0, 0.0); shape.len()] }
    }

    pub fn from_vec(shape: CoilShape, data: Vec<Complex32>) -> Result<Self> {
        if shape.len() == 0 {
            return Err(ReconError::InvalidDimension(format!(
                "coil shape {:?} has a zero-sized axis",
                shape.dims()
            )));
        }
        ensure_shape("coil buffer", &[shape.len()], &[data.len()])?;
        Ok(Self { shape, data })
    }

    /// Build from a buffer with a trailing (re, im) axis
    pub fn from_interleaved(shape: CoilShape, pairs: &[f32]) -> Result<Self> {
        ensure_shape("interleaved coil buffer", &[2 * shape.len()], &[pairs.len()])?;
        Self::from_vec(shape, cplx::deinterleave(pairs))
    }

    pub fn to_interleaved(&self) -> Vec<f32> {
        cplx::interleave(&self.data)
    }

    #[inline]
    pub fn shape(&self) -> CoilShape {
        self.shape
    }

    #[inline]
    pub fn data(&self) -> &[Complex32] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [Complex32] {
        &mut self.data
    }

    /// Plane (b, c, e)
    pub fn plane(&self, b: usize, c: usize, e: usize) -> &[Complex32] {
        let start = self.shape.plane_offset(b, c, e);
        &self.data[start..start + self.shape.plane_len()]
    }

    /// Rotate every coil so that coil `reference` has zero phase, per echo and pixel.
    ///
    /// `S_c <- S_c * exp(-i * angle(S_ref))`
    pub fn align_reference_phase(&mut self, reference: usize) -> Result<()> {
        let s = self.shape;
        if reference >= s.coils {
            return Err(ReconError::InvalidDimension(format!(
                "reference coil {} out of range for {} coils",
                reference, s.coils
            )));
        }
        let p = s.plane_len();
        for b in 0..s.batch {
            for e in 0..s.echoes {
                let ref_start = s.plane_offset(b, reference, e);
                let rotation: Vec<Complex32> = self.data[ref_start..ref_start + p]
                    .iter()
                    .map(|z| Complex32::from_polar(1.0, -z.arg()))
                    .collect();
                for c in 0..s.coils {
                    let start = s.plane_offset(b, c, e);
                    cplx::multiply_inplace(&mut self.data[start..start + p], &rotation);
                }
            }
        }
        Ok(())
    }

    /// Sum of squared magnitudes over coils, shape (batch, echo, row, col)
    pub fn coil_energy(&self) -> Vec<f32> {
        let s = self.shape;
        let p = s.plane_len();
        let mut energy = vec![0.0f32; s.batch * s.echoes * p];
        for b in 0..s.batch {
            for e in 0..s.echoes {
                let out = &mut energy[(b * s.echoes + e) * p..(b * s.echoes + e + 1) * p];
                for c in 0..s.coils {
                    for (acc, z) in out.iter_mut().zip(self.plane(b, c, e)) {
                        *acc += z.norm_sqr();
                    }
                }
            }
        }
        energy
    }

    /// Scale so that `Σ_c |S_c|² = 1` wherever any coil has signal
    pub fn normalize_energy(&mut self) {
        let s = self.shape;
        let p = s.plane_len();
        let energy = self.coil_energy();
        for b in 0..s.batch {
            for e in 0..s.echoes {
                let en = &energy[(b * s.echoes + e) * p..(b * s.echoes + e + 1) * p];
                for c in 0..s.coils {
                    let start = s.plane_offset(b, c, e);
                    for (z, &w) in self.data[start..start + p].iter_mut().zip(en) {
                        if w > 0.0 {
                            *z /= w.sqrt();
                        }
                    }
                }
            }
        }
    }
}

// ============================================================================
// Sampling mask and flip pattern
// ============================================================================

/// Real-valued sampling mask (binary, or soft in [0, 1] while the mask is learned).
///
/// Shared by all coils and samples; `echoes == 1` shares one plane across echoes.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingMask {
    echoes: usize,
    rows: usize,
    cols: usize,
    values: Vec<f32>,
}

impl SamplingMask {
    pub fn new(echoes: usize, rows: usize, cols: usize, values: Vec<f32>) -> Result<Self> {
        if echoes == 0 || rows == 0 || cols == 0 {
            return Err(ReconError::InvalidDimension("sampling mask has a zero-sized axis".into()));
        }
        ensure_shape("sampling mask", &[echoes * rows * cols], &[values.len()])?;
        if let Some(v) = values.iter().find(|v| !(0.0..=1.0).contains(*v)) {
            return Err(ReconError::InvalidConfig(format!(
                "sampling mask values must lie in [0, 1], found {}",
                v
            )));
        }
        Ok(Self { echoes, rows, cols, values })
    }

    /// Fully sampled mask
    pub fn full(echoes: usize, rows: usize, cols: usize) -> Self {
        Self { echoes, rows, cols, values: vec![1.0; echoes * rows * cols] }
    }

    /// Nothing sampled
    pub fn empty(echoes: usize, rows: usize, cols: usize) -> Self {
        Self { echoes, rows, cols, values: vec![0.0; echoes * rows * cols] }
    }

    pub fn echoes(&self) -> usize {
        self.echoes
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Mask plane applied to echo `e` (broadcast when the mask is shared)
    #[inline]
    pub fn plane(&self, e: usize) -> &[f32] {
        let p = self.rows * self.cols;
        let e = if self.echoes == 1 { 0 } else { e };
        &self.values[e * p..(e + 1) * p]
    }

    /// Fraction of sampled k-space
    pub fn sampling_ratio(&self) -> f32 {
        self.values.iter().sum::<f32>() / self.values.len() as f32
    }
}

/// ±1 sign-correction pattern of shape (echo, row, col)
#[derive(Clone, Debug, PartialEq)]
pub struct FlipPattern {
    echoes: usize,
    rows: usize,
    cols: usize,
    values: Vec<f32>,
}

impl FlipPattern {
    pub fn new(echoes: usize, rows: usize, cols: usize, values: Vec<f32>) -> Result<Self> {
        ensure_shape("flip pattern", &[echoes * rows * cols], &[values.len()])?;
        if values.iter().any(|&v| v != 1.0 && v != -1.0) {
            return Err(ReconError::InvalidConfig("flip pattern entries must be +1 or -1".into()));
        }
        Ok(Self { echoes, rows, cols, values })
    }

    /// GE checkerboard `(-1)^(row + col)`, identical for every echo
    pub fn checkerboard(echoes: usize, rows: usize, cols: usize) -> Self {
        let board = cplx::checkerboard(rows, cols);
        let mut values = Vec::with_capacity(echoes * rows * cols);
        for _ in 0..echoes {
            values.extend_from_slice(&board);
        }
        Self { echoes, rows, cols, values }
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.echoes, self.rows, self.cols]
    }

    #[inline]
    pub fn plane(&self, e: usize) -> &[f32] {
        let p = self.rows * self.cols;
        &self.values[e * p..(e + 1) * p]
    }
}

// ============================================================================
// Channel tensor (denoiser view)
// ============================================================================

/// Real tensor of shape (batch, channel, row, col)
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelTensor {
    batch: usize,
    channels: usize,
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl ChannelTensor {
    pub fn zeros(batch: usize, channels: usize, rows: usize, cols: usize) -> Self {
        Self { batch, channels, rows, cols, data: vec![0.0; batch * channels * rows * cols] }
    }

    pub fn from_vec(dims: [usize; 4], data: Vec<f32>) -> Result<Self> {
        let [batch, channels, rows, cols] = dims;
        ensure_shape("channel tensor buffer", &[batch * channels * rows * cols], &[data.len()])?;
        Ok(Self { batch, channels, rows, cols, data })
    }

    pub fn dims(&self) -> [usize; 4] {
        [self.batch, self.channels, self.rows, self.cols]
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Elements per sample
    #[inline]
    pub fn sample_len(&self) -> usize {
        self.channels * self.rows * self.cols
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn sample(&self, b: usize) -> &[f32] {
        let n = self.sample_len();
        &self.data[b * n..(b + 1) * n]
    }
}

/// True when a tissue mask has no valid voxel; such samples are skipped by the caller.
pub fn tissue_is_empty(mask: &[f32]) -> bool {
    mask.iter().all(|&v| v == 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_image(shape: ImageShape) -> ComplexImage {
        let data = (0..shape.len())
            .map(|i| Complex32::new(i as f32, -(i as f32) * 0.5))
            .collect();
        ComplexImage::from_vec(shape, data).unwrap()
    }

    #[test]
    fn test_concatenated_channel_order() {
        let shape = ImageShape::new(1, 2, 2, 2);
        let img = ramp_image(shape);
        let ch = img.to_channels(EchoLayout::Concatenated);
        assert_eq!(ch.dims(), [1, 4, 2, 2]);

        // channel 2 = real part of echo 1, channel 3 = imaginary part of echo 1
        assert_eq!(ch.data()[2 * 4], img.plane(0, 1)[0].re);
        assert_eq!(ch.data()[3 * 4 + 1], img.plane(0, 1)[1].im);
    }

    #[test]
    fn test_channel_roundtrip_both_layouts() {
        let shape = ImageShape::new(2, 3, 4, 5);
        let img = ramp_image(shape);
        for layout in [EchoLayout::Concatenated, EchoLayout::Separate] {
            let ch = img.to_channels(layout);
            assert_eq!(ch.dims(), shape.channel_dims(layout));
            let back = ComplexImage::from_channels(shape, layout, &ch).unwrap();
            assert_eq!(back, img);
        }
    }

    #[test]
    fn test_from_channels_rejects_wrong_layout() {
        let shape = ImageShape::new(1, 3, 4, 4);
        let ch = ramp_image(shape).to_channels(EchoLayout::Separate);
        let err = ComplexImage::from_channels(shape, EchoLayout::Concatenated, &ch);
        assert!(matches!(err, Err(ReconError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_align_reference_phase() {
        let shape = CoilShape::new(1, 2, 1, 1, 2);
        let data = vec![
            Complex32::from_polar(2.0, 0.7),
            Complex32::from_polar(1.0, -1.2),
            Complex32::from_polar(0.5, 0.1),
            Complex32::from_polar(3.0, 2.0),
        ];
        let mut csm = CoilMaps::from_vec(shape, data).unwrap();
        csm.align_reference_phase(0).unwrap();

        for z in csm.plane(0, 0, 0) {
            assert!(z.im.abs() < 1e-6 && z.re > 0.0);
        }
        // relative phase is preserved
        let z = csm.plane(0, 1, 0)[0];
        assert!((z.arg() - (0.1 - 0.7)).abs() < 1e-5);
        assert!((z.norm() - 0.5).abs() < 1e-6);

        assert!(csm.align_reference_phase(2).is_err());
    }

    #[test]
    fn test_normalize_energy() {
        let shape = CoilShape::new(1, 2, 1, 1, 3);
        let data = vec![
            Complex32::new(1.0, 0.0), Complex32::new(0.0, 0.0), Complex32::new(3.0, 0.0),
            Complex32::new(0.0, 1.0), Complex32::new(0.0, 0.0), Complex32::new(0.0, 4.0),
        ];
        let mut csm = CoilMaps::from_vec(shape, data).unwrap();
        csm.normalize_energy();
        let energy = csm.coil_energy();
        assert!((energy[0] - 1.0).abs() < 1e-6);
        assert_eq!(energy[1], 0.0);
        assert!((energy[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mask_validation_and_broadcast() {
        assert!(SamplingMask::new(1, 2, 2, vec![0.0, 1.0, 1.5, 0.0]).is_err());
        assert!(SamplingMask::new(1, 2, 2, vec![0.0, 1.0]).is_err());

        let mask = SamplingMask::new(1, 2, 2, vec![0.0, 1.0, 0.5, 0.5]).unwrap();
        assert_eq!(mask.plane(3), mask.plane(0));
        assert!((mask.sampling_ratio() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_flip_validation() {
        assert!(FlipPattern::new(1, 1, 2, vec![1.0, 0.5]).is_err());
        let flip = FlipPattern::checkerboard(2, 2, 2);
        assert_eq!(flip.plane(1), &[1.0, -1.0, -1.0, 1.0]);
    }

    #[test]
    fn test_tissue_is_empty() {
        assert!(tissue_is_empty(&[0.0, 0.0]));
        assert!(!tissue_is_empty(&[0.0, 1.0]));
    }
}
