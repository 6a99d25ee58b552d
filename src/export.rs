//! Export of reconstructions for the external susceptibility-mapping tool
//!
//! The tool reads a raw float32 volume ordered (row, col, slice, echo) with
//! the row index fastest and real/imaginary parts interleaved. Batch samples
//! of a reconstruction are stacked slices. No file I/O happens here.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{ReconError, Result};
use crate::tensor::ComplexImage;

/// Reorder a reconstruction into the tool layout
///
/// # Arguments
/// * `image` - Reconstruction of shape (slice, echo, row, col)
/// * `conjugate` - Flip the phase sign (scanner phase convention)
///
/// # Returns
/// `2 * rows * cols * slices * echoes` floats
pub fn tool_volume(image: &ComplexImage, conjugate: bool) -> Vec<f32> {
    let s = image.shape();
    let (nrows, ncols, nslices, nechoes) = (s.rows, s.cols, s.batch, s.echoes);
    let mut out = vec![0.0f32; 2 * s.len()];
    let sign = if conjugate { -1.0 } else { 1.0 };

    for slice in 0..nslices {
        for echo in 0..nechoes {
            let plane = image.plane(slice, echo);
            for r in 0..nrows {
                for c in 0..ncols {
                    let z = plane[c + r * ncols];
                    let idx = r + nrows * (c + ncols * (slice + nslices * echo));
                    out[2 * idx] = z.re;
                    out[2 * idx + 1] = sign * z.im;
                }
            }
        }
    }
    out
}

/// Little-endian bytes of a float buffer
pub fn encode_le(samples: &[f32]) -> Vec<u8> {
    let mut bytes = vec![0u8; 4 * samples.len()];
    LittleEndian::write_f32_into(samples, &mut bytes);
    bytes
}

/// Inverse of `encode_le`
pub fn decode_le(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(ReconError::InvalidDimension(format!(
            "{} bytes is not a whole number of float32 samples",
            bytes.len()
        )));
    }
    let mut samples = vec![0.0f32; bytes.len() / 4];
    LittleEndian::read_f32_into(bytes, &mut samples);
    Ok(samples)
}
