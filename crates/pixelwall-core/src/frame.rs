//! RGB pixel buffers exchanged between producers and the display.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CoreError, Result};

/// Bytes per logical pixel (red, green, blue)
pub const BYTES_PER_PIXEL: usize = 3;

/// A single 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    /// Red component
    pub r: u8,
    /// Green component
    pub g: u8,
    /// Blue component
    pub b: u8,
}

impl Rgb {
    /// Black (all channels off)
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    /// White (all channels full)
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    /// Create a new color
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scale all channels by `factor` (clamped to 0.0..=1.0)
    pub fn scaled(self, factor: f32) -> Self {
        let factor = factor.clamp(0.0, 1.0);
        let scale = |c: u8| (f32::from(c) * factor).round() as u8;
        Self::new(scale(self.r), scale(self.g), scale(self.b))
    }
}

impl From<[u8; 3]> for Rgb {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b)
    }
}

/// Matrix size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Number of rows (height)
    pub rows: usize,
    /// Number of columns (width)
    pub cols: usize,
}

impl Dimensions {
    /// Create new dimensions
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Number of pixels
    pub const fn pixel_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Number of bytes in an RGB buffer of this size
    pub const fn byte_len(&self) -> usize {
        self.rows * self.cols * BYTES_PER_PIXEL
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// Row-major H×W grid of RGB pixels
///
/// Buffers are moved into the frame queue, so a producer keeps no handle on a
/// frame once it has been handed over.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    dimensions: Dimensions,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Create a black buffer
    pub fn new(dimensions: Dimensions) -> Self {
        Self {
            dimensions,
            data: vec![0; dimensions.byte_len()],
        }
    }

    /// Create a buffer filled with one color
    pub fn filled(dimensions: Dimensions, color: Rgb) -> Self {
        let mut buffer = Self::new(dimensions);
        buffer.fill(color);
        buffer
    }

    /// Wrap raw row-major RGB bytes; the length must match exactly
    pub fn from_bytes(dimensions: Dimensions, data: Vec<u8>) -> Result<Self> {
        if data.len() != dimensions.byte_len() {
            return Err(CoreError::Configuration(format!(
                "pixel data has {} bytes, {} matrix needs {}",
                data.len(),
                dimensions,
                dimensions.byte_len()
            )));
        }
        Ok(Self { dimensions, data })
    }

    /// Build a buffer from flat RGB values, truncating or zero-padding to fit
    pub fn from_flat_lossy(dimensions: Dimensions, values: &[u8]) -> Self {
        let mut data = values.to_vec();
        data.resize(dimensions.byte_len(), 0);
        Self { dimensions, data }
    }

    /// Matrix size
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.dimensions.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.dimensions.cols
    }

    /// Raw row-major RGB bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw row-major RGB bytes
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consume the buffer and return its bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn offset(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.dimensions.rows && col < self.dimensions.cols)
            .then(|| (row * self.dimensions.cols + col) * BYTES_PER_PIXEL)
    }

    /// Color at (row, col), `None` when out of bounds
    pub fn pixel(&self, row: usize, col: usize) -> Option<Rgb> {
        let offset = self.offset(row, col)?;
        let rgb = self.data.get(offset..offset + BYTES_PER_PIXEL)?;
        Some(Rgb::new(rgb[0], rgb[1], rgb[2]))
    }

    /// Set the color at (row, col); out-of-bounds writes are ignored
    pub fn set_pixel(&mut self, row: usize, col: usize, color: Rgb) {
        if let Some(offset) = self.offset(row, col) {
            self.data[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&[color.r, color.g, color.b]);
        }
    }

    /// Fill every pixel with one color
    pub fn fill(&mut self, color: Rgb) {
        for chunk in self.data.chunks_exact_mut(BYTES_PER_PIXEL) {
            chunk.copy_from_slice(&[color.r, color.g, color.b]);
        }
    }

    /// Set every pixel to black
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Iterate pixels in row-major order
    pub fn pixels(&self) -> impl Iterator<Item = Rgb> + '_ {
        self.data
            .chunks_exact(BYTES_PER_PIXEL)
            .map(|c| Rgb::new(c[0], c[1], c[2]))
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("dimensions", &self.dimensions)
            .field("bytes", &self.data.len())
            .finish()
    }
}
