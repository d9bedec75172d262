//! Gamma correction lookup table

use crate::{CoreError, Result};

/// Default gamma exponent for APA102 panels
pub const DEFAULT_GAMMA: f64 = 2.22;

/// Precomputed 256-entry brightness correction table
#[derive(Debug, Clone, PartialEq)]
pub struct GammaTable {
    gamma: f64,
    table: [u8; 256],
}

impl GammaTable {
    /// Build a table for a positive, finite gamma exponent
    pub fn new(gamma: f64) -> Result<Self> {
        if !gamma.is_finite() || gamma <= 0.0 {
            return Err(CoreError::Configuration(format!(
                "gamma must be a positive number, got {}",
                gamma
            )));
        }
        Ok(Self {
            gamma,
            table: Self::build(gamma),
        })
    }

    /// Table that leaves every value unchanged
    pub fn identity() -> Self {
        Self {
            gamma: 1.0,
            table: Self::build(1.0),
        }
    }

    /// Compute `round(255 * (i / 255) ^ gamma)` for every byte value
    pub fn build(gamma: f64) -> [u8; 256] {
        let mut table = [0u8; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let normalized = i as f64 / 255.0;
            let corrected = (255.0 * normalized.powf(gamma)).round();
            *entry = corrected.clamp(0.0, 255.0) as u8;
        }
        table
    }

    /// The exponent this table was built with
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Correct one channel value
    #[inline]
    pub fn correct(&self, value: u8) -> u8 {
        self.table[usize::from(value)]
    }

    /// The raw lookup table
    pub fn as_array(&self) -> &[u8; 256] {
        &self.table
    }
}

impl Default for GammaTable {
    fn default() -> Self {
        Self {
            gamma: DEFAULT_GAMMA,
            table: Self::build(DEFAULT_GAMMA),
        }
    }
}
