//! Physical wiring description of an LED matrix
//!
//! A [`WiringConfig`] is fixed when the driver is constructed and never
//! changes afterwards; [`crate::TopologyMap`] is derived from it once.

use serde::{Deserialize, Serialize};

use crate::frame::Dimensions;
use crate::{CoreError, Result};

/// Order in which the three color channels are clocked out per LED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorOrder {
    /// red, green, blue
    Rgb,
    /// red, blue, green
    Rbg,
    /// green, red, blue
    Grb,
    /// green, blue, red
    Gbr,
    /// blue, green, red
    #[default]
    Bgr,
    /// blue, red, green
    Brg,
}

impl ColorOrder {
    /// All six channel permutations
    pub const ALL: [ColorOrder; 6] = [
        ColorOrder::Rgb,
        ColorOrder::Rbg,
        ColorOrder::Grb,
        ColorOrder::Gbr,
        ColorOrder::Bgr,
        ColorOrder::Brg,
    ];

    /// Slot within the 4-byte LED record (1..=3) receiving red, green and blue.
    /// Slot 0 is the brightness byte.
    pub const fn channel_slots(self) -> [usize; 3] {
        match self {
            ColorOrder::Rgb => [1, 2, 3],
            ColorOrder::Rbg => [1, 3, 2],
            ColorOrder::Grb => [2, 1, 3],
            ColorOrder::Gbr => [3, 1, 2],
            ColorOrder::Bgr => [3, 2, 1],
            ColorOrder::Brg => [2, 3, 1],
        }
    }
}

/// How consecutive lines of LEDs are chained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireMode {
    /// Every line runs in the same direction (return wire between lines)
    LineByLine,
    /// Serpentine wiring: direction alternates on every line
    #[default]
    #[serde(alias = "zigzag", alias = "serpentine")]
    ZigZag,
}

/// Corner where the first LED of the chain sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Top-left corner
    #[default]
    TopLeft,
    /// Top-right corner
    TopRight,
    /// Bottom-left corner
    BottomLeft,
    /// Bottom-right corner
    BottomRight,
}

impl Origin {
    /// All four corners
    pub const ALL: [Origin; 4] = [
        Origin::TopLeft,
        Origin::TopRight,
        Origin::BottomLeft,
        Origin::BottomRight,
    ];

    /// Is the origin on the top edge?
    pub const fn is_top(self) -> bool {
        matches!(self, Origin::TopLeft | Origin::TopRight)
    }

    /// Is the origin on the left edge?
    pub const fn is_left(self) -> bool {
        matches!(self, Origin::TopLeft | Origin::BottomLeft)
    }
}

/// Whether the chain runs along rows or along columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// LEDs are chained along rows (horizontal lines)
    #[serde(alias = "horizontally")]
    RowMajor,
    /// LEDs are chained along columns (vertical lines)
    #[default]
    #[serde(alias = "vertically")]
    ColMajor,
}

/// Complete wiring description of one contiguous LED chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WiringConfig {
    /// Number of rows
    pub rows: usize,
    /// Number of columns
    pub cols: usize,
    /// Channel order on the wire
    #[serde(default)]
    pub color_order: ColorOrder,
    /// Line chaining mode
    #[serde(default)]
    pub wire_mode: WireMode,
    /// Corner of the first LED
    #[serde(default)]
    pub origin: Origin,
    /// Chain direction
    #[serde(default)]
    pub orientation: Orientation,
}

impl Default for WiringConfig {
    fn default() -> Self {
        Self::new(16, 16)
    }
}

impl WiringConfig {
    /// Create a config with default wiring for the given size
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            color_order: ColorOrder::default(),
            wire_mode: WireMode::default(),
            origin: Origin::default(),
            orientation: Orientation::default(),
        }
    }

    /// Set the channel order
    pub fn with_color_order(mut self, color_order: ColorOrder) -> Self {
        self.color_order = color_order;
        self
    }

    /// Set the wire mode
    pub fn with_wire_mode(mut self, wire_mode: WireMode) -> Self {
        self.wire_mode = wire_mode;
        self
    }

    /// Set the origin corner
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    /// Set the chain orientation
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Matrix size
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.rows, self.cols)
    }

    /// Check that the matrix is non-empty and its wire frame is addressable
    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(CoreError::Configuration(format!(
                "matrix must have at least one row and column, got {}x{}",
                self.rows, self.cols
            )));
        }
        let fits = self
            .rows
            .checked_mul(self.cols)
            .and_then(|leds| leds.checked_mul(crate::topology::BYTES_PER_LED))
            .is_some_and(|bytes| bytes <= u32::MAX as usize);
        if !fits {
            return Err(CoreError::Configuration(format!(
                "matrix {}x{} is too large for a single chain",
                self.rows, self.cols
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_slots_are_permutations() {
        for order in ColorOrder::ALL {
            let mut slots = order.channel_slots();
            slots.sort_unstable();
            assert_eq!(slots, [1, 2, 3], "{:?}", order);
        }
    }

    #[test]
    fn test_validate_rejects_empty_matrix() {
        assert!(WiringConfig::new(0, 16).validate().is_err());
        assert!(WiringConfig::new(16, 0).validate().is_err());
        assert!(WiringConfig::new(1, 1).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_oversized_matrix() {
        assert!(WiringConfig::new(usize::MAX, 2).validate().is_err());
    }

    #[test]
    fn test_deserialize_with_aliases() {
        let config: WiringConfig = toml::from_str(
            r#"
            rows = 8
            cols = 32
            color_order = "grb"
            wire_mode = "zigzag"
            origin = "bottom_right"
            orientation = "horizontally"
            "#,
        )
        .unwrap();
        assert_eq!(config.color_order, ColorOrder::Grb);
        assert_eq!(config.wire_mode, WireMode::ZigZag);
        assert_eq!(config.origin, Origin::BottomRight);
        assert_eq!(config.orientation, Orientation::RowMajor);
    }

    #[test]
    fn test_unknown_enum_value_fails() {
        let result: std::result::Result<WiringConfig, _> =
            toml::from_str("rows = 8\ncols = 8\ncolor_order = \"rgbw\"\n");
        assert!(result.is_err());
    }
}
