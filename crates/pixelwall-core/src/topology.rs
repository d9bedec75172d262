//! Logical pixel -> physical LED mapping
//!
//! Logical pixels are addressed row-major from the top-left corner. The
//! physical chain starts at [`WiringConfig::origin`] and runs along rows or
//! columns ([`WiringConfig::orientation`]), either in the same direction on
//! every line or serpentine ([`WireMode::ZigZag`]).
//!
//! ```text
//! 3x3, row-major, zig-zag, origin bottom-left:
//!
//!     6  7  8
//!     5  4  3
//!     0  1  2
//! ```
//!
//! The map is computed once per wiring configuration and is read-only
//! afterwards.

use std::fmt;

use crate::wiring::{Orientation, WireMode, WiringConfig};
use crate::Result;

/// Bytes per LED record on the wire (brightness + 3 channels)
pub const BYTES_PER_LED: usize = 4;

/// Byte offsets of one LED record, relative to the first LED record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LedSlot {
    /// Offset of the brightness byte
    pub brightness: usize,
    /// Offset receiving the red channel
    pub red: usize,
    /// Offset receiving the green channel
    pub green: usize,
    /// Offset receiving the blue channel
    pub blue: usize,
}

impl LedSlot {
    /// All four offsets as `[brightness, red, green, blue]`
    pub fn offsets(&self) -> [usize; 4] {
        [self.brightness, self.red, self.green, self.blue]
    }
}

/// Cached mapping from every logical pixel to its physical LED record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyMap {
    config: WiringConfig,
    /// Physical LED index per logical pixel (row-major)
    led_index: Vec<usize>,
    /// Byte offsets per logical pixel (row-major)
    slots: Vec<LedSlot>,
}

impl TopologyMap {
    /// Compute the map for a wiring configuration
    pub fn build(config: &WiringConfig) -> Result<Self> {
        config.validate()?;

        let led_index = wire_order_indices(config);
        let [red, green, blue] = config.color_order.channel_slots();
        let slots = led_index
            .iter()
            .map(|&led| {
                let base = led * BYTES_PER_LED;
                LedSlot {
                    brightness: base,
                    red: base + red,
                    green: base + green,
                    blue: base + blue,
                }
            })
            .collect();

        Ok(Self {
            config: *config,
            led_index,
            slots,
        })
    }

    /// The wiring this map was built from
    pub fn config(&self) -> &WiringConfig {
        &self.config
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.config.rows
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.config.cols
    }

    /// Number of LEDs in the chain
    pub fn num_leds(&self) -> usize {
        self.led_index.len()
    }

    /// Length of the LED record section of a wire frame
    pub fn led_section_len(&self) -> usize {
        self.num_leds() * BYTES_PER_LED
    }

    /// Physical LED index of the pixel at (row, col)
    pub fn led_index(&self, row: usize, col: usize) -> Option<usize> {
        if row >= self.rows() || col >= self.cols() {
            return None;
        }
        self.led_index.get(row * self.cols() + col).copied()
    }

    /// Byte offsets for a logical pixel index (row-major)
    pub fn slot(&self, pixel_index: usize) -> Option<LedSlot> {
        self.slots.get(pixel_index).copied()
    }

    /// Byte offsets for every logical pixel, row-major
    pub fn slots(&self) -> &[LedSlot] {
        &self.slots
    }
}

/// Assign physical LED indices in scan order.
///
/// The outer axis runs from the origin's edge; the inner axis starts on the
/// origin's side and, for serpentine wiring, flips on every outer step. This
/// puts LED 0 in the origin corner for every combination.
fn wire_order_indices(config: &WiringConfig) -> Vec<usize> {
    let (rows, cols) = (config.rows, config.cols);
    let (outer_len, inner_len, outer_forward, inner_forward) = match config.orientation {
        Orientation::RowMajor => (rows, cols, config.origin.is_top(), config.origin.is_left()),
        Orientation::ColMajor => (cols, rows, config.origin.is_left(), config.origin.is_top()),
    };

    let mut led_index = vec![0; rows * cols];
    let mut led = 0;
    for step in 0..outer_len {
        let outer = if outer_forward { step } else { outer_len - 1 - step };
        let forward = match config.wire_mode {
            WireMode::LineByLine => inner_forward,
            WireMode::ZigZag => inner_forward == (step % 2 == 0),
        };
        for inner_step in 0..inner_len {
            let inner = if forward {
                inner_step
            } else {
                inner_len - 1 - inner_step
            };
            let (row, col) = match config.orientation {
                Orientation::RowMajor => (outer, inner),
                Orientation::ColMajor => (inner, outer),
            };
            led_index[row * cols + col] = led;
            led += 1;
        }
    }
    led_index
}

/// Prints the LED index of every pixel as a table
impl fmt::Display for TopologyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = format!(
            "APA102 matrix: rows: {} cols: {} color order: {:?} wire mode: {:?} origin: {:?} orientation: {:?}",
            self.config.rows,
            self.config.cols,
            self.config.color_order,
            self.config.wire_mode,
            self.config.origin,
            self.config.orientation,
        );
        writeln!(f, "{}", header)?;
        writeln!(f, "{}", "-".repeat(header.len()))?;
        for col in 0..self.cols() {
            write!(f, "\t{}", col)?;
        }
        writeln!(f)?;
        for row in 0..self.rows() {
            write!(f, "{}", row)?;
            for col in 0..self.cols() {
                write!(f, "\t{}", self.led_index[row * self.cols() + col])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
