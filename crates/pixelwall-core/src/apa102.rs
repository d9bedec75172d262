//! APA102 wire-protocol encoder
//!
//! Frame layout:
//!
//! ```text
//! [00 00 00 00] [111bbbbb c1 c2 c3] * num_leds [FF] * ceil(num_leds / 16)
//! ```
//!
//! LED records are ordered by physical chain position. The end frame must
//! provide at least `num_leds / 2` extra clock edges so the last LED latches.

use crate::frame::PixelBuffer;
use crate::gamma::GammaTable;
use crate::topology::TopologyMap;
use crate::{CoreError, Result};

/// Length of the all-zero start frame
pub const START_FRAME_LEN: usize = 4;
/// High bits of every LED record's first byte
pub const LED_FRAME_MARKER: u8 = 0b1110_0000;
/// Highest global brightness value (5 bits)
pub const MAX_BRIGHTNESS: u8 = 31;
/// Byte used for the end frame
pub const END_FRAME_BYTE: u8 = 0xFF;

/// Number of end-frame bytes for a chain of `num_leds`
pub fn end_frame_len(num_leds: usize) -> usize {
    num_leds.div_ceil(16)
}

/// Total wire-frame length for a chain of `num_leds`
pub fn frame_len(num_leds: usize) -> usize {
    START_FRAME_LEN + num_leds * crate::topology::BYTES_PER_LED + end_frame_len(num_leds)
}

/// First byte of an LED record for a brightness in 0..=31 (higher values saturate)
pub fn led_header(brightness: u8) -> u8 {
    LED_FRAME_MARKER | brightness.min(MAX_BRIGHTNESS)
}

/// Serialize a pixel buffer into a complete wire frame
///
/// When `gamma` is given every channel is passed through the table first.
pub fn encode(
    buffer: &PixelBuffer,
    map: &TopologyMap,
    brightness: u8,
    gamma: Option<&GammaTable>,
) -> Result<Vec<u8>> {
    let mut frame = Vec::with_capacity(frame_len(map.num_leds()));
    encode_into(buffer, map, brightness, gamma, &mut frame)?;
    Ok(frame)
}

/// Like [`encode`], but reuses `frame` as output storage
pub fn encode_into(
    buffer: &PixelBuffer,
    map: &TopologyMap,
    brightness: u8,
    gamma: Option<&GammaTable>,
    frame: &mut Vec<u8>,
) -> Result<()> {
    let expected = map.config().dimensions();
    if buffer.dimensions() != expected {
        return Err(CoreError::DimensionMismatch {
            expected,
            actual: buffer.dimensions(),
        });
    }

    let num_leds = map.num_leds();
    frame.clear();
    frame.resize(frame_len(num_leds), 0);

    let header = led_header(brightness);
    let correct = |value: u8| match gamma {
        Some(table) => table.correct(value),
        None => value,
    };

    let leds = &mut frame[START_FRAME_LEN..START_FRAME_LEN + map.led_section_len()];
    for (slot, pixel) in map.slots().iter().zip(buffer.pixels()) {
        leds[slot.brightness] = header;
        leds[slot.red] = correct(pixel.r);
        leds[slot.green] = correct(pixel.g);
        leds[slot.blue] = correct(pixel.b);
    }

    frame[START_FRAME_LEN + map.led_section_len()..].fill(END_FRAME_BYTE);
    Ok(())
}
