//! Display backends
//!
//! - [`Apa102Display`]: gamma-corrects, maps and encodes frames for an APA102
//!   chain and writes them to an [`LedBus`]
//! - [`TerminalDisplay`]: renders frames as 24-bit ANSI color blocks, for
//!   running without hardware

use std::fmt;
use std::fmt::Write as _;
use std::io::Write;

use tracing::debug;

use crate::apa102::{self, MAX_BRIGHTNESS};
use crate::bus::LedBus;
use crate::frame::{Dimensions, PixelBuffer, Rgb};
use crate::gamma::GammaTable;
use crate::topology::TopologyMap;
use crate::wiring::WiringConfig;
use crate::{CoreError, Result};

/// Anything that can show a full RGB frame
pub trait Display: Send {
    /// Matrix size this display accepts
    fn dimensions(&self) -> Dimensions;

    /// Show one frame
    fn show(&mut self, frame: &PixelBuffer) -> Result<()>;

    /// Switch every pixel off
    fn clear(&mut self) -> Result<()> {
        let blank = PixelBuffer::new(self.dimensions());
        self.show(&blank)
    }
}

/// APA102 chain driven through a byte bus
pub struct Apa102Display<B: LedBus> {
    bus: B,
    map: TopologyMap,
    gamma: GammaTable,
    apply_gamma: bool,
    brightness: u8,
    /// Reused wire-frame storage
    frame: Vec<u8>,
}

impl<B: LedBus> Apa102Display<B> {
    /// Create a display for the given wiring, at full brightness with default gamma
    pub fn new(bus: B, wiring: &WiringConfig) -> Result<Self> {
        let map = TopologyMap::build(wiring)?;
        debug!("Topology for {}:\n{}", wiring.dimensions(), map);
        Ok(Self {
            bus,
            frame: Vec::with_capacity(apa102::frame_len(map.num_leds())),
            map,
            gamma: GammaTable::default(),
            apply_gamma: true,
            brightness: MAX_BRIGHTNESS,
        })
    }

    /// Set the global brightness (0..=31)
    pub fn set_brightness(&mut self, brightness: u8) -> Result<()> {
        if brightness > MAX_BRIGHTNESS {
            return Err(CoreError::Configuration(format!(
                "brightness must be 0..={}, got {}",
                MAX_BRIGHTNESS, brightness
            )));
        }
        self.brightness = brightness;
        Ok(())
    }

    /// Current global brightness
    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Rebuild the gamma table for a new exponent
    pub fn set_gamma(&mut self, gamma: f64) -> Result<()> {
        self.gamma = GammaTable::new(gamma)?;
        Ok(())
    }

    /// Current gamma table
    pub fn gamma(&self) -> &GammaTable {
        &self.gamma
    }

    /// Enable or disable gamma correction
    pub fn set_apply_gamma(&mut self, apply_gamma: bool) {
        self.apply_gamma = apply_gamma;
    }

    /// The cached topology map
    pub fn topology(&self) -> &TopologyMap {
        &self.map
    }

    /// The underlying bus
    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B: LedBus> Display for Apa102Display<B> {
    fn dimensions(&self) -> Dimensions {
        self.map.config().dimensions()
    }

    fn show(&mut self, frame: &PixelBuffer) -> Result<()> {
        let gamma = self.apply_gamma.then_some(&self.gamma);
        apa102::encode_into(frame, &self.map, self.brightness, gamma, &mut self.frame)?;
        self.bus.write(&self.frame)?;
        Ok(())
    }
}

impl<B: LedBus> fmt::Display for Apa102Display<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.map)
    }
}

/// Preview display rendering to an ANSI terminal
pub struct TerminalDisplay<W: Write + Send> {
    dimensions: Dimensions,
    writer: W,
    brightness: f32,
    drawn: bool,
}

impl<W: Write + Send> TerminalDisplay<W> {
    /// Create a preview of the given size
    pub fn new(writer: W, dimensions: Dimensions) -> Self {
        Self {
            dimensions,
            writer,
            brightness: 1.0,
            drawn: false,
        }
    }

    /// Set preview brightness, clamped to 0.0..=1.0
    pub fn set_brightness(&mut self, brightness: f32) {
        self.brightness = brightness.clamp(0.0, 1.0);
    }

    /// Consume the display and return the writer
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn render(&self, frame: &PixelBuffer) -> String {
        let mut out = String::new();
        if self.drawn {
            // Redraw in place
            let _ = write!(out, "\x1b[{}A", self.dimensions.rows);
        }
        for row in 0..self.dimensions.rows {
            for col in 0..self.dimensions.cols {
                let Rgb { r, g, b } = frame
                    .pixel(row, col)
                    .unwrap_or_default()
                    .scaled(self.brightness);
                let _ = write!(out, "\x1b[48;2;{};{};{}m  ", r, g, b);
            }
            out.push_str("\x1b[0m\n");
        }
        out
    }
}

impl<W: Write + Send> Display for TerminalDisplay<W> {
    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn show(&mut self, frame: &PixelBuffer) -> Result<()> {
        if frame.dimensions() != self.dimensions {
            return Err(CoreError::DimensionMismatch {
                expected: self.dimensions,
                actual: frame.dimensions(),
            });
        }
        let rendered = self.render(frame);
        self.writer.write_all(rendered.as_bytes())?;
        self.writer.flush()?;
        self.drawn = true;
        Ok(())
    }
}
