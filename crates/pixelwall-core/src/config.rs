//! Application configuration
//!
//! Loaded from a TOML file. Every section falls back to defaults, so a
//! partial file (or none at all) gives a working 16x16 setup.

use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::apa102::MAX_BRIGHTNESS;
use crate::frame::Dimensions;
use crate::gamma::DEFAULT_GAMMA;
use crate::logging::LogConfig;
use crate::producer::ProducerParams;
use crate::scheduler::SchedulerConfig;
use crate::wiring::{ColorOrder, Orientation, Origin, WireMode, WiringConfig};
use crate::{CoreError, Result};

/// Well-known tpm2-net UDP port
pub const DEFAULT_TPM2_NET_PORT: u16 = 65506;

/// Output device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// APA102 chain on the SPI bus
    #[default]
    Apa102,
    /// ANSI preview on stdout
    Terminal,
}

/// `[display]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Matrix height
    pub rows: usize,
    /// Matrix width
    pub cols: usize,
    /// Channel order on the wire
    pub color_order: ColorOrder,
    /// Line chaining mode
    pub wire_mode: WireMode,
    /// Corner of the first LED
    pub origin: Origin,
    /// Chain direction
    pub orientation: Orientation,
    /// APA102 global brightness, 0..=31
    pub brightness: u8,
    /// Gamma exponent
    pub gamma: f64,
    /// Apply gamma correction before encoding
    pub apply_gamma: bool,
    /// Display loop refresh rate
    pub fps: u32,
    /// Output device
    pub backend: Backend,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        let wiring = WiringConfig::default();
        Self {
            rows: wiring.rows,
            cols: wiring.cols,
            color_order: wiring.color_order,
            wire_mode: wiring.wire_mode,
            origin: wiring.origin,
            orientation: wiring.orientation,
            brightness: MAX_BRIGHTNESS,
            gamma: DEFAULT_GAMMA,
            apply_gamma: true,
            fps: 60,
            backend: Backend::Apa102,
        }
    }
}

impl DisplayConfig {
    /// Wiring part of the section
    pub fn wiring(&self) -> WiringConfig {
        WiringConfig::new(self.rows, self.cols)
            .with_color_order(self.color_order)
            .with_wire_mode(self.wire_mode)
            .with_origin(self.origin)
            .with_orientation(self.orientation)
    }

    /// Matrix size
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.rows, self.cols)
    }

    /// Duration of one display tick
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

/// `[spi]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpiConfig {
    /// spidev device node
    pub device: PathBuf,
    /// Bus clock
    pub max_speed_hz: u32,
}

impl Default for SpiConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/spidev0.1"),
            max_speed_hz: 16_000_000,
        }
    }
}

/// `[tpm2net]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tpm2NetConfig {
    /// Start the UDP listener
    pub enabled: bool,
    /// Listen address
    pub bind: SocketAddr,
    /// Inactivity after which the stream is considered over
    pub timeout_ms: u64,
    /// How often inactivity is checked while a stream is active
    pub check_interval_ms: u64,
}

impl Default for Tpm2NetConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_TPM2_NET_PORT)),
            timeout_ms: 3000,
            check_interval_ms: 500,
        }
    }
}

impl Tpm2NetConfig {
    /// Inactivity timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Inactivity check period
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Matrix and output settings
    pub display: DisplayConfig,
    /// SPI bus settings
    pub spi: SpiConfig,
    /// Network ingest settings
    pub tpm2net: Tpm2NetConfig,
    /// Producer selection settings
    pub scheduler: SchedulerConfig,
    /// Selectable producers
    pub playlist: Vec<ProducerParams>,
    /// Logging settings
    pub logging: LogConfig,
}

impl AppConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            CoreError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CoreError::Configuration(format!("cannot serialize config: {}", e)))
    }

    /// Reject values the driver cannot run with
    pub fn validate(&self) -> Result<()> {
        self.display.wiring().validate()?;

        if self.display.brightness > MAX_BRIGHTNESS {
            return Err(CoreError::Configuration(format!(
                "display.brightness must be 0..={}, got {}",
                MAX_BRIGHTNESS, self.display.brightness
            )));
        }
        if !self.display.gamma.is_finite() || self.display.gamma <= 0.0 {
            return Err(CoreError::Configuration(format!(
                "display.gamma must be positive, got {}",
                self.display.gamma
            )));
        }
        if self.display.fps == 0 {
            return Err(CoreError::Configuration(
                "display.fps must be at least 1".to_string(),
            ));
        }
        if self.tpm2net.enabled && (self.tpm2net.timeout_ms == 0 || self.tpm2net.check_interval_ms == 0) {
            return Err(CoreError::Configuration(
                "tpm2net.timeout_ms and tpm2net.check_interval_ms must be positive".to_string(),
            ));
        }
        if self.spi.max_speed_hz == 0 {
            return Err(CoreError::Configuration(
                "spi.max_speed_hz must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
