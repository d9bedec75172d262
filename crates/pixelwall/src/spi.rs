//! SPI output for the APA102 chain

use std::io;

use pixelwall_core::config::SpiConfig;
use pixelwall_core::LedBus;

/// Largest single spidev transfer (kernel default `bufsiz`)
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
const MAX_TRANSFER: usize = 4096;

/// APA102 chain on a Linux spidev device, SPI mode 0
#[cfg(target_os = "linux")]
pub struct SpiBus {
    device: linux_embedded_hal::spidev::Spidev,
}

#[cfg(target_os = "linux")]
impl SpiBus {
    /// Open and configure the device
    pub fn open(config: &SpiConfig) -> io::Result<Self> {
        use linux_embedded_hal::spidev::{SpiModeFlags, Spidev, SpidevOptions};

        let mut device = Spidev::open(&config.device)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(config.max_speed_hz)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        device.configure(&options)?;
        tracing::info!(
            "Opened {} at {} Hz",
            config.device.display(),
            config.max_speed_hz
        );
        Ok(Self { device })
    }
}

#[cfg(target_os = "linux")]
impl LedBus for SpiBus {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        use std::io::Write;

        // APA102 has no chip select, so a frame may span several transfers
        for chunk in bytes.chunks(MAX_TRANSFER) {
            self.device.write_all(chunk)?;
        }
        Ok(())
    }
}

/// Placeholder on platforms without spidev; opening always fails
#[cfg(not(target_os = "linux"))]
pub struct SpiBus;

#[cfg(not(target_os = "linux"))]
impl SpiBus {
    /// Always fails: spidev is Linux-only
    pub fn open(config: &SpiConfig) -> io::Result<Self> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!(
                "SPI device {} requires Linux spidev",
                config.device.display()
            ),
        ))
    }
}

#[cfg(not(target_os = "linux"))]
impl LedBus for SpiBus {
    fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}
