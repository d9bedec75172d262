//! PixelWall - APA102 LED matrix driver
//!
//! Usage: `pixelwall [CONFIG]` (default `pixelwall.toml`).
//!
//! Plays the configured animations on the matrix and hands the display to a
//! tpm2-net sender whenever one is streaming.

#![warn(missing_docs)]

mod logging_setup;
mod spi;

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use pixelwall_control::Tpm2NetServer;
use pixelwall_core::apa102::MAX_BRIGHTNESS;
use pixelwall_core::{
    default_factories, AnimationScheduler, Apa102Display, AppConfig, Backend, Display,
    DisplayLoop, FrameQueue, StreamStatus, TerminalDisplay,
};
use tracing::{error, info, warn};

use crate::spi::SpiBus;

const DEFAULT_CONFIG_PATH: &str = "pixelwall.toml";

fn main() -> Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config_found = config_path.exists();
    let config = if config_found {
        AppConfig::load(&config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?
    } else {
        AppConfig::default()
    };

    let _log_guard = logging_setup::init(&config.logging)?;

    info!("==========================================");
    info!("===     PixelWall Session Started      ===");
    info!("==========================================");
    if config_found {
        info!("Loaded config from {}", config_path.display());
    } else {
        warn!(
            "Config file {} not found, using built-in defaults",
            config_path.display()
        );
    }
    config.validate().context("Invalid configuration")?;

    let result = run(&config);
    if let Err(e) = &result {
        error!("PixelWall stopped: {:#}", e);
    }
    result
}

fn run(config: &AppConfig) -> Result<()> {
    let dimensions = config.display.dimensions();
    let queue = FrameQueue::new();
    let status = StreamStatus::new();

    let mut scheduler = AnimationScheduler::new(
        config.scheduler.clone(),
        queue.clone(),
        status.clone(),
        dimensions,
    );
    for factory in default_factories() {
        scheduler.register(factory);
    }
    scheduler.set_playlist(config.playlist.clone());
    info!(
        "Scheduler: {:?} over {} playlist entries, enabled {:?}",
        config.scheduler.selection,
        config.playlist.len(),
        scheduler.enabled_kinds()
    );

    // Kept alive until the display loop returns
    let _tpm2net = if config.tpm2net.enabled {
        let server =
            Tpm2NetServer::spawn(&config.tpm2net, dimensions, queue.clone(), status.clone())
                .context("Failed to start tpm2-net server")?;
        Some(server)
    } else {
        info!("tpm2-net disabled");
        None
    };

    match config.display.backend {
        Backend::Apa102 => {
            let bus = SpiBus::open(&config.spi)
                .with_context(|| format!("Failed to open SPI device {}", config.spi.device.display()))?;
            let mut apa102 = Apa102Display::new(bus, &config.display.wiring())?;
            apa102.set_brightness(config.display.brightness)?;
            apa102.set_gamma(config.display.gamma)?;
            apa102.set_apply_gamma(config.display.apply_gamma);
            info!("\n{}", apa102);
            run_display(apa102, queue, scheduler, config.display.fps)
        }
        Backend::Terminal => {
            let mut display = TerminalDisplay::new(io::stdout(), dimensions);
            display.set_brightness(f32::from(config.display.brightness) / f32::from(MAX_BRIGHTNESS));
            run_display(display, queue, scheduler, config.display.fps)
        }
    }
}

fn run_display<D: Display>(
    display: D,
    queue: FrameQueue,
    scheduler: AnimationScheduler,
    fps: u32,
) -> Result<()> {
    let mut display_loop = DisplayLoop::new(display, queue, fps).with_scheduler(scheduler);
    display_loop.run().context("Display loop failed")
}
