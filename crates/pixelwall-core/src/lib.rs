//! PixelWall Core - LED matrix driver and frame arbitration
//!
//! This crate contains everything between a frame producer and the LED chain:
//! - Gamma correction lookup tables
//! - Wiring topology mapping (logical pixel -> physical LED byte offsets)
//! - APA102 wire-protocol encoding
//! - The single-slot frame hand-off queue
//! - The producer interface and the animation scheduler
//! - Display backends and the display loop that owns the hardware bus

#![warn(missing_docs)]

use thiserror::Error;

pub mod animations;
pub mod apa102;
pub mod bus;
pub mod config;
pub mod display;
pub mod display_loop;
pub mod frame;
pub mod frame_queue;
pub mod gamma;
pub mod logging;
pub mod producer;
pub mod scheduler;
pub mod status;
pub mod topology;
pub mod wiring;

// --- Re-exports grouped by category ---

// Pixel data & wiring
pub use frame::{Dimensions, PixelBuffer, Rgb};
pub use gamma::{GammaTable, DEFAULT_GAMMA};
pub use topology::{LedSlot, TopologyMap};
pub use wiring::{ColorOrder, Orientation, Origin, WireMode, WiringConfig};

// Hardware output
pub use bus::{LedBus, MemoryBus};
pub use display::{Apa102Display, Display, TerminalDisplay};
pub use display_loop::DisplayLoop;

// Frame arbitration
pub use animations::default_factories;
pub use frame_queue::{FrameQueue, PutTimeoutError};
pub use producer::{
    Producer, ProducerContext, ProducerFactory, ProducerHandle, ProducerKind, ProducerParams,
    Repeat, StopFlag,
};
pub use scheduler::{
    AnimationScheduler, SchedulerConfig, SchedulerHandle, SchedulerState, Selection,
};
pub use status::StreamStatus;

// Configuration & logging
pub use config::{AppConfig, Backend, DisplayConfig, SpiConfig, Tpm2NetConfig};
pub use logging::LogConfig;

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid wiring, display or scheduler configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A pixel buffer does not match the configured matrix size
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimensions
        expected: Dimensions,
        /// Dimensions of the offending buffer
        actual: Dimensions,
    },

    /// Writing to the LED bus failed
    #[error("Hardware I/O error: {0}")]
    HardwareIo(#[from] std::io::Error),

    /// The frame queue was shut down
    #[error("Frame queue closed")]
    QueueClosed,

    /// A producer could not be created or failed while running
    #[error("Producer error: {0}")]
    Producer(String),

    /// The configuration file could not be parsed
    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
