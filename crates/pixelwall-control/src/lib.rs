//! PixelWall Control - network ingest for the LED matrix driver
//!
//! This crate receives pixel streams from the network and injects them into
//! the driver's frame queue, preempting scheduled animations while a stream
//! is active:
//! - **tpm2-net**: UDP frames split over several datagrams (Glediator,
//!   Jinx!, PixelController)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pixelwall_control::Tpm2NetServer;
//! use pixelwall_core::{Dimensions, FrameQueue, StreamStatus, Tpm2NetConfig};
//!
//! let queue = FrameQueue::new();
//! let status = StreamStatus::new();
//! let server = Tpm2NetServer::spawn(
//!     &Tpm2NetConfig::default(),
//!     Dimensions::new(16, 16),
//!     queue.clone(),
//!     status.clone(),
//! )
//! .unwrap();
//! println!("listening on {}", server.local_addr());
//! ```

#![warn(missing_docs)]

/// Error types
pub mod error;
/// tpm2-net protocol and server
pub mod tpm2net;

// Re-exports
pub use error::{ControlError, ProtocolError, Result};
pub use pixelwall_core::Tpm2NetConfig;
pub use tpm2net::{PacketOutcome, SessionStats, Tpm2NetServer, Tpm2NetSession};
