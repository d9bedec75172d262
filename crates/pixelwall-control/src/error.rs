//! Error types for the network ingest
use thiserror::Error;

/// Reasons a tpm2-net datagram is rejected
///
/// Always non-fatal: the datagram is dropped and no session state changes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Shorter than the minimal packet
    #[error("packet too short: {0} bytes")]
    TooShort(usize),

    /// First byte is not the start marker
    #[error("bad start byte 0x{0:02X}")]
    BadStartByte(u8),

    /// Last byte is not the end marker
    #[error("bad end byte 0x{0:02X}")]
    BadEndByte(u8),

    /// Declared frame size disagrees with the datagram length
    #[error("frame size {declared} does not match payload length {actual}")]
    LengthMismatch {
        /// Frame size from the header
        declared: usize,
        /// Payload length actually received
        actual: usize,
    },

    /// Packet type byte is not a tpm2 type
    #[error("unknown packet type 0x{0:02X}")]
    UnknownPacketType(u8),
}

/// Control system errors
#[derive(Error, Debug)]
pub enum ControlError {
    /// Malformed datagram
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Socket or thread error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the driver core
    #[error("Core error: {0}")]
    Core(#[from] pixelwall_core::CoreError),
}

/// Result type for control operations
pub type Result<T> = std::result::Result<T, ControlError>;
