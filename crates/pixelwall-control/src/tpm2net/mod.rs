//! tpm2-net streaming ingest
//!
//! - [`packet`]: datagram validation and construction
//! - [`session`]: multi-packet frame reassembly
//! - [`server`]: UDP listener thread with the inactivity timer

pub mod packet;
pub mod server;
pub mod session;

pub use packet::{build_data_packet, build_frame_packets, PacketType, Tpm2Packet};
pub use server::{InactivityTimer, Tpm2NetServer};
pub use session::{PacketOutcome, SessionStats, Tpm2NetSession};

/// Well-known tpm2-net port
pub use pixelwall_core::config::DEFAULT_TPM2_NET_PORT as TPM2_NET_PORT;
