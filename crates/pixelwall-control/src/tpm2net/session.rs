//! Frame reassembly for one tpm2-net stream

use std::time::{Duration, Instant};

use pixelwall_core::{Dimensions, PixelBuffer};
use tracing::{debug, info, trace};

use super::packet::{PacketType, Tpm2Packet};
use crate::error::ProtocolError;

/// Counters for one server lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Valid datagrams
    pub packets_accepted: u64,
    /// Malformed datagrams
    pub packets_dropped: u64,
    /// Frames fully reassembled
    pub frames_completed: u64,
    /// Streams that ended by inactivity
    pub timeouts: u64,
}

/// What a datagram did to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketOutcome {
    /// Recognized but unimplemented packet type
    Ignored(PacketType),
    /// Data stored, frame not complete yet
    Partial,
    /// Last packet of a frame arrived; a copy of the frame
    FrameComplete(PixelBuffer),
}

/// Reassembly state
///
/// Some senders number packets from 0 instead of 1. Seeing packet 0 marks
/// the stream as misbehaving until the session resets, shifting the
/// expected first and last packet numbers down by one.
#[derive(Debug)]
pub struct Tpm2NetSession {
    dimensions: Dimensions,
    buffer: Vec<u8>,
    cursor: usize,
    misbehaving: bool,
    last_packet: Option<Instant>,
    stats: SessionStats,
}

impl Tpm2NetSession {
    /// Create an idle session for the matrix
    pub fn new(dimensions: Dimensions) -> Self {
        Self {
            dimensions,
            buffer: vec![0; dimensions.byte_len()],
            cursor: 0,
            misbehaving: false,
            last_packet: None,
            stats: SessionStats::default(),
        }
    }

    /// Process one datagram received at `now`
    pub fn handle(&mut self, datagram: &[u8], now: Instant) -> Result<PacketOutcome, ProtocolError> {
        let packet = match Tpm2Packet::parse(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.packets_dropped += 1;
                return Err(e);
            }
        };
        self.stats.packets_accepted += 1;

        if packet.packet_type != PacketType::Data {
            trace!("Ignoring tpm2-net {:?} packet", packet.packet_type);
            return Ok(PacketOutcome::Ignored(packet.packet_type));
        }

        if self.last_packet.is_none() {
            info!("tpm2-net stream started");
        }
        self.last_packet = Some(now);

        if packet.packet_number == 0 && !self.misbehaving {
            debug!("tpm2-net sender numbers packets from 0");
            self.misbehaving = true;
        }
        let (first, last) = if self.misbehaving {
            (0, packet.packet_count.wrapping_sub(1))
        } else {
            (1, packet.packet_count)
        };

        if packet.packet_number == first {
            self.cursor = 0;
        }
        self.store(packet.payload);

        if packet.packet_number == last {
            self.stats.frames_completed += 1;
            let frame = PixelBuffer::from_flat_lossy(self.dimensions, &self.buffer);
            return Ok(PacketOutcome::FrameComplete(frame));
        }
        Ok(PacketOutcome::Partial)
    }

    /// Copy payload at the cursor, clamped to the buffer end. The cursor
    /// advances by the full payload length regardless.
    fn store(&mut self, payload: &[u8]) {
        let start = self.cursor.min(self.buffer.len());
        let end = self.cursor.saturating_add(payload.len()).min(self.buffer.len());
        self.buffer[start..end].copy_from_slice(&payload[..end - start]);
        self.cursor = self.cursor.saturating_add(payload.len());
    }

    /// End the stream if nothing arrived for longer than `timeout`
    pub fn check_timeout(&mut self, now: Instant, timeout: Duration) -> bool {
        let Some(last) = self.last_packet else {
            return false;
        };
        if now.saturating_duration_since(last) > timeout {
            info!("tpm2-net stream timed out");
            self.stats.timeouts += 1;
            self.reset();
            return true;
        }
        false
    }

    /// Forget the current stream
    pub fn reset(&mut self) {
        self.buffer.fill(0);
        self.cursor = 0;
        self.misbehaving = false;
        self.last_packet = None;
    }

    /// Is a stream in progress?
    pub fn is_active(&self) -> bool {
        self.last_packet.is_some()
    }

    /// Has the sender been detected as numbering from 0?
    pub fn is_misbehaving(&self) -> bool {
        self.misbehaving
    }

    /// Bytes written since the start of the current frame
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Counters
    pub fn stats(&self) -> SessionStats {
        self.stats
    }
}
