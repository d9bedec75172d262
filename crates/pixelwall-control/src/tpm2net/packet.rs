//! tpm2-net datagram layout
//!
//! ```text
//! 0     1     2..4        4       5       6..n-1   n-1
//! 0x9C  type  frame_size  number  count   payload  0x36
//! ```
//!
//! `frame_size` is big-endian and counts the payload bytes.

use crate::error::ProtocolError;

/// Start marker
pub const START_BYTE: u8 = 0x9C;
/// End marker
pub const END_BYTE: u8 = 0x36;
/// Bytes before the payload
pub const HEADER_LEN: usize = 6;
/// Smallest datagram that is considered at all
pub const MIN_PACKET_LEN: usize = 8;
/// Header plus end marker
pub const FRAMING_LEN: usize = HEADER_LEN + 1;

/// tpm2 packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Pixel data
    Data = 0xDA,
    /// Command (not implemented)
    Command = 0xC0,
    /// Request response (not implemented)
    Response = 0xAA,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0xDA => Ok(PacketType::Data),
            0xC0 => Ok(PacketType::Command),
            0xAA => Ok(PacketType::Response),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }
}

/// A validated datagram borrowing its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tpm2Packet<'a> {
    /// Packet type
    pub packet_type: PacketType,
    /// Packet number within the frame
    pub packet_number: u8,
    /// Number of packets making up the frame
    pub packet_count: u8,
    /// Pixel bytes
    pub payload: &'a [u8],
}

impl<'a> Tpm2Packet<'a> {
    /// Validate framing and split a datagram into its fields
    pub fn parse(data: &'a [u8]) -> Result<Self, ProtocolError> {
        if data.len() < MIN_PACKET_LEN {
            return Err(ProtocolError::TooShort(data.len()));
        }
        if data[0] != START_BYTE {
            return Err(ProtocolError::BadStartByte(data[0]));
        }
        let last = data[data.len() - 1];
        if last != END_BYTE {
            return Err(ProtocolError::BadEndByte(last));
        }
        let declared = usize::from(u16::from_be_bytes([data[2], data[3]]));
        let actual = data.len() - FRAMING_LEN;
        if declared != actual {
            return Err(ProtocolError::LengthMismatch { declared, actual });
        }
        let packet_type = PacketType::try_from(data[1])?;

        Ok(Self {
            packet_type,
            packet_number: data[4],
            packet_count: data[5],
            payload: &data[HEADER_LEN..data.len() - 1],
        })
    }
}

/// Build a data datagram
///
/// Payloads longer than `u16::MAX` are truncated.
pub fn build_data_packet(packet_number: u8, packet_count: u8, payload: &[u8]) -> Vec<u8> {
    let payload = &payload[..payload.len().min(usize::from(u16::MAX))];
    let mut packet = Vec::with_capacity(payload.len() + FRAMING_LEN);
    packet.push(START_BYTE);
    packet.push(PacketType::Data as u8);
    packet.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    packet.push(packet_number);
    packet.push(packet_count);
    packet.extend_from_slice(payload);
    packet.push(END_BYTE);
    packet
}

/// Split one frame into data datagrams of at most `chunk` payload bytes,
/// numbered from `first_number`
pub fn build_frame_packets(frame: &[u8], chunk: usize, first_number: u8) -> Vec<Vec<u8>> {
    let chunks: Vec<&[u8]> = frame.chunks(chunk.max(1)).collect();
    let count = chunks.len() as u8;
    chunks
        .iter()
        .enumerate()
        .map(|(i, payload)| build_data_packet(first_number.wrapping_add(i as u8), count, payload))
        .collect()
}
