//! Packet framing shared by BNCS and W3GS
//!
//! Stream sockets deliver arbitrary slices of the packet stream, so received
//! bytes are appended to a [`PacketBuffer`] and whole packets are pulled out
//! one at a time, in arrival order, until the buffer holds an incomplete
//! remainder.

use crate::codec::PacketWriter;
use crate::error::ProtocolError;
use crate::{BNET_HEADER_CONSTANT, MIN_PACKET_SIZE, W3GS_HEADER_CONSTANT};

/// Which protocol a packet belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    /// Battle.net chat protocol (0xFF)
    BNet,
    /// Game LAN/lobby protocol (0xF7)
    Game,
}

impl HeaderKind {
    pub fn constant(self) -> u8 {
        match self {
            HeaderKind::BNet => BNET_HEADER_CONSTANT,
            HeaderKind::Game => W3GS_HEADER_CONSTANT,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            BNET_HEADER_CONSTANT => Some(HeaderKind::BNet),
            W3GS_HEADER_CONSTANT => Some(HeaderKind::Game),
            _ => None,
        }
    }
}

/// A complete, reassembled packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: HeaderKind,
    pub id: u8,
    /// Everything after the 4 byte packet header
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(header: HeaderKind, id: u8, payload: Vec<u8>) -> Self {
        Self { header, id, payload }
    }

    /// Total length on the wire, header included
    pub fn wire_len(&self) -> usize {
        self.payload.len() + MIN_PACKET_SIZE
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        PacketWriter::new(self.header.constant(), self.id)
            .bytes(&self.payload)
            .finish()
    }
}

/// Result of a single extraction attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// A whole packet and the number of buffer bytes it consumed
    Packet(Packet, usize),
    /// Not enough bytes buffered yet; the buffer must be left untouched
    Incomplete,
}

/// Try to frame one packet from the front of `buf`
///
/// A bad header constant or a declared length below 4 means the stream is
/// desynchronised; callers must drop the connection.
pub fn extract(header: HeaderKind, buf: &[u8]) -> Result<Extracted, ProtocolError> {
    if buf.len() < MIN_PACKET_SIZE {
        return Ok(Extracted::Incomplete);
    }

    if buf[0] != header.constant() {
        return Err(ProtocolError::InvalidHeader {
            expected: header.constant(),
            actual: buf[0],
        });
    }

    let length = u16::from_le_bytes([buf[2], buf[3]]) as usize;
    if length < MIN_PACKET_SIZE {
        return Err(ProtocolError::InvalidLength(length));
    }

    if buf.len() < length {
        return Ok(Extracted::Incomplete);
    }

    let packet = Packet::new(header, buf[1], buf[MIN_PACKET_SIZE..length].to_vec());
    Ok(Extracted::Packet(packet, length))
}

/// Per-connection receive accumulator
#[derive(Debug, Clone)]
pub struct PacketBuffer {
    header: HeaderKind,
    buf: Vec<u8>,
}

impl PacketBuffer {
    pub fn new(header: HeaderKind) -> Self {
        Self {
            header,
            buf: Vec::with_capacity(1024),
        }
    }

    pub fn header(&self) -> HeaderKind {
        self.header
    }

    /// Append freshly received bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pull the next whole packet, if one is buffered
    pub fn next_packet(&mut self) -> Result<Option<Packet>, ProtocolError> {
        match extract(self.header, &self.buf)? {
            Extracted::Packet(packet, consumed) => {
                self.buf.drain(..consumed);
                Ok(Some(packet))
            }
            Extracted::Incomplete => Ok(None),
        }
    }

    /// Pull every whole packet currently buffered, oldest first
    pub fn drain_packets(&mut self) -> Result<Vec<Packet>, ProtocolError> {
        let mut packets = Vec::new();
        while let Some(packet) = self.next_packet()? {
            packets.push(packet);
        }
        Ok(packets)
    }

    /// Bytes waiting for the rest of their packet
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
