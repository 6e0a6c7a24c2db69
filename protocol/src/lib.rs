//! hostbot protocol library
//!
//! Shared wire definitions for the Battle.net chat protocol (BNCS) and the
//! LAN/lobby game protocol (W3GS). This includes the byte codec, packet
//! framing, the stat string transform and typed message codecs.

pub mod bnet;
pub mod codec;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod framing;
pub mod statstring;
pub mod w3gs;

pub use codec::{ByteReader, Part, PacketWriter};
pub use error::ProtocolError;
pub use framing::{HeaderKind, Packet, PacketBuffer};

/// Header constant of every BNCS packet
pub const BNET_HEADER_CONSTANT: u8 = 0xFF;

/// Header constant of every W3GS packet
pub const W3GS_HEADER_CONSTANT: u8 = 0xF7;

/// Largest packet the u16 length field can describe
pub const MAX_PACKET_SIZE: usize = 65535;

/// Minimum packet size (header constant, id, length field)
pub const MIN_PACKET_SIZE: usize = 4;
