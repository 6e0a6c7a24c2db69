//! Protocol error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid header constant: expected {expected:#04x}, got {actual:#04x}")]
    InvalidHeader { expected: u8, actual: u8 },

    #[error("Invalid declared length: {0}")]
    InvalidLength(usize),

    #[error("Unknown message id: {0:#04x}")]
    UnknownMessageId(u8),

    #[error("Packet too small: expected at least {expected}, got {actual}")]
    PacketTooSmall { expected: usize, actual: usize },

    #[error("Packet too large: maximum {max}, got {actual}")]
    PacketTooLarge { max: usize, actual: usize },

    #[error("Unterminated string at offset {0}")]
    UnterminatedString(usize),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}
