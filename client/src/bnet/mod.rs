//! Battle.net chat client
//!
//! [`BnetConnection`] owns no socket. The caller feeds it received bytes and
//! socket events, ticks it with [`BnetConnection::update`] about 20 times per
//! second, writes whatever [`BnetConnection::take_outgoing`] returns and
//! consumes [`BnetEvent`]s.

mod connection;
mod events;
mod pacing;

pub use connection::BnetConnection;
pub use events::{BnetEvent, DisconnectReason};

use protocol::ProtocolError;
use protocol::crypto::CryptoError;
use thiserror::Error;

/// Session progress, from socket connect to chat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    AwaitingAuthInfo,
    AwaitingAuthCheck,
    AwaitingAccountLogon,
    AwaitingProof,
    InChat,
}

/// Failures that end the process, not just the session
#[derive(Error, Debug)]
pub enum BnetError {
    #[error("Crypto provider failed: {0}")]
    Crypto(#[from] CryptoError),

    #[error("NLS public key has {actual} bytes after retry, expected 32")]
    NlsKeySize { actual: usize },

    #[error("Failed to encode packet: {0}")]
    Encode(#[from] ProtocolError),
}

impl BnetError {
    /// How the session ends when this error stops the engine
    pub fn disconnect_reason(&self) -> DisconnectReason {
        match self {
            BnetError::Crypto(_) | BnetError::NlsKeySize { .. } => {
                DisconnectReason::CryptoFailure(self.to_string())
            }
            BnetError::Encode(e) => DisconnectReason::EncodeFailure(e.clone()),
        }
    }
}
