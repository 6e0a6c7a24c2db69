//! Events surfaced by the Battle.net engine

use protocol::bnet::{ChatEvent, ClanMember, Friend, GameListing};
use protocol::constants::{AccountLogonStatus, AuthCheckStatus, LogonProofStatus};
use protocol::ProtocolError;

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Local request
    Requested,
    /// The peer closed the socket or it failed
    ConnectionClosed,
    /// The stream could not be framed
    InvalidPacket(ProtocolError),
    AuthCheckRejected {
        status: AuthCheckStatus,
        description: String,
    },
    LogonRejected(AccountLogonStatus),
    ProofRejected {
        status: LogonProofStatus,
        message: String,
    },
    /// The crypto provider failed or produced an unusable key
    CryptoFailure(String),
    /// A packet could not be built
    EncodeFailure(ProtocolError),
}

impl DisconnectReason {
    /// Whether reconnecting with the same configuration can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, DisconnectReason::ConnectionClosed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BnetEvent {
    /// Logon proof accepted
    LoggedIn,
    /// SID_ENTERCHAT answered; `unique_name` is the name others see
    EnteredChat { unique_name: String },
    Chat(ChatEvent),
    /// A chat command was accepted into the outbound queue
    CommandQueued(String),
    FriendsList(Vec<Friend>),
    ClanMembers(Vec<ClanMember>),
    GameList(Vec<GameListing>),
    Disconnected(DisconnectReason),
}
