//! Protocol constants: product tags, status codes and lobby/slot values

/// Sent once, before anything else, on a fresh BNCS connection
pub const PROTOCOL_SELECTOR_BNCS: u8 = 0x01;

/// Platform tag, stored reversed on the wire ("IX86")
pub const PLATFORM_IX86: [u8; 4] = *b"68XI";

/// Frozen Throne product tag ("W3XP" reversed)
pub const PRODUCT_TFT: [u8; 4] = *b"PX3W";

/// Reign of Chaos product tag ("WAR3" reversed)
pub const PRODUCT_ROC: [u8; 4] = *b"3RAW";

/// Length of a W3 CD key as sent in the key info block
pub const CD_KEY_LENGTH: u32 = 26;

/// Highest byte count a chat command may occupy on the wire
pub const MAX_CHAT_COMMAND_LEN: usize = 255;

/// Longest player name accepted by the lobby
pub const MAX_PLAYER_NAME_LEN: usize = 15;

/// Default UDP port game clients listen on for LAN lobbies
pub const GAME_BROADCAST_PORT: u16 = 6112;

/// Result of SID_AUTH_CHECK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthCheckStatus {
    Passed,
    OldGameVersion,
    InvalidVersion,
    MustDowngrade,
    InvalidCdKey,
    RocKeyInUse,
    TftKeyInUse,
    BannedKey,
    WrongProduct,
    Other(u32),
}

impl AuthCheckStatus {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0x000 => Self::Passed,
            0x100 => Self::OldGameVersion,
            0x101 => Self::InvalidVersion,
            0x102 => Self::MustDowngrade,
            0x200 => Self::InvalidCdKey,
            0x201 => Self::RocKeyInUse,
            0x211 => Self::TftKeyInUse,
            0x202 => Self::BannedKey,
            0x203 => Self::WrongProduct,
            other => Self::Other(other),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Passed => "version and CD key accepted",
            Self::OldGameVersion => "game version is too old",
            Self::InvalidVersion => "game version is invalid",
            Self::MustDowngrade => "game version must be downgraded",
            Self::InvalidCdKey => "ROC CD key is invalid",
            Self::RocKeyInUse => "ROC CD key is in use",
            Self::TftKeyInUse => "TFT CD key is in use",
            Self::BannedKey => "CD key is banned",
            Self::WrongProduct => "CD key is for another product",
            Self::Other(_) => "unknown auth check failure",
        }
    }
}

/// Result of SID_AUTH_ACCOUNTLOGON
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountLogonStatus {
    Accepted,
    NoSuchAccount,
    UpgradeRequired,
    Other(u32),
}

impl AccountLogonStatus {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Accepted,
            1 => Self::NoSuchAccount,
            5 => Self::UpgradeRequired,
            other => Self::Other(other),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Accepted => "logon accepted",
            Self::NoSuchAccount => "account does not exist",
            Self::UpgradeRequired => "account requires upgrade",
            Self::Other(_) => "unknown logon failure",
        }
    }
}

/// Result of SID_AUTH_ACCOUNTLOGONPROOF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogonProofStatus {
    Accepted,
    IncorrectPassword,
    EmailRequired,
    CustomError,
    Other(u32),
}

impl LogonProofStatus {
    pub fn from_u32(value: u32) -> Self {
        match value {
            0x00 => Self::Accepted,
            0x02 => Self::IncorrectPassword,
            0x0E => Self::EmailRequired,
            0x0F => Self::CustomError,
            other => Self::Other(other),
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::Accepted => "logon proof accepted",
            Self::IncorrectPassword => "incorrect password",
            Self::EmailRequired => "email address must be registered",
            Self::CustomError => "server reported an error",
            Self::Other(_) => "unknown logon proof failure",
        }
    }
}

/// Event kinds carried by SID_CHATEVENT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ChatEventId {
    ShowUser = 0x01,
    Join = 0x02,
    Leave = 0x03,
    Whisper = 0x04,
    Talk = 0x05,
    Broadcast = 0x06,
    Channel = 0x07,
    UserFlags = 0x09,
    WhisperSent = 0x0A,
    ChannelFull = 0x0D,
    ChannelDoesNotExist = 0x0E,
    ChannelRestricted = 0x0F,
    Info = 0x12,
    Error = 0x13,
    Emote = 0x17,
}

impl ChatEventId {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x01 => Some(Self::ShowUser),
            0x02 => Some(Self::Join),
            0x03 => Some(Self::Leave),
            0x04 => Some(Self::Whisper),
            0x05 => Some(Self::Talk),
            0x06 => Some(Self::Broadcast),
            0x07 => Some(Self::Channel),
            0x09 => Some(Self::UserFlags),
            0x0A => Some(Self::WhisperSent),
            0x0D => Some(Self::ChannelFull),
            0x0E => Some(Self::ChannelDoesNotExist),
            0x0F => Some(Self::ChannelRestricted),
            0x12 => Some(Self::Info),
            0x13 => Some(Self::Error),
            0x17 => Some(Self::Emote),
            _ => None,
        }
    }
}

/// Friend list location codes
pub mod friend_location {
    pub const OFFLINE: u8 = 0;
    pub const NO_CHANNEL: u8 = 1;
    pub const IN_CHANNEL: u8 = 2;
    pub const PUBLIC_GAME: u8 = 3;
    pub const PRIVATE_GAME: u8 = 4;
    pub const PRIVATE_GAME_NOT_FRIEND: u8 = 5;
}

/// Friend list status bits
pub mod friend_status {
    pub const MUTUAL: u8 = 0x01;
    pub const DND: u8 = 0x02;
    pub const AWAY: u8 = 0x04;
}

/// Reasons carried by W3GS_REJECTJOIN
pub const REJECTJOIN_FULL: u32 = 9;

/// Reasons carried by W3GS_PLAYERLEAVE_OTHERS
pub const PLAYERLEAVE_LOST: u32 = 7;
pub const PLAYERLEAVE_LOBBY: u32 = 13;

/// Slot race bits
pub const RACE_HUMAN: u8 = 1;
pub const RACE_ORC: u8 = 2;
pub const RACE_NIGHTELF: u8 = 4;
pub const RACE_UNDEAD: u8 = 8;
pub const RACE_RANDOM: u8 = 32;
pub const RACE_SELECTABLE: u8 = 64;

/// Most slots a lobby can have
pub const MAX_SLOTS: usize = 24;
