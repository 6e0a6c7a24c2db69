//! BNCS message codecs
//!
//! Request and response types share message ids, so each direction gets its
//! own struct. Every type can both `encode` itself into a framed packet and
//! `parse` itself from a packet payload.

use crate::BNET_HEADER_CONSTANT;
use crate::codec::{ByteReader, PacketWriter, latin1_bytes, latin1_string};
use crate::constants::{ChatEventId, PLATFORM_IX86, PRODUCT_ROC, PRODUCT_TFT};
use crate::crypto::{CdKeyInfo, NLS_KEY_SIZE, PROOF_SIZE};
use crate::error::ProtocolError;
use crate::framing::{HeaderKind, Packet};

/// BNCS message ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BnetMessageId {
    Null = 0x00,
    GetAdvListEx = 0x09,
    EnterChat = 0x0A,
    JoinChannel = 0x0C,
    ChatCommand = 0x0E,
    ChatEvent = 0x0F,
    FloodDetected = 0x13,
    MessageBox = 0x19,
    Ping = 0x25,
    NetGamePort = 0x45,
    RequiredWork = 0x4C,
    AuthInfo = 0x50,
    AuthCheck = 0x51,
    AuthAccountLogon = 0x53,
    AuthAccountLogonProof = 0x54,
    FriendsList = 0x65,
    FriendsUpdate = 0x66,
    FriendsAdd = 0x67,
    ClanInfo = 0x75,
    ClanInvitation = 0x77,
    ClanMemberList = 0x7D,
    ClanMemberRemoved = 0x7E,
    ClanMemberStatusChange = 0x7F,
}

impl BnetMessageId {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Null),
            0x09 => Some(Self::GetAdvListEx),
            0x0A => Some(Self::EnterChat),
            0x0C => Some(Self::JoinChannel),
            0x0E => Some(Self::ChatCommand),
            0x0F => Some(Self::ChatEvent),
            0x13 => Some(Self::FloodDetected),
            0x19 => Some(Self::MessageBox),
            0x25 => Some(Self::Ping),
            0x45 => Some(Self::NetGamePort),
            0x4C => Some(Self::RequiredWork),
            0x50 => Some(Self::AuthInfo),
            0x51 => Some(Self::AuthCheck),
            0x53 => Some(Self::AuthAccountLogon),
            0x54 => Some(Self::AuthAccountLogonProof),
            0x65 => Some(Self::FriendsList),
            0x66 => Some(Self::FriendsUpdate),
            0x67 => Some(Self::FriendsAdd),
            0x75 => Some(Self::ClanInfo),
            0x77 => Some(Self::ClanInvitation),
            0x7D => Some(Self::ClanMemberList),
            0x7E => Some(Self::ClanMemberRemoved),
            0x7F => Some(Self::ClanMemberStatusChange),
            _ => None,
        }
    }
}

fn writer(id: BnetMessageId) -> PacketWriter {
    PacketWriter::new(BNET_HEADER_CONSTANT, id as u8)
}

/// The four ASCII characters of a tag are stored reversed on the wire
fn reversed_tag(tag: &str, field: &'static str) -> Result<[u8; 4], ProtocolError> {
    let bytes: Vec<u8> = latin1_bytes(tag).collect();
    let mut out: [u8; 4] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| ProtocolError::InvalidField {
            field,
            reason: format!("expected 4 characters, got {}", bytes.len()),
        })?;
    out.reverse();
    Ok(out)
}

fn unreversed_tag(mut raw: [u8; 4]) -> String {
    raw.reverse();
    latin1_string(&raw)
}

// ---------------------------------------------------------------------------
// Client to server
// ---------------------------------------------------------------------------

/// SID_NULL keepalive, also the empty server heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Null;

impl Null {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(BnetMessageId::Null).finish()
    }

    pub fn parse(_payload: &[u8]) -> Result<Self, ProtocolError> {
        Ok(Null)
    }
}

/// SID_PING, sent by the server and echoed back unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub value: u32,
}

impl Ping {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(BnetMessageId::Ping).u32(self.value).finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        Ok(Self { value: r.u32()? })
    }
}

/// SID_AUTH_INFO request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfoRequest {
    pub tft: bool,
    pub version: u32,
    /// Four letter language code such as `ruRU`
    pub language: String,
    pub local_ip: [u8; 4],
    pub timezone_bias: u32,
    pub locale_id: u32,
    pub country_abbrev: String,
    pub country: String,
}

impl AuthInfoRequest {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let product = if self.tft { PRODUCT_TFT } else { PRODUCT_ROC };

        writer(BnetMessageId::AuthInfo)
            .u32(0)
            .bytes(&PLATFORM_IX86)
            .bytes(&product)
            .u32(self.version)
            .bytes(&reversed_tag(&self.language, "language")?)
            .bytes(&self.local_ip)
            .u32(self.timezone_bias)
            .u32(self.locale_id)
            .u32(self.locale_id)
            .cstring(&self.country_abbrev)
            .cstring(&self.country)
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        r.skip(4)?;
        let platform: [u8; 4] = r.array()?;
        if platform != PLATFORM_IX86 {
            return Err(ProtocolError::InvalidField {
                field: "platform",
                reason: format!("{:?}", platform),
            });
        }
        let tft = r.array::<4>()? == PRODUCT_TFT;
        let version = r.u32()?;
        let language = unreversed_tag(r.array()?);
        let local_ip = r.array()?;
        let timezone_bias = r.u32()?;
        let locale_id = r.u32()?;
        r.skip(4)?;
        let country_abbrev = r.cstring()?;
        let country = r.cstring()?;

        Ok(Self {
            tft,
            version,
            language,
            local_ip,
            timezone_bias,
            locale_id,
            country_abbrev,
            country,
        })
    }
}

/// SID_AUTH_CHECK request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCheckRequest {
    pub client_token: u32,
    pub exe_version: [u8; 4],
    pub exe_hash: u32,
    /// ROC key first, TFT key second when playing the expansion
    pub keys: Vec<CdKeyInfo>,
    pub exe_info: String,
    pub key_owner: String,
}

impl AuthCheckRequest {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let w = writer(BnetMessageId::AuthCheck)
            .u32(self.client_token)
            .bytes(&self.exe_version)
            .u32(self.exe_hash)
            .u32(self.keys.len() as u32)
            .u32(0);

        self.keys
            .iter()
            .fold(w, |w, key| key.write(w))
            .cstring(&self.exe_info)
            .cstring(&self.key_owner)
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        let client_token = r.u32()?;
        let exe_version = r.array()?;
        let exe_hash = r.u32()?;
        let num_keys = r.u32()? as usize;
        r.skip(4)?;

        if num_keys * CdKeyInfo::SIZE > r.remaining().len() {
            return Err(ProtocolError::InvalidField {
                field: "num_keys",
                reason: format!("{} keys do not fit the packet", num_keys),
            });
        }
        let keys = (0..num_keys)
            .map(|_| CdKeyInfo::read(&mut r))
            .collect::<Result<Vec<_>, _>>()?;

        let exe_info = r.cstring()?;
        let key_owner = r.cstring()?;

        Ok(Self {
            client_token,
            exe_version,
            exe_hash,
            keys,
            exe_info,
            key_owner,
        })
    }
}

/// SID_AUTH_ACCOUNTLOGON request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountLogonRequest {
    pub public_key: [u8; NLS_KEY_SIZE],
    pub username: String,
}

impl AccountLogonRequest {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(BnetMessageId::AuthAccountLogon)
            .bytes(&self.public_key)
            .cstring(&self.username)
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        Ok(Self {
            public_key: r.array()?,
            username: r.cstring()?,
        })
    }
}

/// SID_AUTH_ACCOUNTLOGONPROOF request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountLogonProofRequest {
    pub proof: [u8; PROOF_SIZE],
}

impl AccountLogonProofRequest {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(BnetMessageId::AuthAccountLogonProof)
            .bytes(&self.proof)
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        Ok(Self { proof: r.array()? })
    }
}

/// SID_NETGAMEPORT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetGamePort {
    pub port: u16,
}

impl NetGamePort {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(BnetMessageId::NetGamePort).u16(self.port).finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        Ok(Self { port: r.u16()? })
    }
}

/// SID_ENTERCHAT request: empty account name and stat string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnterChatRequest;

impl EnterChatRequest {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(BnetMessageId::EnterChat).cstring("").cstring("").finish()
    }
}

/// SID_JOINCHANNEL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinChannel {
    pub flags: u32,
    pub channel: String,
}

impl JoinChannel {
    pub const FIRST_JOIN: u32 = 0x01;
    pub const NO_CREATE: u32 = 0x02;

    /// Join `channel`, or the product's default channel when it is empty
    pub fn new(channel: &str) -> Self {
        let flags = if channel.is_empty() {
            Self::FIRST_JOIN
        } else {
            Self::NO_CREATE
        };
        Self {
            flags,
            channel: channel.to_string(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(BnetMessageId::JoinChannel)
            .u32(self.flags)
            .cstring(&self.channel)
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        Ok(Self {
            flags: r.u32()?,
            channel: r.cstring()?,
        })
    }
}

/// SID_CHATCOMMAND: chat line, whisper or slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCommand {
    pub text: String,
}

impl ChatCommand {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(BnetMessageId::ChatCommand)
            .cstring(&self.text)
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        Ok(Self { text: r.cstring()? })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FriendsListRequest;

impl FriendsListRequest {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(BnetMessageId::FriendsList).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClanMemberListRequest {
    pub cookie: u32,
}

impl ClanMemberListRequest {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(BnetMessageId::ClanMemberList)
            .u32(self.cookie)
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        Ok(Self { cookie: r.u32()? })
    }
}

/// SID_GETADVLISTEX request
///
/// An empty name lists open games; otherwise the server looks up that game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetAdvListEx {
    pub game_name: String,
    pub num_games: u32,
}

impl GetAdvListEx {
    pub fn new(game_name: &str) -> Self {
        Self {
            game_name: game_name.to_string(),
            num_games: 1,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let (cond1, cond2, cond3): ([u8; 2], [u8; 2], [u8; 4]) = if self.game_name.is_empty() {
            ([0, 224], [127, 0], [0, 0, 0, 0])
        } else {
            ([255, 3], [0, 0], [255, 3, 0, 0])
        };

        writer(BnetMessageId::GetAdvListEx)
            .bytes(&cond1)
            .bytes(&cond2)
            .bytes(&cond3)
            .u32(0)
            .u32(self.num_games)
            .cstring(&self.game_name)
            .cstring("")
            .cstring("")
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        r.skip(12)?;
        let num_games = r.u32()?;
        let game_name = r.cstring()?;
        r.cstring_bytes()?;
        r.cstring_bytes()?;
        Ok(Self {
            game_name,
            num_games,
        })
    }
}

// ---------------------------------------------------------------------------
// Server to client
// ---------------------------------------------------------------------------

/// SID_AUTH_INFO response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    pub logon_type: u32,
    pub server_token: u32,
    pub udp_value: u32,
    pub mpq_file_time: u64,
    /// Archive the version check formula runs against
    pub version_archive: String,
    pub formula: String,
}

impl AuthInfo {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(BnetMessageId::AuthInfo)
            .u32(self.logon_type)
            .u32(self.server_token)
            .u32(self.udp_value)
            .u32(self.mpq_file_time as u32)
            .u32((self.mpq_file_time >> 32) as u32)
            .cstring(&self.version_archive)
            .cstring(&self.formula)
            .finish()
    }

    /// Trailing data such as the server signature is ignored
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        Ok(Self {
            logon_type: r.u32()?,
            server_token: r.u32()?,
            udp_value: r.u32()?,
            mpq_file_time: r.u64()?,
            version_archive: r.cstring()?,
            formula: r.cstring()?,
        })
    }
}

/// SID_AUTH_CHECK response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCheckResult {
    pub status: u32,
    /// Extra information, such as the patch file name or the key owner
    pub description: String,
}

impl AuthCheckResult {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(BnetMessageId::AuthCheck)
            .u32(self.status)
            .cstring(&self.description)
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        Ok(Self {
            status: r.u32()?,
            description: r.cstring_lossy(),
        })
    }
}

/// SID_AUTH_ACCOUNTLOGON response
///
/// Servers omit salt and key on failure; they read back as zeros.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountLogonResult {
    pub status: u32,
    pub salt: [u8; NLS_KEY_SIZE],
    pub server_key: [u8; NLS_KEY_SIZE],
}

impl AccountLogonResult {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(BnetMessageId::AuthAccountLogon)
            .u32(self.status)
            .bytes(&self.salt)
            .bytes(&self.server_key)
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        let status = r.u32()?;
        let (salt, server_key) = if r.remaining().len() >= NLS_KEY_SIZE * 2 {
            (r.array()?, r.array()?)
        } else {
            ([0; NLS_KEY_SIZE], [0; NLS_KEY_SIZE])
        };

        Ok(Self {
            status,
            salt,
            server_key,
        })
    }
}

/// SID_AUTH_ACCOUNTLOGONPROOF response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountLogonProofResult {
    pub status: u32,
    pub server_proof: [u8; PROOF_SIZE],
    pub message: String,
}

impl AccountLogonProofResult {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(BnetMessageId::AuthAccountLogonProof)
            .u32(self.status)
            .bytes(&self.server_proof)
            .cstring(&self.message)
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        let status = r.u32()?;
        let server_proof = if r.remaining().len() >= PROOF_SIZE {
            r.array()?
        } else {
            [0; PROOF_SIZE]
        };

        Ok(Self {
            status,
            server_proof,
            message: r.cstring_lossy(),
        })
    }
}

/// SID_ENTERCHAT response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnterChat {
    /// Name the server knows us by; `#2` style suffixes mark duplicate logons
    pub unique_name: String,
    pub stat_string: String,
    pub account_name: String,
}

impl EnterChat {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(BnetMessageId::EnterChat)
            .cstring(&self.unique_name)
            .cstring(&self.stat_string)
            .cstring(&self.account_name)
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        Ok(Self {
            unique_name: r.cstring()?,
            stat_string: r.cstring_lossy(),
            account_name: r.cstring_lossy(),
        })
    }
}

/// SID_CHATEVENT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    /// Raw event id, see [`ChatEventId`]
    pub event: u32,
    pub flags: u32,
    pub ping: u32,
    pub user: String,
    pub message: String,
}

impl ChatEvent {
    pub fn kind(&self) -> Option<ChatEventId> {
        ChatEventId::from_u32(self.event)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(BnetMessageId::ChatEvent)
            .u32(self.event)
            .u32(self.flags)
            .u32(self.ping)
            // ip, account number, registration authority
            .bytes(&[0; 12])
            .cstring(&self.user)
            .cstring(&self.message)
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        let event = r.u32()?;
        let flags = r.u32()?;
        let ping = r.u32()?;
        r.skip(12)?;

        Ok(Self {
            event,
            flags,
            ping,
            user: r.cstring()?,
            message: r.cstring_lossy(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Friend {
    pub account: String,
    /// See [`crate::constants::friend_location`]
    pub location: u8,
    /// See [`crate::constants::friend_status`]
    pub status: u8,
    /// Product code, already un-reversed ("W3XP")
    pub product: String,
    pub location_name: String,
}

/// SID_FRIENDSLIST response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FriendsList {
    pub friends: Vec<Friend>,
}

impl FriendsList {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut w = writer(BnetMessageId::FriendsList).u8(self.friends.len() as u8);

        for f in &self.friends {
            w = w
                .cstring(&f.account)
                .u8(f.location)
                .u8(f.status)
                .bytes(&reversed_tag(&f.product, "product")?)
                .cstring(&f.location_name);
        }

        w.finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        let total = r.u8()?;
        let mut friends = Vec::with_capacity(total as usize);

        for _ in 0..total {
            friends.push(Friend {
                account: r.cstring()?,
                location: r.u8()?,
                status: r.u8()?,
                product: unreversed_tag(r.array()?),
                location_name: r.cstring()?,
            });
        }

        Ok(Self { friends })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClanMember {
    pub name: String,
    pub rank: u8,
    pub online: bool,
    pub location: String,
}

/// SID_CLANMEMBERLIST response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClanMemberList {
    pub cookie: u32,
    pub members: Vec<ClanMember>,
}

impl ClanMemberList {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        self.members
            .iter()
            .fold(
                writer(BnetMessageId::ClanMemberList)
                    .u32(self.cookie)
                    .u8(self.members.len() as u8),
                |w, m| {
                    w.cstring(&m.name)
                        .u8(m.rank)
                        .u8(m.online as u8)
                        .cstring(&m.location)
                },
            )
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        let cookie = r.u32()?;
        let total = r.u8()?;
        let mut members = Vec::with_capacity(total as usize);

        for _ in 0..total {
            members.push(ClanMember {
                name: r.cstring()?,
                rank: r.u8()?,
                online: r.u8()? != 0,
                location: r.cstring()?,
            });
        }

        Ok(Self { cookie, members })
    }
}

/// One hosted game from a SID_GETADVLISTEX response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameListing {
    pub game_type: u16,
    pub parameter: u16,
    pub language_id: u32,
    pub port: u16,
    pub ip: [u8; 4],
    pub status: u32,
    pub elapsed_secs: u32,
    pub name: String,
    pub password: String,
    /// Free slot count as a single ASCII hex digit
    pub slots_free: u8,
    /// Host counter as eight ASCII hex digits
    pub host_counter: String,
    /// Still stat-string encoded, follows the host counter directly
    pub stat_string: Vec<u8>,
}

/// SID_GETADVLISTEX response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameList {
    pub games: Vec<GameListing>,
}

impl GameList {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut w = writer(BnetMessageId::GetAdvListEx).u32(self.games.len() as u32);
        if self.games.is_empty() {
            // status: no games found
            return w.u32(0).finish();
        }

        for g in &self.games {
            let host_counter: Vec<u8> = latin1_bytes(&g.host_counter).collect();
            if host_counter.len() != 8 {
                return Err(ProtocolError::InvalidField {
                    field: "host_counter",
                    reason: format!("expected 8 hex digits, got {}", host_counter.len()),
                });
            }

            w = w
                .u16(g.game_type)
                .u16(g.parameter)
                .u32(g.language_id)
                .u16(2)
                .u16_be(g.port)
                .bytes(&g.ip)
                .u32(0)
                .u32(0)
                .u32(g.status)
                .u32(g.elapsed_secs)
                .cstring(&g.name)
                .cstring(&g.password)
                .u8(g.slots_free)
                .bytes(&host_counter)
                .bytes(&g.stat_string)
                .u8(0);
        }

        w.finish()
    }

    /// Entries cut short by the end of the payload are dropped
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        let found = r.u32()?;
        let mut games = Vec::new();

        for _ in 0..found {
            match Self::parse_listing(&mut r) {
                Ok(game) => games.push(game),
                Err(_) => break,
            }
        }

        Ok(Self { games })
    }

    fn parse_listing(r: &mut ByteReader<'_>) -> Result<GameListing, ProtocolError> {
        let game_type = r.u16()?;
        let parameter = r.u16()?;
        let language_id = r.u32()?;
        r.skip(2)?;
        let port = r.u16_be()?;
        let ip = r.array()?;
        r.skip(8)?;
        let status = r.u32()?;
        let elapsed_secs = r.u32()?;
        let name = r.cstring()?;
        let password = r.cstring()?;
        let slots_free = r.u8()?;
        let host_counter = latin1_string(r.bytes(8)?);
        let stat_string = r.cstring_bytes()?.to_vec();

        Ok(GameListing {
            game_type,
            parameter,
            language_id,
            port,
            ip,
            status,
            elapsed_secs,
            name,
            password,
            slots_free,
            host_counter,
            stat_string,
        })
    }
}

/// Decoded server to client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BnetMessage {
    Null,
    Ping(Ping),
    AuthInfo(AuthInfo),
    AuthCheck(AuthCheckResult),
    AccountLogon(AccountLogonResult),
    AccountLogonProof(AccountLogonProofResult),
    EnterChat(EnterChat),
    ChatEvent(ChatEvent),
    FriendsList(FriendsList),
    ClanMemberList(ClanMemberList),
    GameList(GameList),
    /// Known id with nothing for the client to act on
    Ignored(BnetMessageId),
}

impl BnetMessage {
    pub fn parse(packet: &Packet) -> Result<Self, ProtocolError> {
        if packet.header != HeaderKind::BNet {
            return Err(ProtocolError::InvalidHeader {
                expected: BNET_HEADER_CONSTANT,
                actual: packet.header.constant(),
            });
        }

        let id = BnetMessageId::from_u8(packet.id)
            .ok_or(ProtocolError::UnknownMessageId(packet.id))?;
        let p = &packet.payload;

        let message = match id {
            BnetMessageId::Null => BnetMessage::Null,
            BnetMessageId::Ping => BnetMessage::Ping(Ping::parse(p)?),
            BnetMessageId::AuthInfo => BnetMessage::AuthInfo(AuthInfo::parse(p)?),
            BnetMessageId::AuthCheck => BnetMessage::AuthCheck(AuthCheckResult::parse(p)?),
            BnetMessageId::AuthAccountLogon => {
                BnetMessage::AccountLogon(AccountLogonResult::parse(p)?)
            }
            BnetMessageId::AuthAccountLogonProof => {
                BnetMessage::AccountLogonProof(AccountLogonProofResult::parse(p)?)
            }
            BnetMessageId::EnterChat => BnetMessage::EnterChat(EnterChat::parse(p)?),
            BnetMessageId::ChatEvent => BnetMessage::ChatEvent(ChatEvent::parse(p)?),
            BnetMessageId::FriendsList => BnetMessage::FriendsList(FriendsList::parse(p)?),
            BnetMessageId::ClanMemberList => {
                BnetMessage::ClanMemberList(ClanMemberList::parse(p)?)
            }
            BnetMessageId::GetAdvListEx => BnetMessage::GameList(GameList::parse(p)?),
            BnetMessageId::JoinChannel
            | BnetMessageId::ChatCommand
            | BnetMessageId::FloodDetected
            | BnetMessageId::MessageBox
            | BnetMessageId::NetGamePort
            | BnetMessageId::RequiredWork
            | BnetMessageId::FriendsUpdate
            | BnetMessageId::FriendsAdd
            | BnetMessageId::ClanInfo
            | BnetMessageId::ClanInvitation
            | BnetMessageId::ClanMemberRemoved
            | BnetMessageId::ClanMemberStatusChange => BnetMessage::Ignored(id),
        };

        Ok(message)
    }
}

/// The single selector byte that opens a BNCS session (not a framed packet)
pub fn protocol_selector() -> [u8; 1] {
    [crate::constants::PROTOCOL_SELECTOR_BNCS]
}
