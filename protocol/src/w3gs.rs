//! W3GS lobby message codecs
//!
//! Only the join phase is covered: lobby advertisement, join negotiation,
//! slot tables and the leave/ping housekeeping around them.

use crate::W3GS_HEADER_CONSTANT;
use crate::codec::{ByteReader, PacketWriter, latin1_bytes};
use crate::constants::{PRODUCT_ROC, PRODUCT_TFT};
use crate::error::ProtocolError;
use crate::framing::{HeaderKind, Packet};
use crate::statstring;

/// W3GS message ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum W3gsMessageId {
    PingFromHost = 0x01,
    SlotInfoJoin = 0x04,
    RejectJoin = 0x05,
    PlayerInfo = 0x06,
    PlayerLeaveOthers = 0x07,
    SlotInfo = 0x09,
    ReqJoin = 0x1E,
    LeaveGame = 0x21,
    OutgoingKeepalive = 0x27,
    ChatToHost = 0x28,
    SearchGame = 0x2F,
    GameInfo = 0x30,
    MapCheck = 0x3D,
    MapSize = 0x42,
    PongToHost = 0x46,
}

impl W3gsMessageId {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::PingFromHost),
            0x04 => Some(Self::SlotInfoJoin),
            0x05 => Some(Self::RejectJoin),
            0x06 => Some(Self::PlayerInfo),
            0x07 => Some(Self::PlayerLeaveOthers),
            0x09 => Some(Self::SlotInfo),
            0x1E => Some(Self::ReqJoin),
            0x21 => Some(Self::LeaveGame),
            0x27 => Some(Self::OutgoingKeepalive),
            0x28 => Some(Self::ChatToHost),
            0x2F => Some(Self::SearchGame),
            0x30 => Some(Self::GameInfo),
            0x3D => Some(Self::MapCheck),
            0x42 => Some(Self::MapSize),
            0x46 => Some(Self::PongToHost),
            _ => None,
        }
    }
}

fn writer(id: W3gsMessageId) -> PacketWriter {
    PacketWriter::new(W3GS_HEADER_CONSTANT, id as u8)
}

/// AF_INET sockaddr as embedded in W3GS packets: family, big-endian port,
/// address and eight bytes of padding
fn write_sockaddr(w: PacketWriter, port: u16, ip: [u8; 4]) -> PacketWriter {
    w.u16(2).u16_be(port).bytes(&ip).u32(0).u32(0)
}

fn read_sockaddr(r: &mut ByteReader<'_>) -> Result<(u16, [u8; 4]), ProtocolError> {
    r.skip(2)?;
    let port = r.u16_be()?;
    let ip = r.array()?;
    r.skip(8)?;
    Ok((port, ip))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotStatus {
    Open = 0,
    Closed = 1,
    Occupied = 2,
}

impl SlotStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Open),
            1 => Some(Self::Closed),
            2 => Some(Self::Occupied),
            _ => None,
        }
    }
}

/// One entry of the lobby slot table (9 bytes on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSlot {
    /// Player id, 0 when nobody sits here
    pub pid: u8,
    /// Map download progress, 255 when unknown and 100 when complete
    pub download_status: u8,
    pub status: SlotStatus,
    pub computer: bool,
    pub team: u8,
    pub colour: u8,
    pub race: u8,
    pub computer_type: u8,
    pub handicap: u8,
}

impl GameSlot {
    pub const SIZE: usize = 9;

    pub fn new(status: SlotStatus, team: u8, colour: u8, race: u8) -> Self {
        Self {
            pid: 0,
            download_status: 255,
            status,
            computer: false,
            team,
            colour,
            race,
            computer_type: 1,
            handicap: 100,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == SlotStatus::Open
    }

    /// Return the slot to its unoccupied state, keeping team/colour/race
    pub fn reopen(&mut self) {
        self.pid = 0;
        self.download_status = 255;
        self.status = SlotStatus::Open;
        self.computer = false;
    }

    fn write(&self, w: PacketWriter) -> PacketWriter {
        w.u8(self.pid)
            .u8(self.download_status)
            .u8(self.status as u8)
            .u8(self.computer as u8)
            .u8(self.team)
            .u8(self.colour)
            .u8(self.race)
            .u8(self.computer_type)
            .u8(self.handicap)
    }

    fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let pid = r.u8()?;
        let download_status = r.u8()?;
        let raw_status = r.u8()?;
        let status = SlotStatus::from_u8(raw_status).ok_or(ProtocolError::InvalidField {
            field: "slot_status",
            reason: format!("unknown status {}", raw_status),
        })?;

        Ok(Self {
            pid,
            download_status,
            status,
            computer: r.u8()? != 0,
            team: r.u8()?,
            colour: r.u8()?,
            race: r.u8()?,
            computer_type: r.u8()?,
            handicap: r.u8()?,
        })
    }
}

/// Slot table block shared by SLOTINFOJOIN and SLOTINFO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTable {
    pub slots: Vec<GameSlot>,
    pub random_seed: u32,
    pub layout_style: u8,
    pub player_slots: u8,
}

impl SlotTable {
    pub fn encoded_len(&self) -> usize {
        1 + self.slots.len() * GameSlot::SIZE + 4 + 1 + 1
    }

    fn write(&self, w: PacketWriter) -> PacketWriter {
        self.slots
            .iter()
            .fold(w.u8(self.slots.len() as u8), |w, slot| slot.write(w))
            .u32(self.random_seed)
            .u8(self.layout_style)
            .u8(self.player_slots)
    }

    fn read(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let count = r.u8()?;
        let slots = (0..count)
            .map(|_| GameSlot::read(r))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            slots,
            random_seed: r.u32()?,
            layout_style: r.u8()?,
            player_slots: r.u8()?,
        })
    }

    /// Read a table prefixed by its u16 byte length
    fn read_prefixed(r: &mut ByteReader<'_>) -> Result<Self, ProtocolError> {
        let len = r.u16()? as usize;
        let block = r.bytes(len)?;
        let mut inner = ByteReader::new(block);
        let table = Self::read(&mut inner)?;
        if !inner.is_empty() {
            return Err(ProtocolError::InvalidField {
                field: "slot_info_length",
                reason: format!("{} trailing bytes", inner.remaining().len()),
            });
        }
        Ok(table)
    }
}

/// W3GS_REQJOIN from a joining player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReqJoin {
    pub host_counter: u32,
    pub entry_key: u32,
    pub listen_port: u16,
    pub peer_key: u32,
    pub name: String,
    pub internal_ip: [u8; 4],
}

impl ReqJoin {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(W3gsMessageId::ReqJoin)
            .u32(self.host_counter)
            .u32(self.entry_key)
            .u8(0)
            .u16(self.listen_port)
            .u32(self.peer_key)
            .cstring(&self.name)
            .u32(0)
            .u16(2)
            .bytes(&self.internal_ip)
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        let host_counter = r.u32()?;
        let entry_key = r.u32()?;
        r.skip(1)?;
        let listen_port = r.u16()?;
        let peer_key = r.u32()?;
        let name = r.cstring()?;
        // unknown u32 and the internal port
        r.skip(6)?;
        let internal_ip = r.array()?;

        Ok(Self {
            host_counter,
            entry_key,
            listen_port,
            peer_key,
            name,
            internal_ip,
        })
    }
}

/// W3GS_REJECTJOIN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectJoin {
    pub reason: u32,
}

impl RejectJoin {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(W3gsMessageId::RejectJoin).u32(self.reason).finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        Ok(Self { reason: r.u32()? })
    }
}

/// W3GS_SLOTINFOJOIN: admission confirmation sent to the new player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfoJoin {
    pub table: SlotTable,
    pub pid: u8,
    pub port: u16,
    pub external_ip: [u8; 4],
}

impl SlotInfoJoin {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let w = writer(W3gsMessageId::SlotInfoJoin).u16(self.table.encoded_len() as u16);
        let w = self.table.write(w).u8(self.pid);
        write_sockaddr(w, self.port, self.external_ip).finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        let table = SlotTable::read_prefixed(&mut r)?;
        let pid = r.u8()?;
        let (port, external_ip) = read_sockaddr(&mut r)?;

        Ok(Self {
            table,
            pid,
            port,
            external_ip,
        })
    }
}

/// W3GS_SLOTINFO: slot table refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub table: SlotTable,
}

impl SlotInfo {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let w = writer(W3gsMessageId::SlotInfo).u16(self.table.encoded_len() as u16);
        self.table.write(w).finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        Ok(Self {
            table: SlotTable::read_prefixed(&mut r)?,
        })
    }
}

/// W3GS_PLAYERINFO: introduces one lobby member to another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub pid: u8,
    pub name: String,
    pub external_ip: [u8; 4],
    pub internal_ip: [u8; 4],
}

impl PlayerInfo {
    const JOIN_COUNTER: u32 = 2;

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let w = writer(W3gsMessageId::PlayerInfo)
            .u32(Self::JOIN_COUNTER)
            .u8(self.pid)
            .cstring(&self.name)
            .u8(1)
            .u8(0);
        let w = write_sockaddr(w, 0, self.external_ip);
        write_sockaddr(w, 0, self.internal_ip).finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        r.skip(4)?;
        let pid = r.u8()?;
        let name = r.cstring()?;
        r.skip(2)?;
        let (_, external_ip) = read_sockaddr(&mut r)?;
        let (_, internal_ip) = read_sockaddr(&mut r)?;

        Ok(Self {
            pid,
            name,
            external_ip,
            internal_ip,
        })
    }
}

/// W3GS_PLAYERLEAVE_OTHERS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerLeaveOthers {
    pub pid: u8,
    pub reason: u32,
}

impl PlayerLeaveOthers {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(W3gsMessageId::PlayerLeaveOthers)
            .u8(self.pid)
            .u32(self.reason)
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        Ok(Self {
            pid: r.u8()?,
            reason: r.u32()?,
        })
    }
}

/// W3GS_PING_FROM_HOST, answered by W3GS_PONG_TO_HOST with the same value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingFromHost {
    pub ticks: u32,
}

impl PingFromHost {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(W3gsMessageId::PingFromHost).u32(self.ticks).finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        Ok(Self { ticks: r.u32()? })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PongToHost {
    pub ticks: u32,
}

impl PongToHost {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(W3gsMessageId::PongToHost).u32(self.ticks).finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        Ok(Self { ticks: r.u32()? })
    }
}

/// W3GS_LEAVEGAME sent by a player leaving on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveGame {
    pub reason: u32,
}

impl LeaveGame {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(W3gsMessageId::LeaveGame).u32(self.reason).finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        Ok(Self { reason: r.u32()? })
    }
}

/// W3GS_MAPCHECK: map identity the client compares against its local copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapCheck {
    pub path: String,
    pub size: [u8; 4],
    pub info: [u8; 4],
    pub crc: [u8; 4],
    pub sha1: [u8; 20],
}

impl MapCheck {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        writer(W3gsMessageId::MapCheck)
            .u32(1)
            .cstring(&self.path)
            .bytes(&self.size)
            .bytes(&self.info)
            .bytes(&self.crc)
            .bytes(&self.sha1)
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        r.skip(4)?;
        Ok(Self {
            path: r.cstring()?,
            size: r.array()?,
            info: r.array()?,
            crc: r.array()?,
            sha1: r.array()?,
        })
    }
}

/// Lobby metadata carried stat-string encoded inside GAMEINFO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStats {
    pub map_flags: u32,
    pub map_width: u16,
    pub map_height: u16,
    pub map_crc: [u8; 4],
    pub map_path: String,
    pub host_name: String,
}

impl GameStats {
    /// Raw (not yet stat-string encoded) layout
    pub fn to_raw(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(16 + self.map_path.len() + self.host_name.len());
        raw.extend_from_slice(&self.map_flags.to_le_bytes());
        raw.push(0);
        raw.extend_from_slice(&self.map_width.to_le_bytes());
        raw.extend_from_slice(&self.map_height.to_le_bytes());
        raw.extend_from_slice(&self.map_crc);
        raw.extend(latin1_bytes(&self.map_path));
        raw.push(0);
        raw.extend(latin1_bytes(&self.host_name));
        raw.push(0);
        raw.push(0);
        raw
    }

    pub fn from_raw(raw: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(raw);
        let map_flags = r.u32()?;
        r.skip(1)?;

        Ok(Self {
            map_flags,
            map_width: r.u16()?,
            map_height: r.u16()?,
            map_crc: r.array()?,
            map_path: r.cstring()?,
            host_name: r.cstring()?,
        })
    }
}

/// W3GS_GAMEINFO lobby advertisement (UDP)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameInfo {
    pub tft: bool,
    pub version: u32,
    pub host_counter: u32,
    pub entry_key: u32,
    pub game_name: String,
    pub stats: GameStats,
    pub slots_total: u32,
    pub map_game_type: u32,
    pub slots_open: u32,
    /// Milliseconds since the lobby was created
    pub uptime: u32,
    pub port: u16,
}

impl GameInfo {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let product = if self.tft { PRODUCT_TFT } else { PRODUCT_ROC };
        let stat_string = statstring::encode(&self.stats.to_raw());

        writer(W3gsMessageId::GameInfo)
            .bytes(&product)
            .u32(self.version)
            .u32(self.host_counter)
            .u32(self.entry_key)
            .cstring(&self.game_name)
            // password
            .u8(0)
            .bytes(&stat_string)
            .u8(0)
            .u32(self.slots_total)
            .u32(self.map_game_type)
            .u32(1)
            .u32(self.slots_open)
            .u32(self.uptime)
            .u16(self.port)
            .finish()
    }

    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = ByteReader::new(payload);
        let tft = r.array::<4>()? == PRODUCT_TFT;
        let version = r.u32()?;
        let host_counter = r.u32()?;
        let entry_key = r.u32()?;
        let game_name = r.cstring()?;
        r.skip(1)?;
        let stats = GameStats::from_raw(&statstring::decode(r.cstring_bytes()?))?;
        let slots_total = r.u32()?;
        let map_game_type = r.u32()?;
        r.skip(4)?;

        Ok(Self {
            tft,
            version,
            host_counter,
            entry_key,
            game_name,
            stats,
            slots_total,
            map_game_type,
            slots_open: r.u32()?,
            uptime: r.u32()?,
            port: r.u16()?,
        })
    }
}

/// Decoded W3GS message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum W3gsMessage {
    PingFromHost(PingFromHost),
    SlotInfoJoin(SlotInfoJoin),
    RejectJoin(RejectJoin),
    PlayerInfo(PlayerInfo),
    PlayerLeaveOthers(PlayerLeaveOthers),
    SlotInfo(SlotInfo),
    ReqJoin(ReqJoin),
    LeaveGame(LeaveGame),
    GameInfo(GameInfo),
    MapCheck(MapCheck),
    PongToHost(PongToHost),
    /// Known id the lobby does not act on
    Ignored(W3gsMessageId),
}

impl W3gsMessage {
    pub fn parse(packet: &Packet) -> Result<Self, ProtocolError> {
        if packet.header != HeaderKind::Game {
            return Err(ProtocolError::InvalidHeader {
                expected: W3GS_HEADER_CONSTANT,
                actual: packet.header.constant(),
            });
        }

        let id = W3gsMessageId::from_u8(packet.id)
            .ok_or(ProtocolError::UnknownMessageId(packet.id))?;
        let p = &packet.payload;

        let message = match id {
            W3gsMessageId::PingFromHost => W3gsMessage::PingFromHost(PingFromHost::parse(p)?),
            W3gsMessageId::SlotInfoJoin => W3gsMessage::SlotInfoJoin(SlotInfoJoin::parse(p)?),
            W3gsMessageId::RejectJoin => W3gsMessage::RejectJoin(RejectJoin::parse(p)?),
            W3gsMessageId::PlayerInfo => W3gsMessage::PlayerInfo(PlayerInfo::parse(p)?),
            W3gsMessageId::PlayerLeaveOthers => {
                W3gsMessage::PlayerLeaveOthers(PlayerLeaveOthers::parse(p)?)
            }
            W3gsMessageId::SlotInfo => W3gsMessage::SlotInfo(SlotInfo::parse(p)?),
            W3gsMessageId::ReqJoin => W3gsMessage::ReqJoin(ReqJoin::parse(p)?),
            W3gsMessageId::LeaveGame => W3gsMessage::LeaveGame(LeaveGame::parse(p)?),
            W3gsMessageId::GameInfo => W3gsMessage::GameInfo(GameInfo::parse(p)?),
            W3gsMessageId::MapCheck => W3gsMessage::MapCheck(MapCheck::parse(p)?),
            W3gsMessageId::PongToHost => W3gsMessage::PongToHost(PongToHost::parse(p)?),
            W3gsMessageId::OutgoingKeepalive
            | W3gsMessageId::ChatToHost
            | W3gsMessageId::SearchGame
            | W3gsMessageId::MapSize => W3gsMessage::Ignored(id),
        };

        Ok(message)
    }
}
