//! Game lobby engine
//!
//! Owns the slot table and the lobby members. Like the Battle.net engine it
//! does no I/O: the caller reports accepted connections, received bytes and
//! closed sockets, ticks [`Lobby::update`] and carries out the
//! [`LobbyAction`]s it queues.

mod player;

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use protocol::codec::wire_len;
use protocol::constants::{
    MAX_PLAYER_NAME_LEN, MAX_SLOTS, PLAYERLEAVE_LOBBY, PLAYERLEAVE_LOST, RACE_RANDOM,
    RACE_SELECTABLE, REJECTJOIN_FULL,
};
use protocol::w3gs::{
    GameInfo, GameSlot, GameStats, MapCheck, PingFromHost, PlayerInfo, PlayerLeaveOthers,
    RejectJoin, ReqJoin, SlotInfo, SlotInfoJoin, SlotStatus, SlotTable, W3gsMessage,
};
use protocol::ProtocolError;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::map::{GAME_TYPE_UNKNOWN0, MapDescriptor};
use player::{Player, PotentialPlayer};

/// Identifies one accepted TCP connection
pub type ConnId = u64;

/// Host counters only carry 28 bits in GAMEINFO
const HOST_COUNTER_MASK: u32 = 0x0FFF_FFFF;

/// Addresses are never revealed to other players
const HIDDEN_IP: [u8; 4] = [0; 4];

#[derive(Error, Debug)]
pub enum LobbyError {
    #[error("Failed to encode packet: {0}")]
    Encode(#[from] ProtocolError),

    #[error("Invalid map: {0}")]
    InvalidMap(String),

    #[error("No free player id")]
    NoFreePid,
}

/// Why a REQJOIN was refused; every case is answered with REJECTJOIN(FULL)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("an invalid name of length {0}")]
    InvalidName(usize),

    #[error("the virtual host name")]
    VirtualHostName,

    #[error("a name that is already taken")]
    NameTaken,

    #[error("no open slot left")]
    NoOpenSlot,
}

/// I/O the caller must perform, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobbyAction {
    Send { conn: ConnId, data: Vec<u8> },
    Close(ConnId),
    /// UDP datagram for the LAN broadcast address
    Broadcast(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct LobbySettings {
    pub game_name: String,
    pub creator_name: String,
    pub virtual_host_name: String,
    pub tft: bool,
    pub war3_version: u32,
    pub host_counter: u32,
    pub host_port: u16,
    pub case_sensitive_names: bool,
    pub refresh_interval: Duration,
}

impl LobbySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            game_name: config.game.game_name.clone(),
            creator_name: config.game.creator_name.clone(),
            virtual_host_name: config.game.virtual_host_name.clone(),
            tft: config.game.tft,
            war3_version: config.game.war3_version,
            host_counter: config.game.host_counter,
            host_port: config.general.bind_port,
            case_sensitive_names: config.game.case_sensitive_names,
            refresh_interval: Duration::from_millis(config.game.refresh_interval_ms),
        }
    }
}

pub struct Lobby {
    settings: LobbySettings,
    map: MapDescriptor,
    slots: Vec<GameSlot>,
    potentials: Vec<PotentialPlayer>,
    players: Vec<Player>,
    virtual_host_pid: Option<u8>,
    random_seed: u32,
    created_at: Instant,
    last_refresh_at: Instant,
    actions: VecDeque<LobbyAction>,
}

impl Lobby {
    pub fn new(
        settings: LobbySettings,
        map: MapDescriptor,
        now: Instant,
    ) -> Result<Self, LobbyError> {
        let slots = map
            .game_slots()
            .map_err(|e| LobbyError::InvalidMap(format!("{:#}", e)))?;

        info!(
            "[GAME: {}] hosting {} with {} slots",
            settings.game_name,
            map.path,
            slots.len()
        );

        Ok(Self {
            settings,
            map,
            slots,
            potentials: Vec::new(),
            players: Vec::new(),
            virtual_host_pid: None,
            random_seed: rand::random(),
            created_at: now,
            last_refresh_at: now,
            actions: VecDeque::new(),
        })
    }

    #[cfg(test)]
    fn slots(&self) -> &[GameSlot] {
        &self.slots
    }

    pub fn num_players(&self) -> usize {
        self.players.len()
    }

    pub fn open_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_open()).count()
    }

    #[cfg(test)]
    fn virtual_host_pid(&self) -> Option<u8> {
        self.virtual_host_pid
    }

    pub fn poll_action(&mut self) -> Option<LobbyAction> {
        self.actions.pop_front()
    }

    pub fn accept(&mut self, conn: ConnId, addr: SocketAddr) {
        debug!("[GAME: {}] new connection {} from {}", self.settings.game_name, conn, addr);
        self.potentials.push(PotentialPlayer::new(conn, addr));
    }

    pub fn on_data(&mut self, conn: ConnId, data: &[u8], now: Instant) -> Result<(), LobbyError> {
        if let Some(potential) = self.potentials.iter_mut().find(|p| p.conn == conn) {
            potential.inbound.push(data);
            return self.process_potential(conn, now);
        }

        if let Some(player) = self.players.iter_mut().find(|p| p.conn == conn) {
            player.inbound.push(data);
            return self.process_player(conn);
        }

        debug!("data for unknown connection {}", conn);
        Ok(())
    }

    /// The socket closed; whoever owned it leaves the lobby
    pub fn on_close(&mut self, conn: ConnId) -> Result<(), LobbyError> {
        if let Some(idx) = self.potentials.iter().position(|p| p.conn == conn) {
            self.potentials.remove(idx);
            debug!("potential player {} disconnected", conn);
            return Ok(());
        }

        self.remove_player(conn, PLAYERLEAVE_LOST)
    }

    /// Periodic tick: virtual host upkeep, pings and the LAN advertisement
    pub fn update(&mut self, now: Instant) -> Result<(), LobbyError> {
        if self.virtual_host_pid.is_none() && self.num_players() < MAX_SLOTS - 1 {
            self.create_virtual_host()?;
        }

        if now.saturating_duration_since(self.last_refresh_at) >= self.settings.refresh_interval {
            self.last_refresh_at = now;

            // players downloading the map drop out without regular pings
            let ping = PingFromHost {
                ticks: self.ticks(now),
            };
            self.send_all(ping.encode()?);

            let info = self.game_info(now);
            self.actions.push_back(LobbyAction::Broadcast(info.encode()?));
        }

        Ok(())
    }

    /// LAN advertisement for the current lobby state
    pub fn game_info(&self, now: Instant) -> GameInfo {
        GameInfo {
            tft: self.settings.tft,
            version: self.settings.war3_version,
            host_counter: self.settings.host_counter & HOST_COUNTER_MASK,
            entry_key: 0,
            game_name: self.settings.game_name.clone(),
            stats: GameStats {
                map_flags: self.map.game_flags(),
                map_width: self.map.width,
                map_height: self.map.height,
                map_crc: self.map.crc,
                map_path: self.map.path.clone(),
                host_name: self.settings.creator_name.clone(),
            },
            slots_total: self.slots.len() as u32,
            map_game_type: GAME_TYPE_UNKNOWN0,
            slots_open: self.open_slots() as u32,
            uptime: self.ticks(now),
            port: self.settings.host_port,
        }
    }

    fn ticks(&self, now: Instant) -> u32 {
        now.saturating_duration_since(self.created_at).as_millis() as u32
    }

    fn process_potential(&mut self, conn: ConnId, now: Instant) -> Result<(), LobbyError> {
        loop {
            let Some(potential) = self.potentials.iter_mut().find(|p| p.conn == conn) else {
                return Ok(());
            };

            let packet = match potential.inbound.next_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => return Ok(()),
                Err(e) => {
                    warn!("potential player {} sent an invalid packet ({}), closing", conn, e);
                    self.potentials.retain(|p| p.conn != conn);
                    self.actions.push_back(LobbyAction::Close(conn));
                    return Ok(());
                }
            };

            match W3gsMessage::parse(&packet) {
                Ok(W3gsMessage::ReqJoin(join)) => {
                    if self.on_req_join(conn, join, now)? {
                        // anything pipelined behind REQJOIN belongs to the player
                        return self.process_player(conn);
                    }
                    return Ok(());
                }
                Ok(other) => debug!("ignoring {:?} from potential player {}", other, conn),
                Err(e) => warn!("dropping packet {:#04x} from {}: {}", packet.id, conn, e),
            }
        }
    }

    fn process_player(&mut self, conn: ConnId) -> Result<(), LobbyError> {
        loop {
            let Some(player) = self.players.iter_mut().find(|p| p.conn == conn) else {
                return Ok(());
            };

            let packet = match player.inbound.next_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => return Ok(()),
                Err(e) => {
                    warn!("player [{}] sent an invalid packet ({}), closing", player.name, e);
                    return self.remove_player(conn, PLAYERLEAVE_LOST);
                }
            };

            match W3gsMessage::parse(&packet) {
                Ok(W3gsMessage::LeaveGame(leave)) => {
                    debug!("player {} left with reason {}", conn, leave.reason);
                    return self.remove_player(conn, PLAYERLEAVE_LOBBY);
                }
                Ok(W3gsMessage::PongToHost(pong)) => trace!("pong {} from {}", pong.ticks, conn),
                Ok(other) => debug!("ignoring {:?} from player {}", other, conn),
                Err(e) => warn!("dropping packet {:#04x} from {}: {}", packet.id, conn, e),
            }
        }
    }

    /// Admission checks in order; the slot to use on success
    fn check_admission(&self, join: &ReqJoin) -> Result<usize, Rejection> {
        let name_len = wire_len(&join.name);
        if name_len == 0 || name_len > MAX_PLAYER_NAME_LEN {
            return Err(Rejection::InvalidName(name_len));
        }

        if join.name == self.settings.virtual_host_name {
            return Err(Rejection::VirtualHostName);
        }

        let taken = self.players.iter().any(|p| {
            if self.settings.case_sensitive_names {
                p.name == join.name
            } else {
                p.name.eq_ignore_ascii_case(&join.name)
            }
        });
        if taken {
            return Err(Rejection::NameTaken);
        }

        self.slots
            .iter()
            .position(|s| s.is_open())
            .ok_or(Rejection::NoOpenSlot)
    }

    /// Returns whether the potential player became a player
    fn on_req_join(&mut self, conn: ConnId, join: ReqJoin, now: Instant) -> Result<bool, LobbyError> {
        let Some(idx) = self.potentials.iter().position(|p| p.conn == conn) else {
            return Ok(false);
        };
        let potential = self.potentials.remove(idx);

        let sid = match self.check_admission(&join) {
            Ok(sid) => sid,
            Err(rejection) => {
                info!(
                    "[GAME: {}] player [{}|{}] is trying to join the game with {}",
                    self.settings.game_name,
                    join.name,
                    potential.addr.ip(),
                    rejection
                );
                let reject = RejectJoin {
                    reason: REJECTJOIN_FULL,
                };
                self.actions.push_back(LobbyAction::Send {
                    conn,
                    data: reject.encode()?,
                });
                self.actions.push_back(LobbyAction::Close(conn));
                return Ok(false);
            }
        };

        // make room for the new player
        if self.num_players() >= MAX_SLOTS - 1 {
            self.delete_virtual_host()?;
        }

        let pid = self.new_pid().ok_or(LobbyError::NoFreePid)?;

        info!(
            "[GAME: {}] player [{}|{}] joined the game",
            self.settings.game_name,
            join.name,
            potential.addr.ip()
        );

        let player = Player::admit(potential, pid, join.name, join.internal_ip, now);
        debug!(
            "player [{}] got pid {}, reports internal address {}",
            player.name,
            pid,
            Ipv4Addr::from(player.internal_ip)
        );
        self.assign_slot(sid, pid);
        self.send_join_sequence(&player)?;
        self.players.push(player);
        self.send_all_slot_info()?;

        Ok(true)
    }

    fn assign_slot(&mut self, sid: usize, pid: u8) {
        let template = self.slots[sid];

        if self.map.is_custom_forces() {
            let mut slot = GameSlot::new(
                SlotStatus::Occupied,
                template.team,
                template.colour,
                template.race,
            );
            slot.pid = pid;
            self.slots[sid] = slot;
            return;
        }

        let race = if self.map.has_random_races() {
            RACE_RANDOM
        } else {
            RACE_RANDOM | RACE_SELECTABLE
        };
        let unassigned = MAX_SLOTS as u8;
        let mut slot = GameSlot::new(SlotStatus::Occupied, unassigned, unassigned, race);
        slot.pid = pid;
        self.slots[sid] = slot;

        let others = self
            .slots
            .iter()
            .filter(|s| s.status == SlotStatus::Occupied && s.team != unassigned)
            .count();

        if others < self.map.players as usize {
            let team = if sid < self.map.players as usize {
                sid as u8
            } else {
                0
            };
            let colour = self.new_colour();
            self.slots[sid].team = team;
            self.slots[sid].colour = colour;
        }
    }

    /// SLOTINFOJOIN, virtual host and player introductions, then MAPCHECK
    fn send_join_sequence(&mut self, player: &Player) -> Result<(), LobbyError> {
        let join = SlotInfoJoin {
            table: self.slot_table(),
            pid: player.pid,
            port: player.external_port(),
            external_ip: player.external_ip(),
        };
        self.send(player.conn, join.encode()?);

        if let Some(pid) = self.virtual_host_pid {
            let host = PlayerInfo {
                pid,
                name: self.settings.virtual_host_name.clone(),
                external_ip: HIDDEN_IP,
                internal_ip: HIDDEN_IP,
            };
            self.send(player.conn, host.encode()?);
        }

        let newcomer = introduce(player).encode()?;
        let others: Vec<(ConnId, Vec<u8>)> = self
            .players
            .iter()
            .map(|other| Ok((other.conn, introduce(other).encode()?)))
            .collect::<Result<_, ProtocolError>>()?;

        for (other_conn, other_info) in others {
            self.send(other_conn, newcomer.clone());
            self.send(player.conn, other_info);
        }

        let check = MapCheck {
            path: self.map.path.clone(),
            size: self.map.size,
            info: self.map.info,
            crc: self.map.crc,
            sha1: self.map.sha1,
        };
        self.send(player.conn, check.encode()?);

        Ok(())
    }

    fn remove_player(&mut self, conn: ConnId, reason: u32) -> Result<(), LobbyError> {
        let Some(idx) = self.players.iter().position(|p| p.conn == conn) else {
            debug!("close for unknown connection {}", conn);
            return Ok(());
        };
        let player = self.players.remove(idx);

        info!(
            "[GAME: {}] player [{}] left the game after {}s",
            self.settings.game_name,
            player.name,
            player.joined_at.elapsed().as_secs()
        );

        for slot in &mut self.slots {
            if slot.status == SlotStatus::Occupied && slot.pid == player.pid && !slot.computer {
                slot.reopen();
            }
        }

        self.actions.push_back(LobbyAction::Close(conn));

        let leave = PlayerLeaveOthers {
            pid: player.pid,
            reason,
        };
        self.send_all(leave.encode()?);
        self.send_all_slot_info()
    }

    fn create_virtual_host(&mut self) -> Result<(), LobbyError> {
        let Some(pid) = self.new_pid() else {
            return Ok(());
        };
        self.virtual_host_pid = Some(pid);

        let host = PlayerInfo {
            pid,
            name: self.settings.virtual_host_name.clone(),
            external_ip: HIDDEN_IP,
            internal_ip: HIDDEN_IP,
        };
        self.send_all(host.encode()?);
        Ok(())
    }

    fn delete_virtual_host(&mut self) -> Result<(), LobbyError> {
        let Some(pid) = self.virtual_host_pid.take() else {
            return Ok(());
        };

        let leave = PlayerLeaveOthers {
            pid,
            reason: PLAYERLEAVE_LOBBY,
        };
        self.send_all(leave.encode()?);
        Ok(())
    }

    fn new_pid(&self) -> Option<u8> {
        (1..u8::MAX).find(|&pid| {
            Some(pid) != self.virtual_host_pid && !self.players.iter().any(|p| p.pid == pid)
        })
    }

    fn new_colour(&self) -> u8 {
        (0..MAX_SLOTS as u8)
            .find(|&colour| !self.slots.iter().any(|s| s.colour == colour))
            .unwrap_or(MAX_SLOTS as u8)
    }

    fn slot_table(&self) -> SlotTable {
        SlotTable {
            slots: self.slots.clone(),
            random_seed: self.random_seed,
            layout_style: self.map.layout_style(),
            player_slots: self.map.players,
        }
    }

    fn send_all_slot_info(&mut self) -> Result<(), LobbyError> {
        let info = SlotInfo {
            table: self.slot_table(),
        };
        self.send_all(info.encode()?);
        Ok(())
    }

    fn send(&mut self, conn: ConnId, data: Vec<u8>) {
        self.actions.push_back(LobbyAction::Send { conn, data });
    }

    fn send_all(&mut self, data: Vec<u8>) {
        for player in &self.players {
            self.actions.push_back(LobbyAction::Send {
                conn: player.conn,
                data: data.clone(),
            });
        }
    }
}

fn introduce(player: &Player) -> PlayerInfo {
    PlayerInfo {
        pid: player.pid,
        name: player.name.clone(),
        external_ip: HIDDEN_IP,
        internal_ip: HIDDEN_IP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::w3gs::{LeaveGame, PongToHost};
    use protocol::{HeaderKind, PacketBuffer};

    fn settings() -> LobbySettings {
        LobbySettings {
            game_name: "hostbot lobby".to_string(),
            creator_name: "hostbot".to_string(),
            virtual_host_name: "Map".to_string(),
            tft: true,
            war3_version: 26,
            host_counter: 0x1000_0002,
            host_port: 6112,
            case_sensitive_names: false,
            refresh_interval: Duration::from_millis(5000),
        }
    }

    fn small_map(open: usize) -> MapDescriptor {
        let mut map = MapDescriptor::emerald_gardens();
        map.slots.truncate(open);
        map.players = open as u8;
        map
    }

    fn lobby(map: MapDescriptor) -> (Lobby, Instant) {
        let now = Instant::now();
        let mut lobby = Lobby::new(settings(), map, now).unwrap();
        lobby.update(now).unwrap();
        while lobby.poll_action().is_some() {}
        (lobby, now)
    }

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::from(([192, 168, 0, last], 6000 + last as u16))
    }

    fn req_join(name: &str) -> Vec<u8> {
        ReqJoin {
            host_counter: 2,
            entry_key: 0,
            listen_port: 6112,
            peer_key: 0,
            name: name.to_string(),
            internal_ip: [10, 0, 0, 5],
        }
        .encode()
        .unwrap()
    }

    fn drain(lobby: &mut Lobby) -> Vec<LobbyAction> {
        std::iter::from_fn(|| lobby.poll_action()).collect()
    }

    /// Message ids sent to `conn`, in order
    fn sent_ids(actions: &[LobbyAction], conn: ConnId) -> Vec<u8> {
        actions
            .iter()
            .filter_map(|a| match a {
                LobbyAction::Send { conn: c, data } if *c == conn => Some(data[1]),
                _ => None,
            })
            .collect()
    }

    fn join(lobby: &mut Lobby, conn: ConnId, name: &str, now: Instant) -> Vec<LobbyAction> {
        lobby.accept(conn, addr(conn as u8));
        lobby.on_data(conn, &req_join(name), now).unwrap();
        drain(lobby)
    }

    #[test]
    fn test_empty_name_rejected_with_open_slots() {
        let (mut lobby, now) = lobby(small_map(3));
        assert_eq!(lobby.open_slots(), 3);

        let actions = join(&mut lobby, 1, "", now);

        let reject = RejectJoin {
            reason: REJECTJOIN_FULL,
        }
        .encode()
        .unwrap();
        assert_eq!(
            actions,
            vec![
                LobbyAction::Send {
                    conn: 1,
                    data: reject
                },
                LobbyAction::Close(1),
            ]
        );
        assert_eq!(lobby.num_players(), 0);
        assert_eq!(lobby.open_slots(), 3);
    }

    #[test]
    fn test_long_name_rejected() {
        let (mut lobby, now) = lobby(small_map(3));
        let actions = join(&mut lobby, 1, "abcdefghijklmnop", now);
        assert_eq!(sent_ids(&actions, 1), vec![0x05]);
    }

    #[test]
    fn test_virtual_host_name_rejected() {
        let (mut lobby, now) = lobby(small_map(3));
        let actions = join(&mut lobby, 1, "Map", now);
        assert_eq!(sent_ids(&actions, 1), vec![0x05]);
    }

    #[test]
    fn test_taken_name_rejected_case_insensitive() {
        let (mut lobby, now) = lobby(small_map(3));
        join(&mut lobby, 1, "Moon", now);

        let actions = join(&mut lobby, 2, "MOON", now);
        assert_eq!(sent_ids(&actions, 2), vec![0x05]);
        assert!(actions.contains(&LobbyAction::Close(2)));
        assert_eq!(lobby.num_players(), 1);
    }

    #[test]
    fn test_case_sensitive_names() {
        let now = Instant::now();
        let mut config = settings();
        config.case_sensitive_names = true;
        let mut lobby = Lobby::new(config, small_map(3), now).unwrap();

        join(&mut lobby, 1, "Moon", now);
        join(&mut lobby, 2, "MOON", now);
        assert_eq!(lobby.num_players(), 2);
    }

    #[test]
    fn test_full_lobby_rejected() {
        let (mut lobby, now) = lobby(small_map(1));
        join(&mut lobby, 1, "Moon", now);

        let actions = join(&mut lobby, 2, "Grubby", now);
        assert_eq!(sent_ids(&actions, 2), vec![0x05]);
    }

    #[test]
    fn test_join_sequence() {
        let (mut lobby, now) = lobby(small_map(3));
        let host_pid = lobby.virtual_host_pid().unwrap();

        let actions = join(&mut lobby, 1, "Moon", now);
        // SLOTINFOJOIN, virtual host PLAYERINFO, MAPCHECK, SLOTINFO
        assert_eq!(sent_ids(&actions, 1), vec![0x04, 0x06, 0x3D, 0x09]);

        let LobbyAction::Send { data, .. } = &actions[0] else {
            panic!("expected a send");
        };
        let mut buffer = PacketBuffer::new(HeaderKind::Game);
        buffer.push(data);
        let packet = buffer.next_packet().unwrap().unwrap();
        let slot_join = SlotInfoJoin::parse(&packet.payload).unwrap();

        assert_ne!(slot_join.pid, host_pid);
        assert_eq!(slot_join.port, 6001);
        assert_eq!(slot_join.external_ip, [192, 168, 0, 1]);
        assert_eq!(slot_join.table.slots[0].status, SlotStatus::Occupied);
        assert_eq!(slot_join.table.slots[0].pid, slot_join.pid);
        assert_eq!(lobby.open_slots(), 2);
    }

    #[test]
    fn test_second_player_exchanges_player_info() {
        let (mut lobby, now) = lobby(small_map(3));
        join(&mut lobby, 1, "Moon", now);

        let actions = join(&mut lobby, 2, "Grubby", now);
        assert_eq!(sent_ids(&actions, 1), vec![0x06, 0x09]);
        assert_eq!(sent_ids(&actions, 2), vec![0x04, 0x06, 0x06, 0x3D, 0x09]);

        // other players' addresses stay hidden
        for action in &actions {
            if let LobbyAction::Send { data, .. } = action {
                if data[1] == 0x06 {
                    let info = PlayerInfo::parse(&data[4..]).unwrap();
                    assert_eq!(info.external_ip, HIDDEN_IP);
                    assert_eq!(info.internal_ip, HIDDEN_IP);
                }
            }
        }
    }

    #[test]
    fn test_melee_slot_gets_team_and_free_colour() {
        let (mut lobby, now) = lobby(small_map(3));
        join(&mut lobby, 1, "Moon", now);
        join(&mut lobby, 2, "Grubby", now);

        let slots = lobby.slots();
        assert_eq!(slots[1].team, 1);
        assert_eq!(slots[1].colour, 1);
        assert_eq!(slots[1].race, RACE_RANDOM | RACE_SELECTABLE);
    }

    #[test]
    fn test_custom_forces_keep_template() {
        let mut map = small_map(3);
        map.options |= crate::map::OPT_CUSTOM_FORCES;
        map.slots[0][4] = 1;
        map.slots[0][5] = 6;
        let (mut lobby, now) = lobby(map);

        join(&mut lobby, 1, "Moon", now);
        assert_eq!(lobby.slots()[0].team, 1);
        assert_eq!(lobby.slots()[0].colour, 6);
    }

    #[test]
    fn test_leave_game_reopens_slot() {
        let (mut lobby, now) = lobby(small_map(3));
        join(&mut lobby, 1, "Moon", now);
        join(&mut lobby, 2, "Grubby", now);
        let moon_pid = lobby.slots()[0].pid;

        let leave = LeaveGame {
            reason: PLAYERLEAVE_LOBBY,
        }
        .encode()
        .unwrap();
        lobby.on_data(1, &leave, now).unwrap();
        let actions = drain(&mut lobby);

        assert!(actions.contains(&LobbyAction::Close(1)));
        assert_eq!(sent_ids(&actions, 2), vec![0x07, 0x09]);
        let expected = PlayerLeaveOthers {
            pid: moon_pid,
            reason: PLAYERLEAVE_LOBBY,
        }
        .encode()
        .unwrap();
        assert!(actions.contains(&LobbyAction::Send {
            conn: 2,
            data: expected
        }));
        assert!(lobby.slots()[0].is_open());
        assert_eq!(lobby.num_players(), 1);
    }

    #[test]
    fn test_closed_socket_counts_as_lost() {
        let (mut lobby, now) = lobby(small_map(3));
        join(&mut lobby, 1, "Moon", now);
        join(&mut lobby, 2, "Grubby", now);

        lobby.on_close(2).unwrap();
        let actions = drain(&mut lobby);
        let LobbyAction::Send { data, .. } = &actions[1] else {
            panic!("expected a send");
        };
        let leave = PlayerLeaveOthers::parse(&data[4..]).unwrap();
        assert_eq!(leave.reason, PLAYERLEAVE_LOST);
        assert_eq!(lobby.open_slots(), 2);
    }

    #[test]
    fn test_bad_header_closes_potential() {
        let (mut lobby, now) = lobby(small_map(3));
        lobby.accept(1, addr(1));

        lobby.on_data(1, &[0xFF, 0x1E, 0x04, 0x00], now).unwrap();
        assert_eq!(drain(&mut lobby), vec![LobbyAction::Close(1)]);
    }

    #[test]
    fn test_pipelined_packets_after_join() {
        let (mut lobby, now) = lobby(small_map(3));
        lobby.accept(1, addr(1));

        let mut data = req_join("Moon");
        data.extend(PongToHost { ticks: 5 }.encode().unwrap());
        data.extend(LeaveGame { reason: 1 }.encode().unwrap());
        lobby.on_data(1, &data, now).unwrap();

        assert_eq!(lobby.num_players(), 0);
        assert!(drain(&mut lobby).contains(&LobbyAction::Close(1)));
    }

    #[test]
    fn test_refresh_broadcasts_game_info() {
        let (mut lobby, now) = lobby(small_map(3));
        join(&mut lobby, 1, "Moon", now);

        lobby.update(now + Duration::from_millis(4999)).unwrap();
        assert!(drain(&mut lobby).is_empty());

        lobby.update(now + Duration::from_millis(5000)).unwrap();
        let actions = drain(&mut lobby);
        assert_eq!(sent_ids(&actions, 1), vec![0x01]);

        let Some(LobbyAction::Broadcast(data)) = actions.last() else {
            panic!("expected a broadcast");
        };
        assert_eq!(data[0], 0xF7);
        assert_eq!(data[1], 0x30);
        let info = GameInfo::parse(&data[4..]).unwrap();
        assert_eq!(info.host_counter, 2);
        assert_eq!(info.game_name, "hostbot lobby");
        assert_eq!(info.slots_total, 3);
        assert_eq!(info.slots_open, 2);
        assert_eq!(info.uptime, 5000);
        assert_eq!(info.stats.map_width, 172);
        assert_eq!(info.stats.host_name, "hostbot");
    }

    #[test]
    fn test_virtual_host_makes_room_at_capacity() {
        let mut map = MapDescriptor::emerald_gardens();
        let race = map.slots[0][6];
        map.slots = (0..MAX_SLOTS as u8)
            .map(|i| vec![0, 255, SlotStatus::Open as u8, 0, i, i, race])
            .collect();
        map.players = MAX_SLOTS as u8;
        let (mut lobby, now) = lobby(map);
        let host_pid = lobby.virtual_host_pid().unwrap();

        for conn in 1..MAX_SLOTS as ConnId {
            join(&mut lobby, conn, &format!("player{}", conn), now);
        }
        assert_eq!(lobby.num_players(), MAX_SLOTS - 1);
        assert_eq!(lobby.virtual_host_pid(), Some(host_pid));

        // the last slot is only reachable without the virtual host
        let last = MAX_SLOTS as ConnId;
        let actions = join(&mut lobby, last, "latecomer", now);
        assert_eq!(lobby.num_players(), MAX_SLOTS);
        assert_eq!(lobby.open_slots(), 0);
        assert_eq!(lobby.virtual_host_pid(), None);

        let host_left = PlayerLeaveOthers {
            pid: host_pid,
            reason: PLAYERLEAVE_LOBBY,
        }
        .encode()
        .unwrap();
        assert!(actions.contains(&LobbyAction::Send {
            conn: 1,
            data: host_left
        }));

        // one leaver still leaves the lobby too full for the virtual host
        lobby.on_close(5).unwrap();
        lobby.update(now).unwrap();
        drain(&mut lobby);
        assert_eq!(lobby.virtual_host_pid(), None);

        lobby.on_close(6).unwrap();
        drain(&mut lobby);
        lobby.update(now).unwrap();
        let actions = drain(&mut lobby);
        assert!(lobby.virtual_host_pid().is_some());
        assert_eq!(sent_ids(&actions, 1), vec![0x06]);
    }

    #[test]
    fn test_virtual_host_created_once() {
        let (mut lobby, now) = lobby(small_map(3));
        let pid = lobby.virtual_host_pid();
        assert_eq!(pid, Some(1));

        lobby.update(now).unwrap();
        assert_eq!(lobby.virtual_host_pid(), pid);
    }
}
