//! Battle.net session state machine

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use protocol::bnet::{
    AccountLogonProofRequest, AccountLogonProofResult, AccountLogonRequest, AccountLogonResult,
    AuthCheckRequest, AuthCheckResult, AuthInfo, AuthInfoRequest, BnetMessage, ChatCommand,
    ChatEvent, ClanMemberListRequest, EnterChat, EnterChatRequest, FriendsListRequest,
    GetAdvListEx, JoinChannel, NetGamePort, Null, protocol_selector,
};
use protocol::codec::{hex_dump, truncate_wire};
use protocol::constants::{
    AccountLogonStatus, AuthCheckStatus, CD_KEY_LENGTH, ChatEventId, LogonProofStatus,
    MAX_CHAT_COMMAND_LEN,
};
use protocol::crypto::{CdKeyInfo, CryptoProvider, NLS_KEY_SIZE, NlsHandle};
use protocol::{HeaderKind, PacketBuffer, ProtocolError};
use tracing::{debug, error, info, trace, warn};

use super::events::{BnetEvent, DisconnectReason};
use super::pacing::PacingQueue;
use super::{BnetError, Phase};
use crate::config::{BnetConfig, PasswordHashType};

/// Interval between SID_NULL keepalives
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

pub struct BnetConnection {
    config: BnetConfig,
    crypto: Box<dyn CryptoProvider + Send>,
    phase: Phase,
    connected: bool,
    connecting: bool,
    logged_in: bool,
    in_chat: bool,
    /// Generated once per engine, reused across reconnects
    client_token: u32,
    server_token: u32,
    nls: Option<NlsHandle>,
    unique_name: String,
    inbound: PacketBuffer,
    outgoing: Vec<u8>,
    queue: PacingQueue,
    events: VecDeque<BnetEvent>,
    last_null_at: Instant,
}

impl BnetConnection {
    pub fn new(config: BnetConfig, crypto: Box<dyn CryptoProvider + Send>, now: Instant) -> Self {
        Self {
            config,
            crypto,
            phase: Phase::Disconnected,
            connected: false,
            connecting: false,
            logged_in: false,
            in_chat: false,
            client_token: rand::random(),
            server_token: 0,
            nls: None,
            unique_name: String::new(),
            inbound: PacketBuffer::new(HeaderKind::BNet),
            outgoing: Vec::new(),
            queue: PacingQueue::new(now),
            events: VecDeque::new(),
            last_null_at: now,
        }
    }

    #[cfg(test)]
    fn phase(&self) -> Phase {
        self.phase
    }

    #[cfg(test)]
    fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn in_chat(&self) -> bool {
        self.in_chat
    }

    #[cfg(test)]
    fn unique_name(&self) -> &str {
        &self.unique_name
    }

    pub fn alias(&self) -> &str {
        &self.config.alias
    }

    pub fn queued_packets(&self) -> usize {
        self.queue.len()
    }

    /// Start a connection attempt; the caller opens the socket
    pub fn connect(&mut self) {
        if self.phase != Phase::Disconnected {
            warn!("[{}] connect requested while {:?}", self.config.alias, self.phase);
            return;
        }

        info!(
            "[{}] connecting to server [{}] on port {}",
            self.config.alias, self.config.server, self.config.port
        );
        self.phase = Phase::Connecting;
        self.connecting = true;
    }

    /// The socket is up: open the session with the selector and SID_AUTH_INFO
    pub fn on_connected(&mut self, now: Instant, local_ip: [u8; 4]) -> Result<(), BnetError> {
        info!("[{}] connected", self.config.alias);

        self.connected = true;
        self.connecting = false;
        self.inbound.clear();
        self.queue.reset(now);
        self.last_null_at = now;

        let request = AuthInfoRequest {
            tft: self.config.tft,
            version: self.config.war3_version,
            language: self.config.language.clone(),
            local_ip,
            timezone_bias: self.config.timezone_bias.unwrap_or(0),
            locale_id: self.config.locale_id,
            country_abbrev: self.config.country_abbrev.clone(),
            country: self.config.country.clone(),
        };

        self.outgoing.extend_from_slice(&protocol_selector());
        self.send(request.encode()?);
        self.phase = Phase::AwaitingAuthInfo;
        Ok(())
    }

    /// Feed bytes read from the socket
    ///
    /// An `Err` is process-fatal. Session-level failures disconnect and
    /// surface as [`BnetEvent::Disconnected`] instead.
    pub fn on_data(&mut self, data: &[u8]) -> Result<(), BnetError> {
        if !self.connected {
            return Ok(());
        }

        trace!("[{}] received {}", self.config.alias, hex_dump(data));
        self.inbound.push(data);

        loop {
            let packet = match self.inbound.next_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => return Ok(()),
                Err(e) => {
                    error!(
                        "[{}] received invalid packet from battle.net ({}), disconnecting",
                        self.config.alias, e
                    );
                    self.disconnect(DisconnectReason::InvalidPacket(e));
                    return Ok(());
                }
            };

            let message = match BnetMessage::parse(&packet) {
                Ok(message) => message,
                Err(ProtocolError::UnknownMessageId(id)) => {
                    warn!("[{}] no handler for packet {:#04x}", self.config.alias, id);
                    continue;
                }
                Err(e) => {
                    warn!(
                        "[{}] dropping malformed packet {:#04x}: {}",
                        self.config.alias, packet.id, e
                    );
                    continue;
                }
            };

            if let Err(e) = self.handle(message) {
                error!("[{}] {}, disconnecting", self.config.alias, e);
                self.disconnect(e.disconnect_reason());
                return Err(e);
            }

            // a handler may have ended the session
            if !self.connected {
                return Ok(());
            }
        }
    }

    /// The socket closed or failed
    pub fn on_closed(&mut self) {
        if self.connected || self.connecting {
            info!("[{}] connection closed", self.config.alias);
            self.disconnect(DisconnectReason::ConnectionClosed);
        }
    }

    /// Periodic tick: release paced packets and send keepalives
    pub fn update(&mut self, now: Instant) -> Result<(), BnetError> {
        if !self.connected {
            return Ok(());
        }

        if let Some(packet) = self.queue.poll(now) {
            self.send(packet);
        }

        if now.saturating_duration_since(self.last_null_at) >= KEEPALIVE_INTERVAL {
            let null = match Null.encode() {
                Ok(null) => null,
                Err(e) => {
                    let e = BnetError::from(e);
                    self.disconnect(e.disconnect_reason());
                    return Err(e);
                }
            };
            self.send(null);
            self.last_null_at = now;
        }

        Ok(())
    }

    /// End the session. All state flags drop before the event is queued.
    pub fn disconnect(&mut self, reason: DisconnectReason) {
        self.connected = false;
        self.connecting = false;
        self.logged_in = false;
        self.in_chat = false;
        self.phase = Phase::Disconnected;
        self.nls = None;
        self.inbound.clear();
        self.queue.clear();
        self.outgoing.clear();

        info!("[{}] disconnected: {:?}", self.config.alias, reason);
        self.events.push_back(BnetEvent::Disconnected(reason));
    }

    /// Bytes the caller must write to the socket, in order
    pub fn take_outgoing(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn poll_event(&mut self) -> Option<BnetEvent> {
        self.events.pop_front()
    }

    /// Queue a chat line or slash command behind the pacing policy
    ///
    /// Returns `false` when the command was not queued.
    pub fn queue_chat_command(&mut self, command: &str) -> bool {
        if command.is_empty() || !self.logged_in {
            return false;
        }

        let mut command = command;
        if self.config.password_hash_type == PasswordHashType::Pvpgn {
            command = truncate_wire(command, self.config.max_message_length);
        }
        let command = truncate_wire(command, MAX_CHAT_COMMAND_LEN);

        let packet = match (ChatCommand {
            text: command.to_string(),
        })
        .encode()
        {
            Ok(packet) => packet,
            Err(e) => {
                warn!("[{}] cannot encode chat command: {}", self.config.alias, e);
                return false;
            }
        };

        let what = format!("chat command [{}]", command);
        if !self.queue.try_push(packet, &what) {
            return false;
        }

        self.events
            .push_back(BnetEvent::CommandQueued(command.to_string()));
        true
    }

    pub fn queue_whisper(&mut self, user: &str, message: &str) -> bool {
        self.queue_chat_command(&format!("/w {} {}", user, message))
    }

    /// Ask for open games, or for one game when `game_name` is set
    pub fn queue_get_game_list(&mut self, game_name: &str) -> bool {
        if !self.logged_in {
            return false;
        }

        match GetAdvListEx::new(game_name).encode() {
            Ok(packet) => self.queue.try_push(packet, "games list"),
            Err(e) => {
                warn!("[{}] cannot encode game list query: {}", self.config.alias, e);
                false
            }
        }
    }

    /// Switch channels immediately (not paced)
    pub fn join_channel(&mut self, channel: &str) -> Result<(), BnetError> {
        if self.logged_in && self.in_chat {
            self.send(JoinChannel::new(channel).encode()?);
        }
        Ok(())
    }

    fn send(&mut self, packet: Vec<u8>) {
        trace!("[{}] sending {}", self.config.alias, hex_dump(&packet));
        self.outgoing.extend_from_slice(&packet);
    }

    fn handle(&mut self, message: BnetMessage) -> Result<(), BnetError> {
        match message {
            BnetMessage::Null => debug!("[{}] SID_NULL", self.config.alias),
            BnetMessage::Ping(ping) => self.send(ping.encode()?),
            BnetMessage::AuthInfo(info) => self.on_auth_info(info)?,
            BnetMessage::AuthCheck(result) => self.on_auth_check(result)?,
            BnetMessage::AccountLogon(result) => self.on_account_logon(result)?,
            BnetMessage::AccountLogonProof(result) => self.on_logon_proof(result)?,
            BnetMessage::EnterChat(enter) => self.on_enter_chat(enter)?,
            BnetMessage::ChatEvent(event) => self.on_chat_event(event),
            BnetMessage::FriendsList(list) => {
                self.events.push_back(BnetEvent::FriendsList(list.friends))
            }
            BnetMessage::ClanMemberList(list) => {
                self.events.push_back(BnetEvent::ClanMembers(list.members))
            }
            BnetMessage::GameList(list) => self.events.push_back(BnetEvent::GameList(list.games)),
            BnetMessage::Ignored(id) => debug!("[{}] ignoring {:?}", self.config.alias, id),
        }
        Ok(())
    }

    fn expect_phase(&self, phase: Phase, what: &str) -> bool {
        if self.phase != phase {
            warn!(
                "[{}] unexpected {} while {:?}, ignoring",
                self.config.alias, what, self.phase
            );
            return false;
        }
        true
    }

    fn on_auth_info(&mut self, info: AuthInfo) -> Result<(), BnetError> {
        if !self.expect_phase(Phase::AwaitingAuthInfo, "SID_AUTH_INFO") {
            return Ok(());
        }

        debug!(
            "[{}] logon type {}, version archive {}",
            self.config.alias, info.logon_type, info.version_archive
        );
        self.server_token = info.server_token;

        let (exe_version, exe_hash, exe_info) = match &self.config.exe_override {
            Some(exe) => {
                info!("[{}] using custom exe version data", self.config.alias);
                (exe.version, u32::from_le_bytes(exe.hash), exe.info.clone())
            }
            None => {
                let exe = self.crypto.exe_info(&info.formula, &info.version_archive)?;
                (exe.version, exe.hash, exe.info)
            }
        };

        let mut keys = vec![self.key_info(&self.config.cd_key_roc)?];
        if self.config.tft {
            keys.push(self.key_info(&self.config.cd_key_tft)?);
        }

        let request = AuthCheckRequest {
            client_token: self.client_token,
            exe_version,
            exe_hash,
            keys,
            exe_info,
            key_owner: self.config.username.clone(),
        };

        self.send(request.encode()?);
        self.phase = Phase::AwaitingAuthCheck;
        Ok(())
    }

    fn key_info(&self, key: &str) -> Result<CdKeyInfo, BnetError> {
        let mut info = self
            .crypto
            .cd_key_info(key, self.client_token, self.server_token)?;
        if info.key_length == 0 {
            info.key_length = CD_KEY_LENGTH;
        }
        Ok(info)
    }

    fn on_auth_check(&mut self, result: AuthCheckResult) -> Result<(), BnetError> {
        if !self.expect_phase(Phase::AwaitingAuthCheck, "SID_AUTH_CHECK") {
            return Ok(());
        }

        let status = AuthCheckStatus::from_u32(result.status);
        if status != AuthCheckStatus::Passed {
            error!(
                "[{}] logon failed - {} ({:#x}) [{}], disconnecting",
                self.config.alias,
                status.describe(),
                result.status,
                result.description
            );
            self.disconnect(DisconnectReason::AuthCheckRejected {
                status,
                description: result.description,
            });
            return Ok(());
        }

        info!("[{}] cd keys accepted", self.config.alias);

        let public_key = self.create_nls_keypair()?;

        let request = AccountLogonRequest {
            public_key,
            username: self.config.username.clone(),
        };
        self.send(request.encode()?);
        self.phase = Phase::AwaitingAccountLogon;
        Ok(())
    }

    /// Create the NLS key pair, retrying once on a short public key
    fn create_nls_keypair(&mut self) -> Result<[u8; NLS_KEY_SIZE], BnetError> {
        let mut last_len = 0;

        for attempt in 0..2 {
            let pair = self
                .crypto
                .nls_create_keypair(&self.config.username, &self.config.password)?;

            if let Ok(key) = <[u8; NLS_KEY_SIZE]>::try_from(pair.public_key.as_slice()) {
                self.nls = Some(pair.handle);
                return Ok(key);
            }

            last_len = pair.public_key.len();
            warn!(
                "[{}] NLS public key has {} bytes (attempt {}), expected {}",
                self.config.alias,
                last_len,
                attempt + 1,
                NLS_KEY_SIZE
            );
        }

        Err(BnetError::NlsKeySize { actual: last_len })
    }

    fn on_account_logon(&mut self, result: AccountLogonResult) -> Result<(), BnetError> {
        if !self.expect_phase(Phase::AwaitingAccountLogon, "SID_AUTH_ACCOUNTLOGON") {
            return Ok(());
        }

        let status = AccountLogonStatus::from_u32(result.status);
        if status != AccountLogonStatus::Accepted {
            error!(
                "[{}] logon failed - {} ({}), disconnecting",
                self.config.alias,
                status.describe(),
                result.status
            );
            self.disconnect(DisconnectReason::LogonRejected(status));
            return Ok(());
        }

        info!("[{}] username accepted", self.config.alias);

        let proof = match self.config.password_hash_type {
            PasswordHashType::Pvpgn => {
                info!("[{}] using pvpgn logon type", self.config.alias);
                self.crypto.hash_password_single(&self.config.password)?
            }
            PasswordHashType::Battlenet => {
                info!("[{}] using battle.net logon type", self.config.alias);
                let handle = self.nls.ok_or(BnetError::NlsKeySize { actual: 0 })?;
                self.crypto
                    .nls_proof(handle, &result.server_key, &result.salt)?
            }
        };

        self.send(AccountLogonProofRequest { proof }.encode()?);
        self.phase = Phase::AwaitingProof;
        Ok(())
    }

    fn on_logon_proof(&mut self, result: AccountLogonProofResult) -> Result<(), BnetError> {
        if !self.expect_phase(Phase::AwaitingProof, "SID_AUTH_ACCOUNTLOGONPROOF") {
            return Ok(());
        }

        let status = LogonProofStatus::from_u32(result.status);
        if status != LogonProofStatus::Accepted {
            error!(
                "[{}] logon failed - {} ({:#x}): {}",
                self.config.alias,
                status.describe(),
                result.status,
                result.message
            );
            self.disconnect(DisconnectReason::ProofRejected {
                status,
                message: result.message,
            });
            return Ok(());
        }

        info!("[{}] logon successful", self.config.alias);
        self.logged_in = true;
        self.events.push_back(BnetEvent::LoggedIn);

        self.send(
            NetGamePort {
                port: self.config.host_port,
            }
            .encode()?,
        );
        self.send(EnterChatRequest.encode()?);
        self.send(FriendsListRequest.encode()?);
        self.send(ClanMemberListRequest { cookie: 0 }.encode()?);
        self.phase = Phase::InChat;
        Ok(())
    }

    fn on_enter_chat(&mut self, enter: EnterChat) -> Result<(), BnetError> {
        if enter.unique_name.starts_with('#') {
            warn!(
                "[{}] account already logged in, entered chat as {}",
                self.config.alias, enter.unique_name
            );
        }

        info!("[{}] joining channel [{}]", self.config.alias, self.config.first_channel);
        self.unique_name = enter.unique_name.clone();
        self.in_chat = true;
        self.events.push_back(BnetEvent::EnteredChat {
            unique_name: enter.unique_name,
        });

        let channel = self.config.first_channel.clone();
        self.join_channel(&channel)
    }

    fn on_chat_event(&mut self, event: ChatEvent) {
        let kind = event.kind();
        if kind.is_none() {
            debug!("[{}] unknown chat event {:#x}", self.config.alias, event.event);
        }

        let asks_trigger = event.message == "?trigger";
        let whisperer = event.user.clone();
        self.events.push_back(BnetEvent::Chat(event));

        if !asks_trigger {
            return;
        }
        let reply = format!("Command trigger is {}", self.config.command_trigger);
        match kind {
            Some(ChatEventId::Talk) => {
                self.queue_chat_command(&reply);
            }
            Some(ChatEventId::Whisper) => {
                self.queue_whisper(&whisperer, &reply);
            }
            _ => {}
        }
    }

    #[cfg(test)]
    fn client_token(&self) -> u32 {
        self.client_token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ExeOverride};
    use crate::crypto::UnavailableCrypto;
    use protocol::bnet::{Friend, FriendsList, Ping};
    use protocol::crypto::{CryptoError, ExeInfo, NlsKeyPair, PROOF_SIZE};
    use protocol::Packet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic provider; `short_keys` makes the first N key pairs too short
    struct FakeCrypto {
        short_keys: usize,
        keypair_calls: Arc<AtomicUsize>,
    }

    impl FakeCrypto {
        fn new() -> Self {
            Self {
                short_keys: 0,
                keypair_calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl CryptoProvider for FakeCrypto {
        fn cd_key_info(
            &self,
            key: &str,
            _client_token: u32,
            _server_token: u32,
        ) -> Result<CdKeyInfo, CryptoError> {
            Ok(CdKeyInfo {
                key_length: key.len() as u32,
                product: 0x0E,
                public_value: 0x1234,
                hash: [0xAB; PROOF_SIZE],
            })
        }

        fn exe_info(&self, _formula: &str, _archive: &str) -> Result<ExeInfo, CryptoError> {
            Ok(ExeInfo {
                version: [1, 0, 26, 1],
                hash: 0xCAFEBABE,
                info: "war3.exe 03/18/11 02:00:00 471040".to_string(),
            })
        }

        fn nls_create_keypair(
            &self,
            _username: &str,
            _password: &str,
        ) -> Result<NlsKeyPair, CryptoError> {
            let call = self.keypair_calls.fetch_add(1, Ordering::SeqCst);
            let len = if call < self.short_keys { 31 } else { NLS_KEY_SIZE };
            Ok(NlsKeyPair {
                handle: NlsHandle(call as u64),
                public_key: vec![0x42; len],
            })
        }

        fn nls_proof(
            &self,
            _handle: NlsHandle,
            _server_key: &[u8; NLS_KEY_SIZE],
            _salt: &[u8; NLS_KEY_SIZE],
        ) -> Result<[u8; PROOF_SIZE], CryptoError> {
            Ok([0x11; PROOF_SIZE])
        }

        fn hash_password_single(&self, _password: &str) -> Result<[u8; PROOF_SIZE], CryptoError> {
            Ok([0x22; PROOF_SIZE])
        }
    }

    fn test_config() -> BnetConfig {
        Config::from_toml(
            r#"
[bnet]
server = "127.0.0.1"
alias = "test"
username = "hostbot"
password = "secret"
cd_key_roc = "FFFFFFFFFFFFFFFFFFFFFFFFFF"
cd_key_tft = "FFFFFFFFFFFFFFFFFFFFFFFFFF"
"#,
        )
        .unwrap()
        .bnet
    }

    fn decode_all(bytes: &[u8]) -> Vec<Packet> {
        let mut buffer = PacketBuffer::new(HeaderKind::BNet);
        buffer.push(bytes);
        buffer.drain_packets().unwrap()
    }

    fn ids(bytes: &[u8]) -> Vec<u8> {
        decode_all(bytes).iter().map(|p| p.id).collect()
    }

    fn connected(config: BnetConfig, crypto: FakeCrypto) -> (BnetConnection, Instant) {
        let now = Instant::now();
        let mut bnet = BnetConnection::new(config, Box::new(crypto), now);
        bnet.connect();
        bnet.on_connected(now, [127, 0, 0, 1]).unwrap();
        (bnet, now)
    }

    fn auth_info() -> Vec<u8> {
        AuthInfo {
            logon_type: 2,
            server_token: 0x01020304,
            udp_value: 0,
            mpq_file_time: 0,
            version_archive: "ver-IX86-1.mpq".to_string(),
            formula: "A=1 B=2 C=3 4 A=A^S B=B-C C=C+A A=A+B".to_string(),
        }
        .encode()
        .unwrap()
    }

    fn auth_check(status: u32) -> Vec<u8> {
        AuthCheckResult {
            status,
            description: String::new(),
        }
        .encode()
        .unwrap()
    }

    fn account_logon(status: u32) -> Vec<u8> {
        AccountLogonResult {
            status,
            salt: [1; NLS_KEY_SIZE],
            server_key: [2; NLS_KEY_SIZE],
        }
        .encode()
        .unwrap()
    }

    fn proof(status: u32) -> Vec<u8> {
        AccountLogonProofResult {
            status,
            server_proof: [0; PROOF_SIZE],
            message: String::new(),
        }
        .encode()
        .unwrap()
    }

    /// Drive a fresh engine to the in-chat state
    fn logged_in(config: BnetConfig) -> (BnetConnection, Instant) {
        let (mut bnet, now) = connected(config, FakeCrypto::new());
        for packet in [auth_info(), auth_check(0), account_logon(0), proof(0)] {
            bnet.on_data(&packet).unwrap();
        }
        bnet.take_outgoing();
        while bnet.poll_event().is_some() {}
        (bnet, now)
    }

    #[test]
    fn test_connect_sends_selector_then_auth_info() {
        let (mut bnet, _) = connected(test_config(), FakeCrypto::new());
        let out = bnet.take_outgoing();

        assert_eq!(out[0], 0x01);
        assert_eq!(ids(&out[1..]), vec![0x50]);
        assert_eq!(bnet.phase(), Phase::AwaitingAuthInfo);
    }

    #[test]
    fn test_auth_info_sends_auth_check_with_both_keys() {
        let (mut bnet, _) = connected(test_config(), FakeCrypto::new());
        bnet.take_outgoing();

        bnet.on_data(&auth_info()).unwrap();
        let packets = decode_all(&bnet.take_outgoing());
        assert_eq!(packets.len(), 1);

        let request = AuthCheckRequest::parse(&packets[0].payload).unwrap();
        assert_eq!(request.client_token, bnet.client_token());
        assert_eq!(request.keys.len(), 2);
        assert_eq!(request.exe_hash, 0xCAFEBABE);
        assert_eq!(request.key_owner, "hostbot");
        assert_eq!(bnet.phase(), Phase::AwaitingAuthCheck);
    }

    #[test]
    fn test_exe_override_bypasses_provider() {
        let mut config = test_config();
        config.tft = false;
        config.exe_override = Some(ExeOverride {
            version: [1, 0, 26, 1],
            hash: [72, 160, 184, 193],
            info: "custom".to_string(),
        });
        let (mut bnet, _) = connected(config, FakeCrypto::new());
        bnet.take_outgoing();

        bnet.on_data(&auth_info()).unwrap();
        let packets = decode_all(&bnet.take_outgoing());
        let request = AuthCheckRequest::parse(&packets[0].payload).unwrap();

        assert_eq!(request.exe_hash, u32::from_le_bytes([72, 160, 184, 193]));
        assert_eq!(request.exe_info, "custom");
        assert_eq!(request.keys.len(), 1);
    }

    #[test]
    fn test_auth_check_passed_sends_account_logon() {
        let (mut bnet, _) = connected(test_config(), FakeCrypto::new());
        bnet.on_data(&auth_info()).unwrap();
        bnet.take_outgoing();

        bnet.on_data(&auth_check(0)).unwrap();
        let packets = decode_all(&bnet.take_outgoing());

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].id, 0x53);
        let request = AccountLogonRequest::parse(&packets[0].payload).unwrap();
        assert_eq!(request.username, "hostbot");
        assert_eq!(bnet.phase(), Phase::AwaitingAccountLogon);
    }

    #[test]
    fn test_auth_check_invalid_key_is_terminal() {
        let (mut bnet, _) = connected(test_config(), FakeCrypto::new());
        bnet.on_data(&auth_info()).unwrap();
        bnet.take_outgoing();

        bnet.on_data(&auth_check(0x200)).unwrap();

        assert!(bnet.take_outgoing().is_empty());
        assert_eq!(bnet.phase(), Phase::Disconnected);
        assert!(!bnet.is_connected());
        match bnet.poll_event() {
            Some(BnetEvent::Disconnected(reason)) => {
                assert_eq!(
                    reason,
                    DisconnectReason::AuthCheckRejected {
                        status: AuthCheckStatus::InvalidCdKey,
                        description: String::new(),
                    }
                );
                assert!(!reason.is_retryable());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_short_nls_key_retried_once() {
        let mut crypto = FakeCrypto::new();
        crypto.short_keys = 1;
        let calls = crypto.keypair_calls.clone();
        let (mut bnet, _) = connected(test_config(), crypto);
        bnet.on_data(&auth_info()).unwrap();

        bnet.on_data(&auth_check(0)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(bnet.phase(), Phase::AwaitingAccountLogon);
    }

    #[test]
    fn test_short_nls_key_twice_is_fatal() {
        let mut crypto = FakeCrypto::new();
        crypto.short_keys = 2;
        let (mut bnet, _) = connected(test_config(), crypto);
        bnet.on_data(&auth_info()).unwrap();

        let result = bnet.on_data(&auth_check(0));
        assert!(matches!(result, Err(BnetError::NlsKeySize { actual: 31 })));
        assert!(!bnet.is_connected());
        match bnet.poll_event() {
            Some(BnetEvent::Disconnected(reason)) => {
                assert!(matches!(reason, DisconnectReason::CryptoFailure(_)));
                assert!(!reason.is_retryable());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_crypto_library_ends_session() {
        let now = Instant::now();
        let mut bnet = BnetConnection::new(test_config(), Box::new(UnavailableCrypto), now);
        bnet.connect();
        bnet.on_connected(now, [127, 0, 0, 1]).unwrap();
        bnet.take_outgoing();

        let result = bnet.on_data(&auth_info());

        assert!(matches!(result, Err(BnetError::Crypto(_))));
        assert!(!bnet.is_connected());
        assert!(!bnet.logged_in());
        assert_eq!(bnet.phase(), Phase::Disconnected);
        assert!(bnet.take_outgoing().is_empty());
        match bnet.poll_event() {
            Some(BnetEvent::Disconnected(DisconnectReason::CryptoFailure(message))) => {
                assert!(message.contains("no crypto library"));
            }
            other => panic!("unexpected {:?}", other),
        }

        // a later close does not report the session twice
        bnet.on_closed();
        assert!(bnet.poll_event().is_none());
    }

    #[test]
    fn test_pvpgn_uses_single_hash() {
        let mut config = test_config();
        config.password_hash_type = PasswordHashType::Pvpgn;
        let (mut bnet, _) = connected(config, FakeCrypto::new());
        for packet in [auth_info(), auth_check(0)] {
            bnet.on_data(&packet).unwrap();
        }
        bnet.take_outgoing();

        bnet.on_data(&account_logon(0)).unwrap();
        let packets = decode_all(&bnet.take_outgoing());
        let request = AccountLogonProofRequest::parse(&packets[0].payload).unwrap();
        assert_eq!(request.proof, [0x22; PROOF_SIZE]);
    }

    #[test]
    fn test_account_logon_rejected() {
        let (mut bnet, _) = connected(test_config(), FakeCrypto::new());
        for packet in [auth_info(), auth_check(0)] {
            bnet.on_data(&packet).unwrap();
        }
        bnet.take_outgoing();

        bnet.on_data(&account_logon(1)).unwrap();
        assert!(bnet.take_outgoing().is_empty());
        assert_eq!(
            bnet.poll_event(),
            Some(BnetEvent::Disconnected(DisconnectReason::LogonRejected(
                AccountLogonStatus::NoSuchAccount
            )))
        );
    }

    #[test]
    fn test_proof_accepted_enters_chat() {
        let (mut bnet, _) = connected(test_config(), FakeCrypto::new());
        for packet in [auth_info(), auth_check(0), account_logon(0)] {
            bnet.on_data(&packet).unwrap();
        }
        bnet.take_outgoing();

        bnet.on_data(&proof(0)).unwrap();
        assert!(bnet.logged_in());
        assert_eq!(bnet.phase(), Phase::InChat);
        assert_eq!(ids(&bnet.take_outgoing()), vec![0x45, 0x0A, 0x65, 0x7D]);
        assert_eq!(bnet.poll_event(), Some(BnetEvent::LoggedIn));

        let enter = EnterChat {
            unique_name: "hostbot".to_string(),
            stat_string: "PX3W".to_string(),
            account_name: "hostbot".to_string(),
        };
        bnet.on_data(&enter.encode().unwrap()).unwrap();
        assert!(bnet.in_chat());
        assert_eq!(bnet.unique_name(), "hostbot");

        let packets = decode_all(&bnet.take_outgoing());
        assert_eq!(packets.len(), 1);
        assert_eq!(
            JoinChannel::parse(&packets[0].payload).unwrap(),
            JoinChannel::new("The Void")
        );
    }

    #[test]
    fn test_proof_rejected_keeps_server_message() {
        let (mut bnet, _) = connected(test_config(), FakeCrypto::new());
        for packet in [auth_info(), auth_check(0), account_logon(0)] {
            bnet.on_data(&packet).unwrap();
        }
        let rejected = AccountLogonProofResult {
            status: 0x0F,
            server_proof: [0; PROOF_SIZE],
            message: "Account closed".to_string(),
        };
        bnet.on_data(&rejected.encode().unwrap()).unwrap();

        assert_eq!(
            bnet.poll_event(),
            Some(BnetEvent::Disconnected(DisconnectReason::ProofRejected {
                status: LogonProofStatus::CustomError,
                message: "Account closed".to_string(),
            }))
        );
    }

    #[test]
    fn test_ping_is_echoed_immediately() {
        let (mut bnet, _) = connected(test_config(), FakeCrypto::new());
        bnet.take_outgoing();

        bnet.on_data(&Ping { value: 0xA1B2C3D4 }.encode().unwrap())
            .unwrap();
        let packets = decode_all(&bnet.take_outgoing());
        assert_eq!(packets.len(), 1);
        assert_eq!(Ping::parse(&packets[0].payload).unwrap().value, 0xA1B2C3D4);
    }

    #[test]
    fn test_disconnect_drops_unsent_replies() {
        let (mut bnet, _) = connected(test_config(), FakeCrypto::new());
        bnet.take_outgoing();

        let mut data = Ping { value: 7 }.encode().unwrap();
        data.extend_from_slice(&[0xF7, 0x1E, 0x04, 0x00]);
        bnet.on_data(&data).unwrap();

        assert!(!bnet.is_connected());
        assert!(bnet.take_outgoing().is_empty());
    }

    #[test]
    fn test_null_is_not_answered() {
        let (mut bnet, _) = connected(test_config(), FakeCrypto::new());
        bnet.take_outgoing();

        bnet.on_data(&[0xFF, 0x00, 0x04, 0x00]).unwrap();
        assert!(bnet.take_outgoing().is_empty());
        assert!(bnet.is_connected());
    }

    #[test]
    fn test_keepalive_every_minute() {
        let (mut bnet, now) = connected(test_config(), FakeCrypto::new());
        bnet.take_outgoing();

        bnet.update(now + Duration::from_secs(59)).unwrap();
        assert!(bnet.take_outgoing().is_empty());

        bnet.update(now + Duration::from_secs(60)).unwrap();
        assert_eq!(bnet.take_outgoing(), vec![0xFF, 0x00, 0x04, 0x00]);
    }

    #[test]
    fn test_bad_header_disconnects() {
        let (mut bnet, _) = connected(test_config(), FakeCrypto::new());

        bnet.on_data(&[0xF7, 0x1E, 0x04, 0x00]).unwrap();
        assert!(!bnet.is_connected());
        match bnet.poll_event() {
            Some(BnetEvent::Disconnected(reason)) => {
                assert!(matches!(reason, DisconnectReason::InvalidPacket(_)));
                assert!(!reason.is_retryable());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_id_is_skipped() {
        let (mut bnet, _) = connected(test_config(), FakeCrypto::new());
        bnet.take_outgoing();

        let mut data = vec![0xFF, 0xEE, 0x04, 0x00];
        data.extend(Ping { value: 7 }.encode().unwrap());
        bnet.on_data(&data).unwrap();

        assert!(bnet.is_connected());
        assert_eq!(ids(&bnet.take_outgoing()), vec![0x25]);
    }

    #[test]
    fn test_chat_commands_are_paced() {
        let (mut bnet, now) = logged_in(test_config());

        assert!(bnet.queue_chat_command("hello"));
        assert!(bnet.queue_whisper("Moon", "hi"));
        assert_eq!(bnet.queued_packets(), 2);

        bnet.update(now + Duration::from_millis(1300)).unwrap();
        let first = decode_all(&bnet.take_outgoing());
        assert_eq!(ChatCommand::parse(&first[0].payload).unwrap().text, "hello");

        // a 10 byte packet sets a 3400 ms step, plus one penalty point
        bnet.update(now + Duration::from_millis(2000)).unwrap();
        assert!(bnet.take_outgoing().is_empty());
        bnet.update(now + Duration::from_millis(1300 + 3460)).unwrap();
        let second = decode_all(&bnet.take_outgoing());
        assert_eq!(
            ChatCommand::parse(&second[0].payload).unwrap().text,
            "/w Moon hi"
        );
    }

    #[test]
    fn test_queue_overflow_drops_commands() {
        let (mut bnet, _) = logged_in(test_config());

        for i in 0..11 {
            assert!(bnet.queue_chat_command(&format!("line {}", i)));
        }
        assert!(!bnet.queue_chat_command("dropped"));
        assert!(!bnet.queue_get_game_list(""));
        assert_eq!(bnet.queued_packets(), 11);
    }

    #[test]
    fn test_commands_truncated() {
        let mut config = test_config();
        config.password_hash_type = PasswordHashType::Pvpgn;
        config.max_message_length = 20;
        let (mut bnet, _) = logged_in(config);

        bnet.queue_chat_command(&"x".repeat(300));
        match bnet.poll_event() {
            Some(BnetEvent::CommandQueued(text)) => assert_eq!(text.len(), 20),
            other => panic!("unexpected {:?}", other),
        }

        let (mut bnet, _) = logged_in(test_config());
        bnet.queue_chat_command(&"y".repeat(300));
        match bnet.poll_event() {
            Some(BnetEvent::CommandQueued(text)) => assert_eq!(text.len(), 255),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_commands_need_login() {
        let (mut bnet, _) = connected(test_config(), FakeCrypto::new());
        assert!(!bnet.queue_chat_command("hello"));
        assert_eq!(bnet.queued_packets(), 0);
    }

    #[test]
    fn test_trigger_question_is_answered() {
        let (mut bnet, _) = logged_in(test_config());

        let event = ChatEvent {
            event: ChatEventId::Talk as u32,
            flags: 0,
            ping: 30,
            user: "Moon".to_string(),
            message: "?trigger".to_string(),
        };
        bnet.on_data(&event.encode().unwrap()).unwrap();

        assert!(matches!(bnet.poll_event(), Some(BnetEvent::Chat(_))));
        assert_eq!(
            bnet.poll_event(),
            Some(BnetEvent::CommandQueued("Command trigger is !".to_string()))
        );
        assert_eq!(bnet.queued_packets(), 1);
    }

    #[test]
    fn test_whispered_trigger_question_is_whispered_back() {
        let (mut bnet, _) = logged_in(test_config());

        let event = ChatEvent {
            event: ChatEventId::Whisper as u32,
            flags: 0,
            ping: 30,
            user: "Moon".to_string(),
            message: "?trigger".to_string(),
        };
        bnet.on_data(&event.encode().unwrap()).unwrap();

        assert!(matches!(bnet.poll_event(), Some(BnetEvent::Chat(_))));
        assert_eq!(
            bnet.poll_event(),
            Some(BnetEvent::CommandQueued(
                "/w Moon Command trigger is !".to_string()
            ))
        );
    }

    #[test]
    fn test_friends_list_event() {
        let (mut bnet, _) = logged_in(test_config());
        let list = FriendsList {
            friends: vec![Friend {
                account: "Moon".to_string(),
                location: 2,
                status: 1,
                product: "W3XP".to_string(),
                location_name: "The Void".to_string(),
            }],
        };
        bnet.on_data(&list.encode().unwrap()).unwrap();

        assert_eq!(bnet.poll_event(), Some(BnetEvent::FriendsList(list.friends)));
    }

    #[test]
    fn test_disconnect_resets_flags_before_event() {
        let (mut bnet, _) = logged_in(test_config());
        assert!(bnet.logged_in());
        bnet.queue_chat_command("pending");

        bnet.on_closed();

        assert!(!bnet.is_connected());
        assert!(!bnet.logged_in());
        assert!(!bnet.in_chat());
        assert_eq!(bnet.queued_packets(), 0);
        assert_eq!(bnet.phase(), Phase::Disconnected);

        // the queued-command event came first, then the disconnect
        assert!(matches!(bnet.poll_event(), Some(BnetEvent::CommandQueued(_))));
        assert_eq!(
            bnet.poll_event(),
            Some(BnetEvent::Disconnected(DisconnectReason::ConnectionClosed))
        );

        // a new session can start
        bnet.connect();
        assert_eq!(bnet.phase(), Phase::Connecting);
    }
}
