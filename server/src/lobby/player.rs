//! Lobby connections before and after admission

use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use protocol::{HeaderKind, PacketBuffer};

use super::ConnId;

/// Accepted socket that has not sent an acceptable REQJOIN yet
#[derive(Debug)]
pub struct PotentialPlayer {
    pub conn: ConnId,
    pub addr: SocketAddr,
    pub inbound: PacketBuffer,
}

impl PotentialPlayer {
    pub fn new(conn: ConnId, addr: SocketAddr) -> Self {
        Self {
            conn,
            addr,
            inbound: PacketBuffer::new(HeaderKind::Game),
        }
    }
}

/// Admitted lobby member; owns the socket its potential arrived on
#[derive(Debug)]
pub struct Player {
    pub conn: ConnId,
    pub pid: u8,
    pub name: String,
    pub addr: SocketAddr,
    pub internal_ip: [u8; 4],
    pub joined_at: Instant,
    pub inbound: PacketBuffer,
}

impl Player {
    pub fn admit(
        potential: PotentialPlayer,
        pid: u8,
        name: String,
        internal_ip: [u8; 4],
        now: Instant,
    ) -> Self {
        Self {
            conn: potential.conn,
            pid,
            name,
            addr: potential.addr,
            internal_ip,
            joined_at: now,
            inbound: potential.inbound,
        }
    }

    pub fn external_ip(&self) -> [u8; 4] {
        ipv4_octets(self.addr.ip())
    }

    pub fn external_port(&self) -> u16 {
        self.addr.port()
    }
}

fn ipv4_octets(ip: IpAddr) -> [u8; 4] {
    match ip {
        IpAddr::V4(v4) => v4.octets(),
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(|v4| v4.octets()).unwrap_or([0; 4]),
    }
}
