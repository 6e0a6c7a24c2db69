//! hostbot-lobby - Warcraft III LAN game lobby host

mod config;
mod lobby;
mod map;

use anyhow::{Context, Result};
use clap::Parser;
use lobby::{ConnId, Lobby, LobbyAction, LobbySettings};
use map::MapDescriptor;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version)]
#[command(about = "Warcraft III LAN lobby host", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "lobby.toml")]
    config: String,
}

/// Socket events funnelled from the per-connection readers
enum NetEvent {
    Data(ConnId, Vec<u8>),
    Closed(ConnId),
}

/// Write half of a lobby socket plus the task reading the other half
struct Peer {
    writer: OwnedWriteHalf,
    reader: AbortHandle,
}

impl Peer {
    fn spawn(conn: ConnId, stream: TcpStream, tx: mpsc::UnboundedSender<NetEvent>) -> Self {
        let (reader, writer) = stream.into_split();
        let reader = tokio::spawn(read_loop(conn, reader, tx)).abort_handle();
        Self { writer, reader }
    }

    /// Tear down both halves without waiting for the remote side
    async fn close(mut self) {
        self.reader.abort();
        let _ = self.writer.shutdown().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = config::Config::load(&args.config).context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting hostbot-lobby v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", args.config);

    let map = match &config.game.map_path {
        Some(path) => MapDescriptor::load(path)?,
        None => {
            info!("using hardcoded Emerald Gardens map data for Warcraft 3 version 1.24 & 1.24b");
            MapDescriptor::emerald_gardens()
        }
    };

    let mut lobby = Lobby::new(LobbySettings::from_config(&config), map, Instant::now())?;

    let bind_addr = format!("{}:{}", config.general.bind_address, config.general.bind_port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!("Lobby listening on {}", bind_addr);

    let broadcast_addr: SocketAddr = format!(
        "{}:{}",
        config.general.broadcast_address, config.general.broadcast_port
    )
    .parse()
    .context("Invalid broadcast address")?;
    let udp = broadcast_socket().context("Failed to create broadcast socket")?;
    info!("Advertising to {}", broadcast_addr);

    let (tx, mut rx) = mpsc::unbounded_channel::<NetEvent>();
    let mut peers: HashMap<ConnId, Peer> = HashMap::new();
    let mut next_conn: ConnId = 1;

    let mut interval = tokio::time::interval(tokio::time::Duration::from_millis(
        config.general.tick_interval_ms,
    ));

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    let conn = next_conn;
                    next_conn += 1;

                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("set_nodelay failed for {}: {}", addr, e);
                    }
                    peers.insert(conn, Peer::spawn(conn, stream, tx.clone()));

                    lobby.accept(conn, addr);
                }
                Err(e) => error!("Error accepting connection: {}", e),
            },
            Some(event) = rx.recv() => match event {
                NetEvent::Data(conn, data) => lobby.on_data(conn, &data, Instant::now())?,
                NetEvent::Closed(conn) => {
                    peers.remove(&conn);
                    lobby.on_close(conn)?;
                }
            },
            _ = interval.tick() => lobby.update(Instant::now())?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
        }

        perform_actions(&mut lobby, &mut peers, &udp, broadcast_addr).await?;
    }
}

fn broadcast_socket() -> std::io::Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())?;

    UdpSocket::from_std(socket.into())
}

async fn read_loop(
    conn: ConnId,
    mut reader: OwnedReadHalf,
    tx: mpsc::UnboundedSender<NetEvent>,
) {
    let mut buf = vec![0u8; 4096];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(NetEvent::Data(conn, buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!("read error on connection {}: {}", conn, e);
                break;
            }
        }
    }

    let _ = tx.send(NetEvent::Closed(conn));
}

/// Carry out queued lobby actions; write failures feed back as closes
async fn perform_actions(
    lobby: &mut Lobby,
    peers: &mut HashMap<ConnId, Peer>,
    udp: &UdpSocket,
    broadcast_addr: SocketAddr,
) -> Result<()> {
    while let Some(action) = lobby.poll_action() {
        match action {
            LobbyAction::Send { conn, data } => {
                let Some(peer) = peers.get_mut(&conn) else {
                    continue;
                };
                if let Err(e) = peer.writer.write_all(&data).await {
                    warn!("write to connection {} failed: {}", conn, e);
                    if let Some(peer) = peers.remove(&conn) {
                        peer.close().await;
                    }
                    lobby.on_close(conn)?;
                }
            }
            LobbyAction::Close(conn) => {
                if let Some(peer) = peers.remove(&conn) {
                    peer.close().await;
                }
            }
            LobbyAction::Broadcast(data) => {
                // retried on the next refresh
                if let Err(e) = udp.send_to(&data, broadcast_addr).await {
                    warn!("Failed to broadcast game info to {}: {}", broadcast_addr, e);
                }
            }
        }
    }

    Ok(())
}
