//! hostbot - Battle.net chat client
//!
//! Logs on to a Battle.net (or PvPGN) server, enters chat and relays lines
//! typed on stdin as chat commands.

mod bnet;
mod config;
mod crypto;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bnet::{BnetConnection, BnetEvent, DisconnectReason};
use config::Config;
use crypto::UnavailableCrypto;
use output::OutputManager;

#[derive(Parser, Debug)]
#[command(name = "hostbot")]
#[command(version)]
#[command(about = "Battle.net chat client for a Warcraft III host bot", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "hostbot.toml")]
    config: PathBuf,
}

/// How a session ended, as far as the process is concerned
enum SessionEnd {
    Reconnect,
    Stop,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load(&args.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("hostbot v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from {:?}", args.config);

    if config.bnet.timezone_bias.is_none() {
        let offset_minutes = chrono::Local::now().offset().local_minus_utc() / 60;
        config.bnet.timezone_bias = Some(offset_minutes.unsigned_abs());
    }

    let output = OutputManager::new(config.general.print_chat);
    let mut engine = BnetConnection::new(
        config.bnet.clone(),
        Box::new(UnavailableCrypto),
        Instant::now(),
    );

    let (line_tx, mut lines) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = stdin.next_line().await {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        engine.connect();

        match run_session(&mut engine, &config, &output, &mut lines).await? {
            SessionEnd::Stop => break,
            SessionEnd::Reconnect => {
                info!(
                    "[{}] reconnecting in {} seconds",
                    engine.alias(),
                    config.general.reconnect_delay_sec
                );
                tokio::time::sleep(Duration::from_secs(config.general.reconnect_delay_sec)).await;
            }
        }
    }

    info!("Shutting down");
    Ok(())
}

async fn run_session(
    engine: &mut BnetConnection,
    config: &Config,
    output: &OutputManager,
    lines: &mut mpsc::UnboundedReceiver<String>,
) -> Result<SessionEnd> {
    let addr = format!("{}:{}", config.bnet.server, config.bnet.port);

    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("[{}] failed to connect to {}: {}", engine.alias(), addr, e);
            engine.on_closed();
            return Ok(drain_events(engine, output).unwrap_or(SessionEnd::Reconnect));
        }
    };
    stream
        .set_nodelay(true)
        .with_context(|| format!("Failed to configure socket for {}", addr))?;

    let local_ip = match stream.local_addr().map(|a| a.ip()) {
        Ok(IpAddr::V4(ip)) => ip.octets(),
        _ => [0; 4],
    };
    engine.on_connected(Instant::now(), local_ip)?;

    let (mut reader, mut writer) = stream.into_split();
    let mut buf = vec![0u8; 8192];
    let mut ticker =
        tokio::time::interval(Duration::from_millis(config.general.tick_interval_ms));

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => engine.on_closed(),
                Ok(n) => engine.on_data(&buf[..n])?,
                Err(e) => {
                    warn!("[{}] read failed: {}", engine.alias(), e);
                    engine.on_closed();
                }
            },
            _ = ticker.tick() => engine.update(Instant::now())?,
            Some(line) = lines.recv() => handle_line(engine, &line),
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                engine.disconnect(DisconnectReason::Requested);
            }
        }

        let outgoing = engine.take_outgoing();
        if !outgoing.is_empty() {
            if let Err(e) = writer.write_all(&outgoing).await {
                error!("[{}] write failed: {}", engine.alias(), e);
                engine.on_closed();
            }
        }

        if let Some(end) = drain_events(engine, output) {
            return Ok(end);
        }
    }
}

/// Print pending events; reports the session end if one was among them
fn drain_events(engine: &mut BnetConnection, output: &OutputManager) -> Option<SessionEnd> {
    let mut end = None;

    while let Some(event) = engine.poll_event() {
        output.update(&event);

        if let BnetEvent::Disconnected(reason) = &event {
            end = Some(if reason.is_retryable() {
                SessionEnd::Reconnect
            } else {
                SessionEnd::Stop
            });
        }
    }

    end
}

/// `/games [name]` queries the game list, `/w user text` whispers,
/// anything else goes to chat
fn handle_line(engine: &mut BnetConnection, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let queued = if let Some(rest) = line.strip_prefix("/games") {
        engine.queue_get_game_list(rest.trim())
    } else if let Some((user, text)) = line
        .strip_prefix("/w ")
        .and_then(|rest| rest.trim_start().split_once(' '))
    {
        engine.queue_whisper(user, text.trim_start())
    } else {
        engine.queue_chat_command(line)
    };

    if !queued {
        warn!(
            "[{}] not sent (logged in: {}, in chat: {}, {} queued): {}",
            engine.alias(),
            engine.logged_in(),
            engine.in_chat(),
            engine.queued_packets(),
            line
        );
    }
}
