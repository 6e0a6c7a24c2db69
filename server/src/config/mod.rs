//! Lobby configuration

use anyhow::{Context, Result, bail};
use protocol::constants::GAME_BROADCAST_PORT;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Longest game name Warcraft III displays
pub const GAME_NAME_MAX: usize = 31;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    pub game: GameConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port players join on, also announced in GAMEINFO
    #[serde(default = "default_port")]
    pub bind_port: u16,
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: String,
    #[serde(default = "default_broadcast_port")]
    pub broadcast_port: u16,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_port(),
            broadcast_address: default_broadcast_address(),
            broadcast_port: default_broadcast_port(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    pub game_name: String,
    #[serde(default = "default_creator_name")]
    pub creator_name: String,
    #[serde(default = "default_virtual_host_name")]
    pub virtual_host_name: String,
    #[serde(default = "default_true")]
    pub tft: bool,
    #[serde(default = "default_war3_version")]
    pub war3_version: u32,
    #[serde(default = "default_host_counter")]
    pub host_counter: u32,
    /// JSON map descriptor; the built-in Emerald Gardens map when unset
    #[serde(default)]
    pub map_path: Option<PathBuf>,
    #[serde(default)]
    pub case_sensitive_names: bool,
    /// GAMEINFO broadcast and PING_FROM_HOST period
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    6112
}

fn default_broadcast_port() -> u16 {
    GAME_BROADCAST_PORT
}

fn default_broadcast_address() -> String {
    "255.255.255.255".to_string()
}

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_creator_name() -> String {
    "hostbot".to_string()
}

fn default_virtual_host_name() -> String {
    "Map".to_string()
}

fn default_war3_version() -> u32 {
    26
}

fn default_host_counter() -> u32 {
    1
}

fn default_refresh_interval_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).context("Failed to parse config file")?;

        if config.game.game_name.is_empty() {
            bail!("game.game_name is empty");
        }
        if config.game.virtual_host_name.is_empty() {
            bail!("game.virtual_host_name is empty");
        }
        if config.game.refresh_interval_ms == 0 || config.general.tick_interval_ms == 0 {
            bail!("refresh and tick intervals must be positive");
        }

        config.game.game_name = config.game.game_name.chars().take(GAME_NAME_MAX).collect();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("[game]\ngame_name = \"dota -ap\"\n").unwrap();

        assert_eq!(config.general.bind_port, 6112);
        assert_eq!(config.general.broadcast_address, "255.255.255.255");
        assert_eq!(config.game.virtual_host_name, "Map");
        assert_eq!(config.game.refresh_interval_ms, 5000);
        assert!(!config.game.case_sensitive_names);
        assert!(config.game.map_path.is_none());
    }

    #[test]
    fn test_long_game_name_truncated() {
        let text = format!("[game]\ngame_name = \"{}\"\n", "g".repeat(40));
        let config = Config::from_toml(&text).unwrap();
        assert_eq!(config.game.game_name.len(), GAME_NAME_MAX);
    }

    #[test]
    fn test_empty_game_name_rejected() {
        assert!(Config::from_toml("[game]\ngame_name = \"\"\n").is_err());
    }
}
