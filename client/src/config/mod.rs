//! Configuration management

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    pub bnet: BnetConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    /// Engine tick period
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Delay before reconnecting after a non-fatal session end
    #[serde(default = "default_reconnect_delay_sec")]
    pub reconnect_delay_sec: u64,
    /// Print chat events with timestamps to stdout
    #[serde(default = "default_true")]
    pub print_chat: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            reconnect_delay_sec: default_reconnect_delay_sec(),
            print_chat: true,
        }
    }
}

/// Password proof dialect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordHashType {
    /// NLS/SRP proof used by official servers
    #[default]
    Battlenet,
    /// Single broken-SHA1 hash used by PvPGN
    Pvpgn,
}

/// Fixed executable version data, bypassing the version check
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExeOverride {
    pub version: [u8; 4],
    pub hash: [u8; 4],
    pub info: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BnetConfig {
    pub server: String,
    #[serde(default = "default_bnet_port")]
    pub port: u16,
    /// Short name used in log lines, defaults to the server address
    #[serde(default)]
    pub alias: String,
    pub username: String,
    pub password: String,
    pub cd_key_roc: String,
    #[serde(default)]
    pub cd_key_tft: String,
    #[serde(default = "default_true")]
    pub tft: bool,
    #[serde(default = "default_war3_version")]
    pub war3_version: u32,
    #[serde(default = "default_locale_id")]
    pub locale_id: u32,
    #[serde(default = "default_country_abbrev")]
    pub country_abbrev: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Minutes; taken from the local clock when unset
    #[serde(default)]
    pub timezone_bias: Option<u32>,
    #[serde(default = "default_first_channel")]
    pub first_channel: String,
    #[serde(default = "default_command_trigger")]
    pub command_trigger: String,
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    #[serde(default)]
    pub password_hash_type: PasswordHashType,
    /// Port announced with SID_NETGAMEPORT
    #[serde(default = "default_host_port")]
    pub host_port: u16,
    #[serde(default)]
    pub exe_override: Option<ExeOverride>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
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

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_reconnect_delay_sec() -> u64 {
    90
}

fn default_bnet_port() -> u16 {
    6112
}

fn default_war3_version() -> u32 {
    26
}

fn default_locale_id() -> u32 {
    1049
}

fn default_country_abbrev() -> String {
    "RUS".to_string()
}

fn default_country() -> String {
    "Russia".to_string()
}

fn default_language() -> String {
    "ruRU".to_string()
}

fn default_first_channel() -> String {
    "The Void".to_string()
}

fn default_command_trigger() -> String {
    "!".to_string()
}

fn default_max_message_length() -> usize {
    200
}

fn default_host_port() -> u16 {
    6112
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(contents).with_context(|| "Failed to parse config file")?;

        if config.bnet.alias.is_empty() {
            config.bnet.alias = config.bnet.server.clone();
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let bnet = &self.bnet;

        if bnet.server.is_empty() {
            bail!("bnet.server is empty");
        }
        if bnet.username.is_empty() {
            bail!("bnet.username is empty");
        }
        if bnet.password.is_empty() {
            bail!("bnet.password is empty");
        }
        if bnet.cd_key_roc.is_empty() {
            bail!("bnet.cd_key_roc is empty");
        }
        if bnet.tft && bnet.cd_key_tft.is_empty() {
            bail!("bnet.cd_key_tft is empty but tft is enabled");
        }
        if bnet.command_trigger.is_empty() {
            bail!("bnet.command_trigger is empty");
        }
        if bnet.language.chars().count() != 4 {
            bail!("bnet.language must have 4 characters, got {:?}", bnet.language);
        }
        if self.general.tick_interval_ms == 0 {
            bail!("general.tick_interval_ms must be positive");
        }

        Ok(())
    }
}
