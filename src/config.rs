//! Configuration management for the shard explorer

use crate::error::{ExplorerError, Result};
use crate::sharding::{EpochSchedule, NetworkInstance};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// The explorer listens this far below the node's own port.
pub const EXPLORER_PORT_OFFSET: u16 = 4000;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub explorer: ExplorerConfig,
    pub schedule: Option<ScheduleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_node_port")]
    pub node_port: u16,
    pub api_port: Option<u16>,
    #[serde(default)]
    pub shard_id: u32,
    #[serde(default = "default_address_hrp")]
    pub address_hrp: String,
    #[serde(default = "default_http_template")]
    pub http_endpoint_template: String,
    #[serde(default = "default_ws_template")]
    pub ws_endpoint_template: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            node_port: default_node_port(),
            api_port: None,
            shard_id: 0,
            address_hrp: default_address_hrp(),
            http_endpoint_template: default_http_template(),
            ws_endpoint_template: default_ws_template(),
        }
    }
}

impl NetworkConfig {
    /// `api_port` when set, otherwise derived from `node_port`.
    pub fn explorer_port(&self) -> Result<u16> {
        match self.api_port {
            Some(port) => Ok(port),
            None => explorer_port(self.node_port),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    /// Largest accepted `to - from + 1`.
    #[serde(default = "default_max_window")]
    pub max_window: u64,
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_secs: u64,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_window: default_max_window(),
            scan_timeout_secs: default_scan_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_first_epoch_block")]
    pub first_epoch_block: u64,
    #[serde(default = "default_blocks_per_epoch")]
    pub blocks_per_epoch: u64,
    pub breakpoints: Vec<BreakpointConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakpointConfig {
    pub epoch: u64,
    pub version: String,
    pub shards: u32,
    pub nodes_per_shard: u32,
}

impl ScheduleConfig {
    pub fn to_schedule(&self) -> Result<EpochSchedule> {
        let breakpoints = self
            .breakpoints
            .iter()
            .map(|b| {
                NetworkInstance::new(&b.version, b.shards, b.nodes_per_shard)
                    .map(|instance| (b.epoch, instance))
            })
            .collect::<Result<Vec<_>>>()?;
        EpochSchedule::new(self.first_epoch_block, self.blocks_per_epoch, breakpoints)
    }
}

impl Config {
    /// The configured schedule, or mainnet when none is given.
    pub fn schedule(&self) -> Result<EpochSchedule> {
        match &self.schedule {
            Some(schedule) => schedule.to_schedule(),
            None => Ok(EpochSchedule::mainnet()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.is_empty() {
            return Err(ExplorerError::Config(
                "database.path must be set in config.toml".to_string(),
            ));
        }
        if self.network.address_hrp.is_empty() {
            return Err(ExplorerError::Config(
                "network.address_hrp must not be empty".to_string(),
            ));
        }
        if self.explorer.default_page_size == 0 {
            return Err(ExplorerError::Config(
                "explorer.default_page_size must be at least 1".to_string(),
            ));
        }
        if self.explorer.max_window == 0 {
            return Err(ExplorerError::Config(
                "explorer.max_window must be at least 1".to_string(),
            ));
        }
        self.network.explorer_port()?;
        self.schedule()?;
        Ok(())
    }
}

/// Port the explorer serves on for a node listening on `node_port`.
pub fn explorer_port(node_port: u16) -> Result<u16> {
    node_port.checked_sub(EXPLORER_PORT_OFFSET).ok_or_else(|| {
        ExplorerError::Config(format!(
            "node port {} is below the explorer port offset {}",
            node_port, EXPLORER_PORT_OFFSET
        ))
    })
}

pub fn parse_config(text: &str) -> Result<Config> {
    let config: Config = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

/// Reads `path`; a missing file yields the defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        let config = Config::default();
        config.validate()?;
        return Ok(config);
    }
    let text = fs::read_to_string(path)?;
    parse_config(&text)
}

fn default_node_port() -> u16 {
    9000
}

fn default_address_hrp() -> String {
    "one".to_string()
}

fn default_http_template() -> String {
    "https://api.s%d.t.hmny.io".to_string()
}

fn default_ws_template() -> String {
    "wss://ws.s%d.t.hmny.io".to_string()
}

fn default_db_path() -> String {
    "./data/explorer.db".to_string()
}

fn default_page_size() -> usize {
    10
}

fn default_max_window() -> u64 {
    10_000
}

fn default_scan_timeout() -> u64 {
    30
}

fn default_first_epoch_block() -> u64 {
    crate::sharding::MAINNET_FIRST_EPOCH_BLOCK
}

fn default_blocks_per_epoch() -> u64 {
    crate::sharding::MAINNET_BLOCKS_PER_EPOCH
}
