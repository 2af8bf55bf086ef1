//! Runtime configuration of the withdrawal monitor.
//!
//! The same structure is read from a TOML file and overridden from the command
//! line. [`MonitorConfig::validate`] is the single place where a bad setup is
//! rejected before the monitor starts.

use crate::network::{NetworkConfig, NetworkType};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, path::Path, str::FromStr};
use thiserror::Error;

/// Default number of L1 blocks queried per cycle.
pub const DEFAULT_EVENT_BLOCK_RANGE: u64 = 1000;

/// Default look-back when no start height is configured: 14 days.
pub const DEFAULT_HOURS_IN_THE_PAST: u64 = 14 * 24;

/// Default seconds between two cycles.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Default Prometheus listener port.
pub const DEFAULT_METRICS_PORT: u16 = 7300;

/// Fatal configuration problems, reported before the monitor loop starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("invalid backup endpoint {0:?}, expected name=url")]
    InvalidBackupEndpoint(String),

    #[error("duplicate backup endpoint name {0}")]
    DuplicateBackupEndpoint(String),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Where the first scanned L1 block comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStartBlock", into = "RawStartBlock")]
pub enum StartBlock {
    /// Derive it from `start_block_hours_ago`.
    #[default]
    Unset,
    /// Start from the L1 head at boot.
    Latest,
    /// Start from this height.
    Height(u64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawStartBlock {
    Number(i64),
    Tag(String),
}

impl TryFrom<RawStartBlock> for StartBlock {
    type Error = String;

    fn try_from(raw: RawStartBlock) -> Result<Self, Self::Error> {
        match raw {
            RawStartBlock::Number(n) => Self::from_str(&n.to_string()),
            RawStartBlock::Tag(tag) => Self::from_str(&tag),
        }
    }
}

impl From<StartBlock> for RawStartBlock {
    fn from(start: StartBlock) -> Self {
        match start {
            StartBlock::Unset => Self::Number(-1),
            StartBlock::Latest => Self::Tag("latest".to_string()),
            StartBlock::Height(n) => Self::Number(n as i64),
        }
    }
}

impl FromStr for StartBlock {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        match s.parse::<i64>() {
            Ok(-1) => Ok(Self::Unset),
            Ok(n) if n >= 0 => Ok(Self::Height(n as u64)),
            Ok(n) => Err(format!("start block height {n} is negative")),
            Err(_) => Err(format!("start block {s:?} is neither a height nor \"latest\"")),
        }
    }
}

/// How withdrawal presence on L2 is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithdrawalCheckMode {
    /// `sentMessages(hash)` on the message passer at the node's head.
    #[default]
    Mapping,
    /// Raw storage slot read pinned to one L2 block.
    StorageSlot,
}

impl FromStr for WithdrawalCheckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mapping" => Ok(Self::Mapping),
            "storage-slot" => Ok(Self::StorageSlot),
            other => Err(format!(
                "unknown withdrawal check {other}, expected mapping or storage-slot"
            )),
        }
    }
}

/// A named backup L2 execution endpoint, written as `name=url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackupEndpoint {
    pub name: String,
    pub url: String,
}

impl FromStr for BackupEndpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, url) = s
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidBackupEndpoint(s.to_string()))?;
        let (name, url) = (name.trim(), url.trim());
        if name.is_empty() || url.is_empty() {
            return Err(ConfigError::InvalidBackupEndpoint(s.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
        })
    }
}

impl TryFrom<String> for BackupEndpoint {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackupEndpoint> for String {
    fn from(endpoint: BackupEndpoint) -> Self {
        endpoint.to_string()
    }
}

impl fmt::Display for BackupEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.url)
    }
}

/// Complete monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// L1 execution RPC endpoint url
    pub l1_geth_url: String,

    /// Trusted L2 execution RPC endpoint url
    pub l2_geth_url: String,

    /// L2 rollup node url, used for `optimism_outputAtBlock` when present
    #[serde(default)]
    pub l2_node_url: Option<String>,

    /// Backup L2 execution endpoints for proof fetching, tried in order
    #[serde(default)]
    pub l2_geth_backup_urls: Vec<BackupEndpoint>,

    /// OptimismPortal2 address; falls back to the network preset
    #[serde(default)]
    pub optimism_portal_address: Option<Address>,

    /// Network preset
    #[serde(default)]
    pub network: Option<NetworkType>,

    /// Max L1 block range scanned per cycle
    #[serde(default = "default_event_block_range")]
    pub event_block_range: u64,

    /// First L1 block to scan
    #[serde(default)]
    pub start_block_height: StartBlock,

    /// Look-back used when `start_block_height` is unset
    #[serde(default = "default_hours_in_the_past")]
    pub start_block_hours_ago: u64,

    /// Seconds between cycles
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// L2 withdrawal presence check
    #[serde(default)]
    pub withdrawal_check: WithdrawalCheckMode,

    /// Prometheus listener port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

const fn default_event_block_range() -> u64 {
    DEFAULT_EVENT_BLOCK_RANGE
}

const fn default_hours_in_the_past() -> u64 {
    DEFAULT_HOURS_IN_THE_PAST
}

const fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

const fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

impl MonitorConfig {
    /// Minimal configuration with every optional setting at its default.
    pub fn new(l1_geth_url: impl Into<String>, l2_geth_url: impl Into<String>) -> Self {
        Self {
            l1_geth_url: l1_geth_url.into(),
            l2_geth_url: l2_geth_url.into(),
            l2_node_url: None,
            l2_geth_backup_urls: Vec::new(),
            optimism_portal_address: None,
            network: None,
            event_block_range: DEFAULT_EVENT_BLOCK_RANGE,
            start_block_height: StartBlock::Unset,
            start_block_hours_ago: DEFAULT_HOURS_IN_THE_PAST,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            withdrawal_check: WithdrawalCheckMode::Mapping,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Portal address, either explicit or from the network preset.
    pub fn portal_address(&self) -> Result<Address, ConfigError> {
        self.optimism_portal_address
            .or_else(|| {
                self.network
                    .map(|n| NetworkConfig::from_network_type(n).op_chain.optimism_portal)
            })
            .ok_or(ConfigError::Missing("optimism portal address (or network)"))
    }

    /// Reject any configuration the monitor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("l1_geth_url", &self.l1_geth_url)?;
        check_url("l2_geth_url", &self.l2_geth_url)?;
        if let Some(url) = &self.l2_node_url {
            check_url("l2_node_url", url)?;
        }

        let mut names = HashSet::new();
        for endpoint in &self.l2_geth_backup_urls {
            check_url("l2_geth_backup_urls", &endpoint.url)?;
            if !names.insert(endpoint.name.as_str()) {
                return Err(ConfigError::DuplicateBackupEndpoint(endpoint.name.clone()));
            }
        }

        self.portal_address()?;

        if self.event_block_range == 0 {
            return Err(ConfigError::Invalid {
                field: "event_block_range",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_secs",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

fn check_url(field: &'static str, url: &str) -> Result<(), ConfigError> {
    if url.trim().is_empty() {
        return Err(ConfigError::Missing(field));
    }
    client::parse_rpc_url(url).map_err(|e| ConfigError::Invalid {
        field,
        reason: e.to_string(),
    })?;
    Ok(())
}
