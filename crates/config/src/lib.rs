//! Configuration types for the fault proof withdrawal monitor.
//!
//! This crate provides:
//! - Network presets (OP Mainnet, OP Sepolia)
//! - Monitor configuration loading and validation

pub mod monitor;
pub mod network;

pub use monitor::{
    BackupEndpoint, ConfigError, MonitorConfig, StartBlock, WithdrawalCheckMode,
    DEFAULT_EVENT_BLOCK_RANGE, DEFAULT_HOURS_IN_THE_PAST, DEFAULT_METRICS_PORT,
    DEFAULT_POLL_INTERVAL_SECS,
};
pub use network::{EthereumConfig, NetworkConfig, NetworkType, OpChainConfig};
