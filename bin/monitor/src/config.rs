use alloy_primitives::Address;
use clap::{Args, ValueEnum};
use config::{
    BackupEndpoint, ConfigError, MonitorConfig, NetworkType, StartBlock, WithdrawalCheckMode,
};
use std::path::PathBuf;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Monitor settings shared by every binary.
///
/// Each flag can also be set through the environment. Values given here
/// override the ones read from `--config`.
#[derive(Debug, Clone, Default, Args)]
pub struct MonitorArgs {
    /// Path to a TOML configuration file
    #[arg(long, env = "FAULTPROOF_WITHDRAWAL_MON_CONFIG")]
    pub config: Option<PathBuf>,

    /// L1 execution RPC url
    #[arg(long, env = "FAULTPROOF_WITHDRAWAL_MON_L1_GETH_URL")]
    pub l1_geth_url: Option<String>,

    /// Trusted L2 execution RPC url
    #[arg(long, env = "FAULTPROOF_WITHDRAWAL_MON_L2_OP_GETH_URL")]
    pub l2_geth_url: Option<String>,

    /// L2 rollup node RPC url, enables optimism_outputAtBlock
    #[arg(long, env = "FAULTPROOF_WITHDRAWAL_MON_L2_OP_NODE_URL")]
    pub l2_node_url: Option<String>,

    /// Backup L2 execution endpoints as name=url, tried in order
    #[arg(
        long,
        env = "FAULTPROOF_WITHDRAWAL_MON_L2_OP_GETH_BACKUP_URLS",
        value_delimiter = ','
    )]
    pub l2_geth_backup_urls: Vec<BackupEndpoint>,

    /// OptimismPortal2 address
    #[arg(long = "optimismportal-address", env = "FAULTPROOF_WITHDRAWAL_MON_OPTIMISM_PORTAL")]
    pub optimism_portal_address: Option<Address>,

    /// Network preset used when no portal address is given
    #[arg(long, env = "FAULTPROOF_WITHDRAWAL_MON_NETWORK")]
    pub network: Option<NetworkType>,

    /// Max number of L1 blocks scanned per cycle
    #[arg(long, env = "FAULTPROOF_WITHDRAWAL_MON_EVENT_BLOCK_RANGE")]
    pub event_block_range: Option<u64>,

    /// First L1 block to scan, -1 to derive it, or latest
    #[arg(
        long,
        env = "FAULTPROOF_WITHDRAWAL_MON_START_BLOCK_HEIGHT",
        allow_hyphen_values = true
    )]
    pub start_block_height: Option<StartBlock>,

    /// Hours to look back when no start height is set
    #[arg(long, env = "FAULTPROOF_WITHDRAWAL_MON_START_HOURS_IN_THE_PAST")]
    pub start_block_hours_ago: Option<u64>,

    /// Seconds between cycles
    #[arg(long = "poll-interval", env = "FAULTPROOF_WITHDRAWAL_MON_LOOP_INTERVAL_SECS")]
    pub poll_interval_secs: Option<u64>,

    /// L2 withdrawal check: mapping or storage-slot
    #[arg(long, env = "FAULTPROOF_WITHDRAWAL_MON_WITHDRAWAL_CHECK")]
    pub withdrawal_check: Option<WithdrawalCheckMode>,

    /// Prometheus listener port
    #[arg(long, env = "FAULTPROOF_WITHDRAWAL_MON_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Log output format
    #[arg(
        long,
        env = "FAULTPROOF_WITHDRAWAL_MON_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text
    )]
    pub log_format: LogFormat,
}

impl MonitorArgs {
    /// Merge the file (if any) with the flags and validate the result.
    pub fn resolve(&self) -> Result<MonitorConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => MonitorConfig::from_file(path)?,
            None => MonitorConfig::new(String::new(), String::new()),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut MonitorConfig) {
        if let Some(url) = &self.l1_geth_url {
            config.l1_geth_url.clone_from(url);
        }
        if let Some(url) = &self.l2_geth_url {
            config.l2_geth_url.clone_from(url);
        }
        if self.l2_node_url.is_some() {
            config.l2_node_url.clone_from(&self.l2_node_url);
        }
        if !self.l2_geth_backup_urls.is_empty() {
            config.l2_geth_backup_urls.clone_from(&self.l2_geth_backup_urls);
        }
        if self.optimism_portal_address.is_some() {
            config.optimism_portal_address = self.optimism_portal_address;
        }
        if self.network.is_some() {
            config.network = self.network;
        }
        if let Some(range) = self.event_block_range {
            config.event_block_range = range;
        }
        if let Some(start) = self.start_block_height {
            config.start_block_height = start;
        }
        if let Some(hours) = self.start_block_hours_ago {
            config.start_block_hours_ago = hours;
        }
        if let Some(secs) = self.poll_interval_secs {
            config.poll_interval_secs = secs;
        }
        if let Some(mode) = self.withdrawal_check {
            config.withdrawal_check = mode;
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: MonitorArgs,
    }

    fn parse(args: &[&str]) -> MonitorArgs {
        TestCli::try_parse_from(std::iter::once("monitor").chain(args.iter().copied()))
            .unwrap()
            .args
    }

    #[test]
    fn test_flags_build_config() {
        let args = parse(&[
            "--l1-geth-url",
            "http://localhost:8545",
            "--l2-geth-url",
            "http://localhost:9545",
            "--network",
            "sepolia",
            "--start-block-height",
            "-1",
            "--l2-geth-backup-urls",
            "a=http://a:8545,b=http://b:8545",
            "--withdrawal-check",
            "storage-slot",
        ]);

        let config = args.resolve().unwrap();

        assert_eq!(config.start_block_height, StartBlock::Unset);
        assert_eq!(config.withdrawal_check, WithdrawalCheckMode::StorageSlot);
        assert_eq!(config.l2_geth_backup_urls.len(), 2);
        assert_eq!(config.l2_geth_backup_urls[1].name, "b");
        assert_eq!(config.network, Some(NetworkType::Sepolia));
        assert_eq!(args.log_format, LogFormat::Text);
    }

    #[test]
    fn test_missing_urls_are_fatal() {
        let args = parse(&["--network", "mainnet"]);
        assert!(matches!(args.resolve(), Err(ConfigError::Missing("l1_geth_url"))));
    }

    #[test]
    fn test_missing_portal_is_fatal() {
        let args = parse(&[
            "--l1-geth-url",
            "http://localhost:8545",
            "--l2-geth-url",
            "http://localhost:9545",
        ]);
        assert!(matches!(args.resolve(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_flags_override_file_values() {
        let mut config = MonitorConfig::new("http://file-l1:8545", "http://file-l2:8545");
        config.event_block_range = 10;

        let args = parse(&["--event-block-range", "500", "--start-block-height", "latest"]);
        args.apply(&mut config);

        assert_eq!(config.event_block_range, 500);
        assert_eq!(config.start_block_height, StartBlock::Latest);
        assert_eq!(config.l1_geth_url, "http://file-l1:8545");
    }
}
