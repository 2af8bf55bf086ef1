//! Network presets for the chains the monitor watches.
//!
//! Provides the L1 and OP Stack chain ids and the OptimismPortal2 proxy
//! address for each supported network.

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Network type (mainnet or testnet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Mainnet,
    Sepolia,
}

impl FromStr for NetworkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "sepolia" | "testnet" => Ok(Self::Sepolia),
            other => Err(format!("unknown network {other}, expected mainnet or sepolia")),
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mainnet => f.write_str("mainnet"),
            Self::Sepolia => f.write_str("sepolia"),
        }
    }
}

/// Ethereum network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthereumConfig {
    /// Chain ID
    pub chain_id: u64,
}

impl EthereumConfig {
    /// Ethereum mainnet configuration.
    pub const fn mainnet() -> Self {
        Self { chain_id: 1 }
    }

    /// Ethereum Sepolia testnet configuration.
    pub const fn sepolia() -> Self {
        Self { chain_id: 11155111 }
    }
}

/// OP Stack chain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpChainConfig {
    /// Chain ID
    pub chain_id: u64,
    /// OptimismPortal2 proxy on L1
    pub optimism_portal: Address,
}

impl OpChainConfig {
    /// OP Mainnet configuration.
    pub const fn mainnet() -> Self {
        Self {
            chain_id: 10,
            // https://etherscan.io/address/0xbEb5Fc579115071764c7423A4f12eDde41f106Ed
            optimism_portal: address!("0xbEb5Fc579115071764c7423A4f12eDde41f106Ed"),
        }
    }

    /// OP Sepolia configuration.
    pub const fn sepolia() -> Self {
        Self {
            chain_id: 11155420,
            // https://sepolia.etherscan.io/address/0x16Fc5058F25648194471939df75CF27A2e143F55
            optimism_portal: address!("0x16Fc5058F25648194471939df75CF27A2e143F55"),
        }
    }
}

/// L1 plus OP chain configuration for one network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network type (mainnet or testnet)
    pub network_type: NetworkType,
    /// Ethereum/L1 configuration
    pub ethereum: EthereumConfig,
    /// OP Stack L2 configuration
    pub op_chain: OpChainConfig,
}

impl NetworkConfig {
    /// Create mainnet configuration.
    pub const fn mainnet() -> Self {
        Self {
            network_type: NetworkType::Mainnet,
            ethereum: EthereumConfig::mainnet(),
            op_chain: OpChainConfig::mainnet(),
        }
    }

    /// Create testnet (Sepolia) configuration.
    pub const fn sepolia() -> Self {
        Self {
            network_type: NetworkType::Sepolia,
            ethereum: EthereumConfig::sepolia(),
            op_chain: OpChainConfig::sepolia(),
        }
    }

    /// Create configuration from network type.
    pub const fn from_network_type(network_type: NetworkType) -> Self {
        match network_type {
            NetworkType::Mainnet => Self::mainnet(),
            NetworkType::Sepolia => Self::sepolia(),
        }
    }
}
