use crate::stats::Layer;
use alloy_primitives::{Address, B256, U256};
use thiserror::Error;
use withdrawal::{ProofError, UnknownGameStatus};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ProxyError {
    /// The node could not be reached or returned an RPC error.
    #[error("{layer} {operation} request to {endpoint} failed: {source}")]
    Rpc {
        layer: Layer,
        operation: &'static str,
        endpoint: String,
        #[source]
        source: BoxError,
    },

    #[error("{layer} block {block} not found")]
    BlockNotFound { layer: Layer, block: u64 },

    #[error("withdrawal proven log is missing its {0}")]
    IncompleteLog(&'static str),

    #[error("malformed output root for L2 block {block}: {reason}")]
    MalformedOutputRoot { block: u64, reason: String },

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error("storage proof returned slot {actual}, requested {expected}")]
    StorageKeyMismatch { expected: B256, actual: B256 },

    #[error("dispute game {game}: {source}")]
    UnknownGameStatus {
        game: Address,
        #[source]
        source: UnknownGameStatus,
    },

    #[error("dispute game {game} reports {field} {value} which does not fit in 64 bits")]
    Overflow {
        game: Address,
        field: &'static str,
        value: U256,
    },

    #[error("dispute game {game} is not registered in factory {factory} (factory returned {registered})")]
    FactoryMismatch {
        game: Address,
        factory: Address,
        registered: Address,
    },

    #[error("trusted L2 node is at block {head}, below claimed block {block}")]
    L2Behind { block: u64, head: u64 },

    #[error("no L2 endpoint served a valid proof for block {block}")]
    ProofUnavailable {
        block: u64,
        #[source]
        last: Box<ProxyError>,
    },
}

impl ProxyError {
    pub fn rpc<E>(layer: Layer, operation: &'static str, endpoint: &str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Rpc {
            layer,
            operation,
            endpoint: endpoint.to_string(),
            source: source.into(),
        }
    }

    /// True for failures that are expected to go away on a later cycle
    /// (unreachable node, timeout). False for data inconsistencies.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Rpc { .. } | Self::BlockNotFound { .. } | Self::L2Behind { .. } => true,
            Self::ProofUnavailable { last, .. } => last.is_transient(),
            _ => false,
        }
    }

    /// Layer the failure came from, for labelling.
    pub const fn layer(&self) -> Option<Layer> {
        match self {
            Self::Rpc { layer, .. } | Self::BlockNotFound { layer, .. } => Some(*layer),
            Self::IncompleteLog(_)
            | Self::UnknownGameStatus { .. }
            | Self::Overflow { .. }
            | Self::FactoryMismatch { .. } => Some(Layer::L1),
            Self::MalformedOutputRoot { .. }
            | Self::Proof(_)
            | Self::StorageKeyMismatch { .. }
            | Self::L2Behind { .. }
            | Self::ProofUnavailable { .. } => Some(Layer::L2),
        }
    }
}
