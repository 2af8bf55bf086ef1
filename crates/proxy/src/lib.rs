//! Read-only access to the L1 and L2 chains.
//!
//! The detector only sees the [`L1Reader`] and [`L2Reader`] traits, so tests
//! can swap the alloy backed [`L1Proxy`] and [`L2Proxy`] for in-memory chains.
//! Proxies never retry and never cache: every call goes to the node and is
//! counted in [`ConnectionStats`].

pub mod error;
pub mod l1;
pub mod l2;
pub mod stats;

pub use error::ProxyError;
pub use l1::L1Proxy;
pub use l2::{L2Endpoint, L2Proxy};
pub use stats::{ConnectionStats, Layer};

use alloy_primitives::{Address, B256};
use std::future::Future;
use withdrawal::{
    DisputeGameFacts, GameResolution, SubmittedProofData, WithdrawalHash, WithdrawalProvenEvent,
};

/// Output root reported by the trusted L2 side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedOutputRoot {
    pub output_root: B256,
    /// Name of the endpoint that served it.
    pub served_by: String,
}

/// Read access to the portal and its dispute games on L1.
pub trait L1Reader: Send + Sync {
    /// Proven withdrawal logs in `[from_block, to_block]`, in chain order.
    fn withdrawal_proven_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> impl Future<Output = Result<Vec<WithdrawalProvenEvent>, ProxyError>> + Send;

    fn submitted_proof_data(
        &self,
        withdrawal_hash: WithdrawalHash,
        proof_submitter: Address,
    ) -> impl Future<Output = Result<SubmittedProofData, ProxyError>> + Send;

    /// Facts fixed at game creation.
    fn dispute_game_static_facts(
        &self,
        game: Address,
    ) -> impl Future<Output = Result<DisputeGameFacts, ProxyError>> + Send;

    fn dispute_game_resolution(
        &self,
        game: Address,
    ) -> impl Future<Output = Result<GameResolution, ProxyError>> + Send;

    fn is_game_blacklisted(
        &self,
        game: Address,
    ) -> impl Future<Output = Result<bool, ProxyError>> + Send;

    fn latest_block_height(&self) -> impl Future<Output = Result<u64, ProxyError>> + Send;

    fn block_timestamp(&self, block: u64) -> impl Future<Output = Result<u64, ProxyError>> + Send;
}

/// Read access to the trusted L2 node.
pub trait L2Reader: Send + Sync {
    fn trusted_output_root_at_block(
        &self,
        l2_block: u64,
    ) -> impl Future<Output = Result<TrustedOutputRoot, ProxyError>> + Send;

    /// True once the message passer recorded `withdrawal_hash` as sent.
    fn withdrawal_exists_on_l2(
        &self,
        withdrawal_hash: WithdrawalHash,
    ) -> impl Future<Output = Result<bool, ProxyError>> + Send;

    fn chain_id(&self) -> impl Future<Output = Result<u64, ProxyError>> + Send;

    fn latest_block_height(&self) -> impl Future<Output = Result<u64, ProxyError>> + Send;
}
