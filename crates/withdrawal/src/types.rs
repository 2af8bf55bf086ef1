use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type WithdrawalHash = B256;

/// One `WithdrawalProvenExtension1` log emitted by the portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalProvenEvent {
    pub withdrawal_hash: WithdrawalHash,
    pub proof_submitter: Address,
    pub block_number: u64,
    pub tx_hash: B256,
}

impl WithdrawalProvenEvent {
    pub const fn key(&self) -> IncidentKey {
        IncidentKey {
            withdrawal_hash: self.withdrawal_hash,
            proof_submitter: self.proof_submitter,
        }
    }
}

/// Identity of a proof submission.
///
/// The portal stores one proof per (hash, submitter) pair, so the same
/// withdrawal proven by two accounts is tracked as two incidents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IncidentKey {
    pub withdrawal_hash: WithdrawalHash,
    pub proof_submitter: Address,
}

impl fmt::Display for IncidentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.withdrawal_hash, self.proof_submitter)
    }
}

/// Entry of the portal's `provenWithdrawals` mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedProofData {
    pub proof_submitter: Address,
    pub withdrawal_hash: WithdrawalHash,
    pub dispute_game_proxy: Address,
    pub dispute_game_proxy_timestamp: u64,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown dispute game status {0}")]
pub struct UnknownGameStatus(pub u8);

/// Dispute game resolution state as stored in the game contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    InProgress,
    ChallengerWins,
    DefenderWins,
}

impl GameStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::ChallengerWins => "CHALLENGER_WINS",
            Self::DefenderWins => "DEFENDER_WINS",
        }
    }

    pub const fn is_resolved(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl TryFrom<u8> for GameStatus {
    type Error = UnknownGameStatus;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::InProgress),
            1 => Ok(Self::ChallengerWins),
            2 => Ok(Self::DefenderWins),
            other => Err(UnknownGameStatus(other)),
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts about one dispute game.
///
/// `proxy_address`, `root_claim`, `l2_block_number`, `l2_chain_id` and
/// `created_at` never change. `status` and `resolved_at` only change while the
/// game is in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeGameData {
    pub proxy_address: Address,
    pub root_claim: B256,
    pub l2_block_number: u64,
    pub l2_chain_id: u64,
    pub status: GameStatus,
    pub created_at: u64,
    pub resolved_at: u64,
    pub is_blacklisted: bool,
}

impl DisputeGameData {
    /// Combine the immutable facts with the latest resolution.
    pub const fn new(facts: DisputeGameFacts, resolution: GameResolution) -> Self {
        Self {
            proxy_address: facts.proxy_address,
            root_claim: facts.root_claim,
            l2_block_number: facts.l2_block_number,
            l2_chain_id: facts.l2_chain_id,
            status: resolution.status,
            created_at: facts.created_at,
            resolved_at: resolution.resolved_at,
            is_blacklisted: false,
        }
    }

    pub const fn apply_resolution(&mut self, resolution: GameResolution) {
        self.status = resolution.status;
        self.resolved_at = resolution.resolved_at;
    }
}

/// Facts fixed at game creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisputeGameFacts {
    pub proxy_address: Address,
    pub root_claim: B256,
    pub l2_block_number: u64,
    pub l2_chain_id: u64,
    pub created_at: u64,
}

/// Mutable facts of a dispute game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameResolution {
    pub status: GameStatus,
    pub resolved_at: u64,
}

/// A proven withdrawal with everything needed to judge it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedWithdrawalEvent {
    pub event: WithdrawalProvenEvent,
    pub dispute_game: DisputeGameData,
    /// Output root the trusted L2 node reports for the game's block.
    /// `None` until the node has reached that block.
    pub expected_root_claim: Option<B256>,
    pub withdrawal_hash_present_on_l2: bool,
    pub blacklisted: bool,
    pub enriched: bool,
    /// L2 endpoint that served the trusted output root.
    pub output_root_source: Option<String>,
    /// Unix seconds of the last bucket insertion.
    pub processed_at: u64,
    /// Unix seconds the incident entered the bucket it currently sits in.
    pub first_seen_at: u64,
}

impl EnrichedWithdrawalEvent {
    pub const fn new(event: WithdrawalProvenEvent, dispute_game: DisputeGameData) -> Self {
        Self {
            event,
            dispute_game,
            expected_root_claim: None,
            withdrawal_hash_present_on_l2: false,
            blacklisted: false,
            enriched: false,
            output_root_source: None,
            processed_at: 0,
            first_seen_at: 0,
        }
    }

    pub const fn key(&self) -> IncidentKey {
        self.event.key()
    }

    /// True when the game's claim equals the trusted output root.
    pub fn root_claim_matches(&self) -> bool {
        self.expected_root_claim == Some(self.dispute_game.root_claim)
    }
}
