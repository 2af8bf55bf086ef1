//! Withdrawal domain types and the output root math used to check them.

pub mod proof;
pub mod types;

pub use proof::{
    compute_output_root, compute_storage_slot, output_root_proof, verify_message_passer_proof,
    ProofError,
};
pub use types::{
    DisputeGameData, DisputeGameFacts, EnrichedWithdrawalEvent, GameResolution, GameStatus, IncidentKey,
    SubmittedProofData, UnknownGameStatus, WithdrawalHash, WithdrawalProvenEvent,
};
