//! Output root commitments and message passer proofs.
//!
//! An output root binds an L2 block to the storage root of the
//! L2ToL1MessagePasser:
//! `keccak256(version || stateRoot || messagePasserStorageRoot || blockHash)`.

use crate::types::WithdrawalHash;
use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_rlp::RlpEncodable;
use alloy_rpc_types_eth::EIP1186AccountProofResponse;
use alloy_trie::{proof::verify_proof, Nibbles};
use binding::opstack::{OutputRootProof, MESSAGE_PASSER_ADDRESS, OUTPUT_VERSION_V0};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("proof is for account {actual}, expected {expected}")]
    UnexpectedAccount { expected: Address, actual: Address },

    #[error("account proof does not verify against state root {state_root}: {reason}")]
    Verification { state_root: B256, reason: String },
}

/// Compute the output root committed to by `proof`.
pub fn compute_output_root(proof: &OutputRootProof) -> B256 {
    let mut preimage = [0u8; 128];
    preimage[..32].copy_from_slice(proof.version.as_slice());
    preimage[32..64].copy_from_slice(proof.stateRoot.as_slice());
    preimage[64..96].copy_from_slice(proof.messagePasserStorageRoot.as_slice());
    preimage[96..].copy_from_slice(proof.latestBlockhash.as_slice());
    keccak256(preimage)
}

/// Build the version 0 output root preimage for an L2 block.
pub const fn output_root_proof(
    state_root: B256,
    message_passer_storage_root: B256,
    block_hash: B256,
) -> OutputRootProof {
    OutputRootProof {
        version: OUTPUT_VERSION_V0,
        stateRoot: state_root,
        messagePasserStorageRoot: message_passer_storage_root,
        latestBlockhash: block_hash,
    }
}

/// Storage slot of `sentMessages[withdrawal_hash]` in the message passer.
///
/// `sentMessages` is the first declared mapping, so its slot is
/// `keccak256(withdrawal_hash || 0)`.
pub fn compute_storage_slot(withdrawal_hash: WithdrawalHash) -> B256 {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(withdrawal_hash.as_slice());
    keccak256(preimage)
}

#[derive(RlpEncodable)]
struct AccountLeaf {
    nonce: u64,
    balance: U256,
    storage_root: B256,
    code_hash: B256,
}

/// Verify that `response` proves the message passer account, including its
/// storage root, under `state_root`.
pub fn verify_message_passer_proof(
    state_root: B256,
    response: &EIP1186AccountProofResponse,
) -> Result<(), ProofError> {
    if response.address != MESSAGE_PASSER_ADDRESS {
        return Err(ProofError::UnexpectedAccount {
            expected: MESSAGE_PASSER_ADDRESS,
            actual: response.address,
        });
    }

    let leaf = AccountLeaf {
        nonce: response.nonce,
        balance: response.balance,
        storage_root: response.storage_hash,
        code_hash: response.code_hash,
    };
    let key = Nibbles::unpack(keccak256(response.address));

    verify_proof(
        state_root,
        key,
        Some(alloy_rlp::encode(&leaf)),
        &response.account_proof,
    )
    .map_err(|e| ProofError::Verification {
        state_root,
        reason: e.to_string(),
    })
}
