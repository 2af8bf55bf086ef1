//! OP Stack contract bindings.
//!
//! Covers everything the withdrawal monitor reads:
//! - L2ToL1MessagePasser (L2 predeploy)
//! - OptimismPortal2 (L1 contract)
//! - DisputeGameFactory (L1 contract)
//! - FaultDisputeGame (L1 contract, one instance per proposal)

use alloy_primitives::{address, Address, B256};
use alloy_sol_types::sol;

/// L2ToL1MessagePasser predeploy address, identical on every OP Stack chain.
pub const MESSAGE_PASSER_ADDRESS: Address = address!("4200000000000000000000000000000000000016");

/// Output root version 0, the only version currently defined.
pub const OUTPUT_VERSION_V0: B256 = B256::ZERO;

sol! {
    /// L2ToL1MessagePasser - L2 predeploy that records every initiated withdrawal
    #[sol(rpc)]
    interface IL2ToL1MessagePasser {
        /// True if a withdrawal with this hash was sent on L2
        function sentMessages(bytes32) external view returns (bool);
    }

    /// OptimismPortal2 - L1 contract where withdrawals are proven and finalized
    #[sol(rpc)]
    interface IOptimismPortal2 {
        /// Proven withdrawal data stored on L1
        #[derive(Debug)]
        struct ProvenWithdrawal {
            address disputeGameProxy;
            uint64 timestamp;
        }

        /// Emitted once per proof submission, in addition to `WithdrawalProven`
        event WithdrawalProvenExtension1(
            bytes32 indexed withdrawalHash,
            address indexed proofSubmitter
        );

        /// Query proven withdrawals by hash and proof submitter
        function provenWithdrawals(bytes32 withdrawalHash, address proofSubmitter)
            external view returns (ProvenWithdrawal memory);

        /// True if the guardian blacklisted the given dispute game
        function disputeGameBlacklist(address disputeGame) external view returns (bool);

        /// Address of the DisputeGameFactory the portal accepts games from
        function disputeGameFactory() external view returns (address);
    }

    /// DisputeGameFactory - registry of every dispute game created
    #[sol(rpc)]
    interface IDisputeGameFactory {
        /// Look up the game created for a (type, root claim, extra data) triple
        function games(uint32 _gameType, bytes32 _rootClaim, bytes _extraData)
            external view returns (address proxy_, uint64 timestamp_);
    }

    /// IFaultDisputeGame - one fault proof game for one output root proposal
    #[sol(rpc)]
    interface IFaultDisputeGame {
        /// Get the L2 block number this game is disputing
        function l2BlockNumber() external view returns (uint256);

        /// L2 chain id the proposal belongs to
        function l2ChainId() external view returns (uint256);

        /// 0 = IN_PROGRESS, 1 = CHALLENGER_WINS, 2 = DEFENDER_WINS
        function status() external view returns (uint8);

        /// Get the root claim (output root)
        function rootClaim() external view returns (bytes32);

        /// Creation timestamp
        function createdAt() external view returns (uint64);

        /// Resolution timestamp, zero while in progress
        function resolvedAt() external view returns (uint64);

        /// Game type as registered in the factory
        function gameType() external view returns (uint32);

        /// Extra data the game was created with
        function extraData() external view returns (bytes);
    }

    /// Preimage of an L2 output root
    #[derive(Debug)]
    struct OutputRootProof {
        bytes32 version;
        bytes32 stateRoot;
        bytes32 messagePasserStorageRoot;
        bytes32 latestBlockhash;
    }
}
