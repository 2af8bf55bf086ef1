use crate::{
    error::ProxyError,
    stats::{ConnectionStats, Layer},
    L2Reader, TrustedOutputRoot,
};
use alloy_primitives::{B256, U64};
use alloy_provider::Provider;
use alloy_rpc_types_eth::BlockNumberOrTag;
use binding::opstack::{IL2ToL1MessagePasser, MESSAGE_PASSER_ADDRESS, OUTPUT_VERSION_V0};
use config::WithdrawalCheckMode;
use serde::Deserialize;
use tracing::{debug, warn};
use withdrawal::{
    compute_output_root, compute_storage_slot, output_root_proof, verify_message_passer_proof,
    ProofError, WithdrawalHash,
};

const PRIMARY: &str = "primary";
const ROLLUP_NODE: &str = "rollup-node";

/// A named L2 execution endpoint.
#[derive(Debug, Clone)]
pub struct L2Endpoint<P> {
    pub name: String,
    pub provider: P,
}

impl<P> L2Endpoint<P> {
    pub fn new(name: impl Into<String>, provider: P) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }
}

/// `optimism_outputAtBlock` response, only the fields the monitor reads.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputResponse {
    version: String,
    output_root: String,
}

impl OutputResponse {
    fn output_root(&self, block: u64) -> Result<B256, ProxyError> {
        let malformed = |reason: String| ProxyError::MalformedOutputRoot { block, reason };

        let version: B256 = self
            .version
            .parse()
            .map_err(|e| malformed(format!("version {:?}: {e}", self.version)))?;
        if version != OUTPUT_VERSION_V0 {
            return Err(malformed(format!("unsupported version {version}")));
        }
        self.output_root
            .parse()
            .map_err(|e| malformed(format!("output root {:?}: {e}", self.output_root)))
    }
}

/// L2 proxy over the trusted execution node.
///
/// Output roots come from the rollup node when one is configured, otherwise
/// they are recomputed from a verified `eth_getProof` of the message passer.
/// Proofs are fetched from the primary node first, then from the backups in
/// the order given.
pub struct L2Proxy<P> {
    primary: P,
    rollup_node: Option<P>,
    backups: Vec<L2Endpoint<P>>,
    withdrawal_check: WithdrawalCheckMode,
    stats: ConnectionStats,
}

impl<P> L2Proxy<P>
where
    P: Provider + Clone,
{
    pub const fn new(primary: P) -> Self {
        Self {
            primary,
            rollup_node: None,
            backups: Vec::new(),
            withdrawal_check: WithdrawalCheckMode::Mapping,
            stats: ConnectionStats::new(Layer::L2),
        }
    }

    pub fn with_rollup_node(mut self, rollup_node: P) -> Self {
        self.rollup_node = Some(rollup_node);
        self
    }

    pub fn with_backups(mut self, backups: Vec<L2Endpoint<P>>) -> Self {
        self.backups = backups;
        self
    }

    pub const fn with_withdrawal_check(mut self, mode: WithdrawalCheckMode) -> Self {
        self.withdrawal_check = mode;
        self
    }

    pub const fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    fn track<T, E>(
        &self,
        operation: &'static str,
        endpoint: &str,
        result: Result<T, E>,
    ) -> Result<T, ProxyError>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.stats
            .record(operation, endpoint, result)
            .map_err(|e| ProxyError::rpc(Layer::L2, operation, endpoint, e))
    }

    async fn output_at_block(&self, rollup_node: &P, block: u64) -> Result<B256, ProxyError> {
        let response = self.track(
            "optimism_outputAtBlock",
            ROLLUP_NODE,
            rollup_node
                .raw_request::<_, OutputResponse>(
                    "optimism_outputAtBlock".into(),
                    [U64::from(block)],
                )
                .await,
        )?;
        response.output_root(block)
    }

    /// Recompute the output root of `block` from the block header and a
    /// verified message passer account proof.
    async fn compute_output_at_block(&self, block: u64) -> Result<TrustedOutputRoot, ProxyError> {
        let header = self
            .track(
                "getBlockByNumber",
                PRIMARY,
                self.primary
                    .get_block_by_number(BlockNumberOrTag::Number(block))
                    .await,
            )?
            .ok_or(ProxyError::BlockNotFound {
                layer: Layer::L2,
                block,
            })?
            .header;
        let state_root = header.state_root;
        let block_hash = header.hash;

        let endpoints = std::iter::once((PRIMARY, &self.primary))
            .chain(self.backups.iter().map(|b| (b.name.as_str(), &b.provider)));

        let mut last_error = None;
        for (name, provider) in endpoints {
            let proof = self.track(
                "getProof",
                name,
                provider
                    .get_proof(MESSAGE_PASSER_ADDRESS, vec![])
                    .block_id(BlockNumberOrTag::Number(block).into())
                    .await,
            );
            let result = proof.and_then(|proof| {
                verify_message_passer_proof(state_root, &proof)?;
                Ok(proof.storage_hash)
            });

            match result {
                Ok(storage_root) => {
                    let output_root = compute_output_root(&output_root_proof(
                        state_root,
                        storage_root,
                        block_hash,
                    ));
                    debug!(block, endpoint = name, %output_root, "Computed output root");
                    return Ok(TrustedOutputRoot {
                        output_root,
                        served_by: name.to_string(),
                    });
                }
                Err(e) => {
                    warn!(block, endpoint = name, error = %e, "Failed to fetch message passer proof");
                    last_error = Some(e);
                }
            }
        }

        Err(ProxyError::ProofUnavailable {
            block,
            last: Box::new(last_error.unwrap_or(ProxyError::BlockNotFound {
                layer: Layer::L2,
                block,
            })),
        })
    }

    /// Read `sentMessages[hash]` through its raw storage slot, pinned to the
    /// current head, checking the node answered for the message passer.
    async fn withdrawal_slot_is_set(&self, withdrawal_hash: WithdrawalHash) -> Result<bool, ProxyError> {
        let pinned = self.track("blockNumber", PRIMARY, self.primary.get_block_number().await)?;
        let slot = compute_storage_slot(withdrawal_hash);

        let proof = self.track(
            "getProof",
            PRIMARY,
            self.primary
                .get_proof(MESSAGE_PASSER_ADDRESS, vec![slot])
                .block_id(BlockNumberOrTag::Number(pinned).into())
                .await,
        )?;
        if proof.address != MESSAGE_PASSER_ADDRESS {
            return Err(ProofError::UnexpectedAccount {
                expected: MESSAGE_PASSER_ADDRESS,
                actual: proof.address,
            }
            .into());
        }

        let storage = proof
            .storage_proof
            .first()
            .ok_or(ProxyError::StorageKeyMismatch {
                expected: slot,
                actual: B256::ZERO,
            })?;
        let returned = storage.key.as_b256();
        if returned != slot {
            return Err(ProxyError::StorageKeyMismatch {
                expected: slot,
                actual: returned,
            });
        }

        Ok(!storage.value.is_zero())
    }
}

impl<P> L2Reader for L2Proxy<P>
where
    P: Provider + Clone,
{
    async fn trusted_output_root_at_block(
        &self,
        l2_block: u64,
    ) -> Result<TrustedOutputRoot, ProxyError> {
        match &self.rollup_node {
            Some(rollup_node) => Ok(TrustedOutputRoot {
                output_root: self.output_at_block(rollup_node, l2_block).await?,
                served_by: ROLLUP_NODE.to_string(),
            }),
            None => self.compute_output_at_block(l2_block).await,
        }
    }

    async fn withdrawal_exists_on_l2(&self, withdrawal_hash: WithdrawalHash) -> Result<bool, ProxyError> {
        match self.withdrawal_check {
            WithdrawalCheckMode::Mapping => {
                let passer = IL2ToL1MessagePasser::new(MESSAGE_PASSER_ADDRESS, &self.primary);
                self.track(
                    "sentMessages",
                    PRIMARY,
                    passer.sentMessages(withdrawal_hash).call().await,
                )
            }
            WithdrawalCheckMode::StorageSlot => self.withdrawal_slot_is_set(withdrawal_hash).await,
        }
    }

    async fn chain_id(&self) -> Result<u64, ProxyError> {
        self.track("chainId", PRIMARY, self.primary.get_chain_id().await)
    }

    async fn latest_block_height(&self) -> Result<u64, ProxyError> {
        self.track("blockNumber", PRIMARY, self.primary.get_block_number().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256, keccak256, Address, Bytes, U256};
    use alloy_provider::{mock::Asserter, ProviderBuilder};
    use alloy_rpc_types_eth::{EIP1186AccountProofResponse, EIP1186StorageProof};
    use alloy_trie::{proof::ProofRetainer, HashBuilder, Nibbles};
    use serde_json::json;

    const BLOCK: u64 = 12030787;
    const BLOCK_HASH: B256 = B256::repeat_byte(0x0b);
    const STORAGE_ROOT: B256 = B256::repeat_byte(0x5e);
    const CODE_HASH: B256 = B256::repeat_byte(0xc0);

    #[derive(alloy_rlp::RlpEncodable)]
    struct Account {
        nonce: u64,
        balance: U256,
        storage_root: B256,
        code_hash: B256,
    }

    fn mocked(asserter: &Asserter) -> impl Provider + Clone {
        ProviderBuilder::new().connect_mocked_client(asserter.clone())
    }

    /// A state trie holding only the message passer, and a proof of its
    /// account against that trie.
    fn message_passer_state() -> (B256, EIP1186AccountProofResponse) {
        let key = || Nibbles::unpack(keccak256(MESSAGE_PASSER_ADDRESS));
        let account = Account {
            nonce: 0,
            balance: U256::ZERO,
            storage_root: STORAGE_ROOT,
            code_hash: CODE_HASH,
        };

        let mut builder =
            HashBuilder::default().with_proof_retainer(ProofRetainer::new(vec![key()]));
        builder.add_leaf(key(), &alloy_rlp::encode(&account));
        let state_root = builder.root();
        let account_proof = builder
            .take_proof_nodes()
            .into_nodes_sorted()
            .into_iter()
            .map(|(_, node)| node)
            .collect();

        let response = EIP1186AccountProofResponse {
            address: MESSAGE_PASSER_ADDRESS,
            balance: U256::ZERO,
            code_hash: CODE_HASH,
            nonce: 0,
            storage_hash: STORAGE_ROOT,
            account_proof,
            storage_proof: Vec::new(),
        };
        (state_root, response)
    }

    fn block_json(state_root: B256) -> serde_json::Value {
        let zero = B256::ZERO;
        json!({
            "hash": BLOCK_HASH,
            "parentHash": zero,
            "sha3Uncles": zero,
            "miner": Address::ZERO,
            "stateRoot": state_root,
            "transactionsRoot": zero,
            "receiptsRoot": zero,
            "logsBloom": Bytes::from(vec![0u8; 256]),
            "difficulty": "0x0",
            "number": format!("{BLOCK:#x}"),
            "gasLimit": "0x1c9c380",
            "gasUsed": "0x0",
            "timestamp": "0x6645f1c8",
            "extraData": "0x",
            "mixHash": zero,
            "nonce": "0x0000000000000000",
            "uncles": [],
            "transactions": []
        })
    }

    fn slot_proof(address: Address, key: B256, value: U256) -> EIP1186AccountProofResponse {
        EIP1186AccountProofResponse {
            address,
            balance: U256::ZERO,
            code_hash: CODE_HASH,
            nonce: 0,
            storage_hash: STORAGE_ROOT,
            account_proof: Vec::new(),
            storage_proof: vec![EIP1186StorageProof {
                key: key.into(),
                value,
                proof: Vec::new(),
            }],
        }
    }

    fn slot_mode_proxy(asserter: &Asserter) -> L2Proxy<impl Provider + Clone> {
        L2Proxy::new(mocked(asserter)).with_withdrawal_check(WithdrawalCheckMode::StorageSlot)
    }

    #[tokio::test]
    async fn test_backups_are_tried_in_order() {
        let (state_root, proof) = message_passer_state();
        let mut unverifiable = proof.clone();
        unverifiable.account_proof.clear();

        let primary = Asserter::new();
        primary.push_success(&block_json(state_root));
        primary.push_failure_msg("missing trie node");
        let first = Asserter::new();
        first.push_success(&unverifiable);
        let second = Asserter::new();
        second.push_success(&proof);
        let third = Asserter::new();
        third.push_success(&proof);

        let proxy = L2Proxy::new(mocked(&primary)).with_backups(vec![
            L2Endpoint::new("archive-a", mocked(&first)),
            L2Endpoint::new("archive-b", mocked(&second)),
            L2Endpoint::new("archive-c", mocked(&third)),
        ]);

        let trusted = proxy.trusted_output_root_at_block(BLOCK).await.unwrap();

        assert_eq!(trusted.served_by, "archive-b");
        assert_eq!(
            trusted.output_root,
            compute_output_root(&output_root_proof(state_root, STORAGE_ROOT, BLOCK_HASH))
        );
        // archive-c was never asked.
        assert!(third.pop_response().is_some());
        assert_eq!(proxy.stats().calls(), 4);
        assert_eq!(proxy.stats().failures(), 1);
    }

    #[tokio::test]
    async fn test_primary_proof_is_preferred() {
        let (state_root, proof) = message_passer_state();
        let primary = Asserter::new();
        primary.push_success(&block_json(state_root));
        primary.push_success(&proof);
        let backup = Asserter::new();
        backup.push_success(&proof);

        let proxy = L2Proxy::new(mocked(&primary))
            .with_backups(vec![L2Endpoint::new("archive", mocked(&backup))]);

        let trusted = proxy.trusted_output_root_at_block(BLOCK).await.unwrap();

        assert_eq!(trusted.served_by, "primary");
        assert!(backup.pop_response().is_some());
    }

    #[tokio::test]
    async fn test_no_verified_proof_is_unavailable() {
        let (state_root, proof) = message_passer_state();
        let mut foreign = proof.clone();
        foreign.address = address!("4200000000000000000000000000000000000010");

        let primary = Asserter::new();
        primary.push_success(&block_json(state_root));
        primary.push_success(&foreign);
        let backup = Asserter::new();
        backup.push_failure_msg("rate limited");

        let proxy = L2Proxy::new(mocked(&primary))
            .with_backups(vec![L2Endpoint::new("archive", mocked(&backup))]);

        let err = proxy.trusted_output_root_at_block(BLOCK).await.unwrap_err();

        match err {
            ProxyError::ProofUnavailable { block, last } => {
                assert_eq!(block, BLOCK);
                assert!(matches!(*last, ProxyError::Rpc { .. }));
            }
            other => panic!("expected an unavailable proof, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_block_is_not_found() {
        let primary = Asserter::new();
        primary.push_success(&serde_json::Value::Null);

        let proxy = L2Proxy::new(mocked(&primary));
        let err = proxy.trusted_output_root_at_block(BLOCK).await.unwrap_err();

        assert!(matches!(
            err,
            ProxyError::BlockNotFound {
                layer: Layer::L2,
                block: BLOCK,
            }
        ));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_storage_slot_reports_set_and_unset() {
        let hash = B256::repeat_byte(0xee);
        let slot = compute_storage_slot(hash);

        let asserter = Asserter::new();
        asserter.push_success(&U64::from(BLOCK));
        asserter.push_success(&slot_proof(MESSAGE_PASSER_ADDRESS, slot, U256::from(1)));
        asserter.push_success(&U64::from(BLOCK + 1));
        asserter.push_success(&slot_proof(MESSAGE_PASSER_ADDRESS, slot, U256::ZERO));
        let proxy = slot_mode_proxy(&asserter);

        assert!(proxy.withdrawal_exists_on_l2(hash).await.unwrap());
        assert!(!proxy.withdrawal_exists_on_l2(hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_storage_slot_rejects_other_account() {
        let hash = B256::repeat_byte(0xee);
        let other = address!("4200000000000000000000000000000000000010");

        let asserter = Asserter::new();
        asserter.push_success(&U64::from(BLOCK));
        asserter.push_success(&slot_proof(other, compute_storage_slot(hash), U256::from(1)));
        let proxy = slot_mode_proxy(&asserter);

        let err = proxy.withdrawal_exists_on_l2(hash).await.unwrap_err();

        assert!(matches!(
            err,
            ProxyError::Proof(ProofError::UnexpectedAccount { actual, .. }) if actual == other
        ));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_storage_slot_rejects_other_key() {
        let hash = B256::repeat_byte(0xee);
        let wrong_key = B256::repeat_byte(0x01);

        let asserter = Asserter::new();
        asserter.push_success(&U64::from(BLOCK));
        asserter.push_success(&slot_proof(MESSAGE_PASSER_ADDRESS, wrong_key, U256::from(1)));
        let proxy = slot_mode_proxy(&asserter);

        let err = proxy.withdrawal_exists_on_l2(hash).await.unwrap_err();

        match err {
            ProxyError::StorageKeyMismatch { expected, actual } => {
                assert_eq!(expected, compute_storage_slot(hash));
                assert_eq!(actual, wrong_key);
            }
            other => panic!("expected a storage key mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_storage_slot_rejects_empty_storage_proof() {
        let hash = B256::repeat_byte(0xee);
        let mut proof = slot_proof(MESSAGE_PASSER_ADDRESS, compute_storage_slot(hash), U256::ZERO);
        proof.storage_proof.clear();

        let asserter = Asserter::new();
        asserter.push_success(&U64::from(BLOCK));
        asserter.push_success(&proof);
        let proxy = slot_mode_proxy(&asserter);

        let err = proxy.withdrawal_exists_on_l2(hash).await.unwrap_err();

        assert!(matches!(err, ProxyError::StorageKeyMismatch { .. }));
    }

    fn response(json: &str) -> OutputResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parses_output_at_block_response() {
        let output = response(
            r#"{
                "version": "0x0000000000000000000000000000000000000000000000000000000000000000",
                "outputRoot": "0x763d50048ccdb85fded935ff88c9e6b2284fd981da8ed7ae892f36b8761f7597",
                "blockRef": {"number": 12030787},
                "withdrawalStorageRoot": "0x0000000000000000000000000000000000000000000000000000000000000001",
                "stateRoot": "0x0000000000000000000000000000000000000000000000000000000000000002"
            }"#,
        );

        assert_eq!(
            output.output_root(12030787).unwrap(),
            b256!("763d50048ccdb85fded935ff88c9e6b2284fd981da8ed7ae892f36b8761f7597")
        );
    }

    #[test]
    fn test_malformed_output_root_is_data_error() {
        let output = response(
            r#"{
                "version": "0x0000000000000000000000000000000000000000000000000000000000000000",
                "outputRoot": "0x763d5004"
            }"#,
        );

        let err = output.output_root(1).unwrap_err();
        assert!(matches!(err, ProxyError::MalformedOutputRoot { block: 1, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_rejects_unknown_output_version() {
        let output = response(
            r#"{
                "version": "0x0000000000000000000000000000000000000000000000000000000000000001",
                "outputRoot": "0x763d50048ccdb85fded935ff88c9e6b2284fd981da8ed7ae892f36b8761f7597"
            }"#,
        );

        assert!(output.output_root(1).is_err());
    }
}
