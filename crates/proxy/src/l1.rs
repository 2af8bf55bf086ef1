use crate::{
    error::ProxyError,
    stats::{ConnectionStats, Layer},
    L1Reader,
};
use alloy_primitives::{Address, U256};
use alloy_provider::Provider;
use alloy_rpc_types_eth::BlockNumberOrTag;
use binding::opstack::{IDisputeGameFactory, IFaultDisputeGame, IOptimismPortal2};
use tracing::debug;
use withdrawal::{
    DisputeGameFacts, GameResolution, GameStatus, SubmittedProofData, WithdrawalHash,
    WithdrawalProvenEvent,
};

const ENDPOINT: &str = "primary";

/// L1 proxy over an alloy provider.
pub struct L1Proxy<P> {
    provider: P,
    portal: Address,
    factory: Address,
    stats: ConnectionStats,
}

impl<P> L1Proxy<P>
where
    P: Provider + Clone,
{
    pub const fn new(provider: P, portal: Address, factory: Address) -> Self {
        Self {
            provider,
            portal,
            factory,
            stats: ConnectionStats::new(Layer::L1),
        }
    }

    /// Build a proxy, reading the dispute game factory from the portal.
    pub async fn connect(provider: P, portal: Address) -> Result<Self, ProxyError> {
        let mut proxy = Self::new(provider, portal, Address::ZERO);
        let contract = IOptimismPortal2::new(portal, &proxy.provider);
        let factory = proxy.track(
            "disputeGameFactory",
            contract.disputeGameFactory().call().await,
        )?;
        debug!(%portal, %factory, "Resolved dispute game factory");
        proxy.factory = factory;
        Ok(proxy)
    }

    pub const fn portal(&self) -> Address {
        self.portal
    }

    pub const fn factory(&self) -> Address {
        self.factory
    }

    pub const fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    fn track<T, E>(&self, operation: &'static str, result: Result<T, E>) -> Result<T, ProxyError>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.stats
            .record(operation, ENDPOINT, result)
            .map_err(|e| ProxyError::rpc(Layer::L1, operation, ENDPOINT, e))
    }
}

fn to_u64(game: Address, field: &'static str, value: U256) -> Result<u64, ProxyError> {
    u64::try_from(value).map_err(|_| ProxyError::Overflow { game, field, value })
}

impl<P> L1Reader for L1Proxy<P>
where
    P: Provider + Clone,
{
    async fn withdrawal_proven_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<WithdrawalProvenEvent>, ProxyError> {
        let portal = IOptimismPortal2::new(self.portal, &self.provider);
        let logs = self.track(
            "getLogs",
            portal
                .WithdrawalProvenExtension1_filter()
                .from_block(from_block)
                .to_block(to_block)
                .query()
                .await,
        )?;

        let mut events = Vec::with_capacity(logs.len());
        for (event, log) in logs {
            let block_number = log
                .block_number
                .ok_or(ProxyError::IncompleteLog("block number"))?;
            let tx_hash = log
                .transaction_hash
                .ok_or(ProxyError::IncompleteLog("transaction hash"))?;
            events.push((
                log.log_index.unwrap_or_default(),
                WithdrawalProvenEvent {
                    withdrawal_hash: event.withdrawalHash,
                    proof_submitter: event.proofSubmitter,
                    block_number,
                    tx_hash,
                },
            ));
        }
        events.sort_by_key(|(log_index, event)| (event.block_number, *log_index));

        debug!(
            from = from_block,
            to = to_block,
            count = events.len(),
            "Fetched withdrawal proven events"
        );

        Ok(events.into_iter().map(|(_, event)| event).collect())
    }

    async fn submitted_proof_data(
        &self,
        withdrawal_hash: WithdrawalHash,
        proof_submitter: Address,
    ) -> Result<SubmittedProofData, ProxyError> {
        let portal = IOptimismPortal2::new(self.portal, &self.provider);
        let proven = self.track(
            "provenWithdrawals",
            portal
                .provenWithdrawals(withdrawal_hash, proof_submitter)
                .call()
                .await,
        )?;

        Ok(SubmittedProofData {
            proof_submitter,
            withdrawal_hash,
            dispute_game_proxy: proven.disputeGameProxy,
            dispute_game_proxy_timestamp: proven.timestamp,
        })
    }

    async fn dispute_game_static_facts(&self, game: Address) -> Result<DisputeGameFacts, ProxyError> {
        let contract = IFaultDisputeGame::new(game, &self.provider);

        let root_claim = self.track("rootClaim", contract.rootClaim().call().await)?;
        let l2_block_number = self.track("l2BlockNumber", contract.l2BlockNumber().call().await)?;
        let l2_chain_id = self.track("l2ChainId", contract.l2ChainId().call().await)?;
        let created_at = self.track("createdAt", contract.createdAt().call().await)?;
        let game_type = self.track("gameType", contract.gameType().call().await)?;
        let extra_data = self.track("extraData", contract.extraData().call().await)?;

        let factory = IDisputeGameFactory::new(self.factory, &self.provider);
        let registered = self.track(
            "games",
            factory.games(game_type, root_claim, extra_data).call().await,
        )?;
        if registered.proxy_ != game {
            return Err(ProxyError::FactoryMismatch {
                game,
                factory: self.factory,
                registered: registered.proxy_,
            });
        }

        Ok(DisputeGameFacts {
            proxy_address: game,
            root_claim,
            l2_block_number: to_u64(game, "l2BlockNumber", l2_block_number)?,
            l2_chain_id: to_u64(game, "l2ChainId", l2_chain_id)?,
            created_at,
        })
    }

    async fn dispute_game_resolution(&self, game: Address) -> Result<GameResolution, ProxyError> {
        let contract = IFaultDisputeGame::new(game, &self.provider);

        let status = self.track("status", contract.status().call().await)?;
        let resolved_at = self.track("resolvedAt", contract.resolvedAt().call().await)?;
        let status = GameStatus::try_from(status)
            .map_err(|source| ProxyError::UnknownGameStatus { game, source })?;

        Ok(GameResolution {
            status,
            resolved_at,
        })
    }

    async fn is_game_blacklisted(&self, game: Address) -> Result<bool, ProxyError> {
        let portal = IOptimismPortal2::new(self.portal, &self.provider);
        self.track(
            "disputeGameBlacklist",
            portal.disputeGameBlacklist(game).call().await,
        )
    }

    async fn latest_block_height(&self) -> Result<u64, ProxyError> {
        self.track("blockNumber", self.provider.get_block_number().await)
    }

    async fn block_timestamp(&self, block: u64) -> Result<u64, ProxyError> {
        let header = self.track(
            "getBlockByNumber",
            self.provider
                .get_block_by_number(BlockNumberOrTag::Number(block))
                .await,
        )?;
        header
            .map(|b| b.header.timestamp)
            .ok_or(ProxyError::BlockNotFound {
                layer: Layer::L1,
                block,
            })
    }
}
