//! One polling cycle: heights, re-evaluation of open incidents, next window.

use crate::{
    cache::DisputeGameCache,
    enrich::{enrich, update},
    error::DetectorError,
    scanner::ScanWindow,
    state::{Bucket, CycleBatch, MonitorState, ScannedRange, Transition, Validated},
    validate::{validate, ValidationOutcome},
};
use proxy::{L1Reader, L2Reader, ProxyError};
use tracing::{debug, error, info, warn};
use withdrawal::{EnrichedWithdrawalEvent, WithdrawalProvenEvent};

/// Summary of a successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Range scanned this cycle, `None` when caught up.
    pub window: Option<ScanWindow>,
    pub events_scanned: usize,
    pub transitions: Vec<Transition>,
}

impl CycleReport {
    pub fn forgeries(&self) -> impl Iterator<Item = &Transition> {
        self.transitions
            .iter()
            .filter(|t| t.outcome.is_forgery() && t.newly_stored)
    }
}

/// The detection engine. Owns the chain readers and the dispute game cache,
/// but not the [`MonitorState`], which is passed into every cycle.
pub struct Detector<L1, L2> {
    l1: L1,
    l2: L2,
    games: DisputeGameCache,
    max_block_range: u64,
}

impl<L1: L1Reader, L2: L2Reader> Detector<L1, L2> {
    pub fn new(l1: L1, l2: L2, max_block_range: u64) -> Self {
        Self::with_cache(l1, l2, DisputeGameCache::default(), max_block_range)
    }

    pub const fn with_cache(
        l1: L1,
        l2: L2,
        games: DisputeGameCache,
        max_block_range: u64,
    ) -> Self {
        Self {
            l1,
            l2,
            games,
            max_block_range,
        }
    }

    pub const fn l1(&self) -> &L1 {
        &self.l1
    }

    pub const fn l2(&self) -> &L2 {
        &self.l2
    }

    pub const fn games(&self) -> &DisputeGameCache {
        &self.games
    }

    pub const fn max_block_range(&self) -> u64 {
        self.max_block_range
    }

    /// Link a proven withdrawal to its dispute game.
    pub async fn enrich(
        &mut self,
        event: WithdrawalProvenEvent,
    ) -> Result<EnrichedWithdrawalEvent, ProxyError> {
        enrich(&self.l1, &mut self.games, event).await
    }

    /// Refresh the chain facts of an enriched event.
    pub async fn update(&mut self, event: &mut EnrichedWithdrawalEvent) -> Result<(), ProxyError> {
        update(&self.l1, &self.l2, &mut self.games, event).await
    }

    /// Enrich, update and classify a newly seen event.
    pub async fn process(&mut self, event: WithdrawalProvenEvent) -> Result<Validated, ProxyError> {
        let enriched = self.enrich(event).await?;
        self.reevaluate(enriched).await
    }

    /// Update and classify an event seen before.
    pub async fn reevaluate(
        &mut self,
        mut event: EnrichedWithdrawalEvent,
    ) -> Result<Validated, ProxyError> {
        self.update(&mut event).await?;
        let outcome = validate(&event);
        Ok(Validated { event, outcome })
    }

    /// Fetch and classify every event in `window`. Stops at the first failure.
    pub async fn scan(&mut self, window: ScanWindow) -> Result<Vec<Validated>, DetectorError> {
        let events = self
            .l1
            .withdrawal_proven_events(window.from, window.to)
            .await
            .map_err(|source| DetectorError::Scan {
                from: window.from,
                to: window.to,
                source,
            })?;
        debug!(
            from = window.from,
            to = window.to,
            events = events.len(),
            "Fetched withdrawal proven events"
        );

        let mut validated = Vec::with_capacity(events.len());
        for event in events {
            let key = event.key();
            let block = event.block_number;
            let result = self
                .process(event)
                .await
                .map_err(|source| DetectorError::Event { key, block, source })?;
            validated.push(result);
        }
        Ok(validated)
    }

    /// Do all chain reads of one cycle without touching `state`.
    pub async fn collect(&mut self, state: &MonitorState) -> Result<CycleBatch, DetectorError> {
        let latest_l1_height = self
            .l1
            .latest_block_height()
            .await
            .map_err(DetectorError::Heights)?;
        let latest_l2_height = self
            .l2
            .latest_block_height()
            .await
            .map_err(DetectorError::Heights)?;

        let open = state.open_incidents();
        let mut reevaluated = Vec::with_capacity(open.len());
        for event in open {
            let key = event.key();
            let block = event.event.block_number;
            let result = self
                .reevaluate(event)
                .await
                .map_err(|source| DetectorError::Event { key, block, source })?;
            reevaluated.push(result);
        }

        let scanned = match ScanWindow::next(
            state.next_l1_height,
            latest_l1_height,
            self.max_block_range,
        ) {
            Some(window) => Some(ScannedRange {
                window,
                events: self.scan(window).await?,
            }),
            None => None,
        };

        Ok(CycleBatch {
            latest_l1_height,
            latest_l2_height,
            reevaluated,
            scanned,
        })
    }

    /// Run one cycle. On error `state` is left exactly as it was.
    pub async fn run_cycle(
        &mut self,
        state: &mut MonitorState,
        now: u64,
    ) -> Result<CycleReport, DetectorError> {
        let batch = self.collect(state).await?;
        let window = batch.scanned.as_ref().map(|scanned| scanned.window);
        let events_scanned = batch
            .scanned
            .as_ref()
            .map_or(0, |scanned| scanned.events.len());

        let transitions = state.apply(batch, now);
        for transition in &transitions {
            log_transition(transition);
        }

        match window {
            Some(window) => info!(
                from = window.from,
                to = window.to,
                events = events_scanned,
                next_l1_height = state.next_l1_height,
                "Scanned L1 blocks"
            ),
            None => debug!(
                next_l1_height = state.next_l1_height,
                latest_l1_height = state.latest_l1_height,
                "Caught up with L1"
            ),
        }

        Ok(CycleReport {
            window,
            events_scanned,
            transitions,
        })
    }
}

fn log_transition(transition: &Transition) {
    let event = &transition.event;
    let game = &event.dispute_game;

    if transition.outcome.is_forgery() && transition.newly_stored {
        error!(
            alert = "forgery",
            outcome = %transition.outcome,
            withdrawal_hash = %event.event.withdrawal_hash,
            proof_submitter = %event.event.proof_submitter,
            game = %game.proxy_address,
            root_claim = %game.root_claim,
            expected_root_claim = ?event.expected_root_claim,
            l2_block = game.l2_block_number,
            event_block = event.event.block_number,
            tx_hash = %event.event.tx_hash,
            status = %game.status,
            "Withdrawal forgery detected"
        );
        return;
    }

    match transition.outcome {
        ValidationOutcome::InvalidProposalInProgress if transition.newly_stored => warn!(
            withdrawal_hash = %event.event.withdrawal_hash,
            proof_submitter = %event.event.proof_submitter,
            game = %game.proxy_address,
            root_claim = %game.root_claim,
            expected_root_claim = ?event.expected_root_claim,
            l2_block = game.l2_block_number,
            "Withdrawal proven against an in-progress game with a wrong claim"
        ),
        ValidationOutcome::ProofOnBlacklistedGame => {
            let was_alert = transition
                .removed
                .iter()
                .any(|(bucket, _)| *bucket == Bucket::PotentialAttackOnDefenderWinsGames);
            if was_alert {
                warn!(
                    withdrawal_hash = %event.event.withdrawal_hash,
                    proof_submitter = %event.event.proof_submitter,
                    game = %game.proxy_address,
                    "Forgery mitigated, dispute game blacklisted"
                );
            } else {
                info!(
                    withdrawal_hash = %event.event.withdrawal_hash,
                    game = %game.proxy_address,
                    "Withdrawal proven against a blacklisted game"
                );
            }
        }
        ValidationOutcome::InvalidProposalCorrectlyResolved if transition.counted => info!(
            withdrawal_hash = %event.event.withdrawal_hash,
            game = %game.proxy_address,
            "Wrong claim rejected by its dispute game"
        ),
        outcome => debug!(
            withdrawal_hash = %event.event.withdrawal_hash,
            proof_submitter = %event.event.proof_submitter,
            %outcome,
            "Withdrawal validated"
        ),
    }
}
