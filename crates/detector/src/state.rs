//! Cross-cycle incident bookkeeping.
//!
//! [`MonitorState`] is owned by the polling loop. Every cycle produces a
//! [`CycleBatch`] without touching the state, then [`MonitorState::apply`]
//! folds the batch in. A failed cycle therefore leaves the state exactly as
//! it was.

use crate::{scanner::ScanWindow, validate::ValidationOutcome};
use lru::LruCache;
use std::{collections::BTreeMap, fmt, num::NonZeroUsize};
use tracing::{error, info, warn};
use withdrawal::{EnrichedWithdrawalEvent, IncidentKey};

/// Number of benign challenger-wins incidents kept for the audit trail.
pub const SUSPICIOUS_EVENTS_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(capacity) => capacity,
    None => NonZeroUsize::MIN,
};

/// The three incident buckets. An incident is in at most one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Wrong claim in a game that has not resolved yet.
    PotentialAttackOnInProgressGames,
    /// Forgery accepted by the fault proof system. The alert surface.
    PotentialAttackOnDefenderWinsGames,
    /// Audit trail of rejected claims and blacklisted games.
    SuspiciousEventsOnChallengerWinsGames,
}

impl Bucket {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PotentialAttackOnInProgressGames => "potential_attack_on_in_progress_games",
            Self::PotentialAttackOnDefenderWinsGames => "potential_attack_on_defender_wins_games",
            Self::SuspiciousEventsOnChallengerWinsGames => {
                "suspicious_events_on_challenger_wins_games"
            }
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An enriched event together with its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    pub event: EnrichedWithdrawalEvent,
    pub outcome: ValidationOutcome,
}

/// Events of one scanned L1 range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRange {
    pub window: ScanWindow,
    pub events: Vec<Validated>,
}

/// Everything one cycle learned from the chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleBatch {
    pub latest_l1_height: u64,
    pub latest_l2_height: u64,
    /// Open incidents evaluated again.
    pub reevaluated: Vec<Validated>,
    /// Newly scanned events, `None` when the cursor was caught up.
    pub scanned: Option<ScannedRange>,
}

/// What applying one outcome did to the buckets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub outcome: ValidationOutcome,
    /// The event as it now stands.
    pub event: EnrichedWithdrawalEvent,
    /// Entries that left a bucket, including audit trail evictions.
    pub removed: Vec<(Bucket, EnrichedWithdrawalEvent)>,
    /// Bucket the event now sits in.
    pub stored_in: Option<Bucket>,
    /// The event entered `stored_in` during this transition.
    pub newly_stored: bool,
    /// `withdrawals_processed` was incremented.
    pub counted: bool,
}

#[derive(Debug)]
pub struct MonitorState {
    pub initial_l1_height: u64,
    pub next_l1_height: u64,
    pub latest_l1_height: u64,
    pub latest_l2_height: u64,
    pub events_processed: u64,
    pub withdrawals_processed: u64,
    potential_attack_on_in_progress_games: BTreeMap<IncidentKey, EnrichedWithdrawalEvent>,
    potential_attack_on_defender_wins_games: BTreeMap<IncidentKey, EnrichedWithdrawalEvent>,
    suspicious_events_on_challenger_wins_games: LruCache<IncidentKey, EnrichedWithdrawalEvent>,
}

impl MonitorState {
    pub fn new(start_l1_height: u64, latest_l1_height: u64, latest_l2_height: u64) -> Self {
        Self {
            initial_l1_height: start_l1_height,
            next_l1_height: start_l1_height,
            latest_l1_height,
            latest_l2_height,
            events_processed: 0,
            withdrawals_processed: 0,
            potential_attack_on_in_progress_games: BTreeMap::new(),
            potential_attack_on_defender_wins_games: BTreeMap::new(),
            suspicious_events_on_challenger_wins_games: LruCache::new(SUSPICIOUS_EVENTS_CAPACITY),
        }
    }

    pub fn potential_attack_on_in_progress_games(
        &self,
    ) -> impl Iterator<Item = &EnrichedWithdrawalEvent> {
        self.potential_attack_on_in_progress_games.values()
    }

    pub fn potential_attack_on_defender_wins_games(
        &self,
    ) -> impl Iterator<Item = &EnrichedWithdrawalEvent> {
        self.potential_attack_on_defender_wins_games.values()
    }

    /// Most recently inserted first.
    pub fn suspicious_events_on_challenger_wins_games(
        &self,
    ) -> impl Iterator<Item = &EnrichedWithdrawalEvent> {
        self.suspicious_events_on_challenger_wins_games
            .iter()
            .map(|(_, event)| event)
    }

    pub fn bucket_len(&self, bucket: Bucket) -> usize {
        match bucket {
            Bucket::PotentialAttackOnInProgressGames => {
                self.potential_attack_on_in_progress_games.len()
            }
            Bucket::PotentialAttackOnDefenderWinsGames => {
                self.potential_attack_on_defender_wins_games.len()
            }
            Bucket::SuspiciousEventsOnChallengerWinsGames => {
                self.suspicious_events_on_challenger_wins_games.len()
            }
        }
    }

    /// Every bucket holding `key`. At most one by construction.
    pub fn buckets_of(&self, key: &IncidentKey) -> Vec<Bucket> {
        let mut buckets = Vec::new();
        if self.potential_attack_on_in_progress_games.contains_key(key) {
            buckets.push(Bucket::PotentialAttackOnInProgressGames);
        }
        if self.potential_attack_on_defender_wins_games.contains_key(key) {
            buckets.push(Bucket::PotentialAttackOnDefenderWinsGames);
        }
        if self.suspicious_events_on_challenger_wins_games.contains(key) {
            buckets.push(Bucket::SuspiciousEventsOnChallengerWinsGames);
        }
        buckets
    }

    /// Open incidents that must be evaluated again each cycle.
    pub fn open_incidents(&self) -> Vec<EnrichedWithdrawalEvent> {
        self.potential_attack_on_in_progress_games
            .values()
            .chain(self.potential_attack_on_defender_wins_games.values())
            .cloned()
            .collect()
    }

    /// Fold one cycle's findings into the state.
    pub fn apply(&mut self, batch: CycleBatch, now: u64) -> Vec<Transition> {
        self.latest_l1_height = batch.latest_l1_height;
        self.latest_l2_height = batch.latest_l2_height;

        let mut transitions = Vec::with_capacity(batch.reevaluated.len());
        for validated in batch.reevaluated {
            transitions.push(self.apply_outcome(validated.outcome, validated.event, now));
        }

        if let Some(scanned) = batch.scanned {
            for validated in scanned.events {
                self.events_processed += 1;
                transitions.push(self.apply_outcome(validated.outcome, validated.event, now));
            }
            self.next_l1_height = scanned.window.next_cursor();
        }

        transitions
    }

    /// Move one event between buckets according to its outcome.
    ///
    /// An incident in the defender-wins bucket only leaves it when its game
    /// gets blacklisted. Each event is counted in `withdrawals_processed` once,
    /// when it first reaches a terminal outcome.
    pub fn apply_outcome(
        &mut self,
        outcome: ValidationOutcome,
        event: EnrichedWithdrawalEvent,
        now: u64,
    ) -> Transition {
        let key = event.key();
        let already_alerted = self.potential_attack_on_defender_wins_games.contains_key(&key);

        let mut transition = Transition {
            outcome,
            event,
            removed: Vec::new(),
            stored_in: None,
            newly_stored: false,
            counted: false,
        };

        if already_alerted && outcome != ValidationOutcome::ProofOnBlacklistedGame {
            // Stays an alert. Keep the first detection time, refresh the data.
            if let Some(stored) = self.potential_attack_on_defender_wins_games.get_mut(&key) {
                transition.event.processed_at = now;
                transition.event.first_seen_at = stored.first_seen_at;
                *stored = transition.event.clone();
            }
            transition.stored_in = Some(Bucket::PotentialAttackOnDefenderWinsGames);
            return transition;
        }

        match outcome {
            ValidationOutcome::ValidProof => {
                self.take_in_progress(&key, &mut transition);
                self.count(&mut transition);
            }
            ValidationOutcome::InvalidProposalCorrectlyResolved => {
                self.take_in_progress(&key, &mut transition);
                self.count(&mut transition);
                self.store_suspicious(key, &mut transition, now);
            }
            ValidationOutcome::ProofOnBlacklistedGame => {
                self.take_in_progress(&key, &mut transition);
                if let Some(previous) = self.potential_attack_on_defender_wins_games.remove(&key) {
                    transition
                        .removed
                        .push((Bucket::PotentialAttackOnDefenderWinsGames, previous));
                } else {
                    self.count(&mut transition);
                }
                self.store_suspicious(key, &mut transition, now);
            }
            ValidationOutcome::InvalidProposalInProgress => {
                self.take_suspicious(&key, &mut transition);
                let previous = self.potential_attack_on_in_progress_games.get(&key);
                transition.newly_stored = previous.is_none();
                transition.event.processed_at = now;
                transition.event.first_seen_at = previous.map_or(now, |p| p.first_seen_at);
                self.potential_attack_on_in_progress_games
                    .insert(key, transition.event.clone());
                transition.stored_in = Some(Bucket::PotentialAttackOnInProgressGames);
            }
            ValidationOutcome::InvalidProofForgeryDetected
            | ValidationOutcome::InvalidProposalForgeryDetected => {
                self.take_in_progress(&key, &mut transition);
                self.take_suspicious(&key, &mut transition);
                self.count(&mut transition);
                transition.event.processed_at = now;
                transition.event.first_seen_at = now;
                transition.newly_stored = true;
                self.potential_attack_on_defender_wins_games
                    .insert(key, transition.event.clone());
                transition.stored_in = Some(Bucket::PotentialAttackOnDefenderWinsGames);
            }
        }

        transition
    }

    fn count(&mut self, transition: &mut Transition) {
        self.withdrawals_processed += 1;
        transition.counted = true;
    }

    fn take_in_progress(&mut self, key: &IncidentKey, transition: &mut Transition) {
        if let Some(previous) = self.potential_attack_on_in_progress_games.remove(key) {
            transition
                .removed
                .push((Bucket::PotentialAttackOnInProgressGames, previous));
        }
    }

    fn take_suspicious(&mut self, key: &IncidentKey, transition: &mut Transition) {
        if let Some(previous) = self.suspicious_events_on_challenger_wins_games.pop(key) {
            transition
                .removed
                .push((Bucket::SuspiciousEventsOnChallengerWinsGames, previous));
        }
    }

    fn store_suspicious(&mut self, key: IncidentKey, transition: &mut Transition, now: u64) {
        transition.event.processed_at = now;
        transition.event.first_seen_at = now;
        transition.newly_stored = true;
        transition.stored_in = Some(Bucket::SuspiciousEventsOnChallengerWinsGames);
        if let Some((evicted_key, evicted)) = self
            .suspicious_events_on_challenger_wins_games
            .push(key, transition.event.clone())
        {
            if evicted_key != key {
                transition
                    .removed
                    .push((Bucket::SuspiciousEventsOnChallengerWinsGames, evicted));
            }
        }
    }

    /// Share of the range between the initial and latest L1 height already
    /// scanned, in percent.
    pub fn sync_percentage(&self) -> f64 {
        if self.initial_l1_height >= self.latest_l1_height {
            return 100.0;
        }
        let done = self.next_l1_height.saturating_sub(self.initial_l1_height) as f64;
        let total = (self.latest_l1_height - self.initial_l1_height) as f64;
        (done / total * 100.0).min(100.0)
    }

    pub const fn blocks_to_sync(&self) -> u64 {
        self.latest_l1_height.saturating_sub(self.next_l1_height)
    }

    pub fn log_state(&self) {
        info!(
            initial_l1_height = self.initial_l1_height,
            next_l1_height = self.next_l1_height,
            latest_l1_height = self.latest_l1_height,
            latest_l2_height = self.latest_l2_height,
            sync_percentage = %format_args!("{:.2}", self.sync_percentage()),
            blocks_to_sync = self.blocks_to_sync(),
            events_processed = self.events_processed,
            withdrawals_processed = self.withdrawals_processed,
            potential_attack_on_defender_wins_games =
                self.bucket_len(Bucket::PotentialAttackOnDefenderWinsGames),
            potential_attack_on_in_progress_games =
                self.bucket_len(Bucket::PotentialAttackOnInProgressGames),
            suspicious_events_on_challenger_wins_games =
                self.bucket_len(Bucket::SuspiciousEventsOnChallengerWinsGames),
            "Monitor state"
        );

        for event in self.potential_attack_on_defender_wins_games() {
            error!(
                alert = "forgery",
                withdrawal_hash = %event.event.withdrawal_hash,
                proof_submitter = %event.event.proof_submitter,
                game = %event.dispute_game.proxy_address,
                status = %event.dispute_game.status,
                detected_at = event.first_seen_at,
                processed_at = event.processed_at,
                "Open forgery incident"
            );
        }
        for event in self.potential_attack_on_in_progress_games() {
            warn!(
                withdrawal_hash = %event.event.withdrawal_hash,
                proof_submitter = %event.event.proof_submitter,
                game = %event.dispute_game.proxy_address,
                "Withdrawal proven against an in-progress game with a wrong claim"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};
    use withdrawal::{DisputeGameData, GameStatus, WithdrawalProvenEvent};

    fn incident(hash: u8, status: GameStatus) -> EnrichedWithdrawalEvent {
        let proven = WithdrawalProvenEvent {
            withdrawal_hash: B256::repeat_byte(hash),
            proof_submitter: Address::repeat_byte(0x44),
            block_number: 10,
            tx_hash: B256::repeat_byte(0x55),
        };
        let game = DisputeGameData {
            proxy_address: Address::repeat_byte(0x66),
            root_claim: B256::repeat_byte(0x77),
            l2_block_number: 20,
            l2_chain_id: 11155420,
            status,
            created_at: 1,
            resolved_at: 0,
            is_blacklisted: false,
        };
        let mut event = EnrichedWithdrawalEvent::new(proven, game);
        event.enriched = true;
        event
    }

    fn assert_exclusive(state: &MonitorState, key: &IncidentKey) {
        assert!(state.buckets_of(key).len() <= 1, "{:?}", state.buckets_of(key));
    }

    #[test]
    fn test_in_progress_then_challenger_wins_moves_to_audit_trail() {
        let mut state = MonitorState::new(0, 0, 0);
        let event = incident(1, GameStatus::InProgress);
        let key = event.key();

        let first = state.apply_outcome(ValidationOutcome::InvalidProposalInProgress, event, 100);
        assert!(first.newly_stored);
        assert_eq!(state.withdrawals_processed, 0);
        assert_eq!(state.buckets_of(&key), vec![Bucket::PotentialAttackOnInProgressGames]);

        let resolved = incident(1, GameStatus::ChallengerWins);
        let second = state.apply_outcome(
            ValidationOutcome::InvalidProposalCorrectlyResolved,
            resolved,
            200,
        );
        assert!(second.counted);
        assert_eq!(second.removed.len(), 1);
        assert_eq!(state.withdrawals_processed, 1);
        assert_eq!(
            state.buckets_of(&key),
            vec![Bucket::SuspiciousEventsOnChallengerWinsGames]
        );
        let stored = state.suspicious_events_on_challenger_wins_games().next().unwrap();
        assert_eq!(stored.processed_at, 200);
    }

    #[test]
    fn test_reevaluated_in_progress_keeps_first_seen_time() {
        let mut state = MonitorState::new(0, 0, 0);
        let event = incident(1, GameStatus::InProgress);

        state.apply_outcome(ValidationOutcome::InvalidProposalInProgress, event.clone(), 100);
        let again = state.apply_outcome(ValidationOutcome::InvalidProposalInProgress, event, 200);

        assert!(!again.newly_stored);
        assert_eq!(again.event.processed_at, 200);
        assert_eq!(again.event.first_seen_at, 100);
        assert_eq!(state.bucket_len(Bucket::PotentialAttackOnInProgressGames), 1);
    }

    #[test]
    fn test_forgery_is_sticky_until_blacklisted() {
        let mut state = MonitorState::new(0, 0, 0);
        let event = incident(2, GameStatus::DefenderWins);
        let key = event.key();

        state.apply_outcome(
            ValidationOutcome::InvalidProposalForgeryDetected,
            event.clone(),
            100,
        );
        assert_eq!(state.withdrawals_processed, 1);

        let valid = state.apply_outcome(ValidationOutcome::ValidProof, event.clone(), 200);
        assert!(!valid.counted);
        assert_eq!(valid.event.processed_at, 200);
        assert_eq!(valid.event.first_seen_at, 100);
        assert_eq!(valid.stored_in, Some(Bucket::PotentialAttackOnDefenderWinsGames));
        assert_eq!(state.withdrawals_processed, 1);
        assert_eq!(
            state.buckets_of(&key),
            vec![Bucket::PotentialAttackOnDefenderWinsGames]
        );

        let mut blacklisted = event;
        blacklisted.blacklisted = true;
        let removed = state.apply_outcome(ValidationOutcome::ProofOnBlacklistedGame, blacklisted, 300);
        assert!(!removed.counted);
        assert_eq!(state.withdrawals_processed, 1);
        assert_eq!(state.bucket_len(Bucket::PotentialAttackOnDefenderWinsGames), 0);
        assert_eq!(
            state.buckets_of(&key),
            vec![Bucket::SuspiciousEventsOnChallengerWinsGames]
        );
    }

    #[test]
    fn test_forgery_after_audit_entry_stays_exclusive() {
        let mut state = MonitorState::new(0, 0, 0);
        let event = incident(3, GameStatus::ChallengerWins);
        let key = event.key();

        state.apply_outcome(
            ValidationOutcome::InvalidProposalCorrectlyResolved,
            event.clone(),
            1,
        );
        state.apply_outcome(ValidationOutcome::InvalidProofForgeryDetected, event, 2);

        assert_exclusive(&state, &key);
        assert_eq!(
            state.buckets_of(&key),
            vec![Bucket::PotentialAttackOnDefenderWinsGames]
        );
    }

    #[test]
    fn test_every_outcome_sequence_keeps_buckets_exclusive() {
        let outcomes = [
            ValidationOutcome::ValidProof,
            ValidationOutcome::InvalidProofForgeryDetected,
            ValidationOutcome::InvalidProposalForgeryDetected,
            ValidationOutcome::InvalidProposalInProgress,
            ValidationOutcome::InvalidProposalCorrectlyResolved,
            ValidationOutcome::ProofOnBlacklistedGame,
        ];

        for first in outcomes {
            for second in outcomes {
                for third in outcomes {
                    let mut state = MonitorState::new(0, 0, 0);
                    let event = incident(9, GameStatus::InProgress);
                    let key = event.key();
                    for (now, outcome) in [first, second, third].into_iter().enumerate() {
                        state.apply_outcome(outcome, event.clone(), now as u64);
                        assert_exclusive(&state, &key);
                    }
                    assert!(state.withdrawals_processed <= 3);
                }
            }
        }
    }

    #[test]
    fn test_audit_trail_is_bounded() {
        let mut state = MonitorState::new(0, 0, 0);
        let capacity = SUSPICIOUS_EVENTS_CAPACITY.get();

        let mut evictions = 0;
        for i in 0..=capacity {
            let mut event = incident(0, GameStatus::ChallengerWins);
            event.event.withdrawal_hash = B256::from(alloy_primitives::U256::from(i));
            let transition = state.apply_outcome(
                ValidationOutcome::InvalidProposalCorrectlyResolved,
                event,
                i as u64,
            );
            evictions += transition.removed.len();
        }

        assert_eq!(state.bucket_len(Bucket::SuspiciousEventsOnChallengerWinsGames), capacity);
        assert_eq!(evictions, 1);
        assert_eq!(state.withdrawals_processed, capacity as u64 + 1);
    }

    #[test]
    fn test_sync_percentage() {
        let mut state = MonitorState::new(100, 300, 0);
        assert_eq!(state.sync_percentage(), 0.0);
        state.next_l1_height = 200;
        assert_eq!(state.sync_percentage(), 50.0);
        assert_eq!(state.blocks_to_sync(), 100);

        let caught_up = MonitorState::new(300, 300, 0);
        assert_eq!(caught_up.sync_percentage(), 100.0);
    }

    #[test]
    fn test_apply_advances_cursor_and_counts_events() {
        let mut state = MonitorState::new(100, 100, 0);
        let batch = CycleBatch {
            latest_l1_height: 200,
            latest_l2_height: 5000,
            reevaluated: Vec::new(),
            scanned: Some(ScannedRange {
                window: ScanWindow { from: 100, to: 200 },
                events: vec![Validated {
                    event: incident(1, GameStatus::DefenderWins),
                    outcome: ValidationOutcome::ValidProof,
                }],
            }),
        };

        let transitions = state.apply(batch, 0);

        assert_eq!(transitions.len(), 1);
        assert_eq!(state.next_l1_height, 201);
        assert_eq!(state.latest_l1_height, 200);
        assert_eq!(state.latest_l2_height, 5000);
        assert_eq!(state.events_processed, 1);
        assert_eq!(state.withdrawals_processed, 1);
    }
}
