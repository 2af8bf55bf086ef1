//! Classification of an enriched withdrawal.

use std::fmt;
use withdrawal::{EnrichedWithdrawalEvent, GameStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationOutcome {
    /// Claim matches L2 and the withdrawal exists on L2.
    ValidProof,
    /// Claim matches L2 but the withdrawal was never sent on L2.
    InvalidProofForgeryDetected,
    /// Wrong claim accepted by a game the defender won.
    InvalidProposalForgeryDetected,
    /// Wrong claim in a game that is still running.
    InvalidProposalInProgress,
    /// Wrong claim rejected by the game.
    InvalidProposalCorrectlyResolved,
    /// Game blacklisted by the guardian.
    ProofOnBlacklistedGame,
}

impl ValidationOutcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ValidProof => "VALID_PROOF",
            Self::InvalidProofForgeryDetected => "INVALID_PROOF_FORGERY_DETECTED",
            Self::InvalidProposalForgeryDetected => "INVALID_PROPOSAL_FORGERY_DETECTED",
            Self::InvalidProposalInProgress => "INVALID_PROPOSAL_INPROGRESS",
            Self::InvalidProposalCorrectlyResolved => "INVALID_PROPOSAL_CORRECTLY_RESOLVED",
            Self::ProofOnBlacklistedGame => "PROOF_ON_BLACKLISTED_GAME",
        }
    }

    /// False only for outcomes that must be re-evaluated next cycle.
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::InvalidProposalInProgress)
    }

    pub const fn is_forgery(&self) -> bool {
        matches!(
            self,
            Self::InvalidProofForgeryDetected | Self::InvalidProposalForgeryDetected
        )
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify `event`. Blacklisting wins over everything, then the claim is
/// compared with the trusted output root. Without a trusted root the event
/// stays pending whatever its game status.
pub fn validate(event: &EnrichedWithdrawalEvent) -> ValidationOutcome {
    if event.blacklisted {
        return ValidationOutcome::ProofOnBlacklistedGame;
    }

    if event.expected_root_claim.is_none() {
        return ValidationOutcome::InvalidProposalInProgress;
    }

    if event.root_claim_matches() {
        return if event.withdrawal_hash_present_on_l2 {
            ValidationOutcome::ValidProof
        } else {
            ValidationOutcome::InvalidProofForgeryDetected
        };
    }

    match event.dispute_game.status {
        GameStatus::InProgress => ValidationOutcome::InvalidProposalInProgress,
        GameStatus::DefenderWins => ValidationOutcome::InvalidProposalForgeryDetected,
        GameStatus::ChallengerWins => ValidationOutcome::InvalidProposalCorrectlyResolved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};
    use withdrawal::{DisputeGameData, WithdrawalProvenEvent};

    const CLAIM: B256 = B256::repeat_byte(0xaa);

    fn event(blacklisted: bool, matches: bool, present: bool, status: GameStatus) -> EnrichedWithdrawalEvent {
        let game = DisputeGameData {
            proxy_address: Address::repeat_byte(1),
            root_claim: CLAIM,
            l2_block_number: 100,
            l2_chain_id: 10,
            status,
            created_at: 1,
            resolved_at: 0,
            is_blacklisted: blacklisted,
        };
        let proven = WithdrawalProvenEvent {
            withdrawal_hash: B256::repeat_byte(2),
            proof_submitter: Address::repeat_byte(3),
            block_number: 5,
            tx_hash: B256::repeat_byte(4),
        };
        let mut enriched = EnrichedWithdrawalEvent::new(proven, game);
        enriched.blacklisted = blacklisted;
        enriched.enriched = true;
        enriched.withdrawal_hash_present_on_l2 = present;
        enriched.expected_root_claim = Some(if matches { CLAIM } else { B256::repeat_byte(0xbb) });
        enriched
    }

    const STATUSES: [GameStatus; 3] = [
        GameStatus::InProgress,
        GameStatus::ChallengerWins,
        GameStatus::DefenderWins,
    ];

    #[test]
    fn test_every_combination_has_an_outcome() {
        for blacklisted in [false, true] {
            for matches in [false, true] {
                for status in STATUSES {
                    let outcome = validate(&event(blacklisted, matches, true, status));
                    let expected = match (blacklisted, matches, status) {
                        (true, _, _) => ValidationOutcome::ProofOnBlacklistedGame,
                        (false, true, _) => ValidationOutcome::ValidProof,
                        (false, false, GameStatus::InProgress) => {
                            ValidationOutcome::InvalidProposalInProgress
                        }
                        (false, false, GameStatus::DefenderWins) => {
                            ValidationOutcome::InvalidProposalForgeryDetected
                        }
                        (false, false, GameStatus::ChallengerWins) => {
                            ValidationOutcome::InvalidProposalCorrectlyResolved
                        }
                    };
                    assert_eq!(outcome, expected, "{blacklisted} {matches} {status}");
                }
            }
        }
    }

    #[test]
    fn test_valid_proof() {
        let outcome = validate(&event(false, true, true, GameStatus::DefenderWins));
        assert_eq!(outcome, ValidationOutcome::ValidProof);
        assert!(outcome.is_terminal());
        assert!(!outcome.is_forgery());
    }

    #[test]
    fn test_withdrawal_missing_on_l2_is_forgery() {
        for status in STATUSES {
            let outcome = validate(&event(false, true, false, status));
            assert_eq!(outcome, ValidationOutcome::InvalidProofForgeryDetected);
            assert!(outcome.is_forgery());
        }
    }

    #[test]
    fn test_defender_wins_with_wrong_claim_is_forgery() {
        let outcome = validate(&event(false, false, true, GameStatus::DefenderWins));
        assert_eq!(outcome, ValidationOutcome::InvalidProposalForgeryDetected);
    }

    #[test]
    fn test_challenger_wins_with_wrong_claim_is_benign() {
        let outcome = validate(&event(false, false, false, GameStatus::ChallengerWins));
        assert_eq!(outcome, ValidationOutcome::InvalidProposalCorrectlyResolved);
        assert!(!outcome.is_forgery());
    }

    #[test]
    fn test_in_progress_is_not_terminal() {
        let outcome = validate(&event(false, false, true, GameStatus::InProgress));
        assert_eq!(outcome, ValidationOutcome::InvalidProposalInProgress);
        assert!(!outcome.is_terminal());
    }

    #[test]
    fn test_blacklist_overrides_everything() {
        for matches in [false, true] {
            for present in [false, true] {
                for status in STATUSES {
                    assert_eq!(
                        validate(&event(true, matches, present, status)),
                        ValidationOutcome::ProofOnBlacklistedGame
                    );
                }
            }
        }
    }

    #[test]
    fn test_unknown_trusted_root_is_never_terminal() {
        for present in [false, true] {
            for status in STATUSES {
                let mut pending = event(false, true, present, status);
                pending.expected_root_claim = None;
                let outcome = validate(&pending);
                assert_eq!(outcome, ValidationOutcome::InvalidProposalInProgress, "{status}");
                assert!(!outcome.is_terminal());
            }
        }
    }
}
