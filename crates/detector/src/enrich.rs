//! Enrichment of proven withdrawal events with dispute game and L2 facts.

use crate::cache::DisputeGameCache;
use proxy::{L1Reader, L2Reader, ProxyError};
use tracing::debug;
use withdrawal::{EnrichedWithdrawalEvent, GameStatus, WithdrawalProvenEvent};

/// Resolve the dispute game a proof was submitted against.
///
/// The result is not yet enriched, [`update`] fills in the L2 side.
pub async fn enrich<L1: L1Reader>(
    l1: &L1,
    games: &mut DisputeGameCache,
    event: WithdrawalProvenEvent,
) -> Result<EnrichedWithdrawalEvent, ProxyError> {
    let proof = l1
        .submitted_proof_data(event.withdrawal_hash, event.proof_submitter)
        .await?;
    let game = games.get(l1, proof.dispute_game_proxy).await?;

    Ok(EnrichedWithdrawalEvent::new(event, game))
}

/// Bring `event` up to date with both chains.
///
/// Facts that are confirmed true are never read again, facts that are still
/// false are re-read on every call until the event is resolved. Fails with
/// [`ProxyError::L2Behind`] while the trusted L2 node has not reached the
/// game's block, leaving `event` without an expected root.
pub async fn update<L1: L1Reader, L2: L2Reader>(
    l1: &L1,
    l2: &L2,
    games: &mut DisputeGameCache,
    event: &mut EnrichedWithdrawalEvent,
) -> Result<(), ProxyError> {
    let game = event.dispute_game.proxy_address;

    if event.dispute_game.status == GameStatus::InProgress {
        games.refresh(l1, &mut event.dispute_game).await?;
    }

    if !event.blacklisted || !event.enriched {
        event.blacklisted = l1.is_game_blacklisted(game).await?;
        event.dispute_game.is_blacklisted = event.blacklisted;
        if event.blacklisted {
            games.mark_blacklisted(&game);
        }
    }

    if !event.enriched || event.expected_root_claim.is_none() {
        let l2_block = event.dispute_game.l2_block_number;
        let l2_head = l2.latest_block_height().await?;
        if l2_head < l2_block {
            debug!(
                %game,
                l2_block,
                l2_head,
                "Trusted L2 node has not reached the claimed block"
            );
            return Err(ProxyError::L2Behind {
                block: l2_block,
                head: l2_head,
            });
        }
        let trusted = l2.trusted_output_root_at_block(l2_block).await?;
        event.expected_root_claim = Some(trusted.output_root);
        event.output_root_source = Some(trusted.served_by);
    }

    if !event.withdrawal_hash_present_on_l2 || !event.enriched {
        event.withdrawal_hash_present_on_l2 =
            l2.withdrawal_exists_on_l2(event.event.withdrawal_hash).await?;
    }

    event.enriched = true;
    Ok(())
}
