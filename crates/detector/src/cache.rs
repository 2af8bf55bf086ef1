//! Bounded cache of dispute game facts.

use alloy_primitives::Address;
use lru::LruCache;
use proxy::{L1Reader, ProxyError};
use std::num::NonZeroUsize;
use tracing::debug;
use withdrawal::DisputeGameData;

/// Default number of dispute games kept in memory.
pub const DEFAULT_GAME_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(capacity) => capacity,
    None => NonZeroUsize::MIN,
};

/// Dispute games keyed by proxy address.
///
/// A game's static facts are read once on the first miss. Its resolution is
/// re-read by [`DisputeGameCache::refresh`] only while the game is in progress,
/// a resolved game is never queried again.
pub struct DisputeGameCache {
    games: LruCache<Address, DisputeGameData>,
}

impl Default for DisputeGameCache {
    fn default() -> Self {
        Self::new(DEFAULT_GAME_CACHE_CAPACITY)
    }
}

impl DisputeGameCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            games: LruCache::new(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn contains(&self, game: &Address) -> bool {
        self.games.contains(game)
    }

    /// Cached facts of `game`, reading them from L1 on a miss.
    pub async fn get<L1: L1Reader>(
        &mut self,
        l1: &L1,
        game: Address,
    ) -> Result<DisputeGameData, ProxyError> {
        if let Some(data) = self.games.get(&game) {
            return Ok(data.clone());
        }

        let facts = l1.dispute_game_static_facts(game).await?;
        let resolution = l1.dispute_game_resolution(game).await?;
        let data = DisputeGameData::new(facts, resolution);
        debug!(
            %game,
            status = %data.status,
            l2_block = data.l2_block_number,
            "Cached dispute game"
        );

        self.games.put(game, data.clone());
        Ok(data)
    }

    /// Re-read the resolution of an in-progress game, updating both `entry`
    /// and the cached copy. No-op once the game is resolved.
    pub async fn refresh<L1: L1Reader>(
        &mut self,
        l1: &L1,
        entry: &mut DisputeGameData,
    ) -> Result<(), ProxyError> {
        if entry.status.is_resolved() {
            return Ok(());
        }

        let resolution = l1.dispute_game_resolution(entry.proxy_address).await?;
        entry.apply_resolution(resolution);
        if let Some(cached) = self.games.peek_mut(&entry.proxy_address) {
            cached.apply_resolution(resolution);
        }

        if resolution.status.is_resolved() {
            debug!(
                game = %entry.proxy_address,
                status = %resolution.status,
                resolved_at = resolution.resolved_at,
                "Dispute game resolved"
            );
        }
        Ok(())
    }

    /// Record that the portal blacklisted `game`.
    pub fn mark_blacklisted(&mut self, game: &Address) {
        if let Some(cached) = self.games.peek_mut(game) {
            cached.is_blacklisted = true;
        }
    }
}
