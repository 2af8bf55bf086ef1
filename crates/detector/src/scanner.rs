//! L1 block cursor arithmetic and start height discovery.

use config::StartBlock;
use proxy::{L1Reader, ProxyError};
use tracing::{debug, error, info};

/// Stop searching once a block this close to the target time is found.
pub const ACCEPTABLE_TIME_DIFF_SECS: u64 = 3600;

/// A start block further than this from the target time is reported.
pub const MAX_TIME_DIFF_SECS: u64 = 30 * 60;

/// Inclusive L1 block range fetched in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub from: u64,
    pub to: u64,
}

impl ScanWindow {
    /// Next range to scan, or `None` when the cursor has caught up.
    ///
    /// The range ends at `min(next + max_block_range, latest)` and is empty
    /// unless that stop is strictly above `next`.
    pub fn next(next_l1_height: u64, latest_l1_height: u64, max_block_range: u64) -> Option<Self> {
        let stop = next_l1_height
            .saturating_add(max_block_range)
            .min(latest_l1_height);
        (stop > next_l1_height).then_some(Self {
            from: next_l1_height,
            to: stop,
        })
    }

    /// Cursor value once this window is fully processed.
    pub const fn next_cursor(&self) -> u64 {
        self.to.saturating_add(1)
    }

    pub const fn blocks(&self) -> u64 {
        self.to - self.from + 1
    }
}

/// Resolve the configured start block against the current L1 head.
///
/// The result never exceeds `latest_l1_height`.
pub async fn resolve_start_height<L1: L1Reader>(
    l1: &L1,
    start: StartBlock,
    hours_ago: u64,
    latest_l1_height: u64,
    now: u64,
) -> Result<u64, ProxyError> {
    let height = match start {
        StartBlock::Height(height) => height,
        StartBlock::Latest => latest_l1_height,
        StartBlock::Unset => {
            let target = now.saturating_sub(hours_ago.saturating_mul(3600));
            block_near_timestamp(l1, latest_l1_height, target).await?
        }
    };

    if height > latest_l1_height {
        info!(
            start_height = height,
            latest_l1_height, "Start height is above the L1 head, starting from latest"
        );
        return Ok(latest_l1_height);
    }
    Ok(height)
}

/// Binary search for the block whose timestamp is closest to `target`.
pub async fn block_near_timestamp<L1: L1Reader>(
    l1: &L1,
    latest: u64,
    target: u64,
) -> Result<u64, ProxyError> {
    let mut left = 0u64;
    let mut right = latest;
    let mut best = latest;
    let mut best_diff = u64::MAX;
    let mut iterations = 0u32;

    while left <= right {
        iterations += 1;
        let mid = left + (right - left) / 2;
        let timestamp = l1.block_timestamp(mid).await?;
        let diff = timestamp.abs_diff(target);
        debug!(left, right, mid, timestamp, diff, "Start block search step");

        if diff < best_diff {
            best = mid;
            best_diff = diff;
            if diff <= ACCEPTABLE_TIME_DIFF_SECS {
                break;
            }
        }

        if timestamp < target {
            left = mid + 1;
        } else if mid == 0 {
            break;
        } else {
            right = mid - 1;
        }
    }

    info!(
        block = best,
        target_timestamp = target,
        diff_secs = best_diff,
        iterations,
        "Found start block"
    );
    if best_diff > MAX_TIME_DIFF_SECS {
        error!(
            block = best,
            diff_secs = best_diff,
            max_diff_secs = MAX_TIME_DIFF_SECS,
            "Start block is far from the requested time"
        );
    }

    Ok(best)
}
