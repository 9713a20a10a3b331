// Schedule math over validated AuctionParameters: epochs, expected sales,
// per-epoch drift and the normalized clock. All ratios are WAD (1e18).

use ethers::types::U256;

use crate::errors::{AuctionError, AuctionResult, MathError};
use crate::math::fixed_point::{mul_div, WAD};
use crate::models::{AuctionParameters, AuctionPhase, AuctionState};

impl AuctionParameters {
    pub fn window(&self) -> u64 {
        self.end_time - self.start_time
    }

    pub fn total_epochs(&self) -> u64 {
        self.window() / self.epoch_length
    }

    /// floor((now - start) / epoch_length) + 1
    pub fn current_epoch(&self, now: u64) -> AuctionResult<u64> {
        if now < self.start_time {
            return Err(AuctionError::BeforeStart { now, start: self.start_time });
        }
        Ok((now - self.start_time) / self.epoch_length + 1)
    }

    /// total * clamp(elapsed / window, 0, 1) as one mul-div, so the ends are exact.
    pub fn expected_units_sold(&self, now: u64) -> AuctionResult<U256> {
        let elapsed = now.saturating_sub(self.start_time).min(self.window());
        Ok(mul_div(
            self.total_units_to_sell,
            U256::from(elapsed),
            U256::from(self.window()),
            "expected_units_sold",
        )?)
    }

    /// (end_tick - start_tick) / total_epochs, WAD scaled. Signed toward the end price.
    pub fn max_tick_delta_per_epoch(&self) -> i128 {
        (self.end_tick as i128 - self.start_tick as i128) * WAD / self.total_epochs() as i128
    }

    /// epoch_length / window, WAD scaled.
    pub fn gamma_share(&self) -> i128 {
        self.epoch_length as i128 * WAD / self.window() as i128
    }

    /// Elapsed fraction of the window at `ts`, WAD scaled and clamped to [0, 1].
    pub fn normalized_time_elapsed(&self, ts: u64) -> i128 {
        let elapsed = ts.saturating_sub(self.start_time).min(self.window());
        elapsed as i128 * WAD / self.window() as i128
    }

    /// End of `epoch` plus `offset` more epochs, clamped to end_time.
    pub fn epoch_end_time(&self, epoch: u64, offset: u64) -> AuctionResult<u64> {
        let span = epoch
            .checked_add(offset)
            .and_then(|n| n.checked_mul(self.epoch_length))
            .ok_or(MathError::Overflow("epoch_end_time"))?;
        Ok(self.start_time.saturating_add(span).min(self.end_time))
    }

    pub fn phase(&self, now: u64, state: &AuctionState) -> AuctionPhase {
        if now < self.start_time {
            AuctionPhase::Dormant
        } else if now >= self.end_time || state.early_exit {
            AuctionPhase::Closed
        } else if (now - self.start_time) / self.epoch_length + 1 <= state.last_epoch {
            AuctionPhase::Rebalanced
        } else {
            AuctionPhase::Active
        }
    }

    /// Closed and either stopped early or raised at least the minimum.
    pub fn migration_ready(&self, now: u64, state: &AuctionState) -> bool {
        self.phase(now, state) == AuctionPhase::Closed
            && (state.early_exit || state.total_proceeds >= self.minimum_proceeds)
    }
}
