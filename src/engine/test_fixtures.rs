// Shared unit-test fixtures for the engine modules.

use ethers::types::U256;

use crate::models::AuctionParameters;

/// 1M units over 24 one-hour epochs, selling token0 from tick 6000 down to -6000.
pub fn params_token0() -> AuctionParameters {
    AuctionParameters {
        total_units_to_sell: U256::from(1_000_000u64),
        start_time: 1_000,
        end_time: 1_000 + 86_400,
        start_tick: 6_000,
        end_tick: -6_000,
        epoch_length: 3_600,
        gamma: 600,
        tick_spacing: 60,
        selling_token0: true,
        minimum_proceeds: U256::zero(),
        maximum_proceeds: U256::MAX,
    }
}

/// Mirror image of [`params_token0`]: selling token1 from -6000 up to 6000.
pub fn params_token1() -> AuctionParameters {
    AuctionParameters {
        start_tick: -6_000,
        end_tick: 6_000,
        selling_token0: false,
        ..params_token0()
    }
}
