// Accumulator drift policy for one rebalance.
//
// The three branches are selected from the sale pace since the previous
// rebalance and evaluated independently:
//   NoSales   -> full scheduled drift for every epoch that passed
//   UnderPace -> scheduled drift scaled by the shortfall
//   OverPace  -> pull the curve toward the market tick, never toward a lower sale price

use ethers::types::U256;
use num_bigint::BigInt;

use crate::engine::geometry::reference_tick;
use crate::errors::{AuctionError, AuctionResult, MathError};
use crate::math::fixed_point::{bigint_to_i128, mul_div, u256_to_bigint, wad, WAD};
use crate::models::{AuctionParameters, AuctionState};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DriftPolicy {
    NoSales { epochs_passed: u64 },
    UnderPace { epochs_passed: u64, total_sold: U256, expected: U256 },
    OverPace { market_tick: i32, expected_tick: i32 },
}

impl DriftPolicy {
    pub fn select(
        params: &AuctionParameters,
        state: &AuctionState,
        now: u64,
        market_tick: i32,
        epochs_passed: u64,
    ) -> AuctionResult<Self> {
        // net sold is signed: a buy-back below the last snapshot counts as no sales
        if state.total_units_sold <= state.units_sold_at_last_epoch {
            return Ok(DriftPolicy::NoSales { epochs_passed });
        }

        let expected = params.expected_units_sold(now)?;
        if state.total_units_sold <= expected {
            return Ok(DriftPolicy::UnderPace {
                epochs_passed,
                total_sold: state.total_units_sold,
                expected,
            });
        }

        let tau = reference_tick(params, state.tick_accumulator) as i128;
        let share = params.gamma_share() * params.gamma as i128 / WAD;
        let expected_tick = tau + params.direction() as i128 * share;
        let expected_tick = i32::try_from(expected_tick).map_err(|_| MathError::Overflow("expected_tick"))?;
        Ok(DriftPolicy::OverPace { market_tick, expected_tick })
    }

    /// WAD-scaled change to the tick accumulator.
    pub fn accumulator_delta(&self, params: &AuctionParameters) -> AuctionResult<i128> {
        match self {
            DriftPolicy::NoSales { epochs_passed } => scheduled_drift(params, *epochs_passed),
            DriftPolicy::UnderPace { epochs_passed, total_sold, expected } => {
                if expected.is_zero() {
                    return Err(MathError::DivisionByZero("under-pace expected sales").into());
                }
                let full = scheduled_drift(params, *epochs_passed)?;
                let sold_ratio = mul_div(*total_sold, U256::from(WAD as u128), *expected, "sold ratio")?;
                let shortfall = wad() - u256_to_bigint(sold_ratio);
                Ok(bigint_to_i128(&(BigInt::from(full) * shortfall / wad()), "under-pace drift")?)
            }
            DriftPolicy::OverPace { market_tick, expected_tick } => {
                let delta = (*market_tick as i128 - *expected_tick as i128) * WAD;
                // only ever toward a higher sale price
                Ok(if params.direction() > 0 { delta.max(0) } else { delta.min(0) })
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DriftPolicy::NoSales { .. } => "no_sales",
            DriftPolicy::UnderPace { .. } => "under_pace",
            DriftPolicy::OverPace { .. } => "over_pace",
        }
    }
}

fn scheduled_drift(params: &AuctionParameters, epochs_passed: u64) -> AuctionResult<i128> {
    let epochs = i128::try_from(epochs_passed).map_err(|_| AuctionError::from(MathError::Overflow("epochs_passed")))?;
    params
        .max_tick_delta_per_epoch()
        .checked_mul(epochs)
        .ok_or_else(|| MathError::Overflow("scheduled drift").into())
}
