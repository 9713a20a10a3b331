// Single-step swap math used by the in-memory ledger's swap loop.
// Exact-input only; fees are in ppm and charged on the input side.

use num_bigint::BigInt;
use num_traits::Zero;

use crate::errors::MathError;
use crate::math::fixed_point::{ceil_div, q96};
use crate::math::tick_math::{amount0_delta, amount1_delta, get_sqrt_ratio_at_tick, MAX_TICK, MIN_TICK};

pub const FEE_DENOMINATOR_PPM: u32 = 1_000_000;

/// Result of moving the price within one liquidity region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapStep {
    pub sqrt_next_x96: BigInt,
    pub amount_in: BigInt,
    pub amount_out: BigInt,
    pub fee: BigInt,
}

/// Furthest sqrt price a swap may reach when no explicit limit is tighter.
pub fn default_limit(zero_for_one: bool) -> Result<BigInt, MathError> {
    if zero_for_one {
        get_sqrt_ratio_at_tick(MIN_TICK + 1)
    } else {
        get_sqrt_ratio_at_tick(MAX_TICK - 1)
    }
}

/// getNextSqrtPriceFromAmount0RoundingUp:
/// sqrtQ = ceil( (L<<96) * sqrtP / ((L<<96) + amountIn * sqrtP) )
pub fn next_sqrt_from_input_zero_for_one(
    liquidity: &BigInt,
    sqrt_p_x96: &BigInt,
    amount_in_net: &BigInt,
) -> BigInt {
    if amount_in_net.is_zero() || liquidity.is_zero() {
        return sqrt_p_x96.clone();
    }
    let numerator1 = liquidity << 96;
    let numerator = &numerator1 * sqrt_p_x96;
    let denominator = &numerator1 + amount_in_net * sqrt_p_x96;
    ceil_div(&numerator, &denominator)
}

/// sqrtQ = P + floor(amountIn * Q96 / L)
pub fn next_sqrt_from_input_one_for_zero(
    liquidity: &BigInt,
    sqrt_p_x96: &BigInt,
    amount_in_net: &BigInt,
) -> BigInt {
    if amount_in_net.is_zero() || liquidity.is_zero() {
        return sqrt_p_x96.clone();
    }
    sqrt_p_x96 + (amount_in_net * q96()) / liquidity
}

/// Move from `sqrt_price_x96` toward `sqrt_target_x96` spending at most
/// `amount_remaining` (gross of fee). With zero liquidity the price jumps to
/// the target for free.
pub fn compute_swap_step(
    sqrt_price_x96: &BigInt,
    sqrt_target_x96: &BigInt,
    liquidity: &BigInt,
    amount_remaining: &BigInt,
    fee_ppm: u32,
) -> Result<SwapStep, MathError> {
    if fee_ppm >= FEE_DENOMINATOR_PPM {
        return Err(MathError::Overflow("compute_swap_step fee"));
    }
    let zero_for_one = sqrt_price_x96 >= sqrt_target_x96;
    let denom = BigInt::from(FEE_DENOMINATOR_PPM);
    let fee_complement = &denom - BigInt::from(fee_ppm);
    let remaining_less_fee = (amount_remaining * &fee_complement) / &denom;

    let amount_in_to_target = if zero_for_one {
        amount0_delta(sqrt_target_x96, sqrt_price_x96, liquidity, true)
    } else {
        amount1_delta(sqrt_price_x96, sqrt_target_x96, liquidity, true)
    };

    let (sqrt_next, amount_in) = if remaining_less_fee >= amount_in_to_target {
        (sqrt_target_x96.clone(), amount_in_to_target)
    } else {
        let q = if zero_for_one {
            next_sqrt_from_input_zero_for_one(liquidity, sqrt_price_x96, &remaining_less_fee)
        } else {
            next_sqrt_from_input_one_for_zero(liquidity, sqrt_price_x96, &remaining_less_fee)
        };
        let used = if zero_for_one {
            amount0_delta(&q, sqrt_price_x96, liquidity, true)
        } else {
            amount1_delta(sqrt_price_x96, &q, liquidity, true)
        };
        (q, used)
    };

    let amount_out = if zero_for_one {
        amount1_delta(&sqrt_next, sqrt_price_x96, liquidity, false)
    } else {
        amount0_delta(sqrt_price_x96, &sqrt_next, liquidity, false)
    };

    // a partial step consumes everything left; the difference is fee
    let fee = if &sqrt_next != sqrt_target_x96 {
        amount_remaining - &amount_in
    } else if fee_ppm == 0 {
        BigInt::zero()
    } else {
        ceil_div(&(&amount_in * BigInt::from(fee_ppm)), &fee_complement)
    };

    Ok(SwapStep { sqrt_next_x96: sqrt_next, amount_in, amount_out, fee })
}
