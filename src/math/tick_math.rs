// Tick <-> sqrt price conversions and liquidity/amount math for the slug engine
// ------------------------------------------------------------------------------
// Everything here is exact integer math on BigInt mirroring the Uniswap v3/v4
// libraries (TickMath, SqrtPriceMath, LiquidityAmounts). Sqrt prices are Q64.96.
//
// Notes:
// - Amount helpers take sqrt prices in either order unless stated otherwise; the
//   liquidity helpers reject reversed bounds because a reversed slug is a bug
//   upstream, not something to silently repair.
// - f64 is only used for the human-facing price helpers at the bottom.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::errors::MathError;
use crate::math::fixed_point::{bigint_to_u128, ceil_div, q96};

pub const MIN_TICK: i32 = -887_272;
pub const MAX_TICK: i32 = 887_272;

/// sqrt ratio at MIN_TICK.
pub const MIN_SQRT_RATIO: u128 = 4_295_128_739;

/// sqrt ratio at MAX_TICK (does not fit a u128).
pub fn max_sqrt_ratio() -> BigInt {
    // 1461446703485210103287273052203988822378723970342
    BigInt::from(0xFFFD8963EFD1FC6A506488495D951D52u128) << 32 | BigInt::from(0x63988D26u32)
}

// Q128.128 multipliers for each bit of |tick| (TickMath.getSqrtRatioAtTick).
const TICK_MULTIPLIERS: [(u32, u128); 19] = [
    (0x2, 0xfff97272373d413259a46990580e213a),
    (0x4, 0xfff2e50f5f656932ef12357cf3c7fdcc),
    (0x8, 0xffe5caca7e10e4e61c3624eaa0941cd0),
    (0x10, 0xffcb9843d60f6159c9db58835c926644),
    (0x20, 0xff973b41fa98c081472e6896dfb254c0),
    (0x40, 0xff2ea16466c96a3843ec78b326b52861),
    (0x80, 0xfe5dee046a99a2a811c461f1969c3053),
    (0x100, 0xfcbe86c7900a88aedcffc83b479aa3a4),
    (0x200, 0xf987a7253ac413176f2b074cf7815e54),
    (0x400, 0xf3392b0822b70005940c7a398e4b70f3),
    (0x800, 0xe7159475a2c29b7443b29c7fa6e889d9),
    (0x1000, 0xd097f3bdfd2022b8845ad8f792aa5825),
    (0x2000, 0xa9f746462d870fdf8a65dc1f90e061e5),
    (0x4000, 0x70d869a156d2a1b890bb3df62baf32f7),
    (0x8000, 0x31be135f97d08fd981231505542fcfa6),
    (0x10000, 0x9aa508b5b7a84e1c677de54f3e99bc9),
    (0x20000, 0x5d6af8dedb81196699c329225ee604),
    (0x40000, 0x2216e584f5fa1ea926041bedfe98),
    (0x80000, 0x48a170391f7dc42444e8fa2),
];

// -------------------------------- Tick Math --------------------------------

/// Exact TickMath.getSqrtRatioAtTick (Q64.96 integer).
pub fn get_sqrt_ratio_at_tick(tick: i32) -> Result<BigInt, MathError> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(MathError::TickOutOfRange(tick));
    }
    let abs_tick = tick.unsigned_abs();

    // ratio is Q128.128
    let mut ratio = if abs_tick & 0x1 != 0 {
        BigInt::from(0xfffcb933bd6fad37aa2d162d1a594001u128)
    } else {
        BigInt::one() << 128
    };
    for (bit, multiplier) in TICK_MULTIPLIERS {
        if abs_tick & bit != 0 {
            ratio = (&ratio * BigInt::from(multiplier)) >> 128;
        }
    }

    if tick > 0 {
        let max = (BigInt::one() << 256) - 1;
        ratio = max / ratio;
    }
    // round-up shift by 32 (Q128.128 -> Q64.96)
    Ok((&ratio + ((BigInt::one() << 32) - 1)) >> 32)
}

/// Greatest tick whose sqrt ratio is <= `sqrt_price_x96` (binary search, exact on-grid).
pub fn get_tick_at_sqrt_ratio(sqrt_price_x96: &BigInt) -> Result<i32, MathError> {
    if *sqrt_price_x96 < BigInt::from(MIN_SQRT_RATIO) || *sqrt_price_x96 >= max_sqrt_ratio() {
        return Err(MathError::SqrtRatioOutOfRange(sqrt_price_x96.to_string()));
    }
    let mut lo = MIN_TICK;
    let mut hi = MAX_TICK;
    while lo < hi {
        let mid = lo + ((hi - lo + 1) / 2);
        if get_sqrt_ratio_at_tick(mid)? <= *sqrt_price_x96 {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    Ok(lo)
}

/// Lowest and highest ticks usable on a grid with the given spacing.
pub fn usable_tick_bounds(tick_spacing: i32) -> (i32, i32) {
    let lo = -(Integer::div_floor(&-MIN_TICK, &tick_spacing) * tick_spacing);
    let hi = Integer::div_floor(&MAX_TICK, &tick_spacing) * tick_spacing;
    (lo, hi)
}

/// Snap a tick onto the spacing grid, rounding toward the lower price of the
/// asset being sold: down when selling token0, up when selling token1.
pub fn align_tick(tick: i32, tick_spacing: i32, selling_token0: bool) -> i32 {
    if selling_token0 {
        Integer::div_floor(&tick, &tick_spacing) * tick_spacing
    } else {
        -(Integer::div_floor(&-tick, &tick_spacing) * tick_spacing)
    }
}

/// sqrt(amount1 / amount0) in Q64.96, i.e. the sqrt price at which `amount0`
/// of token0 trades for `amount1` of token1. Clamped to the valid ratio range.
pub fn sqrt_ratio_from_amounts(amount1: &BigInt, amount0: &BigInt) -> Result<BigInt, MathError> {
    if amount0.is_zero() {
        return Err(MathError::DivisionByZero("sqrt_ratio_from_amounts"));
    }
    if amount1.is_negative() || amount0.is_negative() {
        return Err(MathError::InvalidPrice(format!("{} / {}", amount1, amount0)));
    }
    let ratio_x192: BigInt = (amount1 << 192) / amount0;
    let sqrt = ratio_x192.sqrt();
    let min = BigInt::from(MIN_SQRT_RATIO);
    let max = max_sqrt_ratio() - 1;
    Ok(if sqrt < min { min } else if sqrt > max { max } else { sqrt })
}

// --------------------------- SqrtPriceMath deltas ---------------------------

fn sorted(a: &BigInt, b: &BigInt) -> (BigInt, BigInt) {
    if a < b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) }
}

/// Uniswap-exact rounding:
/// amount0 =
///   if round_up:
///     ceil( ceil( (L << 96) * (sb - sa) / sb ) / sa )
///   else:
///     floor( floor( (L << 96) * (sb - sa) / sb ) / sa )
pub fn amount0_delta(
    sqrt_ratio_a_x96: &BigInt,
    sqrt_ratio_b_x96: &BigInt,
    liquidity: &BigInt,
    round_up: bool,
) -> BigInt {
    if liquidity.is_zero() { return BigInt::zero(); }
    let (sa, sb) = sorted(sqrt_ratio_a_x96, sqrt_ratio_b_x96);
    if sa.is_zero() || sa == sb { return BigInt::zero(); }

    let numerator1 = liquidity << 96;
    let numerator2 = &sb - &sa;

    if round_up {
        let t = ceil_div(&(&numerator1 * &numerator2), &sb);
        ceil_div(&t, &sa)
    } else {
        ((&numerator1 * &numerator2) / &sb) / &sa
    }
}

/// Uniswap-exact rounding:
/// amount1 =
///   if round_up: ceil( L * (sb - sa) / Q96 )
///   else:       floor( L * (sb - sa) / Q96 )
pub fn amount1_delta(
    sqrt_ratio_a_x96: &BigInt,
    sqrt_ratio_b_x96: &BigInt,
    liquidity: &BigInt,
    round_up: bool,
) -> BigInt {
    if liquidity.is_zero() { return BigInt::zero(); }
    let (sa, sb) = sorted(sqrt_ratio_a_x96, sqrt_ratio_b_x96);
    if sa == sb { return BigInt::zero(); }

    let num = liquidity * (sb - sa);
    if round_up {
        ceil_div(&num, &q96())
    } else {
        num / q96()
    }
}

/// Token amounts a position of `liquidity` over [sa, sb] represents at price `sp`.
pub fn amounts_for_liquidity(
    sqrt_price_x96: &BigInt,
    sqrt_lower_x96: &BigInt,
    sqrt_upper_x96: &BigInt,
    liquidity: u128,
    round_up: bool,
) -> (BigInt, BigInt) {
    let l = BigInt::from(liquidity);
    let (sa, sb) = sorted(sqrt_lower_x96, sqrt_upper_x96);
    if sqrt_price_x96 <= &sa {
        (amount0_delta(&sa, &sb, &l, round_up), BigInt::zero())
    } else if sqrt_price_x96 < &sb {
        (
            amount0_delta(sqrt_price_x96, &sb, &l, round_up),
            amount1_delta(&sa, sqrt_price_x96, &l, round_up),
        )
    } else {
        (BigInt::zero(), amount1_delta(&sa, &sb, &l, round_up))
    }
}

// ----------------------------- LiquidityAmounts -----------------------------

fn check_bounds(sa: &BigInt, sb: &BigInt) -> Result<(), MathError> {
    if sa > sb {
        return Err(MathError::ReversedBounds { lower: sa.to_string(), upper: sb.to_string() });
    }
    Ok(())
}

/// L = amount0 * (sa * sb / Q96) / (sb - sa)
pub fn liquidity_for_amount0(sa: &BigInt, sb: &BigInt, amount0: &BigInt) -> Result<u128, MathError> {
    check_bounds(sa, sb)?;
    if sa == sb || amount0.is_zero() {
        return Ok(0);
    }
    let intermediate = (sa * sb) / q96();
    bigint_to_u128(&((amount0 * intermediate) / (sb - sa)), "liquidity_for_amount0")
}

/// L = amount1 * Q96 / (sb - sa)
pub fn liquidity_for_amount1(sa: &BigInt, sb: &BigInt, amount1: &BigInt) -> Result<u128, MathError> {
    check_bounds(sa, sb)?;
    if sa == sb || amount1.is_zero() {
        return Ok(0);
    }
    bigint_to_u128(&((amount1 * q96()) / (sb - sa)), "liquidity_for_amount1")
}

/// Maximal liquidity over [sa, sb] whose deposit at price `sp` consumes at most
/// `amount0` and `amount1`. Zero for a degenerate range.
pub fn liquidity_for_range(
    sqrt_price_x96: &BigInt,
    sa: &BigInt,
    sb: &BigInt,
    amount0: &BigInt,
    amount1: &BigInt,
) -> Result<u128, MathError> {
    check_bounds(sa, sb)?;
    if sa == sb {
        return Ok(0);
    }
    if sqrt_price_x96 <= sa {
        liquidity_for_amount0(sa, sb, amount0)
    } else if sqrt_price_x96 < sb {
        let l0 = liquidity_for_amount0(sqrt_price_x96, sb, amount0)?;
        let l1 = liquidity_for_amount1(sa, sqrt_price_x96, amount1)?;
        Ok(l0.min(l1))
    } else {
        liquidity_for_amount1(sa, sb, amount1)
    }
}

// ------------------------------ Human prices --------------------------------

/// 1.0001^tick as f64, derived from the exact sqrt ratio.
pub fn price_coord_to_ratio(tick: i32) -> Result<f64, MathError> {
    price_from_tick(tick, 0, 0)
}

/// Greatest tick whose price 1.0001^tick does not exceed `ratio`.
pub fn ratio_to_price_coord(ratio: f64) -> Result<i32, MathError> {
    tick_from_price(ratio, 0, 0)
}

pub fn tick_from_price(price_1_for_0: f64, dec0: u8, dec1: u8) -> Result<i32, MathError> {
    // price_1_for_0 is the human price: token1 per 1 token0
    if !price_1_for_0.is_finite() || price_1_for_0 <= 0.0 {
        return Err(MathError::InvalidPrice(price_1_for_0.to_string()));
    }
    let price_raw = price_1_for_0 * 10f64.powi(dec1 as i32 - dec0 as i32);
    if !price_raw.is_finite() || price_raw <= 0.0 {
        return Err(MathError::InvalidPrice(price_1_for_0.to_string()));
    }
    let mut t = ((price_raw.ln() / 1.0001f64.ln()).floor() as i32).clamp(MIN_TICK, MAX_TICK);
    // floating point can land one tick off on exact grid points
    if t < MAX_TICK && price_from_tick(t + 1, 0, 0)? <= price_raw {
        t += 1;
    } else if t > MIN_TICK && price_from_tick(t, 0, 0)? > price_raw {
        t -= 1;
    }
    Ok(t)
}

pub fn price_from_tick(tick: i32, dec0: u8, dec1: u8) -> Result<f64, MathError> {
    // returns the human price: token1 per 1 token0
    let sqrt = get_sqrt_ratio_at_tick(tick)?;
    let s = sqrt.to_f64().unwrap_or(0.0) / ((1u128 << 96) as f64);
    Ok(s * s * 10f64.powi(dec0 as i32 - dec1 as i32))
}

// ------------------------------- Minimal tests -------------------------------
