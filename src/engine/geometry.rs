// Slug geometry: where the three ranges sit and how much liquidity each holds.
//
// All placement is expressed in "sale direction" (dir = +1 selling token0,
// -1 selling token1) so one code path serves both sides:
//
//   cheap <----------------------------------------------------------> dear
//   [lower slug ........ target][upper slug ..... far][discovery .... band far]
//
// The band is [R, R + dir*gamma] where R is the aligned reference tick from the
// drift accumulator. The pool price is moved to `target` before slugs are added,
// so the lower slug holds only numeraire and the other two only the asset.

use ethers::types::U256;
use num_bigint::BigInt;
use num_traits::Zero;

use crate::errors::{AuctionError, AuctionResult};
use crate::math::fixed_point::{bigint_to_u256, u256_to_bigint, WAD};
use crate::math::tick_math::{
    align_tick, amount0_delta, amount1_delta, get_sqrt_ratio_at_tick, get_tick_at_sqrt_ratio,
    liquidity_for_amount0, liquidity_for_amount1, sqrt_ratio_from_amounts, usable_tick_bounds,
};
use crate::models::{AuctionParameters, Slug, SlugKind, SlugSet};

/// Snapshot the geometry is computed from.
#[derive(Clone, Debug)]
pub struct GeometryInput<'a> {
    pub params: &'a AuctionParameters,
    pub epoch: u64,
    pub tick_accumulator: i128,
    pub total_units_sold: U256,
    pub total_proceeds: U256,
    pub market_tick: i32,
    pub asset_available: U256,
    pub numeraire_available: U256,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub reference_tick: i32,
    pub band_far_tick: i32,
    pub target_tick: i32,
    pub slugs: SlugSet,
    pub asset_required: U256,
    pub numeraire_required: U256,
}

/// align(start_tick + accumulator / 1e18), kept between the end price and the
/// edge of the tick range so the whole band (plus a lower gap) stays valid.
pub fn reference_tick(params: &AuctionParameters, tick_accumulator: i128) -> i32 {
    let dir = params.direction() as i128;
    let s = params.tick_spacing as i128;
    let gamma = params.gamma as i128;
    let (lo, hi) = usable_tick_bounds(params.tick_spacing);
    let (lo, hi) = (lo as i128, hi as i128);

    let mut raw = params.start_tick as i128 + tick_accumulator / WAD;
    // drift stops at the end price
    raw = if dir > 0 { raw.max(params.end_tick as i128) } else { raw.min(params.end_tick as i128) };
    raw = if dir > 0 { raw.clamp(lo + s, hi - gamma) } else { raw.clamp(lo + gamma, hi - s) };

    align_tick(raw as i32, params.tick_spacing, params.selling_token0)
}

/// Clamp `tick` between `cheap` and `dear` in sale direction.
fn clamp_dir(tick: i32, cheap: i32, dear: i32, dir: i32) -> i32 {
    if dir > 0 { tick.clamp(cheap, dear) } else { tick.clamp(dear, cheap) }
}

fn sqrt_pair(a: i32, b: i32) -> AuctionResult<(BigInt, BigInt)> {
    Ok((get_sqrt_ratio_at_tick(a.min(b))?, get_sqrt_ratio_at_tick(a.max(b))?))
}

/// Decrement `liquidity` until the rounded-up requirement fits `budget`.
fn fit_to_budget(
    kind: SlugKind,
    range: (i32, i32),
    mut liquidity: u128,
    budget: &BigInt,
    need: impl Fn(u128) -> AuctionResult<BigInt>,
) -> AuctionResult<(u128, BigInt)> {
    for _ in 0..8 {
        let required = need(liquidity)?;
        if &required <= budget || liquidity == 0 {
            return Ok((liquidity, required));
        }
        liquidity -= 1;
    }
    Err(AuctionError::InvalidSlug { kind: kind.name(), lower: range.0, upper: range.1, liquidity })
}

pub fn compute_slugs(input: &GeometryInput<'_>) -> AuctionResult<Geometry> {
    let p = input.params;
    let dir = p.direction();
    let s = p.tick_spacing;
    let selling0 = p.selling_token0;
    let (lo, hi) = usable_tick_bounds(s);

    let reference = reference_tick(p, input.tick_accumulator);
    let band_far = reference + dir * p.gamma;
    let target = clamp_dir(align_tick(input.market_tick, s, selling0), reference, band_far, dir);

    let asset_budget = u256_to_bigint(input.asset_available);
    let sold = u256_to_bigint(input.total_units_sold);
    let proceeds = u256_to_bigint(input.total_proceeds);

    // ------------------------------- lower slug -------------------------------
    let lower_cheap = if target == reference { reference - dir * s } else { reference };
    let numeraire_budget = proceeds.clone().min(u256_to_bigint(input.numeraire_available));

    let (lower, numeraire_required) = if sold.is_zero() || proceeds.is_zero() {
        (Slug::between(SlugKind::Lower, lower_cheap, target, 0), BigInt::zero())
    } else {
        let (sa, sb) = sqrt_pair(lower_cheap, target)?;
        // numeraire needed to buy back everything sold across [lower_cheap, target]
        let required_proceeds = if selling0 {
            let l = BigInt::from(liquidity_for_amount0(&sa, &sb, &sold)?);
            amount1_delta(&sa, &sb, &l, true)
        } else {
            let l = BigInt::from(liquidity_for_amount1(&sa, &sb, &sold)?);
            amount0_delta(&sa, &sb, &l, true)
        };

        let (cheap, dear) = if required_proceeds > proceeds {
            // not enough to back the full range: one spacing at the break-even price
            let be_sqrt = if selling0 {
                sqrt_ratio_from_amounts(&proceeds, &sold)?
            } else {
                sqrt_ratio_from_amounts(&sold, &proceeds)?
            };
            let be = align_tick(get_tick_at_sqrt_ratio(&be_sqrt)?, s, selling0);
            let be = if dir > 0 { be.max(lo) } else { be.min(hi) };
            let cheap = if dir * (be + dir * s) > dir * target { target - dir * s } else { be };
            (cheap, cheap + dir * s)
        } else {
            (lower_cheap, target)
        };
        log::debug!(
            "lower slug: required proceeds {} vs {} held, range {}..{}",
            required_proceeds, proceeds, cheap, dear
        );

        let (sa, sb) = sqrt_pair(cheap, dear)?;
        let raw = if selling0 {
            liquidity_for_amount1(&sa, &sb, &numeraire_budget)?
        } else {
            liquidity_for_amount0(&sa, &sb, &numeraire_budget)?
        };
        let (l, need) = fit_to_budget(SlugKind::Lower, (cheap, dear), raw, &numeraire_budget, |l| {
            let l = BigInt::from(l);
            Ok(if selling0 { amount1_delta(&sa, &sb, &l, true) } else { amount0_delta(&sa, &sb, &l, true) })
        })?;
        (Slug::between(SlugKind::Lower, cheap, dear, l), need)
    };

    // ------------------------------- upper slug -------------------------------
    let share_ticks = (p.gamma_share() * p.gamma as i128 / WAD) as i32 / s * s;
    let width = share_ticks.max(s);
    let upper_far = clamp_dir(target + dir * width, target, if dir > 0 { hi } else { lo }, dir);

    let epoch_end = p.epoch_end_time(input.epoch, 0)?;
    let next_epoch_end = p.epoch_end_time(input.epoch, 1)?;
    let expected_by_end = u256_to_bigint(p.expected_units_sold(epoch_end)?);

    let asset_for = |a: i32, b: i32, l: u128| -> AuctionResult<BigInt> {
        let (sa, sb) = sqrt_pair(a, b)?;
        let l = BigInt::from(l);
        Ok(if selling0 { amount0_delta(&sa, &sb, &l, true) } else { amount1_delta(&sa, &sb, &l, true) })
    };
    let liquidity_for_asset = |a: i32, b: i32, amount: &BigInt| -> AuctionResult<u128> {
        let (sa, sb) = sqrt_pair(a, b)?;
        Ok(if selling0 { liquidity_for_amount0(&sa, &sb, amount)? } else { liquidity_for_amount1(&sa, &sb, amount)? })
    };

    let upper_amount = if expected_by_end > sold {
        (&expected_by_end - &sold).min(asset_budget.clone())
    } else {
        BigInt::zero()
    };
    let (upper, upper_required) = if upper_amount.is_zero() {
        (Slug::empty_at(SlugKind::Upper, target), BigInt::zero())
    } else {
        let raw = liquidity_for_asset(target, upper_far, &upper_amount)?;
        let (l, need) =
            fit_to_budget(SlugKind::Upper, (target, upper_far), raw, &upper_amount, |l| asset_for(target, upper_far, l))?;
        (Slug::between(SlugKind::Upper, target, upper_far, l), need)
    };

    // ----------------------------- discovery slug -----------------------------
    let disc_cheap = upper.dear_edge(dir);
    let remaining = &asset_budget - &upper_required;
    let share = p.normalized_time_elapsed(next_epoch_end) - p.normalized_time_elapsed(epoch_end);
    let (discovery, discovery_required) = if next_epoch_end == epoch_end || dir * (band_far - disc_cheap) <= 0 {
        (Slug::empty_at(SlugKind::Discovery, disc_cheap), BigInt::zero())
    } else {
        let amount = (u256_to_bigint(p.total_units_to_sell) * BigInt::from(share) / BigInt::from(WAD)).min(remaining.clone());
        if amount <= BigInt::zero() {
            (Slug::between(SlugKind::Discovery, disc_cheap, band_far, 0), BigInt::zero())
        } else {
            let raw = liquidity_for_asset(disc_cheap, band_far, &amount)?;
            let (l, need) = fit_to_budget(SlugKind::Discovery, (disc_cheap, band_far), raw, &amount, |l| {
                asset_for(disc_cheap, band_far, l)
            })?;
            (Slug::between(SlugKind::Discovery, disc_cheap, band_far, l), need)
        }
    };

    let slugs = SlugSet { lower, upper, discovery };
    let asset_required = &upper_required + &discovery_required;
    validate_slugs(p, &slugs)?;

    if asset_required > asset_budget {
        return Err(AuctionError::InsufficientInventory {
            what: "asset",
            needed: asset_required.to_string(),
            available: input.asset_available.to_string(),
        });
    }
    if numeraire_required > u256_to_bigint(input.numeraire_available) {
        return Err(AuctionError::InsufficientInventory {
            what: "numeraire",
            needed: numeraire_required.to_string(),
            available: input.numeraire_available.to_string(),
        });
    }

    log::debug!(
        "geometry epoch {}: R={} band_far={} target={} slugs={:?}",
        input.epoch, reference, band_far, target, slugs
    );

    Ok(Geometry {
        reference_tick: reference,
        band_far_tick: band_far,
        target_tick: target,
        slugs,
        asset_required: bigint_to_u256(&asset_required, "asset_required")?,
        numeraire_required: bigint_to_u256(&numeraire_required, "numeraire_required")?,
    })
}

/// Each slug is well formed and the three are ordered cheap to dear without overlap.
pub fn validate_slugs(params: &AuctionParameters, slugs: &SlugSet) -> AuctionResult<()> {
    let dir = params.direction();
    let (lo, hi) = usable_tick_bounds(params.tick_spacing);
    for slug in slugs.iter() {
        let bad = slug.tick_lower > slug.tick_upper
            || (slug.liquidity > 0 && slug.tick_lower == slug.tick_upper)
            || slug.tick_lower < lo
            || slug.tick_upper > hi
            || slug.tick_lower % params.tick_spacing != 0
            || slug.tick_upper % params.tick_spacing != 0;
        if bad {
            return Err(AuctionError::InvalidSlug {
                kind: slug.kind.name(),
                lower: slug.tick_lower,
                upper: slug.tick_upper,
                liquidity: slug.liquidity,
            });
        }
    }

    let chain = [
        slugs.lower.dear_edge(dir),
        slugs.upper.cheap_edge(dir),
        slugs.upper.dear_edge(dir),
        slugs.discovery.cheap_edge(dir),
        slugs.discovery.dear_edge(dir),
    ];
    if chain.windows(2).any(|w| dir * w[0] > dir * w[1])
        || dir * slugs.lower.cheap_edge(dir) > dir * slugs.lower.dear_edge(dir)
    {
        return Err(AuctionError::SlugOrder(format!(
            "lower {:?} upper {:?} discovery {:?}",
            (slugs.lower.tick_lower, slugs.lower.tick_upper),
            (slugs.upper.tick_lower, slugs.upper.tick_upper),
            (slugs.discovery.tick_lower, slugs.discovery.tick_upper),
        )));
    }
    Ok(())
}
