// Epoch rebalancer
// ----------------
// Two halves, kept apart so the plan can be inspected and tested without a ledger:
//   plan_*   : pure. Reads a snapshot (state, live slugs, inventory, slot0) and
//              decides the new accumulator and slug set.
//   apply_*  : talks to the ledger. Removes the old slugs, moves the price to
//              the target tick, adds the new slugs and settles the net delta
//              against the controller's inventory.
// The caller owns checkpoint/rollback and commits state only after apply succeeds.

use ethers::types::{Address, U256};
use num_bigint::BigInt;
use num_traits::Zero;

use crate::engine::geometry::{compute_slugs, Geometry, GeometryInput};
use crate::engine::policy::DriftPolicy;
use crate::errors::{AuctionError, AuctionResult, MathError};
use crate::ledger::LedgerAdapter;
use crate::math::fixed_point::{bigint_to_u256, u256_to_bigint};
use crate::math::tick_math::{amounts_for_liquidity, get_sqrt_ratio_at_tick};
use crate::models::{
    AuctionParameters, AuctionState, BalanceDelta, Currency, Inventory, LedgerInstruction, PoolId, Settlement, Slot0,
    SlugSet, SwapDirection, SwapRequest,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RebalancePlan {
    pub epoch: u64,
    pub epochs_passed: u64,
    /// None for the initial placement.
    pub policy: Option<DriftPolicy>,
    pub accumulator_delta: i128,
    pub tick_accumulator: i128,
    pub geometry: Geometry,
}

/// Result of pushing a plan through the ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppliedBatch {
    pub instructions: Vec<LedgerInstruction>,
    pub settlements: Vec<Settlement>,
    pub net: BalanceDelta,
}

/// Amounts (asset, numeraire) the live slugs give back if removed at `sqrt_price`.
pub fn released_amounts(params: &AuctionParameters, slugs: &SlugSet, slot0: &Slot0) -> AuctionResult<(U256, U256)> {
    let sqrt_price = u256_to_bigint(slot0.sqrt_price_x96);
    let mut totals = [BigInt::zero(), BigInt::zero()];
    for slug in slugs.iter().filter(|s| s.liquidity > 0) {
        let sa = get_sqrt_ratio_at_tick(slug.tick_lower)?;
        let sb = get_sqrt_ratio_at_tick(slug.tick_upper)?;
        let (a0, a1) = amounts_for_liquidity(&sqrt_price, &sa, &sb, slug.liquidity, false);
        totals[0] += a0;
        totals[1] += a1;
    }
    let asset = &totals[params.asset().index() as usize];
    let numeraire = &totals[params.numeraire().index() as usize];
    Ok((bigint_to_u256(asset, "released asset")?, bigint_to_u256(numeraire, "released numeraire")?))
}

fn geometry_for(
    params: &AuctionParameters,
    state: &AuctionState,
    slugs: &SlugSet,
    inventory: &Inventory,
    slot0: &Slot0,
    epoch: u64,
    tick_accumulator: i128,
) -> AuctionResult<Geometry> {
    let (released_asset, released_numeraire) = released_amounts(params, slugs, slot0)?;
    let asset_available = inventory
        .asset
        .checked_add(released_asset)
        .ok_or(MathError::Overflow("asset available"))?;
    let numeraire_available = inventory
        .numeraire
        .checked_add(released_numeraire)
        .ok_or(MathError::Overflow("numeraire available"))?;

    compute_slugs(&GeometryInput {
        params,
        epoch,
        tick_accumulator,
        total_units_sold: state.total_units_sold,
        total_proceeds: state.total_proceeds,
        market_tick: slot0.tick,
        asset_available,
        numeraire_available,
    })
}

/// First placement: epoch 1, zero accumulator, nothing sold.
pub fn plan_initial(
    params: &AuctionParameters,
    inventory: &Inventory,
    slot0: &Slot0,
) -> AuctionResult<RebalancePlan> {
    let state = AuctionState::default();
    let geometry = geometry_for(params, &state, &SlugSet::empty_at(params.start_tick), inventory, slot0, 1, 0)?;
    Ok(RebalancePlan {
        epoch: 1,
        epochs_passed: 0,
        policy: None,
        accumulator_delta: 0,
        tick_accumulator: 0,
        geometry,
    })
}

/// Plan the rebalance for `now`, or None if the current epoch was already handled.
pub fn plan_rebalance(
    params: &AuctionParameters,
    state: &AuctionState,
    slugs: &SlugSet,
    inventory: &Inventory,
    slot0: &Slot0,
    now: u64,
) -> AuctionResult<Option<RebalancePlan>> {
    let epoch = params.current_epoch(now)?;
    if epoch <= state.last_epoch {
        return Ok(None);
    }
    let epochs_passed = epoch - state.last_epoch;

    let policy = DriftPolicy::select(params, state, now, slot0.tick, epochs_passed)?;
    let accumulator_delta = policy.accumulator_delta(params)?;
    let tick_accumulator = state
        .tick_accumulator
        .checked_add(accumulator_delta)
        .ok_or(MathError::Overflow("tick accumulator"))?;

    log::debug!(
        "epoch {} ({} passed): {} drift {} -> accumulator {}",
        epoch, epochs_passed, policy.name(), accumulator_delta, tick_accumulator
    );

    let geometry = geometry_for(params, state, slugs, inventory, slot0, epoch, tick_accumulator)?;
    Ok(Some(RebalancePlan {
        epoch,
        epochs_passed,
        policy: Some(policy),
        accumulator_delta,
        tick_accumulator,
        geometry,
    }))
}

fn balance_of<'a>(params: &AuctionParameters, inventory: &'a mut Inventory, currency: Currency) -> (&'a mut U256, &'static str) {
    if currency == params.asset() {
        (&mut inventory.asset, "asset")
    } else {
        (&mut inventory.numeraire, "numeraire")
    }
}

fn add_delta(net: &BalanceDelta, d: &BalanceDelta) -> AuctionResult<BalanceDelta> {
    Ok(net.checked_add(d).ok_or(MathError::Overflow("net balance delta"))?)
}

/// Remove `old`, converge the price, add the planned slugs and settle.
/// `inventory` is updated in place; callers pass a copy and commit on success.
pub fn apply_rebalance<L: LedgerAdapter>(
    ledger: &mut L,
    pool: &PoolId,
    params: &AuctionParameters,
    old: &SlugSet,
    plan: &RebalancePlan,
    inventory: &mut Inventory,
    custody: Address,
) -> AuctionResult<AppliedBatch> {
    let mut batch = AppliedBatch::default();

    for slug in old.iter().filter(|s| s.liquidity > 0) {
        let liquidity = i128::try_from(slug.liquidity).map_err(|_| MathError::Overflow("remove liquidity"))?;
        let d = ledger.modify_range(pool, slug.tick_lower, slug.tick_upper, -liquidity)?;
        batch.net = add_delta(&batch.net, &d)?;
        batch.instructions.push(LedgerInstruction::RemoveRange(*slug));
    }

    // removing liquidity does not move the price; a dust swap does
    let target = plan.geometry.target_tick;
    let target_sqrt = bigint_to_u256(&get_sqrt_ratio_at_tick(target)?, "target sqrt price")?;
    let slot0 = ledger.slot0(pool)?;
    if slot0.sqrt_price_x96 != target_sqrt {
        let direction = if target_sqrt < slot0.sqrt_price_x96 { SwapDirection::ZeroForOne } else { SwapDirection::OneForZero };
        let outcome = ledger.swap(
            pool,
            &SwapRequest { direction, amount_in: U256::one(), sqrt_price_limit_x96: Some(target_sqrt) },
        )?;
        if outcome.slot0.sqrt_price_x96 != target_sqrt {
            return Err(AuctionError::PriceNotConverged { expected: target, actual: outcome.slot0.tick });
        }
        batch.net = add_delta(&batch.net, &outcome.delta)?;
        batch.instructions.push(LedgerInstruction::Swap {
            direction,
            sqrt_price_limit_x96: target_sqrt,
            landed_tick: outcome.slot0.tick,
        });
    }

    for slug in plan.geometry.slugs.iter().filter(|s| s.liquidity > 0) {
        let liquidity = i128::try_from(slug.liquidity).map_err(|_| MathError::Overflow("add liquidity"))?;
        let d = ledger.modify_range(pool, slug.tick_lower, slug.tick_upper, liquidity)?;
        batch.net = add_delta(&batch.net, &d)?;
        batch.instructions.push(LedgerInstruction::AddRange(*slug));
    }

    for currency in [Currency::Currency0, Currency::Currency1] {
        let amount = batch.net.of(currency);
        if amount == 0 {
            continue;
        }
        let value = U256::from(amount.unsigned_abs());
        let (balance, what) = balance_of(params, inventory, currency);
        if amount > 0 {
            ledger.take(pool, currency, value, custody)?;
            *balance = balance.checked_add(value).ok_or(MathError::Overflow("inventory"))?;
            batch.settlements.push(Settlement::Take { currency, amount: value });
        } else {
            if *balance < value {
                return Err(AuctionError::InsufficientInventory {
                    what,
                    needed: value.to_string(),
                    available: balance.to_string(),
                });
            }
            ledger.deposit(pool, currency, value)?;
            *balance -= value;
            batch.settlements.push(Settlement::Deposit { currency, amount: value });
        }
    }

    log::debug!(
        "applied batch on {}: {} instructions, net delta {:?}",
        pool,
        batch.instructions.len(),
        batch.net
    );
    Ok(batch)
}
