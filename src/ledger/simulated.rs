// In-memory concentrated-liquidity ledger
// ---------------------------------------
// A v4-style pool manager good enough to drive the auction controller in tests
// and in the demo host: tick-indexed liquidity, exact-input swaps crossing
// initialized ticks, and flash-style accounting of what the controller owes or
// is owed until it settles with take/deposit.
//
// Notes:
// - Positions belong to a single owner (the controller); traders only swap.
// - Swap fees stay in a per-pool fee bucket and are not credited to positions.
// - A checkpoint is a full clone of the pool, which keeps rollback trivial.

use std::collections::{BTreeMap, HashMap};

use ethers::types::{Address, U256};
use num_bigint::BigInt;
use num_traits::{Signed, Zero};

use crate::errors::{LedgerError, MathError};
use crate::ledger::adapter::{LedgerAdapter, TradeLedger};
use crate::math::fixed_point::{bigint_to_i128, bigint_to_u128, bigint_to_u256, u256_to_bigint};
use crate::math::swap_math::{compute_swap_step, default_limit};
use crate::math::tick_math::{
    amounts_for_liquidity, get_sqrt_ratio_at_tick, get_tick_at_sqrt_ratio, max_sqrt_ratio, MAX_TICK, MIN_SQRT_RATIO,
    MIN_TICK,
};
use crate::models::{BalanceDelta, Currency, PoolId, PoolKey, Slot0, SwapDirection, SwapOutcome, SwapRequest};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickInfo {
    pub liquidity_gross: u128,
    pub liquidity_net: i128,
}

#[derive(Clone, Debug)]
pub struct SimulatedPool {
    pub key: PoolKey,
    pub sqrt_price_x96: BigInt,
    pub tick: i32,
    /// Active liquidity at the current price.
    pub liquidity: u128,
    pub ticks: BTreeMap<i32, TickInfo>,
    pub positions: HashMap<(i32, i32), u128>,
    /// Tokens held by the pool, fees excluded.
    pub reserves: [BigInt; 2],
    /// Controller credit (+) or debt (-) not yet settled.
    pub owed: [BigInt; 2],
    pub fees: [BigInt; 2],
}

impl SimulatedPool {
    pub fn new(key: PoolKey, tick: i32) -> Result<Self, LedgerError> {
        let sqrt_price_x96 = get_sqrt_ratio_at_tick(tick)?;
        Ok(Self {
            key,
            sqrt_price_x96,
            tick,
            liquidity: 0,
            ticks: BTreeMap::new(),
            positions: HashMap::new(),
            reserves: [BigInt::zero(), BigInt::zero()],
            owed: [BigInt::zero(), BigInt::zero()],
            fees: [BigInt::zero(), BigInt::zero()],
        })
    }

    pub fn slot0(&self) -> Result<Slot0, LedgerError> {
        Ok(Slot0 {
            sqrt_price_x96: bigint_to_u256(&self.sqrt_price_x96, "slot0 sqrt price")?,
            tick: self.tick,
        })
    }

    pub fn position(&self, tick_lower: i32, tick_upper: i32) -> u128 {
        self.positions.get(&(tick_lower, tick_upper)).copied().unwrap_or(0)
    }

    fn update_tick(&mut self, tick: i32, liquidity_delta: i128, upper: bool) -> Result<(), LedgerError> {
        let info = self.ticks.entry(tick).or_default();
        let gross = if liquidity_delta >= 0 {
            info.liquidity_gross.checked_add(liquidity_delta as u128)
        } else {
            info.liquidity_gross.checked_sub(liquidity_delta.unsigned_abs())
        };
        info.liquidity_gross = gross.ok_or(MathError::Overflow("liquidity_gross"))?;
        let net_delta = if upper { -liquidity_delta } else { liquidity_delta };
        info.liquidity_net = info
            .liquidity_net
            .checked_add(net_delta)
            .ok_or(MathError::Overflow("liquidity_net"))?;
        if info.liquidity_gross == 0 {
            self.ticks.remove(&tick);
        }
        Ok(())
    }

    fn modify_position(&mut self, tick_lower: i32, tick_upper: i32, liquidity_delta: i128) -> Result<BalanceDelta, LedgerError> {
        let spacing = self.key.tick_spacing;
        if tick_lower >= tick_upper
            || tick_lower < MIN_TICK
            || tick_upper > MAX_TICK
            || tick_lower % spacing != 0
            || tick_upper % spacing != 0
        {
            return Err(LedgerError::InvalidRange { lower: tick_lower, upper: tick_upper });
        }
        if liquidity_delta == 0 {
            return Ok(BalanceDelta::default());
        }

        let have = self.position(tick_lower, tick_upper);
        let updated = if liquidity_delta > 0 {
            have.checked_add(liquidity_delta as u128).ok_or(MathError::Overflow("position liquidity"))?
        } else {
            have.checked_sub(liquidity_delta.unsigned_abs()).ok_or(
                LedgerError::InsufficientPositionLiquidity { have, remove: liquidity_delta.unsigned_abs() },
            )?
        };

        self.update_tick(tick_lower, liquidity_delta, false)?;
        self.update_tick(tick_upper, liquidity_delta, true)?;
        if updated == 0 {
            self.positions.remove(&(tick_lower, tick_upper));
        } else {
            self.positions.insert((tick_lower, tick_upper), updated);
        }

        if tick_lower <= self.tick && self.tick < tick_upper {
            self.liquidity = if liquidity_delta > 0 {
                self.liquidity.checked_add(liquidity_delta as u128)
            } else {
                self.liquidity.checked_sub(liquidity_delta.unsigned_abs())
            }
            .ok_or(MathError::Overflow("active liquidity"))?;
        }

        // adding rounds against the caller, removing in the pool's favor too
        let adding = liquidity_delta > 0;
        let sa = get_sqrt_ratio_at_tick(tick_lower)?;
        let sb = get_sqrt_ratio_at_tick(tick_upper)?;
        let (a0, a1) = amounts_for_liquidity(&self.sqrt_price_x96, &sa, &sb, liquidity_delta.unsigned_abs(), adding);

        let (d0, d1) = if adding { (-a0, -a1) } else { (a0, a1) };
        self.reserves[0] -= &d0;
        self.reserves[1] -= &d1;
        Ok(BalanceDelta::new(
            bigint_to_i128(&d0, "modify delta0")?,
            bigint_to_i128(&d1, "modify delta1")?,
        ))
    }

    /// Exact-input swap loop: walk initialized ticks until the input is spent or
    /// the price limit is reached. Zero-liquidity gaps are crossed for free.
    fn run_swap(&mut self, request: &SwapRequest) -> Result<SwapOutcome, LedgerError> {
        let zero_for_one = matches!(request.direction, SwapDirection::ZeroForOne);
        let limit = match request.sqrt_price_limit_x96 {
            Some(l) => u256_to_bigint(l),
            None => default_limit(zero_for_one)?,
        };
        if limit < BigInt::from(MIN_SQRT_RATIO) || limit >= max_sqrt_ratio() {
            return Err(LedgerError::SwapRejected(format!("price limit {} out of range", limit)));
        }
        if zero_for_one && limit >= self.sqrt_price_x96 {
            return Err(LedgerError::SwapRejected("price limit must be below the current price for ZeroForOne".into()));
        }
        if !zero_for_one && limit <= self.sqrt_price_x96 {
            return Err(LedgerError::SwapRejected("price limit must be above the current price for OneForZero".into()));
        }

        let mut amount_remaining = u256_to_bigint(request.amount_in);
        let mut amount_in_total = BigInt::zero();
        let mut amount_out_total = BigInt::zero();
        let mut fee_total = BigInt::zero();
        let mut liquidity = BigInt::from(self.liquidity);
        let mut crossed = 0usize;

        while amount_remaining > BigInt::zero() && self.sqrt_price_x96 != limit {
            let next = if zero_for_one {
                self.ticks.range(..=self.tick).next_back().map(|(t, _)| *t)
            } else {
                self.ticks.range(self.tick + 1..).next().map(|(t, _)| *t)
            };
            let sqrt_next = match next {
                Some(t) => get_sqrt_ratio_at_tick(t)?,
                None => default_limit(zero_for_one)?,
            };
            let bound = if zero_for_one { sqrt_next.clone().max(limit.clone()) } else { sqrt_next.clone().min(limit.clone()) };

            let step = compute_swap_step(&self.sqrt_price_x96, &bound, &liquidity, &amount_remaining, self.key.fee_ppm)?;
            amount_remaining -= &step.amount_in + &step.fee;
            amount_in_total += &step.amount_in;
            amount_out_total += &step.amount_out;
            fee_total += &step.fee;
            self.sqrt_price_x96 = step.sqrt_next_x96;

            match next {
                Some(t) if self.sqrt_price_x96 == sqrt_next => {
                    crossed += 1;
                    let net = self.ticks.get(&t).map(|i| i.liquidity_net).unwrap_or(0);
                    // moving left subtracts liquidity_net, moving right adds it
                    liquidity = if zero_for_one { liquidity - BigInt::from(net) } else { liquidity + BigInt::from(net) };
                    if liquidity.is_negative() {
                        return Err(MathError::Overflow("active liquidity underflow").into());
                    }
                    self.tick = if zero_for_one { t - 1 } else { t };
                }
                _ => {
                    self.tick = get_tick_at_sqrt_ratio(&self.sqrt_price_x96)?;
                    if self.sqrt_price_x96 != bound {
                        break;
                    }
                }
            }
        }
        self.liquidity = bigint_to_u128(&liquidity, "active liquidity")?;

        let (input, output) = if zero_for_one { (0, 1) } else { (1, 0) };
        if self.reserves[output] < amount_out_total {
            return Err(LedgerError::SwapRejected("pool reserves exhausted".into()));
        }
        self.reserves[input] += &amount_in_total;
        self.reserves[output] -= &amount_out_total;
        self.fees[input] += &fee_total;

        let paid = -(&amount_in_total + &fee_total);
        let delta = if zero_for_one {
            BalanceDelta::new(bigint_to_i128(&paid, "swap delta0")?, bigint_to_i128(&amount_out_total, "swap delta1")?)
        } else {
            BalanceDelta::new(bigint_to_i128(&amount_out_total, "swap delta0")?, bigint_to_i128(&paid, "swap delta1")?)
        };
        log::debug!(
            "swap {:?}: in {} (+{} fee) out {} -> tick {} ({} ticks crossed)",
            request.direction, amount_in_total, fee_total, amount_out_total, self.tick, crossed
        );

        Ok(SwapOutcome {
            direction: request.direction,
            delta,
            fee: bigint_to_u256(&fee_total, "swap fee")?,
            slot0: self.slot0()?,
        })
    }

    fn credit(&mut self, delta: &BalanceDelta) {
        self.owed[0] += BigInt::from(delta.amount0);
        self.owed[1] += BigInt::from(delta.amount1);
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryLedger {
    pools: HashMap<PoolId, SimulatedPool>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize_pool(&mut self, key: PoolKey, tick: i32) -> Result<PoolId, LedgerError> {
        let id = key.to_id();
        if self.pools.contains_key(&id) {
            return Err(LedgerError::PoolExists(id.to_string()));
        }
        log::info!("initializing simulated pool {} at tick {}", id, tick);
        self.pools.insert(id, SimulatedPool::new(key, tick)?);
        Ok(id)
    }

    pub fn pool(&self, id: &PoolId) -> Result<&SimulatedPool, LedgerError> {
        self.pools.get(id).ok_or_else(|| LedgerError::UnknownPool(id.to_string()))
    }

    fn pool_mut(&mut self, id: &PoolId) -> Result<&mut SimulatedPool, LedgerError> {
        self.pools.get_mut(id).ok_or_else(|| LedgerError::UnknownPool(id.to_string()))
    }

    /// Controller balance not yet settled; zero after every completed batch.
    pub fn outstanding(&self, id: &PoolId) -> Result<BalanceDelta, LedgerError> {
        let pool = self.pool(id)?;
        Ok(BalanceDelta::new(
            bigint_to_i128(&pool.owed[0], "owed0")?,
            bigint_to_i128(&pool.owed[1], "owed1")?,
        ))
    }
}

fn slot(currency: Currency) -> usize {
    currency.index() as usize
}

impl LedgerAdapter for InMemoryLedger {
    type Checkpoint = SimulatedPool;

    fn slot0(&self, pool: &PoolId) -> Result<Slot0, LedgerError> {
        self.pool(pool)?.slot0()
    }

    fn modify_range(
        &mut self,
        pool: &PoolId,
        tick_lower: i32,
        tick_upper: i32,
        liquidity_delta: i128,
    ) -> Result<BalanceDelta, LedgerError> {
        let p = self.pool_mut(pool)?;
        let delta = p.modify_position(tick_lower, tick_upper, liquidity_delta)?;
        p.credit(&delta);
        Ok(delta)
    }

    fn swap(&mut self, pool: &PoolId, request: &SwapRequest) -> Result<SwapOutcome, LedgerError> {
        let p = self.pool_mut(pool)?;
        let outcome = p.run_swap(request)?;
        p.credit(&outcome.delta);
        Ok(outcome)
    }

    fn take(&mut self, pool: &PoolId, currency: Currency, amount: U256, to: Address) -> Result<(), LedgerError> {
        let p = self.pool_mut(pool)?;
        let amount = u256_to_bigint(amount);
        let i = slot(currency);
        if p.owed[i] < amount {
            return Err(LedgerError::TakeExceedsCredit {
                currency: currency.index(),
                requested: amount.to_string(),
                owed: p.owed[i].to_string(),
            });
        }
        p.owed[i] -= &amount;
        log::debug!("take {} of currency{} to {:?}", amount, currency.index(), to);
        Ok(())
    }

    fn deposit(&mut self, pool: &PoolId, currency: Currency, amount: U256) -> Result<(), LedgerError> {
        let p = self.pool_mut(pool)?;
        p.owed[slot(currency)] += u256_to_bigint(amount);
        Ok(())
    }

    fn checkpoint(&self, pool: &PoolId) -> Result<Self::Checkpoint, LedgerError> {
        Ok(self.pool(pool)?.clone())
    }

    fn rollback(&mut self, pool: &PoolId, checkpoint: Self::Checkpoint) -> Result<(), LedgerError> {
        *self.pool_mut(pool)? = checkpoint;
        Ok(())
    }
}

impl TradeLedger for InMemoryLedger {
    fn execute_trade(&mut self, pool: &PoolId, request: &SwapRequest) -> Result<SwapOutcome, LedgerError> {
        if request.amount_in.is_zero() {
            return Err(LedgerError::SwapRejected("amount_in must be positive".into()));
        }
        self.pool_mut(pool)?.run_swap(request)
    }
}
