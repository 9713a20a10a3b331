// Auction controller
// ------------------
// Arena of auction records keyed by PoolId. The controller is the only writer of
// a record; ledger access is passed in per call so one controller can drive any
// LedgerAdapter. Every mutation is computed on a copy and committed at the end.

use std::collections::HashMap;
use std::sync::Arc;

use ethers::types::{Address, U256};

use crate::engine::rebalancer::{apply_rebalance, plan_initial, plan_rebalance, RebalancePlan};
use crate::errors::{AuctionError, AuctionResult};
use crate::ledger::LedgerAdapter;
use crate::math::fixed_point::u256_to_bigint;
use crate::math::tick_math::get_sqrt_ratio_at_tick;
use crate::models::{
    AuctionParameters, AuctionPhase, AuctionState, Inventory, PoolId, RebalanceReport, SlugSet, SwapOutcome,
    TradeContext, TradeHookOutcome, TradePhase,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuctionRecord {
    pub params: Arc<AuctionParameters>,
    pub state: AuctionState,
    pub slugs: SlugSet,
    pub inventory: Inventory,
}

#[derive(Debug)]
pub struct AuctionController {
    custody: Address,
    records: HashMap<PoolId, AuctionRecord>,
}

impl AuctionController {
    /// `custody` receives everything the controller takes out of the ledger.
    pub fn new(custody: Address) -> Self {
        Self { custody, records: HashMap::new() }
    }

    pub fn record(&self, pool: &PoolId) -> AuctionResult<&AuctionRecord> {
        self.records.get(pool).ok_or_else(|| AuctionError::UnknownPool(pool.to_string()))
    }

    pub fn state(&self, pool: &PoolId) -> AuctionResult<&AuctionState> {
        Ok(&self.record(pool)?.state)
    }

    pub fn parameters(&self, pool: &PoolId) -> AuctionResult<Arc<AuctionParameters>> {
        Ok(self.record(pool)?.params.clone())
    }

    pub fn slugs(&self, pool: &PoolId) -> AuctionResult<&SlugSet> {
        Ok(&self.record(pool)?.slugs)
    }

    pub fn inventory(&self, pool: &PoolId) -> AuctionResult<&Inventory> {
        Ok(&self.record(pool)?.inventory)
    }

    pub fn phase(&self, pool: &PoolId, now: u64) -> AuctionResult<AuctionPhase> {
        let r = self.record(pool)?;
        Ok(r.params.phase(now, &r.state))
    }

    pub fn migration_ready(&self, pool: &PoolId, now: u64) -> AuctionResult<bool> {
        let r = self.record(pool)?;
        Ok(r.params.migration_ready(now, &r.state))
    }

    /// Put back a record captured before a failed host-level batch.
    pub fn restore(&mut self, pool: &PoolId, record: AuctionRecord) {
        self.records.insert(*pool, record);
    }

    /// Take custody of the sale inventory and place the first slugs.
    pub fn on_initialize<L: LedgerAdapter>(
        &mut self,
        ledger: &mut L,
        pool: &PoolId,
        params: AuctionParameters,
        initial_inventory: Inventory,
    ) -> AuctionResult<RebalanceReport> {
        params.validate()?;
        if self.records.contains_key(pool) {
            return Err(AuctionError::AlreadyInitialized(pool.to_string()));
        }
        if initial_inventory.asset < params.total_units_to_sell {
            return Err(AuctionError::InsufficientInventory {
                what: "asset",
                needed: params.total_units_to_sell.to_string(),
                available: initial_inventory.asset.to_string(),
            });
        }

        let mut inventory = Inventory { asset: params.total_units_to_sell, numeraire: U256::zero() };
        let slot0 = ledger.slot0(pool)?;
        let plan = plan_initial(&params, &inventory, &slot0)?;
        let old = SlugSet::empty_at(plan.geometry.target_tick);
        let report = self.execute(ledger, pool, &params, &old, &plan, &mut inventory)?;

        log::info!(
            "auction {} initialized: {} units, ticks {} -> {}, {} epochs",
            pool,
            params.total_units_to_sell,
            params.start_tick,
            params.end_tick,
            params.total_epochs()
        );
        self.records.insert(
            *pool,
            AuctionRecord {
                params: Arc::new(params),
                state: AuctionState::default(),
                slugs: plan.geometry.slugs,
                inventory,
            },
        );
        Ok(report)
    }

    /// Hook around one trade. Before: reject out-of-window trades and
    /// rebalance at most once per epoch. After: book the realized delta.
    pub fn on_trade<L: LedgerAdapter>(
        &mut self,
        ledger: &mut L,
        pool: &PoolId,
        ctx: &TradeContext,
    ) -> AuctionResult<TradeHookOutcome> {
        match &ctx.phase {
            TradePhase::Before => self.before_trade(ledger, pool, ctx.now),
            TradePhase::After(outcome) => self.after_trade(pool, ctx.now, outcome),
        }
    }

    fn before_trade<L: LedgerAdapter>(&mut self, ledger: &mut L, pool: &PoolId, now: u64) -> AuctionResult<TradeHookOutcome> {
        let record = self.record(pool)?.clone();
        let params = record.params.clone();
        match params.phase(now, &record.state) {
            AuctionPhase::Dormant => return Err(AuctionError::BeforeStart { now, start: params.start_time }),
            AuctionPhase::Closed => return Err(AuctionError::AuctionClosed),
            AuctionPhase::Rebalanced => return Ok(TradeHookOutcome::default()),
            AuctionPhase::Active => {}
        }

        let slot0 = ledger.slot0(pool)?;
        let plan = match plan_rebalance(&params, &record.state, &record.slugs, &record.inventory, &slot0, now)? {
            Some(plan) => plan,
            None => return Ok(TradeHookOutcome::default()),
        };

        let mut inventory = record.inventory.clone();
        let report = self.execute(ledger, pool, &params, &record.slugs, &plan, &mut inventory)?;

        let committed = AuctionRecord {
            params,
            state: AuctionState {
                last_epoch: plan.epoch,
                tick_accumulator: plan.tick_accumulator,
                units_sold_at_last_epoch: record.state.total_units_sold,
                ..record.state
            },
            slugs: plan.geometry.slugs.clone(),
            inventory,
        };
        log::info!(
            "auction {} rebalanced for epoch {} ({}): accumulator {} target tick {}",
            pool,
            plan.epoch,
            report.policy,
            plan.tick_accumulator,
            plan.geometry.target_tick
        );
        self.records.insert(*pool, committed);
        Ok(TradeHookOutcome { rebalance: Some(report), early_exit_triggered: false })
    }

    /// Checkpoint, apply, and roll the ledger back if anything fails.
    fn execute<L: LedgerAdapter>(
        &self,
        ledger: &mut L,
        pool: &PoolId,
        params: &AuctionParameters,
        old: &SlugSet,
        plan: &RebalancePlan,
        inventory: &mut Inventory,
    ) -> AuctionResult<RebalanceReport> {
        let checkpoint = ledger.checkpoint(pool)?;
        match apply_rebalance(ledger, pool, params, old, plan, inventory, self.custody) {
            Ok(batch) => Ok(RebalanceReport {
                epoch: plan.epoch,
                epochs_passed: plan.epochs_passed,
                policy: plan.policy.as_ref().map(|p| p.name()).unwrap_or("initial"),
                accumulator_delta: plan.accumulator_delta,
                tick_accumulator: plan.tick_accumulator,
                target_tick: plan.geometry.target_tick,
                instructions: batch.instructions,
                settlements: batch.settlements,
                slugs: plan.geometry.slugs.clone(),
            }),
            Err(e) => {
                log::warn!("rebalance of {} for epoch {} failed, rolling back: {}", pool, plan.epoch, e);
                ledger.rollback(pool, checkpoint)?;
                Err(e)
            }
        }
    }

    fn after_trade(&mut self, pool: &PoolId, now: u64, outcome: &SwapOutcome) -> AuctionResult<TradeHookOutcome> {
        let record = self.record(pool)?;
        let params = record.params.clone();
        let mut state = record.state.clone();
        let dir = params.direction();

        let asset = params.asset();
        let numeraire = params.numeraire();
        let input = outcome.direction.input();
        let asset_delta = outcome.delta.of(asset);
        let numeraire_delta = outcome.delta.of(numeraire);

        // swapper perspective: positive = the trader received it
        if asset_delta > 0 {
            state.total_units_sold = state.total_units_sold.saturating_add(U256::from(asset_delta as u128));
        } else if asset_delta < 0 {
            let fee = if input == asset { outcome.fee } else { U256::zero() };
            let returned = U256::from(asset_delta.unsigned_abs()).saturating_sub(fee);
            if returned > state.total_units_sold {
                log::warn!("auction {}: buy-back of {} exceeds {} sold, flooring at zero", pool, returned, state.total_units_sold);
            }
            state.total_units_sold = state.total_units_sold.saturating_sub(returned);
        }

        if numeraire_delta < 0 {
            let fee = if input == numeraire { outcome.fee } else { U256::zero() };
            let paid = U256::from(numeraire_delta.unsigned_abs()).saturating_sub(fee);
            state.total_proceeds = state.total_proceeds.saturating_add(paid);
        } else if numeraire_delta > 0 {
            let refunded = U256::from(numeraire_delta as u128);
            if refunded > state.total_proceeds {
                log::warn!("auction {}: {} numeraire paid out exceeds {} proceeds, flooring at zero", pool, refunded, state.total_proceeds);
            }
            state.total_proceeds = state.total_proceeds.saturating_sub(refunded);
        }

        // the settled range's far edge is the floor the price may reach
        let edge = record.slugs.lower.cheap_edge(dir);
        let edge_sqrt = get_sqrt_ratio_at_tick(edge)?;
        let price = u256_to_bigint(outcome.slot0.sqrt_price_x96);
        let below = if dir > 0 { price < edge_sqrt } else { price > edge_sqrt };
        if below {
            return Err(AuctionError::SwapBelowRange { tick: outcome.slot0.tick, edge });
        }

        let early_exit_triggered = !state.early_exit && state.total_proceeds >= params.maximum_proceeds;
        if early_exit_triggered {
            state.early_exit = true;
            log::info!("auction {} reached maximum proceeds {} at {}", pool, params.maximum_proceeds, now);
        }

        log::debug!(
            "auction {} after trade: sold {} proceeds {} tick {}",
            pool, state.total_units_sold, state.total_proceeds, outcome.slot0.tick
        );
        if let Some(r) = self.records.get_mut(pool) {
            r.state = state;
        }
        Ok(TradeHookOutcome { rebalance: None, early_exit_triggered })
    }
}
