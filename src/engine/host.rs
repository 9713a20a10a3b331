use ethers::types::Address;
use serde::Serialize;

use crate::engine::controller::AuctionController;
use crate::errors::AuctionResult;
use crate::ledger::TradeLedger;
use crate::models::{
    AuctionParameters, Inventory, PoolId, RebalanceReport, SwapOutcome, SwapRequest, TradeContext, TradePhase,
};

/// Result of one hosted trade: the swap itself plus whatever the hooks did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TradeReceipt {
    pub outcome: SwapOutcome,
    pub rebalance: Option<RebalanceReport>,
    pub early_exit_triggered: bool,
}

/// Owns a ledger and a controller and runs each trade as one atomic unit:
/// before-hook, the trader's swap, after-hook.
pub struct AuctionHost<L: TradeLedger> {
    ledger: L,
    controller: AuctionController,
}

impl<L: TradeLedger> AuctionHost<L> {
    pub fn new(ledger: L, custody: Address) -> Self {
        Self { ledger, controller: AuctionController::new(custody) }
    }

    pub fn initialize(
        &mut self,
        pool: &PoolId,
        params: AuctionParameters,
        inventory: Inventory,
    ) -> AuctionResult<RebalanceReport> {
        self.controller.on_initialize(&mut self.ledger, pool, params, inventory)
    }

    /// Run a trade. On any failure the ledger and the auction record are both
    /// put back to where they were before the call.
    pub fn trade(&mut self, pool: &PoolId, request: &SwapRequest, now: u64) -> AuctionResult<TradeReceipt> {
        let saved = self.controller.record(pool)?.clone();
        let checkpoint = self.ledger.checkpoint(pool)?;

        match self.run_trade(pool, request, now) {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                log::warn!("trade on {} at {} reverted: {}", pool, now, e);
                self.controller.restore(pool, saved);
                self.ledger.rollback(pool, checkpoint)?;
                Err(e)
            }
        }
    }

    fn run_trade(&mut self, pool: &PoolId, request: &SwapRequest, now: u64) -> AuctionResult<TradeReceipt> {
        let before = self
            .controller
            .on_trade(&mut self.ledger, pool, &TradeContext { now, phase: TradePhase::Before })?;
        let outcome = self.ledger.execute_trade(pool, request)?;
        let after = self.controller.on_trade(
            &mut self.ledger,
            pool,
            &TradeContext { now, phase: TradePhase::After(outcome.clone()) },
        )?;
        Ok(TradeReceipt { outcome, rebalance: before.rebalance, early_exit_triggered: after.early_exit_triggered })
    }

    pub fn controller(&self) -> &AuctionController {
        &self.controller
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }
}
