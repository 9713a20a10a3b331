use ethers::types::{Address, U256};

use crate::errors::LedgerError;
use crate::models::{BalanceDelta, Currency, PoolId, Slot0, SwapOutcome, SwapRequest};

/// The narrow view of a concentrated-liquidity pool manager the controller needs.
///
/// Deltas are from the caller's side: removing liquidity yields positive
/// amounts (credit), adding liquidity yields negative amounts (debt). Credit is
/// withdrawn with [`take`](LedgerAdapter::take) and debt paid with
/// [`deposit`](LedgerAdapter::deposit).
pub trait LedgerAdapter {
    /// Opaque snapshot used to undo a failed batch.
    type Checkpoint;

    fn slot0(&self, pool: &PoolId) -> Result<Slot0, LedgerError>;

    fn modify_range(
        &mut self,
        pool: &PoolId,
        tick_lower: i32,
        tick_upper: i32,
        liquidity_delta: i128,
    ) -> Result<BalanceDelta, LedgerError>;

    fn swap(&mut self, pool: &PoolId, request: &SwapRequest) -> Result<SwapOutcome, LedgerError>;

    fn take(&mut self, pool: &PoolId, currency: Currency, amount: U256, to: Address) -> Result<(), LedgerError>;

    fn deposit(&mut self, pool: &PoolId, currency: Currency, amount: U256) -> Result<(), LedgerError>;

    fn checkpoint(&self, pool: &PoolId) -> Result<Self::Checkpoint, LedgerError>;

    fn rollback(&mut self, pool: &PoolId, checkpoint: Self::Checkpoint) -> Result<(), LedgerError>;
}

/// Host side: a trader's swap that settles against the trader's own wallet.
pub trait TradeLedger: LedgerAdapter {
    fn execute_trade(&mut self, pool: &PoolId, request: &SwapRequest) -> Result<SwapOutcome, LedgerError>;
}
