use std::fmt;
use std::str::FromStr;

use ethers::abi::{self, Token};
use ethers::types::{Address, H256, I256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

use crate::errors::{AuctionError, AuctionResult};
use crate::math::tick_math::{usable_tick_bounds, MAX_TICK, MIN_TICK};

// ------------------------------- Pool identity -------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolKey {
    pub currency0: Address,
    pub currency1: Address,
    pub fee_ppm: u32,
    pub tick_spacing: i32,
    pub hooks: Address,
}

impl PoolKey {
    /// keccak256(abi.encode(PoolKey)), same as the v4 PoolManager.
    pub fn to_id(&self) -> PoolId {
        let tokens = vec![Token::Tuple(vec![
            Token::Address(self.currency0),
            Token::Address(self.currency1),
            Token::Uint(U256::from(self.fee_ppm)),
            Token::Int(I256::from(self.tick_spacing).into_raw()),
            Token::Address(self.hooks),
        ])];
        PoolId(H256::from(keccak256(abi::encode(&tokens))))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolId(pub H256);

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0.as_bytes()))
    }
}

impl FromStr for PoolId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim_start_matches("0x"))?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        Ok(PoolId(H256::from_slice(&bytes)))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    Currency0,
    Currency1,
}

impl Currency {
    pub fn index(self) -> u8 {
        match self {
            Currency::Currency0 => 0,
            Currency::Currency1 => 1,
        }
    }
}

/// Signed token deltas from the caller's point of view (positive = caller receives).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub amount0: i128,
    pub amount1: i128,
}

impl BalanceDelta {
    pub fn new(amount0: i128, amount1: i128) -> Self {
        Self { amount0, amount1 }
    }

    pub fn of(&self, currency: Currency) -> i128 {
        match currency {
            Currency::Currency0 => self.amount0,
            Currency::Currency1 => self.amount1,
        }
    }

    pub fn checked_add(&self, other: &BalanceDelta) -> Option<BalanceDelta> {
        Some(BalanceDelta {
            amount0: self.amount0.checked_add(other.amount0)?,
            amount1: self.amount1.checked_add(other.amount1)?,
        })
    }
}

// --------------------------------- Ledger IO ---------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot0 {
    pub sqrt_price_x96: U256,
    pub tick: i32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapDirection {
    ZeroForOne,
    OneForZero,
}

impl SwapDirection {
    pub fn input(self) -> Currency {
        match self {
            SwapDirection::ZeroForOne => Currency::Currency0,
            SwapDirection::OneForZero => Currency::Currency1,
        }
    }

    pub fn output(self) -> Currency {
        match self {
            SwapDirection::ZeroForOne => Currency::Currency1,
            SwapDirection::OneForZero => Currency::Currency0,
        }
    }
}

/// Exact-input swap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub direction: SwapDirection,
    pub amount_in: U256,
    /// Defaults to the edge of the tick range.
    pub sqrt_price_limit_x96: Option<U256>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapOutcome {
    pub direction: SwapDirection,
    pub delta: BalanceDelta,
    /// Fee charged, denominated in the input currency.
    pub fee: U256,
    pub slot0: Slot0,
}

// ------------------------------ Auction config -------------------------------

/// Immutable per-auction configuration. Call [`AuctionParameters::validate`]
/// before using the schedule helpers; the controller does so on initialize.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionParameters {
    pub total_units_to_sell: U256,
    pub start_time: u64,
    pub end_time: u64,
    pub start_tick: i32,
    pub end_tick: i32,
    pub epoch_length: u64,
    pub gamma: i32,
    pub tick_spacing: i32,
    pub selling_token0: bool,
    pub minimum_proceeds: U256,
    pub maximum_proceeds: U256,
}

impl AuctionParameters {
    pub fn validate(&self) -> AuctionResult<()> {
        let invalid = |msg: String| Err(AuctionError::InvalidParameters(msg));

        if self.total_units_to_sell.is_zero() {
            return invalid("total_units_to_sell must be positive".into());
        }
        if self.start_time >= self.end_time {
            return invalid(format!("start_time {} must be before end_time {}", self.start_time, self.end_time));
        }
        if self.epoch_length == 0 {
            return invalid("epoch_length must be positive".into());
        }
        let window = self.end_time - self.start_time;
        if window % self.epoch_length != 0 {
            return invalid(format!("epoch_length {} does not divide the {}s window", self.epoch_length, window));
        }
        if self.tick_spacing <= 0 {
            return invalid("tick_spacing must be positive".into());
        }
        if self.selling_token0 && self.start_tick <= self.end_tick {
            return invalid("selling token0 requires start_tick > end_tick".into());
        }
        if !self.selling_token0 && self.start_tick >= self.end_tick {
            return invalid("selling token1 requires start_tick < end_tick".into());
        }
        let (lo, hi) = usable_tick_bounds(self.tick_spacing);
        for (name, t) in [("start_tick", self.start_tick), ("end_tick", self.end_tick)] {
            if t % self.tick_spacing != 0 {
                return invalid(format!("{} {} not aligned to spacing {}", name, t, self.tick_spacing));
            }
            if t < lo || t > hi {
                return invalid(format!("{} {} outside [{}, {}]", name, t, MIN_TICK, MAX_TICK));
            }
        }
        if self.gamma <= 0 || self.gamma % self.tick_spacing != 0 {
            return invalid(format!("gamma {} must be a positive multiple of {}", self.gamma, self.tick_spacing));
        }
        let epochs = window / self.epoch_length;
        let span = (self.end_tick as i64 - self.start_tick as i64).unsigned_abs();
        if (self.gamma as u64) < span / epochs {
            return invalid(format!("gamma {} below required per-epoch drift {}", self.gamma, span / epochs));
        }
        let band_far = self.start_tick as i64 + if self.selling_token0 { self.gamma as i64 } else { -(self.gamma as i64) };
        if band_far < lo as i64 || band_far > hi as i64 {
            return invalid(format!("start_tick +/- gamma ({}) leaves the tick range", band_far));
        }
        if self.maximum_proceeds < self.minimum_proceeds {
            return invalid("maximum_proceeds below minimum_proceeds".into());
        }
        Ok(())
    }

    /// +1 when a higher tick means a higher price of the asset being sold.
    pub fn direction(&self) -> i32 {
        if self.selling_token0 { 1 } else { -1 }
    }

    pub fn asset(&self) -> Currency {
        if self.selling_token0 { Currency::Currency0 } else { Currency::Currency1 }
    }

    pub fn numeraire(&self) -> Currency {
        if self.selling_token0 { Currency::Currency1 } else { Currency::Currency0 }
    }
}

// ------------------------------- Auction state -------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionState {
    /// 1-indexed; 0 means never rebalanced.
    pub last_epoch: u64,
    /// Cumulative tick drift, WAD scaled.
    pub tick_accumulator: i128,
    pub total_units_sold: U256,
    pub total_proceeds: U256,
    pub units_sold_at_last_epoch: U256,
    pub early_exit: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionPhase {
    Dormant,
    Active,
    Rebalanced,
    Closed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlugKind {
    Lower,
    Upper,
    Discovery,
}

impl SlugKind {
    pub fn name(self) -> &'static str {
        match self {
            SlugKind::Lower => "lowerSlug",
            SlugKind::Upper => "upperSlug",
            SlugKind::Discovery => "pdSlug",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slug {
    pub kind: SlugKind,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
}

impl Slug {
    /// Build from two edges in any order.
    pub fn between(kind: SlugKind, a: i32, b: i32, liquidity: u128) -> Self {
        Self { kind, tick_lower: a.min(b), tick_upper: a.max(b), liquidity }
    }

    pub fn empty_at(kind: SlugKind, tick: i32) -> Self {
        Self { kind, tick_lower: tick, tick_upper: tick, liquidity: 0 }
    }

    /// Edge with the lower price of the sale asset.
    pub fn cheap_edge(&self, dir: i32) -> i32 {
        if dir > 0 { self.tick_lower } else { self.tick_upper }
    }

    /// Edge with the higher price of the sale asset.
    pub fn dear_edge(&self, dir: i32) -> i32 {
        if dir > 0 { self.tick_upper } else { self.tick_lower }
    }

    pub fn is_empty(&self) -> bool {
        self.tick_lower == self.tick_upper
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlugSet {
    pub lower: Slug,
    pub upper: Slug,
    pub discovery: Slug,
}

impl SlugSet {
    pub fn empty_at(tick: i32) -> Self {
        Self {
            lower: Slug::empty_at(SlugKind::Lower, tick),
            upper: Slug::empty_at(SlugKind::Upper, tick),
            discovery: Slug::empty_at(SlugKind::Discovery, tick),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slug> {
        [&self.lower, &self.upper, &self.discovery].into_iter()
    }
}

/// Balances held by the controller outside the ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub asset: U256,
    pub numeraire: U256,
}

// ------------------------------- Hook surface --------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TradePhase {
    Before,
    After(SwapOutcome),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TradeContext {
    pub now: u64,
    pub phase: TradePhase,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum LedgerInstruction {
    RemoveRange(Slug),
    Swap { direction: SwapDirection, sqrt_price_limit_x96: U256, landed_tick: i32 },
    AddRange(Slug),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Settlement {
    Take { currency: Currency, amount: U256 },
    Deposit { currency: Currency, amount: U256 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RebalanceReport {
    pub epoch: u64,
    pub epochs_passed: u64,
    pub policy: &'static str,
    pub accumulator_delta: i128,
    pub tick_accumulator: i128,
    pub target_tick: i32,
    pub instructions: Vec<LedgerInstruction>,
    pub settlements: Vec<Settlement>,
    pub slugs: SlugSet,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TradeHookOutcome {
    pub rebalance: Option<RebalanceReport>,
    pub early_exit_triggered: bool,
}
