use rocket::serde::{Deserialize, Serialize};

use crate::models::{AuctionParameters, AuctionState, Inventory, Slug};

#[derive(Serialize)]
pub struct ParametersDto {
    pub total_units_to_sell: String,
    pub start_time: u64,
    pub end_time: u64,
    pub start_tick: i32,
    pub end_tick: i32,
    pub epoch_length: u64,
    pub total_epochs: u64,
    pub gamma: i32,
    pub tick_spacing: i32,
    pub selling_token0: bool,
    pub minimum_proceeds: String,
    pub maximum_proceeds: String,
}

impl From<&AuctionParameters> for ParametersDto {
    fn from(p: &AuctionParameters) -> Self {
        ParametersDto {
            total_units_to_sell: p.total_units_to_sell.to_string(),
            start_time: p.start_time,
            end_time: p.end_time,
            start_tick: p.start_tick,
            end_tick: p.end_tick,
            epoch_length: p.epoch_length,
            total_epochs: p.total_epochs(),
            gamma: p.gamma,
            tick_spacing: p.tick_spacing,
            selling_token0: p.selling_token0,
            minimum_proceeds: p.minimum_proceeds.to_string(),
            maximum_proceeds: p.maximum_proceeds.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct StateDto {
    pub last_epoch: u64,
    pub tick_accumulator: String,  // WAD scaled
    pub total_units_sold: String,
    pub total_proceeds: String,
    pub units_sold_at_last_epoch: String,
    pub early_exit: bool,
}

impl From<&AuctionState> for StateDto {
    fn from(s: &AuctionState) -> Self {
        StateDto {
            last_epoch: s.last_epoch,
            tick_accumulator: s.tick_accumulator.to_string(),
            total_units_sold: s.total_units_sold.to_string(),
            total_proceeds: s.total_proceeds.to_string(),
            units_sold_at_last_epoch: s.units_sold_at_last_epoch.to_string(),
            early_exit: s.early_exit,
        }
    }
}

#[derive(Serialize)]
pub struct InventoryDto {
    pub asset: String,
    pub numeraire: String,
}

impl From<&Inventory> for InventoryDto {
    fn from(i: &Inventory) -> Self {
        InventoryDto { asset: i.asset.to_string(), numeraire: i.numeraire.to_string() }
    }
}

#[derive(Serialize)]
pub struct AuctionResponse {
    pub timestamp_utc: String,
    pub pool_id: String,
    pub phase: String,
    pub current_epoch: Option<u64>,
    pub market_tick: i32,
    pub migration_ready: bool,
    pub parameters: ParametersDto,
    pub state: StateDto,
    pub inventory: InventoryDto,
}

/// One entry of the slug report consumed by the plotting script.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlugDto {
    pub slug_name: String,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: String,
}

impl From<&Slug> for SlugDto {
    fn from(s: &Slug) -> Self {
        SlugDto {
            slug_name: s.kind.name().to_string(),
            tick_lower: s.tick_lower,
            tick_upper: s.tick_upper,
            liquidity: s.liquidity.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct SlugReport {
    pub data: Vec<SlugDto>,
}

#[derive(Deserialize)]
pub struct TradeRequestDto {
    /// "buy" takes the auctioned asset out of the pool, "sell" puts it back.
    pub direction: String,
    /// Exact input amount, decimal.
    pub amount: String,
    /// Unix seconds; wall clock when absent.
    pub now: Option<u64>,
}

#[derive(Serialize)]
pub struct TradeResponse {
    pub timestamp_utc: String,
    pub direction: String,
    pub amount_in: String,
    pub amount_out: String,
    pub fee: String,
    pub tick: i32,
    pub rebalanced_epoch: Option<u64>,
    pub rebalance_policy: Option<String>,
    pub early_exit_triggered: bool,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub timestamp_utc: String,
    pub error: String,
}
