use std::str::FromStr;
use std::sync::Mutex;

use anyhow::{anyhow, Context};
use ethers::types::Address;

use crate::config::Config;
use crate::engine::AuctionHost;
use crate::ledger::InMemoryLedger;
use crate::models::{Inventory, PoolId, PoolKey};

/// Shared server state: one simulated pool with one auction on it.
pub struct AppState {
    pub host: Mutex<AuctionHost<InMemoryLedger>>,
    pub pool_id: PoolId,
    pub pool_key: PoolKey,
}

impl AppState {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        Self::at(config, now)
    }

    /// Build the state as if the process started at `now`.
    pub fn at(config: &Config, now: u64) -> anyhow::Result<Self> {
        let params = config.auction_parameters(now)?;
        let pool_key = PoolKey {
            currency0: Address::from_str(&config.currency0_address).context("CURRENCY0_ADDRESS")?,
            currency1: Address::from_str(&config.currency1_address).context("CURRENCY1_ADDRESS")?,
            fee_ppm: config.fee_ppm,
            tick_spacing: config.tick_spacing,
            hooks: Address::from_str(&config.hooks_address).context("HOOKS_ADDRESS")?,
        };
        let custody = Address::from_str(&config.custody_address).context("CUSTODY_ADDRESS")?;

        let mut ledger = InMemoryLedger::new();
        let pool_id = ledger
            .initialize_pool(pool_key.clone(), config.initial_tick.unwrap_or(params.start_tick))
            .context("creating the simulated pool")?;

        let mut host = AuctionHost::new(ledger, custody);
        let inventory = Inventory { asset: params.total_units_to_sell, numeraire: Default::default() };
        let report = host
            .initialize(&pool_id, params, inventory)
            .map_err(|e| anyhow!("initializing auction on {}: {}", pool_id, e))?;
        log::info!("auction placed {} slugs on pool {}", report.slugs.iter().filter(|s| s.liquidity > 0).count(), pool_id);

        Ok(AppState { host: Mutex::new(host), pool_id, pool_key })
    }
}
