use std::env;

use anyhow::{anyhow, Context};
use ethers::types::U256;

use crate::models::AuctionParameters;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,

    // Pool key
    pub currency0_address: String,
    pub currency1_address: String,
    pub hooks_address: String,
    pub custody_address: String,
    pub fee_ppm: u32,
    pub tick_spacing: i32,
    /// Ledger price at pool creation; defaults to the auction start tick.
    pub initial_tick: Option<i32>,

    // Auction schedule
    pub total_units_to_sell: String,
    /// Unix seconds; defaults to the moment the process starts.
    pub start_time: Option<u64>,
    pub duration_secs: u64,
    pub epoch_length: u64,
    pub start_tick: i32,
    pub end_tick: i32,
    pub gamma: i32,
    pub selling_token0: bool,
    pub minimum_proceeds: String,
    pub maximum_proceeds: Option<String>,
}

fn var_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn var_opt<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Local overrides first, then the default .env
        dotenv::from_filename("auction.env").ok();
        dotenv::from_filename("config/auction.env").ok();
        dotenv::dotenv().ok();

        Ok(Config {
            port: var_or("PORT", 8000),

            currency0_address: env::var("CURRENCY0_ADDRESS")
                .unwrap_or_else(|_| "0x0000000000000000000000000000000000000001".to_string()),
            currency1_address: env::var("CURRENCY1_ADDRESS")
                .unwrap_or_else(|_| "0x0000000000000000000000000000000000000002".to_string()),
            hooks_address: env::var("HOOKS_ADDRESS")
                .unwrap_or_else(|_| "0x00000000000000000000000000000000000000d0".to_string()),
            custody_address: env::var("CUSTODY_ADDRESS")
                .unwrap_or_else(|_| "0x00000000000000000000000000000000000000d0".to_string()),
            fee_ppm: var_or("POOL_FEE_PPM", 3_000),
            tick_spacing: var_or("POOL_TICK_SPACING", 60),
            initial_tick: var_opt("POOL_INITIAL_TICK"),

            total_units_to_sell: env::var("AUCTION_TOTAL_UNITS")
                .unwrap_or_else(|_| "1000000000000000000000000".to_string()),
            start_time: var_opt("AUCTION_START_TIME"),
            duration_secs: var_or("AUCTION_DURATION_SECS", 86_400),
            epoch_length: var_or("AUCTION_EPOCH_LENGTH", 3_600),
            start_tick: var_or("AUCTION_START_TICK", 6_000),
            end_tick: var_or("AUCTION_END_TICK", -6_000),
            gamma: var_or("AUCTION_GAMMA", 600),
            selling_token0: var_or("AUCTION_SELLING_TOKEN0", true),
            minimum_proceeds: env::var("AUCTION_MINIMUM_PROCEEDS").unwrap_or_else(|_| "0".to_string()),
            maximum_proceeds: env::var("AUCTION_MAXIMUM_PROCEEDS").ok(),
        })
    }

    /// Auction parameters anchored at `now` when no start time is configured.
    pub fn auction_parameters(&self, now: u64) -> anyhow::Result<AuctionParameters> {
        let start_time = self.start_time.unwrap_or(now);
        let dec = |name: &str, v: &str| {
            U256::from_dec_str(v).map_err(|e| anyhow!("{} is not a decimal integer: {}", name, e))
        };
        let params = AuctionParameters {
            total_units_to_sell: dec("AUCTION_TOTAL_UNITS", &self.total_units_to_sell)?,
            start_time,
            end_time: start_time
                .checked_add(self.duration_secs)
                .context("AUCTION_DURATION_SECS overflows the end time")?,
            start_tick: self.start_tick,
            end_tick: self.end_tick,
            epoch_length: self.epoch_length,
            gamma: self.gamma,
            tick_spacing: self.tick_spacing,
            selling_token0: self.selling_token0,
            minimum_proceeds: dec("AUCTION_MINIMUM_PROCEEDS", &self.minimum_proceeds)?,
            maximum_proceeds: match &self.maximum_proceeds {
                Some(v) => dec("AUCTION_MAXIMUM_PROCEEDS", v)?,
                None => U256::MAX,
            },
        };
        params.validate().context("auction configuration rejected")?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            port: 8000,
            currency0_address: "0x0000000000000000000000000000000000000001".into(),
            currency1_address: "0x0000000000000000000000000000000000000002".into(),
            hooks_address: "0x00000000000000000000000000000000000000d0".into(),
            custody_address: "0x00000000000000000000000000000000000000d0".into(),
            fee_ppm: 3_000,
            tick_spacing: 60,
            initial_tick: None,
            total_units_to_sell: "1000".into(),
            start_time: None,
            duration_secs: 86_400,
            epoch_length: 3_600,
            start_tick: 6_000,
            end_tick: -6_000,
            gamma: 600,
            selling_token0: true,
            minimum_proceeds: "0".into(),
            maximum_proceeds: None,
        }
    }

    #[test]
    fn parameters_anchor_at_now_and_default_to_no_cap() {
        let p = config().auction_parameters(50_000).unwrap();
        assert_eq!(p.start_time, 50_000);
        assert_eq!(p.end_time, 136_400);
        assert_eq!(p.maximum_proceeds, U256::MAX);
        assert_eq!(p.total_units_to_sell, U256::from(1_000));
    }

    #[test]
    fn rejects_bad_numbers_and_bad_schedules() {
        let mut c = config();
        c.total_units_to_sell = "lots".into();
        assert!(c.auction_parameters(0).is_err());

        let mut c = config();
        c.epoch_length = 7_000;
        assert!(c.auction_parameters(0).is_err());
    }
}
