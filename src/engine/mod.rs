pub mod controller;
pub mod geometry;
pub mod host;
pub mod policy;
pub mod rebalancer;
pub mod schedule;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use controller::{AuctionController, AuctionRecord};
pub use host::{AuctionHost, TradeReceipt};
