pub mod adapter;
pub mod simulated;

pub use adapter::{LedgerAdapter, TradeLedger};
pub use simulated::{InMemoryLedger, SimulatedPool};
