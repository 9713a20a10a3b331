use thiserror::Error;

/// Failures of the pure price/liquidity math.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("tick {0} out of range")]
    TickOutOfRange(i32),
    #[error("sqrt ratio {0} out of range")]
    SqrtRatioOutOfRange(String),
    #[error("range bounds reversed: lower {lower} > upper {upper}")]
    ReversedBounds { lower: String, upper: String },
    #[error("non-finite or non-positive price input: {0}")]
    InvalidPrice(String),
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
    #[error("division by zero in {0}")]
    DivisionByZero(&'static str),
}

/// Failures reported by a ledger implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("unknown pool {0}")]
    UnknownPool(String),
    #[error("pool {0} already exists")]
    PoolExists(String),
    #[error("invalid range [{lower}, {upper}]")]
    InvalidRange { lower: i32, upper: i32 },
    #[error("not enough liquidity in position: have {have}, remove {remove}")]
    InsufficientPositionLiquidity { have: u128, remove: u128 },
    #[error("swap rejected: {0}")]
    SwapRejected(String),
    #[error("cannot take {requested} of currency{currency}: only {owed} owed")]
    TakeExceedsCredit { currency: u8, requested: String, owed: String },
    #[error("ledger math: {0}")]
    Math(#[from] MathError),
}

/// Errors surfaced by the auction controller to its host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuctionError {
    #[error("invalid auction parameters: {0}")]
    InvalidParameters(String),
    #[error("auction {0} is not initialized")]
    UnknownPool(String),
    #[error("auction {0} is already initialized")]
    AlreadyInitialized(String),
    #[error("trade at {now} is before auction start {start}")]
    BeforeStart { now: u64, start: u64 },
    #[error("auction is closed")]
    AuctionClosed,
    #[error("insufficient {what} inventory: need {needed}, have {available}")]
    InsufficientInventory { what: &'static str, needed: String, available: String },
    #[error("invalid slug {kind}: [{lower}, {upper}] with liquidity {liquidity}")]
    InvalidSlug { kind: &'static str, lower: i32, upper: i32, liquidity: u128 },
    #[error("slugs out of order: {0}")]
    SlugOrder(String),
    #[error("price did not converge: expected tick {expected}, ledger at {actual}")]
    PriceNotConverged { expected: i32, actual: i32 },
    #[error("trade moved price to tick {tick}, beyond the settled range edge {edge}")]
    SwapBelowRange { tick: i32, edge: i32 },
    #[error(transparent)]
    Math(#[from] MathError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type AuctionResult<T> = Result<T, AuctionError>;
