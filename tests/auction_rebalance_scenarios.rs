use doppler_auction::engine::geometry::validate_slugs;
use doppler_auction::engine::{AuctionController, AuctionHost};
use doppler_auction::errors::{AuctionError, LedgerError};
use doppler_auction::ledger::{InMemoryLedger, LedgerAdapter, TradeLedger};
use doppler_auction::math::fixed_point::{u256_to_bigint, WAD};
use doppler_auction::math::tick_math::get_sqrt_ratio_at_tick;
use doppler_auction::models::*;
use ethers::types::{Address, U256};
use num_bigint::BigInt;

const HOUR: u64 = 3_600;

fn params(selling_token0: bool) -> AuctionParameters {
    let (start_tick, end_tick) = if selling_token0 { (6_000, -6_000) } else { (-6_000, 6_000) };
    AuctionParameters {
        total_units_to_sell: U256::from(1_000_000u64),
        start_time: 1_000,
        end_time: 1_000 + 24 * HOUR,
        start_tick,
        end_tick,
        epoch_length: HOUR,
        gamma: 600,
        tick_spacing: 60,
        selling_token0,
        minimum_proceeds: U256::zero(),
        maximum_proceeds: U256::MAX,
    }
}

fn pool_key(fee_ppm: u32) -> PoolKey {
    PoolKey {
        currency0: Address::from_low_u64_be(0xa0),
        currency1: Address::from_low_u64_be(0xb0),
        fee_ppm,
        tick_spacing: 60,
        hooks: Address::from_low_u64_be(0xd0),
    }
}

fn custody() -> Address {
    Address::from_low_u64_be(0xd0)
}

fn setup(p: &AuctionParameters, fee_ppm: u32) -> (AuctionController, InMemoryLedger, PoolId) {
    let mut ledger = InMemoryLedger::new();
    let id = ledger.initialize_pool(pool_key(fee_ppm), p.start_tick).unwrap();
    let mut controller = AuctionController::new(custody());
    let inventory = Inventory { asset: p.total_units_to_sell, numeraire: U256::zero() };
    controller.on_initialize(&mut ledger, &id, p.clone(), inventory).unwrap();
    (controller, ledger, id)
}

fn before(controller: &mut AuctionController, ledger: &mut InMemoryLedger, id: &PoolId, now: u64) -> TradeHookOutcome {
    controller
        .on_trade(ledger, id, &TradeContext { now, phase: TradePhase::Before })
        .unwrap()
}

/// Feed a synthetic fill through the after hook at the ledger's current price.
fn record_fill(
    controller: &mut AuctionController,
    ledger: &mut InMemoryLedger,
    id: &PoolId,
    now: u64,
    asset_out: i128,
    numeraire_in: i128,
) {
    let p = controller.parameters(id).unwrap();
    let (direction, delta) = if p.selling_token0 {
        (SwapDirection::OneForZero, BalanceDelta::new(asset_out, -numeraire_in))
    } else {
        (SwapDirection::ZeroForOne, BalanceDelta::new(-numeraire_in, asset_out))
    };
    let outcome = SwapOutcome { direction, delta, fee: U256::zero(), slot0: ledger.slot0(id).unwrap() };
    controller
        .on_trade(ledger, id, &TradeContext { now, phase: TradePhase::After(outcome) })
        .unwrap();
}

fn assert_price_at(ledger: &InMemoryLedger, id: &PoolId, tick: i32) {
    let sqrt = u256_to_bigint(ledger.slot0(id).unwrap().sqrt_price_x96);
    assert_eq!(sqrt, get_sqrt_ratio_at_tick(tick).unwrap(), "ledger price not at tick {}", tick);
}

#[tokio::test]
async fn test_no_sales_through_epoch_four_applies_four_epochs_of_drift() {
    println!("=== NO SALES UNTIL EPOCH 4 ===");
    let p = params(true);
    let (mut controller, mut ledger, id) = setup(&p, 3_000);

    let now = p.start_time + 3 * HOUR + 120;
    let report = before(&mut controller, &mut ledger, &id, now).rebalance.unwrap();
    println!("  epoch {} passed {} policy {} delta {}", report.epoch, report.epochs_passed, report.policy, report.accumulator_delta);
    println!("  target tick {}, slugs {:?}", report.target_tick, report.slugs);

    assert_eq!(report.epoch, 4);
    assert_eq!(report.epochs_passed, 4);
    assert_eq!(report.policy, "no_sales");
    assert_eq!(report.accumulator_delta, 4 * p.max_tick_delta_per_epoch());
    assert_eq!(report.accumulator_delta, -2_000 * WAD);

    let state = controller.state(&id).unwrap();
    assert_eq!(state.last_epoch, 4);
    assert_eq!(state.tick_accumulator, -2_000 * WAD);

    // reference 6000 - 2000 = 4000 floors to 3960; the market sat above the band
    assert_eq!(report.target_tick, 3_960 + 600);
    assert_price_at(&ledger, &id, report.target_tick);
    assert_eq!(ledger.outstanding(&id).unwrap(), BalanceDelta::default());
    println!("✅ four epochs of drift applied in one rebalance");
}

#[tokio::test]
async fn test_second_trade_in_epoch_is_a_no_op() {
    println!("\n=== IDEMPOTENT WITHIN AN EPOCH ===");
    let p = params(true);
    let (mut controller, mut ledger, id) = setup(&p, 3_000);

    let first = before(&mut controller, &mut ledger, &id, p.start_time + HOUR + 1);
    assert!(first.rebalance.is_some());
    let state = controller.state(&id).unwrap().clone();
    let slugs = controller.slugs(&id).unwrap().clone();
    let slot0 = ledger.slot0(&id).unwrap();

    for offset in [2, 600, HOUR - 1] {
        let again = before(&mut controller, &mut ledger, &id, p.start_time + HOUR + offset);
        assert!(again.rebalance.is_none());
    }
    assert_eq!(controller.state(&id).unwrap(), &state);
    assert_eq!(controller.slugs(&id).unwrap(), &slugs);
    assert_eq!(ledger.slot0(&id).unwrap(), slot0);
    println!("✅ state, slugs and ledger untouched by repeat triggers");
}

#[tokio::test]
async fn test_exactly_on_pace_leaves_the_curve_alone() {
    println!("\n=== ON PACE ===");
    let p = params(true);
    let (mut controller, mut ledger, id) = setup(&p, 0);

    let now = p.start_time + HOUR;
    let expected = p.expected_units_sold(now).unwrap();
    println!("  expected by epoch 2: {}", expected);
    record_fill(&mut controller, &mut ledger, &id, p.start_time + 10, expected.as_u128() as i128, 0);

    let report = before(&mut controller, &mut ledger, &id, now).rebalance.unwrap();
    assert_eq!(report.policy, "under_pace");
    assert_eq!(report.accumulator_delta, 0);
    assert_eq!(controller.state(&id).unwrap().tick_accumulator, 0);
    assert_eq!(controller.state(&id).unwrap().units_sold_at_last_epoch, expected);
    println!("✅ zero drift when sales match the schedule");
}

#[tokio::test]
async fn test_double_pace_never_lowers_the_sale_price() {
    println!("\n=== DOUBLE PACE ===");
    for selling_token0 in [true, false] {
        let p = params(selling_token0);
        let (mut controller, mut ledger, id) = setup(&p, 0);

        let now = p.start_time + HOUR;
        let expected = p.expected_units_sold(now).unwrap();
        record_fill(&mut controller, &mut ledger, &id, p.start_time + 10, 2 * expected.as_u128() as i128, 0);

        let report = before(&mut controller, &mut ledger, &id, now).rebalance.unwrap();
        println!("  selling token0 = {}: policy {} delta {}", selling_token0, report.policy, report.accumulator_delta);
        assert_eq!(report.policy, "over_pace");
        assert!(report.accumulator_delta * p.direction() as i128 >= 0);
    }
    println!("✅ over-pace drift only moves toward a higher sale price");
}

#[tokio::test]
async fn test_steady_buyer_keeps_every_invariant() {
    println!("\n=== STEADY BUYER OVER THE WHOLE AUCTION ===");
    let p = params(true);
    let mut ledger = InMemoryLedger::new();
    let id = ledger.initialize_pool(pool_key(3_000), p.start_tick).unwrap();
    let mut host = AuctionHost::new(ledger, custody());
    host.initialize(&id, p.clone(), Inventory { asset: p.total_units_to_sell, numeraire: U256::zero() })
        .unwrap();

    let total = u256_to_bigint(p.total_units_to_sell);
    let mut last_epoch = 0;
    for epoch in 1..=p.total_epochs() {
        let now = p.start_time + (epoch - 1) * HOUR + 30;
        let buy = SwapRequest { direction: SwapDirection::OneForZero, amount_in: U256::from(20_000u64), sqrt_price_limit_x96: None };
        let receipt = host.trade(&id, &buy, now).unwrap();

        let state = host.controller().state(&id).unwrap().clone();
        let inventory = host.controller().inventory(&id).unwrap().clone();
        let slugs = host.controller().slugs(&id).unwrap().clone();
        let pool = host.ledger().pool(&id).unwrap();
        println!(
            "  epoch {:>2}: {} tick {:>6} sold {:>7} proceeds {:>7}",
            epoch,
            receipt.rebalance.as_ref().map(|r| r.policy).unwrap_or("-"),
            receipt.outcome.slot0.tick,
            state.total_units_sold,
            state.total_proceeds
        );

        assert_eq!(receipt.rebalance.as_ref().map(|r| r.epoch), Some(epoch));
        assert!(state.last_epoch > last_epoch);
        last_epoch = state.last_epoch;
        validate_slugs(&p, &slugs).unwrap();
        assert_eq!(host.ledger().outstanding(&id).unwrap(), BalanceDelta::default());

        // every unit is in custody, in the pool, or with a buyer
        let sold = u256_to_bigint(state.total_units_sold);
        assert_eq!(u256_to_bigint(inventory.asset) + &pool.reserves[0] + sold, total);
        assert_eq!(u256_to_bigint(inventory.numeraire) + &pool.reserves[1], u256_to_bigint(state.total_proceeds));
        assert!(pool.reserves[0] >= BigInt::from(0));
    }
    assert_eq!(host.controller().phase(&id, p.end_time).unwrap(), AuctionPhase::Closed);
    println!("✅ conservation, ordering and monotonic epochs held for every epoch");
}

#[tokio::test]
async fn test_wide_band_discovery_slug_is_placed_then_replaced() {
    println!("\n=== DISCOVERY SLUG WITH A WIDE BAND ===");
    let p = AuctionParameters { gamma: 3_000, ..params(true) };
    let (mut controller, mut ledger, id) = setup(&p, 3_000);

    let first = before(&mut controller, &mut ledger, &id, p.start_time + 5).rebalance.unwrap();
    println!("  epoch {} slugs {:?}", first.epoch, first.slugs);
    let discovery = first.slugs.discovery;
    // reference 5500 floors to 5460, so the band reaches 8460; upper is 120 wide from 6000
    assert_eq!(first.target_tick, 6_000);
    assert_eq!((first.slugs.upper.tick_lower, first.slugs.upper.tick_upper), (6_000, 6_120));
    assert_eq!((discovery.tick_lower, discovery.tick_upper), (6_120, 8_460));
    assert!(discovery.liquidity > 0);
    assert!(first.instructions.contains(&LedgerInstruction::AddRange(discovery)));
    validate_slugs(&p, &first.slugs).unwrap();
    assert_eq!(ledger.outstanding(&id).unwrap(), BalanceDelta::default());

    let second = before(&mut controller, &mut ledger, &id, p.start_time + HOUR + 5).rebalance.unwrap();
    println!("  epoch {} slugs {:?}", second.epoch, second.slugs);
    assert_eq!(second.epoch, 2);
    assert!(second.instructions.contains(&LedgerInstruction::RemoveRange(discovery)));
    assert_eq!((second.slugs.discovery.tick_lower, second.slugs.discovery.tick_upper), (6_120, 7_980));
    assert!(second.slugs.discovery.liquidity > 0);
    validate_slugs(&p, &second.slugs).unwrap();
    assert_eq!(controller.slugs(&id).unwrap(), &second.slugs);
    assert_eq!(ledger.outstanding(&id).unwrap(), BalanceDelta::default());
    println!("✅ discovery slug removed and re-placed as the band drifts");
}

#[tokio::test]
async fn test_trade_below_settled_range_reverts_everything() {
    println!("\n=== SWAP BELOW RANGE ===");
    let p = params(true);
    let mut ledger = InMemoryLedger::new();
    let id = ledger.initialize_pool(pool_key(0), p.start_tick).unwrap();
    let mut host = AuctionHost::new(ledger, custody());
    host.initialize(&id, p.clone(), Inventory { asset: p.total_units_to_sell, numeraire: U256::zero() })
        .unwrap();
    let slot0 = host.ledger().slot0(&id).unwrap();

    // nothing backs the price below the band, so a dump runs straight through it
    let dump = SwapRequest { direction: SwapDirection::ZeroForOne, amount_in: U256::from(1_000u64), sqrt_price_limit_x96: None };
    let err = host.trade(&id, &dump, p.start_time + 30).unwrap_err();
    println!("  rejected: {}", err);
    assert!(matches!(err, AuctionError::SwapBelowRange { .. }));

    assert_eq!(host.ledger().slot0(&id).unwrap(), slot0);
    assert_eq!(host.controller().state(&id).unwrap().last_epoch, 0);
    println!("✅ ledger and auction state rolled back");
}

#[tokio::test]
async fn test_maximum_proceeds_closes_the_auction_early() {
    println!("\n=== EARLY EXIT ===");
    let mut p = params(true);
    p.maximum_proceeds = U256::from(500u64);
    let mut ledger = InMemoryLedger::new();
    let id = ledger.initialize_pool(pool_key(0), p.start_tick).unwrap();
    let mut host = AuctionHost::new(ledger, custody());
    host.initialize(&id, p.clone(), Inventory { asset: p.total_units_to_sell, numeraire: U256::zero() })
        .unwrap();

    let buy = SwapRequest { direction: SwapDirection::OneForZero, amount_in: U256::from(1_000u64), sqrt_price_limit_x96: None };
    let receipt = host.trade(&id, &buy, p.start_time + 30).unwrap();
    assert!(receipt.early_exit_triggered);
    assert!(host.controller().state(&id).unwrap().early_exit);
    assert_eq!(host.controller().phase(&id, p.start_time + 31).unwrap(), AuctionPhase::Closed);
    assert!(host.controller().migration_ready(&id, p.start_time + 31).unwrap());

    let err = host.trade(&id, &buy, p.start_time + 40).unwrap_err();
    assert!(matches!(err, AuctionError::AuctionClosed));
    println!("✅ proceeds cap reached, further trades refused");
}

/// Delegates to the in-memory ledger but refuses to add liquidity once armed.
struct FlakyLedger {
    inner: InMemoryLedger,
    fail_adds: bool,
}

impl LedgerAdapter for FlakyLedger {
    type Checkpoint = <InMemoryLedger as LedgerAdapter>::Checkpoint;

    fn slot0(&self, pool: &PoolId) -> Result<Slot0, LedgerError> {
        self.inner.slot0(pool)
    }

    fn modify_range(&mut self, pool: &PoolId, lower: i32, upper: i32, delta: i128) -> Result<BalanceDelta, LedgerError> {
        if self.fail_adds && delta > 0 {
            return Err(LedgerError::SwapRejected("liquidity adds disabled".into()));
        }
        self.inner.modify_range(pool, lower, upper, delta)
    }

    fn swap(&mut self, pool: &PoolId, request: &SwapRequest) -> Result<SwapOutcome, LedgerError> {
        self.inner.swap(pool, request)
    }

    fn take(&mut self, pool: &PoolId, currency: Currency, amount: U256, to: Address) -> Result<(), LedgerError> {
        self.inner.take(pool, currency, amount, to)
    }

    fn deposit(&mut self, pool: &PoolId, currency: Currency, amount: U256) -> Result<(), LedgerError> {
        self.inner.deposit(pool, currency, amount)
    }

    fn checkpoint(&self, pool: &PoolId) -> Result<Self::Checkpoint, LedgerError> {
        self.inner.checkpoint(pool)
    }

    fn rollback(&mut self, pool: &PoolId, checkpoint: Self::Checkpoint) -> Result<(), LedgerError> {
        self.inner.rollback(pool, checkpoint)
    }
}

impl TradeLedger for FlakyLedger {
    fn execute_trade(&mut self, pool: &PoolId, request: &SwapRequest) -> Result<SwapOutcome, LedgerError> {
        self.inner.execute_trade(pool, request)
    }
}

#[tokio::test]
async fn test_failed_batch_rolls_back_ledger_and_state() {
    println!("\n=== ATOMIC ROLLBACK ===");
    let p = params(false);
    let mut inner = InMemoryLedger::new();
    let id = inner.initialize_pool(pool_key(3_000), p.start_tick).unwrap();
    let mut ledger = FlakyLedger { inner, fail_adds: false };
    let mut controller = AuctionController::new(custody());
    controller
        .on_initialize(&mut ledger, &id, p.clone(), Inventory { asset: p.total_units_to_sell, numeraire: U256::zero() })
        .unwrap();

    let record = controller.record(&id).unwrap().clone();
    let pool_before = ledger.inner.pool(&id).unwrap().clone();
    ledger.fail_adds = true;

    let err = controller
        .on_trade(&mut ledger, &id, &TradeContext { now: p.start_time + 2 * HOUR, phase: TradePhase::Before })
        .unwrap_err();
    println!("  rebalance failed: {}", err);
    assert!(matches!(err, AuctionError::Ledger(LedgerError::SwapRejected(_))));

    let pool_after = ledger.inner.pool(&id).unwrap();
    assert_eq!(controller.record(&id).unwrap(), &record);
    assert_eq!(pool_after.sqrt_price_x96, pool_before.sqrt_price_x96);
    assert_eq!(pool_after.positions, pool_before.positions);
    assert_eq!(pool_after.owed, pool_before.owed);
    assert_eq!(pool_after.liquidity, pool_before.liquidity);

    // once the ledger recovers the same epoch rebalances normally
    ledger.fail_adds = false;
    let outcome = controller
        .on_trade(&mut ledger, &id, &TradeContext { now: p.start_time + 2 * HOUR, phase: TradePhase::Before })
        .unwrap();
    assert_eq!(outcome.rebalance.map(|r| r.epoch), Some(3));
    println!("✅ nothing leaked from the failed batch");
}
