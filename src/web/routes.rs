use std::sync::{Arc, MutexGuard};

use ethers::types::U256;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{get, post, State};

use crate::bootstrap::AppState;
use crate::engine::AuctionHost;
use crate::errors::AuctionError;
use crate::ledger::{InMemoryLedger, LedgerAdapter};
use crate::models::{AuctionPhase, Currency, SwapDirection, SwapRequest};
use crate::web::dto::{
    AuctionResponse, ErrorResponse, InventoryDto, ParametersDto, SlugDto, SlugReport, StateDto, TradeRequestDto,
    TradeResponse,
};

type ApiError = Custom<Json<ErrorResponse>>;

fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

fn api_error(status: Status, error: impl ToString) -> ApiError {
    Custom(status, Json(ErrorResponse { timestamp_utc: timestamp(), error: error.to_string() }))
}

fn lock(app_state: &AppState) -> Result<MutexGuard<'_, AuctionHost<InMemoryLedger>>, ApiError> {
    app_state.host.lock().map_err(|_| {
        log::error!("auction host mutex poisoned");
        api_error(Status::InternalServerError, "auction host unavailable")
    })
}

fn status_for(e: &AuctionError) -> Status {
    match e {
        AuctionError::BeforeStart { .. } | AuctionError::AuctionClosed | AuctionError::SwapBelowRange { .. } => {
            Status::Conflict
        }
        AuctionError::UnknownPool(_) => Status::NotFound,
        AuctionError::Ledger(_) => Status::UnprocessableEntity,
        _ => Status::InternalServerError,
    }
}

fn phase_name(phase: AuctionPhase) -> &'static str {
    match phase {
        AuctionPhase::Dormant => "dormant",
        AuctionPhase::Active => "active",
        AuctionPhase::Rebalanced => "rebalanced",
        AuctionPhase::Closed => "closed",
    }
}

#[get("/api/v1/auction")]
pub fn auction(app_state: &State<Arc<AppState>>) -> Result<Json<AuctionResponse>, ApiError> {
    let host = lock(app_state)?;
    let pool = &app_state.pool_id;
    let now = unix_now();
    let internal = |e: AuctionError| api_error(status_for(&e), e);

    let record = host.controller().record(pool).map_err(internal)?;
    let slot0 = host.ledger().slot0(pool).map_err(|e| internal(e.into()))?;
    let phase = record.params.phase(now, &record.state);

    Ok(Json(AuctionResponse {
        timestamp_utc: timestamp(),
        pool_id: pool.to_string(),
        phase: phase_name(phase).to_string(),
        current_epoch: record.params.current_epoch(now).ok().map(|e| e.min(record.params.total_epochs())),
        market_tick: slot0.tick,
        migration_ready: record.params.migration_ready(now, &record.state),
        parameters: ParametersDto::from(record.params.as_ref()),
        state: StateDto::from(&record.state),
        inventory: InventoryDto::from(&record.inventory),
    }))
}

#[get("/api/v1/auction/slugs")]
pub fn slugs(app_state: &State<Arc<AppState>>) -> Result<Json<SlugReport>, ApiError> {
    let host = lock(app_state)?;
    let slugs = host
        .controller()
        .slugs(&app_state.pool_id)
        .map_err(|e| api_error(status_for(&e), e))?;
    Ok(Json(SlugReport { data: slugs.iter().map(SlugDto::from).collect() }))
}

#[post("/api/v1/auction/trades", format = "json", data = "<request>")]
pub fn trade(
    request: Json<TradeRequestDto>,
    app_state: &State<Arc<AppState>>,
) -> Result<Json<TradeResponse>, ApiError> {
    let amount = U256::from_dec_str(request.amount.trim())
        .map_err(|_| api_error(Status::BadRequest, format!("amount '{}' is not a decimal integer", request.amount)))?;
    if amount.is_zero() {
        return Err(api_error(Status::BadRequest, "amount must be positive"));
    }

    let mut host = lock(app_state)?;
    let pool = app_state.pool_id;
    let params = host.controller().parameters(&pool).map_err(|e| api_error(status_for(&e), e))?;

    // buying the asset means paying in the numeraire
    let input = match request.direction.to_ascii_lowercase().as_str() {
        "buy" => params.numeraire(),
        "sell" => params.asset(),
        other => return Err(api_error(Status::BadRequest, format!("unknown direction '{}'", other))),
    };
    let direction = match input {
        Currency::Currency0 => SwapDirection::ZeroForOne,
        Currency::Currency1 => SwapDirection::OneForZero,
    };
    let now = request.now.unwrap_or_else(unix_now);

    let receipt = host
        .trade(&pool, &SwapRequest { direction, amount_in: amount, sqrt_price_limit_x96: None }, now)
        .map_err(|e| {
            log::warn!("trade {} {} at {} rejected: {}", request.direction, amount, now, e);
            api_error(status_for(&e), e)
        })?;

    let outcome = &receipt.outcome;
    let paid = outcome.delta.of(direction.input()).unsigned_abs();
    let received = outcome.delta.of(direction.output()).max(0) as u128;
    Ok(Json(TradeResponse {
        timestamp_utc: timestamp(),
        direction: request.direction.to_ascii_lowercase(),
        amount_in: paid.to_string(),
        amount_out: received.to_string(),
        fee: outcome.fee.to_string(),
        tick: outcome.slot0.tick,
        rebalanced_epoch: receipt.rebalance.as_ref().map(|r| r.epoch),
        rebalance_policy: receipt.rebalance.as_ref().map(|r| r.policy.to_string()),
        early_exit_triggered: receipt.early_exit_triggered,
    }))
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
