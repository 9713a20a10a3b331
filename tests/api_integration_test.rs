// tests/api_integration_test.rs
// ===================================
// Drives the HTTP surface against a freshly initialized simulated auction

use std::sync::Arc;

use doppler_auction::bootstrap::AppState;
use doppler_auction::config::Config;
use doppler_auction::web::routes::{auction, health, slugs, trade};
use rocket::http::{ContentType, Status};
use rocket::local::asynchronous::Client;
use rocket::routes;
use serde_json::{json, Value};

const START: u64 = 1_700_000_000;

fn test_config() -> Config {
    Config {
        port: 0,
        currency0_address: "0x0000000000000000000000000000000000000001".into(),
        currency1_address: "0x0000000000000000000000000000000000000002".into(),
        hooks_address: "0x00000000000000000000000000000000000000d0".into(),
        custody_address: "0x00000000000000000000000000000000000000d0".into(),
        fee_ppm: 3_000,
        tick_spacing: 60,
        initial_tick: None,
        total_units_to_sell: "1000000".into(),
        start_time: Some(START),
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

async fn client() -> Client {
    let state = AppState::at(&test_config(), START).expect("auction should initialize");
    let rocket = rocket::build()
        .manage(Arc::new(state))
        .mount("/", routes![auction, slugs, trade, health]);
    Client::tracked(rocket).await.expect("valid rocket instance")
}

async fn post_trade(client: &Client, body: Value) -> (Status, Value) {
    let response = client
        .post("/api/v1/auction/trades")
        .header(ContentType::JSON)
        .body(body.to_string())
        .dispatch()
        .await;
    let status = response.status();
    let json: Value = response.into_json().await.expect("json body");
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let client = client().await;
    let response = client.get("/health").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(response.into_string().await.as_deref(), Some("OK"));
    println!("✅ health endpoint responds");
}

#[tokio::test]
async fn test_auction_overview_structure() {
    let client = client().await;
    let response = client.get("/api/v1/auction").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.expect("json body");

    println!("📊 Auction overview:");
    println!("{}", serde_json::to_string_pretty(&body).expect("Failed to serialize overview"));

    for field in ["timestamp_utc", "pool_id", "phase", "market_tick", "migration_ready", "parameters", "state", "inventory"] {
        assert!(body.get(field).is_some(), "missing field {}", field);
    }
    assert_eq!(body["parameters"]["total_epochs"], json!(24));
    assert_eq!(body["parameters"]["total_units_to_sell"], json!("1000000"));
    assert_eq!(body["state"]["last_epoch"], json!(0));
    assert_eq!(body["market_tick"], json!(6_000));
    assert!(body["pool_id"].as_str().unwrap().starts_with("0x"));
    println!("✅ auction overview structure verified");
}

#[tokio::test]
async fn test_slug_report_format() {
    let client = client().await;
    let response = client.get("/api/v1/auction/slugs").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.expect("json body");

    let data = body["data"].as_array().expect("data array");
    let names: Vec<&str> = data.iter().map(|s| s["slugName"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["lowerSlug", "upperSlug", "pdSlug"]);
    for slug in data {
        assert!(slug["tickLower"].as_i64().unwrap() <= slug["tickUpper"].as_i64().unwrap());
        assert!(slug["liquidity"].as_str().is_some());
    }
    // nothing sold yet: only the upper and discovery slugs hold liquidity
    assert_eq!(data[0]["liquidity"], json!("0"));
    assert_ne!(data[1]["liquidity"], json!("0"));
    println!("✅ slug report matches the plotting format");
}

#[tokio::test]
async fn test_trade_flow() {
    let client = client().await;

    let (status, body) = post_trade(&client, json!({ "direction": "buy", "amount": "10000", "now": START + 60 })).await;
    println!("📈 buy: {}", body);
    assert_eq!(status, Status::Ok);
    assert_eq!(body["rebalanced_epoch"], json!(1));
    assert_eq!(body["rebalance_policy"], json!("no_sales"));
    assert_eq!(body["amount_in"], json!("10000"));
    assert_ne!(body["amount_out"], json!("0"));

    // same epoch: no second rebalance
    let (status, body) = post_trade(&client, json!({ "direction": "buy", "amount": "500", "now": START + 120 })).await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body["rebalanced_epoch"], Value::Null);

    let overview: Value = client.get("/api/v1/auction").dispatch().await.into_json().await.expect("json body");
    assert_eq!(overview["state"]["last_epoch"], json!(1));
    assert_ne!(overview["state"]["total_units_sold"], json!("0"));
    println!("✅ trades rebalance once per epoch and book sales");
}

#[tokio::test]
async fn test_trade_rejections() {
    let client = client().await;

    let (status, body) = post_trade(&client, json!({ "direction": "hold", "amount": "1", "now": START + 60 })).await;
    assert_eq!(status, Status::BadRequest);
    assert!(body["error"].as_str().unwrap().contains("direction"));

    let (status, _) = post_trade(&client, json!({ "direction": "buy", "amount": "-5", "now": START + 60 })).await;
    assert_eq!(status, Status::BadRequest);

    let (status, body) = post_trade(&client, json!({ "direction": "buy", "amount": "100", "now": START - 1 })).await;
    println!("⛔ early trade: {}", body);
    assert_eq!(status, Status::Conflict);

    let (status, _) = post_trade(&client, json!({ "direction": "buy", "amount": "100", "now": START + 86_400 })).await;
    assert_eq!(status, Status::Conflict);
    println!("✅ invalid and out-of-window trades rejected");
}
