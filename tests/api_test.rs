//! HTTP API tests over a router seeded from configuration

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use swap_aggr::config::AppConfig;
use swap_aggr::control::VenueRegistry;
use swap_aggr::router::execution::{ExecutedLeg, ExecutionReceipt};
use swap_aggr::router::validation::RequestLimits;
use swap_aggr::router::{
    create_api_router, ExecutionEngine, ExecutionPlan, Router, RouterSettings, Settlement,
};
use swap_aggr::state::{InMemoryPriceSource, PriceSource};
use swap_aggr::venues::VenueAdapter;
use tower::ServiceExt;

const FIXTURE: &str = r#"
chain_id: 999
assets:
  - symbol: WHYPE
    address: "0x5555555555555555555555555555555555555555"
  - symbol: USDC
    address: "0xB88339CB7199b77E23DB6E890353E22632Ba630f"
    decimals: 6
venues:
  - name: hyperswap-v2
    family: uniswap-v2
    fee_bps: 30
  - name: kittenswap
    family: amm-v2
    fee_bps: 25
  - name: hypercore
    family: hyperliquid-native
    fee_bps: 5
    enabled: false
pools:
  - venue: hyperswap-v2
    token_in: WHYPE
    token_out: USDC
    model:
      kind: constant-product
      reserve_in: "1000000000000000000000"
      reserve_out: "25000000000"
  - venue: kittenswap
    token_in: WHYPE
    token_out: USDC
    model:
      kind: constant-product
      reserve_in: "400000000000000000000"
      reserve_out: "9900000000"
  - venue: hypercore
    token_in: WHYPE
    token_out: USDC
    model:
      kind: order-book
      levels:
        - price: 0.000000000025
          max_input: "500000000000000000000"
"#;

const WHYPE: &str = "0x5555555555555555555555555555555555555555";
const USDC: &str = "0xb88339cb7199b77e23db6e890353e22632ba630f";
const RECIPIENT: &str = "0x0000000000000000000000000000000000000042";

/// Settles every plan at its minimum plus one unit.
struct FillAtMinimum;

#[async_trait]
impl Settlement for FillAtMinimum {
    async fn execute(&self, plan: &ExecutionPlan) -> Result<ExecutionReceipt> {
        Ok(ExecutionReceipt {
            transaction_ref: "0xfeed".to_string(),
            realized_amount_out: plan.minimum_output() + 1,
            realized_gas: plan.route().aggregate_gas_estimate,
            executed_legs: plan
                .instructions()
                .iter()
                .map(|i| ExecutedLeg {
                    venue: i.venue.clone(),
                    amount_in: i.amount_in,
                    amount_out: i.min_amount_out,
                    gas_used: 100_000,
                })
                .collect(),
        })
    }
}

async fn create_test_app(settlement: Option<Arc<dyn Settlement>>) -> axum::Router {
    let config = AppConfig::from_yaml_str(FIXTURE).unwrap();
    let assets = config.asset_book().unwrap();
    let memory = InMemoryPriceSource::default();
    config.seed_pools(&memory, &assets, Utc::now()).await.unwrap();
    let source: Arc<dyn PriceSource> = Arc::new(memory);

    let adapter_settings = Arc::new(config.adapter_settings(&assets).unwrap());
    let adapters = config
        .venues()
        .unwrap()
        .into_iter()
        .map(|venue| VenueAdapter::new(venue, source.clone(), adapter_settings.clone()))
        .collect();
    let registry = Arc::new(VenueRegistry::new(adapters).unwrap());

    let settings = RouterSettings {
        collector: config.collector_settings(),
        optimizer: config.optimizer_settings(),
        cost: config.cost_settings(),
        limits: RequestLimits::default(),
        default_deadline: ChronoDuration::minutes(20),
    };
    let mut router = Router::new(registry, Arc::new(assets), settings).with_pool_source(source);
    if let Some(settlement) = settlement {
        router = router.with_executor(Arc::new(ExecutionEngine::new(settlement)));
    }
    create_api_router(Arc::new(router))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn one_whype_quote() -> Value {
    json!({
        "tokenIn": "WHYPE",
        "tokenOut": USDC,
        "amountIn": "1000000000000000000",
        "slippageToleranceBps": 50
    })
}

fn amount(value: &Value) -> u128 {
    value.as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn health_check_is_ok() {
    let app = create_test_app(None).await;
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn quote_returns_best_route_and_all_quotes() {
    let app = create_test_app(None).await;
    let response = app
        .oneshot(post_json("/api/v1/quote", one_whype_quote()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    let data = &body["data"];
    let best = &data["bestRoute"];

    let total = amount(&best["totalOutput"]);
    let minimum = amount(&best["minimumOutput"]);
    assert!(total > 24_000_000, "total output {total}");
    assert!(minimum <= total);
    assert!(minimum >= total - total / 200 - 1);

    let legs = best["legs"].as_array().unwrap();
    assert!(!legs.is_empty());
    let leg_sum: u128 = legs.iter().map(|l| amount(&l["amountIn"])).sum();
    assert_eq!(leg_sum, 1_000_000_000_000_000_000);
    assert_eq!(legs[0]["path"][0], WHYPE);

    // The disabled order book is never queried.
    assert_eq!(data["allQuotes"].as_array().unwrap().len(), 2);
    assert_eq!(data["metadata"]["venuesQueried"], 2);
    assert_eq!(data["metadata"]["quotesFound"], 2);
    assert_eq!(data["metadata"]["chainId"], 999);
    assert!(data["metadata"]["estimatedExecutionTime"].as_u64().unwrap() >= 1_000);
}

#[tokio::test]
async fn excluded_venues_are_not_quoted() {
    let app = create_test_app(None).await;
    let mut request = one_whype_quote();
    request["excludeDexs"] = json!(["kittenswap"]);
    let response = app
        .oneshot(post_json("/api/v1/quote", request))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let quotes = body["data"]["allQuotes"].as_array().unwrap();
    assert_eq!(quotes.len(), 1);
    assert_eq!(quotes[0]["venue"], "hyperswap-v2");
}

#[tokio::test]
async fn invalid_quote_lists_every_problem() {
    let app = create_test_app(None).await;
    let response = app
        .oneshot(post_json(
            "/api/v1/quote",
            json!({
                "tokenIn": "WHYPE",
                "tokenOut": "WHYPE",
                "amountIn": "0",
                "slippageToleranceBps": 9000
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["details"].as_array().unwrap().len() >= 3);
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let app = create_test_app(None).await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/quote")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn quote_with_every_venue_disabled_is_not_found() {
    let app = create_test_app(None).await;
    for venue in ["hyperswap-v2", "kittenswap"] {
        let response = app
            .clone()
            .oneshot(post_json(&format!("/api/v1/venues/{venue}/disable"), json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["enabled"], false);
    }

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/quote", one_whype_quote()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["success"], false);

    let stats = body_json(app.oneshot(get("/api/v1/stats")).await.unwrap()).await;
    assert_eq!(stats["quotes"]["noLiquidity"], 1);
    assert_eq!(stats["venuesEnabled"], 0);
}

#[tokio::test]
async fn toggling_unknown_venue_is_not_found() {
    let app = create_test_app(None).await;
    let response = app
        .oneshot(post_json("/api/v1/venues/nowhere/enable", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tokens_and_venues_are_listed() {
    let app = create_test_app(None).await;

    let tokens = body_json(app.clone().oneshot(get("/api/v1/tokens")).await.unwrap()).await;
    let tokens = tokens["data"].as_array().unwrap();
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0]["symbol"], "USDC");
    assert_eq!(tokens[0]["address"], USDC);
    assert_eq!(tokens[0]["decimals"], 6);
    assert_eq!(tokens[1]["symbol"], "WHYPE");

    let venues = body_json(app.oneshot(get("/api/v1/venues")).await.unwrap()).await;
    let venues = venues["data"].as_array().unwrap();
    assert_eq!(venues.len(), 3);
    let hypercore = venues.iter().find(|v| v["name"] == "hypercore").unwrap();
    assert_eq!(hypercore["enabled"], false);
    assert_eq!(hypercore["family"], "order-book");
}

#[tokio::test]
async fn pools_are_listed_with_family_and_observation_time() {
    let app = create_test_app(None).await;
    let response = app.oneshot(get("/api/v1/pools")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let pools = body["data"].as_array().unwrap();

    // Two directions for each AMM pool, one side for the order book.
    assert_eq!(pools.len(), 5);
    let venues: Vec<&str> = pools.iter().map(|p| p["venue"].as_str().unwrap()).collect();
    assert_eq!(
        venues,
        ["hypercore", "hyperswap-v2", "hyperswap-v2", "kittenswap", "kittenswap"]
    );

    let book = &pools[0];
    assert_eq!(book["family"], "order-book");
    assert_eq!(book["enabled"], false);
    assert_eq!(book["model"]["kind"], "order-book");

    let v2 = &pools[1];
    assert_eq!(v2["tokenIn"], WHYPE);
    assert_eq!(v2["tokenOut"], USDC);
    assert_eq!(v2["family"], "amm-v2");
    assert_eq!(v2["enabled"], true);
    assert_eq!(v2["model"]["kind"], "constant-product");
    assert_eq!(v2["model"]["reserve_in"], "1000000000000000000000");
    assert!(v2["observedAt"].is_string());
    assert_eq!(pools[2]["tokenIn"], USDC);
    assert_eq!(pools[2]["model"]["reserve_out"], "1000000000000000000000");
}

#[tokio::test]
async fn swap_without_settlement_is_unavailable() {
    let app = create_test_app(None).await;
    let response = app
        .oneshot(post_json("/api/v1/swap", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

/// Quote, then send the chosen legs back for execution.
async fn quoted_swap(app: &axum::Router, bump_minimum: u128) -> Request<Body> {
    let quote = body_json(
        app.clone()
            .oneshot(post_json("/api/v1/quote", one_whype_quote()))
            .await
            .unwrap(),
    )
    .await;
    let best = &quote["data"]["bestRoute"];
    let legs: Vec<Value> = best["legs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| json!({"venue": l["venue"], "amountIn": l["amountIn"]}))
        .collect();
    let minimum = amount(&best["minimumOutput"]) + bump_minimum;

    post_json(
        "/api/v1/swap",
        json!({
            "tokenIn": "WHYPE",
            "tokenOut": "USDC",
            "route": {"amountIn": best["amountIn"], "legs": legs},
            "amountOutMin": minimum.to_string(),
            "recipient": RECIPIENT,
            "deadline": (Utc::now() + ChronoDuration::minutes(5)).timestamp()
        }),
    )
}

#[tokio::test]
async fn swap_settles_quoted_route() {
    let app = create_test_app(Some(Arc::new(FillAtMinimum))).await;
    let request = quoted_swap(&app, 0).await;
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let data = &body["data"];
    assert_eq!(data["transactionRef"], "0xfeed");
    let minimum = amount(&data["minimumOutput"]);
    assert_eq!(amount(&data["realizedAmountOut"]), minimum + 1);
    let leg_minimums: u128 = data["executedLegs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| amount(&l["amountOut"]))
        .sum();
    assert!(leg_minimums <= minimum);

    let stats = body_json(app.oneshot(get("/api/v1/stats")).await.unwrap()).await;
    assert_eq!(stats["execution"]["successful_executions"], 1);
}

#[tokio::test]
async fn swap_minimum_above_current_output_conflicts() {
    let app = create_test_app(Some(Arc::new(FillAtMinimum))).await;
    // Far above anything one WHYPE can buy.
    let request = quoted_swap(&app, 1_000_000_000).await;
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["success"], false);
}

#[tokio::test]
async fn metrics_are_exposed_as_text() {
    let app = create_test_app(None).await;
    app.clone()
        .oneshot(post_json("/api/v1/quote", one_whype_quote()))
        .await
        .unwrap();
    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("aggr_venue_quote_latency_seconds"));
}
