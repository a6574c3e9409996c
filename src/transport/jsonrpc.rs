// JSON-RPC transport layer implementation
// This file implements the JSON-RPC client used to read venue pool state
// and to hand execution plans to the settlement service over HTTP
//
// Numan Thabit 2025 Nov

use crate::errors::AggrError;
use crate::router::execution::{ExecutionPlan, ExecutionReceipt, Settlement};
use crate::state::{PoolSnapshot, PriceSource};
use crate::venues::AssetRef;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct JsonRpc {
    http: Client,
    url: Url,
    next_id: Arc<AtomicU64>,
}

impl JsonRpc {
    pub fn new(url: Url, request_timeout: Duration) -> Result<Self, AggrError> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AggrError::Transport(format!("http client: {e}")))?;
        Ok(Self {
            http,
            url,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn endpoint(&self) -> &str {
        self.url.as_str()
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, AggrError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        let resp = self
            .http
            .post(self.url.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| AggrError::Transport(format!("jsonrpc send: {e}")))?;
        if !resp.status().is_success() {
            return Err(AggrError::Provider(format!("http {}", resp.status())));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| AggrError::Transport(format!("json parse: {e}")))?;
        if let Some(err) = body.get("error") {
            return Err(AggrError::Provider(err.to_string()));
        }
        serde_json::from_value(body["result"].clone())
            .map_err(|e| AggrError::Provider(format!("decode result: {e}")))
    }
}

/// Price source backed by a `venue_getPoolState` JSON-RPC service.
#[derive(Debug, Clone)]
pub struct RpcPriceSource {
    rpc: JsonRpc,
}

impl RpcPriceSource {
    pub fn new(rpc: JsonRpc) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl PriceSource for RpcPriceSource {
    async fn pool_state(
        &self,
        venue: &str,
        token_in: &AssetRef,
        token_out: &AssetRef,
    ) -> Result<Option<PoolSnapshot>, AggrError> {
        self.rpc
            .call(
                "venue_getPoolState",
                json!([venue, token_in.address, token_out.address, token_in.chain_id]),
            )
            .await
    }

    async fn readiness_probe(&self) -> Result<(), AggrError> {
        let _: Value = self.rpc.call("venue_health", json!([])).await?;
        Ok(())
    }
}

/// Settlement collaborator reached over JSON-RPC (`settlement_executePlan`).
#[derive(Debug, Clone)]
pub struct JsonRpcSettlement {
    rpc: JsonRpc,
}

impl JsonRpcSettlement {
    pub fn new(rpc: JsonRpc) -> Self {
        Self { rpc }
    }
}

/// Wire form of a plan; amounts as decimal strings.
pub fn plan_payload(plan: &ExecutionPlan) -> Value {
    json!({
        "recipient": plan.recipient(),
        "minimumOutput": plan.minimum_output().to_string(),
        "slippageToleranceBps": plan.slippage_tolerance_bps(),
        "deadline": plan.deadline().timestamp(),
        "amountIn": plan.route().amount_in.to_string(),
        "instructions": plan.instructions(),
    })
}

#[async_trait]
impl Settlement for JsonRpcSettlement {
    async fn execute(&self, plan: &ExecutionPlan) -> anyhow::Result<ExecutionReceipt> {
        let receipt: ExecutionReceipt = self
            .rpc
            .call("settlement_executePlan", json!([plan_payload(plan)]))
            .await?;
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::execution::ExecutionPlanner;
    use crate::router::routes::{Route, RouteKind, RouteLeg};
    use crate::venues::VenueFamily;

    #[test]
    fn payload_carries_frozen_minimum() {
        let leg = RouteLeg {
            venue: "hyperswap-v2".to_string(),
            venue_address: "0x7a250d5630b4cf539739df2c5dac4c659f2488d".to_string(),
            family: VenueFamily::AmmV2,
            fee_bps: 30,
            amount_in: 1_000,
            amount_out: 996,
            price_impact_bps: 10,
            gas_estimate: 150_000,
            path: vec![],
        };
        let route = Route::from_legs(RouteKind::SingleVenue, 1_000, vec![leg]);
        let plan = ExecutionPlanner::default()
            .plan(route, 100, None, "0x0000000000000000000000000000000000000042")
            .unwrap();
        let payload = plan_payload(&plan);
        assert_eq!(payload["minimumOutput"], "986");
        assert_eq!(payload["amountIn"], "1000");
        assert_eq!(payload["instructions"][0]["minAmountOut"], "986");
        assert_eq!(payload["instructions"][0]["family"], "amm-v2");
    }

    #[test]
    fn receipt_decodes_string_amounts() {
        let raw = json!({
            "transactionRef": "0xabc",
            "realizedAmountOut": "123456789012345678901",
            "realizedGas": 151000,
            "executedLegs": [
                {"venue": "a", "amountIn": "10", "amountOut": 9, "gasUsed": 151000}
            ]
        });
        let receipt: ExecutionReceipt = serde_json::from_value(raw).unwrap();
        assert_eq!(receipt.realized_amount_out, 123_456_789_012_345_678_901);
        assert_eq!(receipt.executed_legs[0].amount_out, 9);
    }
}
