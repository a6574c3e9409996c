// Execution planning and settlement hand-off
// This file turns a chosen route into an inert execution plan with a frozen
// minimum output and deadline, and hands plans to the settlement collaborator
//
// Numan Thabit 2025 Nov

use crate::errors::PlanError;
use crate::quant::{amount_str, apply_bps_discount, BPS_DENOMINATOR};
use crate::router::routes::Route;
use crate::venues::{AssetRef, VenueFamily};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Venue-specific swap instruction, one per route leg, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInstruction {
    pub venue: String,
    pub venue_address: String,
    pub family: VenueFamily,
    #[serde(with = "amount_str")]
    pub amount_in: u128,
    #[serde(with = "amount_str")]
    pub min_amount_out: u128,
    pub path: Vec<AssetRef>,
}

/// Inert, immutable plan. Fields are private so the frozen minimum cannot be
/// recomputed after planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    route: Route,
    minimum_output: u128,
    slippage_tolerance_bps: u32,
    deadline: DateTime<Utc>,
    recipient: String,
    instructions: Vec<SwapInstruction>,
}

impl ExecutionPlan {
    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn minimum_output(&self) -> u128 {
        self.minimum_output
    }

    pub fn slippage_tolerance_bps(&self) -> u32 {
        self.slippage_tolerance_bps
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn instructions(&self) -> &[SwapInstruction] {
        &self.instructions
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionPlanner {
    default_deadline: ChronoDuration,
}

impl Default for ExecutionPlanner {
    fn default() -> Self {
        Self::new(ChronoDuration::minutes(20))
    }
}

impl ExecutionPlanner {
    pub fn new(default_deadline: ChronoDuration) -> Self {
        Self { default_deadline }
    }

    pub fn plan(
        &self,
        route: Route,
        slippage_tolerance_bps: u32,
        deadline: Option<DateTime<Utc>>,
        recipient: &str,
    ) -> Result<ExecutionPlan, PlanError> {
        self.plan_at(route, slippage_tolerance_bps, deadline, recipient, Utc::now())
    }

    /// `minimumOutput = totalOutput * (1 - slippage/10000)`, floored.
    pub fn plan_at(
        &self,
        route: Route,
        slippage_tolerance_bps: u32,
        deadline: Option<DateTime<Utc>>,
        recipient: &str,
        now: DateTime<Utc>,
    ) -> Result<ExecutionPlan, PlanError> {
        if slippage_tolerance_bps > BPS_DENOMINATOR {
            return Err(PlanError::InvalidSlippage(slippage_tolerance_bps));
        }
        if route.legs.is_empty() {
            return Err(PlanError::EmptyRoute);
        }
        if !route.is_balanced() {
            return Err(PlanError::Unbalanced(route.amount_in));
        }
        let deadline = deadline.unwrap_or(now + self.default_deadline);
        if deadline <= now {
            return Err(PlanError::DeadlinePassed(deadline.timestamp()));
        }

        let minimum_output = apply_bps_discount(route.total_output, slippage_tolerance_bps);
        let instructions = route
            .legs
            .iter()
            .map(|leg| SwapInstruction {
                venue: leg.venue.clone(),
                venue_address: leg.venue_address.clone(),
                family: leg.family,
                amount_in: leg.amount_in,
                min_amount_out: apply_bps_discount(leg.amount_out, slippage_tolerance_bps),
                path: leg.path.clone(),
            })
            .collect();

        Ok(ExecutionPlan {
            route,
            minimum_output,
            slippage_tolerance_bps,
            deadline,
            recipient: recipient.to_string(),
            instructions,
        })
    }

    /// Plan with a caller-frozen minimum (the `amountOutMin` of a swap request)
    /// instead of deriving one. Leg minimums are the leg outputs scaled by
    /// `minimum / totalOutput`.
    pub fn plan_with_minimum(
        &self,
        route: Route,
        minimum_output: u128,
        deadline: Option<DateTime<Utc>>,
        recipient: &str,
        now: DateTime<Utc>,
    ) -> Result<ExecutionPlan, PlanError> {
        if route.legs.is_empty() {
            return Err(PlanError::EmptyRoute);
        }
        if minimum_output > route.total_output {
            return Err(PlanError::MinimumExceedsOutput {
                minimum: minimum_output,
                output: route.total_output,
            });
        }
        let total = route.total_output;
        let shortfall = total - minimum_output;
        let implied_bps = if total == 0 {
            0
        } else {
            let scaled = shortfall as f64 * BPS_DENOMINATOR as f64 / total as f64;
            (scaled.ceil() as u32).min(BPS_DENOMINATOR)
        };

        let mut plan = self.plan_at(route, implied_bps, deadline, recipient, now)?;
        plan.minimum_output = minimum_output;
        // Floored per leg, so leg minimums never sum above the frozen total.
        for (instruction, leg) in plan.instructions.iter_mut().zip(&plan.route.legs) {
            instruction.min_amount_out = scale_floor(leg.amount_out, minimum_output, total);
        }
        Ok(plan)
    }
}

/// `amount * num / den`, floored; falls back to f64 when the product overflows.
fn scale_floor(amount: u128, num: u128, den: u128) -> u128 {
    if den == 0 {
        return 0;
    }
    match amount.checked_mul(num) {
        Some(product) => product / den,
        None => ((amount as f64 * num as f64 / den as f64).floor() as u128).min(amount),
    }
}

/// What the settlement collaborator reports after executing a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReceipt {
    pub transaction_ref: String,
    #[serde(with = "amount_str")]
    pub realized_amount_out: u128,
    pub realized_gas: u64,
    pub executed_legs: Vec<ExecutedLeg>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedLeg {
    pub venue: String,
    #[serde(with = "amount_str")]
    pub amount_in: u128,
    #[serde(with = "amount_str")]
    pub amount_out: u128,
    pub gas_used: u64,
}

/// External settlement collaborator that signs and submits plans.
#[async_trait]
pub trait Settlement: Send + Sync {
    async fn execute(&self, plan: &ExecutionPlan) -> Result<ExecutionReceipt>;
}

/// Execution statistics for monitoring
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutionStats {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub avg_settlement_time_ms: Option<f64>,
    pub success_rate: f64,
}

/// Hands plans to settlement and keeps execution statistics.
pub struct ExecutionEngine {
    settlement: Arc<dyn Settlement>,
    total_executions: AtomicU64,
    successful_executions: AtomicU64,
    failed_executions: AtomicU64,
    total_settlement_time_us: AtomicU64,
}

impl ExecutionEngine {
    pub fn new(settlement: Arc<dyn Settlement>) -> Self {
        Self {
            settlement,
            total_executions: AtomicU64::new(0),
            successful_executions: AtomicU64::new(0),
            failed_executions: AtomicU64::new(0),
            total_settlement_time_us: AtomicU64::new(0),
        }
    }

    #[tracing::instrument(skip_all, fields(legs = plan.instructions().len()))]
    pub async fn execute(&self, plan: &ExecutionPlan) -> Result<ExecutionReceipt> {
        self.total_executions.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let receipt = match self.settlement.execute(plan).await {
            Ok(receipt) => receipt,
            Err(err) => {
                self.failed_executions.fetch_add(1, Ordering::Relaxed);
                warn!(error = %err, "settlement failed");
                return Err(err);
            }
        };

        let elapsed = started.elapsed();
        self.successful_executions.fetch_add(1, Ordering::Relaxed);
        self.total_settlement_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);

        if receipt.realized_amount_out < plan.minimum_output() {
            warn!(
                transaction = %receipt.transaction_ref,
                realized = %receipt.realized_amount_out,
                minimum = %plan.minimum_output(),
                "settlement reported output below plan minimum"
            );
        }
        info!(
            transaction = %receipt.transaction_ref,
            realized_out = %receipt.realized_amount_out,
            realized_gas = receipt.realized_gas,
            settlement_ms = elapsed.as_millis() as u64,
            "plan settled"
        );
        Ok(receipt)
    }

    pub fn get_stats(&self) -> ExecutionStats {
        let total = self.total_executions.load(Ordering::Relaxed);
        let successful = self.successful_executions.load(Ordering::Relaxed);
        let failed = self.failed_executions.load(Ordering::Relaxed);
        let total_ms = self.total_settlement_time_us.load(Ordering::Relaxed) as f64 / 1000.0;

        ExecutionStats {
            total_executions: total,
            successful_executions: successful,
            failed_executions: failed,
            avg_settlement_time_ms: if successful > 0 {
                Some(total_ms / successful as f64)
            } else {
                None
            },
            success_rate: if total > 0 {
                successful as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::routes::{RouteKind, RouteLeg};

    fn route(outputs: &[(u128, u128)]) -> Route {
        let legs = outputs
            .iter()
            .enumerate()
            .map(|(i, (amount_in, amount_out))| RouteLeg {
                venue: format!("venue-{i}"),
                venue_address: format!("0x{i:040x}"),
                family: VenueFamily::AmmV2,
                fee_bps: 30,
                amount_in: *amount_in,
                amount_out: *amount_out,
                price_impact_bps: 10,
                gas_estimate: 150_000,
                path: vec![],
            })
            .collect();
        let amount_in = outputs.iter().map(|(amount_in, _)| amount_in).sum();
        Route::from_legs(RouteKind::Split, amount_in, legs)
    }

    #[test]
    fn minimum_output_is_discounted_once() {
        let now = Utc::now();
        let plan = ExecutionPlanner::default()
            .plan_at(route(&[(600, 6_000), (400, 4_000)]), 50, None, "0xabc", now)
            .unwrap();
        assert_eq!(plan.minimum_output(), 9_950);
        assert_eq!(plan.deadline(), now + ChronoDuration::minutes(20));
        assert_eq!(plan.instructions().len(), 2);
        assert_eq!(plan.instructions()[0].min_amount_out, 5_970);
        assert_eq!(plan.instructions()[1].amount_in, 400);
        assert_eq!(plan.recipient(), "0xabc");
    }

    #[test]
    fn rejects_bad_inputs() {
        let planner = ExecutionPlanner::default();
        let now = Utc::now();
        assert_eq!(
            planner.plan_at(route(&[(1, 1)]), 10_001, None, "r", now),
            Err(PlanError::InvalidSlippage(10_001))
        );
        assert_eq!(
            planner.plan_at(route(&[]), 50, None, "r", now),
            Err(PlanError::EmptyRoute)
        );
        let mut short = route(&[(600, 590), (400, 390)]);
        short.amount_in = 1_001;
        assert_eq!(
            planner.plan_at(short, 50, None, "r", now),
            Err(PlanError::Unbalanced(1_001))
        );
        let past = now - ChronoDuration::seconds(1);
        assert!(matches!(
            planner.plan_at(route(&[(1, 1)]), 50, Some(past), "r", now),
            Err(PlanError::DeadlinePassed(_))
        ));
    }

    #[test]
    fn caller_minimum_is_kept_verbatim() {
        let now = Utc::now();
        let planner = ExecutionPlanner::default();
        let plan = planner
            .plan_with_minimum(route(&[(600, 6_000), (400, 4_001)]), 9_901, None, "0xabc", now)
            .unwrap();
        assert_eq!(plan.minimum_output(), 9_901);
        assert_eq!(plan.slippage_tolerance_bps(), 100);
        let leg_minimums: u128 = plan.instructions().iter().map(|i| i.min_amount_out).sum();
        assert!(leg_minimums <= 9_901);

        assert_eq!(
            planner.plan_with_minimum(route(&[(1, 10)]), 11, None, "r", now),
            Err(PlanError::MinimumExceedsOutput {
                minimum: 11,
                output: 10
            })
        );
    }

    struct FixedSettlement {
        fail: bool,
    }

    #[async_trait]
    impl Settlement for FixedSettlement {
        async fn execute(&self, plan: &ExecutionPlan) -> Result<ExecutionReceipt> {
            if self.fail {
                anyhow::bail!("rejected");
            }
            Ok(ExecutionReceipt {
                transaction_ref: "0xfeed".to_string(),
                realized_amount_out: plan.minimum_output(),
                realized_gas: plan.route().aggregate_gas_estimate,
                executed_legs: vec![],
            })
        }
    }

    #[tokio::test]
    async fn engine_tracks_outcomes() {
        let plan = ExecutionPlanner::default()
            .plan(route(&[(1_000, 990)]), 100, None, "0xabc")
            .unwrap();

        let ok = ExecutionEngine::new(Arc::new(FixedSettlement { fail: false }));
        let receipt = ok.execute(&plan).await.unwrap();
        assert_eq!(receipt.realized_amount_out, 980);
        assert_eq!(ok.get_stats().successful_executions, 1);

        let failing = ExecutionEngine::new(Arc::new(FixedSettlement { fail: true }));
        assert!(failing.execute(&plan).await.is_err());
        let stats = failing.get_stats();
        assert_eq!(stats.failed_executions, 1);
        assert_eq!(stats.success_rate, 0.0);
    }
}
