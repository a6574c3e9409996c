// Cost estimation for routes
// Converts a route into aggregate gas, fee, price impact and expected latency
//
// Numan Thabit 2025 Nov

use crate::quant::{bps_of, weighted_average_bps};
use crate::router::routes::Route;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostSettings {
    /// Fixed submission/inclusion latency
    pub base_latency: Duration,
    /// Added per hop of the longest leg; legs settle in parallel
    pub per_hop_latency: Duration,
}

impl Default for CostSettings {
    fn default() -> Self {
        Self {
            base_latency: Duration::from_millis(1_000),
            per_hop_latency: Duration::from_millis(3_000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    pub gas: u64,
    /// In output-asset units
    #[serde(with = "crate::quant::amount_str")]
    pub fees: u128,
    pub price_impact_bps: u32,
    #[serde(serialize_with = "serialize_millis")]
    pub expected_latency: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

#[derive(Debug, Clone, Default)]
pub struct CostEstimator {
    settings: CostSettings,
}

impl CostEstimator {
    pub fn new(settings: CostSettings) -> Self {
        Self { settings }
    }

    /// Pure function of the route: the same route always yields the same estimate.
    pub fn estimate(&self, route: &Route) -> CostEstimate {
        // Worst case: sequential gas even for legs settled in one batch.
        let gas = route.legs.iter().map(|leg| leg.gas_estimate).sum();
        let fees = route
            .legs
            .iter()
            .map(|leg| bps_of(leg.amount_out, leg.fee_bps))
            .sum();
        let impacts: Vec<(u128, u32)> = route
            .legs
            .iter()
            .map(|leg| (leg.amount_in, leg.price_impact_bps))
            .collect();
        let expected_latency =
            self.settings.base_latency + self.settings.per_hop_latency * route.max_hops() as u32;

        CostEstimate {
            gas,
            fees,
            price_impact_bps: weighted_average_bps(&impacts),
            expected_latency,
        }
    }
}
