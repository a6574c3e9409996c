// Route types
// This file defines routes, route legs and the selection result handed from
// the optimizer to cost estimation and planning
//
// Numan Thabit 2025 Nov

use crate::quant::weighted_average_bps;
use crate::router::cost::CostEstimate;
use crate::venues::{AssetRef, Quote, VenueFamily};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteKind {
    /// Whole input through one venue
    SingleVenue,
    /// Input split across independent venue legs
    Split,
}

/// One venue-specific swap within a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteLeg {
    pub venue: String,
    pub venue_address: String,
    pub family: VenueFamily,
    pub fee_bps: u32,
    pub amount_in: u128,
    pub amount_out: u128,
    pub price_impact_bps: u32,
    pub gas_estimate: u64,
    pub path: Vec<AssetRef>,
}

impl RouteLeg {
    pub fn from_quote(quote: &Quote) -> Self {
        Self {
            venue: quote.venue.clone(),
            venue_address: quote.venue_address.clone(),
            family: quote.family,
            fee_bps: quote.fee_bps,
            amount_in: quote.input_amount,
            amount_out: quote.output_amount,
            price_impact_bps: quote.price_impact_bps,
            gas_estimate: quote.gas_estimate,
            path: quote.path.clone(),
        }
    }

    pub fn hops(&self) -> usize {
        self.path.len().saturating_sub(1).max(1)
    }
}

/// Legs are in execution order; split legs carry no dependency on each other.
/// Leg inputs always sum to `amount_in`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub kind: RouteKind,
    pub amount_in: u128,
    pub legs: Vec<RouteLeg>,
    pub total_output: u128,
    pub aggregate_price_impact_bps: u32,
    pub aggregate_gas_estimate: u64,
    /// Set when no quote satisfied the impact ceiling and the best quote was
    /// used anyway; the caller decides whether to reject.
    pub impact_ceiling_exceeded: bool,
}

impl Route {
    /// `amount_in` is the requested input; `is_balanced` checks the legs against it.
    pub fn from_legs(kind: RouteKind, amount_in: u128, legs: Vec<RouteLeg>) -> Self {
        let total_output = legs
            .iter()
            .fold(0u128, |acc, leg| acc.saturating_add(leg.amount_out));
        let aggregate_gas_estimate = legs.iter().map(|leg| leg.gas_estimate).sum();
        let impacts: Vec<(u128, u32)> = legs
            .iter()
            .map(|leg| (leg.amount_in, leg.price_impact_bps))
            .collect();
        Self {
            kind,
            amount_in,
            total_output,
            aggregate_price_impact_bps: weighted_average_bps(&impacts),
            aggregate_gas_estimate,
            legs,
            impact_ceiling_exceeded: false,
        }
    }

    pub fn single(quote: &Quote) -> Self {
        Self::from_legs(
            RouteKind::SingleVenue,
            quote.input_amount,
            vec![RouteLeg::from_quote(quote)],
        )
    }

    pub fn with_ceiling_exceeded(mut self, exceeded: bool) -> Self {
        self.impact_ceiling_exceeded = exceeded;
        self
    }

    /// True when leg inputs add up to the routed amount.
    pub fn is_balanced(&self) -> bool {
        self.legs
            .iter()
            .try_fold(0u128, |acc, leg| acc.checked_add(leg.amount_in))
            == Some(self.amount_in)
    }

    pub fn max_hops(&self) -> usize {
        self.legs.iter().map(RouteLeg::hops).max().unwrap_or(0)
    }
}

/// Route selection result for one request
#[derive(Debug, Clone)]
pub struct RouteSelection {
    pub route: Route,
    pub cost: CostEstimate,
    /// Every quote collected for the request, sorted by venue name.
    pub quotes: Vec<Quote>,
}

impl RouteSelection {
    pub fn best_route(&self) -> &Route {
        &self.route
    }
}
