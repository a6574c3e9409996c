// Route optimizer - chooses the best single-venue or split route
// This file implements impact-ceiling filtering, deterministic single-venue
// selection and greedy marginal-output capital splitting
//
// Numan Thabit 2025 Nov

use crate::errors::RouteError;
use crate::quant::{allocation_units, bps_of};
use crate::router::routes::{Route, RouteKind, RouteLeg};
use crate::venues::{PricingCurve, Quote};
use std::cmp::Ordering;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizerSettings {
    /// Size of one allocation unit as a share of the input, in bps.
    pub granularity_bps: u32,
    /// A split must beat the single-venue route by more than this margin.
    pub min_improvement_bps: u32,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            granularity_bps: 100,
            min_improvement_bps: 0,
        }
    }
}

/// Synchronous, single-threaded route optimizer.
#[derive(Debug, Clone, Default)]
pub struct RouteOptimizer {
    settings: OptimizerSettings,
}

/// Output desc, then gas asc, then venue name asc.
fn rank(a: &Quote, b: &Quote) -> Ordering {
    b.output_amount
        .cmp(&a.output_amount)
        .then_with(|| a.gas_estimate.cmp(&b.gas_estimate))
        .then_with(|| a.venue.cmp(&b.venue))
        .then_with(|| a.path.len().cmp(&b.path.len()))
}

impl RouteOptimizer {
    pub fn new(settings: OptimizerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    pub fn optimize(
        &self,
        quotes: &[Quote],
        price_impact_ceiling_bps: u32,
        max_splits: usize,
    ) -> Result<Route, RouteError> {
        let mut ranked: Vec<&Quote> = quotes.iter().collect();
        ranked.sort_by(|a, b| rank(a, b));
        let Some(&best_overall) = ranked.first() else {
            return Err(RouteError::NoRoute);
        };

        let within: Vec<&Quote> = ranked
            .iter()
            .copied()
            .filter(|q| q.price_impact_bps <= price_impact_ceiling_bps)
            .collect();

        if within.is_empty() {
            info!(
                venue = %best_overall.venue,
                impact_bps = best_overall.price_impact_bps,
                ceiling_bps = price_impact_ceiling_bps,
                "no quote within impact ceiling; using best output"
            );
            return Ok(Route::single(best_overall).with_ceiling_exceeded(true));
        }

        let single = Route::single(within[0]);
        if max_splits < 2 || within.len() < 2 {
            return Ok(single);
        }

        let Some(split) = self.split(&within, max_splits) else {
            return Ok(single);
        };

        let threshold = single
            .total_output
            .saturating_add(bps_of(single.total_output, self.settings.min_improvement_bps));
        if split.total_output > threshold {
            debug!(
                legs = split.legs.len(),
                split_output = %split.total_output,
                single_output = %single.total_output,
                "split route beats single venue"
            );
            Ok(split)
        } else {
            Ok(single)
        }
    }

    /// Greedy allocation over the top `max_splits` ranked venues: each unit goes
    /// to the venue with the highest marginal output for it. Returns None when
    /// fewer than two venues end up used or the capital cannot be placed.
    fn split(&self, ranked: &[&Quote], max_splits: usize) -> Option<Route> {
        let candidates: Vec<(&Quote, &PricingCurve)> = ranked
            .iter()
            .filter_map(|q| q.curve.as_ref().map(|curve| (*q, curve)))
            .take(max_splits)
            .collect();
        if candidates.len() < 2 {
            return None;
        }

        let amount_in = candidates[0].0.input_amount;
        let units = match allocation_units(amount_in, self.settings.granularity_bps) {
            Ok(units) => units,
            Err(err) => {
                debug!(error = %err, "split skipped");
                return None;
            }
        };

        let n = candidates.len();
        let mut allocated = vec![0u128; n];
        let mut output = vec![0u128; n];
        let mut saturated = vec![false; n];

        for _ in 0..units.count {
            let mut pick: Option<(usize, u128, u128)> = None;
            for (i, (_, curve)) in candidates.iter().enumerate() {
                if saturated[i] {
                    continue;
                }
                match curve.swap(allocated[i] + units.unit) {
                    Ok(next) => {
                        let marginal = next.amount_out.saturating_sub(output[i]);
                        if pick.map_or(true, |(_, _, best)| marginal > best) {
                            pick = Some((i, next.amount_out, marginal));
                        }
                    }
                    Err(_) => saturated[i] = true,
                }
            }
            let (i, next_output, _) = pick?;
            allocated[i] += units.unit;
            output[i] = next_output;
        }

        let used: Vec<usize> = (0..n).filter(|&i| allocated[i] > 0).collect();
        if used.len() < 2 {
            return None;
        }
        if let Some(&last) = used.last() {
            allocated[last] += units.remainder;
        }

        let mut legs = Vec::with_capacity(used.len());
        for &i in &used {
            let (quote, curve) = candidates[i];
            let outcome = curve.swap(allocated[i]).ok()?;
            legs.push(RouteLeg {
                venue: quote.venue.clone(),
                venue_address: quote.venue_address.clone(),
                family: quote.family,
                fee_bps: quote.fee_bps,
                amount_in: allocated[i],
                amount_out: outcome.amount_out,
                price_impact_bps: outcome.price_impact_bps,
                gas_estimate: quote.gas_estimate,
                path: quote.path.clone(),
            });
        }

        Some(Route::from_legs(RouteKind::Split, amount_in, legs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venues::{
        pricing_for, AssetRef, BookLevel, CurveHop, OrderBookPool, PoolModel, Venue, VenueFamily,
    };

    fn quote(name: &str, out: u128, impact: u32, gas: u64) -> Quote {
        let venue = Venue {
            name: name.to_string(),
            family: VenueFamily::AmmV2,
            fee_bps: 30,
            enabled: true,
            address: String::new(),
        };
        let path = vec![
            AssetRef::new(1, "0x01", 18),
            AssetRef::new(1, "0x02", 18),
        ];
        Quote::new(&venue, path, 1_000, out, impact, gas)
    }

    #[test]
    fn empty_quote_set_is_no_route() {
        let optimizer = RouteOptimizer::default();
        assert_eq!(optimizer.optimize(&[], 100, 3), Err(RouteError::NoRoute));
    }

    #[test]
    fn ties_break_on_gas_then_name() {
        let optimizer = RouteOptimizer::default();
        let quotes = vec![
            quote("zeta", 990, 10, 100_000),
            quote("beta", 990, 10, 90_000),
            quote("alpha", 990, 10, 90_000),
        ];
        let route = optimizer.optimize(&quotes, 100, 1).unwrap();
        assert_eq!(route.legs[0].venue, "alpha");
    }

    #[test]
    fn quotes_without_curves_are_never_split() {
        let optimizer = RouteOptimizer::default();
        let quotes = vec![quote("a", 990, 10, 1), quote("b", 980, 10, 1)];
        let route = optimizer.optimize(&quotes, 100, 3).unwrap();
        assert_eq!(route.kind, RouteKind::SingleVenue);
        assert_eq!(route.total_output, 990);
    }

    /// Order-book quote for 1000 input with no fee, carrying its curve.
    fn book_quote(name: &str, levels: &[(f64, u128)]) -> Quote {
        let venue = Venue {
            name: name.to_string(),
            family: VenueFamily::OrderBook,
            fee_bps: 0,
            enabled: true,
            address: String::new(),
        };
        let token_in = AssetRef::new(1, "0x01", 18);
        let token_out = AssetRef::new(1, "0x02", 18);
        let model = PoolModel::OrderBook(OrderBookPool {
            levels: levels
                .iter()
                .map(|&(price, max_input)| BookLevel { price, max_input })
                .collect(),
        });
        let curve = PricingCurve::new(vec![CurveHop::new(
            token_in.clone(),
            token_out.clone(),
            model,
            0,
            pricing_for(VenueFamily::OrderBook),
        )]);
        let whole = curve.swap(1_000).unwrap();
        Quote::new(
            &venue,
            vec![token_in, token_out],
            1_000,
            whole.amount_out,
            whole.price_impact_bps,
            50_000,
        )
        .with_curve(curve)
    }

    // Both venues fill 1000 for 800 alone; splitting 600/400 yields 920,
    // exactly 1500 bps better.
    fn crossing_books() -> Vec<Quote> {
        vec![
            book_quote("a", &[(1.0, 600), (0.5, 10_000)]),
            book_quote("b", &[(0.8, 10_000)]),
        ]
    }

    fn with_margin(min_improvement_bps: u32) -> RouteOptimizer {
        RouteOptimizer::new(OptimizerSettings {
            granularity_bps: 100,
            min_improvement_bps,
        })
    }

    #[test]
    fn split_beating_single_is_taken() {
        let route = with_margin(0).optimize(&crossing_books(), 10_000, 2).unwrap();
        assert_eq!(route.kind, RouteKind::Split);
        assert_eq!(route.total_output, 920);
        assert_eq!(route.legs[0].amount_in, 600);
        assert_eq!(route.legs[1].amount_in, 400);
        assert!(route.is_balanced());
    }

    #[test]
    fn split_inside_margin_is_rejected() {
        let quotes = crossing_books();
        let route = with_margin(2_000).optimize(&quotes, 10_000, 2).unwrap();
        assert_eq!(route.kind, RouteKind::SingleVenue);
        assert_eq!(route.total_output, 800);

        let route = with_margin(1_499).optimize(&quotes, 10_000, 2).unwrap();
        assert_eq!(route.kind, RouteKind::Split);
    }

    #[test]
    fn split_equal_to_threshold_keeps_single() {
        let route = with_margin(1_500).optimize(&crossing_books(), 10_000, 2).unwrap();
        assert_eq!(route.kind, RouteKind::SingleVenue);
        assert_eq!(route.legs[0].venue, "a");
        assert_eq!(route.total_output, 800);
    }

    #[test]
    fn split_only_uses_top_ranked_venues() {
        let mut quotes = crossing_books();
        // Ranked last on whole-amount output, so excluded at max_splits 2.
        quotes.push(book_quote("c", &[(2.0, 100), (0.1, 10_000)]));
        let route = with_margin(0).optimize(&quotes, 10_000, 2).unwrap();
        let venues: Vec<&str> = route.legs.iter().map(|l| l.venue.as_str()).collect();
        assert_eq!(venues, ["a", "b"]);

        let route = with_margin(0).optimize(&quotes, 10_000, 3).unwrap();
        assert_eq!(route.legs.len(), 3);
        assert!(route.total_output > 920);
    }
}
