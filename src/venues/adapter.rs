// Venue adapter module
// This file normalizes one venue's pricing model into the common quote shape.
// The family-specific pricing formula is resolved once, when the adapter is built.
//
// Numan Thabit 2025 Nov

use super::{pricing_for, AssetPair, AssetRef, PoolModel, PricingError, PricingFn, SwapOutcome};
use super::{Venue, VenueFamily};
use crate::errors::VenueError;
use crate::quant::ratio_to_bps;
use crate::state::PriceSource;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Per-hop gas by venue family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSchedule {
    pub amm_v2: u64,
    pub amm_v3: u64,
    pub order_book: u64,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            amm_v2: 150_000,
            amm_v3: 180_000,
            order_book: 50_000,
        }
    }
}

impl GasSchedule {
    pub fn per_hop(&self, family: VenueFamily) -> u64 {
        match family {
            VenueFamily::AmmV2 => self.amm_v2,
            VenueFamily::AmmV3 => self.amm_v3,
            VenueFamily::OrderBook => self.order_book,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdapterSettings {
    /// Snapshots older than this are rejected as stale.
    pub max_state_age: Duration,
    /// Intermediate assets tried for two-hop paths.
    pub hub_assets: Vec<AssetRef>,
    pub gas: GasSchedule,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            max_state_age: Duration::from_secs(30),
            hub_assets: Vec::new(),
            gas: GasSchedule::default(),
        }
    }
}

/// One pool crossed by a path, frozen at quote time.
#[derive(Clone)]
pub struct CurveHop {
    pub token_in: AssetRef,
    pub token_out: AssetRef,
    pub model: PoolModel,
    pub fee_bps: u32,
    pricing: PricingFn,
}

impl CurveHop {
    pub fn new(
        token_in: AssetRef,
        token_out: AssetRef,
        model: PoolModel,
        fee_bps: u32,
        pricing: PricingFn,
    ) -> Self {
        Self {
            token_in,
            token_out,
            model,
            fee_bps,
            pricing,
        }
    }
}

impl std::fmt::Debug for CurveHop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurveHop")
            .field("token_in", &self.token_in)
            .field("token_out", &self.token_out)
            .field("model", &self.model)
            .field("fee_bps", &self.fee_bps)
            .finish()
    }
}

/// Snapshot of the pool models a quote was priced on. Lets the optimizer
/// re-price partial allocations without another venue call.
#[derive(Debug, Clone)]
pub struct PricingCurve {
    hops: Vec<CurveHop>,
}

impl PricingCurve {
    pub fn new(hops: Vec<CurveHop>) -> Self {
        Self { hops }
    }

    pub fn hops(&self) -> &[CurveHop] {
        &self.hops
    }

    pub fn swap(&self, amount_in: u128) -> Result<SwapOutcome, PricingError> {
        let mut amount = amount_in;
        let mut retained = 1.0_f64;
        for hop in &self.hops {
            let outcome = (hop.pricing)(&hop.model, amount, hop.fee_bps)?;
            amount = outcome.amount_out;
            retained *= 1.0 - outcome.price_impact_bps as f64 / 10_000.0;
        }
        if self.hops.is_empty() {
            return Err(PricingError::Degenerate("empty path"));
        }
        Ok(SwapOutcome {
            amount_out: amount,
            price_impact_bps: ratio_to_bps(1.0 - retained),
        })
    }
}

/// A venue's answer for one request. Never mutated after creation and never
/// reused across requests.
#[derive(Debug, Clone)]
pub struct Quote {
    pub venue: String,
    pub venue_address: String,
    pub family: VenueFamily,
    pub fee_bps: u32,
    pub input_amount: u128,
    pub output_amount: u128,
    pub price_impact_bps: u32,
    pub gas_estimate: u64,
    pub path: Vec<AssetRef>,
    /// Quotes without a curve can only be routed whole.
    pub curve: Option<PricingCurve>,
}

impl Quote {
    pub fn new(
        venue: &Venue,
        path: Vec<AssetRef>,
        input_amount: u128,
        output_amount: u128,
        price_impact_bps: u32,
        gas_estimate: u64,
    ) -> Self {
        Self {
            venue: venue.name.clone(),
            venue_address: venue.address.clone(),
            family: venue.family,
            fee_bps: venue.fee_bps,
            input_amount,
            output_amount,
            price_impact_bps,
            gas_estimate,
            path,
            curve: None,
        }
    }

    pub fn with_curve(mut self, curve: PricingCurve) -> Self {
        self.curve = Some(curve);
        self
    }

    pub fn hops(&self) -> usize {
        self.path.len().saturating_sub(1).max(1)
    }

    /// Output per unit of input, in raw units.
    pub fn execution_price(&self) -> f64 {
        if self.input_amount == 0 {
            return 0.0;
        }
        self.output_amount as f64 / self.input_amount as f64
    }
}

#[derive(Clone)]
pub struct VenueAdapter {
    venue: Venue,
    pricing: PricingFn,
    gas_per_hop: u64,
    settings: Arc<AdapterSettings>,
    source: Arc<dyn PriceSource>,
}

impl std::fmt::Debug for VenueAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueAdapter")
            .field("venue", &self.venue)
            .field("gas_per_hop", &self.gas_per_hop)
            .finish()
    }
}

impl VenueAdapter {
    pub fn new(venue: Venue, source: Arc<dyn PriceSource>, settings: Arc<AdapterSettings>) -> Self {
        let pricing = pricing_for(venue.family);
        let gas_per_hop = settings.gas.per_hop(venue.family);
        Self {
            venue,
            pricing,
            gas_per_hop,
            settings,
            source,
        }
    }

    pub fn venue(&self) -> &Venue {
        &self.venue
    }

    pub fn name(&self) -> &str {
        &self.venue.name
    }

    pub fn is_enabled(&self) -> bool {
        self.venue.enabled
    }

    /// Copy of this adapter with the enabled flag changed.
    pub fn with_enabled(&self, enabled: bool) -> Self {
        let mut next = self.clone();
        next.venue.enabled = enabled;
        next
    }

    pub async fn get_quote(
        &self,
        pair: &AssetPair,
        amount_in: u128,
        max_hops: u8,
    ) -> Result<Quote, VenueError> {
        self.get_quote_at(pair, amount_in, max_hops, Utc::now()).await
    }

    /// Quote against state as of `now`. The direct pool is tried first; with
    /// `max_hops >= 2` each hub asset is tried as an intermediate and the best
    /// output wins (ties keep the shorter path).
    pub async fn get_quote_at(
        &self,
        pair: &AssetPair,
        amount_in: u128,
        max_hops: u8,
        now: DateTime<Utc>,
    ) -> Result<Quote, VenueError> {
        if amount_in == 0 {
            return Err(VenueError::unavailable(self.name(), "zero input amount"));
        }

        let mut paths = vec![vec![pair.token_in.clone(), pair.token_out.clone()]];
        if max_hops >= 2 {
            for hub in &self.settings.hub_assets {
                if *hub != pair.token_in
                    && *hub != pair.token_out
                    && hub.chain_id == pair.token_in.chain_id
                {
                    paths.push(vec![
                        pair.token_in.clone(),
                        hub.clone(),
                        pair.token_out.clone(),
                    ]);
                }
            }
        }

        let mut best: Option<Quote> = None;
        let mut first_error: Option<VenueError> = None;
        for path in paths {
            match self.quote_path(path, amount_in, now).await {
                Ok(Some(quote)) => {
                    if best
                        .as_ref()
                        .map_or(true, |b| quote.output_amount > b.output_amount)
                    {
                        best = Some(quote);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(venue = %self.venue.name, error = %err, "path pricing failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        match (best, first_error) {
            (Some(quote), _) => Ok(quote),
            (None, Some(err)) => Err(err),
            (None, None) => Err(VenueError::InvalidPair {
                venue: self.venue.name.clone(),
                token_in: pair.token_in.to_string(),
                token_out: pair.token_out.to_string(),
            }),
        }
    }

    // Ok(None) when a pool along the path does not exist.
    async fn quote_path(
        &self,
        path: Vec<AssetRef>,
        amount_in: u128,
        now: DateTime<Utc>,
    ) -> Result<Option<Quote>, VenueError> {
        let name = self.name();
        let tolerance_ms = self.settings.max_state_age.as_millis() as u64;

        let mut hops = Vec::with_capacity(path.len().saturating_sub(1));
        for window in path.windows(2) {
            let snapshot = self
                .source
                .pool_state(name, &window[0], &window[1])
                .await
                .map_err(|e| VenueError::unavailable(name, e.to_string()))?;
            let Some(snapshot) = snapshot else {
                return Ok(None);
            };
            let age_ms = snapshot.age_ms(now);
            if age_ms > tolerance_ms {
                return Err(VenueError::StaleState {
                    venue: name.to_string(),
                    age_ms,
                    tolerance_ms,
                });
            }
            hops.push(CurveHop::new(
                window[0].clone(),
                window[1].clone(),
                snapshot.model,
                self.venue.fee_bps,
                self.pricing,
            ));
        }

        let curve = PricingCurve::new(hops);
        let outcome = curve
            .swap(amount_in)
            .map_err(|e| VenueError::unavailable(name, e.to_string()))?;
        let gas = self.gas_per_hop * curve.hops.len() as u64;

        Ok(Some(
            Quote::new(
                &self.venue,
                path,
                amount_in,
                outcome.amount_out,
                outcome.price_impact_bps,
                gas,
            )
            .with_curve(curve),
        ))
    }
}
