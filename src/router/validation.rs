// Request validation module
// Validates quote and swap requests against the asset book and the
// configured routing limits before any venue is contacted
//
// Numan Thabit 2025 Nov

use crate::errors::ValidationError;
use crate::quant::{amount_str, parse_amount, BPS_DENOMINATOR};
use crate::venues::{AssetBook, AssetPair};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashSet;

/// Slippage above 50% is refused outright.
pub const MAX_SLIPPAGE_BPS: u32 = 5_000;

/// Accumulates every failed check of a request.
#[derive(Debug)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_valid {
            Ok(())
        } else {
            Err(ValidationError {
                errors: self.errors,
            })
        }
    }
}

/// Routing limits and defaults applied to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLimits {
    pub max_hops: u8,
    pub max_splits: usize,
    pub default_slippage_bps: u32,
    pub default_max_hops: u8,
    pub price_impact_ceiling_bps: u32,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_hops: 3,
            max_splits: 3,
            default_slippage_bps: 50,
            default_max_hops: 3,
            price_impact_ceiling_bps: 100,
        }
    }
}

/// `POST /api/v1/quote` body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub token_in: String,
    pub token_out: String,
    /// Smallest-unit decimal string
    pub amount_in: String,
    pub slippage_tolerance_bps: Option<u32>,
    pub max_hops: Option<u8>,
    #[serde(default, alias = "excludeDexs")]
    pub excluded_venues: Vec<String>,
    /// Unix seconds
    pub deadline: Option<i64>,
    pub price_impact_ceiling_bps: Option<u32>,
    pub max_splits: Option<usize>,
    pub recipient: Option<String>,
}

/// A request that passed every check, with defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteParams {
    pub pair: AssetPair,
    pub amount_in: u128,
    pub slippage_tolerance_bps: u32,
    pub max_hops: u8,
    pub excluded: HashSet<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub price_impact_ceiling_bps: u32,
    pub max_splits: usize,
    pub recipient: Option<String>,
}

/// One leg of a previously quoted route, as sent back for execution.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapLegRequest {
    pub venue: String,
    #[serde(with = "amount_str")]
    pub amount_in: u128,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRouteRequest {
    #[serde(with = "amount_str")]
    pub amount_in: u128,
    pub legs: Vec<SwapLegRequest>,
}

/// `POST /api/v1/swap` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub token_in: String,
    pub token_out: String,
    pub route: SwapRouteRequest,
    #[serde(with = "amount_str")]
    pub amount_out_min: u128,
    pub recipient: String,
    pub deadline: Option<i64>,
    pub max_hops: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapParams {
    pub pair: AssetPair,
    pub amount_in: u128,
    /// (venue, amount in) in execution order
    pub legs: Vec<(String, u128)>,
    pub amount_out_min: u128,
    pub recipient: String,
    pub deadline: Option<DateTime<Utc>>,
    pub max_hops: u8,
}

/// 20-byte hex address with `0x` prefix.
pub fn is_address(raw: &str) -> bool {
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(body) => body.len() == 40 && hex::decode(body).is_ok(),
        None => false,
    }
}

fn check_pair(
    result: &mut ValidationResult,
    book: &AssetBook,
    token_in: &str,
    token_out: &str,
) -> Option<AssetPair> {
    let resolved_in = book.resolve(token_in);
    let resolved_out = book.resolve(token_out);
    if resolved_in.is_none() {
        result.add_error(format!("unknown tokenIn: {token_in}"));
    }
    if resolved_out.is_none() {
        result.add_error(format!("unknown tokenOut: {token_out}"));
    }
    let (token_in, token_out) = (resolved_in?, resolved_out?);
    if token_in == token_out {
        result.add_error("tokenIn and tokenOut must differ".to_string());
        return None;
    }
    Some(AssetPair::new(token_in.clone(), token_out.clone()))
}

fn check_max_hops(result: &mut ValidationResult, requested: Option<u8>, limits: &RequestLimits) -> u8 {
    let max_hops = requested.unwrap_or(limits.default_max_hops.min(limits.max_hops));
    if max_hops == 0 || max_hops > limits.max_hops {
        result.add_error(format!(
            "maxHops must be between 1 and {}, got {max_hops}",
            limits.max_hops
        ));
    }
    max_hops
}

fn check_deadline(
    result: &mut ValidationResult,
    deadline: Option<i64>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let secs = deadline?;
    match Utc.timestamp_opt(secs, 0).single() {
        Some(at) if at > now => Some(at),
        Some(_) => {
            result.add_error(format!("deadline {secs} is not in the future"));
            None
        }
        None => {
            result.add_error(format!("deadline {secs} is not a valid unix timestamp"));
            None
        }
    }
}

pub fn validate_quote_request(
    req: &QuoteRequest,
    book: &AssetBook,
    limits: &RequestLimits,
    now: DateTime<Utc>,
) -> Result<QuoteParams, ValidationError> {
    let mut result = ValidationResult::new();

    let pair = check_pair(&mut result, book, &req.token_in, &req.token_out);

    let amount_in = match parse_amount(&req.amount_in) {
        Ok(0) => {
            result.add_error("amountIn must be greater than zero".to_string());
            0
        }
        Ok(amount) => amount,
        Err(e) => {
            result.add_error(format!("amountIn: {e}"));
            0
        }
    };

    let slippage_tolerance_bps = req
        .slippage_tolerance_bps
        .unwrap_or(limits.default_slippage_bps);
    if slippage_tolerance_bps > MAX_SLIPPAGE_BPS {
        result.add_error(format!(
            "slippageToleranceBps must be at most {MAX_SLIPPAGE_BPS}, got {slippage_tolerance_bps}"
        ));
    }

    let max_hops = check_max_hops(&mut result, req.max_hops, limits);

    let price_impact_ceiling_bps = req
        .price_impact_ceiling_bps
        .unwrap_or(limits.price_impact_ceiling_bps);
    if price_impact_ceiling_bps > BPS_DENOMINATOR {
        result.add_error(format!(
            "priceImpactCeilingBps must be at most {BPS_DENOMINATOR}"
        ));
    }

    let max_splits = req.max_splits.unwrap_or(limits.max_splits);
    if max_splits == 0 || max_splits > limits.max_splits {
        result.add_error(format!(
            "maxSplits must be between 1 and {}, got {max_splits}",
            limits.max_splits
        ));
    }

    let mut excluded = HashSet::new();
    for name in &req.excluded_venues {
        let name = name.trim();
        if name.is_empty() {
            result.add_error("excludedVenues entries must be venue names".to_string());
        } else {
            excluded.insert(name.to_string());
        }
    }

    let deadline = check_deadline(&mut result, req.deadline, now);

    if let Some(recipient) = &req.recipient {
        if !is_address(recipient) {
            result.add_error(format!("recipient is not a 20-byte hex address: {recipient}"));
        }
    }

    result.into_result()?;
    let pair = pair.ok_or_else(|| ValidationError {
        errors: vec!["token pair could not be resolved".to_string()],
    })?;

    Ok(QuoteParams {
        pair,
        amount_in,
        slippage_tolerance_bps,
        max_hops,
        excluded,
        deadline,
        price_impact_ceiling_bps,
        max_splits,
        recipient: req.recipient.as_ref().map(|r| r.to_ascii_lowercase()),
    })
}

pub fn validate_swap_request(
    req: &SwapRequest,
    book: &AssetBook,
    limits: &RequestLimits,
    now: DateTime<Utc>,
) -> Result<SwapParams, ValidationError> {
    let mut result = ValidationResult::new();

    let pair = check_pair(&mut result, book, &req.token_in, &req.token_out);

    if req.route.amount_in == 0 {
        result.add_error("route.amountIn must be greater than zero".to_string());
    }
    if req.route.legs.is_empty() {
        result.add_error("route must have at least one leg".to_string());
    }
    let mut seen = HashSet::new();
    let mut leg_sum: u128 = 0;
    for leg in &req.route.legs {
        if leg.amount_in == 0 {
            result.add_error(format!("leg {} has zero amountIn", leg.venue));
        }
        if !seen.insert(leg.venue.as_str()) {
            result.add_error(format!("venue {} appears in more than one leg", leg.venue));
        }
        leg_sum = leg_sum.saturating_add(leg.amount_in);
    }
    if !req.route.legs.is_empty() && leg_sum != req.route.amount_in {
        result.add_error(format!(
            "leg amounts sum to {leg_sum}, route amountIn is {}",
            req.route.amount_in
        ));
    }
    if req.amount_out_min == 0 {
        result.add_error("amountOutMin must be greater than zero".to_string());
    }
    if !is_address(&req.recipient) {
        result.add_error(format!(
            "recipient is not a 20-byte hex address: {}",
            req.recipient
        ));
    }

    let max_hops = check_max_hops(&mut result, req.max_hops, limits);
    let deadline = check_deadline(&mut result, req.deadline, now);

    result.into_result()?;
    let pair = pair.ok_or_else(|| ValidationError {
        errors: vec!["token pair could not be resolved".to_string()],
    })?;

    Ok(SwapParams {
        pair,
        amount_in: req.route.amount_in,
        legs: req
            .route
            .legs
            .iter()
            .map(|leg| (leg.venue.clone(), leg.amount_in))
            .collect(),
        amount_out_min: req.amount_out_min,
        recipient: req.recipient.to_ascii_lowercase(),
        deadline,
        max_hops,
    })
}
