// Error types and error handling module
// This file defines the error taxonomy for venue pricing, routing,
// planning and upstream transport in the swap-aggr project
//
// Numan Thabit 2025 Nov

use thiserror::Error;

/// Upstream transport failures (price source, settlement hand-off).
#[derive(Debug, Error)]
pub enum AggrError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("backoff exhausted")]
    BackoffExhausted,
}

/// Per-venue pricing failures. All of them are recoverable by excluding the venue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VenueError {
    #[error("venue {venue} unavailable: {reason}")]
    VenueUnavailable { venue: String, reason: String },
    #[error("venue {venue} has no pool for {token_in} -> {token_out}")]
    InvalidPair {
        venue: String,
        token_in: String,
        token_out: String,
    },
    #[error("venue {venue} state is {age_ms}ms old (tolerance {tolerance_ms}ms)")]
    StaleState {
        venue: String,
        age_ms: u64,
        tolerance_ms: u64,
    },
}

impl VenueError {
    pub fn unavailable(venue: &str, reason: impl Into<String>) -> Self {
        Self::VenueUnavailable {
            venue: venue.to_string(),
            reason: reason.into(),
        }
    }

    /// Short label used for metrics and failure classification.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VenueUnavailable { .. } => "unavailable",
            Self::InvalidPair { .. } => "invalid_pair",
            Self::StaleState { .. } => "stale_state",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("no route: quote set is empty")]
    NoRoute,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("route has no legs")]
    EmptyRoute,
    #[error("leg inputs do not sum to the routed amount {0}")]
    Unbalanced(u128),
    #[error("slippage tolerance {0} bps exceeds 10000")]
    InvalidSlippage(u32),
    #[error("deadline {0} is not in the future")]
    DeadlinePassed(i64),
    #[error("minimum output {minimum} exceeds route output {output}")]
    MinimumExceedsOutput { minimum: u128, output: u128 },
}

/// Malformed request; every failed check is listed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid request: {}", .errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown venue family: {0}")]
    UnknownFamily(String),
    #[error("duplicate venue name: {0}")]
    DuplicateVenue(String),
    #[error("unknown venue: {0}")]
    UnknownVenue(String),
    #[error("unknown asset: {0}")]
    UnknownAsset(String),
    #[error("invalid pool {venue}: {reason}")]
    InvalidPool { venue: String, reason: String },
}
