// Router service and HTTP API implementation
// This file ties collection, optimization, cost estimation and planning
// together and exposes them as HTTP endpoints
//
// Numan Thabit 2025 Nov

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router as AxumRouter,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use super::collector::{CollectRequest, CollectorSettings, QuoteCollector, VenueFailure};
use super::cost::{CostEstimate, CostEstimator, CostSettings};
use super::execution::{ExecutionEngine, ExecutionPlan, ExecutionPlanner, ExecutionReceipt, ExecutionStats};
use super::optimizer::{OptimizerSettings, RouteOptimizer};
use super::routes::{Route, RouteKind, RouteLeg, RouteSelection};
use super::validation::{
    validate_quote_request, validate_swap_request, QuoteParams, QuoteRequest, RequestLimits,
    SwapParams, SwapRequest,
};
use crate::control::{AdmissionControl, AdmissionPermit, VenueRegistry};
use crate::errors::{ConfigError, PlanError, RouteError, ValidationError};
use crate::metrics::ROUTES;
use crate::quant::ratio_to_bps;
use crate::state::PriceSource;
use crate::venues::{AssetBook, AssetRef, PoolModel, Quote, Venue, VenueFamily};

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub collector: CollectorSettings,
    pub optimizer: OptimizerSettings,
    pub cost: CostSettings,
    pub limits: RequestLimits,
    pub default_deadline: ChronoDuration,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            collector: CollectorSettings::default(),
            optimizer: OptimizerSettings::default(),
            cost: CostSettings::default(),
            limits: RequestLimits::default(),
            default_deadline: ChronoDuration::minutes(20),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no liquidity for the requested pair")]
    NoLiquidity,
    #[error("unknown venue: {0}")]
    UnknownVenue(String),
    #[error("{0}")]
    Conflict(String),
    #[error("settlement is not configured")]
    SettlementUnavailable,
    #[error("server is overloaded")]
    Overloaded,
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NoLiquidity | Self::UnknownVenue(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::SettlementUnavailable | Self::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn validation(message: impl Into<String>) -> Self {
        Self::Validation(ValidationError {
            errors: vec![message.into()],
        })
    }
}

impl From<RouteError> for ApiError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::NoRoute => Self::NoLiquidity,
        }
    }
}

impl From<PlanError> for ApiError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::InvalidSlippage(_) | PlanError::DeadlinePassed(_) => {
                Self::validation(err.to_string())
            }
            PlanError::MinimumExceedsOutput { .. } => Self::Conflict(err.to_string()),
            PlanError::Unbalanced(_) => Self::validation(err.to_string()),
            PlanError::EmptyRoute => Self::Internal(err.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match &self {
            Self::Validation(err) => err.errors.clone(),
            _ => Vec::new(),
        };
        let message = match &self {
            Self::Internal(cause) => {
                error!(error = ?cause, "request failed");
                "internal server error".to_string()
            }
            Self::Validation(_) => "invalid request".to_string(),
            other => other.to_string(),
        };
        (
            status,
            Json(ErrorResponse {
                success: false,
                error: message,
                details,
            }),
        )
            .into_response()
    }
}

/// Result of one quote request.
#[derive(Debug, Clone)]
pub struct QuoteOutcome {
    pub selection: RouteSelection,
    pub plan: ExecutionPlan,
    pub failures: Vec<VenueFailure>,
    pub deadline_hit: bool,
    pub venues_queried: usize,
}

#[derive(Debug, Default)]
struct QuoteCounters {
    requests: AtomicU64,
    routed: AtomicU64,
    split_routes: AtomicU64,
    no_liquidity: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteStats {
    pub requests: u64,
    pub routed: u64,
    pub split_routes: u64,
    pub no_liquidity: u64,
}

/// High-level Router that ties collection, selection and planning together
pub struct Router {
    registry: Arc<VenueRegistry>,
    assets: Arc<AssetBook>,
    collector: QuoteCollector,
    optimizer: RouteOptimizer,
    estimator: CostEstimator,
    planner: ExecutionPlanner,
    settings: RouterSettings,
    executor: Option<Arc<ExecutionEngine>>,
    admission: Option<AdmissionControl>,
    pool_source: Option<Arc<dyn PriceSource>>,
    counters: QuoteCounters,
}

impl Router {
    pub fn new(registry: Arc<VenueRegistry>, assets: Arc<AssetBook>, settings: RouterSettings) -> Self {
        Self {
            registry,
            assets,
            collector: QuoteCollector::new(settings.collector.max_inflight_venue_calls),
            optimizer: RouteOptimizer::new(settings.optimizer),
            estimator: CostEstimator::new(settings.cost),
            planner: ExecutionPlanner::new(settings.default_deadline),
            settings,
            executor: None,
            admission: None,
            pool_source: None,
            counters: QuoteCounters::default(),
        }
    }

    pub fn with_executor(mut self, executor: Arc<ExecutionEngine>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_admission(mut self, admission: AdmissionControl) -> Self {
        self.admission = Some(admission);
        self
    }

    /// Source enumerated by the pool listing endpoint.
    pub fn with_pool_source(mut self, source: Arc<dyn PriceSource>) -> Self {
        self.pool_source = Some(source);
        self
    }

    pub fn registry(&self) -> &Arc<VenueRegistry> {
        &self.registry
    }

    pub fn assets(&self) -> &AssetBook {
        &self.assets
    }

    pub fn limits(&self) -> &RequestLimits {
        &self.settings.limits
    }

    pub fn executor(&self) -> Option<&Arc<ExecutionEngine>> {
        self.executor.as_ref()
    }

    async fn admit(&self) -> Result<Option<AdmissionPermit>, ApiError> {
        match &self.admission {
            Some(admission) => admission
                .acquire()
                .await
                .map(Some)
                .map_err(|_| ApiError::Overloaded),
            None => Ok(None),
        }
    }

    /// Collect, optimize, estimate and plan one request.
    #[tracing::instrument(skip_all, fields(token_in = %params.pair.token_in, token_out = %params.pair.token_out, amount_in = %params.amount_in))]
    pub async fn quote(&self, params: &QuoteParams) -> Result<QuoteOutcome, ApiError> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let snapshot = self.registry.snapshot();
        let request = CollectRequest {
            pair: params.pair.clone(),
            amount_in: params.amount_in,
            max_hops: params.max_hops,
            excluded: params.excluded.clone(),
            per_venue_timeout: self.settings.collector.per_venue_timeout,
            overall_deadline: self.settings.collector.overall_deadline,
        };
        let collection = self
            .collector
            .collect_quotes(snapshot.adapters(), &request)
            .await;

        if collection.is_empty() {
            self.counters.no_liquidity.fetch_add(1, Ordering::Relaxed);
            ROUTES.with_label_values(&["no-liquidity"]).inc();
            info!(
                venues_queried = collection.venues_queried,
                failures = collection.failures.len(),
                "no quotes collected"
            );
            return Err(ApiError::NoLiquidity);
        }

        let route = self.optimizer.optimize(
            &collection.quotes,
            params.price_impact_ceiling_bps,
            params.max_splits,
        )?;
        let cost = self.estimator.estimate(&route);
        let plan = self.planner.plan(
            route.clone(),
            params.slippage_tolerance_bps,
            params.deadline,
            params.recipient.as_deref().unwrap_or_default(),
        )?;

        self.counters.routed.fetch_add(1, Ordering::Relaxed);
        let kind = match route.kind {
            RouteKind::SingleVenue => "single-venue",
            RouteKind::Split => {
                self.counters.split_routes.fetch_add(1, Ordering::Relaxed);
                "split"
            }
        };
        ROUTES.with_label_values(&[kind]).inc();
        debug!(
            kind,
            legs = route.legs.len(),
            total_output = %route.total_output,
            impact_bps = route.aggregate_price_impact_bps,
            "route selected"
        );

        Ok(QuoteOutcome {
            selection: RouteSelection {
                route,
                cost,
                quotes: collection.quotes,
            },
            plan,
            failures: collection.failures,
            deadline_hit: collection.deadline_hit,
            venues_queried: collection.venues_queried,
        })
    }

    /// Re-price the supplied legs against current venue state and hand the
    /// resulting plan, frozen at the caller's `amountOutMin`, to settlement.
    #[tracing::instrument(skip_all, fields(legs = params.legs.len(), amount_in = %params.amount_in))]
    pub async fn swap(&self, params: &SwapParams) -> Result<(ExecutionPlan, ExecutionReceipt), ApiError> {
        let executor = self.executor.as_ref().ok_or(ApiError::SettlementUnavailable)?;
        let snapshot = self.registry.snapshot();

        let mut adapters = Vec::with_capacity(params.legs.len());
        for (venue, amount_in) in &params.legs {
            let adapter = snapshot
                .get(venue)
                .filter(|a| a.is_enabled())
                .ok_or_else(|| ApiError::validation(format!("venue {venue} is unknown or disabled")))?;
            adapters.push((adapter, *amount_in));
        }
        // Legs are re-priced concurrently; any leg that no longer prices fails the swap.
        let quotes = try_join_all(adapters.into_iter().map(|(adapter, amount_in)| {
            adapter.get_quote(&params.pair, amount_in, params.max_hops)
        }))
        .await
        .map_err(|e| ApiError::Conflict(format!("leg can no longer be priced: {e}")))?;
        let legs: Vec<RouteLeg> = quotes.iter().map(RouteLeg::from_quote).collect();
        let kind = if legs.len() > 1 {
            RouteKind::Split
        } else {
            RouteKind::SingleVenue
        };
        let route = Route::from_legs(kind, params.amount_in, legs);
        if !route.is_balanced() {
            return Err(ApiError::validation("leg amounts do not sum to amountIn"));
        }

        let plan = self.planner.plan_with_minimum(
            route,
            params.amount_out_min,
            params.deadline,
            &params.recipient,
            Utc::now(),
        )?;
        let receipt = executor.execute(&plan).await.map_err(ApiError::Internal)?;
        Ok((plan, receipt))
    }

    pub fn set_venue_enabled(&self, name: &str, enabled: bool) -> Result<Venue, ApiError> {
        self.registry.set_enabled(name, enabled).map_err(|e| match e {
            ConfigError::UnknownVenue(name) => ApiError::UnknownVenue(name),
            other => ApiError::Internal(other.into()),
        })
    }

    /// Pools the configured source can enumerate, tagged with their venue's
    /// family and toggle state. Pools of unregistered venues take the model's family.
    pub async fn pools(&self) -> Result<Vec<PoolResponse>, ApiError> {
        let Some(source) = &self.pool_source else {
            return Ok(Vec::new());
        };
        let entries = source
            .list_pools()
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        let snapshot = self.registry.snapshot();
        Ok(entries
            .into_iter()
            .map(|entry| {
                let venue = snapshot.get(&entry.venue).map(|a| a.venue());
                PoolResponse {
                    family: venue.map_or(entry.snapshot.model.family(), |v| v.family),
                    enabled: venue.is_some_and(|v| v.enabled),
                    venue: entry.venue,
                    token_in: entry.token_in.address,
                    token_out: entry.token_out.address,
                    model: entry.snapshot.model,
                    observed_at: entry.snapshot.observed_at,
                }
            })
            .collect())
    }

    pub fn quote_stats(&self) -> QuoteStats {
        QuoteStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            routed: self.counters.routed.load(Ordering::Relaxed),
            split_routes: self.counters.split_routes.load(Ordering::Relaxed),
            no_liquidity: self.counters.no_liquidity.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

fn addresses(path: &[AssetRef]) -> Vec<String> {
    path.iter().map(|a| a.address.clone()).collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegResponse {
    pub venue: String,
    pub venue_address: String,
    pub family: VenueFamily,
    pub path: Vec<String>,
    pub amount_in: String,
    pub amount_out: String,
    /// Share of the routed input, in bps
    pub share_bps: u32,
    pub fee_bps: u32,
    pub price_impact_bps: u32,
    pub gas_estimate: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BestRouteResponse {
    pub kind: RouteKind,
    pub amount_in: String,
    pub total_output: String,
    pub minimum_output: String,
    pub price_impact_bps: u32,
    pub impact_ceiling_exceeded: bool,
    pub gas_estimate: u64,
    pub execution_price: f64,
    pub legs: Vec<LegResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSummary {
    pub venue: String,
    pub family: VenueFamily,
    pub path: Vec<String>,
    pub amount_out: String,
    pub price_impact_bps: u32,
    pub gas_estimate: u64,
    pub execution_price: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureSummary {
    pub venue: String,
    pub reason: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteMetadata {
    pub quotes_found: usize,
    pub venues_queried: usize,
    pub failed_venues: Vec<FailureSummary>,
    pub deadline_hit: bool,
    /// Milliseconds
    pub estimated_execution_time: u64,
    pub cost: CostEstimate,
    pub chain_id: u64,
    /// Unix seconds
    pub deadline: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub best_route: BestRouteResponse,
    pub all_quotes: Vec<QuoteSummary>,
    pub metadata: QuoteMetadata,
}

impl From<&QuoteOutcome> for QuoteResponse {
    fn from(outcome: &QuoteOutcome) -> Self {
        let route = &outcome.selection.route;
        let legs = route
            .legs
            .iter()
            .map(|leg| LegResponse {
                venue: leg.venue.clone(),
                venue_address: leg.venue_address.clone(),
                family: leg.family,
                path: addresses(&leg.path),
                amount_in: leg.amount_in.to_string(),
                amount_out: leg.amount_out.to_string(),
                share_bps: if route.amount_in == 0 {
                    0
                } else {
                    ratio_to_bps(leg.amount_in as f64 / route.amount_in as f64)
                },
                fee_bps: leg.fee_bps,
                price_impact_bps: leg.price_impact_bps,
                gas_estimate: leg.gas_estimate,
            })
            .collect();
        let execution_price = if route.amount_in == 0 {
            0.0
        } else {
            route.total_output as f64 / route.amount_in as f64
        };
        let chain_id = route
            .legs
            .first()
            .and_then(|leg| leg.path.first())
            .map(|asset| asset.chain_id)
            .unwrap_or_default();

        Self {
            best_route: BestRouteResponse {
                kind: route.kind,
                amount_in: route.amount_in.to_string(),
                total_output: route.total_output.to_string(),
                minimum_output: outcome.plan.minimum_output().to_string(),
                price_impact_bps: route.aggregate_price_impact_bps,
                impact_ceiling_exceeded: route.impact_ceiling_exceeded,
                gas_estimate: route.aggregate_gas_estimate,
                execution_price,
                legs,
            },
            all_quotes: outcome
                .selection
                .quotes
                .iter()
                .map(|q: &Quote| QuoteSummary {
                    venue: q.venue.clone(),
                    family: q.family,
                    path: addresses(&q.path),
                    amount_out: q.output_amount.to_string(),
                    price_impact_bps: q.price_impact_bps,
                    gas_estimate: q.gas_estimate,
                    execution_price: q.execution_price(),
                })
                .collect(),
            metadata: QuoteMetadata {
                quotes_found: outcome.selection.quotes.len(),
                venues_queried: outcome.venues_queried,
                failed_venues: outcome
                    .failures
                    .iter()
                    .map(|f| FailureSummary {
                        venue: f.venue.clone(),
                        reason: f.reason.kind(),
                    })
                    .collect(),
                deadline_hit: outcome.deadline_hit,
                estimated_execution_time: outcome.selection.cost.expected_latency.as_millis()
                    as u64,
                cost: outcome.selection.cost,
                chain_id,
                deadline: outcome.plan.deadline().timestamp(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    #[serde(flatten)]
    pub receipt: ExecutionReceipt,
    pub minimum_output: String,
    pub deadline: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub symbol: String,
    pub address: String,
    pub decimals: u8,
    pub chain_id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolResponse {
    pub venue: String,
    pub token_in: String,
    pub token_out: String,
    pub family: VenueFamily,
    pub enabled: bool,
    pub model: PoolModel,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub quotes: QuoteStats,
    pub execution: Option<ExecutionStats>,
    pub venues_total: usize,
    pub venues_enabled: usize,
    pub venue_snapshot_version: u64,
}

/// Create the HTTP router with API endpoints
pub fn create_api_router(router: Arc<Router>) -> AxumRouter {
    AxumRouter::new()
        .route("/health", get(health_check))
        .route("/api/v1/quote", post(quote_route))
        .route("/api/v1/swap", post(execute_swap))
        .route("/api/v1/tokens", get(list_tokens))
        .route("/api/v1/venues", get(list_venues))
        .route("/api/v1/pools", get(list_pools))
        .route("/api/v1/venues/:name/enable", post(enable_venue))
        .route("/api/v1/venues/:name/disable", post(disable_venue))
        .route("/api/v1/stats", get(get_stats))
        .route("/metrics", get(metrics))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(router)
}

/// Health check endpoint
async fn health_check() -> StatusCode {
    StatusCode::OK
}

fn rejection(err: JsonRejection) -> ApiError {
    ApiError::validation(err.body_text())
}

/// Quote endpoint - selects and prices the best route without executing
async fn quote_route(
    State(router): State<Arc<Router>>,
    body: Result<Json<QuoteRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<QuoteResponse>>, ApiError> {
    let Json(req) = body.map_err(rejection)?;
    let _permit = router.admit().await?;
    let params = validate_quote_request(&req, router.assets(), router.limits(), Utc::now())?;
    let outcome = router.quote(&params).await?;
    Ok(ApiResponse::ok(QuoteResponse::from(&outcome)))
}

/// Swap endpoint - plans the supplied route and hands it to settlement
async fn execute_swap(
    State(router): State<Arc<Router>>,
    body: Result<Json<SwapRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<SwapResponse>>, ApiError> {
    if router.executor().is_none() {
        return Err(ApiError::SettlementUnavailable);
    }
    let Json(req) = body.map_err(rejection)?;
    let _permit = router.admit().await?;
    let params = validate_swap_request(&req, router.assets(), router.limits(), Utc::now())?;
    let (plan, receipt) = router.swap(&params).await?;
    Ok(ApiResponse::ok(SwapResponse {
        receipt,
        minimum_output: plan.minimum_output().to_string(),
        deadline: plan.deadline().timestamp(),
    }))
}

async fn list_tokens(State(router): State<Arc<Router>>) -> Json<ApiResponse<Vec<TokenResponse>>> {
    let tokens = router
        .assets()
        .listing()
        .into_iter()
        .map(|(symbol, asset)| TokenResponse {
            symbol,
            address: asset.address,
            decimals: asset.decimals,
            chain_id: asset.chain_id,
        })
        .collect();
    ApiResponse::ok(tokens)
}

async fn list_venues(State(router): State<Arc<Router>>) -> Json<ApiResponse<Vec<Venue>>> {
    ApiResponse::ok(router.registry().snapshot().venues())
}

async fn list_pools(
    State(router): State<Arc<Router>>,
) -> Result<Json<ApiResponse<Vec<PoolResponse>>>, ApiError> {
    router.pools().await.map(ApiResponse::ok)
}

async fn enable_venue(
    State(router): State<Arc<Router>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<Venue>>, ApiError> {
    router.set_venue_enabled(&name, true).map(ApiResponse::ok)
}

async fn disable_venue(
    State(router): State<Arc<Router>>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<Venue>>, ApiError> {
    router.set_venue_enabled(&name, false).map(ApiResponse::ok)
}

/// Get quote, execution and venue statistics
async fn get_stats(State(router): State<Arc<Router>>) -> Json<StatsResponse> {
    let snapshot = router.registry().snapshot();
    Json(StatsResponse {
        quotes: router.quote_stats(),
        execution: router.executor().map(|e| e.get_stats()),
        venues_total: snapshot.adapters().len(),
        venues_enabled: snapshot.enabled_count(),
        venue_snapshot_version: snapshot.version(),
    })
}

async fn metrics() -> Result<Response, ApiError> {
    let body = crate::metrics::render().map_err(|e| ApiError::Internal(e.into()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
