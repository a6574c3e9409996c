use anyhow::{anyhow, Context, Result};
use backoff::{future::retry, ExponentialBackoff};
use chrono::{Duration as ChronoDuration, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use swap_aggr::config::AppConfig;
use swap_aggr::control::{AdmissionControl, VenueRegistry};
use swap_aggr::errors::AggrError;
use swap_aggr::router::validation::RequestLimits;
use swap_aggr::router::{create_api_router, ExecutionEngine, Router, RouterSettings};
use swap_aggr::state::{record_pool_updates, InMemoryPriceSource, PriceSource};
use swap_aggr::transport::jsonrpc::{JsonRpc, JsonRpcSettlement, RpcPriceSource};
use swap_aggr::venues::VenueAdapter;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("initialize tracing subscriber")?;

    if let Err(err) = run().await {
        tracing::error!(error = ?err, "fatal aggregator error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config = AppConfig::load().context("load configuration")?;

    let assets = config.asset_book().context("build asset book")?;
    let venues = config.venues().context("load venues")?;
    let adapter_settings = Arc::new(
        config
            .adapter_settings(&assets)
            .context("resolve hub assets")?,
    );
    let rpc_timeout = Duration::from_millis(config.quoting.per_venue_timeout_ms);

    // Price source: remote JSON-RPC when configured, otherwise the configured
    // pools served from memory.
    let (source, simulation): (Arc<dyn PriceSource>, Option<InMemoryPriceSource>) =
        match &config.price_source_endpoint {
            Some(endpoint) => {
                let rpc = JsonRpc::new(endpoint.clone(), rpc_timeout)?;
                info!(endpoint = %rpc.endpoint(), "using JSON-RPC price source");
                let remote: Arc<dyn PriceSource> = Arc::new(RpcPriceSource::new(rpc));
                (remote, None)
            }
            None => {
                let memory = InMemoryPriceSource::default();
                tokio::spawn(record_pool_updates(memory.subscribe()));
                let stored = config
                    .seed_pools(&memory, &assets, Utc::now())
                    .await
                    .context("seed configured pools")?;
                warn!(pools = stored, "no price source endpoint; serving configured pools");
                let local: Arc<dyn PriceSource> = Arc::new(memory.clone());
                (local, Some(memory))
            }
        };

    let adapters: Vec<VenueAdapter> = venues
        .into_iter()
        .map(|venue| VenueAdapter::new(venue, source.clone(), adapter_settings.clone()))
        .collect();
    let registry = Arc::new(VenueRegistry::new(adapters).context("build venue registry")?);

    let settings = RouterSettings {
        collector: config.collector_settings(),
        optimizer: config.optimizer_settings(),
        cost: config.cost_settings(),
        limits: RequestLimits {
            max_hops: config.quoting.max_hops,
            max_splits: config.quoting.max_splits,
            default_slippage_bps: config.quoting.default_slippage_bps,
            default_max_hops: config.quoting.max_hops,
            price_impact_ceiling_bps: config.quoting.price_impact_ceiling_bps,
        },
        default_deadline: ChronoDuration::seconds(config.quoting.deadline_window_secs as i64),
    };

    let admission = AdmissionControl::new(config.max_inflight, config.rate_per_sec);
    let mut router = Router::new(registry.clone(), Arc::new(assets), settings)
        .with_admission(admission)
        .with_pool_source(source.clone());

    let execution_engine = match &config.settlement_endpoint {
        Some(endpoint) => {
            let rpc = JsonRpc::new(endpoint.clone(), Duration::from_secs(30))?;
            info!(endpoint = %rpc.endpoint(), "settlement collaborator configured");
            let engine = Arc::new(ExecutionEngine::new(Arc::new(JsonRpcSettlement::new(rpc))));
            router = router.with_executor(engine.clone());
            Some(engine)
        }
        None => {
            warn!("settlement endpoint not provided; swap endpoint disabled");
            None
        }
    };

    let app = App {
        listen_addr: config.listen_addr,
        max_state_age: Duration::from_millis(config.quoting.max_state_age_ms),
        router: Arc::new(router),
        registry,
        source,
        simulation,
        execution_engine,
    };

    app.run().await
}

struct App {
    listen_addr: SocketAddr,
    max_state_age: Duration,
    router: Arc<Router>,
    registry: Arc<VenueRegistry>,
    source: Arc<dyn PriceSource>,
    /// Present when serving static pools; re-stamped so they never go stale
    simulation: Option<InMemoryPriceSource>,
    execution_engine: Option<Arc<ExecutionEngine>>,
}

impl App {
    async fn run(self) -> Result<()> {
        let probe = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            multiplier: 2.0,
            ..Default::default()
        };
        let source = self.source.clone();
        retry(probe, || {
            let source = source.clone();
            async move {
                source
                    .readiness_probe()
                    .await
                    .map_err(backoff::Error::transient)
            }
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "price source never became ready");
            AggrError::BackoffExhausted
        })
        .context("price source readiness probe failed")?;

        let snapshot = self.registry.snapshot();
        info!(
            venues = snapshot.adapters().len(),
            enabled = snapshot.enabled_count(),
            tokens = self.router.assets().len(),
            settlement = self.execution_engine.is_some(),
            "swap aggregator online"
        );

        let api_router = create_api_router(self.router.clone());
        let listener = tokio::net::TcpListener::bind(self.listen_addr)
            .await
            .with_context(|| format!("bind API server address {}", self.listen_addr))?;
        info!(address = %self.listen_addr, "HTTP API server starting");
        let _api_handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, api_router).await {
                warn!(error = %e, "API server error");
            }
        });

        // Re-stamp static pools well inside the staleness tolerance.
        let mut restamp = tokio::time::interval((self.max_state_age / 3).max(Duration::from_secs(1)));
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = restamp.tick(), if self.simulation.is_some() => {
                    if let Some(memory) = &self.simulation {
                        let pools = memory.restamp_all(Utc::now()).await;
                        debug!(pools, "simulated pool state refreshed");
                    }
                }
                _ = ticker.tick() => {
                    let snapshot = self.registry.snapshot();
                    let quotes = self.router.quote_stats();
                    info!(
                        venues_enabled = snapshot.enabled_count(),
                        snapshot_version = snapshot.version(),
                        quote_requests = quotes.requests,
                        routed = quotes.routed,
                        split_routes = quotes.split_routes,
                        no_liquidity = quotes.no_liquidity,
                        "aggregator heartbeat"
                    );

                    if let Some(engine) = &self.execution_engine {
                        let stats = engine.get_stats();
                        info!(
                            total_executions = stats.total_executions,
                            successful = stats.successful_executions,
                            failed = stats.failed_executions,
                            success_rate = stats.success_rate,
                            avg_settlement_ms = ?stats.avg_settlement_time_ms,
                            "execution statistics"
                        );
                    }
                }
                res = tokio::signal::ctrl_c() => {
                    if let Err(err) = res {
                        warn!(error = %err, "ctrl_c listener error");
                    }
                    info!("Shutdown signal received, exiting");
                    break;
                }
            }
        }
        Ok(())
    }
}

fn init_tracing() -> Result<()> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("tracing subscriber init: {err}"))
}
