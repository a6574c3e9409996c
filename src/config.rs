// Configuration management module
// This file handles loading and parsing of configuration settings
// from an optional config file layered under environment variables
//
// Numan Thabit 2025 Nov

use crate::errors::ConfigError;
use crate::router::collector::CollectorSettings;
use crate::router::cost::CostSettings;
use crate::router::optimizer::OptimizerSettings;
use crate::state::{InMemoryPriceSource, PoolSnapshot};
use crate::venues::adapter::GasSchedule;
use crate::venues::{AdapterSettings, AssetBook, AssetRef, PoolModel, Venue, VenueFamily};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP API bind address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Chain id assets are qualified with
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// JSON-RPC price source; when absent the configured pools are served from memory
    pub price_source_endpoint: Option<Url>,
    /// JSON-RPC settlement collaborator; when absent swaps are refused
    pub settlement_endpoint: Option<Url>,
    /// Concurrent API requests admitted
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,
    pub rate_per_sec: Option<u32>,
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
    #[serde(default)]
    pub venues: Vec<VenueConfig>,
    /// Static pool state used as the in-memory simulation seed
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
    /// Symbols or addresses tried as intermediates for two-hop paths
    #[serde(default)]
    pub hub_assets: Vec<String>,
    #[serde(default)]
    pub quoting: QuotingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetConfig {
    pub symbol: String,
    pub address: String,
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    pub name: String,
    /// amm-v2 | amm-v3 | order-book
    pub family: String,
    pub fee_bps: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    pub venue: String,
    pub token_in: String,
    pub token_out: String,
    /// Also register the reverse direction (ignored for order books)
    #[serde(default = "default_true")]
    pub bidirectional: bool,
    pub model: PoolModel,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GasConfig {
    pub amm_v2: Option<u64>,
    pub amm_v3: Option<u64>,
    pub order_book: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotingConfig {
    pub per_venue_timeout_ms: u64,
    pub overall_deadline_ms: u64,
    pub max_inflight_venue_calls: usize,
    pub max_state_age_ms: u64,
    pub max_hops: u8,
    pub max_splits: usize,
    pub price_impact_ceiling_bps: u32,
    pub granularity_bps: u32,
    pub min_improvement_bps: u32,
    pub default_slippage_bps: u32,
    pub deadline_window_secs: u64,
    pub base_latency_ms: u64,
    pub per_hop_latency_ms: u64,
    pub gas: GasConfig,
}

impl Default for QuotingConfig {
    fn default() -> Self {
        Self {
            per_venue_timeout_ms: 1_500,
            overall_deadline_ms: 3_000,
            max_inflight_venue_calls: 64,
            max_state_age_ms: 30_000,
            max_hops: 3,
            max_splits: 3,
            price_impact_ceiling_bps: 100,
            granularity_bps: 100,
            min_improvement_bps: 0,
            default_slippage_bps: 50,
            deadline_window_secs: 1_200,
            base_latency_ms: 1_000,
            per_hop_latency_ms: 3_000,
            gas: GasConfig::default(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_chain_id() -> u64 {
    999
}

fn default_max_inflight() -> usize {
    256
}

fn default_decimals() -> u8 {
    18
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Optional file named by `APP_CONFIG`, then `APP__*` environment variables.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var("APP_CONFIG") {
            builder = builder.add_source(config::File::with_name(&path));
        }
        let cfg = builder
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("build configuration")?;
        cfg.try_deserialize().context("deserialize configuration")
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Yaml))
            .build()
            .context("parse yaml configuration")?;
        cfg.try_deserialize().context("deserialize configuration")
    }

    pub fn asset_book(&self) -> Result<AssetBook, ConfigError> {
        let mut book = AssetBook::default();
        for asset in &self.assets {
            book.insert(
                &asset.symbol,
                AssetRef::new(self.chain_id, &asset.address, asset.decimals),
            );
        }
        Ok(book)
    }

    /// Venue descriptors; an unknown family or duplicate name fails the load.
    pub fn venues(&self) -> Result<Vec<Venue>, ConfigError> {
        let mut seen = HashSet::new();
        let mut venues = Vec::with_capacity(self.venues.len());
        for cfg in &self.venues {
            if !seen.insert(cfg.name.clone()) {
                return Err(ConfigError::DuplicateVenue(cfg.name.clone()));
            }
            let family: VenueFamily = cfg.family.parse()?;
            venues.push(Venue {
                name: cfg.name.clone(),
                family,
                fee_bps: cfg.fee_bps,
                enabled: cfg.enabled,
                address: cfg.address.to_ascii_lowercase(),
            });
        }
        Ok(venues)
    }

    pub fn hub_assets(&self, book: &AssetBook) -> Result<Vec<AssetRef>, ConfigError> {
        self.hub_assets.iter().map(|key| book.require(key)).collect()
    }

    pub fn adapter_settings(&self, book: &AssetBook) -> Result<AdapterSettings, ConfigError> {
        let defaults = GasSchedule::default();
        let gas = &self.quoting.gas;
        Ok(AdapterSettings {
            max_state_age: Duration::from_millis(self.quoting.max_state_age_ms),
            hub_assets: self.hub_assets(book)?,
            gas: GasSchedule {
                amm_v2: gas.amm_v2.unwrap_or(defaults.amm_v2),
                amm_v3: gas.amm_v3.unwrap_or(defaults.amm_v3),
                order_book: gas.order_book.unwrap_or(defaults.order_book),
            },
        })
    }

    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            per_venue_timeout: Duration::from_millis(self.quoting.per_venue_timeout_ms),
            overall_deadline: Duration::from_millis(self.quoting.overall_deadline_ms),
            max_inflight_venue_calls: self.quoting.max_inflight_venue_calls,
        }
    }

    pub fn optimizer_settings(&self) -> OptimizerSettings {
        OptimizerSettings {
            granularity_bps: self.quoting.granularity_bps,
            min_improvement_bps: self.quoting.min_improvement_bps,
        }
    }

    pub fn cost_settings(&self) -> CostSettings {
        CostSettings {
            base_latency: Duration::from_millis(self.quoting.base_latency_ms),
            per_hop_latency: Duration::from_millis(self.quoting.per_hop_latency_ms),
        }
    }

    /// Load the configured pools into an in-memory source, stamped `observed_at`.
    pub async fn seed_pools(
        &self,
        source: &InMemoryPriceSource,
        book: &AssetBook,
        observed_at: DateTime<Utc>,
    ) -> Result<usize, ConfigError> {
        let venues = self.venues()?;
        let mut stored = 0;
        for pool in &self.pools {
            let venue = venues
                .iter()
                .find(|v| v.name == pool.venue)
                .ok_or_else(|| ConfigError::UnknownVenue(pool.venue.clone()))?;
            if pool.model.family() != venue.family {
                return Err(ConfigError::InvalidPool {
                    venue: pool.venue.clone(),
                    reason: format!(
                        "{} pool configured for a {} venue",
                        pool.model.family(),
                        venue.family
                    ),
                });
            }
            let token_in = book.require(&pool.token_in)?;
            let token_out = book.require(&pool.token_out)?;
            if token_in == token_out {
                return Err(ConfigError::InvalidPool {
                    venue: pool.venue.clone(),
                    reason: "token_in equals token_out".to_string(),
                });
            }
            let snapshot = PoolSnapshot::new(pool.model.clone(), observed_at);
            if pool.bidirectional {
                let both = source
                    .upsert_bidirectional(&pool.venue, &token_in, &token_out, snapshot)
                    .await;
                stored += if both { 2 } else { 1 };
            } else {
                source.upsert(&pool.venue, &token_in, &token_out, snapshot).await;
                stored += 1;
            }
            debug!(venue = %pool.venue, token_in = %token_in, token_out = %token_out, "pool seeded");
        }
        Ok(stored)
    }
}
