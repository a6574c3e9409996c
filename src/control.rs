// Control plane: admission control and the venue registry
//
// Provides request concurrency and rate limiting, and the atomically swapped
// venue configuration snapshot that every request reads exactly once.
//
// Numan Thabit 2025 Nov

use crate::errors::ConfigError;
use crate::venues::{Venue, VenueAdapter};
use arc_swap::ArcSwap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{AcquireError, Mutex, Semaphore};
use tracing::info;

#[derive(Clone)]
pub struct AdmissionControl {
    max_inflight: Arc<Semaphore>,
    // Simple rate limiter: allow up to rate_per_sec within a 1s sliding window
    inner: Arc<Mutex<RateLimiter>>,
}

struct RateLimiter {
    rate_per_sec: u32,
    timestamps: VecDeque<Instant>,
    window: Duration,
}

impl AdmissionControl {
    pub fn new(max_inflight: usize, rate_per_sec: Option<u32>) -> Self {
        let rl = RateLimiter {
            rate_per_sec: rate_per_sec.unwrap_or(200),
            timestamps: VecDeque::with_capacity(256),
            window: Duration::from_secs(1),
        };
        Self {
            max_inflight: Arc::new(Semaphore::new(max_inflight.max(1))),
            inner: Arc::new(Mutex::new(rl)),
        }
    }

    /// Acquire an admission permit respecting max inflight and rate limit.
    pub async fn acquire(&self) -> Result<AdmissionPermit, AcquireError> {
        // Rate limit loop
        loop {
            let mut guard = self.inner.lock().await;
            let now = Instant::now();
            while let Some(front) = guard.timestamps.front() {
                if now.duration_since(*front) > guard.window {
                    guard.timestamps.pop_front();
                } else {
                    break;
                }
            }
            if (guard.timestamps.len() as u32) < guard.rate_per_sec {
                guard.timestamps.push_back(now);
                break;
            }
            drop(guard);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let permit = self.max_inflight.clone().acquire_owned().await?;
        Ok(AdmissionPermit { _permit: permit })
    }

    pub fn available(&self) -> usize {
        self.max_inflight.available_permits()
    }
}

pub struct AdmissionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Immutable view of the configured venues. Requests hold on to the snapshot
/// they loaded; toggles only affect snapshots loaded afterwards.
#[derive(Debug, Clone, Default)]
pub struct VenueSnapshot {
    adapters: Vec<VenueAdapter>,
    version: u64,
}

impl VenueSnapshot {
    pub fn new(adapters: Vec<VenueAdapter>) -> Self {
        Self {
            adapters,
            version: 0,
        }
    }

    pub fn adapters(&self) -> &[VenueAdapter] {
        &self.adapters
    }

    pub fn venues(&self) -> Vec<Venue> {
        self.adapters.iter().map(|a| a.venue().clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&VenueAdapter> {
        self.adapters.iter().find(|a| a.name() == name)
    }

    pub fn enabled_count(&self) -> usize {
        self.adapters.iter().filter(|a| a.is_enabled()).count()
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

pub struct VenueRegistry {
    current: ArcSwap<VenueSnapshot>,
}

impl VenueRegistry {
    pub fn new(adapters: Vec<VenueAdapter>) -> Result<Self, ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for adapter in &adapters {
            if !seen.insert(adapter.name().to_string()) {
                return Err(ConfigError::DuplicateVenue(adapter.name().to_string()));
            }
        }
        Ok(Self {
            current: ArcSwap::from_pointee(VenueSnapshot::new(adapters)),
        })
    }

    pub fn snapshot(&self) -> Arc<VenueSnapshot> {
        self.current.load_full()
    }

    /// Publish a new snapshot with the venue's flag changed. Returns the
    /// updated venue descriptor.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<Venue, ConfigError> {
        if self.current.load().get(name).is_none() {
            return Err(ConfigError::UnknownVenue(name.to_string()));
        }
        let previous = self.current.rcu(|snapshot| {
            let adapters = snapshot
                .adapters
                .iter()
                .map(|a| {
                    if a.name() == name {
                        a.with_enabled(enabled)
                    } else {
                        a.clone()
                    }
                })
                .collect();
            VenueSnapshot {
                adapters,
                version: snapshot.version + 1,
            }
        });
        info!(venue = %name, enabled, version = previous.version + 1, "venue toggled");
        self.current
            .load()
            .get(name)
            .map(|a| a.venue().clone())
            .ok_or_else(|| ConfigError::UnknownVenue(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryPriceSource;
    use crate::venues::{AdapterSettings, VenueFamily};

    fn adapter(name: &str) -> VenueAdapter {
        VenueAdapter::new(
            Venue {
                name: name.to_string(),
                family: VenueFamily::AmmV2,
                fee_bps: 30,
                enabled: true,
                address: String::new(),
            },
            Arc::new(InMemoryPriceSource::default()),
            Arc::new(AdapterSettings::default()),
        )
    }

    #[test]
    fn toggles_publish_new_snapshots() {
        let registry = VenueRegistry::new(vec![adapter("a"), adapter("b")]).unwrap();
        let before = registry.snapshot();

        let venue = registry.set_enabled("a", false).unwrap();
        assert!(!venue.enabled);

        // In-flight readers keep their view.
        assert!(before.get("a").unwrap().is_enabled());
        let after = registry.snapshot();
        assert!(!after.get("a").unwrap().is_enabled());
        assert_eq!(after.enabled_count(), 1);
        assert_eq!(after.version(), before.version() + 1);
    }

    #[test]
    fn unknown_and_duplicate_venues_are_rejected() {
        let registry = VenueRegistry::new(vec![adapter("a")]).unwrap();
        assert!(matches!(
            registry.set_enabled("zzz", true),
            Err(ConfigError::UnknownVenue(_))
        ));
        assert!(matches!(
            VenueRegistry::new(vec![adapter("a"), adapter("a")]),
            Err(ConfigError::DuplicateVenue(_))
        ));
    }

    #[tokio::test]
    async fn admission_bounds_inflight() {
        let control = AdmissionControl::new(1, Some(100));
        let permit = control.acquire().await.unwrap();
        assert_eq!(control.available(), 0);
        drop(permit);
        assert_eq!(control.available(), 1);
    }
}
