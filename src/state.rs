// Venue state and the price-source collaborator
//
// Adapters read pool state through the `PriceSource` trait. The in-memory source
// keeps the latest snapshot per (venue, direction) and broadcasts updates to
// subscribers.
//
// Numan Thabit 2025 Nov

use crate::errors::AggrError;
use crate::metrics::POOL_UPDATES;
use crate::venues::{AssetRef, PoolModel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

/// Pool state as last observed by the price source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub model: PoolModel,
    pub observed_at: DateTime<Utc>,
}

impl PoolSnapshot {
    pub fn new(model: PoolModel, observed_at: DateTime<Utc>) -> Self {
        Self { model, observed_at }
    }

    /// Age relative to `now`; snapshots from the future count as fresh.
    pub fn age_ms(&self, now: DateTime<Utc>) -> u64 {
        (now - self.observed_at).num_milliseconds().max(0) as u64
    }
}

/// Read-only view of venue state (reserves, ranges, books).
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Latest snapshot for selling `token_in` into `token_out` on `venue`,
    /// or `None` when the venue has no such pool.
    async fn pool_state(
        &self,
        venue: &str,
        token_in: &AssetRef,
        token_out: &AssetRef,
    ) -> Result<Option<PoolSnapshot>, AggrError>;

    async fn readiness_probe(&self) -> Result<(), AggrError> {
        Ok(())
    }

    /// Every stored pool direction. Remote sources only answer lookups.
    async fn list_pools(&self) -> Result<Vec<PoolEntry>, AggrError> {
        Ok(Vec::new())
    }
}

/// One stored pool direction.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolEntry {
    pub venue: String,
    pub token_in: AssetRef,
    pub token_out: AssetRef,
    pub snapshot: PoolSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    venue: String,
    token_in: AssetRef,
    token_out: AssetRef,
}

#[derive(Debug, Clone)]
pub struct PoolUpdate {
    pub venue: String,
    pub token_in: AssetRef,
    pub token_out: AssetRef,
    pub observed_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct InMemoryPriceSource {
    pools: Arc<RwLock<HashMap<PoolKey, PoolSnapshot>>>,
    tx: broadcast::Sender<PoolUpdate>,
}

impl Default for InMemoryPriceSource {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl InMemoryPriceSource {
    pub fn new(buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer);
        Self {
            pools: Arc::new(RwLock::new(HashMap::new())),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolUpdate> {
        self.tx.subscribe()
    }

    /// Store one direction of a pool.
    pub async fn upsert(
        &self,
        venue: &str,
        token_in: &AssetRef,
        token_out: &AssetRef,
        snapshot: PoolSnapshot,
    ) {
        let key = PoolKey {
            venue: venue.to_string(),
            token_in: token_in.clone(),
            token_out: token_out.clone(),
        };
        let observed_at = snapshot.observed_at;
        {
            let mut guard = self.pools.write().await;
            guard.insert(key, snapshot);
        }
        let _ = self.tx.send(PoolUpdate {
            venue: venue.to_string(),
            token_in: token_in.clone(),
            token_out: token_out.clone(),
            observed_at,
        });
        debug!(venue = %venue, token_in = %token_in, token_out = %token_out, "pool state updated");
    }

    /// Store a pool in both directions. Returns false when the model has no
    /// inverse (order books), in which case only the given direction is stored.
    pub async fn upsert_bidirectional(
        &self,
        venue: &str,
        token_in: &AssetRef,
        token_out: &AssetRef,
        snapshot: PoolSnapshot,
    ) -> bool {
        let inverse = snapshot
            .model
            .inverted()
            .map(|model| PoolSnapshot::new(model, snapshot.observed_at));
        self.upsert(venue, token_in, token_out, snapshot).await;
        match inverse {
            Some(inverse) => {
                self.upsert(venue, token_out, token_in, inverse).await;
                true
            }
            None => false,
        }
    }

    /// Re-stamp every stored snapshot, used when serving static fixture pools.
    /// Each re-stamped pool is announced to subscribers.
    pub async fn restamp_all(&self, observed_at: DateTime<Utc>) -> usize {
        let mut guard = self.pools.write().await;
        for (key, snapshot) in guard.iter_mut() {
            snapshot.observed_at = observed_at;
            let _ = self.tx.send(PoolUpdate {
                venue: key.venue.clone(),
                token_in: key.token_in.clone(),
                token_out: key.token_out.clone(),
                observed_at,
            });
        }
        guard.len()
    }

    pub async fn len(&self) -> usize {
        self.pools.read().await.len()
    }
}

/// Count pool updates per venue until every sender is gone. Returns the number
/// of updates received; lagged updates are logged and skipped.
pub async fn record_pool_updates(mut updates: broadcast::Receiver<PoolUpdate>) -> u64 {
    let mut seen = 0;
    loop {
        match updates.recv().await {
            Ok(update) => {
                seen += 1;
                POOL_UPDATES.with_label_values(&[&update.venue]).inc();
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "pool update subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return seen,
        }
    }
}

#[async_trait]
impl PriceSource for InMemoryPriceSource {
    async fn pool_state(
        &self,
        venue: &str,
        token_in: &AssetRef,
        token_out: &AssetRef,
    ) -> Result<Option<PoolSnapshot>, AggrError> {
        let key = PoolKey {
            venue: venue.to_string(),
            token_in: token_in.clone(),
            token_out: token_out.clone(),
        };
        Ok(self.pools.read().await.get(&key).cloned())
    }

    async fn list_pools(&self) -> Result<Vec<PoolEntry>, AggrError> {
        let mut entries: Vec<PoolEntry> = self
            .pools
            .read()
            .await
            .iter()
            .map(|(key, snapshot)| PoolEntry {
                venue: key.venue.clone(),
                token_in: key.token_in.clone(),
                token_out: key.token_out.clone(),
                snapshot: snapshot.clone(),
            })
            .collect();
        entries.sort_by(|a, b| {
            (&a.venue, &a.token_in, &a.token_out).cmp(&(&b.venue, &b.token_in, &b.token_out))
        });
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venues::{BookLevel, ConstantProductPool, OrderBookPool};

    fn asset(n: u8) -> AssetRef {
        AssetRef::new(1, &format!("0x{:040x}", n), 18)
    }

    #[tokio::test]
    async fn bidirectional_upsert_stores_inverse() {
        let source = InMemoryPriceSource::new(16);
        let mut updates = source.subscribe();
        let model = PoolModel::ConstantProduct(ConstantProductPool {
            reserve_in: 100,
            reserve_out: 300,
        });
        let stored = source
            .upsert_bidirectional("v2", &asset(1), &asset(2), PoolSnapshot::new(model, Utc::now()))
            .await;
        assert!(stored);
        assert_eq!(source.len().await, 2);

        let reverse = source
            .pool_state("v2", &asset(2), &asset(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            reverse.model,
            PoolModel::ConstantProduct(ConstantProductPool {
                reserve_in: 300,
                reserve_out: 100,
            })
        );
        assert_eq!(updates.recv().await.unwrap().venue, "v2");
        assert!(source
            .pool_state("other", &asset(1), &asset(2))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn order_book_is_stored_one_way() {
        let source = InMemoryPriceSource::default();
        let model = PoolModel::OrderBook(OrderBookPool {
            levels: vec![BookLevel {
                price: 1.0,
                max_input: 10,
            }],
        });
        let stored = source
            .upsert_bidirectional("book", &asset(1), &asset(2), PoolSnapshot::new(model, Utc::now()))
            .await;
        assert!(!stored);
        assert_eq!(source.len().await, 1);
    }

    #[tokio::test]
    async fn pools_are_listed_in_key_order() {
        let source = InMemoryPriceSource::default();
        let model = PoolModel::ConstantProduct(ConstantProductPool {
            reserve_in: 100,
            reserve_out: 300,
        });
        let now = Utc::now();
        source
            .upsert_bidirectional("v2-b", &asset(1), &asset(2), PoolSnapshot::new(model.clone(), now))
            .await;
        source
            .upsert("v2-a", &asset(2), &asset(3), PoolSnapshot::new(model, now))
            .await;

        let listed = source.list_pools().await.unwrap();
        let keys: Vec<(&str, AssetRef)> = listed
            .iter()
            .map(|e| (e.venue.as_str(), e.token_in.clone()))
            .collect();
        assert_eq!(
            keys,
            [("v2-a", asset(2)), ("v2-b", asset(1)), ("v2-b", asset(2))]
        );
        assert!(listed.iter().all(|e| e.snapshot.observed_at == now));
    }

    #[tokio::test]
    async fn recorder_counts_upserts_and_restamps() {
        let source = InMemoryPriceSource::new(64);
        let recorder = tokio::spawn(record_pool_updates(source.subscribe()));
        let before = POOL_UPDATES.with_label_values(&["counted"]).get();

        let model = PoolModel::ConstantProduct(ConstantProductPool {
            reserve_in: 100,
            reserve_out: 300,
        });
        source
            .upsert_bidirectional("counted", &asset(1), &asset(2), PoolSnapshot::new(model, Utc::now()))
            .await;
        assert_eq!(source.restamp_all(Utc::now()).await, 2);
        drop(source);

        assert_eq!(recorder.await.unwrap(), 4);
        assert_eq!(POOL_UPDATES.with_label_values(&["counted"]).get() - before, 4.0);
    }

    #[test]
    fn age_is_never_negative() {
        let now = Utc::now();
        let snapshot = PoolSnapshot::new(
            PoolModel::OrderBook(OrderBookPool { levels: vec![] }),
            now + chrono::Duration::seconds(5),
        );
        assert_eq!(snapshot.age_ms(now), 0);
    }
}
