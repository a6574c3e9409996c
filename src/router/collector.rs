// Quote collector - concurrent venue fan-out
// This file issues one time-boxed quote task per eligible venue, drains the
// results until the request deadline and classifies venue failures
//
// Numan Thabit 2025 Nov

use crate::errors::VenueError;
use crate::metrics::{VENUE_ERRORS, VENUE_LATENCY};
use crate::venues::{AssetPair, Quote, VenueAdapter};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorSettings {
    pub per_venue_timeout: Duration,
    pub overall_deadline: Duration,
    /// Upper bound on venue calls in flight across all requests.
    pub max_inflight_venue_calls: usize,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            per_venue_timeout: Duration::from_millis(1_500),
            overall_deadline: Duration::from_millis(3_000),
            max_inflight_venue_calls: 64,
        }
    }
}

/// One pricing request fanned out to venues.
#[derive(Debug, Clone)]
pub struct CollectRequest {
    pub pair: AssetPair,
    pub amount_in: u128,
    pub max_hops: u8,
    pub excluded: HashSet<String>,
    pub per_venue_timeout: Duration,
    pub overall_deadline: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Venue(VenueError),
    /// The venue call exceeded its own time box.
    Timeout,
    /// Still pending when the request deadline elapsed; result discarded.
    Discarded,
    /// The venue task died without producing a result.
    Aborted,
}

impl FailureReason {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Venue(err) => err.kind(),
            Self::Timeout => "timeout",
            Self::Discarded => "deadline",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Venue(err) => write!(f, "{err}"),
            Self::Timeout => f.write_str("venue call timed out"),
            Self::Discarded => f.write_str("result discarded at request deadline"),
            Self::Aborted => f.write_str("venue task aborted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueFailure {
    pub venue: String,
    pub reason: FailureReason,
}

/// Whatever arrived before the deadline. An empty quote set means no
/// liquidity, not a collector fault.
#[derive(Debug, Clone, Default)]
pub struct QuoteCollection {
    /// Sorted by venue name.
    pub quotes: Vec<Quote>,
    /// Sorted by venue name.
    pub failures: Vec<VenueFailure>,
    pub deadline_hit: bool,
    pub venues_queried: usize,
}

impl QuoteCollection {
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct QuoteCollector {
    venue_calls: Arc<Semaphore>,
}

impl Default for QuoteCollector {
    fn default() -> Self {
        Self::new(CollectorSettings::default().max_inflight_venue_calls)
    }
}

impl QuoteCollector {
    pub fn new(max_inflight_venue_calls: usize) -> Self {
        Self {
            venue_calls: Arc::new(Semaphore::new(max_inflight_venue_calls.max(1))),
        }
    }

    #[tracing::instrument(skip_all, fields(pair = %request.pair.token_in, amount_in = %request.amount_in))]
    pub async fn collect_quotes(
        &self,
        venues: &[VenueAdapter],
        request: &CollectRequest,
    ) -> QuoteCollection {
        let deadline = tokio::time::Instant::now() + request.overall_deadline;
        let mut tasks = JoinSet::new();
        let mut pending = BTreeSet::new();

        for adapter in venues
            .iter()
            .filter(|a| a.is_enabled() && !request.excluded.contains(a.name()))
        {
            if !pending.insert(adapter.name().to_string()) {
                continue;
            }
            let adapter = adapter.clone();
            let pair = request.pair.clone();
            let amount_in = request.amount_in;
            let max_hops = request.max_hops;
            let per_venue_timeout = request.per_venue_timeout;
            let permits = self.venue_calls.clone();

            tasks.spawn(async move {
                let name = adapter.name().to_string();
                let started = Instant::now();
                // Queueing for a permit counts toward the venue's budget.
                let call = async {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|_| FailureReason::Aborted)?;
                    adapter
                        .get_quote(&pair, amount_in, max_hops)
                        .await
                        .map_err(FailureReason::Venue)
                };
                let outcome = match timeout(per_venue_timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(FailureReason::Timeout),
                };
                let label = match &outcome {
                    Ok(_) => "ok",
                    Err(reason) => reason.kind(),
                };
                VENUE_LATENCY
                    .with_label_values(&[name.as_str(), label])
                    .observe(started.elapsed().as_secs_f64());
                (name, outcome)
            });
        }

        let mut collection = QuoteCollection {
            venues_queried: pending.len(),
            ..QuoteCollection::default()
        };

        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((name, outcome)))) => {
                    pending.remove(&name);
                    match outcome {
                        Ok(quote) => collection.quotes.push(quote),
                        Err(reason) => collection.failures.push(VenueFailure {
                            venue: name,
                            reason,
                        }),
                    }
                }
                Ok(Some(Err(err))) => {
                    warn!(error = %err, "venue task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    collection.deadline_hit = true;
                    tasks.abort_all();
                    break;
                }
            }
        }

        let leftover = if collection.deadline_hit {
            FailureReason::Discarded
        } else {
            FailureReason::Aborted
        };
        for venue in pending {
            collection.failures.push(VenueFailure {
                venue,
                reason: leftover.clone(),
            });
        }

        for failure in &collection.failures {
            VENUE_ERRORS
                .with_label_values(&[failure.venue.as_str(), failure.reason.kind()])
                .inc();
            match failure.reason {
                FailureReason::Venue(VenueError::InvalidPair { .. }) => {
                    debug!(venue = %failure.venue, reason = %failure.reason, "venue excluded")
                }
                _ => warn!(venue = %failure.venue, reason = %failure.reason, "venue excluded"),
            }
        }

        collection.quotes.sort_by(|a, b| a.venue.cmp(&b.venue));
        collection.failures.sort_by(|a, b| a.venue.cmp(&b.venue));
        debug!(
            quotes = collection.quotes.len(),
            failures = collection.failures.len(),
            deadline_hit = collection.deadline_hit,
            "quote collection finished"
        );
        collection
    }
}
