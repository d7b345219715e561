//! Price aggregator - fans many feeds into one windowed store

use dashmap::DashMap;
use futures::StreamExt;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use index_core::{truncate, Clock, CoreResult, Price, SystemClock};
use crate::feeds::{FeedEvent, FeedEvents, PriceFeed, Termination};
use crate::shutdown::Shutdown;
use crate::wam::{round_amount, weighted_average};
use crate::window::{StoreStats, WindowedStore};

/// Aggregator configuration
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Output bucket size and sample relevance window
    pub resolution: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            resolution: Duration::from_secs(60),
        }
    }
}

/// Handle of a source registered with [`PriceAggregator::add_source`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(usize);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source-{}", self.0)
    }
}

/// Lifecycle of a subscribed source. Terminal states are permanent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    Live,
    Closed,
    Cancelled,
    Failed(String),
}

#[derive(Debug)]
struct SourceEntry {
    name: String,
    status: SourceStatus,
    forwarded: u64,
}

/// Main price aggregator
pub struct PriceAggregator {
    clock: Arc<dyn Clock>,
    store: Arc<WindowedStore>,
    sources: Arc<DashMap<SourceId, SourceEntry>>,
    handles: Vec<JoinHandle<()>>,
}

impl PriceAggregator {
    pub fn new(config: AggregatorConfig) -> CoreResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: AggregatorConfig, clock: Arc<dyn Clock>) -> CoreResult<Self> {
        let store = WindowedStore::with_clock(config.resolution, Arc::clone(&clock))?;

        Ok(Self {
            clock,
            store: Arc::new(store),
            sources: Arc::new(DashMap::new()),
            handles: vec![],
        })
    }

    /// Get shared store reference
    pub fn store(&self) -> Arc<WindowedStore> {
        Arc::clone(&self.store)
    }

    /// Subscribe to `feed` and forward its samples into the store until the
    /// feed terminates or `shutdown` fires.
    ///
    /// A terminated source is never resubscribed. Must be called from within
    /// a tokio runtime.
    pub fn add_source<F>(&mut self, shutdown: Shutdown, feed: &F) -> SourceId
    where
        F: PriceFeed + ?Sized,
    {
        let id = SourceId(self.sources.len());
        let name = feed.name().to_string();

        self.sources.insert(
            id,
            SourceEntry {
                name: name.clone(),
                status: SourceStatus::Live,
                forwarded: 0,
            },
        );

        let events = feed.subscribe(shutdown.clone());
        let store = Arc::clone(&self.store);
        let sources = Arc::clone(&self.sources);

        let handle = tokio::spawn(async move {
            forward(id, events, shutdown, store, sources).await;
        });

        self.handles.push(handle);
        info!("Subscribed to {} as {}", name, id);
        id
    }

    /// Weighted average of the samples currently in the window, stamped with
    /// the current bucket. An empty window prices at zero.
    pub fn calc_current_price(&self) -> Price {
        let samples = self.store.get();
        let time = truncate(self.clock.now(), self.store.resolution());

        if samples.is_empty() {
            return Price::new(time, Decimal::ZERO);
        }

        Price::new(time, round_amount(weighted_average(&samples)))
    }

    pub fn source_status(&self, id: SourceId) -> Option<SourceStatus> {
        self.sources.get(&id).map(|e| e.status.clone())
    }

    pub fn source_name(&self, id: SourceId) -> Option<String> {
        self.sources.get(&id).map(|e| e.name.clone())
    }

    /// Wait for every forwarding task to finish. Only returns once the
    /// sources have terminated or been cancelled.
    pub async fn join_sources(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!("Forwarding task ended abnormally: {}", e);
            }
        }
    }

    /// Get statistics
    pub fn stats(&self) -> AggregatorStats {
        let mut live_sources = 0;
        let mut forwarded = 0;
        for entry in self.sources.iter() {
            if entry.status == SourceStatus::Live {
                live_sources += 1;
            }
            forwarded += entry.forwarded;
        }

        AggregatorStats {
            source_count: self.sources.len(),
            live_sources,
            forwarded,
            store: self.store.stats(),
        }
    }
}

async fn forward(
    id: SourceId,
    mut events: FeedEvents,
    mut shutdown: Shutdown,
    store: Arc<WindowedStore>,
    sources: Arc<DashMap<SourceId, SourceEntry>>,
) {
    let status = loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break SourceStatus::Cancelled,
            event = events.next() => match event {
                Some(FeedEvent::Sample(sample)) => {
                    store.add(sample);
                    if let Some(mut entry) = sources.get_mut(&id) {
                        entry.forwarded += 1;
                    }
                }
                Some(FeedEvent::Terminated(Termination::Closed)) | None => {
                    break SourceStatus::Closed;
                }
                Some(FeedEvent::Terminated(Termination::Cancelled)) => {
                    break SourceStatus::Cancelled;
                }
                Some(FeedEvent::Terminated(Termination::Failed(e))) => {
                    break SourceStatus::Failed(e.to_string());
                }
            },
        }
    };

    let name = match sources.get_mut(&id) {
        Some(mut entry) => {
            entry.status = status.clone();
            entry.name.clone()
        }
        None => id.to_string(),
    };

    match status {
        SourceStatus::Failed(reason) => error!("Source {} failed: {}", name, reason),
        SourceStatus::Cancelled => info!("Source {} cancelled", name),
        _ => info!("Source {} closed", name),
    }
}

/// Aggregator statistics
#[derive(Debug, Clone)]
pub struct AggregatorStats {
    pub source_count: usize,
    pub live_sources: usize,
    pub forwarded: u64,
    pub store: StoreStats,
}
