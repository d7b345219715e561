//! Price feed contract and a simulated exchange implementation

use chrono::Utc;
use futures::Stream;
use rand::Rng;
use rust_decimal::Decimal;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use index_core::{PriceFeedError, Sample, Ticker};

use crate::shutdown::Shutdown;

/// Why a feed stopped producing samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Source finished on its own
    Closed,
    /// Shutdown was requested
    Cancelled,
    Failed(PriceFeedError),
}

/// Event produced by a feed subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Sample(Sample),
    Terminated(Termination),
}

/// Subscription stream of a single feed.
///
/// Always ends with exactly one [`FeedEvent::Terminated`]; nothing is
/// yielded after it. A source that simply ends is reported as
/// [`Termination::Closed`].
pub struct FeedEvents {
    inner: Pin<Box<dyn Stream<Item = FeedEvent> + Send>>,
    terminated: bool,
}

impl FeedEvents {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = FeedEvent> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
            terminated: false,
        }
    }

    pub fn from_receiver(rx: mpsc::Receiver<FeedEvent>) -> Self {
        Self::new(ReceiverStream::new(rx))
    }
}

impl Stream for FeedEvents {
    type Item = FeedEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<FeedEvent>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(event @ FeedEvent::Terminated(_))) => {
                this.terminated = true;
                Poll::Ready(Some(event))
            }
            Poll::Ready(Some(event)) => Poll::Ready(Some(event)),
            Poll::Ready(None) => {
                this.terminated = true;
                Poll::Ready(Some(FeedEvent::Terminated(Termination::Closed)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for FeedEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedEvents")
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

/// A source of price samples that can be subscribed to
pub trait PriceFeed: Send + Sync {
    fn name(&self) -> &str;

    /// Start streaming samples until `shutdown` fires or the source ends
    fn subscribe(&self, shutdown: Shutdown) -> FeedEvents;
}

/// Feed configuration
#[derive(Debug, Clone)]
pub struct SimulatedExchangeConfig {
    pub name: String,
    pub ticker: Ticker,
    pub start_price: Decimal,
    pub push_interval: Duration,
    pub max_latency: Duration,
}

/// Random-walk exchange with artificial network latency.
///
/// Each sample is stamped when it is produced and delivered only after the
/// push interval plus a random latency, so it arrives already aged.
#[derive(Debug, Clone)]
pub struct SimulatedExchange {
    config: SimulatedExchangeConfig,
}

impl SimulatedExchange {
    pub fn new(config: SimulatedExchangeConfig) -> Self {
        Self { config }
    }

    async fn run(config: SimulatedExchangeConfig, tx: mpsc::Sender<FeedEvent>, mut shutdown: Shutdown) {
        let mut base = config.start_price;
        let max_latency_ms = u64::try_from(config.max_latency.as_millis()).unwrap_or(u64::MAX);

        loop {
            let (volatility, latency) = {
                let mut rng = rand::thread_rng();
                let cents: i64 = rng.gen_range(0..100);
                let latency = if max_latency_ms == 0 { 0 } else { rng.gen_range(0..max_latency_ms) };
                (Decimal::new(cents, 2), Duration::from_millis(latency))
            };

            let mut price = base + volatility;
            price.rescale(2);
            let sample = Sample::new(config.ticker.clone(), Utc::now(), price);

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(config.push_interval.saturating_add(latency)) => {}
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                sent = tx.send(FeedEvent::Sample(sample)) => {
                    if sent.is_err() {
                        debug!("Exchange {} has no subscriber left", config.name);
                        return;
                    }
                }
            }

            // slowly going up
            base += Decimal::ONE;
        }

        info!("Exchange {} stopped", config.name);
        let _ = tx.send(FeedEvent::Terminated(Termination::Cancelled)).await;
    }
}

impl PriceFeed for SimulatedExchange {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn subscribe(&self, shutdown: Shutdown) -> FeedEvents {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(Self::run(self.config.clone(), tx, shutdown));
        FeedEvents::from_receiver(rx)
    }
}
