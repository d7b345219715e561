//! Periodic publication of the index price

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use index_core::{CoreResult, IndexConfig, Price};
use index_price_feed::{
    AggregatorConfig, PriceAggregator, Shutdown, SimulatedExchange, SimulatedExchangeConfig,
};

/// Subscribe `config.exchanges` simulated exchanges and publish the index
/// price once per resolution period until `shutdown` fires.
///
/// The returned channel closes after every source has stopped.
pub fn subscribe_price_stream(
    config: &IndexConfig,
    shutdown: Shutdown,
) -> CoreResult<mpsc::Receiver<Price>> {
    let mut aggregator = PriceAggregator::new(AggregatorConfig {
        resolution: config.resolution(),
    })?;
    let start_price = config.start_price()?;

    for i in 0..config.exchanges {
        let exchange = SimulatedExchange::new(SimulatedExchangeConfig {
            name: format!("exchange_{}", i),
            ticker: config.ticker.clone(),
            start_price,
            push_interval: config.push_interval(),
            max_latency: config.max_latency(),
        });
        aggregator.add_source(shutdown.clone(), &exchange);
    }
    info!(
        "Subscribed to {} exchanges for {}, resolution {:?}",
        config.exchanges,
        config.ticker,
        config.resolution()
    );

    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(publish(aggregator, config.resolution(), tx, shutdown));

    Ok(rx)
}

async fn publish(
    mut aggregator: PriceAggregator,
    period: Duration,
    tx: mpsc::Sender<Price>,
    mut shutdown: Shutdown,
) {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let price = aggregator.calc_current_price();
                let stats = aggregator.stats();
                debug!(
                    "Priced {} from {} samples, {} live sources",
                    price.amount, stats.store.retained, stats.live_sources
                );

                if tx.send(price).await.is_err() {
                    debug!("Price receiver dropped");
                    break;
                }
            }
        }
    }

    aggregator.join_sources().await;
    info!("Price stream stopped");
}
