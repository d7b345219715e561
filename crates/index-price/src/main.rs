//! Index price - rolling BTC index from many exchanges
//!
//! Prints `<unix seconds>, <price>` once per resolution period

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use index_price::{format_price, settings, subscribe_price_stream};
use index_price_feed::Shutdown;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging; stdout carries only prices
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting index price v{}", env!("CARGO_PKG_VERSION"));

    let config = settings::load()?;

    let (trigger, shutdown) = Shutdown::new();

    // Spawn shutdown signal handler
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    error!("Failed to install signal handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C");
            }
            _ = terminate => {
                info!("Received termination signal");
            }
        }

        trigger.trigger();
    });

    let mut prices = subscribe_price_stream(&config, shutdown)?;
    while let Some(price) = prices.recv().await {
        println!("{}", format_price(&price, config.output)?);
    }

    info!("Shutdown complete");
    Ok(())
}
