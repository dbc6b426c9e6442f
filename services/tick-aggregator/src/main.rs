//! Standalone tick aggregator
//!
//! Reads matching-engine records as newline-delimited JSON on stdin
//! (`{"type":"match",...}`), aggregates them per configured product and
//! prints every published ticker as a JSON line on stdout. The tick store
//! is in-memory, so every run bootstraps empty.

use std::sync::Arc;

use tick_aggregator::channel::Channel;
use tick_aggregator::publish::BroadcastPublisher;
use tick_aggregator::query::MemoryTickQuery;
use tick_aggregator::stream::LogRouter;
use tick_aggregator::{ServiceConfig, TickerService, SERVICE_VERSION};
use tokio::io::BufReader;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tick_aggregator=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(version = SERVICE_VERSION, "Starting tick aggregator");

    let config = ServiceConfig::from_env()?;
    let router = LogRouter::new(&config.products);
    let publisher = Arc::new(BroadcastPublisher::new(config.aggregator.channel_capacity));

    for product in &config.products {
        let mut tickers = publisher.subscribe(&Channel::Ticker(product.clone()));
        let product = product.clone();
        tokio::spawn(async move {
            loop {
                match tickers.recv().await {
                    Ok(message) => match message.to_json() {
                        Ok(json) => println!("{json}"),
                        Err(err) => warn!(product_id = %product, error = %err, "Failed to encode ticker"),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(product_id = %product, skipped, "Ticker subscriber lagged")
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    let service = TickerService::start(
        &config,
        Arc::new(MemoryTickQuery::new()),
        publisher,
        |product| Box::new(router.log(product).cloned().unwrap_or_default().reader()),
    )?;

    let input = router.clone();
    tokio::spawn(async move {
        if let Err(err) = input.ingest_lines(BufReader::new(tokio::io::stdin())).await {
            error!(error = %err, "Failed reading stdin");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    service.abort_all();

    Ok(())
}
