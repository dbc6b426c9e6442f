//! Service supervision
//!
//! Wires one [`MatchStream`] per configured product to the shared ticker
//! cache and publisher. Every aggregator is built (bootstrapped and
//! registered) before any stream is started.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use types::ids::ProductId;

use crate::aggregator::{quote_feed, BestQuote, MatchStream, StreamDeps};
use crate::cache::{self, TickerCache};
use crate::config::{ConfigError, ServiceConfig};
use crate::messages::TickerMessage;
use crate::metrics::StreamMetrics;
use crate::publish::Publisher;
use crate::query::TickQuery;
use crate::stream::{EventStream, StreamError};

/// Errors starting the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start stream for {product_id}: {source}")]
    Stream {
        product_id: ProductId,
        source: StreamError,
    },
}

struct ProductHandle {
    quotes: watch::Sender<BestQuote>,
    metrics: Arc<StreamMetrics>,
    worker: JoinHandle<()>,
}

/// Running aggregators for every configured product.
pub struct TickerService {
    cache: TickerCache,
    products: BTreeMap<ProductId, ProductHandle>,
}

impl TickerService {
    /// Build and start all aggregators. `open_stream` supplies each
    /// product's event stream. Must be called inside a tokio runtime.
    pub fn start<F>(
        config: &ServiceConfig,
        ticks: Arc<dyn TickQuery>,
        publisher: Arc<dyn Publisher>,
        mut open_stream: F,
    ) -> Result<Self, ServiceError>
    where
        F: FnMut(&ProductId) -> Box<dyn EventStream>,
    {
        config.validate()?;

        let cache = TickerCache::new();
        let deps = StreamDeps {
            ticks,
            publisher,
            cache: Arc::new(cache.clone()),
        };

        let mut pending = Vec::with_capacity(config.products.len());
        for product_id in &config.products {
            let (quotes, quotes_rx) = quote_feed();
            let stream = MatchStream::new(
                product_id.clone(),
                open_stream(product_id),
                &deps,
                quotes_rx,
                &config.aggregator,
            );
            pending.push((stream, quotes));
        }

        let mut products: BTreeMap<ProductId, ProductHandle> = BTreeMap::new();
        for (stream, quotes) in pending {
            let product_id = stream.product_id().clone();
            let metrics = stream.metrics();
            let worker = match stream.start() {
                Ok(worker) => worker,
                Err(source) => {
                    for handle in products.values() {
                        handle.worker.abort();
                    }
                    return Err(ServiceError::Stream { product_id, source });
                }
            };
            products.insert(
                product_id,
                ProductHandle {
                    quotes,
                    metrics,
                    worker,
                },
            );
        }

        info!(products = products.len(), "Ticker service started");
        Ok(Self { cache, products })
    }

    /// Latest ticker for `product_id`, if any execution was processed.
    pub fn lookup_last_ticker(&self, product_id: &ProductId) -> Option<Arc<TickerMessage>> {
        cache::lookup_last_ticker(&self.cache, product_id)
    }

    /// Feed a new top of book to a product's aggregator. Returns false for
    /// unknown products.
    pub fn update_best_quote(&self, product_id: &ProductId, quote: BestQuote) -> bool {
        match self.products.get(product_id) {
            Some(handle) => {
                handle.quotes.send_replace(quote);
                true
            }
            None => {
                warn!(product_id = %product_id, "Quote for unknown product ignored");
                false
            }
        }
    }

    pub fn cache(&self) -> &TickerCache {
        &self.cache
    }

    pub fn products(&self) -> impl Iterator<Item = &ProductId> {
        self.products.keys()
    }

    pub fn metrics(&self, product_id: &ProductId) -> Option<Arc<StreamMetrics>> {
        self.products
            .get(product_id)
            .map(|handle| Arc::clone(&handle.metrics))
    }

    pub fn is_running(&self, product_id: &ProductId) -> bool {
        self.products
            .get(product_id)
            .is_some_and(|handle| !handle.worker.is_finished())
    }

    /// Stop every worker.
    pub fn abort_all(&self) {
        for (product_id, handle) in &self.products {
            handle.worker.abort();
            info!(product_id = %product_id, "Match stream aborted");
        }
    }
}
