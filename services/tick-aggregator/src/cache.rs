//! Last-ticker cache
//!
//! Holds the most recently published ticker per product for synchronous
//! lookups by readers that never touch the per-product aggregators.
//!
//! Each entry is an `Arc<TickerMessage>` replaced wholesale on every store,
//! so a reader either sees the previous snapshot or the new one, never a
//! mix. Writers hold a shard lock only for the duration of the swap.

use std::sync::Arc;

use dashmap::DashMap;
use types::ids::ProductId;

use crate::messages::TickerMessage;

/// Storage capability for the latest ticker per product.
pub trait TickerStore: Send + Sync {
    /// Unconditional overwrite (last write wins).
    fn store(&self, product_id: &ProductId, ticker: TickerMessage);

    /// `None` if nothing was ever stored for this product.
    fn lookup(&self, product_id: &ProductId) -> Option<Arc<TickerMessage>>;
}

/// Concurrent ticker cache. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct TickerCache {
    entries: Arc<DashMap<ProductId, Arc<TickerMessage>>>,
}

impl TickerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of products with a stored ticker.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Products with a stored ticker, sorted.
    pub fn products(&self) -> Vec<ProductId> {
        let mut products: Vec<_> = self.entries.iter().map(|e| e.key().clone()).collect();
        products.sort();
        products
    }
}

impl TickerStore for TickerCache {
    fn store(&self, product_id: &ProductId, ticker: TickerMessage) {
        self.entries.insert(product_id.clone(), Arc::new(ticker));
    }

    fn lookup(&self, product_id: &ProductId) -> Option<Arc<TickerMessage>> {
        self.entries.get(product_id).map(|entry| Arc::clone(entry.value()))
    }
}

/// Latest ticker for `product_id`, or `None` on a cache miss.
pub fn lookup_last_ticker(
    store: &dyn TickerStore,
    product_id: &ProductId,
) -> Option<Arc<TickerMessage>> {
    store.lookup(product_id)
}
