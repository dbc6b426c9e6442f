//! Per-product stream aggregator
//!
//! A [`MatchStream`] owns one product's live state: the current tick per
//! granularity and the latest best bid/ask. It is built once at service
//! start, loads the last-known ticks, registers as observer on the
//! product's event stream, and is then moved onto its own worker task.
//!
//! On every execution the worker:
//! 1. folds the execution into each granularity's tick
//! 2. builds the match message
//! 3. builds the ticker from the execution, the quote and the new ticks
//! 4. overwrites the cached ticker for the product
//! 5. publishes the match, then the ticker
//!
//! Open and done records change nothing; they are only acknowledged.
//! Processing is single-threaded per product, so none of this state needs
//! synchronization. A publisher that blocks stalls this product's worker.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use types::ids::ProductId;
use types::numeric::Price;

use crate::cache::TickerStore;
use crate::channel::Channel;
use crate::config::AggregatorConfig;
use crate::events::{MatchEvent, StreamEvent, StreamRecord};
use crate::messages::{MatchMessage, PushMessage, TickerMessage};
use crate::metrics::StreamMetrics;
use crate::publish::Publisher;
use crate::query::TickQuery;
use crate::stream::{EventStream, ReadFrom, StreamError};
use crate::tick::{Granularity, TickSet, TickState};

/// Top of book, supplied by an order-book collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BestQuote {
    pub bid: Price,
    pub ask: Price,
}

/// Channel pair for feeding best bid/ask into an aggregator. Starts at
/// zero/zero until the first update.
pub fn quote_feed() -> (watch::Sender<BestQuote>, watch::Receiver<BestQuote>) {
    watch::channel(BestQuote::default())
}

/// External collaborators shared by every aggregator.
#[derive(Clone)]
pub struct StreamDeps {
    pub ticks: Arc<dyn TickQuery>,
    pub publisher: Arc<dyn Publisher>,
    pub cache: Arc<dyn TickerStore>,
}

/// Live aggregator for one product.
pub struct MatchStream {
    product_id: ProductId,
    stream: Box<dyn EventStream>,
    inbox: mpsc::Receiver<StreamRecord>,
    quotes: watch::Receiver<BestQuote>,
    ticks: TickSet,
    publisher: Arc<dyn Publisher>,
    cache: Arc<dyn TickerStore>,
    acknowledged_offset: Option<i64>,
    metrics: Arc<StreamMetrics>,
}

impl MatchStream {
    /// Bootstrap ticks, then register on `stream`.
    ///
    /// A failed tick lookup is logged and leaves that granularity empty;
    /// the first execution then opens a fresh bucket, so the first tickers
    /// after a restart may under-report open/low/volume.
    pub fn new(
        product_id: ProductId,
        mut stream: Box<dyn EventStream>,
        deps: &StreamDeps,
        quotes: watch::Receiver<BestQuote>,
        config: &AggregatorConfig,
    ) -> Self {
        let metrics = Arc::new(StreamMetrics::new());

        let states = config
            .granularities
            .iter()
            .map(|&granularity| {
                let state = match deps.ticks.last_tick(&product_id, granularity) {
                    Ok(tick) => TickState::from(tick),
                    Err(err) => {
                        warn!(
                            product_id = %product_id,
                            granularity = %granularity,
                            error = %err,
                            "Failed to load last tick, starting empty"
                        );
                        metrics.record_bootstrap_failure();
                        TickState::Empty
                    }
                };
                (granularity, state)
            })
            .collect();

        let (observer, inbox) = mpsc::channel(config.channel_capacity.max(1));
        stream.register_observer(observer);

        let ticks = TickSet::from_states(states);
        info!(
            product_id = %product_id,
            granularities = ticks.len(),
            loaded = ticks.iter().filter(|(_, s)| s.is_active()).count(),
            "Match stream initialized"
        );

        Self {
            product_id,
            stream,
            inbox,
            quotes,
            ticks,
            publisher: Arc::clone(&deps.publisher),
            cache: Arc::clone(&deps.cache),
            acknowledged_offset: None,
            metrics,
        }
    }

    /// Start the stream from its tail and spawn the worker. Returns
    /// immediately; the worker lives until the stream closes.
    pub fn start(mut self) -> Result<JoinHandle<()>, StreamError> {
        self.stream.run(ReadFrom::Tail)?;
        info!(product_id = %self.product_id, "Match stream started");
        Ok(tokio::spawn(self.run_worker()))
    }

    async fn run_worker(mut self) {
        while let Some(record) = self.inbox.recv().await {
            self.handle(record);
        }
        info!(
            product_id = %self.product_id,
            acknowledged_offset = ?self.acknowledged_offset,
            "Event stream closed, match stream stopping"
        );
    }

    /// Process one record and acknowledge its offset.
    pub fn handle(&mut self, record: StreamRecord) {
        match &record.event {
            StreamEvent::Open(event) => {
                trace!(sequence = event.sequence, offset = record.offset, "open: no-op");
                self.metrics.record_open();
            }
            StreamEvent::Done(event) => {
                trace!(sequence = event.sequence, offset = record.offset, "done: no-op");
                self.metrics.record_done();
            }
            StreamEvent::Match(event) => self.on_match(event),
        }
        self.acknowledged_offset = Some(record.offset);
    }

    fn on_match(&mut self, event: &MatchEvent) {
        self.ticks.apply(event);

        let match_message = MatchMessage::from(event);
        let quote = *self.quotes.borrow();
        let ticker = TickerMessage::new(
            event,
            &quote,
            self.ticks.tick(Granularity::DAY),
            self.ticks.tick(Granularity::THIRTY_DAYS),
        );

        self.cache.store(&event.product_id, ticker.clone());

        self.publisher.publish(
            &Channel::Match(event.product_id.clone()),
            PushMessage::Match(match_message),
        );
        self.publisher.publish(
            &Channel::Ticker(event.product_id.clone()),
            PushMessage::Ticker(ticker),
        );
        self.metrics.record_match(2);

        debug!(
            product_id = %event.product_id,
            sequence = event.sequence,
            trade_id = %event.trade_id,
            price = %event.price,
            size = %event.size,
            "Published match and ticker"
        );
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn ticks(&self) -> &TickSet {
        &self.ticks
    }

    /// Offset of the last record handled, any kind.
    pub fn acknowledged_offset(&self) -> Option<i64> {
        self.acknowledged_offset
    }

    pub fn metrics(&self) -> Arc<StreamMetrics> {
        Arc::clone(&self.metrics)
    }
}
