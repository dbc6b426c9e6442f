//! End-to-end tests for the per-product ticker pipeline
//!
//! Drives aggregators through an in-memory event log and observes the
//! published messages and the ticker cache, as a gateway would.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tick_aggregator::channel::Channel;
use tick_aggregator::events::{DoneEvent, DoneReason, MatchEvent, OpenEvent, StreamEvent};
use tick_aggregator::messages::{MessageType, PushMessage, TickerMessage};
use tick_aggregator::publish::BroadcastPublisher;
use tick_aggregator::query::{MemoryTickQuery, TickQueryError};
use tick_aggregator::stream::MemoryEventLog;
use tick_aggregator::{
    quote_feed, AggregatorConfig, BestQuote, Granularity, MatchStream, ServiceConfig,
    StreamDeps, Tick, TickerCache, TickerService, TickerStore,
};
use tokio::sync::broadcast;
use types::ids::{OrderId, ProductId, TradeId};
use types::numeric::{Price, Quantity};
use types::order::Side;

use rust_decimal::Decimal;

fn at(d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, h, min, 0).unwrap()
}

fn execution(product: &str, seq: u64, time: DateTime<Utc>, price: &str, size: &str) -> StreamEvent {
    StreamEvent::Match(MatchEvent {
        trade_id: TradeId::new(seq),
        sequence: seq,
        time,
        product_id: ProductId::new(product),
        price: price.parse().unwrap(),
        size: size.parse().unwrap(),
        side: Side::Sell,
        maker_order_id: OrderId::new(100 + seq),
        taker_order_id: OrderId::new(200 + seq),
    })
}

fn opened(seq: u64, time: DateTime<Utc>) -> StreamEvent {
    StreamEvent::Open(OpenEvent {
        sequence: seq,
        time,
        product_id: ProductId::new("BTC-USDT"),
        order_id: OrderId::new(seq),
        side: Side::Buy,
        price: Price::from_u64(99),
        remaining_size: Quantity::from_u64(1),
    })
}

fn done(seq: u64, time: DateTime<Utc>) -> StreamEvent {
    StreamEvent::Done(DoneEvent {
        sequence: seq,
        time,
        product_id: ProductId::new("BTC-USDT"),
        order_id: OrderId::new(seq),
        side: Side::Buy,
        price: Price::from_u64(99),
        remaining_size: Quantity::ZERO,
        reason: DoneReason::Filled,
    })
}

async fn next(rx: &mut broadcast::Receiver<PushMessage>) -> PushMessage {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("publisher closed")
}

async fn next_ticker(rx: &mut broadcast::Receiver<PushMessage>) -> TickerMessage {
    match next(rx).await {
        PushMessage::Ticker(ticker) => ticker,
        other => panic!("expected ticker, got {:?}", other),
    }
}

struct Pipeline {
    log: MemoryEventLog,
    cache: TickerCache,
    publisher: Arc<BroadcastPublisher>,
    quotes: tokio::sync::watch::Sender<BestQuote>,
    stream: MatchStream,
}

fn pipeline(query: MemoryTickQuery) -> Pipeline {
    let log = MemoryEventLog::new();
    let cache = TickerCache::new();
    let publisher = Arc::new(BroadcastPublisher::new(64));
    let deps = StreamDeps {
        ticks: Arc::new(query),
        publisher: publisher.clone(),
        cache: Arc::new(cache.clone()),
    };
    let (quotes, quotes_rx) = quote_feed();
    let stream = MatchStream::new(
        ProductId::new("BTC-USDT"),
        Box::new(log.reader()),
        &deps,
        quotes_rx,
        &AggregatorConfig::default(),
    );
    Pipeline {
        log,
        cache,
        publisher,
        quotes,
        stream,
    }
}

fn btc() -> ProductId {
    ProductId::new("BTC-USDT")
}

#[tokio::test]
async fn test_day_bucket_rolls_over() {
    let p = pipeline(MemoryTickQuery::new());
    let mut tickers = p.publisher.subscribe(&Channel::Ticker(btc()));
    let _worker = p.stream.start().unwrap();

    p.log.append(execution("BTC-USDT", 1, at(1, 10, 0), "100", "1"));
    p.log.append(execution("BTC-USDT", 2, at(1, 10, 5), "105", "2"));
    p.log.append(execution("BTC-USDT", 3, at(2, 10, 0), "90", "1"));

    let first = next_ticker(&mut tickers).await;
    assert_eq!(first.open_24h, "100");
    assert_eq!(first.volume_24h, "1");

    let second = next_ticker(&mut tickers).await;
    assert_eq!(second.open_24h, "100");
    assert_eq!(second.low_24h, "100");
    assert_eq!(second.volume_24h, "3");
    assert_eq!(second.price, "105");

    let third = next_ticker(&mut tickers).await;
    assert_eq!(third.open_24h, "90");
    assert_eq!(third.low_24h, "90");
    assert_eq!(third.volume_24h, "1");
    // 1 and 2 March share a 30-day bucket
    assert_eq!(third.volume_30d, "4");
}

#[tokio::test]
async fn test_match_then_ticker_per_execution() {
    let p = pipeline(MemoryTickQuery::new());
    let mut matches = p.publisher.subscribe(&Channel::Match(btc()));
    let mut tickers = p.publisher.subscribe(&Channel::Ticker(btc()));
    let _worker = p.stream.start().unwrap();

    p.log.append(execution("BTC-USDT", 7, at(1, 12, 30), "101.25", "0.5"));

    let matched = match next(&mut matches).await {
        PushMessage::Match(m) => m,
        other => panic!("expected match, got {:?}", other),
    };
    let ticker = next_ticker(&mut tickers).await;

    assert_eq!(matched.trade_id, 7);
    assert_eq!(matched.sequence, 7);
    assert_eq!(matched.side, "sell");
    assert_eq!(matched.maker_order_id, "107");
    assert_eq!(matched.taker_order_id, "207");
    assert_eq!(matched.time, "2024-03-01T12:30:00Z");

    assert_eq!(ticker.message_type, MessageType::Ticker);
    assert_eq!(ticker.trade_id, matched.trade_id);
    assert_eq!(ticker.sequence, matched.sequence);
    assert_eq!(ticker.price, "101.25");
    assert_eq!(ticker.last_size, "0.5");
}

#[tokio::test]
async fn test_open_and_done_publish_nothing() {
    let p = pipeline(MemoryTickQuery::new());
    let metrics = p.stream.metrics();
    let mut matches = p.publisher.subscribe(&Channel::Match(btc()));
    let mut tickers = p.publisher.subscribe(&Channel::Ticker(btc()));
    let _worker = p.stream.start().unwrap();

    p.log.append(execution("BTC-USDT", 1, at(1, 10, 0), "100", "1"));
    p.log.append(opened(2, at(1, 10, 1)));
    p.log.append(done(3, at(1, 10, 2)));
    p.log.append(execution("BTC-USDT", 4, at(1, 10, 3), "102", "1"));

    assert_eq!(next(&mut matches).await.sequence(), 1);
    assert_eq!(next(&mut matches).await.sequence(), 4);
    assert_eq!(next(&mut tickers).await.sequence(), 1);
    let last = next_ticker(&mut tickers).await;
    assert_eq!(last.sequence, 4);
    assert_eq!(last.volume_24h, "2");

    let counters = metrics.export();
    assert_eq!(counters["opens_acknowledged"], 1);
    assert_eq!(counters["dones_acknowledged"], 1);
    assert_eq!(counters["matches_processed"], 2);
    assert_eq!(counters["messages_published"], 4);
}

#[tokio::test]
async fn test_tail_skips_earlier_records() {
    let p = pipeline(MemoryTickQuery::new());
    let mut tickers = p.publisher.subscribe(&Channel::Ticker(btc()));

    // Appended after registration but before start
    p.log.append(execution("BTC-USDT", 1, at(1, 9, 0), "50", "10"));
    let _worker = p.stream.start().unwrap();
    p.log.append(execution("BTC-USDT", 2, at(1, 10, 0), "100", "1"));

    let ticker = next_ticker(&mut tickers).await;
    assert_eq!(ticker.sequence, 2);
    assert_eq!(ticker.volume_24h, "1");
}

#[tokio::test]
async fn test_cache_matches_last_published_ticker() {
    let p = pipeline(MemoryTickQuery::new());
    let mut tickers = p.publisher.subscribe(&Channel::Ticker(btc()));
    assert!(p.cache.lookup(&btc()).is_none());
    let _worker = p.stream.start().unwrap();

    for seq in 1..=5u64 {
        p.log.append(execution("BTC-USDT", seq, at(1, 10, seq as u32), "100", "1"));
        let published = next_ticker(&mut tickers).await;
        let cached = tick_aggregator::lookup_last_ticker(&p.cache, &btc()).unwrap();
        assert_eq!(*cached, published);
    }
    assert_eq!(p.cache.products(), vec![btc()]);
}

#[tokio::test]
async fn test_best_quote_feed() {
    let p = pipeline(MemoryTickQuery::new());
    let mut tickers = p.publisher.subscribe(&Channel::Ticker(btc()));
    let _worker = p.stream.start().unwrap();

    p.log.append(execution("BTC-USDT", 1, at(1, 10, 0), "100", "1"));
    let before = next_ticker(&mut tickers).await;
    assert_eq!((before.best_bid.as_str(), before.best_ask.as_str()), ("0", "0"));

    p.quotes.send_replace(BestQuote {
        bid: "99.5".parse().unwrap(),
        ask: "100.5".parse().unwrap(),
    });
    p.log.append(execution("BTC-USDT", 2, at(1, 10, 1), "100", "1"));
    let after = next_ticker(&mut tickers).await;
    assert_eq!(after.best_bid, "99.5");
    assert_eq!(after.best_ask, "100.5");
}

#[tokio::test]
async fn test_bootstrap_seeds_ticker() {
    let query = MemoryTickQuery::new();
    query.insert(Tick {
        product_id: btc(),
        granularity: Granularity::THIRTY_DAYS,
        time: Granularity::THIRTY_DAYS.bucket_start(at(1, 0, 0)),
        open: Decimal::from(80),
        high: Decimal::from(130),
        low: Decimal::from(75),
        close: Decimal::from(99),
        volume: Decimal::from(1000),
    });
    let p = pipeline(query);
    let mut tickers = p.publisher.subscribe(&Channel::Ticker(btc()));
    let _worker = p.stream.start().unwrap();

    p.log.append(execution("BTC-USDT", 1, at(1, 10, 0), "100", "1"));
    let ticker = next_ticker(&mut tickers).await;
    assert_eq!(ticker.volume_30d, "1001");
    assert_eq!(ticker.volume_24h, "1");
}

#[tokio::test]
async fn test_bootstrap_failure_still_serves() {
    let query = MemoryTickQuery::new();
    query.fail_with(TickQueryError::Unavailable("connection refused".to_string()));
    let p = pipeline(query);
    assert_eq!(p.stream.metrics().export()["bootstrap_failures"], 2);
    let mut tickers = p.publisher.subscribe(&Channel::Ticker(btc()));
    let _worker = p.stream.start().unwrap();

    p.log.append(execution("BTC-USDT", 1, at(1, 10, 0), "100", "2.5"));
    let ticker = next_ticker(&mut tickers).await;
    assert_eq!(ticker.open_24h, "100");
    assert_eq!(ticker.volume_24h, "2.5");
    assert_eq!(ticker.volume_30d, "2.5");
}

#[tokio::test]
async fn test_service_isolates_products() {
    let btc_log = MemoryEventLog::new();
    let eth_log = MemoryEventLog::new();
    let publisher = Arc::new(BroadcastPublisher::new(64));
    let mut btc_tickers = publisher.subscribe(&Channel::Ticker(btc()));
    let mut eth_tickers = publisher.subscribe(&Channel::Ticker(ProductId::new("ETH-USDT")));

    let config = ServiceConfig {
        products: vec![btc(), ProductId::new("ETH-USDT")],
        aggregator: AggregatorConfig::default(),
    };
    let service = TickerService::start(
        &config,
        Arc::new(MemoryTickQuery::new()),
        publisher.clone(),
        |product| {
            if product.as_str() == "BTC-USDT" {
                Box::new(btc_log.reader())
            } else {
                Box::new(eth_log.reader())
            }
        },
    )
    .unwrap();

    service.update_best_quote(
        &ProductId::new("ETH-USDT"),
        BestQuote {
            bid: Price::from_u64(3000),
            ask: Price::from_u64(3001),
        },
    );
    eth_log.append(execution("ETH-USDT", 1, at(1, 10, 0), "3000", "4"));
    btc_log.append(execution("BTC-USDT", 1, at(1, 10, 0), "60000", "1"));

    let eth = next_ticker(&mut eth_tickers).await;
    let btc_ticker = next_ticker(&mut btc_tickers).await;
    assert_eq!(eth.product_id, "ETH-USDT");
    assert_eq!(eth.volume_24h, "4");
    assert_eq!(eth.best_bid, "3000");
    assert_eq!(btc_ticker.product_id, "BTC-USDT");
    assert_eq!(btc_ticker.volume_24h, "1");
    assert_eq!(btc_ticker.best_bid, "0");

    assert_eq!(
        service.lookup_last_ticker(&ProductId::new("ETH-USDT")).unwrap().price,
        "3000"
    );
    assert!(service.lookup_last_ticker(&ProductId::new("SOL-USDT")).is_none());
    assert_eq!(service.cache().len(), 2);
    service.abort_all();
}
