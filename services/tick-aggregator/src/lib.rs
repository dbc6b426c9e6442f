//! Tick Aggregator Service
//!
//! Consumes per-product matching-engine event streams and produces:
//! - 24h and 30d OHLCV ticks, updated on every execution
//! - Public match messages (`match.<product>`)
//! - Ticker snapshots (`ticker.<product>`) with best bid/ask
//! - A concurrent last-ticker cache for request-driven readers
//!
//! Each product is processed by one worker, so events are applied strictly
//! in stream order. Open and done records are acknowledged but otherwise
//! ignored.
//!
//! # Architecture
//!
//! ```text
//!  Event stream (per product)      Tick store       Order book
//!        │                             │                │
//!        │ StreamRecord          bootstrap         BestQuote
//!    ┌───▼─────────────────────────────▼────────────────▼──┐
//!    │                    MatchStream                      │
//!    │   TickSet (24h, 30d)  ──►  Match / Ticker messages  │
//!    └──────────┬──────────────────────────┬───────────────┘
//!               │                          │
//!         ┌─────▼──────┐            ┌──────▼──────┐
//!         │TickerCache │            │  Publisher  │
//!         └─────┬──────┘            └──────┬──────┘
//!               │                          │
//!      lookup_last_ticker        match.<p> / ticker.<p>
//! ```

pub mod aggregator;
pub mod cache;
pub mod channel;
pub mod config;
pub mod events;
pub mod messages;
pub mod metrics;
pub mod publish;
pub mod query;
pub mod replay;
pub mod service;
pub mod stream;
pub mod tick;

pub use aggregator::{quote_feed, BestQuote, MatchStream, StreamDeps};
pub use cache::{lookup_last_ticker, TickerCache, TickerStore};
pub use config::{AggregatorConfig, ServiceConfig};
pub use service::TickerService;
pub use tick::{Granularity, Tick, TickSet, TickState};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
