//! Event definitions for the matching engine's per-product log
//!
//! The log carries three record kinds. Only executions feed the tick
//! aggregator; order-accepted and order-done records are consumed and
//! acknowledged so that the read offset keeps advancing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use types::ids::{OrderId, ProductId, TradeId};
use types::numeric::{Price, Quantity};
use types::order::Side;

/// One executed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEvent {
    pub trade_id: TradeId,
    /// Per-product monotonic sequence number
    pub sequence: u64,
    /// Execution time from the matching engine clock
    pub time: DateTime<Utc>,
    pub product_id: ProductId,
    pub price: Price,
    pub size: Quantity,
    /// Aggressor (taker) side
    pub side: Side,
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,
}

/// An order was accepted onto the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenEvent {
    pub sequence: u64,
    pub time: DateTime<Utc>,
    pub product_id: ProductId,
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub remaining_size: Quantity,
}

/// Why an order left the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoneReason {
    Filled,
    Cancelled,
}

/// An order was fully processed and left the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneEvent {
    pub sequence: u64,
    pub time: DateTime<Utc>,
    pub product_id: ProductId,
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub remaining_size: Quantity,
    pub reason: DoneReason,
}

/// Every record kind the log can deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Open(OpenEvent),
    Done(DoneEvent),
    Match(MatchEvent),
}

impl StreamEvent {
    pub fn sequence(&self) -> u64 {
        match self {
            StreamEvent::Open(e) => e.sequence,
            StreamEvent::Done(e) => e.sequence,
            StreamEvent::Match(e) => e.sequence,
        }
    }

    pub fn product_id(&self) -> &ProductId {
        match self {
            StreamEvent::Open(e) => &e.product_id,
            StreamEvent::Done(e) => &e.product_id,
            StreamEvent::Match(e) => &e.product_id,
        }
    }

    pub fn time(&self) -> DateTime<Utc> {
        match self {
            StreamEvent::Open(e) => e.time,
            StreamEvent::Done(e) => e.time,
            StreamEvent::Match(e) => e.time,
        }
    }

    /// Get the event kind as a string label for logging.
    pub fn kind_label(&self) -> &'static str {
        match self {
            StreamEvent::Open(_) => "open",
            StreamEvent::Done(_) => "done",
            StreamEvent::Match(_) => "match",
        }
    }
}

/// A log record as delivered to an observer: the event plus its offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub offset: i64,
    pub event: StreamEvent,
}
