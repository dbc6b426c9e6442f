//! Outgoing push messages
//!
//! Wire shapes published for every execution. Decimals are rendered as
//! exact strings, never binary floats; times are RFC 3339 in UTC.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::aggregator::BestQuote;
use crate::events::MatchEvent;
use crate::tick::Tick;

/// Message discriminator, serialized as the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Match,
    Ticker,
}

fn rfc3339(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn tick_field(tick: Option<&Tick>, pick: impl Fn(&Tick) -> Decimal) -> String {
    tick.map(pick).unwrap_or(Decimal::ZERO).to_string()
}

/// Public execution notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub trade_id: u64,
    pub sequence: u64,
    pub time: String,
    pub product_id: String,
    pub price: String,
    pub side: String,
    pub maker_order_id: String,
    pub taker_order_id: String,
    pub size: String,
}

impl From<&MatchEvent> for MatchMessage {
    fn from(event: &MatchEvent) -> Self {
        Self {
            message_type: MessageType::Match,
            trade_id: event.trade_id.value(),
            sequence: event.sequence,
            time: rfc3339(event.time),
            product_id: event.product_id.to_string(),
            price: event.price.to_string(),
            side: event.side.to_string(),
            maker_order_id: event.maker_order_id.to_string(),
            taker_order_id: event.taker_order_id.to_string(),
            size: event.size.to_string(),
        }
    }
}

/// Ticker snapshot published after every execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub trade_id: u64,
    pub sequence: u64,
    pub time: String,
    pub product_id: String,
    pub price: String,
    pub side: String,
    pub last_size: String,
    pub best_bid: String,
    pub best_ask: String,
    pub open_24h: String,
    pub low_24h: String,
    pub volume_24h: String,
    pub volume_30d: String,
}

impl TickerMessage {
    /// Compose a ticker from the execution, the latest quote and the
    /// just-updated ticks. A missing tick renders its fields as "0".
    pub fn new(
        event: &MatchEvent,
        quote: &BestQuote,
        tick_24h: Option<&Tick>,
        tick_30d: Option<&Tick>,
    ) -> Self {
        Self {
            message_type: MessageType::Ticker,
            trade_id: event.trade_id.value(),
            sequence: event.sequence,
            time: rfc3339(event.time),
            product_id: event.product_id.to_string(),
            price: event.price.to_string(),
            side: event.side.to_string(),
            last_size: event.size.to_string(),
            best_bid: quote.bid.to_string(),
            best_ask: quote.ask.to_string(),
            open_24h: tick_field(tick_24h, |t| t.open),
            low_24h: tick_field(tick_24h, |t| t.low),
            volume_24h: tick_field(tick_24h, |t| t.volume),
            volume_30d: tick_field(tick_30d, |t| t.volume),
        }
    }
}

/// Anything handed to a publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PushMessage {
    Match(MatchMessage),
    Ticker(TickerMessage),
}

impl PushMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            PushMessage::Match(m) => m.message_type,
            PushMessage::Ticker(t) => t.message_type,
        }
    }

    pub fn sequence(&self) -> u64 {
        match self {
            PushMessage::Match(m) => m.sequence,
            PushMessage::Ticker(t) => t.sequence,
        }
    }

    /// Serialize for the wire.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
