//! Tick accumulation
//!
//! Folds executions into time-bucketed OHLCV ticks, one current tick per
//! granularity. Only the current bucket is held; when an execution falls
//! into a different bucket the tick is replaced, never appended.
//!
//! Uses `Decimal` for all arithmetic. Bucket boundaries are multiples of
//! the granularity counted from 0001-01-01T00:00:00Z, the origin the
//! persisted tick store buckets against. Day-sized buckets coincide with
//! Unix-epoch alignment (a 1440-minute tick starts at midnight UTC); 30-day
//! buckets do not.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use types::ids::ProductId;

use crate::events::MatchEvent;

/// Seconds from 0001-01-01T00:00:00Z to the Unix epoch.
const BUCKET_ORIGIN_OFFSET: i64 = 62_135_596_800;

/// Width of a tick bucket in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Granularity(u32);

impl Granularity {
    /// 24 hours
    pub const DAY: Granularity = Granularity(24 * 60);
    /// 30 days
    pub const THIRTY_DAYS: Granularity = Granularity(30 * 24 * 60);

    /// Returns None for a zero-width granularity.
    pub const fn from_minutes(minutes: u32) -> Option<Self> {
        if minutes == 0 {
            None
        } else {
            Some(Self(minutes))
        }
    }

    pub const fn minutes(&self) -> u32 {
        self.0
    }

    pub const fn seconds(&self) -> i64 {
        self.0 as i64 * 60
    }

    /// Floor `time` to this granularity's boundary, as epoch seconds.
    pub fn bucket_start(&self, time: DateTime<Utc>) -> i64 {
        let width = self.seconds();
        let since_origin = time.timestamp() + BUCKET_ORIGIN_OFFSET;
        since_origin.div_euclid(width) * width - BUCKET_ORIGIN_OFFSET
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

/// OHLCV record for one product, one granularity, one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub product_id: ProductId,
    pub granularity: Granularity,
    /// Bucket start, epoch seconds
    pub time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Tick {
    /// Start a new bucket from its first execution.
    fn opening(event: &MatchEvent, granularity: Granularity, time: i64) -> Self {
        let price = event.price.as_decimal();
        Self {
            product_id: event.product_id.clone(),
            granularity,
            time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: event.size.as_decimal(),
        }
    }

    /// Fold an execution from the same bucket.
    fn absorb(mut self, event: &MatchEvent) -> Self {
        let price = event.price.as_decimal();
        self.close = price;
        self.low = self.low.min(price);
        self.high = self.high.max(price);
        self.volume += event.size.as_decimal();
        self
    }

    /// Validate tick integrity (OHLCV invariants).
    pub fn is_valid(&self) -> bool {
        self.high >= self.open
            && self.high >= self.close
            && self.high >= self.low
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= Decimal::ZERO
    }
}

/// Current tick for one granularity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TickState {
    /// No tick known yet (fresh start or failed bootstrap).
    #[default]
    Empty,
    Active(Tick),
}

impl TickState {
    /// Fold one execution into this state.
    ///
    /// Same bucket: close/low/high/volume update in place. Different bucket
    /// or no tick: a fresh tick opens at the execution's price and size.
    pub fn apply(self, event: &MatchEvent, granularity: Granularity) -> TickState {
        let bucket = granularity.bucket_start(event.time);
        match self {
            TickState::Active(tick) if tick.time == bucket => TickState::Active(tick.absorb(event)),
            _ => TickState::Active(Tick::opening(event, granularity, bucket)),
        }
    }

    pub fn tick(&self) -> Option<&Tick> {
        match self {
            TickState::Empty => None,
            TickState::Active(tick) => Some(tick),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TickState::Active(_))
    }
}

impl From<Option<Tick>> for TickState {
    fn from(tick: Option<Tick>) -> Self {
        tick.map_or(TickState::Empty, TickState::Active)
    }
}

/// The tick states one aggregator owns, in configured granularity order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TickSet {
    entries: Vec<(Granularity, TickState)>,
}

impl TickSet {
    /// All granularities start empty.
    pub fn new(granularities: &[Granularity]) -> Self {
        Self {
            entries: granularities.iter().map(|&g| (g, TickState::Empty)).collect(),
        }
    }

    pub fn from_states(entries: Vec<(Granularity, TickState)>) -> Self {
        Self { entries }
    }

    /// Fold one execution into every granularity, in order.
    pub fn apply(&mut self, event: &MatchEvent) {
        for (granularity, state) in &mut self.entries {
            *state = std::mem::take(state).apply(event, *granularity);
        }
    }

    pub fn state(&self, granularity: Granularity) -> Option<&TickState> {
        self.entries
            .iter()
            .find(|(g, _)| *g == granularity)
            .map(|(_, state)| state)
    }

    pub fn tick(&self, granularity: Granularity) -> Option<&Tick> {
        self.state(granularity).and_then(TickState::tick)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Granularity, &TickState)> {
        self.entries.iter().map(|(g, state)| (*g, state))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// SHA-256 over the canonical text of every tick, in granularity order.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();

        for (granularity, state) in &self.entries {
            hasher.update(granularity.minutes().to_string().as_bytes());
            hasher.update(b"|");
            match state {
                TickState::Empty => hasher.update(b"empty"),
                TickState::Active(tick) => {
                    hasher.update(tick.product_id.as_str().as_bytes());
                    for field in [
                        tick.time.to_string(),
                        tick.open.to_string(),
                        tick.high.to_string(),
                        tick.low.to_string(),
                        tick.close.to_string(),
                        tick.volume.to_string(),
                    ] {
                        hasher.update(b":");
                        hasher.update(field.as_bytes());
                    }
                }
            }
            hasher.update(b"===");
        }

        format!("{:x}", hasher.finalize())
    }
}
