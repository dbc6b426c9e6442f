//! Tick replay
//!
//! Rebuilds one product's ticks by folding a recorded event sequence
//! through the same transition the live aggregator uses. The result's
//! checksum can be compared against a live aggregator's `TickSet` or
//! against a previously recorded value for reconciliation.
//!
//! Deterministic: same initial states and same events yield identical
//! ticks and checksum.

use std::time::Instant;

use tracing::{error, info};
use types::ids::ProductId;

use crate::events::StreamEvent;
use crate::tick::TickSet;

/// Result of a replay.
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub ticks: TickSet,
    /// Events of this product visited, any kind.
    pub events_replayed: u64,
    pub matches_applied: u64,
    pub checksum: String,
}

/// Errors during replay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    #[error("non-monotonic sequence: {received} after {last}")]
    NonMonotonic { last: u64, received: u64 },

    #[error("tick checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// Replays recorded events for one product.
pub struct TickReplay {
    product_id: ProductId,
    /// Expected checksum of the rebuilt ticks, if known.
    expected_checksum: Option<String>,
    /// Reject non-increasing sequences.
    strict_ordering: bool,
}

impl TickReplay {
    pub fn new(product_id: ProductId) -> Self {
        Self {
            product_id,
            expected_checksum: None,
            strict_ordering: true,
        }
    }

    pub fn with_expected_checksum(mut self, checksum: String) -> Self {
        self.expected_checksum = Some(checksum);
        self
    }

    /// Fold events as given, without sequence checks.
    pub fn with_relaxed_ordering(mut self) -> Self {
        self.strict_ordering = false;
        self
    }

    /// Fold `events` into `initial`. Events for other products are skipped.
    pub fn replay(
        &self,
        initial: TickSet,
        events: &[StreamEvent],
    ) -> Result<ReplayOutcome, ReplayError> {
        let start = Instant::now();
        let mut ticks = initial;
        let mut last_sequence: Option<u64> = None;
        let mut events_replayed = 0u64;
        let mut matches_applied = 0u64;

        for event in events.iter().filter(|e| e.product_id() == &self.product_id) {
            if self.strict_ordering {
                if let Some(last) = last_sequence {
                    if event.sequence() <= last {
                        error!(
                            product_id = %self.product_id,
                            last,
                            received = event.sequence(),
                            "Out-of-order event during replay"
                        );
                        return Err(ReplayError::NonMonotonic {
                            last,
                            received: event.sequence(),
                        });
                    }
                }
            }

            if let StreamEvent::Match(event) = event {
                ticks.apply(event);
                matches_applied += 1;
            }

            last_sequence = Some(event.sequence());
            events_replayed += 1;
        }

        let checksum = ticks.checksum();

        if let Some(ref expected) = self.expected_checksum {
            if &checksum != expected {
                error!(
                    product_id = %self.product_id,
                    expected = %expected,
                    actual = %checksum,
                    "Tick checksum mismatch after replay"
                );
                return Err(ReplayError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual: checksum,
                });
            }
        }

        info!(
            product_id = %self.product_id,
            events_replayed,
            matches_applied,
            duration_us = start.elapsed().as_micros() as u64,
            "Tick replay completed"
        );

        Ok(ReplayOutcome {
            ticks,
            events_replayed,
            matches_applied,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::fixtures::{at, done_event, match_event, open_event};
    use crate::tick::Granularity;
    use rust_decimal::Decimal;

    fn granularities() -> Vec<Granularity> {
        vec![Granularity::DAY, Granularity::THIRTY_DAYS]
    }

    fn matched(seq: u64, hour: u32, price: &str, size: &str) -> StreamEvent {
        StreamEvent::Match(match_event(seq, at(2024, 3, 1, hour, 0), price, size))
    }

    fn replay() -> TickReplay {
        TickReplay::new(ProductId::new("BTC-USDT"))
    }

    #[test]
    fn test_basic_replay() {
        let events = vec![
            matched(1, 10, "100", "1"),
            StreamEvent::Open(open_event(2, at(2024, 3, 1, 10, 30))),
            matched(3, 11, "105", "2"),
            StreamEvent::Done(done_event(4, at(2024, 3, 1, 11, 30))),
        ];

        let outcome = replay()
            .replay(TickSet::new(&granularities()), &events)
            .unwrap();

        assert_eq!(outcome.events_replayed, 4);
        assert_eq!(outcome.matches_applied, 2);
        let day = outcome.ticks.tick(Granularity::DAY).unwrap();
        assert_eq!(day.open, Decimal::from(100));
        assert_eq!(day.close, Decimal::from(105));
        assert_eq!(day.volume, Decimal::from(3));
        assert_eq!(outcome.checksum, outcome.ticks.checksum());
    }

    #[test]
    fn test_other_products_ignored() {
        let mut foreign = match_event(2, at(2024, 3, 1, 10, 0), "1", "500");
        foreign.product_id = ProductId::new("ETH-USDT");
        let events = vec![
            matched(1, 10, "100", "1"),
            StreamEvent::Match(foreign),
            matched(2, 11, "101", "1"),
        ];

        let outcome = replay()
            .replay(TickSet::new(&granularities()), &events)
            .unwrap();
        assert_eq!(outcome.events_replayed, 2);
        assert_eq!(
            outcome.ticks.tick(Granularity::DAY).unwrap().volume,
            Decimal::from(2)
        );
    }

    #[test]
    fn test_replay_detects_out_of_order() {
        let events = vec![matched(5, 10, "100", "1"), matched(3, 11, "101", "1")];

        let err = replay()
            .replay(TickSet::new(&granularities()), &events)
            .unwrap_err();
        assert_eq!(err, ReplayError::NonMonotonic { last: 5, received: 3 });
    }

    #[test]
    fn test_relaxed_ordering() {
        let events = vec![matched(5, 10, "100", "1"), matched(3, 11, "101", "1")];

        let outcome = replay()
            .with_relaxed_ordering()
            .replay(TickSet::new(&granularities()), &events)
            .unwrap();
        assert_eq!(outcome.matches_applied, 2);
    }

    #[test]
    fn test_gaps_are_allowed() {
        let events = vec![matched(1, 10, "100", "1"), matched(9, 11, "101", "1")];
        assert!(replay()
            .replay(TickSet::new(&granularities()), &events)
            .is_ok());
    }

    #[test]
    fn test_deterministic_replay() {
        let events: Vec<_> = (1..=20)
            .map(|i| matched(i, (i % 24) as u32, &(100 + i).to_string(), "0.1"))
            .collect();

        let a = replay().replay(TickSet::new(&granularities()), &events).unwrap();
        let b = replay().replay(TickSet::new(&granularities()), &events).unwrap();
        assert_eq!(a.checksum, b.checksum);
        assert_eq!(a.ticks, b.ticks);
    }

    #[test]
    fn test_checksum_validation() {
        let events = vec![matched(1, 10, "100", "1")];
        let checksum = replay()
            .replay(TickSet::new(&granularities()), &events)
            .unwrap()
            .checksum;

        assert!(replay()
            .with_expected_checksum(checksum)
            .replay(TickSet::new(&granularities()), &events)
            .is_ok());

        let err = replay()
            .with_expected_checksum("bad_checksum".to_string())
            .replay(TickSet::new(&granularities()), &events)
            .unwrap_err();
        assert!(matches!(err, ReplayError::ChecksumMismatch { .. }));
    }
}
