//! Event stream interface
//!
//! The matching engine's per-product log is consumed through
//! [`EventStream`]: an observer is registered first, then `run` starts
//! delivery. Records arrive on the observer's channel in log order,
//! exactly once.
//!
//! [`MemoryEventLog`] is an in-process log used by tests and the
//! standalone binary. [`LogRouter`] fills one log per product from
//! newline-delimited JSON records.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use types::ids::ProductId;

use crate::events::{StreamEvent, StreamRecord};

/// Channel an observer receives records on.
pub type EventSink = mpsc::Sender<StreamRecord>;

/// Errors raised when starting a stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("no observer registered before run")]
    NoObserver,

    #[error("stream is already running")]
    AlreadyRunning,

    #[error("invalid start offset {0}")]
    InvalidOffset(i64),
}

/// Errors routing a record into a product log.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("undecodable record: {0}")]
    Decode(String),

    #[error("no log for product {0}")]
    UnknownProduct(ProductId),
}

/// Where delivery starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFrom {
    /// Live records only: everything already in the log is skipped.
    Tail,
    /// Replay from this offset, then follow live records.
    Offset(i64),
}

/// A source of ordered log records.
pub trait EventStream: Send {
    /// Must be called before [`EventStream::run`].
    fn register_observer(&mut self, observer: EventSink);

    /// Start delivery on a background task. Does not block.
    fn run(&mut self, from: ReadFrom) -> Result<(), StreamError>;
}

struct LogShared {
    events: Mutex<Vec<StreamEvent>>,
    /// Current log length, published under the `events` lock.
    len: watch::Sender<usize>,
}

/// Append-only in-memory event log.
#[derive(Clone)]
pub struct MemoryEventLog {
    shared: Arc<LogShared>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        let (len, _) = watch::channel(0);
        Self {
            shared: Arc::new(LogShared {
                events: Mutex::new(Vec::new()),
                len,
            }),
        }
    }

    /// Append an event and return its offset.
    pub fn append(&self, event: StreamEvent) -> i64 {
        let mut events = self
            .shared
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        events.push(event);
        let len = events.len();
        self.shared.len.send_replace(len);
        (len - 1) as i64
    }

    pub fn len(&self) -> usize {
        self.shared
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A new reader over this log.
    pub fn reader(&self) -> LogReader {
        LogReader {
            shared: Arc::clone(&self.shared),
            observer: None,
            running: false,
        }
    }
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader over a [`MemoryEventLog`].
pub struct LogReader {
    shared: Arc<LogShared>,
    observer: Option<EventSink>,
    running: bool,
}

impl EventStream for LogReader {
    fn register_observer(&mut self, observer: EventSink) {
        self.observer = Some(observer);
    }

    fn run(&mut self, from: ReadFrom) -> Result<(), StreamError> {
        if self.running {
            return Err(StreamError::AlreadyRunning);
        }
        let sink = self.observer.clone().ok_or(StreamError::NoObserver)?;

        // Subscribe while holding the lock so no append slips between the
        // start position and the first change notification.
        let (start, len_rx) = {
            let events = self
                .shared
                .events
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let start = match from {
                ReadFrom::Tail => events.len(),
                ReadFrom::Offset(offset) => usize::try_from(offset)
                    .ok()
                    .filter(|&o| o <= events.len())
                    .ok_or(StreamError::InvalidOffset(offset))?,
            };
            (start, self.shared.len.subscribe())
        };

        info!(start_offset = start, "Event log reader started");
        self.running = true;
        tokio::spawn(follow(Arc::clone(&self.shared), start, sink, len_rx));
        Ok(())
    }
}

async fn follow(
    shared: Arc<LogShared>,
    mut next: usize,
    sink: EventSink,
    mut len_rx: watch::Receiver<usize>,
) {
    loop {
        let available = *len_rx.borrow_and_update();
        while next < available {
            let event = {
                let events = shared.events.lock().unwrap_or_else(PoisonError::into_inner);
                events[next].clone()
            };
            let record = StreamRecord {
                offset: next as i64,
                event,
            };
            if sink.send(record).await.is_err() {
                debug!(offset = next, "Observer dropped, stopping log reader");
                return;
            }
            next += 1;
        }
        if len_rx.changed().await.is_err() {
            return;
        }
    }
}

/// One [`MemoryEventLog`] per configured product.
#[derive(Clone, Default)]
pub struct LogRouter {
    logs: BTreeMap<ProductId, MemoryEventLog>,
}

impl LogRouter {
    pub fn new(products: &[ProductId]) -> Self {
        Self {
            logs: products
                .iter()
                .map(|product| (product.clone(), MemoryEventLog::new()))
                .collect(),
        }
    }

    pub fn log(&self, product_id: &ProductId) -> Option<&MemoryEventLog> {
        self.logs.get(product_id)
    }

    /// Append `event` to its product's log and return the offset.
    pub fn route(&self, event: StreamEvent) -> Result<i64, IngestError> {
        let log = self
            .logs
            .get(event.product_id())
            .ok_or_else(|| IngestError::UnknownProduct(event.product_id().clone()))?;
        Ok(log.append(event))
    }

    /// Decode one JSON record (`{"type": "match", ...}`) and route it.
    pub fn route_json(&self, line: &str) -> Result<i64, IngestError> {
        let event: StreamEvent =
            serde_json::from_str(line).map_err(|e| IngestError::Decode(e.to_string()))?;
        self.route(event)
    }

    /// Route every non-blank line of `reader` until EOF. Bad lines are
    /// logged and skipped. Returns the number of records routed.
    pub async fn ingest_lines<R>(&self, reader: R) -> std::io::Result<u64>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut routed = 0u64;
        let mut line_no = 0u64;

        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match self.route_json(&line) {
                Ok(offset) => {
                    routed += 1;
                    debug!(line = line_no, offset, "Record routed");
                }
                Err(err) => warn!(line = line_no, error = %err, "Skipping record"),
            }
        }

        info!(routed, lines = line_no, "Input exhausted");
        Ok(routed)
    }
}
