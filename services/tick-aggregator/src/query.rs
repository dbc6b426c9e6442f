//! Last-tick lookup used at aggregator bootstrap
//!
//! Historical ticks live in an external store. Aggregators ask it once per
//! granularity at construction; any failure degrades to an empty tick.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use types::ids::ProductId;

use crate::tick::{Granularity, Tick};

/// Errors from the tick-query backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickQueryError {
    #[error("tick store unavailable: {0}")]
    Unavailable(String),

    #[error("tick store error: {0}")]
    Backend(String),
}

/// Read access to the latest persisted tick.
pub trait TickQuery: Send + Sync {
    /// `Ok(None)` when no tick was ever recorded for this product and granularity.
    fn last_tick(
        &self,
        product_id: &ProductId,
        granularity: Granularity,
    ) -> Result<Option<Tick>, TickQueryError>;
}

/// In-memory tick query.
#[derive(Debug, Default)]
pub struct MemoryTickQuery {
    ticks: RwLock<HashMap<(ProductId, Granularity), Tick>>,
    failure: RwLock<Option<TickQueryError>>,
}

impl MemoryTickQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any tick already held for the same product and granularity.
    pub fn insert(&self, tick: Tick) {
        self.ticks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((tick.product_id.clone(), tick.granularity), tick);
    }

    /// Make every subsequent lookup fail with `error`.
    pub fn fail_with(&self, error: TickQueryError) {
        *self.failure.write().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    pub fn recover(&self) {
        *self.failure.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl TickQuery for MemoryTickQuery {
    fn last_tick(
        &self,
        product_id: &ProductId,
        granularity: Granularity,
    ) -> Result<Option<Tick>, TickQueryError> {
        if let Some(err) = self
            .failure
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(err);
        }

        Ok(self
            .ticks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(product_id.clone(), granularity))
            .cloned())
    }
}
