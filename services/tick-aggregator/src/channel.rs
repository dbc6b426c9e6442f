//! Publish channel naming
//!
//! Channels are namespaced per product and per message kind:
//! - `match.<product>`
//! - `ticker.<product>`

use std::fmt;

use serde::{Deserialize, Serialize};
use types::ids::ProductId;

/// Channels this service publishes on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    /// Public executions: `match.{product}`
    Match(ProductId),
    /// Ticker snapshots: `ticker.{product}`
    Ticker(ProductId),
}

impl Channel {
    /// Parse a channel name. Only the first dot separates the kind, so
    /// product names may contain dots.
    pub fn parse(s: &str) -> Option<Self> {
        let (kind, product) = s.split_once('.')?;
        let product = ProductId::try_new(product)?;
        match kind {
            "match" => Some(Channel::Match(product)),
            "ticker" => Some(Channel::Ticker(product)),
            _ => None,
        }
    }

    pub fn product_id(&self) -> &ProductId {
        match self {
            Channel::Match(p) | Channel::Ticker(p) => p,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Match(p) => write!(f, "match.{}", p),
            Channel::Ticker(p) => write!(f, "ticker.{}", p),
        }
    }
}
