//! Types library for the market-data services
//!
//! Shared domain primitives used by every service that consumes the
//! matching engine's event log. Prices and sizes are exact decimals so
//! that values round-trip byte-for-byte into published messages.
//!
//! # Modules
//! - `ids`: Identifiers (ProductId, TradeId, OrderId)
//! - `numeric`: Exact decimal types (Price, Quantity)
//! - `order`: Order side

// Public modules
pub mod ids;
pub mod numeric;
pub mod order;
