//! HTTPS client for the external portfolio/transaction indexer, plus the
//! generic TTL cache shared with the aggregator.

pub mod cache;
pub mod client;
pub mod types;

pub use cache::TtlCache;
pub use client::{IndexerClient, IndexerConfig};
pub use types::{FungibleInfo, Implementation, Position, Quantity, Transfer, TxEntry};
