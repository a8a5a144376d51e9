//! The multi-chain aggregator: derives per-chain addresses, streams balances
//! progressively as each chain completes, reads portfolios and history
//! through the indexer, and drives sends through the external signer's
//! capability set.

pub mod aggregator;
pub mod decimals;
pub mod registry;
pub mod send;
pub mod stream;

pub use aggregator::{
    ChainAddress, ChainAggregator, ChainBalance, TokenBalance, TransactionRecord, TxStatus,
};
pub use send::SendOutcome;
pub use stream::ProgressiveStream;
