//! Which chains the aggregator works, and which addresses count as a user's
//! primary identities for cross-chain (any-chain) indexer queries.

use payline_core::chains::{Chain, ALL_CHAINS};

/// Default working set: every chain in the registry, in derivation order.
pub fn supported_chains() -> &'static [Chain] {
    &ALL_CHAINS
}

/// The addresses used for any-chain portfolio/transaction sweeps: the EVM
/// EOA, the first account-abstraction address, and solana.
pub const PRIMARY_CHAINS: [Chain; 3] = [Chain::Ethereum, Chain::EthereumAa, Chain::Solana];
