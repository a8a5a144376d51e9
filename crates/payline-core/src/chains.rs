//! Supported chain registry.
//!
//! Each user gets one derived address per entry here. EVM chains come in two
//! flavours: the plain EOA chain and an account-abstraction (`-aa`) variant
//! that shares the same EVM chain id but derives a smart-account address.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Derivation family a chain belongs to. Chains in the same family share a
/// derivation scheme on the signer side.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum ChainFamily {
    Evm,
    EvmAa,
    Tron,
    Bitcoin,
    Solana,
}

/// One supported chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Chain {
    Ethereum,
    Base,
    Arbitrum,
    Polygon,
    EthereumAa,
    BaseAa,
    ArbitrumAa,
    PolygonAa,
    Tron,
    Bitcoin,
    Solana,
}

/// All chains, in derivation order. Streams yield one item per entry.
pub const ALL_CHAINS: [Chain; 11] = [
    Chain::Ethereum,
    Chain::Base,
    Chain::Arbitrum,
    Chain::Polygon,
    Chain::EthereumAa,
    Chain::BaseAa,
    Chain::ArbitrumAa,
    Chain::PolygonAa,
    Chain::Tron,
    Chain::Bitcoin,
    Chain::Solana,
];

impl Chain {
    /// Stable lowercase identifier, used on the wire and as cache key.
    pub fn slug(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Base => "base",
            Chain::Arbitrum => "arbitrum",
            Chain::Polygon => "polygon",
            Chain::EthereumAa => "ethereum-aa",
            Chain::BaseAa => "base-aa",
            Chain::ArbitrumAa => "arbitrum-aa",
            Chain::PolygonAa => "polygon-aa",
            Chain::Tron => "tron",
            Chain::Bitcoin => "bitcoin",
            Chain::Solana => "solana",
        }
    }

    pub fn from_slug(s: &str) -> Option<Chain> {
        ALL_CHAINS.iter().copied().find(|c| c.slug() == s)
    }

    pub fn family(&self) -> ChainFamily {
        match self {
            Chain::Ethereum | Chain::Base | Chain::Arbitrum | Chain::Polygon => ChainFamily::Evm,
            Chain::EthereumAa | Chain::BaseAa | Chain::ArbitrumAa | Chain::PolygonAa => {
                ChainFamily::EvmAa
            }
            Chain::Tron => ChainFamily::Tron,
            Chain::Bitcoin => ChainFamily::Bitcoin,
            Chain::Solana => ChainFamily::Solana,
        }
    }

    pub fn is_account_abstraction(&self) -> bool {
        self.family() == ChainFamily::EvmAa
    }

    /// EVM chain id for EVM and account-abstraction chains, `None` otherwise.
    pub fn evm_chain_id(&self) -> Option<u64> {
        match self {
            Chain::Ethereum | Chain::EthereumAa => Some(1),
            Chain::Base | Chain::BaseAa => Some(8453),
            Chain::Arbitrum | Chain::ArbitrumAa => Some(42161),
            Chain::Polygon | Chain::PolygonAa => Some(137),
            _ => None,
        }
    }

    /// The chain identifier the portfolio indexer uses. AA variants live on
    /// the same underlying chain, so they map to the base slug.
    pub fn indexer_slug(&self) -> &'static str {
        match self {
            Chain::EthereumAa => "ethereum",
            Chain::BaseAa => "base",
            Chain::ArbitrumAa => "arbitrum",
            Chain::PolygonAa => "polygon",
            other => other.slug(),
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Ethereum | Chain::Base | Chain::Arbitrum => "ETH",
            Chain::EthereumAa | Chain::BaseAa | Chain::ArbitrumAa => "ETH",
            Chain::Polygon | Chain::PolygonAa => "MATIC",
            Chain::Tron => "TRX",
            Chain::Bitcoin => "BTC",
            Chain::Solana => "SOL",
        }
    }

    /// Decimals of the native token.
    pub fn native_decimals(&self) -> u8 {
        match self.family() {
            ChainFamily::Evm | ChainFamily::EvmAa => 18,
            ChainFamily::Tron => 6,
            ChainFamily::Bitcoin => 8,
            ChainFamily::Solana => 9,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chain({})", self.slug())
    }
}
