use std::collections::HashMap;

use alloy_primitives::Address;
use async_trait::async_trait;

use payline_core::WalletError;

/// Outcome of one on-chain submission, after a single confirmation.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub tx_hash: String,
    pub success: bool,
    pub block_number: Option<u64>,
}

/// The external on-chain transaction submitter. Implementations sign with the
/// user's on-chain key, broadcast, and wait for one confirmation; this crate
/// never retries a submission on its own.
#[async_trait]
pub trait ContractSubmitter: Send + Sync {
    async fn submit(
        &self,
        chain_id: u64,
        custody: Address,
        calldata: Vec<u8>,
    ) -> Result<Receipt, WalletError>;
}

/// Custody contract addresses per EVM chain id. Channel operations refuse to
/// start when the target chain has no registered contract.
#[derive(Debug, Clone, Default)]
pub struct CustodyRegistry {
    contracts: HashMap<u64, Address>,
}

impl CustodyRegistry {
    pub fn new(entries: impl IntoIterator<Item = (u64, Address)>) -> Self {
        Self { contracts: entries.into_iter().collect() }
    }

    pub fn insert(&mut self, chain_id: u64, custody: Address) {
        self.contracts.insert(chain_id, custody);
    }

    pub fn address_for(&self, chain_id: u64) -> Result<Address, WalletError> {
        self.contracts.get(&chain_id).copied().ok_or_else(|| {
            WalletError::InvalidArgument(format!("no custody contract for chain {chain_id}"))
        })
    }
}
