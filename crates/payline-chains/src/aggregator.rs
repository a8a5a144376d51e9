use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use payline_core::constants::{ADDRESS_CACHE_TTL_SECS, DEFAULT_HISTORY_LIMIT};
use payline_core::units::normalize_to_18;
use payline_core::{Chain, UserId, WalletError};
use payline_indexer::{IndexerClient, Position, TtlCache, TxEntry};
use payline_signer::{SeedStore, SignerAccount, SignerProvider};

use crate::registry::{supported_chains, PRIMARY_CHAINS};
use crate::stream::ProgressiveStream;

// ── Result types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainAddress {
    pub chain: Chain,
    /// `None` when this chain's derivation failed; other chains proceed.
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBalance {
    pub chain: Chain,
    pub address: Option<String>,
    /// Native balance in smallest units; `"0"` when unknown.
    pub balance: String,
    pub symbol: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    /// Token contract address; `None` is the chain's native token.
    pub address: Option<String>,
    pub symbol: String,
    /// Normalized to a fixed 18-decimal representation.
    pub balance: String,
    pub decimals: u8,
    pub chain: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Failed,
    Pending,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Success => "success",
            TxStatus::Failed => "failed",
            TxStatus::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    /// Amount of the first transfer, in smallest units.
    pub value: String,
    pub timestamp: i64,
    pub block_number: Option<u64>,
    pub status: TxStatus,
    pub chain: String,
    pub token_symbol: Option<String>,
    pub token_address: Option<String>,
}

// ── Aggregator ───────────────────────────────────────────────────────────────

/// Fans per-chain work out to the signer and the indexer and aggregates the
/// results, either progressively (streams) or collected.
pub struct ChainAggregator {
    seeds: Arc<dyn SeedStore>,
    signers: Arc<dyn SignerProvider>,
    indexer: Arc<IndexerClient>,
    chains: Vec<Chain>,
    address_cache: TtlCache<UserId, Vec<ChainAddress>>,
}

impl ChainAggregator {
    pub fn new(
        seeds: Arc<dyn SeedStore>,
        signers: Arc<dyn SignerProvider>,
        indexer: Arc<IndexerClient>,
    ) -> Self {
        Self::with_chains(seeds, signers, indexer, supported_chains().to_vec())
    }

    /// Restrict the working set of chains (tests, partial rollouts).
    pub fn with_chains(
        seeds: Arc<dyn SeedStore>,
        signers: Arc<dyn SignerProvider>,
        indexer: Arc<IndexerClient>,
        chains: Vec<Chain>,
    ) -> Self {
        Self {
            seeds,
            signers,
            indexer,
            chains,
            address_cache: TtlCache::new(Duration::from_secs(ADDRESS_CACHE_TTL_SECS)),
        }
    }

    pub fn indexer(&self) -> &IndexerClient {
        &self.indexer
    }

    pub(crate) async fn account_for(
        &self,
        user: &UserId,
        chain: Chain,
    ) -> Result<Arc<dyn SignerAccount>, WalletError> {
        let seed = self.seeds.get_or_create(user).await?;
        self.signers.account(&seed, chain).await
    }

    // ── Addresses ────────────────────────────────────────────────────────────

    /// One address per configured chain, TTL-cached. A failed chain yields
    /// `None` without aborting the others; the seed is auto-created on first
    /// use.
    pub async fn get_addresses(&self, user: &UserId) -> Result<Vec<ChainAddress>, WalletError> {
        if let Some(hit) = self.address_cache.get(user) {
            return Ok((*hit).clone());
        }
        let seed = self.seeds.get_or_create(user).await?;

        let derivations = self.chains.iter().map(|&chain| {
            let signers = Arc::clone(&self.signers);
            let seed = seed.clone();
            async move { ChainAddress { chain, address: derive_one(&*signers, &seed, chain).await } }
        });
        let addresses = futures::future::join_all(derivations).await;

        self.address_cache.insert(user.clone(), addresses.clone());
        Ok(addresses)
    }

    /// Progressive variant: one [`ChainAddress`] per chain, yielded in
    /// completion order.
    pub async fn stream_addresses(
        &self,
        user: &UserId,
    ) -> Result<ProgressiveStream<ChainAddress>, WalletError> {
        let seed = self.seeds.get_or_create(user).await?;
        let (tx, rx) = mpsc::channel(8);
        let mut workers = Vec::with_capacity(self.chains.len());
        for &chain in &self.chains {
            let tx = tx.clone();
            let signers = Arc::clone(&self.signers);
            let seed = seed.clone();
            workers.push(tokio::spawn(async move {
                let address = derive_one(&*signers, &seed, chain).await;
                let _ = tx.send(ChainAddress { chain, address }).await;
            }));
        }
        Ok(ProgressiveStream::new(rx, workers))
    }

    // ── Balances ─────────────────────────────────────────────────────────────

    /// Progressive native balances, one per chain in completion order. The
    /// indexer is authoritative; on indexer failure the signer's own balance
    /// is the fallback, for the native token only.
    pub async fn stream_balances(
        &self,
        user: &UserId,
    ) -> Result<ProgressiveStream<ChainBalance>, WalletError> {
        let seed = self.seeds.get_or_create(user).await?;
        let (tx, rx) = mpsc::channel(8);
        let mut workers = Vec::with_capacity(self.chains.len());
        for &chain in &self.chains {
            let tx = tx.clone();
            let signers = Arc::clone(&self.signers);
            let indexer = Arc::clone(&self.indexer);
            let seed = seed.clone();
            workers.push(tokio::spawn(async move {
                let account = match signers.account(&seed, chain).await {
                    Ok(account) => account,
                    Err(e) => {
                        warn!(chain = %chain, error = %e, "no signer account");
                        let _ = tx
                            .send(ChainBalance {
                                chain,
                                address: None,
                                balance: "0".into(),
                                symbol: chain.native_symbol(),
                            })
                            .await;
                        return;
                    }
                };
                let address = match account.address().await {
                    Ok(address) => address,
                    Err(e) => {
                        warn!(chain = %chain, error = %e, "address derivation failed");
                        let _ = tx
                            .send(ChainBalance {
                                chain,
                                address: None,
                                balance: "0".into(),
                                symbol: chain.native_symbol(),
                            })
                            .await;
                        return;
                    }
                };
                let balance = native_balance_for(&indexer, &*account, &address, chain).await;
                let _ = tx
                    .send(ChainBalance {
                        chain,
                        address: Some(address),
                        balance,
                        symbol: chain.native_symbol(),
                    })
                    .await;
            }));
        }
        Ok(ProgressiveStream::new(rx, workers))
    }

    /// Collected native balances for every configured chain.
    pub async fn get_balances(&self, user: &UserId) -> Result<Vec<ChainBalance>, WalletError> {
        use futures::StreamExt;
        let mut stream = self.stream_balances(user).await?;
        let mut balances = Vec::with_capacity(self.chains.len());
        while let Some(item) = stream.next().await {
            balances.push(item);
        }
        Ok(balances)
    }

    /// Token balances on one chain: native plus fungible positions, zero
    /// balances omitted, amounts normalized to 18 decimals. On indexer
    /// failure the native balance falls back to the signer and token
    /// discovery degrades to empty.
    pub async fn get_token_balances(
        &self,
        user: &UserId,
        chain: Chain,
    ) -> Result<Vec<TokenBalance>, WalletError> {
        let account = self.account_for(user, chain).await?;
        let address = account.address().await?;

        let positions = match self.indexer.portfolio(&address, Some(chain.indexer_slug())).await {
            Ok(positions) => positions,
            Err(e) => {
                warn!(chain = %chain, error = %e, "indexer down; native-only fallback");
                let native = account
                    .native_balance()
                    .await
                    .map(|b| b.to_string())
                    .unwrap_or_else(|_| "0".into());
                if native == "0" {
                    return Ok(Vec::new());
                }
                return Ok(vec![TokenBalance {
                    address: None,
                    symbol: chain.native_symbol().to_string(),
                    balance: normalize_to_18(&native, chain.native_decimals()),
                    decimals: chain.native_decimals(),
                    chain: chain.indexer_slug().to_string(),
                }]);
            }
        };

        Ok(positions
            .iter()
            .filter_map(|p| position_to_balance(p, chain.indexer_slug()))
            .collect())
    }

    // ── Transactions ─────────────────────────────────────────────────────────

    pub async fn get_transaction_history(
        &self,
        user: &UserId,
        chain: Chain,
        limit: Option<u32>,
    ) -> Result<Vec<TransactionRecord>, WalletError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let account = self.account_for(user, chain).await?;
        let address = account.address().await?;
        let entries = self
            .indexer
            .transactions(&address, Some(chain.indexer_slug()), limit)
            .await?;
        Ok(entries
            .iter()
            .take(limit as usize)
            .map(|entry| map_transaction(entry, chain.indexer_slug()))
            .collect())
    }

    // ── Cross-chain aggregation ──────────────────────────────────────────────

    /// Token balances across every chain for the user's primary addresses,
    /// deduplicated by `(chain, implementation || native)`, first seen wins.
    pub async fn get_token_balances_any(
        &self,
        user: &UserId,
    ) -> Result<Vec<TokenBalance>, WalletError> {
        let mut seen = HashSet::new();
        let mut balances = Vec::new();
        for address in self.primary_addresses(user).await? {
            let positions = match self.indexer.portfolio(&address, None).await {
                Ok(positions) => positions,
                Err(e) => {
                    warn!(address, error = %e, "any-chain portfolio failed; skipping address");
                    continue;
                }
            };
            for position in &positions {
                let chain = position.chain_slug().unwrap_or("unknown").to_string();
                let key = (
                    chain.clone(),
                    position
                        .implementation_address()
                        .map(str::to_lowercase)
                        .unwrap_or_else(|| "native".into()),
                );
                if !seen.insert(key) {
                    continue;
                }
                if let Some(balance) = position_to_balance(position, &chain) {
                    balances.push(balance);
                }
            }
        }
        Ok(balances)
    }

    /// Transactions across every chain for the primary addresses,
    /// deduplicated by `(chain, tx_hash)`, first seen wins, newest first.
    pub async fn get_transactions_any(
        &self,
        user: &UserId,
        limit: Option<u32>,
    ) -> Result<Vec<TransactionRecord>, WalletError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for address in self.primary_addresses(user).await? {
            let entries = match self.indexer.transactions(&address, None, limit).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(address, error = %e, "any-chain transactions failed; skipping address");
                    continue;
                }
            };
            for entry in &entries {
                let chain = entry.chain_slug().unwrap_or("unknown").to_string();
                if !seen.insert((chain.clone(), entry.attributes.hash.clone())) {
                    continue;
                }
                records.push(map_transaction(entry, &chain));
            }
        }
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn primary_addresses(&self, user: &UserId) -> Result<Vec<String>, WalletError> {
        let addresses = self.get_addresses(user).await?;
        Ok(PRIMARY_CHAINS
            .iter()
            .filter_map(|primary| {
                addresses
                    .iter()
                    .find(|a| a.chain == *primary)
                    .and_then(|a| a.address.clone())
            })
            .collect())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

async fn derive_one(
    signers: &dyn SignerProvider,
    seed: &payline_signer::SeedRef,
    chain: Chain,
) -> Option<String> {
    match signers.account(seed, chain).await {
        Ok(account) => match account.address().await {
            Ok(address) => Some(address),
            Err(e) => {
                warn!(chain = %chain, error = %e, "address derivation failed");
                None
            }
        },
        Err(e) => {
            warn!(chain = %chain, error = %e, "no signer account for chain");
            None
        }
    }
}

/// Native balance with the indexer as source of truth and the signer as the
/// fallback when the indexer is unreachable.
async fn native_balance_for(
    indexer: &IndexerClient,
    account: &dyn SignerAccount,
    address: &str,
    chain: Chain,
) -> String {
    match indexer.portfolio(address, Some(chain.indexer_slug())).await {
        Ok(positions) => positions
            .iter()
            .find(|p| p.implementation_address().is_none())
            .map(|p| p.attributes.quantity.int.clone())
            .filter(|raw| !raw.is_empty())
            .unwrap_or_else(|| "0".into()),
        Err(e) => {
            debug!(chain = %chain, error = %e, "indexer unavailable; signer fallback");
            account
                .native_balance()
                .await
                .map(|b| b.to_string())
                .unwrap_or_else(|_| "0".into())
        }
    }
}

/// Zero positions are omitted; everything else is normalized to 18 decimals.
fn position_to_balance(position: &Position, chain: &str) -> Option<TokenBalance> {
    let raw = &position.attributes.quantity.int;
    if raw.is_empty() || raw.bytes().all(|b| b == b'0') {
        return None;
    }
    let info = position.attributes.fungible_info.as_ref();
    let decimals = position.attributes.quantity.decimals;
    Some(TokenBalance {
        address: position.implementation_address().map(str::to_string),
        symbol: info.map(|i| i.symbol.clone()).unwrap_or_default(),
        balance: normalize_to_18(raw, decimals),
        decimals,
        chain: chain.to_string(),
    })
}

/// Status mapping: explicit `confirmed`/`success` and `failed`/`error` win;
/// otherwise any confirmation implies success, else pending.
pub(crate) fn derive_status(status: Option<&str>, confirmations: Option<u64>) -> TxStatus {
    match status.map(str::to_ascii_lowercase).as_deref() {
        Some("confirmed") | Some("success") => TxStatus::Success,
        Some("failed") | Some("error") => TxStatus::Failed,
        _ => {
            if confirmations.unwrap_or(0) > 0 {
                TxStatus::Success
            } else {
                TxStatus::Pending
            }
        }
    }
}

fn map_transaction(entry: &TxEntry, chain: &str) -> TransactionRecord {
    let attrs = &entry.attributes;
    let first_transfer = attrs.transfers.first();
    let timestamp = attrs
        .mined_at
        .as_deref()
        .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0);

    TransactionRecord {
        tx_hash: attrs.hash.clone(),
        from: attrs.sent_from.clone().unwrap_or_default(),
        to: attrs
            .sent_to
            .clone()
            .or_else(|| first_transfer.and_then(|t| t.recipient.clone()))
            .unwrap_or_default(),
        value: first_transfer
            .and_then(|t| t.quantity.as_ref())
            .map(|q| q.int.clone())
            .filter(|raw| !raw.is_empty())
            .unwrap_or_else(|| "0".into()),
        timestamp,
        block_number: attrs.mined_at_block,
        status: derive_status(attrs.status.as_deref(), attrs.block_confirmations),
        chain: chain.to_string(),
        token_symbol: first_transfer
            .and_then(|t| t.fungible_info.as_ref())
            .map(|i| i.symbol.clone()),
        token_address: first_transfer
            .and_then(|t| t.fungible_info.as_ref())
            .and_then(|i| i.implementations.first())
            .and_then(|i| i.address.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_derivation_table() {
        assert_eq!(derive_status(Some("confirmed"), None), TxStatus::Success);
        assert_eq!(derive_status(Some("SUCCESS"), None), TxStatus::Success);
        assert_eq!(derive_status(Some("failed"), Some(3)), TxStatus::Failed);
        assert_eq!(derive_status(Some("error"), None), TxStatus::Failed);
        assert_eq!(derive_status(None, Some(1)), TxStatus::Success);
        assert_eq!(derive_status(None, Some(0)), TxStatus::Pending);
        assert_eq!(derive_status(Some("queued"), None), TxStatus::Pending);
    }

    #[test]
    fn zero_positions_are_omitted() {
        let zero: Position = serde_json::from_value(serde_json::json!({
            "attributes": {"quantity": {"int": "0", "decimals": 6}}
        }))
        .unwrap();
        assert!(position_to_balance(&zero, "base").is_none());

        let live: Position = serde_json::from_value(serde_json::json!({
            "attributes": {
                "quantity": {"int": "1500000", "decimals": 6},
                "fungible_info": {"symbol": "USDC", "implementations":
                    [{"chain_id": "base", "address": "0xa0b8"}]}
            }
        }))
        .unwrap();
        let balance = position_to_balance(&live, "base").unwrap();
        // Right-padded to 18 decimals.
        assert_eq!(balance.balance, "1500000000000000000");
        assert_eq!(balance.decimals, 6);
        assert_eq!(balance.address.as_deref(), Some("0xa0b8"));
    }
}
