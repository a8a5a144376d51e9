use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use payline_core::constants::{
    BALANCE_CACHE_TTL_SECS, INDEXER_MAX_ATTEMPTS, INDEXER_RETRY_BASE_DELAY_MS,
    INDEXER_TIMEOUT_SECS, TRANSACTION_CACHE_TTL_SECS,
};
use payline_core::WalletError;

use crate::cache::TtlCache;
use crate::types::{Envelope, Position, TxEntry};

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub base_url: String,
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Total attempts for 5xx / transport failures.
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
}

impl IndexerConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(INDEXER_TIMEOUT_SECS),
            max_attempts: INDEXER_MAX_ATTEMPTS,
            retry_base_delay: Duration::from_millis(INDEXER_RETRY_BASE_DELAY_MS),
        }
    }
}

/// Portfolio/transaction indexer client with per-(address, chain) TTL caches.
/// Authentication is HTTP Basic with the api key as username and an empty
/// password, i.e. `base64("{api_key}:")`.
pub struct IndexerClient {
    http: reqwest::Client,
    config: IndexerConfig,
    portfolio_cache: TtlCache<(String, String), Vec<Position>>,
    tx_cache: TtlCache<(String, String), Vec<TxEntry>>,
}

fn cache_key(address: &str, chain: Option<&str>) -> (String, String) {
    (address.to_lowercase(), chain.unwrap_or("any").to_string())
}

impl IndexerClient {
    pub fn new(config: IndexerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            portfolio_cache: TtlCache::new(Duration::from_secs(BALANCE_CACHE_TTL_SECS)),
            tx_cache: TtlCache::new(Duration::from_secs(TRANSACTION_CACHE_TTL_SECS)),
        }
    }

    /// Wallet positions, optionally filtered to one chain. Results are
    /// re-filtered client-side so behavior does not depend on whether the
    /// server honours `chain_ids`.
    pub async fn portfolio(
        &self,
        address: &str,
        chain: Option<&str>,
    ) -> Result<Vec<Position>, WalletError> {
        let key = cache_key(address, chain);
        if let Some(hit) = self.portfolio_cache.get(&key) {
            return Ok((*hit).clone());
        }

        let url = format!("{}/v1/wallets/{}/portfolio", self.config.base_url, address);
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(slug) = chain {
            query.push(("chain_ids", slug.to_string()));
        }
        let envelope: Envelope<Vec<Position>> = self.get_with_retry(&url, &query).await?;
        let mut positions = envelope.data.unwrap_or_default();
        if let Some(slug) = chain {
            positions.retain(|p| p.chain_slug().map_or(true, |c| c == slug));
        }

        self.portfolio_cache.insert(key, positions.clone());
        Ok(positions)
    }

    /// Recent wallet transactions, newest first, optionally chain-filtered.
    pub async fn transactions(
        &self,
        address: &str,
        chain: Option<&str>,
        page_size: u32,
    ) -> Result<Vec<TxEntry>, WalletError> {
        let key = cache_key(address, chain);
        if let Some(hit) = self.tx_cache.get(&key) {
            return Ok((*hit).clone());
        }

        let url = format!(
            "{}/v1/wallets/{}/transactions/",
            self.config.base_url, address
        );
        let mut query: Vec<(&str, String)> = vec![("page[size]", page_size.to_string())];
        if let Some(slug) = chain {
            query.push(("chain_ids", slug.to_string()));
        }
        let envelope: Envelope<Vec<TxEntry>> = self.get_with_retry(&url, &query).await?;
        let mut txs = envelope.data.unwrap_or_default();
        if let Some(slug) = chain {
            txs.retain(|t| t.chain_slug().map_or(true, |c| c == slug));
        }

        self.tx_cache.insert(key, txs.clone());
        Ok(txs)
    }

    /// Best-effort cache invalidation after a mutation. Clears both the
    /// chain-specific and the any-chain entries; never fails.
    pub fn invalidate(&self, address: &str, chain: Option<&str>) {
        self.portfolio_cache.invalidate(&cache_key(address, chain));
        self.portfolio_cache.invalidate(&cache_key(address, None));
        self.tx_cache.invalidate(&cache_key(address, chain));
        self.tx_cache.invalidate(&cache_key(address, None));
        debug!(address, chain = chain.unwrap_or("any"), "indexer cache invalidated");
    }

    /// GET with Basic auth and bounded exponential-backoff retries. 4xx
    /// surfaces immediately; 5xx and transport errors retry up to
    /// `max_attempts`, then surface as unavailable.
    async fn get_with_retry<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, WalletError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = self
                .http
                .get(url)
                .query(query)
                .basic_auth(&self.config.api_key, Some(""))
                .timeout(self.config.timeout)
                .send()
                .await;

            match outcome {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.json::<T>().await.map_err(|e| {
                            WalletError::Internal(format!("indexer response parse: {e}"))
                        });
                    }
                    let body = resp.text().await.unwrap_or_default();
                    if status.is_client_error() {
                        return Err(WalletError::Indexer {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    if attempt >= self.config.max_attempts {
                        return Err(WalletError::Indexer {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    warn!(status = status.as_u16(), attempt, "indexer server error; retrying");
                }
                Err(e) => {
                    if attempt >= self.config.max_attempts {
                        return Err(if e.is_timeout() {
                            WalletError::Timeout(format!("indexer: {e}"))
                        } else {
                            WalletError::Unavailable(format!("indexer: {e}"))
                        });
                    }
                    warn!(error = %e, attempt, "indexer request failed; retrying");
                }
            }

            let backoff = self.config.retry_base_delay * 2u32.pow(attempt - 1);
            tokio::time::sleep(backoff).await;
        }
    }
}
