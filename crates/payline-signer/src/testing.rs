//! Deterministic in-memory signer and seed store used by tests across the
//! workspace. Addresses derive from `(seed, chain)` so repeated runs agree.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{keccak256, U256};
use async_trait::async_trait;
use serde_json::{json, Value};

use payline_core::{Chain, ChainFamily, UserId, WalletError};

use crate::{
    EthProvider, SeedRef, SeedStore, SignerAccount, SignerProvider, TransferMode, TransferRequest,
};

// ── Seed store ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemorySeedStore {
    seeds: Mutex<HashMap<UserId, SeedRef>>,
}

impl MemorySeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.seeds.lock().unwrap().contains_key(user)
    }
}

#[async_trait]
impl SeedStore for MemorySeedStore {
    async fn get_or_create(&self, user: &UserId) -> Result<SeedRef, WalletError> {
        let mut seeds = self.seeds.lock().unwrap();
        if let Some(seed) = seeds.get(user) {
            return Ok(seed.clone());
        }
        let entropy: [u8; 32] = rand::random();
        let seed = SeedRef(hex::encode(entropy));
        seeds.insert(user.clone(), seed.clone());
        Ok(seed)
    }

    async fn rotate(&self, user: &UserId) -> Result<SeedRef, WalletError> {
        let entropy: [u8; 32] = rand::random();
        let seed = SeedRef(hex::encode(entropy));
        self.seeds.lock().unwrap().insert(user.clone(), seed.clone());
        Ok(seed)
    }
}

// ── Address derivation ───────────────────────────────────────────────────────

/// Deterministic per-(seed, chain) address in the chain's native text format.
pub fn derive_address(seed: &SeedRef, chain: Chain) -> String {
    let digest = keccak256(format!("{}:{}", seed.0, chain.slug()).as_bytes());
    match chain.family() {
        ChainFamily::Evm | ChainFamily::EvmAa => format!("0x{}", hex::encode(&digest[12..])),
        ChainFamily::Tron => format!("T{}", bs58::encode(&digest[..20]).into_string()),
        ChainFamily::Bitcoin => format!("bc1q{}", hex::encode(&digest[..20])),
        ChainFamily::Solana => bs58::encode(&digest[..]).into_string(),
    }
}

// ── Eth provider stub ────────────────────────────────────────────────────────

/// Answers `eth_call` by matching the calldata's 4-byte selector. Unmatched
/// selectors return `"0x"` (the empty reply a missing contract gives).
#[derive(Default)]
pub struct TestEthProvider {
    by_selector: Mutex<HashMap<String, Value>>,
}

impl TestEthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_to_selector(&self, selector: &str, result: Value) {
        self.by_selector
            .lock()
            .unwrap()
            .insert(selector.to_lowercase(), result);
    }
}

#[async_trait]
impl EthProvider for TestEthProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        if method != "eth_call" {
            return Err(WalletError::InvalidArgument(format!(
                "test provider only answers eth_call, got {method}"
            )));
        }
        let data = params
            .get(0)
            .and_then(|call| call.get("data"))
            .and_then(Value::as_str)
            .unwrap_or("");
        let selector = data.get(..10).unwrap_or(data).to_lowercase();
        let by_selector = self.by_selector.lock().unwrap();
        Ok(by_selector.get(&selector).cloned().unwrap_or(json!("0x")))
    }
}

// ── Account stub ─────────────────────────────────────────────────────────────

pub struct TestAccount {
    chain: Chain,
    address: String,
    native_balance: Mutex<U256>,
    token_balances: Mutex<HashMap<String, U256>>,
    expose_token_balance: bool,
    provider: Option<Arc<TestEthProvider>>,
    modes: Vec<TransferMode>,
    fail_modes: HashSet<TransferMode>,
    delay: Option<Duration>,
    fail_derivation: bool,
    transfers: Mutex<Vec<(TransferMode, TransferRequest)>>,
}

impl TestAccount {
    pub fn new(seed: &SeedRef, chain: Chain) -> Self {
        Self {
            chain,
            address: derive_address(seed, chain),
            native_balance: Mutex::new(U256::ZERO),
            token_balances: Mutex::new(HashMap::new()),
            expose_token_balance: true,
            provider: None,
            modes: vec![
                TransferMode::NativeSend,
                TransferMode::NativeTransfer,
                TransferMode::TokenTransferByRecipient,
                TransferMode::TokenTransferByTo,
                TransferMode::SendToken,
                TransferMode::TransferToken,
                TransferMode::GenericSend,
            ],
            fail_modes: HashSet::new(),
            delay: None,
            fail_derivation: false,
            transfers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_native_balance(mut self, balance: U256) -> Self {
        *self.native_balance.get_mut().unwrap() = balance;
        self
    }

    pub fn with_token_balance(mut self, token: &str, balance: U256) -> Self {
        self.token_balances
            .get_mut()
            .unwrap()
            .insert(token.to_lowercase(), balance);
        self
    }

    /// Hide the `getTokenBalance` capability entirely.
    pub fn without_token_balance_capability(mut self) -> Self {
        self.expose_token_balance = false;
        self
    }

    pub fn with_provider(mut self, provider: Arc<TestEthProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_modes(mut self, modes: Vec<TransferMode>) -> Self {
        self.modes = modes;
        self
    }

    pub fn failing_mode(mut self, mode: TransferMode) -> Self {
        self.fail_modes.insert(mode);
        self
    }

    /// Make every call on this account take at least `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make address derivation fail, as a broken chain integration would.
    pub fn failing_derivation(mut self) -> Self {
        self.fail_derivation = true;
        self
    }

    pub fn recorded_transfers(&self) -> Vec<(TransferMode, TransferRequest)> {
        self.transfers.lock().unwrap().clone()
    }

    pub fn set_native_balance(&self, balance: U256) {
        *self.native_balance.lock().unwrap() = balance;
    }

    async fn simulate_latency(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl SignerAccount for TestAccount {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn address(&self) -> Result<String, WalletError> {
        self.simulate_latency().await;
        if self.fail_derivation {
            return Err(WalletError::Internal("derivation unavailable".into()));
        }
        Ok(self.address.clone())
    }

    async fn native_balance(&self) -> Result<U256, WalletError> {
        self.simulate_latency().await;
        Ok(*self.native_balance.lock().unwrap())
    }

    async fn token_balance(&self, token: &str) -> Result<Option<U256>, WalletError> {
        if !self.expose_token_balance {
            return Ok(None);
        }
        Ok(self
            .token_balances
            .lock()
            .unwrap()
            .get(&token.to_lowercase())
            .copied())
    }

    fn eth_provider(&self) -> Option<Arc<dyn EthProvider>> {
        self.provider
            .as_ref()
            .map(|p| Arc::clone(p) as Arc<dyn EthProvider>)
    }

    fn transfer_modes(&self) -> Vec<TransferMode> {
        self.modes.clone()
    }

    async fn transfer(
        &self,
        mode: TransferMode,
        request: &TransferRequest,
    ) -> Result<Value, WalletError> {
        if !self.modes.contains(&mode) {
            return Err(WalletError::InvalidArgument(format!(
                "transfer mode {mode:?} not advertised"
            )));
        }
        if self.fail_modes.contains(&mode) {
            return Err(WalletError::Internal(format!("{mode:?} entry point broken")));
        }
        self.transfers.lock().unwrap().push((mode, request.clone()));
        Ok(json!({"txHash": format!("0xtest{}", self.transfers.lock().unwrap().len())}))
    }
}

// ── Signer provider stub ─────────────────────────────────────────────────────

/// Hands out [`TestAccount`]s. Install preconfigured accounts per
/// (seed, chain); anything else gets a default zero-balance account.
#[derive(Default)]
pub struct TestSigner {
    installed: Mutex<HashMap<(String, Chain), Arc<TestAccount>>>,
}

impl TestSigner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, seed: &SeedRef, chain: Chain, account: Arc<TestAccount>) {
        self.installed
            .lock()
            .unwrap()
            .insert((seed.0.clone(), chain), account);
    }
}

#[async_trait]
impl SignerProvider for TestSigner {
    async fn account(
        &self,
        seed: &SeedRef,
        chain: Chain,
    ) -> Result<Arc<dyn SignerAccount>, WalletError> {
        let installed = self
            .installed
            .lock()
            .unwrap()
            .get(&(seed.0.clone(), chain))
            .cloned();
        match installed {
            Some(account) => Ok(account),
            None => Ok(Arc::new(TestAccount::new(seed, chain))),
        }
    }
}
