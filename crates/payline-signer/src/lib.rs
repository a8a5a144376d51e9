//! Interfaces to the external signer/derivation service.
//!
//! The service itself lives outside this workspace; these traits are the
//! surface the aggregator consumes. Signers advertise their transfer entry
//! points as a capability set ([`TransferMode`]) that the send path iterates
//! in a fixed priority order instead of probing method names.

pub mod testing;

use std::sync::Arc;

use alloy_primitives::U256;
use async_trait::async_trait;
use serde_json::Value;

use payline_core::{Chain, UserId, WalletError};

// ── Seed store ───────────────────────────────────────────────────────────────

/// Opaque handle to a user's seed material. The bytes behind it never leave
/// the external store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeedRef(pub String);

/// Seed persistence, delegated to an encrypted external store. Seeds are
/// auto-created on first use and immutable until an explicit rotation.
#[async_trait]
pub trait SeedStore: Send + Sync {
    async fn get_or_create(&self, user: &UserId) -> Result<SeedRef, WalletError>;
    async fn rotate(&self, user: &UserId) -> Result<SeedRef, WalletError>;
}

// ── Transfer capability set ──────────────────────────────────────────────────

/// Transfer entry points a signer account may expose, one tag per calling
/// convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferMode {
    /// `send(recipient, amount)` for the native token.
    NativeSend,
    /// `transfer({to, amount})` for the native token.
    NativeTransfer,
    /// `transfer({token, recipient, amount})`.
    TokenTransferByRecipient,
    /// `transfer({token, to, amount})`.
    TokenTransferByTo,
    /// `sendToken(token, recipient, amount)`.
    SendToken,
    /// `transferToken(token, recipient, amount)`.
    TransferToken,
    /// `send(recipient, amount, {tokenAddress})`.
    GenericSend,
}

/// Priority order for native transfers.
pub const NATIVE_MODE_PRIORITY: &[TransferMode] =
    &[TransferMode::NativeSend, TransferMode::NativeTransfer];

/// Priority order for token transfers.
pub const TOKEN_MODE_PRIORITY: &[TransferMode] = &[
    TransferMode::TokenTransferByRecipient,
    TransferMode::TokenTransferByTo,
    TransferMode::SendToken,
    TransferMode::TransferToken,
    TransferMode::GenericSend,
];

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub recipient: String,
    /// Amount in smallest units.
    pub amount: U256,
    /// Token contract address; `None` for the native token.
    pub token: Option<String>,
}

/// Pull a transaction hash out of a signer transfer result: either a bare
/// string or an object carrying `hash` / `txHash`.
pub fn extract_tx_hash(outcome: &Value) -> Option<String> {
    match outcome {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => map
            .get("hash")
            .or_else(|| map.get("txHash"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

// ── Accounts ─────────────────────────────────────────────────────────────────

/// An `eth_call`-style request surface some EVM signer accounts expose.
#[async_trait]
pub trait EthProvider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError>;
}

/// One derived account: a (user, chain) pair with an address and whatever
/// capabilities the underlying signer implements.
#[async_trait]
pub trait SignerAccount: Send + Sync {
    fn chain(&self) -> Chain;

    async fn address(&self) -> Result<String, WalletError>;

    async fn native_balance(&self) -> Result<U256, WalletError>;

    /// Token balance if the signer exposes one; `Ok(None)` means the
    /// capability is absent, not that the balance is zero.
    async fn token_balance(&self, token: &str) -> Result<Option<U256>, WalletError> {
        let _ = token;
        Ok(None)
    }

    /// Raw provider for `eth_call`-style reads, when exposed.
    fn eth_provider(&self) -> Option<Arc<dyn EthProvider>> {
        None
    }

    /// Transfer entry points this account supports.
    fn transfer_modes(&self) -> Vec<TransferMode>;

    /// Execute a transfer through one advertised entry point. The result is
    /// the signer's raw response; see [`extract_tx_hash`].
    async fn transfer(
        &self,
        mode: TransferMode,
        request: &TransferRequest,
    ) -> Result<Value, WalletError>;
}

/// Derives accounts from seed material, one per (seed, chain).
#[async_trait]
pub trait SignerProvider: Send + Sync {
    async fn account(
        &self,
        seed: &SeedRef,
        chain: Chain,
    ) -> Result<Arc<dyn SignerAccount>, WalletError>;
}
