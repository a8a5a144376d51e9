//! Session-key authentication for the clearing-node link.
//!
//! An ephemeral ECDSA key is generated per process. On every (re)connect the
//! transport's on-connect hook runs the challenge/response handshake here, so
//! authentication always completes before queued requests replay. Individual
//! requests are signed with the session key over the canonical `req` tuple.

pub mod client;

pub use client::{install_handshake_hook, AuthedClient, PUBLIC_METHODS};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use alloy_primitives::keccak256;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use payline_core::types::now_ms;
use payline_core::WalletError;
use payline_rpc::{RequestSigner, RpcTransport};

/// Identity the session key is bound to during the handshake.
#[derive(Debug, Clone)]
pub struct SessionClaims {
    /// The user's main on-chain address (the clearing account).
    pub wallet_address: String,
    /// Application name presented to the clearing node.
    pub application: String,
    /// Requested session lifetime in seconds.
    pub expires_in_secs: u64,
}

/// Owns the ephemeral session key and the `authenticated` flag.
pub struct SessionAuth {
    signer: PrivateKeySigner,
    claims: SessionClaims,
    authenticated: AtomicBool,
    expires_at: Mutex<Option<i64>>,
}

impl SessionAuth {
    /// Generate a fresh session key bound to `claims`.
    pub fn new(claims: SessionClaims) -> Self {
        let signer = PrivateKeySigner::random();
        debug!(session_key = %signer.address(), "session key generated");
        Self {
            signer,
            claims,
            authenticated: AtomicBool::new(false),
            expires_at: Mutex::new(None),
        }
    }

    /// `0x`-prefixed address of the session key.
    pub fn session_address(&self) -> String {
        self.signer.address().to_string()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Unix-ms expiry of the current session, if authenticated.
    pub fn expires_at(&self) -> Option<i64> {
        *self.expires_at.lock().unwrap()
    }

    /// Run the challenge/response handshake over an open link.
    ///
    /// Resets `authenticated` first, so a reconnect never replays signed
    /// requests under a stale session.
    pub async fn handshake(&self, transport: &RpcTransport) -> Result<(), WalletError> {
        self.authenticated.store(false, Ordering::SeqCst);
        *self.expires_at.lock().unwrap() = None;

        let params = json!({
            "address": self.claims.wallet_address,
            "session_key": self.session_address(),
            "app_name": self.claims.application,
            "expire": self.claims.expires_in_secs,
        });
        let challenge = transport.request("auth_request", params, None).await?;
        let message = challenge
            .get("challenge_message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                WalletError::Unauthenticated("auth_request reply carried no challenge".into())
            })?;

        let signature = self.sign_text(message).await?;
        let verify = transport
            .request(
                "auth_verify",
                json!({ "challenge": message, "signature": signature }),
                None,
            )
            .await?;

        let accepted = verify
            .get("success")
            .or_else(|| verify.get("authenticated"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !accepted {
            warn!("clearing node refused session key");
            return Err(WalletError::Unauthenticated(
                "clearing node refused the session key".into(),
            ));
        }

        let expires = verify
            .get("expires_at")
            .and_then(|v| v.as_i64())
            .unwrap_or_else(|| now_ms() + (self.claims.expires_in_secs as i64) * 1_000);
        *self.expires_at.lock().unwrap() = Some(expires);
        self.authenticated.store(true, Ordering::SeqCst);
        info!(session_key = %self.session_address(), expires_at = expires, "session authenticated");
        Ok(())
    }

    /// EIP-191 signature over a human-readable challenge string.
    async fn sign_text(&self, message: &str) -> Result<String, WalletError> {
        let sig = self
            .signer
            .sign_message(message.as_bytes())
            .await
            .map_err(|e| WalletError::Internal(format!("challenge signing: {e}")))?;
        Ok(format!("0x{}", hex::encode(sig.as_bytes())))
    }
}

#[async_trait]
impl RequestSigner for SessionAuth {
    /// Detached signature over `keccak256` of the canonical `req` tuple.
    async fn sign(&self, canonical_req: &[u8]) -> Result<Vec<String>, WalletError> {
        let digest = keccak256(canonical_req);
        let sig = self
            .signer
            .sign_hash(&digest)
            .await
            .map_err(|e| WalletError::Internal(format!("request signing: {e}")))?;
        Ok(vec![format!("0x{}", hex::encode(sig.as_bytes()))])
    }
}
