use std::sync::Arc;

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use serde_json::{json, Value};
use tracing::{info, warn};

use payline_auth::AuthedClient;
use payline_core::{ChannelId, WalletError};

use crate::dto;
use crate::submitter::{ContractSubmitter, CustodyRegistry, Receipt};
use crate::types::{abi, channel_id_word, Channel, ChannelState, Intent};

/// Result of a successful `create_channel`.
#[derive(Debug, Clone)]
pub struct OpenedChannel {
    pub channel: Channel,
    pub channel_id: ChannelId,
    pub state: ChannelState,
    pub chain_id: u64,
    pub status: &'static str,
}

/// Result of a settled resize/close.
#[derive(Debug, Clone)]
pub struct SettledUpdate {
    pub channel_id: ChannelId,
    pub state: ChannelState,
    pub receipt: Receipt,
}

/// Drives the two-phase channel protocol: off-chain negotiation with the
/// clearing node, then on-chain settlement through the custody contract.
pub struct ChannelController {
    client: AuthedClient,
    submitter: Arc<dyn ContractSubmitter>,
    custody: CustodyRegistry,
}

impl ChannelController {
    pub fn new(
        client: AuthedClient,
        submitter: Arc<dyn ContractSubmitter>,
        custody: CustodyRegistry,
    ) -> Self {
        Self { client, submitter, custody }
    }

    /// Open a channel for `token` on `chain_id`, funding index 0 with
    /// `initial_deposit` smallest units.
    pub async fn create_channel(
        &self,
        chain_id: u64,
        token: Address,
        initial_deposit: Option<U256>,
    ) -> Result<OpenedChannel, WalletError> {
        let custody = self.custody.address_for(chain_id)?;

        // Phase A: off-chain negotiation.
        let reply = self
            .client
            .call(
                "create_channel",
                json!({ "chain_id": chain_id, "token": token.to_string() }),
            )
            .await?;
        let channel = dto::parse_channel(reply.get("channel").ok_or_else(|| {
            WalletError::Internal("create_channel reply carried no channel".into())
        })?)?;
        let sigs = dto::parse_sig_pair(&reply)?;

        // The id is computed locally; a server echo that disagrees means the
        // two sides would fund different channels.
        let channel_id = channel.id();
        if let Some(echo) = reply.get("channel_id").and_then(Value::as_str) {
            let echoed = ChannelId::from_hex(echo)
                .map_err(|e| WalletError::Internal(format!("server channel id: {e}")))?;
            if echoed != channel_id {
                return Err(WalletError::Internal(format!(
                    "server channel id {echoed} does not match locally computed {channel_id}"
                )));
            }
        }

        let state = ChannelState::initial(initial_deposit.unwrap_or(U256::ZERO));

        // Phase B: on-chain create.
        let calldata = abi::createCall {
            channelId: channel_id_word(&channel_id),
            state: state.to_sol(),
            sigs: sigs.to_vec(),
        }
        .abi_encode();
        let receipt = self.settle(chain_id, custody, calldata, "create").await?;

        info!(
            channel_id = %channel_id,
            chain_id,
            tx_hash = %receipt.tx_hash,
            "channel created"
        );
        Ok(OpenedChannel { channel, channel_id, state, chain_id, status: "active" })
    }

    /// Resize the channel by `resize_amount` (a signed human-decimal string,
    /// forwarded verbatim to the clearing node, which returns the re-signed
    /// allocation vector).
    pub async fn resize_channel(
        &self,
        channel_id: ChannelId,
        chain_id: u64,
        resize_amount: &str,
    ) -> Result<SettledUpdate, WalletError> {
        let custody = self.custody.address_for(chain_id)?;

        let reply = self
            .client
            .call(
                "resize_channel",
                json!({
                    "channel_id": channel_id.to_hex(),
                    "chain_id": chain_id,
                    "resize_amount": resize_amount,
                }),
            )
            .await?;
        let state = self.parse_update(&reply, channel_id, Intent::Resize)?;
        let sigs = dto::parse_sig_pair(&reply)?;

        let calldata = abi::resizeCall {
            channelId: channel_id_word(&channel_id),
            state: state.to_sol(),
            sigs: sigs.to_vec(),
        }
        .abi_encode();
        let receipt = self.settle(chain_id, custody, calldata, "resize").await?;

        info!(channel_id = %channel_id, version = state.version, "channel resized");
        Ok(SettledUpdate { channel_id, state, receipt })
    }

    /// Cooperatively close the channel, paying the final allocations out to
    /// `destination`.
    pub async fn close_channel(
        &self,
        channel_id: ChannelId,
        chain_id: u64,
        destination: Address,
    ) -> Result<SettledUpdate, WalletError> {
        let custody = self.custody.address_for(chain_id)?;

        let reply = self
            .client
            .call(
                "close_channel",
                json!({
                    "channel_id": channel_id.to_hex(),
                    "chain_id": chain_id,
                    "funds_destination": destination.to_string(),
                }),
            )
            .await?;
        let state = self.parse_update(&reply, channel_id, Intent::Finalize)?;
        let sigs = dto::parse_sig_pair(&reply)?;

        let calldata = abi::closeCall {
            channelId: channel_id_word(&channel_id),
            state: state.to_sol(),
            sigs: sigs.to_vec(),
        }
        .abi_encode();
        let receipt = self.settle(chain_id, custody, calldata, "close").await?;

        info!(channel_id = %channel_id, tx_hash = %receipt.tx_hash, "channel closed");
        Ok(SettledUpdate { channel_id, state, receipt })
    }

    /// Validate a negotiated update against the protocol invariants before
    /// anything touches the chain.
    fn parse_update(
        &self,
        reply: &Value,
        channel_id: ChannelId,
        expected_intent: Intent,
    ) -> Result<ChannelState, WalletError> {
        if let Some(echo) = reply.get("channel_id").and_then(Value::as_str) {
            let echoed = ChannelId::from_hex(echo)
                .map_err(|e| WalletError::Internal(format!("server channel id: {e}")))?;
            if echoed != channel_id {
                return Err(WalletError::Internal(format!(
                    "reply is for channel {echoed}, requested {channel_id}"
                )));
            }
        }
        let state = dto::parse_state(reply.get("state").ok_or_else(|| {
            WalletError::Internal("clearing node reply carried no state".into())
        })?)?;
        if state.intent != expected_intent {
            return Err(WalletError::Internal(format!(
                "expected {expected_intent:?} state, got {:?}",
                state.intent
            )));
        }
        // Initialize is the only version-0 state; every later state must
        // have moved past it.
        if state.version == 0 {
            return Err(WalletError::Internal(
                "negotiated state did not advance past version 0".into(),
            ));
        }
        Ok(state)
    }

    /// Phase B: submit and await one confirmation. Any failure here lands
    /// after a successful off-chain negotiation, so it surfaces as the
    /// distinct partial-settlement kind and is never retried automatically.
    async fn settle(
        &self,
        chain_id: u64,
        custody: Address,
        calldata: Vec<u8>,
        op: &str,
    ) -> Result<Receipt, WalletError> {
        match self.submitter.submit(chain_id, custody, calldata).await {
            Ok(receipt) if receipt.success => Ok(receipt),
            Ok(receipt) => {
                warn!(tx_hash = %receipt.tx_hash, op, "custody call reverted");
                Err(WalletError::PartialSettlement(format!(
                    "custody {op} reverted in tx {}",
                    receipt.tx_hash
                )))
            }
            Err(e) => Err(WalletError::PartialSettlement(format!(
                "custody {op} submission failed: {e}"
            ))),
        }
    }
}
