//! The signer-side send pipeline: validate, resolve decimals, convert to
//! smallest units losslessly, pre-check the balance, then walk the signer's
//! transfer capability set in priority order.

use alloy_primitives::U256;
use serde_json::json;
use tracing::{debug, info, warn};

use payline_core::units::to_smallest_units;
use payline_core::{Chain, UserId, WalletError};
use payline_indexer::IndexerClient;
use payline_signer::{
    extract_tx_hash, SignerAccount, TransferRequest, NATIVE_MODE_PRIORITY, TOKEN_MODE_PRIORITY,
};

use crate::aggregator::ChainAggregator;
use crate::decimals::{
    balance_of_calldata, matches_token, parse_hex_quantity, resolve_token_decimals,
};

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub tx_hash: String,
    pub chain: Chain,
    pub amount_smallest: u128,
    pub decimals: u8,
}

impl ChainAggregator {
    /// Send `amount` (a human decimal string) of the native token — or of
    /// `token` when given — to `recipient`. Chain-specific recipient format
    /// checks are the signer's to make.
    pub async fn send_crypto(
        &self,
        user: &UserId,
        chain: Chain,
        recipient: &str,
        amount: &str,
        token: Option<&str>,
    ) -> Result<SendOutcome, WalletError> {
        if recipient.trim().is_empty() {
            return Err(WalletError::InvalidArgument("recipient is empty".into()));
        }

        let account = self.account_for(user, chain).await?;
        let address = account.address().await?;

        let decimals = match token {
            Some(token) => {
                resolve_token_decimals(&*account, self.indexer(), &address, chain, token).await
            }
            None => chain.native_decimals(),
        };
        let units = to_smallest_units(amount, decimals)?;

        // Balance pre-check: fail on a confirmed shortfall, proceed when no
        // source can answer.
        match available_balance(&*account, self.indexer(), &address, chain, token).await {
            Some((available, source)) if available < units => {
                return Err(WalletError::InsufficientBalance {
                    available,
                    requested: units,
                    source_label: source.to_string(),
                });
            }
            Some((available, source)) => {
                debug!(available, requested = units, source, "balance pre-check passed")
            }
            None => debug!("balance unknown; proceeding"),
        }

        let request = TransferRequest {
            recipient: recipient.to_string(),
            amount: U256::from(units),
            token: token.map(str::to_string),
        };
        let priority = if token.is_some() { TOKEN_MODE_PRIORITY } else { NATIVE_MODE_PRIORITY };
        let advertised = account.transfer_modes();

        let mut last_error = None;
        for &mode in priority {
            if !advertised.contains(&mode) {
                continue;
            }
            match account.transfer(mode, &request).await {
                Ok(outcome) => match extract_tx_hash(&outcome) {
                    Some(tx_hash) => {
                        // Best-effort: a stale cache must never fail a send.
                        self.indexer().invalidate(&address, Some(chain.indexer_slug()));
                        info!(chain = %chain, %tx_hash, units, "send submitted");
                        return Ok(SendOutcome {
                            tx_hash,
                            chain,
                            amount_smallest: units,
                            decimals,
                        });
                    }
                    None => {
                        warn!(?mode, "transfer result carried no hash; trying next entry point");
                        last_error = Some(WalletError::Internal(format!(
                            "{mode:?} returned no transaction hash"
                        )));
                    }
                },
                Err(e) => {
                    warn!(?mode, error = %e, "transfer entry point failed; trying next");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            WalletError::PreconditionFailed("signer exposes no usable transfer entry point".into())
        }))
    }
}

/// Layered balance lookup. Tokens: signer capability, then a direct
/// `balanceOf` through the provider, then indexer positions. Native: the
/// signer's own balance. `None` means no source could answer.
async fn available_balance(
    account: &dyn SignerAccount,
    indexer: &IndexerClient,
    owner: &str,
    chain: Chain,
    token: Option<&str>,
) -> Option<(u128, &'static str)> {
    let Some(token) = token else {
        return match account.native_balance().await {
            Ok(balance) => Some((saturating_u128(balance), "wdk-getBalance")),
            Err(_) => None,
        };
    };

    if let Ok(Some(balance)) = account.token_balance(token).await {
        return Some((saturating_u128(balance), "wdk-getTokenBalance"));
    }

    if let Some(provider) = account.eth_provider() {
        let call = json!([{ "to": token, "data": balance_of_calldata(owner) }, "latest"]);
        if let Ok(reply) = provider.request("eth_call", call).await {
            if let Some(balance) = parse_hex_quantity(&reply) {
                return Some((balance, "provider-balanceOf"));
            }
        }
    }

    if let Ok(positions) = indexer.portfolio(owner, None).await {
        if let Some(position) = positions.iter().find(|p| matches_token(p, token, chain)) {
            if let Ok(balance) = position.attributes.quantity.int.parse() {
                return Some((balance, "indexer-positions"));
            }
        }
    }

    None
}

fn saturating_u128(value: U256) -> u128 {
    u128::try_from(value).unwrap_or(u128::MAX)
}
