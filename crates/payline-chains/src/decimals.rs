//! Token-decimals resolution with layered fallbacks: an ERC-20 `decimals()`
//! call through the signer's provider, then the indexer's any-chain
//! positions, then a logged default of 18.

use serde_json::{json, Value};
use tracing::{debug, warn};

use payline_core::constants::{FALLBACK_TOKEN_DECIMALS, MAX_TOKEN_DECIMALS};
use payline_core::Chain;
use payline_indexer::{IndexerClient, Position};
use payline_signer::SignerAccount;

/// ERC-20 `decimals()` selector.
const DECIMALS_SELECTOR: &str = "0x313ce567";
/// ERC-20 `balanceOf(address)` selector.
pub(crate) const BALANCE_OF_SELECTOR: &str = "0x70a08231";

pub async fn resolve_token_decimals(
    account: &dyn SignerAccount,
    indexer: &IndexerClient,
    owner: &str,
    chain: Chain,
    token: &str,
) -> u8 {
    // (i) Ask the contract itself, through whatever provider the signer
    // account exposes. An empty `0x` reply (no contract, bad chain) and
    // out-of-range values are both rejected.
    if let Some(provider) = account.eth_provider() {
        let call = json!([{ "to": token, "data": DECIMALS_SELECTOR }, "latest"]);
        if let Ok(reply) = provider.request("eth_call", call).await {
            if let Some(d) = parse_hex_quantity(&reply) {
                if d <= MAX_TOKEN_DECIMALS as u128 {
                    debug!(token, decimals = d, "decimals from ERC-20 call");
                    return d as u8;
                }
                warn!(token, decimals = d, "decimals() out of range; ignoring");
            }
        }
    }

    // (ii) The indexer's any-chain positions for this owner.
    if let Ok(positions) = indexer.portfolio(owner, None).await {
        if let Some(position) = positions.iter().find(|p| matches_token(p, token, chain)) {
            let from_info = position
                .attributes
                .fungible_info
                .as_ref()
                .and_then(|f| f.decimals)
                .or_else(|| {
                    position
                        .attributes
                        .fungible_info
                        .as_ref()?
                        .implementations
                        .first()?
                        .decimals
                });
            if let Some(d) = from_info {
                debug!(token, decimals = d, "decimals from indexer positions");
                return d;
            }
        }
    }

    warn!(token, chain = %chain, "token decimals unresolved; defaulting to 18");
    FALLBACK_TOKEN_DECIMALS
}

/// A position matches when its first implementation's address equals `token`
/// (case-insensitive) and lives on the clearing chain mapped for `chain`.
pub(crate) fn matches_token(position: &Position, token: &str, chain: Chain) -> bool {
    let Some(info) = &position.attributes.fungible_info else { return false };
    let Some(implementation) = info.implementations.first() else { return false };
    let Some(address) = &implementation.address else { return false };
    address.eq_ignore_ascii_case(token) && implementation.chain_id == chain.indexer_slug()
}

/// Parse an `eth_call`-style hex quantity. `"0x"` (empty return data) is not
/// a value.
pub(crate) fn parse_hex_quantity(reply: &Value) -> Option<u128> {
    let s = reply.as_str()?;
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    if stripped.is_empty() {
        return None;
    }
    // Wide replies (32-byte words) still parse as one quantity; cap at the
    // last 32 hex digits to stay within u128.
    let tail = if stripped.len() > 32 {
        let head = &stripped[..stripped.len() - 32];
        if head.bytes().any(|b| b != b'0') {
            return None;
        }
        &stripped[stripped.len() - 32..]
    } else {
        stripped
    };
    u128::from_str_radix(tail, 16).ok()
}

/// Calldata for `balanceOf(owner)`.
pub(crate) fn balance_of_calldata(owner: &str) -> String {
    let bare = owner.trim_start_matches("0x").to_lowercase();
    format!("{BALANCE_OF_SELECTOR}{bare:0>64}")
}
