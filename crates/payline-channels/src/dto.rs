//! Parsing of clearing-node channel replies. The node is permissive about
//! numeric encodings (decimal strings, hex strings, raw numbers), so every
//! field goes through a tolerant parser that fails with a precise message.

use alloy_primitives::{Address, Bytes, U256};
use serde_json::Value;
use std::str::FromStr;

use payline_core::WalletError;

use crate::types::{Channel, ChannelState, Intent, StateAllocation};

pub fn parse_address(v: &Value, field: &str) -> Result<Address, WalletError> {
    let s = v
        .as_str()
        .ok_or_else(|| WalletError::Internal(format!("{field} is not a string")))?;
    Address::from_str(s).map_err(|e| WalletError::Internal(format!("{field}: {e}")))
}

pub fn parse_u256(v: &Value, field: &str) -> Result<U256, WalletError> {
    match v {
        Value::Number(n) => {
            let raw = n
                .as_u64()
                .ok_or_else(|| WalletError::Internal(format!("{field} is not an integer")))?;
            Ok(U256::from(raw))
        }
        Value::String(s) => {
            let parsed = if let Some(hex) = s.strip_prefix("0x") {
                U256::from_str_radix(hex, 16)
            } else {
                U256::from_str_radix(s, 10)
            };
            parsed.map_err(|e| WalletError::Internal(format!("{field}: {e}")))
        }
        _ => Err(WalletError::Internal(format!("{field} has unexpected type"))),
    }
}

pub fn parse_u64(v: &Value, field: &str) -> Result<u64, WalletError> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| WalletError::Internal(format!("{field} is not a u64"))),
        Value::String(s) => s
            .parse()
            .map_err(|e| WalletError::Internal(format!("{field}: {e}"))),
        _ => Err(WalletError::Internal(format!("{field} has unexpected type"))),
    }
}

fn parse_bytes(v: Option<&Value>, field: &str) -> Result<Bytes, WalletError> {
    let Some(v) = v else { return Ok(Bytes::new()) };
    let s = v
        .as_str()
        .ok_or_else(|| WalletError::Internal(format!("{field} is not a string")))?;
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    if stripped.is_empty() {
        return Ok(Bytes::new());
    }
    hex::decode(stripped)
        .map(Bytes::from)
        .map_err(|e| WalletError::Internal(format!("{field}: {e}")))
}

fn parse_intent(v: &Value) -> Result<Intent, WalletError> {
    let intent = match v {
        Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()).and_then(Intent::from_u8),
        Value::String(s) => Intent::from_name(s),
        _ => None,
    };
    intent.ok_or_else(|| WalletError::Internal(format!("unknown state intent: {v}")))
}

/// `{participants: [a, b], adjudicator, challenge, nonce}`.
pub fn parse_channel(v: &Value) -> Result<Channel, WalletError> {
    let participants = v
        .get("participants")
        .and_then(Value::as_array)
        .ok_or_else(|| WalletError::Internal("channel.participants missing".into()))?;
    if participants.len() != 2 {
        return Err(WalletError::Internal(format!(
            "channel has {} participants, expected 2",
            participants.len()
        )));
    }
    Ok(Channel {
        participants: [
            parse_address(&participants[0], "channel.participants[0]")?,
            parse_address(&participants[1], "channel.participants[1]")?,
        ],
        adjudicator: parse_address(
            v.get("adjudicator")
                .ok_or_else(|| WalletError::Internal("channel.adjudicator missing".into()))?,
            "channel.adjudicator",
        )?,
        challenge: parse_u256(
            v.get("challenge")
                .ok_or_else(|| WalletError::Internal("channel.challenge missing".into()))?,
            "channel.challenge",
        )?,
        nonce: parse_u256(
            v.get("nonce")
                .ok_or_else(|| WalletError::Internal("channel.nonce missing".into()))?,
            "channel.nonce",
        )?,
    })
}

/// `{intent, version, data?, allocations: [{index, amount}]}`.
pub fn parse_state(v: &Value) -> Result<ChannelState, WalletError> {
    let allocations = v
        .get("allocations")
        .and_then(Value::as_array)
        .ok_or_else(|| WalletError::Internal("state.allocations missing".into()))?
        .iter()
        .map(|a| {
            Ok(StateAllocation {
                index: parse_u256(
                    a.get("index")
                        .ok_or_else(|| WalletError::Internal("allocation.index missing".into()))?,
                    "allocation.index",
                )?,
                amount: parse_u256(
                    a.get("amount")
                        .ok_or_else(|| WalletError::Internal("allocation.amount missing".into()))?,
                    "allocation.amount",
                )?,
            })
        })
        .collect::<Result<Vec<_>, WalletError>>()?;

    Ok(ChannelState {
        intent: parse_intent(
            v.get("intent")
                .ok_or_else(|| WalletError::Internal("state.intent missing".into()))?,
        )?,
        version: parse_u64(
            v.get("version")
                .ok_or_else(|| WalletError::Internal("state.version missing".into()))?,
            "state.version",
        )?,
        data: parse_bytes(v.get("data"), "state.data")?,
        allocations,
    })
}

/// The `[user, server]` signature pair, exactly in that order — the custody
/// contract validates them positionally.
pub fn parse_sig_pair(reply: &Value) -> Result<[Bytes; 2], WalletError> {
    let user = parse_bytes(reply.get("user_signature"), "user_signature")?;
    let server = parse_bytes(reply.get("server_signature"), "server_signature")?;
    if user.is_empty() || server.is_empty() {
        return Err(WalletError::Internal(
            "clearing node reply is missing a state signature".into(),
        ));
    }
    Ok([user, server])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_full_create_reply() {
        let reply = json!({
            "channel": {
                "participants": [
                    "0x00000000000000000000000000000000000000aa",
                    "0x00000000000000000000000000000000000000bb"
                ],
                "adjudicator": "0x00000000000000000000000000000000000000cc",
                "challenge": 3600,
                "nonce": "170000000001"
            },
            "user_signature": "0x1111",
            "server_signature": "0x2222"
        });
        let channel = parse_channel(&reply["channel"]).unwrap();
        assert_eq!(channel.challenge, U256::from(3_600u64));
        assert_eq!(channel.nonce, U256::from(170_000_000_001u64));

        let sigs = parse_sig_pair(&reply).unwrap();
        assert_eq!(sigs[0].as_ref(), &[0x11, 0x11]);
        assert_eq!(sigs[1].as_ref(), &[0x22, 0x22]);
    }

    #[test]
    fn parses_state_with_mixed_encodings() {
        let state = parse_state(&json!({
            "intent": "RESIZE",
            "version": "1",
            "data": "0x",
            "allocations": [
                {"index": 0, "amount": "15000000"},
                {"index": 1, "amount": "0x0"}
            ]
        }))
        .unwrap();
        assert_eq!(state.intent, Intent::Resize);
        assert_eq!(state.version, 1);
        assert!(state.data.is_empty());
        assert_eq!(state.allocations[0].amount, U256::from(15_000_000u64));
    }

    #[test]
    fn missing_signature_is_rejected() {
        let reply = json!({"user_signature": "0x11"});
        assert!(parse_sig_pair(&reply).is_err());
    }

    #[test]
    fn wrong_participant_count_is_rejected() {
        let bad = json!({
            "participants": ["0x00000000000000000000000000000000000000aa"],
            "adjudicator": "0x00000000000000000000000000000000000000cc",
            "challenge": 1, "nonce": 1
        });
        assert!(parse_channel(&bad).is_err());
    }
}
