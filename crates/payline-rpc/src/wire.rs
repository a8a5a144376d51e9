//! Wire envelope for the clearing-node protocol.
//!
//! Frames are JSON text. A request is `{"req": [id, method, params, ts],
//! "sig": ["0x…"]}`; a response (or server-pushed notification — the shape is
//! identical, only id correlation distinguishes them) is `{"res": [id,
//! method, payload, ts], "sig": […], "error": {code, message}?}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use payline_core::{TimestampMs, WalletError};

// ── Request ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub id: u64,
    pub method: String,
    pub params: Value,
    pub ts_ms: TimestampMs,
    pub sigs: Vec<String>,
}

impl RpcRequest {
    /// The canonical byte encoding of the `req` tuple that session-key
    /// signatures commit to. Compact JSON, field order fixed by position.
    pub fn canonical_payload(&self) -> Result<Vec<u8>, WalletError> {
        Ok(serde_json::to_vec(&json!([
            self.id,
            self.method,
            self.params,
            self.ts_ms
        ]))?)
    }

    pub fn encode(&self) -> Result<String, WalletError> {
        Ok(serde_json::to_string(&json!({
            "req": [self.id, self.method, self.params, self.ts_ms],
            "sig": self.sigs,
        }))?)
    }

    pub fn decode(frame: &str) -> Result<Self, WalletError> {
        let v: Value = serde_json::from_str(frame)
            .map_err(|e| WalletError::Internal(format!("malformed request frame: {e}")))?;
        let tuple = v
            .get("req")
            .and_then(Value::as_array)
            .ok_or_else(|| WalletError::Internal("request frame missing req tuple".into()))?;
        if tuple.len() != 4 {
            return Err(WalletError::Internal(format!(
                "request tuple has {} elements, expected 4",
                tuple.len()
            )));
        }
        Ok(Self {
            id: tuple[0]
                .as_u64()
                .ok_or_else(|| WalletError::Internal("request id is not a u64".into()))?,
            method: tuple[1]
                .as_str()
                .ok_or_else(|| WalletError::Internal("request method is not a string".into()))?
                .to_string(),
            params: tuple[2].clone(),
            ts_ms: tuple[3]
                .as_i64()
                .ok_or_else(|| WalletError::Internal("request ts is not an integer".into()))?,
            sigs: decode_sigs(&v),
        })
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub id: u64,
    pub method: String,
    pub payload: Value,
    pub ts_ms: TimestampMs,
    pub sigs: Vec<String>,
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    pub fn encode(&self) -> Result<String, WalletError> {
        let mut v = json!({
            "res": [self.id, self.method, self.payload, self.ts_ms],
            "sig": self.sigs,
        });
        if let Some(err) = &self.error {
            v["error"] = json!({ "code": err.code, "message": err.message });
        }
        Ok(serde_json::to_string(&v)?)
    }

    pub fn decode(frame: &str) -> Result<Self, WalletError> {
        let v: Value = serde_json::from_str(frame)
            .map_err(|e| WalletError::Internal(format!("malformed response frame: {e}")))?;
        let tuple = v
            .get("res")
            .and_then(Value::as_array)
            .ok_or_else(|| WalletError::Internal("response frame missing res tuple".into()))?;
        if tuple.len() != 4 {
            return Err(WalletError::Internal(format!(
                "response tuple has {} elements, expected 4",
                tuple.len()
            )));
        }
        let error = v.get("error").and_then(|e| {
            serde_json::from_value::<RpcErrorBody>(e.clone()).ok()
        });
        Ok(Self {
            id: tuple[0].as_u64().unwrap_or(0),
            method: tuple[1]
                .as_str()
                .ok_or_else(|| WalletError::Internal("response method is not a string".into()))?
                .to_string(),
            payload: tuple[2].clone(),
            ts_ms: tuple[3].as_i64().unwrap_or(0),
            sigs: decode_sigs(&v),
            error,
        })
    }
}

fn decode_sigs(v: &Value) -> Vec<String> {
    v.get("sig")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ── Notifications ────────────────────────────────────────────────────────────

/// Server-pushed notification types the transport recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// `bu` — ledger balance update.
    BalanceUpdate,
    /// `cu` — channel update.
    ChannelUpdate,
    /// `tr` — transfer.
    Transfer,
    /// `asu` — app-session update.
    AppSessionUpdate,
    /// `assets` — full asset catalogue replacement.
    Assets,
}

impl NotificationKind {
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "bu" => Some(Self::BalanceUpdate),
            "cu" => Some(Self::ChannelUpdate),
            "tr" => Some(Self::Transfer),
            "asu" => Some(Self::AppSessionUpdate),
            "assets" => Some(Self::Assets),
            _ => None,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Self::BalanceUpdate => "bu",
            Self::ChannelUpdate => "cu",
            Self::Transfer => "tr",
            Self::AppSessionUpdate => "asu",
            Self::Assets => "assets",
        }
    }
}

// ── Asset catalogue ──────────────────────────────────────────────────────────

/// One entry of the server-pushed asset catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetInfo {
    /// Token contract address, or the empty string for a native asset.
    #[serde(default)]
    pub token: String,
    pub chain_id: u64,
    pub symbol: String,
    pub decimals: u8,
}

/// The catalogue payload arrives either as a bare array or wrapped in an
/// `assets` object; accept both.
pub fn parse_asset_catalogue(payload: &Value) -> Option<Vec<AssetInfo>> {
    let arr = match payload {
        Value::Array(_) => payload.clone(),
        Value::Object(map) => map.get("assets")?.clone(),
        _ => return None,
    };
    serde_json::from_value(arr).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trip() {
        let req = RpcRequest {
            id: 7,
            method: "get_ledger_balances".into(),
            params: json!({"account_id": "0xabc"}),
            ts_ms: 1_700_000_000_123,
            sigs: vec!["0xdeadbeef".into()],
        };
        let decoded = RpcRequest::decode(&req.encode().unwrap()).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn response_round_trip_with_error() {
        let res = RpcResponse {
            id: 7,
            method: "create_channel".into(),
            payload: json!({}),
            ts_ms: 1_700_000_000_456,
            sigs: vec![],
            error: Some(RpcErrorBody { code: -40, message: "unsupported token".into() }),
        };
        let decoded = RpcResponse::decode(&res.encode().unwrap()).unwrap();
        assert_eq!(decoded, res);
    }

    #[test]
    fn canonical_payload_is_positional() {
        let req = RpcRequest {
            id: 1,
            method: "ping".into(),
            params: json!({}),
            ts_ms: 42,
            sigs: vec![],
        };
        let bytes = req.canonical_payload().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"[1,"ping",{},42]"#);
    }

    #[test]
    fn malformed_frames_are_rejected() {
        assert!(RpcResponse::decode("not json").is_err());
        assert!(RpcResponse::decode(r#"{"res": [1, "m"]}"#).is_err());
        assert!(RpcResponse::decode(r#"{"other": true}"#).is_err());
    }

    #[test]
    fn notification_kinds() {
        assert_eq!(NotificationKind::from_method("bu"), Some(NotificationKind::BalanceUpdate));
        assert_eq!(NotificationKind::from_method("assets"), Some(NotificationKind::Assets));
        assert_eq!(NotificationKind::from_method("unknown_thing"), None);
        for kind in [
            NotificationKind::BalanceUpdate,
            NotificationKind::ChannelUpdate,
            NotificationKind::Transfer,
            NotificationKind::AppSessionUpdate,
            NotificationKind::Assets,
        ] {
            assert_eq!(NotificationKind::from_method(kind.method()), Some(kind));
        }
    }

    #[test]
    fn asset_catalogue_accepts_both_shapes() {
        let entry = json!({"token": "0xa0b8", "chain_id": 8453, "symbol": "usdc", "decimals": 6});
        let bare = json!([entry]);
        let wrapped = json!({"assets": [entry]});
        assert_eq!(parse_asset_catalogue(&bare).unwrap().len(), 1);
        assert_eq!(parse_asset_catalogue(&wrapped).unwrap().len(), 1);
        assert!(parse_asset_catalogue(&json!("nope")).is_none());
    }
}
