//! Read-side queries against the clearing node: ledger balances, app
//! sessions, channels, and ledger transaction history. All calls are signed
//! except `ping` and `get_app_definition`, which the node serves publicly.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use payline_auth::AuthedClient;
use payline_core::types::now_ms;
use payline_core::WalletError;

// ── Result types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct PingResult {
    pub pong: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerBalance {
    pub asset: String,
    pub amount: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerTransaction {
    #[serde(default)]
    pub id: u64,
    #[serde(default, alias = "type")]
    pub tx_type: String,
    #[serde(default)]
    pub asset: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default, alias = "from")]
    pub from_account: String,
    #[serde(default, alias = "to")]
    pub to_account: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelInfo {
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub chain_id: u64,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppDefinitionInfo {
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub weights: Vec<u64>,
    #[serde(default)]
    pub quorum: u64,
    #[serde(default)]
    pub challenge: u64,
    #[serde(default)]
    pub nonce: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionAllocationInfo {
    #[serde(default)]
    pub participant: String,
    #[serde(default)]
    pub asset: String,
    #[serde(default)]
    pub amount: String,
}

/// One app session as reported by the clearing node. The bare sessions query
/// may omit participants; [`QueryService::get_app_session`] merges them in
/// from the public definition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppSessionInfo {
    pub app_session_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub session_data: Option<Value>,
    #[serde(default)]
    pub allocations: Vec<SessionAllocationInfo>,
    #[serde(default)]
    pub participants: Option<Vec<String>>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub weights: Option<Vec<u64>>,
    #[serde(default)]
    pub quorum: Option<u64>,
}

/// Filters for the ledger transaction query. Pagination follows the clearing
/// node's `{page: {size}, offset}` convention.
#[derive(Debug, Clone, Default)]
pub struct LedgerTxFilter {
    pub asset: Option<String>,
    pub tx_type: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// ── Service ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct QueryService {
    client: AuthedClient,
}

impl QueryService {
    pub fn new(client: AuthedClient) -> Self {
        Self { client }
    }

    /// Unsigned liveness probe. A null or missing reply defaults to a local
    /// pong so callers always get a well-formed result.
    pub async fn ping(&self) -> Result<PingResult, WalletError> {
        let payload = self.client.call_public("ping", json!({})).await?;
        if payload.is_null() {
            return Ok(PingResult { pong: "pong".into(), timestamp: now_ms() });
        }
        Ok(PingResult {
            pong: payload
                .get("pong")
                .and_then(Value::as_str)
                .unwrap_or("pong")
                .to_string(),
            timestamp: payload
                .get("timestamp")
                .and_then(Value::as_i64)
                .unwrap_or_else(now_ms),
        })
    }

    pub async fn get_ledger_balances(
        &self,
        account: Option<&str>,
    ) -> Result<Vec<LedgerBalance>, WalletError> {
        let params = match account {
            Some(id) => json!({ "account_id": id }),
            None => json!({}),
        };
        let payload = self.client.call("get_ledger_balances", params).await?;
        parse_list(&payload, "ledger_balances")
    }

    pub async fn get_channels(&self) -> Result<Vec<ChannelInfo>, WalletError> {
        let payload = self.client.call("get_channels", json!({})).await?;
        parse_list(&payload, "channels")
    }

    pub async fn get_ledger_transactions(
        &self,
        filter: &LedgerTxFilter,
    ) -> Result<Vec<LedgerTransaction>, WalletError> {
        let mut params = json!({
            "offset": filter.offset.unwrap_or(0),
            "page": { "size": filter.limit.unwrap_or(50) },
        });
        if let Some(asset) = &filter.asset {
            params["asset"] = json!(asset);
        }
        if let Some(tx_type) = &filter.tx_type {
            params["tx_type"] = json!(tx_type);
        }
        let payload = self.client.call("get_ledger_transactions", params).await?;
        parse_list(&payload, "ledger_transactions")
    }

    pub async fn get_app_sessions(
        &self,
        participant: Option<&str>,
        status: Option<&str>,
    ) -> Result<Vec<AppSessionInfo>, WalletError> {
        let mut params = json!({});
        if let Some(p) = participant {
            params["participant"] = json!(p);
        }
        if let Some(s) = status {
            params["status"] = json!(s);
        }
        let payload = self.client.call("get_app_sessions", params).await?;
        parse_list(&payload, "app_sessions")
    }

    /// Public read of a session's definition (protocol, participants,
    /// weights, quorum).
    pub async fn get_app_definition(
        &self,
        app_session_id: &str,
    ) -> Result<AppDefinitionInfo, WalletError> {
        let payload = self
            .client
            .call_public("get_app_definition", json!({ "app_session_id": app_session_id }))
            .await?;
        let definition = payload.get("definition").unwrap_or(&payload);
        serde_json::from_value(definition.clone())
            .map_err(|e| WalletError::Internal(format!("app definition parse: {e}")))
    }

    /// One session with its definition merged in. The bare sessions query may
    /// omit participants for privacy; the public definition fills them in.
    pub async fn get_app_session(
        &self,
        app_session_id: &str,
    ) -> Result<AppSessionInfo, WalletError> {
        let sessions = self.get_app_sessions(None, None).await?;
        let mut session = sessions
            .into_iter()
            .find(|s| s.app_session_id == app_session_id)
            .ok_or_else(|| WalletError::NotFound(format!("app session {app_session_id}")))?;

        let definition = self.get_app_definition(app_session_id).await?;
        debug!(session = app_session_id, "merging definition into session");
        session.participants = Some(definition.participants);
        session.protocol = Some(definition.protocol);
        session.weights = Some(definition.weights);
        session.quorum = Some(definition.quorum);
        Ok(session)
    }
}

/// The node wraps list payloads either as a bare array or under a named key.
fn parse_list<T: serde::de::DeserializeOwned>(
    payload: &Value,
    key: &str,
) -> Result<Vec<T>, WalletError> {
    let list = match payload {
        Value::Array(_) => payload,
        Value::Object(map) => match map.get(key) {
            Some(list) => list,
            None => return Ok(Vec::new()),
        },
        _ => return Ok(Vec::new()),
    };
    serde_json::from_value(list.clone())
        .map_err(|e| WalletError::Internal(format!("{key} parse: {e}")))
}
