use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use payline_auth::AuthedClient;
use payline_core::types::now_ms;
use payline_core::units::{format_units, to_smallest_units};
use payline_core::{AppSessionId, Asset, Chain, WalletError};
use payline_query::QueryService;
use payline_rpc::RpcTransport;

use crate::store::{BalanceChange, ParticipantRow, SessionRow, SessionStore};
use crate::types::{AppDefinition, ParticipantStatus, SessionIntent, SessionStatus};

/// Asset metadata lookup, fed by the clearing node's pushed catalogue.
pub trait AssetCatalog: Send + Sync {
    fn decimals(&self, asset: &Asset, chain: Chain) -> Option<u8>;
}

impl AssetCatalog for RpcTransport {
    fn decimals(&self, asset: &Asset, chain: Chain) -> Option<u8> {
        let chain_id = chain.evm_chain_id()?;
        self.assets()
            .iter()
            .find(|a| a.chain_id == chain_id && a.symbol.eq_ignore_ascii_case(asset.as_str()))
            .map(|a| a.decimals)
    }
}

#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub participants: Vec<String>,
    pub weights: Vec<u64>,
    pub quorum: u64,
    pub asset: Asset,
    pub chain: Chain,
    /// Opening balances per participant address, human decimal strings.
    pub initial_allocations: HashMap<String, String>,
    /// Defaults to `NitroRPC/0.4`.
    pub protocol: Option<String>,
    /// Defaults to 3600 seconds.
    pub challenge: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub id: AppSessionId,
    pub version: u64,
    pub status: SessionStatus,
    pub participants: Vec<ParticipantRow>,
}

/// Orchestrates app-session mutations: every operation is an off-chain signed
/// RPC followed by a local bookkeeping write. A store failure after the node
/// accepted the mutation is a desync, not an error — it is logged and a
/// reconciliation read is scheduled.
pub struct AppSessionController {
    client: AuthedClient,
    store: Arc<dyn SessionStore>,
    catalog: Arc<dyn AssetCatalog>,
    query: Option<Arc<QueryService>>,
}

impl AppSessionController {
    pub fn new(
        client: AuthedClient,
        store: Arc<dyn SessionStore>,
        catalog: Arc<dyn AssetCatalog>,
        query: Option<Arc<QueryService>>,
    ) -> Self {
        Self { client, store, catalog, query }
    }

    /// Create a session and persist one participant row per (participant,
    /// asset). Everyone starts as `invited`.
    pub async fn create(&self, params: CreateSessionParams) -> Result<CreatedSession, WalletError> {
        if params.participants.is_empty() {
            return Err(WalletError::InvalidArgument("no participants".into()));
        }
        if params.participants.len() != params.weights.len() {
            return Err(WalletError::InvalidArgument(format!(
                "{} participants but {} weights",
                params.participants.len(),
                params.weights.len()
            )));
        }
        let total_weight: u64 = params.weights.iter().sum();
        if params.quorum == 0 || params.quorum > total_weight {
            return Err(WalletError::InvalidArgument(format!(
                "quorum {} outside 1..={total_weight}",
                params.quorum
            )));
        }
        for address in params.initial_allocations.keys() {
            if !params
                .participants
                .iter()
                .any(|p| p.eq_ignore_ascii_case(address))
            {
                return Err(WalletError::InvalidArgument(format!(
                    "allocation for {address}, who is not a participant"
                )));
            }
        }

        let decimals = self.decimals_for(&params.asset, params.chain)?;
        let definition = AppDefinition {
            protocol: params
                .protocol
                .clone()
                .unwrap_or_else(|| payline_core::constants::DEFAULT_SESSION_PROTOCOL.to_string()),
            participants: params.participants.clone(),
            weights: params.weights.clone(),
            quorum: params.quorum,
            challenge: params
                .challenge
                .unwrap_or(payline_core::constants::DEFAULT_SESSION_CHALLENGE_SECS),
            nonce: now_ms() as u64,
        };

        let mut balances = Vec::with_capacity(params.participants.len());
        for address in &params.participants {
            let human = params
                .initial_allocations
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(address))
                .map(|(_, v)| v);
            balances.push(allocation_units(human, decimals)?);
        }

        let allocations: Vec<Value> = params
            .participants
            .iter()
            .zip(&balances)
            .map(|(address, units)| {
                json!({
                    "participant": address,
                    "asset": params.asset.as_str(),
                    "amount": format_units(*units, decimals),
                })
            })
            .collect();

        let reply = self
            .client
            .call(
                "create_app_session",
                json!({ "definition": &definition, "allocations": allocations }),
            )
            .await?;
        let id = reply
            .get("app_session_id")
            .and_then(Value::as_str)
            .map(AppSessionId::new)
            .ok_or_else(|| {
                WalletError::Internal("create_app_session reply carried no id".into())
            })?;
        let version = reply.get("version").and_then(Value::as_u64).unwrap_or(1);

        let session = SessionRow {
            id: id.clone(),
            status: SessionStatus::Open,
            version,
            definition: definition.clone(),
            asset: params.asset.clone(),
            chain: params.chain,
            created_at: now_ms(),
            closed_at: None,
        };
        let rows: Vec<ParticipantRow> = params
            .participants
            .iter()
            .zip(&params.weights)
            .zip(&balances)
            .map(|((address, weight), balance)| ParticipantRow {
                session: id.clone(),
                address: address.clone(),
                weight: *weight,
                balance: *balance,
                asset: params.asset.clone(),
                status: ParticipantStatus::Invited,
                last_seen_at: None,
            })
            .collect();

        let participants = rows.clone();
        if let Err(e) = self.store.insert_session(session, rows).await {
            self.handle_desync(&id, e);
        }
        info!(session = %id, participants = participants.len(), "app session created");
        Ok(CreatedSession { id, version, status: SessionStatus::Open, participants })
    }

    /// Fund one participant. Allowed for `invited` participants — depositing
    /// is how an invitee activates; it promotes them to `joined`.
    pub async fn deposit(
        &self,
        id: &AppSessionId,
        participant: &str,
        amount: &str,
        asset: &Asset,
    ) -> Result<u128, WalletError> {
        let session = self.open_session(id).await?;
        let decimals = self.decimals_for(asset, session.chain)?;
        let units = to_smallest_units(amount, decimals)?;

        let row = self
            .store
            .participant(id, participant, asset)
            .await?
            .ok_or_else(|| {
                WalletError::NotFound(format!("participant ({participant}, {asset}) in {id}"))
            })?;
        let new_balance = row.balance.checked_add(units).ok_or_else(|| {
            WalletError::Internal("participant balance overflow".into())
        })?;

        let version = self
            .send_mutation(
                id,
                &session,
                SessionIntent::Deposit,
                &[(participant.to_string(), asset.clone(), new_balance)],
                decimals,
            )
            .await?;

        let change = BalanceChange {
            address: participant.to_string(),
            asset: asset.clone(),
            new_balance,
            status: Some(ParticipantStatus::Joined),
            touched_at: Some(now_ms()),
        };
        if let Err(e) = self.store.apply_balances(id, version, vec![change]).await {
            self.handle_desync(id, e);
        }
        info!(session = %id, participant, new_balance, "deposit applied");
        Ok(new_balance)
    }

    /// Move `amount` between two participants. The sum per asset is conserved
    /// by construction; both balances move in one atomic store write.
    pub async fn transfer(
        &self,
        id: &AppSessionId,
        from: &str,
        to: &str,
        amount: &str,
        asset: &Asset,
    ) -> Result<(u128, u128), WalletError> {
        if from.eq_ignore_ascii_case(to) {
            return Err(WalletError::InvalidArgument("transfer to self".into()));
        }
        let session = self.open_session(id).await?;
        let decimals = self.decimals_for(asset, session.chain)?;
        let units = to_smallest_units(amount, decimals)?;

        let from_row = self.store.participant(id, from, asset).await?.ok_or_else(|| {
            WalletError::NotFound(format!("participant ({from}, {asset}) in {id}"))
        })?;
        // An invitee who has never held funds cannot send; they can only
        // receive or deposit. Funded invitees may spend (and thereby join).
        let can_send = match from_row.status {
            ParticipantStatus::Joined => true,
            ParticipantStatus::Invited => from_row.balance > 0,
            ParticipantStatus::Left => false,
        };
        if !can_send {
            return Err(WalletError::ParticipantCannotSend {
                session: id.clone(),
                address: from.to_string(),
            });
        }
        if from_row.balance < units {
            return Err(WalletError::InsufficientBalance {
                available: from_row.balance,
                requested: units,
                source_label: "session-ledger".into(),
            });
        }
        let to_row = self.store.participant(id, to, asset).await?.ok_or_else(|| {
            WalletError::NotFound(format!("participant ({to}, {asset}) in {id}"))
        })?;

        let from_new = from_row.balance - units;
        let to_new = to_row.balance.checked_add(units).ok_or_else(|| {
            WalletError::Internal("participant balance overflow".into())
        })?;

        let version = self
            .send_mutation(
                id,
                &session,
                SessionIntent::Operate,
                &[
                    (from.to_string(), asset.clone(), from_new),
                    (to.to_string(), asset.clone(), to_new),
                ],
                decimals,
            )
            .await?;

        let changes = vec![
            BalanceChange {
                address: from.to_string(),
                asset: asset.clone(),
                new_balance: from_new,
                status: Some(ParticipantStatus::Joined),
                touched_at: Some(now_ms()),
            },
            BalanceChange {
                address: to.to_string(),
                asset: asset.clone(),
                new_balance: to_new,
                status: None,
                touched_at: None,
            },
        ];
        if let Err(e) = self.store.apply_balances(id, version, changes).await {
            self.handle_desync(id, e);
        }
        info!(session = %id, from, to, units, "transfer applied");
        Ok((from_new, to_new))
    }

    /// Close the session. Closing an already-closed session is a no-op that
    /// returns the same terminal row without another RPC.
    pub async fn close(&self, id: &AppSessionId) -> Result<SessionRow, WalletError> {
        let session = self
            .store
            .session(id)
            .await?
            .ok_or_else(|| WalletError::NotFound(format!("app session {id}")))?;
        if session.status == SessionStatus::Closed {
            debug!(session = %id, "close on already-closed session is a no-op");
            return Ok(session);
        }

        self.client
            .call("close_app_session", json!({ "app_session_id": id.as_str() }))
            .await?;

        let closed_at = now_ms();
        if let Err(e) = self.store.mark_closed(id, closed_at).await {
            self.handle_desync(id, e);
        }
        info!(session = %id, "app session closed");
        Ok(self.store.session(id).await?.unwrap_or(SessionRow {
            status: SessionStatus::Closed,
            closed_at: Some(closed_at),
            ..session
        }))
    }

    // ── Internals ────────────────────────────────────────────────────────────

    async fn open_session(&self, id: &AppSessionId) -> Result<SessionRow, WalletError> {
        let session = self
            .store
            .session(id)
            .await?
            .ok_or_else(|| WalletError::NotFound(format!("app session {id}")))?;
        if session.status == SessionStatus::Closed {
            return Err(WalletError::SessionClosed(id.clone()));
        }
        Ok(session)
    }

    fn decimals_for(&self, asset: &Asset, chain: Chain) -> Result<u8, WalletError> {
        self.catalog.decimals(asset, chain).ok_or_else(|| {
            WalletError::PreconditionFailed(format!(
                "asset {asset} on {chain} is not in the clearing catalogue"
            ))
        })
    }

    /// Send an `operate_app_session` carrying the full allocation vector with
    /// the given overrides applied. Returns the new session version.
    async fn send_mutation(
        &self,
        id: &AppSessionId,
        session: &SessionRow,
        intent: SessionIntent,
        overrides: &[(String, Asset, u128)],
        decimals: u8,
    ) -> Result<u64, WalletError> {
        let rows = self.store.participants(id).await?;
        let allocations: Vec<Value> = rows
            .iter()
            .map(|row| {
                let balance = overrides
                    .iter()
                    .find(|(addr, asset, _)| {
                        row.address.eq_ignore_ascii_case(addr) && &row.asset == asset
                    })
                    .map(|(_, _, units)| *units)
                    .unwrap_or(row.balance);
                json!({
                    "participant": row.address,
                    "asset": row.asset.as_str(),
                    "amount": format_units(balance, decimals),
                })
            })
            .collect();

        let reply = self
            .client
            .call(
                "operate_app_session",
                json!({
                    "app_session_id": id.as_str(),
                    "intent": intent.wire_name(),
                    "allocations": allocations,
                }),
            )
            .await?;
        Ok(reply
            .get("version")
            .and_then(Value::as_u64)
            .unwrap_or(session.version + 1))
    }

    /// Off-chain state advanced but the local write failed: log it loudly and
    /// schedule a reconciliation read so bookkeeping converges.
    fn handle_desync(&self, id: &AppSessionId, err: WalletError) {
        warn!(session = %id, error = %err, "store desync after accepted mutation; scheduling reconciliation");
        let Some(query) = &self.query else { return };
        let query = Arc::clone(query);
        let store = Arc::clone(&self.store);
        let id = id.clone();
        tokio::spawn(async move {
            match query.get_app_session(id.as_str()).await {
                Ok(info) => {
                    if info.status == "closed" {
                        let _ = store.mark_closed(&id, now_ms()).await;
                    }
                    debug!(session = %id, version = info.version, "reconciliation read complete");
                }
                Err(e) => warn!(session = %id, error = %e, "reconciliation read failed"),
            }
        });
    }
}

/// Opening allocations: absent means zero, an explicit zero is allowed, and
/// anything else must parse as a positive amount.
fn allocation_units(amount: Option<&String>, decimals: u8) -> Result<u128, WalletError> {
    match amount {
        None => Ok(0),
        Some(human) => {
            let trimmed = human.trim();
            let is_zero = !trimmed.is_empty()
                && trimmed.chars().all(|c| c == '0' || c == '.')
                && trimmed.chars().filter(|c| *c == '.').count() <= 1;
            if is_zero {
                return Ok(0);
            }
            to_smallest_units(human, decimals)
        }
    }
}
