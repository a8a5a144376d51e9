//! Local persistence surface for session and participant rows. The real
//! store lives outside the core; the in-memory implementation here backs
//! tests and single-process deployments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use payline_core::{AppSessionId, Asset, Chain, WalletError};

use crate::types::{AppDefinition, ParticipantStatus, SessionStatus};

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: AppSessionId,
    pub status: SessionStatus,
    pub version: u64,
    pub definition: AppDefinition,
    pub asset: Asset,
    pub chain: Chain,
    pub created_at: i64,
    pub closed_at: Option<i64>,
}

/// Unique per `(session, address, asset)`.
#[derive(Debug, Clone)]
pub struct ParticipantRow {
    pub session: AppSessionId,
    pub address: String,
    pub weight: u64,
    /// Balance in the asset's smallest units.
    pub balance: u128,
    pub asset: Asset,
    pub status: ParticipantStatus,
    pub last_seen_at: Option<i64>,
}

/// One participant-balance mutation inside an atomic batch.
#[derive(Debug, Clone)]
pub struct BalanceChange {
    pub address: String,
    pub asset: Asset,
    pub new_balance: u128,
    pub status: Option<ParticipantStatus>,
    pub touched_at: Option<i64>,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(
        &self,
        session: SessionRow,
        participants: Vec<ParticipantRow>,
    ) -> Result<(), WalletError>;

    async fn session(&self, id: &AppSessionId) -> Result<Option<SessionRow>, WalletError>;

    async fn participants(&self, id: &AppSessionId) -> Result<Vec<ParticipantRow>, WalletError>;

    async fn participant(
        &self,
        id: &AppSessionId,
        address: &str,
        asset: &Asset,
    ) -> Result<Option<ParticipantRow>, WalletError>;

    /// Apply a batch of balance changes and bump the session version, all or
    /// nothing.
    async fn apply_balances(
        &self,
        id: &AppSessionId,
        version: u64,
        changes: Vec<BalanceChange>,
    ) -> Result<(), WalletError>;

    async fn mark_closed(&self, id: &AppSessionId, closed_at: i64) -> Result<(), WalletError>;
}

// ── In-memory implementation ─────────────────────────────────────────────────

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<AppSessionId, (SessionRow, Vec<ParticipantRow>)>>,
    fail_next_write: AtomicBool,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next mutating call fail, for desync testing.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    fn check_injected_failure(&self) -> Result<(), WalletError> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(WalletError::Internal("injected store failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert_session(
        &self,
        session: SessionRow,
        participants: Vec<ParticipantRow>,
    ) -> Result<(), WalletError> {
        self.check_injected_failure()?;
        let mut seen = std::collections::HashSet::new();
        for row in &participants {
            if !seen.insert((row.address.to_lowercase(), row.asset.clone())) {
                return Err(WalletError::Internal(format!(
                    "duplicate participant row ({}, {})",
                    row.address, row.asset
                )));
            }
        }
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), (session, participants));
        Ok(())
    }

    async fn session(&self, id: &AppSessionId) -> Result<Option<SessionRow>, WalletError> {
        Ok(self.sessions.lock().unwrap().get(id).map(|(s, _)| s.clone()))
    }

    async fn participants(&self, id: &AppSessionId) -> Result<Vec<ParticipantRow>, WalletError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .get(id)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn participant(
        &self,
        id: &AppSessionId,
        address: &str,
        asset: &Asset,
    ) -> Result<Option<ParticipantRow>, WalletError> {
        Ok(self.sessions.lock().unwrap().get(id).and_then(|(_, rows)| {
            rows.iter()
                .find(|r| r.address.eq_ignore_ascii_case(address) && &r.asset == asset)
                .cloned()
        }))
    }

    async fn apply_balances(
        &self,
        id: &AppSessionId,
        version: u64,
        changes: Vec<BalanceChange>,
    ) -> Result<(), WalletError> {
        self.check_injected_failure()?;
        let mut sessions = self.sessions.lock().unwrap();
        let (session, rows) = sessions
            .get_mut(id)
            .ok_or_else(|| WalletError::NotFound(format!("session {id}")))?;

        // Resolve the whole batch before touching anything.
        let mut resolved = Vec::with_capacity(changes.len());
        for change in &changes {
            let index = rows
                .iter()
                .position(|r| {
                    r.address.eq_ignore_ascii_case(&change.address) && r.asset == change.asset
                })
                .ok_or_else(|| {
                    WalletError::NotFound(format!(
                        "participant ({}, {}) in session {id}",
                        change.address, change.asset
                    ))
                })?;
            resolved.push(index);
        }
        for (index, change) in resolved.into_iter().zip(changes) {
            let row = &mut rows[index];
            row.balance = change.new_balance;
            if let Some(status) = change.status {
                row.status = status;
            }
            if change.touched_at.is_some() {
                row.last_seen_at = change.touched_at;
            }
        }
        session.version = version;
        Ok(())
    }

    async fn mark_closed(&self, id: &AppSessionId, closed_at: i64) -> Result<(), WalletError> {
        self.check_injected_failure()?;
        let mut sessions = self.sessions.lock().unwrap();
        let (session, _) = sessions
            .get_mut(id)
            .ok_or_else(|| WalletError::NotFound(format!("session {id}")))?;
        session.status = SessionStatus::Closed;
        session.closed_at = Some(closed_at);
        Ok(())
    }
}
