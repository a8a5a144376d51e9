use thiserror::Error;

use crate::types::AppSessionId;

/// Stable classification of a failure, independent of which subsystem raised
/// it. This is what callers above the core switch on.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    InvalidArgument,
    PreconditionFailed,
    Unavailable,
    Unauthenticated,
    Timeout,
    NotFound,
    Internal,
    /// Off-chain phase succeeded but the on-chain submission failed; the
    /// caller may need to reconcile rather than blindly retry.
    PartialSettlement,
}

#[derive(Debug, Error)]
pub enum WalletError {
    // ── Argument / precondition errors ───────────────────────────────────────
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error(
        "insufficient balance: available {available} smallest units, \
         requested {requested} (source: {source_label})"
    )]
    InsufficientBalance {
        available: u128,
        requested: u128,
        source_label: String,
    },

    #[error("app session {0} is already closed")]
    SessionClosed(AppSessionId),

    #[error("participant {address} has not joined session {session}")]
    ParticipantCannotSend {
        session: AppSessionId,
        address: String,
    },

    // ── Connectivity ─────────────────────────────────────────────────────────
    #[error("not connected: {0}")]
    Unavailable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("session authentication failed: {0}")]
    Unauthenticated(String),

    // ── Remote rejections ────────────────────────────────────────────────────
    #[error("clearing node rejected {method}: {message} (code {code})")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("indexer returned {status}: {body}")]
    Indexer { status: u16, body: String },

    // ── Lookup ───────────────────────────────────────────────────────────────
    #[error("not found: {0}")]
    NotFound(String),

    // ── Settlement ───────────────────────────────────────────────────────────
    #[error("off-chain negotiation succeeded but on-chain submission failed: {0}")]
    PartialSettlement(String),

    // ── Everything else ──────────────────────────────────────────────────────
    #[error("internal error: {0}")]
    Internal(String),
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            WalletError::PreconditionFailed(_)
            | WalletError::InsufficientBalance { .. }
            | WalletError::SessionClosed(_)
            | WalletError::ParticipantCannotSend { .. } => ErrorKind::PreconditionFailed,
            WalletError::Unavailable(_) => ErrorKind::Unavailable,
            WalletError::Timeout(_) => ErrorKind::Timeout,
            WalletError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            // Clearing-node rejections are requests the server understood and
            // refused; 4xx from the indexer reads the same way.
            WalletError::Rpc { .. } => ErrorKind::PreconditionFailed,
            WalletError::Indexer { status, .. } if *status >= 500 => ErrorKind::Unavailable,
            WalletError::Indexer { .. } => ErrorKind::PreconditionFailed,
            WalletError::NotFound(_) => ErrorKind::NotFound,
            WalletError::PartialSettlement(_) => ErrorKind::PartialSettlement,
            WalletError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True for failures worth retrying at a higher layer (transient
    /// connectivity, not rejections).
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Unavailable | ErrorKind::Timeout)
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(e: serde_json::Error) -> Self {
        WalletError::Internal(format!("JSON encoding: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_balance_names_both_amounts_and_source() {
        let err = WalletError::InsufficientBalance {
            available: 50_000_000,
            requested: 1_000_000_000,
            source_label: "wdk-getTokenBalance".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("50000000"));
        assert!(msg.contains("1000000000"));
        assert!(msg.contains("wdk-getTokenBalance"));
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    #[test]
    fn indexer_5xx_is_unavailable_4xx_is_not() {
        let server = WalletError::Indexer { status: 502, body: "bad gateway".into() };
        let client = WalletError::Indexer { status: 404, body: "no wallet".into() };
        assert_eq!(server.kind(), ErrorKind::Unavailable);
        assert_ne!(client.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn transient_kinds() {
        assert!(WalletError::Timeout("rpc".into()).is_transient());
        assert!(WalletError::Unavailable("gone".into()).is_transient());
        assert!(!WalletError::InvalidArgument("x".into()).is_transient());
    }
}
