//! N-party off-chain app sessions on the clearing node: weighted-quorum
//! definitions, per-asset allocations, and the local participant ledger the
//! backend keeps alongside the node's authoritative state.

pub mod controller;
pub mod store;
pub mod types;

pub use controller::{AppSessionController, AssetCatalog, CreateSessionParams, CreatedSession};
pub use store::{
    BalanceChange, MemorySessionStore, ParticipantRow, SessionRow, SessionStore,
};
pub use types::{AppDefinition, ParticipantStatus, SessionIntent, SessionStatus};
